//! # Subscription Subcommands
//!
//! Operator access to individual records: create, inspect, list, and apply
//! transitions by id. Records are printed as JSON on stdout.

use clap::Args;
use futures::TryStreamExt;
use sublife_core::{Clock, Reference, SubscriptionId, Timestamp};
use sublife_state::{SubscriptionState, TransitionNote, TransitionRequest};
use sublife_store::{Predicate, SubscriptionQuery};

use crate::context::Context;

/// Arguments for `create`.
#[derive(Args, Debug)]
pub struct CreateArgs {
    /// Start of the period (default: now).
    #[arg(long)]
    pub start: Option<Timestamp>,
    /// End of the period, RFC 3339 UTC.
    #[arg(long)]
    pub end: Timestamp,
    /// External reference (at most 100 characters).
    #[arg(long)]
    pub reference: Reference,
}

/// Arguments for `list`.
#[derive(Args, Debug)]
pub struct ListArgs {
    /// Only records in this state.
    #[arg(long)]
    pub state: Option<SubscriptionState>,
    /// Only records whose reference starts with this text.
    #[arg(long)]
    pub reference_prefix: Option<String>,
    /// Maximum number of records.
    #[arg(long, default_value_t = 50)]
    pub limit: u64,
}

impl ListArgs {
    /// Most recently updated first.
    pub fn query(&self) -> SubscriptionQuery {
        let mut parts = Vec::new();
        if let Some(state) = self.state {
            parts.push(Predicate::state(state));
        }
        if let Some(prefix) = &self.reference_prefix {
            parts.push(Predicate::ReferenceStartsWith(prefix.clone()));
        }
        let predicate = match parts.len() {
            0 => Predicate::All,
            1 => parts.remove(0),
            _ => Predicate::And(parts),
        };
        SubscriptionQuery::new(predicate)
            .newest_first()
            .limit(self.limit)
    }
}

/// Arguments for `renewed`.
#[derive(Args, Debug)]
pub struct RenewedArgs {
    /// Subscription id.
    pub id: SubscriptionId,
    /// New end of the period.
    #[arg(long)]
    pub end: Timestamp,
    /// New external reference.
    #[arg(long)]
    pub reference: Reference,
    /// Description for the audit log.
    #[arg(long, default_value = "")]
    pub description: String,
}

/// Arguments for `renewal-failed` and `state-unknown`.
#[derive(Args, Debug)]
pub struct NoteArgs {
    /// Subscription id.
    pub id: SubscriptionId,
    /// Short reason stored on the record.
    #[arg(long, default_value = "")]
    pub reason: String,
    /// Description for the audit log; replaces the reason when given.
    #[arg(long, default_value = "")]
    pub description: String,
}

impl NoteArgs {
    fn note(&self) -> TransitionNote {
        TransitionNote::reason(self.reason.clone()).with_description(self.description.clone())
    }
}

/// Arguments for `end`.
#[derive(Args, Debug)]
pub struct EndArgs {
    #[command(flatten)]
    pub note: NoteArgs,
    /// Who is ending the subscription.
    #[arg(long)]
    pub by: Option<String>,
}

impl EndArgs {
    /// The note passed to `end_subscription`.
    pub fn note(&self) -> TransitionNote {
        let note = self.note.note();
        match &self.by {
            Some(actor) => note.by(actor.clone()),
            None => note,
        }
    }
}

/// Create an ACTIVE subscription and print it.
pub async fn run_create(args: &CreateArgs, ctx: &Context) -> anyhow::Result<u8> {
    let start = args
        .start
        .unwrap_or_else(|| ctx.lifecycle.clock().now());
    let sub = ctx
        .lifecycle
        .add_subscription(start, args.end, args.reference.clone())
        .await?;
    println!("{}", serde_json::to_string_pretty(&sub)?);
    Ok(0)
}

/// Print a record and its audit history.
pub async fn run_show(id: SubscriptionId, ctx: &Context) -> anyhow::Result<u8> {
    let sub = ctx.lifecycle.get(id).await?;
    let history = ctx.lifecycle.history(id).await?;
    let out = serde_json::json!({
        "summary": sub.to_string(),
        "subscription": sub,
        "history": history,
    });
    println!("{}", serde_json::to_string_pretty(&out)?);
    Ok(0)
}

/// Print matching records, one JSON object per line.
pub async fn run_list(args: &ListArgs, ctx: &Context) -> anyhow::Result<u8> {
    let query = args.query();
    let mut cursor = ctx.lifecycle.store().filter(&query);
    while let Some(sub) = cursor.try_next().await? {
        println!("{}", serde_json::to_string(&sub)?);
    }
    Ok(0)
}

/// Apply `request` to record `id` and print the result.
pub async fn run_transition(
    id: SubscriptionId,
    request: TransitionRequest,
    ctx: &Context,
) -> anyhow::Result<u8> {
    let sub = ctx.lifecycle.apply_by_id(id, request).await?;
    println!("{}", serde_json::to_string_pretty(&sub)?);
    Ok(0)
}

/// `renewed` request from its arguments.
pub fn renewed_request(args: &RenewedArgs) -> TransitionRequest {
    TransitionRequest::renewed(args.end, args.reference.clone(), args.description.clone())
}

/// `renewal_failed` request from its arguments.
pub fn renewal_failed_request(args: &NoteArgs) -> TransitionRequest {
    TransitionRequest::renewal_failed(args.note())
}

/// `state_unknown` request from its arguments.
pub fn state_unknown_request(args: &NoteArgs) -> TransitionRequest {
    TransitionRequest::state_unknown(args.note())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn list_query_combines_filters() {
        let args = ListArgs {
            state: Some(SubscriptionState::Suspended),
            reference_prefix: Some("INV-".to_string()),
            limit: 10,
        };
        let query = args.query();
        assert_eq!(
            query.predicate,
            Predicate::And(vec![
                Predicate::state(SubscriptionState::Suspended),
                Predicate::ReferenceStartsWith("INV-".to_string()),
            ])
        );
        assert_eq!(query.limit, Some(10));
        assert_eq!(query.order, sublife_store::Order::NewestFirst);
    }

    #[test]
    fn list_query_without_filters_matches_all() {
        let args = ListArgs {
            state: None,
            reference_prefix: None,
            limit: 50,
        };
        assert_eq!(args.query().predicate, Predicate::All);
    }

    #[test]
    fn end_note_carries_actor() {
        let args = EndArgs {
            note: NoteArgs {
                id: SubscriptionId::new(),
                reason: "chargeback".to_string(),
                description: String::new(),
            },
            by: Some("support".to_string()),
        };
        let request = TransitionRequest::end_subscription(args.note());
        assert_eq!(request.audit_actor(), Some("support"));
        assert_eq!(request.note().effective_reason(), "chargeback");
    }
}
