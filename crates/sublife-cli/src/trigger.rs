//! # Trigger Subcommand
//!
//! Entry points for the scheduler. Each invocation runs one trigger to
//! completion and prints the number of records it transitioned.

use clap::{Args, Subcommand};
use sublife_engine::{EngineConfig, TriggerKind};

use crate::context::Context;

/// Arguments for the trigger subcommand.
#[derive(Args, Debug)]
pub struct TriggerArgs {
    #[command(subcommand)]
    pub trigger: TriggerCommand,
}

/// Which trigger to run.
#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum TriggerCommand {
    /// Start renewal of ACTIVE subscriptions whose period has ended.
    Renewals,
    /// End EXPIRING subscriptions whose period has ended.
    Expiring,
    /// Retry renewal of SUSPENDED subscriptions.
    Suspended,
    /// End SUSPENDED subscriptions past the grace period.
    SuspendedTimeout {
        /// Grace period in hours (default: SUBLIFE_SUSPENDED_TIMEOUT_HOURS).
        #[arg(long, conflicts_with = "days")]
        hours: Option<u32>,
        /// Grace period in days. Deprecated; use --hours.
        #[arg(long)]
        days: Option<u32>,
    },
    /// Resolve renewals that have been RENEWING for too long.
    Stuck {
        /// Staleness threshold in hours (default: SUBLIFE_STUCK_TIMEOUT_HOURS).
        #[arg(long)]
        hours: Option<u32>,
        /// Send stuck renewals back to SUSPENDED for another attempt.
        #[arg(long, conflicts_with = "no_retry")]
        retry: bool,
        /// Mark stuck renewals as ERROR (default unless SUBLIFE_STUCK_RETRY).
        #[arg(long)]
        no_retry: bool,
    },
}

impl TriggerCommand {
    /// Fill unspecified parameters from `config`.
    pub fn resolve(&self, config: &EngineConfig) -> anyhow::Result<TriggerKind> {
        Ok(match *self {
            Self::Renewals => TriggerKind::Renewals,
            Self::Expiring => TriggerKind::Expiring,
            Self::Suspended => TriggerKind::Suspended,
            Self::SuspendedTimeout { hours, days } => {
                let hours = match (hours, days) {
                    (Some(h), _) => h,
                    (None, Some(d)) => {
                        tracing::warn!("--days is deprecated, use --hours");
                        d.checked_mul(24)
                            .ok_or_else(|| anyhow::anyhow!("--days {d} is out of range"))?
                    }
                    (None, None) => config.suspended_timeout_hours,
                };
                TriggerKind::SuspendedTimeout { hours }
            }
            Self::Stuck {
                hours,
                retry,
                no_retry,
            } => TriggerKind::Stuck {
                hours: hours.unwrap_or(config.stuck_timeout_hours),
                retry: if retry {
                    true
                } else if no_retry {
                    false
                } else {
                    config.stuck_retry
                },
            },
        })
    }
}

/// Execute a trigger subcommand.
pub async fn run_trigger(args: &TriggerArgs, ctx: &Context) -> anyhow::Result<u8> {
    let kind = args.trigger.resolve(&ctx.config)?;
    let report = ctx.triggers().run(kind).await?;
    println!("{}", report.updated);
    Ok(0)
}
