//! # sublife CLI entry point
//!
//! Parses command-line arguments, installs logging, connects to Postgres
//! and dispatches to subcommand handlers.

use std::process::ExitCode;

use clap::{Parser, Subcommand};
use sublife_core::SubscriptionId;
use sublife_engine::EngineConfig;
use sublife_state::TransitionRequest;
use sublife_store::postgres;
use tracing_subscriber::EnvFilter;

use sublife_cli::context::Context;
use sublife_cli::subscription::{
    renewal_failed_request, renewed_request, run_create, run_list, run_show, run_transition,
    state_unknown_request, CreateArgs, EndArgs, ListArgs, NoteArgs, RenewedArgs,
};
use sublife_cli::trigger::{run_trigger, TriggerArgs};

/// Subscription lifecycle engine.
///
/// Requires DATABASE_URL. Trigger defaults come from SUBLIFE_* environment
/// variables; log verbosity from RUST_LOG (default: info).
#[derive(Parser, Debug)]
#[command(name = "sublife", version, about, long_about = None)]
struct Cli {
    /// Emit logs as JSON lines.
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Apply database migrations.
    Migrate,

    /// Run a scheduled trigger.
    Trigger(TriggerArgs),

    /// Create an ACTIVE subscription.
    Create(CreateArgs),

    /// Show a subscription and its audit history.
    Show {
        /// Subscription id.
        id: SubscriptionId,
    },

    /// List subscriptions, most recently updated first.
    List(ListArgs),

    /// Stop automatic renewal (ACTIVE → EXPIRING).
    CancelAutorenew {
        /// Subscription id.
        id: SubscriptionId,
    },

    /// Resume automatic renewal (EXPIRING → ACTIVE).
    EnableAutorenew {
        /// Subscription id.
        id: SubscriptionId,
    },

    /// Begin a renewal attempt (→ RENEWING).
    Renew {
        /// Subscription id.
        id: SubscriptionId,
    },

    /// Record a successful renewal (→ ACTIVE).
    Renewed(RenewedArgs),

    /// Record a failed renewal (→ SUSPENDED).
    RenewalFailed(NoteArgs),

    /// Record an interrupted renewal (RENEWING → ERROR).
    StateUnknown(NoteArgs),

    /// End a subscription now (→ ENDED).
    End(EndArgs),
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.json);

    match run(cli.command).await {
        Ok(code) => ExitCode::from(code),
        Err(e) => {
            tracing::error!("{e:#}");
            ExitCode::from(1)
        }
    }
}

fn init_tracing(json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

async fn run(command: Commands) -> anyhow::Result<u8> {
    let config = EngineConfig::from_env()?;
    let ctx = Context::connect(config).await?;

    match command {
        Commands::Migrate => {
            postgres::migrate(&ctx.pool).await?;
            Ok(0)
        }
        Commands::Trigger(args) => run_trigger(&args, &ctx).await,
        Commands::Create(args) => run_create(&args, &ctx).await,
        Commands::Show { id } => run_show(id, &ctx).await,
        Commands::List(args) => run_list(&args, &ctx).await,
        Commands::CancelAutorenew { id } => {
            run_transition(id, TransitionRequest::cancel_autorenew(), &ctx).await
        }
        Commands::EnableAutorenew { id } => {
            run_transition(id, TransitionRequest::enable_autorenew(), &ctx).await
        }
        Commands::Renew { id } => run_transition(id, TransitionRequest::renew(), &ctx).await,
        Commands::Renewed(args) => run_transition(args.id, renewed_request(&args), &ctx).await,
        Commands::RenewalFailed(args) => {
            run_transition(args.id, renewal_failed_request(&args), &ctx).await
        }
        Commands::StateUnknown(args) => {
            run_transition(args.id, state_unknown_request(&args), &ctx).await
        }
        Commands::End(args) => {
            let request = TransitionRequest::end_subscription(args.note());
            run_transition(args.note.id, request, &ctx).await
        }
    }
}
