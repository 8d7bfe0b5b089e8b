//! gigcore-cli — admin-only one-shot operator commands.
//!
//! Usage:
//!   gigcore-cli recalculate-capacity
//!   gigcore-cli expire-corrections
//!   gigcore-cli ingest-replay <event_id> --stripe-secret-key <key>
//!
//! Exit codes: 0 success, 1 generic error, 2 invariant violation (HX1xx..HX9xx).

use std::process::ExitCode;
use std::sync::Arc;

use anyhow::Context;
use chrono::Utc;
use clap::{Parser, Subcommand};
use tracing::{error, info};

use gigcore_core::error::CoreError;
use gigcore_core::ids::{OutboxId, StripeEventId};
use gigcore_core::model::{OutboxQueue, OutboxRow, OutboxStatus};
use gigcore_core::ports::PaymentProcessorApi;
use gigcore_correction::{CausalAnalyzer, CorrectionService};
use gigcore_outbox::EffectWorker;
use gigcore_store::{stripe_event, Store};
use gigcore_supply::{DecayEngine, WaitlistProcessor};
use gigcore_webhook::{StripeClient, StripeEffectWorker};

#[derive(Parser, Debug)]
#[command(name = "gigcore-cli", version, about = "gigcore admin operator CLI")]
struct Args {
    #[arg(long, env = "DATABASE_URL")]
    database_url: String,

    #[arg(long, default_value = "5")]
    max_connections: u32,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Runs activity decay, auto-expansion, and waitlist processing once.
    RecalculateCapacity,

    /// Reverses every correction past its TTL, then re-runs the causal-impact analyzer.
    ExpireCorrections,

    /// Re-runs effect processing for an already-ingested Stripe event.
    IngestReplay {
        event_id: String,

        #[arg(long, env = "STRIPE_SECRET_KEY")]
        stripe_secret_key: String,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,gigcore=debug".parse().unwrap()),
        )
        .init();

    match run().await {
        Ok(()) => ExitCode::from(0),
        Err(e) => {
            error!(error = %e, "command failed");
            match e.downcast_ref::<CoreError>() {
                Some(core_err) if core_err.code().starts_with("HX") => ExitCode::from(2),
                _ => ExitCode::from(1),
            }
        }
    }
}

async fn run() -> anyhow::Result<()> {
    let args = Args::parse();
    let store = Arc::new(
        Store::connect(&args.database_url, args.max_connections)
            .await
            .context("connecting to database")?,
    );

    match args.command {
        Command::RecalculateCapacity => cmd_recalculate_capacity(store).await,
        Command::ExpireCorrections => cmd_expire_corrections(store).await,
        Command::IngestReplay { event_id, stripe_secret_key } => {
            cmd_ingest_replay(store, event_id, stripe_secret_key).await
        }
    }
}

async fn cmd_recalculate_capacity(store: Arc<Store>) -> anyhow::Result<()> {
    let decay = DecayEngine::new(Arc::clone(&store));
    let waitlist = WaitlistProcessor::new(Arc::clone(&store));

    let decayed = decay.recompute_decay().await?;
    let expanded = decay.recompute_auto_expansion().await?;
    let promoted = waitlist.process().await?;

    info!(decayed, expanded, promoted, "capacity recalculated");
    println!("decayed={decayed} expanded={expanded} promoted={promoted}");
    Ok(())
}

async fn cmd_expire_corrections(store: Arc<Store>) -> anyhow::Result<()> {
    let now = store.now().await?;
    let expired = store.expire_corrections(now).await?;

    let correction_service = CorrectionService::new(Arc::clone(&store));
    let mut reversed = 0u64;
    for row in &expired {
        correction_service.reverse(row.id).await?;
        reversed += 1;
    }

    let analyzer = CausalAnalyzer::new(Arc::clone(&store));
    let analyzed = analyzer.run().await?;

    info!(reversed, analyzed, "corrections expired and analyzed");
    println!("reversed={reversed} analyzed={analyzed}");
    Ok(())
}

async fn cmd_ingest_replay(store: Arc<Store>, event_id: String, stripe_secret_key: String) -> anyhow::Result<()> {
    let external_event_id = StripeEventId(event_id.clone());
    let event = store
        .in_txn({
            let id = external_event_id.clone();
            move |txn| Box::pin(async move { stripe_event::get_stripe_event(txn, &id).await })
        })
        .await?
        .ok_or_else(|| anyhow::anyhow!("no stripe event found for id {event_id}"))?;

    let processor: Arc<dyn PaymentProcessorApi> = Arc::new(StripeClient::new(stripe_secret_key));
    let worker = StripeEffectWorker::new(Arc::clone(&store), processor);

    // A replay re-drives the effect worker directly against a synthetic row
    // rather than re-appending to the outbox — the original idempotency key
    // is already consumed, and this path is for admin debugging, not
    // at-least-once delivery.
    let synthetic_row = OutboxRow {
        id: OutboxId::new(),
        event_type: "stripe.event_received".to_string(),
        aggregate_type: "stripe_event".to_string(),
        aggregate_id: external_event_id.0.clone(),
        event_version: 1,
        idempotency_key: format!("stripe.event_received:{}:replay", external_event_id.0),
        payload: serde_json::json!({
            "external_event_id": external_event_id.0,
            "event_type": event.event_type,
        }),
        queue: OutboxQueue::CriticalPayments,
        status: OutboxStatus::Pending,
        attempts: 0,
        next_attempt_at: Utc::now(),
        created_at: Utc::now(),
    };

    worker.handle(&synthetic_row).await?;
    info!(event_id = %external_event_id.0, "stripe event replayed");
    println!("replayed {}", external_event_id.0);
    Ok(())
}
