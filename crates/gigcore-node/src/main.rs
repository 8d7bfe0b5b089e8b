//! gigcore-node — the marketplace transactional-core binary.
//!
//! Startup sequence:
//!   1. Open the Postgres pool and run migrations
//!   2. Spawn one outbox dispatcher per queue
//!   3. Spawn the supply-control recompute loop and the correction
//!      causal-impact analyzer loop
//!   4. Serve the HTTP surface (Stripe webhook + admin reads) until killed

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use tracing::{info, warn};

use gigcore_api::{serve, ApiState};
use gigcore_core::model::OutboxQueue;
use gigcore_core::ports::PaymentProcessorApi;
use gigcore_correction::CausalAnalyzer;
use gigcore_escrow::{EscrowRequestEffectWorker, EscrowService};
use gigcore_notify::{AdminBroadcaster, DisputeAdminNotifyEffectWorker, TaskNotificationEffectWorker};
use gigcore_outbox::{CompositeEffectWorker, EffectWorker, OutboxDispatcher};
use gigcore_store::Store;
use gigcore_supply::{DecayEngine, WaitlistProcessor};
use gigcore_webhook::{StripeClient, StripeEffectWorker};

#[derive(Parser, Debug)]
#[command(name = "gigcore-node", version, about = "gigcore marketplace transactional core")]
struct Args {
    /// Postgres connection string.
    #[arg(long, env = "DATABASE_URL")]
    database_url: String,

    /// Pool size.
    #[arg(long, default_value = "10")]
    max_connections: u32,

    /// HTTP listen address for the webhook + admin API surface.
    #[arg(long, default_value = "0.0.0.0:8080")]
    api_addr: SocketAddr,

    /// Stripe secret (API) key, used by the payments effect worker.
    #[arg(long, env = "STRIPE_SECRET_KEY")]
    stripe_secret_key: String,

    /// Stripe webhook signing secret, used to verify inbound events.
    #[arg(long, env = "STRIPE_WEBHOOK_SECRET")]
    stripe_webhook_secret: String,
}

const OUTBOX_BATCH_SIZE: i64 = 32;
const OUTBOX_POLL_INTERVAL: Duration = Duration::from_secs(2);
const SUPPLY_RECOMPUTE_INTERVAL: Duration = Duration::from_secs(5 * 60);
const CORRECTION_ANALYZER_INTERVAL: Duration = Duration::from_secs(10 * 60);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,gigcore=debug".parse().unwrap()),
        )
        .init();

    let args = Args::parse();
    info!("gigcore node starting");

    let store = Arc::new(
        Store::connect(&args.database_url, args.max_connections)
            .await
            .context("connecting to database")?,
    );
    store.migrate().await.context("running migrations")?;

    let escrow = Arc::new(EscrowService::new(Arc::clone(&store)));
    let processor: Arc<dyn PaymentProcessorApi> = Arc::new(StripeClient::new(args.stripe_secret_key.clone()));
    let admin_broadcaster = Arc::new(AdminBroadcaster::new(Arc::clone(&store)));

    // ── Outbox dispatchers, one per queue ────────────────────────────────────
    // `critical_payments` is shared by two owning crates (Stripe ingest
    // effects, dispute-requested escrow transitions), so it fans out through
    // a composite worker rather than two dispatchers racing the same queue.
    let critical_payments = CompositeEffectWorker::new(
        OutboxQueue::CriticalPayments,
        vec![
            Arc::new(StripeEffectWorker::new(Arc::clone(&store), Arc::clone(&processor))) as Arc<dyn EffectWorker>,
            Arc::new(EscrowRequestEffectWorker::new(Arc::clone(&escrow))),
        ],
    );
    let critical_trust = DisputeAdminNotifyEffectWorker::new(Arc::clone(&admin_broadcaster));
    let user_notifications = TaskNotificationEffectWorker::new(Arc::clone(&store));

    tokio::spawn(
        OutboxDispatcher::new(Arc::clone(&store), Arc::new(critical_payments), OUTBOX_BATCH_SIZE, OUTBOX_POLL_INTERVAL)
            .run(),
    );
    tokio::spawn(
        OutboxDispatcher::new(Arc::clone(&store), Arc::new(critical_trust), OUTBOX_BATCH_SIZE, OUTBOX_POLL_INTERVAL).run(),
    );
    tokio::spawn(
        OutboxDispatcher::new(Arc::clone(&store), Arc::new(user_notifications), OUTBOX_BATCH_SIZE, OUTBOX_POLL_INTERVAL)
            .run(),
    );

    // ── Supply-control recompute loop ────────────────────────────────────────
    let decay = DecayEngine::new(Arc::clone(&store));
    let waitlist = WaitlistProcessor::new(Arc::clone(&store));
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(SUPPLY_RECOMPUTE_INTERVAL);
        loop {
            ticker.tick().await;
            if let Err(e) = decay.recompute_decay().await {
                warn!(error = %e, "activity decay recompute failed");
            }
            if let Err(e) = decay.recompute_auto_expansion().await {
                warn!(error = %e, "auto-expansion recompute failed");
            }
            if let Err(e) = waitlist.process().await {
                warn!(error = %e, "waitlist processing failed");
            }
        }
    });

    // ── Correction causal-impact analyzer loop ───────────────────────────────
    let analyzer = CausalAnalyzer::new(Arc::clone(&store));
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(CORRECTION_ANALYZER_INTERVAL);
        loop {
            ticker.tick().await;
            if let Err(e) = analyzer.run().await {
                warn!(error = %e, "causal analyzer run failed");
            }
        }
    });

    // ── HTTP surface ──────────────────────────────────────────────────────────
    let api_state = Arc::new(ApiState {
        store: Arc::clone(&store),
        stripe_webhook_secret: args.stripe_webhook_secret.clone(),
    });
    info!("node ready");
    serve(api_state, args.api_addr).await.context("serving API")?;

    Ok(())
}
