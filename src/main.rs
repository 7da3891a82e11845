use std::sync::Arc;

use anyhow::Context;
use tracing_subscriber::prelude::*;
use tracing_subscriber::{EnvFilter, fmt};

use fitcraft::billing::{
    BillingRouteState, CheckoutService, PaymentProvider, StripeClient, SubscriptionSync,
    WebhookHandler, WebhookVerifier, parse_schedule, spawn_sync_ticker,
};
use fitcraft::config::AppConfig;
use fitcraft::http::build_router;
use fitcraft::llm::create_provider;
use fitcraft::onboarding::{CoachRouteState, TurnProcessor};
use fitcraft::store;
use fitcraft::workouts::{WorkoutGenerator, WorkoutRouteState};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = AppConfig::from_env().context("Failed to load configuration")?;

    // Keep the guard alive so buffered file logs are flushed on exit.
    let (file_layer, _log_guard) = match &config.log_dir {
        Some(dir) => {
            let (writer, guard) =
                tracing_appender::non_blocking(tracing_appender::rolling::daily(dir, "fitcraft.log"));
            (
                Some(fmt::layer().with_writer(writer).with_ansi(false)),
                Some(guard),
            )
        }
        None => (None, None),
    };
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(fmt::layer().with_target(false))
        .with(file_layer)
        .init();

    tracing::info!(version = env!("CARGO_PKG_VERSION"), port = config.port, "FitCraft starting");

    let client = reqwest::Client::new();
    let db = store::open(&config.storage, client.clone())
        .await
        .context("Failed to open storage")?;
    let llm = create_provider(&config.llm)?;

    let coach = CoachRouteState {
        processor: Arc::new(TurnProcessor::new(
            db.clone(),
            llm.clone(),
            config.coach.clone(),
        )),
    };
    let workouts = WorkoutRouteState {
        generator: Arc::new(WorkoutGenerator::new(
            db.clone(),
            llm,
            config.workout.clone(),
        )),
    };

    // ── Billing ──────────────────────────────────────────────────────────
    let mut _sync_handle = None;
    let billing = match &config.payment {
        Some(payment) => {
            let payments: Arc<dyn PaymentProvider> = Arc::new(StripeClient::new(
                client.clone(),
                payment.api_base.clone(),
                payment.secret_key.clone(),
            ));
            let webhook = match &payment.webhook_secret {
                Some(secret) => Some(Arc::new(WebhookHandler::new(
                    db.clone(),
                    payments.clone(),
                    WebhookVerifier::new(secret.clone(), payment.webhook_tolerance),
                ))),
                None => {
                    tracing::warn!("STRIPE_WEBHOOK_SECRET not set; webhooks will be rejected");
                    None
                }
            };
            let sync = Arc::new(SubscriptionSync::new(
                db.clone(),
                payments.clone(),
                config.sync.clone(),
            ));
            if config.sync.enabled {
                let schedule = parse_schedule(&config.sync.schedule)?;
                tracing::info!(schedule = %config.sync.schedule, "Subscription sync scheduled");
                _sync_handle = Some(spawn_sync_ticker(sync.clone(), schedule));
            }
            Some(BillingRouteState {
                checkout: Arc::new(CheckoutService::new(db.clone(), payments)),
                sync,
                webhook,
            })
        }
        None => {
            tracing::warn!("STRIPE_SECRET_KEY not set; subscription routes disabled");
            None
        }
    };

    let app = build_router(coach, workouts, billing);
    let listener = tokio::net::TcpListener::bind(("0.0.0.0", config.port))
        .await
        .with_context(|| format!("Failed to bind port {}", config.port))?;
    tracing::info!(port = config.port, "HTTP server listening");
    axum::serve(listener, app).await?;
    Ok(())
}
