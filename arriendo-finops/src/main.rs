use anyhow::Context;
use chrono::Utc;
use futures_util::StreamExt;
use sqlx::{postgres::PgPoolOptions, Pool, Postgres};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tracing::{error, info, warn};

use axum::{routing::get, Router};

use arriendo_common::bus::{
    BillingCommand, BillingEventEnvelope, BillingEventType, CommandType, CHANNEL_BILLING_COMMANDS,
    CHANNEL_BILLING_EVENTS,
};
use arriendo_finops::jobs;
use arriendo_finops::settings::FinopsSettings;

struct AppState {
    db: Pool<Postgres>,
    redis_client: redis::Client,
    settings: FinopsSettings,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt::init();
    dotenv::dotenv().ok();

    let settings = FinopsSettings::from_env()?;
    let pool = PgPoolOptions::new()
        .max_connections(settings.max_connections)
        .connect(&settings.database_url)
        .await
        .context("Failed to connect to Postgres")?;

    // Shared migrations (workspace root)
    sqlx::migrate!("../sqlx-migrations")
        .run(&pool)
        .await
        .context("Failed to run migrations")?;

    let redis_client = redis::Client::open(settings.redis_url.as_str())?;
    let state = Arc::new(AppState {
        db: pool,
        redis_client,
        settings,
    });

    // Nightly reconciliation + overdue sweep
    {
        let state = state.clone();
        tokio::spawn(async move {
            loop {
                jobs::sleep_until_next_run(state.settings.reconcile_hour_utc).await;
                if let Err(e) = jobs::run_nightly(
                    &state.db,
                    Some(&state.redis_client),
                    state.settings.grace_days,
                    state.settings.concurrency,
                )
                .await
                {
                    error!("nightly reconciliation failed: {:?}", e);
                }
            }
        });
    }

    // On-demand reconciliation (CMD:RECONCILE)
    {
        let state = state.clone();
        tokio::spawn(async move {
            if let Err(e) = run_cmd_consumer(&state).await {
                error!("billing cmd consumer stopped: {:?}", e);
            }
        });
    }

    // A server leaving `running` is reconciled right away.
    {
        let state = state.clone();
        tokio::spawn(async move {
            if let Err(e) = run_billing_events_consumer(&state).await {
                error!("billing events consumer stopped: {:?}", e);
            }
        });
    }

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let app = Router::new().route("/health", get(health)).layer(cors);

    let addr = std::net::SocketAddr::from(([0, 0, 0, 0], state.settings.port));
    info!("FinOps service listening on {}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

async fn health() -> &'static str {
    "ok"
}

async fn reconcile_one(state: &AppState, server_id: uuid::Uuid) {
    match jobs::reconcile_server(&state.db, server_id, Utc::now()).await {
        Ok(outcome) if !outcome.is_noop() => {
            jobs::publish_changes(Some(&state.redis_client), &outcome).await;
            arriendo_finops::logger::log_quick(
                &state.db,
                "RECONCILE_SERVER",
                "success",
                Some(server_id),
                Some(jobs::outcome_metadata(&outcome)),
            )
            .await;
        }
        Ok(_) => {}
        Err(e) => warn!("reconciliation of {} skipped: {}", server_id, e),
    }
}

async fn run_cmd_consumer(state: &AppState) -> anyhow::Result<()> {
    let mut pubsub = state.redis_client.get_async_pubsub().await?;
    pubsub.subscribe(CHANNEL_BILLING_COMMANDS).await?;
    info!("FinOps listening on Redis channel '{}'...", CHANNEL_BILLING_COMMANDS);

    let mut stream = pubsub.on_message();
    while let Some(msg) = stream.next().await {
        let payload: String = msg.get_payload()?;
        let Ok(cmd) = serde_json::from_str::<BillingCommand>(&payload) else {
            warn!("ignoring malformed billing command: {}", payload);
            continue;
        };
        match (cmd.command_type, cmd.server_id) {
            (CommandType::Reconcile, Some(server_id)) => reconcile_one(state, server_id).await,
            (CommandType::Reconcile, None) => {
                if let Err(e) = jobs::reconcile_all(
                    &state.db,
                    Some(&state.redis_client),
                    Utc::now(),
                    state.settings.concurrency,
                )
                .await
                {
                    error!("on-demand reconciliation failed: {:?}", e);
                }
            }
        }
    }

    Ok(())
}

async fn run_billing_events_consumer(state: &AppState) -> anyhow::Result<()> {
    let mut pubsub = state.redis_client.get_async_pubsub().await?;
    pubsub.subscribe(CHANNEL_BILLING_EVENTS).await?;
    info!("FinOps listening on Redis channel '{}'...", CHANNEL_BILLING_EVENTS);

    let mut stream = pubsub.on_message();
    while let Some(msg) = stream.next().await {
        let payload: String = msg.get_payload()?;
        let Ok(evt) = serde_json::from_str::<BillingEventEnvelope>(&payload) else {
            continue;
        };
        if evt.event_type != BillingEventType::ServerAccrualStop {
            continue;
        }
        if let Some(server_id) = evt.server_id() {
            reconcile_one(state, server_id).await;
        }
    }

    Ok(())
}
