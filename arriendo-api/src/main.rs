use anyhow::Context;
use std::net::SocketAddr;

use arriendo_api::app::{create_cors, AppState};
use arriendo_api::config::{self, database::create_pool, redis::create_client};
use arriendo_api::routes::create_router;
use arriendo_api::setup::run_migrations;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt::init();
    dotenv::dotenv().ok();

    let redis_url = std::env::var("REDIS_URL").context("REDIS_URL must be set")?;
    let client = create_client(&redis_url).context("Invalid REDIS_URL")?;

    let database_url = std::env::var("DATABASE_URL").context("DATABASE_URL must be set")?;
    let pool = create_pool(&database_url, config::db_max_connections())
        .await
        .context("Failed to connect to Postgres")?;

    // Shared migrations (workspace root); embedded at compile time.
    run_migrations(&pool).await.context("Failed to run migrations")?;

    let state = AppState::new(client, pool);
    let app = create_router().layer(create_cors()).with_state(state);

    let addr = SocketAddr::from(([0, 0, 0, 0], config::api_port()));
    tracing::info!("Billing API listening on {}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
