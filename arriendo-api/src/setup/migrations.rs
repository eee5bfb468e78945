use sqlx::Pool;
use sqlx::Postgres;

/// Run database migrations and verify the billing tables exist
pub async fn run_migrations(pool: &Pool<Postgres>) -> Result<(), sqlx::migrate::MigrateError> {
    if let Err(e) = sqlx::migrate!("../sqlx-migrations").run(pool).await {
        // Migrations may have been applied by the finops service first.
        tracing::warn!("migration error (safe to ignore if already applied): {}", e);

        let tables_exist: bool = sqlx::query_scalar(
            "SELECT EXISTS(SELECT 1 FROM information_schema.tables WHERE table_name = 'pagos_mensuales')",
        )
        .fetch_one(pool)
        .await
        .unwrap_or(false);

        if !tables_exist {
            tracing::error!("table 'pagos_mensuales' does not exist - migrations must be applied");
            return Err(e);
        }
        tracing::info!("billing tables exist - continuing despite migration error");
    }

    Ok(())
}
