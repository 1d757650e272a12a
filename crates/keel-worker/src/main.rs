//! Keel worker entry point.
//!
//! Applies migrations, recovers checkouts interrupted by a previous crash,
//! then audits committed events until interrupted.

use keel_worker::audit::run_audit;
use keel_worker::config::WorkerConfig;
use keel_worker::error::AppError;
use keel_worker::state::WorkerState;
use sqlx::postgres::PgPoolOptions;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), AppError> {
    // Initialize tracing subscriber.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .json()
        .init();

    tracing::info!("Starting keel worker");

    let config = WorkerConfig::from_env()?;

    let pool = PgPoolOptions::new()
        .max_connections(config.database_max_connections)
        .connect(&config.database_url)
        .await?;
    sqlx::migrate!("../../migrations").run(&pool).await?;

    let state = WorkerState::postgres(&pool, &config);

    let recovered = state.checkout.recover().await?;
    for saga in &recovered {
        tracing::warn!(
            saga_id = %saga.saga_id,
            interrupted_step = saga.interrupted_step,
            compensated = ?saga.compensated_steps,
            "recovered interrupted checkout"
        );
    }
    tracing::info!(count = recovered.len(), "saga recovery finished");

    let audit = tokio::spawn(run_audit(state.events.subscribe(None)));

    tokio::signal::ctrl_c().await?;
    tracing::info!("Shutting down keel worker");

    audit.abort();
    pool.close().await;

    Ok(())
}
