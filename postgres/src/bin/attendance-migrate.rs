//! Applies the attendance schema to the configured database.
//!
//! Reads `DATABASE_*` variables (and a `.env` file, if present).

use attendance_postgres::{PostgresAttendanceStore, PostgresConfig};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let _ = dotenvy::dotenv();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,sqlx=warn".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = PostgresConfig::from_env();
    tracing::info!(max_connections = config.max_connections, "Running attendance migrations");

    let store = PostgresAttendanceStore::connect(&config).await?;
    let result = store.migrate().await;
    store.close().await;
    result?;

    tracing::info!("Attendance schema is up to date");
    Ok(())
}
