//! Flight Ledger entry point: recomputes the population ledger once and logs
//! its aggregate statistics.

use chrono::Utc;
use flight_ledger::config::LedgerConfig;
use flight_ledger::models::PopulationQuery;
use flight_ledger::startup::{init_observability, Application};

#[tokio::main]
async fn main() -> std::io::Result<()> {
    let config = LedgerConfig::from_env().map_err(|e| {
        eprintln!("Failed to load configuration: {}", e);
        std::io::Error::other(format!("Configuration error: {}", e))
    })?;

    init_observability(&config).map_err(|e| {
        eprintln!("Failed to initialize tracing: {}", e);
        std::io::Error::other(format!("Tracing error: {}", e))
    })?;

    tracing::info!(
        service_name = %config.service_name,
        version = %config.service_version,
        environment = %config.common.environment,
        db_max_connections = %config.database.max_connections,
        db_min_connections = %config.database.min_connections,
        "Configuration loaded"
    );

    let app = Application::build(config).await.map_err(|e| {
        tracing::error!(error = %e, "Failed to build application");
        std::io::Error::other(format!("Application build error: {}", e))
    })?;

    let as_of = Utc::now().date_naive();
    let ledger = app
        .service()
        .get_population_ledger(&PopulationQuery::default(), as_of)
        .await
        .map_err(|e| {
            tracing::error!(error = %e, kind = e.kind(), "Population ledger failed");
            std::io::Error::other(format!("Ledger error: {}", e))
        })?;

    let stats = &ledger.aggregate_stats;
    tracing::info!(
        %as_of,
        clients = stats.client_count,
        purchased = %stats.total_purchased_hours,
        flown = %stats.total_flown_hours,
        chartered = %stats.total_chartered_hours,
        remaining = %stats.total_remaining_hours,
        low_balance = stats.low_balance_clients,
        overdrawn = stats.overdrawn_clients,
        unattributed_records = ledger.notes.len(),
        "Population ledger"
    );

    Ok(())
}
