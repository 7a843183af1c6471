//! Application startup: observability, store connection and the ledger service.

use std::sync::Arc;

use service_core::error::AppError;
use service_core::observability::init_tracing;

use crate::config::LedgerConfig;
use crate::services::{init_metrics, LedgerService, PgLedgerStore};

/// Install tracing for this service as configured.
pub fn init_observability(config: &LedgerConfig) -> Result<(), AppError> {
    init_tracing(
        &config.service_name,
        &config.log_level,
        config.otlp_endpoint.as_deref(),
        config.common.log_json,
    )
}

/// Connected store plus the ledger service built on it.
pub struct Application {
    store: Arc<PgLedgerStore>,
    service: LedgerService<PgLedgerStore>,
}

impl Application {
    pub async fn build(config: LedgerConfig) -> Result<Self, AppError> {
        Self::build_internal(config, true).await
    }

    /// Build without running migrations, for databases managed elsewhere.
    pub async fn build_without_migrations(config: LedgerConfig) -> Result<Self, AppError> {
        Self::build_internal(config, false).await
    }

    async fn build_internal(config: LedgerConfig, run_migrations: bool) -> Result<Self, AppError> {
        init_metrics();

        let store = PgLedgerStore::new(
            &config.database.url,
            config.database.max_connections,
            config.database.min_connections,
        )
        .await
        .map_err(|e| {
            tracing::error!(error = %e, "Failed to connect to PostgreSQL");
            e
        })?;

        if run_migrations {
            store.run_migrations().await.map_err(|e| {
                tracing::error!(error = %e, "Failed to run migrations");
                e
            })?;
        }

        let store = Arc::new(store);
        let service = LedgerService::new(Arc::clone(&store), config.engine);

        tracing::info!(
            course_total_hours = %service.config().course_total_hours,
            page_size = service.config().page_size,
            "Flight ledger ready"
        );

        Ok(Self { store, service })
    }

    pub fn service(&self) -> &LedgerService<PgLedgerStore> {
        &self.service
    }

    pub async fn health_check(&self) -> Result<(), AppError> {
        self.store.health_check().await
    }
}
