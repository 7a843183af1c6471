//! PostgreSQL-backed ledger store.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use service_core::error::AppError;
use sqlx::postgres::{PgPool, PgPoolOptions};
use tracing::{debug, info, instrument};
use uuid::Uuid;

use crate::models::{Client, FlightRecord, Invoice, InvoiceLineItem};
use crate::services::metrics::DB_QUERY_DURATION;
use crate::services::store::{DateRange, InvoiceFilter, LedgerStore};

#[derive(Clone)]
pub struct PgLedgerStore {
    pool: PgPool,
}

impl PgLedgerStore {
    #[instrument(skip(database_url), fields(service = "flight-ledger"))]
    pub async fn new(
        database_url: &str,
        max_connections: u32,
        min_connections: u32,
    ) -> Result<Self, AppError> {
        info!(
            max_connections = max_connections,
            min_connections = min_connections,
            "Connecting to PostgreSQL"
        );

        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .min_connections(min_connections)
            .acquire_timeout(Duration::from_secs(30))
            .idle_timeout(Duration::from_secs(600))
            .connect(database_url)
            .await
            .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to connect: {}", e)))?;

        info!("PostgreSQL connection pool established");

        Ok(Self { pool })
    }

    pub fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    #[instrument(skip(self))]
    pub async fn health_check(&self) -> Result<(), AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["health_check"])
            .start_timer();

        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Health check failed: {}", e)))?;

        timer.observe_duration();
        Ok(())
    }

    #[instrument(skip(self))]
    pub async fn run_migrations(&self) -> Result<(), AppError> {
        info!("Running database migrations");
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Migration failed: {}", e)))?;
        info!("Database migrations completed");
        Ok(())
    }

    /// Line items of the given invoices, grouped by invoice in line order.
    async fn line_items_for(
        &self,
        invoice_ids: &[Uuid],
    ) -> Result<HashMap<Uuid, Vec<InvoiceLineItem>>, AppError> {
        if invoice_ids.is_empty() {
            return Ok(HashMap::new());
        }

        let timer = DB_QUERY_DURATION
            .with_label_values(&["list_line_items"])
            .start_timer();

        let items = sqlx::query_as::<_, InvoiceLineItem>(
            r#"
            SELECT invoice_id, line_number, name, COALESCE(description, '') AS description,
                   quantity, unit, unit_price, total, currency
            FROM invoice_line_items
            WHERE invoice_id = ANY($1)
            ORDER BY invoice_id, line_number
            "#,
        )
        .bind(invoice_ids)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to list line items: {}", e)))?;

        timer.observe_duration();

        let mut grouped: HashMap<Uuid, Vec<InvoiceLineItem>> = HashMap::new();
        for item in items {
            grouped.entry(item.invoice_id).or_default().push(item);
        }
        Ok(grouped)
    }
}

fn window(offset: usize, limit: usize) -> Result<(i64, i64), AppError> {
    let offset = i64::try_from(offset)
        .map_err(|_| AppError::BadRequest(anyhow::anyhow!("Offset out of range")))?;
    let limit = i64::try_from(limit)
        .map_err(|_| AppError::BadRequest(anyhow::anyhow!("Limit out of range")))?;
    Ok((offset, limit))
}

#[async_trait]
impl LedgerStore for PgLedgerStore {
    #[instrument(skip(self), fields(client_id = %client_id))]
    async fn get_client(&self, client_id: Uuid) -> Result<Option<Client>, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["get_client"])
            .start_timer();

        let client = sqlx::query_as::<_, Client>(
            r#"
            SELECT client_id, display_name, email
            FROM clients
            WHERE client_id = $1
            "#,
        )
        .bind(client_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to get client: {}", e)))?;

        timer.observe_duration();
        Ok(client)
    }

    #[instrument(skip(self))]
    async fn list_clients(&self, offset: usize, limit: usize) -> Result<Vec<Client>, AppError> {
        let (offset, limit) = window(offset, limit)?;
        let timer = DB_QUERY_DURATION
            .with_label_values(&["list_clients"])
            .start_timer();

        let clients = sqlx::query_as::<_, Client>(
            r#"
            SELECT client_id, display_name, email
            FROM clients
            ORDER BY client_id
            LIMIT $1 OFFSET $2
            "#,
        )
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to list clients: {}", e)))?;

        timer.observe_duration();
        Ok(clients)
    }

    #[instrument(skip(self, filter), fields(client_id = ?filter.client_id))]
    async fn list_invoices(
        &self,
        filter: &InvoiceFilter,
        offset: usize,
        limit: usize,
    ) -> Result<Vec<Invoice>, AppError> {
        let (offset, limit) = window(offset, limit)?;
        let statuses: Vec<String> = filter
            .statuses
            .iter()
            .map(|s| s.as_str().to_string())
            .collect();

        let timer = DB_QUERY_DURATION
            .with_label_values(&["list_invoices"])
            .start_timer();

        let mut invoices = sqlx::query_as::<_, Invoice>(
            r#"
            SELECT invoice_id, client_id, issue_date, status
            FROM invoices
            WHERE ($1::uuid IS NULL OR client_id = $1)
              AND (cardinality($2::text[]) = 0 OR lower(status) = ANY($2))
            ORDER BY issue_date, invoice_id
            LIMIT $3 OFFSET $4
            "#,
        )
        .bind(filter.client_id)
        .bind(&statuses[..])
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to list invoices: {}", e)))?;

        timer.observe_duration();

        let ids: Vec<Uuid> = invoices.iter().map(|i| i.invoice_id).collect();
        let mut items = self.line_items_for(&ids).await?;
        for invoice in &mut invoices {
            invoice.line_items = items.remove(&invoice.invoice_id).unwrap_or_default();
        }

        debug!(count = invoices.len(), "Listed invoices");
        Ok(invoices)
    }

    #[instrument(skip(self))]
    async fn list_flight_records(
        &self,
        range: &DateRange,
        offset: usize,
        limit: usize,
    ) -> Result<Vec<FlightRecord>, AppError> {
        let (offset, limit) = window(offset, limit)?;
        let timer = DB_QUERY_DURATION
            .with_label_values(&["list_flight_records"])
            .start_timer();

        let records = sqlx::query_as::<_, FlightRecord>(
            r#"
            SELECT flight_id, pilot_id, instructor_id, payer_id, flight_date, total_hours,
                   COALESCE(flight_type, '') AS flight_type
            FROM flight_records
            WHERE ($1::date IS NULL OR flight_date >= $1)
              AND ($2::date IS NULL OR flight_date <= $2)
            ORDER BY flight_date, flight_id
            LIMIT $3 OFFSET $4
            "#,
        )
        .bind(range.start)
        .bind(range.end)
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to list flight records: {}", e))
        })?;

        timer.observe_duration();
        Ok(records)
    }
}
