//! Common test utilities for flight-ledger integration tests.

#![allow(dead_code)]

use std::str::FromStr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, Once};

use async_trait::async_trait;
use chrono::NaiveDate;
use flight_ledger::config::EngineConfig;
use flight_ledger::models::{Client, FlightRecord, Invoice, InvoiceLineItem};
use flight_ledger::services::{DateRange, InvoiceFilter, LedgerService, LedgerStore};
use rust_decimal::Decimal;
use service_core::error::AppError;
use uuid::Uuid;

static INIT: Once = Once::new();

/// Initialize tracing for tests (only once).
pub fn init_tracing() {
    INIT.call_once(|| {
        tracing_subscriber::fmt()
            .with_env_filter("info,flight_ledger=debug")
            .with_test_writer()
            .try_init()
            .ok();
    });
}

/// Page cap of the source system's store.
pub const STORE_PAGE_CAP: usize = 1000;

pub fn as_of() -> NaiveDate {
    date(2025, 6, 30)
}

pub fn date(year: i32, month: u32, day: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(year, month, day).expect("valid date")
}

pub fn hours(value: &str) -> Decimal {
    Decimal::from_str(value).expect("valid decimal")
}

/// In-memory store that behaves like the paged source system: stable
/// ordering, a hard page cap, and optional failure injection.
#[derive(Default)]
pub struct InMemoryStore {
    clients: Vec<Client>,
    invoices: Vec<Invoice>,
    flights: Vec<FlightRecord>,
    page_cap: usize,
    ignore_limit: bool,
    fail_at: Mutex<Option<(&'static str, usize)>>,
    calls: AtomicUsize,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self {
            page_cap: STORE_PAGE_CAP,
            ..Self::default()
        }
    }

    pub fn with_clients(mut self, clients: Vec<Client>) -> Self {
        self.clients = clients;
        self.clients.sort_by_key(|c| c.client_id);
        self
    }

    pub fn with_invoices(mut self, invoices: Vec<Invoice>) -> Self {
        self.invoices = invoices;
        self.invoices
            .sort_by(|a, b| (a.issue_date, a.invoice_id).cmp(&(b.issue_date, b.invoice_id)));
        self
    }

    pub fn with_flights(mut self, flights: Vec<FlightRecord>) -> Self {
        self.flights = flights;
        self.flights
            .sort_by(|a, b| (a.flight_date, a.flight_id).cmp(&(b.flight_date, b.flight_id)));
        self
    }

    pub fn with_page_cap(mut self, cap: usize) -> Self {
        self.page_cap = cap;
        self
    }

    /// Return a full capped page whatever limit was asked for.
    pub fn ignoring_limit(mut self) -> Self {
        self.ignore_limit = true;
        self
    }

    /// Fail the first request for `resource` at or beyond `offset`.
    pub fn fail_at(self, resource: &'static str, offset: usize) -> Self {
        *self.fail_at.lock().expect("lock") = Some((resource, offset));
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn page<T: Clone>(
        &self,
        resource: &'static str,
        rows: Vec<&T>,
        offset: usize,
        limit: usize,
    ) -> Result<Vec<T>, AppError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some((failing, at)) = *self.fail_at.lock().expect("lock") {
            if failing == resource && offset >= at {
                return Err(AppError::DatabaseError(anyhow::anyhow!(
                    "connection reset while reading {}",
                    resource
                )));
            }
        }
        let take = if self.ignore_limit {
            self.page_cap
        } else {
            limit.min(self.page_cap)
        };
        Ok(rows.into_iter().skip(offset).take(take).cloned().collect())
    }
}

#[async_trait]
impl LedgerStore for InMemoryStore {
    fn max_page_size(&self) -> usize {
        self.page_cap
    }

    async fn get_client(&self, client_id: Uuid) -> Result<Option<Client>, AppError> {
        Ok(self.clients.iter().find(|c| c.client_id == client_id).cloned())
    }

    async fn list_clients(&self, offset: usize, limit: usize) -> Result<Vec<Client>, AppError> {
        self.page("clients", self.clients.iter().collect(), offset, limit)
    }

    async fn list_invoices(
        &self,
        filter: &InvoiceFilter,
        offset: usize,
        limit: usize,
    ) -> Result<Vec<Invoice>, AppError> {
        let rows = self.invoices.iter().filter(|i| filter.matches(i)).collect();
        self.page("invoices", rows, offset, limit)
    }

    async fn list_flight_records(
        &self,
        range: &DateRange,
        offset: usize,
        limit: usize,
    ) -> Result<Vec<FlightRecord>, AppError> {
        let rows = self
            .flights
            .iter()
            .filter(|f| range.contains(f.flight_date))
            .collect();
        self.page("flight_records", rows, offset, limit)
    }
}

pub fn service(store: InMemoryStore) -> (Arc<InMemoryStore>, LedgerService<InMemoryStore>) {
    service_with(store, EngineConfig::default())
}

pub fn service_with(
    store: InMemoryStore,
    config: EngineConfig,
) -> (Arc<InMemoryStore>, LedgerService<InMemoryStore>) {
    init_tracing();
    let store = Arc::new(store);
    (Arc::clone(&store), LedgerService::new(store, config))
}

// =========================================================================
// Fixture builders
// =========================================================================

pub fn client(name: &str) -> Client {
    Client {
        client_id: Uuid::new_v4(),
        display_name: name.to_string(),
        email: format!("{}@aeroclub.example", name.to_lowercase().replace(' ', ".")),
    }
}

pub struct InvoiceBuilder {
    invoice: Invoice,
}

impl InvoiceBuilder {
    pub fn new(client_id: Option<Uuid>, issue_date: NaiveDate) -> Self {
        Self {
            invoice: Invoice {
                invoice_id: Uuid::new_v4(),
                client_id,
                issue_date,
                status: "paid".to_string(),
                line_items: vec![],
            },
        }
    }

    pub fn for_client(client: &Client, issue_date: NaiveDate) -> Self {
        Self::new(Some(client.client_id), issue_date)
    }

    pub fn status(mut self, status: &str) -> Self {
        self.invoice.status = status.to_string();
        self
    }

    pub fn invoice_id(mut self, invoice_id: Uuid) -> Self {
        self.invoice.invoice_id = invoice_id;
        for item in &mut self.invoice.line_items {
            item.invoice_id = invoice_id;
        }
        self
    }

    pub fn line(
        mut self,
        name: &str,
        description: &str,
        unit: &str,
        quantity: &str,
        total: &str,
    ) -> Self {
        let quantity = hours(quantity);
        let total = hours(total);
        let unit_price = if quantity.is_zero() { total } else { total / quantity };
        self.invoice.line_items.push(InvoiceLineItem {
            invoice_id: self.invoice.invoice_id,
            line_number: self.invoice.line_items.len() as i32 + 1,
            name: name.to_string(),
            description: description.to_string(),
            quantity,
            unit: unit.to_string(),
            unit_price,
            total,
            currency: "EUR".to_string(),
        });
        self
    }

    /// An hour block billed in `HUR`.
    pub fn hour_block(self, quantity: &str) -> Self {
        let total = (hours(quantity) * Decimal::from(150)).to_string();
        self.line("Ore zbor C152", "", "HUR", quantity, &total)
    }

    /// One course installment billed as a single piece.
    pub fn course(self, description: &str, total: &str) -> Self {
        self.line("Curs PPL(A)", description, "BUC", "1", total)
    }

    pub fn build(self) -> Invoice {
        self.invoice
    }
}

pub fn flight(
    pilot: Option<&Client>,
    payer: Option<&Client>,
    total_hours: &str,
    flight_type: &str,
    flight_date: NaiveDate,
) -> FlightRecord {
    FlightRecord {
        flight_id: Uuid::new_v4(),
        pilot_id: pilot.map(|c| c.client_id),
        instructor_id: None,
        payer_id: payer.map(|c| c.client_id),
        flight_date,
        total_hours: hours(total_hours),
        flight_type: flight_type.to_string(),
    }
}

/// `count` one-hour training flights for `pilot`, spread over 2024-2025.
pub fn training_flights(pilot: &Client, count: usize) -> Vec<FlightRecord> {
    (0..count)
        .map(|i| {
            let day = date(2024, 1, 1) + chrono::Duration::days((i % 540) as i64);
            flight(Some(pilot), None, "1", "TRAINING", day)
        })
        .collect()
}
