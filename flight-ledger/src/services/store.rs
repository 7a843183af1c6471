//! Read-only retrieval interface the ledger is computed from.

use async_trait::async_trait;
use chrono::NaiveDate;
use service_core::error::AppError;
use uuid::Uuid;

use crate::config::DEFAULT_PAGE_SIZE;
use crate::models::{Client, FlightRecord, Invoice, InvoiceStatus};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InvoiceFilter {
    /// `None` lists invoices of every client, unlinked ones included.
    pub client_id: Option<Uuid>,
    /// Empty means any status.
    pub statuses: Vec<InvoiceStatus>,
}

impl InvoiceFilter {
    pub fn matches(&self, invoice: &Invoice) -> bool {
        if self.client_id.is_some() && invoice.client_id != self.client_id {
            return false;
        }
        self.statuses.is_empty()
            || invoice
                .parsed_status()
                .is_some_and(|status| self.statuses.contains(&status))
    }
}

/// Inclusive flight-date window; open on either side when `None`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DateRange {
    pub start: Option<NaiveDate>,
    pub end: Option<NaiveDate>,
}

impl DateRange {
    pub fn contains(&self, date: NaiveDate) -> bool {
        self.start.is_none_or(|start| date >= start) && self.end.is_none_or(|end| date <= end)
    }
}

/// Backing store of clients, invoices and flight records.
///
/// List methods page by `offset`/`limit` over a stable ordering and may
/// return at most [`LedgerStore::max_page_size`] rows per call.
#[async_trait]
pub trait LedgerStore: Send + Sync {
    fn max_page_size(&self) -> usize {
        DEFAULT_PAGE_SIZE
    }

    async fn get_client(&self, client_id: Uuid) -> Result<Option<Client>, AppError>;

    /// Ordered by `client_id`.
    async fn list_clients(&self, offset: usize, limit: usize) -> Result<Vec<Client>, AppError>;

    /// Ordered by `issue_date, invoice_id`, line items attached.
    async fn list_invoices(
        &self,
        filter: &InvoiceFilter,
        offset: usize,
        limit: usize,
    ) -> Result<Vec<Invoice>, AppError>;

    /// Ordered by `flight_date, flight_id`.
    async fn list_flight_records(
        &self,
        range: &DateRange,
        offset: usize,
        limit: usize,
    ) -> Result<Vec<FlightRecord>, AppError>;
}
