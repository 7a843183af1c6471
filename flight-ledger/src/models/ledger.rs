//! Derived ledger views: per-client summaries and population reports.

use chrono::{Datelike, NaiveDate};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::client::Client;
use super::package::PackageUsage;

/// Which calendar-year sub-total a flight falls into, relative to `as_of`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum YearBucket {
    Current,
    Previous,
    Older,
}

impl YearBucket {
    /// Dates after `as_of`'s year count as current.
    pub fn for_date(date: NaiveDate, as_of: NaiveDate) -> Self {
        let year = as_of.year();
        match date.year() {
            y if y >= year => Self::Current,
            y if y == year - 1 => Self::Previous,
            _ => Self::Older,
        }
    }
}

/// Hours in one category, with current/previous calendar-year splits.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CategoryTotal {
    pub total: Decimal,
    pub current_year: Decimal,
    pub previous_year: Decimal,
}

impl CategoryTotal {
    pub fn add(&mut self, hours: Decimal, bucket: YearBucket) {
        self.total += hours;
        match bucket {
            YearBucket::Current => self.current_year += hours,
            YearBucket::Previous => self.previous_year += hours,
            YearBucket::Older => {}
        }
    }

    pub fn merge(&mut self, other: &CategoryTotal) {
        self.total += other.total;
        self.current_year += other.current_year;
        self.previous_year += other.previous_year;
    }
}

/// Flown-hour categories for one client.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FlightTotals {
    /// Own-funded hours excluding ferry and demo flights.
    pub regular: CategoryTotal,
    pub ferry: CategoryTotal,
    pub demo: CategoryTotal,
    /// Hours this client flew that were charter-tagged or paid by someone else.
    pub charter: CategoryTotal,
    /// Hours someone else flew that this client paid for.
    pub chartered: CategoryTotal,
}

impl FlightTotals {
    pub fn merge(&mut self, other: &FlightTotals) {
        self.regular.merge(&other.regular);
        self.ferry.merge(&other.ferry);
        self.demo.merge(&other.demo);
        self.charter.merge(&other.charter);
        self.chartered.merge(&other.chartered);
    }

    /// Hours charged against this client's purchased balance.
    pub fn charged_hours(&self) -> Decimal {
        self.regular.total + self.chartered.total
    }
}

/// Identifies the source record a note is about.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "record", rename_all = "snake_case")]
pub enum RecordRef {
    Invoice { invoice_id: Uuid },
    LineItem { invoice_id: Uuid, line_number: i32 },
    Flight { flight_id: Uuid },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NoteKind {
    UnparseableTranche,
    InvalidTranche,
    MissingClientLinkage,
    NonPositiveQuantity,
    NegativeFlightHours,
}

impl NoteKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::UnparseableTranche => "unparseable_tranche",
            Self::InvalidTranche => "invalid_tranche",
            Self::MissingClientLinkage => "missing_client_linkage",
            Self::NonPositiveQuantity => "non_positive_quantity",
            Self::NegativeFlightHours => "negative_flight_hours",
        }
    }
}

/// A recoverable problem with one source record. The record was skipped.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessingNote {
    pub record: RecordRef,
    pub kind: NoteKind,
    pub detail: String,
}

impl ProcessingNote {
    pub fn new(record: RecordRef, kind: NoteKind, detail: impl Into<String>) -> Self {
        Self {
            record,
            kind,
            detail: detail.into(),
        }
    }
}

/// The recomputed ledger for one client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LedgerSummary {
    pub client: Client,
    pub total_purchased_hours: Decimal,
    /// Part of `total_purchased_hours` that came from course tranches.
    pub total_course_hours: Decimal,
    pub total_flown_hours: Decimal,
    pub total_ferry_hours: Decimal,
    pub total_chartered_hours: Decimal,
    pub total_charter_hours: Decimal,
    pub total_demo_hours: Decimal,
    pub total_remaining_hours: Decimal,
    pub flight_totals: FlightTotals,
    pub packages: Vec<PackageUsage>,
    pub notes: Vec<ProcessingNote>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortKey {
    #[default]
    Name,
    Purchased,
    Flown,
    Remaining,
}

impl SortKey {
    pub fn from_string(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "name" => Some(Self::Name),
            "purchased" | "purchased_hours" => Some(Self::Purchased),
            "flown" | "flown_hours" => Some(Self::Flown),
            "remaining" | "remaining_hours" => Some(Self::Remaining),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortOrder {
    #[default]
    Asc,
    Desc,
}

/// Page request for the population ledger.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PopulationQuery {
    /// 1-based.
    pub page: usize,
    pub page_size: usize,
    pub search: Option<String>,
    pub sort_by: SortKey,
    pub sort_order: SortOrder,
}

impl Default for PopulationQuery {
    fn default() -> Self {
        Self {
            page: 1,
            page_size: 20,
            search: None,
            sort_by: SortKey::Name,
            sort_order: SortOrder::Asc,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pagination {
    pub total: usize,
    pub page: usize,
    pub page_size: usize,
    pub total_pages: usize,
}

/// Totals over the whole filtered population, independent of the page.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AggregateStats {
    pub client_count: usize,
    pub total_purchased_hours: Decimal,
    pub total_course_hours: Decimal,
    pub total_flown_hours: Decimal,
    pub total_ferry_hours: Decimal,
    pub total_chartered_hours: Decimal,
    pub total_charter_hours: Decimal,
    pub total_demo_hours: Decimal,
    pub total_remaining_hours: Decimal,
    pub flight_totals: FlightTotals,
    pub low_balance_clients: usize,
    pub overdrawn_clients: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PopulationLedger {
    pub clients: Vec<LedgerSummary>,
    pub pagination: Pagination,
    pub aggregate_stats: AggregateStats,
    /// Records that could not be attributed to any client.
    pub notes: Vec<ProcessingNote>,
}
