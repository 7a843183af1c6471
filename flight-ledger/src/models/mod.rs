//! Domain models for flight-ledger.

mod client;
mod flight;
mod invoice;
mod ledger;
mod package;

pub use client::Client;
pub use flight::{FlightRecord, FlightTag};
pub use invoice::{Invoice, InvoiceLineItem, InvoiceStatus};
pub use ledger::{
    AggregateStats, CategoryTotal, FlightTotals, LedgerSummary, NoteKind, Pagination,
    PopulationLedger, PopulationQuery, ProcessingNote, RecordRef, SortKey, SortOrder, YearBucket,
};
pub use package::{
    CourseTranche, HourPackage, PackageDrilldown, PackageSource, PackageStatus, PackageUsage,
};
