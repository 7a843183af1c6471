//! Services module for flight-ledger.

pub mod aggregator;
pub mod allocation;
pub mod classifier;
pub mod database;
pub mod fifo;
pub mod ledger;
pub mod metrics;
pub mod reconciler;
pub mod retriever;
pub mod store;
pub mod tranche;

pub use aggregator::{aggregate, FlightAggregation};
pub use allocation::{CourseAllocationCalculator, TrancheAllocation, TrancheBands};
pub use classifier::{LineItemClassifier, LineKind};
pub use database::PgLedgerStore;
pub use ledger::LedgerService;
pub use metrics::{get_metrics, init_metrics};
pub use reconciler::LedgerReconciler;
pub use retriever::BulkRetriever;
pub use store::{DateRange, InvoiceFilter, LedgerStore};
pub use tranche::{TrancheDescriptor, TranchePattern};
