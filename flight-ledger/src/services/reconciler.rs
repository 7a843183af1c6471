//! Per-client ledger summaries and population reports.

use std::cmp::Ordering;
use std::collections::HashMap;

use rust_decimal::Decimal;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::config::EngineConfig;
use crate::error::LedgerError;
use crate::models::{
    AggregateStats, Client, CourseTranche, FlightTotals, HourPackage, Invoice, InvoiceLineItem,
    LedgerSummary, NoteKind, PackageSource, PackageUsage, Pagination, PopulationLedger,
    PopulationQuery, ProcessingNote, RecordRef, SortKey, SortOrder,
};
use crate::services::allocation::CourseAllocationCalculator;
use crate::services::classifier::{LineItemClassifier, LineKind};
use crate::services::{fifo, tranche};

/// Largest page a population query may request.
pub const MAX_POPULATION_PAGE_SIZE: usize = 1000;

/// Purchased-hour facts derived from one client's invoices.
#[derive(Debug, Clone, Default)]
pub struct PurchasedHours {
    pub packages: Vec<HourPackage>,
    pub tranches: Vec<CourseTranche>,
    pub notes: Vec<ProcessingNote>,
}

/// Split invoices by owning client; unlinked invoices become notes.
pub fn group_invoices_by_client(
    invoices: Vec<Invoice>,
) -> (HashMap<Uuid, Vec<Invoice>>, Vec<ProcessingNote>) {
    let mut grouped: HashMap<Uuid, Vec<Invoice>> = HashMap::new();
    let mut notes = Vec::new();
    for invoice in invoices {
        match invoice.client_id {
            Some(client_id) => grouped.entry(client_id).or_default().push(invoice),
            None => {
                warn!(invoice_id = %invoice.invoice_id, "Invoice has no client, skipping");
                notes.push(missing_linkage(&invoice));
            }
        }
    }
    (grouped, notes)
}

fn missing_linkage(invoice: &Invoice) -> ProcessingNote {
    ProcessingNote::new(
        RecordRef::Invoice {
            invoice_id: invoice.invoice_id,
        },
        NoteKind::MissingClientLinkage,
        "invoice has no client",
    )
}

fn line_ref(item: &InvoiceLineItem) -> RecordRef {
    RecordRef::LineItem {
        invoice_id: item.invoice_id,
        line_number: item.line_number,
    }
}

#[derive(Debug, Clone)]
pub struct LedgerReconciler {
    classifier: LineItemClassifier,
    allocation: CourseAllocationCalculator,
    low_hours_threshold: Decimal,
}

impl LedgerReconciler {
    pub fn new(config: &EngineConfig) -> Self {
        Self {
            classifier: LineItemClassifier::new(
                config.hour_unit_codes.clone(),
                config.course_keywords.clone(),
            ),
            allocation: CourseAllocationCalculator::new(
                config.course_total_hours,
                config.tranche_bands.clone(),
            ),
            low_hours_threshold: config.low_hours_threshold,
        }
    }

    pub fn low_hours_threshold(&self) -> Decimal {
        self.low_hours_threshold
    }

    /// Hour packages and course tranches bought by `client_id`.
    ///
    /// Invoices owned by another client are ignored. Bad line items are
    /// skipped with a note; the rest of their invoice still counts.
    pub fn purchased_packages(&self, client_id: Uuid, invoices: &[Invoice]) -> PurchasedHours {
        let mut purchased = PurchasedHours::default();

        for invoice in invoices {
            match invoice.client_id {
                None => {
                    purchased.notes.push(missing_linkage(invoice));
                    continue;
                }
                Some(owner) if owner != client_id => {
                    debug!(
                        invoice_id = %invoice.invoice_id,
                        %owner,
                        "Invoice belongs to another client"
                    );
                    continue;
                }
                Some(_) => {}
            }

            for item in &invoice.line_items {
                match self.classifier.line_kind(item) {
                    LineKind::HourPackage => {
                        if item.quantity <= Decimal::ZERO {
                            purchased.notes.push(ProcessingNote::new(
                                line_ref(item),
                                NoteKind::NonPositiveQuantity,
                                format!("quantity = {}", item.quantity),
                            ));
                            continue;
                        }
                        if let Some(package) = self.classifier.classify(client_id, invoice, item) {
                            purchased.packages.push(package);
                        }
                    }
                    LineKind::CourseContract => {
                        self.course_tranche(client_id, invoice, item, &mut purchased)
                    }
                    LineKind::Other => {}
                }
            }
        }

        purchased
    }

    fn course_tranche(
        &self,
        client_id: Uuid,
        invoice: &Invoice,
        item: &InvoiceLineItem,
        purchased: &mut PurchasedHours,
    ) {
        let fields = [item.description.as_str(), item.name.as_str()];
        let Some(descriptor) = tranche::parse_fields(&fields) else {
            warn!(
                invoice_id = %item.invoice_id,
                line_number = item.line_number,
                "Course line item has no recognisable installment"
            );
            purchased.notes.push(ProcessingNote::new(
                line_ref(item),
                NoteKind::UnparseableTranche,
                item.searchable_text(),
            ));
            return;
        };

        let allocation = match self.allocation.allocate(
            descriptor.tranche_number,
            descriptor.total_tranches,
            descriptor.amount,
        ) {
            Ok(allocation) => allocation,
            Err(e) => {
                warn!(invoice_id = %item.invoice_id, error = %e, "Invalid course installment");
                purchased.notes.push(ProcessingNote::new(
                    line_ref(item),
                    NoteKind::InvalidTranche,
                    e.to_string(),
                ));
                return;
            }
        };

        let course = CourseTranche {
            invoice_id: invoice.invoice_id,
            client_id,
            purchase_date: invoice.issue_date,
            tranche_number: allocation.tranche_number,
            total_tranches: allocation.total_tranches,
            total_inferred: allocation.total_inferred,
            amount: descriptor.amount,
            hours_allocated: allocation.hours,
        };
        purchased
            .packages
            .push(course.to_package(item.line_number, item.total, &item.currency));
        purchased.tranches.push(course);
    }

    /// Recompute one client's ledger from source records.
    ///
    /// `flight_notes` are carried into the summary as-is.
    pub fn reconcile(
        &self,
        client: &Client,
        invoices: &[Invoice],
        flight_totals: &FlightTotals,
        flight_notes: Vec<ProcessingNote>,
    ) -> Result<LedgerSummary, LedgerError> {
        let purchased = self.purchased_packages(client.client_id, invoices);

        let total_purchased_hours: Decimal =
            purchased.packages.iter().map(|p| p.total_hours).sum();
        let total_course_hours: Decimal = purchased
            .packages
            .iter()
            .filter(|p| matches!(p.source, PackageSource::CourseTranche { .. }))
            .map(|p| p.total_hours)
            .sum();

        let charged = flight_totals.charged_hours();
        let packages = fifo::allocate(purchased.packages, charged, self.low_hours_threshold);

        let total_remaining_hours =
            total_purchased_hours - flight_totals.regular.total - flight_totals.chartered.total;

        let mut notes = purchased.notes;
        notes.extend(flight_notes);

        let summary = LedgerSummary {
            client: client.clone(),
            total_purchased_hours,
            total_course_hours,
            total_flown_hours: flight_totals.regular.total,
            total_ferry_hours: flight_totals.ferry.total,
            total_chartered_hours: flight_totals.chartered.total,
            total_charter_hours: flight_totals.charter.total,
            total_demo_hours: flight_totals.demo.total,
            total_remaining_hours,
            flight_totals: *flight_totals,
            packages,
            notes,
        };

        verify(&summary, charged)?;
        Ok(summary)
    }

    /// Filter, aggregate, sort and page a set of client summaries.
    ///
    /// Aggregate statistics cover every client matching the search, not only
    /// the returned page.
    pub fn population(
        &self,
        summaries: Vec<LedgerSummary>,
        query: &PopulationQuery,
        notes: Vec<ProcessingNote>,
    ) -> Result<PopulationLedger, LedgerError> {
        validate_query(query)?;

        let search = query.search.as_deref().unwrap_or("");
        let mut matching: Vec<LedgerSummary> = summaries
            .into_iter()
            .filter(|s| s.client.matches_search(search))
            .collect();

        let aggregate_stats = self.aggregate_stats(&matching);

        matching.sort_by(|a, b| {
            let ordering = compare(a, b, query.sort_by);
            match query.sort_order {
                SortOrder::Asc => ordering,
                SortOrder::Desc => ordering.reverse(),
            }
        });

        let total = matching.len();
        let total_pages = total.div_ceil(query.page_size);
        let clients = matching
            .into_iter()
            .skip((query.page - 1).saturating_mul(query.page_size))
            .take(query.page_size)
            .collect();

        Ok(PopulationLedger {
            clients,
            pagination: Pagination {
                total,
                page: query.page,
                page_size: query.page_size,
                total_pages,
            },
            aggregate_stats,
            notes,
        })
    }

    fn aggregate_stats(&self, summaries: &[LedgerSummary]) -> AggregateStats {
        let mut stats = AggregateStats {
            client_count: summaries.len(),
            ..AggregateStats::default()
        };
        for s in summaries {
            stats.total_purchased_hours += s.total_purchased_hours;
            stats.total_course_hours += s.total_course_hours;
            stats.total_flown_hours += s.total_flown_hours;
            stats.total_ferry_hours += s.total_ferry_hours;
            stats.total_chartered_hours += s.total_chartered_hours;
            stats.total_charter_hours += s.total_charter_hours;
            stats.total_demo_hours += s.total_demo_hours;
            stats.total_remaining_hours += s.total_remaining_hours;
            stats.flight_totals.merge(&s.flight_totals);

            if s.total_remaining_hours < Decimal::ZERO {
                stats.overdrawn_clients += 1;
            } else if s.total_purchased_hours > Decimal::ZERO
                && s.total_remaining_hours <= self.low_hours_threshold
            {
                stats.low_balance_clients += 1;
            }
        }
        stats
    }
}

pub fn validate_query(query: &PopulationQuery) -> Result<(), LedgerError> {
    if query.page == 0 {
        return Err(LedgerError::InvalidQuery("page starts at 1".to_string()));
    }
    if query.page_size == 0 || query.page_size > MAX_POPULATION_PAGE_SIZE {
        return Err(LedgerError::InvalidQuery(format!(
            "page_size must be between 1 and {}",
            MAX_POPULATION_PAGE_SIZE
        )));
    }
    Ok(())
}

fn compare(a: &LedgerSummary, b: &LedgerSummary, key: SortKey) -> Ordering {
    let by_name = || {
        a.client
            .display_name
            .to_lowercase()
            .cmp(&b.client.display_name.to_lowercase())
            .then_with(|| a.client.client_id.cmp(&b.client.client_id))
    };
    match key {
        SortKey::Name => by_name(),
        SortKey::Purchased => a
            .total_purchased_hours
            .cmp(&b.total_purchased_hours)
            .then_with(by_name),
        SortKey::Flown => a.total_flown_hours.cmp(&b.total_flown_hours).then_with(by_name),
        SortKey::Remaining => a
            .total_remaining_hours
            .cmp(&b.total_remaining_hours)
            .then_with(by_name),
    }
}

/// Check that the FIFO view and the independently computed balance agree.
fn verify(summary: &LedgerSummary, charged: Decimal) -> Result<(), LedgerError> {
    let client_id = summary.client.client_id;

    for usage in &summary.packages {
        check_package(client_id, usage)?;
    }

    let package_remaining: Decimal = summary.packages.iter().map(|u| u.remaining_hours).sum();
    let overdraft = (charged - summary.total_purchased_hours).max(Decimal::ZERO);
    if package_remaining - overdraft != summary.total_remaining_hours {
        return Err(LedgerError::InvariantViolation(format!(
            "client {}: packages leave {} hours with {} overdrawn, balance says {}",
            client_id, package_remaining, overdraft, summary.total_remaining_hours
        )));
    }
    Ok(())
}

fn check_package(client_id: Uuid, usage: &PackageUsage) -> Result<(), LedgerError> {
    let total = usage.package.total_hours;
    if usage.used_hours < Decimal::ZERO
        || usage.used_hours > total
        || usage.used_hours + usage.remaining_hours != total
    {
        return Err(LedgerError::InvariantViolation(format!(
            "client {}: package {}#{} used {} of {} with {} remaining",
            client_id,
            usage.package.invoice_id,
            usage.package.line_number,
            usage.used_hours,
            total,
            usage.remaining_hours
        )));
    }
    Ok(())
}
