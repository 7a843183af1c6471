//! Ledger computations over a [`LedgerStore`].

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Instant;

use chrono::NaiveDate;
use tracing::{info, instrument, warn};
use uuid::Uuid;

use crate::config::EngineConfig;
use crate::error::LedgerError;
use crate::models::{
    Client, FlightRecord, Invoice, LedgerSummary, NoteKind, PackageDrilldown,
    PopulationLedger, PopulationQuery, ProcessingNote, RecordRef,
};
use crate::services::aggregator::aggregate;
use crate::services::metrics::{record_computation, record_skipped_record};
use crate::services::reconciler::{group_invoices_by_client, validate_query, LedgerReconciler};
use crate::services::retriever::BulkRetriever;
use crate::services::store::{DateRange, InvoiceFilter, LedgerStore};

/// Recomputes ledgers from source records on every call. Holds no ledger state.
pub struct LedgerService<S: LedgerStore> {
    store: Arc<S>,
    config: EngineConfig,
    reconciler: LedgerReconciler,
    retriever: BulkRetriever,
}

impl<S: LedgerStore> LedgerService<S> {
    pub fn new(store: Arc<S>, config: EngineConfig) -> Self {
        let page_size = config.page_size.min(store.max_page_size());
        if page_size < config.page_size {
            warn!(
                configured = config.page_size,
                store_cap = page_size,
                "Retrieval page size capped by store"
            );
        }
        Self {
            reconciler: LedgerReconciler::new(&config),
            retriever: BulkRetriever::new(page_size, config.max_pages),
            store,
            config,
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    #[instrument(skip(self), fields(client_id = %client_id, as_of = %as_of))]
    pub async fn get_client_ledger(
        &self,
        client_id: Uuid,
        as_of: NaiveDate,
    ) -> Result<LedgerSummary, LedgerError> {
        let started = Instant::now();
        let result = self.compute_client_ledger(client_id, as_of).await;
        observe("client", started, &result);

        match &result {
            Ok(summary) => info!(
                purchased = %summary.total_purchased_hours,
                remaining = %summary.total_remaining_hours,
                packages = summary.packages.len(),
                notes = summary.notes.len(),
                "Client ledger computed"
            ),
            Err(e) => warn!(error = %e, "Client ledger failed"),
        }
        result
    }

    #[instrument(skip(self, query), fields(page = query.page, page_size = query.page_size, as_of = %as_of))]
    pub async fn get_population_ledger(
        &self,
        query: &PopulationQuery,
        as_of: NaiveDate,
    ) -> Result<PopulationLedger, LedgerError> {
        let started = Instant::now();
        let result = self.compute_population_ledger(query, as_of).await;
        observe("population", started, &result);

        match &result {
            Ok(ledger) => info!(
                clients = ledger.aggregate_stats.client_count,
                overdrawn = ledger.aggregate_stats.overdrawn_clients,
                notes = ledger.notes.len(),
                "Population ledger computed"
            ),
            Err(e) => warn!(error = %e, "Population ledger failed"),
        }
        result
    }

    /// Per-package view of one client's FIFO consumption.
    pub async fn get_package_drilldown(
        &self,
        client_id: Uuid,
        as_of: NaiveDate,
    ) -> Result<Vec<PackageDrilldown>, LedgerError> {
        let summary = self.get_client_ledger(client_id, as_of).await?;
        Ok(summary.packages.iter().map(PackageDrilldown::from).collect())
    }

    async fn compute_client_ledger(
        &self,
        client_id: Uuid,
        as_of: NaiveDate,
    ) -> Result<LedgerSummary, LedgerError> {
        let client = self
            .store
            .get_client(client_id)
            .await?
            .ok_or(LedgerError::ClientNotFound(client_id))?;

        let filter = InvoiceFilter {
            client_id: Some(client_id),
            statuses: self.config.invoice_statuses.clone(),
        };
        let range = DateRange::default();
        let (invoices, flights) = tokio::try_join!(
            self.fetch_invoices(&filter),
            self.fetch_flights(&range)
        )?;

        let involved: Vec<FlightRecord> = flights
            .into_iter()
            .filter(|f| f.involves(client_id))
            .collect();
        let aggregation = aggregate(&involved, as_of);
        let totals = aggregation.for_client(client_id);

        let summary = self
            .reconciler
            .reconcile(&client, &invoices, &totals, aggregation.notes)?;
        count_skipped(&summary.notes);
        Ok(summary)
    }

    async fn compute_population_ledger(
        &self,
        query: &PopulationQuery,
        as_of: NaiveDate,
    ) -> Result<PopulationLedger, LedgerError> {
        validate_query(query)?;

        let filter = InvoiceFilter {
            client_id: None,
            statuses: self.config.invoice_statuses.clone(),
        };
        let range = DateRange::default();
        let (clients, invoices, flights) = tokio::try_join!(
            self.fetch_clients(),
            self.fetch_invoices(&filter),
            self.fetch_flights(&range)
        )?;

        let (mut invoices_by_client, mut unattributed) = group_invoices_by_client(invoices);
        let aggregation = aggregate(&flights, as_of);

        let pilots: HashMap<Uuid, Uuid> = flights
            .iter()
            .filter_map(|f| f.pilot_id.map(|pilot| (f.flight_id, pilot)))
            .collect();
        let mut notes_by_client: HashMap<Uuid, Vec<ProcessingNote>> = HashMap::new();
        for note in aggregation.notes.iter().cloned() {
            let owner = match &note.record {
                RecordRef::Flight { flight_id } => pilots.get(flight_id).copied(),
                _ => None,
            };
            match owner {
                Some(client_id) => notes_by_client.entry(client_id).or_default().push(note),
                None => unattributed.push(note),
            }
        }

        let summaries = clients
            .iter()
            .map(|client| {
                let id = client.client_id;
                let invoices: Vec<Invoice> = invoices_by_client.remove(&id).unwrap_or_default();
                self.reconciler.reconcile(
                    client,
                    &invoices,
                    &aggregation.for_client(id),
                    notes_by_client.remove(&id).unwrap_or_default(),
                )
            })
            .collect::<Result<Vec<_>, _>>()?;

        // Whatever is left refers to ids missing from the client list.
        let known: HashSet<Uuid> = clients.iter().map(|c| c.client_id).collect();
        unattributed.extend(unknown_client_notes(
            invoices_by_client,
            notes_by_client,
            &flights,
            &known,
        ));

        for summary in &summaries {
            count_skipped(&summary.notes);
        }
        count_skipped(&unattributed);

        self.reconciler.population(summaries, query, unattributed)
    }

    async fn fetch_clients(&self) -> Result<Vec<Client>, LedgerError> {
        let store = self.store.as_ref();
        self.retriever
            .fetch_all("clients", move |offset, limit| store.list_clients(offset, limit))
            .await
    }

    async fn fetch_invoices(&self, filter: &InvoiceFilter) -> Result<Vec<Invoice>, LedgerError> {
        let store = self.store.as_ref();
        self.retriever
            .fetch_all("invoices", move |offset, limit| {
                store.list_invoices(filter, offset, limit)
            })
            .await
    }

    async fn fetch_flights(&self, range: &DateRange) -> Result<Vec<FlightRecord>, LedgerError> {
        let store = self.store.as_ref();
        self.retriever
            .fetch_all("flight_records", move |offset, limit| {
                store.list_flight_records(range, offset, limit)
            })
            .await
    }
}

/// Notes for records that name a client id absent from the client list.
fn unknown_client_notes(
    invoices_by_client: HashMap<Uuid, Vec<Invoice>>,
    notes_by_client: HashMap<Uuid, Vec<ProcessingNote>>,
    flights: &[FlightRecord],
    known: &HashSet<Uuid>,
) -> Vec<ProcessingNote> {
    let mut notes = Vec::new();

    let mut orphaned: Vec<Invoice> = invoices_by_client.into_values().flatten().collect();
    orphaned.sort_by_key(|i| (i.issue_date, i.invoice_id));
    for invoice in orphaned {
        warn!(invoice_id = %invoice.invoice_id, "Invoice client is unknown, skipping");
        notes.push(ProcessingNote::new(
            RecordRef::Invoice {
                invoice_id: invoice.invoice_id,
            },
            NoteKind::MissingClientLinkage,
            format!(
                "client {} is not a known client",
                invoice.client_id.unwrap_or_default()
            ),
        ));
    }

    let mut already_noted: HashSet<Uuid> = HashSet::new();
    let mut stranded: Vec<ProcessingNote> = notes_by_client.into_values().flatten().collect();
    for note in &stranded {
        if let RecordRef::Flight { flight_id } = note.record {
            already_noted.insert(flight_id);
        }
    }

    for flight in flights {
        // Pilotless flights were already noted by the aggregator.
        if flight.pilot_id.is_none() || already_noted.contains(&flight.flight_id) {
            continue;
        }
        let unknown = flight
            .pilot_id
            .into_iter()
            .chain(flight.third_party_payer())
            .find(|id| !known.contains(id));
        if let Some(id) = unknown {
            warn!(flight_id = %flight.flight_id, client_id = %id, "Flight client is unknown");
            stranded.push(ProcessingNote::new(
                RecordRef::Flight {
                    flight_id: flight.flight_id,
                },
                NoteKind::MissingClientLinkage,
                format!("client {} is not a known client", id),
            ));
        }
    }

    let position: HashMap<Uuid, usize> = flights
        .iter()
        .enumerate()
        .map(|(i, f)| (f.flight_id, i))
        .collect();
    stranded.sort_by_key(|note| match &note.record {
        RecordRef::Flight { flight_id } => position.get(flight_id).copied().unwrap_or(usize::MAX),
        _ => usize::MAX,
    });

    notes.extend(stranded);
    notes
}

fn observe<T>(kind: &str, started: Instant, result: &Result<T, LedgerError>) {
    let status = match result {
        Ok(_) => "success",
        Err(e) => e.kind(),
    };
    record_computation(kind, status, started.elapsed().as_secs_f64());
}

fn count_skipped(notes: &[ProcessingNote]) {
    for note in notes {
        record_skipped_record(note.kind.as_str());
    }
}
