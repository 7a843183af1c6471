//! Integration tests for chunked retrieval through a capped store.

mod common;

use std::collections::HashSet;

use common::*;
use flight_ledger::config::EngineConfig;
use flight_ledger::error::LedgerError;
use flight_ledger::services::{BulkRetriever, DateRange, LedgerStore};
use rust_decimal::Decimal;

#[tokio::test]
async fn retrieves_every_row_across_capped_pages() {
    init_tracing();
    let pilot = client("Ana Popescu");
    let flights = training_flights(&pilot, 2500);
    let expected: Vec<_> = {
        let store = InMemoryStore::new().with_flights(flights.clone());
        store.list_flight_records(&DateRange::default(), 0, usize::MAX).await.unwrap()
    };
    let store = InMemoryStore::new().with_flights(flights);
    let range = DateRange::default();

    let rows = BulkRetriever::new(STORE_PAGE_CAP, 100)
        .fetch_all("flight_records", |offset, limit| {
            store.list_flight_records(&range, offset, limit)
        })
        .await
        .unwrap();

    assert_eq!(rows.len(), 2500);
    let unique: HashSet<_> = rows.iter().map(|f| f.flight_id).collect();
    assert_eq!(unique.len(), 2500, "no duplicates");
    let ids: Vec<_> = rows.iter().map(|f| f.flight_id).collect();
    let first_page: Vec<_> = expected.iter().map(|f| f.flight_id).collect();
    assert_eq!(&ids[..STORE_PAGE_CAP], &first_page[..], "no gaps at chunk boundary");
    assert_eq!(store.calls(), 3);
}

#[tokio::test]
async fn client_ledger_counts_all_flights_beyond_one_page() {
    let pilot = client("Ana Popescu");
    let store = InMemoryStore::new()
        .with_clients(vec![pilot.clone()])
        .with_invoices(vec![InvoiceBuilder::for_client(&pilot, date(2023, 12, 1))
            .hour_block("3000")
            .build()])
        .with_flights(training_flights(&pilot, 2500));
    let (store, service) = service(store);

    let summary = service.get_client_ledger(pilot.client_id, as_of()).await.unwrap();

    assert_eq!(summary.total_flown_hours, Decimal::from(2500));
    assert_eq!(summary.total_remaining_hours, Decimal::from(500));
    // Three flight pages plus one invoice page.
    assert_eq!(store.calls(), 4);
}

#[tokio::test]
async fn exact_multiple_of_page_size_is_complete() {
    let pilot = client("Ana Popescu");
    let store = InMemoryStore::new()
        .with_clients(vec![pilot.clone()])
        .with_flights(training_flights(&pilot, 2000));
    let (store, service) = service(store);

    let summary = service.get_client_ledger(pilot.client_id, as_of()).await.unwrap();

    assert_eq!(summary.total_flown_hours, Decimal::from(2000));
    // Two full flight pages, one empty trailing page, one invoice page.
    assert_eq!(store.calls(), 4);
}

#[tokio::test]
async fn failure_mid_pagination_is_an_incomplete_retrieval() {
    let pilot = client("Ana Popescu");
    let store = InMemoryStore::new()
        .with_clients(vec![pilot.clone()])
        .with_flights(training_flights(&pilot, 2500))
        .fail_at("flight_records", 1000);
    let (_, service) = service(store);

    let result = service.get_client_ledger(pilot.client_id, as_of()).await;

    match result {
        Err(LedgerError::IncompleteRetrieval {
            resource,
            offset,
            fetched,
            reason,
        }) => {
            assert_eq!(resource, "flight_records");
            assert_eq!(offset, 1000);
            assert_eq!(fetched, 1000);
            assert!(reason.contains("connection reset"));
        }
        other => panic!("expected incomplete retrieval, got {:?}", other.map(|_| ())),
    }
}

#[tokio::test]
async fn overlong_page_is_rejected() {
    let pilot = client("Ana Popescu");
    let store = InMemoryStore::new()
        .with_clients(vec![pilot.clone()])
        .with_flights(training_flights(&pilot, 1500))
        .ignoring_limit();
    let config = EngineConfig {
        page_size: 400,
        ..EngineConfig::default()
    };
    let (_, service) = service_with(store, config);

    let result = service.get_client_ledger(pilot.client_id, as_of()).await;

    assert!(matches!(
        result,
        Err(LedgerError::IncompleteRetrieval {
            resource: "flight_records",
            offset: 0,
            ..
        })
    ));
}

#[tokio::test]
async fn configured_page_size_is_capped_by_store() {
    let pilot = client("Ana Popescu");
    let store = InMemoryStore::new()
        .with_clients(vec![pilot.clone()])
        .with_flights(training_flights(&pilot, 2500));
    let config = EngineConfig {
        page_size: 5000,
        ..EngineConfig::default()
    };
    let (_, service) = service_with(store, config);

    let summary = service.get_client_ledger(pilot.client_id, as_of()).await.unwrap();

    assert_eq!(summary.total_flown_hours, Decimal::from(2500));
}

#[tokio::test]
async fn population_failure_does_not_return_partial_data() {
    let clients: Vec<_> = (0..1200).map(|i| client(&format!("Client {}", i))).collect();
    let store = InMemoryStore::new()
        .with_clients(clients)
        .fail_at("clients", 1000);
    let (_, service) = service(store);

    let result = service
        .get_population_ledger(&Default::default(), as_of())
        .await;

    assert!(matches!(
        result,
        Err(LedgerError::IncompleteRetrieval {
            resource: "clients",
            offset: 1000,
            ..
        })
    ));
}
