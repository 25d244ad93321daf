mod common;

use assert_matches::assert_matches;
use chrono::Utc;
use rust_decimal_macros::dec;
use std::sync::Arc;
use uuid::Uuid;

use freshstock_api::errors::ServiceError;
use freshstock_api::services::batch_store::InMemoryBatchStore;
use freshstock_api::services::sales::{CreateSaleRequest, SaleService};

use common::{clerk_for, make_batch, test_event_sender, FlakyBatchStore};

fn sale_request(location_id: Uuid, product_id: Uuid, quantity: i32) -> CreateSaleRequest {
    CreateSaleRequest {
        location_id,
        product_id,
        quantity,
        unit_price: dec!(4.9900),
        currency: "EUR".to_string(),
        sale_date: Some(Utc::now()),
    }
}

#[tokio::test]
async fn sale_drains_batches_in_expiry_order_and_conserves_quantity() {
    let location = Uuid::new_v4();
    let product = Uuid::new_v4();
    let store = Arc::new(InMemoryBatchStore::new());

    let a = make_batch(location, product, "LOT-A", 5, "2025-01-01", 0);
    let b = make_batch(location, product, "LOT-B", 10, "2025-02-01", 1);
    store.seed_batch(a.clone()).await;
    store.seed_batch(b.clone()).await;

    let (events, _rx) = test_event_sender();
    let service = SaleService::new(store.clone(), events);
    let user = clerk_for(vec![location]);

    let response = service
        .create_sale(sale_request(location, product, 8), &user)
        .await
        .expect("sale succeeds");

    assert_eq!(response.quantity, 8);
    assert_eq!(response.deductions.len(), 2);
    assert_eq!(response.deductions[0].batch_number, "LOT-A");
    assert_eq!(response.deductions[0].quantity, 5);
    assert_eq!(response.deductions[1].batch_number, "LOT-B");
    assert_eq!(response.deductions[1].quantity, 3);

    assert_eq!(store.get(a.id).await.unwrap().quantity_on_hand, 0);
    assert_eq!(store.get(b.id).await.unwrap().quantity_on_hand, 7);
    assert_eq!(store.available_total(location, product).await, 7);

    let sales = store.sales().await;
    assert_eq!(sales.len(), 1);
    assert_eq!(sales[0].quantity, 8);
    assert_eq!(sales[0].currency, "EUR");
    assert_eq!(sales[0].sold_by, "clerk-1");
}

#[tokio::test]
async fn oversized_request_reports_shortfall_and_mutates_nothing() {
    let location = Uuid::new_v4();
    let product = Uuid::new_v4();
    let store = Arc::new(InMemoryBatchStore::new());

    let a = make_batch(location, product, "LOT-A", 5, "2025-01-01", 0);
    let b = make_batch(location, product, "LOT-B", 10, "2025-02-01", 1);
    store.seed_batch(a.clone()).await;
    store.seed_batch(b.clone()).await;

    let (events, _rx) = test_event_sender();
    let service = SaleService::new(store.clone(), events);
    let user = clerk_for(vec![location]);

    let err = service
        .create_sale(sale_request(location, product, 20), &user)
        .await
        .unwrap_err();

    assert_matches!(
        err,
        ServiceError::InsufficientStock {
            requested: 20,
            available: 15
        }
    );
    assert_eq!(store.get(a.id).await.unwrap().quantity_on_hand, 5);
    assert_eq!(store.get(b.id).await.unwrap().quantity_on_hand, 10);
    assert!(store.sales().await.is_empty());
}

#[tokio::test]
async fn requesting_one_more_than_available_is_the_boundary() {
    let location = Uuid::new_v4();
    let product = Uuid::new_v4();
    let store = Arc::new(InMemoryBatchStore::new());
    store
        .seed_batch(make_batch(location, product, "LOT-A", 15, "2025-01-01", 0))
        .await;

    let (events, _rx) = test_event_sender();
    let service = SaleService::new(store.clone(), events);
    let user = clerk_for(vec![location]);

    let err = service
        .create_sale(sale_request(location, product, 16), &user)
        .await
        .unwrap_err();

    assert_matches!(
        err,
        ServiceError::InsufficientStock {
            requested: 16,
            available: 15
        }
    );
    assert_eq!(store.available_total(location, product).await, 15);
}

#[tokio::test]
async fn non_ok_batches_are_never_allocated() {
    let location = Uuid::new_v4();
    let product = Uuid::new_v4();
    let store = Arc::new(InMemoryBatchStore::new());

    // Earliest expiry but quarantined; must be skipped.
    let mut quarantined = make_batch(location, product, "LOT-Q", 50, "2024-12-01", 0);
    quarantined.quality_status = "QUARANTINE".to_string();
    let mut damaged = make_batch(location, product, "LOT-D", 50, "2024-12-02", 1);
    damaged.quality_status = "DAMAGED".to_string();
    let ok = make_batch(location, product, "LOT-OK", 6, "2025-03-01", 2);

    store.seed_batch(quarantined.clone()).await;
    store.seed_batch(damaged.clone()).await;
    store.seed_batch(ok.clone()).await;

    let (events, _rx) = test_event_sender();
    let service = SaleService::new(store.clone(), events);
    let user = clerk_for(vec![location]);

    let response = service
        .create_sale(sale_request(location, product, 6), &user)
        .await
        .expect("sale succeeds");

    assert_eq!(response.deductions.len(), 1);
    assert_eq!(response.deductions[0].batch_number, "LOT-OK");
    assert_eq!(store.get(quarantined.id).await.unwrap().quantity_on_hand, 50);
    assert_eq!(store.get(damaged.id).await.unwrap().quantity_on_hand, 50);
    assert_eq!(store.get(ok.id).await.unwrap().quantity_on_hand, 0);

    // And a request beyond the OK stock fails even though quarantined
    // quantity would cover it.
    let err = service
        .create_sale(sale_request(location, product, 10), &user)
        .await
        .unwrap_err();
    assert_matches!(err, ServiceError::InsufficientStock { available: 0, .. });
}

#[tokio::test]
async fn invalid_quantity_is_rejected_before_any_store_access() {
    let location = Uuid::new_v4();
    let product = Uuid::new_v4();
    let store = Arc::new(InMemoryBatchStore::new());
    let (events, _rx) = test_event_sender();
    let service = SaleService::new(store.clone(), events);
    let user = clerk_for(vec![location]);

    let err = service
        .create_sale(sale_request(location, product, 0), &user)
        .await
        .unwrap_err();
    assert_matches!(err, ServiceError::ValidationError(_));
}

#[tokio::test]
async fn callers_without_the_location_are_denied() {
    let location = Uuid::new_v4();
    let product = Uuid::new_v4();
    let store = Arc::new(InMemoryBatchStore::new());
    store
        .seed_batch(make_batch(location, product, "LOT-A", 5, "2025-01-01", 0))
        .await;

    let (events, _rx) = test_event_sender();
    let service = SaleService::new(store.clone(), events);
    let stranger = clerk_for(vec![Uuid::new_v4()]);

    let err = service
        .create_sale(sale_request(location, product, 1), &stranger)
        .await
        .unwrap_err();

    assert_matches!(err, ServiceError::Forbidden(_));
    assert_eq!(store.available_total(location, product).await, 5);
}

#[tokio::test]
async fn mid_sale_store_failure_restores_every_deducted_batch() {
    let location = Uuid::new_v4();
    let product = Uuid::new_v4();
    let inner = Arc::new(InMemoryBatchStore::new());

    let a = make_batch(location, product, "LOT-A", 4, "2025-01-01", 0);
    let b = make_batch(location, product, "LOT-B", 4, "2025-02-01", 1);
    let c = make_batch(location, product, "LOT-C", 4, "2025-03-01", 2);
    inner.seed_batch(a.clone()).await;
    inner.seed_batch(b.clone()).await;
    inner.seed_batch(c.clone()).await;

    let flaky = Arc::new(FlakyBatchStore::new(inner.clone()));
    // Two deduction writes succeed, the third fails.
    flaky.allow_writes(2);

    let (events, _rx) = test_event_sender();
    let service = SaleService::new(flaky.clone(), events);
    let user = clerk_for(vec![location]);

    let err = service
        .create_sale(sale_request(location, product, 12), &user)
        .await
        .unwrap_err();

    assert_matches!(err, ServiceError::StepFailure(_));
    assert_eq!(inner.get(a.id).await.unwrap().quantity_on_hand, 4);
    assert_eq!(inner.get(b.id).await.unwrap().quantity_on_hand, 4);
    assert_eq!(inner.get(c.id).await.unwrap().quantity_on_hand, 4);
    assert!(inner.sales().await.is_empty());
}

#[tokio::test]
async fn ledger_failure_after_deduction_is_a_terminal_inconsistency() {
    let location = Uuid::new_v4();
    let product = Uuid::new_v4();
    let inner = Arc::new(InMemoryBatchStore::new());
    let a = make_batch(location, product, "LOT-A", 10, "2025-01-01", 0);
    inner.seed_batch(a.clone()).await;

    let flaky = Arc::new(FlakyBatchStore::new(inner.clone()));
    flaky.fail_sales(true);

    let (events, _rx) = test_event_sender();
    let service = SaleService::new(flaky.clone(), events);
    let user = clerk_for(vec![location]);

    let err = service
        .create_sale(sale_request(location, product, 6), &user)
        .await
        .unwrap_err();

    assert_matches!(err, ServiceError::TerminalInconsistency(_));
    // Stock stays deducted: the divergence is flagged, not unwound.
    assert_eq!(inner.get(a.id).await.unwrap().quantity_on_hand, 4);
    assert!(inner.sales().await.is_empty());
}
