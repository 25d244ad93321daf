#![allow(dead_code)]

use async_trait::async_trait;
use chrono::{Duration, NaiveDate, TimeZone, Utc};
use rust_decimal_macros::dec;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;
use uuid::Uuid;

use freshstock_api::auth::AuthUser;
use freshstock_api::entities::{sale_record, stock_batch};
use freshstock_api::errors::ServiceError;
use freshstock_api::events::{Event, EventSender};
use freshstock_api::services::batch_store::{
    BatchStore, InMemoryBatchStore, NewBatch, NewSaleRecord,
};

/// Builds a batch row with controllable expiry and insertion order.
/// `age_secs` spaces out created_at so FIFO tie-breaks are deterministic.
pub fn make_batch(
    location_id: Uuid,
    product_id: Uuid,
    batch_number: &str,
    quantity: i32,
    expiry: &str,
    age_secs: i64,
) -> stock_batch::Model {
    let created =
        Utc.with_ymd_and_hms(2025, 6, 1, 0, 0, 0).unwrap() + Duration::seconds(age_secs);
    stock_batch::Model {
        id: Uuid::new_v4(),
        product_id,
        location_id,
        batch_number: batch_number.to_string(),
        quantity_on_hand: quantity,
        quantity_reserved: 0,
        unit_cost: dec!(3.2500),
        manufactured_date: NaiveDate::from_ymd_opt(2024, 11, 15).unwrap(),
        expiry_date: expiry.parse().unwrap(),
        quality_status: "OK".to_string(),
        created_at: created,
        updated_at: created,
    }
}

/// A caller whose claims grant the given locations.
pub fn clerk_for(locations: Vec<Uuid>) -> AuthUser {
    AuthUser {
        user_id: "clerk-1".to_string(),
        role: "clerk".to_string(),
        locations,
    }
}

/// An event channel whose receiver is kept alive by the caller.
pub fn test_event_sender() -> (Arc<EventSender>, mpsc::Receiver<Event>) {
    let (tx, rx) = mpsc::channel(64);
    (Arc::new(EventSender::new(tx)), rx)
}

/// Wraps an [`InMemoryBatchStore`] and fails forward writes on command.
///
/// `allow_writes(n)` lets the next `n` forward mutations (conditional
/// quantity updates and inserts) succeed and fails every one after that.
/// Rollback operations (`restore_quantity`, `delete_batch`) always pass
/// through so compensation can be observed. `fail_sales(true)` rejects the
/// ledger write specifically, which is how a terminal inconsistency is
/// produced.
pub struct FlakyBatchStore {
    pub inner: Arc<InMemoryBatchStore>,
    writes_remaining: Mutex<Option<i64>>,
    fail_record_sale: AtomicBool,
}

impl FlakyBatchStore {
    pub fn new(inner: Arc<InMemoryBatchStore>) -> Self {
        Self {
            inner,
            writes_remaining: Mutex::new(None),
            fail_record_sale: AtomicBool::new(false),
        }
    }

    pub fn allow_writes(&self, count: i64) {
        *self.writes_remaining.lock().unwrap() = Some(count);
    }

    pub fn fail_sales(&self, fail: bool) {
        self.fail_record_sale.store(fail, Ordering::SeqCst);
    }

    fn consume_write_budget(&self) -> Result<(), ServiceError> {
        let mut remaining = self.writes_remaining.lock().unwrap();
        match remaining.as_mut() {
            Some(left) if *left <= 0 => Err(ServiceError::InternalError(
                "injected store failure".to_string(),
            )),
            Some(left) => {
                *left -= 1;
                Ok(())
            }
            None => Ok(()),
        }
    }
}

#[async_trait]
impl BatchStore for FlakyBatchStore {
    async fn find_batch(&self, id: Uuid) -> Result<Option<stock_batch::Model>, ServiceError> {
        self.inner.find_batch(id).await
    }

    async fn available_batches(
        &self,
        location_id: Uuid,
        product_id: Uuid,
    ) -> Result<Vec<stock_batch::Model>, ServiceError> {
        self.inner.available_batches(location_id, product_id).await
    }

    async fn find_by_batch_number(
        &self,
        location_id: Uuid,
        product_id: Uuid,
        batch_number: &str,
    ) -> Result<Option<stock_batch::Model>, ServiceError> {
        self.inner
            .find_by_batch_number(location_id, product_id, batch_number)
            .await
    }

    async fn update_quantity(
        &self,
        id: Uuid,
        expected: i32,
        new: i32,
    ) -> Result<(), ServiceError> {
        self.consume_write_budget()?;
        self.inner.update_quantity(id, expected, new).await
    }

    async fn restore_quantity(&self, id: Uuid, quantity: i32) -> Result<(), ServiceError> {
        self.inner.restore_quantity(id, quantity).await
    }

    async fn insert_batch(&self, batch: NewBatch) -> Result<stock_batch::Model, ServiceError> {
        self.consume_write_budget()?;
        self.inner.insert_batch(batch).await
    }

    async fn delete_batch(&self, id: Uuid) -> Result<(), ServiceError> {
        self.inner.delete_batch(id).await
    }

    async fn record_sale(
        &self,
        sale: NewSaleRecord,
    ) -> Result<sale_record::Model, ServiceError> {
        if self.fail_record_sale.load(Ordering::SeqCst) {
            return Err(ServiceError::InternalError(
                "injected ledger failure".to_string(),
            ));
        }
        self.inner.record_sale(sale).await
    }
}
