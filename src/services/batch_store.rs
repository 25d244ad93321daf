use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use sea_orm::sea_query::Expr;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, QueryOrder, Set,
};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::entities::sale_record;
use crate::entities::stock_batch::{self, Entity as StockBatch, QualityStatus};
use crate::errors::ServiceError;

/// Fields for a batch row created by a transfer credit.
#[derive(Debug, Clone)]
pub struct NewBatch {
    pub product_id: Uuid,
    pub location_id: Uuid,
    pub batch_number: String,
    pub quantity_on_hand: i32,
    pub unit_cost: Decimal,
    pub manufactured_date: NaiveDate,
    pub expiry_date: NaiveDate,
    pub quality_status: QualityStatus,
}

/// Fields for a sales ledger row.
#[derive(Debug, Clone)]
pub struct NewSaleRecord {
    pub location_id: Uuid,
    pub product_id: Uuid,
    pub quantity: i32,
    pub unit_price: Decimal,
    pub currency: String,
    pub sale_date: DateTime<Utc>,
    pub sold_by: String,
}

/// Row-level access to stock batches and the sales ledger.
///
/// This is the engine's only path to durable state. Deliberately, no
/// transaction handle is exposed: each method is a single row operation, and
/// atomicity across several of them is the job of the compensating-rollback
/// protocol. Forward quantity writes are conditional (compare-and-swap on the
/// previously read quantity); rollback writes are unconditional.
#[async_trait]
pub trait BatchStore: Send + Sync {
    /// Point read by id.
    async fn find_batch(&self, id: Uuid) -> Result<Option<stock_batch::Model>, ServiceError>;

    /// Allocation candidates at (location, product): quality `OK`,
    /// quantity-on-hand > 0, ordered by expiry date ascending with insertion
    /// order as tie-break.
    async fn available_batches(
        &self,
        location_id: Uuid,
        product_id: Uuid,
    ) -> Result<Vec<stock_batch::Model>, ServiceError>;

    /// Destination lookup for a transfer credit.
    async fn find_by_batch_number(
        &self,
        location_id: Uuid,
        product_id: Uuid,
        batch_number: &str,
    ) -> Result<Option<stock_batch::Model>, ServiceError>;

    /// Conditional quantity write: succeeds only if the row still holds
    /// `expected`. A changed or missing row yields
    /// [`ServiceError::ConcurrentModification`].
    async fn update_quantity(&self, id: Uuid, expected: i32, new: i32)
        -> Result<(), ServiceError>;

    /// Unconditional quantity write, used only by rollback
    /// (last-recorded-value-wins).
    async fn restore_quantity(&self, id: Uuid, quantity: i32) -> Result<(), ServiceError>;

    /// Insert a new batch row (transfer credit to a fresh batch number).
    async fn insert_batch(&self, batch: NewBatch) -> Result<stock_batch::Model, ServiceError>;

    /// Delete a batch row; only ever called to undo an insert.
    async fn delete_batch(&self, id: Uuid) -> Result<(), ServiceError>;

    /// Append a row to the sales ledger.
    async fn record_sale(&self, sale: NewSaleRecord)
        -> Result<sale_record::Model, ServiceError>;
}

/// Production [`BatchStore`] over sea-orm.
pub struct SeaOrmBatchStore {
    db: Arc<DatabaseConnection>,
}

impl SeaOrmBatchStore {
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }
}

#[async_trait]
impl BatchStore for SeaOrmBatchStore {
    async fn find_batch(&self, id: Uuid) -> Result<Option<stock_batch::Model>, ServiceError> {
        StockBatch::find_by_id(id)
            .one(self.db.as_ref())
            .await
            .map_err(ServiceError::db_error)
    }

    async fn available_batches(
        &self,
        location_id: Uuid,
        product_id: Uuid,
    ) -> Result<Vec<stock_batch::Model>, ServiceError> {
        StockBatch::find()
            .filter(stock_batch::Column::LocationId.eq(location_id))
            .filter(stock_batch::Column::ProductId.eq(product_id))
            .filter(stock_batch::Column::QualityStatus.eq(QualityStatus::Ok.as_str()))
            .filter(stock_batch::Column::QuantityOnHand.gt(0))
            .order_by_asc(stock_batch::Column::ExpiryDate)
            .order_by_asc(stock_batch::Column::CreatedAt)
            .all(self.db.as_ref())
            .await
            .map_err(ServiceError::db_error)
    }

    async fn find_by_batch_number(
        &self,
        location_id: Uuid,
        product_id: Uuid,
        batch_number: &str,
    ) -> Result<Option<stock_batch::Model>, ServiceError> {
        StockBatch::find()
            .filter(stock_batch::Column::LocationId.eq(location_id))
            .filter(stock_batch::Column::ProductId.eq(product_id))
            .filter(stock_batch::Column::BatchNumber.eq(batch_number))
            .one(self.db.as_ref())
            .await
            .map_err(ServiceError::db_error)
    }

    async fn update_quantity(
        &self,
        id: Uuid,
        expected: i32,
        new: i32,
    ) -> Result<(), ServiceError> {
        let result = StockBatch::update_many()
            .col_expr(stock_batch::Column::QuantityOnHand, Expr::value(new))
            .col_expr(stock_batch::Column::UpdatedAt, Expr::value(Utc::now()))
            .filter(stock_batch::Column::Id.eq(id))
            .filter(stock_batch::Column::QuantityOnHand.eq(expected))
            .exec(self.db.as_ref())
            .await
            .map_err(ServiceError::db_error)?;

        if result.rows_affected == 0 {
            return Err(ServiceError::ConcurrentModification(id));
        }
        Ok(())
    }

    async fn restore_quantity(&self, id: Uuid, quantity: i32) -> Result<(), ServiceError> {
        let result = StockBatch::update_many()
            .col_expr(stock_batch::Column::QuantityOnHand, Expr::value(quantity))
            .col_expr(stock_batch::Column::UpdatedAt, Expr::value(Utc::now()))
            .filter(stock_batch::Column::Id.eq(id))
            .exec(self.db.as_ref())
            .await
            .map_err(ServiceError::db_error)?;

        if result.rows_affected == 0 {
            return Err(ServiceError::NotFound(format!(
                "Batch {} not found during restore",
                id
            )));
        }
        Ok(())
    }

    async fn insert_batch(&self, batch: NewBatch) -> Result<stock_batch::Model, ServiceError> {
        let now = Utc::now();
        let model = stock_batch::ActiveModel {
            id: Set(Uuid::new_v4()),
            product_id: Set(batch.product_id),
            location_id: Set(batch.location_id),
            batch_number: Set(batch.batch_number),
            quantity_on_hand: Set(batch.quantity_on_hand),
            quantity_reserved: Set(0),
            unit_cost: Set(batch.unit_cost),
            manufactured_date: Set(batch.manufactured_date),
            expiry_date: Set(batch.expiry_date),
            quality_status: Set(batch.quality_status.as_str().to_string()),
            created_at: Set(now),
            updated_at: Set(now),
        };

        model
            .insert(self.db.as_ref())
            .await
            .map_err(ServiceError::db_error)
    }

    async fn delete_batch(&self, id: Uuid) -> Result<(), ServiceError> {
        let result = StockBatch::delete_by_id(id)
            .exec(self.db.as_ref())
            .await
            .map_err(ServiceError::db_error)?;

        if result.rows_affected == 0 {
            return Err(ServiceError::NotFound(format!(
                "Batch {} not found during delete",
                id
            )));
        }
        Ok(())
    }

    async fn record_sale(
        &self,
        sale: NewSaleRecord,
    ) -> Result<sale_record::Model, ServiceError> {
        let model = sale_record::ActiveModel {
            id: Set(Uuid::new_v4()),
            location_id: Set(sale.location_id),
            product_id: Set(sale.product_id),
            quantity: Set(sale.quantity),
            unit_price: Set(sale.unit_price),
            currency: Set(sale.currency),
            sale_date: Set(sale.sale_date),
            sold_by: Set(sale.sold_by),
            created_at: Set(Utc::now()),
        };

        model
            .insert(self.db.as_ref())
            .await
            .map_err(ServiceError::db_error)
    }
}

/// HashMap-backed [`BatchStore`] for tests and local development, the same
/// way the infrastructure traits elsewhere ship an in-memory twin.
#[derive(Default)]
pub struct InMemoryBatchStore {
    batches: RwLock<HashMap<Uuid, stock_batch::Model>>,
    sales: RwLock<Vec<sale_record::Model>>,
}

impl InMemoryBatchStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts a fully specified batch row, bypassing the credit path. Lets
    /// callers control created_at for deterministic tie-breaks.
    pub async fn seed_batch(&self, model: stock_batch::Model) {
        self.batches.write().await.insert(model.id, model);
    }

    pub async fn get(&self, id: Uuid) -> Option<stock_batch::Model> {
        self.batches.read().await.get(&id).cloned()
    }

    pub async fn all_batches(&self) -> Vec<stock_batch::Model> {
        self.batches.read().await.values().cloned().collect()
    }

    pub async fn sales(&self) -> Vec<sale_record::Model> {
        self.sales.read().await.clone()
    }

    /// Sum of allocatable quantity at (location, product).
    pub async fn available_total(&self, location_id: Uuid, product_id: Uuid) -> i32 {
        self.batches
            .read()
            .await
            .values()
            .filter(|b| {
                b.location_id == location_id && b.product_id == product_id && b.is_allocatable()
            })
            .map(|b| b.quantity_on_hand)
            .sum()
    }
}

#[async_trait]
impl BatchStore for InMemoryBatchStore {
    async fn find_batch(&self, id: Uuid) -> Result<Option<stock_batch::Model>, ServiceError> {
        Ok(self.batches.read().await.get(&id).cloned())
    }

    async fn available_batches(
        &self,
        location_id: Uuid,
        product_id: Uuid,
    ) -> Result<Vec<stock_batch::Model>, ServiceError> {
        let mut candidates: Vec<stock_batch::Model> = self
            .batches
            .read()
            .await
            .values()
            .filter(|b| {
                b.location_id == location_id && b.product_id == product_id && b.is_allocatable()
            })
            .cloned()
            .collect();
        candidates.sort_by(|a, b| {
            a.expiry_date
                .cmp(&b.expiry_date)
                .then(a.created_at.cmp(&b.created_at))
        });
        Ok(candidates)
    }

    async fn find_by_batch_number(
        &self,
        location_id: Uuid,
        product_id: Uuid,
        batch_number: &str,
    ) -> Result<Option<stock_batch::Model>, ServiceError> {
        Ok(self
            .batches
            .read()
            .await
            .values()
            .find(|b| {
                b.location_id == location_id
                    && b.product_id == product_id
                    && b.batch_number == batch_number
            })
            .cloned())
    }

    async fn update_quantity(
        &self,
        id: Uuid,
        expected: i32,
        new: i32,
    ) -> Result<(), ServiceError> {
        let mut batches = self.batches.write().await;
        match batches.get_mut(&id) {
            Some(batch) if batch.quantity_on_hand == expected => {
                batch.quantity_on_hand = new;
                batch.updated_at = Utc::now();
                Ok(())
            }
            _ => Err(ServiceError::ConcurrentModification(id)),
        }
    }

    async fn restore_quantity(&self, id: Uuid, quantity: i32) -> Result<(), ServiceError> {
        let mut batches = self.batches.write().await;
        match batches.get_mut(&id) {
            Some(batch) => {
                batch.quantity_on_hand = quantity;
                batch.updated_at = Utc::now();
                Ok(())
            }
            None => Err(ServiceError::NotFound(format!(
                "Batch {} not found during restore",
                id
            ))),
        }
    }

    async fn insert_batch(&self, batch: NewBatch) -> Result<stock_batch::Model, ServiceError> {
        let now = Utc::now();
        let model = stock_batch::Model {
            id: Uuid::new_v4(),
            product_id: batch.product_id,
            location_id: batch.location_id,
            batch_number: batch.batch_number,
            quantity_on_hand: batch.quantity_on_hand,
            quantity_reserved: 0,
            unit_cost: batch.unit_cost,
            manufactured_date: batch.manufactured_date,
            expiry_date: batch.expiry_date,
            quality_status: batch.quality_status.as_str().to_string(),
            created_at: now,
            updated_at: now,
        };
        self.batches.write().await.insert(model.id, model.clone());
        Ok(model)
    }

    async fn delete_batch(&self, id: Uuid) -> Result<(), ServiceError> {
        match self.batches.write().await.remove(&id) {
            Some(_) => Ok(()),
            None => Err(ServiceError::NotFound(format!(
                "Batch {} not found during delete",
                id
            ))),
        }
    }

    async fn record_sale(
        &self,
        sale: NewSaleRecord,
    ) -> Result<sale_record::Model, ServiceError> {
        let model = sale_record::Model {
            id: Uuid::new_v4(),
            location_id: sale.location_id,
            product_id: sale.product_id,
            quantity: sale.quantity,
            unit_price: sale.unit_price,
            currency: sale.currency,
            sale_date: sale.sale_date,
            sold_by: sale.sold_by,
            created_at: Utc::now(),
        };
        self.sales.write().await.push(model.clone());
        Ok(model)
    }
}
