use chrono::{DateTime, NaiveDate, Utc};
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// A physically distinguishable lot of one product at one location.
///
/// Quantities only move through the deduction/credit executors (and their
/// rollback); rows are never deleted except to undo a credit insert.
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "stock_batches")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub product_id: Uuid,
    pub location_id: Uuid,
    /// Unique within (location, product); transfer credits merge on it.
    pub batch_number: String,
    pub quantity_on_hand: i32,
    pub quantity_reserved: i32,
    #[sea_orm(column_type = "Decimal(Some((19, 4)))")]
    pub unit_cost: rust_decimal::Decimal,
    pub manufactured_date: NaiveDate,
    pub expiry_date: NaiveDate,
    pub quality_status: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::product::Entity",
        from = "Column::ProductId",
        to = "super::product::Column::Id"
    )]
    Product,
    #[sea_orm(
        belongs_to = "super::location::Entity",
        from = "Column::LocationId",
        to = "super::location::Column::Id"
    )]
    Location,
}

impl Related<super::product::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Product.def()
    }
}

impl Related<super::location::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Location.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}

/// Quality state of a batch. Only `Ok` batches are eligible for allocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum QualityStatus {
    Ok,
    Damaged,
    Quarantine,
}

impl QualityStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            QualityStatus::Ok => "OK",
            QualityStatus::Damaged => "DAMAGED",
            QualityStatus::Quarantine => "QUARANTINE",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "OK" => Some(QualityStatus::Ok),
            "DAMAGED" => Some(QualityStatus::Damaged),
            "QUARANTINE" => Some(QualityStatus::Quarantine),
            _ => None,
        }
    }
}

impl std::fmt::Display for QualityStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Model {
    pub fn is_allocatable(&self) -> bool {
        self.quality_status == QualityStatus::Ok.as_str() && self.quantity_on_hand > 0
    }
}
