use chrono::{DateTime, Utc};
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A discrete lot of stock created by one receiving event.
///
/// `available_qty` starts equal to `received_qty` and only moves through
/// deduct/restore; `0 <= available_qty <= received_qty` at all times.
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "stock_batches")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i64,
    pub item_id: Uuid,
    /// Receipt identity this batch was born from.
    pub source_type: String,
    pub source_id: Uuid,
    /// Purchase order line the receipt was posted against, when any.
    pub order_line_id: Option<Uuid>,
    pub received_qty: i32,
    pub available_qty: i32,
    #[sea_orm(column_type = "Decimal(Some((19, 4)))")]
    pub unit_cost: rust_decimal::Decimal,
    pub created_at: DateTime<Utc>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::stock_transaction::Entity")]
    StockTransactions,
}

impl Related<super::stock_transaction::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::StockTransactions.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}

impl Model {
    /// A batch no allocation has ever drawn from (or every draw was reversed).
    pub fn is_untouched(&self) -> bool {
        self.available_qty == self.received_qty
    }

    pub fn consumed_qty(&self) -> i32 {
        self.received_qty - self.available_qty
    }
}
