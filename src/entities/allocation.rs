use chrono::{DateTime, Utc};
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// One row per (possibly partial) fulfillment of an issuance request.
///
/// `reversed_at` doubles as the idempotency marker for targeted reversal:
/// reversing a reference whose rows are all stamped is a conflict, not a
/// second restore.
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "allocations")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i64,
    pub item_id: Uuid,
    pub reference_type: String,
    pub reference_id: Uuid,
    pub requested_qty: i32,
    pub issued_qty: i32,
    pub short_qty: i32,
    pub created_at: DateTime<Utc>,
    pub reversed_at: Option<DateTime<Utc>>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}

impl Model {
    pub fn is_reversed(&self) -> bool {
        self.reversed_at.is_some()
    }

    pub fn fully_issued(&self) -> bool {
        self.short_qty == 0
    }
}
