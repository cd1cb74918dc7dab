use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sea_orm::entity::prelude::*;
use sea_orm::{ActiveValue, Set};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Direction of a stock movement.
///
/// RESERVE/UNRESERVE rows are batch-agnostic soft holds; IN/OUT rows are
/// paired with a batch mutation in the same database transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TxnType {
    In,
    Out,
    Reserve,
    Unreserve,
}

impl TxnType {
    pub fn as_str(&self) -> &'static str {
        match self {
            TxnType::In => "IN",
            TxnType::Out => "OUT",
            TxnType::Reserve => "RESERVE",
            TxnType::Unreserve => "UNRESERVE",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "IN" => Some(TxnType::In),
            "OUT" => Some(TxnType::Out),
            "RESERVE" => Some(TxnType::Reserve),
            "UNRESERVE" => Some(TxnType::Unreserve),
            _ => None,
        }
    }
}

/// Append-only stock movement log. Rows are immutable once written and
/// are the sole source of truth for the derived reserved quantity.
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "stock_transactions")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i64,
    pub item_id: Uuid,
    /// Null for RESERVE/UNRESERVE rows.
    pub batch_id: Option<i64>,
    pub qty: i32,
    pub txn_type: String,
    pub reference_type: String,
    pub reference_id: Uuid,
    pub created_at: DateTime<Utc>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::stock_batch::Entity",
        from = "Column::BatchId",
        to = "super::stock_batch::Column::Id"
    )]
    StockBatch,
}

impl Related<super::stock_batch::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::StockBatch.def()
    }
}

#[async_trait]
impl ActiveModelBehavior for ActiveModel {
    async fn before_save<C>(self, _db: &C, _insert: bool) -> Result<Self, DbErr>
    where
        C: ConnectionTrait,
    {
        let mut active_model = self;
        if let ActiveValue::NotSet = active_model.created_at {
            active_model.created_at = Set(Utc::now());
        }
        Ok(active_model)
    }
}

impl Model {
    pub fn txn_type(&self) -> Option<TxnType> {
        TxnType::from_str(&self.txn_type)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn txn_type_round_trips_through_storage_strings() {
        for t in [TxnType::In, TxnType::Out, TxnType::Reserve, TxnType::Unreserve] {
            assert_eq!(TxnType::from_str(t.as_str()), Some(t));
        }
        assert_eq!(TxnType::from_str("ADJUST"), None);
    }
}
