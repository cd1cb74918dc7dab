use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Posting direction on the party account.
#[derive(Debug, Clone, PartialEq, Eq, EnumIter, DeriveActiveEnum, Serialize, Deserialize)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(16))")]
pub enum PostingDirection {
    #[sea_orm(string_value = "debit")]
    Debit,
    #[sea_orm(string_value = "credit")]
    Credit,
}

/// Financial ledger-of-record row, created and removed idempotently,
/// keyed by `(party_id, reference_type, reference_id)`, always inside the
/// same transaction as the stock change it accounts for.
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "ledger_postings")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i64,
    pub party_id: Uuid,
    pub reference_type: String,
    pub reference_id: Uuid,
    #[sea_orm(column_type = "Decimal(Some((19, 4)))")]
    pub amount: Decimal,
    pub direction: PostingDirection,
    pub posted_at: DateTime<Utc>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}

impl Model {
    /// Positive for debit, negative for credit.
    pub fn signed_amount(&self) -> Decimal {
        match self.direction {
            PostingDirection::Debit => self.amount,
            PostingDirection::Credit => -self.amount,
        }
    }
}
