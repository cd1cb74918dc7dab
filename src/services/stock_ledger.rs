//! Batch ledger and transaction log primitives.
//!
//! Everything here is generic over [`ConnectionTrait`] so the callers can
//! compose several primitives inside one enclosing database transaction:
//! a batch mutation and its paired transaction row either commit together
//! or not at all.

use std::sync::Arc;

use sea_orm::{
    ActiveModelTrait, ActiveValue::Set, ColumnTrait, ConnectionTrait, DatabaseConnection,
    EntityTrait, QueryFilter, QueryOrder, QuerySelect, TransactionTrait,
};
use serde::{Deserialize, Serialize};
use tracing::instrument;
use uuid::Uuid;

use crate::{
    entities::{
        stock_batch::{self, Entity as StockBatchEntity},
        stock_transaction::{self, Entity as StockTransactionEntity, TxnType},
    },
    errors::ServiceError,
};

/// Receipt identity a batch was created under; also the scope selector
/// for scoped allocation and receipt reversal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceRef {
    pub source_type: String,
    pub source_id: Uuid,
}

impl SourceRef {
    pub fn new(source_type: impl Into<String>, source_id: Uuid) -> Self {
        Self {
            source_type: source_type.into(),
            source_id,
        }
    }
}

pub(crate) fn ensure_positive_qty(qty: i32) -> Result<(), ServiceError> {
    if qty <= 0 {
        return Err(ServiceError::ValidationError(format!(
            "Quantity must be positive, got {}",
            qty
        )));
    }
    Ok(())
}

/// Creates a batch with `available_qty == received_qty`. The caller
/// appends the paired IN transaction in the same database transaction.
pub(crate) async fn create_batch<C: ConnectionTrait>(
    conn: &C,
    item_id: Uuid,
    qty: i32,
    unit_cost: rust_decimal::Decimal,
    source: &SourceRef,
    order_line_id: Option<Uuid>,
) -> Result<stock_batch::Model, ServiceError> {
    ensure_positive_qty(qty)?;

    let batch = stock_batch::ActiveModel {
        item_id: Set(item_id),
        source_type: Set(source.source_type.clone()),
        source_id: Set(source.source_id),
        order_line_id: Set(order_line_id),
        received_qty: Set(qty),
        available_qty: Set(qty),
        unit_cost: Set(unit_cost),
        created_at: Set(chrono::Utc::now()),
        ..Default::default()
    };

    batch.insert(conn).await.map_err(ServiceError::DatabaseError)
}

/// Deducts `qty` from a batch. The batch row must already be locked by
/// the enclosing transaction.
pub(crate) async fn deduct<C: ConnectionTrait>(
    conn: &C,
    batch: stock_batch::Model,
    qty: i32,
) -> Result<stock_batch::Model, ServiceError> {
    ensure_positive_qty(qty)?;

    if batch.available_qty < qty {
        return Err(ServiceError::InsufficientStock(format!(
            "Batch {} has {} available, cannot deduct {}",
            batch.id, batch.available_qty, qty
        )));
    }

    let next = batch.available_qty - qty;
    let mut active: stock_batch::ActiveModel = batch.into();
    active.available_qty = Set(next);
    active.update(conn).await.map_err(ServiceError::DatabaseError)
}

/// Restores `qty` onto a batch, capped at `received_qty`. Exceeding the
/// cap means a caller tried to give back more than was ever drawn.
pub(crate) async fn restore<C: ConnectionTrait>(
    conn: &C,
    batch: stock_batch::Model,
    qty: i32,
) -> Result<stock_batch::Model, ServiceError> {
    ensure_positive_qty(qty)?;

    if batch.available_qty + qty > batch.received_qty {
        return Err(ServiceError::invariant(format!(
            "Restoring {} onto batch {} would exceed received quantity ({} + {} > {})",
            qty, batch.id, batch.available_qty, qty, batch.received_qty
        )));
    }

    let next = batch.available_qty + qty;
    let mut active: stock_batch::ActiveModel = batch.into();
    active.available_qty = Set(next);
    active.update(conn).await.map_err(ServiceError::DatabaseError)
}

/// Appends one row to the movement log. Rows are never updated or
/// deleted; reversal appends compensating rows instead.
pub(crate) async fn append_txn<C: ConnectionTrait>(
    conn: &C,
    item_id: Uuid,
    batch_id: Option<i64>,
    qty: i32,
    txn_type: TxnType,
    reference_type: &str,
    reference_id: Uuid,
) -> Result<stock_transaction::Model, ServiceError> {
    ensure_positive_qty(qty)?;

    let row = stock_transaction::ActiveModel {
        item_id: Set(item_id),
        batch_id: Set(batch_id),
        qty: Set(qty),
        txn_type: Set(txn_type.as_str().to_string()),
        reference_type: Set(reference_type.to_string()),
        reference_id: Set(reference_id),
        ..Default::default()
    };

    row.insert(conn).await.map_err(ServiceError::DatabaseError)
}

/// Loads an item's batches oldest-first under an exclusive row lock,
/// optionally restricted to one receipt. Taking the locks before any
/// derived-sum read is what serializes concurrent decisions on the item.
pub(crate) async fn batches_for_update<C: ConnectionTrait>(
    conn: &C,
    item_id: Uuid,
    scope: Option<&SourceRef>,
) -> Result<Vec<stock_batch::Model>, ServiceError> {
    let mut query = StockBatchEntity::find().filter(stock_batch::Column::ItemId.eq(item_id));

    if let Some(source) = scope {
        query = query
            .filter(stock_batch::Column::SourceType.eq(source.source_type.as_str()))
            .filter(stock_batch::Column::SourceId.eq(source.source_id));
    }

    query
        .order_by_asc(stock_batch::Column::CreatedAt)
        .order_by_asc(stock_batch::Column::Id)
        .lock_exclusive()
        .all(conn)
        .await
        .map_err(ServiceError::DatabaseError)
}

/// Loads every batch created by one receipt under an exclusive row lock.
pub(crate) async fn batches_by_source_for_update<C: ConnectionTrait>(
    conn: &C,
    source: &SourceRef,
) -> Result<Vec<stock_batch::Model>, ServiceError> {
    StockBatchEntity::find()
        .filter(stock_batch::Column::SourceType.eq(source.source_type.as_str()))
        .filter(stock_batch::Column::SourceId.eq(source.source_id))
        .order_by_asc(stock_batch::Column::Id)
        .lock_exclusive()
        .all(conn)
        .await
        .map_err(ServiceError::DatabaseError)
}

/// Loads a single batch under an exclusive row lock.
pub(crate) async fn batch_for_update<C: ConnectionTrait>(
    conn: &C,
    batch_id: i64,
) -> Result<stock_batch::Model, ServiceError> {
    StockBatchEntity::find_by_id(batch_id)
        .lock_exclusive()
        .one(conn)
        .await
        .map_err(ServiceError::DatabaseError)?
        .ok_or_else(|| ServiceError::NotFound(format!("Batch {} not found", batch_id)))
}

/// Derived reserved quantity: `Σ RESERVE − Σ UNRESERVE` over the log.
pub(crate) async fn reserved_quantity<C: ConnectionTrait>(
    conn: &C,
    item_id: Uuid,
) -> Result<i32, ServiceError> {
    let rows = StockTransactionEntity::find()
        .filter(stock_transaction::Column::ItemId.eq(item_id))
        .filter(
            stock_transaction::Column::TxnType
                .is_in([TxnType::Reserve.as_str(), TxnType::Unreserve.as_str()]),
        )
        .all(conn)
        .await
        .map_err(ServiceError::DatabaseError)?;

    let mut reserved = 0i32;
    for row in &rows {
        match row.txn_type() {
            Some(TxnType::Reserve) => reserved += row.qty,
            Some(TxnType::Unreserve) => reserved -= row.qty,
            _ => {}
        }
    }

    if reserved < 0 {
        return Err(ServiceError::invariant(format!(
            "Derived reservation for item {} is negative ({})",
            item_id, reserved
        )));
    }

    Ok(reserved)
}

/// Movement rows of one type for a reference, used to undo an
/// allocation batch-by-batch and to net out prior compensations.
pub(crate) async fn txns_by_reference<C: ConnectionTrait>(
    conn: &C,
    reference_type: &str,
    reference_id: Uuid,
    txn_type: TxnType,
) -> Result<Vec<stock_transaction::Model>, ServiceError> {
    StockTransactionEntity::find()
        .filter(stock_transaction::Column::ReferenceType.eq(reference_type))
        .filter(stock_transaction::Column::ReferenceId.eq(reference_id))
        .filter(stock_transaction::Column::TxnType.eq(txn_type.as_str()))
        .order_by_asc(stock_transaction::Column::Id)
        .all(conn)
        .await
        .map_err(ServiceError::DatabaseError)
}

/// Point-in-time stock picture for one item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockSummary {
    pub available: i32,
    pub reserved: i32,
    pub free: i32,
}

/// Read-only queries over the ledger. Mutations live on the receiving,
/// reservation and allocation services.
#[derive(Clone)]
pub struct StockLedgerService {
    db: Arc<DatabaseConnection>,
}

impl StockLedgerService {
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }

    /// Physically available stock: `Σ available_qty` over the item's batches.
    #[instrument(skip(self))]
    pub async fn available_stock(&self, item_id: Uuid) -> Result<i32, ServiceError> {
        let batches = StockBatchEntity::find()
            .filter(stock_batch::Column::ItemId.eq(item_id))
            .all(&*self.db)
            .await
            .map_err(ServiceError::DatabaseError)?;

        Ok(batches.iter().map(|b| b.available_qty).sum())
    }

    /// Outstanding soft holds for the item.
    #[instrument(skip(self))]
    pub async fn reserved(&self, item_id: Uuid) -> Result<i32, ServiceError> {
        reserved_quantity(&*self.db, item_id).await
    }

    /// Free stock: available minus reserved. Reads both sums in one
    /// transaction so they describe the same instant.
    #[instrument(skip(self))]
    pub async fn free_stock(&self, item_id: Uuid) -> Result<i32, ServiceError> {
        Ok(self.summary(item_id).await?.free)
    }

    #[instrument(skip(self))]
    pub async fn summary(&self, item_id: Uuid) -> Result<StockSummary, ServiceError> {
        let txn = self
            .db
            .begin()
            .await
            .map_err(ServiceError::DatabaseError)?;

        let batches = StockBatchEntity::find()
            .filter(stock_batch::Column::ItemId.eq(item_id))
            .all(&txn)
            .await
            .map_err(ServiceError::DatabaseError)?;
        let available: i32 = batches.iter().map(|b| b.available_qty).sum();
        let reserved = reserved_quantity(&txn, item_id).await?;

        txn.commit().await.map_err(ServiceError::DatabaseError)?;

        Ok(StockSummary {
            available,
            reserved,
            free: available - reserved,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn positive_qty_guard_rejects_zero_and_negative() {
        assert!(ensure_positive_qty(1).is_ok());
        assert!(matches!(
            ensure_positive_qty(0),
            Err(ServiceError::ValidationError(_))
        ));
        assert!(matches!(
            ensure_positive_qty(-3),
            Err(ServiceError::ValidationError(_))
        ));
    }
}
