//! Soft reservations, derived entirely from the movement log.
//!
//! A reservation never mutates batch rows; it only shrinks the pool the
//! next reservation check considers free. That lets several pending
//! commitments coexist before any of them draws from specific batches.

use std::sync::Arc;

use sea_orm::{DatabaseConnection, TransactionTrait};
use tracing::{info, instrument};
use uuid::Uuid;

use crate::{
    entities::stock_transaction::TxnType,
    errors::ServiceError,
    events::{Event, EventSender},
    services::stock_ledger,
};

#[derive(Clone)]
pub struct ReservationService {
    db: Arc<DatabaseConnection>,
    event_sender: Option<EventSender>,
}

impl ReservationService {
    pub fn new(db: Arc<DatabaseConnection>, event_sender: Option<EventSender>) -> Self {
        Self { db, event_sender }
    }

    /// Places a soft hold of `quantity` units for `reference`.
    ///
    /// The item's batch rows are locked before the free-stock sum is
    /// computed, so two concurrent reservations against the same item
    /// serialize instead of both passing the check on a stale snapshot.
    #[instrument(skip(self), fields(item_id = %item_id, quantity))]
    pub async fn reserve(
        &self,
        item_id: Uuid,
        quantity: i32,
        reference_type: &str,
        reference_id: Uuid,
    ) -> Result<(), ServiceError> {
        stock_ledger::ensure_positive_qty(quantity)?;

        let txn = self.db.begin().await.map_err(ServiceError::DatabaseError)?;

        let batches = stock_ledger::batches_for_update(&txn, item_id, None).await?;
        let available: i32 = batches.iter().map(|b| b.available_qty).sum();
        let reserved = stock_ledger::reserved_quantity(&txn, item_id).await?;
        let free = available - reserved;

        if free < quantity {
            return Err(ServiceError::InsufficientFreeStock(format!(
                "Item {} has {} free ({} available, {} reserved), cannot reserve {}",
                item_id, free, available, reserved, quantity
            )));
        }

        stock_ledger::append_txn(
            &txn,
            item_id,
            None,
            quantity,
            TxnType::Reserve,
            reference_type,
            reference_id,
        )
        .await?;

        txn.commit().await.map_err(ServiceError::DatabaseError)?;

        info!(
            item_id = %item_id,
            quantity,
            reference_id = %reference_id,
            "Reserved stock"
        );

        if let Some(sender) = &self.event_sender {
            sender
                .send_or_log(Event::StockReserved {
                    item_id,
                    quantity,
                    reference_type: reference_type.to_string(),
                    reference_id,
                })
                .await;
        }

        Ok(())
    }

    /// Releases a previously placed hold. Releasing more than is
    /// currently outstanding would drive the derived sum negative and is
    /// rejected.
    #[instrument(skip(self), fields(item_id = %item_id, quantity))]
    pub async fn unreserve(
        &self,
        item_id: Uuid,
        quantity: i32,
        reference_type: &str,
        reference_id: Uuid,
    ) -> Result<(), ServiceError> {
        stock_ledger::ensure_positive_qty(quantity)?;

        let txn = self.db.begin().await.map_err(ServiceError::DatabaseError)?;

        // Same lock scope as reserve, so release and reserve serialize.
        let _batches = stock_ledger::batches_for_update(&txn, item_id, None).await?;
        let reserved = stock_ledger::reserved_quantity(&txn, item_id).await?;

        if quantity > reserved {
            return Err(ServiceError::ValidationError(format!(
                "Cannot release {} from item {}; only {} reserved",
                quantity, item_id, reserved
            )));
        }

        stock_ledger::append_txn(
            &txn,
            item_id,
            None,
            quantity,
            TxnType::Unreserve,
            reference_type,
            reference_id,
        )
        .await?;

        txn.commit().await.map_err(ServiceError::DatabaseError)?;

        info!(
            item_id = %item_id,
            quantity,
            reference_id = %reference_id,
            "Released reservation"
        );

        if let Some(sender) = &self.event_sender {
            sender
                .send_or_log(Event::StockReleased {
                    item_id,
                    quantity,
                    reference_type: reference_type.to_string(),
                    reference_id,
                })
                .await;
        }

        Ok(())
    }

    /// Outstanding reserved quantity for an item.
    #[instrument(skip(self))]
    pub async fn reserved(&self, item_id: Uuid) -> Result<i32, ServiceError> {
        stock_ledger::reserved_quantity(&*self.db, item_id).await
    }
}
