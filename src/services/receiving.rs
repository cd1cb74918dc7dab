//! Stock receiving and receipt-level reversal.
//!
//! A receiving event creates one batch per line plus a paired IN
//! transaction and a debit posting on the supplier account, all in one
//! database transaction. Reversal is the mirror image and is only
//! permitted while every batch of the receipt is untouched.

use std::sync::Arc;

use rust_decimal::Decimal;
use sea_orm::{
    ActiveModelTrait, ActiveValue::Set, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter,
    TransactionTrait,
};
use serde::{Deserialize, Serialize};
use tracing::{info, instrument, warn};
use uuid::Uuid;
use validator::Validate;

use crate::{
    entities::{
        ledger_posting::PostingDirection,
        purchase_order_line::{self, Entity as OrderLineEntity},
        stock_transaction::TxnType,
    },
    errors::ServiceError,
    events::{Event, EventSender},
    services::{ledger_postings, order_status, stock_ledger, stock_ledger::SourceRef},
};

/// Source type used for purchase-order-linked receipts.
pub const SOURCE_RECEIPT: &str = "receipt";
/// Reference type stamped on the compensating OUT rows of a reversal.
pub const REF_RECEIPT_REVERSAL: &str = "receipt_reversal";

/// A standalone receiving event (not tied to a purchase order).
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct ReceiveStock {
    pub item_id: Uuid,
    #[validate(range(min = 1))]
    pub quantity: i32,
    pub unit_cost: Decimal,
    /// Supplier (or other party) debited for the goods.
    pub party_id: Uuid,
    /// Receipt identity; retrying with the same identity is a conflict,
    /// not a second batch.
    pub source_type: String,
    pub source_id: Uuid,
}

/// One line of a purchase-order receipt.
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct ReceiveOrderLine {
    pub line_id: Uuid,
    #[validate(range(min = 1))]
    pub quantity: i32,
}

#[derive(Clone)]
pub struct ReceivingService {
    db: Arc<DatabaseConnection>,
    event_sender: Option<EventSender>,
}

impl ReceivingService {
    pub fn new(db: Arc<DatabaseConnection>, event_sender: Option<EventSender>) -> Self {
        Self { db, event_sender }
    }

    /// Receives stock outside of any purchase order. Returns the new
    /// batch id.
    #[instrument(skip(self, input), fields(item_id = %input.item_id, quantity = input.quantity))]
    pub async fn receive(&self, input: ReceiveStock) -> Result<i64, ServiceError> {
        input.validate()?;
        if input.unit_cost < Decimal::ZERO {
            return Err(ServiceError::ValidationError(
                "Unit cost cannot be negative".to_string(),
            ));
        }

        let source = SourceRef::new(input.source_type.clone(), input.source_id);

        let txn = self.db.begin().await.map_err(ServiceError::DatabaseError)?;

        let existing = stock_ledger::batches_by_source_for_update(&txn, &source).await?;
        if !existing.is_empty() {
            return Err(ServiceError::Conflict(format!(
                "Receipt {} {} is already posted",
                source.source_type, source.source_id
            )));
        }

        let batch = stock_ledger::create_batch(
            &txn,
            input.item_id,
            input.quantity,
            input.unit_cost,
            &source,
            None,
        )
        .await?;

        stock_ledger::append_txn(
            &txn,
            input.item_id,
            Some(batch.id),
            input.quantity,
            TxnType::In,
            &source.source_type,
            source.source_id,
        )
        .await?;

        let amount = input.unit_cost * Decimal::from(input.quantity);
        ledger_postings::post(
            &txn,
            input.party_id,
            &source.source_type,
            source.source_id,
            amount,
            PostingDirection::Debit,
        )
        .await?;

        txn.commit().await.map_err(ServiceError::DatabaseError)?;

        info!(
            batch_id = batch.id,
            item_id = %input.item_id,
            quantity = input.quantity,
            "Stock received"
        );

        if let Some(sender) = &self.event_sender {
            sender
                .send_or_log(Event::StockReceived {
                    item_id: input.item_id,
                    batch_id: batch.id,
                    quantity: input.quantity,
                    reference_type: source.source_type.clone(),
                    reference_id: source.source_id,
                })
                .await;
        }

        Ok(batch.id)
    }

    /// Receives one or more purchase-order lines under a single receipt
    /// identity. Creates a batch + IN transaction per line, bumps the
    /// lines' received quantities, posts the supplier debit and
    /// recomputes the order status — one transaction for all of it.
    #[instrument(skip(self, lines), fields(order_id = %order_id, receipt_id = %receipt_id))]
    pub async fn receive_order_lines(
        &self,
        order_id: Uuid,
        receipt_id: Uuid,
        lines: Vec<ReceiveOrderLine>,
    ) -> Result<Vec<i64>, ServiceError> {
        if lines.is_empty() {
            return Err(ServiceError::ValidationError(
                "Receipt must contain at least one line".to_string(),
            ));
        }
        for line in &lines {
            line.validate()?;
        }

        let source = SourceRef::new(SOURCE_RECEIPT, receipt_id);
        let mut events: Vec<Event> = Vec::new();

        let txn = self.db.begin().await.map_err(ServiceError::DatabaseError)?;

        let order = order_status::order_for_update(&txn, order_id).await?;

        if order.cancelled {
            // Stock physically arrived; surface the mismatch instead of
            // silently reconciling the cancelled order.
            warn!(order_id = %order_id, receipt_id = %receipt_id,
                "Receipt posted against a cancelled order");
            events.push(Event::OrderStatusConflict {
                order_id,
                reference_id: receipt_id,
            });
        }

        let existing = stock_ledger::batches_by_source_for_update(&txn, &source).await?;
        if !existing.is_empty() {
            return Err(ServiceError::Conflict(format!(
                "Receipt {} is already posted",
                receipt_id
            )));
        }

        let mut batch_ids = Vec::with_capacity(lines.len());
        let mut amount = Decimal::ZERO;

        for request in &lines {
            let line = OrderLineEntity::find_by_id(request.line_id)
                .filter(purchase_order_line::Column::OrderId.eq(order_id))
                .one(&txn)
                .await
                .map_err(ServiceError::DatabaseError)?
                .ok_or_else(|| {
                    ServiceError::NotFound(format!(
                        "Order line {} not found on order {}",
                        request.line_id, order_id
                    ))
                })?;

            if line.received_qty + request.quantity > line.ordered_qty {
                return Err(ServiceError::ValidationError(format!(
                    "Cannot receive more than ordered on line {}. Ordered: {}, already received: {}, trying to receive: {}",
                    line.id, line.ordered_qty, line.received_qty, request.quantity
                )));
            }

            let batch = stock_ledger::create_batch(
                &txn,
                line.item_id,
                request.quantity,
                line.unit_cost,
                &source,
                Some(line.id),
            )
            .await?;

            stock_ledger::append_txn(
                &txn,
                line.item_id,
                Some(batch.id),
                request.quantity,
                TxnType::In,
                SOURCE_RECEIPT,
                receipt_id,
            )
            .await?;

            amount += line.discount().apply(line.unit_cost, request.quantity);

            events.push(Event::StockReceived {
                item_id: line.item_id,
                batch_id: batch.id,
                quantity: request.quantity,
                reference_type: SOURCE_RECEIPT.to_string(),
                reference_id: receipt_id,
            });
            batch_ids.push(batch.id);

            let received = line.received_qty + request.quantity;
            let mut active: purchase_order_line::ActiveModel = line.into();
            active.received_qty = Set(received);
            active
                .update(&txn)
                .await
                .map_err(ServiceError::DatabaseError)?;
        }

        ledger_postings::post(
            &txn,
            order.supplier_id,
            SOURCE_RECEIPT,
            receipt_id,
            amount,
            PostingDirection::Debit,
        )
        .await?;

        if let Some((old_status, new_status)) =
            order_status::recompute_on(&txn, &order).await?
        {
            events.push(Event::OrderStatusChanged {
                order_id,
                old_status,
                new_status,
            });
        }

        txn.commit().await.map_err(ServiceError::DatabaseError)?;

        info!(
            order_id = %order_id,
            receipt_id = %receipt_id,
            batches = batch_ids.len(),
            "Purchase order receipt posted"
        );

        if let Some(sender) = &self.event_sender {
            for event in events {
                sender.send_or_log(event).await;
            }
        }

        Ok(batch_ids)
    }

    /// Reverses an entire receipt. All-or-nothing: every batch the
    /// receipt created must still be untouched, otherwise the call fails
    /// with `StockAlreadyConsumed` and changes nothing.
    #[instrument(skip(self), fields(source_type = %source.source_type, source_id = %source.source_id))]
    pub async fn reverse_receipt(&self, source: &SourceRef) -> Result<(), ServiceError> {
        let mut events: Vec<Event> = Vec::new();

        let txn = self.db.begin().await.map_err(ServiceError::DatabaseError)?;

        let batches = stock_ledger::batches_by_source_for_update(&txn, source).await?;
        if batches.is_empty() {
            return Err(ServiceError::NotFound(format!(
                "No receipt found for {} {}",
                source.source_type, source.source_id
            )));
        }

        // A receipt whose posting is gone was already reversed; the
        // zeroed batches must not be misread as consumed stock.
        let posting =
            ledger_postings::find_by_reference(&txn, &source.source_type, source.source_id)
                .await?;
        if posting.is_none() {
            return Err(ServiceError::Conflict(format!(
                "Receipt {} {} is already reversed",
                source.source_type, source.source_id
            )));
        }

        if let Some(consumed) = batches.iter().find(|b| !b.is_untouched()) {
            return Err(ServiceError::StockAlreadyConsumed(format!(
                "Batch {} of receipt {} has {} of {} units consumed",
                consumed.id,
                source.source_id,
                consumed.consumed_qty(),
                consumed.received_qty
            )));
        }

        let mut total_reversed = 0i32;
        let mut affected_orders: Vec<Uuid> = Vec::new();

        for batch in batches {
            let qty = batch.received_qty;
            let item_id = batch.item_id;
            let batch_id = batch.id;
            let order_line_id = batch.order_line_id;

            stock_ledger::deduct(&txn, batch, qty).await?;
            stock_ledger::append_txn(
                &txn,
                item_id,
                Some(batch_id),
                qty,
                TxnType::Out,
                REF_RECEIPT_REVERSAL,
                source.source_id,
            )
            .await?;
            total_reversed += qty;

            if let Some(line_id) = order_line_id {
                let line = OrderLineEntity::find_by_id(line_id)
                    .one(&txn)
                    .await
                    .map_err(ServiceError::DatabaseError)?
                    .ok_or_else(|| {
                        ServiceError::NotFound(format!("Order line {} not found", line_id))
                    })?;

                if line.received_qty < qty {
                    return Err(ServiceError::invariant(format!(
                        "Order line {} has received {} but receipt reversal returns {}",
                        line.id, line.received_qty, qty
                    )));
                }

                let order_id = line.order_id;
                let received = line.received_qty - qty;
                let mut active: purchase_order_line::ActiveModel = line.into();
                active.received_qty = Set(received);
                active
                    .update(&txn)
                    .await
                    .map_err(ServiceError::DatabaseError)?;

                if !affected_orders.contains(&order_id) {
                    affected_orders.push(order_id);
                }
            }
        }

        ledger_postings::remove(&txn, &source.source_type, source.source_id).await?;

        for order_id in affected_orders {
            let order = order_status::order_for_update(&txn, order_id).await?;
            if let Some((old_status, new_status)) =
                order_status::recompute_on(&txn, &order).await?
            {
                events.push(Event::OrderStatusChanged {
                    order_id,
                    old_status,
                    new_status,
                });
            }
        }

        txn.commit().await.map_err(ServiceError::DatabaseError)?;

        info!(
            source_id = %source.source_id,
            quantity = total_reversed,
            "Receipt reversed"
        );

        if let Some(sender) = &self.event_sender {
            sender
                .send_or_log(Event::ReceiptReversed {
                    reference_type: source.source_type.clone(),
                    reference_id: source.source_id,
                    quantity: total_reversed,
                })
                .await;
            for event in events {
                sender.send_or_log(event).await;
            }
        }

        Ok(())
    }
}
