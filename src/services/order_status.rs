//! Purchase order reconciliation.
//!
//! Fulfillment status is a pure function of the order's quantities and
//! cancelled flag, recomputed in full after every receiving or reversal
//! event. Nothing ever patches the stored status incrementally, so it
//! cannot drift from the underlying quantities.

use std::sync::Arc;

use chrono::Utc;
use rust_decimal::Decimal;
use sea_orm::{
    ActiveModelTrait, ActiveValue::Set, ColumnTrait, ConnectionTrait, DatabaseConnection,
    EntityTrait, QueryFilter, QuerySelect, TransactionTrait,
};
use serde::{Deserialize, Serialize};
use tracing::{info, instrument};
use uuid::Uuid;
use validator::Validate;

use crate::{
    entities::{
        purchase_order::{self, Entity as PurchaseOrderEntity, PurchaseOrderStatus},
        purchase_order_line::{self, Entity as OrderLineEntity},
    },
    errors::ServiceError,
    events::{Event, EventSender},
    pricing::Discount,
};

/// Recompute rule for the fulfillment state machine.
///
/// `cancelled` is sticky and only ever set by explicit action; a receipt
/// against a cancelled order leaves the status untouched. An order that
/// has received nothing stays `draft` until it is sent.
pub fn derive_status(
    previous: PurchaseOrderStatus,
    ordered: i32,
    received: i32,
    cancelled: bool,
) -> PurchaseOrderStatus {
    if cancelled {
        PurchaseOrderStatus::Cancelled
    } else if received == 0 {
        if previous == PurchaseOrderStatus::Draft {
            PurchaseOrderStatus::Draft
        } else {
            PurchaseOrderStatus::Sent
        }
    } else if received < ordered {
        PurchaseOrderStatus::PartialReceived
    } else {
        PurchaseOrderStatus::Completed
    }
}

/// Loads an order under an exclusive row lock.
pub(crate) async fn order_for_update<C: ConnectionTrait>(
    conn: &C,
    order_id: Uuid,
) -> Result<purchase_order::Model, ServiceError> {
    PurchaseOrderEntity::find_by_id(order_id)
        .lock_exclusive()
        .one(conn)
        .await
        .map_err(ServiceError::DatabaseError)?
        .ok_or_else(|| ServiceError::NotFound(format!("Order {} not found", order_id)))
}

/// Recomputes and stores the status of an already-locked order. Returns
/// the (old, new) pair when the stored status actually changed.
pub(crate) async fn recompute_on<C: ConnectionTrait>(
    conn: &C,
    order: &purchase_order::Model,
) -> Result<Option<(PurchaseOrderStatus, PurchaseOrderStatus)>, ServiceError> {
    let lines = OrderLineEntity::find()
        .filter(purchase_order_line::Column::OrderId.eq(order.id))
        .all(conn)
        .await
        .map_err(ServiceError::DatabaseError)?;

    let ordered: i32 = lines.iter().map(|l| l.ordered_qty).sum();
    let received: i32 = lines.iter().map(|l| l.received_qty).sum();

    let previous = order.status().ok_or_else(|| {
        ServiceError::invariant(format!(
            "Order {} carries unknown status '{}'",
            order.id, order.status
        ))
    })?;

    let next = derive_status(previous, ordered, received, order.cancelled);
    if next == previous {
        return Ok(None);
    }

    let mut active: purchase_order::ActiveModel = order.clone().into();
    active.status = Set(next.to_string());
    active.updated_at = Set(Utc::now());
    active
        .update(conn)
        .await
        .map_err(ServiceError::DatabaseError)?;

    Ok(Some((previous, next)))
}

/// One line of demand to aggregate into an order.
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct OrderLineInput {
    pub item_id: Uuid,
    #[validate(range(min = 1))]
    pub quantity: i32,
    pub unit_cost: Decimal,
    /// Line-level override; `Discount::None` falls through to the
    /// supplier default.
    #[serde(default)]
    pub discount: Discount,
}

/// Ordered/received totals and the current status of one order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderFulfillment {
    pub order_id: Uuid,
    pub ordered_qty: i32,
    pub received_qty: i32,
    pub outstanding_qty: i32,
    pub status: PurchaseOrderStatus,
}

#[derive(Clone)]
pub struct OrderReconcilerService {
    db: Arc<DatabaseConnection>,
    event_sender: Option<EventSender>,
}

impl OrderReconcilerService {
    pub fn new(db: Arc<DatabaseConnection>, event_sender: Option<EventSender>) -> Self {
        Self { db, event_sender }
    }

    /// Aggregates demand into a draft order. Duplicate item lines are
    /// merged by summing their quantities; merging lines that disagree on
    /// cost or discount would silently pick one, so that is rejected.
    #[instrument(skip(self, lines), fields(supplier_id = %supplier_id, lines = lines.len()))]
    pub async fn create_order(
        &self,
        supplier_id: Uuid,
        lines: Vec<OrderLineInput>,
        supplier_discount: Discount,
    ) -> Result<purchase_order::Model, ServiceError> {
        if lines.is_empty() {
            return Err(ServiceError::ValidationError(
                "Order must contain at least one line".to_string(),
            ));
        }
        if !supplier_discount.is_valid() {
            return Err(ServiceError::ValidationError(
                "Supplier discount is out of range".to_string(),
            ));
        }

        let mut merged: Vec<OrderLineInput> = Vec::new();
        for line in lines {
            line.validate()?;
            if line.unit_cost < Decimal::ZERO {
                return Err(ServiceError::ValidationError(
                    "Unit cost cannot be negative".to_string(),
                ));
            }
            if !line.discount.is_valid() {
                return Err(ServiceError::ValidationError(
                    "Line discount is out of range".to_string(),
                ));
            }

            match merged.iter_mut().find(|m| m.item_id == line.item_id) {
                Some(existing) => {
                    if existing.unit_cost != line.unit_cost || existing.discount != line.discount {
                        return Err(ServiceError::ValidationError(format!(
                            "Conflicting cost or discount for item {} across demand lines",
                            line.item_id
                        )));
                    }
                    existing.quantity += line.quantity;
                }
                None => merged.push(line),
            }
        }

        let txn = self.db.begin().await.map_err(ServiceError::DatabaseError)?;

        let now = Utc::now();
        let order = purchase_order::ActiveModel {
            id: Set(Uuid::new_v4()),
            supplier_id: Set(supplier_id),
            status: Set(PurchaseOrderStatus::Draft.to_string()),
            cancelled: Set(false),
            created_at: Set(now),
            updated_at: Set(now),
        };
        let order = order
            .insert(&txn)
            .await
            .map_err(ServiceError::DatabaseError)?;

        for line in merged {
            let discount =
                Discount::resolve(line.discount, Discount::None, supplier_discount);
            let (discount_percent, discount_amount) = discount.into_columns();

            let row = purchase_order_line::ActiveModel {
                id: Set(Uuid::new_v4()),
                order_id: Set(order.id),
                item_id: Set(line.item_id),
                ordered_qty: Set(line.quantity),
                received_qty: Set(0),
                unit_cost: Set(line.unit_cost),
                discount_percent: Set(discount_percent),
                discount_amount: Set(discount_amount),
            };
            row.insert(&txn)
                .await
                .map_err(ServiceError::DatabaseError)?;
        }

        txn.commit().await.map_err(ServiceError::DatabaseError)?;

        info!(order_id = %order.id, "Purchase order created");

        Ok(order)
    }

    /// Moves a draft order to `sent`.
    #[instrument(skip(self), fields(order_id = %order_id))]
    pub async fn mark_sent(&self, order_id: Uuid) -> Result<purchase_order::Model, ServiceError> {
        let txn = self.db.begin().await.map_err(ServiceError::DatabaseError)?;

        let order = order_for_update(&txn, order_id).await?;
        if order.status() != Some(PurchaseOrderStatus::Draft) {
            return Err(ServiceError::ValidationError(format!(
                "Only draft orders can be sent; order {} is '{}'",
                order_id, order.status
            )));
        }

        let mut active: purchase_order::ActiveModel = order.into();
        active.status = Set(PurchaseOrderStatus::Sent.to_string());
        active.updated_at = Set(Utc::now());
        let updated = active
            .update(&txn)
            .await
            .map_err(ServiceError::DatabaseError)?;

        txn.commit().await.map_err(ServiceError::DatabaseError)?;

        info!(order_id = %order_id, "Purchase order sent");

        if let Some(sender) = &self.event_sender {
            sender
                .send_or_log(Event::OrderStatusChanged {
                    order_id,
                    old_status: PurchaseOrderStatus::Draft,
                    new_status: PurchaseOrderStatus::Sent,
                })
                .await;
        }

        Ok(updated)
    }

    /// Cancels an order. Only an explicit action ever reaches the
    /// cancelled state, and it is terminal.
    #[instrument(skip(self), fields(order_id = %order_id))]
    pub async fn cancel_order(
        &self,
        order_id: Uuid,
    ) -> Result<purchase_order::Model, ServiceError> {
        let txn = self.db.begin().await.map_err(ServiceError::DatabaseError)?;

        let order = order_for_update(&txn, order_id).await?;
        let previous = order.status().ok_or_else(|| {
            ServiceError::invariant(format!(
                "Order {} carries unknown status '{}'",
                order.id, order.status
            ))
        })?;

        if previous.is_terminal() {
            return Err(ServiceError::ValidationError(format!(
                "Cannot cancel order {} in terminal state '{}'",
                order_id, previous
            )));
        }

        let mut active: purchase_order::ActiveModel = order.into();
        active.cancelled = Set(true);
        active.status = Set(PurchaseOrderStatus::Cancelled.to_string());
        active.updated_at = Set(Utc::now());
        let updated = active
            .update(&txn)
            .await
            .map_err(ServiceError::DatabaseError)?;

        txn.commit().await.map_err(ServiceError::DatabaseError)?;

        info!(order_id = %order_id, "Purchase order cancelled");

        if let Some(sender) = &self.event_sender {
            sender
                .send_or_log(Event::OrderStatusChanged {
                    order_id,
                    old_status: previous,
                    new_status: PurchaseOrderStatus::Cancelled,
                })
                .await;
        }

        Ok(updated)
    }

    /// Recomputes the stored status from the order's quantities.
    #[instrument(skip(self), fields(order_id = %order_id))]
    pub async fn recompute_status(
        &self,
        order_id: Uuid,
    ) -> Result<PurchaseOrderStatus, ServiceError> {
        let txn = self.db.begin().await.map_err(ServiceError::DatabaseError)?;

        let order = order_for_update(&txn, order_id).await?;
        let change = recompute_on(&txn, &order).await?;
        let status = match change {
            Some((_, new_status)) => new_status,
            None => order.status().ok_or_else(|| {
                ServiceError::invariant(format!(
                    "Order {} carries unknown status '{}'",
                    order.id, order.status
                ))
            })?,
        };

        txn.commit().await.map_err(ServiceError::DatabaseError)?;

        if let Some((old_status, new_status)) = change {
            if let Some(sender) = &self.event_sender {
                sender
                    .send_or_log(Event::OrderStatusChanged {
                        order_id,
                        old_status,
                        new_status,
                    })
                    .await;
            }
        }

        Ok(status)
    }

    /// Ordered/received totals and the current status.
    #[instrument(skip(self), fields(order_id = %order_id))]
    pub async fn fulfillment(&self, order_id: Uuid) -> Result<OrderFulfillment, ServiceError> {
        let order = PurchaseOrderEntity::find_by_id(order_id)
            .one(&*self.db)
            .await
            .map_err(ServiceError::DatabaseError)?
            .ok_or_else(|| ServiceError::NotFound(format!("Order {} not found", order_id)))?;

        let lines = OrderLineEntity::find()
            .filter(purchase_order_line::Column::OrderId.eq(order_id))
            .all(&*self.db)
            .await
            .map_err(ServiceError::DatabaseError)?;

        let ordered: i32 = lines.iter().map(|l| l.ordered_qty).sum();
        let received: i32 = lines.iter().map(|l| l.received_qty).sum();
        let status = order.status().ok_or_else(|| {
            ServiceError::invariant(format!(
                "Order {} carries unknown status '{}'",
                order.id, order.status
            ))
        })?;

        Ok(OrderFulfillment {
            order_id,
            ordered_qty: ordered,
            received_qty: received,
            outstanding_qty: ordered - received,
            status,
        })
    }

    /// Lines of an order, for callers assembling receipts.
    #[instrument(skip(self), fields(order_id = %order_id))]
    pub async fn order_lines(
        &self,
        order_id: Uuid,
    ) -> Result<Vec<purchase_order_line::Model>, ServiceError> {
        OrderLineEntity::find()
            .filter(purchase_order_line::Column::OrderId.eq(order_id))
            .all(&*self.db)
            .await
            .map_err(ServiceError::DatabaseError)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use rstest::rstest;

    use crate::entities::purchase_order::PurchaseOrderStatus::*;

    #[rstest]
    #[case(Draft, 140, 0, false, Draft)]
    #[case(Sent, 140, 0, false, Sent)]
    #[case(Sent, 140, 125, false, PartialReceived)]
    #[case(Sent, 140, 140, false, Completed)]
    #[case(PartialReceived, 140, 0, false, Sent)]
    #[case(PartialReceived, 140, 140, false, Completed)]
    #[case(Cancelled, 140, 125, true, Cancelled)]
    #[case(Sent, 140, 125, true, Cancelled)]
    fn derive_status_cases(
        #[case] previous: PurchaseOrderStatus,
        #[case] ordered: i32,
        #[case] received: i32,
        #[case] cancelled: bool,
        #[case] expected: PurchaseOrderStatus,
    ) {
        assert_eq!(derive_status(previous, ordered, received, cancelled), expected);
    }

    #[test]
    fn cancelled_is_sticky_for_any_quantities() {
        for received in [0, 1, 139, 140, 200] {
            assert_eq!(derive_status(Cancelled, 140, received, true), Cancelled);
        }
    }

    proptest! {
        #[test]
        fn derive_status_is_total_and_consistent(
            ordered in 0i32..10_000,
            received in 0i32..10_000,
            cancelled: bool,
        ) {
            for previous in [Draft, Sent, PartialReceived, Completed, Cancelled] {
                let next = derive_status(previous, ordered, received, cancelled);
                if cancelled {
                    prop_assert_eq!(next, Cancelled);
                } else if received == 0 {
                    prop_assert!(next == Draft || next == Sent);
                } else if received < ordered {
                    prop_assert_eq!(next, PartialReceived);
                } else {
                    prop_assert_eq!(next, Completed);
                }
            }
        }
    }
}
