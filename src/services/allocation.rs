//! FIFO allocation and targeted (per-reference) reversal.
//!
//! Issuance walks an item's batches oldest-first and deducts from each
//! until the need is met. Unscoped requests may end short; requests
//! scoped to one receipt are all-or-nothing because downstream
//! accounting assumes the receipt fully explains the allocation.

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::Utc;
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
        allocation::{self, Entity as AllocationEntity},
        stock_transaction::TxnType,
    },
    errors::ServiceError,
    events::{Event, EventSender},
    services::{stock_ledger, stock_ledger::SourceRef},
};

/// Reference type stamped on the compensating IN rows of a reversal.
pub const REF_ALLOCATION_REVERSAL: &str = "allocation_reversal";

/// An issuance request: sale, school delivery, bundle fulfillment.
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct AllocateStock {
    pub item_id: Uuid,
    #[validate(range(min = 1))]
    pub quantity: i32,
    /// The consuming requester, e.g. a sale or school delivery id.
    pub reference_type: String,
    pub reference_id: Uuid,
    /// Restrict the draw to one receipt's batches. Scoped requests are
    /// all-or-nothing.
    pub scope: Option<SourceRef>,
}

/// Quantity drawn from one batch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchDraw {
    pub batch_id: i64,
    pub quantity: i32,
    pub unit_cost: Decimal,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AllocationOutcome {
    pub allocation_id: i64,
    pub item_id: Uuid,
    pub reference_id: Uuid,
    pub requested_qty: i32,
    pub issued_qty: i32,
    pub short_qty: i32,
    pub draws: Vec<BatchDraw>,
}

impl AllocationOutcome {
    pub fn fully_allocated(&self) -> bool {
        self.short_qty == 0
    }

    /// Cost of the issued quantity at the drawn batches' unit costs.
    pub fn cost(&self) -> Decimal {
        self.draws
            .iter()
            .map(|d| d.unit_cost * Decimal::from(d.quantity))
            .sum()
    }
}

#[derive(Clone)]
pub struct AllocationService {
    db: Arc<DatabaseConnection>,
    event_sender: Option<EventSender>,
}

impl AllocationService {
    pub fn new(db: Arc<DatabaseConnection>, event_sender: Option<EventSender>) -> Self {
        Self { db, event_sender }
    }

    /// Issues stock against the oldest available batches.
    ///
    /// Availability here is physical `available_qty`; outstanding soft
    /// reservations for other commitments are not subtracted.
    #[instrument(skip(self, input), fields(item_id = %input.item_id, quantity = input.quantity))]
    pub async fn allocate(&self, input: AllocateStock) -> Result<AllocationOutcome, ServiceError> {
        input.validate()?;

        let txn = self.db.begin().await.map_err(ServiceError::DatabaseError)?;

        let existing = AllocationEntity::find()
            .filter(allocation::Column::ReferenceType.eq(input.reference_type.as_str()))
            .filter(allocation::Column::ReferenceId.eq(input.reference_id))
            .filter(allocation::Column::ReversedAt.is_null())
            .one(&txn)
            .await
            .map_err(ServiceError::DatabaseError)?;
        if existing.is_some() {
            return Err(ServiceError::Conflict(format!(
                "Allocation already exists for {} {}",
                input.reference_type, input.reference_id
            )));
        }

        let batches =
            stock_ledger::batches_for_update(&txn, input.item_id, input.scope.as_ref()).await?;

        if let Some(scope) = &input.scope {
            let in_scope: i32 = batches.iter().map(|b| b.available_qty).sum();
            if in_scope < input.quantity {
                // Rolls back with nothing touched.
                return Err(ServiceError::InsufficientStock(format!(
                    "Receipt {} {} holds {} available, cannot allocate {}",
                    scope.source_type, scope.source_id, in_scope, input.quantity
                )));
            }
        }

        let mut need = input.quantity;
        let mut draws: Vec<BatchDraw> = Vec::new();

        for batch in batches {
            if need == 0 {
                break;
            }
            let take = need.min(batch.available_qty);
            if take == 0 {
                continue;
            }

            let batch_id = batch.id;
            let item_id = batch.item_id;
            let unit_cost = batch.unit_cost;

            stock_ledger::deduct(&txn, batch, take).await?;
            stock_ledger::append_txn(
                &txn,
                item_id,
                Some(batch_id),
                take,
                TxnType::Out,
                &input.reference_type,
                input.reference_id,
            )
            .await?;

            draws.push(BatchDraw {
                batch_id,
                quantity: take,
                unit_cost,
            });
            need -= take;
        }

        let issued = input.quantity - need;
        let record = allocation::ActiveModel {
            item_id: Set(input.item_id),
            reference_type: Set(input.reference_type.clone()),
            reference_id: Set(input.reference_id),
            requested_qty: Set(input.quantity),
            issued_qty: Set(issued),
            short_qty: Set(need),
            created_at: Set(Utc::now()),
            reversed_at: Set(None),
            ..Default::default()
        };
        let record = record
            .insert(&txn)
            .await
            .map_err(ServiceError::DatabaseError)?;

        txn.commit().await.map_err(ServiceError::DatabaseError)?;

        if need > 0 {
            warn!(
                reference_id = %input.reference_id,
                requested = input.quantity,
                issued,
                short = need,
                "Partial allocation"
            );
        } else {
            info!(
                reference_id = %input.reference_id,
                issued,
                batches = draws.len(),
                "Stock allocated"
            );
        }

        if let Some(sender) = &self.event_sender {
            sender
                .send_or_log(Event::StockAllocated {
                    item_id: input.item_id,
                    reference_type: input.reference_type.clone(),
                    reference_id: input.reference_id,
                    requested_quantity: input.quantity,
                    issued_quantity: issued,
                    short_quantity: need,
                    fully_allocated: need == 0,
                })
                .await;
        }

        Ok(AllocationOutcome {
            allocation_id: record.id,
            item_id: input.item_id,
            reference_id: input.reference_id,
            requested_qty: input.quantity,
            issued_qty: issued,
            short_qty: need,
            draws,
        })
    }

    /// Undoes every draw made for `reference`, restoring each batch by
    /// the quantity its OUT row recorded and appending compensating IN
    /// rows. Idempotent: a second call finds only reversed allocation
    /// rows and returns `Conflict` without touching quantities.
    #[instrument(skip(self), fields(reference_type = %reference_type, reference_id = %reference_id))]
    pub async fn reverse_allocation(
        &self,
        reference_type: &str,
        reference_id: Uuid,
    ) -> Result<i32, ServiceError> {
        let txn = self.db.begin().await.map_err(ServiceError::DatabaseError)?;

        let records = AllocationEntity::find()
            .filter(allocation::Column::ReferenceType.eq(reference_type))
            .filter(allocation::Column::ReferenceId.eq(reference_id))
            .all(&txn)
            .await
            .map_err(ServiceError::DatabaseError)?;

        if records.is_empty() {
            return Err(ServiceError::NotFound(format!(
                "No allocation found for {} {}",
                reference_type, reference_id
            )));
        }

        let open: Vec<_> = records.into_iter().filter(|r| !r.is_reversed()).collect();
        if open.is_empty() {
            return Err(ServiceError::Conflict(format!(
                "Allocation {} {} is already reversed",
                reference_type, reference_id
            )));
        }

        let out_rows =
            stock_ledger::txns_by_reference(&txn, reference_type, reference_id, TxnType::Out)
                .await?;
        let compensated = stock_ledger::txns_by_reference(
            &txn,
            REF_ALLOCATION_REVERSAL,
            reference_id,
            TxnType::In,
        )
        .await?;

        let mut per_batch: BTreeMap<i64, (Uuid, i32)> = BTreeMap::new();
        for row in &out_rows {
            let batch_id = row.batch_id.ok_or_else(|| {
                ServiceError::invariant(format!(
                    "OUT transaction {} has no batch reference",
                    row.id
                ))
            })?;
            let entry = per_batch.entry(batch_id).or_insert((row.item_id, 0));
            entry.1 += row.qty;
        }
        // Net out IN rows from earlier reversals so a draw is never
        // restored twice, even across re-allocations under one reference.
        for row in &compensated {
            if let Some(batch_id) = row.batch_id {
                if let Some(entry) = per_batch.get_mut(&batch_id) {
                    entry.1 -= row.qty;
                }
            }
        }

        let mut restored = 0i32;
        for (batch_id, (item_id, qty)) in per_batch {
            if qty <= 0 {
                continue;
            }
            let batch = stock_ledger::batch_for_update(&txn, batch_id).await?;
            stock_ledger::restore(&txn, batch, qty).await?;
            stock_ledger::append_txn(
                &txn,
                item_id,
                Some(batch_id),
                qty,
                TxnType::In,
                REF_ALLOCATION_REVERSAL,
                reference_id,
            )
            .await?;
            restored += qty;
        }

        let now = Utc::now();
        for record in open {
            let mut active: allocation::ActiveModel = record.into();
            active.reversed_at = Set(Some(now));
            active
                .update(&txn)
                .await
                .map_err(ServiceError::DatabaseError)?;
        }

        txn.commit().await.map_err(ServiceError::DatabaseError)?;

        info!(
            reference_id = %reference_id,
            restored,
            "Allocation reversed"
        );

        if let Some(sender) = &self.event_sender {
            sender
                .send_or_log(Event::AllocationReversed {
                    reference_type: reference_type.to_string(),
                    reference_id,
                    restored_quantity: restored,
                })
                .await;
        }

        Ok(restored)
    }
}
