//! Idempotent financial ledger-of-record postings.
//!
//! Postings are keyed by `(party_id, reference_type, reference_id)` and
//! always written or removed on the caller's transaction, in the same
//! atomic unit as the stock change they account for.

use chrono::Utc;
use rust_decimal::Decimal;
use sea_orm::{
    ActiveModelTrait, ActiveValue::Set, ColumnTrait, ConnectionTrait, EntityTrait, ModelTrait,
    QueryFilter, SqlErr,
};
use uuid::Uuid;

use crate::{
    entities::ledger_posting::{self, Entity as LedgerPostingEntity, PostingDirection},
    errors::ServiceError,
};

pub(crate) async fn find_by_reference<C: ConnectionTrait>(
    conn: &C,
    reference_type: &str,
    reference_id: Uuid,
) -> Result<Option<ledger_posting::Model>, ServiceError> {
    LedgerPostingEntity::find()
        .filter(ledger_posting::Column::ReferenceType.eq(reference_type))
        .filter(ledger_posting::Column::ReferenceId.eq(reference_id))
        .one(conn)
        .await
        .map_err(ServiceError::DatabaseError)
}

/// Creates the posting for a reference; a second posting under the same
/// key is a duplicate of an idempotent operation.
pub(crate) async fn post<C: ConnectionTrait>(
    conn: &C,
    party_id: Uuid,
    reference_type: &str,
    reference_id: Uuid,
    amount: Decimal,
    direction: PostingDirection,
) -> Result<ledger_posting::Model, ServiceError> {
    let existing = LedgerPostingEntity::find()
        .filter(ledger_posting::Column::PartyId.eq(party_id))
        .filter(ledger_posting::Column::ReferenceType.eq(reference_type))
        .filter(ledger_posting::Column::ReferenceId.eq(reference_id))
        .one(conn)
        .await
        .map_err(ServiceError::DatabaseError)?;

    if existing.is_some() {
        return Err(ServiceError::Conflict(format!(
            "Ledger posting already exists for {} {}",
            reference_type, reference_id
        )));
    }

    let posting = ledger_posting::ActiveModel {
        party_id: Set(party_id),
        reference_type: Set(reference_type.to_string()),
        reference_id: Set(reference_id),
        amount: Set(amount),
        direction: Set(direction),
        posted_at: Set(Utc::now()),
        ..Default::default()
    };

    // Two transactions can both pass the existence check; the unique
    // index on (party, reference) decides the race.
    posting.insert(conn).await.map_err(|e| match e.sql_err() {
        Some(SqlErr::UniqueConstraintViolation(_)) => ServiceError::Conflict(format!(
            "Ledger posting already exists for {} {}",
            reference_type, reference_id
        )),
        _ => ServiceError::DatabaseError(e),
    })
}

/// Removes the posting for a reference. Returns whether a row was
/// actually removed, so callers can distinguish a repeat removal.
pub(crate) async fn remove<C: ConnectionTrait>(
    conn: &C,
    reference_type: &str,
    reference_id: Uuid,
) -> Result<bool, ServiceError> {
    match find_by_reference(conn, reference_type, reference_id).await? {
        Some(posting) => {
            posting
                .delete(conn)
                .await
                .map_err(ServiceError::DatabaseError)?;
            Ok(true)
        }
        None => Ok(false),
    }
}
