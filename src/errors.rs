use sea_orm::error::DbErr;
use serde::Serialize;
use tracing::error;

/// Error taxonomy for the stock ledger core.
///
/// Every variant rolls back the enclosing database transaction in full;
/// there is no partial application. Kinds surface to the caller as-is and
/// are never downgraded to a generic failure.
#[derive(Debug, thiserror::Error, Serialize)]
pub enum ServiceError {
    #[error("Database error: {0}")]
    DatabaseError(
        #[from]
        #[serde(skip)]
        sea_orm::error::DbErr,
    ),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Insufficient stock: {0}")]
    InsufficientStock(String),

    #[error("Insufficient free stock: {0}")]
    InsufficientFreeStock(String),

    #[error("Stock already consumed: {0}")]
    StockAlreadyConsumed(String),

    #[error("Invariant violation: {0}")]
    InvariantViolation(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Request timed out")]
    RequestTimeout,

    #[error("Event error: {0}")]
    EventError(String),

    #[error("Internal error: {0}")]
    InternalError(String),

    #[error("Other error: {0}")]
    Other(
        #[from]
        #[serde(skip)]
        anyhow::Error,
    ),
}

impl From<validator::ValidationErrors> for ServiceError {
    fn from(err: validator::ValidationErrors) -> Self {
        ServiceError::ValidationError(err.to_string())
    }
}

pub trait IntoDbErr {
    fn into_db_err(self) -> DbErr;
}

impl IntoDbErr for DbErr {
    fn into_db_err(self) -> DbErr {
        self
    }
}

impl IntoDbErr for String {
    fn into_db_err(self) -> DbErr {
        DbErr::Custom(self)
    }
}

impl IntoDbErr for &str {
    fn into_db_err(self) -> DbErr {
        DbErr::Custom(self.to_string())
    }
}

impl ServiceError {
    /// Generic constructor that normalizes any supported database error input.
    pub fn db_error<E: IntoDbErr>(error: E) -> Self {
        ServiceError::DatabaseError(error.into_db_err())
    }

    /// Constructor for should-never-happen conditions. Logged as an error
    /// before the transaction aborts; never recovered from.
    pub fn invariant(message: impl Into<String>) -> Self {
        let message = message.into();
        error!(message = %message, "stock ledger invariant violated");
        ServiceError::InvariantViolation(message)
    }

    /// Whether the failure is a lock-timeout or deadlock the caller may
    /// retry once with backoff. Every other kind surfaces directly.
    pub fn is_retryable_contention(&self) -> bool {
        match self {
            ServiceError::DatabaseError(db_err) => {
                let text = db_err.to_string().to_lowercase();
                text.contains("deadlock")
                    || text.contains("lock timeout")
                    || text.contains("lock wait timeout")
                    || text.contains("database is locked")
            }
            _ => false,
        }
    }

    /// Machine-readable kind, stable across message changes.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::DatabaseError(_) => "database_error",
            Self::NotFound(_) => "not_found",
            Self::ValidationError(_) => "validation_error",
            Self::InsufficientStock(_) => "insufficient_stock",
            Self::InsufficientFreeStock(_) => "insufficient_free_stock",
            Self::StockAlreadyConsumed(_) => "stock_already_consumed",
            Self::InvariantViolation(_) => "invariant_violation",
            Self::Conflict(_) => "conflict",
            Self::RequestTimeout => "request_timeout",
            Self::EventError(_) => "event_error",
            Self::InternalError(_) => "internal_error",
            Self::Other(_) => "other",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn db_error_normalizes_strings_and_dberr() {
        assert!(matches!(
            ServiceError::db_error("boom"),
            ServiceError::DatabaseError(DbErr::Custom(_))
        ));
        assert!(matches!(
            ServiceError::db_error(DbErr::Custom("x".into())),
            ServiceError::DatabaseError(_)
        ));
    }

    #[test]
    fn contention_probe_matches_lock_failures_only() {
        let locked = ServiceError::db_error("database is locked");
        assert!(locked.is_retryable_contention());

        let deadlock = ServiceError::db_error("Deadlock found when trying to get lock");
        assert!(deadlock.is_retryable_contention());

        let other = ServiceError::db_error("syntax error");
        assert!(!other.is_retryable_contention());

        assert!(!ServiceError::InsufficientStock("x".into()).is_retryable_contention());
        assert!(!ServiceError::RequestTimeout.is_retryable_contention());
    }

    #[test]
    fn kinds_are_distinct_for_the_stock_taxonomy() {
        let kinds = [
            ServiceError::InsufficientStock("a".into()).kind(),
            ServiceError::InsufficientFreeStock("b".into()).kind(),
            ServiceError::StockAlreadyConsumed("c".into()).kind(),
            ServiceError::InvariantViolation("d".into()).kind(),
            ServiceError::Conflict("e".into()).kind(),
        ];
        let mut deduped = kinds.to_vec();
        deduped.sort_unstable();
        deduped.dedup();
        assert_eq!(deduped.len(), kinds.len());
    }

    #[test]
    fn validator_errors_become_validation_errors() {
        use validator::Validate;

        #[derive(Validate)]
        struct Probe {
            #[validate(range(min = 1))]
            qty: i32,
        }

        let err = Probe { qty: 0 }.validate().unwrap_err();
        assert!(matches!(
            ServiceError::from(err),
            ServiceError::ValidationError(_)
        ));
    }
}
