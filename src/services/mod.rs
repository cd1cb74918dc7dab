//! Core services over the stock ledger.

pub mod allocation;
pub mod ledger_postings;
pub mod order_status;
pub mod receiving;
pub mod reservations;
pub mod stock_ledger;

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use sea_orm::DatabaseConnection;

use crate::{errors::ServiceError, events::EventSender};

pub use allocation::AllocationService;
pub use order_status::OrderReconcilerService;
pub use receiving::ReceivingService;
pub use reservations::ReservationService;
pub use stock_ledger::{SourceRef, StockLedgerService, StockSummary};

/// The bundle of core services sharing one pool and event channel.
#[derive(Clone)]
pub struct AppServices {
    pub receiving: ReceivingService,
    pub reservations: ReservationService,
    pub allocation: AllocationService,
    pub stock: StockLedgerService,
    pub orders: OrderReconcilerService,
}

impl AppServices {
    pub fn new(db: Arc<DatabaseConnection>, event_sender: Option<EventSender>) -> Self {
        Self {
            receiving: ReceivingService::new(db.clone(), event_sender.clone()),
            reservations: ReservationService::new(db.clone(), event_sender.clone()),
            allocation: AllocationService::new(db.clone(), event_sender.clone()),
            stock: StockLedgerService::new(db.clone()),
            orders: OrderReconcilerService::new(db, event_sender),
        }
    }
}

/// Bounds one mutation request. On expiry the future is dropped, which
/// rolls the in-flight database transaction back in full — a timed-out
/// request never leaves partial state behind.
pub async fn with_request_timeout<T, F>(limit: Duration, fut: F) -> Result<T, ServiceError>
where
    F: Future<Output = Result<T, ServiceError>>,
{
    match tokio::time::timeout(limit, fut).await {
        Ok(result) => result,
        Err(_) => Err(ServiceError::RequestTimeout),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn request_timeout_maps_to_typed_error() {
        let result: Result<(), _> = with_request_timeout(Duration::from_millis(10), async {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok(())
        })
        .await;
        assert!(matches!(result, Err(ServiceError::RequestTimeout)));
    }

    #[tokio::test]
    async fn request_timeout_passes_fast_results_through() {
        let result = with_request_timeout(Duration::from_secs(5), async { Ok(42) }).await;
        assert_eq!(result.unwrap(), 42);
    }
}
