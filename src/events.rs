//! Domain events emitted after each committed stock mutation.
//!
//! Events are advisory: delivery failure is logged and never fails the
//! operation that produced them.

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::entities::purchase_order::PurchaseOrderStatus;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Event {
    StockReceived {
        item_id: Uuid,
        batch_id: i64,
        quantity: i32,
        reference_type: String,
        reference_id: Uuid,
    },
    ReceiptReversed {
        reference_type: String,
        reference_id: Uuid,
        quantity: i32,
    },
    StockReserved {
        item_id: Uuid,
        quantity: i32,
        reference_type: String,
        reference_id: Uuid,
    },
    StockReleased {
        item_id: Uuid,
        quantity: i32,
        reference_type: String,
        reference_id: Uuid,
    },
    StockAllocated {
        item_id: Uuid,
        reference_type: String,
        reference_id: Uuid,
        requested_quantity: i32,
        issued_quantity: i32,
        short_quantity: i32,
        fully_allocated: bool,
    },
    AllocationReversed {
        reference_type: String,
        reference_id: Uuid,
        restored_quantity: i32,
    },
    OrderStatusChanged {
        order_id: Uuid,
        old_status: PurchaseOrderStatus,
        new_status: PurchaseOrderStatus,
    },
    /// A receipt arrived against a cancelled order; surfaced for an
    /// operator rather than silently reconciled.
    OrderStatusConflict {
        order_id: Uuid,
        reference_id: Uuid,
    },
}

#[derive(Debug, Clone)]
pub struct EventSender {
    sender: mpsc::Sender<Event>,
}

impl EventSender {
    pub fn new(sender: mpsc::Sender<Event>) -> Self {
        Self { sender }
    }

    /// Sends an event asynchronously.
    pub async fn send(&self, event: Event) -> Result<(), String> {
        self.sender
            .send(event)
            .await
            .map_err(|e| format!("Failed to send event: {}", e))
    }

    /// Sends an event, logging instead of failing when the receiver is gone.
    pub async fn send_or_log(&self, event: Event) {
        if let Err(e) = self.send(event).await {
            error!("Dropping domain event: {}", e);
        }
    }
}

/// Creates a bounded event channel.
pub fn channel(capacity: usize) -> (EventSender, mpsc::Receiver<Event>) {
    let (tx, rx) = mpsc::channel(capacity);
    (EventSender::new(tx), rx)
}

/// Spawns the default consumer, which logs every event until the channel
/// closes. Callers that need richer handling hold the receiver themselves.
pub fn spawn_event_logger(mut receiver: mpsc::Receiver<Event>) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(event) = receiver.recv().await {
            match &event {
                Event::StockAllocated {
                    reference_id,
                    fully_allocated: false,
                    issued_quantity,
                    requested_quantity,
                    ..
                } => {
                    warn!(
                        reference_id = %reference_id,
                        issued = issued_quantity,
                        requested = requested_quantity,
                        "Partial allocation"
                    );
                }
                Event::OrderStatusConflict {
                    order_id,
                    reference_id,
                } => {
                    warn!(
                        order_id = %order_id,
                        reference_id = %reference_id,
                        "Receipt posted against a cancelled order"
                    );
                }
                other => info!("Domain event: {:?}", other),
            }
        }
        warn!("Event processing loop has ended");
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn send_or_log_survives_a_closed_channel() {
        let (sender, receiver) = channel(1);
        drop(receiver);
        // Must not panic or error out.
        sender
            .send_or_log(Event::ReceiptReversed {
                reference_type: "receipt".into(),
                reference_id: Uuid::new_v4(),
                quantity: 5,
            })
            .await;
    }

    #[tokio::test]
    async fn events_are_delivered_in_order() {
        let (sender, mut receiver) = channel(4);
        let item_id = Uuid::new_v4();
        for qty in [1, 2] {
            sender
                .send(Event::StockReserved {
                    item_id,
                    quantity: qty,
                    reference_type: "bundle".into(),
                    reference_id: Uuid::new_v4(),
                })
                .await
                .unwrap();
        }
        let first = receiver.recv().await.unwrap();
        assert!(matches!(first, Event::StockReserved { quantity: 1, .. }));
        let second = receiver.recv().await.unwrap();
        assert!(matches!(second, Event::StockReserved { quantity: 2, .. }));
    }
}
