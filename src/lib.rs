//! Bookflow inventory core.
//!
//! Distributes books from publishers and suppliers to schools. This
//! crate is the inventory ledger and allocation engine: stock receipts
//! become batches, reservations place ledger-derived soft holds,
//! issuance consumes batches oldest-first, and cancellation appends
//! compensating movements — with the derived aggregates kept consistent
//! under concurrent access. Routing, master data, documents and
//! notifications live in the surrounding application.
#![forbid(unsafe_code)]
#![deny(rust_2018_idioms)]
#![allow(elided_lifetimes_in_paths)]
#![warn(clippy::all, clippy::perf, clippy::dbg_macro)]

pub mod config;
pub mod db;
pub mod entities;
pub mod errors;
pub mod events;
pub mod pricing;
pub mod services;

use std::sync::Arc;

use sea_orm::DatabaseConnection;

/// Shared application state handed to embedding callers.
#[derive(Clone)]
pub struct AppState {
    pub db: Arc<DatabaseConnection>,
    pub config: config::AppConfig,
    pub event_sender: events::EventSender,
    pub services: services::AppServices,
}

impl AppState {
    pub fn new(
        db: Arc<DatabaseConnection>,
        config: config::AppConfig,
        event_sender: events::EventSender,
    ) -> Self {
        let services = services::AppServices::new(db.clone(), Some(event_sender.clone()));
        Self {
            db,
            config,
            event_sender,
            services,
        }
    }

    /// Builds the full state from configuration: pool, optional
    /// migrations, event channel with the default logging consumer.
    pub async fn from_config(
        config: config::AppConfig,
    ) -> Result<Self, errors::ServiceError> {
        let pool = db::establish_connection_from_app_config(&config).await?;
        let (event_sender, receiver) = events::channel(config.event_buffer);
        let _ = events::spawn_event_logger(receiver);
        Ok(Self::new(Arc::new(pool), config, event_sender))
    }
}

pub mod prelude {
    pub use crate::config::AppConfig;
    pub use crate::errors::ServiceError;
    pub use crate::events::{Event, EventSender};
    pub use crate::pricing::Discount;
    pub use crate::services::{
        allocation::{AllocateStock, AllocationOutcome},
        order_status::{OrderFulfillment, OrderLineInput},
        receiving::{ReceiveOrderLine, ReceiveStock},
        AllocationService, AppServices, OrderReconcilerService, ReceivingService,
        ReservationService, SourceRef, StockLedgerService, StockSummary,
    };
    pub use crate::AppState;
}
