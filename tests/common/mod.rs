//! Test harness: fresh SQLite database per test with migrations applied.

use std::sync::Arc;

use rust_decimal::Decimal;
use tempfile::TempDir;
use uuid::Uuid;

use bookflow_api::{
    config::AppConfig,
    db, events,
    services::{receiving::ReceiveStock, AppServices, SourceRef},
    AppState,
};

pub struct TestApp {
    pub state: AppState,
    #[allow(dead_code)]
    event_task: tokio::task::JoinHandle<()>,
    _tmp: TempDir,
}

impl TestApp {
    /// Construct a new application state backed by a fresh database.
    pub async fn new() -> Self {
        let tmp = tempfile::tempdir().expect("failed to create temp dir");
        let db_path = tmp.path().join("bookflow_test.db");

        let mut cfg = AppConfig::new(
            format!("sqlite://{}?mode=rwc", db_path.display()),
            "test",
        );
        cfg.auto_migrate = true;
        cfg.db_max_connections = 1;
        cfg.db_min_connections = 1;

        let pool = db::establish_connection_from_app_config(&cfg)
            .await
            .expect("failed to create test database");

        let (sender, receiver) = events::channel(cfg.event_buffer);
        let event_task = events::spawn_event_logger(receiver);

        let state = AppState::new(Arc::new(pool), cfg, sender);

        Self {
            state,
            event_task,
            _tmp: tmp,
        }
    }

    pub fn services(&self) -> &AppServices {
        &self.state.services
    }

    /// Receives a standalone batch under a fresh receipt reference and
    /// returns (batch_id, source).
    #[allow(dead_code)]
    pub async fn receive_batch(
        &self,
        item_id: Uuid,
        quantity: i32,
        unit_cost: Decimal,
    ) -> (i64, SourceRef) {
        let source = SourceRef::new("receipt", Uuid::new_v4());
        let batch_id = self
            .services()
            .receiving
            .receive(ReceiveStock {
                item_id,
                quantity,
                unit_cost,
                party_id: Uuid::new_v4(),
                source_type: source.source_type.clone(),
                source_id: source.source_id,
            })
            .await
            .expect("receive failed");
        (batch_id, source)
    }

    /// Current available quantity of one batch, read straight from the
    /// ledger table.
    #[allow(dead_code)]
    pub async fn batch_available(&self, batch_id: i64) -> i32 {
        use bookflow_api::entities::stock_batch::Entity as StockBatchEntity;
        use sea_orm::EntityTrait;

        StockBatchEntity::find_by_id(batch_id)
            .one(&*self.state.db)
            .await
            .expect("query failed")
            .expect("batch missing")
            .available_qty
    }
}
