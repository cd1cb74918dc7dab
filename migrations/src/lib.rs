pub use sea_orm_migration::prelude::*;

mod m20240501_000001_create_stock_batches_table;
mod m20240501_000002_create_stock_transactions_table;
mod m20240501_000003_create_allocations_table;
mod m20240501_000004_create_purchase_orders_tables;
mod m20240501_000005_create_ledger_postings_table;

pub struct Migrator;

#[async_trait::async_trait]
impl MigratorTrait for Migrator {
    fn migrations() -> Vec<Box<dyn MigrationTrait>> {
        vec![
            Box::new(m20240501_000001_create_stock_batches_table::Migration),
            Box::new(m20240501_000002_create_stock_transactions_table::Migration),
            Box::new(m20240501_000003_create_allocations_table::Migration),
            Box::new(m20240501_000004_create_purchase_orders_tables::Migration),
            Box::new(m20240501_000005_create_ledger_postings_table::Migration),
        ]
    }
}
