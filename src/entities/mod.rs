//! SeaORM entities for the stock ledger and purchase order tables.

pub mod allocation;
pub mod ledger_posting;
pub mod purchase_order;
pub mod purchase_order_line;
pub mod stock_batch;
pub mod stock_transaction;
