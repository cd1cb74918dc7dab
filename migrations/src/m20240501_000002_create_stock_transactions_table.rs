use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(StockTransactions::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(StockTransactions::Id)
                            .big_integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(StockTransactions::ItemId).uuid().not_null())
                    .col(
                        ColumnDef::new(StockTransactions::BatchId)
                            .big_integer()
                            .null(),
                    )
                    .col(
                        ColumnDef::new(StockTransactions::Qty)
                            .integer()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(StockTransactions::TxnType)
                            .string()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(StockTransactions::ReferenceType)
                            .string()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(StockTransactions::ReferenceId)
                            .uuid()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(StockTransactions::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_stock_transactions_item")
                    .table(StockTransactions::Table)
                    .col(StockTransactions::ItemId)
                    .col(StockTransactions::TxnType)
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_stock_transactions_reference")
                    .table(StockTransactions::Table)
                    .col(StockTransactions::ReferenceType)
                    .col(StockTransactions::ReferenceId)
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(StockTransactions::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
enum StockTransactions {
    Table,
    Id,
    ItemId,
    BatchId,
    Qty,
    TxnType,
    ReferenceType,
    ReferenceId,
    CreatedAt,
}
