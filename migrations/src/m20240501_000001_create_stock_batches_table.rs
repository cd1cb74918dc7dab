use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(StockBatches::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(StockBatches::Id)
                            .big_integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(StockBatches::ItemId).uuid().not_null())
                    .col(
                        ColumnDef::new(StockBatches::SourceType)
                            .string()
                            .not_null(),
                    )
                    .col(ColumnDef::new(StockBatches::SourceId).uuid().not_null())
                    .col(ColumnDef::new(StockBatches::OrderLineId).uuid().null())
                    .col(
                        ColumnDef::new(StockBatches::ReceivedQty)
                            .integer()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(StockBatches::AvailableQty)
                            .integer()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(StockBatches::UnitCost)
                            .decimal_len(19, 4)
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(StockBatches::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .to_owned(),
            )
            .await?;

        // FIFO scans and per-receipt lookups both hit this table hard.
        manager
            .create_index(
                Index::create()
                    .name("idx_stock_batches_item_created")
                    .table(StockBatches::Table)
                    .col(StockBatches::ItemId)
                    .col(StockBatches::CreatedAt)
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_stock_batches_source")
                    .table(StockBatches::Table)
                    .col(StockBatches::SourceType)
                    .col(StockBatches::SourceId)
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(StockBatches::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
enum StockBatches {
    Table,
    Id,
    ItemId,
    SourceType,
    SourceId,
    OrderLineId,
    ReceivedQty,
    AvailableQty,
    UnitCost,
    CreatedAt,
}
