use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(Allocations::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(Allocations::Id)
                            .big_integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(Allocations::ItemId).uuid().not_null())
                    .col(
                        ColumnDef::new(Allocations::ReferenceType)
                            .string()
                            .not_null(),
                    )
                    .col(ColumnDef::new(Allocations::ReferenceId).uuid().not_null())
                    .col(
                        ColumnDef::new(Allocations::RequestedQty)
                            .integer()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(Allocations::IssuedQty)
                            .integer()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(Allocations::ShortQty)
                            .integer()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(Allocations::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(Allocations::ReversedAt)
                            .timestamp_with_time_zone()
                            .null(),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_allocations_reference")
                    .table(Allocations::Table)
                    .col(Allocations::ReferenceType)
                    .col(Allocations::ReferenceId)
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(Allocations::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
enum Allocations {
    Table,
    Id,
    ItemId,
    ReferenceType,
    ReferenceId,
    RequestedQty,
    IssuedQty,
    ShortQty,
    CreatedAt,
    ReversedAt,
}
