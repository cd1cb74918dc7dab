use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(LedgerPostings::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(LedgerPostings::Id)
                            .big_integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(LedgerPostings::PartyId).uuid().not_null())
                    .col(
                        ColumnDef::new(LedgerPostings::ReferenceType)
                            .string()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(LedgerPostings::ReferenceId)
                            .uuid()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(LedgerPostings::Amount)
                            .decimal_len(19, 4)
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(LedgerPostings::Direction)
                            .string_len(16)
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(LedgerPostings::PostedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .to_owned(),
            )
            .await?;

        // One posting per (party, reference) pair; re-posting the same
        // receipt must fail at the database as well as the service layer.
        manager
            .create_index(
                Index::create()
                    .name("idx_ledger_postings_party_reference")
                    .table(LedgerPostings::Table)
                    .col(LedgerPostings::PartyId)
                    .col(LedgerPostings::ReferenceType)
                    .col(LedgerPostings::ReferenceId)
                    .unique()
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(LedgerPostings::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
enum LedgerPostings {
    Table,
    Id,
    PartyId,
    ReferenceType,
    ReferenceId,
    Amount,
    Direction,
    PostedAt,
}
