//! Ledger schema.
//!
//! - `transactions`: requested transfers and their lifecycle
//! - `ledger_entries`: signed postings, two per transaction
//! - `idempotency_keys`: caller keys bound to the transaction they produced
//! - `reconciliation_reports`: append-only reconciliation results

use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[derive(Iden)]
enum Transactions {
    Table,
    Id,
    SourceAccountId,
    DestinationAccountId,
    AmountMinor,
    OutstandingMinor,
    Status,
    ParentTransactionId,
    Metadata,
    CreatedAt,
    UpdatedAt,
}

#[derive(Iden)]
enum LedgerEntries {
    Table,
    Id,
    TransactionId,
    AccountId,
    AmountMinor,
    Kind,
    BalanceAfterMinor,
    CreatedAt,
}

#[derive(Iden)]
enum IdempotencyKeys {
    Table,
    Key,
    TransactionId,
    CreatedAt,
}

#[derive(Iden)]
enum ReconciliationReports {
    Table,
    Id,
    AccountId,
    WindowStart,
    WindowEnd,
    TransactionCount,
    DiscrepancyCount,
    ExpectedBalanceMinor,
    ActualBalanceMinor,
    Balanced,
    Discrepancies,
    CreatedAt,
}

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(Transactions::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(Transactions::Id)
                            .string()
                            .not_null()
                            .primary_key(),
                    )
                    .col(
                        ColumnDef::new(Transactions::SourceAccountId)
                            .string()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(Transactions::DestinationAccountId)
                            .string()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(Transactions::AmountMinor)
                            .big_integer()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(Transactions::OutstandingMinor)
                            .big_integer()
                            .not_null(),
                    )
                    .col(ColumnDef::new(Transactions::Status).string().not_null())
                    .col(ColumnDef::new(Transactions::ParentTransactionId).string())
                    .col(
                        ColumnDef::new(Transactions::Metadata)
                            .text()
                            .not_null()
                            .default(""),
                    )
                    .col(
                        ColumnDef::new(Transactions::CreatedAt)
                            .timestamp()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(Transactions::UpdatedAt)
                            .timestamp()
                            .not_null(),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk-transactions-parent_transaction_id")
                            .from(Transactions::Table, Transactions::ParentTransactionId)
                            .to(Transactions::Table, Transactions::Id),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx-transactions-created_at")
                    .table(Transactions::Table)
                    .col(Transactions::CreatedAt)
                    .col(Transactions::Id)
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx-transactions-parent_transaction_id")
                    .table(Transactions::Table)
                    .col(Transactions::ParentTransactionId)
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(LedgerEntries::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(LedgerEntries::Id)
                            .string()
                            .not_null()
                            .primary_key(),
                    )
                    .col(
                        ColumnDef::new(LedgerEntries::TransactionId)
                            .string()
                            .not_null(),
                    )
                    .col(ColumnDef::new(LedgerEntries::AccountId).string().not_null())
                    .col(
                        ColumnDef::new(LedgerEntries::AmountMinor)
                            .big_integer()
                            .not_null(),
                    )
                    .col(ColumnDef::new(LedgerEntries::Kind).string().not_null())
                    .col(ColumnDef::new(LedgerEntries::BalanceAfterMinor).big_integer())
                    .col(
                        ColumnDef::new(LedgerEntries::CreatedAt)
                            .timestamp()
                            .not_null(),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk-ledger_entries-transaction_id")
                            .from(LedgerEntries::Table, LedgerEntries::TransactionId)
                            .to(Transactions::Table, Transactions::Id),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx-ledger_entries-account_id-created_at")
                    .table(LedgerEntries::Table)
                    .col(LedgerEntries::AccountId)
                    .col(LedgerEntries::CreatedAt)
                    .col(LedgerEntries::Id)
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx-ledger_entries-transaction_id")
                    .table(LedgerEntries::Table)
                    .col(LedgerEntries::TransactionId)
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(IdempotencyKeys::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(IdempotencyKeys::Key)
                            .string()
                            .not_null()
                            .primary_key(),
                    )
                    .col(
                        ColumnDef::new(IdempotencyKeys::TransactionId)
                            .string()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(IdempotencyKeys::CreatedAt)
                            .timestamp()
                            .not_null(),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk-idempotency_keys-transaction_id")
                            .from(IdempotencyKeys::Table, IdempotencyKeys::TransactionId)
                            .to(Transactions::Table, Transactions::Id),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(ReconciliationReports::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(ReconciliationReports::Id)
                            .string()
                            .not_null()
                            .primary_key(),
                    )
                    .col(
                        ColumnDef::new(ReconciliationReports::AccountId)
                            .string()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(ReconciliationReports::WindowStart)
                            .timestamp()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(ReconciliationReports::WindowEnd)
                            .timestamp()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(ReconciliationReports::TransactionCount)
                            .big_integer()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(ReconciliationReports::DiscrepancyCount)
                            .big_integer()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(ReconciliationReports::ExpectedBalanceMinor)
                            .big_integer()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(ReconciliationReports::ActualBalanceMinor)
                            .big_integer()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(ReconciliationReports::Balanced)
                            .boolean()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(ReconciliationReports::Discrepancies)
                            .text()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(ReconciliationReports::CreatedAt)
                            .timestamp()
                            .not_null(),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx-reconciliation_reports-account_id-created_at")
                    .table(ReconciliationReports::Table)
                    .col(ReconciliationReports::AccountId)
                    .col(ReconciliationReports::CreatedAt)
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        // Reverse creation order so foreign keys never dangle.
        manager
            .drop_table(Table::drop().table(ReconciliationReports::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(IdempotencyKeys::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(LedgerEntries::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(Transactions::Table).to_owned())
            .await?;
        Ok(())
    }
}
