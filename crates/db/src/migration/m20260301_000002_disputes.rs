//! Disputes migration.

use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        let db = manager.get_connection();
        db.execute_unprepared(DISPUTES_SQL).await?;
        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        let db = manager.get_connection();
        db.execute_unprepared("DROP TABLE IF EXISTS transaction_disputes CASCADE;")
            .await?;
        Ok(())
    }
}

const DISPUTES_SQL: &str = r"
CREATE TABLE transaction_disputes (
    id UUID PRIMARY KEY,
    transaction_id VARCHAR(40) NOT NULL REFERENCES financial_transactions(id),
    reason TEXT NOT NULL,
    logged_by VARCHAR(64) NOT NULL,
    status VARCHAR(16) NOT NULL DEFAULT 'OPEN',
    resolution_notes TEXT,
    logged_at TIMESTAMPTZ NOT NULL DEFAULT now(),
    resolved_at TIMESTAMPTZ,
    CONSTRAINT chk_dispute_status CHECK (status IN ('OPEN', 'INVESTIGATING', 'RESOLVED')),
    CONSTRAINT chk_dispute_resolution CHECK ((status = 'RESOLVED') = (resolved_at IS NOT NULL))
);

CREATE INDEX idx_disputes_transaction ON transaction_disputes(transaction_id, logged_at);
";
