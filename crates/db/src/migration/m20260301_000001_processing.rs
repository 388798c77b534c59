//! Processing schema.
//!
//! Creates the transaction record, its channel details, standing orders and
//! bulk batch headers.

use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        let db = manager.get_connection();
        db.execute_unprepared(PROCESSING_SQL).await?;
        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        let db = manager.get_connection();
        db.execute_unprepared(
            r"
DROP TABLE IF EXISTS transaction_channel_details CASCADE;
DROP TABLE IF EXISTS financial_transactions CASCADE;
DROP TABLE IF EXISTS bulk_payment_batches CASCADE;
DROP TABLE IF EXISTS standing_orders CASCADE;
",
        )
        .await?;
        Ok(())
    }
}

const PROCESSING_SQL: &str = r"
CREATE TABLE standing_orders (
    id UUID PRIMARY KEY,
    customer_id VARCHAR(64) NOT NULL,
    debit_account VARCHAR(34) NOT NULL,
    credit_account_number VARCHAR(34) NOT NULL,
    credit_bank_code VARCHAR(12),
    credit_account_name VARCHAR(255),
    amount NUMERIC(19, 2) NOT NULL,
    currency VARCHAR(3) NOT NULL,
    narration TEXT NOT NULL,
    frequency VARCHAR(16) NOT NULL,
    start_date DATE NOT NULL,
    end_date DATE,
    next_execution_date DATE NOT NULL,
    last_execution_date DATE,
    is_active BOOLEAN NOT NULL DEFAULT TRUE,
    failure_count INTEGER NOT NULL DEFAULT 0,
    pending_transaction_id VARCHAR(40),
    version INTEGER NOT NULL DEFAULT 0,
    created_at TIMESTAMPTZ NOT NULL DEFAULT now(),
    updated_at TIMESTAMPTZ NOT NULL DEFAULT now(),
    CONSTRAINT chk_standing_order_amount CHECK (amount > 0),
    CONSTRAINT chk_standing_order_dates CHECK (end_date IS NULL OR end_date >= start_date),
    CONSTRAINT chk_standing_order_frequency
        CHECK (frequency IN ('DAILY', 'WEEKLY', 'MONTHLY', 'QUARTERLY', 'ANNUALLY'))
);

-- Scheduler scan
CREATE INDEX idx_standing_orders_due ON standing_orders(next_execution_date) WHERE is_active;

CREATE INDEX idx_standing_orders_customer ON standing_orders(customer_id, created_at);

CREATE TABLE bulk_payment_batches (
    id UUID PRIMARY KEY,
    name VARCHAR(255) NOT NULL,
    debit_account VARCHAR(34) NOT NULL,
    currency VARCHAR(3) NOT NULL,
    total_amount NUMERIC(19, 2) NOT NULL,
    item_count INTEGER NOT NULL,
    status VARCHAR(32) NOT NULL,
    successful_count INTEGER NOT NULL DEFAULT 0,
    failed_count INTEGER NOT NULL DEFAULT 0,
    initiated_by VARCHAR(64) NOT NULL,
    created_at TIMESTAMPTZ NOT NULL DEFAULT now(),
    processed_at TIMESTAMPTZ,
    CONSTRAINT chk_batch_counts CHECK (successful_count + failed_count <= item_count),
    CONSTRAINT chk_batch_status CHECK (status IN (
        'PENDING_PROCESSING', 'PROCESSING', 'COMPLETED', 'COMPLETED_WITH_DISCREPANCIES'
    ))
);

-- Recovery scan
CREATE INDEX idx_batches_unfinished ON bulk_payment_batches(created_at)
    WHERE status IN ('PENDING_PROCESSING', 'PROCESSING');

CREATE TABLE financial_transactions (
    id VARCHAR(40) PRIMARY KEY,
    category VARCHAR(32) NOT NULL,
    channel VARCHAR(16) NOT NULL,
    status VARCHAR(24) NOT NULL,
    amount NUMERIC(19, 2) NOT NULL,
    currency VARCHAR(3) NOT NULL,
    debit_account_number VARCHAR(34),
    debit_bank_code VARCHAR(12),
    debit_account_name VARCHAR(255),
    credit_account_number VARCHAR(34) NOT NULL,
    credit_bank_code VARCHAR(12),
    credit_account_name VARCHAR(255),
    narration TEXT NOT NULL,
    initiated_by VARCHAR(64) NOT NULL,
    fee_amount NUMERIC(19, 2) NOT NULL DEFAULT 0,
    tax_amount NUMERIC(19, 2) NOT NULL DEFAULT 0,
    external_reference VARCHAR(64) UNIQUE,
    response_code VARCHAR(8),
    response_message VARCHAR(255),
    system_remarks TEXT,
    retry_count INTEGER NOT NULL DEFAULT 0,
    is_reversal BOOLEAN NOT NULL DEFAULT FALSE,
    original_transaction_id VARCHAR(40) REFERENCES financial_transactions(id),
    batch_id UUID REFERENCES bulk_payment_batches(id),
    standing_order_id UUID REFERENCES standing_orders(id),
    initiated_at TIMESTAMPTZ NOT NULL DEFAULT now(),
    processed_at TIMESTAMPTZ,
    external_system_at TIMESTAMPTZ,
    updated_at TIMESTAMPTZ NOT NULL DEFAULT now(),
    -- insertion order, used to list batch items as submitted
    entry_seq BIGINT GENERATED ALWAYS AS IDENTITY,
    CONSTRAINT chk_transaction_amount CHECK (amount > 0),
    CONSTRAINT chk_transaction_charges CHECK (fee_amount >= 0 AND tax_amount >= 0),
    CONSTRAINT chk_reversal_link CHECK (is_reversal = (original_transaction_id IS NOT NULL)),
    CONSTRAINT chk_transaction_status CHECK (status IN (
        'PENDING', 'PROCESSING', 'AWAITING_RETRY', 'PENDING_APPROVAL', 'FLAGGED_SUSPICION',
        'SUCCESSFUL', 'FAILED', 'TIMEOUT', 'PARTIALLY_SUCCESSFUL', 'REVERSED', 'CANCELLED'
    ))
);

-- At most one reversal that has not failed or been cancelled
CREATE UNIQUE INDEX idx_transactions_live_reversal ON financial_transactions(original_transaction_id)
    WHERE is_reversal AND status NOT IN ('FAILED', 'CANCELLED');

-- Account history, both sides
CREATE INDEX idx_transactions_debit_account
    ON financial_transactions(debit_account_number, initiated_at DESC);
CREATE INDEX idx_transactions_credit_account
    ON financial_transactions(credit_account_number, initiated_at DESC);

-- Recovery scan over non-terminal work
CREATE INDEX idx_transactions_in_flight ON financial_transactions(updated_at)
    WHERE status IN ('PENDING', 'PROCESSING', 'AWAITING_RETRY');

CREATE INDEX idx_transactions_batch ON financial_transactions(batch_id, entry_seq)
    WHERE batch_id IS NOT NULL;

CREATE INDEX idx_transactions_standing_order ON financial_transactions(standing_order_id)
    WHERE standing_order_id IS NOT NULL;

CREATE TABLE transaction_channel_details (
    transaction_id VARCHAR(40) PRIMARY KEY REFERENCES financial_transactions(id) ON DELETE CASCADE,
    kind VARCHAR(16) NOT NULL,
    detail JSONB NOT NULL,
    created_at TIMESTAMPTZ NOT NULL DEFAULT now(),
    updated_at TIMESTAMPTZ NOT NULL DEFAULT now()
);
";
