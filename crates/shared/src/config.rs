//! Application configuration management.

use std::time::Duration;

use serde::Deserialize;

/// Application configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    /// Database configuration.
    pub database: DatabaseConfig,
    /// Settlement and retry behaviour of the channel processors.
    #[serde(default)]
    pub processing: ProcessingConfig,
    /// Standing order scheduler configuration.
    #[serde(default)]
    pub scheduler: SchedulerConfig,
    /// Processing queue and worker pool configuration.
    #[serde(default)]
    pub worker: WorkerConfig,
    /// Base URLs of the external collaborators.
    #[serde(default)]
    pub connectors: ConnectorsConfig,
    /// Log output configuration.
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Database configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    /// Database connection URL.
    pub url: String,
    /// Maximum number of connections in the pool.
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
    /// Minimum number of connections in the pool.
    #[serde(default = "default_min_connections")]
    pub min_connections: u32,
    /// Apply pending migrations when the processor starts.
    #[serde(default)]
    pub run_migrations: bool,
}

fn default_max_connections() -> u32 {
    10
}

fn default_min_connections() -> u32 {
    1
}

/// Settlement configuration shared by every channel processor.
#[derive(Debug, Clone, Deserialize)]
pub struct ProcessingConfig {
    /// Institution code of this bank. Credit parties with another code settle inter-bank.
    #[serde(default = "default_bank_code")]
    pub bank_code: String,
    /// GL code balancing money that left the bank through the switch.
    #[serde(default = "default_suspense_gl")]
    pub settlement_suspense_gl: String,
    /// GL code funding credits received from other banks through the switch.
    #[serde(default = "default_inward_clearing_gl")]
    pub inward_clearing_gl: String,
    /// GL code funding pure-credit originations such as cash deposits.
    #[serde(default = "default_cash_gl")]
    pub cash_gl: String,
    /// GL code credited with transaction fees.
    #[serde(default = "default_fee_income_gl")]
    pub fee_income_gl: String,
    /// GL code credited with tax levied on fees.
    #[serde(default = "default_tax_payable_gl")]
    pub tax_payable_gl: String,
    /// Ledger call timeout in milliseconds.
    #[serde(default = "default_ledger_timeout_ms")]
    pub ledger_timeout_ms: u64,
    /// Settlement gateway call timeout in milliseconds.
    #[serde(default = "default_gateway_timeout_ms")]
    pub gateway_timeout_ms: u64,
    /// Fee calculator and compliance hook timeout in milliseconds.
    #[serde(default = "default_advisory_timeout_ms")]
    pub advisory_timeout_ms: u64,
    /// Attempts per external call before a retryable failure becomes terminal.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    /// Delay between attempts in milliseconds.
    #[serde(default = "default_retry_backoff_ms")]
    pub retry_backoff_ms: u64,
    /// Number of bulk batch items processed concurrently.
    #[serde(default = "default_bulk_item_concurrency")]
    pub bulk_item_concurrency: usize,
}

fn default_bank_code() -> String {
    "000001".to_string()
}

fn default_suspense_gl() -> String {
    "GL-SETTLEMENT-SUSPENSE".to_string()
}

fn default_inward_clearing_gl() -> String {
    "GL-INWARD-CLEARING".to_string()
}

fn default_cash_gl() -> String {
    "GL-TELLER-CASH".to_string()
}

fn default_fee_income_gl() -> String {
    "GL-FEE-INCOME".to_string()
}

fn default_tax_payable_gl() -> String {
    "GL-VAT-PAYABLE".to_string()
}

fn default_ledger_timeout_ms() -> u64 {
    5_000
}

fn default_gateway_timeout_ms() -> u64 {
    30_000
}

fn default_advisory_timeout_ms() -> u64 {
    2_000
}

fn default_max_attempts() -> u32 {
    3
}

fn default_retry_backoff_ms() -> u64 {
    500
}

fn default_bulk_item_concurrency() -> usize {
    8
}

impl Default for ProcessingConfig {
    fn default() -> Self {
        Self {
            bank_code: default_bank_code(),
            settlement_suspense_gl: default_suspense_gl(),
            cash_gl: default_cash_gl(),
            inward_clearing_gl: default_inward_clearing_gl(),
            fee_income_gl: default_fee_income_gl(),
            tax_payable_gl: default_tax_payable_gl(),
            ledger_timeout_ms: default_ledger_timeout_ms(),
            gateway_timeout_ms: default_gateway_timeout_ms(),
            advisory_timeout_ms: default_advisory_timeout_ms(),
            max_attempts: default_max_attempts(),
            retry_backoff_ms: default_retry_backoff_ms(),
            bulk_item_concurrency: default_bulk_item_concurrency(),
        }
    }
}

impl ProcessingConfig {
    /// Ledger call timeout.
    #[must_use]
    pub const fn ledger_timeout(&self) -> Duration {
        Duration::from_millis(self.ledger_timeout_ms)
    }

    /// Settlement gateway call timeout.
    #[must_use]
    pub const fn gateway_timeout(&self) -> Duration {
        Duration::from_millis(self.gateway_timeout_ms)
    }

    /// Fee calculator and compliance hook timeout.
    #[must_use]
    pub const fn advisory_timeout(&self) -> Duration {
        Duration::from_millis(self.advisory_timeout_ms)
    }

    /// Delay between attempts of a retryable call.
    #[must_use]
    pub const fn retry_backoff(&self) -> Duration {
        Duration::from_millis(self.retry_backoff_ms)
    }
}

/// Standing order scheduler configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct SchedulerConfig {
    /// Seconds between due-order scans.
    #[serde(default = "default_tick_interval_secs")]
    pub tick_interval_secs: u64,
    /// Consecutive failures after which an order is deactivated. Unset means never.
    #[serde(default)]
    pub failure_ceiling: Option<u32>,
}

fn default_tick_interval_secs() -> u64 {
    60
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            tick_interval_secs: default_tick_interval_secs(),
            failure_ceiling: None,
        }
    }
}

impl SchedulerConfig {
    /// Interval between due-order scans.
    #[must_use]
    pub const fn tick_interval(&self) -> Duration {
        Duration::from_secs(self.tick_interval_secs)
    }
}

/// Processing queue and worker pool configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct WorkerConfig {
    /// Number of workers draining the queue.
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,
    /// Capacity of the processing queue.
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,
    /// Times a job is requeued after an error before it is left to recovery.
    #[serde(default = "default_max_requeues")]
    pub max_requeues: u32,
    /// Delay before a failed job is requeued, in milliseconds.
    #[serde(default = "default_requeue_delay_ms")]
    pub requeue_delay_ms: u64,
    /// Seconds between recovery scans.
    #[serde(default = "default_recovery_interval_secs")]
    pub recovery_interval_secs: u64,
    /// Seconds a non-terminal transaction must sit untouched before a periodic scan resumes it.
    #[serde(default = "default_stale_after_secs")]
    pub stale_after_secs: u64,
    /// Maximum transactions resumed by a single recovery scan.
    #[serde(default = "default_recovery_batch_size")]
    pub recovery_batch_size: u64,
}

fn default_concurrency() -> usize {
    4
}

fn default_queue_capacity() -> usize {
    1_024
}

fn default_max_requeues() -> u32 {
    5
}

fn default_requeue_delay_ms() -> u64 {
    1_000
}

fn default_recovery_interval_secs() -> u64 {
    300
}

fn default_stale_after_secs() -> u64 {
    60
}

fn default_recovery_batch_size() -> u64 {
    500
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            concurrency: default_concurrency(),
            queue_capacity: default_queue_capacity(),
            max_requeues: default_max_requeues(),
            requeue_delay_ms: default_requeue_delay_ms(),
            recovery_interval_secs: default_recovery_interval_secs(),
            stale_after_secs: default_stale_after_secs(),
            recovery_batch_size: default_recovery_batch_size(),
        }
    }
}

impl WorkerConfig {
    /// Delay before a failed job is requeued.
    #[must_use]
    pub const fn requeue_delay(&self) -> Duration {
        Duration::from_millis(self.requeue_delay_ms)
    }

    /// Age after which an untouched non-terminal transaction is resumed.
    #[must_use]
    pub const fn stale_after(&self) -> Duration {
        Duration::from_secs(self.stale_after_secs)
    }

    /// Interval between periodic recovery scans.
    #[must_use]
    pub const fn recovery_interval(&self) -> Duration {
        Duration::from_secs(self.recovery_interval_secs)
    }
}

/// Base URLs of the external collaborators.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ConnectorsConfig {
    /// Ledger posting service.
    #[serde(default)]
    pub ledger_url: String,
    /// Inter-bank settlement gateway.
    #[serde(default)]
    pub gateway_url: String,
    /// Fee calculation service. Unset charges no fees.
    #[serde(default)]
    pub fees_url: Option<String>,
    /// Compliance screening service. Unset never holds.
    #[serde(default)]
    pub compliance_url: Option<String>,
}

/// Log output configuration.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct LoggingConfig {
    /// Emit JSON lines instead of human-readable output.
    #[serde(default)]
    pub json: bool,
}

impl AppConfig {
    /// Loads configuration from environment and config files.
    ///
    /// # Errors
    ///
    /// Returns an error if configuration cannot be loaded.
    pub fn load() -> Result<Self, config::ConfigError> {
        let run_mode = std::env::var("RUN_MODE").unwrap_or_else(|_| "development".to_string());

        let config = config::Config::builder()
            .add_source(config::File::with_name("config/default").required(false))
            .add_source(config::File::with_name(&format!("config/{run_mode}")).required(false))
            .add_source(config::Environment::with_prefix("CLEARLINE").separator("__"))
            .build()?;

        config.try_deserialize()
    }
}
