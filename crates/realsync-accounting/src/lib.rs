//! # RealSync Accounting
//!
//! Bandwidth consumption accounting for RealSync tunnels.
//!
//! ## Accounting Model
//!
//! ```text
//! (tunnel, year, month) -> data_usage
//! ```
//!
//! Every usage report resolves its domain to a tunnel, is bucketed into the
//! current calendar month on the server clock, and is added to the month's
//! counter with a single atomic upsert. Concurrent reports for the same key
//! serialize at the storage layer, never in process.
//!
//! ## Modules
//!
//! - [`metering`]: usage reports and the [`ConsumptionAccountant`]
//! - [`store`]: storage traits plus SQLite and in-memory backends

pub mod metering;
pub mod store;

pub use metering::{ConsumptionAccountant, ReportOutcome, UsageReport};
pub use store::{ConsumptionStore, InMemoryStore, SqliteStore, TunnelRegistry};

use serde::{Deserialize, Serialize};

/// Accounting service configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccountingConfig {
    /// Database connection URL
    pub database_url: String,
    /// Connection pool size
    pub max_connections: u32,
}

impl Default for AccountingConfig {
    fn default() -> Self {
        Self {
            database_url: "sqlite://realsync.db".to_string(),
            max_connections: 5,
        }
    }
}

impl AccountingConfig {
    /// Load configuration from environment and .env file
    pub fn load() -> anyhow::Result<Self> {
        // Try to load .env file
        let _ = dotenvy::dotenv();

        let mut cfg = Self::default();

        if let Ok(url) = std::env::var("REALSYNC_DATABASE_URL") {
            cfg.database_url = url;
        }
        if let Ok(val) = std::env::var("REALSYNC_DB_MAX_CONNECTIONS") {
            if let Ok(v) = val.parse() {
                cfg.max_connections = v;
            }
        }

        Ok(cfg)
    }
}
