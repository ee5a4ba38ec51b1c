//! Storage traits and backends
//!
//! The accountant never talks to a database directly; it is constructed
//! with trait objects for the two storage concerns:
//!
//! - [`TunnelRegistry`]: tunnel identity, domain resolution, enablement
//! - [`ConsumptionStore`]: the monthly usage counters
//!
//! Backends:
//!
//! - [`SqliteStore`]: durable SQLite storage, one atomic upsert per report
//! - [`InMemoryStore`]: DashMap-backed storage for tests and local runs

pub mod memory;
pub mod sqlite;

pub use memory::InMemoryStore;
pub use sqlite::SqliteStore;

use async_trait::async_trait;
use uuid::Uuid;

use realsync_common::{ConsumptionRecord, MonthlyUsage, Result, Tunnel, UsagePeriod};

/// Tunnel identity and domain resolution
#[async_trait]
pub trait TunnelRegistry: Send + Sync {
    /// Provision a tunnel for a domain
    ///
    /// Fails with [`realsync_common::TunnelError::DomainTaken`] if the
    /// domain is already registered.
    async fn register(&self, domain: &str) -> Result<Tunnel>;

    /// Look up the tunnel bound to a domain, if any
    async fn resolve_domain(&self, domain: &str) -> Result<Option<Tunnel>>;

    /// All provisioned tunnels, oldest first
    async fn list(&self) -> Result<Vec<Tunnel>>;

    /// Flip a tunnel's enablement flag, returning the updated tunnel
    async fn set_enabled(&self, id: Uuid, enabled: bool) -> Result<Tunnel>;
}

/// Durable monthly usage counters
#[async_trait]
pub trait ConsumptionStore: Send + Sync {
    /// Add `delta` bytes to the (tunnel, period) counter, creating the row
    /// on first report
    ///
    /// Must be atomic with respect to concurrent reports for the same key:
    /// two racing first-inserts converge to one row holding the sum, and
    /// read-modify-write races never drop an increment. Returns the
    /// cumulative total for the period after the increment.
    async fn record_usage(&self, tunnel_id: Uuid, period: UsagePeriod, delta: u64) -> Result<u64>;

    /// Monthly totals for a tunnel in chronological order
    async fn monthly_history(&self, tunnel_id: Uuid) -> Result<Vec<MonthlyUsage>>;

    /// The stored row for one (tunnel, period) key, if present
    async fn usage_for(&self, tunnel_id: Uuid, period: UsagePeriod)
        -> Result<Option<ConsumptionRecord>>;
}
