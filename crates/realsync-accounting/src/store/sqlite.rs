//! SQLite storage implementation
//!
//! Durable backend for the tunnel registry and the consumption counters.
//! The usage increment is a single `INSERT .. ON CONFLICT .. DO UPDATE ..
//! RETURNING` statement, so concurrent reports for one (tunnel, year, month)
//! key serialize inside the database and racing first-inserts converge to a
//! single row. No in-process lock is involved; multiple server instances
//! sharing the database file get the same guarantee.

use std::str::FromStr;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteRow};
use sqlx::{Row, SqlitePool};
use tracing::{debug, instrument};
use uuid::Uuid;

use realsync_common::types::tunnel::normalize_domain;
use realsync_common::{
    ConsumptionError, ConsumptionRecord, MonthlyUsage, RealSyncError, Result, Tunnel, TunnelError,
    UsagePeriod,
};

use super::{ConsumptionStore, TunnelRegistry};

const CREATE_TUNNEL_TABLE: &str = "\
CREATE TABLE IF NOT EXISTS tunnel (
    id          TEXT PRIMARY KEY,
    domain      TEXT NOT NULL UNIQUE,
    enabled     INTEGER NOT NULL DEFAULT 1,
    created_at  TEXT NOT NULL
)";

const CREATE_CONSUMPTION_TABLE: &str = "\
CREATE TABLE IF NOT EXISTS tunnel_consumption (
    id          INTEGER PRIMARY KEY AUTOINCREMENT,
    tunnel_id   TEXT NOT NULL REFERENCES tunnel(id) ON DELETE CASCADE,
    year        INTEGER NOT NULL,
    month       INTEGER NOT NULL,
    data_usage  INTEGER NOT NULL DEFAULT 0,
    created_at  TEXT NOT NULL,
    updated_at  TEXT NOT NULL,
    UNIQUE (tunnel_id, year, month)
)";

/// SQLite-backed tunnel registry and consumption store
#[derive(Clone)]
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    /// Open (creating if missing) a database and initialize the schema
    pub async fn connect(database_url: &str, max_connections: u32) -> Result<Self> {
        let options = SqliteConnectOptions::from_str(database_url)
            .map_err(|e| RealSyncError::Config(format!("Invalid database URL: {}", e)))?
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .busy_timeout(Duration::from_secs(5))
            .foreign_keys(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .connect_with(options)
            .await
            .map_err(storage_err)?;

        let store = Self { pool };
        store.init_schema().await?;
        Ok(store)
    }

    /// Open a private in-memory database, for tests and local runs
    ///
    /// A single pooled connection is used so every handle sees the same
    /// database, and the connection is pinned so the data survives idle
    /// periods.
    pub async fn in_memory() -> Result<Self> {
        let options = SqliteConnectOptions::from_str("sqlite::memory:")
            .map_err(|e| RealSyncError::Config(format!("Invalid database URL: {}", e)))?
            .foreign_keys(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(options)
            .await
            .map_err(storage_err)?;

        let store = Self { pool };
        store.init_schema().await?;
        Ok(store)
    }

    async fn init_schema(&self) -> Result<()> {
        sqlx::query(CREATE_TUNNEL_TABLE)
            .execute(&self.pool)
            .await
            .map_err(storage_err)?;
        sqlx::query(CREATE_CONSUMPTION_TABLE)
            .execute(&self.pool)
            .await
            .map_err(storage_err)?;
        debug!("Schema initialized");
        Ok(())
    }
}

#[async_trait]
impl TunnelRegistry for SqliteStore {
    #[instrument(skip(self))]
    async fn register(&self, domain: &str) -> Result<Tunnel> {
        let tunnel = Tunnel::new(domain)?;

        let result = sqlx::query(
            "INSERT INTO tunnel (id, domain, enabled, created_at) VALUES (?, ?, ?, ?)",
        )
        .bind(tunnel.id.to_string())
        .bind(&tunnel.domain)
        .bind(tunnel.enabled)
        .bind(tunnel.created_at)
        .execute(&self.pool)
        .await;

        match result {
            Ok(_) => {
                debug!(domain = %tunnel.domain, id = %tunnel.id, "Registered tunnel");
                Ok(tunnel)
            }
            Err(sqlx::Error::Database(db)) if db.is_unique_violation() => {
                Err(TunnelError::DomainTaken(tunnel.domain).into())
            }
            Err(e) => Err(storage_err(e)),
        }
    }

    async fn resolve_domain(&self, domain: &str) -> Result<Option<Tunnel>> {
        let domain = normalize_domain(domain)?;

        let row = sqlx::query("SELECT id, domain, enabled, created_at FROM tunnel WHERE domain = ?")
            .bind(&domain)
            .fetch_optional(&self.pool)
            .await
            .map_err(storage_err)?;

        row.map(|r| tunnel_from_row(&r)).transpose()
    }

    async fn list(&self) -> Result<Vec<Tunnel>> {
        let rows =
            sqlx::query("SELECT id, domain, enabled, created_at FROM tunnel ORDER BY created_at")
                .fetch_all(&self.pool)
                .await
                .map_err(storage_err)?;

        rows.iter().map(tunnel_from_row).collect()
    }

    #[instrument(skip(self))]
    async fn set_enabled(&self, id: Uuid, enabled: bool) -> Result<Tunnel> {
        let row = sqlx::query(
            "UPDATE tunnel SET enabled = ? WHERE id = ? RETURNING id, domain, enabled, created_at",
        )
        .bind(enabled)
        .bind(id.to_string())
        .fetch_optional(&self.pool)
        .await
        .map_err(storage_err)?;

        match row {
            Some(r) => tunnel_from_row(&r),
            None => Err(TunnelError::NotFound(id).into()),
        }
    }
}

#[async_trait]
impl ConsumptionStore for SqliteStore {
    #[instrument(skip(self), fields(%tunnel_id, %period))]
    async fn record_usage(&self, tunnel_id: Uuid, period: UsagePeriod, delta: u64) -> Result<u64> {
        let delta = i64::try_from(delta)
            .map_err(|_| RealSyncError::Consumption(ConsumptionError::DeltaTooLarge(delta)))?;
        let now = Utc::now();

        let row = sqlx::query(
            "INSERT INTO tunnel_consumption \
                 (tunnel_id, year, month, data_usage, created_at, updated_at) \
             VALUES (?, ?, ?, ?, ?, ?) \
             ON CONFLICT (tunnel_id, year, month) \
             DO UPDATE SET data_usage = tunnel_consumption.data_usage + excluded.data_usage, \
                           updated_at = excluded.updated_at \
             RETURNING data_usage",
        )
        .bind(tunnel_id.to_string())
        .bind(i64::from(period.year))
        .bind(i64::from(period.month))
        .bind(delta)
        .bind(now)
        .bind(now)
        .fetch_one(&self.pool)
        .await
        .map_err(storage_err)?;

        let total: i64 = row.try_get("data_usage").map_err(storage_err)?;
        u64::try_from(total).map_err(|_| {
            RealSyncError::Storage(format!("Negative usage counter for tunnel {}", tunnel_id))
        })
    }

    async fn monthly_history(&self, tunnel_id: Uuid) -> Result<Vec<MonthlyUsage>> {
        let rows = sqlx::query(
            "SELECT year, month, data_usage FROM tunnel_consumption \
             WHERE tunnel_id = ? ORDER BY year, month",
        )
        .bind(tunnel_id.to_string())
        .fetch_all(&self.pool)
        .await
        .map_err(storage_err)?;

        rows.iter().map(monthly_usage_from_row).collect()
    }

    async fn usage_for(
        &self,
        tunnel_id: Uuid,
        period: UsagePeriod,
    ) -> Result<Option<ConsumptionRecord>> {
        let row = sqlx::query(
            "SELECT id, tunnel_id, year, month, data_usage, created_at, updated_at \
             FROM tunnel_consumption WHERE tunnel_id = ? AND year = ? AND month = ?",
        )
        .bind(tunnel_id.to_string())
        .bind(i64::from(period.year))
        .bind(i64::from(period.month))
        .fetch_optional(&self.pool)
        .await
        .map_err(storage_err)?;

        row.map(|r| consumption_from_row(&r)).transpose()
    }
}

fn storage_err(e: sqlx::Error) -> RealSyncError {
    RealSyncError::Storage(e.to_string())
}

fn tunnel_from_row(row: &SqliteRow) -> Result<Tunnel> {
    let id: String = row.try_get("id").map_err(storage_err)?;
    let id = Uuid::parse_str(&id)
        .map_err(|e| RealSyncError::Storage(format!("Malformed tunnel id {}: {}", id, e)))?;
    let domain: String = row.try_get("domain").map_err(storage_err)?;
    let enabled: bool = row.try_get("enabled").map_err(storage_err)?;
    let created_at: DateTime<Utc> = row.try_get("created_at").map_err(storage_err)?;

    Ok(Tunnel {
        id,
        domain,
        enabled,
        created_at,
    })
}

fn period_from_row(row: &SqliteRow) -> Result<UsagePeriod> {
    let year: i64 = row.try_get("year").map_err(storage_err)?;
    let month: i64 = row.try_get("month").map_err(storage_err)?;
    UsagePeriod::new(year as i32, month as u32).map_err(RealSyncError::from)
}

fn monthly_usage_from_row(row: &SqliteRow) -> Result<MonthlyUsage> {
    let period = period_from_row(row)?;
    let data_usage: i64 = row.try_get("data_usage").map_err(storage_err)?;

    Ok(MonthlyUsage {
        year: period.year,
        month: period.month,
        data_usage: u64::try_from(data_usage)
            .map_err(|_| RealSyncError::Storage("Negative usage counter".to_string()))?,
    })
}

fn consumption_from_row(row: &SqliteRow) -> Result<ConsumptionRecord> {
    let id: i64 = row.try_get("id").map_err(storage_err)?;
    let tunnel_id: String = row.try_get("tunnel_id").map_err(storage_err)?;
    let tunnel_id = Uuid::parse_str(&tunnel_id)
        .map_err(|e| RealSyncError::Storage(format!("Malformed tunnel id {}: {}", tunnel_id, e)))?;
    let period = period_from_row(row)?;
    let data_usage: i64 = row.try_get("data_usage").map_err(storage_err)?;
    let created_at: DateTime<Utc> = row.try_get("created_at").map_err(storage_err)?;
    let updated_at: DateTime<Utc> = row.try_get("updated_at").map_err(storage_err)?;

    Ok(ConsumptionRecord {
        id,
        tunnel_id,
        period,
        data_usage: u64::try_from(data_usage)
            .map_err(|_| RealSyncError::Storage("Negative usage counter".to_string()))?,
        created_at,
        updated_at,
    })
}
