//! In-memory storage implementation
//!
//! Uses DashMap for concurrent access. Suitable for tests and single-node
//! local runs; durable deployments use [`super::SqliteStore`].

use std::sync::atomic::{AtomicI64, Ordering};

use async_trait::async_trait;
use chrono::Utc;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use uuid::Uuid;

use realsync_common::types::tunnel::normalize_domain;
use realsync_common::{
    ConsumptionError, ConsumptionRecord, MonthlyUsage, RealSyncError, Result, Tunnel, TunnelError,
    UsagePeriod,
};

use super::{ConsumptionStore, TunnelRegistry};

/// In-memory tunnel registry and consumption store
pub struct InMemoryStore {
    /// Tunnels by ID
    tunnels: DashMap<Uuid, Tunnel>,
    /// Tunnel IDs by domain
    by_domain: DashMap<String, Uuid>,
    /// Consumption rows by (tunnel, period) key
    consumption: DashMap<(Uuid, UsagePeriod), ConsumptionRecord>,
    /// Surrogate row id counter
    next_row_id: AtomicI64,
}

impl InMemoryStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self {
            tunnels: DashMap::new(),
            by_domain: DashMap::new(),
            consumption: DashMap::new(),
            next_row_id: AtomicI64::new(1),
        }
    }

    /// Number of consumption rows currently held
    pub fn row_count(&self) -> usize {
        self.consumption.len()
    }
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl TunnelRegistry for InMemoryStore {
    async fn register(&self, domain: &str) -> Result<Tunnel> {
        let tunnel = Tunnel::new(domain)?;

        match self.by_domain.entry(tunnel.domain.clone()) {
            Entry::Occupied(_) => Err(TunnelError::DomainTaken(tunnel.domain).into()),
            Entry::Vacant(slot) => {
                slot.insert(tunnel.id);
                self.tunnels.insert(tunnel.id, tunnel.clone());
                Ok(tunnel)
            }
        }
    }

    async fn resolve_domain(&self, domain: &str) -> Result<Option<Tunnel>> {
        let domain = normalize_domain(domain)?;
        let id = match self.by_domain.get(&domain) {
            Some(entry) => *entry.value(),
            None => return Ok(None),
        };
        Ok(self.tunnels.get(&id).map(|entry| entry.value().clone()))
    }

    async fn list(&self) -> Result<Vec<Tunnel>> {
        let mut tunnels: Vec<Tunnel> = self
            .tunnels
            .iter()
            .map(|entry| entry.value().clone())
            .collect();
        tunnels.sort_by_key(|t| t.created_at);
        Ok(tunnels)
    }

    async fn set_enabled(&self, id: Uuid, enabled: bool) -> Result<Tunnel> {
        match self.tunnels.get_mut(&id) {
            Some(mut entry) => {
                entry.value_mut().enabled = enabled;
                Ok(entry.value().clone())
            }
            None => Err(TunnelError::NotFound(id).into()),
        }
    }
}

#[async_trait]
impl ConsumptionStore for InMemoryStore {
    async fn record_usage(&self, tunnel_id: Uuid, period: UsagePeriod, delta: u64) -> Result<u64> {
        let now = Utc::now();

        // The entry guard holds the shard lock, so the read-modify-write
        // below is atomic with respect to concurrent reports for this key.
        match self.consumption.entry((tunnel_id, period)) {
            Entry::Occupied(mut entry) => {
                let record = entry.get_mut();
                record.data_usage = record.data_usage.checked_add(delta).ok_or_else(|| {
                    RealSyncError::Consumption(ConsumptionError::CounterOverflow {
                        tunnel_id,
                        year: period.year,
                        month: period.month,
                    })
                })?;
                record.updated_at = now;
                Ok(record.data_usage)
            }
            Entry::Vacant(slot) => {
                let record = ConsumptionRecord {
                    id: self.next_row_id.fetch_add(1, Ordering::Relaxed),
                    tunnel_id,
                    period,
                    data_usage: delta,
                    created_at: now,
                    updated_at: now,
                };
                slot.insert(record);
                Ok(delta)
            }
        }
    }

    async fn monthly_history(&self, tunnel_id: Uuid) -> Result<Vec<MonthlyUsage>> {
        let mut history: Vec<MonthlyUsage> = self
            .consumption
            .iter()
            .filter(|entry| entry.key().0 == tunnel_id)
            .map(|entry| MonthlyUsage {
                year: entry.value().period.year,
                month: entry.value().period.month,
                data_usage: entry.value().data_usage,
            })
            .collect();
        history.sort_by_key(MonthlyUsage::period);
        Ok(history)
    }

    async fn usage_for(
        &self,
        tunnel_id: Uuid,
        period: UsagePeriod,
    ) -> Result<Option<ConsumptionRecord>> {
        Ok(self
            .consumption
            .get(&(tunnel_id, period))
            .map(|entry| entry.value().clone()))
    }
}
