//! Consumption accountant
//!
//! Records bandwidth usage against a tunnel's current billing month and
//! serves the aggregated monthly history shown on the dashboard.

use std::sync::Arc;

use serde::Serialize;
use tracing::{debug, instrument};
use uuid::Uuid;

use realsync_common::{
    DomainConsumption, RealSyncError, Result, Tunnel, TunnelError, UsagePeriod,
};

use crate::store::{ConsumptionStore, TunnelRegistry};

use super::report::UsageReport;

/// Outcome of a successfully recorded usage report
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportOutcome {
    /// Tunnel the report was accounted against
    pub tunnel_id: Uuid,
    /// Accounting bucket the report landed in
    pub period: UsagePeriod,
    /// Cumulative usage for the bucket after this report
    pub data_usage: u64,
}

/// Records and aggregates per-tunnel bandwidth usage at monthly granularity
///
/// Constructed with explicit storage dependencies; the accountant holds no
/// state of its own.
pub struct ConsumptionAccountant {
    registry: Arc<dyn TunnelRegistry>,
    store: Arc<dyn ConsumptionStore>,
}

impl ConsumptionAccountant {
    /// Create an accountant over the given registry and store
    pub fn new(registry: Arc<dyn TunnelRegistry>, store: Arc<dyn ConsumptionStore>) -> Self {
        Self { registry, store }
    }

    /// Record a usage report against the current calendar month
    ///
    /// The month is derived from the accounting system's own clock; the
    /// client never supplies it.
    #[instrument(skip(self, report), fields(domain = %report.domain))]
    pub async fn report_usage(&self, report: &UsageReport) -> Result<ReportOutcome> {
        self.report_usage_at(report, UsagePeriod::current()).await
    }

    /// Record a usage report against an explicit period
    ///
    /// Deterministic entry point used by [`report_usage`](Self::report_usage)
    /// and by callers that already hold a period.
    pub async fn report_usage_at(
        &self,
        report: &UsageReport,
        period: UsagePeriod,
    ) -> Result<ReportOutcome> {
        report.validate()?;

        let tunnel = self.resolve(&report.domain).await?;
        if !tunnel.enabled {
            return Err(TunnelError::Disabled(tunnel.domain).into());
        }

        let data_usage = self
            .store
            .record_usage(tunnel.id, period, report.traffic_bytes())
            .await?;

        debug!(tunnel = %tunnel.id, %period, data_usage, "Recorded usage");
        Ok(ReportOutcome {
            tunnel_id: tunnel.id,
            period,
            data_usage,
        })
    }

    /// Monthly usage history for a domain, oldest month first
    ///
    /// A known domain with no recorded usage yields an empty history; an
    /// unknown domain is a not-found error.
    #[instrument(skip(self))]
    pub async fn monthly_history(&self, domain: &str) -> Result<DomainConsumption> {
        let tunnel = self.resolve(domain).await?;
        let history = self.store.monthly_history(tunnel.id).await?;

        Ok(DomainConsumption {
            domain: tunnel.domain,
            history,
        })
    }

    async fn resolve(&self, domain: &str) -> Result<Tunnel> {
        self.registry.resolve_domain(domain).await?.ok_or_else(|| {
            RealSyncError::from(TunnelError::DomainNotFound(
                domain.trim().to_ascii_lowercase(),
            ))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::InMemoryStore;

    fn accountant_over(store: Arc<InMemoryStore>) -> ConsumptionAccountant {
        ConsumptionAccountant::new(store.clone(), store)
    }

    #[tokio::test]
    async fn test_reports_in_same_month_accumulate() {
        let store = Arc::new(InMemoryStore::new());
        store.register("acme.example.com").await.unwrap();
        let accountant = accountant_over(store);

        let period = UsagePeriod::new(2026, 8).unwrap();
        let first = accountant
            .report_usage_at(&UsageReport::new("acme.example.com", 100.0), period)
            .await
            .unwrap();
        assert_eq!(first.data_usage, 100);

        let second = accountant
            .report_usage_at(&UsageReport::new("acme.example.com", 50.0), period)
            .await
            .unwrap();
        assert_eq!(second.data_usage, 150);
    }

    #[tokio::test]
    async fn test_reports_in_different_months_stay_separate() {
        let store = Arc::new(InMemoryStore::new());
        store.register("acme.example.com").await.unwrap();
        let accountant = accountant_over(store);

        let july = UsagePeriod::new(2026, 7).unwrap();
        let august = UsagePeriod::new(2026, 8).unwrap();
        accountant
            .report_usage_at(&UsageReport::new("acme.example.com", 100.0), july)
            .await
            .unwrap();
        accountant
            .report_usage_at(&UsageReport::new("acme.example.com", 100.0), august)
            .await
            .unwrap();

        let consumption = accountant.monthly_history("acme.example.com").await.unwrap();
        assert_eq!(consumption.history.len(), 2);
        assert!(consumption.history.iter().all(|m| m.data_usage == 100));
        assert_eq!(consumption.total_usage(), 200);
    }

    #[tokio::test]
    async fn test_invalid_report_touches_no_row() {
        let store = Arc::new(InMemoryStore::new());
        store.register("acme.example.com").await.unwrap();
        let accountant = accountant_over(store.clone());

        let err = accountant
            .report_usage(&UsageReport::new("", 10.0))
            .await
            .unwrap_err();
        assert!(matches!(err, RealSyncError::Validation { .. }));
        assert_eq!(store.row_count(), 0);
    }

    #[tokio::test]
    async fn test_unknown_domain_is_not_found() {
        let store = Arc::new(InMemoryStore::new());
        let accountant = accountant_over(store.clone());

        let err = accountant
            .report_usage(&UsageReport::new("unknown.example.com", 10.0))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            RealSyncError::Tunnel(TunnelError::DomainNotFound(_))
        ));
        assert_eq!(store.row_count(), 0);
    }

    #[tokio::test]
    async fn test_disabled_tunnel_refuses_reports() {
        let store = Arc::new(InMemoryStore::new());
        let tunnel = store.register("acme.example.com").await.unwrap();
        store.set_enabled(tunnel.id, false).await.unwrap();
        let accountant = accountant_over(store);

        let err = accountant
            .report_usage(&UsageReport::new("acme.example.com", 10.0))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            RealSyncError::Tunnel(TunnelError::Disabled(_))
        ));
    }

    #[tokio::test]
    async fn test_history_without_usage_is_empty() {
        let store = Arc::new(InMemoryStore::new());
        store.register("acme.example.com").await.unwrap();
        let accountant = accountant_over(store);

        let consumption = accountant.monthly_history("acme.example.com").await.unwrap();
        assert!(consumption.history.is_empty());
    }

    #[tokio::test]
    async fn test_history_for_unknown_domain_is_not_found() {
        let store = Arc::new(InMemoryStore::new());
        let accountant = accountant_over(store);

        let err = accountant.monthly_history("unknown.example.com").await.unwrap_err();
        assert!(matches!(
            err,
            RealSyncError::Tunnel(TunnelError::DomainNotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_concurrent_reports_converge() {
        let store = Arc::new(InMemoryStore::new());
        store.register("acme.example.com").await.unwrap();
        let accountant = Arc::new(accountant_over(store.clone()));

        let period = UsagePeriod::new(2026, 8).unwrap();
        let mut handles = Vec::new();
        for _ in 0..16 {
            let accountant = Arc::clone(&accountant);
            handles.push(tokio::spawn(async move {
                accountant
                    .report_usage_at(&UsageReport::new("acme.example.com", 25.0), period)
                    .await
                    .unwrap();
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        let consumption = accountant.monthly_history("acme.example.com").await.unwrap();
        assert_eq!(consumption.history.len(), 1);
        assert_eq!(consumption.history[0].data_usage, 16 * 25);
        assert_eq!(store.row_count(), 1);
    }
}
