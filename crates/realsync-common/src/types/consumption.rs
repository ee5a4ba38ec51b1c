//! Consumption accounting types
//!
//! Bandwidth usage is accounted per tunnel at monthly granularity: one
//! counter row per (tunnel, year, month) key. The key's period component
//! is modelled by [`UsagePeriod`] so out-of-range dates never reach the
//! storage layer.

use chrono::{DateTime, Datelike, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::ConsumptionError;
use crate::{MAX_YEAR, MIN_YEAR};

/// A validated (year, month) accounting bucket
///
/// Ordering is chronological: years compare first, then months.
#[derive(Debug, Clone, Copy, Hash, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct UsagePeriod {
    /// Calendar year, 2000-9999
    pub year: u16,
    /// Calendar month, 1-12
    pub month: u8,
}

impl UsagePeriod {
    /// Create a period, validating both components
    pub fn new(year: i32, month: u32) -> Result<Self, ConsumptionError> {
        if year < i32::from(MIN_YEAR) || year > i32::from(MAX_YEAR) {
            return Err(ConsumptionError::YearOutOfRange(year));
        }
        if !(1..=12).contains(&month) {
            return Err(ConsumptionError::MonthOutOfRange(month));
        }
        Ok(Self {
            year: year as u16,
            month: month as u8,
        })
    }

    /// The current period according to the accounting system's own clock
    ///
    /// Reports are always bucketed server-side; the client never supplies
    /// the period.
    pub fn current() -> Self {
        let now = Utc::now();
        // chrono guarantees month in 1-12, and the year range outlives us
        Self {
            year: now.year() as u16,
            month: now.month() as u8,
        }
    }
}

impl std::fmt::Display for UsagePeriod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}-{:02}", self.year, self.month)
    }
}

/// One month's usage total, as served to the dashboard
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MonthlyUsage {
    /// Calendar year
    pub year: u16,
    /// Calendar month
    pub month: u8,
    /// Accumulated bytes for the month
    pub data_usage: u64,
}

impl MonthlyUsage {
    /// The period this entry covers
    pub fn period(&self) -> UsagePeriod {
        UsagePeriod {
            year: self.year,
            month: self.month,
        }
    }
}

/// A stored consumption row for a (tunnel, year, month) key
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConsumptionRecord {
    /// Surrogate key assigned by the store
    pub id: i64,
    /// Owning tunnel
    pub tunnel_id: Uuid,
    /// Accounting bucket
    pub period: UsagePeriod,
    /// Accumulated bytes, monotonically non-decreasing
    pub data_usage: u64,
    /// Row creation timestamp
    pub created_at: DateTime<Utc>,
    /// Last increment timestamp
    pub updated_at: DateTime<Utc>,
}

/// Monthly usage history for a domain, recomputed fresh on each query
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DomainConsumption {
    /// Public domain name
    pub domain: String,
    /// Chronologically ordered monthly totals
    pub history: Vec<MonthlyUsage>,
}

impl DomainConsumption {
    /// Sum of all recorded months
    pub fn total_usage(&self) -> u64 {
        self.history.iter().map(|m| m.data_usage).sum()
    }
}
