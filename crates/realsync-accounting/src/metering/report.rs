//! Usage report payload and validation

use serde::{Deserialize, Serialize};

use realsync_common::{RealSyncError, Result};

/// Largest traffic delta a single report may carry (2^53 bytes)
///
/// Reports arrive as JSON numbers; above this bound a double no longer
/// represents the byte count exactly, so the report is rejected rather
/// than silently rounded.
pub const MAX_REPORT_BYTES: f64 = 9_007_199_254_740_992.0;

/// A bandwidth usage report from the tunnel edge
///
/// `traffic` is the byte delta observed since the previous report for the
/// same domain, not a running total.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UsageReport {
    /// Public domain the traffic was served on
    pub domain: String,
    /// Traffic delta in bytes
    pub traffic: f64,
}

impl UsageReport {
    /// Create a new report
    pub fn new(domain: impl Into<String>, traffic: f64) -> Self {
        Self {
            domain: domain.into(),
            traffic,
        }
    }

    /// Validate the report, collecting one message per violated rule
    pub fn validate(&self) -> Result<()> {
        let mut errors = Vec::new();

        if self.domain.trim().is_empty() {
            errors.push("domain is required and must not be empty".to_string());
        }
        if !self.traffic.is_finite() {
            errors.push("traffic must be a finite number".to_string());
        } else if self.traffic < 0.0 {
            errors.push("traffic cannot be negative".to_string());
        } else if self.traffic > MAX_REPORT_BYTES {
            errors.push("traffic exceeds the maximum reportable delta".to_string());
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(RealSyncError::Validation { errors })
        }
    }

    /// Traffic delta in whole bytes
    ///
    /// Only meaningful after [`validate`](Self::validate) has passed.
    pub fn traffic_bytes(&self) -> u64 {
        self.traffic.max(0.0) as u64
    }
}
