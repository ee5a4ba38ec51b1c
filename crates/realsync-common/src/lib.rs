//! # RealSync Common
//!
//! Shared types, errors, and constants for the RealSync tunneling platform.
//!
//! ## Core Types
//!
//! - [`Tunnel`]: a provisioned reverse-proxy endpoint bound to a public domain
//! - [`UsagePeriod`]: a validated (year, month) accounting bucket
//! - [`ConsumptionRecord`]: one month's accumulated bandwidth for a tunnel
//! - [`MonthlyUsage`]/[`DomainConsumption`]: the read-model served to the dashboard

pub mod error;
pub mod types;

// Re-export commonly used types at crate root
pub use error::{ConsumptionError, RealSyncError, Result, TunnelError};
pub use types::{
    consumption::{ConsumptionRecord, DomainConsumption, MonthlyUsage, UsagePeriod},
    tunnel::Tunnel,
};

/// RealSync version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Earliest year the accountant accepts
pub const MIN_YEAR: u16 = 2000;

/// Latest year the accountant accepts
pub const MAX_YEAR: u16 = 9999;
