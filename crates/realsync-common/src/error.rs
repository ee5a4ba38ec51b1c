//! Error types for the RealSync platform
//!
//! Provides a unified error type and domain-specific error variants

use thiserror::Error;

/// Result type alias using RealSyncError
pub type Result<T> = std::result::Result<T, RealSyncError>;

/// Unified error type for RealSync operations
#[derive(Debug, Error)]
pub enum RealSyncError {
    // Input validation errors, one message per violated field rule
    #[error("Validation failed: {}", .errors.join("; "))]
    Validation { errors: Vec<String> },

    // Tunnel registry errors
    #[error("Tunnel error: {0}")]
    Tunnel(#[from] TunnelError),

    // Consumption accounting errors
    #[error("Consumption error: {0}")]
    Consumption(#[from] ConsumptionError),

    // Storage errors
    #[error("Storage error: {0}")]
    Storage(String),

    // Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    // Serialization errors
    #[error("Serialization error: {0}")]
    Serialization(String),

    // Generic internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl RealSyncError {
    /// Build a validation error from a single rule violation
    pub fn validation(message: impl Into<String>) -> Self {
        RealSyncError::Validation {
            errors: vec![message.into()],
        }
    }
}

/// Tunnel registry errors
#[derive(Debug, Error)]
pub enum TunnelError {
    #[error("No tunnel registered for domain: {0}")]
    DomainNotFound(String),

    #[error("Domain already registered: {0}")]
    DomainTaken(String),

    #[error("Invalid domain name: {0}")]
    InvalidDomain(String),

    #[error("Tunnel is disabled: {0}")]
    Disabled(String),

    #[error("Tunnel not found: {0}")]
    NotFound(uuid::Uuid),
}

/// Consumption accounting errors
#[derive(Debug, Error)]
pub enum ConsumptionError {
    #[error("Year out of range: {0} (expected 2000-9999)")]
    YearOutOfRange(i32),

    #[error("Month out of range: {0} (expected 1-12)")]
    MonthOutOfRange(u32),

    #[error("Usage counter overflow for tunnel {tunnel_id} at {year}-{month:02}")]
    CounterOverflow {
        tunnel_id: uuid::Uuid,
        year: u16,
        month: u8,
    },

    #[error("Traffic delta too large: {0}")]
    DeltaTooLarge(u64),
}

// Implement From for common external error types
impl From<serde_json::Error> for RealSyncError {
    fn from(err: serde_json::Error) -> Self {
        RealSyncError::Serialization(err.to_string())
    }
}

impl From<std::io::Error> for RealSyncError {
    fn from(err: std::io::Error) -> Self {
        RealSyncError::Storage(err.to_string())
    }
}

impl From<anyhow::Error> for RealSyncError {
    fn from(err: anyhow::Error) -> Self {
        RealSyncError::Internal(err.to_string())
    }
}
