//! Tunnel - a provisioned reverse-proxy endpoint bound to a public domain
//!
//! Tunnels are owned by the registry; the accounting layer references them
//! by identifier only and never mutates them.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::TunnelError;

/// Maximum length of a tunnel domain name (RFC 1035)
pub const MAX_DOMAIN_LEN: usize = 253;

/// A provisioned tunnel endpoint
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Tunnel {
    /// Tunnel identifier
    pub id: Uuid,

    /// Public domain name the tunnel answers on (unique)
    pub domain: String,

    /// Whether the tunnel currently accepts traffic
    pub enabled: bool,

    /// Creation timestamp
    pub created_at: DateTime<Utc>,
}

impl Tunnel {
    /// Create a new enabled tunnel for a domain
    ///
    /// The domain is normalized to lowercase and validated.
    pub fn new(domain: &str) -> Result<Self, TunnelError> {
        let domain = normalize_domain(domain)?;
        Ok(Self {
            id: Uuid::new_v4(),
            domain,
            enabled: true,
            created_at: Utc::now(),
        })
    }
}

/// Normalize and validate a domain name
///
/// Accepts non-empty dot-separated labels of letters, digits, and hyphens;
/// labels must not start or end with a hyphen.
pub fn normalize_domain(domain: &str) -> Result<String, TunnelError> {
    let domain = domain.trim().to_ascii_lowercase();

    if domain.is_empty() {
        return Err(TunnelError::InvalidDomain("domain is empty".into()));
    }
    if domain.len() > MAX_DOMAIN_LEN {
        return Err(TunnelError::InvalidDomain(format!(
            "domain exceeds {} characters",
            MAX_DOMAIN_LEN
        )));
    }

    for label in domain.split('.') {
        if label.is_empty() {
            return Err(TunnelError::InvalidDomain(domain.clone()));
        }
        if label.starts_with('-') || label.ends_with('-') {
            return Err(TunnelError::InvalidDomain(domain.clone()));
        }
        if !label.chars().all(|c| c.is_ascii_alphanumeric() || c == '-') {
            return Err(TunnelError::InvalidDomain(domain.clone()));
        }
    }

    Ok(domain)
}
