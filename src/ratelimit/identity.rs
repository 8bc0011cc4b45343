//! Caller identity resolution from request metadata.

use serde::{Deserialize, Serialize};

/// Identity shared by every caller whose address cannot be resolved.
pub const UNKNOWN_IDENTITY: &str = "unknown";

/// The parts of an inbound request the limiter is allowed to look at.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestMetadata {
    /// Address assigned by the deployment platform (load balancer, edge
    /// runtime). Trusted: the client cannot set it.
    #[serde(default)]
    pub remote_addr: Option<String>,
    /// Raw `X-Forwarded-For` header value, comma separated.
    #[serde(default)]
    pub forwarded_for: Option<String>,
}

impl RequestMetadata {
    /// Metadata carrying only a platform-assigned address.
    pub fn from_remote_addr(addr: impl Into<String>) -> Self {
        Self {
            remote_addr: Some(addr.into()),
            forwarded_for: None,
        }
    }

    /// Metadata carrying only a forwarded-for chain.
    pub fn from_forwarded_for(chain: impl Into<String>) -> Self {
        Self {
            remote_addr: None,
            forwarded_for: Some(chain.into()),
        }
    }

    /// Resolve the caller identity for this request.
    pub fn identity(&self) -> String {
        resolve_identity(self.remote_addr.as_deref(), self.forwarded_for.as_deref())
    }
}

/// Derive a best-effort caller identity.
///
/// The platform address wins when present. Otherwise the last hop of the
/// forwarded chain is used, since that hop was appended by the nearest
/// intermediary and every earlier entry is client-controlled. Callers that
/// resolve to nothing share [`UNKNOWN_IDENTITY`].
pub fn resolve_identity(remote_addr: Option<&str>, forwarded_for: Option<&str>) -> String {
    if let Some(addr) = remote_addr.map(str::trim).filter(|a| !a.is_empty()) {
        return addr.to_string();
    }

    forwarded_for
        .and_then(|chain| {
            chain
                .rsplit(',')
                .map(str::trim)
                .find(|hop| !hop.is_empty())
        })
        .map(str::to_string)
        .unwrap_or_else(|| UNKNOWN_IDENTITY.to_string())
}
