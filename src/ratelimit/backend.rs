//! Admission backend trait for abstracting limiter implementations.

use async_trait::async_trait;

use super::identity::RequestMetadata;
use super::limiter::{AdmissionLimiter, AdmissionOutcome};

/// Trait for admission backends.
///
/// Front ends are written against this trait so the in-process limiter can
/// be swapped for one that consults shared state.
#[async_trait]
pub trait AdmissionBackend: Send + Sync {
    /// Decide whether the request described by `metadata` may proceed
    /// against `route`, or the default scope when `route` is `None`.
    async fn check(&self, metadata: &RequestMetadata, route: Option<&str>) -> AdmissionOutcome;
}

#[async_trait]
impl AdmissionBackend for AdmissionLimiter {
    async fn check(&self, metadata: &RequestMetadata, route: Option<&str>) -> AdmissionOutcome {
        match route {
            Some(route) => self.check_route(metadata, route),
            None => AdmissionLimiter::check(self, metadata),
        }
    }
}
