//! Admission control: identity, keys, buckets and the evaluator.

mod backend;
mod bucket;
mod clock;
mod headers;
mod identity;
mod janitor;
mod key;
mod limiter;
mod policy;
mod routes;
mod store;

pub use backend::AdmissionBackend;
pub use bucket::{Bucket, Decision};
pub use clock::{Clock, ManualClock, SystemClock};
pub use headers::{
    RateLimitHeaders, LIMIT_HEADER, REMAINING_HEADER, RESET_HEADER, RETRY_AFTER_HEADER,
};
pub use identity::{resolve_identity, RequestMetadata, UNKNOWN_IDENTITY};
pub use janitor::{spawn_background_sweeper, Janitor};
pub use key::{compose_key, AdmissionKey, GLOBAL_SCOPE};
pub use limiter::{AdmissionLimiter, AdmissionOutcome};
pub use policy::{
    AdmissionPolicy, PolicyOverrides, DEFAULT_LIMIT, DEFAULT_MAX_BACKOFF_MULTIPLIER,
    DEFAULT_WINDOW_MS,
};
pub use routes::RouteTable;
pub use store::{InMemoryWindowStore, WindowStore};
