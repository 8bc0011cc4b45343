//! Quotagate - In-Process Admission Control
//!
//! This crate decides, per inbound request, whether a caller may proceed
//! against a logical resource. Callers are tracked per identity and route
//! in fixed windows, and repeat offenders face exponentially longer windows
//! up to a configured cap. State is kept in memory, per process.

pub mod config;
pub mod error;
pub mod ratelimit;
