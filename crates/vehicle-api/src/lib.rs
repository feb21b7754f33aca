//! Vehicle Owner API Telemetry
//!
//! This crate provides the telemetry capability consumed by the poll
//! scheduler: a category model, the merged per-tick [`Snapshot`], the
//! [`TelemetrySource`] trait and an HTTPS client for the owner API.

mod category;
mod client;
mod error;
mod snapshot;
mod source;

#[cfg(any(test, feature = "mock"))]
pub mod mock;

pub use category::Category;
pub use client::{OwnerApiClient, DEFAULT_API_BASE_URL};
pub use error::TelemetryError;
pub use snapshot::{Snapshot, VehicleSummary};
pub use source::{FetchOptions, TelemetrySource};

/// Category payload as returned by the API
pub type Payload = serde_json::Value;
