//! Telemetry Error Types

use thiserror::Error;

/// Errors that can occur while fetching vehicle telemetry
#[derive(Debug, Clone, Error)]
pub enum TelemetryError {
    /// Token rejected by the API (HTTP 401)
    #[error("Unauthorized")]
    Unauthorized,

    /// Non-success status other than 401
    #[error("Owner API returned HTTP {status} for {path}")]
    Status { status: u16, path: String },

    /// Transport failure
    #[error("HTTP error: {0}")]
    Http(String),

    /// Body could not be decoded
    #[error("Failed to decode response: {0}")]
    Decode(String),

    /// Fetch did not finish in time
    #[error("Timeout waiting for vehicle response after {0}ms")]
    Timeout(u64),

    /// Account has no vehicle at the configured index
    #[error("No vehicle returned by the owner API")]
    NoVehicle,

    /// Per-vehicle endpoint called before the vehicle id was known
    #[error("Vehicle id required for this request")]
    MissingVehicleId,
}

impl TelemetryError {
    /// Whether this error means the token is no longer valid
    pub fn is_auth_failure(&self) -> bool {
        matches!(self, TelemetryError::Unauthorized)
    }
}

impl From<reqwest::Error> for TelemetryError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            return TelemetryError::Http("request timed out".to_string());
        }
        if err.is_decode() {
            return TelemetryError::Decode(err.without_url().to_string());
        }
        TelemetryError::Http(err.without_url().to_string())
    }
}
