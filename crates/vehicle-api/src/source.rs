//! Telemetry Capability

use crate::category::Category;
use crate::error::TelemetryError;
use crate::Payload;
use async_trait::async_trait;
use vehicle_auth::AccessToken;

/// Options passed to every fetch
#[derive(Debug, Clone)]
pub struct FetchOptions {
    /// Bearer token
    pub auth_token: AccessToken,
    /// Vehicle id, known once `vehicle_info` has been read
    pub vehicle_id: Option<String>,
}

impl FetchOptions {
    pub fn new(auth_token: AccessToken) -> Self {
        Self {
            auth_token,
            vehicle_id: None,
        }
    }

    /// Attach the vehicle id used by per-vehicle endpoints
    pub fn with_vehicle_id(mut self, vehicle_id: Option<String>) -> Self {
        self.vehicle_id = vehicle_id;
        self
    }
}

/// One fetch operation per telemetry category.
///
/// `Ok(None)` means the API had nothing for the category; callers treat that
/// as an absent entry rather than a failure.
#[async_trait]
pub trait TelemetrySource: Send + Sync {
    /// Vehicle summary (`vehicle_info`)
    async fn vehicle(&self, options: &FetchOptions) -> Result<Option<Payload>, TelemetryError>;

    async fn drive_state(&self, options: &FetchOptions) -> Result<Option<Payload>, TelemetryError>;

    async fn vehicle_state(&self, options: &FetchOptions)
        -> Result<Option<Payload>, TelemetryError>;

    async fn charge_state(&self, options: &FetchOptions) -> Result<Option<Payload>, TelemetryError>;

    async fn climate_state(&self, options: &FetchOptions)
        -> Result<Option<Payload>, TelemetryError>;
}

impl Category {
    /// Fetch this category from `source`
    pub async fn fetch(
        self,
        source: &dyn TelemetrySource,
        options: &FetchOptions,
    ) -> Result<Option<Payload>, TelemetryError> {
        match self {
            Category::VehicleInfo => source.vehicle(options).await,
            Category::DriveState => source.drive_state(options).await,
            Category::VehicleState => source.vehicle_state(options).await,
            Category::ChargeState => source.charge_state(options).await,
            Category::ClimateState => source.climate_state(options).await,
        }
    }
}
