//! Owner API Client
//!
//! Async HTTPS client for the vehicle owner API.

use crate::category::Category;
use crate::error::TelemetryError;
use crate::source::{FetchOptions, TelemetrySource};
use crate::Payload;
use async_trait::async_trait;
use std::time::Duration;
use tracing::{debug, info};
use vehicle_auth::AccessToken;

/// Default owner API host
pub const DEFAULT_API_BASE_URL: &str = "https://owner-api.teslamotors.com";

/// Default timeout for API requests
const DEFAULT_TIMEOUT_SECS: u64 = 30;

const USER_AGENT: &str = concat!("vehicle-poller/", env!("CARGO_PKG_VERSION"));

/// Owner API client
pub struct OwnerApiClient {
    http: reqwest::Client,
    /// API host, without trailing slash
    base_url: String,
    /// Which vehicle of the account to poll
    vehicle_index: usize,
}

impl OwnerApiClient {
    /// Create a new owner API client
    ///
    /// # Arguments
    /// * `base_url` - API host, e.g. [`DEFAULT_API_BASE_URL`]
    /// * `vehicle_index` - Position of the vehicle in the account's vehicle list
    pub fn new(base_url: &str, vehicle_index: usize) -> Result<Self, TelemetryError> {
        info!("Creating owner API client for {} (vehicle #{})", base_url, vehicle_index);

        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(DEFAULT_TIMEOUT_SECS))
            .user_agent(USER_AGENT)
            .build()?;

        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            vehicle_index,
        })
    }

    async fn get(&self, path: &str, token: &AccessToken) -> Result<Payload, TelemetryError> {
        debug!("GET {}", path);

        let response = self
            .http
            .get(format!("{}{}", self.base_url, path))
            .bearer_auth(token.secret())
            .send()
            .await?;

        let status = response.status().as_u16();
        if status == 401 {
            return Err(TelemetryError::Unauthorized);
        }
        if !(200..300).contains(&status) {
            return Err(TelemetryError::Status {
                status,
                path: path.to_string(),
            });
        }

        Ok(response.json().await?)
    }

    async fn data_request(
        &self,
        category: Category,
        options: &FetchOptions,
    ) -> Result<Option<Payload>, TelemetryError> {
        let vehicle_id = options
            .vehicle_id
            .as_deref()
            .ok_or(TelemetryError::MissingVehicleId)?;
        let path = format!("/api/1/vehicles/{}/data_request/{}", vehicle_id, category);

        let body = self.get(&path, &options.auth_token).await?;
        Ok(unwrap_response(body))
    }
}

#[async_trait]
impl TelemetrySource for OwnerApiClient {
    async fn vehicle(&self, options: &FetchOptions) -> Result<Option<Payload>, TelemetryError> {
        let body = self.get("/api/1/vehicles", &options.auth_token).await?;
        select_vehicle(body, self.vehicle_index)
    }

    async fn drive_state(&self, options: &FetchOptions) -> Result<Option<Payload>, TelemetryError> {
        self.data_request(Category::DriveState, options).await
    }

    async fn vehicle_state(
        &self,
        options: &FetchOptions,
    ) -> Result<Option<Payload>, TelemetryError> {
        self.data_request(Category::VehicleState, options).await
    }

    async fn charge_state(&self, options: &FetchOptions) -> Result<Option<Payload>, TelemetryError> {
        self.data_request(Category::ChargeState, options).await
    }

    async fn climate_state(
        &self,
        options: &FetchOptions,
    ) -> Result<Option<Payload>, TelemetryError> {
        self.data_request(Category::ClimateState, options).await
    }
}

/// Take the `response` member of an API body; null or missing means no data
fn unwrap_response(mut body: Payload) -> Option<Payload> {
    match body.get_mut("response").map(Payload::take) {
        Some(Payload::Null) | None => None,
        Some(inner) => Some(inner),
    }
}

/// Pick the configured vehicle out of the vehicle list
fn select_vehicle(body: Payload, index: usize) -> Result<Option<Payload>, TelemetryError> {
    match unwrap_response(body) {
        Some(Payload::Array(mut vehicles)) => {
            if index < vehicles.len() {
                Ok(Some(vehicles.swap_remove(index)))
            } else {
                Ok(None)
            }
        }
        Some(other) => Err(TelemetryError::Decode(format!(
            "expected vehicle list, got {}",
            type_name(&other)
        ))),
        None => Ok(None),
    }
}

fn type_name(value: &Payload) -> &'static str {
    match value {
        Payload::Null => "null",
        Payload::Bool(_) => "bool",
        Payload::Number(_) => "number",
        Payload::String(_) => "string",
        Payload::Array(_) => "array",
        Payload::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_unwrap_response() {
        assert_eq!(
            unwrap_response(json!({"response": {"shift_state": "D"}})),
            Some(json!({"shift_state": "D"}))
        );
        assert_eq!(unwrap_response(json!({"response": null})), None);
        assert_eq!(unwrap_response(json!({"error": "vehicle unavailable"})), None);
    }

    #[test]
    fn test_select_vehicle_by_index() {
        let body = json!({
            "response": [{"id_s": "1"}, {"id_s": "2"}, {"id_s": "3"}],
            "count": 3
        });
        let vehicle = select_vehicle(body.clone(), 1).unwrap().unwrap();
        assert_eq!(vehicle["id_s"], "2");

        assert_eq!(select_vehicle(body, 5).unwrap(), None);
    }

    #[test]
    fn test_select_vehicle_rejects_non_list() {
        let result = select_vehicle(json!({"response": {"id_s": "1"}}), 0);
        assert!(matches!(result, Err(TelemetryError::Decode(_))));
    }

    #[tokio::test]
    async fn test_data_request_requires_vehicle_id() {
        let client = OwnerApiClient::new(DEFAULT_API_BASE_URL, 0).unwrap();
        let options = FetchOptions::new(AccessToken::new("t"));
        let result = client.drive_state(&options).await;
        assert!(matches!(result, Err(TelemetryError::MissingVehicleId)));
    }

    #[test]
    fn test_base_url_trailing_slash_trimmed() {
        let client = OwnerApiClient::new("http://localhost:8080/", 0).unwrap();
        assert_eq!(client.base_url, "http://localhost:8080");
    }
}
