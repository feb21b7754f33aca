//! Telemetry Category Definitions

use serde::{Deserialize, Serialize};
use std::fmt;

/// Independent subsets of vehicle telemetry
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    /// Vehicle summary (state, in_service, ids)
    VehicleInfo,
    /// Shift state, speed, position
    DriveState,
    /// Locks, odometer, software
    VehicleState,
    /// Battery and charging
    ChargeState,
    /// HVAC and temperatures
    ClimateState,
}

impl Category {
    /// All categories, gating category first
    pub const ALL: [Category; 5] = [
        Category::VehicleInfo,
        Category::DriveState,
        Category::VehicleState,
        Category::ChargeState,
        Category::ClimateState,
    ];

    /// Snapshot key and data_request endpoint name
    pub fn as_str(&self) -> &'static str {
        match self {
            Category::VehicleInfo => "vehicle_info",
            Category::DriveState => "drive_state",
            Category::VehicleState => "vehicle_state",
            Category::ChargeState => "charge_state",
            Category::ClimateState => "climate_state",
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_names_match_serde() {
        for category in Category::ALL {
            let json = serde_json::to_string(&category).unwrap();
            assert_eq!(json, format!("\"{}\"", category.as_str()));
        }
    }
}
