//! Per-tick Snapshot and Vehicle Summary

use crate::category::Category;
use crate::Payload;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Merged telemetry for one tick, keyed by category name
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Snapshot {
    entries: BTreeMap<Category, Payload>,
}

impl Snapshot {
    /// Create an empty snapshot
    pub fn new() -> Self {
        Self::default()
    }

    /// Store a category payload, replacing any earlier one
    pub fn insert(&mut self, category: Category, payload: Payload) {
        self.entries.insert(category, payload);
    }

    /// Get a category payload
    pub fn get(&self, category: Category) -> Option<&Payload> {
        self.entries.get(&category)
    }

    /// Check whether a category is present
    pub fn contains(&self, category: Category) -> bool {
        self.entries.contains_key(&category)
    }

    /// Categories present, in key order
    pub fn categories(&self) -> impl Iterator<Item = Category> + '_ {
        self.entries.keys().copied()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Fields of the `vehicle_info` payload that gate a tick
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VehicleSummary {
    /// Id used in per-vehicle request paths
    pub id: Option<String>,
    /// Reported state ("online", "asleep", ...)
    pub state: Option<String>,
    /// Whether the vehicle is at a service center
    pub in_service: bool,
}

impl VehicleSummary {
    /// Extract the summary from a raw vehicle payload.
    ///
    /// Reads `status` and falls back to `state`; the id prefers the string
    /// form `id_s` over the numeric `id`.
    pub fn from_payload(payload: &Payload) -> Self {
        let state = payload
            .get("status")
            .or_else(|| payload.get("state"))
            .and_then(|v| v.as_str())
            .map(str::to_string);

        let id = match payload.get("id_s").and_then(|v| v.as_str()) {
            Some(id) => Some(id.to_string()),
            None => payload.get("id").and_then(|v| match v {
                Payload::Number(n) => Some(n.to_string()),
                Payload::String(s) => Some(s.clone()),
                _ => None,
            }),
        };

        let in_service = payload
            .get("in_service")
            .and_then(|v| v.as_bool())
            .unwrap_or(false);

        Self {
            id,
            state,
            in_service,
        }
    }

    /// Asleep or in service: no other category can be read
    pub fn is_unreachable(&self) -> bool {
        self.state.as_deref() == Some("asleep") || self.in_service
    }
}
