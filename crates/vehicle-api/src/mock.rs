//! Scripted telemetry source for testing (no network required)

use crate::category::Category;
use crate::error::TelemetryError;
use crate::source::{FetchOptions, TelemetrySource};
use crate::Payload;
use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::sync::{Mutex, MutexGuard};

/// Reply given for one fetch
#[derive(Debug, Clone)]
pub enum Reply {
    /// Resolve immediately with this result
    Ready(Result<Option<Payload>, TelemetryError>),
    /// Never resolve
    Hang,
}

#[derive(Default)]
struct Script {
    /// One-shot replies, consumed before the standing reply
    queued: HashMap<Category, VecDeque<Reply>>,
    /// Reply used once the queue is drained
    standing: HashMap<Category, Reply>,
    calls: Vec<Category>,
    vehicle_ids: Vec<Option<String>>,
}

/// Telemetry source answering from a script.
///
/// Categories without a script resolve to `Ok(None)`.
#[derive(Default)]
pub struct ScriptedTelemetry {
    script: Mutex<Script>,
}

impl ScriptedTelemetry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Awake vehicle with id "1" and every category answered
    pub fn awake_vehicle(shift_state: Option<&str>) -> Self {
        let source = Self::new();
        source.set(
            Category::VehicleInfo,
            Ok(Some(serde_json::json!({"id_s": "1", "state": "online", "in_service": false}))),
        );
        source.set(
            Category::DriveState,
            Ok(Some(serde_json::json!({ "shift_state": shift_state, "speed": null }))),
        );
        source.set(Category::VehicleState, Ok(Some(serde_json::json!({"locked": true}))));
        source.set(Category::ChargeState, Ok(Some(serde_json::json!({"battery_level": 77}))));
        source.set(Category::ClimateState, Ok(Some(serde_json::json!({"inside_temp": 21.5}))));
        source
    }

    /// Standing reply for a category
    pub fn set(&self, category: Category, result: Result<Option<Payload>, TelemetryError>) {
        self.lock().standing.insert(category, Reply::Ready(result));
    }

    /// Queue a one-shot reply for a category
    pub fn push(&self, category: Category, result: Result<Option<Payload>, TelemetryError>) {
        self.push_reply(category, Reply::Ready(result));
    }

    /// Queue a one-shot reply that never resolves
    pub fn push_hang(&self, category: Category) {
        self.push_reply(category, Reply::Hang);
    }

    fn push_reply(&self, category: Category, reply: Reply) {
        self.lock().queued.entry(category).or_default().push_back(reply);
    }

    /// Categories fetched so far, in call order
    pub fn calls(&self) -> Vec<Category> {
        self.lock().calls.clone()
    }

    /// Number of fetches of one category
    pub fn call_count(&self, category: Category) -> usize {
        self.lock().calls.iter().filter(|c| **c == category).count()
    }

    /// Vehicle ids seen by each fetch, in call order
    pub fn vehicle_ids(&self) -> Vec<Option<String>> {
        self.lock().vehicle_ids.clone()
    }

    fn lock(&self) -> MutexGuard<'_, Script> {
        self.script.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    async fn answer(
        &self,
        category: Category,
        options: &FetchOptions,
    ) -> Result<Option<Payload>, TelemetryError> {
        let reply = {
            let mut script = self.lock();
            script.calls.push(category);
            script.vehicle_ids.push(options.vehicle_id.clone());
            let queued = script.queued.get_mut(&category).and_then(VecDeque::pop_front);
            queued.or_else(|| script.standing.get(&category).cloned())
        };

        match reply {
            Some(Reply::Ready(result)) => result,
            Some(Reply::Hang) => std::future::pending().await,
            None => Ok(None),
        }
    }
}

#[async_trait]
impl TelemetrySource for ScriptedTelemetry {
    async fn vehicle(&self, options: &FetchOptions) -> Result<Option<Payload>, TelemetryError> {
        self.answer(Category::VehicleInfo, options).await
    }

    async fn drive_state(&self, options: &FetchOptions) -> Result<Option<Payload>, TelemetryError> {
        self.answer(Category::DriveState, options).await
    }

    async fn vehicle_state(
        &self,
        options: &FetchOptions,
    ) -> Result<Option<Payload>, TelemetryError> {
        self.answer(Category::VehicleState, options).await
    }

    async fn charge_state(&self, options: &FetchOptions) -> Result<Option<Payload>, TelemetryError> {
        self.answer(Category::ChargeState, options).await
    }

    async fn climate_state(
        &self,
        options: &FetchOptions,
    ) -> Result<Option<Payload>, TelemetryError> {
        self.answer(Category::ClimateState, options).await
    }
}
