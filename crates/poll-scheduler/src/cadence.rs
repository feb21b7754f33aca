//! Cadence Controller
//!
//! Rotating schedule of telemetry categories. `drive_state` is read every
//! tick while the vehicle is moving; everything else only on full refresh
//! ticks.

use tracing::{debug, info};
use vehicle_api::{Category, Payload};

/// Ticks between full refreshes, plus one (index wraps after exceeding it)
pub const DEFAULT_FULL_REFRESH_ITERATIONS: u32 = 4;

/// Shift state reported while parked
const PARK: &str = "P";

/// Scheduler state carried from tick to tick
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CadenceState {
    /// Position in the rotation; 0 is a full refresh
    pub iteration_index: u32,
    /// Last known movement state
    pub is_driving: bool,
}

impl CadenceState {
    /// Update `is_driving` from a fetched `drive_state` payload.
    ///
    /// Only a string `shift_state` counts; anything else keeps the previous
    /// value. Returns whether the flag changed.
    pub fn observe_drive_state(&mut self, drive_state: &Payload) -> bool {
        let Some(shift_state) = drive_state.get("shift_state").and_then(Payload::as_str) else {
            debug!("drive_state has no shift_state, keeping is_driving={}", self.is_driving);
            return false;
        };

        let driving = shift_state != PARK;
        let changed = driving != self.is_driving;
        if changed {
            info!("Shift state {}: is_driving {} -> {}", shift_state, self.is_driving, driving);
        }
        self.is_driving = driving;
        changed
    }
}

/// Decides which categories are due on a tick
#[derive(Debug, Clone, Copy)]
pub struct Cadence {
    full_refresh_iterations: u32,
}

impl Cadence {
    /// Create a cadence that refreshes everything every
    /// `full_refresh_iterations + 1` ticks
    pub fn new(full_refresh_iterations: u32) -> Self {
        Self {
            full_refresh_iterations,
        }
    }

    /// Categories due now, then advance the rotation
    pub fn next_due(&self, state: &mut CadenceState) -> Vec<Category> {
        let full_refresh = state.iteration_index == 0;
        let mut due = Vec::with_capacity(4);

        if state.is_driving || full_refresh {
            due.push(Category::DriveState);
        }
        if full_refresh {
            due.push(Category::VehicleState);
            due.push(Category::ChargeState);
            due.push(Category::ClimateState);
        }

        let period = u64::from(self.full_refresh_iterations) + 1;
        let next = (u64::from(state.iteration_index) + 1) % period;
        // next < period <= u32::MAX + 1
        state.iteration_index = next as u32;

        debug!(
            "Cadence due={:?} next_index={} driving={}",
            due, state.iteration_index, state.is_driving
        );
        due
    }
}

impl Default for Cadence {
    fn default() -> Self {
        Self::new(DEFAULT_FULL_REFRESH_ITERATIONS)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use serde_json::json;

    const FULL: [Category; 4] = [
        Category::DriveState,
        Category::VehicleState,
        Category::ChargeState,
        Category::ClimateState,
    ];

    fn expected_due(index: u32, driving: bool) -> Vec<Category> {
        match (index, driving) {
            (0, _) => FULL.to_vec(),
            (_, true) => vec![Category::DriveState],
            (_, false) => vec![],
        }
    }

    proptest! {
        #[test]
        fn prop_due_list_and_advance(index in 0u32..=4, driving in any::<bool>()) {
            let cadence = Cadence::default();
            let mut state = CadenceState { iteration_index: index, is_driving: driving };

            let due = cadence.next_due(&mut state);

            prop_assert_eq!(due, expected_due(index, driving));
            prop_assert_eq!(state.iteration_index, (index + 1) % 5);
            prop_assert_eq!(state.is_driving, driving);
        }
    }

    #[test]
    fn test_full_refresh_every_fifth_tick() {
        let cadence = Cadence::default();
        let mut state = CadenceState::default();

        let full_ticks: Vec<usize> = (0..12)
            .filter(|_| cadence.next_due(&mut state).len() == FULL.len())
            .collect();
        assert_eq!(full_ticks, vec![0, 5, 10]);
    }

    #[test]
    fn test_custom_refresh_period() {
        let cadence = Cadence::new(1);
        let mut state = CadenceState::default();
        assert_eq!(cadence.next_due(&mut state).len(), 4);
        assert!(cadence.next_due(&mut state).is_empty());
        assert_eq!(cadence.next_due(&mut state).len(), 4);
    }

    #[test]
    fn test_largest_refresh_period_wraps() {
        let cadence = Cadence::new(u32::MAX);
        let mut state = CadenceState::default();
        assert_eq!(cadence.next_due(&mut state).len(), 4);
        assert_eq!(state.iteration_index, 1);

        state.iteration_index = u32::MAX;
        assert!(cadence.next_due(&mut state).is_empty());
        assert_eq!(state.iteration_index, 0);
        assert_eq!(cadence.next_due(&mut state).len(), 4);
    }

    #[test]
    fn test_observe_drive_state() {
        let mut state = CadenceState::default();

        assert!(state.observe_drive_state(&json!({"shift_state": "D"})));
        assert!(state.is_driving);

        assert!(!state.observe_drive_state(&json!({"shift_state": "R"})));
        assert!(state.is_driving);

        // Null shift state keeps the previous value
        assert!(!state.observe_drive_state(&json!({"shift_state": null})));
        assert!(state.is_driving);

        assert!(state.observe_drive_state(&json!({"shift_state": "P"})));
        assert!(!state.is_driving);
    }
}
