//! Snapshot Assembler
//!
//! One polling tick: read the vehicle summary, stop early if the vehicle
//! cannot be reached, otherwise fetch the due categories, merge them and
//! publish the result.

use crate::cadence::{Cadence, CadenceState, DEFAULT_FULL_REFRESH_ITERATIONS};
use crate::runner::{run_bounded, RunError};
use std::sync::Arc;
use std::time::Duration;
use telemetry_bus::{BusError, Publish};
use thiserror::Error;
use tracing::{debug, info, warn};
use vehicle_api::{
    Category, FetchOptions, Payload, Snapshot, TelemetryError, TelemetrySource, VehicleSummary,
};
use vehicle_auth::AccessToken;

/// Assembler configuration
#[derive(Debug, Clone)]
pub struct AssemblerConfig {
    /// Category fetches in flight at once (default: 1)
    pub max_concurrency: usize,
    /// Upper bound for a single fetch
    pub fetch_timeout: Option<Duration>,
    /// Ticks between full refreshes
    pub full_refresh_iterations: u32,
}

impl Default for AssemblerConfig {
    fn default() -> Self {
        Self {
            max_concurrency: 1,
            fetch_timeout: Some(Duration::from_secs(30)),
            full_refresh_iterations: DEFAULT_FULL_REFRESH_ITERATIONS,
        }
    }
}

/// Result of a successful tick
#[derive(Debug, Clone, PartialEq)]
pub enum TickOutcome {
    /// Full snapshot published
    Published(Snapshot),
    /// Vehicle asleep or in service; only `vehicle_info` published
    PublishedPartial(Snapshot),
    /// Vehicle awake but nothing due; nothing published
    Idle,
}

/// Why a tick failed
#[derive(Debug, Error)]
pub enum TickError {
    /// A category fetch failed
    #[error("failed to fetch {category}: {source}")]
    Telemetry {
        category: Category,
        #[source]
        source: TelemetryError,
    },

    /// The bus did not take the snapshot
    #[error("failed to publish snapshot: {0}")]
    Publish(#[from] BusError),

    /// A fetch task panicked
    #[error("internal fault during tick: {0}")]
    Fault(String),
}

impl TickError {
    /// Whether the token was rejected
    pub fn is_auth_failure(&self) -> bool {
        matches!(self, TickError::Telemetry { source, .. } if source.is_auth_failure())
    }

    /// Whether this is an internal fault rather than a remote failure
    pub fn is_fault(&self) -> bool {
        matches!(self, TickError::Fault(_))
    }

    /// Category involved, for fetch failures
    pub fn category(&self) -> Option<Category> {
        match self {
            TickError::Telemetry { category, .. } => Some(*category),
            _ => None,
        }
    }
}

/// Runs polling ticks against a telemetry source and a publisher
pub struct SnapshotAssembler {
    source: Arc<dyn TelemetrySource>,
    publisher: Arc<dyn Publish>,
    cadence: Cadence,
    config: AssemblerConfig,
}

impl SnapshotAssembler {
    /// Create a new assembler
    pub fn new(
        source: Arc<dyn TelemetrySource>,
        publisher: Arc<dyn Publish>,
        config: AssemblerConfig,
    ) -> Self {
        info!(
            "Snapshot assembler created (concurrency={}, full refresh every {} ticks)",
            config.max_concurrency,
            u64::from(config.full_refresh_iterations) + 1
        );

        Self {
            source,
            publisher,
            cadence: Cadence::new(config.full_refresh_iterations),
            config,
        }
    }

    /// Run one tick.
    ///
    /// `state` is advanced only once the vehicle is known to be awake, and
    /// `is_driving` only after every due category was fetched.
    pub async fn tick(
        &self,
        state: &mut CadenceState,
        token: &AccessToken,
    ) -> Result<TickOutcome, TickError> {
        info!("Starting to get vehicle telemetry");

        let options = FetchOptions::new(token.clone());
        let vehicle = fetch(
            Arc::clone(&self.source),
            Category::VehicleInfo,
            options.clone(),
            self.config.fetch_timeout,
        )
        .await
        .and_then(|payload| payload.ok_or(TelemetryError::NoVehicle))
        .map_err(|source| TickError::Telemetry {
            category: Category::VehicleInfo,
            source,
        })?;

        let summary = VehicleSummary::from_payload(&vehicle);
        let mut snapshot = Snapshot::new();
        snapshot.insert(Category::VehicleInfo, vehicle);

        if summary.is_unreachable() {
            info!(
                "Vehicle is {} (in_service={}), publishing vehicle_info only",
                summary.state.as_deref().unwrap_or("unknown"),
                summary.in_service
            );
            self.publisher.publish(&snapshot).await?;
            return Ok(TickOutcome::PublishedPartial(snapshot));
        }

        let due = self.cadence.next_due(state);
        if due.is_empty() {
            debug!("No categories due this tick");
            return Ok(TickOutcome::Idle);
        }

        let options = options.with_vehicle_id(summary.id);
        let source = Arc::clone(&self.source);
        let timeout = self.config.fetch_timeout;

        let payloads = run_bounded(due.clone(), self.config.max_concurrency, move |category| {
            let source = Arc::clone(&source);
            let options = options.clone();
            async move {
                fetch(source, category, options, timeout)
                    .await
                    .map_err(|err| (category, err))
            }
        })
        .await
        .map_err(|err| match err {
            RunError::Failed {
                error: (category, source),
                ..
            } => TickError::Telemetry { category, source },
            RunError::Panicked(reason) => TickError::Fault(reason),
        })?;

        for (category, payload) in due.into_iter().zip(payloads) {
            match payload {
                Some(payload) => snapshot.insert(category, payload),
                None => debug!("No {} data returned", category),
            }
        }

        if let Some(drive_state) = snapshot.get(Category::DriveState) {
            state.observe_drive_state(drive_state);
        }

        self.publisher.publish(&snapshot).await?;
        Ok(TickOutcome::Published(snapshot))
    }
}

/// Fetch one category, bounded by `limit`
async fn fetch(
    source: Arc<dyn TelemetrySource>,
    category: Category,
    options: FetchOptions,
    limit: Option<Duration>,
) -> Result<Option<Payload>, TelemetryError> {
    let request = category.fetch(source.as_ref(), &options);
    let result = match limit {
        Some(limit) => tokio::time::timeout(limit, request)
            .await
            .unwrap_or(Err(TelemetryError::Timeout(limit.as_millis() as u64))),
        None => request.await,
    };

    match &result {
        Ok(Some(payload)) => debug!("Received {}: {}", category, payload),
        Ok(None) => {}
        Err(err) => warn!("Error getting data for {}: {}", category, err),
    }
    result
}
