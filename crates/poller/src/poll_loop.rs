//! Poll Loop
//!
//! Drives ticks forever, re-authenticating once on an expired token and
//! backing off after any other failure. A stop request is honoured between
//! ticks; a running tick always finishes.

use crate::backoff::BackoffPolicy;
use poll_scheduler::{CadenceState, SnapshotAssembler, TickError, TickOutcome};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{debug, error, info, warn};
use vehicle_auth::{AccessToken, AuthError, Authenticate};

/// Process exit code after a failed re-authentication
pub const EXIT_REAUTH_FAILED: u8 = 2;

/// Process exit code for configuration, startup and internal failures
pub const EXIT_FATAL: u8 = 1;

/// Lifecycle of the poller
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopState {
    Idle,
    Authenticating,
    Connecting,
    Polling,
    Reauthenticating,
    BackingOff,
    Stopped,
}

/// Why the loop returned
#[derive(Debug)]
pub enum LoopExit {
    /// Stop was requested
    Stopped,
    /// The single re-authentication attempt failed
    ReauthFailed(AuthError),
    /// A fetch task panicked
    Fault(String),
}

impl LoopExit {
    pub fn exit_code(&self) -> u8 {
        match self {
            LoopExit::Stopped => 0,
            LoopExit::ReauthFailed(_) => EXIT_REAUTH_FAILED,
            LoopExit::Fault(_) => EXIT_FATAL,
        }
    }
}

/// Loop timing
#[derive(Debug, Clone, Copy)]
pub struct LoopSettings {
    /// Delay between successful ticks
    pub tick_interval: Duration,
    /// Delay after failed ticks
    pub backoff: BackoffPolicy,
}

impl Default for LoopSettings {
    fn default() -> Self {
        Self {
            tick_interval: Duration::from_secs(30),
            backoff: BackoffPolicy::default(),
        }
    }
}

/// Owns the per-process polling state
pub struct PollLoop {
    assembler: SnapshotAssembler,
    authenticator: Arc<dyn Authenticate>,
    settings: LoopSettings,
    stop: watch::Receiver<bool>,
    token: Option<AccessToken>,
    cadence: CadenceState,
    state: LoopState,
    /// Consecutive failed ticks
    failures: u32,
}

impl PollLoop {
    /// Create a loop; without a token the first iteration re-authenticates
    pub fn new(
        assembler: SnapshotAssembler,
        authenticator: Arc<dyn Authenticate>,
        settings: LoopSettings,
        token: Option<AccessToken>,
        stop: watch::Receiver<bool>,
    ) -> Self {
        Self {
            assembler,
            authenticator,
            settings,
            stop,
            token,
            cadence: CadenceState::default(),
            state: LoopState::Idle,
            failures: 0,
        }
    }

    /// Run until stopped, a re-authentication fails, or a task panics
    pub async fn run(mut self) -> LoopExit {
        info!(
            "Starting poll loop (tick every {:?}, back-off {:?})",
            self.settings.tick_interval, self.settings.backoff.first
        );

        while !self.stop_requested() {
            let delay = match self.iterate().await {
                Ok(delay) => delay,
                Err(exit) => {
                    self.transition(LoopState::Stopped);
                    return exit;
                }
            };

            if self.sleep_or_stop(delay).await {
                break;
            }
        }

        self.transition(LoopState::Stopped);
        info!("Run loop exited");
        LoopExit::Stopped
    }

    /// One tick plus its recovery; returns how long to wait before the next
    async fn iterate(&mut self) -> Result<Duration, LoopExit> {
        self.transition(LoopState::Polling);

        let Some(token) = self.token.as_ref() else {
            warn!("No access token, authenticating before polling");
            self.reauthenticate().await?;
            return Ok(self.settings.tick_interval);
        };

        match self.assembler.tick(&mut self.cadence, token).await {
            Ok(outcome) => {
                self.failures = 0;
                log_outcome(&outcome);
                Ok(self.settings.tick_interval)
            }
            Err(err) if err.is_auth_failure() => {
                warn!("No longer authenticated, retrying auth: {}", err);
                self.reauthenticate().await?;
                Ok(self.settings.tick_interval)
            }
            Err(TickError::Fault(reason)) => {
                error!("Internal fault during tick: {}", reason);
                Err(LoopExit::Fault(reason))
            }
            Err(err) => {
                self.transition(LoopState::BackingOff);
                let delay = self.settings.backoff.next(self.failures);
                self.failures = self.failures.saturating_add(1);
                warn!(
                    category = ?err.category(),
                    "Error running iteration (will wait {:?} and try again): {}",
                    delay,
                    err
                );
                Ok(delay)
            }
        }
    }

    async fn reauthenticate(&mut self) -> Result<(), LoopExit> {
        self.transition(LoopState::Reauthenticating);
        match self.authenticator.authenticate().await {
            Ok(token) => {
                info!("Re-authenticated");
                self.token = Some(token);
                Ok(())
            }
            Err(err) => {
                error!("Failed to reauthenticate: {}", err);
                Err(LoopExit::ReauthFailed(err))
            }
        }
    }

    fn stop_requested(&self) -> bool {
        *self.stop.borrow()
    }

    /// Sleep for `delay`; returns true if stop was requested meanwhile.
    ///
    /// A dropped stop sender also counts as a stop.
    async fn sleep_or_stop(&mut self, delay: Duration) -> bool {
        tokio::select! {
            _ = tokio::time::sleep(delay) => false,
            _ = self.stop.wait_for(|stop| *stop) => true,
        }
    }

    fn transition(&mut self, next: LoopState) {
        if self.state != next {
            debug!("Poll loop {:?} -> {:?}", self.state, next);
            self.state = next;
        }
    }
}

fn log_outcome(outcome: &TickOutcome) {
    match outcome {
        TickOutcome::Published(snapshot) => {
            info!("Published snapshot with {} categories", snapshot.len())
        }
        TickOutcome::PublishedPartial(_) => info!("Published vehicle_info only"),
        TickOutcome::Idle => debug!("Nothing due, skipped publish"),
    }
}
