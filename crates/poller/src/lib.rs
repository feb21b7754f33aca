//! Vehicle Telemetry Poller
//!
//! Wires authentication, the owner API client and the AMQP publisher into
//! a [`PollLoop`].

pub mod backoff;
pub mod config;
pub mod poll_loop;
pub mod signals;

pub use backoff::BackoffPolicy;
pub use config::{BusSettings, ConfigError, LogFormat, PollerConfig};
pub use poll_loop::{LoopExit, LoopSettings, LoopState, PollLoop, EXIT_FATAL, EXIT_REAUTH_FAILED};

use poll_scheduler::SnapshotAssembler;
use std::sync::Arc;
use telemetry_bus::{AmqpChannel, BusError, SnapshotPublisher};
use thiserror::Error;
use tokio::sync::watch;
use tracing::{debug, info, warn, Level};
use tracing_subscriber::FmtSubscriber;
use vehicle_api::{OwnerApiClient, TelemetryError};
use vehicle_auth::{AccessToken, AuthClient, AuthError, Authenticate, Credentials};

/// Failures before the loop starts
#[derive(Debug, Error)]
pub enum StartupError {
    #[error("Failed to get access token: {0}")]
    Login(#[source] AuthError),

    #[error("Failed to set up service bus: {0}")]
    Bus(#[from] BusError),

    #[error("Failed to create API client: {0}")]
    Api(#[from] TelemetryError),
}

/// Initialize logging
pub fn init_logging(
    verbose: bool,
    format: LogFormat,
) -> Result<(), tracing::subscriber::SetGlobalDefaultError> {
    let level = if verbose { Level::DEBUG } else { Level::INFO };
    let builder = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(true);

    match format {
        LogFormat::Json => tracing::subscriber::set_global_default(builder.json().finish()),
        LogFormat::Text => tracing::subscriber::set_global_default(builder.finish()),
    }
}

/// Obtain the token the loop starts with.
///
/// Password login must succeed here. With a configured token the loop may
/// start without one and re-authenticate on its first iteration.
pub async fn initial_token(
    auth: &dyn Authenticate,
    credentials: &Credentials,
) -> Result<Option<AccessToken>, StartupError> {
    info!("Getting access token");
    match auth.authenticate().await {
        Ok(token) => {
            info!("Logged in successfully");
            Ok(Some(token))
        }
        Err(err) if credentials.is_provided_token() => {
            warn!(
                "Failed to get access token from {} credentials, will retry in loop: {}",
                credentials.kind(),
                err
            );
            Ok(None)
        }
        Err(err) => Err(StartupError::Login(err)),
    }
}

/// Authenticate, connect to the bus and run the poll loop until it exits
pub async fn run(
    config: PollerConfig,
    stop: watch::Receiver<bool>,
) -> Result<LoopExit, StartupError> {
    debug!("Poll loop {:?} -> {:?}", LoopState::Idle, LoopState::Authenticating);
    let auth = Arc::new(
        AuthClient::new(config.credentials.clone(), &config.auth_url)
            .map_err(StartupError::Login)?,
    );

    let token = initial_token(auth.as_ref(), &config.credentials).await?;

    debug!("Poll loop {:?} -> {:?}", LoopState::Authenticating, LoopState::Connecting);
    info!("Connecting to service bus");
    let channel = AmqpChannel::connect(&config.bus.connection_string).await?;
    let publisher = Arc::new(SnapshotPublisher::new(channel, config.bus.target.clone()));
    publisher.declare().await?;
    info!("Connected to service bus");

    let source = Arc::new(OwnerApiClient::new(&config.api_base_url, config.vehicle_index)?);
    let assembler = SnapshotAssembler::new(source, publisher.clone(), config.assembler.clone());
    let settings = LoopSettings {
        tick_interval: config.tick_interval,
        backoff: config.backoff,
    };

    let exit = PollLoop::new(assembler, auth, settings, token, stop)
        .run()
        .await;

    if let Err(err) = publisher.channel().close().await {
        warn!("Failed to close service bus connection: {}", err);
    }
    Ok(exit)
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Authenticator answering every call with the same outcome
    struct FixedAuth {
        calls: AtomicUsize,
        succeed: bool,
    }

    impl FixedAuth {
        fn new(succeed: bool) -> Self {
            Self {
                calls: AtomicUsize::new(0),
                succeed,
            }
        }
    }

    #[async_trait]
    impl Authenticate for FixedAuth {
        async fn authenticate(&self) -> Result<AccessToken, AuthError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.succeed {
                Ok(AccessToken::new("at-startup"))
            } else {
                Err(AuthError::Rejected {
                    status: 401,
                    reason: "invalid_grant".into(),
                })
            }
        }
    }

    fn password() -> Credentials {
        Credentials::Password {
            username: "owner@example.com".into(),
            password: "secret".into(),
        }
    }

    #[tokio::test]
    async fn test_initial_token_success() {
        let auth = FixedAuth::new(true);
        let token = initial_token(&auth, &password()).await.unwrap();
        assert_eq!(token, Some(AccessToken::new("at-startup")));
        assert_eq!(auth.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_refresh_failure_starts_without_token() {
        let auth = FixedAuth::new(false);
        let creds = Credentials::RefreshToken("rt-revoked".into());

        let token = initial_token(&auth, &creds).await.unwrap();

        assert_eq!(token, None);
        assert_eq!(auth.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_password_login_failure_is_fatal() {
        let auth = FixedAuth::new(false);

        let result = initial_token(&auth, &password()).await;

        assert!(matches!(
            result,
            Err(StartupError::Login(AuthError::Rejected { status: 401, .. }))
        ));
    }
}
