//! OAuth Client for the Owner API
//!
//! Turns configured credentials into an access token. The refresh and
//! login paths post form-encoded bodies to the token endpoint.

use crate::error::AuthError;
use crate::token::{AccessToken, Credentials, TokenResponse};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use std::sync::Mutex;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Default OAuth token endpoint
pub const DEFAULT_AUTH_URL: &str = "https://auth.tesla.com/oauth2/v3/token";

/// OAuth client id of the owner API
const CLIENT_ID: &str = "ownerapi";

/// Scope requested by password login
const LOGIN_SCOPE: &str = "openid email offline_access";

/// Request timeout for the token endpoint
const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// Something that can produce a fresh access token
#[async_trait]
pub trait Authenticate: Send + Sync {
    /// Obtain an access token using the configured mechanism
    async fn authenticate(&self) -> Result<AccessToken, AuthError>;
}

/// Token client backed by the OAuth endpoint
pub struct AuthClient {
    http: reqwest::Client,
    auth_url: String,
    credentials: Credentials,
    /// Latest refresh token handed out by the server
    rotated_refresh: Mutex<Option<String>>,
}

impl AuthClient {
    /// Create a new auth client
    ///
    /// # Arguments
    /// * `credentials` - How to obtain tokens
    /// * `auth_url` - OAuth token endpoint
    pub fn new(credentials: Credentials, auth_url: &str) -> Result<Self, AuthError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(DEFAULT_TIMEOUT_SECS))
            .build()?;

        info!("Creating auth client using {} credentials", credentials.kind());

        Ok(Self {
            http,
            auth_url: auth_url.to_string(),
            credentials,
            rotated_refresh: Mutex::new(None),
        })
    }

    /// Refresh token to use for the next exchange
    fn current_refresh_token(&self, configured: &str) -> String {
        self.rotated_refresh
            .lock()
            .ok()
            .and_then(|slot| slot.clone())
            .unwrap_or_else(|| configured.to_string())
    }

    fn remember_refresh_token(&self, token: Option<String>) {
        let Some(token) = token else { return };
        match self.rotated_refresh.lock() {
            Ok(mut slot) => *slot = Some(token),
            Err(_) => warn!("Refresh token store poisoned, keeping previous token"),
        }
    }

    async fn exchange_refresh_token(&self, configured: &str) -> Result<AccessToken, AuthError> {
        let refresh_token = self.current_refresh_token(configured);
        debug!("Exchanging refresh token for access token");

        let reply = self.post_form(&refresh_form(&refresh_token)).await?;
        log_expiry(&reply);
        self.remember_refresh_token(reply.refresh_token);

        Ok(AccessToken::new(reply.access_token))
    }

    async fn login(&self, username: &str, password: &str) -> Result<AccessToken, AuthError> {
        debug!("Logging in as {}", username);

        let reply = self.post_form(&login_form(username, password)).await?;
        log_expiry(&reply);
        self.remember_refresh_token(reply.refresh_token);

        info!("Login successful");
        Ok(AccessToken::new(reply.access_token))
    }

    async fn post_form(&self, form: &[(&str, &str)]) -> Result<TokenResponse, AuthError> {
        let response = self.http.post(&self.auth_url).form(form).send().await?;
        let status = response.status().as_u16();
        let body = response.text().await?;
        parse_token_reply(status, &body)
    }
}

#[async_trait]
impl Authenticate for AuthClient {
    async fn authenticate(&self) -> Result<AccessToken, AuthError> {
        match &self.credentials {
            Credentials::RefreshToken(refresh) => self.exchange_refresh_token(refresh).await,
            Credentials::Token(token) => Ok(token.clone()),
            Credentials::Password { username, password } => self.login(username, password).await,
        }
    }
}

/// Error body of the OAuth endpoint
#[derive(Debug, Deserialize)]
struct ErrorReply {
    error: String,
    #[serde(default)]
    error_description: Option<String>,
}

fn refresh_form(refresh_token: &str) -> [(&'static str, &str); 3] {
    [
        ("grant_type", "refresh_token"),
        ("client_id", CLIENT_ID),
        ("refresh_token", refresh_token),
    ]
}

fn login_form<'a>(username: &'a str, password: &'a str) -> [(&'static str, &'a str); 5] {
    [
        ("grant_type", "password"),
        ("client_id", CLIENT_ID),
        ("username", username),
        ("password", password),
        ("scope", LOGIN_SCOPE),
    ]
}

fn parse_token_reply(status: u16, body: &str) -> Result<TokenResponse, AuthError> {
    if !(200..300).contains(&status) {
        let reason = match serde_json::from_str::<ErrorReply>(body) {
            Ok(reply) => match reply.error_description {
                Some(description) => format!("{}: {}", reply.error, description),
                None => reply.error,
            },
            Err(_) => "unexpected reply from token endpoint".to_string(),
        };
        return Err(AuthError::Rejected { status, reason });
    }

    serde_json::from_str(body).map_err(|e| AuthError::InvalidResponse(e.to_string()))
}

fn log_expiry(reply: &TokenResponse) {
    let Some(secs) = reply.expires_in else {
        info!("Received access token without expiry");
        return;
    };

    match expiry_time(secs) {
        Some(expires_at) => info!(
            "Received access token which will expire in {} seconds (at {})",
            secs,
            expires_at.to_rfc3339()
        ),
        None => info!("Received access token which will expire in {} seconds", secs),
    }
}

/// Wall-clock expiry, `None` when it falls outside chrono's range
fn expiry_time(secs: u64) -> Option<DateTime<Utc>> {
    let secs = i64::try_from(secs).ok()?;
    let lifetime = chrono::Duration::try_seconds(secs)?;
    Utc::now().checked_add_signed(lifetime)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_refresh_form_fields() {
        let form = refresh_form("rt-123");
        assert_eq!(form[0], ("grant_type", "refresh_token"));
        assert_eq!(form[1], ("client_id", "ownerapi"));
        assert_eq!(form[2], ("refresh_token", "rt-123"));
    }

    #[test]
    fn test_login_form_fields() {
        let form = login_form("owner@example.com", "secret");
        assert_eq!(form[0], ("grant_type", "password"));
        assert_eq!(form[2], ("username", "owner@example.com"));
        assert_eq!(form[3], ("password", "secret"));
    }

    #[test]
    fn test_parse_success_reply() {
        let body = r#"{"access_token":"at-1","expires_in":28800,"refresh_token":"rt-2"}"#;
        let reply = parse_token_reply(200, body).unwrap();
        assert_eq!(reply.access_token, "at-1");
        assert_eq!(reply.expires_in, Some(28800));
        assert_eq!(reply.refresh_token.as_deref(), Some("rt-2"));
    }

    #[test]
    fn test_parse_rejected_reply() {
        let body = r#"{"error":"invalid_grant","error_description":"refresh token revoked"}"#;
        match parse_token_reply(401, body) {
            Err(AuthError::Rejected { status, reason }) => {
                assert_eq!(status, 401);
                assert_eq!(reason, "invalid_grant: refresh token revoked");
            }
            other => panic!("expected rejection, got {:?}", other.map(|r| r.access_token)),
        }
    }

    #[test]
    fn test_parse_garbage_reply() {
        assert!(matches!(
            parse_token_reply(200, "<html>"),
            Err(AuthError::InvalidResponse(_))
        ));
        assert!(matches!(
            parse_token_reply(502, "<html>"),
            Err(AuthError::Rejected { status: 502, .. })
        ));
    }

    #[test]
    fn test_oversized_expiry_is_logged_without_timestamp() {
        let body = r#"{"access_token":"a","expires_in":100000000000000000}"#;
        let reply = parse_token_reply(200, body).unwrap();
        assert_eq!(expiry_time(reply.expires_in.unwrap()), None);
        log_expiry(&reply);

        assert_eq!(expiry_time(u64::MAX), None);
        assert!(expiry_time(28800).is_some());
    }

    #[tokio::test]
    async fn test_token_passthrough() {
        let token = AccessToken::new("long-lived");
        let client = AuthClient::new(Credentials::Token(token.clone()), DEFAULT_AUTH_URL).unwrap();
        assert_eq!(client.authenticate().await.unwrap(), token);
    }

    #[test]
    fn test_rotated_refresh_token_is_reused() {
        let client = AuthClient::new(
            Credentials::RefreshToken("rt-configured".into()),
            DEFAULT_AUTH_URL,
        )
        .unwrap();
        assert_eq!(client.current_refresh_token("rt-configured"), "rt-configured");

        client.remember_refresh_token(None);
        assert_eq!(client.current_refresh_token("rt-configured"), "rt-configured");

        client.remember_refresh_token(Some("rt-rotated".into()));
        assert_eq!(client.current_refresh_token("rt-configured"), "rt-rotated");
    }
}
