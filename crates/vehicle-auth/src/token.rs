//! Tokens and Credentials

use serde::Deserialize;
use std::fmt;

/// Bearer token for the owner API.
///
/// `Debug` and `Display` never reveal the secret.
#[derive(Clone, PartialEq, Eq)]
pub struct AccessToken(String);

impl AccessToken {
    /// Wrap a raw token string
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    /// Raw token value for the `Authorization` header
    pub fn secret(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for AccessToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "AccessToken(<{} chars>)", self.0.len())
    }
}

impl fmt::Display for AccessToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("<redacted>")
    }
}

/// Configured way of obtaining a token
#[derive(Clone)]
pub enum Credentials {
    /// Long-lived token used as-is
    Token(AccessToken),
    /// Refresh token exchanged for an access token
    RefreshToken(String),
    /// Username/password login
    Password { username: String, password: String },
}

impl Credentials {
    /// Short label for logs
    pub fn kind(&self) -> &'static str {
        match self {
            Credentials::Token(_) => "token",
            Credentials::RefreshToken(_) => "refresh token",
            Credentials::Password { .. } => "password",
        }
    }

    /// Whether a token is available without talking to the auth server
    pub fn is_provided_token(&self) -> bool {
        !matches!(self, Credentials::Password { .. })
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Credentials::Password { username, .. } => f
                .debug_struct("Password")
                .field("username", username)
                .finish_non_exhaustive(),
            other => write!(f, "Credentials({})", other.kind()),
        }
    }
}

/// Reply body of the OAuth token endpoint
#[derive(Clone, Deserialize)]
pub struct TokenResponse {
    pub access_token: String,
    /// Lifetime in seconds
    #[serde(default)]
    pub expires_in: Option<u64>,
    /// Rotated refresh token, when the server issues one
    #[serde(default)]
    pub refresh_token: Option<String>,
}
