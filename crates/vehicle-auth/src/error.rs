//! Authentication Error Types

use thiserror::Error;

/// Errors that can occur while obtaining an access token
#[derive(Debug, Error)]
pub enum AuthError {
    /// The auth server refused the credentials
    #[error("Authentication rejected ({status}): {reason}")]
    Rejected { status: u16, reason: String },

    /// Transport failure talking to the auth server
    #[error("Auth request failed: {0}")]
    Http(String),

    /// Reply could not be decoded
    #[error("Invalid auth response: {0}")]
    InvalidResponse(String),
}

impl From<reqwest::Error> for AuthError {
    fn from(err: reqwest::Error) -> Self {
        // Strip the URL so query strings never end up in logs
        AuthError::Http(err.without_url().to_string())
    }
}
