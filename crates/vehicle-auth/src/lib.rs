//! Owner API Authentication
//!
//! Obtains bearer tokens for the vehicle owner API:
//! - Direct token pass-through
//! - Refresh token exchange
//! - Username/password login

mod client;
mod error;
mod token;

pub use client::{AuthClient, Authenticate, DEFAULT_AUTH_URL};
pub use error::AuthError;
pub use token::{AccessToken, Credentials, TokenResponse};
