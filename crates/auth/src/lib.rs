//! Auth Token Rotator.
//!
//! Issues access credentials and refresh tokens, and exchanges a refresh
//! token for a new pair in a single unit of work.

pub mod config;
pub mod error;
pub mod password;
pub mod roles;
pub mod rotator;
pub mod tokens;

pub use config::AuthConfig;
pub use error::{AuthError, Result};
pub use password::{hash_password, verify_password};
pub use rotator::{TokenPair, TokenRotator};
pub use tokens::{AccessClaims, Actor, TokenIssuer, generate_refresh_token};
