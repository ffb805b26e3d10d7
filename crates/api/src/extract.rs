//! Bearer-token extraction and role checks.

use std::sync::Arc;

use auth::Actor;
use axum::extract::FromRequestParts;
use axum::http::header::AUTHORIZATION;
use axum::http::request::Parts;
use store::{SoftDeletable, Store};

use crate::AppState;
use crate::error::ApiError;

/// The actor behind a verified `Authorization: Bearer` access token.
///
/// The token's user must still exist and be active; the role is taken from
/// the stored user so a role change applies to tokens already issued.
#[derive(Debug, Clone)]
pub struct AuthenticatedActor(pub Actor);

impl<S: Store + 'static> FromRequestParts<Arc<AppState<S>>> for AuthenticatedActor {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState<S>>,
    ) -> Result<Self, Self::Rejection> {
        let header = parts
            .headers
            .get(AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .ok_or_else(|| ApiError::Unauthorized("missing bearer token".to_string()))?;

        let token = bearer_token(header)
            .ok_or_else(|| ApiError::Unauthorized("malformed authorization header".to_string()))?;

        let mut actor = state.auth.verify_access(token)?;
        let user = state
            .store
            .find_user(actor.user_id)
            .await?
            .filter(|u| u.is_active())
            .ok_or_else(|| ApiError::Unauthorized("user is no longer active".to_string()))?;
        actor.role = user.role;

        Ok(AuthenticatedActor(actor))
    }
}

/// Rejects the actor with 403 unless it holds one of `allowed`.
pub fn require_role(actor: &Actor, allowed: &[&str]) -> Result<(), ApiError> {
    if actor.has_any_role(allowed) {
        Ok(())
    } else {
        Err(ApiError::Forbidden(format!(
            "role {} may not use this endpoint",
            actor.role
        )))
    }
}

fn bearer_token(header: &str) -> Option<&str> {
    header
        .strip_prefix("Bearer ")
        .map(str::trim)
        .filter(|t| !t.is_empty())
}
