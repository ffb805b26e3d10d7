//! Login and refresh-token exchange endpoints.

use std::sync::Arc;

use auth::TokenPair;
use axum::Json;
use axum::extract::State;
use axum::extract::rejection::JsonRejection;
use serde::Deserialize;
use store::Store;

use crate::AppState;
use crate::error::ApiError;

#[derive(Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Deserialize)]
pub struct RefreshRequest {
    pub refresh_token: String,
}

/// POST /auth/login — exchange credentials for a token pair.
#[tracing::instrument(skip_all)]
pub async fn login<S: Store + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    payload: Result<Json<LoginRequest>, JsonRejection>,
) -> Result<Json<TokenPair>, ApiError> {
    let Json(req) = payload?;
    let pair = state.auth.login(&req.email, &req.password).await?;
    Ok(Json(pair))
}

/// POST /auth/refresh — rotate a refresh token into a new pair.
#[tracing::instrument(skip_all)]
pub async fn refresh<S: Store + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    payload: Result<Json<RefreshRequest>, JsonRejection>,
) -> Result<Json<TokenPair>, ApiError> {
    let Json(req) = payload?;
    let pair = state.auth.refresh(&req.refresh_token).await?;
    Ok(Json(pair))
}
