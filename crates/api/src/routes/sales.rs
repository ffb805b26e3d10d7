//! Sale endpoints.

use std::sync::Arc;

use auth::roles;
use axum::Json;
use axum::extract::rejection::{JsonRejection, PathRejection};
use axum::extract::{Path, State};
use axum::http::StatusCode;
use chrono::{DateTime, Utc};
use common::SaleId;
use sales::{SaleLineRequest, SaleReceipt, SaleRequest};
use serde::Deserialize;
use store::Store;

use crate::AppState;
use crate::error::ApiError;
use crate::extract::{AuthenticatedActor, require_role};

/// Sale body. The acting user always comes from the access token.
#[derive(Deserialize)]
pub struct CreateSaleRequest {
    #[serde(default)]
    pub lines: Vec<SaleLineRequest>,
    #[serde(default)]
    pub timestamp: Option<DateTime<Utc>>,
}

/// POST /sales — process a sale atomically.
#[tracing::instrument(skip_all, fields(user_id = %actor.user_id))]
pub async fn create<S: Store + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    AuthenticatedActor(actor): AuthenticatedActor,
    payload: Result<Json<CreateSaleRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<SaleReceipt>), ApiError> {
    require_role(&actor, roles::SALES)?;
    let Json(req) = payload?;
    let request = SaleRequest {
        actor_user_id: Some(actor.user_id),
        lines: req.lines,
        timestamp: req.timestamp,
    };
    let receipt = state.sales.process_sale(request).await?;
    Ok((StatusCode::CREATED, Json(receipt)))
}

/// GET /sales/{id} — load a committed sale.
#[tracing::instrument(skip_all)]
pub async fn get<S: Store + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    AuthenticatedActor(actor): AuthenticatedActor,
    id: Result<Path<SaleId>, PathRejection>,
) -> Result<Json<SaleReceipt>, ApiError> {
    require_role(&actor, roles::SALES)?;
    let Path(id) = id?;
    Ok(Json(state.sales.get_sale(id).await?))
}
