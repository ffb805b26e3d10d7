//! Manual stock movement endpoints.

use std::sync::Arc;

use auth::roles;
use axum::Json;
use axum::extract::rejection::{JsonRejection, PathRejection};
use axum::extract::{Path, State};
use axum::http::StatusCode;
use common::{MovementId, ProductId};
use inventory::{ManualMovementRequest, MovementConfirmation};
use serde::Deserialize;
use store::Store;

use crate::AppState;
use crate::error::ApiError;
use crate::extract::{AuthenticatedActor, require_role};

#[derive(Deserialize)]
pub struct CreateMovementRequest {
    pub kind: String,
    pub quantity: i64,
    pub product_id: ProductId,
    pub reference: String,
}

/// POST /movements — record an `Entrada` or `Ajuste`. Admin only.
#[tracing::instrument(skip_all, fields(user_id = %actor.user_id))]
pub async fn create<S: Store + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    AuthenticatedActor(actor): AuthenticatedActor,
    payload: Result<Json<CreateMovementRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<MovementConfirmation>), ApiError> {
    require_role(&actor, roles::INVENTORY)?;
    let Json(req) = payload?;
    let confirmation = state
        .inventory
        .record_manual_movement(ManualMovementRequest {
            kind: req.kind,
            quantity: req.quantity,
            product_id: req.product_id,
            actor_user_id: actor.user_id,
            reference: req.reference,
        })
        .await?;
    Ok((StatusCode::CREATED, Json(confirmation)))
}

/// GET /movements/{id} — load one movement.
#[tracing::instrument(skip_all)]
pub async fn get<S: Store + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    AuthenticatedActor(actor): AuthenticatedActor,
    id: Result<Path<MovementId>, PathRejection>,
) -> Result<Json<MovementConfirmation>, ApiError> {
    require_role(&actor, roles::INVENTORY)?;
    let Path(id) = id?;
    Ok(Json(state.inventory.get_movement(id).await?))
}
