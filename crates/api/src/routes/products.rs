//! Product reconciliation and deletion endpoints.

use std::sync::Arc;

use auth::roles;
use axum::Json;
use axum::extract::rejection::PathRejection;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use common::ProductId;
use inventory::StockReconciliation;
use store::{DeleteOutcome, EntityKind, Store, StoreExt};

use crate::AppState;
use crate::error::ApiError;
use crate::extract::{AuthenticatedActor, require_role};

/// GET /products/{id}/reconciliation — compare stock with its movement history.
#[tracing::instrument(skip_all)]
pub async fn reconciliation<S: Store + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    AuthenticatedActor(actor): AuthenticatedActor,
    id: Result<Path<ProductId>, PathRejection>,
) -> Result<Json<StockReconciliation>, ApiError> {
    require_role(&actor, roles::INVENTORY)?;
    let Path(id) = id?;
    Ok(Json(state.inventory.reconcile(id).await?))
}

/// DELETE /products/{id} — logically delete a product. Admin only.
#[tracing::instrument(skip_all, fields(user_id = %actor.user_id))]
pub async fn delete<S: Store + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    AuthenticatedActor(actor): AuthenticatedActor,
    id: Result<Path<ProductId>, PathRejection>,
) -> Result<StatusCode, ApiError> {
    require_role(&actor, roles::INVENTORY)?;
    let Path(id) = id?;
    match state.store.delete(EntityKind::Product, id.as_i64()).await? {
        DeleteOutcome::NotFound => Err(ApiError::NotFound(format!("Product not found: {id}"))),
        DeleteOutcome::SoftDeleted | DeleteOutcome::Removed => {
            tracing::info!(product_id = %id, "product deleted");
            Ok(StatusCode::NO_CONTENT)
        }
    }
}
