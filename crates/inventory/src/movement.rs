use chrono::Utc;
use common::{ProductId, UserId};
use store::{MovementKind, MovementRecord, NewMovement, UnitOfWork};
use tracing::debug;

use crate::{InventoryError, Result};

/// Longest correlation reference the movement log stores.
pub const MAX_REFERENCE_LEN: usize = 50;

/// Appends immutable movement facts. Rows are staged in the caller's unit of
/// work and become durable only when it commits.
#[derive(Debug, Clone, Copy, Default)]
pub struct MovementLog;

impl MovementLog {
    pub fn new() -> Self {
        Self
    }

    /// Stages one movement.
    ///
    /// Any kind is accepted; callers decide which kinds they may produce.
    pub async fn record(
        &self,
        uow: &mut dyn UnitOfWork,
        kind: MovementKind,
        quantity: i64,
        product_id: ProductId,
        user_id: UserId,
        reference: &str,
    ) -> Result<MovementRecord> {
        if quantity <= 0 {
            return Err(InventoryError::InvalidQuantity(quantity));
        }
        validate_reference(reference)?;

        let movement = uow
            .insert_movement(NewMovement {
                timestamp: Utc::now(),
                kind,
                quantity,
                reference: reference.to_string(),
                product_id,
                user_id,
            })
            .await?;

        debug!(
            movement_id = %movement.id,
            %kind,
            quantity,
            %product_id,
            reference,
            "movement staged"
        );
        Ok(movement)
    }
}

pub(crate) fn validate_reference(reference: &str) -> Result<()> {
    if reference.trim().is_empty() {
        return Err(InventoryError::InvalidReference(
            "reference must not be empty".to_string(),
        ));
    }
    if reference.chars().count() > MAX_REFERENCE_LEN {
        return Err(InventoryError::InvalidReference(format!(
            "reference must be at most {MAX_REFERENCE_LEN} characters"
        )));
    }
    Ok(())
}
