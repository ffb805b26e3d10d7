use chrono::{DateTime, Utc};
use common::{MovementId, ProductId, UserId};
use serde::{Deserialize, Serialize};
use store::{MovementKind, MovementRecord, SoftDeletable, Store, StoreError, StoreExt};
use tracing::{info, warn};

use crate::movement::validate_reference;
use crate::{InventoryError, MovementLog, Result, StockLedger};

/// A manual stock entry or adjustment.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ManualMovementRequest {
    /// Wire name of the kind: `Entrada` or `Ajuste`.
    pub kind: String,
    pub quantity: i64,
    pub product_id: ProductId,
    pub actor_user_id: UserId,
    pub reference: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MovementConfirmation {
    pub movement_id: MovementId,
    pub kind: MovementKind,
    pub quantity: i64,
    pub product_id: ProductId,
    pub reference: String,
    pub timestamp: DateTime<Utc>,
}

impl From<MovementRecord> for MovementConfirmation {
    fn from(movement: MovementRecord) -> Self {
        Self {
            movement_id: movement.id,
            kind: movement.kind,
            quantity: movement.quantity,
            product_id: movement.product_id,
            reference: movement.reference,
            timestamp: movement.timestamp,
        }
    }
}

/// A product's stock compared with what its movement history implies.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockReconciliation {
    pub product_id: ProductId,
    pub baseline: i64,
    /// Sum of `Entrada` and `Ajuste` quantities.
    pub entries: i64,
    /// Sum of `Salida` quantities.
    pub exits: i64,
    pub expected: i64,
    pub actual: i64,
}

impl StockReconciliation {
    pub fn is_balanced(&self) -> bool {
        self.expected == self.actual
    }
}

/// Manual movements and inventory read-side queries.
pub struct InventoryService<S: Store> {
    store: S,
    ledger: StockLedger,
    log: MovementLog,
}

impl<S: Store> InventoryService<S> {
    pub fn new(store: S) -> Self {
        Self {
            store,
            ledger: StockLedger::new(),
            log: MovementLog::new(),
        }
    }

    /// Records an `Entrada` or `Ajuste` and raises the product's stock in one
    /// unit of work.
    #[tracing::instrument(skip(self, request), fields(product_id = %request.product_id, kind = %request.kind))]
    pub async fn record_manual_movement(
        &self,
        request: ManualMovementRequest,
    ) -> Result<MovementConfirmation> {
        let kind: MovementKind = request
            .kind
            .parse()
            .map_err(|_| InventoryError::InvalidKind(request.kind.clone()))?;
        if kind == MovementKind::Exit {
            return Err(InventoryError::KindNotAllowed(kind));
        }
        if request.quantity <= 0 {
            return Err(InventoryError::InvalidQuantity(request.quantity));
        }
        validate_reference(&request.reference)?;

        self.store
            .find_user(request.actor_user_id)
            .await?
            .filter(|u| u.is_active())
            .ok_or(InventoryError::InvalidActor(request.actor_user_id))?;

        let mut uow = self.store.begin().await?;

        let product = self.ledger.resolve(uow.as_mut(), request.product_id).await?;

        let stock = self
            .ledger
            .increment(uow.as_mut(), &product, request.quantity)
            .await?;
        let movement = self
            .log
            .record(
                uow.as_mut(),
                kind,
                request.quantity,
                product.id,
                request.actor_user_id,
                &request.reference,
            )
            .await?;

        if let Err(e) = uow.commit().await {
            tracing::error!(error = ?e, "manual movement commit failed");
            return Err(e.into());
        }

        metrics::counter!("stock_movements_total", "kind" => kind.as_str()).increment(1);
        info!(movement_id = %movement.id, stock, "manual movement committed");
        Ok(movement.into())
    }

    pub async fn get_movement(&self, id: MovementId) -> Result<MovementConfirmation> {
        self.store
            .find_movement(id)
            .await?
            .map(MovementConfirmation::from)
            .ok_or(InventoryError::MovementNotFound(id))
    }

    /// Replays the product's movement log on top of its baseline and compares
    /// the result with the stock column.
    #[tracing::instrument(skip(self))]
    pub async fn reconcile(&self, product_id: ProductId) -> Result<StockReconciliation> {
        let product = self
            .store
            .find_product(product_id)
            .await?
            .ok_or(InventoryError::ProductNotFound(product_id))?;

        let movements = self.store.product_movements(product_id).await?;
        let overflow =
            || StoreError::InvalidData(format!("movement totals of product {product_id} overflow"));
        let (entries, exits) = movements.iter().try_fold((0i64, 0i64), |(entries, exits), m| {
            let totals = match m.kind {
                MovementKind::Entry | MovementKind::Adjustment => {
                    entries.checked_add(m.quantity).map(|entries| (entries, exits))
                }
                MovementKind::Exit => exits.checked_add(m.quantity).map(|exits| (entries, exits)),
            };
            totals.ok_or_else(overflow)
        })?;
        let expected = product
            .baseline_stock
            .checked_add(entries)
            .and_then(|sum| sum.checked_sub(exits))
            .ok_or_else(overflow)?;

        let reconciliation = StockReconciliation {
            product_id,
            baseline: product.baseline_stock,
            entries,
            exits,
            expected,
            actual: product.stock.unwrap_or(0),
        };

        if !reconciliation.is_balanced() {
            warn!(
                expected = reconciliation.expected,
                actual = reconciliation.actual,
                "stock does not match movement history"
            );
        }
        Ok(reconciliation)
    }
}
