use common::ProductId;
use store::{ProductRecord, SoftDeletable, UnitOfWork};
use tracing::debug;

use crate::{InventoryError, Result};

/// Owns quantity on hand. Every stock mutation goes through here, inside an
/// open unit of work.
#[derive(Debug, Clone, Copy, Default)]
pub struct StockLedger;

impl StockLedger {
    pub fn new() -> Self {
        Self
    }

    /// Locks the product and checks it can supply `quantity` units.
    ///
    /// Fails with `ProductNotFound` for missing or logically deleted products
    /// and with `InsufficientStock` when stock is untracked or too low. The
    /// row lock is held until the unit of work ends, so a following
    /// [`StockLedger::decrement`] acts on the stock observed here.
    pub async fn check_availability(
        &self,
        uow: &mut dyn UnitOfWork,
        product_id: ProductId,
        quantity: i64,
    ) -> Result<ProductRecord> {
        let product = self.resolve(uow, product_id).await?;
        self.ensure_available(&product, quantity)?;
        Ok(product)
    }

    /// Locks and returns a live product.
    pub async fn resolve(
        &self,
        uow: &mut dyn UnitOfWork,
        product_id: ProductId,
    ) -> Result<ProductRecord> {
        uow.lock_product(product_id)
            .await?
            .filter(|p| p.is_active())
            .ok_or(InventoryError::ProductNotFound(product_id))
    }

    /// Side-effect-free stock check on an already resolved product.
    pub fn ensure_available(&self, product: &ProductRecord, quantity: i64) -> Result<()> {
        match product.stock {
            Some(stock) if stock >= quantity => Ok(()),
            available => Err(InventoryError::InsufficientStock {
                product_id: product.id,
                requested: quantity,
                available,
            }),
        }
    }

    /// Reduces stock by `quantity`. Availability must already have been
    /// checked in the same unit of work.
    pub async fn decrement(
        &self,
        uow: &mut dyn UnitOfWork,
        product: &ProductRecord,
        quantity: i64,
    ) -> Result<i64> {
        let stock = uow.adjust_stock(product.id, -quantity).await?;
        debug!(product_id = %product.id, quantity, stock, "stock decremented");
        Ok(stock)
    }

    /// Increases stock by `quantity`; untracked stock starts from zero.
    ///
    /// Fails with `StockOverflow` when the new stock would not fit.
    pub async fn increment(
        &self,
        uow: &mut dyn UnitOfWork,
        product: &ProductRecord,
        quantity: i64,
    ) -> Result<i64> {
        let current = product.stock.unwrap_or(0);
        if current.checked_add(quantity).is_none() {
            return Err(InventoryError::StockOverflow {
                product_id: product.id,
                stock: current,
                quantity,
            });
        }
        let stock = uow.adjust_stock(product.id, quantity).await?;
        debug!(product_id = %product.id, quantity, stock, "stock incremented");
        Ok(stock)
    }
}
