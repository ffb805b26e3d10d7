//! Sale error types.

use std::time::Duration;

use common::{ErrorClass, ProductId, SaleId, UserId};
use inventory::InventoryError;
use store::StoreError;
use thiserror::Error;

/// Errors a sale can end with. Whatever the variant, nothing was persisted.
#[derive(Debug, Error)]
pub enum SaleError {
    /// The request as a whole is malformed.
    #[error("Invalid sale request: {0}")]
    InvalidRequest(String),

    #[error("Invalid line {index}: {reason}")]
    InvalidLine { index: usize, reason: String },

    /// The acting user is missing, unknown or logically deleted.
    #[error("Invalid actor: {}", display_actor(.0))]
    InvalidActor(Option<UserId>),

    #[error("Product not found: {0}")]
    ProductNotFound(ProductId),

    #[error(
        "Insufficient stock for product {product_id}: requested {requested}, available {}",
        display_stock(.available)
    )]
    InsufficientStock {
        product_id: ProductId,
        requested: i64,
        available: Option<i64>,
    },

    /// Concurrent sales kept conflicting after every retry.
    #[error("Stock kept changing concurrently; gave up after {attempts} attempts")]
    ConcurrentStockConflict { attempts: u32 },

    /// The unit of work did not finish in time and was rolled back.
    #[error("Sale timed out after {0:?}")]
    Timeout(Duration),

    #[error("Sale not found: {0}")]
    SaleNotFound(SaleId),

    #[error("Inventory error: {0}")]
    Inventory(InventoryError),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),
}

fn display_actor(user_id: &Option<UserId>) -> String {
    match user_id {
        Some(id) => format!("user {id} does not exist"),
        None => "no acting user given".to_string(),
    }
}

fn display_stock(stock: &Option<i64>) -> String {
    match stock {
        Some(stock) => stock.to_string(),
        None => "none (stock not tracked)".to_string(),
    }
}

impl From<InventoryError> for SaleError {
    fn from(err: InventoryError) -> Self {
        match err {
            InventoryError::ProductNotFound(id) => SaleError::ProductNotFound(id),
            InventoryError::InsufficientStock {
                product_id,
                requested,
                available,
            } => SaleError::InsufficientStock {
                product_id,
                requested,
                available,
            },
            InventoryError::Store(e) => SaleError::Store(e),
            other => SaleError::Inventory(other),
        }
    }
}

impl SaleError {
    pub fn class(&self) -> ErrorClass {
        match self {
            SaleError::InvalidRequest(_)
            | SaleError::InvalidLine { .. }
            | SaleError::InvalidActor(_) => ErrorClass::Validation,
            SaleError::ProductNotFound(_)
            | SaleError::InsufficientStock { .. }
            | SaleError::ConcurrentStockConflict { .. }
            | SaleError::SaleNotFound(_) => ErrorClass::BusinessRule,
            SaleError::Timeout(_) | SaleError::Store(_) => ErrorClass::System,
            SaleError::Inventory(e) => e.class(),
        }
    }

    /// Machine-readable error kind.
    pub fn code(&self) -> &'static str {
        match self {
            SaleError::InvalidRequest(_) => "invalid_request",
            SaleError::InvalidLine { .. } => "invalid_line",
            SaleError::InvalidActor(_) => "invalid_actor",
            SaleError::ProductNotFound(_) => "product_not_found",
            SaleError::InsufficientStock { .. } => "insufficient_stock",
            SaleError::ConcurrentStockConflict { .. } => "concurrent_stock_conflict",
            SaleError::Timeout(_) => "timeout",
            SaleError::SaleNotFound(_) => "sale_not_found",
            SaleError::Inventory(e) => e.code(),
            SaleError::Store(_) => "internal",
        }
    }
}

/// Convenience type alias for sale results.
pub type Result<T> = std::result::Result<T, SaleError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn inventory_errors_keep_their_meaning() {
        let err: SaleError = InventoryError::InsufficientStock {
            product_id: ProductId::new(4),
            requested: 10,
            available: Some(2),
        }
        .into();
        assert!(matches!(err, SaleError::InsufficientStock { .. }));
        assert_eq!(
            err.to_string(),
            "Insufficient stock for product 4: requested 10, available 2"
        );

        let err: SaleError = InventoryError::Store(StoreError::ConcurrencyConflict("x".into())).into();
        assert!(matches!(err, SaleError::Store(ref e) if e.is_retryable()));
    }

    #[test]
    fn classification() {
        assert_eq!(
            SaleError::InvalidActor(None).class(),
            ErrorClass::Validation
        );
        assert_eq!(
            SaleError::ConcurrentStockConflict { attempts: 3 }.class(),
            ErrorClass::BusinessRule
        );
        assert_eq!(
            SaleError::Store(StoreError::InvalidData("x".into())).class(),
            ErrorClass::System
        );
        assert_eq!(SaleError::Timeout(Duration::from_secs(1)).code(), "timeout");
    }

    #[test]
    fn actor_message() {
        assert_eq!(
            SaleError::InvalidActor(Some(UserId::new(7))).to_string(),
            "Invalid actor: user 7 does not exist"
        );
    }
}
