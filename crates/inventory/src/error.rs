use common::{ErrorClass, MovementId, ProductId, UserId};
use store::{MovementKind, StoreError};
use thiserror::Error;

/// Errors raised by the stock ledger, the movement log and manual movements.
#[derive(Debug, Error)]
pub enum InventoryError {
    /// The product does not exist or was logically deleted.
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

    #[error("Invalid movement kind '{0}': expected Entrada, Salida or Ajuste")]
    InvalidKind(String),

    /// The kind exists but cannot be recorded through this entry point.
    #[error("Movement kind {0} cannot be recorded manually")]
    KindNotAllowed(MovementKind),

    #[error("Quantity must be greater than zero, got {0}")]
    InvalidQuantity(i64),

    /// Adding the quantity would take stock past the largest storable value.
    #[error("Adding {quantity} units to product {product_id} would overflow its stock of {stock}")]
    StockOverflow {
        product_id: ProductId,
        stock: i64,
        quantity: i64,
    },

    #[error("Invalid reference: {0}")]
    InvalidReference(String),

    /// The acting user does not exist or was logically deleted.
    #[error("Invalid actor: user {0} does not exist")]
    InvalidActor(UserId),

    #[error("Movement not found: {0}")]
    MovementNotFound(MovementId),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),
}

fn display_stock(stock: &Option<i64>) -> String {
    match stock {
        Some(stock) => stock.to_string(),
        None => "none (stock not tracked)".to_string(),
    }
}

impl InventoryError {
    pub fn class(&self) -> ErrorClass {
        match self {
            InventoryError::InvalidKind(_)
            | InventoryError::KindNotAllowed(_)
            | InventoryError::InvalidQuantity(_)
            | InventoryError::StockOverflow { .. }
            | InventoryError::InvalidReference(_)
            | InventoryError::InvalidActor(_) => ErrorClass::Validation,
            InventoryError::ProductNotFound(_)
            | InventoryError::InsufficientStock { .. }
            | InventoryError::MovementNotFound(_) => ErrorClass::BusinessRule,
            InventoryError::Store(_) => ErrorClass::System,
        }
    }

    /// Machine-readable error kind.
    pub fn code(&self) -> &'static str {
        match self {
            InventoryError::ProductNotFound(_) => "product_not_found",
            InventoryError::InsufficientStock { .. } => "insufficient_stock",
            InventoryError::InvalidKind(_) => "invalid_kind",
            InventoryError::KindNotAllowed(_) => "kind_not_allowed",
            InventoryError::InvalidQuantity(_) => "invalid_quantity",
            InventoryError::StockOverflow { .. } => "stock_overflow",
            InventoryError::InvalidReference(_) => "invalid_reference",
            InventoryError::InvalidActor(_) => "invalid_actor",
            InventoryError::MovementNotFound(_) => "movement_not_found",
            InventoryError::Store(_) => "internal",
        }
    }
}

pub type Result<T> = std::result::Result<T, InventoryError>;
