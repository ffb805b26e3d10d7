//! Inventory: quantity on hand and the movement log that explains it.

pub mod error;
pub mod ledger;
pub mod movement;
pub mod service;

pub use error::{InventoryError, Result};
pub use ledger::StockLedger;
pub use movement::{MAX_REFERENCE_LEN, MovementLog};
pub use service::{
    InventoryService, ManualMovementRequest, MovementConfirmation, StockReconciliation,
};
