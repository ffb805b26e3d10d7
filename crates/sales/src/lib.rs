//! Sale Transaction Coordinator.
//!
//! Turns a sale request into a committed sale header, its lines, one `Salida`
//! movement per line and the matching stock decrements, all in a single unit
//! of work.

pub mod coordinator;
pub mod error;
pub mod request;
pub mod state;

pub use coordinator::{SaleConfig, SaleCoordinator};
pub use error::{Result, SaleError};
pub use request::{ActorSummary, SaleLineRequest, SaleLineView, SaleReceipt, SaleRequest};
pub use state::SaleState;
