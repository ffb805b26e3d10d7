//! Shared types for the sales backend.

mod error;
mod ids;
mod money;

pub use error::ErrorClass;
pub use ids::{MovementId, ProductId, RefreshTokenId, SaleId, SaleLineId, UserId};
pub use money::Money;
