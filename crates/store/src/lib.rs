pub mod error;
pub mod memory;
pub mod postgres;
pub mod query;
pub mod records;
pub mod soft_delete;
pub mod store;

pub use error::{Result, StoreError};
pub use memory::InMemoryStore;
pub use postgres::PostgresStore;
pub use query::MovementQuery;
pub use records::{
    MovementKind, MovementRecord, NewMovement, NewProduct, NewRefreshToken, NewSale, NewSaleLine,
    NewUser, ProductRecord, RefreshTokenRecord, SaleLineRecord, SaleRecord, UserRecord,
};
pub use soft_delete::{EntityKind, SoftDeletable, SoftDeleteInterceptor};
pub use store::{DeleteOutcome, Store, StoreExt, UnitOfWork};
