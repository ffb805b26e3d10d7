use async_trait::async_trait;
use chrono::{DateTime, Utc};
use common::{MovementId, Money, ProductId, RefreshTokenId, SaleId, UserId};

use crate::{
    EntityKind, MovementQuery, Result,
    records::{
        MovementRecord, NewMovement, NewProduct, NewRefreshToken, NewSale, NewSaleLine, NewUser,
        ProductRecord, RefreshTokenRecord, SaleLineRecord, SaleRecord, UserRecord,
    },
};

/// What a delete request ended up doing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeleteOutcome {
    /// The row was physically removed.
    Removed,
    /// The row was kept and flagged as logically deleted.
    SoftDeleted,
    /// No visible row matched.
    NotFound,
}

/// Handle to the relational store.
///
/// Reads on the handle run outside any unit of work. Every mutation of the
/// core goes through a [`UnitOfWork`] obtained from [`Store::begin`], except
/// the catalog seeding helpers.
#[async_trait]
pub trait Store: Send + Sync {
    /// Opens a unit of work. Nothing it stages is visible to others until
    /// [`UnitOfWork::commit`].
    async fn begin(&self) -> Result<Box<dyn UnitOfWork>>;

    async fn find_user(&self, id: UserId) -> Result<Option<UserRecord>>;

    async fn find_user_by_email(&self, email: &str) -> Result<Option<UserRecord>>;

    async fn find_product(&self, id: ProductId) -> Result<Option<ProductRecord>>;

    async fn find_sale(&self, id: SaleId) -> Result<Option<SaleRecord>>;

    /// Lines of a sale, in insertion order.
    async fn sale_lines(&self, sale_id: SaleId) -> Result<Vec<SaleLineRecord>>;

    async fn find_movement(&self, id: MovementId) -> Result<Option<MovementRecord>>;

    async fn query_movements(&self, query: MovementQuery) -> Result<Vec<MovementRecord>>;

    /// Inserts a catalog product. Its initial stock becomes the baseline.
    async fn create_product(&self, product: NewProduct) -> Result<ProductRecord>;

    async fn create_user(&self, user: NewUser) -> Result<UserRecord>;
}

/// A bounded set of staged operations committed or rolled back atomically.
///
/// Dropping a unit of work without calling [`UnitOfWork::commit`] rolls it back.
#[async_trait]
pub trait UnitOfWork: Send {
    async fn find_user(&mut self, id: UserId) -> Result<Option<UserRecord>>;

    /// Reads a product and holds a row lock on it until the unit of work ends.
    async fn lock_product(&mut self, id: ProductId) -> Result<Option<ProductRecord>>;

    /// Applies a signed delta to a product's stock and returns the new value.
    ///
    /// Untracked (null) stock counts as zero. The result must stay non-negative,
    /// otherwise the write fails with a constraint violation.
    async fn adjust_stock(&mut self, id: ProductId, delta: i64) -> Result<i64>;

    /// Inserts a sale header with a zero total.
    async fn insert_sale(&mut self, sale: NewSale) -> Result<SaleRecord>;

    async fn insert_sale_line(&mut self, line: NewSaleLine) -> Result<SaleLineRecord>;

    async fn update_sale_total(&mut self, id: SaleId, total: Money) -> Result<()>;

    async fn insert_movement(&mut self, movement: NewMovement) -> Result<MovementRecord>;

    /// Looks a refresh token up by value and locks its row.
    async fn lock_refresh_token(&mut self, token: &str) -> Result<Option<RefreshTokenRecord>>;

    async fn revoke_refresh_token(&mut self, id: RefreshTokenId) -> Result<()>;

    async fn insert_refresh_token(
        &mut self,
        token: NewRefreshToken,
    ) -> Result<RefreshTokenRecord>;

    /// Deletes the user's tokens that expired at or before `now`. Returns how many.
    async fn purge_expired_refresh_tokens(
        &mut self,
        user_id: UserId,
        now: DateTime<Utc>,
    ) -> Result<u64>;

    /// Flags a soft-deletable row as deleted. Returns false if no live row matched.
    async fn mark_deleted(
        &mut self,
        kind: EntityKind,
        id: i64,
        at: DateTime<Utc>,
    ) -> Result<bool>;

    /// Physically removes a row.
    async fn remove(&mut self, kind: EntityKind, id: i64) -> Result<DeleteOutcome>;

    async fn commit(self: Box<Self>) -> Result<()>;

    async fn rollback(self: Box<Self>) -> Result<()>;
}

/// Convenience operations available on every store.
#[async_trait]
pub trait StoreExt: Store {
    /// Deletes one row in its own unit of work.
    async fn delete(&self, kind: EntityKind, id: i64) -> Result<DeleteOutcome> {
        let mut uow = self.begin().await?;
        let outcome = uow.remove(kind, id).await?;
        uow.commit().await?;
        Ok(outcome)
    }

    /// Returns the full movement history of a product, oldest first.
    async fn product_movements(&self, product_id: ProductId) -> Result<Vec<MovementRecord>> {
        self.query_movements(MovementQuery::for_product(product_id)).await
    }
}

impl<T: Store + ?Sized> StoreExt for T {}
