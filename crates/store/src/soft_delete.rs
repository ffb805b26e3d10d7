//! Logical deletion applied as a decorator over any [`Store`].
//!
//! Soft-deletable kinds are never physically removed through the interceptor:
//! a delete becomes an update of the flag and timestamp, and every read path
//! treats flagged rows as absent.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use common::{MovementId, Money, ProductId, RefreshTokenId, SaleId, UserId};
use tracing::debug;

use crate::{
    DeleteOutcome, MovementQuery, Result, Store, StoreError, UnitOfWork,
    records::{
        MovementRecord, NewMovement, NewProduct, NewRefreshToken, NewSale, NewSaleLine, NewUser,
        ProductRecord, RefreshTokenRecord, SaleLineRecord, SaleRecord, UserRecord,
    },
};

/// Every persisted entity kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EntityKind {
    Product,
    User,
    Sale,
    SaleLine,
    Movement,
    RefreshToken,
}

impl EntityKind {
    pub fn is_soft_deletable(&self) -> bool {
        matches!(self, EntityKind::Product | EntityKind::User)
    }

    pub fn is_append_only(&self) -> bool {
        matches!(self, EntityKind::Movement)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            EntityKind::Product => "product",
            EntityKind::User => "user",
            EntityKind::Sale => "sale",
            EntityKind::SaleLine => "sale line",
            EntityKind::Movement => "movement",
            EntityKind::RefreshToken => "refresh token",
        }
    }
}

impl std::fmt::Display for EntityKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Capability of records that carry a logical-delete flag.
pub trait SoftDeletable {
    const KIND: EntityKind;

    fn is_deleted(&self) -> bool;

    fn deleted_at(&self) -> Option<DateTime<Utc>>;

    fn is_active(&self) -> bool {
        !self.is_deleted()
    }
}

impl SoftDeletable for ProductRecord {
    const KIND: EntityKind = EntityKind::Product;

    fn is_deleted(&self) -> bool {
        self.is_deleted
    }

    fn deleted_at(&self) -> Option<DateTime<Utc>> {
        self.deleted_at
    }
}

impl SoftDeletable for UserRecord {
    const KIND: EntityKind = EntityKind::User;

    fn is_deleted(&self) -> bool {
        self.is_deleted
    }

    fn deleted_at(&self) -> Option<DateTime<Utc>> {
        self.deleted_at
    }
}

fn visible<T: SoftDeletable>(row: Option<T>) -> Option<T> {
    row.filter(T::is_active)
}

/// A [`Store`] that hides logically deleted rows and rewrites deletes.
#[derive(Debug, Clone)]
pub struct SoftDeleteInterceptor<S> {
    inner: S,
}

impl<S: Store> SoftDeleteInterceptor<S> {
    pub fn new(inner: S) -> Self {
        Self { inner }
    }

    /// The undecorated store, which still sees deleted rows.
    pub fn inner(&self) -> &S {
        &self.inner
    }
}

#[async_trait]
impl<S: Store> Store for SoftDeleteInterceptor<S> {
    async fn begin(&self) -> Result<Box<dyn UnitOfWork>> {
        let inner = self.inner.begin().await?;
        Ok(Box::new(InterceptedUnitOfWork { inner }))
    }

    async fn find_user(&self, id: UserId) -> Result<Option<UserRecord>> {
        Ok(visible(self.inner.find_user(id).await?))
    }

    async fn find_user_by_email(&self, email: &str) -> Result<Option<UserRecord>> {
        Ok(visible(self.inner.find_user_by_email(email).await?))
    }

    async fn find_product(&self, id: ProductId) -> Result<Option<ProductRecord>> {
        Ok(visible(self.inner.find_product(id).await?))
    }

    async fn find_sale(&self, id: SaleId) -> Result<Option<SaleRecord>> {
        self.inner.find_sale(id).await
    }

    async fn sale_lines(&self, sale_id: SaleId) -> Result<Vec<SaleLineRecord>> {
        self.inner.sale_lines(sale_id).await
    }

    async fn find_movement(&self, id: MovementId) -> Result<Option<MovementRecord>> {
        self.inner.find_movement(id).await
    }

    async fn query_movements(&self, query: MovementQuery) -> Result<Vec<MovementRecord>> {
        self.inner.query_movements(query).await
    }

    async fn create_product(&self, product: NewProduct) -> Result<ProductRecord> {
        self.inner.create_product(product).await
    }

    async fn create_user(&self, user: NewUser) -> Result<UserRecord> {
        self.inner.create_user(user).await
    }
}

/// Unit of work opened through a [`SoftDeleteInterceptor`].
pub struct InterceptedUnitOfWork {
    inner: Box<dyn UnitOfWork>,
}

#[async_trait]
impl UnitOfWork for InterceptedUnitOfWork {
    async fn find_user(&mut self, id: UserId) -> Result<Option<UserRecord>> {
        Ok(visible(self.inner.find_user(id).await?))
    }

    async fn lock_product(&mut self, id: ProductId) -> Result<Option<ProductRecord>> {
        Ok(visible(self.inner.lock_product(id).await?))
    }

    async fn adjust_stock(&mut self, id: ProductId, delta: i64) -> Result<i64> {
        self.inner.adjust_stock(id, delta).await
    }

    async fn insert_sale(&mut self, sale: NewSale) -> Result<SaleRecord> {
        self.inner.insert_sale(sale).await
    }

    async fn insert_sale_line(&mut self, line: NewSaleLine) -> Result<SaleLineRecord> {
        self.inner.insert_sale_line(line).await
    }

    async fn update_sale_total(&mut self, id: SaleId, total: Money) -> Result<()> {
        self.inner.update_sale_total(id, total).await
    }

    async fn insert_movement(&mut self, movement: NewMovement) -> Result<MovementRecord> {
        self.inner.insert_movement(movement).await
    }

    async fn lock_refresh_token(&mut self, token: &str) -> Result<Option<RefreshTokenRecord>> {
        self.inner.lock_refresh_token(token).await
    }

    async fn revoke_refresh_token(&mut self, id: RefreshTokenId) -> Result<()> {
        self.inner.revoke_refresh_token(id).await
    }

    async fn insert_refresh_token(
        &mut self,
        token: NewRefreshToken,
    ) -> Result<RefreshTokenRecord> {
        self.inner.insert_refresh_token(token).await
    }

    async fn purge_expired_refresh_tokens(
        &mut self,
        user_id: UserId,
        now: DateTime<Utc>,
    ) -> Result<u64> {
        self.inner.purge_expired_refresh_tokens(user_id, now).await
    }

    async fn mark_deleted(
        &mut self,
        kind: EntityKind,
        id: i64,
        at: DateTime<Utc>,
    ) -> Result<bool> {
        self.inner.mark_deleted(kind, id, at).await
    }

    async fn remove(&mut self, kind: EntityKind, id: i64) -> Result<DeleteOutcome> {
        if kind.is_append_only() {
            return Err(StoreError::AppendOnly(kind));
        }
        if kind.is_soft_deletable() {
            let at = Utc::now();
            debug!(%kind, id, "rewriting delete as soft delete");
            return Ok(if self.inner.mark_deleted(kind, id, at).await? {
                DeleteOutcome::SoftDeleted
            } else {
                DeleteOutcome::NotFound
            });
        }
        self.inner.remove(kind, id).await
    }

    async fn commit(self: Box<Self>) -> Result<()> {
        self.inner.commit().await
    }

    async fn rollback(self: Box<Self>) -> Result<()> {
        self.inner.rollback().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn capability_table() {
        let soft: Vec<_> = [
            EntityKind::Product,
            EntityKind::User,
            EntityKind::Sale,
            EntityKind::SaleLine,
            EntityKind::Movement,
            EntityKind::RefreshToken,
        ]
        .into_iter()
        .filter(EntityKind::is_soft_deletable)
        .collect();
        assert_eq!(soft, vec![EntityKind::Product, EntityKind::User]);

        assert!(EntityKind::Movement.is_append_only());
        assert!(!EntityKind::Sale.is_append_only());
        assert!(!EntityKind::Movement.is_soft_deletable());
    }

    #[test]
    fn records_report_their_kind() {
        assert_eq!(<ProductRecord as SoftDeletable>::KIND, EntityKind::Product);
        assert_eq!(<UserRecord as SoftDeletable>::KIND, EntityKind::User);
    }

    #[test]
    fn flagged_rows_are_invisible() {
        let user = UserRecord {
            id: UserId::new(1),
            email: "a@b.c".to_string(),
            password_hash: String::new(),
            role: "Admin".to_string(),
            is_deleted: true,
            deleted_at: Some(Utc::now()),
        };
        assert!(!user.is_active());
        assert!(visible(Some(user.clone())).is_none());

        let restored = UserRecord {
            is_deleted: false,
            deleted_at: None,
            ..user
        };
        assert!(visible(Some(restored)).is_some());
    }
}
