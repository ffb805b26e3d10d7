use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use common::{MovementId, Money, ProductId, RefreshTokenId, SaleId, SaleLineId, UserId};
use tokio::sync::{Mutex, OwnedMutexGuard};

use crate::{
    DeleteOutcome, EntityKind, MovementQuery, Result, Store, StoreError, UnitOfWork,
    records::{
        MovementRecord, NewMovement, NewProduct, NewRefreshToken, NewSale, NewSaleLine, NewUser,
        ProductRecord, RefreshTokenRecord, SaleLineRecord, SaleRecord, UserRecord,
    },
};

#[derive(Debug, Clone, Default)]
struct Sequences {
    product: i64,
    user: i64,
    sale: i64,
    sale_line: i64,
    movement: i64,
    refresh_token: i64,
}

fn next(seq: &mut i64) -> i64 {
    *seq += 1;
    *seq
}

#[derive(Debug, Clone, Default)]
struct Tables {
    products: BTreeMap<ProductId, ProductRecord>,
    users: BTreeMap<UserId, UserRecord>,
    sales: BTreeMap<SaleId, SaleRecord>,
    sale_lines: BTreeMap<SaleLineId, SaleLineRecord>,
    movements: BTreeMap<MovementId, MovementRecord>,
    refresh_tokens: BTreeMap<RefreshTokenId, RefreshTokenRecord>,
    sequences: Sequences,
}

impl Tables {
    fn insert_product(&mut self, product: NewProduct) -> ProductRecord {
        let record = ProductRecord {
            id: ProductId::new(next(&mut self.sequences.product)),
            name: product.name,
            price: product.price,
            category: product.category,
            stock: product.stock,
            baseline_stock: product.stock.unwrap_or(0),
            is_deleted: false,
            deleted_at: None,
        };
        self.products.insert(record.id, record.clone());
        record
    }

    fn insert_user(&mut self, user: NewUser) -> Result<UserRecord> {
        if self.users.values().any(|u| u.email == user.email) {
            return Err(StoreError::ConstraintViolation(format!(
                "users_email_key: email {} already exists",
                user.email
            )));
        }
        let record = UserRecord {
            id: UserId::new(next(&mut self.sequences.user)),
            email: user.email,
            password_hash: user.password_hash,
            role: user.role,
            is_deleted: false,
            deleted_at: None,
        };
        self.users.insert(record.id, record.clone());
        Ok(record)
    }

    fn query_movements(&self, query: &MovementQuery) -> Vec<MovementRecord> {
        // BTreeMap iteration is already id order.
        self.movements
            .values()
            .filter(|m| query.matches(m))
            .skip(query.offset.unwrap_or(0))
            .take(query.limit.unwrap_or(usize::MAX))
            .cloned()
            .collect()
    }

    fn require_product(&self, id: ProductId) -> Result<()> {
        if self.products.contains_key(&id) {
            Ok(())
        } else {
            Err(StoreError::ConstraintViolation(format!(
                "foreign key: product {id} does not exist"
            )))
        }
    }

    fn require_user(&self, id: UserId) -> Result<()> {
        if self.users.contains_key(&id) {
            Ok(())
        } else {
            Err(StoreError::ConstraintViolation(format!(
                "foreign key: user {id} does not exist"
            )))
        }
    }
}

/// Test hooks that make the next operations fail.
#[derive(Debug, Default)]
struct Faults {
    commit_conflicts: AtomicU32,
    fail_on_movement_insert: AtomicBool,
    lock_latency_ms: AtomicU64,
    commit_latency_ms: AtomicU64,
}

/// In-memory store for tests and local runs.
///
/// Every table sits behind a single async mutex. A unit of work holds the lock
/// for its whole lifetime and stages changes in a working copy that replaces
/// the tables on commit, so units of work are fully serialized.
#[derive(Clone, Default)]
pub struct InMemoryStore {
    tables: Arc<Mutex<Tables>>,
    faults: Arc<Faults>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes the next `count` commits fail with a concurrency conflict.
    pub fn inject_commit_conflicts(&self, count: u32) {
        self.faults.commit_conflicts.store(count, Ordering::SeqCst);
    }

    /// Makes every movement insert fail with a storage error while enabled.
    pub fn set_fail_on_movement_insert(&self, fail: bool) {
        self.faults
            .fail_on_movement_insert
            .store(fail, Ordering::SeqCst);
    }

    /// Delays every product lock taken inside a unit of work.
    pub fn set_lock_latency(&self, latency: Duration) {
        self.faults
            .lock_latency_ms
            .store(latency.as_millis() as u64, Ordering::SeqCst);
    }

    /// Delays every commit before its changes are applied.
    pub fn set_commit_latency(&self, latency: Duration) {
        self.faults
            .commit_latency_ms
            .store(latency.as_millis() as u64, Ordering::SeqCst);
    }

    pub async fn sale_count(&self) -> usize {
        self.tables.lock().await.sales.len()
    }

    pub async fn sale_line_count(&self) -> usize {
        self.tables.lock().await.sale_lines.len()
    }

    pub async fn movement_count(&self) -> usize {
        self.tables.lock().await.movements.len()
    }

    /// Refresh tokens of a user, revoked ones included.
    pub async fn refresh_tokens_for(&self, user_id: UserId) -> Vec<RefreshTokenRecord> {
        self.tables
            .lock()
            .await
            .refresh_tokens
            .values()
            .filter(|t| t.user_id == user_id)
            .cloned()
            .collect()
    }
}

#[async_trait]
impl Store for InMemoryStore {
    async fn begin(&self) -> Result<Box<dyn UnitOfWork>> {
        let guard = self.tables.clone().lock_owned().await;
        let working = (*guard).clone();
        Ok(Box::new(MemoryUnitOfWork {
            guard,
            working,
            faults: self.faults.clone(),
        }))
    }

    async fn find_user(&self, id: UserId) -> Result<Option<UserRecord>> {
        Ok(self.tables.lock().await.users.get(&id).cloned())
    }

    async fn find_user_by_email(&self, email: &str) -> Result<Option<UserRecord>> {
        let tables = self.tables.lock().await;
        Ok(tables.users.values().find(|u| u.email == email).cloned())
    }

    async fn find_product(&self, id: ProductId) -> Result<Option<ProductRecord>> {
        Ok(self.tables.lock().await.products.get(&id).cloned())
    }

    async fn find_sale(&self, id: SaleId) -> Result<Option<SaleRecord>> {
        Ok(self.tables.lock().await.sales.get(&id).cloned())
    }

    async fn sale_lines(&self, sale_id: SaleId) -> Result<Vec<SaleLineRecord>> {
        let tables = self.tables.lock().await;
        Ok(tables
            .sale_lines
            .values()
            .filter(|l| l.sale_id == sale_id)
            .cloned()
            .collect())
    }

    async fn find_movement(&self, id: MovementId) -> Result<Option<MovementRecord>> {
        Ok(self.tables.lock().await.movements.get(&id).cloned())
    }

    async fn query_movements(&self, query: MovementQuery) -> Result<Vec<MovementRecord>> {
        Ok(self.tables.lock().await.query_movements(&query))
    }

    async fn create_product(&self, product: NewProduct) -> Result<ProductRecord> {
        Ok(self.tables.lock().await.insert_product(product))
    }

    async fn create_user(&self, user: NewUser) -> Result<UserRecord> {
        self.tables.lock().await.insert_user(user)
    }
}

/// Unit of work over an [`InMemoryStore`].
///
/// Dropping it releases the lock and discards the working copy.
pub struct MemoryUnitOfWork {
    guard: OwnedMutexGuard<Tables>,
    working: Tables,
    faults: Arc<Faults>,
}

#[async_trait]
impl UnitOfWork for MemoryUnitOfWork {
    async fn find_user(&mut self, id: UserId) -> Result<Option<UserRecord>> {
        Ok(self.working.users.get(&id).cloned())
    }

    async fn lock_product(&mut self, id: ProductId) -> Result<Option<ProductRecord>> {
        let latency = self.faults.lock_latency_ms.load(Ordering::SeqCst);
        if latency > 0 {
            tokio::time::sleep(Duration::from_millis(latency)).await;
        }
        // The whole store is already locked by this unit of work.
        Ok(self.working.products.get(&id).cloned())
    }

    async fn adjust_stock(&mut self, id: ProductId, delta: i64) -> Result<i64> {
        let product = self
            .working
            .products
            .get_mut(&id)
            .ok_or_else(|| StoreError::InvalidData(format!("product {id} does not exist")))?;
        let new_stock = product.stock.unwrap_or(0).checked_add(delta).ok_or_else(|| {
            StoreError::ConstraintViolation(format!(
                "numeric value out of range: stock of product {id} cannot change by {delta}"
            ))
        })?;
        if new_stock < 0 {
            return Err(StoreError::ConstraintViolation(format!(
                "products_stock_non_negative: stock of product {id} would become {new_stock}"
            )));
        }
        product.stock = Some(new_stock);
        Ok(new_stock)
    }

    async fn insert_sale(&mut self, sale: NewSale) -> Result<SaleRecord> {
        self.working.require_user(sale.user_id)?;
        let record = SaleRecord {
            id: SaleId::new(next(&mut self.working.sequences.sale)),
            timestamp: sale.timestamp,
            total: Money::zero(),
            user_id: sale.user_id,
        };
        self.working.sales.insert(record.id, record.clone());
        Ok(record)
    }

    async fn insert_sale_line(&mut self, line: NewSaleLine) -> Result<SaleLineRecord> {
        if !self.working.sales.contains_key(&line.sale_id) {
            return Err(StoreError::ConstraintViolation(format!(
                "foreign key: sale {} does not exist",
                line.sale_id
            )));
        }
        self.working.require_product(line.product_id)?;
        if line.quantity <= 0 {
            return Err(StoreError::ConstraintViolation(
                "sale_lines_quantity_positive".to_string(),
            ));
        }
        let record = SaleLineRecord {
            id: SaleLineId::new(next(&mut self.working.sequences.sale_line)),
            sale_id: line.sale_id,
            product_id: line.product_id,
            quantity: line.quantity,
            unit_price: line.unit_price,
            line_total: line.line_total,
        };
        self.working.sale_lines.insert(record.id, record.clone());
        Ok(record)
    }

    async fn update_sale_total(&mut self, id: SaleId, total: Money) -> Result<()> {
        let sale = self
            .working
            .sales
            .get_mut(&id)
            .ok_or_else(|| StoreError::InvalidData(format!("sale {id} does not exist")))?;
        sale.total = total;
        Ok(())
    }

    async fn insert_movement(&mut self, movement: NewMovement) -> Result<MovementRecord> {
        if self.faults.fail_on_movement_insert.load(Ordering::SeqCst) {
            return Err(StoreError::Database(sqlx::Error::Protocol(
                "injected movement insert failure".to_string(),
            )));
        }
        self.working.require_product(movement.product_id)?;
        self.working.require_user(movement.user_id)?;
        if movement.quantity <= 0 {
            return Err(StoreError::ConstraintViolation(
                "movements_quantity_positive".to_string(),
            ));
        }
        let record = MovementRecord {
            id: MovementId::new(next(&mut self.working.sequences.movement)),
            timestamp: movement.timestamp,
            kind: movement.kind,
            quantity: movement.quantity,
            reference: movement.reference,
            product_id: movement.product_id,
            user_id: movement.user_id,
        };
        self.working.movements.insert(record.id, record.clone());
        Ok(record)
    }

    async fn lock_refresh_token(&mut self, token: &str) -> Result<Option<RefreshTokenRecord>> {
        Ok(self
            .working
            .refresh_tokens
            .values()
            .find(|t| t.token == token)
            .cloned())
    }

    async fn revoke_refresh_token(&mut self, id: RefreshTokenId) -> Result<()> {
        if let Some(token) = self.working.refresh_tokens.get_mut(&id) {
            token.is_revoked = true;
        }
        Ok(())
    }

    async fn insert_refresh_token(
        &mut self,
        token: NewRefreshToken,
    ) -> Result<RefreshTokenRecord> {
        self.working.require_user(token.user_id)?;
        if self
            .working
            .refresh_tokens
            .values()
            .any(|t| t.token == token.token)
        {
            return Err(StoreError::ConstraintViolation(
                "refresh_tokens_token_key".to_string(),
            ));
        }
        let record = RefreshTokenRecord {
            id: RefreshTokenId::new(next(&mut self.working.sequences.refresh_token)),
            token: token.token,
            expires_at: token.expires_at,
            created_at: token.created_at,
            is_revoked: false,
            user_id: token.user_id,
        };
        self.working.refresh_tokens.insert(record.id, record.clone());
        Ok(record)
    }

    async fn purge_expired_refresh_tokens(
        &mut self,
        user_id: UserId,
        now: DateTime<Utc>,
    ) -> Result<u64> {
        let before = self.working.refresh_tokens.len();
        self.working
            .refresh_tokens
            .retain(|_, t| t.user_id != user_id || t.expires_at > now);
        Ok((before - self.working.refresh_tokens.len()) as u64)
    }

    async fn mark_deleted(
        &mut self,
        kind: EntityKind,
        id: i64,
        at: DateTime<Utc>,
    ) -> Result<bool> {
        let flags = match kind {
            EntityKind::Product => self
                .working
                .products
                .get_mut(&ProductId::new(id))
                .map(|p| (&mut p.is_deleted, &mut p.deleted_at)),
            EntityKind::User => self
                .working
                .users
                .get_mut(&UserId::new(id))
                .map(|u| (&mut u.is_deleted, &mut u.deleted_at)),
            other => return Err(StoreError::UnsupportedDelete(other)),
        };
        match flags {
            Some((is_deleted, deleted_at)) if !*is_deleted => {
                *is_deleted = true;
                *deleted_at = Some(at);
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn remove(&mut self, kind: EntityKind, id: i64) -> Result<DeleteOutcome> {
        let tables = &mut self.working;
        let removed = match kind {
            EntityKind::Product => {
                let id = ProductId::new(id);
                if tables.sale_lines.values().any(|l| l.product_id == id)
                    || tables.movements.values().any(|m| m.product_id == id)
                {
                    return Err(StoreError::ConstraintViolation(format!(
                        "foreign key: product {id} is still referenced"
                    )));
                }
                tables.products.remove(&id).is_some()
            }
            EntityKind::User => {
                let id = UserId::new(id);
                if tables.sales.values().any(|s| s.user_id == id)
                    || tables.movements.values().any(|m| m.user_id == id)
                    || tables.refresh_tokens.values().any(|t| t.user_id == id)
                {
                    return Err(StoreError::ConstraintViolation(format!(
                        "foreign key: user {id} is still referenced"
                    )));
                }
                tables.users.remove(&id).is_some()
            }
            EntityKind::Sale => {
                let id = SaleId::new(id);
                tables.sale_lines.retain(|_, l| l.sale_id != id);
                tables.sales.remove(&id).is_some()
            }
            EntityKind::SaleLine => tables.sale_lines.remove(&SaleLineId::new(id)).is_some(),
            EntityKind::Movement => return Err(StoreError::AppendOnly(kind)),
            EntityKind::RefreshToken => return Err(StoreError::UnsupportedDelete(kind)),
        };
        Ok(if removed {
            DeleteOutcome::Removed
        } else {
            DeleteOutcome::NotFound
        })
    }

    async fn commit(self: Box<Self>) -> Result<()> {
        let MemoryUnitOfWork {
            mut guard,
            working,
            faults,
        } = *self;
        let latency = faults.commit_latency_ms.load(Ordering::SeqCst);
        if latency > 0 {
            tokio::time::sleep(Duration::from_millis(latency)).await;
        }
        let pending = faults.commit_conflicts.load(Ordering::SeqCst);
        if pending > 0 {
            faults.commit_conflicts.store(pending - 1, Ordering::SeqCst);
            return Err(StoreError::ConcurrencyConflict(
                "injected commit conflict".to_string(),
            ));
        }
        *guard = working;
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> Result<()> {
        Ok(())
    }
}
