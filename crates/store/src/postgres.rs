use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use common::{MovementId, Money, ProductId, RefreshTokenId, SaleId, SaleLineId, UserId};
use sqlx::{PgPool, Postgres, Row, Transaction, postgres::PgRow};

use crate::{
    DeleteOutcome, EntityKind, MovementQuery, Result, Store, StoreError, UnitOfWork,
    records::{
        MovementRecord, NewMovement, NewProduct, NewRefreshToken, NewSale, NewSaleLine, NewUser,
        ProductRecord, RefreshTokenRecord, SaleLineRecord, SaleRecord, UserRecord,
    },
};

/// PostgreSQL-backed store.
///
/// Each unit of work is a READ COMMITTED transaction; product rows are locked
/// with `SELECT ... FOR UPDATE` so concurrent sales of the same product queue
/// behind each other instead of both reading the same stock.
#[derive(Clone)]
pub struct PostgresStore {
    pool: PgPool,
    lock_timeout: Option<Duration>,
}

impl PostgresStore {
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool,
            lock_timeout: None,
        }
    }

    /// Bounds how long a unit of work waits for a row lock. Waiting longer
    /// fails with a retryable concurrency conflict.
    pub fn with_lock_timeout(mut self, timeout: Duration) -> Self {
        self.lock_timeout = Some(timeout);
        self
    }

    /// Gets a reference to the underlying connection pool.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Runs the database migrations.
    pub async fn run_migrations(&self) -> Result<()> {
        sqlx::migrate!("../../migrations").run(&self.pool).await?;
        Ok(())
    }
}

fn row_to_product(row: PgRow) -> Result<ProductRecord> {
    Ok(ProductRecord {
        id: ProductId::new(row.try_get("id")?),
        name: row.try_get("name")?,
        price: Money::from_cents(row.try_get("price_cents")?),
        category: row.try_get("category")?,
        stock: row.try_get("stock")?,
        baseline_stock: row.try_get("baseline_stock")?,
        is_deleted: row.try_get("is_deleted")?,
        deleted_at: row.try_get("deleted_at")?,
    })
}

fn row_to_user(row: PgRow) -> Result<UserRecord> {
    Ok(UserRecord {
        id: UserId::new(row.try_get("id")?),
        email: row.try_get("email")?,
        password_hash: row.try_get("password_hash")?,
        role: row.try_get("role")?,
        is_deleted: row.try_get("is_deleted")?,
        deleted_at: row.try_get("deleted_at")?,
    })
}

fn row_to_sale(row: PgRow) -> Result<SaleRecord> {
    Ok(SaleRecord {
        id: SaleId::new(row.try_get("id")?),
        timestamp: row.try_get("timestamp")?,
        total: Money::from_cents(row.try_get("total_cents")?),
        user_id: UserId::new(row.try_get("user_id")?),
    })
}

fn row_to_sale_line(row: PgRow) -> Result<SaleLineRecord> {
    Ok(SaleLineRecord {
        id: SaleLineId::new(row.try_get("id")?),
        sale_id: SaleId::new(row.try_get("sale_id")?),
        product_id: ProductId::new(row.try_get("product_id")?),
        quantity: row.try_get("quantity")?,
        unit_price: Money::from_cents(row.try_get("unit_price_cents")?),
        line_total: Money::from_cents(row.try_get("line_total_cents")?),
    })
}

fn row_to_movement(row: PgRow) -> Result<MovementRecord> {
    let kind: String = row.try_get("kind")?;
    Ok(MovementRecord {
        id: MovementId::new(row.try_get("id")?),
        timestamp: row.try_get("timestamp")?,
        kind: kind.parse()?,
        quantity: row.try_get("quantity")?,
        reference: row.try_get("reference")?,
        product_id: ProductId::new(row.try_get("product_id")?),
        user_id: UserId::new(row.try_get("user_id")?),
    })
}

fn row_to_refresh_token(row: PgRow) -> Result<RefreshTokenRecord> {
    Ok(RefreshTokenRecord {
        id: RefreshTokenId::new(row.try_get("id")?),
        token: row.try_get("token")?,
        expires_at: row.try_get("expires_at")?,
        created_at: row.try_get("created_at")?,
        is_revoked: row.try_get("is_revoked")?,
        user_id: UserId::new(row.try_get("user_id")?),
    })
}

#[async_trait]
impl Store for PostgresStore {
    async fn begin(&self) -> Result<Box<dyn UnitOfWork>> {
        let mut tx = self.pool.begin().await?;

        sqlx::query("SET TRANSACTION ISOLATION LEVEL READ COMMITTED")
            .execute(&mut *tx)
            .await?;

        if let Some(timeout) = self.lock_timeout {
            // SET does not take bind parameters.
            sqlx::query(&format!("SET LOCAL lock_timeout = {}", timeout.as_millis()))
                .execute(&mut *tx)
                .await?;
        }

        Ok(Box::new(PgUnitOfWork { tx }))
    }

    async fn find_user(&self, id: UserId) -> Result<Option<UserRecord>> {
        sqlx::query(
            r#"
            SELECT id, email, password_hash, role, is_deleted, deleted_at
            FROM users
            WHERE id = $1
            "#,
        )
        .bind(id.as_i64())
        .fetch_optional(&self.pool)
        .await?
        .map(row_to_user)
        .transpose()
    }

    async fn find_user_by_email(&self, email: &str) -> Result<Option<UserRecord>> {
        sqlx::query(
            r#"
            SELECT id, email, password_hash, role, is_deleted, deleted_at
            FROM users
            WHERE email = $1
            "#,
        )
        .bind(email)
        .fetch_optional(&self.pool)
        .await?
        .map(row_to_user)
        .transpose()
    }

    async fn find_product(&self, id: ProductId) -> Result<Option<ProductRecord>> {
        sqlx::query(
            r#"
            SELECT id, name, price_cents, category, stock, baseline_stock, is_deleted, deleted_at
            FROM products
            WHERE id = $1
            "#,
        )
        .bind(id.as_i64())
        .fetch_optional(&self.pool)
        .await?
        .map(row_to_product)
        .transpose()
    }

    async fn find_sale(&self, id: SaleId) -> Result<Option<SaleRecord>> {
        sqlx::query("SELECT id, timestamp, total_cents, user_id FROM sales WHERE id = $1")
            .bind(id.as_i64())
            .fetch_optional(&self.pool)
            .await?
            .map(row_to_sale)
            .transpose()
    }

    async fn sale_lines(&self, sale_id: SaleId) -> Result<Vec<SaleLineRecord>> {
        let rows = sqlx::query(
            r#"
            SELECT id, sale_id, product_id, quantity, unit_price_cents, line_total_cents
            FROM sale_lines
            WHERE sale_id = $1
            ORDER BY id ASC
            "#,
        )
        .bind(sale_id.as_i64())
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(row_to_sale_line).collect()
    }

    async fn find_movement(&self, id: MovementId) -> Result<Option<MovementRecord>> {
        sqlx::query(
            r#"
            SELECT id, timestamp, kind, quantity, reference, product_id, user_id
            FROM movements
            WHERE id = $1
            "#,
        )
        .bind(id.as_i64())
        .fetch_optional(&self.pool)
        .await?
        .map(row_to_movement)
        .transpose()
    }

    async fn query_movements(&self, query: MovementQuery) -> Result<Vec<MovementRecord>> {
        let mut sql = String::from(
            "SELECT id, timestamp, kind, quantity, reference, product_id, user_id FROM movements WHERE 1=1",
        );
        let mut param_count = 0;

        if query.product_id.is_some() {
            param_count += 1;
            sql.push_str(&format!(" AND product_id = ${param_count}"));
        }
        if query.user_id.is_some() {
            param_count += 1;
            sql.push_str(&format!(" AND user_id = ${param_count}"));
        }
        if query.kind.is_some() {
            param_count += 1;
            sql.push_str(&format!(" AND kind = ${param_count}"));
        }
        if query.reference.is_some() {
            param_count += 1;
            sql.push_str(&format!(" AND reference = ${param_count}"));
        }
        if query.from_timestamp.is_some() {
            param_count += 1;
            sql.push_str(&format!(" AND timestamp >= ${param_count}"));
        }
        if query.to_timestamp.is_some() {
            param_count += 1;
            sql.push_str(&format!(" AND timestamp <= ${param_count}"));
        }

        sql.push_str(" ORDER BY id ASC");

        if query.limit.is_some() {
            param_count += 1;
            sql.push_str(&format!(" LIMIT ${param_count}"));
        }
        if query.offset.is_some() {
            param_count += 1;
            sql.push_str(&format!(" OFFSET ${param_count}"));
        }

        let mut sqlx_query = sqlx::query(&sql);

        if let Some(product_id) = query.product_id {
            sqlx_query = sqlx_query.bind(product_id.as_i64());
        }
        if let Some(user_id) = query.user_id {
            sqlx_query = sqlx_query.bind(user_id.as_i64());
        }
        if let Some(kind) = query.kind {
            sqlx_query = sqlx_query.bind(kind.as_str());
        }
        if let Some(reference) = query.reference {
            sqlx_query = sqlx_query.bind(reference);
        }
        if let Some(from_ts) = query.from_timestamp {
            sqlx_query = sqlx_query.bind(from_ts);
        }
        if let Some(to_ts) = query.to_timestamp {
            sqlx_query = sqlx_query.bind(to_ts);
        }
        if let Some(limit) = query.limit {
            sqlx_query = sqlx_query.bind(limit as i64);
        }
        if let Some(offset) = query.offset {
            sqlx_query = sqlx_query.bind(offset as i64);
        }

        let rows = sqlx_query.fetch_all(&self.pool).await?;
        rows.into_iter().map(row_to_movement).collect()
    }

    async fn create_product(&self, product: NewProduct) -> Result<ProductRecord> {
        let row = sqlx::query(
            r#"
            INSERT INTO products (name, price_cents, category, stock, baseline_stock)
            VALUES ($1, $2, $3, $4, COALESCE($4, 0))
            RETURNING id, name, price_cents, category, stock, baseline_stock, is_deleted, deleted_at
            "#,
        )
        .bind(&product.name)
        .bind(product.price.cents())
        .bind(&product.category)
        .bind(product.stock)
        .fetch_one(&self.pool)
        .await?;

        row_to_product(row)
    }

    async fn create_user(&self, user: NewUser) -> Result<UserRecord> {
        let row = sqlx::query(
            r#"
            INSERT INTO users (email, password_hash, role)
            VALUES ($1, $2, $3)
            RETURNING id, email, password_hash, role, is_deleted, deleted_at
            "#,
        )
        .bind(&user.email)
        .bind(&user.password_hash)
        .bind(&user.role)
        .fetch_one(&self.pool)
        .await?;

        row_to_user(row)
    }
}

/// Unit of work backed by a PostgreSQL transaction.
///
/// Dropping it without committing rolls the transaction back.
pub struct PgUnitOfWork {
    tx: Transaction<'static, Postgres>,
}

#[async_trait]
impl UnitOfWork for PgUnitOfWork {
    async fn find_user(&mut self, id: UserId) -> Result<Option<UserRecord>> {
        sqlx::query(
            r#"
            SELECT id, email, password_hash, role, is_deleted, deleted_at
            FROM users
            WHERE id = $1
            "#,
        )
        .bind(id.as_i64())
        .fetch_optional(&mut *self.tx)
        .await?
        .map(row_to_user)
        .transpose()
    }

    async fn lock_product(&mut self, id: ProductId) -> Result<Option<ProductRecord>> {
        sqlx::query(
            r#"
            SELECT id, name, price_cents, category, stock, baseline_stock, is_deleted, deleted_at
            FROM products
            WHERE id = $1
            FOR UPDATE
            "#,
        )
        .bind(id.as_i64())
        .fetch_optional(&mut *self.tx)
        .await?
        .map(row_to_product)
        .transpose()
    }

    async fn adjust_stock(&mut self, id: ProductId, delta: i64) -> Result<i64> {
        let stock: Option<i64> = sqlx::query_scalar(
            "UPDATE products SET stock = COALESCE(stock, 0) + $2 WHERE id = $1 RETURNING stock",
        )
        .bind(id.as_i64())
        .bind(delta)
        .fetch_optional(&mut *self.tx)
        .await?
        .flatten();

        stock.ok_or_else(|| StoreError::InvalidData(format!("product {id} does not exist")))
    }

    async fn insert_sale(&mut self, sale: NewSale) -> Result<SaleRecord> {
        let row = sqlx::query(
            r#"
            INSERT INTO sales (timestamp, total_cents, user_id)
            VALUES ($1, 0, $2)
            RETURNING id, timestamp, total_cents, user_id
            "#,
        )
        .bind(sale.timestamp)
        .bind(sale.user_id.as_i64())
        .fetch_one(&mut *self.tx)
        .await?;

        row_to_sale(row)
    }

    async fn insert_sale_line(&mut self, line: NewSaleLine) -> Result<SaleLineRecord> {
        let row = sqlx::query(
            r#"
            INSERT INTO sale_lines (sale_id, product_id, quantity, unit_price_cents, line_total_cents)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING id, sale_id, product_id, quantity, unit_price_cents, line_total_cents
            "#,
        )
        .bind(line.sale_id.as_i64())
        .bind(line.product_id.as_i64())
        .bind(line.quantity)
        .bind(line.unit_price.cents())
        .bind(line.line_total.cents())
        .fetch_one(&mut *self.tx)
        .await?;

        row_to_sale_line(row)
    }

    async fn update_sale_total(&mut self, id: SaleId, total: Money) -> Result<()> {
        let result = sqlx::query("UPDATE sales SET total_cents = $2 WHERE id = $1")
            .bind(id.as_i64())
            .bind(total.cents())
            .execute(&mut *self.tx)
            .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::InvalidData(format!("sale {id} does not exist")));
        }
        Ok(())
    }

    async fn insert_movement(&mut self, movement: NewMovement) -> Result<MovementRecord> {
        let row = sqlx::query(
            r#"
            INSERT INTO movements (timestamp, kind, quantity, reference, product_id, user_id)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING id, timestamp, kind, quantity, reference, product_id, user_id
            "#,
        )
        .bind(movement.timestamp)
        .bind(movement.kind.as_str())
        .bind(movement.quantity)
        .bind(&movement.reference)
        .bind(movement.product_id.as_i64())
        .bind(movement.user_id.as_i64())
        .fetch_one(&mut *self.tx)
        .await?;

        row_to_movement(row)
    }

    async fn lock_refresh_token(&mut self, token: &str) -> Result<Option<RefreshTokenRecord>> {
        sqlx::query(
            r#"
            SELECT id, token, expires_at, created_at, is_revoked, user_id
            FROM refresh_tokens
            WHERE token = $1
            FOR UPDATE
            "#,
        )
        .bind(token)
        .fetch_optional(&mut *self.tx)
        .await?
        .map(row_to_refresh_token)
        .transpose()
    }

    async fn revoke_refresh_token(&mut self, id: RefreshTokenId) -> Result<()> {
        sqlx::query("UPDATE refresh_tokens SET is_revoked = TRUE WHERE id = $1")
            .bind(id.as_i64())
            .execute(&mut *self.tx)
            .await?;
        Ok(())
    }

    async fn insert_refresh_token(
        &mut self,
        token: NewRefreshToken,
    ) -> Result<RefreshTokenRecord> {
        let row = sqlx::query(
            r#"
            INSERT INTO refresh_tokens (token, expires_at, created_at, user_id)
            VALUES ($1, $2, $3, $4)
            RETURNING id, token, expires_at, created_at, is_revoked, user_id
            "#,
        )
        .bind(&token.token)
        .bind(token.expires_at)
        .bind(token.created_at)
        .bind(token.user_id.as_i64())
        .fetch_one(&mut *self.tx)
        .await?;

        row_to_refresh_token(row)
    }

    async fn purge_expired_refresh_tokens(
        &mut self,
        user_id: UserId,
        now: DateTime<Utc>,
    ) -> Result<u64> {
        let result =
            sqlx::query("DELETE FROM refresh_tokens WHERE user_id = $1 AND expires_at <= $2")
                .bind(user_id.as_i64())
                .bind(now)
                .execute(&mut *self.tx)
                .await?;
        Ok(result.rows_affected())
    }

    async fn mark_deleted(
        &mut self,
        kind: EntityKind,
        id: i64,
        at: DateTime<Utc>,
    ) -> Result<bool> {
        let sql = match kind {
            EntityKind::Product => {
                "UPDATE products SET is_deleted = TRUE, deleted_at = $2 WHERE id = $1 AND NOT is_deleted"
            }
            EntityKind::User => {
                "UPDATE users SET is_deleted = TRUE, deleted_at = $2 WHERE id = $1 AND NOT is_deleted"
            }
            other => return Err(StoreError::UnsupportedDelete(other)),
        };

        let result = sqlx::query(sql)
            .bind(id)
            .bind(at)
            .execute(&mut *self.tx)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn remove(&mut self, kind: EntityKind, id: i64) -> Result<DeleteOutcome> {
        let sql = match kind {
            EntityKind::Product => "DELETE FROM products WHERE id = $1",
            EntityKind::User => "DELETE FROM users WHERE id = $1",
            // sale_lines cascade with their sale
            EntityKind::Sale => "DELETE FROM sales WHERE id = $1",
            EntityKind::SaleLine => "DELETE FROM sale_lines WHERE id = $1",
            EntityKind::Movement => return Err(StoreError::AppendOnly(kind)),
            EntityKind::RefreshToken => return Err(StoreError::UnsupportedDelete(kind)),
        };

        let result = sqlx::query(sql).bind(id).execute(&mut *self.tx).await?;
        Ok(if result.rows_affected() > 0 {
            DeleteOutcome::Removed
        } else {
            DeleteOutcome::NotFound
        })
    }

    async fn commit(self: Box<Self>) -> Result<()> {
        let PgUnitOfWork { tx } = *self;
        tx.commit().await?;
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> Result<()> {
        let PgUnitOfWork { tx } = *self;
        tx.rollback().await?;
        Ok(())
    }
}
