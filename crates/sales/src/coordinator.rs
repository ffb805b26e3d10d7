//! Sale coordinator for turning sale requests into committed sales.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use common::{ErrorClass, Money, ProductId, SaleId, UserId};
use inventory::{MovementLog, StockLedger};
use store::{
    MovementKind, NewSale, NewSaleLine, ProductRecord, SoftDeletable, Store, UnitOfWork,
    UserRecord,
};
use tracing::{debug, error, info, warn};

use crate::error::{Result, SaleError};
use crate::request::{ActorSummary, SaleLineRequest, SaleLineView, SaleReceipt, SaleRequest};
use crate::state::SaleState;

/// Prefix of the correlation reference written on every exit movement.
pub const SALE_REFERENCE_PREFIX: &str = "VTA-";

const LINE_TOTAL_OVERFLOW: &str = "line total overflows";

/// Tuning for [`SaleCoordinator`].
#[derive(Debug, Clone)]
pub struct SaleConfig {
    /// Attempts made when concurrent sales conflict, including the first.
    pub max_attempts: u32,
    /// Base delay between attempts. Attempt `n` waits `n * backoff`.
    pub backoff: Duration,
    /// Upper bound for a single attempt. Elapsing rolls the attempt back.
    pub timeout: Duration,
}

impl Default for SaleConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            backoff: Duration::from_millis(50),
            timeout: Duration::from_secs(5),
        }
    }
}

/// Where a sale currently is. Only used for diagnostics.
#[derive(Debug, Default)]
struct Progress {
    state: SaleState,
    line: Option<usize>,
}

impl Progress {
    fn advance(&mut self, next: SaleState) {
        debug_assert!(
            self.state.can_transition_to(next),
            "illegal sale transition {} -> {}",
            self.state,
            next
        );
        self.state = next;
    }

    /// Rewinds to the point right after actor validation for a new attempt.
    fn restart(&mut self) {
        self.state = SaleState::ValidatingActor;
        self.line = None;
    }
}

/// A line that passed shape validation.
#[derive(Debug, Clone, Copy)]
struct CheckedLine {
    product_id: ProductId,
    quantity: i64,
    unit_price: Option<Money>,
}

/// Coordinates the atomic sale workflow.
///
/// Each sale runs as one unit of work: the header, every line, one `Salida`
/// movement per line and every stock decrement are committed together or
/// not at all.
pub struct SaleCoordinator<S: Store> {
    store: S,
    ledger: StockLedger,
    log: MovementLog,
    config: SaleConfig,
}

impl<S: Store> SaleCoordinator<S> {
    pub fn new(store: S) -> Self {
        Self::with_config(store, SaleConfig::default())
    }

    pub fn with_config(store: S, config: SaleConfig) -> Self {
        Self {
            store,
            ledger: StockLedger::new(),
            log: MovementLog::new(),
            config,
        }
    }

    pub fn config(&self) -> &SaleConfig {
        &self.config
    }

    /// Processes a sale request and returns the committed sale.
    ///
    /// On any error nothing is persisted.
    #[tracing::instrument(skip(self, request), fields(lines = request.lines.len()))]
    pub async fn process_sale(&self, request: SaleRequest) -> Result<SaleReceipt> {
        let start = Instant::now();
        let mut progress = Progress::default();

        let result = self.run(request, &mut progress).await;
        metrics::histogram!("sale_duration_seconds").record(start.elapsed().as_secs_f64());

        match result {
            Ok(receipt) => {
                metrics::counter!("sales_processed_total").increment(1);
                info!(
                    sale_id = %receipt.sale_id,
                    total = %receipt.total,
                    "sale committed"
                );
                Ok(receipt)
            }
            Err(e) => {
                metrics::counter!("sales_failed_total", "code" => e.code()).increment(1);
                match e.class() {
                    ErrorClass::System => error!(
                        error = ?e,
                        state = %progress.state,
                        line = ?progress.line,
                        "sale aborted"
                    ),
                    _ => warn!(
                        error = %e,
                        state = %progress.state,
                        line = ?progress.line,
                        "sale aborted"
                    ),
                }
                Err(e)
            }
        }
    }

    async fn run(&self, request: SaleRequest, progress: &mut Progress) -> Result<SaleReceipt> {
        let lines = validate_lines(&request.lines)?;

        progress.advance(SaleState::ValidatingActor);
        let actor_id = request.actor_user_id.ok_or(SaleError::InvalidActor(None))?;
        let actor = self
            .store
            .find_user(actor_id)
            .await?
            .filter(|u| u.is_active())
            .ok_or(SaleError::InvalidActor(Some(actor_id)))?;

        let timestamp = request.timestamp.unwrap_or_else(Utc::now);

        let mut attempt = 1;
        loop {
            progress.restart();
            match self.attempt(&actor, &lines, timestamp, &mut *progress).await {
                Ok(receipt) => return Ok(receipt),
                Err(SaleError::Store(e)) if e.is_retryable() => {
                    if attempt >= self.config.max_attempts {
                        return Err(SaleError::ConcurrentStockConflict { attempts: attempt });
                    }
                    metrics::counter!("sale_retries_total").increment(1);
                    warn!(attempt, error = %e, "sale conflicted with a concurrent update, retrying");
                    tokio::time::sleep(self.config.backoff * attempt).await;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// One try at steps 2 to 6 inside a fresh unit of work.
    ///
    /// The deadline covers everything before the commit. Once the commit has
    /// been sent its outcome is awaited, so `Timeout` always means nothing was
    /// persisted.
    async fn attempt(
        &self,
        actor: &UserRecord,
        lines: &[CheckedLine],
        timestamp: DateTime<Utc>,
        progress: &mut Progress,
    ) -> Result<SaleReceipt> {
        let staged = tokio::time::timeout(
            self.config.timeout,
            self.open_and_stage(actor, lines, timestamp, &mut *progress),
        )
        .await;

        let (uow, receipt) = match staged {
            Ok(staged) => staged?,
            Err(_) => {
                if !progress.state.is_terminal() {
                    progress.advance(SaleState::Aborted);
                }
                return Err(SaleError::Timeout(self.config.timeout));
            }
        };

        if let Err(e) = uow.commit().await {
            progress.advance(SaleState::Aborted);
            if !e.is_retryable() {
                error!(error = ?e, sale_id = %receipt.sale_id, "sale commit failed");
            }
            return Err(e.into());
        }
        progress.advance(SaleState::Committed);
        metrics::counter!("stock_movements_total", "kind" => MovementKind::Exit.as_str())
            .increment(receipt.lines.len() as u64);
        Ok(receipt)
    }

    /// Opens a unit of work and stages the sale in it, rolling back on failure.
    async fn open_and_stage(
        &self,
        actor: &UserRecord,
        lines: &[CheckedLine],
        timestamp: DateTime<Utc>,
        progress: &mut Progress,
    ) -> Result<(Box<dyn UnitOfWork>, SaleReceipt)> {
        let mut uow = self.store.begin().await?;

        match self
            .stage(uow.as_mut(), actor, lines, timestamp, progress)
            .await
        {
            Ok(receipt) => Ok((uow, receipt)),
            Err(e) => {
                progress.advance(SaleState::Aborted);
                if let Err(rollback) = uow.rollback().await {
                    error!(error = ?rollback, "sale rollback failed");
                }
                Err(e)
            }
        }
    }

    async fn stage(
        &self,
        uow: &mut dyn UnitOfWork,
        actor: &UserRecord,
        lines: &[CheckedLine],
        timestamp: DateTime<Utc>,
        progress: &mut Progress,
    ) -> Result<SaleReceipt> {
        let sale = uow
            .insert_sale(NewSale {
                timestamp,
                user_id: actor.id,
            })
            .await?;
        let reference = sale_reference(sale.id);

        let mut total = Money::zero();
        let mut views = Vec::with_capacity(lines.len());

        for (index, line) in lines.iter().enumerate() {
            progress.line = Some(index);

            progress.advance(SaleState::ValidatingProduct);
            let product = self.ledger.resolve(uow, line.product_id).await?;

            progress.advance(SaleState::CheckingStock);
            self.ledger.ensure_available(&product, line.quantity)?;

            progress.advance(SaleState::Decrementing);
            let stock = self.ledger.decrement(uow, &product, line.quantity).await?;

            progress.advance(SaleState::LoggingMovement);
            self.log
                .record(
                    uow,
                    MovementKind::Exit,
                    line.quantity,
                    product.id,
                    actor.id,
                    &reference,
                )
                .await?;

            progress.advance(SaleState::AccumulatingTotal);
            let unit_price = line.unit_price.unwrap_or(product.price);
            let line_total = unit_price
                .checked_multiply(line.quantity)
                .ok_or_else(|| SaleError::InvalidLine {
                    index,
                    reason: LINE_TOTAL_OVERFLOW.to_string(),
                })?;
            total = total.checked_add(line_total).ok_or_else(|| {
                SaleError::InvalidRequest("sale total overflows".to_string())
            })?;
            let record = uow
                .insert_sale_line(NewSaleLine {
                    sale_id: sale.id,
                    product_id: product.id,
                    quantity: line.quantity,
                    unit_price,
                    line_total,
                })
                .await?;

            debug!(line = index, product_id = %product.id, stock, %line_total, "sale line staged");
            views.push(line_view(record, Some(&product)));
        }

        progress.line = None;
        progress.advance(SaleState::Finalizing);
        uow.update_sale_total(sale.id, total).await?;

        Ok(SaleReceipt {
            sale_id: sale.id,
            timestamp: sale.timestamp,
            total,
            actor: actor_summary(actor.id, Some(actor)),
            lines: views,
        })
    }

    /// Loads a committed sale with its lines, products and user.
    ///
    /// Products or users deleted since the sale are reported without their
    /// descriptive fields.
    #[tracing::instrument(skip(self))]
    pub async fn get_sale(&self, id: SaleId) -> Result<SaleReceipt> {
        let sale = self
            .store
            .find_sale(id)
            .await?
            .ok_or(SaleError::SaleNotFound(id))?;
        let records = self.store.sale_lines(id).await?;

        let mut products: HashMap<ProductId, Option<ProductRecord>> = HashMap::new();
        for line in &records {
            if !products.contains_key(&line.product_id) {
                let product = self.store.find_product(line.product_id).await?;
                products.insert(line.product_id, product);
            }
        }

        let user = self.store.find_user(sale.user_id).await?;

        let lines = records
            .into_iter()
            .map(|line| {
                let product = products.get(&line.product_id).and_then(Option::as_ref);
                line_view(line, product)
            })
            .collect();

        Ok(SaleReceipt {
            sale_id: sale.id,
            timestamp: sale.timestamp,
            total: sale.total,
            actor: actor_summary(sale.user_id, user.as_ref()),
            lines,
        })
    }
}

/// Correlation reference linking exit movements to their sale.
pub fn sale_reference(sale_id: SaleId) -> String {
    format!("{SALE_REFERENCE_PREFIX}{sale_id}")
}

fn validate_lines(lines: &[SaleLineRequest]) -> Result<Vec<CheckedLine>> {
    if lines.is_empty() {
        return Err(SaleError::InvalidRequest(
            "a sale needs at least one line".to_string(),
        ));
    }

    lines
        .iter()
        .enumerate()
        .map(|(index, line)| {
            let invalid = |reason: &str| SaleError::InvalidLine {
                index,
                reason: reason.to_string(),
            };
            let product_id = line.product_id.ok_or_else(|| invalid("product id is missing"))?;
            let quantity = line.quantity.ok_or_else(|| invalid("quantity is missing"))?;
            if quantity <= 0 {
                return Err(invalid("quantity must be positive"));
            }
            if let Some(price) = line.unit_price {
                if price.is_negative() {
                    return Err(invalid("unit price must not be negative"));
                }
                if price.checked_multiply(quantity).is_none() {
                    return Err(invalid(LINE_TOTAL_OVERFLOW));
                }
            }
            Ok(CheckedLine {
                product_id,
                quantity,
                unit_price: line.unit_price,
            })
        })
        .collect()
}

fn line_view(line: store::SaleLineRecord, product: Option<&ProductRecord>) -> SaleLineView {
    SaleLineView {
        line_id: line.id,
        product_id: line.product_id,
        product_name: product.map(|p| p.name.clone()),
        quantity: line.quantity,
        unit_price: line.unit_price,
        line_total: line.line_total,
    }
}

fn actor_summary(user_id: UserId, user: Option<&UserRecord>) -> ActorSummary {
    ActorSummary {
        user_id,
        email: user.map(|u| u.email.clone()),
        role: user.map(|u| u.role.clone()),
    }
}

#[cfg(test)]
mod tests {
    use store::{InMemoryStore, NewProduct, NewUser, SoftDeleteInterceptor};

    use super::*;

    struct Fixture {
        raw: InMemoryStore,
        coordinator: SaleCoordinator<SoftDeleteInterceptor<InMemoryStore>>,
        user_id: UserId,
    }

    async fn fixture() -> Fixture {
        let raw = InMemoryStore::new();
        let store = SoftDeleteInterceptor::new(raw.clone());
        let user = store
            .create_user(NewUser::new("vendedor@example.com", "hash", "Vendedor"))
            .await
            .unwrap();
        Fixture {
            raw,
            coordinator: SaleCoordinator::new(store),
            user_id: user.id,
        }
    }

    async fn product(f: &Fixture, price: i64, stock: i64) -> ProductId {
        f.raw
            .create_product(NewProduct::new("Item", Money::from_cents(price), stock))
            .await
            .unwrap()
            .id
    }

    #[test]
    fn line_shape_validation() {
        let err = validate_lines(&[]).unwrap_err();
        assert!(matches!(err, SaleError::InvalidRequest(_)));

        let lines = vec![
            SaleLineRequest {
                product_id: Some(ProductId::new(1)),
                quantity: Some(1),
                unit_price: None,
            },
            SaleLineRequest {
                product_id: Some(ProductId::new(2)),
                quantity: Some(0),
                unit_price: None,
            },
        ];
        let err = validate_lines(&lines).unwrap_err();
        assert!(matches!(err, SaleError::InvalidLine { index: 1, .. }));

        let missing = vec![SaleLineRequest {
            product_id: None,
            quantity: Some(1),
            unit_price: None,
        }];
        assert!(matches!(
            validate_lines(&missing).unwrap_err(),
            SaleError::InvalidLine { index: 0, .. }
        ));

        let negative_price = vec![SaleLineRequest {
            product_id: Some(ProductId::new(1)),
            quantity: Some(1),
            unit_price: Some(Money::from_cents(-1)),
        }];
        assert!(validate_lines(&negative_price).is_err());

        let overflowing_price = vec![SaleLineRequest {
            product_id: Some(ProductId::new(1)),
            quantity: Some(3),
            unit_price: Some(Money::from_cents(i64::MAX / 3 + 1)),
        }];
        match validate_lines(&overflowing_price).unwrap_err() {
            SaleError::InvalidLine { index, reason } => {
                assert_eq!(index, 0);
                assert_eq!(reason, LINE_TOTAL_OVERFLOW);
            }
            other => panic!("expected InvalidLine, got {other:?}"),
        }
    }

    #[test]
    fn reference_format() {
        assert_eq!(sale_reference(SaleId::new(42)), "VTA-42");
    }

    #[test]
    fn progress_restarts_after_actor_validation() {
        let mut progress = Progress::default();
        progress.advance(SaleState::ValidatingActor);
        progress.advance(SaleState::ValidatingProduct);
        progress.line = Some(0);
        progress.advance(SaleState::Aborted);

        progress.restart();
        assert_eq!(progress.state, SaleState::ValidatingActor);
        assert_eq!(progress.line, None);
        progress.advance(SaleState::ValidatingProduct);
    }

    #[tokio::test]
    async fn missing_actor_is_rejected_before_any_work() {
        let f = fixture().await;
        let p = product(&f, 1000, 5).await;

        let mut request = SaleRequest::new(f.user_id).line(p, 1);
        request.actor_user_id = None;
        let err = f.coordinator.process_sale(request).await.unwrap_err();
        assert!(matches!(err, SaleError::InvalidActor(None)));

        let request = SaleRequest::new(UserId::new(999)).line(p, 1);
        let err = f.coordinator.process_sale(request).await.unwrap_err();
        assert!(matches!(err, SaleError::InvalidActor(Some(_))));
        assert_eq!(f.raw.sale_count().await, 0);
    }

    #[tokio::test]
    async fn receipt_carries_snapshot_and_associations() {
        let f = fixture().await;
        let p = product(&f, 1000, 5).await;

        let receipt = f
            .coordinator
            .process_sale(SaleRequest::new(f.user_id).line(p, 2))
            .await
            .unwrap();

        assert_eq!(receipt.total, Money::from_cents(2000));
        assert_eq!(receipt.total, receipt.lines_total());
        assert_eq!(receipt.actor.email.as_deref(), Some("vendedor@example.com"));
        assert_eq!(receipt.lines[0].product_name.as_deref(), Some("Item"));

        let loaded = f.coordinator.get_sale(receipt.sale_id).await.unwrap();
        assert_eq!(loaded, receipt);
    }

    #[tokio::test]
    async fn supplied_timestamp_overrides_now() {
        let f = fixture().await;
        let p = product(&f, 100, 5).await;
        let at = DateTime::parse_from_rfc3339("2024-03-01T10:00:00Z")
            .unwrap()
            .with_timezone(&Utc);

        let receipt = f
            .coordinator
            .process_sale(SaleRequest::new(f.user_id).line(p, 1).at(at))
            .await
            .unwrap();
        assert_eq!(receipt.timestamp, at);
    }

    #[tokio::test]
    async fn unknown_sale_is_not_found() {
        let f = fixture().await;
        let err = f.coordinator.get_sale(SaleId::new(7)).await.unwrap_err();
        assert!(matches!(err, SaleError::SaleNotFound(_)));
        assert_eq!(err.class(), ErrorClass::BusinessRule);
    }
}
