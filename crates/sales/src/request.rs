use chrono::{DateTime, Utc};
use common::{Money, ProductId, SaleId, SaleLineId, UserId};
use serde::{Deserialize, Serialize};

/// A sale as submitted by a caller. Fields are optional so malformed input
/// reaches the coordinator and is rejected with a structured error.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SaleRequest {
    pub actor_user_id: Option<UserId>,
    #[serde(default)]
    pub lines: Vec<SaleLineRequest>,
    /// Overrides the sale timestamp; defaults to now.
    #[serde(default)]
    pub timestamp: Option<DateTime<Utc>>,
}

impl SaleRequest {
    pub fn new(actor_user_id: UserId) -> Self {
        Self {
            actor_user_id: Some(actor_user_id),
            ..Default::default()
        }
    }

    /// Adds a line priced at the catalog price.
    pub fn line(mut self, product_id: ProductId, quantity: i64) -> Self {
        self.lines.push(SaleLineRequest {
            product_id: Some(product_id),
            quantity: Some(quantity),
            unit_price: None,
        });
        self
    }

    /// Adds a line with a caller-supplied unit price.
    pub fn priced_line(mut self, product_id: ProductId, quantity: i64, unit_price: Money) -> Self {
        self.lines.push(SaleLineRequest {
            product_id: Some(product_id),
            quantity: Some(quantity),
            unit_price: Some(unit_price),
        });
        self
    }

    pub fn at(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = Some(timestamp);
        self
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SaleLineRequest {
    pub product_id: Option<ProductId>,
    pub quantity: Option<i64>,
    /// Price snapshot for the line. When absent the catalog price at the
    /// moment of sale is used.
    #[serde(default)]
    pub unit_price: Option<Money>,
}

/// Identity of the user who made a sale.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActorSummary {
    pub user_id: UserId,
    /// `None` once the user has been logically deleted.
    pub email: Option<String>,
    pub role: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SaleLineView {
    pub line_id: SaleLineId,
    pub product_id: ProductId,
    /// `None` once the product has been logically deleted.
    pub product_name: Option<String>,
    pub quantity: i64,
    pub unit_price: Money,
    pub line_total: Money,
}

/// A fully materialized sale.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SaleReceipt {
    pub sale_id: SaleId,
    pub timestamp: DateTime<Utc>,
    pub total: Money,
    pub actor: ActorSummary,
    pub lines: Vec<SaleLineView>,
}

impl SaleReceipt {
    /// Sum of the line totals; equals `total` for every committed sale.
    pub fn lines_total(&self) -> Money {
        self.lines.iter().map(|l| l.line_total).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builder_collects_lines_in_order() {
        let request = SaleRequest::new(UserId::new(1))
            .line(ProductId::new(10), 2)
            .priced_line(ProductId::new(11), 1, Money::from_cents(750));

        assert_eq!(request.lines.len(), 2);
        assert_eq!(request.lines[0].product_id, Some(ProductId::new(10)));
        assert_eq!(request.lines[0].unit_price, None);
        assert_eq!(request.lines[1].unit_price, Some(Money::from_cents(750)));
    }

    #[test]
    fn missing_fields_deserialize_as_none() {
        let request: SaleRequest =
            serde_json::from_str(r#"{"lines":[{"product_id":3}]}"#).unwrap();
        assert_eq!(request.actor_user_id, None);
        assert_eq!(request.lines[0].quantity, None);
        assert!(request.timestamp.is_none());

        let empty: SaleRequest = serde_json::from_str("{}").unwrap();
        assert!(empty.lines.is_empty());
    }
}
