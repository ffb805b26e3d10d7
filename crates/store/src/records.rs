use chrono::{DateTime, Utc};
use common::{MovementId, Money, ProductId, RefreshTokenId, SaleId, SaleLineId, UserId};
use serde::{Deserialize, Serialize};

use crate::StoreError;

/// A catalog product with its quantity on hand.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductRecord {
    pub id: ProductId,
    pub name: String,
    pub price: Money,
    pub category: Option<String>,
    /// Quantity on hand. `None` means stock was never tracked for the product.
    pub stock: Option<i64>,
    /// The stock the product was created with; anchors reconciliation.
    pub baseline_stock: i64,
    pub is_deleted: bool,
    pub deleted_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone)]
pub struct NewProduct {
    pub name: String,
    pub price: Money,
    pub category: Option<String>,
    pub stock: Option<i64>,
}

impl NewProduct {
    /// Creates a product payload with a tracked initial stock.
    pub fn new(name: impl Into<String>, price: Money, stock: i64) -> Self {
        Self {
            name: name.into(),
            price,
            category: None,
            stock: Some(stock),
        }
    }

    pub fn category(mut self, category: impl Into<String>) -> Self {
        self.category = Some(category.into());
        self
    }

    /// Leaves stock untracked (`NULL`).
    pub fn untracked(mut self) -> Self {
        self.stock = None;
        self
    }
}

/// A user account.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserRecord {
    pub id: UserId,
    pub email: String,
    /// Argon2 PHC string.
    #[serde(skip_serializing)]
    pub password_hash: String,
    pub role: String,
    pub is_deleted: bool,
    pub deleted_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone)]
pub struct NewUser {
    pub email: String,
    pub password_hash: String,
    pub role: String,
}

impl NewUser {
    pub fn new(
        email: impl Into<String>,
        password_hash: impl Into<String>,
        role: impl Into<String>,
    ) -> Self {
        Self {
            email: email.into(),
            password_hash: password_hash.into(),
            role: role.into(),
        }
    }
}

/// A sale header.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SaleRecord {
    pub id: SaleId,
    pub timestamp: DateTime<Utc>,
    pub total: Money,
    pub user_id: UserId,
}

#[derive(Debug, Clone)]
pub struct NewSale {
    pub timestamp: DateTime<Utc>,
    pub user_id: UserId,
}

/// A line of a sale. The unit price is a snapshot taken when the sale was made.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SaleLineRecord {
    pub id: SaleLineId,
    pub sale_id: SaleId,
    pub product_id: ProductId,
    pub quantity: i64,
    pub unit_price: Money,
    pub line_total: Money,
}

#[derive(Debug, Clone)]
pub struct NewSaleLine {
    pub sale_id: SaleId,
    pub product_id: ProductId,
    pub quantity: i64,
    pub unit_price: Money,
    pub line_total: Money,
}

/// Kind of stock-affecting event.
///
/// The persisted names are the ones the rest of the business uses
/// (`Entrada`, `Salida`, `Ajuste`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MovementKind {
    /// Goods received; increases stock.
    #[serde(rename = "Entrada")]
    Entry,
    /// Goods sold; decreases stock. Only produced by the sale path.
    #[serde(rename = "Salida")]
    Exit,
    /// Manual correction; increases stock.
    #[serde(rename = "Ajuste")]
    Adjustment,
}

impl MovementKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            MovementKind::Entry => "Entrada",
            MovementKind::Exit => "Salida",
            MovementKind::Adjustment => "Ajuste",
        }
    }

    /// Signed stock effect of `quantity` units of this kind.
    pub fn signed(&self, quantity: i64) -> i64 {
        match self {
            MovementKind::Entry | MovementKind::Adjustment => quantity,
            MovementKind::Exit => -quantity,
        }
    }
}

impl std::fmt::Display for MovementKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for MovementKind {
    type Err = StoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Entrada" => Ok(MovementKind::Entry),
            "Salida" => Ok(MovementKind::Exit),
            "Ajuste" => Ok(MovementKind::Adjustment),
            other => Err(StoreError::InvalidData(format!(
                "unknown movement kind '{other}'"
            ))),
        }
    }
}

/// An immutable inventory movement.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MovementRecord {
    pub id: MovementId,
    pub timestamp: DateTime<Utc>,
    pub kind: MovementKind,
    pub quantity: i64,
    /// Free-text correlation reference, e.g. `VTA-12`.
    pub reference: String,
    pub product_id: ProductId,
    pub user_id: UserId,
}

#[derive(Debug, Clone)]
pub struct NewMovement {
    pub timestamp: DateTime<Utc>,
    pub kind: MovementKind,
    pub quantity: i64,
    pub reference: String,
    pub product_id: ProductId,
    pub user_id: UserId,
}

/// A refresh token issued to a user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RefreshTokenRecord {
    pub id: RefreshTokenId,
    pub token: String,
    pub expires_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub is_revoked: bool,
    pub user_id: UserId,
}

impl RefreshTokenRecord {
    /// Returns true if the token can still be exchanged at `now`.
    pub fn is_usable(&self, now: DateTime<Utc>) -> bool {
        !self.is_revoked && self.expires_at > now
    }
}

#[derive(Debug, Clone)]
pub struct NewRefreshToken {
    pub token: String,
    pub expires_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub user_id: UserId,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn movement_kind_wire_names() {
        assert_eq!(MovementKind::Entry.to_string(), "Entrada");
        assert_eq!(MovementKind::Exit.to_string(), "Salida");
        assert_eq!(MovementKind::Adjustment.to_string(), "Ajuste");

        let json = serde_json::to_string(&MovementKind::Exit).unwrap();
        assert_eq!(json, "\"Salida\"");
    }

    #[test]
    fn movement_kind_parse() {
        assert_eq!("Ajuste".parse::<MovementKind>().unwrap(), MovementKind::Adjustment);
        assert!("Devolucion".parse::<MovementKind>().is_err());
        assert!("salida".parse::<MovementKind>().is_err());
    }

    #[test]
    fn only_exits_reduce_stock() {
        assert_eq!(MovementKind::Entry.signed(4), 4);
        assert_eq!(MovementKind::Adjustment.signed(4), 4);
        assert_eq!(MovementKind::Exit.signed(4), -4);
    }

    #[test]
    fn refresh_token_usability() {
        let now = Utc::now();
        let token = RefreshTokenRecord {
            id: RefreshTokenId::new(1),
            token: "abc".to_string(),
            expires_at: now + chrono::Duration::days(1),
            created_at: now,
            is_revoked: false,
            user_id: UserId::new(1),
        };
        assert!(token.is_usable(now));

        let revoked = RefreshTokenRecord {
            is_revoked: true,
            ..token.clone()
        };
        assert!(!revoked.is_usable(now));

        let expired = RefreshTokenRecord {
            expires_at: now - chrono::Duration::seconds(1),
            ..token
        };
        assert!(!expired.is_usable(now));
    }

    #[test]
    fn user_record_never_serializes_password_hash() {
        let user = UserRecord {
            id: UserId::new(1),
            email: "ana@example.com".to_string(),
            password_hash: "$argon2id$secret".to_string(),
            role: "Vendedor".to_string(),
            is_deleted: false,
            deleted_at: None,
        };
        let json = serde_json::to_value(&user).unwrap();
        assert!(json.get("password_hash").is_none());
    }
}
