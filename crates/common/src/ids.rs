use serde::{Deserialize, Serialize};

/// Declares a store-assigned row identifier.
///
/// Identifiers wrap the `BIGSERIAL` value the store hands out so that a
/// product id can never be passed where a user id is expected.
macro_rules! row_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(i64);

        impl $name {
            /// Wraps a raw row identifier.
            pub fn new(value: i64) -> Self {
                Self(value)
            }

            /// Returns the raw row identifier.
            pub fn as_i64(&self) -> i64 {
                self.0
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<i64> for $name {
            fn from(value: i64) -> Self {
                Self(value)
            }
        }

        impl From<$name> for i64 {
            fn from(id: $name) -> Self {
                id.0
            }
        }
    };
}

row_id!(
    /// Identifier of a catalog product.
    ProductId
);
row_id!(
    /// Identifier of a user account (the acting user of sales and movements).
    UserId
);
row_id!(
    /// Identifier of a sale header.
    SaleId
);
row_id!(
    /// Identifier of a line within a sale.
    SaleLineId
);
row_id!(
    /// Identifier of an inventory movement.
    MovementId
);
row_id!(
    /// Identifier of a stored refresh token.
    RefreshTokenId
);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn raw_value_roundtrips() {
        let id = ProductId::new(42);
        assert_eq!(id.as_i64(), 42);
        assert_eq!(i64::from(id), 42);
        assert_eq!(ProductId::from(42), id);
    }

    #[test]
    fn display_is_the_raw_value() {
        assert_eq!(SaleId::new(7).to_string(), "7");
    }

    #[test]
    fn serializes_transparently() {
        let json = serde_json::to_string(&UserId::new(3)).unwrap();
        assert_eq!(json, "3");
        let id: UserId = serde_json::from_str("3").unwrap();
        assert_eq!(id, UserId::new(3));
    }
}
