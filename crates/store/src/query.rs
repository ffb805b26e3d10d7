use chrono::{DateTime, Utc};
use common::{ProductId, UserId};

use crate::{MovementKind, MovementRecord};

/// Builder for filtering the movement log.
///
/// Results are always ordered by movement id, oldest first.
#[derive(Debug, Clone, Default)]
pub struct MovementQuery {
    /// Filter by product.
    pub product_id: Option<ProductId>,

    /// Filter by acting user.
    pub user_id: Option<UserId>,

    /// Filter by movement kind.
    pub kind: Option<MovementKind>,

    /// Filter by exact correlation reference.
    pub reference: Option<String>,

    /// Movements at or after this timestamp.
    pub from_timestamp: Option<DateTime<Utc>>,

    /// Movements at or before this timestamp.
    pub to_timestamp: Option<DateTime<Utc>>,

    pub limit: Option<usize>,
    pub offset: Option<usize>,
}

impl MovementQuery {
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a query for every movement of one product.
    pub fn for_product(product_id: ProductId) -> Self {
        Self {
            product_id: Some(product_id),
            ..Default::default()
        }
    }

    /// Creates a query for the movements correlated by `reference`.
    pub fn for_reference(reference: impl Into<String>) -> Self {
        Self {
            reference: Some(reference.into()),
            ..Default::default()
        }
    }

    pub fn product(mut self, product_id: ProductId) -> Self {
        self.product_id = Some(product_id);
        self
    }

    pub fn user(mut self, user_id: UserId) -> Self {
        self.user_id = Some(user_id);
        self
    }

    pub fn kind(mut self, kind: MovementKind) -> Self {
        self.kind = Some(kind);
        self
    }

    pub fn reference(mut self, reference: impl Into<String>) -> Self {
        self.reference = Some(reference.into());
        self
    }

    pub fn from_timestamp(mut self, timestamp: DateTime<Utc>) -> Self {
        self.from_timestamp = Some(timestamp);
        self
    }

    pub fn to_timestamp(mut self, timestamp: DateTime<Utc>) -> Self {
        self.to_timestamp = Some(timestamp);
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn offset(mut self, offset: usize) -> Self {
        self.offset = Some(offset);
        self
    }

    /// Checks the filter part of the query (not limit/offset) against a movement.
    pub fn matches(&self, movement: &MovementRecord) -> bool {
        if let Some(product_id) = self.product_id
            && movement.product_id != product_id
        {
            return false;
        }
        if let Some(user_id) = self.user_id
            && movement.user_id != user_id
        {
            return false;
        }
        if let Some(kind) = self.kind
            && movement.kind != kind
        {
            return false;
        }
        if let Some(ref reference) = self.reference
            && &movement.reference != reference
        {
            return false;
        }
        if let Some(from) = self.from_timestamp
            && movement.timestamp < from
        {
            return false;
        }
        if let Some(to) = self.to_timestamp
            && movement.timestamp > to
        {
            return false;
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use common::MovementId;

    use super::*;

    fn movement(kind: MovementKind, reference: &str) -> MovementRecord {
        MovementRecord {
            id: MovementId::new(1),
            timestamp: Utc::now(),
            kind,
            quantity: 2,
            reference: reference.to_string(),
            product_id: ProductId::new(7),
            user_id: UserId::new(3),
        }
    }

    #[test]
    fn empty_query_matches_everything() {
        assert!(MovementQuery::new().matches(&movement(MovementKind::Entry, "REC-1")));
    }

    #[test]
    fn filters_combine() {
        let exit = movement(MovementKind::Exit, "VTA-1");
        let query = MovementQuery::for_product(ProductId::new(7)).kind(MovementKind::Exit);
        assert!(query.matches(&exit));
        assert!(!query.clone().user(UserId::new(4)).matches(&exit));
        assert!(!query.reference("VTA-2").matches(&exit));
    }

    #[test]
    fn timestamp_window_is_inclusive() {
        let m = movement(MovementKind::Adjustment, "AJ");
        let query = MovementQuery::new()
            .from_timestamp(m.timestamp)
            .to_timestamp(m.timestamp);
        assert!(query.matches(&m));
        assert!(
            !MovementQuery::new()
                .from_timestamp(m.timestamp + chrono::Duration::seconds(1))
                .matches(&m)
        );
    }
}
