use serde::{Deserialize, Serialize};

/// Classification shared by every error the core reports.
///
/// - `Validation`: rejected before anything was opened or mutated.
/// - `BusinessRule`: detected mid-transaction, the unit of work was rolled back.
/// - `System`: infrastructure failure, rolled back and reported opaquely.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorClass {
    Validation,
    BusinessRule,
    System,
}

impl ErrorClass {
    /// Returns true if internals must not be shown to the caller.
    pub fn is_opaque(&self) -> bool {
        matches!(self, ErrorClass::System)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorClass::Validation => "validation",
            ErrorClass::BusinessRule => "business_rule",
            ErrorClass::System => "system",
        }
    }
}

impl std::fmt::Display for ErrorClass {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
