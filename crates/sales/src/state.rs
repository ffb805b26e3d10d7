//! Sale state machine.

use serde::{Deserialize, Serialize};

/// Progress of a sale through its unit of work.
///
/// State transitions:
/// ```text
/// Started ──► ValidatingActor ──► ValidatingProduct ──► CheckingStock ──► Decrementing
///                                        ▲                                     │
///                                        │                                     ▼
///                                  AccumulatingTotal ◄──────────────── LoggingMovement
///                                        │
///                                        ▼
///                                   Finalizing ──► Committed
///
/// any non-terminal state ──► Aborted
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum SaleState {
    #[default]
    Started,
    ValidatingActor,
    ValidatingProduct,
    CheckingStock,
    Decrementing,
    LoggingMovement,
    AccumulatingTotal,
    Finalizing,
    /// Terminal: every effect persisted.
    Committed,
    /// Terminal: the unit of work was rolled back.
    Aborted,
}

impl SaleState {
    /// Returns true if `next` directly follows this state.
    pub fn can_transition_to(&self, next: SaleState) -> bool {
        use SaleState::*;

        if next == Aborted {
            return !self.is_terminal();
        }
        matches!(
            (self, next),
            (Started, ValidatingActor)
                | (ValidatingActor, ValidatingProduct)
                | (ValidatingProduct, CheckingStock)
                | (CheckingStock, Decrementing)
                | (Decrementing, LoggingMovement)
                | (LoggingMovement, AccumulatingTotal)
                | (AccumulatingTotal, ValidatingProduct)
                | (AccumulatingTotal, Finalizing)
                | (Finalizing, Committed)
        )
    }

    /// Returns true if this state is part of processing a single line.
    pub fn is_per_line(&self) -> bool {
        matches!(
            self,
            SaleState::ValidatingProduct
                | SaleState::CheckingStock
                | SaleState::Decrementing
                | SaleState::LoggingMovement
                | SaleState::AccumulatingTotal
        )
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, SaleState::Committed | SaleState::Aborted)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SaleState::Started => "Started",
            SaleState::ValidatingActor => "ValidatingActor",
            SaleState::ValidatingProduct => "ValidatingProduct",
            SaleState::CheckingStock => "CheckingStock",
            SaleState::Decrementing => "Decrementing",
            SaleState::LoggingMovement => "LoggingMovement",
            SaleState::AccumulatingTotal => "AccumulatingTotal",
            SaleState::Finalizing => "Finalizing",
            SaleState::Committed => "Committed",
            SaleState::Aborted => "Aborted",
        }
    }
}

impl std::fmt::Display for SaleState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
