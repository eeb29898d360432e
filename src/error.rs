//! Error taxonomy for the anchoring pipeline

use crate::trade::TradeHash;

#[derive(thiserror::Error, Debug)]
pub enum AnchorError {
    #[error("invalid trade intent: {0}")]
    InvalidIntent(String),
    #[error("ledger unreachable: {0}")]
    LedgerUnavailable(String),
    #[error("ledger confirmation timed out after {0}s")]
    LedgerTimeout(u64),
    #[error("ledger rejected submission: {0}")]
    LedgerRejected(String),
    #[error("trade already recorded: {0}")]
    DuplicateTrade(TradeHash),
    #[error("store unavailable: {0}")]
    StoreUnavailable(#[from] sled::Error),
    #[error("stored record corrupt: {0}")]
    StoreCorrupt(String),
    #[error("not found: {0}")]
    NotFound(String),
}

impl AnchorError {
    /// Transient transport failures are the only class the gateway retries.
    pub fn is_transient(&self) -> bool {
        matches!(self, AnchorError::LedgerUnavailable(_))
    }
}
