//! Ledger gateway: the only component that performs external submission.
//!
//! The external ledger is modeled as a capability set (submit, proof,
//! verified, stats) behind an object-safe trait so the service can run
//! against the real HTTP adapter or an in-memory double.
pub mod http;
pub mod mock;

use crate::error::AnchorError;
use crate::trade::TradeHash;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;

pub use http::HttpLedger;
pub use mock::MockLedger;

/// Result of a confirmed submission. Transaction id and block number are
/// supplied by the ledger, never computed locally.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LedgerReceipt {
    pub trade_hash: String,
    pub transaction_hash: String,
    pub block_number: u64,
    pub gas_used: u64,
}

/// Read-only proof of recording. `exists=false` is a normal outcome for
/// an unknown hash, not a failure.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LedgerProof {
    pub exists: bool,
    pub trader: Option<String>,
    pub timestamp: Option<u64>,
    pub block_number: Option<u64>,
    pub previous_hash: Option<String>,
}

impl LedgerProof {
    /// The proof shape for a hash the ledger has never seen.
    pub fn absent() -> Self {
        Self {
            exists: false,
            trader: None,
            timestamp: None,
            block_number: None,
            previous_hash: None,
        }
    }
}

/// Aggregate counters maintained by the ledger contract itself.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LedgerStats {
    pub total_trades: u64,
    pub total_users: u64,
    pub last_hash: Option<String>,
    pub last_timestamp: Option<u64>,
}

#[async_trait]
pub trait LedgerClient: Send + Sync {
    /// Submit a hash and await on-chain confirmation.
    ///
    /// Re-submitting an already recorded hash is accepted idempotently by
    /// the contract and returns the originally recorded receipt;
    /// `LedgerRejected` is reserved for genuine reverts.
    async fn submit(&self, hash: &TradeHash, submitter: &str)
    -> Result<LedgerReceipt, AnchorError>;

    /// Read-only proof query. Transport failure is `LedgerUnavailable`.
    async fn proof(&self, hash: &TradeHash) -> Result<LedgerProof, AnchorError>;

    /// Convenience check that degrades to `false` on any failure. A
    /// `false` means "unknown or absent", never a guarantee of absence.
    async fn is_verified(&self, hash: &TradeHash) -> bool {
        match self.proof(hash).await {
            Ok(proof) => proof.exists,
            Err(_) => false,
        }
    }

    async fn stats(&self) -> Result<LedgerStats, AnchorError>;
}

/// Backoff schedule for transient transport failures during submission.
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Maximum number of retry attempts (not counting the initial request).
    pub max_retries: u32,
    /// Initial delay before the first retry.
    pub initial_delay: Duration,
    /// Maximum delay between retries.
    pub max_delay: Duration,
    /// Multiplier applied to the delay after each retry.
    pub backoff_factor: f64,
    /// Whether to add jitter to the delay.
    pub jitter: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial_delay: Duration::from_millis(200),
            max_delay: Duration::from_secs(10),
            backoff_factor: 2.0,
            jitter: true,
        }
    }
}

impl RetryConfig {
    /// Calculate delay for a given attempt (0-indexed).
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let base =
            self.initial_delay.as_millis() as f64 * self.backoff_factor.powi(attempt as i32);
        let capped = base.min(self.max_delay.as_millis() as f64);

        let final_ms = if self.jitter {
            let jitter_range = capped * 0.25;
            let jitter = (rand::random::<f64>() - 0.5) * 2.0 * jitter_range;
            (capped + jitter).max(0.0)
        } else {
            capped
        };

        Duration::from_millis(final_ms as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn delay_grows_and_caps_without_jitter() {
        let config = RetryConfig {
            max_retries: 5,
            initial_delay: Duration::from_millis(100),
            max_delay: Duration::from_millis(500),
            backoff_factor: 2.0,
            jitter: false,
        };

        assert_eq!(config.delay_for_attempt(0).as_millis(), 100);
        assert_eq!(config.delay_for_attempt(1).as_millis(), 200);
        assert_eq!(config.delay_for_attempt(2).as_millis(), 400);
        assert_eq!(config.delay_for_attempt(3).as_millis(), 500);
    }
}
