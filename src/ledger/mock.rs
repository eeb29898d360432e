//! In-memory ledger double for tests and demos.
//!
//! Simulates confirmation latency, transient outages, and contract
//! rejections while keeping the same chained-hash bookkeeping the real
//! contract maintains.
use super::{LedgerClient, LedgerProof, LedgerReceipt, LedgerStats};
use crate::error::AnchorError;
use crate::trade::TradeHash;
use async_trait::async_trait;
use chrono::Utc;
use std::collections::{HashMap, HashSet};
use std::time::Duration;
use tokio::sync::Mutex;

#[derive(Debug, Clone)]
struct AnchorEntry {
    receipt: LedgerReceipt,
    trader: String,
    timestamp: u64,
    previous_hash: Option<String>,
}

#[derive(Default)]
struct State {
    anchors: HashMap<String, AnchorEntry>,
    traders: HashSet<String>,
    last_hash: Option<String>,
    last_timestamp: Option<u64>,
    next_block: u64,
    offline: bool,
    fail_next_submits: u32,
    rejected: HashSet<String>,
}

pub struct MockLedger {
    state: Mutex<State>,
    latency: Duration,
}

impl MockLedger {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(State {
                next_block: 1,
                ..State::default()
            }),
            latency: Duration::ZERO,
        }
    }

    /// Simulated confirmation latency applied to every submission.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    /// Take the whole transport down; every call fails `LedgerUnavailable`.
    pub async fn set_offline(&self, offline: bool) {
        self.state.lock().await.offline = offline;
    }

    /// Fail the next `n` submissions with a transient transport error.
    pub async fn fail_next_submits(&self, n: u32) {
        self.state.lock().await.fail_next_submits = n;
    }

    /// Mark a hash so the contract reverts its submission.
    pub async fn reject(&self, hash: &TradeHash) {
        self.state.lock().await.rejected.insert(hash.as_str().to_string());
    }
}

impl Default for MockLedger {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl LedgerClient for MockLedger {
    async fn submit(
        &self,
        hash: &TradeHash,
        submitter: &str,
    ) -> Result<LedgerReceipt, AnchorError> {
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }

        let mut state = self.state.lock().await;
        if state.offline {
            return Err(AnchorError::LedgerUnavailable("mock ledger offline".into()));
        }
        if state.fail_next_submits > 0 {
            state.fail_next_submits -= 1;
            return Err(AnchorError::LedgerUnavailable(
                "mock transport failure".into(),
            ));
        }
        if state.rejected.contains(hash.as_str()) {
            return Err(AnchorError::LedgerRejected(format!(
                "contract reverted for {hash}"
            )));
        }

        // Duplicate submission is accepted idempotently: the original
        // receipt comes back unchanged.
        if let Some(entry) = state.anchors.get(hash.as_str()) {
            return Ok(entry.receipt.clone());
        }

        let block_number = state.next_block;
        state.next_block += 1;
        let timestamp = Utc::now().timestamp() as u64;
        let transaction_hash = format!(
            "0x{}",
            sha256::digest(format!("{}:{}", hash.as_str(), block_number))
        );

        let receipt = LedgerReceipt {
            trade_hash: hash.as_str().to_string(),
            transaction_hash,
            block_number,
            gas_used: 21_000 + (hash.as_str().len() as u64) * 16,
        };
        let entry = AnchorEntry {
            receipt: receipt.clone(),
            trader: submitter.to_string(),
            timestamp,
            previous_hash: state.last_hash.clone(),
        };

        state.anchors.insert(hash.as_str().to_string(), entry);
        state.traders.insert(submitter.to_string());
        state.last_hash = Some(hash.as_str().to_string());
        state.last_timestamp = Some(timestamp);

        Ok(receipt)
    }

    async fn proof(&self, hash: &TradeHash) -> Result<LedgerProof, AnchorError> {
        let state = self.state.lock().await;
        if state.offline {
            return Err(AnchorError::LedgerUnavailable("mock ledger offline".into()));
        }

        Ok(match state.anchors.get(hash.as_str()) {
            Some(entry) => LedgerProof {
                exists: true,
                trader: Some(entry.trader.clone()),
                timestamp: Some(entry.timestamp),
                block_number: Some(entry.receipt.block_number),
                previous_hash: entry.previous_hash.clone(),
            },
            None => LedgerProof::absent(),
        })
    }

    async fn stats(&self) -> Result<LedgerStats, AnchorError> {
        let state = self.state.lock().await;
        if state.offline {
            return Err(AnchorError::LedgerUnavailable("mock ledger offline".into()));
        }

        Ok(LedgerStats {
            total_trades: state.anchors.len() as u64,
            total_users: state.traders.len() as u64,
            last_hash: state.last_hash.clone(),
            last_timestamp: state.last_timestamp,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::trade::{Side, TimeStamp, TradeIntent};
    use rust_decimal::Decimal;

    fn some_hash(tag: u32) -> TradeHash {
        let (hash, _) = TradeIntent::new()
            .set_symbol("ETH/USD")
            .set_price(Decimal::from(3000 + tag))
            .set_quantity(Decimal::ONE)
            .set_side(Side::Sell)
            .set_submitted_at(TimeStamp::new_with(2024, 1, 1, 0, 0, 0))
            .canonical_hash()
            .unwrap();
        hash
    }

    #[tokio::test]
    async fn resubmission_returns_original_receipt() {
        let ledger = MockLedger::new();
        let hash = some_hash(1);

        let first = ledger.submit(&hash, "u1").await.unwrap();
        let second = ledger.submit(&hash, "u1").await.unwrap();

        assert_eq!(first.transaction_hash, second.transaction_hash);
        assert_eq!(first.block_number, second.block_number);

        let stats = ledger.stats().await.unwrap();
        assert_eq!(stats.total_trades, 1);
    }

    #[tokio::test]
    async fn proof_links_back_to_previous_hash() {
        let ledger = MockLedger::new();
        let first = some_hash(1);
        let second = some_hash(2);

        ledger.submit(&first, "u1").await.unwrap();
        ledger.submit(&second, "u2").await.unwrap();

        let proof = ledger.proof(&second).await.unwrap();
        assert!(proof.exists);
        assert_eq!(proof.previous_hash.as_deref(), Some(first.as_str()));
        assert_eq!(proof.trader.as_deref(), Some("u2"));
    }

    #[tokio::test]
    async fn unknown_hash_is_absent_not_an_error() {
        let ledger = MockLedger::new();
        let proof = ledger.proof(&some_hash(9)).await.unwrap();

        assert!(!proof.exists);
        assert!(!ledger.is_verified(&some_hash(9)).await);
    }

    #[tokio::test]
    async fn offline_degrades_is_verified_to_false() {
        let ledger = MockLedger::new();
        let hash = some_hash(3);
        ledger.submit(&hash, "u1").await.unwrap();

        ledger.set_offline(true).await;
        assert!(ledger.proof(&hash).await.is_err());
        assert!(!ledger.is_verified(&hash).await);

        ledger.set_offline(false).await;
        assert!(ledger.is_verified(&hash).await);
    }
}
