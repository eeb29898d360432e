//! Service layer orchestrating the verification pipeline and the
//! reconciled query views.
//!
//! A verification request moves Received -> Hashed -> Submitted ->
//! LedgerConfirmed -> Persisted -> Completed; any failure is terminal for
//! the request. The ledger is authoritative, the store is the replica,
//! and queries merge the two without forcing them to agree; no
//! transaction spans both, consistency is eventual.
use crate::counters::{AggregateCounters, AggregateUpdater, user_key, wallet_key};
use crate::error::AnchorError;
use crate::ledger::{LedgerClient, LedgerProof, LedgerReceipt, LedgerStats};
use crate::store::{TradeRecord, TradeStore, VolumeSummary};
use crate::trade::{TradeHash, TradeIntent};
use serde::Serialize;
use std::sync::Arc;
use tracing::{info, warn};

/// Outcome of a completed verification request.
#[derive(Debug)]
pub struct VerifiedTrade {
    pub record: TradeRecord,
    pub receipt: LedgerReceipt,
    /// False when this request re-verified an already recorded hash.
    pub newly_recorded: bool,
}

/// Ledger-authoritative and store-replica views of one hash, reported
/// side by side. Ledger-true/store-absent is a valid state.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TradeEvidence {
    pub blockchain: LedgerProof,
    pub database: Option<TradeRecord>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VerificationStatus {
    pub trade_hash: TradeHash,
    pub is_verified: bool,
    pub in_database: bool,
    pub db_record: Option<TradeRecord>,
}

/// Ledger stats are best-effort in the merged view: a gateway failure
/// degrades this sub-field instead of failing the whole response.
#[derive(Debug, Serialize)]
#[serde(untagged)]
pub enum LedgerStatsView {
    Available(LedgerStats),
    Unavailable { error: String },
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StoreStats {
    pub total_trades: usize,
    #[serde(flatten)]
    pub volume: VolumeSummary,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MergedStats {
    pub blockchain: LedgerStatsView,
    pub database: StoreStats,
}

#[derive(Debug)]
pub struct HistoryPage {
    pub trades: Vec<TradeRecord>,
    pub total: usize,
    pub limit: usize,
    pub offset: usize,
}

pub struct AnchorService {
    ledger: Arc<dyn LedgerClient>,
    store: TradeStore,
    counters: AggregateUpdater,
}

impl AnchorService {
    pub fn new(ledger: Arc<dyn LedgerClient>, store: TradeStore, counters: AggregateUpdater) -> Self {
        Self {
            ledger,
            store,
            counters,
        }
    }

    /// Run one intent through the full pipeline.
    ///
    /// Ledger failure aborts before any persistence: a record only ever
    /// exists for a hash genuinely anchored on the ledger. A duplicate at
    /// the store is success-with-existing-record and does not bump
    /// counters, so counters track distinct trades exactly.
    pub async fn verify(&self, intent: TradeIntent) -> Result<VerifiedTrade, AnchorError> {
        // Received -> Hashed
        let (hash, _) = intent.canonical_hash()?;
        info!(hash = hash.as_str(), symbol = ?intent.symbol, "trade hashed");

        // Hashed -> Submitted -> LedgerConfirmed
        let receipt = self.ledger.submit(&hash, intent.submitter()).await?;
        info!(
            hash = hash.as_str(),
            tx = %receipt.transaction_hash,
            block = receipt.block_number,
            "anchor confirmed"
        );

        // LedgerConfirmed -> Persisted
        let record = TradeRecord::from_verified(hash.clone(), &intent, &receipt)?;
        match self.store.insert(&record) {
            Ok(()) => {
                // Persisted -> Completed: counters run once, for freshly
                // inserted records only.
                self.counters
                    .record_activity(&user_key(&record.user_id), record.price, record.quantity)?;
                if let Some(wallet) = &record.wallet_address {
                    self.counters
                        .record_activity(&wallet_key(wallet), record.price, record.quantity)?;
                }
                Ok(VerifiedTrade {
                    record,
                    receipt,
                    newly_recorded: true,
                })
            }
            Err(AnchorError::DuplicateTrade(_)) => {
                // Idempotent re-verification: the same hash reached the
                // ledger twice, e.g. a client retry.
                warn!(hash = hash.as_str(), "duplicate verification, reusing record");
                let existing = self.store.find_by_hash(&hash)?.ok_or_else(|| {
                    AnchorError::StoreCorrupt("duplicate reported but record missing".into())
                })?;
                Ok(VerifiedTrade {
                    record: existing,
                    receipt,
                    newly_recorded: false,
                })
            }
            Err(err) => Err(err),
        }
    }

    /// Both sources of truth for one hash, unreconciled by design.
    pub async fn proof(&self, hash: &TradeHash) -> Result<TradeEvidence, AnchorError> {
        let blockchain = self.ledger.proof(hash).await?;
        let database = self.store.find_by_hash(hash)?;
        Ok(TradeEvidence {
            blockchain,
            database,
        })
    }

    pub async fn verified(&self, hash: &TradeHash) -> Result<VerificationStatus, AnchorError> {
        let is_verified = self.ledger.is_verified(hash).await;
        let db_record = self.store.find_by_hash(hash)?;
        Ok(VerificationStatus {
            trade_hash: hash.clone(),
            is_verified,
            in_database: db_record.is_some(),
            db_record,
        })
    }

    pub async fn stats(&self) -> Result<MergedStats, AnchorError> {
        let blockchain = match self.ledger.stats().await {
            Ok(stats) => LedgerStatsView::Available(stats),
            Err(err) => {
                warn!(error = %err, "ledger stats unavailable, degrading");
                LedgerStatsView::Unavailable {
                    error: err.to_string(),
                }
            }
        };
        let database = StoreStats {
            total_trades: self.store.count_all(),
            volume: self.store.aggregate_volume()?,
        };
        Ok(MergedStats {
            blockchain,
            database,
        })
    }

    pub fn history(
        &self,
        user_id: &str,
        limit: usize,
        offset: usize,
    ) -> Result<HistoryPage, AnchorError> {
        let (trades, total) = self.store.find_by_user(user_id, limit, offset)?;
        Ok(HistoryPage {
            trades,
            total,
            limit,
            offset,
        })
    }

    pub fn wallet_history(
        &self,
        wallet_address: &str,
        limit: usize,
        offset: usize,
    ) -> Result<HistoryPage, AnchorError> {
        let (trades, total) = self.store.find_by_wallet(wallet_address, limit, offset)?;
        Ok(HistoryPage {
            trades,
            total,
            limit,
            offset,
        })
    }

    pub fn find_by_id(&self, record_id: &str) -> Result<TradeRecord, AnchorError> {
        self.store
            .find_by_id(record_id)?
            .ok_or_else(|| AnchorError::NotFound(format!("trade {record_id}")))
    }

    pub fn submitter_counters(
        &self,
        submitter_key: &str,
    ) -> Result<Option<AggregateCounters>, AnchorError> {
        self.counters.get(submitter_key)
    }
}
