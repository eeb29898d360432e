//! Per-submitter aggregate counters.
//!
//! Counters are updated with a single atomic merge against the counters
//! tree, scoped to one submitter key: concurrent trades from different
//! submitters never contend, and concurrent trades from the same
//! submitter never lose an update.
use crate::error::AnchorError;
use crate::trade::{TimeStamp, decimal_cbor};
use chrono::Utc;
use rust_decimal::Decimal;
use serde::Serialize;
use sled::{Db, Tree};

/// Monotonic per-submitter totals. Created on first trade, counters only
/// ever increase.
#[derive(minicbor::Encode, minicbor::Decode, Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AggregateCounters {
    #[n(0)]
    pub trade_count: u64,
    #[cbor(n(1), with = "decimal_cbor")]
    pub total_volume: Decimal,
    #[n(2)]
    pub last_activity: TimeStamp<Utc>,
}

impl Default for AggregateCounters {
    fn default() -> Self {
        Self {
            trade_count: 0,
            total_volume: Decimal::ZERO,
            last_activity: TimeStamp::now(),
        }
    }
}

pub fn user_key(user_id: &str) -> String {
    format!("user:{user_id}")
}

pub fn wallet_key(wallet_address: &str) -> String {
    format!("wallet:{wallet_address}")
}

pub struct AggregateUpdater {
    tree: Tree,
}

impl AggregateUpdater {
    pub fn open(db: &Db) -> Result<Self, AnchorError> {
        Ok(Self {
            tree: db.open_tree("counters")?,
        })
    }

    /// Atomically bump the submitter's trade count by one and volume by
    /// price x quantity, creating the entity on first use.
    pub fn record_activity(
        &self,
        submitter_key: &str,
        price: Decimal,
        quantity: Decimal,
    ) -> Result<AggregateCounters, AnchorError> {
        let delta = price * quantity;

        let merged = self.tree.update_and_fetch(submitter_key.as_bytes(), |old| {
            let mut counters = old
                .and_then(|bytes| minicbor::decode::<AggregateCounters>(bytes).ok())
                .unwrap_or_default();
            counters.trade_count += 1;
            counters.total_volume += delta;
            counters.last_activity = TimeStamp::now();

            match minicbor::to_vec(&counters) {
                Ok(bytes) => Some(bytes),
                // keep the previous value rather than dropping the key
                Err(_) => old.map(|o| o.to_vec()),
            }
        })?;

        match merged {
            Some(bytes) => minicbor::decode(&bytes)
                .map_err(|e| AnchorError::StoreCorrupt(e.to_string())),
            None => Err(AnchorError::StoreCorrupt(
                "counter merge produced no value".into(),
            )),
        }
    }

    pub fn get(&self, submitter_key: &str) -> Result<Option<AggregateCounters>, AnchorError> {
        match self.tree.get(submitter_key.as_bytes())? {
            Some(bytes) => minicbor::decode(&bytes)
                .map(Some)
                .map_err(|e| AnchorError::StoreCorrupt(e.to_string())),
            None => Ok(None),
        }
    }
}
