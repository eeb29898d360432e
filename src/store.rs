//! Durable trade store over sled.
//!
//! Records are append-only, keyed by trade hash. Hash uniqueness is the
//! store's primary invariant and is enforced with a compare-and-swap on
//! the trades tree, which makes persistence idempotent for retried
//! verification requests.
use crate::error::AnchorError;
use crate::ledger::LedgerReceipt;
use crate::trade::{Side, TimeStamp, TradeHash, TradeIntent};
use chrono::Utc;
use rust_decimal::Decimal;
use serde::Serialize;
use sled::{Db, Tree};
use uuid7::uuid7;

pub const MAX_PAGE_SIZE: usize = 100;
pub const DEFAULT_PAGE_SIZE: usize = 50;

/// Persisted entity: created exactly once per successful verification,
/// never mutated, never deleted by normal operation.
#[derive(minicbor::Encode, minicbor::Decode, Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TradeRecord {
    #[n(0)]
    pub record_id: String, // uuid7, time-ordered store-internal id
    #[n(1)]
    pub trade_hash: TradeHash,
    #[n(2)]
    pub user_id: String,
    #[n(3)]
    pub wallet_address: Option<String>,
    #[n(4)]
    pub symbol: String,
    #[n(5)]
    pub side: Side,
    #[cbor(n(6), with = "crate::trade::decimal_cbor")]
    pub price: Decimal,
    #[cbor(n(7), with = "crate::trade::decimal_cbor")]
    pub quantity: Decimal,
    #[n(8)]
    pub transaction_hash: String,
    #[n(9)]
    pub block_number: u64,
    #[n(10)]
    pub verified_at: TimeStamp<Utc>,
}

impl TradeRecord {
    /// Build the persisted form of a verified trade from its validated
    /// intent and the ledger's receipt.
    pub fn from_verified(
        hash: TradeHash,
        intent: &TradeIntent,
        receipt: &LedgerReceipt,
    ) -> Result<Self, AnchorError> {
        let symbol = intent
            .symbol
            .clone()
            .ok_or_else(|| AnchorError::InvalidIntent("symbol is missing".into()))?;
        let side = intent
            .side
            .ok_or_else(|| AnchorError::InvalidIntent("side is missing".into()))?;

        Ok(Self {
            record_id: uuid7().to_string(),
            trade_hash: hash,
            user_id: intent.submitter().to_string(),
            wallet_address: intent.wallet_address.clone(),
            symbol,
            side,
            price: intent.price,
            quantity: intent.quantity,
            transaction_hash: receipt.transaction_hash.clone(),
            block_number: receipt.block_number,
            verified_at: TimeStamp::now(),
        })
    }

    pub fn notional_volume(&self) -> Decimal {
        self.price * self.quantity
    }
}

/// Aggregates computed over every record in the store.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VolumeSummary {
    pub total_volume: Decimal,
    pub avg_price: Decimal,
    pub total_quantity: Decimal,
}

pub struct TradeStore {
    trades: Tree,
    record_ids: Tree,
    user_idx: Tree,
    wallet_idx: Tree,
}

// Index keys sort ascending, so the timestamp component is inverted to
// make ascending key order equal verification time descending.
fn index_key(submitter: &str, verified_at: &TimeStamp<Utc>, hash: &TradeHash) -> Vec<u8> {
    let inverted = u64::MAX - verified_at.as_nanos() as u64;
    let mut key = Vec::with_capacity(submitter.len() + 1 + 8 + hash.as_str().len());
    key.extend_from_slice(submitter.as_bytes());
    key.push(0);
    key.extend_from_slice(&inverted.to_be_bytes());
    key.extend_from_slice(hash.as_str().as_bytes());
    key
}

fn index_prefix(submitter: &str) -> Vec<u8> {
    let mut prefix = Vec::with_capacity(submitter.len() + 1);
    prefix.extend_from_slice(submitter.as_bytes());
    prefix.push(0);
    prefix
}

fn decode_record(bytes: &[u8]) -> Result<TradeRecord, AnchorError> {
    minicbor::decode(bytes).map_err(|e| AnchorError::StoreCorrupt(e.to_string()))
}

impl TradeStore {
    pub fn open(db: &Db) -> Result<Self, AnchorError> {
        Ok(Self {
            trades: db.open_tree("trades")?,
            record_ids: db.open_tree("record_ids")?,
            user_idx: db.open_tree("user_idx")?,
            wallet_idx: db.open_tree("wallet_idx")?,
        })
    }

    /// Insert a freshly verified record. Fails with `DuplicateTrade` when
    /// a record with the same hash already exists.
    pub fn insert(&self, record: &TradeRecord) -> Result<(), AnchorError> {
        let key = record.trade_hash.as_str().as_bytes();
        let value =
            minicbor::to_vec(record).map_err(|e| AnchorError::StoreCorrupt(e.to_string()))?;

        if self
            .trades
            .compare_and_swap(key, None as Option<&[u8]>, Some(value))?
            .is_err()
        {
            return Err(AnchorError::DuplicateTrade(record.trade_hash.clone()));
        }

        self.record_ids
            .insert(record.record_id.as_bytes(), key)?;
        self.user_idx.insert(
            index_key(&record.user_id, &record.verified_at, &record.trade_hash),
            key,
        )?;
        if let Some(wallet) = &record.wallet_address {
            self.wallet_idx.insert(
                index_key(wallet, &record.verified_at, &record.trade_hash),
                key,
            )?;
        }

        Ok(())
    }

    pub fn find_by_hash(&self, hash: &TradeHash) -> Result<Option<TradeRecord>, AnchorError> {
        match self.trades.get(hash.as_str().as_bytes())? {
            Some(bytes) => Ok(Some(decode_record(&bytes)?)),
            None => Ok(None),
        }
    }

    pub fn find_by_id(&self, record_id: &str) -> Result<Option<TradeRecord>, AnchorError> {
        let Some(hash_key) = self.record_ids.get(record_id.as_bytes())? else {
            return Ok(None);
        };
        match self.trades.get(&hash_key)? {
            Some(bytes) => Ok(Some(decode_record(&bytes)?)),
            None => Err(AnchorError::StoreCorrupt(format!(
                "record id {record_id} points at a missing trade"
            ))),
        }
    }

    pub fn find_by_user(
        &self,
        user_id: &str,
        limit: usize,
        offset: usize,
    ) -> Result<(Vec<TradeRecord>, usize), AnchorError> {
        self.paged_scan(&self.user_idx, user_id, limit, offset)
    }

    pub fn find_by_wallet(
        &self,
        wallet_address: &str,
        limit: usize,
        offset: usize,
    ) -> Result<(Vec<TradeRecord>, usize), AnchorError> {
        self.paged_scan(&self.wallet_idx, wallet_address, limit, offset)
    }

    // Index order is verification time descending; invalid paging inputs
    // are normalized rather than rejected.
    fn paged_scan(
        &self,
        index: &Tree,
        submitter: &str,
        limit: usize,
        offset: usize,
    ) -> Result<(Vec<TradeRecord>, usize), AnchorError> {
        let limit = limit.clamp(1, MAX_PAGE_SIZE);

        let mut total = 0usize;
        let mut page = Vec::new();
        for item in index.scan_prefix(index_prefix(submitter)) {
            let (_, hash_key) = item?;
            if total >= offset && page.len() < limit {
                match self.trades.get(&hash_key)? {
                    Some(bytes) => page.push(decode_record(&bytes)?),
                    None => {
                        return Err(AnchorError::StoreCorrupt(
                            "index points at a missing trade".into(),
                        ));
                    }
                }
            }
            total += 1;
        }

        Ok((page, total))
    }

    pub fn count_all(&self) -> usize {
        self.trades.len()
    }

    pub fn count_by_user(&self, user_id: &str) -> usize {
        self.user_idx.scan_prefix(index_prefix(user_id)).count()
    }

    pub fn count_by_wallet(&self, wallet_address: &str) -> usize {
        self.wallet_idx
            .scan_prefix(index_prefix(wallet_address))
            .count()
    }

    /// Full-scan aggregates. `avg_price` is volume-weighted and zero for
    /// an empty store.
    pub fn aggregate_volume(&self) -> Result<VolumeSummary, AnchorError> {
        let mut total_volume = Decimal::ZERO;
        let mut total_quantity = Decimal::ZERO;

        for item in self.trades.iter() {
            let (_, bytes) = item?;
            let record = decode_record(&bytes)?;
            total_volume += record.notional_volume();
            total_quantity += record.quantity;
        }

        let avg_price = if total_quantity > Decimal::ZERO {
            total_volume / total_quantity
        } else {
            Decimal::ZERO
        };

        Ok(VolumeSummary {
            total_volume,
            avg_price,
            total_quantity,
        })
    }
}
