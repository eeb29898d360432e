//! Unit tests for the trade store and the aggregate updater
//!
//! These tests span the persistence layer in isolation from the
//! verification pipeline: hash uniqueness, index ordering, pagination
//! clamping, aggregates, and counter atomicity.
#![allow(unused_imports)]

use rust_decimal::Decimal;
use std::str::FromStr;
use tempfile::tempdir;
use trade_anchor::counters::{AggregateUpdater, user_key, wallet_key};
use trade_anchor::error::AnchorError;
use trade_anchor::ledger::LedgerReceipt;
use trade_anchor::store::{MAX_PAGE_SIZE, TradeRecord, TradeStore};
use trade_anchor::trade::{Side, TimeStamp, TradeHash, TradeIntent};

fn open_store(name: &str) -> (TradeStore, AggregateUpdater, tempfile::TempDir) {
    let temp_dir = tempdir().unwrap();
    let db = sled::open(temp_dir.path().join(name)).unwrap();
    let store = TradeStore::open(&db).unwrap();
    let counters = AggregateUpdater::open(&db).unwrap();
    (store, counters, temp_dir)
}

fn record_at(user: &str, wallet: Option<&str>, tag: u32, at: TimeStamp<chrono::Utc>) -> TradeRecord {
    let intent = TradeIntent::new()
        .set_symbol("BTC/USD")
        .set_price(Decimal::from(50_000 + tag))
        .set_quantity(Decimal::ONE)
        .set_side(Side::Buy)
        .set_user(user)
        .set_submitted_at(at.clone());
    let (hash, _) = intent.canonical_hash().unwrap();

    let mut record = TradeRecord::from_verified(
        hash.clone(),
        &intent,
        &LedgerReceipt {
            trade_hash: hash.as_str().to_string(),
            transaction_hash: format!("0xtx{tag}"),
            block_number: tag as u64 + 1,
            gas_used: 21_000,
        },
    )
    .unwrap();
    record.wallet_address = wallet.map(str::to_string);
    record.verified_at = at;
    record
}

// STORE TESTS
mod store_tests {
    use super::*;

    /// Inserting the same hash twice must fail with DuplicateTrade and
    /// leave exactly one record behind.
    #[test]
    fn insert_enforces_hash_uniqueness() {
        let (store, _, _guard) = open_store("uniqueness");
        let record = record_at("u1", None, 0, TimeStamp::now());

        store.insert(&record).unwrap();
        let second = store.insert(&record);

        assert!(matches!(second, Err(AnchorError::DuplicateTrade(_))));
        assert_eq!(store.count_all(), 1);
    }

    #[test]
    fn find_by_hash_roundtrips_the_record() {
        let (store, _, _guard) = open_store("roundtrip");
        let record = record_at("u1", Some("addr1"), 0, TimeStamp::now());
        store.insert(&record).unwrap();

        let found = store.find_by_hash(&record.trade_hash).unwrap().unwrap();
        assert_eq!(found, record);

        let by_id = store.find_by_id(&record.record_id).unwrap().unwrap();
        assert_eq!(by_id, record);
    }

    #[test]
    fn find_by_id_misses_cleanly() {
        let (store, _, _guard) = open_store("miss");
        assert!(store.find_by_id("nope").unwrap().is_none());
    }

    /// Records come back ordered by verification time descending, newest
    /// first, regardless of insertion order.
    #[test]
    fn user_history_is_time_descending() {
        let (store, _, _guard) = open_store("ordering");

        let oldest = record_at("u1", None, 0, TimeStamp::new_with(2024, 1, 1, 9, 0, 0));
        let newest = record_at("u1", None, 1, TimeStamp::new_with(2024, 1, 3, 9, 0, 0));
        let middle = record_at("u1", None, 2, TimeStamp::new_with(2024, 1, 2, 9, 0, 0));

        // deliberately out of order
        store.insert(&middle).unwrap();
        store.insert(&oldest).unwrap();
        store.insert(&newest).unwrap();

        let (records, total) = store.find_by_user("u1", 10, 0).unwrap();
        assert_eq!(total, 3);
        assert_eq!(records[0].record_id, newest.record_id);
        assert_eq!(records[1].record_id, middle.record_id);
        assert_eq!(records[2].record_id, oldest.record_id);
    }

    #[test]
    fn pagination_clamps_invalid_inputs() {
        let (store, _, _guard) = open_store("clamping");
        for i in 0..3u32 {
            let at = TimeStamp::new_with(2024, 2, 1, 10, 0, i);
            store.insert(&record_at("u1", None, i, at)).unwrap();
        }

        // zero limit normalizes to one record, not an error
        let (records, total) = store.find_by_user("u1", 0, 0).unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(total, 3);

        // oversized limit clamps to the maximum
        let (records, _) = store.find_by_user("u1", MAX_PAGE_SIZE * 10, 0).unwrap();
        assert_eq!(records.len(), 3);

        // offset past the end yields an empty page with the true total
        let (records, total) = store.find_by_user("u1", 10, 50).unwrap();
        assert!(records.is_empty());
        assert_eq!(total, 3);
    }

    #[test]
    fn wallet_index_only_tracks_wallet_records() {
        let (store, _, _guard) = open_store("wallet_idx");
        let with_wallet = record_at("u1", Some("addr1"), 0, TimeStamp::now());
        let without_wallet = record_at("u2", None, 1, TimeStamp::now());

        store.insert(&with_wallet).unwrap();
        store.insert(&without_wallet).unwrap();

        let (records, total) = store.find_by_wallet("addr1", 10, 0).unwrap();
        assert_eq!(total, 1);
        assert_eq!(records[0].record_id, with_wallet.record_id);
        assert_eq!(store.count_by_wallet("addr1"), 1);
        assert_eq!(store.count_by_user("u1"), 1);
        assert_eq!(store.count_by_user("u2"), 1);
    }

    /// Submitter prefixes must not bleed into each other: "u1" pages never
    /// include "u10" records.
    #[test]
    fn index_prefixes_do_not_collide() {
        let (store, _, _guard) = open_store("prefixes");
        store
            .insert(&record_at("u1", None, 0, TimeStamp::now()))
            .unwrap();
        store
            .insert(&record_at("u10", None, 1, TimeStamp::now()))
            .unwrap();

        let (_, total_u1) = store.find_by_user("u1", 10, 0).unwrap();
        let (_, total_u10) = store.find_by_user("u10", 10, 0).unwrap();
        assert_eq!(total_u1, 1);
        assert_eq!(total_u10, 1);
    }

    #[test]
    fn aggregate_volume_is_volume_weighted() {
        let (store, _, _guard) = open_store("aggregates");

        // empty store: all aggregates zero, no division by zero
        let empty = store.aggregate_volume().unwrap();
        assert_eq!(empty.total_volume, Decimal::ZERO);
        assert_eq!(empty.avg_price, Decimal::ZERO);

        let mut a = record_at("u1", None, 0, TimeStamp::new_with(2024, 3, 1, 0, 0, 0));
        a.price = Decimal::from(100);
        a.quantity = Decimal::from(2);
        let mut b = record_at("u1", None, 1, TimeStamp::new_with(2024, 3, 1, 0, 0, 1));
        b.price = Decimal::from(200);
        b.quantity = Decimal::from(1);

        store.insert(&a).unwrap();
        store.insert(&b).unwrap();

        let summary = store.aggregate_volume().unwrap();
        assert_eq!(summary.total_volume, Decimal::from(400));
        assert_eq!(summary.total_quantity, Decimal::from(3));
        // 400 / 3 quantity-weighted
        assert_eq!(
            summary.avg_price,
            Decimal::from(400) / Decimal::from(3)
        );
    }
}

// COUNTER TESTS
mod counter_tests {
    use super::*;

    #[test]
    fn first_activity_creates_counters() {
        let (_, counters, _guard) = open_store("counter_create");

        assert!(counters.get(&user_key("u1")).unwrap().is_none());

        let merged = counters
            .record_activity(&user_key("u1"), Decimal::from(100), Decimal::from(3))
            .unwrap();
        assert_eq!(merged.trade_count, 1);
        assert_eq!(merged.total_volume, Decimal::from(300));
    }

    #[test]
    fn counters_are_monotonic_per_key() {
        let (_, counters, _guard) = open_store("counter_monotonic");
        let key = wallet_key("addr1");

        counters
            .record_activity(&key, Decimal::from(10), Decimal::from(1))
            .unwrap();
        let merged = counters
            .record_activity(&key, Decimal::from_str("0.5").unwrap(), Decimal::from(4))
            .unwrap();

        assert_eq!(merged.trade_count, 2);
        assert_eq!(merged.total_volume, Decimal::from(12));

        // distinct submitter keys never contend or mix
        assert!(counters.get(&user_key("addr1")).unwrap().is_none());
    }

    /// No lost updates: concurrent increments for the same submitter all
    /// land, matching the atomic-merge contract.
    #[test]
    fn concurrent_increments_are_not_lost() {
        let (_, counters, _guard) = open_store("counter_concurrent");
        let counters = std::sync::Arc::new(counters);

        let threads = 8;
        let per_thread = 25;
        let mut handles = Vec::new();
        for _ in 0..threads {
            let counters = counters.clone();
            handles.push(std::thread::spawn(move || {
                for _ in 0..per_thread {
                    counters
                        .record_activity(&user_key("u1"), Decimal::from(2), Decimal::from(5))
                        .unwrap();
                }
            }));
        }
        for handle in handles {
            handle.join().unwrap();
        }

        let merged = counters.get(&user_key("u1")).unwrap().unwrap();
        assert_eq!(merged.trade_count, (threads * per_thread) as u64);
        assert_eq!(
            merged.total_volume,
            Decimal::from(10 * threads * per_thread)
        );
    }
}
