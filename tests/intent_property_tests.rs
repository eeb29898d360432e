//! Property-based tests for trade intent validation and canonical hashing
//!
//! This module uses the proptest crate to verify that the canonicalizer
//! behaves correctly across a wide range of randomly generated inputs.
//! The hash is the trade's identity on both the ledger and the store, so
//! determinism and validation invariants must hold for ALL inputs, not
//! just specific test cases.

use proptest::prelude::*;
use rust_decimal::Decimal;
use trade_anchor::trade::{Side, TimeStamp, TradeIntent};

// PROPERTY TEST STRATEGIES

/// Strategy to generate random Side values
fn side_strategy() -> impl Strategy<Value = Side> {
    prop::bool::ANY.prop_map(|b| if b { Side::Buy } else { Side::Sell })
}

/// Strategy to generate positive decimals with varying scale
fn positive_decimal_strategy() -> impl Strategy<Value = Decimal> {
    (1i64..=100_000_000i64, 0u32..=6).prop_map(|(mantissa, scale)| Decimal::new(mantissa, scale))
}

/// Strategy to generate plausible trading symbols
fn symbol_strategy() -> impl Strategy<Value = String> {
    prop_oneof![
        Just("BTC/USD".to_string()),
        Just("ETH/USD".to_string()),
        Just("EUR/GBP".to_string()),
        "[A-Z]{3}/[A-Z]{3}",
    ]
}

/// Strategy to generate submission timestamps
fn timestamp_strategy() -> impl Strategy<Value = TimeStamp<chrono::Utc>> {
    (2020i32..=2030, 1u32..=12, 1u32..=28, 0u32..=23, 0u32..=59, 0u32..=59)
        .prop_map(|(y, mo, d, h, mi, s)| TimeStamp::new_with(y, mo, d, h, mi, s))
}

fn valid_intent_strategy() -> impl Strategy<Value = TradeIntent> {
    (
        symbol_strategy(),
        positive_decimal_strategy(),
        positive_decimal_strategy(),
        side_strategy(),
        "[a-z0-9]{1,16}",
        timestamp_strategy(),
    )
        .prop_map(|(symbol, price, quantity, side, user, at)| {
            TradeIntent::new()
                .set_symbol(&symbol)
                .set_price(price)
                .set_quantity(quantity)
                .set_side(side)
                .set_user(&user)
                .set_submitted_at(at)
        })
}

// PROPERTY TESTS
proptest! {
    /// Property: hashing is deterministic, the same intent content
    /// (timestamp included) always yields the identical hash and the
    /// identical canonical bytes.
    #[test]
    fn hash_is_deterministic(intent in valid_intent_strategy()) {
        let (hash_a, bytes_a) = intent.canonical_hash().unwrap();
        let (hash_b, bytes_b) = intent.canonical_hash().unwrap();

        prop_assert_eq!(hash_a, hash_b);
        prop_assert_eq!(bytes_a, bytes_b);
    }

    /// Property: the emitted hash always parses back as a well-formed
    /// 32-byte digest, so it is usable as a ledger and store key.
    #[test]
    fn hash_is_well_formed(intent in valid_intent_strategy()) {
        let (hash, _) = intent.canonical_hash().unwrap();

        prop_assert_eq!(hash.as_str().len(), 64);
        prop_assert!(trade_anchor::trade::TradeHash::parse(hash.as_str()).is_ok());
    }

    /// Property: any non-positive price is rejected before side effects
    /// can occur.
    #[test]
    fn non_positive_price_is_rejected(
        intent in valid_intent_strategy(),
        bad_mantissa in 0i64..=100_000
    ) {
        let bad = intent.set_price(Decimal::new(-bad_mantissa, 2));
        prop_assert!(bad.canonical_hash().is_err());
    }

    /// Property: any non-positive quantity is rejected.
    #[test]
    fn non_positive_quantity_is_rejected(
        intent in valid_intent_strategy(),
        bad_mantissa in 0i64..=100_000
    ) {
        let bad = intent.set_quantity(Decimal::new(-bad_mantissa, 4));
        prop_assert!(bad.canonical_hash().is_err());
    }

    /// Property: a blank symbol is rejected regardless of the rest of the
    /// intent.
    #[test]
    fn blank_symbol_is_rejected(intent in valid_intent_strategy(), spaces in 0usize..=4) {
        let bad = intent.set_symbol(&" ".repeat(spaces));
        prop_assert!(bad.canonical_hash().is_err());
    }

    /// Property: intents that differ in any hashed field produce distinct
    /// hashes; in particular, the same economic terms at a different
    /// instant are a different trade.
    #[test]
    fn different_timestamps_are_different_trades(
        intent in valid_intent_strategy(),
        offset_secs in 1u32..=59
    ) {
        let (original, _) = intent.clone().canonical_hash().unwrap();
        let base = intent.submitted_at.clone().unwrap().to_datetime_utc();
        let shifted = base + chrono::Duration::seconds(offset_secs as i64);
        let (moved, _) = intent
            .set_submitted_at(shifted.into())
            .canonical_hash()
            .unwrap();

        prop_assert_ne!(original, moved);
    }

    /// Property: trailing decimal zeros do not change identity; the
    /// canonical encoding normalizes scale.
    #[test]
    fn decimal_scale_is_canonicalized(
        intent in valid_intent_strategy(),
        mantissa in 1i64..=1_000_000
    ) {
        let plain = intent.clone().set_price(Decimal::new(mantissa, 0));
        let scaled = intent.set_price(Decimal::new(mantissa * 100, 2));

        let (hash_plain, _) = plain.canonical_hash().unwrap();
        let (hash_scaled, _) = scaled.canonical_hash().unwrap();

        prop_assert_eq!(hash_plain, hash_scaled);
    }

    /// Property: Side wire parsing accepts both cases and rejects
    /// anything outside {BUY, SELL}.
    #[test]
    fn side_parse_matches_wire_contract(garbage in "[a-z]{1,8}") {
        prop_assert_eq!(Side::parse("BUY"), Some(Side::Buy));
        prop_assert_eq!(Side::parse("sell"), Some(Side::Sell));
        if garbage != "buy" && garbage != "sell" {
            prop_assert_eq!(Side::parse(&garbage), None);
        }
    }
}
