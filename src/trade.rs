//! Trade intents and canonical content hashing
use crate::error::AnchorError;
use chrono::{DateTime, TimeZone, Utc};
use rust_decimal::Decimal;
use serde::{Serialize, Serializer};

#[derive(minicbor::Encode, minicbor::Decode, Debug, Eq, PartialEq, Clone, Copy)]
#[derive(serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Side {
    #[n(0)]
    Buy,
    #[n(1)]
    Sell,
}

impl Side {
    /// Parse the wire form. Accepts `BUY`/`SELL` in any case.
    pub fn parse(raw: &str) -> Option<Side> {
        match raw.to_ascii_uppercase().as_str() {
            "BUY" => Some(Side::Buy),
            "SELL" => Some(Side::Sell),
            _ => None,
        }
    }
}

/// Fixed-width content digest that is the trade's identity on both the
/// ledger and the store. Hex form of a sha256 over the canonical CBOR
/// encoding of the intent.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TradeHash(String);

impl TradeHash {
    /// Validate an externally supplied hex digest.
    pub fn parse(raw: &str) -> Result<Self, AnchorError> {
        let decoded = hex::decode(raw)
            .map_err(|_| AnchorError::InvalidIntent("trade hash is not hex".into()))?;
        if decoded.len() != 32 {
            return Err(AnchorError::InvalidIntent(
                "trade hash must be a 32-byte digest".into(),
            ));
        }
        Ok(TradeHash(raw.to_ascii_lowercase()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for TradeHash {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl Serialize for TradeHash {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.0)
    }
}

impl<C> minicbor::Encode<C> for TradeHash {
    fn encode<W: minicbor::encode::Write>(
        &self,
        e: &mut minicbor::Encoder<W>,
        _: &mut C,
    ) -> Result<(), minicbor::encode::Error<W::Error>> {
        e.str(&self.0)?.ok()
    }
}

impl<'b, C> minicbor::Decode<'b, C> for TradeHash {
    fn decode(d: &mut minicbor::Decoder<'b>, _: &mut C) -> Result<Self, minicbor::decode::Error> {
        let raw = d.str()?;
        TradeHash::parse(raw).map_err(|_| minicbor::decode::Error::message("malformed trade hash"))
    }
}

#[derive(Debug, Clone)]
pub struct TimeStamp<T: TimeZone>(DateTime<T>);

// Manual impls: deriving would put `PartialEq`/`Ord` bounds on `T`, which
// timezone types like `Utc` don't implement, while `DateTime<T>` is
// comparable for any `T: TimeZone`.
impl<T: TimeZone> PartialEq for TimeStamp<T> {
    fn eq(&self, other: &Self) -> bool {
        self.0 == other.0
    }
}

impl<T: TimeZone> Eq for TimeStamp<T> {}

impl<T: TimeZone> PartialOrd for TimeStamp<T> {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        self.0.partial_cmp(&other.0)
    }
}

impl<T: TimeZone> Ord for TimeStamp<T> {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.0.cmp(&other.0)
    }
}

impl TimeStamp<Utc> {
    pub fn now() -> Self {
        Self(Utc::now())
    }
    pub fn new_with(year: i32, month: u32, day: u32, hour: u32, min: u32, sec: u32) -> Self {
        Utc.with_ymd_and_hms(year, month, day, hour, min, sec)
            .unwrap()
            .into()
    }
    pub fn to_datetime_utc(&self) -> DateTime<Utc> {
        self.0
    }
    /// Nanoseconds since the epoch; the canonical wire unit.
    pub fn as_nanos(&self) -> i64 {
        self.0.timestamp_nanos_opt().unwrap_or_default()
    }
}

impl<T: TimeZone> From<DateTime<T>> for TimeStamp<T> {
    fn from(value: DateTime<T>) -> Self {
        TimeStamp(value)
    }
}

impl<C> minicbor::Encode<C> for TimeStamp<Utc> {
    fn encode<W: minicbor::encode::Write>(
        &self,
        e: &mut minicbor::Encoder<W>,
        _: &mut C,
    ) -> Result<(), minicbor::encode::Error<W::Error>> {
        if let Some(nsec) = self.0.timestamp_nanos_opt() {
            return e.i64(nsec)?.ok();
        }

        Err(minicbor::encode::Error::message(
            "failed to encode timestamp. timestamp_nanos_opt returned None",
        ))
    }
}

impl<'b, C> minicbor::Decode<'b, C> for TimeStamp<Utc> {
    fn decode(d: &mut minicbor::Decoder<'b>, _: &mut C) -> Result<Self, minicbor::decode::Error> {
        let nsecs = d.i64()?;

        Ok(TimeStamp(DateTime::from_timestamp_nanos(nsecs)))
    }
}

impl Serialize for TimeStamp<Utc> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.0.to_rfc3339())
    }
}

/// Canonical CBOR form for decimals: normalized string, so `50000` and
/// `50000.00` hash identically.
pub mod decimal_cbor {
    use rust_decimal::Decimal;
    use std::str::FromStr;

    pub fn encode<Ctx, W: minicbor::encode::Write>(
        v: &Decimal,
        e: &mut minicbor::Encoder<W>,
        _: &mut Ctx,
    ) -> Result<(), minicbor::encode::Error<W::Error>> {
        e.str(&v.normalize().to_string())?.ok()
    }

    pub fn decode<'b, Ctx>(
        d: &mut minicbor::Decoder<'b>,
        _: &mut Ctx,
    ) -> Result<Decimal, minicbor::decode::Error> {
        let raw = d.str()?;
        Decimal::from_str(raw).map_err(|_| minicbor::decode::Error::message("malformed decimal"))
    }
}

pub const ANONYMOUS_USER: &str = "anonymous";

// Also used for constructing drafts by the API layer.
// The trade's identity *is* the hash of this struct encoded into CBOR,
// timestamp included: identical economic terms at different instants are
// distinct trades.
#[derive(minicbor::Encode, minicbor::Decode, Debug, Default, PartialEq, Clone)]
pub struct TradeIntent {
    // No ID field, as the ID *is* the hash of this struct
    #[n(0)]
    pub symbol: Option<String>,
    #[cbor(n(1), with = "crate::trade::decimal_cbor")]
    pub price: Decimal,
    #[cbor(n(2), with = "crate::trade::decimal_cbor")]
    pub quantity: Decimal,
    #[n(3)]
    pub side: Option<Side>,
    #[n(4)]
    pub user_id: Option<String>,
    #[n(5)]
    pub wallet_address: Option<String>,
    #[n(6)]
    pub submitted_at: Option<TimeStamp<Utc>>,
}

impl TradeIntent {
    /// Construct a new builder object, this becomes the basis for a draft
    pub fn new() -> Self {
        Self::default()
    }
    pub fn set_symbol(mut self, symbol: &str) -> Self {
        self.symbol = Some(symbol.to_string());
        self
    }
    pub fn set_price(mut self, price: Decimal) -> Self {
        self.price = price;
        self
    }
    pub fn set_quantity(mut self, quantity: Decimal) -> Self {
        self.quantity = quantity;
        self
    }
    pub fn set_side(mut self, side: Side) -> Self {
        self.side = Some(side);
        self
    }
    pub fn set_user(mut self, user_id: &str) -> Self {
        self.user_id = Some(user_id.to_string());
        self
    }
    pub fn set_wallet(mut self, wallet_address: &str) -> Self {
        self.wallet_address = Some(wallet_address.to_string());
        self
    }
    pub fn set_submitted_at(mut self, at: TimeStamp<Utc>) -> Self {
        self.submitted_at = Some(at);
        self
    }

    /// Submitter identity used for counters and the ledger call. Falls
    /// back to the anonymous user, as the original submission path does.
    pub fn submitter(&self) -> &str {
        self.user_id.as_deref().unwrap_or(ANONYMOUS_USER)
    }

    /// Checks fields, then returns the content hash together with the
    /// canonical CBOR the hash was computed over. Pure: identical intents
    /// (timestamp included) always yield identical output.
    pub fn canonical_hash(&self) -> Result<(TradeHash, Vec<u8>), AnchorError> {
        if self.symbol.as_deref().is_none_or(|s| s.trim().is_empty()) {
            return Err(AnchorError::InvalidIntent("symbol is missing".into()));
        }
        if self.price <= Decimal::ZERO {
            return Err(AnchorError::InvalidIntent(format!(
                "price must be positive, got {}",
                self.price
            )));
        }
        if self.quantity <= Decimal::ZERO {
            return Err(AnchorError::InvalidIntent(format!(
                "quantity must be positive, got {}",
                self.quantity
            )));
        }
        if self.side.is_none() {
            return Err(AnchorError::InvalidIntent("side is missing".into()));
        }
        if self.submitted_at.is_none() {
            return Err(AnchorError::InvalidIntent(
                "submission timestamp is missing".into(),
            ));
        }

        let contents = minicbor::to_vec(self)
            .map_err(|e| AnchorError::InvalidIntent(format!("canonical encoding failed: {e}")))?;
        let hash = TradeHash(sha256::digest(&contents));

        Ok((hash, contents))
    }
}
