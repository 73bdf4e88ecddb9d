//! Core domain model — the normalized orderbook/trade types every venue
//! adapter converts its wire format into.
//!
//! Venues push heterogeneous, sparse, event-driven updates; this
//! module defines the single internal representation the rest of the
//! pipeline (forward-filler, event processor, sink) operates on, plus the
//! derived-field computation and validation contract for C1.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use thiserror::Error;
use uuid::Uuid;

/// Venue a market/snapshot/trade originated from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Platform {
    Polymarket,
    Kalshi,
}

impl std::fmt::Display for Platform {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Polymarket => write!(f, "polymarket"),
            Self::Kalshi => write!(f, "kalshi"),
        }
    }
}

/// Lifecycle state of a discovered market. Transitions are persisted to
/// `market_state_history` by the event processor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MarketState {
    Discovered,
    Subscribed,
    Active,
    Closed,
    Removed,
}

/// A single tradeable outcome token discovered on a venue.
///
/// Identity is `(listener_id, token_id)`; `condition_id` is intentionally
/// non-unique since one condition can fan out into multiple outcome tokens
/// (a Yes/No pair shares one `condition_id`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Market {
    pub id: Uuid,
    pub listener_id: Uuid,
    pub platform: Platform,
    pub condition_id: String,
    pub token_id: String,
    pub slug: String,
    pub title: String,
    pub category: Option<String>,
    pub series_id: Option<String>,
    pub tags: Vec<String>,
    pub start_time: Option<DateTime<Utc>>,
    pub end_time: Option<DateTime<Utc>>,
    pub is_active: bool,
    pub is_closed: bool,
    pub state: MarketState,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Market {
    /// Identity tuple used for dedup/lookup: `(listener_id, token_id)`.
    pub fn identity(&self) -> (Uuid, &str) {
        (self.listener_id, self.token_id.as_str())
    }

    /// Transition to a new lifecycle state, stamping `updated_at`.
    pub fn transition(&mut self, state: MarketState) {
        self.state = state;
        self.updated_at = Utc::now();
    }
}

/// A single resting order at a price level.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct OrderLevel {
    pub price: Decimal,
    pub size: Decimal,
}

/// Buy/sell side of a trade.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TradeSide {
    Buy,
    Sell,
}

/// Validation failures for C1. The event processor drops the
/// offending record and logs it rather than
/// propagating the error further.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum InvalidSnapshot {
    #[error("bids are not sorted price-descending")]
    BidsNotDescending,
    #[error("asks are not sorted price-ascending")]
    AsksNotAscending,
    #[error("level has non-positive size")]
    NonPositiveSize,
    #[error("level price {0} is outside [0, 1]")]
    PriceOutOfRange(Decimal),
}

/// A normalized, regularly-sampled orderbook snapshot.
///
/// Construct via [`OrderbookSnapshot::new`], which validates the sort
/// invariant and computes all derived fields including the content hash
/// used for emission dedup/audit.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderbookSnapshot {
    pub listener_id: Uuid,
    pub platform: Platform,
    pub asset_id: String,
    pub market_id: Uuid,
    pub timestamp_ms: i64,
    pub bids: Vec<OrderLevel>,
    pub asks: Vec<OrderLevel>,
    pub best_bid: Option<Decimal>,
    pub best_ask: Option<Decimal>,
    pub spread: Option<Decimal>,
    pub mid_price: Option<Decimal>,
    pub bid_depth: Decimal,
    pub ask_depth: Decimal,
    pub hash: String,
    pub raw_payload: Option<String>,
    pub is_forward_filled: bool,
    pub source_timestamp_ms: Option<i64>,
}

fn validate_levels(levels: &[OrderLevel], descending: bool) -> Result<(), InvalidSnapshot> {
    let zero = Decimal::ZERO;
    let one = Decimal::ONE;
    let mut prev: Option<Decimal> = None;
    for level in levels {
        if level.size <= zero {
            return Err(InvalidSnapshot::NonPositiveSize);
        }
        if level.price < zero || level.price > one {
            return Err(InvalidSnapshot::PriceOutOfRange(level.price));
        }
        if let Some(p) = prev {
            let ordered = if descending { level.price <= p } else { level.price >= p };
            if !ordered {
                return Err(if descending {
                        InvalidSnapshot::BidsNotDescending
                    } else {
                        InvalidSnapshot::AsksNotAscending
                    });
            }
        }
        prev = Some(level.price);
    }
    Ok(())
}

/// Canonical content digest over `(bids, asks)`, first 16 hex chars of
/// SHA-256 over a stable serialization. Used for forward-fill dedup and
/// audit, never for security.
fn content_hash(bids: &[OrderLevel], asks: &[OrderLevel]) -> String {
    #[derive(Serialize)]
    struct Canonical<'a> {
        bids: &'a [OrderLevel],
        asks: &'a [OrderLevel],
    }
    let canonical = Canonical { bids, asks };
    // `to_vec` over a struct of Vec<OrderLevel> is stable for a given input
    // order; callers always pass already-sorted sides, so this is a faithful
    // content digest rather than an incidental artifact of insertion order.
    let bytes = serde_json::to_vec(&canonical).unwrap_or_default();
    let digest = Sha256::digest(&bytes);
    hex::encode(digest)[..16].to_string()
}

impl OrderbookSnapshot {
    /// Build a validated snapshot, computing `best_bid`/`best_ask`/`spread`/
    /// `mid_price`/depths/hash from `bids`/`asks` per's contract.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        listener_id: Uuid,
        platform: Platform,
        asset_id: String,
        market_id: Uuid,
        timestamp_ms: i64,
        bids: Vec<OrderLevel>,
        asks: Vec<OrderLevel>,
        raw_payload: Option<String>,
        is_forward_filled: bool,
        source_timestamp_ms: Option<i64>,
    ) -> Result<Self, InvalidSnapshot> {
        validate_levels(&bids, true)?;
        validate_levels(&asks, false)?;

        let best_bid = bids.first().map(|l| l.price);
        let best_ask = asks.first().map(|l| l.price);
        let spread = match (best_bid, best_ask) {
            (Some(b), Some(a)) => Some(a - b),
            _ => None,
        };
        let mid_price = match (best_bid, best_ask) {
            (Some(b), Some(a)) => Some((b + a) / Decimal::TWO),
            _ => None,
        };
        let bid_depth = bids.iter().fold(Decimal::ZERO, |acc, l| acc + l.size);
        let ask_depth = asks.iter().fold(Decimal::ZERO, |acc, l| acc + l.size);
        let hash = content_hash(&bids, &asks);

        Ok(Self {
                listener_id,
                platform,
                asset_id,
                market_id,
                timestamp_ms,
                bids,
                asks,
                best_bid,
                best_ask,
                spread,
                mid_price,
                bid_depth,
                ask_depth,
                hash,
                raw_payload,
                is_forward_filled,
                source_timestamp_ms,
            })
    }

    /// Clone this snapshot as a forward-filled emission at `timestamp_ms`,
    /// preserving provenance via `source_timestamp_ms`.
    pub fn as_forward_fill(&self, timestamp_ms: i64, source_timestamp_ms: Option<i64>) -> Self {
        Self {
            timestamp_ms,
            is_forward_filled: true,
            source_timestamp_ms,
            ..self.clone()
        }
    }
}

/// A normalized trade print.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Trade {
    pub listener_id: Uuid,
    pub platform: Platform,
    pub asset_id: String,
    pub market_id: Uuid,
    pub timestamp_ms: i64,
    pub price: Decimal,
    pub size: Decimal,
    pub side: TradeSide,
    pub fee_rate_bps: u32,
    pub raw_payload: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn lvl(price: Decimal, size: Decimal) -> OrderLevel {
        OrderLevel { price, size }
    }

    #[test]
    fn computes_derived_fields() {
        let snap = OrderbookSnapshot::new(
            Uuid::nil(),
            Platform::Polymarket,
            "T1".into(),
            Uuid::nil(),
            1_700_000_000_000,
            vec![lvl(dec!(0.52), dec!(10)), lvl(dec!(0.51), dec!(20))],
            vec![lvl(dec!(0.53), dec!(15))],
            None,
            false,
            None,
        )
            .unwrap();

        assert_eq!(snap.best_bid, Some(dec!(0.52)));
        assert_eq!(snap.best_ask, Some(dec!(0.53)));
        assert_eq!(snap.spread, Some(dec!(0.01)));
        assert_eq!(snap.mid_price, Some(dec!(0.525)));
        assert_eq!(snap.bid_depth, dec!(30));
        assert_eq!(snap.ask_depth, dec!(15));
        assert!(!snap.is_forward_filled);
    }

    #[test]
    fn empty_sides_yield_null_derived_fields() {
        let snap = OrderbookSnapshot::new(
            Uuid::nil(),
            Platform::Kalshi,
            "T2".into(),
            Uuid::nil(),
            0,
            vec![],
            vec![],
            None,
            false,
            None,
        )
            .unwrap();
        assert_eq!(snap.best_bid, None);
        assert_eq!(snap.best_ask, None);
        assert_eq!(snap.spread, None);
        assert_eq!(snap.mid_price, None);
    }

    #[test]
    fn rejects_non_descending_bids() {
        let err = OrderbookSnapshot::new(
            Uuid::nil(),
            Platform::Polymarket,
            "T1".into(),
            Uuid::nil(),
            0,
            vec![lvl(dec!(0.51), dec!(1)), lvl(dec!(0.52), dec!(1))],
            vec![],
            None,
            false,
            None,
        )
            .unwrap_err();
        assert_eq!(err, InvalidSnapshot::BidsNotDescending);
    }

    #[test]
    fn rejects_price_out_of_range() {
        let err = OrderbookSnapshot::new(
            Uuid::nil(),
            Platform::Polymarket,
            "T1".into(),
            Uuid::nil(),
            0,
            vec![],
            vec![lvl(dec!(1.5), dec!(1))],
            None,
            false,
            None,
        )
            .unwrap_err();
        assert_eq!(err, InvalidSnapshot::PriceOutOfRange(dec!(1.5)));
    }

    #[test]
    fn rejects_non_positive_size() {
        let err = OrderbookSnapshot::new(
            Uuid::nil(),
            Platform::Polymarket,
            "T1".into(),
            Uuid::nil(),
            0,
            vec![lvl(dec!(0.5), dec!(0))],
            vec![],
            None,
            false,
            None,
        )
            .unwrap_err();
        assert_eq!(err, InvalidSnapshot::NonPositiveSize);
    }

    #[test]
    fn hash_stable_for_same_content() {
        let a = OrderbookSnapshot::new(
            Uuid::nil(),
            Platform::Polymarket,
            "T1".into(),
            Uuid::nil(),
            0,
            vec![lvl(dec!(0.5), dec!(1))],
            vec![lvl(dec!(0.6), dec!(1))],
            None,
            false,
            None,
        )
            .unwrap();
        let b = a.as_forward_fill(100, Some(0));
        assert_eq!(a.hash, b.hash);
        assert!(b.is_forward_filled);
        assert_eq!(b.source_timestamp_ms, Some(0));
    }
}
