//! Venue Adapter port — the capability set every venue
//! implements: `discover`, `connect`, `subscribe`, `unsubscribe`,
//! `next_event`. The event processor and supervisor depend only on this
//! trait, never on Polymarket/Kalshi wire details directly.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use thiserror::Error;

use crate::domain::{Filters, Market, MarketState, OrderLevel, TradeSide};

/// Side of an order-book delta.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BookSide {
    Bid,
    Ask,
}

/// A single level delta from a Polymarket `price_change` message. An
/// absent level receiving this delta is treated as an insert.
#[derive(Debug, Clone, PartialEq)]
pub struct LevelDelta {
    pub side: BookSide,
    pub price: Decimal,
    pub size: Decimal,
}

/// A normalized event yielded by [`Feed::next_event`]. Full replace
/// (`Book`), incremental update (`PriceChange`), or a trade print.
#[derive(Debug, Clone)]
pub enum FeedEvent {
    /// Full-depth snapshot — replaces current state for `asset_id`.
    Book {
        asset_id: String,
        bids: Vec<OrderLevel>,
        asks: Vec<OrderLevel>,
        timestamp_ms: i64,
        raw: Option<String>,
    },
    /// Incremental delta — applied to current state for `asset_id`.
    PriceChange {
        asset_id: String,
        changes: Vec<LevelDelta>,
        timestamp_ms: i64,
        raw: Option<String>,
    },
    /// A trade print.
    Trade {
        asset_id: String,
        price: Decimal,
        size: Decimal,
        side: TradeSide,
        fee_rate_bps: u32,
        timestamp_ms: i64,
        raw: Option<String>,
    },
    /// Adapter-internal lifecycle hint (e.g. a venue-side market state
    /// change) — routed to `control_queue` rather than `data_queue`.
    MarketStateHint {
        token_id: String,
        state: MarketState,
        changed_at: DateTime<Utc>,
    },
}

/// Error taxonomy a venue adapter surfaces to its caller.
///
/// `Transient`/`RateLimited` are retried by the caller with backoff and
/// never propagate further up. `Auth` is fatal for the listener. `Protocol`
/// means a single malformed record — the caller drops it and continues.
#[derive(Debug, Error)]
pub enum VenueError {
    #[error("transient I/O error: {0}")]
    Transient(String),
    #[error("protocol violation: {0}")]
    Protocol(String),
    #[error("authentication failed: {0}")]
    Auth(String),
    #[error("rate limited, retry after {retry_after_ms}ms")]
    RateLimited { retry_after_ms: u64 },
}

/// Discovery side of the capability set: REST polling for markets matching
/// `filters`.
#[async_trait]
pub trait Discoverer: Send + Sync {
    async fn discover(&self, filters: &Filters) -> Result<Vec<Market>, VenueError>;
}

/// Streaming side of the capability set. Implementors own their connection
/// internally (behind interior mutability) — `&self` methods let adapters
/// be shared via `Arc` across the supervisor's tasks.
#[async_trait]
pub trait Feed: Send + Sync {
    /// Open the underlying connection. Must be callable again after a
    /// disconnect to reconnect.
    async fn connect(&self) -> Result<(), VenueError>;

    /// Subscribe to a set of tokens on the current connection.
    async fn subscribe(&self, token_ids: &[String]) -> Result<(), VenueError>;

    /// Unsubscribe a set of tokens on the current connection.
    async fn unsubscribe(&self, token_ids: &[String]) -> Result<(), VenueError>;

    /// Await the next normalized event. Returns `Err(VenueError::Transient)`
    /// on disconnect so the caller can reconnect with backoff.
    async fn next_event(&self) -> Result<FeedEvent, VenueError>;
}

/// Convenience bundle the supervisor constructs per venue.
pub trait VenueAdapter: Discoverer + Feed {}
impl<T: Discoverer + Feed> VenueAdapter for T {}
