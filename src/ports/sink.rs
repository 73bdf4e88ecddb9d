//! Sink port — the persistence boundary. The actual storage
//! backend is out of scope: this crate defines the contract and a
//! batching/retrying implementation generic over a pluggable
//! [`RecordWriter`] (see `adapters::sink`).

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;
use uuid::Uuid;

use crate::domain::{Market, MarketState, OrderbookSnapshot, Trade};

/// One of the four record kinds flowing C2→C4→C7.
#[derive(Debug, Clone)]
pub enum SinkRecord {
    Market(Market),
    MarketStateChange {
        listener_id: Uuid,
        token_id: String,
        market_id: Uuid,
        from: Option<MarketState>,
        to: MarketState,
        changed_at: DateTime<Utc>,
    },
    Snapshot(OrderbookSnapshot),
    Trade(Trade),
}

impl SinkRecord {
    /// Logical table name, used for per-table batching.
    pub fn table(&self) -> &'static str {
        match self {
            SinkRecord::Market(_) => "markets",
            SinkRecord::MarketStateChange {.. } => "market_state_history",
            SinkRecord::Snapshot(_) => "orderbook_snapshots",
            SinkRecord::Trade(_) => "trades",
        }
    }
}

/// Errors surfaced by a [`Sink`]. A persistent failure (retry budget
/// exhausted) is logged fatal for that batch and the pipeline continues
///.
#[derive(Debug, Error)]
pub enum SinkError {
    #[error("sink is shutting down")]
    Closed,
    #[error("persistent write failure after retry budget exhausted: {0}")]
    PersistentFailure(String),
}

/// The persistence boundary. `append` is non-blocking (enqueues into an
/// internal buffer); `flush` blocks until all buffered records are durably
/// written or dropped per the retry budget.
#[async_trait]
pub trait Sink: Send + Sync {
    /// Enqueue a record for batched write. Never blocks on I/O.
    fn append(&self, record: SinkRecord) -> Result<(), SinkError>;

    /// Block until every buffered record has been flushed (or dropped after
    /// exhausting retries).
    async fn flush(&self) -> Result<(), SinkError>;

    /// Whether the sink can currently accept and eventually persist data.
    async fn is_healthy(&self) -> bool;
}
