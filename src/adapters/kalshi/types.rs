//! Kalshi wire types — authenticated REST discovery and WebSocket feed
//! messages.

use serde::{Deserialize, Serialize};

/// A single Kalshi market as returned by `GET /markets`.
#[derive(Debug, Clone, Deserialize)]
pub struct KalshiMarket {
    pub ticker: String,
    pub event_ticker: String,
    #[serde(default)]
    pub series_ticker: Option<String>,
    pub title: String,
    pub status: String,
    #[serde(default)]
    pub volume: Option<f64>,
    #[serde(default)]
    pub open_interest: Option<f64>,
    #[serde(default)]
    pub open_time: Option<String>,
    #[serde(default)]
    pub close_time: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct KalshiMarketsResponse {
    #[serde(default)]
    pub markets: Vec<KalshiMarket>,
    #[serde(default)]
    pub cursor: Option<String>,
}

/// Client-initiated subscribe/unsubscribe command.
#[derive(Debug, Clone, Serialize)]
pub struct CommandMessage {
    pub id: u64,
    pub cmd: &'static str,
    pub params: CommandParams,
}

#[derive(Debug, Clone, Serialize)]
pub struct CommandParams {
    pub channels: Vec<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub market_tickers: Option<Vec<String>>,
}

impl CommandMessage {
    pub fn subscribe(id: u64, market_tickers: Vec<String>) -> Self {
        Self {
            id,
            cmd: "subscribe",
            params: CommandParams {
                channels: vec!["orderbook_delta", "trade"],
                market_tickers: Some(market_tickers),
            },
        }
    }

    pub fn unsubscribe(id: u64, market_tickers: Vec<String>) -> Self {
        Self {
            id,
            cmd: "unsubscribe",
            params: CommandParams {
                channels: vec!["orderbook_delta", "trade"],
                market_tickers: Some(market_tickers),
            },
        }
    }
}

/// `[price_cents, size]` pair as sent in `orderbook_snapshot`.
pub type WireLevel = [i64; 2];

#[derive(Debug, Clone, Deserialize)]
pub struct KalshiOrderbookSnapshot {
    pub market_ticker: String,
    #[serde(default)]
    pub yes: Vec<WireLevel>,
    #[serde(default)]
    pub no: Vec<WireLevel>,
    #[serde(default)]
    pub ts: Option<i64>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct KalshiOrderbookDelta {
    pub market_ticker: String,
    pub price: i64,
    pub delta: i64,
    pub side: String,
    #[serde(default)]
    pub ts: Option<i64>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct KalshiTrade {
    pub market_ticker: String,
    pub yes_price: i64,
    #[serde(default)]
    pub no_price: Option<i64>,
    pub count: i64,
    pub taker_side: String,
    #[serde(default)]
    pub ts: Option<i64>,
}
