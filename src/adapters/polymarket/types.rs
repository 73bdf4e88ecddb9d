//! Polymarket wire types — Gamma REST discovery payloads and CLOB
//! WebSocket feed messages.

use serde::Deserialize;

/// A Gamma `event`, joined with its embedded markets for series/tag
/// filtering.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GammaEvent {
    pub id: String,
    pub slug: String,
    pub title: String,
    #[serde(default)]
    pub tags: Vec<GammaTag>,
    pub series_id: Option<String>,
    #[serde(default)]
    pub markets: Vec<GammaMarket>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct GammaTag {
    pub id: String,
    #[serde(default)]
    pub label: Option<String>,
}

/// A Gamma `market` — one per condition. `clob_token_ids` and `outcomes`
/// arrive as JSON-encoded array *strings*, not native arrays, matching the
/// live API; one outcome token yields one normalized [`Market`](crate::domain::Market).
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GammaMarket {
    pub condition_id: String,
    pub question: String,
    pub slug: String,
    #[serde(default)]
    pub clob_token_ids: Option<String>,
    #[serde(default)]
    pub outcomes: Option<String>,
    pub liquidity_num: Option<f64>,
    pub volume_num: Option<f64>,
    pub start_date: Option<String>,
    pub end_date: Option<String>,
    #[serde(default)]
    pub active: bool,
    #[serde(default)]
    pub closed: bool,
    pub category: Option<String>,
}

/// Top-level Gamma `/events` response: paginated array of events.
pub type GammaEventsResponse = Vec<GammaEvent>;

/// Subscribe/unsubscribe payload for the CLOB market WebSocket.
#[derive(Debug, Clone, serde::Serialize)]
pub struct SubscribePayload {
    pub assets_ids: Vec<String>,
    #[serde(rename = "type")]
    pub kind: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub operation: Option<&'static str>,
}

impl SubscribePayload {
    pub fn subscribe(asset_ids: Vec<String>) -> Self {
        Self { assets_ids: asset_ids, kind: "market", operation: None }
    }

    pub fn unsubscribe(asset_ids: Vec<String>) -> Self {
        Self { assets_ids: asset_ids, kind: "market", operation: Some("unsubscribe") }
    }
}

/// A `[price, size]` pair as sent by the CLOB feed — both strings.
pub type WireLevel = [String; 2];

/// Raw CLOB WebSocket message, discriminated by `event_type`. Fields are
/// a union of all three message shapes; unused ones are `None` depending
/// on `event_type`.
#[derive(Debug, Clone, Deserialize)]
pub struct WsEvent {
    pub event_type: String,
    #[serde(default)]
    pub asset_id: String,
    #[serde(default)]
    pub market: String,
    #[serde(default)]
    pub bids: Vec<WireLevel>,
    #[serde(default)]
    pub asks: Vec<WireLevel>,
    #[serde(default)]
    pub changes: Vec<WsPriceChangeLevel>,
    pub price: Option<String>,
    pub size: Option<String>,
    pub side: Option<String>,
    pub fee_rate_bps: Option<String>,
    pub timestamp: Option<String>,
}

/// A single level delta inside a `price_change` message.
#[derive(Debug, Clone, Deserialize)]
pub struct WsPriceChangeLevel {
    pub price: String,
    pub size: String,
    pub side: String,
}
