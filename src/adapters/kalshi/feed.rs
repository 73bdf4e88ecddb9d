//! Kalshi WebSocket feed adapter. Kalshi only streams the Yes
//! side plus reflected No levels; this adapter reconstructs a full
//! two-sided book per ticker and emits a normalized [`FeedEvent::Book`]
//! on every snapshot/delta apply.

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use rust_decimal::Decimal;
use tokio::net::TcpStream;
use tokio::sync::Mutex;
use tokio_tungstenite::tungstenite::handshake::client::generate_key;
use tokio_tungstenite::tungstenite::http::Request;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};
use tracing::{instrument, warn};

use crate::domain::{OrderLevel, TradeSide};
use crate::ports::venue::{Feed, FeedEvent, VenueError};

use super::auth::{KalshiAuth, WS_PATH};
use super::types::{CommandMessage, KalshiOrderbookDelta, KalshiOrderbookSnapshot, KalshiTrade};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

const IDLE_TIMEOUT: Duration = Duration::from_secs(30);

/// Reconstructed per-ticker book: raw cents → size maps for both sides.
#[derive(Default)]
struct LocalBook {
    yes: BTreeMap<i64, i64>,
    no: BTreeMap<i64, i64>,
}

impl LocalBook {
    fn apply_snapshot(&mut self, snapshot: &KalshiOrderbookSnapshot) {
        self.yes.clear();
        self.no.clear();
        for [price, size] in &snapshot.yes {
            if *size > 0 {
                self.yes.insert(*price, *size);
            }
        }
        for [price, size] in &snapshot.no {
            if *size > 0 {
                self.no.insert(*price, *size);
            }
        }
    }

    fn apply_delta(&mut self, delta: &KalshiOrderbookDelta) {
        let book = match delta.side.as_str() {
            "yes" => &mut self.yes,
            "no" => &mut self.no,
            _ => return,
        };
        let current = book.get(&delta.price).copied().unwrap_or(0);
        let updated = current + delta.delta;
        if updated <= 0 {
            book.remove(&delta.price);
        } else {
            book.insert(delta.price, updated);
        }
    }

    /// Normalize into `(bids, asks)` per: bids are the Yes side
    /// descending, asks are the No side reflected (`100 - price_cents`)
    /// and re-sorted ascending. Cents in `[0, 100]` map cleanly into
    /// `[0.0, 1.0]` without needing an explicit clamp.
    fn normalize(&self) -> (Vec<OrderLevel>, Vec<OrderLevel>) {
        let bids = self
            .yes
            .iter()
            .rev()
            .map(|(&cents, &size)| OrderLevel {
                price: Decimal::from(cents) / Decimal::ONE_HUNDRED,
                size: Decimal::from(size),
            })
                .collect();
        let asks = self
            .no
            .iter()
            .rev()
            .map(|(&cents, &size)| OrderLevel {
                price: (Decimal::ONE_HUNDRED - Decimal::from(cents)) / Decimal::ONE_HUNDRED,
                size: Decimal::from(size),
            })
                .collect();
        (bids, asks)
    }
}

struct Connection {
    write: SplitSink<WsStream, Message>,
    read: SplitStream<WsStream>,
}

pub struct KalshiFeed {
    ws_url: String,
    auth: Option<KalshiAuth>,
    conn: Mutex<Option<Connection>>,
    books: Mutex<HashMap<String, LocalBook>>,
    next_cmd_id: AtomicU64,
}

impl KalshiFeed {
    pub fn new(ws_url: String, auth: Option<KalshiAuth>) -> Self {
        Self {
            ws_url,
            auth,
            conn: Mutex::new(None),
            books: Mutex::new(HashMap::new()),
            next_cmd_id: AtomicU64::new(1),
        }
    }

    async fn send_command(&self, cmd: CommandMessage) -> Result<(), VenueError> {
        let mut guard = self.conn.lock().await;
        let conn = guard
            .as_mut()
            .ok_or_else(|| VenueError::Transient("not connected".into()))?;
        let body = serde_json::to_string(&cmd).map_err(|e| VenueError::Protocol(e.to_string()))?;
        conn.write
            .send(Message::Text(body))
            .await
            .map_err(|e| VenueError::Transient(e.to_string()))
    }

    fn next_id(&self) -> u64 {
        self.next_cmd_id.fetch_add(1, Ordering::Relaxed)
    }
}

#[async_trait]
impl Feed for KalshiFeed {
    #[instrument(skip(self))]
    async fn connect(&self) -> Result<(), VenueError> {
        let mut request = Request::builder()
            .uri(&self.ws_url)
            .header("Host", "api.elections.kalshi.com")
            .header("Connection", "Upgrade")
            .header("Upgrade", "websocket")
            .header("Sec-WebSocket-Version", "13")
            .header("Sec-WebSocket-Key", generate_key());

        if let Some(auth) = &self.auth {
            let headers = auth.sign(Utc::now().timestamp_millis(), "GET", WS_PATH);
            request = request
                .header("KALSHI-ACCESS-KEY", headers.key)
                .header("KALSHI-ACCESS-TIMESTAMP", headers.timestamp)
                .header("KALSHI-ACCESS-SIGNATURE", headers.signature);
        }

        let request = request
            .body(())
            .map_err(|e| VenueError::Protocol(e.to_string()))?;

        let (stream, _resp) = tokio_tungstenite::connect_async(request)
            .await
            .map_err(|e| VenueError::Transient(e.to_string()))?;
        let (write, read) = stream.split();
        *self.conn.lock().await = Some(Connection { write, read });
        self.books.lock().await.clear();
        Ok(())
    }

    async fn subscribe(&self, token_ids: &[String]) -> Result<(), VenueError> {
        let id = self.next_id();
        self.send_command(CommandMessage::subscribe(id, token_ids.to_vec())).await
    }

    async fn unsubscribe(&self, token_ids: &[String]) -> Result<(), VenueError> {
        let id = self.next_id();
        self.send_command(CommandMessage::unsubscribe(id, token_ids.to_vec())).await
    }

    async fn next_event(&self) -> Result<FeedEvent, VenueError> {
        loop {
            let next = {
                let mut guard = self.conn.lock().await;
                let conn = guard
                    .as_mut()
                    .ok_or_else(|| VenueError::Transient("not connected".into()))?;
                tokio::time::timeout(IDLE_TIMEOUT, conn.read.next()).await
            };

            let msg = match next {
                Ok(Some(Ok(msg))) => msg,
                Ok(Some(Err(e))) => return Err(VenueError::Transient(e.to_string())),
                Ok(None) => return Err(VenueError::Transient("connection closed".into())),
                Err(_) => return Err(VenueError::Transient("idle timeout".into())),
            };

            let text = match msg {
                Message::Text(text) => text,
                Message::Ping(payload) => {
                    let mut guard = self.conn.lock().await;
                    if let Some(conn) = guard.as_mut() {
                        let _ = conn.write.send(Message::Pong(payload)).await;
                    }
                    continue;
                }
                Message::Close(_) => return Err(VenueError::Transient("server closed".into())),
                _ => continue,
            };

            let raw: serde_json::Value = match serde_json::from_str(&text) {
                Ok(v) => v,
                Err(e) => {
                    warn!(error = %e, "dropping unparseable Kalshi frame");
                    continue;
                }
            };
            let Some(msg_type) = raw.get("type").and_then(|t| t.as_str()) else {
                continue;
            };

            match msg_type {
                "orderbook_snapshot" => {
                    let snapshot: KalshiOrderbookSnapshot = match serde_json::from_value(raw) {
                        Ok(s) => s,
                        Err(e) => {
                            warn!(error = %e, "malformed orderbook_snapshot");
                            continue;
                        }
                    };
                    let ticker = snapshot.market_ticker.clone();
                    let timestamp_ms = snapshot.ts.map(|s| s * 1_000).unwrap_or_else(|| Utc::now().timestamp_millis());
                    let mut books = self.books.lock().await;
                    let book = books.entry(ticker.clone()).or_default();
                    book.apply_snapshot(&snapshot);
                    let (bids, asks) = book.normalize();
                    return Ok(FeedEvent::Book {
                            asset_id: ticker,
                            bids,
                            asks,
                            timestamp_ms,
                            raw: Some(text),
                        });
                }
                "orderbook_delta" => {
                    let delta: KalshiOrderbookDelta = match serde_json::from_value(raw) {
                        Ok(d) => d,
                        Err(e) => {
                            warn!(error = %e, "malformed orderbook_delta");
                            continue;
                        }
                    };
                    let ticker = delta.market_ticker.clone();
                    let timestamp_ms = delta.ts.map(|s| s * 1_000).unwrap_or_else(|| Utc::now().timestamp_millis());
                    let mut books = self.books.lock().await;
                    let book = books.entry(ticker.clone()).or_default();
                    book.apply_delta(&delta);
                    let (bids, asks) = book.normalize();
                    return Ok(FeedEvent::Book {
                            asset_id: ticker,
                            bids,
                            asks,
                            timestamp_ms,
                            raw: Some(text),
                        });
                }
                "trade" => {
                    let trade: KalshiTrade = match serde_json::from_value(raw) {
                        Ok(t) => t,
                        Err(e) => {
                            warn!(error = %e, "malformed trade");
                            continue;
                        }
                    };
                    let timestamp_ms = trade.ts.map(|s| s * 1_000).unwrap_or_else(|| Utc::now().timestamp_millis());
                    let side = match trade.taker_side.as_str() {
                        "yes" => TradeSide::Buy,
                        _ => TradeSide::Sell,
                    };
                    let price = Decimal::from(trade.yes_price) / Decimal::ONE_HUNDRED;
                    return Ok(FeedEvent::Trade {
                            asset_id: trade.market_ticker.clone(),
                            price,
                            size: Decimal::from(trade.count),
                            side,
                            fee_rate_bps: 0,
                            timestamp_ms,
                            raw: Some(text),
                        });
                }
                _ => continue,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn normalizes_yes_no_snapshot_into_bid_ask() {
        let mut book = LocalBook::default();
        book.apply_snapshot(&KalshiOrderbookSnapshot {
                market_ticker: "T1".into(),
                yes: vec![[50, 100]],
                no: vec![[40, 150]],
                ts: Some(1_700_000_000),
            });
        let (bids, asks) = book.normalize();
        assert_eq!(bids, vec![OrderLevel { price: dec!(0.50), size: dec!(100) }]);
        assert_eq!(asks, vec![OrderLevel { price: dec!(0.60), size: dec!(150) }]);
    }

    #[test]
    fn delta_removes_level_at_zero_size() {
        let mut book = LocalBook::default();
        book.apply_snapshot(&KalshiOrderbookSnapshot {
                market_ticker: "T1".into(),
                yes: vec![[50, 100]],
                no: vec![],
                ts: None,
            });
        book.apply_delta(&KalshiOrderbookDelta {
                market_ticker: "T1".into(),
                price: 50,
                delta: -100,
                side: "yes".into(),
                ts: None,
            });
        let (bids, _) = book.normalize();
        assert!(bids.is_empty());
    }

    #[test]
    fn bids_sorted_descending_asks_ascending_with_multiple_levels() {
        let mut book = LocalBook::default();
        book.apply_snapshot(&KalshiOrderbookSnapshot {
                market_ticker: "T1".into(),
                yes: vec![[40, 10], [55, 20]],
                no: vec![[30, 5], [45, 8]],
                ts: None,
            });
        let (bids, asks) = book.normalize();
        assert_eq!(bids[0].price, dec!(0.55));
        assert_eq!(bids[1].price, dec!(0.40));
        assert_eq!(asks[0].price, dec!(0.55));
        assert_eq!(asks[1].price, dec!(0.70));
    }
}
