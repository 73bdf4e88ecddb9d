//! Polymarket CLOB WebSocket feed adapter. One physical
//! connection multiplexes every subscribed asset; `next_event` is the
//! event processor's only way to pull normalized events out of it.

use std::str::FromStr;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use rust_decimal::Decimal;
use tokio::net::TcpStream;
use tokio::sync::Mutex;
use tokio::time::{interval, Instant, Interval, MissedTickBehavior};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};
use tracing::{instrument, warn};

use crate::domain::{OrderLevel, TradeSide};
use crate::ports::venue::{BookSide, Feed, FeedEvent, LevelDelta, VenueError};

use super::types::{SubscribePayload, WireLevel, WsEvent};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// How often we send a client ping to keep the connection alive and detect
/// a silently-dead socket.
const PING_INTERVAL: Duration = Duration::from_secs(5);
/// No message (including our own pings' pongs) for this long means the
/// connection is broken.
const IDLE_TIMEOUT: Duration = Duration::from_secs(30);

fn new_ping_ticker() -> Interval {
    let mut ticker = interval(PING_INTERVAL);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    ticker
}

fn parse_level(level: &WireLevel) -> Option<OrderLevel> {
    let price = Decimal::from_str(&level[0]).ok()?;
    let size = Decimal::from_str(&level[1]).ok()?;
    Some(OrderLevel { price, size })
}

fn parse_timestamp(ts: &Option<String>) -> i64 {
    ts.as_deref()
        .and_then(|s| s.parse::<i64>().ok())
        .unwrap_or_else(|| Utc::now().timestamp_millis())
}

/// Decode one raw CLOB WebSocket text frame into a normalized [`FeedEvent`].
/// Unrecognized `event_type`s are dropped as a protocol violation.
fn decode_event(raw: &str) -> Result<FeedEvent, VenueError> {
    let ws_event: WsEvent =
    serde_json::from_str(raw).map_err(|e| VenueError::Protocol(e.to_string()))?;

    let timestamp_ms = parse_timestamp(&ws_event.timestamp);

    match ws_event.event_type.as_str() {
        "book" => {
            let bids = ws_event.bids.iter().filter_map(parse_level).collect();
            let asks = ws_event.asks.iter().filter_map(parse_level).collect();
            Ok(FeedEvent::Book {
                    asset_id: ws_event.asset_id.clone(),
                    bids,
                    asks,
                    timestamp_ms,
                    raw: Some(raw.to_string()),
                })
        }
        "price_change" => {
            let changes = ws_event
                .changes
                .iter()
                .filter_map(|c| {
                    let price = Decimal::from_str(&c.price).ok()?;
                    let size = Decimal::from_str(&c.size).ok()?;
                    let side = match c.side.to_ascii_uppercase().as_str() {
                        "BUY" => BookSide::Bid,
                        "SELL" => BookSide::Ask,
                        _ => return None,
                    };
                    Some(LevelDelta { side, price, size })
                })
                    .collect();
            Ok(FeedEvent::PriceChange {
                    asset_id: ws_event.asset_id.clone(),
                    changes,
                    timestamp_ms,
                    raw: Some(raw.to_string()),
                })
        }
        "last_trade_price" => {
            let price = ws_event
                .price
                .as_deref()
                .and_then(|p| Decimal::from_str(p).ok())
                .ok_or_else(|| VenueError::Protocol("trade missing price".into()))?;
            let size = ws_event
                .size
                .as_deref()
                .and_then(|s| Decimal::from_str(s).ok())
                .unwrap_or(Decimal::ZERO);
            let side = match ws_event.side.as_deref().map(str::to_ascii_uppercase).as_deref() {
                Some("BUY") => TradeSide::Buy,
                _ => TradeSide::Sell,
            };
            let fee_rate_bps = ws_event
                .fee_rate_bps
                .as_deref()
                .and_then(|f| f.parse::<u32>().ok())
                .unwrap_or(0);
            Ok(FeedEvent::Trade {
                    asset_id: ws_event.asset_id.clone(),
                    price,
                    size,
                    side,
                    fee_rate_bps,
                    timestamp_ms,
                    raw: Some(raw.to_string()),
                })
        }
        other => Err(VenueError::Protocol(format!("unknown event_type {other}"))),
    }
}

struct Connection {
    write: SplitSink<WsStream, Message>,
    read: SplitStream<WsStream>,
}

/// CLOB market WebSocket feed. Interior mutability lets the supervisor hold
/// one `Arc<PolymarketFeed>` shared across its subscribe/poll tasks.
pub struct PolymarketFeed {
    ws_url: String,
    conn: Mutex<Option<Connection>>,
    ping_ticker: Mutex<Interval>,
    last_activity: Mutex<Instant>,
}

impl PolymarketFeed {
    pub fn new(ws_url: String) -> Self {
        Self {
            ws_url,
            conn: Mutex::new(None),
            ping_ticker: Mutex::new(new_ping_ticker()),
            last_activity: Mutex::new(Instant::now()),
        }
    }

    async fn send_payload(&self, payload: &SubscribePayload) -> Result<(), VenueError> {
        let mut guard = self.conn.lock().await;
        let conn = guard
            .as_mut()
            .ok_or_else(|| VenueError::Transient("not connected".into()))?;
        let body = serde_json::to_string(payload).map_err(|e| VenueError::Protocol(e.to_string()))?;
        conn.write
            .send(Message::Text(body))
            .await
            .map_err(|e| VenueError::Transient(e.to_string()))
    }
}

#[async_trait]
impl Feed for PolymarketFeed {
    #[instrument(skip(self))]
    async fn connect(&self) -> Result<(), VenueError> {
        let (stream, _resp) = tokio_tungstenite::connect_async(&self.ws_url)
            .await
            .map_err(|e| VenueError::Transient(e.to_string()))?;
        let (write, read) = stream.split();
        *self.conn.lock().await = Some(Connection { write, read });
        *self.ping_ticker.lock().await = new_ping_ticker();
        *self.last_activity.lock().await = Instant::now();
        Ok(())
    }

    async fn subscribe(&self, token_ids: &[String]) -> Result<(), VenueError> {
        self.send_payload(&SubscribePayload::subscribe(token_ids.to_vec())).await
    }

    async fn unsubscribe(&self, token_ids: &[String]) -> Result<(), VenueError> {
        self.send_payload(&SubscribePayload::unsubscribe(token_ids.to_vec())).await
    }

    async fn next_event(&self) -> Result<FeedEvent, VenueError> {
        loop {
            let woke = {
                let mut ticker = self.ping_ticker.lock().await;
                let mut guard = self.conn.lock().await;
                let conn = guard
                    .as_mut()
                    .ok_or_else(|| VenueError::Transient("not connected".into()))?;
                tokio::select! {
                    _ = ticker.tick() => None,
                    msg = conn.read.next() => Some(msg),
                }
            };

            let msg = match woke {
                None => {
                    if self.last_activity.lock().await.elapsed() >= IDLE_TIMEOUT {
                        return Err(VenueError::Transient("idle timeout".into()));
                    }
                    let mut guard = self.conn.lock().await;
                    if let Some(conn) = guard.as_mut() {
                        if let Err(e) = conn.write.send(Message::Ping(Vec::new())).await {
                            return Err(VenueError::Transient(e.to_string()));
                        }
                    }
                    continue;
                }
                Some(Some(Ok(msg))) => msg,
                Some(Some(Err(e))) => return Err(VenueError::Transient(e.to_string())),
                Some(None) => return Err(VenueError::Transient("connection closed".into())),
            };

            *self.last_activity.lock().await = Instant::now();

            match msg {
                Message::Text(text) => match decode_event(&text) {
                    Ok(event) => return Ok(event),
                    Err(VenueError::Protocol(msg)) => {
                        warn!(error = %msg, "dropping unparseable Polymarket frame");
                        continue;
                    }
                    Err(e) => return Err(e),
                },
                Message::Ping(payload) => {
                    let mut guard = self.conn.lock().await;
                    if let Some(conn) = guard.as_mut() {
                        let _ = conn.write.send(Message::Pong(payload)).await;
                    }
                    continue;
                }
                Message::Close(_) => return Err(VenueError::Transient("server closed".into())),
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
    fn decodes_book_event() {
        let raw = r#"{"event_type":"book","asset_id":"T1","bids":[["0.52","10"],["0.51","20"]],"asks":[["0.53","15"]],"timestamp":"1700000000000"}"#;
        let event = decode_event(raw).unwrap();
        let FeedEvent::Book { asset_id, bids, asks, timestamp_ms,.. } = event else {
            panic!("expected Book event")
        };
        assert_eq!(asset_id, "T1");
        assert_eq!(bids, vec![OrderLevel { price: dec!(0.52), size: dec!(10) }, OrderLevel { price: dec!(0.51), size: dec!(20) }]);
        assert_eq!(asks, vec![OrderLevel { price: dec!(0.53), size: dec!(15) }]);
        assert_eq!(timestamp_ms, 1_700_000_000_000);
    }

    #[test]
    fn decodes_price_change_event() {
        let raw = r#"{"event_type":"price_change","asset_id":"T1","changes":[{"price":"0.4","size":"5","side":"BUY"}],"timestamp":"1700000000000"}"#;
        let event = decode_event(raw).unwrap();
        let FeedEvent::PriceChange { changes,.. } = event else { panic!("expected PriceChange event") };
        assert_eq!(changes, vec![LevelDelta { side: BookSide::Bid, price: dec!(0.4), size: dec!(5) }]);
    }

    #[test]
    fn decodes_trade_event() {
        let raw = r#"{"event_type":"last_trade_price","asset_id":"T1","price":"0.6","size":"3","side":"SELL","fee_rate_bps":"10","timestamp":"1700000000000"}"#;
        let event = decode_event(raw).unwrap();
        let FeedEvent::Trade { price, size, side, fee_rate_bps,.. } = event else { panic!("expected Trade event") };
        assert_eq!(price, dec!(0.6));
        assert_eq!(size, dec!(3));
        assert_eq!(side, TradeSide::Sell);
        assert_eq!(fee_rate_bps, 10);
    }

    #[test]
    fn rejects_unknown_event_type() {
        let raw = r#"{"event_type":"mystery","asset_id":"T1"}"#;
        assert!(decode_event(raw).is_err());
    }
}
