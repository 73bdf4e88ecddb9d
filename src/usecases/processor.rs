//! Event Processor. Owns the two per-listener queues and drains
//! them with strict priority: data before control, else wait on either.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use chrono::Utc;
use rust_decimal::Decimal;
use tokio::sync::{broadcast, mpsc, Mutex, Notify};
use tracing::{instrument, warn};
use uuid::Uuid;

use crate::adapters::metrics::MetricsRegistry;
use crate::domain::{ForwardFiller, Market, MarketState, OrderLevel, OrderbookSnapshot, Platform, Trade};
use crate::ports::sink::{Sink, SinkRecord};
use crate::ports::venue::{BookSide, Feed, FeedEvent};

/// A market discovered/removed or transitioned by the supervisor's
/// discovery cycle. Routed through `control_queue`.
#[derive(Debug, Clone)]
pub enum ControlEvent {
    MarketDiscovered(Market),
    MarketRemoved(Market),
}

/// Bounded, drop-oldest data queue. A `Notify` permit persists across a
/// `notify_one()` issued with no waiter yet, so the push/recv race that a
/// naive condvar would have is not present here (tokio's documented
/// single-permit semantics).
pub struct DataQueue {
    capacity: usize,
    inner: std::sync::Mutex<std::collections::VecDeque<FeedEvent>>,
    notify: Notify,
}

impl DataQueue {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            inner: std::sync::Mutex::new(std::collections::VecDeque::with_capacity(capacity)),
            notify: Notify::new(),
        }
    }

    /// Enqueue an event, dropping the oldest if at capacity. Returns `true`
    /// if an element was dropped.
    pub fn push(&self, event: FeedEvent) -> bool {
        let dropped = {
            let mut queue = self.inner.lock().unwrap();
            let dropped = if queue.len() >= self.capacity {
                queue.pop_front();
                true
            } else {
                false
            };
            queue.push_back(event);
            dropped
        };
        self.notify.notify_one();
        dropped
    }

    pub async fn recv(&self) -> FeedEvent {
        loop {
            {
                let mut queue = self.inner.lock().unwrap();
                if let Some(event) = queue.pop_front() {
                    return event;
                }
            }
            self.notify.notified().await;
        }
    }

    pub fn len(&self) -> usize {
        self.inner.lock().unwrap().len()
    }
}

/// Reconstructed per-token book, kept only to apply Polymarket
/// `price_change` deltas on top of the last `book` snapshot.
#[derive(Default)]
struct PriceBook {
    bids: BTreeMap<Decimal, Decimal>,
    asks: BTreeMap<Decimal, Decimal>,
}

impl PriceBook {
    fn apply_full(&mut self, bids: &[OrderLevel], asks: &[OrderLevel]) {
        self.bids = bids.iter().map(|l| (l.price, l.size)).collect();
        self.asks = asks.iter().map(|l| (l.price, l.size)).collect();
    }

    /// A `price_change` entry is an absolute new size at that price; a
    /// zero or negative size removes the level; an absent level is an
    /// insert.
    fn apply_delta(&mut self, side: BookSide, price: Decimal, size: Decimal) {
        let map = match side {
            BookSide::Bid => &mut self.bids,
            BookSide::Ask => &mut self.asks,
        };
        if size <= Decimal::ZERO {
            map.remove(&price);
        } else {
            map.insert(price, size);
        }
    }

    fn to_levels(&self) -> (Vec<OrderLevel>, Vec<OrderLevel>) {
        let bids = self.bids.iter().rev().map(|(&price, &size)| OrderLevel { price, size }).collect();
        let asks = self.asks.iter().map(|(&price, &size)| OrderLevel { price, size }).collect();
        (bids, asks)
    }
}

/// Drives both queues for a single listener. Constructed and run by the
/// supervisor; holds no venue-specific knowledge beyond the `Feed` handle
/// needed to (un)subscribe on market lifecycle transitions.
pub struct EventProcessor<S: Sink> {
    listener_id: Uuid,
    platform: Platform,
    data_queue: Arc<DataQueue>,
    sink: Arc<S>,
    filler: Arc<ForwardFiller>,
    feed: Arc<dyn Feed>,
    metrics: Arc<MetricsRegistry>,
    token_markets: Mutex<HashMap<String, Uuid>>,
    books: Mutex<HashMap<String, PriceBook>>,
}

impl<S: Sink> EventProcessor<S> {
    pub fn new(
        listener_id: Uuid,
        platform: Platform,
        data_queue: Arc<DataQueue>,
        sink: Arc<S>,
        filler: Arc<ForwardFiller>,
        feed: Arc<dyn Feed>,
        metrics: Arc<MetricsRegistry>,
    ) -> Self {
        Self {
            listener_id,
            platform,
            data_queue,
            sink,
            filler,
            feed,
            metrics,
            token_markets: Mutex::new(HashMap::new()),
            books: Mutex::new(HashMap::new()),
        }
    }

    pub fn data_queue(&self) -> Arc<DataQueue> {
        self.data_queue.clone()
    }

    /// Drain both queues until `shutdown_rx` fires. `data_queue` is always
    /// preferred over `control_rx`.
    #[instrument(skip(self, control_rx, shutdown_rx), fields(listener_id = %self.listener_id))]
    pub async fn run(
        self: Arc<Self>,
        mut control_rx: mpsc::Receiver<ControlEvent>,
        mut shutdown_rx: broadcast::Receiver<()>,
    ) {
        loop {
            tokio::select! {
                biased;
                _ = shutdown_rx.recv() => break,
                event = self.data_queue.recv() => {
                    self.handle_data_event(event).await;
                }
                Some(event) = control_rx.recv() => {
                    self.handle_control_event(event).await;
                }
                else => break,
            }
        }
    }

    async fn market_id_for(&self, token_id: &str) -> Uuid {
        self.token_markets
            .lock()
            .await
            .get(token_id)
            .copied()
            .unwrap_or_else(|| {
                warn!(token_id, "event for unknown market, using nil market_id");
                Uuid::nil()
            })
    }

    async fn emit_snapshot(
        &self,
        asset_id: String,
        bids: Vec<OrderLevel>,
        asks: Vec<OrderLevel>,
        timestamp_ms: i64,
        raw: Option<String>,
    ) {
        let market_id = self.market_id_for(&asset_id).await;
        match OrderbookSnapshot::new(
            self.listener_id,
            self.platform,
            asset_id.clone(),
            market_id,
            timestamp_ms,
            bids,
            asks,
            raw,
            false,
            None,
        ) {
            Ok(snapshot) => {
                if let Err(e) = self.sink.append(SinkRecord::Snapshot(snapshot.clone())) {
                    warn!(error = %e, asset_id, "dropping snapshot: sink rejected append");
                }
                self.filler.update_state(&asset_id, snapshot).await;
                self.metrics
                    .emit_count
                    .with_label_values(&[&self.listener_id.to_string(), &self.platform.to_string()])
                    .inc();
            }
            Err(e) => {
                warn!(error = %e, asset_id, "dropping invalid snapshot");
            }
        }
    }

    async fn handle_data_event(&self, event: FeedEvent) {
        match event {
            FeedEvent::Book { asset_id, bids, asks, timestamp_ms, raw } => {
                {
                    let mut books = self.books.lock().await;
                    books.entry(asset_id.clone()).or_default().apply_full(&bids, &asks);
                }
                self.emit_snapshot(asset_id, bids, asks, timestamp_ms, raw).await;
            }
            FeedEvent::PriceChange { asset_id, changes, timestamp_ms, raw } => {
                let (bids, asks) = {
                    let mut books = self.books.lock().await;
                    let book = books.entry(asset_id.clone()).or_default();
                    for change in changes {
                        book.apply_delta(change.side, change.price, change.size);
                    }
                    book.to_levels()
                };
                self.emit_snapshot(asset_id, bids, asks, timestamp_ms, raw).await;
            }
            FeedEvent::Trade { asset_id, price, size, side, fee_rate_bps, timestamp_ms, raw } => {
                let market_id = self.market_id_for(&asset_id).await;
                let trade = Trade {
                    listener_id: self.listener_id,
                    platform: self.platform,
                    asset_id: asset_id.clone(),
                    market_id,
                    timestamp_ms,
                    price,
                    size,
                    side,
                    fee_rate_bps,
                    raw_payload: raw,
                };
                if let Err(e) = self.sink.append(SinkRecord::Trade(trade)) {
                    warn!(error = %e, asset_id, "dropping trade: sink rejected append");
                }
                self.metrics
                    .emit_count
                    .with_label_values(&[&self.listener_id.to_string(), &self.platform.to_string()])
                    .inc();
            }
            FeedEvent::MarketStateHint { token_id,.. } => {
                warn!(token_id, "MarketStateHint arrived on data_queue, ignoring");
            }
        }
    }

    async fn handle_control_event(&self, event: ControlEvent) {
        match event {
            ControlEvent::MarketDiscovered(mut market) => {
                let from = Some(market.state);
                market.transition(MarketState::Subscribed);
                self.token_markets.lock().await.insert(market.token_id.clone(), market.id);
                self.filler
                    .add_token(&market.token_id, market.id, Utc::now().timestamp_millis())
                    .await;

                if let Err(e) = self.sink.append(SinkRecord::Market(market.clone())) {
                    warn!(error = %e, market_id = %market.id, "dropping market upsert");
                }
                if let Err(e) = self.sink.append(SinkRecord::MarketStateChange {
                        listener_id: self.listener_id,
                        token_id: market.token_id.clone(),
                        market_id: market.id,
                        from,
                        to: MarketState::Subscribed,
                        changed_at: market.updated_at,
                    }) {
                    warn!(error = %e, market_id = %market.id, "dropping state-change record");
                }
                if let Err(e) = self.feed.subscribe(&[market.token_id.clone()]).await {
                    warn!(error = %e, token_id = %market.token_id, "subscribe failed");
                }
            }
            ControlEvent::MarketRemoved(mut market) => {
                let from = Some(market.state);
                market.transition(MarketState::Removed);

                if let Err(e) = self.feed.unsubscribe(&[market.token_id.clone()]).await {
                    warn!(error = %e, token_id = %market.token_id, "unsubscribe failed");
                }
                self.filler.remove_token(&market.token_id).await;
                self.token_markets.lock().await.remove(&market.token_id);

                if let Err(e) = self.sink.append(SinkRecord::MarketStateChange {
                        listener_id: self.listener_id,
                        token_id: market.token_id.clone(),
                        market_id: market.id,
                        from,
                        to: MarketState::Removed,
                        changed_at: market.updated_at,
                    }) {
                    warn!(error = %e, market_id = %market.id, "dropping state-change record");
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn data_queue_drops_oldest_past_capacity() {
        let queue = DataQueue::new(2);
        let event = |id: &str| FeedEvent::Trade {
            asset_id: id.to_string(),
            price: Decimal::ZERO,
            size: Decimal::ZERO,
            side: crate::domain::TradeSide::Buy,
            fee_rate_bps: 0,
            timestamp_ms: 0,
            raw: None,
        };
        assert!(!queue.push(event("1")));
        assert!(!queue.push(event("2")));
        assert!(queue.push(event("3")));
        assert_eq!(queue.len(), 2);
    }

    #[tokio::test]
    async fn data_queue_recv_returns_pushed_events_in_order() {
        let queue = Arc::new(DataQueue::new(10));
        let trade = |id: &str| FeedEvent::Trade {
            asset_id: id.to_string(),
            price: Decimal::ZERO,
            size: Decimal::ZERO,
            side: crate::domain::TradeSide::Buy,
            fee_rate_bps: 0,
            timestamp_ms: 0,
            raw: None,
        };
        queue.push(trade("a"));
        queue.push(trade("b"));

        let first = queue.recv().await;
        let second = queue.recv().await;
        let FeedEvent::Trade { asset_id: a,.. } = first else { panic!("expected trade") };
        let FeedEvent::Trade { asset_id: b,.. } = second else { panic!("expected trade") };
        assert_eq!(a, "a");
        assert_eq!(b, "b");
    }

    #[test]
    fn price_book_insert_then_remove() {
        let mut book = PriceBook::default();
        book.apply_delta(BookSide::Bid, Decimal::from(1), Decimal::from(5));
        let (bids, _) = book.to_levels();
        assert_eq!(bids.len(), 1);
        book.apply_delta(BookSide::Bid, Decimal::from(1), Decimal::ZERO);
        let (bids, _) = book.to_levels();
        assert!(bids.is_empty());
    }
}
