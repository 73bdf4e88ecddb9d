//! Integration Tests — Event Processor Wiring
//!
//! Exercises `EventProcessor` against mocked `Sink`/`Feed` ports to verify
//! the market-lifecycle and data-path wiring end to end and
//! the data-queue's overflow behavior under load.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use chrono::Utc;
use mockall::mock;
use rust_decimal_macros::dec;
use tokio::sync::{broadcast, mpsc};
use uuid::Uuid;

use lob_listener::adapters::metrics::MetricsRegistry;
use lob_listener::domain::{ForwardFiller, Market, MarketState, OrderLevel, Platform, TradeSide};
use lob_listener::ports::sink::{Sink, SinkError, SinkRecord};
use lob_listener::ports::venue::{Feed, FeedEvent, VenueError};
use lob_listener::usecases::processor::{ControlEvent, DataQueue, EventProcessor};

mock! {
    pub SinkImpl {}

    #[async_trait]
    impl Sink for SinkImpl {
        fn append(&self, record: SinkRecord) -> Result<(), SinkError>;
        async fn flush(&self) -> Result<(), SinkError>;
        async fn is_healthy(&self) -> bool;
    }
}

mock! {
    pub FeedImpl {}

    #[async_trait]
    impl Feed for FeedImpl {
        async fn connect(&self) -> Result<(), VenueError>;
        async fn subscribe(&self, token_ids: &[String]) -> Result<(), VenueError>;
        async fn unsubscribe(&self, token_ids: &[String]) -> Result<(), VenueError>;
        async fn next_event(&self) -> Result<FeedEvent, VenueError>;
    }
}

fn test_market(token_id: &str) -> Market {
    let now = Utc::now();
    Market {
        id: Uuid::new_v4(),
        listener_id: Uuid::nil(),
        platform: Platform::Polymarket,
        condition_id: "cond-1".into(),
        token_id: token_id.into(),
        slug: "will-it-happen".into(),
        title: "Will it happen?".into(),
        category: None,
        series_id: None,
        tags: vec![],
        start_time: None,
        end_time: None,
        is_active: true,
        is_closed: false,
        state: MarketState::Discovered,
        created_at: now,
        updated_at: now,
    }
}

#[tokio::test]
async fn market_discovered_upserts_market_and_subscribes() {
    let append_count = Arc::new(AtomicUsize::new(0));
    let append_count_clone = append_count.clone();

    let mut sink = MockSinkImpl::new();
    sink.expect_append().returning(move |_| {
            append_count_clone.fetch_add(1, Ordering::SeqCst);
            Ok(())
        });

    let mut feed = MockFeedImpl::new();
    feed.expect_subscribe()
        .withf(|ids| ids == ["T1".to_string()])
        .returning(|_| Ok(()));

    let data_queue = Arc::new(DataQueue::new(16));
    let filler = Arc::new(ForwardFiller::new(1_000, true));
    let metrics = Arc::new(MetricsRegistry::new().unwrap());

    let processor = Arc::new(EventProcessor::new(
            Uuid::nil(),
            Platform::Polymarket,
            data_queue,
            Arc::new(sink),
            filler,
            Arc::new(feed),
            metrics,
        ));

    let (control_tx, control_rx) = mpsc::channel(8);
    let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
    let run_handle = tokio::spawn(processor.run(control_rx, shutdown_rx));

    control_tx
        .send(ControlEvent::MarketDiscovered(test_market("T1")))
        .await
        .unwrap();

    tokio::time::sleep(std::time::Duration::from_millis(20)).await;
    let _ = shutdown_tx.send(());
    run_handle.await.unwrap();

    // One append for the Market upsert, one for the state-change record.
    assert_eq!(append_count.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn book_event_on_data_queue_emits_snapshot_to_sink() {
    let append_count = Arc::new(AtomicUsize::new(0));
    let append_count_clone = append_count.clone();

    let mut sink = MockSinkImpl::new();
    sink.expect_append().returning(move |_| {
            append_count_clone.fetch_add(1, Ordering::SeqCst);
            Ok(())
        });

    let feed = MockFeedImpl::new();

    let data_queue = Arc::new(DataQueue::new(16));
    let filler = Arc::new(ForwardFiller::new(1_000, true));
    let metrics = Arc::new(MetricsRegistry::new().unwrap());

    let processor = Arc::new(EventProcessor::new(
            Uuid::nil(),
            Platform::Polymarket,
            data_queue.clone(),
            Arc::new(sink),
            filler,
            Arc::new(feed),
            metrics,
        ));

    let (_control_tx, control_rx) = mpsc::channel(8);
    let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
    let run_handle = tokio::spawn(processor.run(control_rx, shutdown_rx));

    data_queue.push(FeedEvent::Book {
            asset_id: "T1".into(),
            bids: vec![OrderLevel { price: dec!(0.52), size: dec!(10) }],
            asks: vec![OrderLevel { price: dec!(0.53), size: dec!(15) }],
            timestamp_ms: 1_700_000_000_000,
            raw: None,
        });

    tokio::time::sleep(std::time::Duration::from_millis(20)).await;
    let _ = shutdown_tx.send(());
    run_handle.await.unwrap();

    assert_eq!(append_count.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn trade_event_dropped_by_sink_does_not_panic_processor() {
    // A persistently failing sink must not crash the processor loop; the
    // event is logged and dropped.
    let mut sink = MockSinkImpl::new();
    sink.expect_append()
        .returning(|_| Err(SinkError::PersistentFailure("disk full".into())));

    let feed = MockFeedImpl::new();
    let data_queue = Arc::new(DataQueue::new(16));
    let filler = Arc::new(ForwardFiller::new(1_000, true));
    let metrics = Arc::new(MetricsRegistry::new().unwrap());

    let processor = Arc::new(EventProcessor::new(
            Uuid::nil(),
            Platform::Kalshi,
            data_queue.clone(),
            Arc::new(sink),
            filler,
            Arc::new(feed),
            metrics,
        ));

    let (_control_tx, control_rx) = mpsc::channel(8);
    let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
    let run_handle = tokio::spawn(processor.run(control_rx, shutdown_rx));

    data_queue.push(FeedEvent::Trade {
            asset_id: "T1".into(),
            price: dec!(0.5),
            size: dec!(1),
            side: TradeSide::Buy,
            fee_rate_bps: 0,
            timestamp_ms: 1_700_000_000_000,
            raw: None,
        });

    tokio::time::sleep(std::time::Duration::from_millis(20)).await;
    let _ = shutdown_tx.send(());
    // A panicked task would surface as an `Err` here.
    run_handle.await.unwrap();
}

#[test]
fn data_queue_overflow_drops_oldest_and_caps_length() {
    let queue = DataQueue::new(10_000);
    let mut dropped = 0;
    for i in 0..20_000i64 {
        let event = FeedEvent::Trade {
            asset_id: format!("T{i}"),
            price: dec!(0.5),
            size: dec!(1),
            side: TradeSide::Buy,
            fee_rate_bps: 0,
            timestamp_ms: i,
            raw: None,
        };
        if queue.push(event) {
            dropped += 1;
        }
    }
    assert_eq!(dropped, 10_000);
    assert_eq!(queue.len(), 10_000);
}
