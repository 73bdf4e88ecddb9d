//! Listener Supervisor. Owns one venue adapter + one processor
//! and drives the state machine `Idle → Starting → Running → Degraded →
//! Stopping → Stopped` across four cooperating tasks: discovery, feed
//! reader, processor, and ticker.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::sync::{broadcast, mpsc, Mutex};
use tokio::time::{interval, Duration, MissedTickBehavior};
use tracing::{error, info, instrument, warn};
use uuid::Uuid;

use crate::adapters::backoff::Backoff;
use crate::adapters::metrics::{HealthState, MetricsRegistry};
use crate::domain::{ForwardFiller, ListenerConfig, ListenerRunState, Platform};
use crate::ports::sink::Sink;
use crate::ports::venue::{Discoverer, Feed, VenueAdapter, VenueError};
use crate::usecases::processor::{ControlEvent, DataQueue, EventProcessor};

/// How a supervisor's `run` loop ended, reported back to the manager so it
/// can decide whether to auto-restart.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SupervisorExit {
    /// Stopped because `shutdown_rx` fired.
    Shutdown,
    /// Stopped because of an unrecoverable error (e.g. venue auth failure);
    /// the manager should not respawn this listener.
    Fatal,
}

/// Runs a single listener end-to-end: discovery cycle, feed reconnects,
/// and the event processor, until `shutdown_rx` fires.
pub struct ListenerSupervisor<A, S>
where
    A: VenueAdapter + 'static,
    S: Sink + 'static,
{
    config: ListenerConfig,
    adapter: Arc<A>,
    sink: Arc<S>,
    health: HealthState,
    metrics: Arc<MetricsRegistry>,
}

impl<A, S> ListenerSupervisor<A, S>
where
    A: VenueAdapter + 'static,
    S: Sink + 'static,
{
    pub fn new(
        config: ListenerConfig,
        adapter: Arc<A>,
        sink: Arc<S>,
        health: HealthState,
        metrics: Arc<MetricsRegistry>,
    ) -> Self {
        Self { config, adapter, sink, health, metrics }
    }

    /// Drive the state machine until `shutdown_rx` fires or an unrecoverable
    /// error stops the listener. Any task's fatal failure (currently just a
    /// venue auth failure in `feed_loop`) tears down the other three tasks
    /// through `internal_shutdown` and is reported back via the returned
    /// [`SupervisorExit`].
    #[instrument(skip(self, shutdown_rx), fields(listener_id = %self.config.id, name = %self.config.name))]
    pub async fn run(self, shutdown_rx: broadcast::Receiver<()>) -> SupervisorExit {
        let listener_id = self.config.id;
        self.health.set_state(listener_id, ListenerRunState::Starting).await;
        self.set_state_metric(ListenerRunState::Starting);

        if let Err(e) = self.adapter.connect().await {
            error!(error = %e, "initial connect failed, listener will not start");
            self.health.set_state(listener_id, ListenerRunState::Stopped).await;
            self.set_state_metric(ListenerRunState::Stopped);
            return SupervisorExit::Fatal;
        }

        let data_queue = Arc::new(DataQueue::new(DATA_QUEUE_CAPACITY));
        let (control_tx, control_rx) = mpsc::channel(CONTROL_QUEUE_CAPACITY);
        let filler = Arc::new(ForwardFiller::new(self.config.emit_interval_ms, self.config.enable_forward_fill));
        let known_markets: Arc<Mutex<HashMap<String, crate::domain::Market>>> = Arc::new(Mutex::new(HashMap::new()));
        let known_markets_for_feed = known_markets.clone();

        let processor = Arc::new(EventProcessor::new(
                listener_id,
                self.config.platform,
                data_queue.clone(),
                self.sink.clone(),
                filler.clone(),
                self.adapter.clone(),
                self.metrics.clone(),
            ));

        // `internal_shutdown` fans out both the caller's `shutdown_rx` and a
        // same-task-detected fatal error to all four tasks, so a fatal
        // `feed_loop` failure tears the rest down instead of leaving
        // `tokio::join!` below waiting forever.
        let (internal_shutdown, _) = broadcast::channel::<()>(1);
        {
            let internal_shutdown = internal_shutdown.clone();
            let mut external_shutdown_rx = shutdown_rx;
            tokio::spawn(async move {
                let _ = external_shutdown_rx.recv().await;
                let _ = internal_shutdown.send(());
            });
        }
        let fatal = Arc::new(AtomicBool::new(false));

        self.health.set_state(listener_id, ListenerRunState::Running).await;
        self.set_state_metric(ListenerRunState::Running);

        let processor_task = tokio::spawn(processor.clone().run(control_rx, internal_shutdown.subscribe()));
        let discovery_task = tokio::spawn(Self::discovery_loop(
                self.config.clone(),
                self.adapter.clone(),
                control_tx.clone(),
                known_markets,
                internal_shutdown.subscribe(),
            ));
        let feed_task = tokio::spawn(Self::feed_loop(
                listener_id,
                self.config.platform,
                self.adapter.clone(),
                data_queue.clone(),
                self.health.clone(),
                self.metrics.clone(),
                known_markets_for_feed,
                internal_shutdown.clone(),
                fatal.clone(),
                internal_shutdown.subscribe(),
            ));
        let ticker_task = tokio::spawn(Self::ticker_loop(
                filler,
                self.sink.clone(),
                self.metrics.clone(),
                listener_id,
                internal_shutdown.subscribe(),
            ));

        let _ = tokio::join!(processor_task, discovery_task, feed_task, ticker_task);

        self.health.set_state(listener_id, ListenerRunState::Stopping).await;
        self.set_state_metric(ListenerRunState::Stopping);
        if let Err(e) = self.sink.flush().await {
            warn!(error = %e, "sink flush failed during shutdown");
        }
        self.health.remove(&listener_id).await;
        self.health.set_state(listener_id, ListenerRunState::Stopped).await;
        self.set_state_metric(ListenerRunState::Stopped);
        info!("listener stopped");

        if fatal.load(Ordering::Relaxed) {
            SupervisorExit::Fatal
        } else {
            SupervisorExit::Shutdown
        }
    }

    fn set_state_metric(&self, state: ListenerRunState) {
        self.metrics
            .listener_state
            .with_label_values(&[&self.config.id.to_string()])
            .set(state.as_metric_value());
    }

    /// Every `discovery_interval_s`, recompute the discovered set and
    /// enqueue `MarketDiscovered`/`MarketRemoved` control events for the
    /// delta against the known set.
    #[instrument(skip_all, fields(listener_id = %config.id))]
    async fn discovery_loop(
        config: ListenerConfig,
        discoverer: Arc<impl Discoverer>,
        control_tx: mpsc::Sender<ControlEvent>,
        known: Arc<Mutex<HashMap<String, crate::domain::Market>>>,
        mut shutdown_rx: broadcast::Receiver<()>,
    ) {
        let mut ticker = interval(Duration::from_secs(config.discovery_interval_s.max(1)));
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = shutdown_rx.recv() => break,
                _ = ticker.tick() => {
                    let discovered = match discoverer.discover(&config.filters).await {
                        Ok(markets) => markets,
                        Err(e) => {
                            warn!(error = %e, "discovery cycle failed, will retry next interval");
                            continue;
                        }
                    };

                    let mut known_guard = known.lock().await;
                    let discovered_ids: std::collections::HashSet<String> =
                    discovered.iter().map(|m| m.token_id.clone()).collect();

                    let gone: Vec<crate::domain::Market> = known_guard
                        .iter()
                        .filter(|(token_id, _)| !discovered_ids.contains(*token_id))
                        .map(|(_, m)| m.clone())
                        .collect();

                    let new: Vec<crate::domain::Market> = discovered
                        .into_iter()
                        .filter(|m| !known_guard.contains_key(&m.token_id))
                        .collect();

                    for market in &new {
                        known_guard.insert(market.token_id.clone(), market.clone());
                    }
                    for market in &gone {
                        known_guard.remove(&market.token_id);
                    }
                    drop(known_guard);

                    for market in new {
                        if control_tx.send(ControlEvent::MarketDiscovered(market)).await.is_err() {
                            return;
                        }
                    }
                    for market in gone {
                        if control_tx.send(ControlEvent::MarketRemoved(market)).await.is_err() {
                            return;
                        }
                    }
                }
            }
        }
    }

    /// Reads events off the feed and pushes them to `data_queue`, tracking
    /// disconnects with a reconnect-and-resubscribe loop. `known` is shared with `discovery_loop` so a reconnect can
    /// re-issue `subscribe()` for whatever token set is currently live.
    #[instrument(skip_all, fields(listener_id = %listener_id))]
    async fn feed_loop(
        listener_id: Uuid,
        platform: Platform,
        feed: Arc<impl Feed>,
        data_queue: Arc<DataQueue>,
        health: HealthState,
        metrics: Arc<MetricsRegistry>,
        known: Arc<Mutex<HashMap<String, crate::domain::Market>>>,
        internal_shutdown: broadcast::Sender<()>,
        fatal: Arc<AtomicBool>,
        mut shutdown_rx: broadcast::Receiver<()>,
    ) {
        let mut backoff = Backoff::reconnect_default();

        loop {
            tokio::select! {
                _ = shutdown_rx.recv() => break,
                event = feed.next_event() => {
                    match event {
                        Ok(crate::ports::venue::FeedEvent::MarketStateHint { token_id, state, changed_at }) => {
                            // Adapter-internal lifecycle hints are control-path,
                            // not data-path; no venue currently emits these but
                            // the port allows it.
                            let _ = (token_id, state, changed_at);
                        }
                        Ok(feed_event) => {
                            backoff.reset();
                            if data_queue.push(feed_event) {
                                metrics
                                    .drop_count
                                    .with_label_values(&[&listener_id.to_string(), "data_queue_full"])
                                    .inc();
                            }
                        }
                        Err(VenueError::Transient(_) | VenueError::Protocol(_)) => {
                            warn!(%platform, "feed disconnected, entering degraded/reconnect loop");
                            health.set_state(listener_id, ListenerRunState::Degraded).await;
                            metrics
                                .reconnect_count
                                .with_label_values(&[&listener_id.to_string(), &platform.to_string()])
                                .inc();

                            let delay = backoff.next_delay();
                            tokio::select! {
                                _ = shutdown_rx.recv() => break,
                                () = tokio::time::sleep(delay) => {}
                            }

                            if let Err(e) = feed.connect().await {
                                error!(error = %e, "reconnect failed, will retry next backoff step");
                                continue;
                            }

                            let token_ids: Vec<String> = known.lock().await.keys().cloned().collect();
                            if !token_ids.is_empty() {
                                if let Err(e) = feed.subscribe(&token_ids).await {
                                    error!(error = %e, "resubscribe after reconnect failed");
                                }
                            }
                            health.set_state(listener_id, ListenerRunState::Running).await;
                        }
                        Err(VenueError::RateLimited { retry_after_ms }) => {
                            let delay = Duration::from_millis(retry_after_ms);
                            tokio::select! {
                                _ = shutdown_rx.recv() => break,
                                () = tokio::time::sleep(delay) => {}
                            }
                        }
                        Err(VenueError::Auth(msg)) => {
                            error!(error = %msg, "venue auth failure, listener cannot continue");
                            fatal.store(true, Ordering::Relaxed);
                            health.set_state(listener_id, ListenerRunState::Stopped).await;
                            let _ = internal_shutdown.send(());
                            break;
                        }
                    }
                }
            }
        }
    }

    /// Drives the forward-filler's emit cadence independent of feed
    /// activity — writes straight to the sink since
    /// `ForwardFiller::tick` already produces a fully-formed,
    /// `is_forward_filled = true` snapshot; routing it back through the
    /// processor's data queue would stamp it as a fresh real emission.
    async fn ticker_loop(
        filler: Arc<ForwardFiller>,
        sink: Arc<impl Sink>,
        metrics: Arc<MetricsRegistry>,
        listener_id: Uuid,
        mut shutdown_rx: broadcast::Receiver<()>,
    ) {
        let mut ticker = interval(Duration::from_millis(filler.emit_interval_ms().max(1) as u64));
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = shutdown_rx.recv() => break,
                _ = ticker.tick() => {
                    let now_ms = chrono::Utc::now().timestamp_millis();
                    for snapshot in filler.tick(now_ms).await {
                        if let Err(e) = sink.append(crate::ports::sink::SinkRecord::Snapshot(snapshot)) {
                            warn!(error = %e, "dropping forward-filled snapshot: sink rejected append");
                        }
                        metrics.forward_fill_count.with_label_values(&[&listener_id.to_string()]).inc();
                    }
                }
            }
        }
    }
}

const DATA_QUEUE_CAPACITY: usize = 10_000;
const CONTROL_QUEUE_CAPACITY: usize = 1_000;
