//! Listener Manager. Diffs externally-owned listener configs
//! against the running supervisor set on a reload cadence, spawns/stops/
//! respawns supervisors, and drives fleet-wide graceful shutdown.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio::time::{interval, Duration, MissedTickBehavior};
use tracing::{error, info, instrument, warn};
use uuid::Uuid;

use crate::adapters::kalshi::{KalshiDiscoverer, KalshiFeed, KalshiVenue};
use crate::adapters::metrics::{HealthState, MetricsRegistry};
use crate::adapters::polymarket::{PolymarketDiscoverer, PolymarketFeed, PolymarketVenue};
use crate::config::{KalshiConfig, PolymarketConfig};
use crate::domain::{ListenerConfig, Platform};
use crate::ports::config_store::ConfigStore;
use crate::ports::sink::Sink;
use crate::usecases::supervisor::{ListenerSupervisor, SupervisorExit};

/// A supervisor running in its own task, plus what the manager needs to
/// stop it and detect config drift on the next reload.
struct RunningListener {
    config: ListenerConfig,
    shutdown_tx: broadcast::Sender<()>,
    handle: JoinHandle<SupervisorExit>,
}

/// Owns the fleet of running supervisors and the shared sink they all
/// write through.
pub struct ListenerManager<S: Sink + 'static> {
    config_store: Arc<dyn ConfigStore>,
    sink: Arc<S>,
    health: HealthState,
    metrics: Arc<MetricsRegistry>,
    polymarket_config: PolymarketConfig,
    kalshi_config: KalshiConfig,
    reload_interval_s: u64,
    shutdown_deadline_s: u64,
    running: HashMap<Uuid, RunningListener>,
    /// Listeners whose supervisor exited `Fatal`. Excluded from `reconcile`'s
    /// respawn pass even while their config is still active — a venue auth
    /// failure does not auto-restart.
    dead: HashSet<Uuid>,
}

impl<S: Sink + 'static> ListenerManager<S> {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        config_store: Arc<dyn ConfigStore>,
        sink: Arc<S>,
        health: HealthState,
        metrics: Arc<MetricsRegistry>,
        polymarket_config: PolymarketConfig,
        kalshi_config: KalshiConfig,
        reload_interval_s: u64,
        shutdown_deadline_s: u64,
    ) -> Self {
        Self {
            config_store,
            sink,
            health,
            metrics,
            polymarket_config,
            kalshi_config,
            reload_interval_s,
            shutdown_deadline_s,
            running: HashMap::new(),
            dead: HashSet::new(),
        }
    }

    /// Reconcile on startup, then every `reload_interval_s`, until
    /// `shutdown_rx` fires; stops every running supervisor before
    /// returning.
    #[instrument(skip_all)]
    pub async fn run(mut self, mut shutdown_rx: broadcast::Receiver<()>) {
        self.reconcile().await;

        let mut ticker = interval(Duration::from_secs(self.reload_interval_s.max(1)));
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        ticker.tick().await; // first tick fires immediately; already reconciled above

        loop {
            tokio::select! {
                _ = shutdown_rx.recv() => break,
                _ = ticker.tick() => self.reconcile().await,
            }
        }

        self.shutdown_all().await;
    }

    /// Remove supervisors whose task already finished, recording a `Fatal`
    /// exit so `reconcile` won't respawn it even though its config is
    /// still active.
    async fn reap_finished(&mut self) {
        let finished: Vec<Uuid> =
        self.running.iter().filter(|(_, r)| r.handle.is_finished()).map(|(id, _)| *id).collect();

        for id in finished {
            let Some(running) = self.running.remove(&id) else { continue };
            match running.handle.await {
                Ok(SupervisorExit::Fatal) => {
                    error!(listener_id = %id, "listener stopped with a fatal error, will not auto-restart");
                    self.dead.insert(id);
                }
                Ok(SupervisorExit::Shutdown) => {
                    warn!(listener_id = %id, "listener task exited without a shutdown signal from the manager");
                }
                Err(e) => {
                    warn!(error = %e, listener_id = %id, "listener task panicked");
                }
            }
        }
    }

    /// Load active configs and diff against the running set by `id`.
    #[instrument(skip(self))]
    async fn reconcile(&mut self) {
        self.reap_finished().await;

        let configs = match self.config_store.load_active_configs().await {
            Ok(configs) => configs,
            Err(e) => {
                warn!(error = %e, "failed to load listener configs, keeping current fleet");
                return;
            }
        };
        let desired: HashMap<Uuid, ListenerConfig> = configs.into_iter().map(|c| (c.id, c)).collect();

        let gone: Vec<Uuid> = self
            .running
            .keys()
            .filter(|id| !desired.contains_key(id))
            .copied()
            .collect();
        for id in gone {
            info!(listener_id = %id, "config removed or deactivated, stopping listener");
            self.stop_one(id).await;
        }

        let changed: Vec<Uuid> = self
            .running
            .iter()
            .filter(|(id, running)| desired.get(id).is_some_and(|c| c.differs_from(&running.config)))
            .map(|(id, _)| *id)
            .collect();
        for id in changed {
            info!(listener_id = %id, "config changed, respawning listener");
            self.stop_one(id).await;
        }

        let new: Vec<ListenerConfig> = desired
            .into_values()
            .filter(|c| !self.running.contains_key(&c.id) && !self.dead.contains(&c.id))
            .collect();
        for config in new {
            info!(listener_id = %config.id, name = %config.name, "spawning listener");
            self.spawn_one(config);
        }
    }

    fn spawn_one(&mut self, config: ListenerConfig) {
        let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
        let listener_id = config.id;
        let sink = self.sink.clone();
        let health = self.health.clone();
        let metrics = self.metrics.clone();

        let handle = match config.platform {
            Platform::Polymarket => {
                let discoverer = match PolymarketDiscoverer::new(&self.polymarket_config, listener_id) {
                    Ok(d) => d,
                    Err(e) => {
                        error!(error = %e, listener_id = %listener_id, "failed to build polymarket discoverer");
                        return;
                    }
                };
                let feed = PolymarketFeed::new(self.polymarket_config.ws_url.clone());
                let venue = Arc::new(PolymarketVenue::new(discoverer, feed));
                let supervisor = ListenerSupervisor::new(config.clone(), venue, sink, health, metrics);
                tokio::spawn(supervisor.run(shutdown_rx))
            }
            Platform::Kalshi => {
                let discoverer = match KalshiDiscoverer::new(&self.kalshi_config, listener_id) {
                    Ok(d) => d,
                    Err(e) => {
                        error!(error = %e, listener_id = %listener_id, "failed to build kalshi discoverer");
                        return;
                    }
                };
                let auth = match crate::adapters::kalshi::KalshiAuth::from_config(&self.kalshi_config) {
                    Ok(auth) => auth,
                    Err(e) => {
                        error!(error = %e, listener_id = %listener_id, "failed to build kalshi auth");
                        return;
                    }
                };
                let feed = KalshiFeed::new(self.kalshi_config.ws_url.clone(), auth);
                let venue = Arc::new(KalshiVenue::new(discoverer, feed));
                let supervisor = ListenerSupervisor::new(config.clone(), venue, sink, health, metrics);
                tokio::spawn(supervisor.run(shutdown_rx))
            }
        };

        self.running.insert(listener_id, RunningListener { config, shutdown_tx, handle });
    }

    async fn stop_one(&mut self, id: Uuid) {
        if let Some(running) = self.running.remove(&id) {
            let _ = running.shutdown_tx.send(());
            if let Err(e) = running.handle.await {
                warn!(error = %e, listener_id = %id, "listener task panicked while stopping");
            }
        }
    }

    /// Signal every supervisor to stop and wait, bounded by
    /// `shutdown_deadline_s`.
    #[instrument(skip(self))]
    async fn shutdown_all(&mut self) {
        for running in self.running.values() {
            let _ = running.shutdown_tx.send(());
        }
        let handles: Vec<(Uuid, JoinHandle<SupervisorExit>)> =
        self.running.drain().map(|(id, running)| (id, running.handle)).collect();

        let deadline = Duration::from_secs(self.shutdown_deadline_s.max(1));
        let wait_all = async {
            for (id, handle) in handles {
                if let Err(e) = handle.await {
                    warn!(error = %e, listener_id = %id, "listener task panicked during shutdown");
                }
            }
        };

        if tokio::time::timeout(deadline, wait_all).await.is_err() {
            warn!("shutdown deadline exceeded, some listeners may not have flushed cleanly");
        }
    }
}
