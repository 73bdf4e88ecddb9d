//! Prometheus Metrics Registry - Listener Observability
//!
//! Registers and exposes Prometheus metrics on the configured bind address
//! (default `:9090`). Covers queue drops, listener lifecycle state, emit
//! cadence, forward-fill activity, reconnects, and sink batch latency —
//! the signals an operator needs to tell a healthy listener fleet from a
//! degraded one.

use std::sync::Arc;

use axum::routing::get;
use axum::Router;
use prometheus::{Encoder, HistogramOpts, HistogramVec, IntCounterVec, IntGaugeVec, Opts, Registry, TextEncoder};
use tokio::sync::broadcast;
use tracing::{info, instrument};

/// Centralized Prometheus metrics for the listener fleet. All metrics
/// follow the naming convention `lob_listener_*`.
pub struct MetricsRegistry {
    registry: Registry,
    /// Events dropped by the data queue's drop-oldest policy, per listener.
    pub drop_count: IntCounterVec,
    /// Current supervisor state per listener, encoded 0=Idle.. 5=Stopped.
    pub listener_state: IntGaugeVec,
    /// Real (non-forward-filled) snapshot emissions, per listener/platform.
    pub emit_count: IntCounterVec,
    /// Forward-filled emissions, per listener.
    pub forward_fill_count: IntCounterVec,
    /// Feed reconnect attempts, per listener/platform.
    pub reconnect_count: IntCounterVec,
    /// Sink batch flush latency in seconds, per table.
    pub sink_batch_flush_latency: HistogramVec,
}

impl MetricsRegistry {
    /// Create and register all Prometheus metrics.
    pub fn new() -> anyhow::Result<Self> {
        let registry = Registry::new();

        let drop_count = IntCounterVec::new(
            Opts::new("lob_listener_drop_count", "Events dropped by the data queue"),
            &["listener_id", "reason"],
        )?;

        let listener_state = IntGaugeVec::new(
            Opts::new("lob_listener_state", "Current supervisor state (0=Idle..5=Stopped)"),
            &["listener_id"],
        )?;

        let emit_count = IntCounterVec::new(
            Opts::new("lob_listener_emit_count", "Real snapshot/trade emissions"),
            &["listener_id", "platform"],
        )?;

        let forward_fill_count = IntCounterVec::new(
            Opts::new("lob_listener_forward_fill_count", "Forward-filled emissions"),
            &["listener_id"],
        )?;

        let reconnect_count = IntCounterVec::new(
            Opts::new("lob_listener_reconnect_count", "Feed reconnect attempts"),
            &["listener_id", "platform"],
        )?;

        let sink_batch_flush_latency = HistogramVec::new(
            HistogramOpts::new(
                "lob_listener_sink_batch_flush_latency_seconds",
                "Sink batch flush latency",
            )
                .buckets(vec![0.001, 0.005, 0.01, 0.05, 0.1, 0.5, 1.0, 5.0]),
            &["table"],
        )?;

        registry.register(Box::new(drop_count.clone()))?;
        registry.register(Box::new(listener_state.clone()))?;
        registry.register(Box::new(emit_count.clone()))?;
        registry.register(Box::new(forward_fill_count.clone()))?;
        registry.register(Box::new(reconnect_count.clone()))?;
        registry.register(Box::new(sink_batch_flush_latency.clone()))?;

        Ok(Self {
                registry,
                drop_count,
                listener_state,
                emit_count,
                forward_fill_count,
                reconnect_count,
                sink_batch_flush_latency,
            })
    }

    /// Serve Prometheus metrics on the configured bind address.
    #[instrument(skip(self, shutdown_rx))]
    pub async fn serve(
        self: Arc<Self>,
        bind_address: String,
        mut shutdown_rx: broadcast::Receiver<()>,
    ) -> anyhow::Result<()> {
        let metrics_self = Arc::clone(&self);

        let app = Router::new().route(
            "/metrics",
            get(move || {
                    let registry = metrics_self.registry.clone();
                    async move {
                        let encoder = TextEncoder::new();
                        let metric_families = registry.gather();
                        let mut buffer = Vec::new();
                        encoder.encode(&metric_families, &mut buffer).unwrap();
                        String::from_utf8(buffer).unwrap_or_default()
                    }
                }),
        );

        let listener = tokio::net::TcpListener::bind(&bind_address).await?;
        info!(address = %bind_address, "Prometheus metrics server started");

        axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                let _ = shutdown_rx.recv().await;
            })
                .await?;

        Ok(())
    }
}
