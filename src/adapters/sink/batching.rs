//! Generic batching/retrying `Sink`. Batches up to 100 records
//! per table or every 1s, whichever comes first; retries a failed batch
//! with exponential backoff up to `max_retries` attempts, then drops it
//! with a fatal log entry rather than blocking the pipeline.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tokio::sync::{mpsc, oneshot};
use tokio::time::interval;
use tracing::{error, warn};

use crate::adapters::backoff::Backoff;
use crate::adapters::metrics::MetricsRegistry;
use crate::ports::sink::{Sink, SinkError, SinkRecord};

const BATCH_SIZE: usize = 100;
const FLUSH_INTERVAL: Duration = Duration::from_secs(1);

/// The actual storage write, pluggable so the sink's batching/retry policy
/// is independent of the backend.
#[async_trait]
pub trait RecordWriter: Send + Sync + 'static {
    async fn write_batch(&self, table: &str, records: &[SinkRecord]) -> anyhow::Result<()>;
}

enum Command {
    Append(SinkRecord),
    Flush(oneshot::Sender<()>),
}

/// Batching `Sink` over a [`RecordWriter`]. `append` enqueues onto an
/// unbounded channel consumed by a single background task that owns the
/// per-table buffers — the only place batch/retry state lives.
pub struct BatchingSink {
    tx: mpsc::UnboundedSender<Command>,
    healthy: Arc<AtomicBool>,
}

impl BatchingSink {
    pub fn new<W: RecordWriter>(
        writer: W,
        max_retries: u32,
        retry_base_delay_ms: u64,
        metrics: Arc<MetricsRegistry>,
    ) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        let healthy = Arc::new(AtomicBool::new(true));
        tokio::spawn(run_actor(writer, rx, healthy.clone(), metrics, max_retries, retry_base_delay_ms));
        Self { tx, healthy }
    }
}

#[async_trait]
impl Sink for BatchingSink {
    fn append(&self, record: SinkRecord) -> Result<(), SinkError> {
        self.tx.send(Command::Append(record)).map_err(|_| SinkError::Closed)
    }

    async fn flush(&self) -> Result<(), SinkError> {
        let (done_tx, done_rx) = oneshot::channel();
        self.tx
            .send(Command::Flush(done_tx))
            .map_err(|_| SinkError::Closed)?;
        done_rx.await.map_err(|_| SinkError::Closed)
    }

    async fn is_healthy(&self) -> bool {
        self.healthy.load(Ordering::Relaxed)
    }
}

async fn run_actor<W: RecordWriter>(
    writer: W,
    mut rx: mpsc::UnboundedReceiver<Command>,
    healthy: Arc<AtomicBool>,
    metrics: Arc<MetricsRegistry>,
    max_retries: u32,
    retry_base_delay_ms: u64,
) {
    let mut buffers: HashMap<&'static str, Vec<SinkRecord>> = HashMap::new();
    let mut ticker = interval(FLUSH_INTERVAL);

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                flush_all(&writer, &mut buffers, &healthy, &metrics, max_retries, retry_base_delay_ms).await;
            }
            cmd = rx.recv() => {
                match cmd {
                    Some(Command::Append(record)) => {
                        let table = record.table();
                        let buf = buffers.entry(table).or_default();
                        buf.push(record);
                        if buf.len() >= BATCH_SIZE {
                            let batch = std::mem::take(buf);
                            flush_table(&writer, table, batch, &healthy, &metrics, max_retries, retry_base_delay_ms).await;
                        }
                    }
                    Some(Command::Flush(done)) => {
                        flush_all(&writer, &mut buffers, &healthy, &metrics, max_retries, retry_base_delay_ms).await;
                        let _ = done.send(());
                    }
                    None => {
                        flush_all(&writer, &mut buffers, &healthy, &metrics, max_retries, retry_base_delay_ms).await;
                        return;
                    }
                }
            }
        }
    }
}

async fn flush_all<W: RecordWriter>(
    writer: &W,
    buffers: &mut HashMap<&'static str, Vec<SinkRecord>>,
    healthy: &Arc<AtomicBool>,
    metrics: &Arc<MetricsRegistry>,
    max_retries: u32,
    retry_base_delay_ms: u64,
) {
    let tables: Vec<&'static str> = buffers.keys().copied().collect();
    for table in tables {
        if let Some(batch) = buffers.remove(table) {
            if !batch.is_empty() {
                flush_table(writer, table, batch, healthy, metrics, max_retries, retry_base_delay_ms).await;
            }
        }
    }
}

async fn flush_table<W: RecordWriter>(
    writer: &W,
    table: &'static str,
    batch: Vec<SinkRecord>,
    healthy: &Arc<AtomicBool>,
    metrics: &Arc<MetricsRegistry>,
    max_retries: u32,
    retry_base_delay_ms: u64,
) {
    let started = Instant::now();
    let mut backoff = Backoff::new(retry_base_delay_ms, retry_base_delay_ms.saturating_mul(32));
    for attempt in 0..max_retries {
        match writer.write_batch(table, &batch).await {
            Ok(()) => {
                healthy.store(true, Ordering::Relaxed);
                metrics.sink_batch_flush_latency.with_label_values(&[table]).observe(started.elapsed().as_secs_f64());
                return;
            }
            Err(e) => {
                warn!(table, attempt, error = %e, "sink batch write failed, retrying");
                tokio::time::sleep(backoff.next_delay()).await;
            }
        }
    }
    error!(table, size = batch.len(), "sink batch dropped after exhausting retry budget");
    healthy.store(false, Ordering::Relaxed);
    metrics.sink_batch_flush_latency.with_label_values(&[table]).observe(started.elapsed().as_secs_f64());
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex as StdMutex;
    use uuid::Uuid;

    use crate::domain::{Market, MarketState, Platform};

    struct CountingWriter {
        calls: Arc<StdMutex<Vec<(String, usize)>>>,
    }

    #[async_trait]
    impl RecordWriter for CountingWriter {
        async fn write_batch(&self, table: &str, records: &[SinkRecord]) -> anyhow::Result<()> {
            self.calls.lock().unwrap().push((table.to_string(), records.len()));
            Ok(())
        }
    }

    fn sample_market() -> Market {
        let now = chrono::Utc::now();
        Market {
            id: Uuid::nil(),
            listener_id: Uuid::nil(),
            platform: Platform::Polymarket,
            condition_id: "c1".into(),
            token_id: "t1".into(),
            slug: "s".into(),
            title: "t".into(),
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
    async fn flush_drains_buffered_records() {
        let calls = Arc::new(StdMutex::new(Vec::new()));
        let writer = CountingWriter { calls: calls.clone() };
        let sink = BatchingSink::new(writer, 5, 10, Arc::new(MetricsRegistry::new().unwrap()));

        sink.append(SinkRecord::Market(sample_market())).unwrap();
        sink.append(SinkRecord::Market(sample_market())).unwrap();
        sink.flush().await.unwrap();

        let recorded = calls.lock().unwrap();
        assert_eq!(recorded.len(), 1);
        assert_eq!(recorded[0], ("markets".to_string(), 2));
    }

    #[tokio::test]
    async fn reports_healthy_after_successful_flush() {
        let calls = Arc::new(StdMutex::new(Vec::new()));
        let writer = CountingWriter { calls };
        let sink = BatchingSink::new(writer, 5, 10, Arc::new(MetricsRegistry::new().unwrap()));
        sink.append(SinkRecord::Market(sample_market())).unwrap();
        sink.flush().await.unwrap();
        assert!(sink.is_healthy().await);
    }
}
