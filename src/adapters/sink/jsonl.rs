//! JSONL `RecordWriter` — one append-only, daily-rotated file per table
//! (`{data_dir}/{table}/YYYY-MM-DD.jsonl`). Strips configured optional
//! columns before writing, for forward-compatibility with older schemas
//! reading the same files.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::Utc;
use serde_json::{json, Value};
use tokio::fs::{self, OpenOptions};
use tokio::io::AsyncWriteExt;
use tracing::instrument;

use crate::ports::sink::SinkRecord;

use super::batching::RecordWriter;

/// Default optional columns an older schema might be missing.
const OPTIONAL_COLUMNS: &[&str] = &["is_forward_filled", "source_timestamp_ms", "platform"];

pub struct JsonlWriter {
    data_dir: PathBuf,
    unsupported_columns: HashSet<String>,
}

impl JsonlWriter {
    pub fn new(data_dir: impl Into<PathBuf>) -> Self {
        Self { data_dir: data_dir.into(), unsupported_columns: HashSet::new() }
    }

    /// Simulate an older schema missing some optional columns.
    pub fn with_unsupported_columns(mut self, columns: impl IntoIterator<Item = &'static str>) -> Self {
        self.unsupported_columns = columns.into_iter().map(String::from).collect();
        self
    }

    async fn file_for(&self, table: &str) -> anyhow::Result<PathBuf> {
        let dir = self.data_dir.join(table);
        fs::create_dir_all(&dir).await?;
        let date = Utc::now().format("%Y-%m-%d").to_string();
        Ok(dir.join(format!("{date}.jsonl")))
    }

    fn strip_columns(&self, mut value: Value) -> Value {
        if self.unsupported_columns.is_empty() {
            return value;
        }
        if let Value::Object(map) = &mut value {
            for column in &self.unsupported_columns {
                map.remove(column);
            }
        }
        value
    }
}

fn record_to_value(record: &SinkRecord) -> Value {
    match record {
        SinkRecord::Market(market) => serde_json::to_value(market).unwrap_or(Value::Null),
        SinkRecord::Snapshot(snapshot) => serde_json::to_value(snapshot).unwrap_or(Value::Null),
        SinkRecord::Trade(trade) => serde_json::to_value(trade).unwrap_or(Value::Null),
        SinkRecord::MarketStateChange { listener_id, token_id, market_id, from, to, changed_at } => {
            json!({
                    "listener_id": listener_id,
                    "token_id": token_id,
                    "market_id": market_id,
                    "from": from,
                    "to": to,
                    "changed_at": changed_at,
                })
        }
    }
}

#[async_trait]
impl RecordWriter for JsonlWriter {
    #[instrument(skip(self, records), fields(count = records.len()))]
    async fn write_batch(&self, table: &str, records: &[SinkRecord]) -> anyhow::Result<()> {
        if records.is_empty() {
            return Ok(());
        }
        let path = self.file_for(table).await?;

        let mut body = String::new();
        for record in records {
            let mut value = record_to_value(record);
            value = self.strip_columns(value);
            body.push_str(&serde_json::to_string(&value)?);
            body.push('\n');
        }

        let mut file = OpenOptions::new().create(true).append(true).open(&path).await?;
        file.write_all(body.as_bytes()).await?;
        file.flush().await?;
        Ok(())
    }
}

/// Best-effort reload of every `markets` row for warm-restart scenarios
/// (not required by the port, but useful for tooling/tests).
pub async fn load_markets_jsonl(data_dir: &Path) -> anyhow::Result<Vec<Value>> {
    let dir = data_dir.join("markets");
    let mut out = Vec::new();
    let mut entries = match fs::read_dir(&dir).await {
        Ok(e) => e,
        Err(_) => return Ok(out),
    };
    while let Some(entry) = entries.next_entry().await? {
        let path = entry.path();
        if path.extension().is_some_and(|ext| ext == "jsonl") {
            let content = fs::read_to_string(&path).await?;
            for line in content.lines() {
                if !line.trim().is_empty() {
                    out.push(serde_json::from_str(line)?);
                }
            }
        }
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    use crate::domain::{Market, MarketState, Platform};

    fn sample_market() -> Market {
        let now = Utc::now();
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
    async fn writes_one_jsonl_line_per_record() {
        let dir = std::env::temp_dir().join(format!("lob-listener-jsonl-{}", Uuid::new_v4()));
        let writer = JsonlWriter::new(&dir);
        let records = vec![SinkRecord::Market(sample_market()), SinkRecord::Market(sample_market())];
        writer.write_batch("markets", &records).await.unwrap();

        let path = writer.file_for("markets").await.unwrap();
        let content = fs::read_to_string(&path).await.unwrap();
        assert_eq!(content.lines().count(), 2);

        fs::remove_dir_all(&dir).await.ok();
    }

    #[tokio::test]
    async fn strips_configured_optional_columns() {
        let dir = std::env::temp_dir().join(format!("lob-listener-jsonl-{}", Uuid::new_v4()));
        let writer = JsonlWriter::new(&dir).with_unsupported_columns(OPTIONAL_COLUMNS.iter().copied());

        let snapshot = crate::domain::OrderbookSnapshot::new(
            Uuid::nil(),
            Platform::Polymarket,
            "T1".into(),
            Uuid::nil(),
            0,
            vec![],
            vec![],
            None,
            false,
            None,
        )
            .unwrap();

        writer.write_batch("orderbook_snapshots", &[SinkRecord::Snapshot(snapshot)]).await.unwrap();
        let path = writer.file_for("orderbook_snapshots").await.unwrap();
        let content = fs::read_to_string(&path).await.unwrap();
        let value: Value = serde_json::from_str(content.lines().next().unwrap()).unwrap();
        assert!(value.get("is_forward_filled").is_none());
        assert!(value.get("platform").is_none());

        fs::remove_dir_all(&dir).await.ok();
    }
}
