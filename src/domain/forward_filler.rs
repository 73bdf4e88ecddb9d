//! State Forward-Filler (C3) —
//!
//! Converts a sparse, event-driven snapshot stream into a continuous,
//! timestamped emission stream by periodically re-emitting the last known
//! state, marked synthetic. Process-local only: no durability, recreated
//! on restart.

use std::collections::HashMap;

use tokio::sync::Mutex;
use uuid::Uuid;

use crate::domain::model::OrderbookSnapshot;

/// Per-token forward-fill bookkeeping. Not persisted — is explicit that
/// this state is process-local and rebuilt from the next real event after a
/// restart.
#[derive(Debug, Clone)]
pub struct ForwardFillerState {
    pub token_id: String,
    pub market_id: Uuid,
    pub last_snapshot: Option<OrderbookSnapshot>,
    pub last_real_event_timestamp_ms: Option<i64>,
    pub tracking_since_ms: i64,
    /// Wall-clock timestamp of the most recent emission (real or
    /// forward-filled) for this token — enforces the monotonic-timestamp
    /// contract independent of what the stored snapshot's own timestamp is.
    last_emitted_ms: Option<i64>,
}

/// Per-listener forward-filler. One instance per running supervisor; the internal
/// mutex exists because the processor and the ticker are distinct tasks
/// that both touch it.
pub struct ForwardFiller {
    emit_interval_ms: i64,
    enable_forward_fill: bool,
    tokens: Mutex<HashMap<String, ForwardFillerState>>,
}

impl ForwardFiller {
    pub fn new(emit_interval_ms: u64, enable_forward_fill: bool) -> Self {
        Self {
            emit_interval_ms: emit_interval_ms as i64,
            enable_forward_fill,
            tokens: Mutex::new(HashMap::new()),
        }
    }

    /// Insert an entry for `token_id` with no known state yet. Idempotent.
    pub async fn add_token(&self, token_id: &str, market_id: Uuid, now_ms: i64) {
        let mut tokens = self.tokens.lock().await;
        tokens.entry(token_id.to_string()).or_insert_with(|| ForwardFillerState {
                token_id: token_id.to_string(),
                market_id,
                last_snapshot: None,
                last_real_event_timestamp_ms: None,
                tracking_since_ms: now_ms,
                last_emitted_ms: None,
            });
    }

    /// Remove `token_id`'s state. Idempotent.
    pub async fn remove_token(&self, token_id: &str) {
        let mut tokens = self.tokens.lock().await;
        tokens.remove(token_id);
    }

    /// Record a real event's snapshot. O(1): a single map insert, no I/O.
    pub async fn update_state(&self, token_id: &str, snapshot: OrderbookSnapshot) {
        let mut tokens = self.tokens.lock().await;
        if let Some(state) = tokens.get_mut(token_id) {
            state.last_real_event_timestamp_ms = Some(snapshot.timestamp_ms);
            state.last_emitted_ms = Some(snapshot.timestamp_ms);
            state.last_snapshot = Some(snapshot);
        }
    }

    /// Whether `token_id` is currently tracked.
    pub async fn contains(&self, token_id: &str) -> bool {
        self.tokens.lock().await.contains_key(token_id)
    }

    /// Number of tracked tokens.
    pub async fn token_count(&self) -> usize {
        self.tokens.lock().await.len()
    }

    /// Emit a forward-filled clone of every tracked token's last known
    /// state, stamped with `now_ms` and `is_forward_filled = true`.
    ///
    /// A no-op when `enable_forward_fill` is false (real events still flow
    /// through the processor directly — this only gates synthetic
    /// emissions). Enforces the monotonic-timestamp invariant per token by
    /// skipping a tick that would not advance wall time.
    pub async fn tick(&self, now_ms: i64) -> Vec<OrderbookSnapshot> {
        if !self.enable_forward_fill {
            return Vec::new();
        }

        let mut tokens = self.tokens.lock().await;
        let mut emissions = Vec::new();
        for state in tokens.values_mut() {
            let Some(last) = &state.last_snapshot else {
                continue;
            };
            if let Some(prev) = state.last_emitted_ms {
                if now_ms <= prev {
                    continue;
                }
            }
            let emitted = last.as_forward_fill(now_ms, state.last_real_event_timestamp_ms);
            state.last_emitted_ms = Some(now_ms);
            emissions.push(emitted);
        }
        emissions
    }

    pub fn emit_interval_ms(&self) -> i64 {
        self.emit_interval_ms
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::model::{OrderLevel, Platform};
    use rust_decimal_macros::dec;

    fn snapshot(ts: i64) -> OrderbookSnapshot {
        OrderbookSnapshot::new(
            Uuid::nil(),
            Platform::Polymarket,
            "T1".into(),
            Uuid::nil(),
            ts,
            vec![OrderLevel { price: dec!(0.5), size: dec!(10) }],
            vec![OrderLevel { price: dec!(0.6), size: dec!(5) }],
            None,
            false,
            None,
        )
            .unwrap()
    }

    #[tokio::test]
    async fn tick_is_noop_without_any_real_event() {
        let filler = ForwardFiller::new(100, true);
        filler.add_token("T1", Uuid::nil(), 0).await;
        assert!(filler.tick(100).await.is_empty());
    }

    #[tokio::test]
    async fn tick_emits_forward_filled_clone_with_provenance() {
        let filler = ForwardFiller::new(100, true);
        filler.add_token("T1", Uuid::nil(), 0).await;
        filler.update_state("T1", snapshot(0)).await;

        let emitted = filler.tick(100).await;
        assert_eq!(emitted.len(), 1);
        let snap = &emitted[0];
        assert!(snap.is_forward_filled);
        assert_eq!(snap.timestamp_ms, 100);
        assert_eq!(snap.source_timestamp_ms, Some(0));
        assert!(snap.source_timestamp_ms.unwrap() <= snap.timestamp_ms);
    }

    #[tokio::test]
    async fn disabled_forward_fill_emits_nothing() {
        let filler = ForwardFiller::new(100, false);
        filler.add_token("T1", Uuid::nil(), 0).await;
        filler.update_state("T1", snapshot(0)).await;
        assert!(filler.tick(100).await.is_empty());
    }

    #[tokio::test]
    async fn removed_token_stops_emitting() {
        let filler = ForwardFiller::new(100, true);
        filler.add_token("T1", Uuid::nil(), 0).await;
        filler.update_state("T1", snapshot(0)).await;
        filler.remove_token("T1").await;
        assert!(filler.tick(100).await.is_empty());
    }

    #[tokio::test]
    async fn emissions_are_monotonic_per_token() {
        let filler = ForwardFiller::new(100, true);
        filler.add_token("T1", Uuid::nil(), 0).await;
        filler.update_state("T1", snapshot(0)).await;

        let mut timestamps = Vec::new();
        for now in (100..=1000).step_by(100) {
            let emitted = filler.tick(now).await;
            timestamps.extend(emitted.into_iter().map(|s| s.timestamp_ms));
        }
        assert_eq!(timestamps.len(), 9);
        assert!(timestamps.windows(2).all(|w| w[1] > w[0]));
    }

    #[tokio::test]
    async fn add_token_is_idempotent() {
        let filler = ForwardFiller::new(100, true);
        filler.add_token("T1", Uuid::nil(), 0).await;
        filler.update_state("T1", snapshot(0)).await;
        filler.add_token("T1", Uuid::nil(), 500).await;
        assert_eq!(filler.token_count().await, 1);
        // tracking_since_ms from the first add is preserved (or_insert_with
        // does not overwrite an existing entry).
        assert!(filler.tick(600).await[0].timestamp_ms == 600);
    }
}
