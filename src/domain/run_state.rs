//! Listener supervisor lifecycle state, distinct from a single
//! market's [`MarketState`](super::model::MarketState). Shared by the
//! supervisor, the manager, and the metrics/health adapters.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ListenerRunState {
    Idle,
    Starting,
    Running,
    Degraded,
    Stopping,
    Stopped,
}

impl ListenerRunState {
    /// Numeric encoding for the `lob_listener_state` gauge.
    pub fn as_metric_value(self) -> i64 {
        match self {
            Self::Idle => 0,
            Self::Starting => 1,
            Self::Running => 2,
            Self::Degraded => 3,
            Self::Stopping => 4,
            Self::Stopped => 5,
        }
    }

    /// Whether this listener can serve as evidence the process is ready.
    pub fn counts_as_ready(self) -> bool {
        matches!(self, Self::Running | Self::Degraded)
    }
}
