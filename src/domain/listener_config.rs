//! Listener configuration — externally owned.
//!
//! These records live in the sink-backed config store; this module only
//! defines their shape plus the platform-dependent filter sum type.
//! `PartialEq` is derived deliberately: the Listener Manager diffs
//! configs field-by-field to decide `new` / `gone` / `changed`.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::model::Platform;

/// Kalshi market status filter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum KalshiStatus {
    Open,
    Closed,
    Settled,
}

/// Platform-dependent discovery filters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "platform", rename_all = "lowercase")]
pub enum Filters {
    Polymarket {
        #[serde(default)]
        series_ids: Vec<String>,
        #[serde(default)]
        tag_ids: Vec<String>,
        #[serde(default)]
        slug_patterns: Vec<String>,
        #[serde(default)]
        condition_ids: Vec<String>,
        min_liquidity: Option<f64>,
        min_volume: Option<f64>,
    },
    Kalshi {
        #[serde(default)]
        series_tickers: Vec<String>,
        #[serde(default)]
        event_tickers: Vec<String>,
        #[serde(default)]
        market_tickers: Vec<String>,
        status: Option<KalshiStatus>,
        min_volume: Option<f64>,
        min_open_interest: Option<f64>,
        title_contains: Option<String>,
    },
}

impl Filters {
    /// The platform this filter set applies to.
    pub fn platform(&self) -> Platform {
        match self {
            Filters::Polymarket {.. } => Platform::Polymarket,
            Filters::Kalshi {.. } => Platform::Kalshi,
        }
    }
}

/// A single listener configuration, owned by the sink-backed store.
///
/// `id` identifies the running supervisor; `name` is a unique human label.
/// The manager diffs these by `id` to spawn/stop/restart supervisors.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ListenerConfig {
    pub id: Uuid,
    pub name: String,
    pub platform: Platform,
    pub description: Option<String>,
    pub filters: Filters,
    pub discovery_interval_s: u64,
    pub emit_interval_ms: u64,
    pub enable_forward_fill: bool,
    pub is_active: bool,
}

impl ListenerConfig {
    /// Whether the non-identity fields differ from `other` — the manager's
    /// `changed` test: `new`/`gone` are computed from `id` set
    /// membership, `changed` from equality of the rest.
    pub fn differs_from(&self, other: &ListenerConfig) -> bool {
        self != other
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base() -> ListenerConfig {
        ListenerConfig {
            id: Uuid::nil(),
            name: "poly-btc".into(),
            platform: Platform::Polymarket,
            description: None,
            filters: Filters::Polymarket {
                series_ids: vec!["10345".into()],
                tag_ids: vec![],
                slug_patterns: vec![],
                condition_ids: vec![],
                min_liquidity: None,
                min_volume: None,
            },
            discovery_interval_s: 60,
            emit_interval_ms: 100,
            enable_forward_fill: true,
            is_active: true,
        }
    }

    #[test]
    fn identical_configs_do_not_differ() {
        assert!(!base().differs_from(&base()));
    }

    #[test]
    fn changed_emit_interval_differs() {
        let mut changed = base();
        changed.emit_interval_ms = 200;
        assert!(base().differs_from(&changed));
    }
}
