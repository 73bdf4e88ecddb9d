//! Polymarket discovery adapter — paginated Gamma REST, joined
//! events↔markets, one normalized `Market` per outcome token.

use std::num::NonZeroU32;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use governor::{Quota, RateLimiter};
use reqwest::{Client, StatusCode};
use tracing::{debug, instrument, warn};
use uuid::Uuid;

use crate::config::PolymarketConfig;
use crate::domain::{Filters, Market, MarketState, Platform};
use crate::ports::venue::{Discoverer, VenueError};

use super::types::{GammaEvent, GammaEventsResponse, GammaMarket};

type Limiter = RateLimiter<
governor::state::NotKeyed,
governor::state::InMemoryState,
governor::clock::DefaultClock,
>;

/// Gamma REST discovery client. Proactively rate-limited beyond
/// just honoring `Retry-After` on 429.
pub struct PolymarketDiscoverer {
    client: Client,
    base_url: String,
    listener_id: Uuid,
    limiter: Arc<Limiter>,
    page_size: u32,
}

impl PolymarketDiscoverer {
    pub fn new(config: &PolymarketConfig, listener_id: Uuid) -> anyhow::Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_s))
            .build()?;
        let quota = Quota::per_second(NonZeroU32::new(5).unwrap());
        Ok(Self {
                client,
                base_url: config.gamma_base_url.clone(),
                listener_id,
                limiter: Arc::new(RateLimiter::direct(quota)),
                page_size: config.discovery_page_size,
            })
    }

    async fn fetch_page(
        &self,
        offset: u32,
        extra: &[(&str, String)],
    ) -> Result<GammaEventsResponse, VenueError> {
        self.limiter.until_ready().await;

        let mut req = self
            .client
            .get(format!("{}/events", self.base_url))
            .query(&[("limit", self.page_size.to_string()), ("offset", offset.to_string())])
            .query(&[("active", "true")]);
        for (k, v) in extra {
            req = req.query(&[(k, v)]);
        }

        let resp = req
            .send()
            .await
            .map_err(|e| VenueError::Transient(e.to_string()))?;

        match resp.status() {
            StatusCode::OK => resp
                .json::<GammaEventsResponse>()
                .await
                .map_err(|e| VenueError::Protocol(e.to_string())),
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
                Err(VenueError::Auth(format!("gamma returned {}", resp.status())))
            }
            StatusCode::TOO_MANY_REQUESTS => {
                let retry_after_ms = resp
                    .headers()
                    .get("retry-after")
                    .and_then(|v| v.to_str().ok())
                    .and_then(|v| v.parse::<u64>().ok())
                    .map(|secs| secs * 1_000)
                    .unwrap_or(1_000);
                Err(VenueError::RateLimited { retry_after_ms })
            }
            status if status.is_client_error() => {
                warn!(%status, "gamma 4xx, skipping this discovery cycle");
                Ok(Vec::new())
            }
            status => Err(VenueError::Transient(format!("gamma returned {status}"))),
        }
    }

    async fn fetch_all(&self, extra: &[(&str, String)]) -> Result<Vec<GammaEvent>, VenueError> {
        let mut all = Vec::new();
        let mut offset = 0;
        loop {
            let page = self.fetch_page(offset, extra).await?;
            let got = page.len() as u32;
            all.extend(page);
            if got < self.page_size {
                break;
            }
            offset += self.page_size;
        }
        Ok(all)
    }

    fn parse_timestamp(s: &Option<String>) -> Option<DateTime<Utc>> {
        s.as_ref()
            .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
            .map(|dt| dt.with_timezone(&Utc))
    }

    fn market_passes_filters(
        market: &GammaMarket,
        condition_ids: &[String],
        slug_patterns: &[String],
        min_liquidity: Option<f64>,
        min_volume: Option<f64>,
    ) -> bool {
        if !condition_ids.is_empty() && !condition_ids.contains(&market.condition_id) {
            return false;
        }
        if !slug_patterns.is_empty() {
            let slug_lower = market.slug.to_lowercase();
            if !slug_patterns
                .iter()
                .any(|pat| slug_lower.contains(&pat.to_lowercase()))
            {
                return false;
            }
        }
        if let Some(min_liq) = min_liquidity {
            if market.liquidity_num.unwrap_or(0.0) < min_liq {
                return false;
            }
        }
        if let Some(min_vol) = min_volume {
            if market.volume_num.unwrap_or(0.0) < min_vol {
                return false;
            }
        }
        true
    }

    /// Fan a single condition's market out into one `Market` per outcome
    /// token — `clob_token_ids`/`outcomes` are JSON-array-encoded strings
    /// on the wire.
    fn markets_from_condition(&self, event: &GammaEvent, market: &GammaMarket) -> Vec<Market> {
        let token_ids: Vec<String> = market
            .clob_token_ids
            .as_deref()
            .and_then(|s| serde_json::from_str(s).ok())
            .unwrap_or_default();

        let now = Utc::now();
        let tags = event
            .tags
            .iter()
            .filter_map(|t| t.label.clone())
            .collect::<Vec<_>>();

        token_ids
            .into_iter()
            .map(|token_id| Market {
                id: Uuid::new_v4(),
                listener_id: self.listener_id,
                platform: Platform::Polymarket,
                condition_id: market.condition_id.clone(),
                token_id,
                slug: market.slug.clone(),
                title: market.question.clone(),
                category: market.category.clone(),
                series_id: event.series_id.clone(),
                tags: tags.clone(),
                start_time: Self::parse_timestamp(&market.start_date),
                end_time: Self::parse_timestamp(&market.end_date),
                is_active: market.active,
                is_closed: market.closed,
                state: MarketState::Discovered,
                created_at: now,
                updated_at: now,
            })
                .collect()
    }
}

#[async_trait]
impl Discoverer for PolymarketDiscoverer {
    #[instrument(skip(self, filters), fields(listener_id = %self.listener_id))]
    async fn discover(&self, filters: &Filters) -> Result<Vec<Market>, VenueError> {
        let Filters::Polymarket {
            series_ids,
            tag_ids,
            slug_patterns,
            condition_ids,
            min_liquidity,
            min_volume,
        } = filters
        else {
            return Err(VenueError::Protocol(
                    "Polymarket discoverer received non-Polymarket filters".into(),
                ));
        };

        let mut events = Vec::new();
        if series_ids.is_empty() && tag_ids.is_empty() {
            events.extend(self.fetch_all(&[]).await?);
        } else {
            for series_id in series_ids {
                events.extend(
                    self.fetch_all(&[("series_id", series_id.clone())]).await?,
                );
            }
            for tag_id in tag_ids {
                events.extend(self.fetch_all(&[("tag_id", tag_id.clone())]).await?);
            }
        }

        let mut markets = Vec::new();
        for event in &events {
            for market in &event.markets {
                if !Self::market_passes_filters(
                    market,
                    condition_ids,
                    slug_patterns,
                    *min_liquidity,
                    *min_volume,
                ) {
                    continue;
                }
                markets.extend(self.markets_from_condition(event, market));
            }
        }

        debug!(count = markets.len(), "Polymarket discovery cycle complete");
        Ok(markets)
    }
}
