//! Kalshi discovery adapter — authenticated REST, cursor pagination, one
//! `Market` per ticker.

use std::num::NonZeroU32;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use governor::{Quota, RateLimiter};
use reqwest::{Client, StatusCode};
use tracing::{debug, instrument, warn};
use uuid::Uuid;

use crate::config::KalshiConfig;
use crate::domain::{Filters, KalshiStatus, Market, MarketState, Platform};
use crate::ports::venue::{Discoverer, VenueError};

use super::auth::KalshiAuth;
use super::types::{KalshiMarket, KalshiMarketsResponse};

type Limiter = RateLimiter<
governor::state::NotKeyed,
governor::state::InMemoryState,
governor::clock::DefaultClock,
>;

const MARKETS_PATH: &str = "/trade-api/v2/markets";

pub struct KalshiDiscoverer {
    client: Client,
    base_url: String,
    listener_id: Uuid,
    auth: Option<KalshiAuth>,
    limiter: Arc<Limiter>,
}

impl KalshiDiscoverer {
    pub fn new(config: &KalshiConfig, listener_id: Uuid) -> anyhow::Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_s))
            .build()?;
        let auth = KalshiAuth::from_config(config)?;
        let quota = Quota::per_second(NonZeroU32::new(10).unwrap());
        Ok(Self {
                client,
                base_url: config.rest_base_url.clone(),
                listener_id,
                auth,
                limiter: Arc::new(RateLimiter::direct(quota)),
            })
    }

    async fn fetch_page(
        &self,
        cursor: Option<&str>,
        status: Option<KalshiStatus>,
        series_ticker: Option<&str>,
        event_ticker: Option<&str>,
    ) -> Result<KalshiMarketsResponse, VenueError> {
        self.limiter.until_ready().await;

        let mut req = self
            .client
            .get(format!("{}{}", self.base_url, MARKETS_PATH))
            .query(&[("limit", "200")]);
        if let Some(c) = cursor {
            req = req.query(&[("cursor", c)]);
        }
        if let Some(s) = status {
            let s = match s {
                KalshiStatus::Open => "open",
                KalshiStatus::Closed => "closed",
                KalshiStatus::Settled => "settled",
            };
            req = req.query(&[("status", s)]);
        }
        if let Some(s) = series_ticker {
            req = req.query(&[("series_ticker", s)]);
        }
        if let Some(e) = event_ticker {
            req = req.query(&[("event_ticker", e)]);
        }

        if let Some(auth) = &self.auth {
            let headers = auth.sign(Utc::now().timestamp_millis(), "GET", MARKETS_PATH);
            req = req
                .header("KALSHI-ACCESS-KEY", headers.key)
                .header("KALSHI-ACCESS-TIMESTAMP", headers.timestamp)
                .header("KALSHI-ACCESS-SIGNATURE", headers.signature);
        }

        let resp = req
            .send()
            .await
            .map_err(|e| VenueError::Transient(e.to_string()))?;

        match resp.status() {
            StatusCode::OK => resp
                .json::<KalshiMarketsResponse>()
                .await
                .map_err(|e| VenueError::Protocol(e.to_string())),
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
                Err(VenueError::Auth(format!("kalshi returned {}", resp.status())))
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
                warn!(%status, "kalshi 4xx, skipping this discovery cycle");
                Ok(KalshiMarketsResponse { markets: Vec::new(), cursor: None })
            }
            status => Err(VenueError::Transient(format!("kalshi returned {status}"))),
        }
    }

    async fn fetch_all(
        &self,
        status: Option<KalshiStatus>,
        series_ticker: Option<&str>,
        event_ticker: Option<&str>,
    ) -> Result<Vec<KalshiMarket>, VenueError> {
        let mut all = Vec::new();
        let mut cursor: Option<String> = None;
        loop {
            let page = self
                .fetch_page(cursor.as_deref(), status, series_ticker, event_ticker)
                .await?;
            let next_cursor = page.cursor.filter(|c| !c.is_empty());
            all.extend(page.markets);
            match next_cursor {
                Some(c) => cursor = Some(c),
                None => break,
            }
        }
        Ok(all)
    }

    fn to_domain_market(&self, km: &KalshiMarket) -> Market {
        let now = Utc::now();
        Market {
            id: Uuid::new_v4(),
            listener_id: self.listener_id,
            platform: Platform::Kalshi,
            condition_id: km.ticker.clone(),
            token_id: km.ticker.clone(),
            slug: km.ticker.clone(),
            title: km.title.clone(),
            category: None,
            series_id: km.series_ticker.clone(),
            tags: Vec::new(),
            start_time: km.open_time.as_deref().and_then(parse_timestamp),
            end_time: km.close_time.as_deref().and_then(parse_timestamp),
            is_active: km.status == "open",
            is_closed: km.status == "closed" || km.status == "settled",
            state: MarketState::Discovered,
            created_at: now,
            updated_at: now,
        }
    }
}

fn parse_timestamp(s: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s).ok().map(|dt| dt.with_timezone(&Utc))
}

#[async_trait]
impl Discoverer for KalshiDiscoverer {
    #[instrument(skip(self, filters), fields(listener_id = %self.listener_id))]
    async fn discover(&self, filters: &Filters) -> Result<Vec<Market>, VenueError> {
        let Filters::Kalshi {
            series_tickers,
            event_tickers,
            market_tickers,
            status,
            min_volume,
            min_open_interest,
            title_contains,
        } = filters
        else {
            return Err(VenueError::Protocol(
                    "Kalshi discoverer received non-Kalshi filters".into(),
                ));
        };

        let mut raw = Vec::new();
        if series_tickers.is_empty() && event_tickers.is_empty() {
            raw.extend(self.fetch_all(*status, None, None).await?);
        } else {
            for series in series_tickers {
                raw.extend(self.fetch_all(*status, Some(series), None).await?);
            }
            for event in event_tickers {
                raw.extend(self.fetch_all(*status, None, Some(event)).await?);
            }
        }

        let markets = raw
            .iter()
            .filter(|km| {
                if !market_tickers.is_empty() && !market_tickers.contains(&km.ticker) {
                    return false;
                }
                if let Some(min_vol) = min_volume {
                    if km.volume.unwrap_or(0.0) < *min_vol {
                        return false;
                    }
                }
                if let Some(min_oi) = min_open_interest {
                    if km.open_interest.unwrap_or(0.0) < *min_oi {
                        return false;
                    }
                }
                if let Some(pat) = title_contains {
                    if !km.title.to_lowercase().contains(&pat.to_lowercase()) {
                        return false;
                    }
                }
                true
            })
                .map(|km| self.to_domain_market(km))
                .collect::<Vec<_>>();

        debug!(count = markets.len(), "Kalshi discovery cycle complete");
        Ok(markets)
    }
}
