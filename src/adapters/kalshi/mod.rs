//! Kalshi venue adapter: RSA-PSS authenticated REST discovery + WebSocket
//! feed with Yes/No → bid/ask normalization.

pub mod auth;
pub mod discovery;
pub mod feed;
pub mod types;

pub use auth::KalshiAuth;
pub use discovery::KalshiDiscoverer;
pub use feed::KalshiFeed;

use async_trait::async_trait;

use crate::domain::{Filters, Market};
use crate::ports::venue::{Discoverer, Feed, FeedEvent, VenueError};

/// Bundles the discovery and feed halves into the single `Discoverer + Feed`
/// type the supervisor expects.
pub struct KalshiVenue {
    pub discoverer: KalshiDiscoverer,
    pub feed: KalshiFeed,
}

impl KalshiVenue {
    pub fn new(discoverer: KalshiDiscoverer, feed: KalshiFeed) -> Self {
        Self { discoverer, feed }
    }
}

#[async_trait]
impl Discoverer for KalshiVenue {
    async fn discover(&self, filters: &Filters) -> Result<Vec<Market>, VenueError> {
        self.discoverer.discover(filters).await
    }
}

#[async_trait]
impl Feed for KalshiVenue {
    async fn connect(&self) -> Result<(), VenueError> {
        self.feed.connect().await
    }

    async fn subscribe(&self, token_ids: &[String]) -> Result<(), VenueError> {
        self.feed.subscribe(token_ids).await
    }

    async fn unsubscribe(&self, token_ids: &[String]) -> Result<(), VenueError> {
        self.feed.unsubscribe(token_ids).await
    }

    async fn next_event(&self) -> Result<FeedEvent, VenueError> {
        self.feed.next_event().await
    }
}
