//! Polymarket venue adapter: Gamma REST discovery + CLOB WebSocket feed.

pub mod discovery;
pub mod feed;
pub mod types;

pub use discovery::PolymarketDiscoverer;
pub use feed::PolymarketFeed;

use async_trait::async_trait;

use crate::domain::{Filters, Market};
use crate::ports::venue::{Discoverer, Feed, FeedEvent, VenueError};

/// Bundles the discovery and feed halves into the single `Discoverer + Feed`
/// type the supervisor expects.
pub struct PolymarketVenue {
    pub discoverer: PolymarketDiscoverer,
    pub feed: PolymarketFeed,
}

impl PolymarketVenue {
    pub fn new(discoverer: PolymarketDiscoverer, feed: PolymarketFeed) -> Self {
        Self { discoverer, feed }
    }
}

#[async_trait]
impl Discoverer for PolymarketVenue {
    async fn discover(&self, filters: &Filters) -> Result<Vec<Market>, VenueError> {
        self.discoverer.discover(filters).await
    }
}

#[async_trait]
impl Feed for PolymarketVenue {
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
