//! Ports Layer - Hexagonal Architecture Boundaries
//!
//! Defines the interfaces (traits) that the usecases layer requires from
//! the outside world. Adapters implement these traits; the domain/usecases
//! layer depends only on the traits here.
//!
//! Port categories:
//! - `venue`: `Discoverer` + `Feed`, the capability set per venue (C2)
//! - `sink`: the batched, persistence boundary (C7)
//! - `config_store`: read-only access to externally-owned listener configs

pub mod config_store;
pub mod sink;
pub mod venue;

pub use config_store::ConfigStore;
pub use sink::{Sink, SinkError, SinkRecord};
pub use venue::{BookSide, Discoverer, Feed, FeedEvent, LevelDelta, VenueAdapter, VenueError};
