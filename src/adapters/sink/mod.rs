//! Sink adapters: a generic batching/retrying `Sink` over a pluggable
//! `RecordWriter`, plus a JSONL writer implementation.

pub mod batching;
pub mod jsonl;

pub use batching::{BatchingSink, RecordWriter};
pub use jsonl::JsonlWriter;
