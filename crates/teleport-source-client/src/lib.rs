//! Source-ledger access for the Teleport relayer
//!
//! This crate provides the JSON-RPC client used to poll `TeleportInitiated` logs from the
//! source ledger, decoding of those logs into migration events, and the pull-based
//! [`EventSource`] that turns polling into a deduplicated, resumable event sequence.

pub mod abi;
pub mod client;
pub mod observed;
pub mod source;

pub use client::{LogFetcher, SourceClient, SourceClientError};
pub use observed::{LogPosition, ObservedEvent, Watermark};
pub use source::{EventSource, EventSourceConfig, SourceItem};
