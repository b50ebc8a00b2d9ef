//! Switchboard Config - Versioned Configuration Store
//!
//! Holds the process-wide [`ConfigSnapshot`](switchboard_core::ConfigSnapshot)
//! and keeps it fresh from a remote [`ConfigSource`].

pub mod document;
pub mod source;
pub mod store;

pub use document::{decode_snapshot, ConfigDocument};
pub use source::{
    ConfigSource, FetchOutcome, FileConfigSource, HttpConfigSource, InMemoryConfigSource,
};
pub use store::{ConfigStore, RefreshOutcome, StoreOptions, StoreStatus};
