//! Redis Tag Cache - A resilient tag-aware remote cache client
//!
//! Stores opaque byte payloads in Redis under namespaced keys, associates
//! each payload with zero or more invalidation tags, and supports bulk
//! eviction of every entry sharing a tag. A single shared connection is
//! established lazily and guarded by a reconnect breaker under transient
//! network failure.

pub mod breaker;
pub mod clock;
pub mod config;
pub mod connection;
pub mod error;
pub mod keys;
pub mod store;
pub mod tags;
pub mod timestamps;


pub use config::Config;
pub use error::{CacheError, Result};
pub use store::TagCacheStore;
