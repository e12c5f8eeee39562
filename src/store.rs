//! Cache Store Module
//!
//! The public surface: get (optionally into a caller buffer), set with
//! optional tags and a ttl, and bulk eviction by tag. Orchestrates the key
//! layout, the connection manager, the tag index, and the reconnect breaker.

use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt;
use tracing::debug;

use crate::breaker::ReconnectBreaker;
use crate::clock::{Clock, SystemClock};
use crate::config::Config;
use crate::connection::{ActiveConnection, ConnectionManager, Connector, RedisConnector};
use crate::error::{CacheError, Result};
use crate::keys::KeyNamespacer;
use crate::tags::TagIndex;
use crate::timestamps::TimestampRegistry;

// == Tag Cache Store ==
/// A resilient tag-aware cache client over a single shared connection.
///
/// Values are opaque byte payloads stored verbatim under namespaced keys
/// with a ttl. Each write may carry invalidation tags; `evict_by_tag`
/// removes every entry sharing a tag. The shared connection is established
/// lazily, exactly once under concurrent demand, and is force-discarded by
/// the reconnect breaker after a sustained run of transient errors.
pub struct TagCacheStore {
    keys: KeyNamespacer,
    tags: TagIndex,
    manager: ConnectionManager,
    breaker: ReconnectBreaker,
    clock: Arc<dyn Clock>,
}

impl TagCacheStore {
    /// Creates a store that connects to Redis per the configuration.
    pub fn new(config: &Config) -> Self {
        Self::with_connector(config, Arc::new(RedisConnector::new(config.url.clone())))
    }

    /// Creates a store with a custom connection factory. Used by tests and
    /// by callers that manage their own connection setup.
    pub fn with_connector(config: &Config, connector: Arc<dyn Connector>) -> Self {
        Self::with_connector_and_clock(config, connector, Arc::new(SystemClock))
    }

    /// Full-control constructor: custom factory and clock.
    pub fn with_connector_and_clock(
        config: &Config,
        connector: Arc<dyn Connector>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let keys = KeyNamespacer::new(&config.instance_name);
        let timestamps = Arc::new(TimestampRegistry::new(clock.now_unix_ms()));
        Self {
            tags: TagIndex::new(keys.clone()),
            keys,
            manager: ConnectionManager::new(connector, timestamps.clone(), clock.clone()),
            breaker: ReconnectBreaker::new(config, timestamps, clock.clone()),
            clock,
        }
    }

    // == Get ==
    /// Retrieves the value stored under `key`, or `None` if absent or
    /// expired at the remote store.
    pub async fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        require_nonempty("key", key)?;
        let active = self.manager.acquire().await?;
        match active.conn.get_bytes(&self.keys.value_key(key)).await {
            Ok(value) => Ok(value),
            Err(err) => Err(self.after_error(&active, err).await),
        }
    }

    // == Get Into ==
    /// Copies the value stored under `key` into a caller-supplied sink,
    /// returning whether the key was found. The fetched buffer is released
    /// on every path before returning.
    pub async fn get_into(&self, key: &str, sink: &mut Vec<u8>) -> Result<bool> {
        require_nonempty("key", key)?;
        let active = self.manager.acquire().await?;
        match active.conn.get_bytes(&self.keys.value_key(key)).await {
            Ok(Some(value)) => {
                sink.extend_from_slice(&value);
                Ok(true)
            }
            Ok(None) => Ok(false),
            Err(err) => Err(self.after_error(&active, err).await),
        }
    }

    // == Set ==
    /// Stores `value` under `key` with the given ttl, tagging it with each
    /// of `tags`.
    ///
    /// The value write is awaited: once this returns Ok, a subsequent `get`
    /// of the same key observes the value until the ttl elapses. Tag-index
    /// writes are issued afterwards, sequentially per tag, fire-and-forget:
    /// tag bookkeeping may lag or miss under load, and tag failures are
    /// never surfaced here.
    pub async fn set(&self, key: &str, value: &[u8], tags: &[String], ttl: Duration) -> Result<()> {
        require_nonempty("key", key)?;
        for tag in tags {
            require_nonempty("tag", tag)?;
        }
        let active = self.manager.acquire().await?;

        if let Err(err) = active
            .conn
            .set_bytes(&self.keys.value_key(key), value, ttl)
            .await
        {
            return Err(self.after_error(&active, err).await);
        }

        if !tags.is_empty() {
            let expiration_ms = self.expiration_timestamp(ttl);
            for tag in tags {
                // Global registration precedes the per-tag member write, so
                // an evictor that finds the tag in the registry also finds
                // the member. No cross-tag ordering is guaranteed.
                if let Err(err) = self
                    .tags
                    .register_tag_globally(&active, tag, expiration_ms)
                    .await
                {
                    debug!(%err, %tag, "tag registry write not issued");
                }
                if let Err(err) = self.tags.record_tag(&active, tag, key, expiration_ms).await {
                    debug!(%err, %tag, "tag member write not issued");
                }
            }
        }
        Ok(())
    }

    // == Set Segments ==
    /// Stores a multi-segment payload under `key`. The segments are copied
    /// into one contiguous buffer before transmission, since the wire write
    /// requires a single chunk; the buffer is dropped only after the remote
    /// write completes.
    pub async fn set_segments(
        &self,
        key: &str,
        segments: &[&[u8]],
        tags: &[String],
        ttl: Duration,
    ) -> Result<()> {
        if let [single] = segments {
            return self.set(key, single, tags, ttl).await;
        }
        let total: usize = segments.iter().map(|s| s.len()).sum();
        let mut contiguous = Vec::with_capacity(total);
        for segment in segments {
            contiguous.extend_from_slice(segment);
        }
        self.set(key, &contiguous, tags, ttl).await
    }

    // == Evict By Tag ==
    /// Evicts every entry tagged with `tag`, draining the tag index's paged
    /// scan. Exists for its side effects; the evicted keys are discarded.
    pub async fn evict_by_tag(&self, tag: &str) -> Result<()> {
        require_nonempty("tag", tag)?;
        let active = self.manager.acquire().await?;
        let mut evictions = Box::pin(self.tags.evict_tag(&active, tag));
        while let Some(entry) = evictions.next().await {
            if let Err(err) = entry {
                drop(evictions);
                return Err(self.after_error(&active, err).await);
            }
        }
        Ok(())
    }

    // == Close ==
    /// Disposes the store: releases the shared connection (at most once) and
    /// fails all subsequent operations with [`CacheError::Disposed`].
    pub async fn close(&self) {
        self.manager.close().await;
    }

    /// Runs breaker bookkeeping for a failed operation, then hands the
    /// original error back for the caller to re-raise unchanged.
    async fn after_error(&self, active: &ActiveConnection, err: CacheError) -> CacheError {
        self.breaker.on_error(&self.manager, active, &err).await;
        err
    }

    /// Absolute expiration instant for a ttl, in Unix milliseconds.
    ///
    /// Interleaves two time systems: the local clock here and the remote
    /// store's own clock for its ttl handling. If the two disagree badly we
    /// have bigger problems, so no reconciliation is attempted.
    fn expiration_timestamp(&self, ttl: Duration) -> i64 {
        self.clock.now_unix_ms() + ttl.as_millis() as i64
    }
}

/// Rejects empty key and tag names before any connection work happens.
fn require_nonempty(what: &str, value: &str) -> Result<()> {
    if value.is_empty() {
        return Err(CacheError::InvalidRequest(format!(
            "{what} must not be empty"
        )));
    }
    Ok(())
}

impl std::fmt::Debug for TagCacheStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TagCacheStore")
            .field("manager", &self.manager)
            .finish_non_exhaustive()
    }
}
