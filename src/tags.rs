//! Tag Index Module
//!
//! Maintains, for each tag, a sorted set of keys scored by expiration time,
//! plus a global registry of all known tags scored the same way. Tags are a
//! secondary indexing structure layered over a store with no native tagging
//! primitive; tag writes are best-effort by design.

use std::collections::VecDeque;

use futures::stream::{try_unfold, Stream};

use crate::connection::{ActiveConnection, ScorePolicy, WriteMode};
use crate::error::Result;
use crate::keys::KeyNamespacer;

// == Tag Index ==
/// Sorted-set bookkeeping for tags. Stateless apart from the key layout;
/// every operation runs against the caller-supplied connection handle.
#[derive(Debug, Clone)]
pub struct TagIndex {
    keys: KeyNamespacer,
}

impl TagIndex {
    /// Creates a tag index over the given key layout.
    pub fn new(keys: KeyNamespacer) -> Self {
        Self { keys }
    }

    // == Record Tag ==
    /// Upserts `(key, expiration)` into the per-tag set. Latest score wins
    /// unconditionally — a key's ttl can legitimately shrink on overwrite.
    /// Fire-and-forget: the outcome is not observed.
    pub async fn record_tag(
        &self,
        active: &ActiveConnection,
        tag: &str,
        key: &str,
        expiration_ms: i64,
    ) -> Result<()> {
        active
            .conn
            .zset_add(
                &self.keys.tag_key(tag),
                key,
                expiration_ms,
                ScorePolicy::Always,
                WriteMode::FireAndForget,
            )
            .await
    }

    // == Register Tag Globally ==
    /// Upserts `(tag, expiration)` into the global tag registry with
    /// set-if-greater semantics: the registry score for a tag is the maximum
    /// expiration ever associated with it and never regresses.
    ///
    /// Uses the native primitive when the capability probe found it on every
    /// node; otherwise a single server-side atomic script, so concurrent
    /// callers cannot race a read-then-write. Fire-and-forget either way.
    pub async fn register_tag_globally(
        &self,
        active: &ActiveConnection,
        tag: &str,
        expiration_ms: i64,
    ) -> Result<()> {
        let registry = self.keys.tag_registry_key();
        if active.caps.use_set_if_greater {
            active
                .conn
                .zset_add(
                    registry,
                    tag,
                    expiration_ms,
                    ScorePolicy::GreaterThan,
                    WriteMode::FireAndForget,
                )
                .await
        } else {
            active
                .conn
                .zset_add_if_greater_script(registry, tag, expiration_ms, WriteMode::FireAndForget)
                .await
        }
    }

    // == Evict Tag ==
    /// Pages through the per-tag set with a cursor scan and, for each member,
    /// deletes the value key and removes the member from the set. Yields the
    /// evicted keys as a lazy, forward-only stream.
    ///
    /// The deletes are fire-and-forget; the scan's own paging is the
    /// integrity check (a broken connection surfaces there as a stream
    /// error). The stream ends when the cursor is exhausted and is not
    /// restartable.
    pub fn evict_tag(
        &self,
        active: &ActiveConnection,
        tag: &str,
    ) -> impl Stream<Item = Result<String>> + Send {
        let scan = EvictScan {
            conn: active.clone(),
            keys: self.keys.clone(),
            tag_key: self.keys.tag_key(tag),
            cursor: 0,
            buffered: VecDeque::new(),
            exhausted: false,
        };

        try_unfold(scan, |mut scan| async move {
            loop {
                if let Some(member) = scan.buffered.pop_front() {
                    let value_key = scan.keys.value_key(&member);
                    scan.conn
                        .conn
                        .delete_key(&value_key, WriteMode::FireAndForget)
                        .await?;
                    scan.conn
                        .conn
                        .zset_remove(&scan.tag_key, &member, WriteMode::FireAndForget)
                        .await?;
                    return Ok(Some((member, scan)));
                }
                if scan.exhausted {
                    return Ok(None);
                }

                let (next, page) = scan.conn.conn.zset_scan(&scan.tag_key, scan.cursor).await?;
                scan.cursor = next;
                if next == 0 {
                    scan.exhausted = true;
                }
                scan.buffered.extend(page.into_iter().map(|(member, _)| member));
            }
        })
    }
}

/// Cursor state threaded through the eviction stream.
struct EvictScan {
    conn: ActiveConnection,
    keys: KeyNamespacer,
    tag_key: String,
    cursor: u64,
    buffered: VecDeque<String>,
    exhausted: bool,
}
