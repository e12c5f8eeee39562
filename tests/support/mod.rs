//! Shared test support: a deterministic in-memory stand-in for the remote
//! store, plus a manually advanced clock.
//!
//! The fake implements the same connection seam as the Redis backend:
//! string keys with expiry (judged against the shared manual clock), sorted
//! sets with both score policies, snapshot-stable cursor scans, and
//! connect/close counters for lifecycle assertions.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicI64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use redis_tag_cache::clock::Clock;
use redis_tag_cache::connection::{
    Connector, NodeInfo, NodeKind, RemoteConnection, ScorePolicy, WriteMode,
};
use redis_tag_cache::error::{CacheError, Result};

// == Manual Clock ==
/// Wall clock advanced by hand from the test body.
pub struct ManualClock {
    now_ms: AtomicI64,
}

impl ManualClock {
    pub fn new(start_ms: i64) -> Arc<Self> {
        Arc::new(Self {
            now_ms: AtomicI64::new(start_ms),
        })
    }

    pub fn advance(&self, by: Duration) {
        self.now_ms.fetch_add(by.as_millis() as i64, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now_unix_ms(&self) -> i64 {
        self.now_ms.load(Ordering::SeqCst)
    }
}

// == Fake Backend State ==
/// Backend state shared between the connector and every connection it hands
/// out, so a forced reconnect still sees the same data.
#[derive(Default)]
pub struct FakeBackend {
    state: parking_lot::Mutex<BackendState>,
    pub connects: AtomicUsize,
    pub closes: AtomicUsize,
    pub script_calls: AtomicUsize,
    /// When set, every remote operation fails with a transient error.
    pub fail_all: AtomicBool,
}

#[derive(Default)]
struct BackendState {
    strings: HashMap<String, (Vec<u8>, i64)>,
    zsets: HashMap<String, Vec<(String, i64)>>,
    scan_snapshot: Vec<(String, i64)>,
}

const SCAN_PAGE: usize = 2;

impl FakeBackend {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Registry or per-tag score currently stored for a member, if any.
    pub fn zset_score(&self, key: &str, member: &str) -> Option<i64> {
        self.state
            .lock()
            .zsets
            .get(key)
            .and_then(|zset| zset.iter().find(|(m, _)| m == member))
            .map(|(_, score)| *score)
    }

    pub fn zset_len(&self, key: &str) -> usize {
        self.state.lock().zsets.get(key).map_or(0, |z| z.len())
    }

    fn check_available(&self) -> Result<()> {
        if self.fail_all.load(Ordering::SeqCst) {
            return Err(CacheError::Unavailable("backend down".to_string()));
        }
        Ok(())
    }
}

// == Fake Connector ==
pub struct FakeConnector {
    backend: Arc<FakeBackend>,
    clock: Arc<ManualClock>,
    supports_set_if_greater: bool,
}

impl FakeConnector {
    pub fn new(backend: Arc<FakeBackend>, clock: Arc<ManualClock>) -> Arc<Self> {
        Arc::new(Self {
            backend,
            clock,
            supports_set_if_greater: true,
        })
    }

    /// Variant whose nodes lack the native set-if-greater primitive, forcing
    /// the script emulation path.
    pub fn without_set_if_greater(backend: Arc<FakeBackend>, clock: Arc<ManualClock>) -> Arc<Self> {
        Arc::new(Self {
            backend,
            clock,
            supports_set_if_greater: false,
        })
    }
}

#[async_trait]
impl Connector for FakeConnector {
    async fn connect(&self) -> Result<Arc<dyn RemoteConnection>> {
        self.backend.check_available()?;
        self.backend.connects.fetch_add(1, Ordering::SeqCst);
        Ok(Arc::new(FakeConnection {
            backend: self.backend.clone(),
            clock: self.clock.clone(),
            supports_set_if_greater: self.supports_set_if_greater,
        }))
    }
}

// == Fake Connection ==
pub struct FakeConnection {
    backend: Arc<FakeBackend>,
    clock: Arc<ManualClock>,
    supports_set_if_greater: bool,
}

#[async_trait]
impl RemoteConnection for FakeConnection {
    async fn get_bytes(&self, key: &str) -> Result<Option<Vec<u8>>> {
        self.backend.check_available()?;
        let mut state = self.backend.state.lock();
        match state.strings.get(key) {
            Some((_, expires_at)) if self.clock.now_unix_ms() >= *expires_at => {
                // Natural expiry at the remote store.
                state.strings.remove(key);
                Ok(None)
            }
            Some((value, _)) => Ok(Some(value.clone())),
            None => Ok(None),
        }
    }

    async fn set_bytes(&self, key: &str, value: &[u8], ttl: Duration) -> Result<()> {
        self.backend.check_available()?;
        let expires_at = self.clock.now_unix_ms() + ttl.as_millis() as i64;
        self.backend
            .state
            .lock()
            .strings
            .insert(key.to_string(), (value.to_vec(), expires_at));
        Ok(())
    }

    async fn delete_key(&self, key: &str, _mode: WriteMode) -> Result<()> {
        self.backend.check_available()?;
        self.backend.state.lock().strings.remove(key);
        Ok(())
    }

    async fn zset_add(
        &self,
        key: &str,
        member: &str,
        score_ms: i64,
        policy: ScorePolicy,
        _mode: WriteMode,
    ) -> Result<()> {
        self.backend.check_available()?;
        let mut state = self.backend.state.lock();
        let zset = state.zsets.entry(key.to_string()).or_default();
        match zset.iter_mut().find(|(m, _)| m == member) {
            Some((_, existing)) => {
                if policy == ScorePolicy::Always || score_ms > *existing {
                    *existing = score_ms;
                }
            }
            None => zset.push((member.to_string(), score_ms)),
        }
        Ok(())
    }

    async fn zset_add_if_greater_script(
        &self,
        key: &str,
        member: &str,
        score_ms: i64,
        mode: WriteMode,
    ) -> Result<()> {
        self.backend.script_calls.fetch_add(1, Ordering::SeqCst);
        self.zset_add(key, member, score_ms, ScorePolicy::GreaterThan, mode)
            .await
    }

    async fn zset_remove(&self, key: &str, member: &str, _mode: WriteMode) -> Result<()> {
        self.backend.check_available()?;
        let mut state = self.backend.state.lock();
        if let Some(zset) = state.zsets.get_mut(key) {
            zset.retain(|(m, _)| m != member);
        }
        Ok(())
    }

    async fn zset_scan(&self, key: &str, cursor: u64) -> Result<(u64, Vec<(String, i64)>)> {
        self.backend.check_available()?;
        let mut state = self.backend.state.lock();
        if cursor == 0 {
            state.scan_snapshot = state.zsets.get(key).cloned().unwrap_or_default();
        }
        let start = cursor as usize;
        let page: Vec<_> = state
            .scan_snapshot
            .iter()
            .skip(start)
            .take(SCAN_PAGE)
            .cloned()
            .collect();
        let next = start + page.len();
        let next_cursor = if next >= state.scan_snapshot.len() {
            0
        } else {
            next as u64
        };
        Ok((next_cursor, page))
    }

    fn nodes(&self) -> Vec<NodeInfo> {
        vec![NodeInfo {
            kind: NodeKind::Standalone,
            supports_set_if_greater: self.supports_set_if_greater,
        }]
    }

    async fn close(&self) {
        self.backend.closes.fetch_add(1, Ordering::SeqCst);
    }
}
