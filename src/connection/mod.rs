//! Connection Module
//!
//! The seam between the cache client and the remote store: an object-safe
//! async trait over the handful of Redis operations the client needs, a
//! pluggable connector, and the manager that owns the single shared handle.
//!
//! Production code connects through [`RedisConnector`]; tests supply an
//! in-memory fake.

mod manager;
mod redis;

pub use self::manager::ConnectionManager;
pub use self::redis::RedisConnector;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use crate::error::Result;

// == Write Mode ==
/// How a mutating command's outcome is observed.
///
/// `FireAndForget` issues the write without awaiting or checking its result;
/// each such call site is a deliberate latency/consistency trade-off, never
/// an accidentally dropped error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteMode {
    /// Await the command and surface its error
    Awaited,
    /// Issue the command and discard its outcome
    FireAndForget,
}

// == Score Policy ==
/// Conditional behavior of a sorted-set add.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScorePolicy {
    /// Unconditional upsert; the new score always wins and may regress
    Always,
    /// Upsert only if the new score exceeds the existing one (ZADD GT)
    GreaterThan,
}

// == Topology Types ==
/// Kind of a remote node, as reported by the capability probe.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeKind {
    /// A simple standalone server; multi-command transactions are available
    Standalone,
    /// A cluster or proxy node
    Cluster,
}

/// Per-node snapshot taken once when the connection is established.
#[derive(Debug, Clone)]
pub struct NodeInfo {
    /// Topology kind of the node
    pub kind: NodeKind,
    /// Whether the node supports the native set-if-greater sorted-set add
    pub supports_set_if_greater: bool,
}

/// What the connected topology supports, derived from the one-time probe.
#[derive(Debug, Clone, Copy, Default)]
pub struct Capabilities {
    /// All nodes are standalone; multi-command transactions are usable
    pub use_multi_exec: bool,
    /// All nodes support the native set-if-greater primitive
    pub use_set_if_greater: bool,
}

impl Capabilities {
    /// Derives capabilities from a topology snapshot. An empty snapshot
    /// grants nothing.
    pub fn probe(nodes: &[NodeInfo]) -> Self {
        Self {
            use_multi_exec: !nodes.is_empty()
                && nodes.iter().all(|n| n.kind == NodeKind::Standalone),
            use_set_if_greater: !nodes.is_empty()
                && nodes.iter().all(|n| n.supports_set_if_greater),
        }
    }
}

// == Remote Connection Trait ==
/// The remote store operations this client consumes.
///
/// Implementations must be safe for concurrent use through a shared
/// reference; the manager hands the same handle to every caller.
#[async_trait]
pub trait RemoteConnection: Send + Sync {
    /// Reads the raw bytes stored under `key`.
    async fn get_bytes(&self, key: &str) -> Result<Option<Vec<u8>>>;

    /// Writes `value` under `key` with a relative expiry. Always awaited.
    async fn set_bytes(&self, key: &str, value: &[u8], ttl: Duration) -> Result<()>;

    /// Deletes `key`.
    async fn delete_key(&self, key: &str, mode: WriteMode) -> Result<()>;

    /// Adds `member` to the sorted set at `key` with the given score.
    async fn zset_add(
        &self,
        key: &str,
        member: &str,
        score_ms: i64,
        policy: ScorePolicy,
        mode: WriteMode,
    ) -> Result<()>;

    /// Emulates a set-if-greater add with a single server-side atomic
    /// script, for topologies without the native primitive.
    async fn zset_add_if_greater_script(
        &self,
        key: &str,
        member: &str,
        score_ms: i64,
        mode: WriteMode,
    ) -> Result<()>;

    /// Removes `member` from the sorted set at `key`.
    async fn zset_remove(&self, key: &str, member: &str, mode: WriteMode) -> Result<()>;

    /// One page of a cursor scan over the sorted set at `key`. The first
    /// call passes cursor 0; a returned cursor of 0 means the scan is
    /// exhausted.
    async fn zset_scan(&self, key: &str, cursor: u64) -> Result<(u64, Vec<(String, i64)>)>;

    /// Topology snapshot taken when the connection was established, used
    /// once by the capability probe.
    fn nodes(&self) -> Vec<NodeInfo>;

    /// Closes the underlying connection. Best-effort; errors are logged by
    /// the implementation, never returned.
    async fn close(&self);
}

// == Connector Trait ==
/// Pluggable factory for establishing remote connections.
#[async_trait]
pub trait Connector: Send + Sync {
    /// Performs the actual network connect.
    async fn connect(&self) -> Result<Arc<dyn RemoteConnection>>;
}

// == Active Connection ==
/// A live connection handle paired with its probed capabilities.
///
/// Cheap to clone; handle identity (for compare-and-swap decisions) is the
/// identity of the inner `Arc`.
#[derive(Clone)]
pub struct ActiveConnection {
    /// The shared remote connection
    pub conn: Arc<dyn RemoteConnection>,
    /// Capabilities probed once when this connection was established
    pub caps: Capabilities,
}

impl ActiveConnection {
    /// Returns true if both handles wrap the same underlying connection.
    pub fn same_handle(&self, other: &ActiveConnection) -> bool {
        Arc::ptr_eq(&self.conn, &other.conn)
    }
}

impl std::fmt::Debug for ActiveConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ActiveConnection")
            .field("caps", &self.caps)
            .finish_non_exhaustive()
    }
}
