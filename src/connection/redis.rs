//! Redis Backend Module
//!
//! Production implementation of the connection seam over a multiplexed
//! async Redis connection.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use redis::aio::MultiplexedConnection;
use redis::Client;
use tokio::sync::mpsc;
use tracing::debug;

use crate::connection::{
    Connector, NodeInfo, NodeKind, RemoteConnection, ScorePolicy, WriteMode,
};
use crate::error::{CacheError, Result};

/// Server-side atomic emulation of ZADD GT for servers older than 6.2.
/// ARGV[1] is the score, ARGV[2] the member.
const ZADD_GT_SCRIPT: &str = r#"
local oldScore = tonumber(redis.call('ZSCORE', KEYS[1], ARGV[2]))
if oldScore == nil or oldScore < tonumber(ARGV[1]) then
    redis.call('ZADD', KEYS[1], ARGV[1], ARGV[2])
end
"#;

// == Redis Connector ==
/// Connects to Redis from a connection URL.
#[derive(Debug, Clone)]
pub struct RedisConnector {
    url: String,
}

impl RedisConnector {
    /// Creates a connector for the given connection URL.
    pub fn new(url: impl Into<String>) -> Self {
        Self { url: url.into() }
    }
}

#[async_trait]
impl Connector for RedisConnector {
    async fn connect(&self) -> Result<Arc<dyn RemoteConnection>> {
        let client = Client::open(self.url.as_str()).map_err(CacheError::Connect)?;
        let mut conn = client
            .get_multiplexed_async_connection()
            .await
            .map_err(CacheError::Connect)?;
        let nodes = probe_topology(&mut conn).await?;
        Ok(Arc::new(RedisConnection::new(conn, nodes)))
    }
}

// == Command Queue ==
/// Single-writer queue for fire-and-forget commands. One task drains the
/// channel and executes commands one at a time, so commands reach the server
/// in the order they were queued. Enqueueing never blocks and never surfaces
/// an execution result; failures are logged at debug level and discarded.
struct CommandQueue<T> {
    tx: mpsc::UnboundedSender<T>,
}

impl<T: Send + 'static> CommandQueue<T> {
    fn start<E, Fut>(mut execute: E) -> Self
    where
        E: FnMut(T) -> Fut + Send + 'static,
        Fut: Future<Output = redis::RedisResult<()>> + Send,
    {
        let (tx, mut rx) = mpsc::unbounded_channel::<T>();
        tokio::spawn(async move {
            while let Some(item) = rx.recv().await {
                if let Err(err) = execute(item).await {
                    debug!(%err, "fire-and-forget cache command failed");
                }
            }
        });
        Self { tx }
    }

    fn enqueue(&self, item: T) {
        // The writer task lives as long as the queue; a send failure only
        // means the runtime is shutting down, and the write is best-effort.
        let _ = self.tx.send(item);
    }
}

// == Redis Connection ==
/// A shared multiplexed connection plus the topology snapshot taken when it
/// was established.
pub struct RedisConnection {
    conn: MultiplexedConnection,
    nodes: Vec<NodeInfo>,
    queue: CommandQueue<redis::Cmd>,
}

impl RedisConnection {
    fn new(conn: MultiplexedConnection, nodes: Vec<NodeInfo>) -> Self {
        let queue = CommandQueue::start({
            let writer_conn = conn.clone();
            move |cmd: redis::Cmd| {
                let mut conn = writer_conn.clone();
                async move {
                    let outcome: redis::RedisResult<()> = cmd.query_async(&mut conn).await;
                    outcome
                }
            }
        });
        Self { conn, nodes, queue }
    }

    /// Runs a command in the requested mode. Fire-and-forget commands go
    /// through the single-writer queue, which keeps their issue order.
    async fn run(&self, cmd: redis::Cmd, mode: WriteMode) -> Result<()> {
        match mode {
            WriteMode::Awaited => {
                let mut conn = self.conn.clone();
                let _: () = cmd.query_async(&mut conn).await?;
                Ok(())
            }
            WriteMode::FireAndForget => {
                self.queue.enqueue(cmd);
                Ok(())
            }
        }
    }
}

#[async_trait]
impl RemoteConnection for RedisConnection {
    async fn get_bytes(&self, key: &str) -> Result<Option<Vec<u8>>> {
        let mut conn = self.conn.clone();
        let value: Option<Vec<u8>> = redis::cmd("GET").arg(key).query_async(&mut conn).await?;
        Ok(value)
    }

    async fn set_bytes(&self, key: &str, value: &[u8], ttl: Duration) -> Result<()> {
        let mut cmd = redis::cmd("SET");
        cmd.arg(key).arg(value).arg("PX").arg(ttl.as_millis() as u64);
        self.run(cmd, WriteMode::Awaited).await
    }

    async fn delete_key(&self, key: &str, mode: WriteMode) -> Result<()> {
        let mut cmd = redis::cmd("DEL");
        cmd.arg(key);
        self.run(cmd, mode).await
    }

    async fn zset_add(
        &self,
        key: &str,
        member: &str,
        score_ms: i64,
        policy: ScorePolicy,
        mode: WriteMode,
    ) -> Result<()> {
        let mut cmd = redis::cmd("ZADD");
        cmd.arg(key);
        if policy == ScorePolicy::GreaterThan {
            cmd.arg("GT");
        }
        cmd.arg(score_ms).arg(member);
        self.run(cmd, mode).await
    }

    async fn zset_add_if_greater_script(
        &self,
        key: &str,
        member: &str,
        score_ms: i64,
        mode: WriteMode,
    ) -> Result<()> {
        let mut cmd = redis::cmd("EVAL");
        cmd.arg(ZADD_GT_SCRIPT)
            .arg(1)
            .arg(key)
            .arg(score_ms)
            .arg(member);
        self.run(cmd, mode).await
    }

    async fn zset_remove(&self, key: &str, member: &str, mode: WriteMode) -> Result<()> {
        let mut cmd = redis::cmd("ZREM");
        cmd.arg(key).arg(member);
        self.run(cmd, mode).await
    }

    async fn zset_scan(&self, key: &str, cursor: u64) -> Result<(u64, Vec<(String, i64)>)> {
        let mut conn = self.conn.clone();
        let (next, raw): (u64, Vec<String>) = redis::cmd("ZSCAN")
            .arg(key)
            .arg(cursor)
            .query_async(&mut conn)
            .await?;

        // ZSCAN replies with a flat member/score alternation.
        let mut entries = Vec::with_capacity(raw.len() / 2);
        let mut iter = raw.into_iter();
        while let (Some(member), Some(score)) = (iter.next(), iter.next()) {
            let score_ms = score.parse::<f64>().unwrap_or(0.0) as i64;
            entries.push((member, score_ms));
        }
        Ok((next, entries))
    }

    fn nodes(&self) -> Vec<NodeInfo> {
        self.nodes.clone()
    }

    async fn close(&self) {
        // The multiplexed connection has no explicit close; the socket is
        // torn down when the last clone of the handle is dropped.
        debug!("releasing redis connection handle");
    }
}

// == Topology Probe ==
/// Takes a one-time snapshot of the connected server: topology kind from the
/// cluster section, and the set-if-greater feature (ZADD GT, Redis 6.2+)
/// from the server version.
async fn probe_topology(conn: &mut MultiplexedConnection) -> Result<Vec<NodeInfo>> {
    let server: String = redis::cmd("INFO")
        .arg("server")
        .query_async(conn)
        .await
        .map_err(CacheError::Connect)?;
    let cluster: String = redis::cmd("INFO")
        .arg("cluster")
        .query_async(conn)
        .await
        .map_err(CacheError::Connect)?;

    let supports_set_if_greater = info_field(&server, "redis_version")
        .map(|v| version_at_least(v, 6, 2))
        .unwrap_or(false);
    let kind = if info_field(&cluster, "cluster_enabled") == Some("1") {
        NodeKind::Cluster
    } else {
        NodeKind::Standalone
    };

    Ok(vec![NodeInfo {
        kind,
        supports_set_if_greater,
    }])
}

/// Extracts a `field:value` line from an INFO section.
fn info_field<'a>(info: &'a str, field: &str) -> Option<&'a str> {
    info.lines()
        .filter_map(|line| line.split_once(':'))
        .find(|(name, _)| *name == field)
        .map(|(_, value)| value.trim())
}

/// True if `version` is at least `major.minor`.
fn version_at_least(version: &str, major: u32, minor: u32) -> bool {
    let mut parts = version.split('.').map(|p| p.parse::<u32>().unwrap_or(0));
    let v_major = parts.next().unwrap_or(0);
    let v_minor = parts.next().unwrap_or(0);
    (v_major, v_minor) >= (major, minor)
}

// == Unit Tests ==
#[cfg(test)]
mod tests {
    use super::*;

    use parking_lot::Mutex;

    #[tokio::test]
    async fn test_queued_commands_execute_in_issue_order() {
        let executed: Arc<Mutex<Vec<u32>>> = Arc::new(Mutex::new(Vec::new()));
        let log = Arc::clone(&executed);

        // The first command is the slowest. A per-command detached task would
        // let the later commands overtake it; the single writer must not.
        let queue = CommandQueue::start(move |item: u32| {
            let log = Arc::clone(&log);
            async move {
                let delay_ms = if item == 1 { 30 } else { 1 };
                tokio::time::sleep(Duration::from_millis(delay_ms)).await;
                log.lock().push(item);
                Ok(())
            }
        });

        for item in 1..=4 {
            queue.enqueue(item);
        }
        tokio::time::sleep(Duration::from_millis(100)).await;

        assert_eq!(*executed.lock(), vec![1, 2, 3, 4]);
    }

    #[tokio::test]
    async fn test_queue_keeps_draining_after_a_failed_command() {
        let executed: Arc<Mutex<Vec<u32>>> = Arc::new(Mutex::new(Vec::new()));
        let log = Arc::clone(&executed);

        let queue = CommandQueue::start(move |item: u32| {
            let log = Arc::clone(&log);
            async move {
                if item == 2 {
                    return Err(redis::RedisError::from((
                        redis::ErrorKind::IoError,
                        "broken pipe",
                    )));
                }
                log.lock().push(item);
                Ok(())
            }
        });

        for item in 1..=3 {
            queue.enqueue(item);
        }
        tokio::time::sleep(Duration::from_millis(50)).await;

        assert_eq!(*executed.lock(), vec![1, 3]);
    }

    #[test]
    fn test_info_field_extraction() {
        let info = "# Server\r\nredis_version:7.2.4\r\nredis_mode:standalone\r\n";
        assert_eq!(info_field(info, "redis_version"), Some("7.2.4"));
        assert_eq!(info_field(info, "redis_mode"), Some("standalone"));
        assert_eq!(info_field(info, "missing"), None);
    }

    #[test]
    fn test_version_at_least() {
        assert!(version_at_least("6.2.0", 6, 2));
        assert!(version_at_least("7.0.1", 6, 2));
        assert!(!version_at_least("6.0.16", 6, 2));
        assert!(!version_at_least("5.0.7", 6, 2));
        assert!(!version_at_least("garbage", 6, 2));
    }
}
