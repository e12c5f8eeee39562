//! Connection Manager Module
//!
//! Owns the single shared connection handle. Lazily establishes it exactly
//! once under concurrent demand (double-checked behind an async gate), runs
//! the one-time capability probe, and exposes the compare-and-swap drop used
//! by the reconnect breaker.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tracing::{debug, info};

use crate::clock::Clock;
use crate::connection::{ActiveConnection, Capabilities, Connector};
use crate::error::{CacheError, Result};
use crate::timestamps::{TimeField, TimestampRegistry};

// == Connection Manager ==
/// Exclusive owner of the shared connection handle.
pub struct ConnectionManager {
    connector: Arc<dyn Connector>,
    /// The shared slot. A short lock around load/swap; never held across
    /// an await point.
    slot: parking_lot::Mutex<Option<ActiveConnection>>,
    /// One-at-a-time gate for the slow connect path.
    connect_gate: tokio::sync::Mutex<()>,
    timestamps: Arc<TimestampRegistry>,
    clock: Arc<dyn Clock>,
    disposed: AtomicBool,
}

impl ConnectionManager {
    /// Creates a manager that connects through `connector`.
    pub fn new(
        connector: Arc<dyn Connector>,
        timestamps: Arc<TimestampRegistry>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            connector,
            slot: parking_lot::Mutex::new(None),
            connect_gate: tokio::sync::Mutex::new(()),
            timestamps,
            clock,
            disposed: AtomicBool::new(false),
        }
    }

    // == Acquire ==
    /// Returns the live connection, establishing it on first use.
    ///
    /// Fast path: the handle is already present and is returned without
    /// touching the gate. Slow path: callers serialize on the gate, re-check
    /// the slot (another caller may have connected while they waited), and
    /// connect only if it is still absent — N concurrent first calls perform
    /// exactly one underlying connect.
    pub async fn acquire(&self) -> Result<ActiveConnection> {
        self.check_disposed()?;

        if let Some(active) = self.slot.lock().clone() {
            return Ok(active);
        }
        self.acquire_slow().await
    }

    async fn acquire_slow(&self) -> Result<ActiveConnection> {
        let _gate = self.connect_gate.lock().await;
        self.check_disposed()?;

        // Double-checked: a caller that lost the race finds the slot filled.
        if let Some(active) = self.slot.lock().clone() {
            return Ok(active);
        }

        let conn = self.connector.connect().await?;
        let caps = Capabilities::probe(&conn.nodes());
        self.timestamps
            .write(TimeField::LastConnect, Some(self.clock.now_unix_ms()));
        info!(
            multi_exec = caps.use_multi_exec,
            set_if_greater = caps.use_set_if_greater,
            "cache connection established"
        );

        let active = ActiveConnection { conn, caps };
        *self.slot.lock() = Some(active.clone());
        Ok(active)
    }

    // == Drop If Current ==
    /// Wipes the shared slot, but only if it still holds `failed` — once a
    /// concurrent caller has replaced it with a newer connection there is
    /// nothing left to tear down. Closes the handle it actually removed.
    pub async fn drop_if_current(&self, failed: &ActiveConnection) {
        let removed = {
            let mut slot = self.slot.lock();
            match slot.as_ref() {
                Some(current) if current.same_handle(failed) => slot.take(),
                _ => None,
            }
        };
        if let Some(active) = removed {
            debug!("discarding suspect cache connection");
            active.conn.close().await;
        }
    }

    // == Close ==
    /// Releases the shared handle unconditionally and marks the manager
    /// closed. Idempotent; subsequent `acquire` calls fail rather than
    /// reconnecting.
    pub async fn close(&self) {
        self.disposed.store(true, Ordering::Release);
        let removed = self.slot.lock().take();
        if let Some(active) = removed {
            active.conn.close().await;
        }
    }

    /// Returns true once the manager has been closed.
    pub fn is_disposed(&self) -> bool {
        self.disposed.load(Ordering::Acquire)
    }

    fn check_disposed(&self) -> Result<()> {
        if self.is_disposed() {
            return Err(CacheError::Disposed);
        }
        Ok(())
    }
}

impl std::fmt::Debug for ConnectionManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionManager")
            .field("connected", &self.slot.lock().is_some())
            .field("disposed", &self.is_disposed())
            .finish_non_exhaustive()
    }
}
