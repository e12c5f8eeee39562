//! Reconnect Breaker Module
//!
//! Decides, on a transient error, whether to force-discard the shared
//! connection so the next operation establishes a fresh one. Prevents
//! reconnect storms while the backend is flapping, while still recovering
//! promptly from a real outage.

use std::sync::Arc;
use std::time::Duration;

use tracing::warn;

use crate::clock::Clock;
use crate::config::Config;
use crate::connection::{ActiveConnection, ConnectionManager};
use crate::error::CacheError;
use crate::timestamps::{TimeField, TimestampRegistry};

// == Reconnect Breaker ==
/// Error-run bookkeeping and the forced-reconnect decision.
///
/// All state lives in the shared [`TimestampRegistry`]; the breaker itself
/// holds only configuration.
pub struct ReconnectBreaker {
    enabled: bool,
    /// Never force a reconnect more often than this.
    min_reconnect_interval: Duration,
    /// Errors must have persisted for at least this long, with no gap
    /// exceeding it, before a reconnect is forced.
    error_window: Duration,
    timestamps: Arc<TimestampRegistry>,
    clock: Arc<dyn Clock>,
}

impl ReconnectBreaker {
    /// Creates a breaker from the client configuration.
    pub fn new(
        config: &Config,
        timestamps: Arc<TimestampRegistry>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            enabled: config.use_force_reconnect,
            min_reconnect_interval: config.min_reconnect_interval,
            error_window: config.error_window,
            timestamps,
            clock,
        }
    }

    // == On Error ==
    /// Invoked on every failed remote operation with the handle that failed.
    ///
    /// Non-transient errors are ignored. A transient error feeds the error-run
    /// timestamps; once the run has persisted for `error_window` without a
    /// gap exceeding `error_window`, and at least `min_reconnect_interval`
    /// has passed since the last connect, the failed handle is discarded —
    /// but only if no concurrent caller has already replaced it.
    pub async fn on_error(
        &self,
        manager: &ConnectionManager,
        failed: &ActiveConnection,
        error: &CacheError,
    ) {
        if !self.enabled || !error.is_transient() {
            return;
        }

        let now = self.clock.now_unix_ms();

        // A reconnect happened too recently to justify another.
        let last_connect = self.timestamps.read(TimeField::LastConnect).unwrap_or(0);
        if elapsed(now, last_connect) < self.min_reconnect_interval {
            return;
        }

        let Some(first_error) = self.timestamps.read(TimeField::FirstError) else {
            // First error of a new run; not enough evidence yet. The order
            // of the two writes is not significant.
            self.timestamps.write(TimeField::FirstError, Some(now));
            self.timestamps.write(TimeField::PreviousError, Some(now));
            return;
        };

        let since_first_error = elapsed(now, first_error);
        let since_last_error = elapsed(
            now,
            self.timestamps
                .read(TimeField::PreviousError)
                .unwrap_or(first_error),
        );

        // Mark this error as part of the run regardless of the decision.
        self.timestamps.write(TimeField::PreviousError, Some(now));

        // The run must have persisted long enough to show the connection is
        // not recovering on its own, and must not have gone stale in between.
        let should_reconnect =
            since_first_error >= self.error_window && since_last_error <= self.error_window;
        if !should_reconnect {
            return;
        }

        self.timestamps.write(TimeField::FirstError, None);
        self.timestamps.write(TimeField::PreviousError, None);

        warn!("sustained transient errors; forcing cache reconnect");
        manager.drop_if_current(failed).await;
    }
}

/// Elapsed duration between two Unix-millisecond instants, clamped at zero.
fn elapsed(now_ms: i64, earlier_ms: i64) -> Duration {
    Duration::from_millis(now_ms.saturating_sub(earlier_ms).max(0) as u64)
}
