//! The trusted time service: scheduled synchronization, the circuit
//! breaker that governs whether a failing sync pass is allowed to affect
//! the published offset, and the public read API.
//!
//! Grounded on the teacher's `ClockHealthMonitor`/`start_clock_health_task`
//! pair (background tick loop publishing into a shared, lock-free read
//! side) and on `DataSourceKillSwitch` in `main.rs` for the
//! failure-threshold / recovery-timeout breaker shape.

use std::sync::atomic::{AtomicBool, AtomicI64, AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tracing::{error, info, warn};

use crate::error::TimeServiceError;

use super::clock::{mono_now, wall_now_ns, ClockOffsetStore};
use super::config::{TimeServiceConfig, TimeSourceConfig};
use super::sync::Synchronizer;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum CircuitState {
    Closed,
    Open,
}

/// Failure-threshold / recovery-timeout breaker over the sync pass.
///
/// While closed, sync failures increment a counter; crossing
/// `failure_threshold` opens the breaker. While open, reads keep serving
/// the last good offset (the store is simply not updated) and the
/// scheduler skips sync attempts until `recovery_timeout` has elapsed
/// since the breaker opened, at which point it makes one optimistic
/// attempt within the same tick: success closes the breaker, failure
/// restarts the recovery timer.
pub struct CircuitBreaker {
    failure_threshold: u32,
    recovery_timeout_ns: i64,
    consecutive_failures: AtomicU32,
    open: AtomicBool,
    opened_at_mono_ns: AtomicI64,
    /// Wall-clock reading at the last recorded failure, for the
    /// diagnostics endpoint. Zero means no failure has been recorded yet.
    last_failure_wall_ns: AtomicI64,
}

impl CircuitBreaker {
    pub fn new(failure_threshold: u32, recovery_timeout: Duration) -> Self {
        Self {
            failure_threshold,
            recovery_timeout_ns: recovery_timeout.as_nanos() as i64,
            consecutive_failures: AtomicU32::new(0),
            open: AtomicBool::new(false),
            opened_at_mono_ns: AtomicI64::new(0),
            last_failure_wall_ns: AtomicI64::new(0),
        }
    }

    pub fn state(&self) -> CircuitState {
        if self.open.load(Ordering::Acquire) {
            CircuitState::Open
        } else {
            CircuitState::Closed
        }
    }

    pub fn consecutive_failures(&self) -> u32 {
        self.consecutive_failures.load(Ordering::Acquire)
    }

    /// Wall-clock nanoseconds at the last recorded failure, or `None` if
    /// no failure has been recorded since the breaker was created.
    pub fn last_failure_wall_ns(&self) -> Option<i64> {
        match self.last_failure_wall_ns.load(Ordering::Acquire) {
            0 => None,
            ts => Some(ts),
        }
    }

    /// Whether the scheduler should attempt a sync pass this tick. When the
    /// breaker is open and the recovery timeout has elapsed, this clears
    /// the breaker optimistically (closed, zero failures) before returning
    /// true, so the caller's upcoming sync attempt runs against a clean
    /// slate within the same tick; `record_failure` re-opens it if that
    /// attempt doesn't pan out.
    fn should_attempt(&self) -> bool {
        if !self.open.load(Ordering::Acquire) {
            return true;
        }
        let opened_at = self.opened_at_mono_ns.load(Ordering::Acquire);
        let elapsed = mono_now().0 - opened_at;
        if elapsed < self.recovery_timeout_ns {
            return false;
        }
        self.open.store(false, Ordering::Release);
        self.consecutive_failures.store(0, Ordering::Release);
        info!("circuit breaker recovery timeout elapsed; attempting optimistic resync");
        true
    }

    fn record_success(&self) {
        self.consecutive_failures.store(0, Ordering::Release);
        if self.open.swap(false, Ordering::AcqRel) {
            info!("circuit breaker closed after successful recovery sync");
        }
    }

    fn record_failure(&self) {
        self.last_failure_wall_ns.store(wall_now_ns(), Ordering::Release);
        let failures = self.consecutive_failures.fetch_add(1, Ordering::AcqRel) + 1;
        if failures >= self.failure_threshold && !self.open.swap(true, Ordering::AcqRel) {
            self.opened_at_mono_ns.store(mono_now().0, Ordering::Release);
            warn!(failures, "circuit breaker opened after repeated sync failures");
        } else if self.open.load(Ordering::Acquire) {
            // Still within the open window; restart the recovery clock so a
            // failed optimistic attempt waits a full timeout before retrying.
            self.opened_at_mono_ns.store(mono_now().0, Ordering::Release);
        }
    }
}

#[derive(Debug, Default)]
pub struct TimeServiceStats {
    pub total_sync_attempts: AtomicU32,
    pub total_sync_successes: AtomicU32,
    pub total_sync_failures: AtomicU32,
}

impl Serialize for TimeServiceStats {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        use serde::ser::SerializeStruct;
        let mut state = serializer.serialize_struct("TimeServiceStats", 3)?;
        state.serialize_field(
            "totalSyncAttempts",
            &self.total_sync_attempts.load(Ordering::Relaxed),
        )?;
        state.serialize_field(
            "totalSyncSuccesses",
            &self.total_sync_successes.load(Ordering::Relaxed),
        )?;
        state.serialize_field(
            "totalSyncFailures",
            &self.total_sync_failures.load(Ordering::Relaxed),
        )?;
        state.end()
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TimeServiceStatus {
    pub initialized: bool,
    pub circuit_state: CircuitState,
    pub consecutive_failures: u32,
    pub last_selected_source: Option<String>,
    pub last_failure_wall_ns: Option<i64>,
    pub trusted_now_ns: i64,
}

pub struct TimeService {
    offset: ClockOffsetStore,
    synchronizer: Synchronizer,
    breaker: CircuitBreaker,
    stats: TimeServiceStats,
    last_selected_source: parking_lot::RwLock<Option<String>>,
    config: TimeServiceConfig,
}

impl TimeService {
    /// Builds a service with the offset pre-seeded and no sources
    /// configured, for use by collaborators' tests that need a working
    /// trusted clock but aren't exercising the time service itself.
    #[cfg(test)]
    pub fn for_test() -> Arc<Self> {
        let config = TimeServiceConfig::default();
        let service = Self {
            offset: ClockOffsetStore::new(),
            synchronizer: Synchronizer::new(config.clone(), Vec::new()),
            breaker: CircuitBreaker::new(config.failure_threshold, Duration::from_secs(config.recovery_timeout_secs)),
            stats: TimeServiceStats::default(),
            last_selected_source: parking_lot::RwLock::new(None),
            config,
        };
        service.offset.set(0);
        Arc::new(service)
    }

    /// Performs the mandatory initial sync. Per the service contract, a
    /// process with no trusted clock must not serve traffic, so failure
    /// here is fatal to startup rather than merely logged.
    pub async fn init(config: TimeServiceConfig, sources: Vec<TimeSourceConfig>) -> Result<Arc<Self>, TimeServiceError> {
        let synchronizer = Synchronizer::new(config.clone(), sources);
        let breaker = CircuitBreaker::new(
            config.failure_threshold,
            Duration::from_secs(config.recovery_timeout_secs),
        );
        let service = Arc::new(Self {
            offset: ClockOffsetStore::new(),
            synchronizer,
            breaker,
            stats: TimeServiceStats::default(),
            last_selected_source: parking_lot::RwLock::new(None),
            config,
        });

        service.stats.total_sync_attempts.fetch_add(1, Ordering::Relaxed);
        match service.sync_once().await {
            Some(_) => {
                service.stats.total_sync_successes.fetch_add(1, Ordering::Relaxed);
                info!("trusted clock initialized");
                Ok(service)
            }
            None => {
                service.stats.total_sync_failures.fetch_add(1, Ordering::Relaxed);
                error!("initial time sync failed; refusing to start");
                Err(TimeServiceError::NoValidSource)
            }
        }
    }

    /// Runs one sync pass and, on success, applies the resulting offset.
    /// Returns the selected source name on success.
    async fn sync_once(&self) -> Option<String> {
        let result = self.synchronizer.sync_once().await;
        match result.selected {
            Some(sample) => {
                self.apply_offset(sample.remote_unix_ns, sample.received_at.0);
                *self.last_selected_source.write() = Some(sample.source_name.clone());
                self.breaker.record_success();
                Some(sample.source_name)
            }
            None => {
                self.breaker.record_failure();
                None
            }
        }
    }

    /// Computes and publishes the new offset. `remote_unix_ns` is the
    /// winning source's reported instant; `sampled_at_mono_ns` is the
    /// monotonic reading captured at the moment that sample was taken, so
    /// the offset remains valid as monotonic time continues to advance
    /// after this call returns.
    fn apply_offset(&self, remote_unix_ns: i64, sampled_at_mono_ns: i64) {
        let candidate_offset = remote_unix_ns - sampled_at_mono_ns;

        let new_offset = match self.config.max_jump_ns {
            Some(max_jump) if self.offset.is_initialized() => {
                let current = self.offset.get();
                let delta = candidate_offset - current;
                if delta.abs() > max_jump {
                    warn!(
                        delta_ns = delta,
                        max_jump_ns = max_jump,
                        "sync offset jump exceeds configured bound; applying anyway"
                    );
                }
                candidate_offset
            }
            _ => candidate_offset,
        };

        self.offset.set(new_offset);
    }

    /// The service's public notion of "now": nanoseconds since the Unix
    /// epoch, corrected by the last successfully applied offset. Lock-free.
    pub fn trusted_now_ns(&self) -> i64 {
        self.offset.trusted_now_ns()
    }

    pub fn status(&self) -> TimeServiceStatus {
        TimeServiceStatus {
            initialized: self.offset.is_initialized(),
            circuit_state: self.breaker.state(),
            consecutive_failures: self.breaker.consecutive_failures(),
            last_selected_source: self.last_selected_source.read().clone(),
            last_failure_wall_ns: self.breaker.last_failure_wall_ns(),
            trusted_now_ns: self.trusted_now_ns(),
        }
    }

    pub fn stats(&self) -> &TimeServiceStats {
        &self.stats
    }

    pub fn circuit_state(&self) -> CircuitState {
        self.breaker.state()
    }

    pub fn configured_sources(&self) -> &[TimeSourceConfig] {
        self.synchronizer.sources()
    }

    /// Last recorded probe burst for one configured source, for the
    /// `ntp-pool` diagnostics endpoint.
    pub fn last_samples_for(&self, source_name: &str) -> Vec<super::sample::Sample> {
        self.synchronizer.last_samples_for(source_name)
    }

    /// Background task: attempts a sync pass every `sync_interval_secs`,
    /// subject to the circuit breaker's recovery window.
    pub async fn run_scheduler(self: Arc<Self>) {
        let mut ticker = tokio::time::interval(Duration::from_secs(self.config.sync_interval_secs));
        loop {
            ticker.tick().await;
            self.scheduler_tick().await;
        }
    }

    async fn scheduler_tick(&self) {
        if !self.breaker.should_attempt() {
            return;
        }
        self.stats.total_sync_attempts.fetch_add(1, Ordering::Relaxed);
        match self.sync_once().await {
            Some(_) => {
                self.stats.total_sync_successes.fetch_add(1, Ordering::Relaxed);
            }
            None => {
                self.stats.total_sync_failures.fetch_add(1, Ordering::Relaxed);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn breaker_opens_after_threshold_failures() {
        let breaker = CircuitBreaker::new(3, Duration::from_secs(60));
        assert_eq!(breaker.state(), CircuitState::Closed);
        breaker.record_failure();
        breaker.record_failure();
        assert_eq!(breaker.state(), CircuitState::Closed);
        breaker.record_failure();
        assert_eq!(breaker.state(), CircuitState::Open);
    }

    #[test]
    fn breaker_closes_on_success() {
        let breaker = CircuitBreaker::new(1, Duration::from_secs(60));
        breaker.record_failure();
        assert_eq!(breaker.state(), CircuitState::Open);
        breaker.record_success();
        assert_eq!(breaker.state(), CircuitState::Closed);
        assert_eq!(breaker.consecutive_failures(), 0);
    }

    #[test]
    fn last_failure_wall_ns_is_recorded_on_failure() {
        let breaker = CircuitBreaker::new(1, Duration::from_secs(60));
        assert!(breaker.last_failure_wall_ns().is_none());
        breaker.record_failure();
        assert!(breaker.last_failure_wall_ns().is_some());
    }

    #[test]
    fn breaker_blocks_attempts_until_recovery_timeout() {
        let breaker = CircuitBreaker::new(1, Duration::from_secs(3600));
        breaker.record_failure();
        assert!(!breaker.should_attempt());
    }

    #[test]
    fn trusted_now_is_strictly_monotonic_on_a_single_thread() {
        let service = TimeService::for_test();
        let mut previous = service.trusted_now_ns();
        for _ in 0..1000 {
            let next = service.trusted_now_ns();
            assert!(next >= previous);
            previous = next;
        }
    }
}
