//! Monotonic timebase and the offset that turns it into trusted wall time.
//!
//! Grounded on `time_sync.rs`'s `MonoTs` in the teacher repo: a raw
//! monotonic reading that cannot be stepped by NTP or the operator, paired
//! with an atomically-updated offset so the hot path (`trusted_now_ns`)
//! never takes a lock.

use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::OnceLock;
use std::time::Instant;

/// A monotonic instant expressed as nanoseconds since an arbitrary,
/// process-local epoch. Never decreases and is never affected by wall
/// clock steps.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct MonoTs(pub i64);

static MONO_EPOCH: OnceLock<Instant> = OnceLock::new();

/// Reads `CLOCK_MONOTONIC_RAW` on platforms that expose it; falls back to
/// `std::time::Instant` (relative to a process-local epoch) everywhere
/// else. Both are monotonic and immune to `settimeofday`/NTP steps, which
/// is the only property the offset math below depends on.
pub fn mono_now() -> MonoTs {
    #[cfg(target_os = "linux")]
    {
        let mut ts = libc::timespec {
            tv_sec: 0,
            tv_nsec: 0,
        };
        let rc = unsafe { libc::clock_gettime(libc::CLOCK_MONOTONIC_RAW, &mut ts) };
        if rc == 0 {
            let ns = ts.tv_sec as i64 * 1_000_000_000 + ts.tv_nsec as i64;
            return MonoTs(ns);
        }
    }
    mono_now_fallback()
}

fn mono_now_fallback() -> MonoTs {
    let epoch = MONO_EPOCH.get_or_init(Instant::now);
    MonoTs(epoch.elapsed().as_nanos() as i64)
}

/// Current wall-clock time as nanoseconds since the Unix epoch, per the
/// operating system (i.e. untrusted until corrected by the offset below).
pub fn wall_now_ns() -> i64 {
    chrono::Utc::now()
        .timestamp_nanos_opt()
        .unwrap_or_else(|| chrono::Utc::now().timestamp_millis() * 1_000_000)
}

/// The trusted-clock correction: `trusted_now = mono_now + offset`.
///
/// Stored as a single atomic so the read side never blocks on a sync pass
/// in progress, matching the teacher's `ClockHealth` global-via-`OnceLock`
/// pattern but specialized to a single hot integer instead of a struct.
pub struct ClockOffsetStore {
    offset_ns: AtomicI64,
    initialized: std::sync::atomic::AtomicBool,
}

impl ClockOffsetStore {
    pub fn new() -> Self {
        Self {
            offset_ns: AtomicI64::new(0),
            initialized: std::sync::atomic::AtomicBool::new(false),
        }
    }

    /// Whether at least one sync pass has ever completed successfully.
    pub fn is_initialized(&self) -> bool {
        self.initialized.load(Ordering::Acquire)
    }

    pub fn set(&self, offset_ns: i64) {
        self.offset_ns.store(offset_ns, Ordering::Release);
        self.initialized.store(true, Ordering::Release);
    }

    pub fn get(&self) -> i64 {
        self.offset_ns.load(Ordering::Acquire)
    }

    /// `mono_now + offset`, the service's public notion of "now".
    pub fn trusted_now_ns(&self) -> i64 {
        mono_now().0 + self.get()
    }
}

impl Default for ClockOffsetStore {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mono_now_is_nondecreasing() {
        let a = mono_now();
        let b = mono_now();
        assert!(b >= a);
    }

    #[test]
    fn offset_store_starts_uninitialized() {
        let store = ClockOffsetStore::new();
        assert!(!store.is_initialized());
        assert_eq!(store.get(), 0);
    }

    #[test]
    fn trusted_now_tracks_offset() {
        let store = ClockOffsetStore::new();
        store.set(1_000_000_000);
        assert!(store.is_initialized());
        let before = mono_now().0;
        let trusted = store.trusted_now_ns();
        assert!(trusted >= before + 1_000_000_000);
    }

    #[test]
    fn trusted_now_is_strictly_monotonic_across_calls() {
        let store = ClockOffsetStore::new();
        store.set(42);
        let a = store.trusted_now_ns();
        let b = store.trusted_now_ns();
        assert!(b >= a);
    }
}
