//! Per-source probe results and the outcome of a full sync pass.

use serde::{Deserialize, Serialize};

use super::clock::MonoTs;

/// Per spec: a probe either succeeded (a usable instant was read from the
/// source) or failed (transport error, timeout, malformed body, or a
/// stratum-zero reply). The deviation bound is not a sample-classification
/// concern — it's applied by the synchronizer against each source's chosen
/// representative, not by the prober against each individual probe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SampleStatus {
    Ok,
    Failed,
}

/// One probe of one upstream source, tagged with the monotonic instant at
/// which the probe returned so samples from different sources can be
/// ordered regardless of network latency differences.
#[derive(Debug, Clone)]
pub struct Sample {
    pub source_name: String,
    pub weight: u32,
    pub status: SampleStatus,
    /// The source's reported instant, as nanoseconds since the Unix epoch.
    /// Only meaningful when `status == Ok`.
    pub remote_unix_ns: i64,
    /// The monotonic reading taken immediately after the probe returned.
    pub received_at: MonoTs,
    /// Measured round-trip time of the probe, in nanoseconds. Zero for a
    /// failed probe.
    pub rtt_ns: i64,
    /// Absolute deviation between the source's reported instant and the
    /// local wall clock at receipt. Zero for a failed probe.
    pub deviation_ns: i64,
}

impl Sample {
    pub fn is_ok(&self) -> bool {
        self.status == SampleStatus::Ok
    }
}

/// The result of one full synchronization pass across all configured
/// sources.
#[derive(Debug, Clone)]
pub struct SyncResult {
    pub samples: Vec<Sample>,
    /// The source selected by the "first successful sample, earliest
    /// timestamp" rule, if any survived filtering.
    pub selected: Option<Sample>,
}

impl SyncResult {
    pub fn survivor_count(&self) -> usize {
        self.samples.iter().filter(|s| s.is_ok()).count()
    }
}
