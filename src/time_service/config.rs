use serde::{Deserialize, Serialize};

/// A single upstream time source, as listed under the top-level
/// `ntpServer` array in the process configuration file.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TimeSourceConfig {
    pub name: String,
    /// HTTP endpoint probed for the current time.
    pub address: String,
    pub weight: u32,
    #[serde(default)]
    pub is_domestic: bool,
    /// Maximum allowed absolute deviation between the source's reported
    /// instant and the local wall clock, in nanoseconds.
    pub max_deviation_ns: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TimeServiceConfig {
    #[serde(default = "default_sync_interval_secs")]
    pub sync_interval_secs: u64,
    #[serde(default = "default_failure_threshold")]
    pub failure_threshold: u32,
    #[serde(default = "default_recovery_timeout_secs")]
    pub recovery_timeout_secs: u64,
    #[serde(default = "default_sample_count")]
    pub sample_count: u32,
    #[serde(default = "default_sample_delay_ms")]
    pub sample_delay_ms: u64,
    /// Per-probe timeout; §4.2 suggests ~3x the expected RTT.
    #[serde(default = "default_probe_timeout_ms")]
    pub probe_timeout_ms: u64,
    /// Optional clamp on how far a single sync pass may move the offset
    /// once the clock has already been initialized (§9 open question).
    /// `None` disables the clamp (the default, matching unclamped
    /// behaviour).
    #[serde(default)]
    pub max_jump_ns: Option<i64>,
}

fn default_sync_interval_secs() -> u64 {
    60
}

fn default_failure_threshold() -> u32 {
    5
}

fn default_recovery_timeout_secs() -> u64 {
    300
}

fn default_sample_count() -> u32 {
    5
}

fn default_sample_delay_ms() -> u64 {
    100
}

fn default_probe_timeout_ms() -> u64 {
    2_000
}

impl Default for TimeServiceConfig {
    fn default() -> Self {
        Self {
            sync_interval_secs: default_sync_interval_secs(),
            failure_threshold: default_failure_threshold(),
            recovery_timeout_secs: default_recovery_timeout_secs(),
            sample_count: default_sample_count(),
            sample_delay_ms: default_sample_delay_ms(),
            probe_timeout_ms: default_probe_timeout_ms(),
            max_jump_ns: None,
        }
    }
}
