//! Fan-out across configured time sources and selection of a winner.
//!
//! Grounded on `route_quality/prober.rs`'s concurrent per-endpoint polling
//! (one task per endpoint, joined at the end of the tick) generalized from
//! a health check into a selection problem: every source is probed in
//! parallel, each source's own samples are reduced to its first successful
//! reading, that representative is filtered against the source's deviation
//! bound, and across surviving sources the earliest-timestamped one wins.

use std::collections::HashMap;
use std::time::Duration;

use parking_lot::RwLock;
use tracing::{info, warn};

use super::config::{TimeServiceConfig, TimeSourceConfig};
use super::prober::TimeSourceProber;
use super::sample::{Sample, SyncResult};

/// Runs one synchronization pass across every configured source.
pub struct Synchronizer {
    prober: TimeSourceProber,
    config: TimeServiceConfig,
    sources: Vec<TimeSourceConfig>,
    /// Last full sample set per source, kept for the diagnostics endpoint.
    last_samples: RwLock<HashMap<String, Vec<Sample>>>,
}

impl Synchronizer {
    pub fn new(config: TimeServiceConfig, sources: Vec<TimeSourceConfig>) -> Self {
        let prober = TimeSourceProber::new(Duration::from_millis(config.probe_timeout_ms));
        Self {
            prober,
            config,
            sources,
            last_samples: RwLock::new(HashMap::new()),
        }
    }

    pub fn sources(&self) -> &[TimeSourceConfig] {
        &self.sources
    }

    /// Probes every configured source concurrently; for each source, issues
    /// `sample_count` sequential probes and reduces them to the first
    /// successful sample in chronological order (the per-source
    /// representative), purely on transport/stratum outcome. That
    /// representative is then dropped if its deviation from the local wall
    /// clock exceeds the source's configured bound. Across the surviving
    /// representatives, the one reporting the earliest remote instant wins.
    /// Ties (including a single surviving source) are broken by
    /// configuration order, so results are deterministic given identical
    /// inputs.
    pub async fn sync_once(&self) -> SyncResult {
        let count = self.config.sample_count.max(1);
        let delay = Duration::from_millis(self.config.sample_delay_ms);

        let mut handles = Vec::with_capacity(self.sources.len());
        for source in &self.sources {
            let prober = &self.prober;
            handles.push(async move { (source.name.clone(), prober.probe_many(source, count, delay).await) });
        }

        let per_source: Vec<(String, Vec<Sample>)> = futures_util::future::join_all(handles).await;

        let mut representatives = Vec::with_capacity(per_source.len());
        {
            let mut cache = self.last_samples.write();
            for (source, (name, samples)) in self.sources.iter().zip(per_source.iter()) {
                cache.insert(name.clone(), samples.clone());

                match samples.iter().find(|s| s.is_ok()) {
                    Some(sample) if sample.deviation_ns > source.max_deviation_ns => {
                        warn!(
                            source = %name,
                            deviation_ns = sample.deviation_ns,
                            max_deviation_ns = source.max_deviation_ns,
                            "source's chosen representative exceeds deviation bound; dropping"
                        );
                    }
                    Some(sample) => representatives.push(sample.clone()),
                    None => warn!(source = %name, "no successful sample in this source's burst"),
                }
            }
        }

        let selected = representatives.iter().min_by_key(|s| s.remote_unix_ns).cloned();

        if let Some(winner) = &selected {
            info!(source = %winner.source_name, "selected time source for this sync pass");
        }

        SyncResult {
            samples: representatives,
            selected,
        }
    }

    /// Snapshot of the last full sample burst recorded for `source_name`,
    /// for the time-source diagnostics endpoint.
    pub fn last_samples_for(&self, source_name: &str) -> Vec<Sample> {
        self.last_samples
            .read()
            .get(source_name)
            .cloned()
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::super::config::TimeSourceConfig;
    use super::*;

    fn test_config() -> TimeServiceConfig {
        TimeServiceConfig {
            sample_count: 1,
            sample_delay_ms: 0,
            ..TimeServiceConfig::default()
        }
    }

    #[tokio::test]
    async fn no_sources_yields_no_selection() {
        let synchronizer = Synchronizer::new(test_config(), vec![]);
        let result = synchronizer.sync_once().await;
        assert!(result.selected.is_none());
        assert_eq!(result.survivor_count(), 0);
    }

    #[tokio::test]
    async fn unreachable_sources_yield_no_selection() {
        let synchronizer = Synchronizer::new(
            test_config(),
            vec![TimeSourceConfig {
                name: "nowhere".into(),
                address: "http://127.0.0.1:1".into(),
                weight: 1,
                is_domestic: true,
                max_deviation_ns: 1_000_000_000,
            }],
        );
        let result = synchronizer.sync_once().await;
        assert!(result.selected.is_none());
        assert!(synchronizer.last_samples_for("nowhere").len() == 1);
    }
}
