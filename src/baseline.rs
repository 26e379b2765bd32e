//! Baseline latency measurement against reference endpoints.
//!
//! Probe scores are relative: a candidate's latency only means something
//! compared to how fast the same endpoint answers without a proxy. This
//! module measures and persists those no-proxy latencies.

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};

use log::{debug, info};
use parking_lot::Mutex;
use rand::Rng;
use reqwest::Client;

use crate::config::RankerConfig;
use crate::error::PoolError;
use crate::runner::TaskRunner;

/// Endpoints recorded slower than this are useless as references and are
/// dropped before the table reaches callers.
pub const BASELINE_CUTOFF_SECS: f64 = 5.0;

/// Reference endpoints measured when the caller does not supply a list.
/// Plain public sites, nothing more; only their round-trip time matters.
pub const DEFAULT_BASELINE_ENDPOINTS: &[&str] = &[
    "https://google.com",
    "https://youtube.com",
    "https://wikipedia.org",
    "https://github.com",
    "https://stackoverflow.com",
    "https://microsoft.com",
    "https://apple.com",
    "https://bing.com",
    "https://duckduckgo.com",
    "https://archive.org",
    "https://bbc.com",
    "https://cnn.com",
    "https://nytimes.com",
    "https://reuters.com",
    "https://apnews.com",
    "https://theguardian.com",
    "https://bloomberg.com",
    "https://wired.com",
    "https://medium.com",
    "https://imdb.com",
];

/// Measured average no-proxy latency per reference endpoint, in seconds.
#[derive(Debug, Clone, Default)]
pub struct BaselineTable {
    entries: HashMap<String, f64>,
}

impl BaselineTable {
    /// Build a table from already-measured latencies.
    pub fn from_entries(entries: HashMap<String, f64>) -> Self {
        Self { entries }
    }

    /// Measure every endpoint with `trials` timed requests each.
    ///
    /// Failed trials are skipped silently; the average divides by the
    /// configured trial count, not the success count, so failures pull an
    /// endpoint's recorded latency toward zero. Endpoints where every
    /// trial failed contribute no entry at all.
    pub async fn measure(
        endpoints: &[String],
        trials: usize,
        timeout: Duration,
        runner: &TaskRunner,
    ) -> Result<Self, PoolError> {
        let client = Client::builder().timeout(timeout).build()?;
        let samples: Arc<Mutex<HashMap<String, Vec<f64>>>> = Arc::new(Mutex::new(HashMap::new()));

        let mut endpoint_tasks = Vec::with_capacity(endpoints.len());
        for endpoint in endpoints {
            let runner = runner.clone();
            let client = client.clone();
            let samples = Arc::clone(&samples);
            let endpoint = endpoint.clone();

            endpoint_tasks.push(async move {
                let mut trial_tasks = Vec::with_capacity(trials);
                for _ in 0..trials {
                    let client = client.clone();
                    let samples = Arc::clone(&samples);
                    let endpoint = endpoint.clone();
                    trial_tasks.push(async move {
                        let start = Instant::now();
                        match client.get(&endpoint).send().await {
                            Ok(_) => {
                                let elapsed = start.elapsed().as_secs_f64();
                                samples.lock().entry(endpoint).or_default().push(elapsed);
                            }
                            Err(e) => debug!("baseline trial against {} failed: {}", endpoint, e),
                        }
                    });
                }
                runner.run_all(trial_tasks).await;
            });
        }
        futures::future::join_all(endpoint_tasks).await;

        let samples = samples.lock();
        let entries: HashMap<String, f64> = samples
            .iter()
            .map(|(endpoint, times)| {
                (endpoint.clone(), times.iter().sum::<f64>() / trials as f64)
            })
            .collect();

        info!(
            "measured baseline latency for {}/{} endpoints",
            entries.len(),
            endpoints.len()
        );
        Ok(Self { entries })
    }

    /// Load the table from `path`, dropping unusable entries.
    pub fn load(path: &Path) -> Result<Self, PoolError> {
        let body = std::fs::read_to_string(path)?;
        let entries: HashMap<String, f64> = serde_json::from_str(&body)
            .map_err(|e| PoolError::PersistenceFormat(e.to_string()))?;
        Ok(Self { entries }.with_cutoff())
    }

    /// Load from `config.baseline_path` when the file exists, otherwise
    /// measure, persist, and return the filtered result.
    pub async fn load_or_measure(
        config: &RankerConfig,
        runner: &TaskRunner,
    ) -> Result<Self, PoolError> {
        if config.baseline_path.exists() {
            let table = Self::load(&config.baseline_path)?;
            info!(
                "loaded {} baseline endpoints from {}",
                table.len(),
                config.baseline_path.display()
            );
            return Ok(table);
        }

        let table = Self::measure(
            &config.baseline_endpoints,
            config.baseline_trials,
            config.baseline_timeout,
            runner,
        )
        .await?;
        table.save(&config.baseline_path)?;
        Ok(table.with_cutoff())
    }

    /// Persist the raw table to `path` as a flat JSON map.
    pub fn save(&self, path: &Path) -> Result<(), PoolError> {
        let body = serde_json::to_string(&self.entries)
            .map_err(|e| PoolError::PersistenceFormat(e.to_string()))?;
        std::fs::write(path, body)?;
        Ok(())
    }

    /// Pick a reference endpoint uniformly at random.
    pub fn pick_random(&self) -> Option<(&str, f64)> {
        if self.entries.is_empty() {
            return None;
        }
        let idx = rand::rng().random_range(0..self.entries.len());
        self.entries
            .iter()
            .nth(idx)
            .map(|(endpoint, latency)| (endpoint.as_str(), *latency))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn with_cutoff(mut self) -> Self {
        self.entries.retain(|_, latency| *latency < BASELINE_CUTOFF_SECS);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table(pairs: &[(&str, f64)]) -> BaselineTable {
        BaselineTable::from_entries(
            pairs.iter().map(|(k, v)| (k.to_string(), *v)).collect(),
        )
    }

    #[test]
    fn load_drops_slow_endpoints() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("baseline.json");
        table(&[("https://a.example", 1.2), ("https://b.example", 6.0)])
            .save(&path)
            .unwrap();

        let loaded = BaselineTable::load(&path).unwrap();
        assert_eq!(loaded.len(), 1);
        let (endpoint, latency) = loaded.pick_random().unwrap();
        assert_eq!(endpoint, "https://a.example");
        assert!((latency - 1.2).abs() < f64::EPSILON);
    }

    #[test]
    fn load_rejects_malformed_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("baseline.json");
        std::fs::write(&path, "[1, 2, 3]").unwrap();
        assert!(matches!(
            BaselineTable::load(&path),
            Err(PoolError::PersistenceFormat(_))
        ));
    }

    #[test]
    fn pick_random_on_empty_table() {
        assert!(BaselineTable::default().pick_random().is_none());
    }

    #[test]
    fn pick_random_stays_within_entries() {
        let table = table(&[("https://a.example", 0.1), ("https://b.example", 0.2)]);
        for _ in 0..16 {
            let (endpoint, _) = table.pick_random().unwrap();
            assert!(endpoint.starts_with("https://"));
        }
    }
}
