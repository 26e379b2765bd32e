//! Relative-latency probing of individual candidates.

use std::sync::Arc;
use std::time::{Duration, Instant};

use log::debug;
use parking_lot::Mutex;
use reqwest::Client;

use crate::baseline::BaselineTable;
use crate::error::ProbeError;
use crate::proxy::Proxy;
use crate::runner::TaskRunner;

/// Scores candidates by timing requests through them against a baseline
/// endpoint.
pub struct Prober {
    baseline: BaselineTable,
    runner: TaskRunner,
    timeout: Duration,
}

impl Prober {
    pub fn new(baseline: BaselineTable, runner: TaskRunner, timeout: Duration) -> Self {
        Self {
            baseline,
            runner,
            timeout,
        }
    }

    pub fn baseline(&self) -> &BaselineTable {
        &self.baseline
    }

    /// Score one candidate: average of `trials` timed requests through it,
    /// minus the chosen endpoint's no-proxy latency. Lower is better.
    ///
    /// Zero trials short-circuit to a score of 0 (the trusted path).
    /// Individual trial timeouts and connection failures are dropped
    /// silently; the average divides by the configured trial count, not
    /// the success count. Only a candidate with no successful trial at
    /// all, or one whose client cannot be built, is reported unusable.
    pub async fn probe(&self, proxy: &Proxy, trials: usize) -> Result<f64, ProbeError> {
        if trials == 0 {
            return Ok(0.0);
        }

        let (endpoint, baseline_latency) =
            self.baseline.pick_random().ok_or(ProbeError::NoBaseline)?;

        let client = Client::builder()
            .timeout(self.timeout)
            .proxy(proxy.to_reqwest_proxy().map_err(ProbeError::Client)?)
            .build()
            .map_err(ProbeError::Client)?;

        let samples: Arc<Mutex<Vec<f64>>> = Arc::new(Mutex::new(Vec::with_capacity(trials)));
        let mut trial_tasks = Vec::with_capacity(trials);
        for _ in 0..trials {
            let client = client.clone();
            let endpoint = endpoint.to_string();
            let samples = Arc::clone(&samples);
            trial_tasks.push(async move {
                let start = Instant::now();
                match client.get(&endpoint).send().await {
                    Ok(_) => samples.lock().push(start.elapsed().as_secs_f64()),
                    Err(e) => debug!("probe trial via {} failed: {}", endpoint, e),
                }
            });
        }
        self.runner.run_all(trial_tasks).await;

        let samples = samples.lock();
        if samples.is_empty() {
            return Err(ProbeError::AllTrialsFailed);
        }
        Ok(relative_score(&samples, trials, baseline_latency))
    }
}

fn relative_score(samples: &[f64], trials: usize, baseline_latency: f64) -> f64 {
    samples.iter().sum::<f64>() / trials as f64 - baseline_latency
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::proxy::Protocol;
    use std::collections::HashMap;

    #[test]
    fn score_divides_by_configured_trial_count() {
        // two successes out of four trials: (1.0 + 2.0) / 4 - 0.5
        let score = relative_score(&[1.0, 2.0], 4, 0.5);
        assert!((score - 0.25).abs() < 1e-9);
    }

    #[test]
    fn faster_than_baseline_goes_negative() {
        let score = relative_score(&[0.2, 0.2], 2, 0.5);
        assert!(score < 0.0);
    }

    #[test]
    fn zero_trials_short_circuit() {
        let prober = Prober::new(
            BaselineTable::default(),
            TaskRunner::new(4),
            Duration::from_secs(8),
        );
        let proxy = Proxy::new("127.0.0.1:1080", Protocol::Socks5);
        let score = tokio_test::block_on(prober.probe(&proxy, 0)).unwrap();
        assert_eq!(score, 0.0);
    }

    #[test]
    fn empty_baseline_degrades_the_candidate() {
        let prober = Prober::new(
            BaselineTable::default(),
            TaskRunner::new(4),
            Duration::from_secs(8),
        );
        let proxy = Proxy::new("127.0.0.1:1080", Protocol::Socks5);
        assert!(matches!(
            tokio_test::block_on(prober.probe(&proxy, 3)),
            Err(ProbeError::NoBaseline)
        ));
    }

    #[test]
    fn baseline_accessor_exposes_the_table() {
        let mut entries = HashMap::new();
        entries.insert("https://a.example".to_string(), 0.3);
        let prober = Prober::new(
            BaselineTable::from_entries(entries),
            TaskRunner::new(4),
            Duration::from_secs(8),
        );
        assert_eq!(prober.baseline().len(), 1);
    }
}
