//! Configuration for the ranking engine.

use std::path::PathBuf;
use std::time::Duration;

use crate::baseline::DEFAULT_BASELINE_ENDPOINTS;
use crate::proxy::Protocol;

/// Configuration for fetching, ranking and rotating proxies.
///
/// Every file path is owned by the caller; the engine never invents
/// storage locations on its own.
#[derive(Debug, Clone)]
pub struct RankerConfig {
    /// Proxy-listing provider to fetch candidates from.
    pub provider_url: String,
    /// Protocol filter sent to the provider.
    pub protocol: Protocol,
    /// Whether the provider should only return SSL-capable proxies.
    pub ssl_required: bool,
    /// Anonymity level requested from the provider.
    pub anonymity: String,
    /// How many of the provider's quickest candidates to probe.
    pub search_size: usize,
    /// How many of the best ranked proxies enter the rotation snapshot.
    pub rotation_size: usize,
    /// Timed trials per candidate when building a fresh ranking.
    pub rank_trials: usize,
    /// Timed trials per candidate when merging into an existing ranking.
    pub merge_trials: usize,
    /// Per-request timeout for probe trials.
    pub probe_timeout: Duration,
    /// Timed trials per baseline endpoint.
    pub baseline_trials: usize,
    /// Per-request timeout for baseline trials.
    pub baseline_timeout: Duration,
    /// Reference endpoints measured without a proxy.
    pub baseline_endpoints: Vec<String>,
    /// Upper bound on concurrently in-flight probe/baseline requests.
    pub max_concurrency: usize,
    /// Where the ranked pool is persisted.
    pub ranking_path: PathBuf,
    /// Where the baseline latency table is persisted.
    pub baseline_path: PathBuf,
    /// Age beyond which a persisted ranking is considered stale.
    pub max_age: Duration,
    /// Times the middleware retries a request with a rotated proxy.
    pub retry_count: usize,
    /// Maximum requests per second per rotation slot.
    pub max_requests_per_second: f64,
}

impl RankerConfig {
    /// Create a new configuration builder.
    pub fn builder() -> RankerConfigBuilder {
        RankerConfigBuilder::new()
    }
}

/// Builder for `RankerConfig`.
pub struct RankerConfigBuilder {
    provider_url: Option<String>,
    protocol: Option<Protocol>,
    ssl_required: Option<bool>,
    anonymity: Option<String>,
    search_size: Option<usize>,
    rotation_size: Option<usize>,
    rank_trials: Option<usize>,
    merge_trials: Option<usize>,
    probe_timeout: Option<Duration>,
    baseline_trials: Option<usize>,
    baseline_timeout: Option<Duration>,
    baseline_endpoints: Option<Vec<String>>,
    max_concurrency: Option<usize>,
    ranking_path: Option<PathBuf>,
    baseline_path: Option<PathBuf>,
    max_age: Option<Duration>,
    retry_count: Option<usize>,
    max_requests_per_second: Option<f64>,
}

impl RankerConfigBuilder {
    pub fn new() -> Self {
        Self {
            provider_url: None,
            protocol: None,
            ssl_required: None,
            anonymity: None,
            search_size: None,
            rotation_size: None,
            rank_trials: None,
            merge_trials: None,
            probe_timeout: None,
            baseline_trials: None,
            baseline_timeout: None,
            baseline_endpoints: None,
            max_concurrency: None,
            ranking_path: None,
            baseline_path: None,
            max_age: None,
            retry_count: None,
            max_requests_per_second: None,
        }
    }

    pub fn provider_url(mut self, url: impl Into<String>) -> Self {
        self.provider_url = Some(url.into());
        self
    }

    pub fn protocol(mut self, protocol: Protocol) -> Self {
        self.protocol = Some(protocol);
        self
    }

    pub fn ssl_required(mut self, required: bool) -> Self {
        self.ssl_required = Some(required);
        self
    }

    pub fn anonymity(mut self, level: impl Into<String>) -> Self {
        self.anonymity = Some(level.into());
        self
    }

    pub fn search_size(mut self, n: usize) -> Self {
        self.search_size = Some(n);
        self
    }

    pub fn rotation_size(mut self, n: usize) -> Self {
        self.rotation_size = Some(n);
        self
    }

    pub fn rank_trials(mut self, n: usize) -> Self {
        self.rank_trials = Some(n);
        self
    }

    pub fn merge_trials(mut self, n: usize) -> Self {
        self.merge_trials = Some(n);
        self
    }

    pub fn probe_timeout(mut self, timeout: Duration) -> Self {
        self.probe_timeout = Some(timeout);
        self
    }

    pub fn baseline_trials(mut self, n: usize) -> Self {
        self.baseline_trials = Some(n);
        self
    }

    pub fn baseline_timeout(mut self, timeout: Duration) -> Self {
        self.baseline_timeout = Some(timeout);
        self
    }

    pub fn baseline_endpoints(mut self, endpoints: Vec<impl Into<String>>) -> Self {
        self.baseline_endpoints = Some(endpoints.into_iter().map(Into::into).collect());
        self
    }

    pub fn max_concurrency(mut self, limit: usize) -> Self {
        self.max_concurrency = Some(limit);
        self
    }

    pub fn ranking_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.ranking_path = Some(path.into());
        self
    }

    pub fn baseline_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.baseline_path = Some(path.into());
        self
    }

    pub fn max_age(mut self, age: Duration) -> Self {
        self.max_age = Some(age);
        self
    }

    pub fn retry_count(mut self, count: usize) -> Self {
        self.retry_count = Some(count);
        self
    }

    pub fn max_requests_per_second(mut self, rps: f64) -> Self {
        self.max_requests_per_second = Some(rps);
        self
    }

    /// Build the configuration.
    ///
    /// The search size is clamped so a rotation snapshot can always be
    /// filled from a fully successful ranking pass.
    pub fn build(self) -> RankerConfig {
        let rotation_size = self.rotation_size.unwrap_or(50);
        let search_size = self.search_size.unwrap_or(50).max(rotation_size);

        RankerConfig {
            provider_url: self
                .provider_url
                .unwrap_or_else(|| "https://api.proxyscrape.com/v3/free-proxy-list/get".to_string()),
            protocol: self.protocol.unwrap_or(Protocol::Socks5),
            ssl_required: self.ssl_required.unwrap_or(true),
            anonymity: self.anonymity.unwrap_or_else(|| "elite".to_string()),
            search_size,
            rotation_size,
            rank_trials: self.rank_trials.unwrap_or(5),
            merge_trials: self.merge_trials.unwrap_or(3),
            probe_timeout: self.probe_timeout.unwrap_or(Duration::from_secs(8)),
            baseline_trials: self.baseline_trials.unwrap_or(3),
            baseline_timeout: self.baseline_timeout.unwrap_or(Duration::from_secs(8)),
            baseline_endpoints: self.baseline_endpoints.unwrap_or_else(|| {
                DEFAULT_BASELINE_ENDPOINTS.iter().map(|s| s.to_string()).collect()
            }),
            max_concurrency: self.max_concurrency.unwrap_or(64),
            ranking_path: self
                .ranking_path
                .unwrap_or_else(|| PathBuf::from("saved_free_proxies.json")),
            baseline_path: self
                .baseline_path
                .unwrap_or_else(|| PathBuf::from("baseline_latencies.json")),
            max_age: self.max_age.unwrap_or(Duration::from_secs(12 * 60 * 60)),
            retry_count: self.retry_count.unwrap_or(3),
            max_requests_per_second: self.max_requests_per_second.unwrap_or(5.0),
        }
    }
}

impl Default for RankerConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_sane() {
        let config = RankerConfig::builder().build();
        assert_eq!(config.protocol, Protocol::Socks5);
        assert_eq!(config.rank_trials, 5);
        assert_eq!(config.merge_trials, 3);
        assert_eq!(config.probe_timeout, Duration::from_secs(8));
        assert_eq!(config.max_age, Duration::from_secs(43_200));
        assert!(!config.baseline_endpoints.is_empty());
    }

    #[test]
    fn search_size_covers_rotation_size() {
        let config = RankerConfig::builder()
            .search_size(10)
            .rotation_size(25)
            .build();
        assert_eq!(config.search_size, 25);
        assert_eq!(config.rotation_size, 25);
    }
}
