//! Error types for the ranked-proxy-pool crate.

use thiserror::Error;

/// Errors surfaced by fetching, persistence and rotation.
///
/// Candidate-level probe faults never appear here: they degrade a single
/// candidate and are reported as [`ProbeError`] at the probing site.
#[derive(Debug, Error)]
pub enum PoolError {
    /// An HTTP request the engine depends on failed outright.
    #[error("http request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// The provider response body could not be parsed as JSON at all.
    #[error("provider response body is not valid JSON: {0}")]
    ProviderNotJson(#[source] serde_json::Error),

    /// The provider response parsed as JSON but carries no `proxies` array.
    #[error("provider JSON response has no \"proxies\" array")]
    ProviderMissingProxies,

    #[error("invalid provider url: {0}")]
    InvalidProviderUrl(#[from] url::ParseError),

    /// A persisted file lacks the required structure or carries an
    /// unparsable date.
    #[error("persisted file is malformed: {0}")]
    PersistenceFormat(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// Rotation was requested against an empty pool snapshot.
    #[error("no proxies available in the rotation pool")]
    EmptyPool,

    /// A proxy descriptor string could not be parsed.
    #[error("invalid proxy descriptor {0:?}")]
    InvalidProxy(String),

    #[error("unsupported proxy protocol {0:?}")]
    UnsupportedProtocol(String),
}

/// Why a single candidate could not be scored.
///
/// These degrade the candidate to "dropped" and never abort the
/// surrounding batch.
#[derive(Debug, Error)]
pub enum ProbeError {
    /// The proxied client could not be constructed for this candidate.
    #[error("failed to build proxied client: {0}")]
    Client(#[source] reqwest::Error),

    /// Every timed trial through the candidate failed or timed out.
    #[error("every probe trial failed")]
    AllTrialsFailed,

    /// There is no baseline endpoint to measure against.
    #[error("no baseline endpoints available")]
    NoBaseline,
}
