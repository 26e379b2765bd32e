//! # ranked-proxy-pool
//!
//! A latency-ranked rotating proxy pool.
//!
//! This library fetches candidate proxies from a listing provider, scores each
//! candidate by timing requests through it against a no-proxy baseline, keeps the
//! scored pool sorted and persisted with a staleness window, and rotates through
//! the best entries on demand.

pub mod baseline;
pub mod catalog;
pub mod config;
pub mod error;
pub mod middleware;
pub mod pool;
pub mod probe;
pub mod proxy;
pub mod rotation;
pub mod runner;

pub use baseline::{BaselineTable, BASELINE_CUTOFF_SECS};
pub use catalog::{fetch_catalog, parse_catalog, Candidate};
pub use config::{RankerConfig, RankerConfigBuilder};
pub use error::{PoolError, ProbeError};
pub use middleware::RotatingProxyMiddleware;
pub use pool::{PoolEntry, RankedPool, TRUSTED_RANK_BASE};
pub use probe::Prober;
pub use proxy::{AuthenticatedProxy, Protocol, Proxy, ProxyAuth};
pub use rotation::{CredentialWriter, Rotation, RotationController};
pub use runner::TaskRunner;
