//! The score-ordered proxy pool.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Local, NaiveDateTime, TimeDelta};
use futures::future;
use log::{info, warn};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::baseline::BaselineTable;
use crate::catalog;
use crate::config::RankerConfig;
use crate::error::PoolError;
use crate::probe::Prober;
use crate::proxy::{AuthenticatedProxy, Proxy, ProxyAuth};
use crate::runner::TaskRunner;

/// Base synthetic score handed to trusted entries. Far below anything a
/// probe can produce, so trusted proxies always rank first; consecutive
/// entries get strictly ascending offsets to preserve caller priority.
pub const TRUSTED_RANK_BASE: f64 = -1.0e13;

const POOL_FILE_TYPE: &str = "RankedProxies";
const SAVED_DATE_FORMAT: &str = "%d.%m.%Y, %H:%M:%S";

/// One scored proxy. Lower scores rank earlier.
#[derive(Debug, Clone)]
pub struct PoolEntry {
    pub proxy: Proxy,
    /// Credentials for trusted authenticated entries. Never persisted.
    pub auth: Option<ProxyAuth>,
    pub score: f64,
}

impl PoolEntry {
    /// Convert to a `reqwest::Proxy`, applying basic auth when present.
    pub fn to_reqwest_proxy(&self) -> Result<reqwest::Proxy, reqwest::Error> {
        let proxy = self.proxy.to_reqwest_proxy()?;
        Ok(match &self.auth {
            Some(auth) => proxy.basic_auth(&auth.username, &auth.password),
            None => proxy,
        })
    }
}

#[derive(Serialize, Deserialize)]
struct SavedPool {
    #[serde(rename = "type", default)]
    kind: String,
    proxies: Vec<((String, crate::proxy::Protocol), f64)>,
    #[serde(default)]
    date: Option<String>,
}

/// An ordered set of scored proxies.
///
/// The entry list is sorted ascending by score after every mutation.
/// Merges append and re-sort without de-duplicating by address, so
/// merging the same candidate twice yields two entries.
#[derive(Debug, Clone)]
pub struct RankedPool {
    entries: Vec<PoolEntry>,
    created_at: DateTime<Local>,
}

impl RankedPool {
    pub fn empty() -> Self {
        Self {
            entries: Vec::new(),
            created_at: Local::now(),
        }
    }

    /// Probe every candidate concurrently and build a sorted pool from
    /// the survivors.
    ///
    /// Candidates that cannot be scored are dropped with a warning; a
    /// batch where every candidate fails yields a valid empty pool.
    pub async fn rank(candidates: Vec<Proxy>, prober: &Prober, trials: usize) -> Self {
        let entries = Self::probe_all(candidates, prober, trials).await;
        let mut pool = Self {
            entries,
            created_at: Local::now(),
        };
        pool.sort();
        info!("ranked pool created with {} entries", pool.len());
        pool
    }

    /// Probe new candidates and merge the survivors into this pool.
    pub async fn merge_probed(&mut self, candidates: Vec<Proxy>, prober: &Prober, trials: usize) {
        let mut fresh = Self::probe_all(candidates, prober, trials).await;
        let merged = fresh.len();
        self.entries.append(&mut fresh);
        self.sort();
        info!("merged {} probed entries, pool now holds {}", merged, self.len());
    }

    /// Merge trusted proxies without probing them.
    ///
    /// The first supplied proxy ranks best; all of them outrank any
    /// probed entry.
    pub fn merge_trusted(&mut self, proxies: Vec<Proxy>) {
        self.merge_synthetic(proxies.into_iter().map(|proxy| (proxy, None)));
    }

    /// Merge trusted authenticated proxies without probing them.
    pub fn merge_trusted_authenticated(&mut self, proxies: Vec<AuthenticatedProxy>) {
        self.merge_synthetic(proxies.into_iter().map(|p| (p.proxy, Some(p.auth))));
    }

    /// Build a pool holding only trusted proxies.
    pub fn from_trusted(proxies: Vec<Proxy>) -> Self {
        let mut pool = Self::empty();
        pool.merge_trusted(proxies);
        pool
    }

    /// Build a pool holding only trusted authenticated proxies.
    pub fn from_trusted_authenticated(proxies: Vec<AuthenticatedProxy>) -> Self {
        let mut pool = Self::empty();
        pool.merge_trusted_authenticated(proxies);
        pool
    }

    /// The best-ranked entry, if any.
    pub fn best(&self) -> Option<&PoolEntry> {
        self.entries.first()
    }

    /// The `n` best entries in ranked order. Asking for more than the
    /// pool holds returns everything available.
    pub fn best_n(&self, n: usize) -> &[PoolEntry] {
        &self.entries[..n.min(self.entries.len())]
    }

    pub fn entries(&self) -> &[PoolEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// When this ranking was produced.
    pub fn created_at(&self) -> DateTime<Local> {
        self.created_at
    }

    /// Whether this ranking is older than `max_age`. The refresh decision
    /// belongs to the caller.
    pub fn is_stale(&self, max_age: Duration) -> bool {
        let max_age = TimeDelta::from_std(max_age).unwrap_or(TimeDelta::MAX);
        Local::now().signed_duration_since(self.created_at) > max_age
    }

    /// Persist the pool to `path`.
    ///
    /// Credentials on trusted entries are not written; only address,
    /// protocol and score survive a round-trip.
    pub fn save(&self, path: &Path) -> Result<(), PoolError> {
        let saved = SavedPool {
            kind: POOL_FILE_TYPE.to_string(),
            proxies: self
                .entries
                .iter()
                .map(|e| ((e.proxy.address.clone(), e.proxy.protocol), e.score))
                .collect(),
            date: Some(self.created_at.format(SAVED_DATE_FORMAT).to_string()),
        };
        let body = serde_json::to_string(&saved)
            .map_err(|e| PoolError::PersistenceFormat(e.to_string()))?;
        std::fs::write(path, body)?;
        info!("saved {} ranked proxies to {}", self.len(), path.display());
        Ok(())
    }

    /// Load a pool from `path`.
    ///
    /// A payload without the required structure is a fatal format error;
    /// a missing date defaults to now.
    pub fn load(path: &Path) -> Result<Self, PoolError> {
        let body = std::fs::read_to_string(path)?;
        let saved: SavedPool = serde_json::from_str(&body)
            .map_err(|e| PoolError::PersistenceFormat(e.to_string()))?;

        let entries = saved
            .proxies
            .into_iter()
            .map(|((address, protocol), score)| PoolEntry {
                proxy: Proxy::new(address, protocol),
                auth: None,
                score,
            })
            .collect();
        let created_at = match saved.date {
            Some(date) => parse_saved_date(&date)?,
            None => Local::now(),
        };

        let mut pool = Self { entries, created_at };
        pool.sort();
        Ok(pool)
    }

    /// Empty the pool, optionally deleting its backing file.
    ///
    /// Asking to delete a file that does not exist is an error, not a
    /// silent no-op.
    pub fn clear(&mut self, backing_file: Option<&Path>) -> Result<(), PoolError> {
        self.entries.clear();
        if let Some(path) = backing_file {
            std::fs::remove_file(path)?;
        }
        Ok(())
    }

    /// Load the persisted ranking when it exists and is fresh, otherwise
    /// run a full fetch-and-rank pass and persist the result.
    pub async fn load_or_rank(config: &RankerConfig) -> Result<Self, PoolError> {
        if config.ranking_path.exists() {
            let pool = Self::load(&config.ranking_path)?;
            if !pool.is_stale(config.max_age) {
                info!(
                    "loaded {} ranked proxies from {}",
                    pool.len(),
                    config.ranking_path.display()
                );
                return Ok(pool);
            }
            info!(
                "saved ranking from {} is stale, refreshing",
                pool.created_at.format(SAVED_DATE_FORMAT)
            );
        }
        Self::refresh(config).await
    }

    /// Run the full pipeline: baseline, fetch, rank, persist.
    pub async fn refresh(config: &RankerConfig) -> Result<Self, PoolError> {
        let runner = TaskRunner::new(config.max_concurrency);
        let baseline = BaselineTable::load_or_measure(config, &runner).await?;
        let candidates = catalog::fetch_catalog(config)
            .await?
            .into_iter()
            .map(|c| c.proxy)
            .collect();

        let prober = Prober::new(baseline, runner, config.probe_timeout);
        let pool = Self::rank(candidates, &prober, config.rank_trials).await;
        pool.save(&config.ranking_path)?;
        Ok(pool)
    }

    async fn probe_all(candidates: Vec<Proxy>, prober: &Prober, trials: usize) -> Vec<PoolEntry> {
        let total = candidates.len();
        let scored: Arc<Mutex<Vec<PoolEntry>>> = Arc::new(Mutex::new(Vec::with_capacity(total)));

        let mut tasks = Vec::with_capacity(total);
        for proxy in candidates {
            let scored = Arc::clone(&scored);
            tasks.push(async move {
                match prober.probe(&proxy, trials).await {
                    Ok(score) => scored.lock().push(PoolEntry {
                        proxy,
                        auth: None,
                        score,
                    }),
                    Err(e) => warn!("dropping candidate {}: {}", proxy, e),
                }
            });
        }
        future::join_all(tasks).await;

        let survivors = std::mem::take(&mut *scored.lock());
        info!("{}/{} candidates survived probing", survivors.len(), total);
        survivors
    }

    fn merge_synthetic(&mut self, proxies: impl Iterator<Item = (Proxy, Option<ProxyAuth>)>) {
        self.entries
            .extend(proxies.enumerate().map(|(i, (proxy, auth))| PoolEntry {
                proxy,
                auth,
                score: TRUSTED_RANK_BASE + i as f64,
            }));
        self.sort();
    }

    fn sort(&mut self) {
        self.entries.sort_by(|a, b| {
            a.score
                .partial_cmp(&b.score)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
    }
}

fn parse_saved_date(date: &str) -> Result<DateTime<Local>, PoolError> {
    let naive = NaiveDateTime::parse_from_str(date, SAVED_DATE_FORMAT)
        .map_err(|e| PoolError::PersistenceFormat(format!("bad date {date:?}: {e}")))?;
    naive
        .and_local_timezone(Local)
        .earliest()
        .ok_or_else(|| PoolError::PersistenceFormat(format!("date {date:?} has no local representation")))
}
