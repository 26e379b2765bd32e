//! Circular rotation over a fixed snapshot of the best-ranked proxies.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use governor::{
    clock::DefaultClock,
    middleware::NoOpMiddleware,
    state::{InMemoryState, NotKeyed},
    Quota, RateLimiter,
};
use log::{info, warn};
use std::num::NonZeroU32;

use crate::error::PoolError;
use crate::pool::{PoolEntry, RankedPool};

type SlotLimiter = RateLimiter<NotKeyed, InMemoryState, DefaultClock, NoOpMiddleware>;

/// Hook invoked when rotation lands on an entry carrying credentials, so
/// the consumer can regenerate whatever auth artifact its client needs.
/// Only the trigger lives here; the artifact itself is the consumer's
/// concern.
#[async_trait]
pub trait CredentialWriter: Send + Sync {
    async fn refresh(&self, entry: &PoolEntry) -> anyhow::Result<()>;
}

/// Result of one rotation step.
///
/// Receiving a `Rotation` is the signal that the consuming client must be
/// reconfigured or restarted to pick up the new proxy.
#[derive(Debug, Clone)]
pub struct Rotation {
    pub entry: PoolEntry,
    /// Slot of the new active proxy within the snapshot.
    pub index: usize,
    /// Whether a [`CredentialWriter`] ran successfully for this entry.
    pub credentials_refreshed: bool,
}

/// Cycles through an immutable snapshot of the best-ranked proxies.
///
/// The snapshot is taken once from a [`RankedPool`]; re-ranking later
/// requires building a new controller.
pub struct RotationController {
    entries: Vec<PoolEntry>,
    limiters: Vec<Arc<SlotLimiter>>,
    cursor: AtomicUsize,
}

impl RotationController {
    /// Snapshot the `rotation_size` best entries of `pool`, with one rate
    /// limiter per slot capped at `max_rps` requests per second.
    pub fn from_pool(pool: &RankedPool, rotation_size: usize, max_rps: f64) -> Self {
        let entries = pool.best_n(rotation_size).to_vec();
        let limiters = entries.iter().map(|_| new_limiter(max_rps)).collect();
        Self {
            entries,
            limiters,
            cursor: AtomicUsize::new(0),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// The currently active entry.
    pub fn current(&self) -> Result<&PoolEntry, PoolError> {
        if self.entries.is_empty() {
            return Err(PoolError::EmptyPool);
        }
        Ok(&self.entries[self.current_index()])
    }

    /// Rate limiter for the currently active slot.
    pub fn current_limiter(&self) -> Result<Arc<SlotLimiter>, PoolError> {
        if self.limiters.is_empty() {
            return Err(PoolError::EmptyPool);
        }
        Ok(Arc::clone(&self.limiters[self.current_index()]))
    }

    /// Advance to the next slot, wrapping at the end of the snapshot.
    ///
    /// When the new entry carries credentials and a writer is supplied,
    /// the writer runs before the rotation is reported; a writer failure
    /// is logged and reflected in `credentials_refreshed`, not fatal.
    pub async fn rotate(
        &self,
        writer: Option<&dyn CredentialWriter>,
    ) -> Result<Rotation, PoolError> {
        if self.entries.is_empty() {
            return Err(PoolError::EmptyPool);
        }

        let raw = self.cursor.fetch_add(1, Ordering::Relaxed).wrapping_add(1);
        let index = raw % self.entries.len();
        let entry = self.entries[index].clone();

        let mut credentials_refreshed = false;
        if entry.auth.is_some() {
            if let Some(writer) = writer {
                match writer.refresh(&entry).await {
                    Ok(()) => credentials_refreshed = true,
                    Err(e) => warn!("credential artifact refresh failed: {}", e),
                }
            }
        }

        info!("rotated to proxy {} (slot {})", entry.proxy, index);
        Ok(Rotation {
            entry,
            index,
            credentials_refreshed,
        })
    }

    fn current_index(&self) -> usize {
        self.cursor.load(Ordering::Relaxed) % self.entries.len()
    }
}

fn new_limiter(max_rps: f64) -> Arc<SlotLimiter> {
    let quota =
        Quota::per_second(NonZeroU32::new(max_rps.ceil() as u32).unwrap_or(NonZeroU32::MIN));
    Arc::new(RateLimiter::direct(quota))
}
