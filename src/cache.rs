//! Short-TTL cache shielding the accounting query from high-frequency polling.
//!
//! The cache is injected behind a trait so tests can swap in a double and so
//! the in-memory store could later be replaced by an external one without
//! touching callers. It is a pure read-through accelerator: the submission
//! pipeline is the only proactive invalidator, the TTL bounds staleness
//! otherwise.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::slurm::Job;

#[async_trait]
pub trait JobCache: Send + Sync {
    /// Returns the cached listing, or `None` when empty or expired.
    async fn get(&self) -> Option<Vec<Job>>;
    /// Replaces the cached listing, valid for `ttl`.
    async fn put(&self, jobs: Vec<Job>, ttl: Duration);
    /// Drops the cached listing so the next read misses.
    async fn invalidate(&self);
}

/// In-process cache holding a single listing with a deadline.
#[derive(Default)]
pub struct MemoryJobCache {
    slot: RwLock<Option<(Instant, Vec<Job>)>>,
}

impl MemoryJobCache {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl JobCache for MemoryJobCache {
    async fn get(&self) -> Option<Vec<Job>> {
        let slot = self.slot.read().await;
        match slot.as_ref() {
            Some((deadline, jobs)) if Instant::now() < *deadline => Some(jobs.clone()),
            _ => None,
        }
    }

    async fn put(&self, jobs: Vec<Job>, ttl: Duration) {
        let mut slot = self.slot.write().await;
        *slot = Some((Instant::now() + ttl, jobs));
    }

    async fn invalidate(&self) {
        let mut slot = self.slot.write().await;
        *slot = None;
    }
}
