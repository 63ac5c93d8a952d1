//! Cancellation registry for in-flight jobs
//!
//! Maps job ids to their cancellation tokens so a job can be stopped from
//! outside the pool (a chat `/cancel<id>` command, an API call). Ids come
//! from a monotonic counter and insertion refuses collisions, so a cancel
//! request can only ever reach the job it names.

use crate::error::{Error, Result};
use crate::types::JobId;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use tokio_util::sync::CancellationToken;

/// Thread-safe table of live jobs
///
/// All access goes through short critical sections on a std mutex; the lock
/// is never held across an await.
#[derive(Debug)]
pub struct CancellationRegistry {
    jobs: Mutex<HashMap<JobId, CancellationToken>>,
    next_id: AtomicU64,
}

impl Default for CancellationRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl CancellationRegistry {
    /// Create an empty registry; the first allocated id is 1
    pub fn new() -> Self {
        Self {
            jobs: Mutex::new(HashMap::new()),
            next_id: AtomicU64::new(1),
        }
    }

    fn jobs(&self) -> MutexGuard<'_, HashMap<JobId, CancellationToken>> {
        // the map stays consistent even if a holder panicked
        self.jobs.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Allocate an id no other job of this registry has used
    pub fn next_id(&self) -> JobId {
        JobId(self.next_id.fetch_add(1, Ordering::Relaxed))
    }

    /// Track `token` under `id`
    ///
    /// # Errors
    ///
    /// Returns [`Error::DuplicateJob`] if `id` is already registered.
    pub fn register(&self, id: JobId, token: CancellationToken) -> Result<()> {
        let mut jobs = self.jobs();
        if jobs.contains_key(&id) {
            return Err(Error::DuplicateJob(id));
        }
        jobs.insert(id, token);
        tracing::debug!(job_id = %id, live = jobs.len(), "job registered");
        Ok(())
    }

    /// Cancel the job registered under `id`
    ///
    /// Returns `false` when no such job is live (already finished, never
    /// existed, or already cancelled). The entry is removed either way, so a
    /// repeated cancel is a no-op.
    pub fn cancel(&self, id: JobId) -> bool {
        let token = self.jobs().remove(&id);
        match token {
            Some(token) => {
                token.cancel();
                tracing::info!(job_id = %id, "job cancelled");
                true
            }
            None => false,
        }
    }

    /// Forget `id` without cancelling it; unknown ids are ignored
    pub fn unregister(&self, id: JobId) {
        if self.jobs().remove(&id).is_some() {
            tracing::debug!(job_id = %id, "job unregistered");
        }
    }

    /// Whether `id` is live
    pub fn contains(&self, id: JobId) -> bool {
        self.jobs().contains_key(&id)
    }

    /// Number of live jobs
    pub fn len(&self) -> usize {
        self.jobs().len()
    }

    /// Whether no job is live
    pub fn is_empty(&self) -> bool {
        self.jobs().is_empty()
    }

    /// Cancel every live job and clear the table
    pub fn cancel_all(&self) -> usize {
        let drained: Vec<_> = self.jobs().drain().collect();
        for (_, token) in &drained {
            token.cancel();
        }
        drained.len()
    }
}

/// Unregisters its job when dropped
///
/// Held by whoever owns the job for its whole lifetime, so the entry goes
/// away on every exit path including panics and aborted tasks.
#[derive(Debug)]
pub struct Registration {
    registry: Arc<CancellationRegistry>,
    id: JobId,
}

impl Registration {
    /// Register `token` under `id` and return the guard
    pub fn new(registry: Arc<CancellationRegistry>, id: JobId, token: CancellationToken) -> Result<Self> {
        registry.register(id, token)?;
        Ok(Self { registry, id })
    }

    /// Registered id
    pub fn id(&self) -> JobId {
        self.id
    }
}

impl Drop for Registration {
    fn drop(&mut self) {
        self.registry.unregister(self.id);
    }
}
