//! Startup and shutdown coordination.

use super::RelayPool;
use crate::error::{Error, JobError, Result};
use crate::types::Event;
use std::sync::atomic::Ordering;
use std::time::Duration;

/// How long cancelled jobs get to unwind after the grace period
const CANCEL_WAIT: Duration = Duration::from_secs(5);

impl RelayPool {
    /// Spawn the worker tasks
    ///
    /// Calling this more than once has no further effect.
    pub fn start(&self) {
        let mut workers = self
            .state
            .workers
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        if !workers.is_empty() {
            return;
        }

        let count = self.config.workers.worker_count;
        for worker in 0..count {
            workers.push(tokio::spawn(self.clone().worker_loop(worker)));
        }
        tracing::info!(workers = count, "relay pool started");
    }

    /// Gracefully shut down the pool
    ///
    /// 1. Stops accepting new jobs and closes the queue
    /// 2. Jobs still waiting in the queue complete with a cancellation error
    /// 3. Running jobs get `shutdown_timeout` to finish
    /// 4. Whatever is still running is then cancelled
    ///
    /// Calling this again after the first call is a no-op.
    pub async fn shutdown(&self) -> Result<()> {
        if !self.state.accepting_new.swap(false, Ordering::SeqCst) {
            return Ok(());
        }
        tracing::info!("Initiating graceful shutdown");

        // dropping our sender closes the queue once in-flight submits finish
        self.state
            .queue_tx
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .take();

        let mut workers: Vec<_> = self
            .state
            .workers
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .drain(..)
            .collect();

        if workers.is_empty() {
            self.drain_queue().await;
        }

        let grace = self.config.workers.shutdown_timeout;
        let graceful =
            tokio::time::timeout(grace, futures::future::join_all(workers.iter_mut())).await;

        match graceful {
            Ok(_) => tracing::info!("All running jobs completed gracefully"),
            Err(_) => {
                tracing::warn!(
                    live_jobs = self.registry.len(),
                    "Timeout waiting for running jobs, cancelling them"
                );
                self.state.root_token.cancel();
                // finished handles must not be polled again
                workers.retain(|worker| !worker.is_finished());
                if tokio::time::timeout(CANCEL_WAIT, futures::future::join_all(workers.iter_mut()))
                    .await
                    .is_err()
                {
                    tracing::error!("Workers did not stop after cancellation, aborting them");
                    for worker in &workers {
                        worker.abort();
                    }
                }
            }
        }

        self.state.root_token.cancel();
        self.emit(Event::Shutdown);
        tracing::info!("Graceful shutdown complete");
        Ok(())
    }

    /// Fail every job left in the queue when no worker will ever take it
    async fn drain_queue(&self) {
        let mut queue = self.state.queue_rx.lock().await;
        queue.close();
        while let Ok(job) = queue.try_recv() {
            tracing::info!(job_id = %job.id, "discarding queued job during shutdown");
            self.emit(Event::JobCancelled { id: job.id });
            job.slot.deliver(Err(JobError::from(Error::ShuttingDown)));
        }
    }
}
