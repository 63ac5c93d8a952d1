//! Worker loop: pulls jobs off the shared queue and runs them one at a time.

use super::RelayPool;
use super::submit::QueuedJob;
use crate::error::{Error, JobError};
use crate::relay::JobContext;
use crate::types::{Event, JobId};
use std::sync::atomic::Ordering;
use std::time::Instant;

impl RelayPool {
    /// Body of one worker task
    ///
    /// Exits once the queue is closed and drained.
    pub(crate) async fn worker_loop(self, worker: usize) {
        tracing::debug!(worker, "worker started");
        loop {
            let next = {
                let mut queue = self.state.queue_rx.lock().await;
                queue.recv().await
            };
            let Some(job) = next else {
                break;
            };
            self.process_job(worker, job).await;
        }
        tracing::debug!(worker, "worker stopped");
    }

    /// Run one job to completion and deliver its result
    async fn process_job(&self, worker: usize, job: QueuedJob) {
        let QueuedJob {
            id,
            url,
            events,
            token,
            slot,
            registration,
        } = job;

        if !self.state.accepting_new.load(Ordering::SeqCst) {
            tracing::info!(job_id = %id, "discarding queued job during shutdown");
            drop(registration);
            self.emit(Event::JobCancelled { id });
            slot.deliver(Err(JobError::from(Error::ShuttingDown)));
            return;
        }

        tracing::info!(job_id = %id, worker, url = %url, "job started");
        self.emit(Event::JobStarted { id });
        let started = Instant::now();

        let result = if token.is_cancelled() {
            Err(Error::Cancelled)
        } else {
            let relay = self.relay.clone();
            let ctx = JobContext::new(id, token.clone(), events, self.event_tx.clone());
            // own task, so a panic fails this job instead of killing the worker
            tokio::spawn(async move { relay.run(&ctx, &url).await })
                .await
                .unwrap_or_else(|e| Err(Error::Other(format!("job task failed: {e}"))))
        };

        // the job is over: drop the registry entry and release child tokens
        drop(registration);
        token.cancel();

        self.report(id, &result, started);
        slot.deliver(result.map_err(JobError::from));
    }

    fn report(&self, id: JobId, result: &crate::Result<Vec<String>>, started: Instant) {
        let elapsed_ms = started.elapsed().as_millis() as u64;
        match result {
            Ok(identifiers) => {
                tracing::info!(job_id = %id, parts = identifiers.len(), elapsed_ms, "job completed");
                self.emit(Event::JobCompleted {
                    id,
                    identifiers: identifiers.len(),
                });
            }
            Err(Error::Cancelled | Error::ShuttingDown) => {
                tracing::info!(job_id = %id, elapsed_ms, "job cancelled");
                self.emit(Event::JobCancelled { id });
            }
            Err(e) => {
                let kind = e.kind();
                tracing::error!(job_id = %id, kind = %kind, error = %e, elapsed_ms, "job failed");
                self.emit(Event::JobFailed {
                    id,
                    kind,
                    error: e.to_string(),
                });
            }
        }
    }
}
