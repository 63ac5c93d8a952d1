//! Job submission, result delivery and handles

use super::RelayPool;
use crate::error::{Error, ErrorKind, JobError, Result};
use crate::registry::Registration;
use crate::types::{Event, EventCallback, JobId, JobResult, noop_events};
use std::sync::atomic::Ordering;
use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;

/// A URL to relay, plus how to report progress on it
#[derive(Clone)]
pub struct JobRequest {
    /// Id from [`RelayPool::next_job_id`]
    pub id: JobId,
    /// Source URL (`http` or `https`)
    pub url: String,
    /// Receives human-readable status lines while the job runs
    pub events: EventCallback,
}

impl JobRequest {
    /// Request with no status callback
    pub fn new(id: JobId, url: impl Into<String>) -> Self {
        Self {
            id,
            url: url.into(),
            events: noop_events(),
        }
    }

    /// Attach a status callback
    pub fn with_events(mut self, events: EventCallback) -> Self {
        self.events = events;
        self
    }
}

impl std::fmt::Debug for JobRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JobRequest")
            .field("id", &self.id)
            .field("url", &self.url)
            .finish_non_exhaustive()
    }
}

/// Sending half of a job's result channel
///
/// [`deliver`](Self::deliver) consumes the slot, so a result can be sent at
/// most once. A slot dropped without delivering (job discarded at shutdown,
/// worker panic) sends a cancellation error instead, so the submitter never
/// waits forever.
pub(crate) struct ResultSlot {
    id: JobId,
    tx: Option<oneshot::Sender<JobResult>>,
}

impl ResultSlot {
    pub(crate) fn new(id: JobId, tx: oneshot::Sender<JobResult>) -> Self {
        Self { id, tx: Some(tx) }
    }

    pub(crate) fn deliver(mut self, result: JobResult) {
        if let Some(tx) = self.tx.take()
            && tx.send(result).is_err()
        {
            tracing::debug!(job_id = %self.id, "submitter stopped waiting for result");
        }
    }
}

impl Drop for ResultSlot {
    fn drop(&mut self) {
        if let Some(tx) = self.tx.take() {
            tracing::warn!(job_id = %self.id, "job dropped before completion");
            tx.send(Err(JobError::new(
                ErrorKind::Cancelled,
                "job dropped before completion",
            )))
            .ok();
        }
    }
}

/// A job travelling through the queue to a worker
pub(crate) struct QueuedJob {
    pub(crate) id: JobId,
    pub(crate) url: String,
    pub(crate) events: EventCallback,
    pub(crate) token: CancellationToken,
    pub(crate) slot: ResultSlot,
    pub(crate) registration: Registration,
}

/// Submitter's view of a job
///
/// Dropping the handle does not cancel the job.
#[derive(Debug)]
pub struct JobHandle {
    id: JobId,
    token: CancellationToken,
    result: oneshot::Receiver<JobResult>,
}

impl JobHandle {
    /// Job id
    pub fn id(&self) -> JobId {
        self.id
    }

    /// Ask the job to stop; harmless if it already finished
    pub fn cancel(&self) {
        self.token.cancel();
    }

    /// Wait for the job's result
    pub async fn wait(self) -> JobResult {
        self.result.await.unwrap_or_else(|_| {
            Err(JobError::new(
                ErrorKind::InternalError,
                "result channel closed without a result",
            ))
        })
    }
}

fn validate_url(raw: &str) -> Result<()> {
    let invalid = |reason: &str| Error::InvalidUrl {
        url: raw.to_string(),
        reason: reason.to_string(),
    };
    let parsed = url::Url::parse(raw.trim()).map_err(|e| invalid(&e.to_string()))?;
    match parsed.scheme() {
        "http" | "https" => {}
        other => return Err(invalid(&format!("unsupported scheme {other:?}"))),
    }
    if parsed.host_str().is_none_or(str::is_empty) {
        return Err(invalid("missing host"));
    }
    Ok(())
}

impl RelayPool {
    /// Queue a job
    ///
    /// Waits while the queue is full, so submitters are throttled once every
    /// worker is busy and the queue holds its capacity. The job can be
    /// cancelled through the returned handle or [`RelayPool::cancel`] as soon
    /// as this returns.
    ///
    /// # Errors
    ///
    /// - [`Error::ShuttingDown`] if the pool no longer accepts jobs
    /// - [`Error::InvalidUrl`] for anything but an absolute http(s) URL
    /// - [`Error::DuplicateJob`] if the id is already live
    pub async fn submit(&self, request: JobRequest) -> Result<JobHandle> {
        if !self.state.accepting_new.load(Ordering::SeqCst) {
            return Err(Error::ShuttingDown);
        }
        validate_url(&request.url)?;

        let sender = self
            .state
            .queue_tx
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
            .ok_or(Error::ShuttingDown)?;

        let JobRequest { id, url, events } = request;
        let token = self.state.root_token.child_token();
        let registration = Registration::new(self.registry.clone(), id, token.clone())?;
        let (tx, rx) = oneshot::channel();

        let job = QueuedJob {
            id,
            url: url.trim().to_string(),
            events,
            token: token.clone(),
            slot: ResultSlot::new(id, tx),
            registration,
        };
        let queued_url = job.url.clone();

        sender.send(job).await.map_err(|_| Error::ShuttingDown)?;

        tracing::info!(job_id = %id, url = %queued_url, "job queued");
        self.emit(Event::JobQueued {
            id,
            url: queued_url,
        });

        Ok(JobHandle {
            id,
            token,
            result: rx,
        })
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn urls_must_be_absolute_http() {
        assert!(validate_url("https://example.com/file.zip").is_ok());
        assert!(validate_url("http://10.0.0.1:8080/a").is_ok());
        assert!(validate_url("ftp://example.com/file").is_err());
        assert!(validate_url("example.com/file").is_err());
        assert!(validate_url("file:///etc/passwd").is_err());
    }

    #[tokio::test]
    async fn slot_delivers_once() {
        let (tx, rx) = oneshot::channel();
        let slot = ResultSlot::new(JobId(1), tx);
        slot.deliver(Ok(vec!["a".into()]));
        assert_eq!(rx.await.unwrap(), Ok(vec!["a".to_string()]));
    }

    #[tokio::test]
    async fn dropped_slot_reports_cancellation() {
        let (tx, rx) = oneshot::channel();
        drop(ResultSlot::new(JobId(2), tx));
        let err = rx.await.unwrap().unwrap_err();
        assert_eq!(err.kind, ErrorKind::Cancelled);
    }

    #[tokio::test]
    async fn delivering_to_a_gone_submitter_is_quiet() {
        let (tx, rx) = oneshot::channel();
        drop(rx);
        ResultSlot::new(JobId(3), tx).deliver(Ok(vec![]));
    }
}
