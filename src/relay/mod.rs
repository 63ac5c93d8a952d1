//! Relay execution: moving one remote file into the upload sink
//!
//! A [`Relay`] bundles everything a job needs (fetcher, sink, splitter and
//! the active configuration) and offers the two paths a job can take:
//!
//! - [`Relay::stream`]: body piped straight into the sink, nothing on disk
//! - [`Relay::spool`]: body written to a job directory, split, parts uploaded
//!   concurrently
//!
//! Every await that can block on the network, a pipe, or a child process
//! runs under [`run_phase`], which ends it with [`Error::Cancelled`] once
//! the job token fires or [`Error::DeadlineExceeded`] once the phase limit
//! passes.

mod spooling;
mod streaming;

pub use spooling::SpoolDir;

use crate::config::Config;
use crate::error::{Error, Result};
use crate::fetcher::RemoteFetcher;
use crate::sink::UploadSink;
use crate::splitter::Splitter;
use crate::types::{Event, EventCallback, JobId, RemoteFileInfo, Route};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;

/// Run `fut` until it finishes, `token` is cancelled, or `limit` elapses
///
/// Cancellation is checked first, so an already-cancelled token never
/// starts the phase.
pub async fn run_phase<F, T>(
    token: &CancellationToken,
    phase: &'static str,
    limit: Duration,
    fut: F,
) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    tokio::select! {
        biased;
        _ = token.cancelled() => Err(Error::Cancelled),
        outcome = tokio::time::timeout(limit, fut) => match outcome {
            Ok(result) => result,
            Err(_) => Err(Error::DeadlineExceeded { phase }),
        },
    }
}

/// Per-job state shared by both relay paths
#[derive(Clone)]
pub struct JobContext {
    /// Job being relayed
    pub id: JobId,
    /// Fires when the job is cancelled or the pool shuts down
    pub token: CancellationToken,
    events: EventCallback,
    event_tx: broadcast::Sender<Event>,
}

impl JobContext {
    /// Build a context for `id`
    pub fn new(
        id: JobId,
        token: CancellationToken,
        events: EventCallback,
        event_tx: broadcast::Sender<Event>,
    ) -> Self {
        Self {
            id,
            token,
            events,
            event_tx,
        }
    }

    /// Report a human-readable status line to the submitter
    pub fn status(&self, line: &str) {
        (self.events)(line);
    }

    /// Broadcast a pool event; nobody listening is fine
    pub fn emit(&self, event: Event) {
        self.event_tx.send(event).ok();
    }

    /// [`run_phase`] bound to this job's token
    pub async fn phase<F, T>(&self, phase: &'static str, limit: Duration, fut: F) -> Result<T>
    where
        F: Future<Output = Result<T>>,
    {
        run_phase(&self.token, phase, limit, fut).await
    }
}

/// Collaborators a job needs to move bytes
#[derive(Clone)]
pub struct Relay {
    config: Arc<Config>,
    fetcher: RemoteFetcher,
    sink: Arc<dyn UploadSink>,
    splitter: Arc<dyn Splitter>,
}

impl Relay {
    /// Create a relay
    pub fn new(
        config: Arc<Config>,
        fetcher: RemoteFetcher,
        sink: Arc<dyn UploadSink>,
        splitter: Arc<dyn Splitter>,
    ) -> Self {
        Self {
            config,
            fetcher,
            sink,
            splitter,
        }
    }

    /// Active configuration
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Resolve metadata, check it, and relay along the matching route
    ///
    /// This is the whole life of a job once a worker owns it.
    pub async fn run(&self, ctx: &JobContext, url: &str) -> Result<Vec<String>> {
        let info = ctx
            .phase(
                "metadata fetch",
                self.config.timeouts.metadata,
                self.fetcher.get_metadata(url),
            )
            .await?;

        let route = self.check(&info)?;
        tracing::info!(job_id = %ctx.id, name = %info.name, size = info.size, %route, "routing job");
        ctx.emit(Event::MetadataResolved {
            id: ctx.id,
            name: info.name.clone(),
            size: info.size,
            route,
        });

        match route {
            Route::Streaming => self.stream(ctx, url, &info).await,
            Route::Spooling => self.spool(ctx, url, &info).await,
        }
    }

    /// Reject unusable metadata and pick the route
    pub fn check(&self, info: &RemoteFileInfo) -> Result<Route> {
        if info.name.is_empty() {
            return Err(Error::EmptyFileName);
        }
        let max = self.config.relay.max_file_size;
        if info.size > max {
            return Err(Error::MaxFileSizeExceeded {
                size: info.size,
                max,
            });
        }
        Ok(Route::for_size(info.size, self.config.relay.part_threshold))
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests;
