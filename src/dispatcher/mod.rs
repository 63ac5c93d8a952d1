//! Relay pool: bounded job queue, fixed worker set, per-job cancellation
//!
//! This module is decomposed into focused submodules:
//! - [`submit`] — job requests, result delivery and job handles
//! - [`worker`] — worker loop and per-job execution
//! - [`lifecycle`] — start and graceful shutdown

mod lifecycle;
pub mod submit;
mod worker;

pub use submit::{JobHandle, JobRequest};

use crate::auth::Authorizer;
use crate::config::Config;
use crate::error::{Error, Result};
use crate::fetcher::RemoteFetcher;
use crate::registry::CancellationRegistry;
use crate::relay::Relay;
use crate::sink::UploadSink;
use crate::splitter::Splitter;
use crate::types::{Event, JobId};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use submit::QueuedJob;
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Shared pool state (grouped for clarity)
pub(crate) struct PoolState {
    /// Producer side of the job queue; `None` once shutdown closed it
    pub(crate) queue_tx: std::sync::Mutex<Option<mpsc::Sender<QueuedJob>>>,
    /// Consumer side shared by all workers
    pub(crate) queue_rx: Arc<tokio::sync::Mutex<mpsc::Receiver<QueuedJob>>>,
    /// Flag to indicate whether new jobs are accepted (false during shutdown)
    pub(crate) accepting_new: AtomicBool,
    /// Worker tasks spawned by `start`
    pub(crate) workers: std::sync::Mutex<Vec<JoinHandle<()>>>,
    /// Parent of every job token; cancelled when shutdown gives up waiting
    pub(crate) root_token: CancellationToken,
}

/// Worker pool that relays remote files into an upload sink
///
/// Cloning is cheap; all clones drive the same pool.
///
/// # Examples
///
/// ```no_run
/// use bahador::{Config, JobRequest, RelayPool, TelegramSink, splitter};
/// use std::sync::Arc;
///
/// # #[tokio::main]
/// # async fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let config = Config::default();
/// let sink = Arc::new(TelegramSink::new(&config.telegram, reqwest::Client::new())?);
/// let splitter = splitter::from_config(&config.tools);
///
/// let pool = RelayPool::new(config, sink, splitter)?;
/// pool.start();
///
/// let handle = pool
///     .submit(JobRequest::new(pool.next_job_id(), "https://example.com/file.iso"))
///     .await?;
/// match handle.wait().await {
///     Ok(ids) => println!("uploaded as {ids:?}"),
///     Err(e) => eprintln!("{}", e.user_message()),
/// }
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct RelayPool {
    pub(crate) config: Arc<Config>,
    pub(crate) relay: Relay,
    pub(crate) registry: Arc<CancellationRegistry>,
    pub(crate) event_tx: broadcast::Sender<Event>,
    pub(crate) state: Arc<PoolState>,
}

impl RelayPool {
    /// Create a pool with a default HTTP client
    ///
    /// Workers are not running until [`start`](Self::start) is called.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if the configuration fails validation.
    pub fn new(config: Config, sink: Arc<dyn UploadSink>, splitter: Arc<dyn Splitter>) -> Result<Self> {
        Self::with_fetcher(config, RemoteFetcher::default(), sink, splitter)
    }

    /// Create a pool with a caller-supplied fetcher (custom client, proxy, TLS)
    pub fn with_fetcher(
        config: Config,
        fetcher: RemoteFetcher,
        sink: Arc<dyn UploadSink>,
        splitter: Arc<dyn Splitter>,
    ) -> Result<Self> {
        config.validate()?;
        let config = Arc::new(config);

        let (queue_tx, queue_rx) = mpsc::channel(config.workers.queue_capacity());
        // room for bursts of per-part events from several jobs
        let (event_tx, _rx) = broadcast::channel(1000);

        tracing::info!(
            workers = config.workers.worker_count,
            queue_capacity = config.workers.queue_capacity(),
            part_threshold = config.relay.part_threshold,
            sink = sink.name(),
            splitter = splitter.name(),
            "relay pool created"
        );

        Ok(Self {
            relay: Relay::new(config.clone(), fetcher, sink, splitter),
            config,
            registry: Arc::new(CancellationRegistry::new()),
            event_tx,
            state: Arc::new(PoolState {
                queue_tx: std::sync::Mutex::new(Some(queue_tx)),
                queue_rx: Arc::new(tokio::sync::Mutex::new(queue_rx)),
                accepting_new: AtomicBool::new(true),
                workers: std::sync::Mutex::new(Vec::new()),
                root_token: CancellationToken::new(),
            }),
        })
    }

    /// Active configuration
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Allocate an id for the next [`JobRequest`]
    pub fn next_job_id(&self) -> JobId {
        self.registry.next_id()
    }

    /// Subscribe to pool events
    ///
    /// Each subscriber receives every event emitted after it subscribed.
    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.event_tx.subscribe()
    }

    /// Cancel a queued or running job
    ///
    /// Returns `false` if the job is not live (already finished or unknown).
    pub fn cancel(&self, id: JobId) -> bool {
        self.registry.cancel(id)
    }

    /// Number of jobs queued or running
    pub fn live_jobs(&self) -> usize {
        self.registry.len()
    }

    /// Whether new submissions are accepted
    pub fn is_accepting(&self) -> bool {
        self.state.accepting_new.load(Ordering::SeqCst)
    }

    /// Submit a job on behalf of `user_id` after checking it is authorized
    ///
    /// # Errors
    ///
    /// Returns [`Error::Unauthorized`] if the authorizer says no, or any
    /// error [`submit`](Self::submit) returns.
    pub async fn submit_as(
        &self,
        authorizer: &dyn Authorizer,
        user_id: i64,
        request: JobRequest,
    ) -> Result<JobHandle> {
        if !authorizer.authenticate(user_id).await? {
            tracing::warn!(user_id, url = %request.url, "unauthorized submission rejected");
            return Err(Error::Unauthorized(user_id));
        }
        self.submit(request).await
    }

    pub(crate) fn emit(&self, event: Event) {
        self.event_tx.send(event).ok();
    }
}
