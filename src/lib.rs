//! # bahador
//!
//! Relays remote HTTP files into a chat-platform upload sink.
//!
//! ## Design
//!
//! - **Bounded** - a fixed worker set pulls from a bounded queue, so
//!   submitters feel backpressure instead of the process growing without limit
//! - **Two paths** - small files stream straight through memory, large ones
//!   are spooled to disk, split into parts and uploaded concurrently
//! - **Cancellable** - every job can be cancelled by id at any point, and
//!   shutdown cancels whatever outlives its grace period
//! - **Leak-free** - pipes, spool directories and archiver processes are
//!   released on every exit path
//!
//! ## Quick Start
//!
//! ```no_run
//! use bahador::{Config, JobRequest, RelayPool, TelegramSink, splitter};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let mut config = Config::default();
//!     config.telegram.token = "123:abc".to_string();
//!     config.telegram.storage_chat_id = -1001234;
//!
//!     let sink = Arc::new(TelegramSink::new(&config.telegram, reqwest::Client::new())?);
//!     let pool = RelayPool::new(config.clone(), sink, splitter::from_config(&config.tools))?;
//!     pool.start();
//!
//!     // Subscribe to events
//!     let mut events = pool.subscribe();
//!     tokio::spawn(async move {
//!         while let Ok(event) = events.recv().await {
//!             println!("Event: {:?}", event);
//!         }
//!     });
//!
//!     let handle = pool
//!         .submit(JobRequest::new(pool.next_job_id(), "https://example.com/big.iso"))
//!         .await?;
//!     println!("{:?}", handle.wait().await);
//!
//!     pool.shutdown().await?;
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::unwrap_used)]
#![warn(clippy::expect_used)]

/// Authorization seam
pub mod auth;
/// Configuration types
pub mod config;
/// SQLite user store
pub mod db;
/// Worker pool, submission and shutdown
pub mod dispatcher;
/// Error types
pub mod error;
/// Remote metadata and body requests
pub mod fetcher;
/// Bounded in-memory byte pipe
pub mod pipe;
/// Job cancellation registry
pub mod registry;
/// Streaming and spooling relay paths
pub mod relay;
/// Chat status message reporting
pub mod reporter;
/// Upload sinks
pub mod sink;
/// Archive splitters
pub mod splitter;
/// Core types and events
pub mod types;
/// Utility functions
pub mod utils;

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod test_helpers;

// Re-export commonly used types
pub use auth::{AllowList, Authorizer};
pub use config::Config;
pub use db::Database;
pub use dispatcher::{JobHandle, JobRequest, RelayPool};
pub use error::{DatabaseError, Error, ErrorKind, JobError, Result};
pub use fetcher::RemoteFetcher;
pub use reporter::StatusReporter;
pub use sink::{ByteStream, ChatRef, MessageRef, TelegramSink, UploadSink};
pub use splitter::{RawSplitter, SevenZipSplitter, Splitter};
pub use types::{
    ArchivePart, Event, EventCallback, JobId, JobResult, PartSize, RemoteFileInfo, Route,
    SizeUnit,
};

/// Run the pool until a termination signal arrives, then shut it down.
///
/// - **Unix:** SIGTERM or SIGINT; if one handler cannot be registered the
///   other is still honoured.
/// - **Windows/other:** Ctrl+C via `tokio::signal::ctrl_c()`.
///
/// # Example
///
/// ```no_run
/// use bahador::{Config, RelayPool, TelegramSink, run_with_shutdown, splitter};
/// use std::sync::Arc;
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let config = Config::default();
///     let sink = Arc::new(TelegramSink::new(&config.telegram, reqwest::Client::new())?);
///     let pool = RelayPool::new(config.clone(), sink, splitter::from_config(&config.tools))?;
///     pool.start();
///
///     run_with_shutdown(pool).await?;
///     Ok(())
/// }
/// ```
pub async fn run_with_shutdown(pool: RelayPool) -> Result<()> {
    wait_for_signal().await;
    pool.shutdown().await
}

#[cfg(unix)]
async fn wait_for_signal() {
    use tokio::signal::unix::{Signal, SignalKind, signal};

    // registration can fail in restricted environments (containers, tests)
    fn register(kind: SignalKind, name: &str) -> Option<Signal> {
        signal(kind)
            .inspect_err(|e| tracing::warn!(error = %e, signal = name, "could not register signal handler"))
            .ok()
    }

    async fn recv(signal: Option<Signal>) {
        match signal {
            Some(mut signal) => {
                signal.recv().await;
            }
            None => std::future::pending::<()>().await,
        }
    }

    let sigterm = register(SignalKind::terminate(), "SIGTERM");
    let sigint = register(SignalKind::interrupt(), "SIGINT");

    if sigterm.is_none() && sigint.is_none() {
        tracing::error!("Could not register any signal handlers, using ctrl_c fallback");
        tokio::signal::ctrl_c().await.ok();
        return;
    }

    tokio::select! {
        _ = recv(sigterm) => tracing::info!("Received SIGTERM signal"),
        _ = recv(sigint) => tracing::info!("Received SIGINT signal (Ctrl+C)"),
    }
}

#[cfg(not(unix))]
async fn wait_for_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for Ctrl+C signal");
        return;
    }
    tracing::info!("Received Ctrl+C signal");
}
