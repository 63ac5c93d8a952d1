//! Bounded in-memory byte pipe with error propagation in both directions.
//!
//! The writer half blocks once `capacity` chunks are buffered, so a slow
//! consumer throttles the producer and memory stays bounded regardless of
//! stream length. Either half can close the pipe with an error:
//!
//! - [`PipeWriter::close_with_error`] makes the reader yield that error after
//!   draining what was already buffered.
//! - [`PipeCloser::close_with_error`] (or dropping the [`PipeReader`]) makes the
//!   writer's pending and future writes fail with that error.
//!
//! The first close reason wins; later ones are ignored.

use bytes::Bytes;
use futures::Stream;
use std::io;
use std::pin::Pin;
use std::sync::{Arc, OnceLock};
use std::task::{Context, Poll};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

#[derive(Debug, Clone)]
struct CloseReason {
    kind: io::ErrorKind,
    message: Arc<str>,
}

impl CloseReason {
    fn to_io_error(&self) -> io::Error {
        io::Error::new(self.kind, self.message.to_string())
    }
}

/// State shared by both halves; records why the read side went away
#[derive(Debug, Default)]
struct Shared {
    reader_closed: CancellationToken,
    reason: OnceLock<CloseReason>,
}

impl Shared {
    fn close_read_side(&self, kind: io::ErrorKind, message: &str) {
        let _ = self.reason.set(CloseReason {
            kind,
            message: Arc::from(message),
        });
        self.reader_closed.cancel();
    }

    fn read_side_error(&self) -> io::Error {
        self.reason
            .get()
            .map(CloseReason::to_io_error)
            .unwrap_or_else(|| io::Error::new(io::ErrorKind::BrokenPipe, "pipe reader closed"))
    }
}

/// Create a pipe buffering at most `capacity` chunks
pub fn pipe(capacity: usize) -> (PipeWriter, PipeReader) {
    let (tx, rx) = mpsc::channel(capacity.max(1));
    let shared = Arc::new(Shared::default());
    (
        PipeWriter {
            tx,
            shared: shared.clone(),
        },
        PipeReader { rx, shared },
    )
}

/// Producer half of a [`pipe`]
#[derive(Debug)]
pub struct PipeWriter {
    tx: mpsc::Sender<io::Result<Bytes>>,
    shared: Arc<Shared>,
}

impl PipeWriter {
    /// Write one chunk, waiting for buffer space
    ///
    /// Fails with the reader's close reason once the read side is gone.
    pub async fn write(&self, chunk: Bytes) -> io::Result<()> {
        if self.shared.reader_closed.is_cancelled() {
            return Err(self.shared.read_side_error());
        }
        tokio::select! {
            biased;
            _ = self.shared.reader_closed.cancelled() => Err(self.shared.read_side_error()),
            sent = self.tx.send(Ok(chunk)) => {
                sent.map_err(|_| self.shared.read_side_error())
            }
        }
    }

    /// Close the pipe so the reader sees `error` after the buffered chunks
    pub async fn close_with_error(self, error: io::Error) {
        tokio::select! {
            biased;
            _ = self.shared.reader_closed.cancelled() => {}
            _ = self.tx.send(Err(error)) => {}
        }
    }

    /// Close the pipe cleanly; the reader sees end-of-stream
    pub fn close(self) {
        drop(self);
    }
}

/// Consumer half of a [`pipe`], usable as a byte [`Stream`]
#[derive(Debug)]
pub struct PipeReader {
    rx: mpsc::Receiver<io::Result<Bytes>>,
    shared: Arc<Shared>,
}

impl PipeReader {
    /// Handle that can close the read side after the reader itself has been
    /// handed to a consumer
    pub fn closer(&self) -> PipeCloser {
        PipeCloser {
            shared: self.shared.clone(),
        }
    }
}

impl Stream for PipeReader {
    type Item = io::Result<Bytes>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.rx.poll_recv(cx)
    }
}

impl Drop for PipeReader {
    fn drop(&mut self) {
        self.shared
            .close_read_side(io::ErrorKind::BrokenPipe, "pipe reader closed");
        self.rx.close();
    }
}

/// Closes the read side of a pipe from outside the reader
#[derive(Debug, Clone)]
pub struct PipeCloser {
    shared: Arc<Shared>,
}

impl PipeCloser {
    /// Fail the writer's pending and future writes with `message`
    pub fn close_with_error(&self, message: impl AsRef<str>) {
        self.shared
            .close_read_side(io::ErrorKind::BrokenPipe, message.as_ref());
    }

    /// Whether the read side has been closed
    pub fn is_closed(&self) -> bool {
        self.shared.reader_closed.is_cancelled()
    }
}
