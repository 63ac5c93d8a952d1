//! Streaming path: HTTP body piped into the sink without touching disk

use super::{JobContext, Relay};
use crate::error::{Error, Result};
use crate::pipe::{PipeWriter, pipe};
use crate::types::RemoteFileInfo;
use std::io;
use tokio::sync::mpsc;
use tokio::task::JoinSet;

/// How the copy-in task ended
enum CopyError {
    /// The source misbehaved: short/long body, read error
    Source(Error),
    /// The read side went away; the upload task holds the real cause
    PipeClosed { copied: u64, error: io::Error },
}

/// Completion report from one of the two relay tasks
enum Outcome {
    Download(std::result::Result<u64, CopyError>),
    Upload(Result<String>),
}

impl Relay {
    /// Relay a file of at most `part_threshold` bytes straight into the sink
    ///
    /// Download and upload run as two tasks joined by a bounded [`pipe`].
    /// The relay waits for both to report; the first real failure wins.
    pub async fn stream(&self, ctx: &JobContext, url: &str, info: &RemoteFileInfo) -> Result<Vec<String>> {
        ctx.status(&format!("Relaying file {}", info.name));

        let limit = self.config.timeouts.streaming;
        let identifier = ctx
            .phase("streaming relay", limit, self.stream_inner(url, info))
            .await?;

        if identifier.trim().is_empty() {
            return Err(Error::PartUpload {
                index: 0,
                reason: "sink returned an empty identifier".to_string(),
            });
        }

        tracing::info!(job_id = %ctx.id, name = %info.name, "streamed file uploaded");
        Ok(vec![identifier])
    }

    async fn stream_inner(&self, url: &str, info: &RemoteFileInfo) -> Result<String> {
        let response = self.fetcher.fetch_body(url).await?;
        let expected = info.size;

        let (writer, reader) = pipe(self.config.relay.pipe_capacity);
        let closer = reader.closer();
        let (done_tx, mut done_rx) = mpsc::channel::<Outcome>(2);

        // dropping the set aborts whichever task is still running
        let mut tasks = JoinSet::new();

        let tx = done_tx.clone();
        tasks.spawn(async move {
            let outcome = copy_in(response, &writer, expected).await;
            let failure = match &outcome {
                Ok(_) => None,
                Err(CopyError::Source(e)) => Some(io::Error::other(e.to_string())),
                Err(CopyError::PipeClosed { .. }) => None,
            };
            // report before closing so the root cause is seen first
            tx.send(Outcome::Download(outcome)).await.ok();
            match failure {
                Some(error) => writer.close_with_error(error).await,
                None => writer.close(),
            }
        });

        let tx = done_tx;
        let sink = self.sink.clone();
        let name = info.name.clone();
        tasks.spawn(async move {
            let result = sink.upload(&name, Box::pin(reader), expected).await;
            let failure = result.as_ref().err().map(ToString::to_string);
            tx.send(Outcome::Upload(result)).await.ok();
            if let Some(message) = failure {
                closer.close_with_error(message);
            }
        });

        let mut first_error: Option<Error> = None;
        let mut downloaded: Option<std::result::Result<u64, CopyError>> = None;
        let mut identifier: Option<String> = None;

        // both tasks must report; one clean finish is not success
        for _ in 0..2 {
            let Some(outcome) = done_rx.recv().await else {
                break;
            };
            match outcome {
                Outcome::Download(Err(CopyError::Source(e))) => {
                    first_error.get_or_insert(e);
                }
                Outcome::Download(other) => downloaded = Some(other),
                Outcome::Upload(Ok(id)) => identifier = Some(id),
                Outcome::Upload(Err(e)) => {
                    first_error.get_or_insert(as_upload_error(e));
                }
            }
        }

        if let Some(error) = first_error {
            return Err(error);
        }

        match (downloaded, identifier) {
            (Some(Ok(_)), Some(id)) => Ok(id),
            (Some(Err(CopyError::PipeClosed { copied, error })), Some(_)) => {
                // sink finished without reading everything
                tracing::warn!(copied, expected, error = %error, "sink stopped reading early");
                Err(Error::IncompleteTransfer {
                    expected,
                    actual: copied,
                })
            }
            _ => Err(Error::Other(
                "relay task ended without reporting a result".to_string(),
            )),
        }
    }
}

/// Anything the sink reports that is not cancellation is an upload failure
fn as_upload_error(error: Error) -> Error {
    match error {
        e @ (Error::PartUpload { .. } | Error::Cancelled | Error::DeadlineExceeded { .. }) => e,
        other => Error::PartUpload {
            index: 0,
            reason: other.to_string(),
        },
    }
}

/// Copy the response body into the pipe, enforcing the declared size
async fn copy_in(
    mut response: reqwest::Response,
    writer: &PipeWriter,
    expected: u64,
) -> std::result::Result<u64, CopyError> {
    let mut copied = 0u64;

    while let Some(chunk) = response
        .chunk()
        .await
        .map_err(|e| CopyError::Source(Error::Network(e)))?
    {
        let next = copied + chunk.len() as u64;
        if next > expected {
            return Err(CopyError::Source(Error::IncompleteTransfer {
                expected,
                actual: next,
            }));
        }
        writer
            .write(chunk)
            .await
            .map_err(|error| CopyError::PipeClosed { copied, error })?;
        copied = next;
    }

    if copied != expected {
        return Err(CopyError::Source(Error::IncompleteTransfer {
            expected,
            actual: copied,
        }));
    }
    Ok(copied)
}
