//! Progress reporting into a chat message.
//!
//! A [`StatusReporter`] posts one status message when a job is accepted and
//! keeps editing it: every status line the relay emits replaces the text,
//! and the final result (links or an error message) replaces it one last
//! time. Edits are applied by a single background task in the order they
//! were produced, so a slow edit never reorders later ones and never blocks
//! the relay.

use crate::error::Result;
use crate::sink::{ChatRef, MessageRef, UploadSink};
use crate::types::{EventCallback, JobId, JobResult};
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};

/// Command prefix users send to cancel a job (`/cancel<id>`)
pub const CANCEL_COMMAND: &str = "/cancel";

enum Update {
    Status(String),
    Final(String, oneshot::Sender<()>),
}

/// Edits a single chat message as a job progresses
pub struct StatusReporter {
    job_id: JobId,
    updates: mpsc::UnboundedSender<Update>,
}

impl StatusReporter {
    /// Post the initial status message for `job_id` in `chat`
    ///
    /// # Errors
    ///
    /// Returns the sink's error if the message could not be sent.
    pub async fn start(sink: Arc<dyn UploadSink>, chat: ChatRef, job_id: JobId) -> Result<Self> {
        let suffix = format!("\n{CANCEL_COMMAND}{job_id}");
        let message = sink
            .send_text(chat, &format!("Processing URL...{suffix}"))
            .await?;

        let (updates, rx) = mpsc::unbounded_channel();
        tokio::spawn(apply_updates(sink, chat, message, suffix, job_id, rx));

        Ok(Self { job_id, updates })
    }

    /// Callback to pass as the job's status line handler
    pub fn events(&self) -> EventCallback {
        let updates = self.updates.clone();
        let job_id = self.job_id;
        Arc::new(move |line: &str| {
            tracing::info!(job_id = %job_id, status = line, "job status");
            // receiver is gone once the final result was written
            updates.send(Update::Status(line.to_string())).ok();
        })
    }

    /// Replace the status message with the job's outcome
    ///
    /// On success the text is every identifier rendered through
    /// [`UploadSink::link`], separated by blank lines; on failure it is the
    /// error's user-facing message. Waits until the edit was attempted.
    pub async fn finish(self, sink: &dyn UploadSink, result: &JobResult) {
        let text = match result {
            Ok(ids) => ids
                .iter()
                .map(|id| sink.link(id))
                .collect::<Vec<_>>()
                .join("\n\n"),
            Err(e) => {
                tracing::error!(job_id = %self.job_id, error = %e, "job failed");
                e.user_message().to_string()
            }
        };

        let (done_tx, done_rx) = oneshot::channel();
        if self.updates.send(Update::Final(text, done_tx)).is_ok() {
            done_rx.await.ok();
        }
    }
}

async fn apply_updates(
    sink: Arc<dyn UploadSink>,
    chat: ChatRef,
    message: MessageRef,
    suffix: String,
    job_id: JobId,
    mut rx: mpsc::UnboundedReceiver<Update>,
) {
    while let Some(update) = rx.recv().await {
        match update {
            Update::Status(line) => {
                if let Err(e) = sink.edit_text(chat, message, &format!("{line}{suffix}")).await {
                    tracing::warn!(job_id = %job_id, error = %e, "failed to update status message");
                }
            }
            Update::Final(text, done) => {
                if let Err(e) = sink.edit_text(chat, message, &text).await {
                    tracing::warn!(job_id = %job_id, error = %e, "failed to write job result");
                }
                done.send(()).ok();
                break;
            }
        }
    }
}

/// Parse a `/cancel<id>` command
///
/// # Examples
///
/// ```
/// use bahador::reporter::parse_cancel_command;
/// use bahador::JobId;
///
/// assert_eq!(parse_cancel_command("/cancel42"), Some(JobId(42)));
/// assert_eq!(parse_cancel_command("/cancel"), None);
/// assert_eq!(parse_cancel_command("hello"), None);
/// ```
pub fn parse_cancel_command(text: &str) -> Option<JobId> {
    text.trim().strip_prefix(CANCEL_COMMAND)?.parse().ok()
}
