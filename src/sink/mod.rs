//! Upload sink abstraction
//!
//! The relays only ever talk to the outside world through [`UploadSink`]: it
//! accepts a named byte stream and hands back an opaque identifier, and it
//! exposes two text hooks that front-ends use for progress messages.
//!
//! - [`TelegramSink`]: Telegram Bot API (documents go to a storage chat)

mod telegram;

pub use telegram::TelegramSink;

use async_trait::async_trait;
use bytes::Bytes;
use futures::Stream;
use std::pin::Pin;

/// Body handed to [`UploadSink::upload`]
///
/// `Sync` is required so the stream can be used directly as an HTTP request body.
pub type ByteStream = Pin<Box<dyn Stream<Item = std::io::Result<Bytes>> + Send + Sync>>;

/// Chat (conversation) a text message is sent to
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ChatRef(pub i64);

/// Message previously returned by [`UploadSink::send_text`]
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct MessageRef(pub i64);

/// Destination for relayed content
///
/// Implementations must be safe to call concurrently: the spooling relay
/// uploads every part of a file at the same time.
#[async_trait]
pub trait UploadSink: Send + Sync {
    /// Upload `body` under `name` and return the sink's identifier for it
    ///
    /// `size_hint` is the exact number of bytes the stream will yield unless
    /// the stream ends with an error. An empty identifier is treated as a
    /// failed upload by the caller.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails, the body stream yields an error,
    /// or the sink rejects the upload.
    async fn upload(&self, name: &str, body: ByteStream, size_hint: u64) -> crate::Result<String>;

    /// Post a text message, returning a reference that can be edited later
    async fn send_text(&self, chat: ChatRef, text: &str) -> crate::Result<MessageRef>;

    /// Replace the text of an earlier message
    async fn edit_text(&self, chat: ChatRef, message: MessageRef, text: &str) -> crate::Result<()>;

    /// User-facing link for an identifier returned by [`upload`](Self::upload)
    fn link(&self, identifier: &str) -> String {
        identifier.to_string()
    }

    /// Human-readable name for logging
    fn name(&self) -> &'static str;
}
