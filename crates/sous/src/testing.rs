//! Test utilities for sous - scripted upstream connectors
//!
//! `ScriptedConnector` stands in for the model provider so relay tests run
//! without network access:
//! - fixed byte chunks, optionally followed by a read error or a stall
//! - a handshake failure with a given status
//! - a flag recording when the upstream source was dropped

use std::pin::Pin;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::task::{Context, Poll};

use async_trait::async_trait;
use bytes::Bytes;
use futures::stream::{self, Stream, StreamExt};

use crate::relay::{ByteSource, ChatRequest, UpstreamConnector, UpstreamError};

/// One OpenAI-style streaming line carrying `content`, with its blank line
pub fn content_line(content: &str) -> String {
    let chunk = serde_json::json!({
        "id": "chatcmpl-test",
        "object": "chat.completion.chunk",
        "choices": [{"index": 0, "delta": {"content": content}, "finish_reason": null}]
    });
    format!("data: {chunk}\n\n")
}

/// Concatenate `content_line`s for each delta and close with `[DONE]`
pub fn provider_stream(deltas: &[&str]) -> String {
    let mut body: String = deltas.iter().map(|d| content_line(d)).collect();
    body.push_str("data: [DONE]\n\n");
    body
}

#[derive(Debug, Clone)]
enum Handshake {
    Stream {
        chunks: Vec<Bytes>,
        error: Option<String>,
        never_ending: bool,
    },
    Status {
        status: u16,
        body: String,
    },
}

/// Sets the shared flag when dropped along with the byte source
struct ReleaseGuard(Arc<AtomicBool>);

impl Drop for ReleaseGuard {
    fn drop(&mut self) {
        self.0.store(true, Ordering::SeqCst);
    }
}

/// Byte source that flips the release flag when dropped
struct GuardedSource {
    inner: ByteSource,
    _guard: ReleaseGuard,
}

impl Stream for GuardedSource {
    type Item = Result<Bytes, UpstreamError>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.inner.poll_next_unpin(cx)
    }
}

/// Upstream connector that replays a fixed script
#[derive(Debug, Clone)]
pub struct ScriptedConnector {
    handshake: Handshake,
    released: Arc<AtomicBool>,
}

impl ScriptedConnector {
    fn with(handshake: Handshake) -> Self {
        Self {
            handshake,
            released: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Successful handshake delivering `chunks` exactly as given
    pub fn chunks<C: Into<Bytes>>(chunks: Vec<C>) -> Self {
        Self::with(Handshake::Stream {
            chunks: chunks.into_iter().map(Into::into).collect(),
            error: None,
            never_ending: false,
        })
    }

    /// Deliver `chunks`, then fail the read with `message`
    pub fn chunks_then_error<C: Into<Bytes>>(chunks: Vec<C>, message: &str) -> Self {
        Self::with(Handshake::Stream {
            chunks: chunks.into_iter().map(Into::into).collect(),
            error: Some(message.to_string()),
            never_ending: false,
        })
    }

    /// Split `body` into pieces of at most `size` bytes
    pub fn split_every(body: &[u8], size: usize) -> Self {
        Self::chunks(
            body.chunks(size.max(1))
                .map(Bytes::copy_from_slice)
                .collect::<Vec<_>>(),
        )
    }

    /// Failed handshake with the given status and body
    pub fn status(status: u16, body: &str) -> Self {
        Self::with(Handshake::Status {
            status,
            body: body.to_string(),
        })
    }

    /// Keep the source open forever after the scripted chunks
    pub fn never_ending(mut self) -> Self {
        if let Handshake::Stream { never_ending, .. } = &mut self.handshake {
            *never_ending = true;
        }
        self
    }

    /// Whether the most recent byte source has been dropped
    pub fn released(&self) -> bool {
        self.released.load(Ordering::SeqCst)
    }

    /// Shared handle to the release flag, for use after the connector is moved
    pub fn release_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.released)
    }
}

#[async_trait]
impl UpstreamConnector for ScriptedConnector {
    async fn connect(&self, _request: &ChatRequest) -> Result<ByteSource, UpstreamError> {
        let (chunks, error, never_ending) = match &self.handshake {
            Handshake::Status { status, body } => {
                return Err(UpstreamError::Status {
                    status: *status,
                    body: body.clone(),
                });
            }
            Handshake::Stream {
                chunks,
                error,
                never_ending,
            } => (chunks.clone(), error.clone(), *never_ending),
        };

        self.released.store(false, Ordering::SeqCst);
        let guard = ReleaseGuard(Arc::clone(&self.released));

        let items = chunks
            .into_iter()
            .map(Ok)
            .chain(error.map(|message| Err(UpstreamError::Read(message))));
        let tail: ByteSource = if never_ending {
            stream::pending().boxed()
        } else {
            stream::empty().boxed()
        };

        Ok(GuardedSource {
            inner: stream::iter(items).chain(tail).boxed(),
            _guard: guard,
        }
        .boxed())
    }
}
