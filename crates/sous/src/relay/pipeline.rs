//! Relay pipeline: connector → reassembler → decoder → accumulator → framer
//!
//! One spawned task per request produces frames into a bounded channel; the
//! HTTP response body consumes it. A full channel stalls upstream reads, and
//! a dropped receiver (client gone) stops the read loop and drops the
//! upstream connection.
//!
//! The [`Finalizer`] owns the only sender. Its terminal methods consume it,
//! so after the completion or error frame nothing else can be written and
//! the client stream closes.

use std::convert::Infallible;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use futures::{FutureExt, StreamExt};
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tracing::{Instrument, debug, info, info_span, warn};
use uuid::Uuid;

use super::decoder::decode_line;
use super::error::RelayError;
use super::event::RelayEvent;
use super::reassembler::reassemble;
use super::request::ChatRequest;
use super::state::RelayState;
use super::upstream::UpstreamConnector;
use crate::config::RelayConfig;

/// Client-facing stream of encoded frames
pub type FrameStream = ReceiverStream<Result<Bytes, Infallible>>;

/// How a relay ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RelayOutcome {
    /// Completion frame delivered
    Completed { tokens: u64 },
    /// Error frame delivered
    Failed { message: String },
    /// Client went away; no terminal frame could be delivered
    Disconnected,
}

/// Sending half of the frame channel
#[derive(Debug)]
pub struct FrameSink {
    tx: mpsc::Sender<Result<Bytes, Infallible>>,
}

impl FrameSink {
    /// Create a bounded sink and the stream that drains it
    pub fn channel(capacity: usize) -> (Self, FrameStream) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (Self { tx }, ReceiverStream::new(rx))
    }

    /// Frame and send one event, waiting for channel capacity
    async fn send(&self, event: &RelayEvent) -> Result<(), RelayError> {
        self.tx
            .send(Ok(event.to_frame()))
            .await
            .map_err(|_| RelayError::ClientDisconnected)
    }

    /// Resolves once the client side has been dropped
    async fn closed(&self) {
        self.tx.closed().await
    }
}

/// Guarantees exactly one terminal frame per relay
#[derive(Debug)]
pub struct Finalizer {
    sink: FrameSink,
}

impl Finalizer {
    pub fn new(sink: FrameSink) -> Self {
        Self { sink }
    }

    /// Sink for non-terminal frames while streaming
    pub fn sink(&self) -> &FrameSink {
        &self.sink
    }

    /// Emit the completion frame and close the stream
    pub async fn complete(self, state: RelayState) -> RelayOutcome {
        let tokens = state.token_count();
        match self.sink.send(&state.into_completion()).await {
            Ok(()) => RelayOutcome::Completed { tokens },
            Err(_) => RelayOutcome::Disconnected,
        }
    }

    /// Emit the error frame and close the stream
    pub async fn fail(self, error: &RelayError) -> RelayOutcome {
        let message = error.to_string();
        let event = RelayEvent::Error {
            message: message.clone(),
        };
        match self.sink.send(&event).await {
            Ok(()) => RelayOutcome::Failed { message },
            Err(_) => RelayOutcome::Disconnected,
        }
    }

    /// Close the stream without a frame; the client is already gone
    pub fn abandon(self) -> RelayOutcome {
        RelayOutcome::Disconnected
    }
}

/// Start a relay in the background and return the client-facing stream
pub fn spawn_relay(
    connector: Arc<dyn UpstreamConnector>,
    request: ChatRequest,
    config: &RelayConfig,
) -> FrameStream {
    let (sink, frames) = FrameSink::channel(config.channel_capacity);
    let max_duration = config.max_duration();
    let span = info_span!("relay", request_id = %Uuid::new_v4());

    tokio::spawn(
        async move {
            run_relay(connector.as_ref(), &request, sink, max_duration).await;
        }
        .instrument(span),
    );

    frames
}

/// Run one relay to completion, writing frames into `sink`
pub async fn run_relay(
    connector: &dyn UpstreamConnector,
    request: &ChatRequest,
    sink: FrameSink,
    max_duration: Option<Duration>,
) -> RelayOutcome {
    info!("Relay started ({} messages)", request.messages.len());

    let finalizer = Finalizer::new(sink);
    let mut state = RelayState::new();

    let result = {
        let pipeline = AssertUnwindSafe(drive(connector, request, &mut state, finalizer.sink()))
            .catch_unwind();

        let caught = match max_duration {
            Some(limit) => match tokio::time::timeout(limit, pipeline).await {
                Ok(caught) => caught,
                Err(_) => Ok(Err(RelayError::TimedOut(limit))),
            },
            None => pipeline.await,
        };

        caught.unwrap_or(Err(RelayError::Panicked))
    };

    let outcome = match result {
        Ok(()) => finalizer.complete(state).await,
        Err(RelayError::ClientDisconnected) => finalizer.abandon(),
        Err(e) => {
            warn!(
                error_type = e.category(),
                error_message = %e,
                "Relay failed"
            );
            finalizer.fail(&e).await
        }
    };

    match &outcome {
        RelayOutcome::Completed { tokens } => info!("Relay completed ({tokens} tokens)"),
        RelayOutcome::Failed { .. } => info!("Relay ended with error frame"),
        RelayOutcome::Disconnected => debug!("Client disconnected, relay abandoned"),
    }

    outcome
}

/// Stream upstream deltas into `state`, sending progress frames as they fall due
async fn drive(
    connector: &dyn UpstreamConnector,
    request: &ChatRequest,
    state: &mut RelayState,
    sink: &FrameSink,
) -> Result<(), RelayError> {
    let source = tokio::select! {
        connected = connector.connect(request) => connected?,
        _ = sink.closed() => return Err(RelayError::ClientDisconnected),
    };

    let mut lines = Box::pin(reassemble(source));

    loop {
        let next = tokio::select! {
            next = lines.next() => next,
            _ = sink.closed() => return Err(RelayError::ClientDisconnected),
        };

        let Some(line) = next else {
            return Ok(());
        };

        let Some(delta) = decode_line(&line?) else {
            continue;
        };

        if let Some(progress) = state.ingest(&delta) {
            sink.send(&progress).await?;
        }
    }
}
