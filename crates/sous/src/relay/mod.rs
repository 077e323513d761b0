//! Chat streaming relay
//!
//! Turns one inbound chat request into one outgoing event stream:
//! upstream connector, line reassembly, delta decoding, accumulation with
//! periodic progress, framing, and exactly-once termination.

mod decoder;
mod error;
mod event;
mod pipeline;
mod reassembler;
mod request;
mod state;
mod upstream;

pub use decoder::{DATA_PREFIX, DONE_SENTINEL, decode_line};
pub use error::{RelayError, UpstreamError};
pub use event::RelayEvent;
pub use pipeline::{Finalizer, FrameSink, FrameStream, RelayOutcome, run_relay, spawn_relay};
pub use reassembler::{LineBuffer, MAX_LINE_BYTES, reassemble};
pub use request::{ChatRequest, Message, Role};
pub use state::{PREVIEW_CHARS, PROGRESS_EVERY, RelayState};
pub use upstream::{ByteSource, OpenAiConnector, UpstreamConnector};
