//! Reassembles logical lines from an arbitrarily chunked byte stream
//!
//! Lines are split on the `\n` byte before any UTF-8 decoding, so a
//! multi-byte character straddling two chunks is rebuilt intact. Bytes after
//! the last separator stay buffered until the next chunk arrives.

use bytes::{Bytes, BytesMut};
use futures::stream::{self, Stream, StreamExt};
use tracing::debug;

use super::error::UpstreamError;

const LINE_SEPARATOR: u8 = b'\n';

/// Longest unterminated line accepted before the stream is treated as broken
pub const MAX_LINE_BYTES: usize = 1024 * 1024;

/// Pending bytes not yet terminated by a line separator
#[derive(Debug)]
pub struct LineBuffer {
    pending: BytesMut,
    /// Prefix of `pending` already known to contain no separator
    scanned: usize,
    /// Bytes after the last separator in `pending`
    unterminated: usize,
    max_line: usize,
}

impl Default for LineBuffer {
    fn default() -> Self {
        Self::with_max_line(MAX_LINE_BYTES)
    }
}

impl LineBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_max_line(max_line: usize) -> Self {
        Self {
            pending: BytesMut::new(),
            scanned: 0,
            unterminated: 0,
            max_line,
        }
    }

    /// Append a chunk to the buffer
    ///
    /// Fails without buffering the chunk if it would leave more than the
    /// line limit waiting for a separator.
    pub fn push(&mut self, chunk: &[u8]) -> Result<(), UpstreamError> {
        let unterminated = match chunk.iter().rposition(|b| *b == LINE_SEPARATOR) {
            Some(pos) => chunk.len() - pos - 1,
            None => self.unterminated + chunk.len(),
        };
        if unterminated > self.max_line {
            return Err(UpstreamError::Read(format!(
                "line exceeds {} bytes without a separator",
                self.max_line
            )));
        }

        self.pending.extend_from_slice(chunk);
        self.unterminated = unterminated;
        Ok(())
    }

    /// Take the next complete line, without its separator (and without a
    /// trailing `\r`). Returns `None` when no complete line is buffered.
    pub fn next_line(&mut self) -> Option<Bytes> {
        let Some(offset) = self.pending[self.scanned..]
            .iter()
            .position(|b| *b == LINE_SEPARATOR)
        else {
            self.scanned = self.pending.len();
            return None;
        };

        let end = self.scanned + offset;
        let mut line = self.pending.split_to(end + 1);
        self.scanned = 0;

        line.truncate(end);
        if line.last() == Some(&b'\r') {
            line.truncate(end - 1);
        }
        Some(line.freeze())
    }

    /// Number of buffered bytes awaiting a separator
    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    /// End of input: drop the unterminated remainder, returning its length
    pub fn finish(self) -> usize {
        self.pending.len()
    }
}

/// Adapt a byte-chunk stream into a lazy stream of complete lines
///
/// A source error or an overlong line is forwarded as an error and ends the
/// stream; an unterminated tail at end of input is discarded.
pub fn reassemble<S>(source: S) -> impl Stream<Item = Result<Bytes, UpstreamError>> + Send
where
    S: Stream<Item = Result<Bytes, UpstreamError>> + Send + Unpin,
{
    stream::unfold(
        Some((source, LineBuffer::new())),
        |state| async move {
            let (mut source, mut buffer) = state?;
            loop {
                if let Some(line) = buffer.next_line() {
                    return Some((Ok(line), Some((source, buffer))));
                }

                match source.next().await {
                    Some(Ok(chunk)) => {
                        if let Err(e) = buffer.push(&chunk) {
                            return Some((Err(e), None));
                        }
                    }
                    Some(Err(e)) => return Some((Err(e), None)),
                    None => {
                        let discarded = buffer.finish();
                        if discarded > 0 {
                            debug!("Discarding {discarded} unterminated trailing bytes");
                        }
                        return None;
                    }
                }
            }
        },
    )
}
