use std::time::Instant;

use super::event::RelayEvent;

/// A progress event is emitted every this many deltas
pub const PROGRESS_EVERY: u64 = 5;

/// Length of the progress preview, in characters
pub const PREVIEW_CHARS: usize = 100;

/// Per-request accumulator
///
/// Owned by a single relay; dropped when the relay terminates.
#[derive(Debug)]
pub struct RelayState {
    full_text: String,
    token_count: u64,
    started_at: Instant,
}

impl Default for RelayState {
    fn default() -> Self {
        Self::new()
    }
}

impl RelayState {
    pub fn new() -> Self {
        Self::started_at(Instant::now())
    }

    pub fn started_at(started_at: Instant) -> Self {
        Self {
            full_text: String::new(),
            token_count: 0,
            started_at,
        }
    }

    /// Record one delta. Returns a progress event when the token count
    /// reaches a multiple of [`PROGRESS_EVERY`]. Empty deltas are ignored.
    pub fn ingest(&mut self, delta: &str) -> Option<RelayEvent> {
        if delta.is_empty() {
            return None;
        }

        self.full_text.push_str(delta);
        self.token_count += 1;

        (self.token_count % PROGRESS_EVERY == 0).then(|| RelayEvent::Progress {
            tokens: self.token_count,
            elapsed_secs: self.elapsed_secs(),
            preview: self.preview(),
        })
    }

    pub fn full_text(&self) -> &str {
        &self.full_text
    }

    pub fn token_count(&self) -> u64 {
        self.token_count
    }

    /// Whole seconds since the relay started
    pub fn elapsed_secs(&self) -> u64 {
        self.started_at.elapsed().as_secs()
    }

    /// First [`PREVIEW_CHARS`] characters of the accumulated text
    pub fn preview(&self) -> String {
        self.full_text.chars().take(PREVIEW_CHARS).collect()
    }

    /// Consume the state into the terminal completion event
    pub fn into_completion(self) -> RelayEvent {
        RelayEvent::Completion {
            full_text: self.full_text,
        }
    }
}
