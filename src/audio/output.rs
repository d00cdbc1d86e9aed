//! Boundary between the sequencer and whatever actually produces sound.

use async_trait::async_trait;
use tokio::sync::mpsc;
use tracing::debug;

use super::sequencer::SequencerEvent;
use crate::error::PlaybackError;

/// How a track stopped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EndReason {
    /// Reached the end, or was stopped on purpose (skip, leave).
    Finished,
    /// The stream died while playing.
    Failed(String),
}

/// One-shot notification handed to [`VoiceOutput::play`].
///
/// Firing it posts an event to the guild's sequencer worker instead of
/// calling back into shared state from the driver's thread. Every start
/// gets a fresh token, so late or duplicate signals for an old track are
/// recognised and dropped.
#[derive(Debug, Clone)]
pub struct TrackEndSignal {
    token: u64,
    events: mpsc::UnboundedSender<SequencerEvent>,
}

impl TrackEndSignal {
    pub(crate) fn new(token: u64, events: mpsc::UnboundedSender<SequencerEvent>) -> Self {
        Self { token, events }
    }

    pub fn token(&self) -> u64 {
        self.token
    }

    pub fn notify(&self, reason: EndReason) {
        let event = SequencerEvent::TrackEnded {
            token: self.token,
            reason,
        };
        if self.events.send(event).is_err() {
            debug!("Track end for token {} arrived after guild state was torn down", self.token);
        }
    }
}

/// Playback control for one guild's voice connection.
#[async_trait]
pub trait VoiceOutput: Send + Sync {
    /// Starts streaming `uri`, replacing anything already playing.
    ///
    /// Returns once the stream is confirmed playable. `on_end` must be fired
    /// exactly when the stream stops for any reason after a successful start.
    async fn play(&self, uri: &str, on_end: TrackEndSignal) -> Result<(), PlaybackError>;

    /// Stops the active stream; its end signal still fires.
    async fn stop(&self);

    async fn is_playing(&self) -> bool;

    async fn is_connected(&self) -> bool;
}
