//! Error types for the playback core.
//!
//! The command layer works with [`anyhow::Result`]; everything below it
//! (resolver, queue, sequencer) reports one of these typed errors so the
//! caller can decide what the user sees.

use std::time::Duration;
use thiserror::Error;

/// Failure to turn a query into a playable [`Track`](crate::sources::Track).
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ResolutionError {
    /// The search ran but produced no results.
    #[error("no results found for `{0}`")]
    NotFound(String),

    /// The external resolver failed, crashed or timed out.
    #[error("resolver failed: {0}")]
    Upstream(String),

    /// The resolver answered but a required field was missing.
    #[error("resolver returned an unusable result: {0}")]
    Malformed(String),
}

/// Failure of the audio stream itself.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum PlaybackError {
    /// The stream could not be opened.
    #[error("could not start stream: {0}")]
    Start(String),

    /// The stream died while playing.
    #[error("stream failed while playing: {0}")]
    Runtime(String),
}

/// A request that does not fit the guild's current state.
///
/// These are soft errors: they are shown to the user and never end
/// command processing.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StateConflict {
    #[error("nothing is playing right now")]
    NothingPlaying,

    #[error("already connected to a voice channel in this server")]
    AlreadyConnected,

    #[error("not connected to a voice channel, use /join first")]
    NotConnected,

    #[error("the queue is full (max {0} tracks)")]
    QueueFull(usize),

    #[error("this server's player is busy, gave up after {0:?}")]
    GuildBusy(Duration),
}

/// Umbrella error returned by sequencer operations.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum MusicError {
    #[error(transparent)]
    Resolution(#[from] ResolutionError),

    #[error(transparent)]
    Playback(#[from] PlaybackError),

    #[error(transparent)]
    Conflict(#[from] StateConflict),
}

pub type MusicResult<T> = Result<T, MusicError>;
