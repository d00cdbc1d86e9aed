use serenity::model::id::ChannelId;
use std::{
    sync::Arc,
    time::{Duration, Instant},
};
use tokio_util::sync::CancellationToken;

use super::{output::VoiceOutput, queue::GuildQueue};
use crate::{sources::Track, ui::DisplayMessage};

/// Where a guild's player is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaybackPhase {
    /// Nothing streaming. The voice channel may or may not be joined.
    Idle,
    /// A track is streaming.
    Playing,
    /// Between the end of one track and the start of the next.
    Transitioning,
}

/// The track currently streaming.
#[derive(Debug, Clone)]
pub struct NowPlaying {
    pub track: Track,
    pub started_at: Instant,
    /// Identifies this particular start; end signals must carry it.
    pub token: u64,
    pub skip_requested: bool,
}

impl NowPlaying {
    pub fn new(track: Track, token: u64) -> Self {
        Self {
            track,
            started_at: Instant::now(),
            token,
            skip_requested: false,
        }
    }

    pub fn elapsed(&self) -> Duration {
        self.started_at.elapsed()
    }
}

/// The running progress loop and the message it edits.
#[derive(Debug)]
pub struct ProgressHandle {
    pub message: DisplayMessage,
    pub token: u64,
    cancel: CancellationToken,
}

impl ProgressHandle {
    pub(crate) fn new(message: DisplayMessage, token: u64, cancel: CancellationToken) -> Self {
        Self {
            message,
            token,
            cancel,
        }
    }

    /// Asks the loop to end; it notices at its next tick.
    pub fn stop(&self) {
        self.cancel.cancel();
    }
}

/// Everything the bot knows about one guild's playback.
///
/// Only reachable through a [`GuildGuard`](super::registry::GuildGuard), so
/// the queue and the now-playing slot always change together.
pub struct GuildPlaybackState {
    pub queue: GuildQueue,
    pub now_playing: Option<NowPlaying>,
    pub progress: Option<ProgressHandle>,
    /// Set while waiting out the settle delay after a track ended.
    pub settling: bool,
    pub voice: Option<Arc<dyn VoiceOutput>>,
    /// Text channel for status messages; follows the latest command.
    pub announce_channel: Option<ChannelId>,
    /// Last now-playing message, replaced when the next track starts.
    pub last_announcement: Option<DisplayMessage>,
}

impl GuildPlaybackState {
    pub fn new(max_queue_size: usize) -> Self {
        Self {
            queue: GuildQueue::new(max_queue_size),
            now_playing: None,
            progress: None,
            settling: false,
            voice: None,
            announce_channel: None,
            last_announcement: None,
        }
    }

    pub fn phase(&self) -> PlaybackPhase {
        match &self.now_playing {
            Some(current) if current.skip_requested => PlaybackPhase::Transitioning,
            Some(_) => PlaybackPhase::Playing,
            None if self.settling => PlaybackPhase::Transitioning,
            None => PlaybackPhase::Idle,
        }
    }

    pub fn stop_progress(&mut self) {
        if let Some(progress) = self.progress.take() {
            progress.stop();
        }
    }

    /// Clears the now-playing slot if `token` still owns it.
    ///
    /// Returns `None` for signals about a track that is no longer current.
    pub fn finish_current(&mut self, token: u64) -> Option<NowPlaying> {
        if self.now_playing.as_ref().map(|n| n.token) != Some(token) {
            return None;
        }

        self.stop_progress();
        self.now_playing.take()
    }

    /// Forgets everything; used when the voice connection goes away.
    ///
    /// Returns the voice output that was attached so the caller can stop it
    /// after releasing the guard.
    pub fn reset(&mut self) -> Option<Arc<dyn VoiceOutput>> {
        self.stop_progress();
        self.queue.clear();
        self.now_playing = None;
        self.settling = false;
        self.announce_channel = None;
        self.last_announcement = None;
        self.voice.take()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serenity::model::id::MessageId;

    fn track(name: &str) -> Track {
        Track::new(format!("https://cdn.example/{name}"), name)
    }

    #[test]
    fn phase_follows_slots() {
        let mut state = GuildPlaybackState::new(10);
        assert_eq!(state.phase(), PlaybackPhase::Idle);

        state.now_playing = Some(NowPlaying::new(track("A"), 1));
        assert_eq!(state.phase(), PlaybackPhase::Playing);

        state.now_playing.as_mut().unwrap().skip_requested = true;
        assert_eq!(state.phase(), PlaybackPhase::Transitioning);

        state.now_playing = None;
        state.settling = true;
        assert_eq!(state.phase(), PlaybackPhase::Transitioning);
    }

    #[test]
    fn stale_tokens_do_not_finish_the_current_track() {
        let mut state = GuildPlaybackState::new(10);
        state.now_playing = Some(NowPlaying::new(track("A"), 7));

        assert!(state.finish_current(6).is_none());
        assert!(state.now_playing.is_some());

        let ended = state.finish_current(7).unwrap();
        assert_eq!(ended.track.title(), "A");
        assert!(state.now_playing.is_none());
        assert!(state.finish_current(7).is_none());
    }

    #[test]
    fn finishing_stops_progress() {
        let mut state = GuildPlaybackState::new(10);
        let cancel = CancellationToken::new();
        state.now_playing = Some(NowPlaying::new(track("A"), 1));
        state.progress = Some(ProgressHandle::new(
            DisplayMessage {
                channel_id: ChannelId::new(1),
                message_id: MessageId::new(2),
            },
            1,
            cancel.clone(),
        ));

        state.finish_current(1);
        assert!(state.progress.is_none());
        assert!(cancel.is_cancelled());
    }

    #[test]
    fn reset_empties_everything() {
        let mut state = GuildPlaybackState::new(10);
        state.queue.enqueue(track("B")).unwrap();
        state.now_playing = Some(NowPlaying::new(track("A"), 1));
        state.settling = true;
        state.announce_channel = Some(ChannelId::new(3));

        assert!(state.reset().is_none());
        assert!(state.queue.is_empty());
        assert!(state.now_playing.is_none());
        assert_eq!(state.phase(), PlaybackPhase::Idle);
        assert_eq!(state.announce_channel, None);
    }
}
