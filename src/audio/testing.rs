//! In-memory stand-ins for the voice connection and the text display.

use async_trait::async_trait;
use parking_lot::Mutex;
use serenity::model::id::{ChannelId, MessageId};
use std::{
    collections::HashSet,
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
    },
    time::Duration,
};

use super::output::{EndReason, TrackEndSignal, VoiceOutput};
use crate::{
    error::{PlaybackError, ResolutionError},
    sources::{Track, TrackResolver},
    ui::{DisplayMessage, PlaybackDisplay},
};

pub fn track(name: &str) -> Track {
    Track::new(uri(name), name).with_duration(Duration::from_secs(200))
}

pub fn uri(name: &str) -> String {
    format!("https://cdn.example/{name}")
}

/// Resolves every query to a track titled after it.
pub struct EchoResolver;

#[async_trait]
impl TrackResolver for EchoResolver {
    async fn resolve(&self, query: &str) -> Result<Track, ResolutionError> {
        Ok(track(query))
    }
}

#[derive(Default)]
struct FakeVoiceState {
    connected: bool,
    current: Option<(String, TrackEndSignal)>,
    started: Vec<String>,
    failing: HashSet<String>,
    stops: usize,
}

/// Voice output that records what it was asked to play.
///
/// Tracks never end on their own; tests call [`FakeVoice::finish`] or
/// [`FakeVoice::crash`].
pub struct FakeVoice {
    state: Mutex<FakeVoiceState>,
}

impl FakeVoice {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            state: Mutex::new(FakeVoiceState {
                connected: true,
                ..Default::default()
            }),
        })
    }

    /// Makes `play` fail for this track name.
    pub fn fail_on(&self, name: &str) {
        self.state.lock().failing.insert(uri(name));
    }

    pub fn started(&self) -> Vec<String> {
        self.state.lock().started.clone()
    }

    pub fn current(&self) -> Option<String> {
        self.state.lock().current.as_ref().map(|(uri, _)| uri.clone())
    }

    pub fn stops(&self) -> usize {
        self.state.lock().stops
    }

    pub fn disconnect(&self) {
        self.state.lock().connected = false;
    }

    fn take_current(&self) -> Option<TrackEndSignal> {
        self.state.lock().current.take().map(|(_, signal)| signal)
    }

    /// Drops the current track without any end signal, so the player reads
    /// as idle while the guild still thinks it is playing.
    pub fn go_quiet(&self) {
        self.state.lock().current = None;
    }

    /// Ends the current track normally.
    pub fn finish(&self) {
        if let Some(signal) = self.take_current() {
            signal.notify(EndReason::Finished);
        }
    }

    /// Ends the current track and reports the same end twice.
    pub fn finish_twice(&self) {
        if let Some(signal) = self.take_current() {
            signal.notify(EndReason::Finished);
            signal.notify(EndReason::Failed("late error".into()));
        }
    }

    /// Kills the current track mid-stream.
    pub fn crash(&self, reason: &str) {
        if let Some(signal) = self.take_current() {
            signal.notify(EndReason::Failed(reason.into()));
        }
    }
}

#[async_trait]
impl VoiceOutput for FakeVoice {
    async fn play(&self, uri: &str, on_end: TrackEndSignal) -> Result<(), PlaybackError> {
        let mut state = self.state.lock();
        if state.failing.contains(uri) {
            return Err(PlaybackError::Start(format!("cannot open {uri}")));
        }

        state.started.push(uri.to_string());
        state.current = Some((uri.to_string(), on_end));
        Ok(())
    }

    async fn stop(&self) {
        let signal = {
            let mut state = self.state.lock();
            state.stops += 1;
            state.current.take()
        };
        if let Some((_, signal)) = signal {
            signal.notify(EndReason::Finished);
        }
    }

    async fn is_playing(&self) -> bool {
        self.state.lock().current.is_some()
    }

    async fn is_connected(&self) -> bool {
        self.state.lock().connected
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Shown {
    NowPlaying(String),
    Progress(String, String),
    Queued(String, usize),
    Error(String),
    Retired(MessageId),
}

/// Display that keeps everything it was asked to show.
#[derive(Default)]
pub struct RecordingDisplay {
    shown: Mutex<Vec<Shown>>,
    next_id: AtomicU64,
    post_delay: Duration,
}

impl RecordingDisplay {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Takes `delay` to post each now-playing message.
    pub fn slow(delay: Duration) -> Arc<Self> {
        Arc::new(Self {
            post_delay: delay,
            ..Self::default()
        })
    }

    pub fn shown(&self) -> Vec<Shown> {
        self.shown.lock().clone()
    }

    pub fn errors(&self) -> Vec<String> {
        self.shown()
            .into_iter()
            .filter_map(|s| match s {
                Shown::Error(message) => Some(message),
                _ => None,
            })
            .collect()
    }

    pub fn progress_updates(&self) -> usize {
        self.shown()
            .iter()
            .filter(|s| matches!(s, Shown::Progress(..)))
            .count()
    }
}

#[async_trait]
impl PlaybackDisplay for RecordingDisplay {
    async fn post_now_playing(
        &self,
        channel: ChannelId,
        track: &Track,
        _progress: &str,
    ) -> anyhow::Result<DisplayMessage> {
        if !self.post_delay.is_zero() {
            tokio::time::sleep(self.post_delay).await;
        }
        self.shown.lock().push(Shown::NowPlaying(track.title().to_string()));
        let id = self.next_id.fetch_add(1, Ordering::SeqCst) + 1;
        Ok(DisplayMessage {
            channel_id: channel,
            message_id: MessageId::new(id),
        })
    }

    async fn update_progress(
        &self,
        _message: DisplayMessage,
        track: &Track,
        progress: &str,
    ) -> anyhow::Result<()> {
        self.shown.lock().push(Shown::Progress(
            track.title().to_string(),
            progress.to_string(),
        ));
        Ok(())
    }

    async fn post_queued(
        &self,
        _channel: ChannelId,
        track: &Track,
        position: usize,
    ) -> anyhow::Result<()> {
        self.shown
            .lock()
            .push(Shown::Queued(track.title().to_string(), position));
        Ok(())
    }

    async fn post_error(&self, _channel: ChannelId, message: &str) -> anyhow::Result<()> {
        self.shown.lock().push(Shown::Error(message.to_string()));
        Ok(())
    }

    async fn retire(&self, message: DisplayMessage) -> anyhow::Result<()> {
        self.shown.lock().push(Shown::Retired(message.message_id));
        Ok(())
    }
}

/// Polls `check` until it holds or two seconds pass.
pub async fn eventually<F>(what: &str, check: F)
where
    F: Fn() -> bool,
{
    for _ in 0..400 {
        if check() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    panic!("timed out waiting for {what}");
}
