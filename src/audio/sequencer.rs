use serenity::model::id::{ChannelId, GuildId};
use std::{
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
    },
    time::{Duration, Instant},
};
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use super::{
    output::{EndReason, TrackEndSignal, VoiceOutput},
    progress::{render_progress_bar, ProgressJob, ProgressReporter, ProgressSettings},
    registry::{GuildCell, GuildGuard, GuildRegistry, GuildSlot},
    state::{GuildPlaybackState, NowPlaying, PlaybackPhase},
};
use crate::{
    config::Config,
    error::{MusicResult, PlaybackError, StateConflict},
    sources::{Track, TrackResolver},
    ui::{DisplayMessage, PlaybackDisplay},
};

#[derive(Debug, Clone)]
pub struct SequencerSettings {
    /// Pause between a track ending and the next one starting.
    pub settle_delay: Duration,
    pub lock_timeout: Duration,
    pub max_queue_size: usize,
    pub progress: ProgressSettings,
}

impl From<&Config> for SequencerSettings {
    fn from(config: &Config) -> Self {
        Self {
            settle_delay: config.settle_delay,
            lock_timeout: config.lock_timeout,
            max_queue_size: config.max_queue_size,
            progress: ProgressSettings::from(config),
        }
    }
}

/// Messages consumed by a guild's worker task.
#[derive(Debug)]
pub enum SequencerEvent {
    TrackEnded { token: u64, reason: EndReason },
    Shutdown,
}

/// What happened to a `/play` request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlayOutcome {
    Started(Track),
    Enqueued { track: Track, position: usize },
    /// Nothing was playing and the requested track could not be opened.
    StartFailed(Track),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NowPlayingInfo {
    pub track: Track,
    pub elapsed: Duration,
}

/// Point-in-time view of a guild for `/queue` and `/nowplaying`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueueSnapshot {
    pub now_playing: Option<NowPlayingInfo>,
    pub pending: Vec<Track>,
    pub phase: PlaybackPhase,
}

impl QueueSnapshot {
    pub fn empty() -> Self {
        Self {
            now_playing: None,
            pending: Vec::new(),
            phase: PlaybackPhase::Idle,
        }
    }

    pub fn pending_duration(&self) -> Duration {
        self.pending.iter().map(Track::duration).sum()
    }
}

/// Channel output gathered while holding a guild, sent once it is released.
#[derive(Default)]
struct Notices {
    channel: Option<ChannelId>,
    retired: Option<DisplayMessage>,
    failures: Vec<String>,
    now_playing: Option<(Track, u64, Instant)>,
}

struct Inner {
    registry: GuildRegistry,
    resolver: Arc<dyn TrackResolver>,
    display: Arc<dyn PlaybackDisplay>,
    progress: ProgressReporter,
    settings: SequencerSettings,
    next_token: AtomicU64,
}

/// Per-guild playback state machine.
///
/// Every guild moves through `Idle -> Playing -> Transitioning -> Idle`.
/// Commands and end-of-track events all mutate the guild through its
/// [`GuildGuard`], so popping the queue head and recording it as now playing
/// can never interleave with another request.
///
/// End-of-track notifications do not touch state directly. They are posted
/// to a worker task owned by the guild, which applies the settle delay and
/// advances the queue. Each start gets a fresh token, and events carrying a
/// token that is no longer current are dropped.
#[derive(Clone)]
pub struct PlaybackSequencer {
    inner: Arc<Inner>,
}

impl PlaybackSequencer {
    pub fn new(
        settings: SequencerSettings,
        resolver: Arc<dyn TrackResolver>,
        display: Arc<dyn PlaybackDisplay>,
    ) -> Self {
        let progress = ProgressReporter::new(display.clone(), settings.progress.clone());
        Self {
            inner: Arc::new(Inner {
                registry: GuildRegistry::new(),
                resolver,
                display,
                progress,
                settings,
                next_token: AtomicU64::new(1),
            }),
        }
    }

    /// Guilds that currently have playback state.
    pub fn active_guilds(&self) -> usize {
        self.inner.registry.len()
    }

    fn slot(&self, guild_id: GuildId) -> GuildSlot {
        self.inner.registry.get_or_create(guild_id, || {
            let (events, receiver) = mpsc::unbounded_channel();
            let slot = GuildSlot {
                cell: GuildCell::new(
                    guild_id,
                    GuildPlaybackState::new(self.inner.settings.max_queue_size),
                ),
                events,
            };

            tokio::spawn(self.clone().run_worker(slot.clone(), receiver));
            debug!("🆕 Created playback state for guild {}", guild_id);
            slot
        })
    }

    async fn lock(&self, slot: &GuildSlot) -> Result<GuildGuard, StateConflict> {
        slot.cell.lock(self.inner.settings.lock_timeout).await
    }

    #[cfg(test)]
    pub(crate) fn cell(&self, guild_id: GuildId) -> Option<GuildCell> {
        self.inner.registry.get(guild_id).map(|slot| slot.cell)
    }

    /// Hands the guild a voice connection and the channel to report in.
    pub async fn attach_voice(
        &self,
        guild_id: GuildId,
        voice: Arc<dyn VoiceOutput>,
        channel: ChannelId,
    ) -> MusicResult<()> {
        let slot = self.slot(guild_id);
        let mut guard = self.lock(&slot).await?;

        if let Some(existing) = &guard.voice {
            if existing.is_connected().await {
                return Err(StateConflict::AlreadyConnected.into());
            }
        }

        guard.voice = Some(voice);
        guard.announce_channel = Some(channel);
        info!("🔊 Voice attached for guild {}", guild_id);

        Ok(())
    }

    pub async fn is_connected(&self, guild_id: GuildId) -> bool {
        let Some(slot) = self.inner.registry.get(guild_id) else {
            return false;
        };

        let voice = match self.lock(&slot).await {
            Ok(guard) => guard.voice.clone(),
            Err(_) => return false,
        };

        match voice {
            Some(voice) => voice.is_connected().await,
            None => false,
        }
    }

    /// Resolves `query` and either starts it or appends it to the queue.
    ///
    /// Resolution runs without holding the guild, so a slow lookup never
    /// blocks skips or other requests.
    pub async fn request_play(
        &self,
        guild_id: GuildId,
        channel: ChannelId,
        query: &str,
    ) -> MusicResult<PlayOutcome> {
        let slot = self.slot(guild_id);
        if self.lock(&slot).await?.voice.is_none() {
            return Err(StateConflict::NotConnected.into());
        }

        let lookup = Instant::now();
        let track = self.inner.resolver.resolve(query).await?;
        debug!(
            "🔍 Resolved `{}` to {} in {:?}",
            query,
            track.title(),
            lookup.elapsed()
        );

        let mut guard = self.lock(&slot).await?;
        // The bot may have left while the lookup was running.
        if guard.voice.is_none() {
            return Err(StateConflict::NotConnected.into());
        }
        guard.announce_channel = Some(channel);

        let position = guard.queue.enqueue(track.clone())?;
        if guard.now_playing.is_some() || guard.settling {
            drop(guard);
            self.announce_queued(channel, &track, position).await;
            return Ok(PlayOutcome::Enqueued { track, position });
        }

        let mut notices = Notices::default();
        let started = self.advance(&slot, &mut guard, &mut notices).await;
        let outcome = match started {
            // The queue was drained up to and including this request.
            Some(started) if guard.queue.is_empty() => PlayOutcome::Started(started),
            Some(_) => PlayOutcome::Enqueued {
                position: guard.queue.len(),
                track,
            },
            None => PlayOutcome::StartFailed(track),
        };
        drop(guard);

        self.publish(&slot, notices).await;
        if let PlayOutcome::Enqueued { track, position } = &outcome {
            self.announce_queued(channel, track, *position).await;
        }

        Ok(outcome)
    }

    /// Stops the current track; the queue moves on through the normal
    /// end-of-track path.
    pub async fn request_skip(&self, guild_id: GuildId) -> Result<Track, StateConflict> {
        let slot = self
            .inner
            .registry
            .get(guild_id)
            .ok_or(StateConflict::NothingPlaying)?;
        let mut guard = self.lock(&slot).await?;

        let voice = guard.voice.clone().ok_or(StateConflict::NothingPlaying)?;
        let current = match guard.now_playing.as_mut() {
            Some(current) if !current.skip_requested => current,
            _ => return Err(StateConflict::NothingPlaying),
        };
        current.skip_requested = true;
        let skipped = current.track.clone();

        // Still holding the guard: the stop must hit this track, not a
        // successor started by a concurrent end event.
        voice.stop().await;
        info!("⏭️ Skip requested in guild {}: {}", guild_id, skipped.title());

        Ok(skipped)
    }

    pub async fn list_queue(&self, guild_id: GuildId) -> MusicResult<QueueSnapshot> {
        let Some(slot) = self.inner.registry.get(guild_id) else {
            return Ok(QueueSnapshot::empty());
        };
        let guard = self.lock(&slot).await?;

        Ok(QueueSnapshot {
            now_playing: guard.now_playing.as_ref().map(|current| NowPlayingInfo {
                track: current.track.clone(),
                elapsed: current.elapsed(),
            }),
            pending: guard.queue.peek_all(),
            phase: guard.phase(),
        })
    }

    /// Empties the pending queue. The current track keeps playing.
    pub async fn clear_queue(&self, guild_id: GuildId) -> MusicResult<usize> {
        let Some(slot) = self.inner.registry.get(guild_id) else {
            return Ok(0);
        };
        let mut guard = self.lock(&slot).await?;

        Ok(guard.queue.clear())
    }

    pub async fn phase(&self, guild_id: GuildId) -> MusicResult<PlaybackPhase> {
        let Some(slot) = self.inner.registry.get(guild_id) else {
            return Ok(PlaybackPhase::Idle);
        };
        let guard = self.lock(&slot).await?;

        Ok(guard.phase())
    }

    /// Stops playback and forgets the guild. Returns how many queued tracks
    /// were dropped.
    pub async fn teardown(&self, guild_id: GuildId) -> usize {
        let Some(slot) = self.inner.registry.remove(guild_id) else {
            return 0;
        };

        let (voice, dropped) = match self.lock(&slot).await {
            Ok(mut guard) => {
                let dropped = guard.queue.len();
                (guard.reset(), dropped)
            }
            Err(e) => {
                error!("💥 Could not reset guild {} on teardown: {}", guild_id, e);
                (None, 0)
            }
        };

        if let Some(voice) = voice {
            voice.stop().await;
        }
        if slot.events.send(SequencerEvent::Shutdown).is_err() {
            debug!("Worker for guild {} already stopped", guild_id);
        }

        info!(
            "👋 Playback for guild {} torn down, {} queued tracks dropped",
            guild_id, dropped
        );
        dropped
    }

    /// Starts the next playable track if nothing is playing.
    ///
    /// Tracks that fail to open are discarded; the loop keeps going until one
    /// starts or the queue is empty. What the channel should see is left in
    /// `notices` for [`Self::publish`].
    async fn advance(
        &self,
        slot: &GuildSlot,
        state: &mut GuildPlaybackState,
        notices: &mut Notices,
    ) -> Option<Track> {
        if state.now_playing.is_some() {
            return None;
        }
        state.settling = false;

        let guild_id = slot.cell.guild_id();
        let Some(voice) = state.voice.clone() else {
            debug!("🔇 Guild {} has no voice connection, not advancing", guild_id);
            return None;
        };
        notices.channel = state.announce_channel;

        while let Some(track) = state.queue.dequeue_next() {
            let token = self.inner.next_token.fetch_add(1, Ordering::Relaxed);
            state.now_playing = Some(NowPlaying::new(track.clone(), token));

            let signal = TrackEndSignal::new(token, slot.events.clone());
            match voice.play(track.stream_uri(), signal).await {
                Ok(()) => {
                    let started_at = Instant::now();
                    if let Some(current) = state.now_playing.as_mut() {
                        current.started_at = started_at;
                    }

                    info!("🎵 Now playing in guild {}: {}", guild_id, track.title());
                    state.stop_progress();
                    notices.retired = state.last_announcement.take();
                    notices.now_playing = Some((track.clone(), token, started_at));
                    return Some(track);
                }
                Err(e) => {
                    state.now_playing = None;
                    warn!(
                        "❌ Could not start {} in guild {}: {}",
                        track.title(),
                        guild_id,
                        e
                    );
                    notices
                        .failures
                        .push(format!("Could not play **{}**: {}", track.title(), e));
                }
            }
        }

        debug!("📭 Queue drained for guild {}", guild_id);
        None
    }

    async fn run_worker(self, slot: GuildSlot, mut events: mpsc::UnboundedReceiver<SequencerEvent>) {
        let guild_id = slot.cell.guild_id();
        debug!("🧵 Sequencer worker started for guild {}", guild_id);

        while let Some(event) = events.recv().await {
            match event {
                SequencerEvent::TrackEnded { token, reason } => {
                    self.on_track_ended(&slot, token, reason).await
                }
                SequencerEvent::Shutdown => break,
            }
        }

        debug!("🧵 Sequencer worker stopped for guild {}", guild_id);
    }

    async fn on_track_ended(&self, slot: &GuildSlot, token: u64, reason: EndReason) {
        let guild_id = slot.cell.guild_id();

        let (ended, channel) = {
            let mut guard = match self.lock(slot).await {
                Ok(guard) => guard,
                Err(e) => {
                    error!("💥 Dropped track end for guild {}: {}", guild_id, e);
                    return;
                }
            };

            let Some(ended) = guard.finish_current(token) else {
                debug!(
                    "Ignoring end signal for token {} in guild {}, no longer current",
                    token, guild_id
                );
                return;
            };
            guard.settling = true;
            (ended, guard.announce_channel)
        };

        match reason {
            EndReason::Finished if ended.skip_requested => {
                info!("⏭️ Skipped in guild {}: {}", guild_id, ended.track.title())
            }
            EndReason::Finished => {
                info!("✅ Finished in guild {}: {}", guild_id, ended.track.title())
            }
            EndReason::Failed(cause) => {
                let e = PlaybackError::Runtime(cause);
                warn!(
                    "❌ {} stopped in guild {}: {}",
                    ended.track.title(),
                    guild_id,
                    e
                );
                self.report(
                    channel,
                    &format!("Playback of **{}** stopped: {}", ended.track.title(), e),
                )
                .await;
            }
        }

        tokio::time::sleep(self.inner.settings.settle_delay).await;

        let mut notices = Notices::default();
        {
            let mut guard = loop {
                match self.lock(slot).await {
                    Ok(guard) => break guard,
                    Err(e) => warn!("⏳ Guild {} busy after track end, retrying: {}", guild_id, e),
                }
            };

            // Cleared by teardown while we were waiting.
            if !guard.settling {
                return;
            }
            self.advance(slot, &mut guard, &mut notices).await;
        }

        self.publish(slot, notices).await;
    }

    /// Sends what `advance` collected, then hands the new now-playing
    /// message to a progress loop if its track is still the current one.
    async fn publish(&self, slot: &GuildSlot, notices: Notices) {
        let guild_id = slot.cell.guild_id();
        let Notices {
            channel,
            retired,
            failures,
            now_playing,
        } = notices;

        if let Some(previous) = retired {
            self.retire(previous).await;
        }
        for failure in &failures {
            self.report(channel, failure).await;
        }

        let (Some(channel), Some((track, token, started_at))) = (channel, now_playing) else {
            return;
        };

        let bar = render_progress_bar(
            Duration::ZERO,
            track.duration(),
            self.inner.settings.progress.bar_width,
        );
        let message = match self.inner.display.post_now_playing(channel, &track, &bar).await {
            Ok(message) => message,
            Err(e) => {
                warn!(
                    "⚠️ Could not post now playing in guild {}: {:?}",
                    guild_id, e
                );
                return;
            }
        };

        let adopted = match self.lock(slot).await {
            Ok(mut guard) if guard.now_playing.as_ref().map(|n| n.token) == Some(token) => {
                guard.stop_progress();
                guard.last_announcement = Some(message);
                guard.progress = Some(self.inner.progress.start(ProgressJob {
                    cell: slot.cell.clone(),
                    message,
                    token,
                    track,
                    started_at,
                }));
                true
            }
            Ok(_) => false,
            Err(e) => {
                warn!("⚠️ No progress updates in guild {}: {}", guild_id, e);
                true
            }
        };

        // The track ended before its message went out.
        if !adopted {
            self.retire(message).await;
        }
    }

    async fn retire(&self, message: DisplayMessage) {
        if let Err(e) = self.inner.display.retire(message).await {
            debug!("Could not remove old now-playing message: {:?}", e);
        }
    }

    async fn announce_queued(&self, channel: ChannelId, track: &Track, position: usize) {
        if let Err(e) = self.inner.display.post_queued(channel, track, position).await {
            warn!("⚠️ Could not announce queued track: {:?}", e);
        }
    }

    async fn report(&self, channel: Option<ChannelId>, message: &str) {
        let Some(channel) = channel else {
            return;
        };
        if let Err(e) = self.inner.display.post_error(channel, message).await {
            warn!("⚠️ Could not post error message: {:?}", e);
        }
    }
}
