use async_trait::async_trait;
use songbird::{
    input::{HttpRequest, Input},
    tracks::{PlayMode, TrackHandle},
    Call, Event, EventContext, EventHandler as VoiceEventHandler, TrackEvent,
};
use std::{sync::Arc, time::Duration};
use tokio::sync::Mutex;
use tracing::{debug, warn};

use super::output::{EndReason, TrackEndSignal, VoiceOutput};
use crate::error::PlaybackError;

/// HTTP client used to pull audio streams.
///
/// Only the connect phase is bounded: a whole-request timeout would cut
/// songs off part way through.
pub fn stream_client() -> reqwest::Result<reqwest::Client> {
    reqwest::Client::builder()
        .connect_timeout(Duration::from_secs(10))
        .build()
}

/// [`VoiceOutput`] backed by a songbird call.
pub struct SongbirdOutput {
    call: Arc<Mutex<Call>>,
    http: reqwest::Client,
    volume: f32,
    current: parking_lot::Mutex<Option<TrackHandle>>,
}

impl SongbirdOutput {
    pub fn new(call: Arc<Mutex<Call>>, http: reqwest::Client, volume: f32) -> Self {
        Self {
            call,
            http,
            volume,
            current: parking_lot::Mutex::new(None),
        }
    }

    fn current(&self) -> Option<TrackHandle> {
        self.current.lock().clone()
    }
}

#[async_trait]
impl VoiceOutput for SongbirdOutput {
    async fn play(&self, uri: &str, on_end: TrackEndSignal) -> Result<(), PlaybackError> {
        let input = Input::from(HttpRequest::new(self.http.clone(), uri.to_string()));

        let handle = {
            let mut call = self.call.lock().await;
            call.play_only_input(input)
        };

        let _ = handle.set_volume(self.volume);

        for event in [TrackEvent::End, TrackEvent::Error] {
            handle
                .add_event(
                    Event::Track(event),
                    EndNotifier {
                        signal: on_end.clone(),
                    },
                )
                .map_err(|e| PlaybackError::Start(format!("could not watch track: {}", e)))?;
        }

        *self.current.lock() = Some(handle.clone());

        if let Err(e) = handle.make_playable_async().await {
            let _ = handle.stop();
            self.current.lock().take();
            return Err(PlaybackError::Start(e.to_string()));
        }

        debug!("🔊 Stream open (token {})", on_end.token());
        Ok(())
    }

    async fn stop(&self) {
        if let Some(handle) = self.current.lock().take() {
            if let Err(e) = handle.stop() {
                debug!("Stop on an already finished track: {}", e);
            }
        }
    }

    async fn is_playing(&self) -> bool {
        let Some(handle) = self.current() else {
            return false;
        };

        match handle.get_info().await {
            Ok(info) => info.playing == PlayMode::Play,
            Err(_) => false,
        }
    }

    async fn is_connected(&self) -> bool {
        self.call.lock().await.current_connection().is_some()
    }
}

/// Forwards songbird's end and error events to the sequencer.
struct EndNotifier {
    signal: TrackEndSignal,
}

#[async_trait]
impl VoiceEventHandler for EndNotifier {
    async fn act(&self, ctx: &EventContext<'_>) -> Option<Event> {
        let mut reason = EndReason::Finished;

        if let EventContext::Track(tracks) = ctx {
            for (state, _) in tracks.iter() {
                if let PlayMode::Errored(e) = &state.playing {
                    warn!("❌ Track stream errored: {:?}", e);
                    reason = EndReason::Failed(format!("{:?}", e));
                }
            }
        }

        self.signal.notify(reason);

        // One signal per start; later events for this track are stale anyway.
        Some(Event::Cancel)
    }
}
