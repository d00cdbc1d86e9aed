use serenity::{async_trait, model::id::GuildId};
use songbird::{
    events::CoreEvent, Event as VoiceEvent, EventContext, EventHandler as VoiceEventHandler,
};
use tracing::{info, warn};

use crate::audio::PlaybackSequencer;

/// Forgets the guild's playback when the voice driver drops out.
pub struct DisconnectHandler {
    pub guild_id: GuildId,
    pub sequencer: PlaybackSequencer,
}

#[async_trait]
impl VoiceEventHandler for DisconnectHandler {
    async fn act(&self, ctx: &EventContext<'_>) -> Option<VoiceEvent> {
        if let EventContext::DriverDisconnect(data) = ctx {
            warn!(
                "🔌 Voice driver disconnected in guild {} ({:?}, reason {:?})",
                self.guild_id, data.kind, data.reason
            );
        }

        // The driver task must not wait on guild state.
        let sequencer = self.sequencer.clone();
        let guild_id = self.guild_id;
        tokio::spawn(async move {
            sequencer.teardown(guild_id).await;
        });

        None
    }
}

/// Logs successful reconnections.
pub struct ReconnectHandler {
    pub guild_id: GuildId,
}

#[async_trait]
impl VoiceEventHandler for ReconnectHandler {
    async fn act(&self, _ctx: &EventContext<'_>) -> Option<VoiceEvent> {
        info!("🔄 Voice driver reconnected in guild {}", self.guild_id);
        None
    }
}

/// Registers the driver-level handlers for a freshly joined call.
pub fn register_voice_events(
    call: &mut songbird::Call,
    guild_id: GuildId,
    sequencer: PlaybackSequencer,
) {
    call.add_global_event(
        VoiceEvent::Core(CoreEvent::DriverDisconnect),
        DisconnectHandler {
            guild_id,
            sequencer,
        },
    );

    call.add_global_event(
        VoiceEvent::Core(CoreEvent::DriverReconnect),
        ReconnectHandler { guild_id },
    );
}
