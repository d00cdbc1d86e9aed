//! # Bot Module
//!
//! Discord gateway glue: slash command registration and dispatch, voice
//! connection management and voice state tracking.
//!
//! The [`JukeboxBot`] struct implements Serenity's [`EventHandler`] trait.
//! It holds no playback state of its own; every command is forwarded to the
//! [`PlaybackSequencer`].

use anyhow::Result;
use serenity::{
    all::{
        ChannelId, Context, EventHandler, GuildId, Interaction, Ready, ShardManager, VoiceState,
    },
    async_trait,
    prelude::TypeMapKey,
};
use std::sync::Arc;
use tracing::{error, info, warn};

pub mod commands;
pub mod events;
pub mod handlers;
pub mod suggestions;

use crate::{
    audio::{voice::SongbirdOutput, PlaybackSequencer},
    config::Config,
};

/// Gives command handlers access to shard latency.
pub struct ShardManagerKey;

impl TypeMapKey for ShardManagerKey {
    type Value = Arc<ShardManager>;
}

/// Main Discord event handler.
pub struct JukeboxBot {
    config: Arc<Config>,
    /// Per-guild playback, shared with voice event handlers
    pub sequencer: PlaybackSequencer,
    /// HTTP client for audio streams
    http: reqwest::Client,
}

impl JukeboxBot {
    pub fn new(config: Arc<Config>, sequencer: PlaybackSequencer, http: reqwest::Client) -> Self {
        Self {
            config,
            sequencer,
            http,
        }
    }

    /// Registers slash commands with Discord.
    ///
    /// Guild commands (when `GUILD_ID` is set) update almost instantly;
    /// global commands can take up to an hour to propagate.
    async fn register_commands(&self, ctx: &Context) -> Result<()> {
        info!("📝 Registering slash commands...");

        match self.config.guild_id {
            Some(guild_id) => {
                let guild_id = GuildId::new(guild_id);
                if !ctx.cache.guilds().contains(&guild_id) {
                    warn!("⚠️ Bot is not a member of guild {}, skipping registration", guild_id);
                    return Ok(());
                }

                commands::register_guild_commands(ctx, guild_id)
                    .await
                    .map_err(|e| {
                        error!("❌ Guild command registration failed: {:?}", e);
                        anyhow::anyhow!(
                            "Could not register guild commands. Check the bot has the 'applications.commands' scope."
                        )
                    })?;
                info!("✅ Guild commands registered for {}", guild_id);
            }
            None => {
                commands::register_global_commands(ctx).await.map_err(|e| {
                    error!("❌ Global command registration failed: {:?}", e);
                    anyhow::anyhow!(
                        "Could not register global commands. Check the bot has the 'applications.commands' scope."
                    )
                })?;
                info!("✅ Global commands registered");
            }
        }

        Ok(())
    }

    /// Joins a voice channel and hands the call to the sequencer.
    ///
    /// `text_channel` is where now-playing and error messages will go.
    pub async fn join_voice_channel(
        &self,
        ctx: &Context,
        guild_id: GuildId,
        voice_channel: ChannelId,
        text_channel: ChannelId,
    ) -> Result<()> {
        let manager = songbird::get(ctx)
            .await
            .ok_or_else(|| anyhow::anyhow!("Songbird not initialised"))?;

        let call = manager.join(guild_id, voice_channel).await.map_err(|e| {
            error!("❌ Voice join failed in guild {}: {:?}", guild_id, e);
            anyhow::anyhow!("could not connect to the voice channel")
        })?;

        {
            let mut handler = call.lock().await;
            events::register_voice_events(&mut handler, guild_id, self.sequencer.clone());
        }

        let output = SongbirdOutput::new(call, self.http.clone(), self.config.default_volume);
        self.sequencer
            .attach_voice(guild_id, Arc::new(output), text_channel)
            .await?;

        info!("🔊 Connected to voice in guild {}", guild_id);
        Ok(())
    }

    /// Stops playback, forgets the queue and leaves the voice channel.
    pub async fn leave_voice_channel(&self, ctx: &Context, guild_id: GuildId) -> Result<()> {
        let manager = songbird::get(ctx)
            .await
            .ok_or_else(|| anyhow::anyhow!("Songbird not initialised"))?;

        self.sequencer.teardown(guild_id).await;
        manager.remove(guild_id).await?;

        info!("👋 Left voice in guild {}", guild_id);
        Ok(())
    }
}

#[async_trait]
impl EventHandler for JukeboxBot {
    async fn ready(&self, ctx: Context, ready: Ready) {
        info!("🤖 {} is online!", ready.user.name);
        info!("📊 Connected to {} servers", ready.guilds.len());

        if let Err(e) = self.register_commands(&ctx).await {
            error!("Command registration failed: {:?}", e);
        }
    }

    /// Slash commands and `/play` autocomplete. Command errors are logged
    /// and reported back to the user.
    async fn interaction_create(&self, ctx: Context, interaction: Interaction) {
        match interaction {
            Interaction::Command(command) => {
                if let Err(e) = handlers::handle_command(&ctx, &command, self).await {
                    error!("Command /{} failed: {:?}", command.data.name, e);
                    handlers::report_failure(&ctx, &command, &e).await;
                }
            }
            Interaction::Autocomplete(autocomplete) => {
                if let Err(e) = handlers::handle_autocomplete(&ctx, autocomplete).await {
                    error!("Autocomplete failed: {:?}", e);
                }
            }
            _ => {}
        }
    }

    /// Tears down playback when the bot itself is removed from voice.
    async fn voice_state_update(&self, ctx: Context, old: Option<VoiceState>, new: VoiceState) {
        let current_user_id = ctx.cache.current_user().id;
        if new.user_id != current_user_id {
            return;
        }

        if old.is_some() && new.channel_id.is_none() {
            if let Some(guild_id) = new.guild_id {
                info!("🔌 Bot disconnected from voice in guild {}", guild_id);
                self.sequencer.teardown(guild_id).await;
            }
        }
    }
}
