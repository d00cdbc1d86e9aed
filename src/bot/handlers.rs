use anyhow::Result;
use serenity::{
    builder::{
        CreateAutocompleteResponse, CreateEmbed, CreateInteractionResponse,
        CreateInteractionResponseFollowup, CreateInteractionResponseMessage,
        EditInteractionResponse,
    },
    model::{
        application::CommandInteraction,
        id::{ChannelId, GuildId, UserId},
    },
    prelude::Context,
};
use std::time::Instant;
use tracing::{debug, info, warn};

use super::{suggestions, JukeboxBot, ShardManagerKey};
use crate::{audio::PlayOutcome, error::StateConflict, ui::embeds};

/// Dispatches slash commands
pub async fn handle_command(
    ctx: &Context,
    command: &CommandInteraction,
    bot: &JukeboxBot,
) -> Result<()> {
    let guild_id = match command.guild_id {
        Some(guild_id) => guild_id,
        None => return reply(ctx, command, "❌ This command only works in a server", true).await,
    };

    info!(
        "📝 /{} used by {} in guild {}",
        command.data.name, command.user.name, guild_id
    );

    match command.data.name.as_str() {
        "join" => handle_join(ctx, command, bot, guild_id).await?,
        "leave" => handle_leave(ctx, command, bot, guild_id).await?,
        "play" => handle_play(ctx, command, bot, guild_id).await?,
        "skip" => handle_skip(ctx, command, bot, guild_id).await?,
        "queue" => handle_queue(ctx, command, bot, guild_id).await?,
        "clear" => handle_clear(ctx, command, bot, guild_id).await?,
        "nowplaying" => handle_nowplaying(ctx, command, bot, guild_id).await?,
        "ping" => handle_ping(ctx, command).await?,
        "sync" => handle_sync(ctx, command, bot).await?,
        _ => reply(ctx, command, "❌ Unknown command", true).await?,
    }

    Ok(())
}

/// Maximum length of a Discord message.
const MESSAGE_LIMIT: usize = 2000;

/// Text shown to the user when a command fails.
pub fn failure_message(error: &anyhow::Error) -> String {
    let message = format!("❌ {}", error);
    match message.char_indices().nth(MESSAGE_LIMIT - 1) {
        Some((cut, _)) => format!("{}…", &message[..cut]),
        None => message,
    }
}

/// Tells the user a command failed.
///
/// Answers the interaction if nothing was sent yet, follows up if it was,
/// and falls back to a plain channel message.
pub async fn report_failure(ctx: &Context, command: &CommandInteraction, error: &anyhow::Error) {
    let content = failure_message(error);

    let response = CreateInteractionResponse::Message(
        CreateInteractionResponseMessage::new()
            .content(content.clone())
            .ephemeral(true),
    );
    if command.create_response(&ctx.http, response).await.is_ok() {
        return;
    }

    let followup = CreateInteractionResponseFollowup::new()
        .content(content.clone())
        .ephemeral(true);
    if command.create_followup(&ctx.http, followup).await.is_ok() {
        return;
    }

    if let Err(e) = command.channel_id.say(&ctx.http, content).await {
        warn!(
            "⚠️ Could not tell the user /{} failed: {:?}",
            command.data.name, e
        );
    }
}

/// Answers `/play` autocomplete with matching popular songs.
pub async fn handle_autocomplete(ctx: &Context, interaction: CommandInteraction) -> Result<()> {
    let current = interaction
        .data
        .autocomplete()
        .map(|option| option.value.to_string())
        .unwrap_or_default();

    let mut response = CreateAutocompleteResponse::new();
    for song in suggestions::suggest(&current) {
        response = response.add_string_choice(song, song);
    }

    interaction
        .create_response(&ctx.http, CreateInteractionResponse::Autocomplete(response))
        .await?;

    Ok(())
}

async fn handle_join(
    ctx: &Context,
    command: &CommandInteraction,
    bot: &JukeboxBot,
    guild_id: GuildId,
) -> Result<()> {
    let voice_channel_id = match user_voice_channel(ctx, guild_id, command.user.id) {
        Some(channel_id) => channel_id,
        None => return reply(ctx, command, "❌ Join a voice channel first!", true).await,
    };

    if bot.sequencer.is_connected(guild_id).await {
        return reply(ctx, command, &conflict(StateConflict::AlreadyConnected), true).await;
    }

    defer(ctx, command).await?;

    let content = match bot
        .join_voice_channel(ctx, guild_id, voice_channel_id, command.channel_id)
        .await
    {
        Ok(()) => format!("✅ Joined <#{}>", voice_channel_id),
        Err(e) => {
            warn!("⚠️ Could not join voice in guild {}: {:?}", guild_id, e);
            format!("⚠️ Connection failed: {}", e)
        }
    };

    command
        .edit_response(&ctx.http, EditInteractionResponse::new().content(content))
        .await?;

    Ok(())
}

async fn handle_leave(
    ctx: &Context,
    command: &CommandInteraction,
    bot: &JukeboxBot,
    guild_id: GuildId,
) -> Result<()> {
    if !bot.sequencer.is_connected(guild_id).await {
        return reply(ctx, command, &conflict(StateConflict::NotConnected), true).await;
    }

    bot.leave_voice_channel(ctx, guild_id).await?;
    reply(ctx, command, "👋 Left the voice channel", false).await
}

async fn handle_play(
    ctx: &Context,
    command: &CommandInteraction,
    bot: &JukeboxBot,
    guild_id: GuildId,
) -> Result<()> {
    let query = command
        .data
        .options
        .iter()
        .find(|opt| opt.name == "query")
        .and_then(|opt| opt.value.as_str())
        .ok_or_else(|| anyhow::anyhow!("Query not provided"))?
        .to_string();

    // Resolution can take several seconds
    defer(ctx, command).await?;

    let started = Instant::now();
    match bot
        .sequencer
        .request_play(guild_id, command.channel_id, &query)
        .await
    {
        Ok(outcome) => {
            match &outcome {
                PlayOutcome::Started(track) => debug!("▶️ Started {}", track.title()),
                PlayOutcome::Enqueued { track, position } => {
                    debug!("➕ Queued {} at {}", track.title(), position)
                }
                PlayOutcome::StartFailed(track) => debug!("❌ Could not start {}", track.title()),
            }
            // The channel already shows the outcome.
            command.delete_response(&ctx.http).await?;
        }
        Err(e) => {
            command
                .edit_response(
                    &ctx.http,
                    EditInteractionResponse::new().content(format!("❌ {}", e)),
                )
                .await?;
        }
    }

    debug!("⏱️ /play handled in {:?}", started.elapsed());
    Ok(())
}

async fn handle_skip(
    ctx: &Context,
    command: &CommandInteraction,
    bot: &JukeboxBot,
    guild_id: GuildId,
) -> Result<()> {
    match bot.sequencer.request_skip(guild_id).await {
        Ok(track) => reply(ctx, command, &format!("⏭️ Skipped **{}**", track.title()), false).await,
        Err(e) => reply(ctx, command, &conflict(e), true).await,
    }
}

async fn handle_queue(
    ctx: &Context,
    command: &CommandInteraction,
    bot: &JukeboxBot,
    guild_id: GuildId,
) -> Result<()> {
    match bot.sequencer.list_queue(guild_id).await {
        Ok(snapshot) => reply_embed(ctx, command, embeds::queue_embed(&snapshot)).await,
        Err(e) => reply(ctx, command, &format!("❌ {}", e), true).await,
    }
}

async fn handle_clear(
    ctx: &Context,
    command: &CommandInteraction,
    bot: &JukeboxBot,
    guild_id: GuildId,
) -> Result<()> {
    match bot.sequencer.clear_queue(guild_id).await {
        Ok(removed) => reply(ctx, command, &format!("🗑️ Cleared {} songs", removed), false).await,
        Err(e) => reply(ctx, command, &format!("❌ {}", e), true).await,
    }
}

async fn handle_nowplaying(
    ctx: &Context,
    command: &CommandInteraction,
    bot: &JukeboxBot,
    guild_id: GuildId,
) -> Result<()> {
    let snapshot = match bot.sequencer.list_queue(guild_id).await {
        Ok(snapshot) => snapshot,
        Err(e) => return reply(ctx, command, &format!("❌ {}", e), true).await,
    };

    match snapshot.now_playing {
        Some(current) => {
            let embed = embeds::current_track_embed(
                &current.track,
                current.elapsed,
                bot.config.progress_bar_width,
            );
            reply_embed(ctx, command, embed).await
        }
        None => reply(ctx, command, &conflict(StateConflict::NothingPlaying), true).await,
    }
}

/// Re-registers slash commands; restricted to administrators at
/// registration time.
async fn handle_sync(ctx: &Context, command: &CommandInteraction, bot: &JukeboxBot) -> Result<()> {
    defer(ctx, command).await?;

    let content = match bot.register_commands(ctx).await {
        Ok(()) => "✅ Slash commands re-registered".to_string(),
        Err(e) => failure_message(&e),
    };
    command
        .edit_response(&ctx.http, EditInteractionResponse::new().content(content))
        .await?;

    Ok(())
}

async fn handle_ping(ctx: &Context, command: &CommandInteraction) -> Result<()> {
    let started = Instant::now();
    defer(ctx, command).await?;
    let round_trip = started.elapsed();

    let gateway = {
        let data = ctx.data.read().await;
        match data.get::<ShardManagerKey>() {
            Some(manager) => manager
                .runners
                .lock()
                .await
                .get(&ctx.shard_id)
                .and_then(|runner| runner.latency),
            None => None,
        }
    };

    command
        .edit_response(
            &ctx.http,
            EditInteractionResponse::new().embed(embeds::ping_embed(round_trip, gateway)),
        )
        .await?;

    Ok(())
}

// Helpers

fn conflict(e: StateConflict) -> String {
    match e {
        StateConflict::AlreadyConnected => format!("⚠️ {}", e),
        _ => format!("❌ {}", e),
    }
}

async fn defer(ctx: &Context, command: &CommandInteraction) -> Result<()> {
    command
        .create_response(
            &ctx.http,
            CreateInteractionResponse::Defer(CreateInteractionResponseMessage::new()),
        )
        .await?;

    Ok(())
}

async fn reply(
    ctx: &Context,
    command: &CommandInteraction,
    content: &str,
    ephemeral: bool,
) -> Result<()> {
    command
        .create_response(
            &ctx.http,
            CreateInteractionResponse::Message(
                CreateInteractionResponseMessage::new()
                    .content(content)
                    .ephemeral(ephemeral),
            ),
        )
        .await?;

    Ok(())
}

async fn reply_embed(ctx: &Context, command: &CommandInteraction, embed: CreateEmbed) -> Result<()> {
    command
        .create_response(
            &ctx.http,
            CreateInteractionResponse::Message(CreateInteractionResponseMessage::new().embed(embed)),
        )
        .await?;

    Ok(())
}

fn user_voice_channel(ctx: &Context, guild_id: GuildId, user_id: UserId) -> Option<ChannelId> {
    let guild = guild_id.to_guild_cached(&ctx.cache)?;

    guild
        .voice_states
        .get(&user_id)
        .and_then(|voice_state| voice_state.channel_id)
}
