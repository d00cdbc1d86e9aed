use anyhow::Result;
use serenity::{
    builder::{CreateCommand, CreateCommandOption},
    model::{application::CommandOptionType, id::GuildId, permissions::Permissions},
    prelude::Context,
};

fn all_commands() -> Vec<CreateCommand> {
    vec![
        join_command(),
        leave_command(),
        play_command(),
        skip_command(),
        queue_command(),
        clear_command(),
        nowplaying_command(),
        ping_command(),
        sync_command(),
    ]
}

/// Registers global commands
pub async fn register_global_commands(ctx: &Context) -> Result<()> {
    for command in all_commands() {
        ctx.http.create_global_command(&command).await?;
    }

    Ok(())
}

/// Registers commands for a single guild (development)
pub async fn register_guild_commands(ctx: &Context, guild_id: GuildId) -> Result<()> {
    guild_id.set_commands(&ctx.http, all_commands()).await?;

    Ok(())
}

// Voice

fn join_command() -> CreateCommand {
    CreateCommand::new("join").description("Join your voice channel")
}

fn leave_command() -> CreateCommand {
    CreateCommand::new("leave").description("Stop playback and leave the voice channel")
}

// Playback

fn play_command() -> CreateCommand {
    CreateCommand::new("play")
        .description("Play a song or add it to the queue")
        .add_option(
            CreateCommandOption::new(
                CommandOptionType::String,
                "query",
                "YouTube link or search terms",
            )
            .required(true)
            .set_autocomplete(true),
        )
}

fn skip_command() -> CreateCommand {
    CreateCommand::new("skip").description("Skip the current song")
}

fn queue_command() -> CreateCommand {
    CreateCommand::new("queue").description("Show the current queue")
}

fn clear_command() -> CreateCommand {
    CreateCommand::new("clear").description("Remove every song waiting in the queue")
}

fn nowplaying_command() -> CreateCommand {
    CreateCommand::new("nowplaying").description("Show the current song and its progress")
}

// Utility

fn ping_command() -> CreateCommand {
    CreateCommand::new("ping").description("Check the bot's latency")
}

// Admin

fn sync_command() -> CreateCommand {
    CreateCommand::new("sync")
        .description("Re-register the bot's slash commands")
        .default_member_permissions(Permissions::ADMINISTRATOR)
}
