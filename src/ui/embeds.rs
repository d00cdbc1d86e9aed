use serenity::{
    all::Timestamp,
    builder::{CreateEmbed, CreateEmbedFooter},
};
use std::time::Duration;

use crate::{
    audio::{progress::render_progress_bar, QueueSnapshot},
    sources::Track,
};

/// Standard colour palette
pub mod colors {
    use serenity::all::Colour;

    pub const SUCCESS_GREEN: Colour = Colour::from_rgb(67, 181, 129);
    pub const ERROR_RED: Colour = Colour::from_rgb(220, 53, 69);
    pub const INFO_BLUE: Colour = Colour::from_rgb(52, 144, 220);
    pub const MUSIC_PURPLE: Colour = Colour::from_rgb(138, 43, 226);
    pub const NEUTRAL_GRAY: Colour = Colour::from_rgb(108, 117, 125);
}

const STANDARD_FOOTER: &str = "🎵 Guild Jukebox";

/// How many pending tracks the queue embed lists before summarising.
const QUEUE_PREVIEW: usize = 10;

/// Now-playing card; the progress field is what the reporter keeps editing.
pub fn now_playing_embed(track: &Track, progress: &str) -> CreateEmbed {
    let mut embed = CreateEmbed::default()
        .title("🎶 Now Playing")
        .description(format!("**{}**", track.title()))
        .color(colors::MUSIC_PURPLE)
        .field("Progress", format!("`{}`", progress), false)
        .field("⏱️ Length", length_label(track.duration()), true);

    if let Some(thumbnail) = track.thumbnail() {
        embed = embed.thumbnail(thumbnail);
    }
    if !track.source_page().is_empty() {
        embed = embed.url(track.source_page());
    }

    embed.footer(CreateEmbedFooter::new(STANDARD_FOOTER))
}

/// `/nowplaying` reply, rendered from a snapshot rather than the live message.
pub fn current_track_embed(track: &Track, elapsed: Duration, bar_width: usize) -> CreateEmbed {
    now_playing_embed(
        track,
        &render_progress_bar(elapsed, track.duration(), bar_width),
    )
    .timestamp(Timestamp::now())
}

pub fn queued_embed(track: &Track, position: usize) -> CreateEmbed {
    let mut embed = CreateEmbed::default()
        .title("🎵 Added to Queue")
        .description(format!("**{}**", track.title()))
        .color(colors::SUCCESS_GREEN)
        .field("📍 Position", position.to_string(), true)
        .field("⏱️ Length", length_label(track.duration()), true);

    if let Some(thumbnail) = track.thumbnail() {
        embed = embed.thumbnail(thumbnail);
    }

    embed
        .footer(CreateEmbedFooter::new(
            "🎵 Plays automatically when the current song ends",
        ))
        .timestamp(Timestamp::now())
}

pub fn queue_embed(snapshot: &QueueSnapshot) -> CreateEmbed {
    let mut embed = CreateEmbed::default()
        .title("📋 Queue")
        .color(colors::INFO_BLUE);

    if snapshot.now_playing.is_none() && snapshot.pending.is_empty() {
        return embed
            .description("😴 **The queue is empty**\n\n💡 Use `/play <song>` to add music")
            .color(colors::NEUTRAL_GRAY)
            .footer(CreateEmbedFooter::new(STANDARD_FOOTER))
            .timestamp(Timestamp::now());
    }

    if let Some(current) = &snapshot.now_playing {
        embed = embed.field(
            "▶️ Playing",
            format!(
                "**{}** `{}/{}`",
                current.track.title(),
                format_duration(current.elapsed),
                length_label(current.track.duration())
            ),
            false,
        );
    }

    if !snapshot.pending.is_empty() {
        embed = embed.field("Up next", queue_lines(&snapshot.pending), false);
    }

    let mut info = format!("**Total:** {} pending", snapshot.pending.len());
    let pending = snapshot.pending_duration();
    if pending > Duration::ZERO {
        info.push_str(&format!(" • **Length:** {}", format_duration(pending)));
    }

    embed
        .field("Info", info, false)
        .footer(CreateEmbedFooter::new(STANDARD_FOOTER))
        .timestamp(Timestamp::now())
}

/// Numbered list of the first pending tracks.
pub fn queue_lines(pending: &[Track]) -> String {
    let mut lines = String::new();

    for (i, track) in pending.iter().take(QUEUE_PREVIEW).enumerate() {
        lines.push_str(&format!(
            "**{}**. {} `[{}]`\n",
            i + 1,
            track.title(),
            length_label(track.duration())
        ));
    }

    if pending.len() > QUEUE_PREVIEW {
        lines.push_str(&format!("…and {} more", pending.len() - QUEUE_PREVIEW));
    }

    lines
}

pub fn error_embed(description: &str) -> CreateEmbed {
    CreateEmbed::default()
        .title("❌ Playback Problem")
        .description(description)
        .color(colors::ERROR_RED)
        .timestamp(Timestamp::now())
        .footer(CreateEmbedFooter::new(STANDARD_FOOTER))
}

pub fn ping_embed(round_trip: Duration, gateway: Option<Duration>) -> CreateEmbed {
    let gateway = gateway.map_or("measuring…".to_string(), |d| {
        format!("{:.2}ms", d.as_secs_f64() * 1000.0)
    });

    CreateEmbed::default()
        .title("🏓 Latency")
        .color(colors::SUCCESS_GREEN)
        .field(
            "Round trip",
            format!("{:.2}ms", round_trip.as_secs_f64() * 1000.0),
            true,
        )
        .field("Gateway", gateway, true)
}

fn length_label(duration: Duration) -> String {
    if duration.is_zero() {
        "unknown".to_string()
    } else {
        format_duration(duration)
    }
}

pub fn format_duration(duration: Duration) -> String {
    let total_seconds = duration.as_secs();
    let hours = total_seconds / 3600;
    let minutes = (total_seconds % 3600) / 60;
    let seconds = total_seconds % 60;

    if hours > 0 {
        format!("{}:{:02}:{:02}", hours, minutes, seconds)
    } else {
        format!("{}:{:02}", minutes, seconds)
    }
}
