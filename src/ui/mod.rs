//! Everything users see in text channels.

pub mod display;
pub mod embeds;

use async_trait::async_trait;
use serenity::model::id::{ChannelId, MessageId};

use crate::sources::Track;

pub use display::DiscordDisplay;

/// A message the bot posted and may edit later.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DisplayMessage {
    pub channel_id: ChannelId,
    pub message_id: MessageId,
}

/// Status output used by the sequencer and the progress reporter.
///
/// Failures here are logged by the caller and never affect playback.
#[async_trait]
pub trait PlaybackDisplay: Send + Sync {
    async fn post_now_playing(
        &self,
        channel: ChannelId,
        track: &Track,
        progress: &str,
    ) -> anyhow::Result<DisplayMessage>;

    async fn update_progress(
        &self,
        message: DisplayMessage,
        track: &Track,
        progress: &str,
    ) -> anyhow::Result<()>;

    async fn post_queued(
        &self,
        channel: ChannelId,
        track: &Track,
        position: usize,
    ) -> anyhow::Result<()>;

    async fn post_error(&self, channel: ChannelId, message: &str) -> anyhow::Result<()>;

    /// Removes a now-playing message that a newer one has replaced.
    async fn retire(&self, message: DisplayMessage) -> anyhow::Result<()>;
}
