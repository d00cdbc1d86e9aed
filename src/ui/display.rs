use async_trait::async_trait;
use serenity::{
    builder::{CreateMessage, EditMessage},
    http::Http,
    model::id::ChannelId,
};
use std::sync::Arc;

use super::{embeds, DisplayMessage, PlaybackDisplay};
use crate::sources::Track;

/// Posts playback status as embeds in a Discord text channel.
pub struct DiscordDisplay {
    http: Arc<Http>,
}

impl DiscordDisplay {
    pub fn new(http: Arc<Http>) -> Self {
        Self { http }
    }
}

#[async_trait]
impl PlaybackDisplay for DiscordDisplay {
    async fn post_now_playing(
        &self,
        channel: ChannelId,
        track: &Track,
        progress: &str,
    ) -> anyhow::Result<DisplayMessage> {
        let http: &Http = &self.http;
        let message = channel
            .send_message(
                http,
                CreateMessage::new().embed(embeds::now_playing_embed(track, progress)),
            )
            .await?;

        Ok(DisplayMessage {
            channel_id: channel,
            message_id: message.id,
        })
    }

    async fn update_progress(
        &self,
        message: DisplayMessage,
        track: &Track,
        progress: &str,
    ) -> anyhow::Result<()> {
        let http: &Http = &self.http;
        message
            .channel_id
            .edit_message(
                http,
                message.message_id,
                EditMessage::new().embed(embeds::now_playing_embed(track, progress)),
            )
            .await?;

        Ok(())
    }

    async fn post_queued(
        &self,
        channel: ChannelId,
        track: &Track,
        position: usize,
    ) -> anyhow::Result<()> {
        let http: &Http = &self.http;
        channel
            .send_message(
                http,
                CreateMessage::new().embed(embeds::queued_embed(track, position)),
            )
            .await?;

        Ok(())
    }

    async fn post_error(&self, channel: ChannelId, message: &str) -> anyhow::Result<()> {
        let http: &Http = &self.http;
        channel
            .send_message(http, CreateMessage::new().embed(embeds::error_embed(message)))
            .await?;

        Ok(())
    }

    async fn retire(&self, message: DisplayMessage) -> anyhow::Result<()> {
        let http: &Http = &self.http;
        message
            .channel_id
            .delete_message(http, message.message_id)
            .await?;

        Ok(())
    }
}
