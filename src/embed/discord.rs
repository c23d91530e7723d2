//! Discord client wrapper over the serenity HTTP API.

use std::sync::Arc;

use async_trait::async_trait;
use serenity::builder::{
    CreateActionRow, CreateAllowedMentions, CreateButton, CreateEmbed, CreateEmbedAuthor,
    CreateEmbedFooter, CreateMessage, EditMessage,
};
use serenity::http::Http;
use serenity::model::id::{ChannelId, MessageId};
use tracing::info;

use crate::embed::engine::ChatApi;
use crate::embed::render::{Card, LinkButton, RenderedReply};

/// Discord REST client implementing the engine's chat operations.
pub struct DiscordChat {
    http: Arc<Http>,
}

impl DiscordChat {
    pub fn new(http: Arc<Http>) -> Self {
        Self { http }
    }
}

/// Convert a platform-neutral card into a serenity embed.
fn build_embed(card: &Card) -> CreateEmbed {
    let mut builder = CreateEmbed::new();

    if let Some(ref name) = card.author_name {
        let mut author = CreateEmbedAuthor::new(name);
        if let Some(ref icon) = card.author_icon {
            author = author.icon_url(icon);
        }
        if let Some(ref url) = card.author_url {
            author = author.url(url);
        }
        builder = builder.author(author);
    }
    if let Some(ref url) = card.url {
        builder = builder.url(url);
    }
    if let Some(ref description) = card.description {
        builder = builder.description(description);
    }
    if let Some(ref image) = card.image {
        builder = builder.image(image);
    }
    for field in &card.fields {
        builder = builder.field(&field.name, &field.value, true);
    }
    if let Some(ref text) = card.footer_text {
        let mut footer = CreateEmbedFooter::new(text);
        if let Some(ref icon) = card.footer_icon {
            footer = footer.icon_url(icon);
        }
        builder = builder.footer(footer);
    }
    if let Some(ts) = card.timestamp {
        if let Ok(timestamp) = serenity::model::Timestamp::from_unix_timestamp(ts) {
            builder = builder.timestamp(timestamp);
        }
    }
    if let Some(color) = card.color {
        builder = builder.color(color);
    }

    builder
}

/// One action row per button, each holding a single link button.
fn build_components(buttons: &[LinkButton]) -> Vec<CreateActionRow> {
    buttons
        .iter()
        .map(|button| {
            CreateActionRow::Buttons(vec![
                CreateButton::new_link(&button.url).label(&button.label),
            ])
        })
        .collect()
}

#[async_trait]
impl ChatApi for DiscordChat {
    async fn reply(
        &self,
        channel_id: u64,
        source_id: u64,
        content: &RenderedReply,
    ) -> Result<u64, String> {
        let channel = ChannelId::new(channel_id);
        let embeds: Vec<CreateEmbed> = content.cards.iter().map(build_embed).collect();

        let builder = CreateMessage::new()
            .embeds(embeds)
            .components(build_components(&content.buttons))
            .reference_message((channel, MessageId::new(source_id)))
            .allowed_mentions(CreateAllowedMentions::new().replied_user(false));

        channel
            .send_message(&self.http, builder)
            .await
            .map(|msg| msg.id.get())
            .map_err(|e| format!("Failed to send embed reply: {e}"))
    }

    async fn edit(
        &self,
        channel_id: u64,
        reply_id: u64,
        content: &RenderedReply,
    ) -> Result<(), String> {
        let channel = ChannelId::new(channel_id);
        let reply = MessageId::new(reply_id);

        // The reply has to still exist before editing it in place.
        self.http
            .get_message(channel, reply)
            .await
            .map_err(|e| format!("Failed to fetch embed reply: {e}"))?;

        let embeds: Vec<CreateEmbed> = content.cards.iter().map(build_embed).collect();
        let builder = EditMessage::new()
            .embeds(embeds)
            .components(build_components(&content.buttons));

        channel
            .edit_message(&self.http, reply, builder)
            .await
            .map(|_| ())
            .map_err(|e| format!("Failed to edit embed reply: {e}"))
    }

    async fn delete(&self, channel_id: u64, reply_id: u64) -> Result<(), String> {
        info!("Deleting embed reply {reply_id} in channel {channel_id}");

        ChannelId::new(channel_id)
            .delete_message(&self.http, MessageId::new(reply_id))
            .await
            .map_err(|e| format!("Failed to delete message: {e}"))
    }

    async fn suppress(&self, channel_id: u64, message_id: u64) -> Result<(), String> {
        ChannelId::new(channel_id)
            .edit_message(
                &self.http,
                MessageId::new(message_id),
                EditMessage::new().suppress_embeds(true),
            )
            .await
            .map(|_| ())
            .map_err(|e| format!("Failed to suppress embeds: {e}"))
    }
}
