use std::sync::Arc;

use poise::serenity_prelude::{
    self as serenity, ActivityData, ChannelId, CreateEmbed, CreateEmbedFooter, CreateMessage,
    Http,
};
use seedbot::notifier::{Embed, Notification, NotificationSink};
use seedbot::presence::PresenceSink;

/// Delivers queued notifications through the bot's HTTP client.
pub(crate) struct DiscordSink {
    http: Arc<Http>,
}

impl DiscordSink {
    pub(crate) fn new(http: Arc<Http>) -> Self {
        Self { http }
    }
}

impl NotificationSink for DiscordSink {
    type Error = serenity::Error;

    async fn deliver(&self, channel_id: u64, notification: Notification) -> Result<(), serenity::Error> {
        let mut message = CreateMessage::new();
        if let Some(content) = notification.content {
            message = message.content(content);
        }
        if let Some(embed) = notification.embed {
            message = message.embed(render_embed(embed));
        }
        ChannelId::new(channel_id)
            .send_message(self.http.as_ref(), message)
            .await?;
        Ok(())
    }
}

/// Shows the presence line as the bot's "Playing" activity on every shard.
pub(crate) struct DiscordPresence {
    ctx: serenity::Context,
}

impl DiscordPresence {
    pub(crate) fn new(ctx: serenity::Context) -> Self {
        Self { ctx }
    }
}

impl PresenceSink for DiscordPresence {
    fn set_presence(&self, text: &str) {
        self.ctx.set_activity(Some(ActivityData::playing(text)));
    }
}

pub(crate) fn render_embed(embed: Embed) -> CreateEmbed {
    let mut rendered = CreateEmbed::new().title(embed.title).color(embed.color);
    if let Some(description) = embed.description {
        rendered = rendered.description(description);
    }
    for field in embed.fields {
        rendered = rendered.field(field.name, field.value, field.inline);
    }
    if let Some(footer) = embed.footer {
        rendered = rendered.footer(CreateEmbedFooter::new(footer));
    }
    rendered
}
