//! Miscellaneous convenience methods

use crate::context::Context;
use anyhow::Result;
use serenity::all::{Colour, CreateEmbed, CreateMessage, Message};

pub fn error_embed(description: impl Into<String>) -> CreateEmbed {
    CreateEmbed::new()
        .description(description)
        .colour(Colour::RED)
}

pub fn success_embed(description: impl Into<String>) -> CreateEmbed {
    CreateEmbed::new()
        .description(description)
        .colour(Colour::DARK_GREEN)
}

/// `H:MM:SS h`, clamped at zero for clocks that disagree with the upstream
pub fn format_uptime(uptime: chrono::Duration) -> String {
    let secs = uptime.num_seconds().max(0);
    format!("{}:{:02}:{:02} h", secs / 3600, secs / 60 % 60, secs % 60)
}

#[serenity::async_trait]
pub trait MessageHelper {
    async fn reply_embed(&self, ctx: &Context<'_>, embed: CreateEmbed) -> Result<()>;
    async fn is_from_owner(&self, ctx: &Context<'_>) -> bool;
    fn guild_name(&self, ctx: &Context<'_>) -> String;
}

#[serenity::async_trait]
impl MessageHelper for Message {
    async fn reply_embed(&self, ctx: &Context<'_>, embed: CreateEmbed) -> Result<()> {
        self.channel_id
            .send_message(ctx.cache_http, CreateMessage::new().embed(embed))
            .await?;
        Ok(())
    }

    async fn is_from_owner(&self, ctx: &Context<'_>) -> bool {
        let owners = &ctx.cfg.read().await.general.bot_owners;
        let author_global_name = &self.author.name;

        owners.contains(author_global_name)
    }

    /// Cached name of the guild the message was sent in
    fn guild_name(&self, ctx: &Context<'_>) -> String {
        self.guild_id
            .and_then(|guild_id| guild_id.name(ctx.cache))
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn uptime_formats_as_clock() {
        assert_eq!(format_uptime(chrono::Duration::seconds(0)), "0:00:00 h");
        assert_eq!(format_uptime(chrono::Duration::seconds(3_725)), "1:02:05 h");
        assert_eq!(format_uptime(chrono::Duration::hours(27)), "27:00:00 h");
        assert_eq!(format_uptime(chrono::Duration::seconds(-5)), "0:00:00 h");
    }
}
