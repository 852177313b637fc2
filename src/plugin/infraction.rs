use crate::{
    error::Error,
    event::*,
    helper::*,
    infraction::{emoji_for, emoji_for_name, InfractionType},
    plugin::*,
};
use anyhow::Result;
use serenity::all::CreateEmbed;

/// Shows the moderation infraction kinds and their glyphs
pub struct Infraction;

fn kind_line(kind: InfractionType) -> String {
    format!("{} `{}`", emoji_for(kind), kind)
}

fn all_kinds() -> String {
    InfractionType::ALL
        .into_iter()
        .map(kind_line)
        .collect::<Vec<_>>()
        .join("\n")
}

// Unknown kinds get an error embed.  Anything else the registry reports is a real failure.
fn kind_reply(name: &str) -> Result<CreateEmbed> {
    match emoji_for_name(name) {
        Ok(emoji) => Ok(success_embed(format!(
            "{} `{}`",
            emoji,
            name.trim().to_ascii_lowercase()
        ))),
        Err(e @ Error::InvalidInfractionKind(_)) => Ok(error_embed(format!(
            "{}\nKnown kinds:\n{}",
            e,
            all_kinds()
        ))),
        Err(e) => Err(e.into()),
    }
}

#[serenity::async_trait]
impl Plugin for Infraction {
    fn name(&self) -> &'static str {
        "infraction"
    }

    async fn usage(&self, ctx: &Context<'_>) -> Option<String> {
        let prefix = &ctx.cfg.read().await.general.command_prefix;
        Some(format!(
            "{}{} [kind] - list infraction kinds, or show one",
            prefix,
            self.name()
        ))
    }

    async fn handle(&self, ctx: &Context<'_>, event: &Event) -> Result<EventHandled> {
        let Some((msg, args)) = event.is_bot_cmd(ctx, self.name()).await else {
            return Ok(EventHandled::No);
        };

        let embed = match args.first() {
            None => success_embed(all_kinds()).title("Infraction kinds"),
            Some(name) => kind_reply(name)?,
        };

        msg.reply_embed(ctx, embed).await?;
        Ok(EventHandled::Yes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn listing_covers_every_kind() {
        let listing = all_kinds();
        assert_eq!(listing.lines().count(), 5);
        assert!(listing.starts_with("📔 `note`"));
        assert!(listing.ends_with("🔨 `ban`"));
    }

    #[test]
    fn single_kind_lookup() {
        let found = serde_json::to_value(kind_reply("Kick").unwrap()).unwrap();
        assert_eq!(found["description"], "👢 `kick`");

        let unknown = serde_json::to_value(kind_reply("slap").unwrap()).unwrap();
        let description = unknown["description"].as_str().unwrap();
        assert!(description.starts_with("`slap` is not an infraction kind."));
        assert!(description.ends_with("🔨 `ban`"));
    }
}
