use crate::{event::*, log_event, logging::*, plugin::*};
use anyhow::Result;

/// Prints debug information about event to stdout
pub struct Debug;

#[serenity::async_trait]
impl Plugin for Debug {
    fn name(&self) -> &'static str {
        "debug"
    }

    async fn usage(&self, _ctx: &Context<'_>) -> Option<String> {
        None
    }

    async fn handle(&self, ctx: &Context<'_>, event: &Event) -> Result<EventHandled> {
        match event {
            Event::Ready(ready) => {
                log_event!(
                    "Connected to {} guild(s) as {} ({})",
                    ready.guilds.len(),
                    ready.user.color(),
                    ready.user.id,
                );
                log_event!(
                    "Invite link: https://discordapp.com/oauth2/authorize?&client_id={}&scope=bot",
                    ready.user.id,
                );
            }
            Event::Message(msg) => {
                log_event!(
                    "{}{}{}{}{}{} {}",
                    msg.guild_id.color(ctx.http).await,
                    Glue {}.color(),
                    msg.channel_id.color(ctx.http).await,
                    Glue {}.color(),
                    msg.author.color(),
                    Glue {}.color(),
                    msg.content,
                );
            }
            Event::GuildCreate { guild, is_new } => {
                if *is_new == Some(true) {
                    log_event!("Joined guild {} ({})", guild.name, guild.id);
                }
            }
            Event::GuildDelete { incomplete, full } => {
                let name = full.as_ref().map(|guild| guild.name.as_str()).unwrap_or("?");
                if incomplete.unavailable {
                    log_event!("Guild {} ({}) became unavailable", name, incomplete.id);
                } else {
                    log_event!("Left guild {} ({})", name, incomplete.id);
                }
            }
        }

        Ok(EventHandled::No)
    }
}
