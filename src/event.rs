//! The Serenity crate we're using for the Discord API is designed around callbacks to handle
//! events.  However, this does not mesh well with our plugin framework here.  To resolve this,
//! the handler translates the callbacks into a distinct Event enum.

use crate::{context::Context, helper::*, log_error, report::report_command_error};
use serenity::all::{Guild, Message, Ready, UnavailableGuild};

/// A Discord event
pub enum Event {
    Ready(Ready),
    Message(Message),
    /// `is_new` is `Some(true)` only when the bot was just added to the guild.
    GuildCreate { guild: Guild, is_new: Option<bool> },
    /// `full` is the cached guild, if there was one.
    GuildDelete {
        incomplete: UnavailableGuild,
        full: Option<Guild>,
    },
}

impl Event {
    // When an event occurs, iterate over all the plugins to see if any can/should handle it.
    pub async fn handle(self, ctx: Context<'_>) {
        for plugin in crate::plugin::plugins() {
            match plugin.handle(&ctx, &self).await {
                Ok(EventHandled::Yes) => return,
                Ok(EventHandled::No) => continue,
                Err(err) => {
                    log_error!("Error in plugin {}: {:#}", plugin.name(), err);
                    if let Event::Message(msg) = &self {
                        let embed = error_embed(
                            "**An Error occurred through the invocation of the command.**",
                        );
                        if let Err(err) = msg.reply_embed(&ctx, embed).await {
                            log_error!("Could not report error to user: {}", err);
                        }
                        report_command_error(&ctx, plugin.name(), msg, &err).await;
                    }
                    return;
                }
            }
        }
    }

    // Check if a message should be interpreted as a bot command.
    //
    // These are prefixed with the configured command prefix, e. g. `!cmd foo bar baz`.  Returns the
    // message and the remaining whitespace-separated arguments.
    pub async fn is_bot_cmd<'a>(
        &'a self,
        ctx: &Context<'_>,
        cmd: &str,
    ) -> Option<(&'a Message, Vec<&'a str>)> {
        let Event::Message(msg) = self else {
            return None;
        };

        let prefix = ctx.cfg.read().await.general.command_prefix.clone();
        let mut terms = msg.content.split_whitespace();
        if terms.next()?.strip_prefix(prefix.as_str())? != cmd {
            return None;
        }

        Some((msg, terms.collect()))
    }
}

pub enum EventHandled {
    Yes,
    No,
}
