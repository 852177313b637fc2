use crate::{event::*, helper::*, log_internal, plugin::*};
use anyhow::Result;

/// Stops the bot.  Bot owner only.
pub struct Shutdown;

#[serenity::async_trait]
impl Plugin for Shutdown {
    fn name(&self) -> &'static str {
        "shutdown"
    }

    async fn usage(&self, ctx: &Context<'_>) -> Option<String> {
        let prefix = &ctx.cfg.read().await.general.command_prefix;
        Some(format!(
            "{}{} - shut down the bot (bot owner only)",
            prefix,
            self.name()
        ))
    }

    async fn handle(&self, ctx: &Context<'_>, event: &Event) -> Result<EventHandled> {
        let Some((msg, _)) = event.is_bot_cmd(ctx, self.name()).await else {
            return Ok(EventHandled::No);
        };

        if !msg.is_from_owner(ctx).await {
            msg.reply_embed(ctx, error_embed("This Command is restricted to the bot owner."))
                .await?;
            return Ok(EventHandled::Yes);
        }

        log_internal!("Shutting down by owner request...");
        msg.reply_embed(ctx, success_embed("Shutting down...")).await?;
        ctx.shutdown.cancel();
        Ok(EventHandled::Yes)
    }
}
