use crate::{context::Context, event::*};
use anyhow::Result;

mod admin;
mod debug;
mod guild_notes;
mod help;
mod ignore_bots;
mod infraction;
mod stream;

#[serenity::async_trait]
pub trait Plugin: Sync + Send {
    /// Plugin name.  Doubles as the command name for plugins which have one.
    fn name(&self) -> &'static str;
    /// Help message lines.  None if no help message
    async fn usage(&self, ctx: &Context<'_>) -> Option<String>;
    /// Potentially handle event.  Returns:
    /// - Ok(EventHandled::Yes) if the event has been handled and no other plugin should attempt to
    /// handle it
    /// - Ok(EventHandled::No) if another plugin should attempt to handle the event
    /// - Err if an error occurred
    async fn handle(&self, ctx: &Context<'_>, event: &Event) -> Result<EventHandled>;
}

/// Ordered list of available plugins
pub fn plugins() -> Vec<Box<dyn Plugin>> {
    vec![
        // Core bot operations
        Box::new(debug::Debug),
        Box::new(ignore_bots::IgnoreBots),
        Box::new(help::Help),
        Box::new(admin::Shutdown),
        Box::new(guild_notes::GuildNotes),
        // Moderation
        Box::new(infraction::Infraction),
        // Streams
        Box::new(stream::Stream),
    ]
}
