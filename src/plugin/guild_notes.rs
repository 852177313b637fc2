use crate::{
    event::*,
    plugin::*,
    report::{post, GuildNote},
};
use anyhow::Result;
use serenity::all::{Guild, GuildId};

/// Notes guild joins and leaves in the configured guild channel
pub struct GuildNotes;

// A guild going unavailable during an outage is not a removal.
fn removal_note(id: GuildId, unavailable: bool, full: Option<&Guild>) -> Option<GuildNote> {
    if unavailable {
        return None;
    }
    Some(match full {
        Some(guild) => GuildNote::from_guild(guild, false),
        None => GuildNote::from_id(id),
    })
}

#[serenity::async_trait]
impl Plugin for GuildNotes {
    fn name(&self) -> &'static str {
        "guild_notes"
    }

    async fn usage(&self, _ctx: &Context<'_>) -> Option<String> {
        None
    }

    async fn handle(&self, ctx: &Context<'_>, event: &Event) -> Result<EventHandled> {
        let note = match event {
            Event::GuildCreate {
                guild,
                is_new: Some(true),
            } => GuildNote::from_guild(guild, true),
            Event::GuildDelete { incomplete, full } => {
                match removal_note(incomplete.id, incomplete.unavailable, full.as_ref()) {
                    Some(note) => note,
                    None => return Ok(EventHandled::No),
                }
            }
            _ => return Ok(EventHandled::No),
        };

        if let Some(channel_id) = ctx.cfg.read().await.general.guild_channel() {
            post(ctx, channel_id, note.embed()).await;
        }
        Ok(EventHandled::Yes)
    }
}
