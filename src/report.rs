//! Notes for the bot's operators, posted into channels named in the configuration: commands that
//! failed, and guilds the bot joined or left.

use crate::{context::Context, log_error};
use serenity::all::{
    ChannelId, Colour, CreateEmbed, CreateMessage, Guild, GuildId, Message, Timestamp, UserId,
};
use std::fmt::Display;

// Discord rejects embed field values above this.
const FIELD_LIMIT: usize = 1024;

/// Who ran which command where, and how it failed
pub struct ErrorReport {
    pub command: String,
    pub author: String,
    pub author_id: UserId,
    /// Channel name and id, if the message was not a DM
    pub channel: Option<(String, ChannelId)>,
    /// Guild name and id, if the message was not a DM
    pub guild: Option<(String, GuildId)>,
    pub content: String,
    pub error: String,
}

impl ErrorReport {
    pub async fn from_message(
        ctx: &Context<'_>,
        command: &str,
        msg: &Message,
        err: &anyhow::Error,
    ) -> Self {
        let guild = msg.guild_id.map(|guild_id| {
            let name = guild_id.name(ctx.cache).unwrap_or_default();
            (name, guild_id)
        });
        let channel = match guild {
            Some(_) => Some((
                msg.channel_id.name(ctx.http).await.unwrap_or_default(),
                msg.channel_id,
            )),
            None => None,
        };

        Self {
            command: command.to_owned(),
            author: msg.author.name.clone(),
            author_id: msg.author.id,
            channel,
            guild,
            content: msg.content.clone(),
            error: format!("{:?}", err),
        }
    }

    pub fn embed(&self) -> CreateEmbed {
        let invocation = format!(
            "**By**: {} ({})\n**Channel**: {}\n**Guild**: {}\n**Message**: {}",
            self.author,
            self.author_id,
            located(&self.channel),
            located(&self.guild),
            self.content,
        );
        let trace = format!("```\n{}\n```", self.error);
        let trace = if trace.chars().count() < FIELD_LIMIT {
            trace
        } else {
            let first_line = self.error.lines().next().unwrap_or_default();
            let shortened: String = first_line.chars().take(FIELD_LIMIT / 2).collect();
            format!("Too long to display, original:\n`{}`", shortened)
        };

        CreateEmbed::new()
            .title(format!("Exception occurred in Command `{}`:", self.command))
            .colour(Colour::RED)
            .field("Invocation", truncate(invocation), false)
            .field("Traceback", trace, false)
    }
}

/// A guild the bot just joined or left
pub struct GuildNote {
    pub joined: bool,
    pub id: GuildId,
    pub name: Option<String>,
    pub member_count: Option<u64>,
    pub channel_count: Option<usize>,
    pub owner_id: Option<UserId>,
    pub icon_url: Option<String>,
}

impl GuildNote {
    pub fn from_guild(guild: &Guild, joined: bool) -> Self {
        Self {
            joined,
            id: guild.id,
            name: Some(guild.name.clone()),
            member_count: Some(guild.member_count),
            channel_count: Some(guild.channels.len()),
            owner_id: Some(guild.owner_id),
            icon_url: guild.icon_url(),
        }
    }

    /// The guild left while it was not cached, so only its id is known.
    pub fn from_id(id: GuildId) -> Self {
        Self {
            joined: false,
            id,
            name: None,
            member_count: None,
            channel_count: None,
            owner_id: None,
            icon_url: None,
        }
    }

    pub fn embed(&self) -> CreateEmbed {
        let verb = if self.joined { "Joined" } else { "Left" };
        let title = match &self.name {
            Some(name) => format!("{} Guild {} ({})", verb, name, self.id),
            None => format!("{} Guild {}", verb, self.id),
        };

        let mut embed = CreateEmbed::new().title(title);
        if let Some(icon_url) = &self.icon_url {
            embed = embed.thumbnail(icon_url);
        }
        if let Some(members) = self.member_count {
            embed = embed.field("Members", format!("Total: {}", members), true);
        }
        if let Some(channels) = self.channel_count {
            embed = embed.field("Channels", channels.to_string(), true);
        }
        if let Some(owner_id) = self.owner_id {
            embed = embed.field("Owner", format!("<@{}>\nID: `{}`", owner_id, owner_id), true);
        }
        embed
    }
}

fn located<T: Display>(place: &Option<(String, T)>) -> String {
    match place {
        Some((name, id)) => format!("{} ({})", name, id),
        None => "DM".to_owned(),
    }
}

fn truncate(text: String) -> String {
    if text.chars().count() <= FIELD_LIMIT {
        return text;
    }
    let mut shortened: String = text.chars().take(FIELD_LIMIT - 1).collect();
    shortened.push('…');
    shortened
}

/// Post `embed` to an operator channel.  Failures are only logged.
pub async fn post(ctx: &Context<'_>, channel_id: ChannelId, embed: CreateEmbed) {
    let message = CreateMessage::new().embed(embed.timestamp(Timestamp::now()));
    if let Err(err) = channel_id.send_message(ctx.http, message).await {
        log_error!("Could not post report to channel {}: {}", channel_id, err);
    }
}

/// Report a failed command to the configured error channel, if there is one.
pub async fn report_command_error(
    ctx: &Context<'_>,
    command: &str,
    msg: &Message,
    err: &anyhow::Error,
) {
    let Some(channel_id) = ctx.cfg.read().await.general.error_channel() else {
        return;
    };
    let report = ErrorReport::from_message(ctx, command, msg, err).await;
    post(ctx, channel_id, report.embed()).await;
}
