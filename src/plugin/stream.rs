use crate::{
    error::Error,
    event::*,
    helper::*,
    log_error, log_internal,
    plugin::*,
    stream_watch::{DiscordNotifier, StreamWatcher},
    twitch::{normalize_channel_name, StreamInfo, UserInfo},
};
use anyhow::Result;
use chrono::Utc;
use serenity::all::{
    Colour, CreateEmbed, CreateEmbedAuthor, CreateEmbedFooter, GuildId, Message,
};

const TWITCH_COLOUR: Colour = Colour::new(0x6441A5);

/// Twitch stream lookups, follows and announcements
pub struct Stream;

enum StreamCmd {
    Get,
    User,
    Follow,
    Unfollow,
    SetChannel,
    UnsetChannel,
    Follows,
}

#[serenity::async_trait]
impl Plugin for Stream {
    fn name(&self) -> &'static str {
        "stream"
    }

    async fn usage(&self, ctx: &Context<'_>) -> Option<String> {
        let prefix = &ctx.cfg.read().await.general.command_prefix;
        let cmd = format!("{}{}", prefix, self.name());
        Some(format!(
            "{cmd} get <name> - information about a Twitch stream\n\
             {cmd} user <name> - information about a Twitch user\n\
             {cmd} follow <name> - announce status changes of a stream in this server\n\
             {cmd} unfollow <name> - stop announcing a stream\n\
             {cmd} setchannel - announce streams in this channel\n\
             {cmd} unsetchannel - stop announcing streams in this server\n\
             {cmd} follows - list streams this server follows"
        ))
    }

    async fn handle(&self, ctx: &Context<'_>, event: &Event) -> Result<EventHandled> {
        if let Event::Ready(_) = event {
            start_watcher(ctx).await;
            return Ok(EventHandled::No);
        }

        let Some((msg, args)) = event.is_bot_cmd(ctx, self.name()).await else {
            return Ok(EventHandled::No);
        };

        let cmd = match args.first() {
            Some(&"get") => StreamCmd::Get,
            Some(&"user") => StreamCmd::User,
            Some(&"follow") => StreamCmd::Follow,
            Some(&"unfollow") => StreamCmd::Unfollow,
            Some(&"setchannel") => StreamCmd::SetChannel,
            Some(&"unsetchannel") => StreamCmd::UnsetChannel,
            Some(&"follows") => StreamCmd::Follows,
            _ => {
                msg.reply_embed(ctx, error_embed("Unknown subcommand. See `help`."))
                    .await?;
                return Ok(EventHandled::Yes);
            }
        };

        let Some(guild_id) = msg.guild_id else {
            msg.reply_embed(
                ctx,
                error_embed("This Command cannot be used in private Messages."),
            )
            .await?;
            return Ok(EventHandled::Yes);
        };

        let name = args.get(1).map(|name| normalize_channel_name(name));
        let needs_name = matches!(
            cmd,
            StreamCmd::Get | StreamCmd::User | StreamCmd::Follow | StreamCmd::Unfollow
        );
        let name = match name {
            Some(name) if !name.is_empty() => name,
            _ if needs_name => {
                msg.reply_embed(ctx, error_embed("Missing stream name. See `help`."))
                    .await?;
                return Ok(EventHandled::Yes);
            }
            _ => String::new(),
        };

        let embed = match cmd {
            StreamCmd::Get => get(ctx, msg, &name).await?,
            StreamCmd::User => user(ctx, msg, &name).await?,
            StreamCmd::Follow => follow(ctx, msg, guild_id, &name).await?,
            StreamCmd::Unfollow => unfollow(ctx, guild_id, &name).await?,
            StreamCmd::SetChannel => set_channel(ctx, msg, guild_id).await?,
            StreamCmd::UnsetChannel => unset_channel(ctx, msg, guild_id).await?,
            StreamCmd::Follows => follows(ctx, guild_id).await,
        };

        msg.reply_embed(ctx, embed).await?;
        Ok(EventHandled::Yes)
    }
}

/// Spawn the stream watcher the first time the gateway connection is ready
async fn start_watcher(ctx: &Context<'_>) {
    let mut vstate = ctx.vstate.write().await;
    if vstate.stream_watcher_started {
        return;
    }
    vstate.stream_watcher_started = true;
    drop(vstate);

    let cfg = ctx.cfg.read().await;
    let interval = cfg.twitch.poll_interval();
    let watcher = StreamWatcher::new(ctx.stream_api.clone(), cfg.twitch.request_timeout());
    drop(cfg);

    let notifier = DiscordNotifier {
        http: ctx.http.clone(),
    };
    let follows = ctx.follows.clone();
    let token = ctx.shutdown.child_token();
    log_internal!("Starting stream watcher...");
    tokio::spawn(async move {
        watcher.run(follows, notifier, interval, token).await;
    });
}

/// Upstream and caller errors become messages; anything else propagates.
fn error_reply(e: Error) -> Result<CreateEmbed> {
    match e {
        Error::UpstreamUnavailable(reason) => {
            log_error!("Twitch request failed: {}", reason);
            Ok(error_embed(
                "Twitch is not responding right now. Please try again later.",
            ))
        }
        Error::AlreadyFollowing(_) | Error::NotFollowing(_) | Error::NoNotifyChannel => {
            Ok(error_embed(e.to_string()))
        }
        e => Err(e.into()),
    }
}

/// Cooldown keyed by user or guild, rendered as a message when exhausted
fn cooldown_reply(result: std::result::Result<(), std::time::Duration>) -> Option<CreateEmbed> {
    result.err().map(|remaining| {
        error_embed(format!(
            "This Command is currently on cooldown. Try again in {}s.",
            remaining.as_secs_f64().ceil().max(1.0)
        ))
    })
}

async fn get(ctx: &Context<'_>, msg: &Message, name: &str) -> Result<CreateEmbed> {
    let cooldown = ctx
        .vstate
        .write()
        .await
        .cooldowns
        .stream_get
        .try_acquire(msg.author.id.get());
    if let Some(embed) = cooldown_reply(cooldown) {
        return Ok(embed);
    }

    match ctx.stream_api.get_stream(name).await {
        Ok(stream) => Ok(stream_embed(&stream)),
        Err(e) => error_reply(e),
    }
}

fn stream_embed(stream: &StreamInfo) -> CreateEmbed {
    if !stream.online {
        return CreateEmbed::new()
            .description("The Stream is currently offline or does not exist.")
            .colour(TWITCH_COLOUR);
    }

    let uptime = stream
        .uptime(Utc::now())
        .map(format_uptime)
        .unwrap_or_else(|| "unknown".to_owned());
    let followers = stream
        .followers
        .map(|f| f.to_string())
        .unwrap_or_else(|| "unknown".to_owned());

    let mut embed = CreateEmbed::new()
        .author(
            CreateEmbedAuthor::new(format!("Stream Information for {}", stream.display_name))
                .url(&stream.url),
        )
        .description(format!(
            "📺 **`Status`**: online\n\
             🕹 **`Game`**: {}\n\
             🗒 **`Description`**: *{}*\n\
             👁 **`Viewers`**: {}\n\
             👀 **`Followers`**: {}\n\
             ⌛ **`Uptime`**: {}\n\
             🗺 **`Language`**: {}\n",
            stream.game.as_deref().unwrap_or("unknown"),
            stream.title.as_deref().map(str::trim).unwrap_or("No Description"),
            stream.viewers,
            followers,
            uptime,
            stream.language.as_deref().unwrap_or("unknown"),
        ))
        .colour(TWITCH_COLOUR);
    if let Some(preview) = &stream.preview_url {
        embed = embed.thumbnail(preview);
    }
    embed
}

async fn user(ctx: &Context<'_>, msg: &Message, name: &str) -> Result<CreateEmbed> {
    let cooldown = ctx
        .vstate
        .write()
        .await
        .cooldowns
        .stream_user
        .try_acquire(msg.author.id.get());
    if let Some(embed) = cooldown_reply(cooldown) {
        return Ok(embed);
    }

    let user = match ctx.stream_api.get_user(name).await {
        Ok(user) => user,
        Err(e) => return error_reply(e),
    };
    if !user.exists {
        return Ok(error_embed(format!("No Twitch User named `{}` found.", name))
            .title("Error trying to get User"));
    }

    // Live status is extra; the user embed is still useful without it.
    let status = match ctx.stream_api.get_stream(&user.name).await {
        Ok(stream) if stream.online => "online",
        Ok(_) => "offline",
        Err(_) => "unknown",
    };

    let prefix = ctx.cfg.read().await.general.command_prefix.clone();
    Ok(user_embed(&user, status, &prefix))
}

fn user_embed(user: &UserInfo, status: &str, prefix: &str) -> CreateEmbed {
    let created = user
        .created_at
        .map(|date| date.format("%B %-d, %Y").to_string())
        .unwrap_or_else(|| "unknown".to_owned());

    let mut author = CreateEmbedAuthor::new(format!("User Information for {}", user.display_name))
        .url(&user.url);
    if let Some(logo) = &user.logo_url {
        author = author.icon_url(logo);
    }

    let mut embed = CreateEmbed::new()
        .author(author)
        .description(format!(
            "🗞 **`Name`**: {}\n\
             📺 **`Status`**: {}\n\
             💻 **`Display Name`**: {}\n\
             🗒 **`Bio`**: *{}*\n\
             🗓 **`Creation Date`**: {}\n\
             🔗 **`Link`**: <{}>\n",
            user.name,
            status,
            user.display_name,
            user.bio.as_deref().map(str::trim).unwrap_or("No Bio"),
            created,
            user.url,
        ))
        .footer(CreateEmbedFooter::new(format!(
            "Use `{}stream get {}` to see detailed information if the User is streaming!",
            prefix, user.name
        )))
        .colour(TWITCH_COLOUR);
    if let Some(logo) = &user.logo_url {
        embed = embed.thumbnail(logo);
    }
    embed
}

async fn follow(
    ctx: &Context<'_>,
    msg: &Message,
    guild_id: GuildId,
    name: &str,
) -> Result<CreateEmbed> {
    let cooldown = ctx
        .vstate
        .write()
        .await
        .cooldowns
        .stream_follow
        .try_acquire(guild_id.get());
    if let Some(embed) = cooldown_reply(cooldown) {
        return Ok(embed);
    }

    match ctx.stream_api.exists(name).await {
        Ok(true) => {}
        Ok(false) => return Ok(error_embed(format!("No Stream named `{}` found.", name))),
        Err(e) => return error_reply(e),
    }

    let guild_name = msg.guild_name(ctx);
    match ctx
        .follows
        .write()
        .await
        .follow(guild_id, &guild_name, name)
        .await
    {
        Ok(()) => Ok(success_embed(format!(
            "This Guild is now **following the Channel `{}`**, getting notified about \
             streaming status changes.",
            name
        ))),
        Err(e) => error_reply(e),
    }
}

async fn unfollow(ctx: &Context<'_>, guild_id: GuildId, name: &str) -> Result<CreateEmbed> {
    match ctx.follows.write().await.unfollow(guild_id, name).await {
        Ok(()) => Ok(success_embed(format!("Successfully unfollowed `{}`.", name))),
        Err(e) => error_reply(e),
    }
}

async fn set_channel(ctx: &Context<'_>, msg: &Message, guild_id: GuildId) -> Result<CreateEmbed> {
    let guild_name = msg.guild_name(ctx);
    match ctx
        .follows
        .write()
        .await
        .set_notify_channel(guild_id, &guild_name, msg.channel_id)
        .await
    {
        Ok(()) => Ok(success_embed(
            "Set the Stream announcement channel to this channel.",
        )),
        Err(e) => error_reply(e),
    }
}

async fn unset_channel(
    ctx: &Context<'_>,
    msg: &Message,
    guild_id: GuildId,
) -> Result<CreateEmbed> {
    let guild_name = msg.guild_name(ctx);
    match ctx
        .follows
        .write()
        .await
        .unset_notify_channel(guild_id, &guild_name)
        .await
    {
        Ok(()) => Ok(success_embed(
            "Unset this Guild's stream announcement channel.",
        )),
        Err(e) => error_reply(e),
    }
}

async fn follows(ctx: &Context<'_>, guild_id: GuildId) -> CreateEmbed {
    let store = ctx.follows.read().await;
    let channels = store.list_follows(guild_id);
    let destination = store.get_notify_channel(guild_id);
    drop(store);

    if channels.is_empty() {
        return error_embed("This Guild is not following any Channels.");
    }

    let listing = channels
        .iter()
        .map(|name| format!("• `{}`", name))
        .collect::<Vec<_>>()
        .join("\n");
    let footer = match destination {
        Some(channel_id) => format!("Announcements go to <#{}>.", channel_id),
        None => "No announcement channel set, use `stream setchannel`.".to_owned(),
    };

    CreateEmbed::new()
        .title("Followed Channels")
        .description(format!("{}\n\n{}", listing, footer))
        .colour(TWITCH_COLOUR)
}
