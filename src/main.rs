mod config;
mod context;
mod error;
mod event;
mod follow_store;
mod handler;
mod helper;
mod infraction;
mod logging;
mod plugin;
mod report;
mod stream_watch;
mod twitch;
mod volatile_state;

use serenity::{all::GatewayIntents, Client};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cfg = crate::config::Config::load().await?;
    let token = cfg.general.discord_token.clone();
    let follows = crate::follow_store::FollowStore::open(crate::config::config_path(
        crate::follow_store::STORE_FILE_NAME,
    )?)
    .await?;
    log_internal!(
        "Loaded stream follows from `{}`",
        follows.path().to_string_lossy()
    );
    let stream_api = Arc::new(crate::twitch::TwitchClient::new(&cfg.twitch)?);
    let shutdown = CancellationToken::new();
    let handler = handler::Handler::new(cfg, follows, stream_api, shutdown.clone());

    // Things we want discord to tell us about.
    let intents = GatewayIntents::DIRECT_MESSAGES
        | GatewayIntents::GUILDS
        | GatewayIntents::GUILD_MESSAGES
        | GatewayIntents::MESSAGE_CONTENT;

    let mut client = Client::builder(&token, intents)
        .event_handler(handler)
        .await?;

    // Stop on Ctrl-C or on the owner's `shutdown` command.  Cancelling the token also stops the
    // stream watcher.
    let shard_manager = client.shard_manager.clone();
    tokio::spawn(async move {
        tokio::select! {
            _ = shutdown.cancelled() => {}
            _ = tokio::signal::ctrl_c() => shutdown.cancel(),
        }
        log_internal!("Shutting down...");
        shard_manager.shutdown_all().await;
    });

    client.start().await?;
    log_internal!("Logged off.");
    Ok(())
}
