use crate::{
    config::Config, context::Context, event::Event, follow_store::FollowStore, twitch::StreamApi,
    volatile_state::VolatileState,
};
use serenity::all::{Guild, Message, Ready, UnavailableGuild};
use std::sync::Arc;
use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;

/// Discord event handler
pub struct Handler {
    cfg: RwLock<Config>,
    follows: Arc<RwLock<FollowStore>>,
    vstate: RwLock<VolatileState>,
    stream_api: Arc<dyn StreamApi>,
    shutdown: CancellationToken,
}

impl<'a> Handler {
    pub fn new(
        cfg: Config,
        follows: FollowStore,
        stream_api: Arc<dyn StreamApi>,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            cfg: RwLock::new(cfg),
            follows: Arc::new(RwLock::new(follows)),
            vstate: RwLock::new(VolatileState::new()),
            stream_api,
            shutdown,
        }
    }

    fn ctx(&'a self, discord_ctx: &'a serenity::all::Context) -> Context<'a> {
        Context {
            cfg: &self.cfg,
            follows: &self.follows,
            vstate: &self.vstate,
            stream_api: &self.stream_api,
            shutdown: &self.shutdown,
            cache: &discord_ctx.cache,
            http: &discord_ctx.http,
            cache_http: discord_ctx,
        }
    }
}

#[serenity::async_trait]
impl serenity::all::EventHandler for Handler {
    async fn ready(&self, discord_ctx: serenity::all::Context, ready: Ready) {
        Event::Ready(ready).handle(self.ctx(&discord_ctx)).await;
    }

    async fn message(&self, discord_ctx: serenity::all::Context, msg: Message) {
        Event::Message(msg).handle(self.ctx(&discord_ctx)).await;
    }

    async fn guild_create(
        &self,
        discord_ctx: serenity::all::Context,
        guild: Guild,
        is_new: Option<bool>,
    ) {
        Event::GuildCreate { guild, is_new }
            .handle(self.ctx(&discord_ctx))
            .await;
    }

    async fn guild_delete(
        &self,
        discord_ctx: serenity::all::Context,
        incomplete: UnavailableGuild,
        full: Option<Guild>,
    ) {
        Event::GuildDelete { incomplete, full }
            .handle(self.ctx(&discord_ctx))
            .await;
    }
}
