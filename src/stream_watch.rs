//! Background polling of followed streams.
//!
//! Each cycle fetches every distinct followed channel once, compares its online flag to the last
//! observation and produces one notification per following guild with an announcement channel
//! whenever the flag flips.  The first observation of a channel only records a baseline.

use crate::{
    follow_store::{FollowSnapshot, FollowStore},
    helper::format_uptime,
    log_error, log_internal,
    logging::{PrintColor, Stream},
    twitch::{StreamApi, StreamInfo},
};
use anyhow::Result;
use chrono::{DateTime, Utc};
use futures::FutureExt;
use serenity::all::{
    ChannelId, Colour, CreateEmbed, CreateEmbedFooter, CreateMessage, GuildId, Http,
};
use std::{
    collections::{BTreeSet, HashMap},
    panic::AssertUnwindSafe,
    sync::Arc,
    time::Duration,
};
use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;

const LIVE_COLOUR: Colour = Colour::new(0x6441A5);
const OFFLINE_COLOUR: Colour = Colour::new(0x7F8C8D);

/// Last observation of a channel
#[derive(Clone, Debug, PartialEq)]
pub struct StreamState {
    pub online: bool,
    /// Metadata from the most recent online observation, if there was one
    pub info: StreamInfo,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Transition {
    Started,
    Ended,
}

#[derive(Clone, Debug, PartialEq)]
pub struct Notification {
    pub guild_id: GuildId,
    pub channel_id: ChannelId,
    pub transition: Transition,
    pub stream: StreamInfo,
}

/// Where notifications go
#[serenity::async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, notification: &Notification) -> Result<()>;
}

/// Posts notifications as embeds into Discord channels
pub struct DiscordNotifier {
    pub http: Arc<Http>,
}

#[serenity::async_trait]
impl Notifier for DiscordNotifier {
    async fn notify(&self, notification: &Notification) -> Result<()> {
        let embed = notification_embed(notification, Utc::now());
        notification
            .channel_id
            .send_message(&self.http, CreateMessage::new().embed(embed))
            .await?;
        Ok(())
    }
}

pub fn notification_embed(notification: &Notification, now: DateTime<Utc>) -> CreateEmbed {
    let stream = &notification.stream;
    match notification.transition {
        Transition::Started => {
            let mut description = String::new();
            if let Some(title) = &stream.title {
                description.push_str(&format!("*{}*\n", title.trim()));
            }
            if let Some(game) = &stream.game {
                description.push_str(&format!("🕹 **`Game`**: {}\n", game));
            }
            description.push_str(&format!("👁 **`Viewers`**: {}\n", stream.viewers));
            if let Some(uptime) = stream.uptime(now) {
                description.push_str(&format!("⌛ **`Uptime`**: {}\n", format_uptime(uptime)));
            }

            let mut embed = CreateEmbed::new()
                .title(format!("{} is now live!", stream.display_name))
                .url(&stream.url)
                .description(description)
                .colour(LIVE_COLOUR);
            if let Some(preview) = &stream.preview_url {
                embed = embed.image(preview);
            }
            embed
        }
        Transition::Ended => {
            let description = match &stream.game {
                Some(game) => format!("The stream has ended. Last seen playing {}.", game),
                None => "The stream has ended.".to_owned(),
            };
            CreateEmbed::new()
                .title(format!("{} went offline", stream.display_name))
                .url(&stream.url)
                .description(description)
                .footer(CreateEmbedFooter::new(format!(
                    "Use `stream unfollow {}` to stop these announcements",
                    stream.name
                )))
                .colour(OFFLINE_COLOUR)
        }
    }
}

pub struct StreamWatcher<A: StreamApi + ?Sized> {
    api: Arc<A>,
    /// Bound on a single upstream call, so a hung request cannot stall the loop
    call_timeout: Duration,
    last_state: HashMap<String, StreamState>,
}

impl<A: StreamApi + ?Sized> StreamWatcher<A> {
    pub fn new(api: Arc<A>, call_timeout: Duration) -> Self {
        Self {
            api,
            call_timeout,
            last_state: HashMap::new(),
        }
    }

    #[cfg(test)]
    pub fn last_state(&self, channel_name: &str) -> Option<&StreamState> {
        self.last_state.get(channel_name)
    }

    /// Run one poll over `follows`, returning the notifications to deliver.
    pub async fn poll_cycle(&mut self, follows: &[FollowSnapshot]) -> Vec<Notification> {
        let channels: BTreeSet<&str> = follows
            .iter()
            .flat_map(|guild| guild.channels.iter().map(String::as_str))
            .collect();

        // Forget channels nobody follows anymore, so a later follow starts from a fresh baseline.
        self.last_state
            .retain(|name, _| channels.contains(&name.as_str()));

        let mut notifications = Vec::new();
        for channel in channels {
            let observed =
                match tokio::time::timeout(self.call_timeout, self.api.get_stream(channel)).await {
                    Ok(Ok(observed)) => observed,
                    Ok(Err(e)) => {
                        log_error!("Could not poll stream {}: {}", Stream(channel).color(), e);
                        continue;
                    }
                    Err(_) => {
                        log_error!(
                            "Polling stream {} timed out after {}s",
                            Stream(channel).color(),
                            self.call_timeout.as_secs()
                        );
                        continue;
                    }
                };

            let (transition, state) = match self.last_state.get(channel) {
                None => (
                    None,
                    StreamState {
                        online: observed.online,
                        info: observed,
                    },
                ),
                Some(previous) if previous.online == observed.online => {
                    let info = if observed.online {
                        observed
                    } else {
                        previous.info.clone()
                    };
                    (
                        None,
                        StreamState {
                            online: previous.online,
                            info,
                        },
                    )
                }
                Some(_) if observed.online => (
                    Some((Transition::Started, observed.clone())),
                    StreamState {
                        online: true,
                        info: observed,
                    },
                ),
                Some(previous) => {
                    let info = StreamInfo {
                        online: false,
                        ..previous.info.clone()
                    };
                    (
                        Some((Transition::Ended, info.clone())),
                        StreamState {
                            online: false,
                            info,
                        },
                    )
                }
            };

            if let Some((transition, stream)) = transition {
                log_internal!(
                    "Stream {} {}",
                    Stream(channel).color(),
                    match transition {
                        Transition::Started => "went online",
                        Transition::Ended => "went offline",
                    }
                );

                notifications.extend(
                    follows
                        .iter()
                        .filter(|guild| guild.channels.contains(channel))
                        .filter_map(|guild| {
                            guild.notify_channel.map(|channel_id| Notification {
                                guild_id: guild.guild_id,
                                channel_id,
                                transition,
                                stream: stream.clone(),
                            })
                        }),
                );
            }

            self.last_state.insert(channel.to_owned(), state);
        }

        notifications
    }

    /// Poll every `interval` until `token` is cancelled, then hand the watcher back.
    pub async fn run<N: Notifier>(
        mut self,
        follows: Arc<RwLock<FollowStore>>,
        notifier: N,
        interval: Duration,
        token: CancellationToken,
    ) -> Self {
        log_internal!(
            "Stream watcher started, polling every {}s",
            interval.as_secs()
        );

        loop {
            // Follows changed during the cycle are picked up by the next one.
            let snapshot = follows.read().await.snapshot();

            let cycle = AssertUnwindSafe(self.poll_cycle(&snapshot)).catch_unwind();
            let notifications = tokio::select! {
                _ = token.cancelled() => break,
                result = cycle => match result {
                    Ok(notifications) => notifications,
                    Err(_) => {
                        log_error!("Stream watcher cycle panicked, continuing with the next one");
                        Vec::new()
                    }
                },
            };

            let delivery = deliver(&notifier, &notifications);
            tokio::select! {
                _ = token.cancelled() => break,
                _ = delivery => {}
            }

            tokio::select! {
                _ = token.cancelled() => break,
                _ = tokio::time::sleep(interval) => {}
            }
        }

        log_internal!("Stream watcher stopped");
        self
    }
}

async fn deliver<N: Notifier>(notifier: &N, notifications: &[Notification]) {
    for notification in notifications {
        if let Err(e) = notifier.notify(notification).await {
            log_error!(
                "Could not announce stream {} in channel {}: {}",
                Stream(&notification.stream.name).color(),
                notification.channel_id,
                e
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use std::sync::{
        atomic::{AtomicUsize, Ordering},
        Mutex,
    };

    #[derive(Clone)]
    enum Reply {
        Online(&'static str),
        Offline,
        Fail,
        Hang,
    }

    #[derive(Default)]
    struct FakeApi {
        replies: Mutex<HashMap<String, Reply>>,
        calls: Mutex<Vec<String>>,
        panics_left: AtomicUsize,
    }

    impl FakeApi {
        fn set(&self, channel: &str, reply: Reply) {
            self.replies
                .lock()
                .unwrap()
                .insert(channel.to_owned(), reply);
        }

        fn calls_for(&self, channel: &str) -> usize {
            self.calls
                .lock()
                .unwrap()
                .iter()
                .filter(|c| c.as_str() == channel)
                .count()
        }
    }

    #[serenity::async_trait]
    impl StreamApi for FakeApi {
        async fn get_stream(&self, channel_name: &str) -> crate::error::Result<StreamInfo> {
            self.calls.lock().unwrap().push(channel_name.to_owned());
            if self
                .panics_left
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                .is_ok()
            {
                panic!("fake api exploded");
            }

            let reply = self
                .replies
                .lock()
                .unwrap()
                .get(channel_name)
                .cloned()
                .unwrap_or(Reply::Offline);
            match reply {
                Reply::Online(game) => Ok(StreamInfo {
                    online: true,
                    display_name: channel_name.to_uppercase(),
                    game: Some(game.to_owned()),
                    viewers: 10,
                    ..StreamInfo::offline(channel_name)
                }),
                Reply::Offline => Ok(StreamInfo::offline(channel_name)),
                Reply::Fail => Err(Error::UpstreamUnavailable("503".to_owned())),
                Reply::Hang => futures::future::pending().await,
            }
        }

        async fn get_user(&self, _user_name: &str) -> crate::error::Result<crate::twitch::UserInfo> {
            unimplemented!("not used by the watcher")
        }
    }

    #[derive(Clone, Default)]
    struct CollectingNotifier {
        sent: Arc<Mutex<Vec<Notification>>>,
    }

    #[serenity::async_trait]
    impl Notifier for CollectingNotifier {
        async fn notify(&self, notification: &Notification) -> Result<()> {
            self.sent.lock().unwrap().push(notification.clone());
            Ok(())
        }
    }

    fn guild(id: u64, notify: Option<u64>, channels: &[&str]) -> FollowSnapshot {
        FollowSnapshot {
            guild_id: GuildId::new(id),
            notify_channel: notify.map(ChannelId::new),
            channels: channels.iter().map(|c| c.to_string()).collect(),
        }
    }

    fn watcher(api: &Arc<FakeApi>) -> StreamWatcher<FakeApi> {
        StreamWatcher::new(api.clone(), Duration::from_secs(5))
    }

    #[tokio::test]
    async fn first_observation_is_a_baseline() {
        let api = Arc::new(FakeApi::default());
        api.set("live", Reply::Online("Chess"));
        let follows = [guild(1, Some(10), &["live", "dark"])];
        let mut watcher = watcher(&api);

        let notifications = watcher.poll_cycle(&follows).await;

        assert!(notifications.is_empty());
        assert!(watcher.last_state("live").unwrap().online);
        assert!(!watcher.last_state("dark").unwrap().online);
    }

    #[tokio::test]
    async fn going_online_notifies_guilds_with_destination() {
        let api = Arc::new(FakeApi::default());
        let follows = [
            guild(1, Some(10), &["imaqtpie"]),
            guild(2, None, &["imaqtpie"]),
            guild(3, Some(30), &["imaqtpie", "shroud"]),
            guild(4, Some(40), &["shroud"]),
        ];
        let mut watcher = watcher(&api);
        watcher.poll_cycle(&follows).await;

        api.set("imaqtpie", Reply::Online("League of Legends"));
        let notifications = watcher.poll_cycle(&follows).await;

        let targets: Vec<(GuildId, ChannelId)> = notifications
            .iter()
            .map(|n| (n.guild_id, n.channel_id))
            .collect();
        assert_eq!(
            targets,
            vec![
                (GuildId::new(1), ChannelId::new(10)),
                (GuildId::new(3), ChannelId::new(30)),
            ]
        );
        assert!(notifications
            .iter()
            .all(|n| n.transition == Transition::Started
                && n.stream.game.as_deref() == Some("League of Legends")));

        // No further change, no further notifications
        assert!(watcher.poll_cycle(&follows).await.is_empty());
    }

    #[tokio::test]
    async fn going_offline_reports_last_known_metadata() {
        let api = Arc::new(FakeApi::default());
        api.set("imaqtpie", Reply::Online("League of Legends"));
        let follows = [guild(1, Some(10), &["imaqtpie"])];
        let mut watcher = watcher(&api);
        watcher.poll_cycle(&follows).await;

        api.set("imaqtpie", Reply::Offline);
        let notifications = watcher.poll_cycle(&follows).await;

        assert_eq!(notifications.len(), 1);
        assert_eq!(notifications[0].transition, Transition::Ended);
        assert_eq!(notifications[0].stream.display_name, "IMAQTPIE");
        assert_eq!(
            notifications[0].stream.game.as_deref(),
            Some("League of Legends")
        );
        assert!(!notifications[0].stream.online);
    }

    #[tokio::test]
    async fn shared_channel_is_fetched_once_per_cycle() {
        let api = Arc::new(FakeApi::default());
        let follows = [
            guild(1, Some(10), &["imaqtpie"]),
            guild(2, Some(20), &["imaqtpie"]),
        ];
        let mut watcher = watcher(&api);

        watcher.poll_cycle(&follows).await;
        watcher.poll_cycle(&follows).await;

        assert_eq!(api.calls_for("imaqtpie"), 2);
    }

    #[tokio::test]
    async fn failure_skips_only_the_failing_channel() {
        let api = Arc::new(FakeApi::default());
        let follows = [guild(1, Some(10), &["flaky", "steady"])];
        let mut watcher = watcher(&api);
        watcher.poll_cycle(&follows).await;
        let before = watcher.last_state("flaky").cloned();

        api.set("flaky", Reply::Fail);
        api.set("steady", Reply::Online("Chess"));
        let notifications = watcher.poll_cycle(&follows).await;

        assert_eq!(notifications.len(), 1);
        assert_eq!(notifications[0].stream.name, "steady");
        assert_eq!(watcher.last_state("flaky").cloned(), before);

        // Recovery compares against the state from before the failure
        api.set("flaky", Reply::Online("Chess"));
        let notifications = watcher.poll_cycle(&follows).await;
        assert_eq!(notifications.len(), 1);
        assert_eq!(notifications[0].stream.name, "flaky");
    }

    #[tokio::test(start_paused = true)]
    async fn hung_call_times_out() {
        let api = Arc::new(FakeApi::default());
        api.set("stuck", Reply::Hang);
        let follows = [guild(1, Some(10), &["stuck", "fine"])];
        let mut watcher = watcher(&api);

        let notifications = watcher.poll_cycle(&follows).await;

        assert!(notifications.is_empty());
        assert!(watcher.last_state("stuck").is_none());
        assert!(watcher.last_state("fine").is_some());
    }

    #[tokio::test]
    async fn unfollowed_channel_starts_over() {
        let api = Arc::new(FakeApi::default());
        let mut watcher = watcher(&api);
        watcher
            .poll_cycle(&[guild(1, Some(10), &["imaqtpie"])])
            .await;

        watcher.poll_cycle(&[guild(1, Some(10), &["other"])]).await;
        assert!(watcher.last_state("imaqtpie").is_none());

        api.set("imaqtpie", Reply::Online("Chess"));
        let notifications = watcher
            .poll_cycle(&[guild(1, Some(10), &["imaqtpie"])])
            .await;
        assert!(notifications.is_empty());
    }

    #[tokio::test]
    async fn snapshot_outlives_unfollow() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = FollowStore::open(dir.path().join("follows.json"))
            .await
            .unwrap();
        store
            .follow(GuildId::new(1), "Guild", "imaqtpie")
            .await
            .unwrap();
        store
            .set_notify_channel(GuildId::new(1), "Guild", ChannelId::new(10))
            .await
            .unwrap();

        let api = Arc::new(FakeApi::default());
        let mut watcher = watcher(&api);
        watcher.poll_cycle(&store.snapshot()).await;

        api.set("imaqtpie", Reply::Online("Chess"));
        let snapshot = store.snapshot();
        store.unfollow(GuildId::new(1), "imaqtpie").await.unwrap();
        let notifications = watcher.poll_cycle(&snapshot).await;

        assert_eq!(notifications.len(), 1);
        assert!(store.list_follows(GuildId::new(1)).is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn run_survives_a_panic_and_stops_on_cancel() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = FollowStore::open(dir.path().join("follows.json"))
            .await
            .unwrap();
        store
            .follow(GuildId::new(1), "Guild", "imaqtpie")
            .await
            .unwrap();
        store
            .set_notify_channel(GuildId::new(1), "Guild", ChannelId::new(10))
            .await
            .unwrap();
        let store = Arc::new(RwLock::new(store));

        let api = Arc::new(FakeApi::default());
        api.panics_left.store(1, Ordering::SeqCst);
        let notifier = CollectingNotifier::default();
        let token = CancellationToken::new();

        // Cycles at t=0 (panics), t=60 (baseline) and t=120 (online)
        let handle = tokio::spawn(watcher(&api).run(
            store,
            notifier.clone(),
            Duration::from_secs(60),
            token.clone(),
        ));

        tokio::time::sleep(Duration::from_secs(90)).await;
        api.set("imaqtpie", Reply::Online("Chess"));
        tokio::time::sleep(Duration::from_secs(40)).await;

        token.cancel();
        let watcher = handle.await.unwrap();

        assert_eq!(api.calls_for("imaqtpie"), 3);
        assert!(watcher.last_state("imaqtpie").unwrap().online);
        let sent = notifier.sent.lock().unwrap();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].transition, Transition::Started);
        assert_eq!(sent[0].channel_id, ChannelId::new(10));
    }

    #[tokio::test(start_paused = true)]
    async fn cancel_abandons_a_hung_cycle() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = FollowStore::open(dir.path().join("follows.json"))
            .await
            .unwrap();
        store
            .follow(GuildId::new(1), "Guild", "stuck")
            .await
            .unwrap();
        let store = Arc::new(RwLock::new(store));

        let api = Arc::new(FakeApi::default());
        api.set("stuck", Reply::Hang);
        let token = CancellationToken::new();
        let handle = tokio::spawn(
            StreamWatcher::new(api.clone(), Duration::from_secs(3600)).run(
                store,
                CollectingNotifier::default(),
                Duration::from_secs(60),
                token.clone(),
            ),
        );

        tokio::time::sleep(Duration::from_secs(5)).await;
        assert_eq!(api.calls_for("stuck"), 1);
        token.cancel();

        let watcher = tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .expect("watcher did not stop while a call was in flight")
            .unwrap();
        assert!(watcher.last_state("stuck").is_none());
    }

    #[derive(Default)]
    struct FailingOnceNotifier {
        attempts: AtomicUsize,
        sent: Mutex<Vec<Notification>>,
    }

    #[serenity::async_trait]
    impl Notifier for FailingOnceNotifier {
        async fn notify(&self, notification: &Notification) -> Result<()> {
            if self.attempts.fetch_add(1, Ordering::SeqCst) == 0 {
                anyhow::bail!("missing permissions");
            }
            self.sent.lock().unwrap().push(notification.clone());
            Ok(())
        }
    }

    #[tokio::test]
    async fn failed_delivery_does_not_stop_the_rest() {
        let first = Notification {
            guild_id: GuildId::new(1),
            channel_id: ChannelId::new(10),
            transition: Transition::Started,
            stream: StreamInfo::offline("imaqtpie"),
        };
        let second = Notification {
            guild_id: GuildId::new(2),
            channel_id: ChannelId::new(20),
            ..first.clone()
        };
        let notifier = FailingOnceNotifier::default();

        deliver(&notifier, &[first, second.clone()]).await;

        assert_eq!(notifier.attempts.load(Ordering::SeqCst), 2);
        assert_eq!(*notifier.sent.lock().unwrap(), vec![second]);
    }

    #[test]
    fn embeds_render_both_transitions() {
        let stream = StreamInfo {
            online: true,
            display_name: "Afro".to_owned(),
            game: Some("Chess".to_owned()),
            ..StreamInfo::offline("afro")
        };
        let started = Notification {
            guild_id: GuildId::new(1),
            channel_id: ChannelId::new(10),
            transition: Transition::Started,
            stream: stream.clone(),
        };
        let ended = Notification {
            transition: Transition::Ended,
            ..started.clone()
        };

        let started = serde_json::to_value(notification_embed(&started, Utc::now())).unwrap();
        let ended = serde_json::to_value(notification_embed(&ended, Utc::now())).unwrap();

        assert_eq!(started["title"], "Afro is now live!");
        assert_eq!(ended["title"], "Afro went offline");
        assert!(ended["description"].as_str().unwrap().contains("Chess"));
    }
}
