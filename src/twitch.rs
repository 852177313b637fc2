//! Twitch Helix client
//!
//! Upstream responses are loosely shaped; everything is converted into [`StreamInfo`] and
//! [`UserInfo`] here so the rest of the bot never touches the raw schema.

use crate::{
    error::Result,
    log_internal,
};
use chrono::{DateTime, Utc};
use reqwest::StatusCode;
use std::time::Duration;
use tokio::sync::Mutex;

const HELIX_URL: &str = "https://api.twitch.tv/helix";
const TOKEN_URL: &str = "https://id.twitch.tv/oauth2/token";
const CHANNEL_URL: &str = "https://www.twitch.tv";
const PREVIEW_WIDTH: &str = "320";
const PREVIEW_HEIGHT: &str = "180";
const MAX_LOGIN_LEN: usize = 25;

/// State of a stream at the time it was fetched
#[derive(Clone, Debug, PartialEq)]
pub struct StreamInfo {
    pub online: bool,
    /// Login name, as followed
    pub name: String,
    pub display_name: String,
    pub game: Option<String>,
    pub title: Option<String>,
    pub viewers: u64,
    pub followers: Option<u64>,
    pub language: Option<String>,
    pub started_at: Option<DateTime<Utc>>,
    pub preview_url: Option<String>,
    pub url: String,
}

#[derive(Clone, Debug, PartialEq)]
pub struct UserInfo {
    pub exists: bool,
    pub id: Option<String>,
    pub name: String,
    pub display_name: String,
    pub bio: Option<String>,
    pub logo_url: Option<String>,
    pub created_at: Option<DateTime<Utc>>,
    pub url: String,
}

/// What the stream watcher and the stream commands need from a streaming service
#[serenity::async_trait]
pub trait StreamApi: Send + Sync {
    /// An unknown channel is reported offline rather than as an error.
    async fn get_stream(&self, channel_name: &str) -> Result<StreamInfo>;
    async fn get_user(&self, user_name: &str) -> Result<UserInfo>;

    async fn exists(&self, user_name: &str) -> Result<bool> {
        Ok(self.get_user(user_name).await?.exists)
    }
}

/// Twitch logins are case-insensitive and always stored lowercase.
pub fn normalize_channel_name(name: &str) -> String {
    name.trim().trim_start_matches('#').to_ascii_lowercase()
}

/// Whether `name` could be a Twitch login at all.  Helix rejects anything else with a 400.
pub fn is_valid_login(name: &str) -> bool {
    (1..=MAX_LOGIN_LEN).contains(&name.len())
        && name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
}

pub fn channel_url(name: &str) -> String {
    format!("{}/{}", CHANNEL_URL, name)
}

impl StreamInfo {
    pub fn offline(channel_name: &str) -> Self {
        Self {
            online: false,
            name: channel_name.to_owned(),
            display_name: channel_name.to_owned(),
            game: None,
            title: None,
            viewers: 0,
            followers: None,
            language: None,
            started_at: None,
            preview_url: None,
            url: channel_url(channel_name),
        }
    }

    fn from_helix(channel_name: &str, stream: Option<HelixStream>, followers: Option<u64>) -> Self {
        let Some(stream) = stream.filter(|s| s.kind == "live") else {
            return Self::offline(channel_name);
        };

        Self {
            online: true,
            name: channel_name.to_owned(),
            display_name: stream.user_name,
            game: stream.game_name.filter(|g| !g.is_empty()),
            title: stream.title.filter(|t| !t.trim().is_empty()),
            viewers: stream.viewer_count,
            followers,
            language: stream.language.filter(|l| !l.is_empty()),
            started_at: stream.started_at,
            preview_url: stream.thumbnail_url.map(|url| {
                url.replace("{width}", PREVIEW_WIDTH)
                    .replace("{height}", PREVIEW_HEIGHT)
            }),
            url: channel_url(channel_name),
        }
    }

    /// Time since the stream started, if online
    pub fn uptime(&self, now: DateTime<Utc>) -> Option<chrono::Duration> {
        self.started_at
            .filter(|_| self.online)
            .map(|started| now - started)
    }
}

impl UserInfo {
    fn from_helix(user_name: &str, user: Option<HelixUser>) -> Self {
        match user {
            Some(user) => Self {
                exists: true,
                url: channel_url(&user.login),
                id: Some(user.id),
                name: user.login,
                display_name: user.display_name,
                bio: user.description.filter(|d| !d.trim().is_empty()),
                logo_url: user.profile_image_url.filter(|u| !u.is_empty()),
                created_at: user.created_at,
            },
            None => Self {
                exists: false,
                id: None,
                name: user_name.to_owned(),
                display_name: user_name.to_owned(),
                bio: None,
                logo_url: None,
                created_at: None,
                url: channel_url(user_name),
            },
        }
    }
}

#[derive(serde::Deserialize)]
struct HelixList<T> {
    data: Vec<T>,
}

#[derive(serde::Deserialize)]
struct HelixStream {
    user_id: String,
    user_name: String,
    #[serde(rename = "type")]
    kind: String,
    game_name: Option<String>,
    title: Option<String>,
    #[serde(default)]
    viewer_count: u64,
    language: Option<String>,
    started_at: Option<DateTime<Utc>>,
    thumbnail_url: Option<String>,
}

#[derive(serde::Deserialize)]
struct HelixUser {
    id: String,
    login: String,
    display_name: String,
    description: Option<String>,
    profile_image_url: Option<String>,
    created_at: Option<DateTime<Utc>>,
}

#[derive(serde::Deserialize)]
struct HelixFollowers {
    total: u64,
}

#[derive(serde::Deserialize)]
struct AppToken {
    access_token: String,
}

/// Helix client authenticated with an app access token
pub struct TwitchClient {
    http: reqwest::Client,
    client_id: String,
    client_secret: String,
    token: Mutex<Option<String>>,
}

impl TwitchClient {
    pub fn new(cfg: &crate::config::Twitch) -> Result<Self> {
        Self::with_timeout(&cfg.client_id, &cfg.client_secret, cfg.request_timeout())
    }

    pub fn with_timeout(client_id: &str, client_secret: &str, timeout: Duration) -> Result<Self> {
        let http = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            http,
            client_id: client_id.to_owned(),
            client_secret: client_secret.to_owned(),
            token: Mutex::new(None),
        })
    }

    async fn app_token(&self, renew: bool) -> Result<String> {
        let mut token = self.token.lock().await;
        if let (Some(token), false) = (token.as_ref(), renew) {
            return Ok(token.clone());
        }

        log_internal!("Requesting Twitch app access token...");
        let fresh = self
            .http
            .post(TOKEN_URL)
            .form(&[
                ("client_id", self.client_id.as_str()),
                ("client_secret", self.client_secret.as_str()),
                ("grant_type", "client_credentials"),
            ])
            .send()
            .await?
            .error_for_status()?
            .json::<AppToken>()
            .await?
            .access_token;
        log_internal!("Requesting Twitch app access token... done");

        *token = Some(fresh.clone());
        Ok(fresh)
    }

    async fn helix<T: serde::de::DeserializeOwned>(
        &self,
        endpoint: &str,
        query: &[(&str, &str)],
    ) -> Result<T> {
        let url = format!("{}/{}", HELIX_URL, endpoint);

        // A stale token gets one renewal.
        let mut renew = false;
        loop {
            let token = self.app_token(renew).await?;
            let response = self
                .http
                .get(&url)
                .header("Client-Id", &self.client_id)
                .bearer_auth(token)
                .query(query)
                .send()
                .await?;

            if response.status() == StatusCode::UNAUTHORIZED && !renew {
                renew = true;
                continue;
            }

            return response
                .error_for_status()?
                .json::<T>()
                .await
                .map_err(Into::into);
        }
    }

    async fn followers(&self, user_id: &str) -> Result<u64> {
        self.helix::<HelixFollowers>("channels/followers", &[("broadcaster_id", user_id)])
            .await
            .map(|f| f.total)
    }
}

#[serenity::async_trait]
impl StreamApi for TwitchClient {
    async fn get_stream(&self, channel_name: &str) -> Result<StreamInfo> {
        if !is_valid_login(channel_name) {
            return Ok(StreamInfo::offline(channel_name));
        }

        let stream = self
            .helix::<HelixList<HelixStream>>("streams", &[("user_login", channel_name)])
            .await?
            .data
            .into_iter()
            .next();

        // Follower count is decoration; don't fail the lookup over it.
        let followers = match &stream {
            Some(stream) => self.followers(&stream.user_id).await.ok(),
            None => None,
        };

        Ok(StreamInfo::from_helix(channel_name, stream, followers))
    }

    async fn get_user(&self, user_name: &str) -> Result<UserInfo> {
        if !is_valid_login(user_name) {
            return Ok(UserInfo::from_helix(user_name, None));
        }

        let user = self
            .helix::<HelixList<HelixUser>>("users", &[("login", user_name)])
            .await?
            .data
            .into_iter()
            .next();

        Ok(UserInfo::from_helix(user_name, user))
    }
}
