use anyhow::{anyhow, Result};
use serenity::all::ChannelId;
use std::{path::PathBuf, time::Duration};
use tokio::io::AsyncReadExt;

const CONFIG_DIR_REL_HOME: &str = ".config/bolt";
const CONFIG_FILE_NAME: &str = "config.toml";

/// Bot configuration
#[derive(serde::Serialize, serde::Deserialize)]
pub struct Config {
    pub general: General,
    pub twitch: Twitch,
}

#[derive(serde::Serialize, serde::Deserialize)]
pub struct General {
    pub discord_token: String,
    pub bot_owners: Vec<String>,
    #[serde(default = "default_command_prefix")]
    pub command_prefix: String,
    /// Where failed commands are reported to the operators
    #[serde(default)]
    pub error_channel_id: Option<u64>,
    /// Where guild joins and leaves are noted
    #[serde(default)]
    pub guild_channel_id: Option<u64>,
}

impl General {
    pub fn error_channel(&self) -> Option<ChannelId> {
        channel(self.error_channel_id)
    }

    pub fn guild_channel(&self) -> Option<ChannelId> {
        channel(self.guild_channel_id)
    }
}

// Zero is not a valid snowflake; treat it as unset.
fn channel(id: Option<u64>) -> Option<ChannelId> {
    id.filter(|id| *id != 0).map(ChannelId::new)
}

#[derive(Clone, serde::Serialize, serde::Deserialize)]
pub struct Twitch {
    pub client_id: String,
    pub client_secret: String,
    #[serde(default = "default_poll_interval_seconds")]
    pub poll_interval_seconds: u64,
    #[serde(default = "default_request_timeout_seconds")]
    pub request_timeout_seconds: u64,
}

fn default_command_prefix() -> String {
    "!".to_owned()
}

fn default_poll_interval_seconds() -> u64 {
    60
}

fn default_request_timeout_seconds() -> u64 {
    10
}

impl Twitch {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_seconds.max(1))
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_seconds.max(1))
    }
}

/// Path of a file within the bot's configuration directory
pub fn config_path(file_name: &str) -> Result<PathBuf> {
    dirs::home_dir()
        .map(|p| p.join(CONFIG_DIR_REL_HOME).join(file_name))
        .ok_or(anyhow!("Could not find home directory"))
}

impl Config {
    pub async fn load() -> Result<Self> {
        let path = config_path(CONFIG_FILE_NAME)?;

        let mut file = tokio::fs::File::open(&path).await.map_err(|e| {
            anyhow!(
                "Could not open configuration at `{}`: {}",
                path.to_string_lossy(),
                e
            )
        })?;

        let mut contents = String::new();
        file.read_to_string(&mut contents).await.map_err(|e| {
            anyhow!(
                "Could not read configuration at `{}`: {}",
                path.to_string_lossy(),
                e
            )
        })?;

        Self::parse(&contents).map_err(|e| {
            anyhow!(
                "Could not parse configuration at `{}`: {}",
                path.to_string_lossy(),
                e
            )
        })
    }

    fn parse(contents: &str) -> Result<Self> {
        toml::from_str(contents).map_err(Into::into)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_fill_optional_fields() {
        let cfg = Config::parse(
            r#"
            [general]
            discord_token = "token"
            bot_owners = ["volcyy"]

            [twitch]
            client_id = "id"
            client_secret = "secret"
            "#,
        )
        .unwrap();

        assert_eq!(cfg.general.command_prefix, "!");
        assert_eq!(cfg.general.error_channel(), None);
        assert_eq!(cfg.general.guild_channel(), None);
        assert_eq!(cfg.twitch.poll_interval(), Duration::from_secs(60));
        assert_eq!(cfg.twitch.request_timeout(), Duration::from_secs(10));
    }

    #[test]
    fn zero_interval_is_clamped() {
        let cfg = Config::parse(
            r#"
            [general]
            discord_token = "token"
            bot_owners = []
            command_prefix = "?"

            [twitch]
            client_id = "id"
            client_secret = "secret"
            poll_interval_seconds = 0
            "#,
        )
        .unwrap();

        assert_eq!(cfg.general.command_prefix, "?");
        assert_eq!(cfg.twitch.poll_interval(), Duration::from_secs(1));
    }

    #[test]
    fn missing_twitch_section_is_an_error() {
        let result = Config::parse(
            r#"
            [general]
            discord_token = "token"
            bot_owners = []
            "#,
        );
        assert!(result.is_err());
    }

    #[test]
    fn report_channels_are_optional() {
        let cfg = Config::parse(
            r#"
            [general]
            discord_token = "token"
            bot_owners = []
            error_channel_id = 318824529478549504
            guild_channel_id = 0

            [twitch]
            client_id = "id"
            client_secret = "secret"
            "#,
        )
        .unwrap();

        assert_eq!(
            cfg.general.error_channel(),
            Some(ChannelId::new(318824529478549504))
        );
        assert_eq!(cfg.general.guild_channel(), None);
    }
}
