//! Per-guild stream follows and announcement channels, persisted as JSON.

use crate::error::{Error, Result};
use serenity::all::{ChannelId, GuildId};
use std::{
    collections::{BTreeSet, HashMap},
    io::ErrorKind,
    path::{Path, PathBuf},
};

pub const STORE_FILE_NAME: &str = "stream_follows.json";

/// A guild's stream subscriptions
#[derive(Clone, Debug, Default, serde::Serialize, serde::Deserialize)]
pub struct GuildFollows {
    /// Cached for whoever reads the file.  Not authoritative.
    pub guild_name: String,
    pub channels: BTreeSet<String>,
    pub notify_channel: Option<ChannelId>,
}

/// One guild's follows as seen at the start of a poll cycle
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FollowSnapshot {
    pub guild_id: GuildId,
    pub notify_channel: Option<ChannelId>,
    pub channels: BTreeSet<String>,
}

pub struct FollowStore {
    path: PathBuf,
    guilds: HashMap<GuildId, GuildFollows>,
}

impl FollowStore {
    /// Open the store at `path`.  A missing file is an empty store.
    pub async fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let guilds = match tokio::fs::read(&path).await {
            Ok(data) => serde_json::from_slice(&data)?,
            Err(e) if e.kind() == ErrorKind::NotFound => HashMap::new(),
            Err(source) => return Err(Error::Storage { path, source }),
        };
        Ok(Self { path, guilds })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Persist `guilds`, then adopt them.  On failure the in-memory state is left as it was.
    async fn commit(&mut self, guilds: HashMap<GuildId, GuildFollows>) -> Result<()> {
        let serialized = serde_json::to_string_pretty(&guilds)?;

        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|source| Error::Storage {
                    path: parent.to_owned(),
                    source,
                })?;
        }

        // Write beside the target, then rename over it.
        let tmp_path = self.path.with_extension("json.new");
        tokio::fs::write(&tmp_path, serialized)
            .await
            .map_err(|source| Error::Storage {
                path: tmp_path.clone(),
                source,
            })?;
        tokio::fs::rename(&tmp_path, &self.path)
            .await
            .map_err(|source| Error::Storage {
                path: self.path.clone(),
                source,
            })?;

        self.guilds = guilds;
        Ok(())
    }

    pub async fn follow(
        &mut self,
        guild_id: GuildId,
        guild_name: &str,
        channel_name: &str,
    ) -> Result<()> {
        let mut guilds = self.guilds.clone();
        let entry = guilds.entry(guild_id).or_default();
        if !entry.channels.insert(channel_name.to_owned()) {
            return Err(Error::AlreadyFollowing(channel_name.to_owned()));
        }
        entry.guild_name = guild_name.to_owned();
        self.commit(guilds).await
    }

    pub async fn unfollow(&mut self, guild_id: GuildId, channel_name: &str) -> Result<()> {
        let mut guilds = self.guilds.clone();
        let removed = guilds
            .get_mut(&guild_id)
            .map(|entry| entry.channels.remove(channel_name))
            .unwrap_or(false);
        if !removed {
            return Err(Error::NotFollowing(channel_name.to_owned()));
        }
        prune(&mut guilds, guild_id);
        self.commit(guilds).await
    }

    pub fn list_follows(&self, guild_id: GuildId) -> BTreeSet<String> {
        self.guilds
            .get(&guild_id)
            .map(|entry| entry.channels.clone())
            .unwrap_or_default()
    }

    pub async fn set_notify_channel(
        &mut self,
        guild_id: GuildId,
        guild_name: &str,
        channel_id: ChannelId,
    ) -> Result<()> {
        let mut guilds = self.guilds.clone();
        let entry = guilds.entry(guild_id).or_default();
        entry.guild_name = guild_name.to_owned();
        entry.notify_channel = Some(channel_id);
        self.commit(guilds).await
    }

    pub async fn unset_notify_channel(&mut self, guild_id: GuildId, guild_name: &str) -> Result<()> {
        let mut guilds = self.guilds.clone();
        let cleared = match guilds.get_mut(&guild_id) {
            Some(entry) => {
                entry.guild_name = guild_name.to_owned();
                entry.notify_channel.take().is_some()
            }
            None => false,
        };
        if !cleared {
            return Err(Error::NoNotifyChannel);
        }
        prune(&mut guilds, guild_id);
        self.commit(guilds).await
    }

    pub fn get_notify_channel(&self, guild_id: GuildId) -> Option<ChannelId> {
        self.guilds.get(&guild_id).and_then(|entry| entry.notify_channel)
    }

    /// Copy of every guild's follows, for one poll cycle
    pub fn snapshot(&self) -> Vec<FollowSnapshot> {
        self.guilds
            .iter()
            .filter(|(_, entry)| !entry.channels.is_empty())
            .map(|(guild_id, entry)| FollowSnapshot {
                guild_id: *guild_id,
                notify_channel: entry.notify_channel,
                channels: entry.channels.clone(),
            })
            .collect()
    }
}

// Drop guilds with nothing left to remember
fn prune(guilds: &mut HashMap<GuildId, GuildFollows>, guild_id: GuildId) {
    if let Some(entry) = guilds.get(&guild_id) {
        if entry.channels.is_empty() && entry.notify_channel.is_none() {
            guilds.remove(&guild_id);
        }
    }
}
