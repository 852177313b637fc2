use std::path::PathBuf;

/// Errors raised by the stream follow store, the infraction registry and the stream API client.
///
/// The first four variants are caller errors which the command layer renders as user-facing
/// messages.  `UpstreamUnavailable` is per-channel and never fatal to the stream watcher.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("This Guild is already following the Channel `{0}`.")]
    AlreadyFollowing(String),
    #[error("This Guild is not following the Channel `{0}`.")]
    NotFollowing(String),
    #[error("This Guild has no stream announcement channel set.")]
    NoNotifyChannel,
    #[error("`{0}` is not an infraction kind.")]
    InvalidInfractionKind(String),
    #[error("stream service unavailable: {0}")]
    UpstreamUnavailable(String),
    #[error("could not persist stream follows at `{}`: {source}", .path.display())]
    Storage {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("could not (de)serialize stream follows: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl From<reqwest::Error> for Error {
    fn from(e: reqwest::Error) -> Self {
        Error::UpstreamUnavailable(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, Error>;
