//! Moderation infraction kinds and their display glyphs

use crate::error::{Error, Result};
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InfractionType {
    Note,
    Warning,
    Mute,
    Kick,
    Ban,
}

impl InfractionType {
    /// All kinds, least to most severe.
    pub const ALL: [InfractionType; 5] = [
        InfractionType::Note,
        InfractionType::Warning,
        InfractionType::Mute,
        InfractionType::Kick,
        InfractionType::Ban,
    ];

    pub fn name(self) -> &'static str {
        match self {
            InfractionType::Note => "note",
            InfractionType::Warning => "warning",
            InfractionType::Mute => "mute",
            InfractionType::Kick => "kick",
            InfractionType::Ban => "ban",
        }
    }

    pub fn emoji(self) -> &'static str {
        match self {
            InfractionType::Note => "\u{1F4D4}",    // notebook with decorative cover
            InfractionType::Warning => "\u{26A0}",  // warning sign
            InfractionType::Mute => "\u{1F507}",    // speaker with cancellation stroke
            InfractionType::Kick => "\u{1F462}",    // boot
            InfractionType::Ban => "\u{1F528}",     // hammer
        }
    }
}

impl FromStr for InfractionType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        InfractionType::ALL
            .into_iter()
            .find(|kind| kind.name().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| Error::InvalidInfractionKind(s.to_owned()))
    }
}

impl std::fmt::Display for InfractionType {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

pub fn emoji_for(kind: InfractionType) -> &'static str {
    kind.emoji()
}

/// Look up a glyph by the kind's name, e.g. from a command argument.
pub fn emoji_for_name(name: &str) -> Result<&'static str> {
    name.parse().map(emoji_for)
}
