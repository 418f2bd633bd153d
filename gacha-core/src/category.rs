//! Pool categories and alias normalization.
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Closed set of pool categories understood by the resolver.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default,
)]
#[serde(rename_all = "snake_case")]
pub enum PoolCategory {
    /// Limited character pool with a featured item and long-horizon guarantee.
    #[default]
    Limited,
    /// Weapon pool, flat odds with a shorter ceiling.
    Weapon,
    /// Permanent pool without a featured item.
    Standard,
}

impl PoolCategory {
    pub const ALL: [Self; 3] = [Self::Limited, Self::Weapon, Self::Standard];

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Limited => "limited",
            Self::Weapon => "weapon",
            Self::Standard => "standard",
        }
    }

    /// Map any accepted alias onto its canonical category.
    ///
    /// Matching ignores case, surrounding whitespace, and treats `-` as `_`.
    #[must_use]
    pub fn from_token(token: &str) -> Option<Self> {
        let normalized = token.trim().to_ascii_lowercase().replace('-', "_");
        match normalized.as_str() {
            "limited" | "limited_character" | "character" | "event" | "up" => Some(Self::Limited),
            "weapon" | "limited_weapon" | "arsenal" => Some(Self::Weapon),
            "standard" | "normal" | "permanent" | "basic" => Some(Self::Standard),
            _ => None,
        }
    }
}

impl fmt::Display for PoolCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PoolCategory {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_token(s).ok_or_else(|| format!("unknown pool category: {s}"))
    }
}
