use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// All cached placement kinds.
///
/// Every kind has its own cache and manager, see [`CacheRegistry`](super::CacheRegistry).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResourceKind {
    /// Full-screen interstitial placements.
    Interstitial,
    /// Native-content placements.
    Native,
    /// Default-sized banner placements.
    Banner,
}

impl ResourceKind {
    pub const ALL: [ResourceKind; 3] = [Self::Interstitial, Self::Native, Self::Banner];

    /// Number of assets held by default.
    pub fn default_capacity(self) -> usize {
        match self {
            Self::Interstitial => 3,
            Self::Native | Self::Banner => 2,
        }
    }

    /// How long an asset may be served by default.
    pub fn default_ttl(self) -> Duration {
        match self {
            Self::Interstitial => Duration::from_secs(10 * 60),
            Self::Native | Self::Banner => Duration::from_secs(15 * 60),
        }
    }
}

impl AsRef<str> for ResourceKind {
    fn as_ref(&self) -> &str {
        match self {
            Self::Interstitial => "interstitial",
            Self::Native => "native",
            Self::Banner => "banner",
        }
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_ref())
    }
}
