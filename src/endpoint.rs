use serde::Serialize;
use std::fmt;

/// Upstream data API endpoints the gateway calls.
///
/// Costs are the fixed quota units the platform charges per call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum Endpoint {
    Videos,
    Search,
    PlaylistItems,
    Channels,
}

impl Endpoint {
    pub fn path(&self) -> &'static str {
        match self {
            Endpoint::Videos => "videos",
            Endpoint::Search => "search",
            Endpoint::PlaylistItems => "playlistItems",
            Endpoint::Channels => "channels",
        }
    }

    pub fn cost(&self) -> u64 {
        match self {
            Endpoint::Search => 100,
            Endpoint::Videos | Endpoint::PlaylistItems | Endpoint::Channels => 1,
        }
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.path())
    }
}
