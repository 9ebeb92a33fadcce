//! Snap descriptor and the facts the Snapd client (C2) returns about one
//! (spec §3).

use crate::error::Result;

/// Parsed from shorthand `name[/channel]`, where `channel` may itself
/// contain slashes (`track/risk[/branch]`) — split only on the first
/// slash.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Snap {
    pub name: String,
    pub channel: String,
    pub connections: Vec<String>,
}

impl Snap {
    pub fn from_string(spec: &str) -> Self {
        match spec.split_once('/') {
            Some((name, channel)) => Snap {
                name: name.to_string(),
                channel: channel.to_string(),
                connections: Vec::new(),
            },
            None => Snap {
                name: spec.to_string(),
                channel: String::new(),
                connections: Vec::new(),
            },
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SnapInfo {
    pub installed: bool,
    pub classic: bool,
    pub tracking_channel: String,
}

/// Capability the Worker delegates snap queries to (spec §4.2: "thin
/// delegates to C2"). Defined here rather than depending on the snapd
/// crate directly, so the snapd crate can depend on `concierge-core`'s
/// error type without a cycle; `concierge-snapd::SnapdClient` implements
/// this trait.
#[async_trait::async_trait]
pub trait SnapSource: Send + Sync {
    async fn snap_info(&self, name: &str, channel: &str) -> Result<SnapInfo>;
    async fn snap_channels(&self, name: &str) -> Result<Vec<String>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_bare_name() {
        let s = Snap::from_string("yq");
        assert_eq!(s.name, "yq");
        assert_eq!(s.channel, "");
    }

    #[test]
    fn parses_name_and_channel() {
        let s = Snap::from_string("charmcraft/latest/stable");
        assert_eq!(s.name, "charmcraft");
        assert_eq!(s.channel, "latest/stable");
    }

    #[test]
    fn splits_only_on_first_slash() {
        let s = Snap::from_string("jq/latest/edge");
        assert_eq!(s.name, "jq");
        assert_eq!(s.channel, "latest/edge");
    }
}
