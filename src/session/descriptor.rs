//! What is currently being advertised.

use serde::{Deserialize, Serialize};

use crate::ping::{ProbeResult, BEDROCK_GAME_VERSION, BEDROCK_PROTOCOL_VERSION};

/// Statically configured session values, used at startup and as the
/// fallback when a live probe fails.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StaticSessionInfo {
    /// Host name shown to joining players. Empty means "use the account name".
    pub host_name: String,
    pub world_name: String,
    pub players: u32,
    pub max_players: u32,
    /// Address of the advertised game server.
    pub ip: String,
    pub port: u16,
}

impl Default for StaticSessionInfo {
    fn default() -> Self {
        Self {
            host_name: String::new(),
            world_name: "Bedrock level".to_string(),
            players: 0,
            max_players: 20,
            ip: "127.0.0.1".to_string(),
            port: 19132,
        }
    }
}

/// The mutable, in-memory record of the advertised session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionDescriptor {
    pub host_name: String,
    pub world_name: String,
    pub players: u32,
    pub max_players: u32,
    pub ip: String,
    pub port: u16,
    pub protocol: u32,
    pub version: String,
    /// Transport connection id joining clients connect through.
    pub connection_id: String,
    /// Owner account id.
    pub xuid: String,
}

impl SessionDescriptor {
    /// Build a descriptor from static configuration.
    ///
    /// The owner and connection id are filled in once an identity exists.
    pub fn from_static(info: &StaticSessionInfo) -> Self {
        let mut descriptor = Self {
            host_name: String::new(),
            world_name: String::new(),
            players: 0,
            max_players: 0,
            ip: info.ip.clone(),
            port: info.port,
            protocol: BEDROCK_PROTOCOL_VERSION,
            version: BEDROCK_GAME_VERSION.to_string(),
            connection_id: String::new(),
            xuid: String::new(),
        };
        descriptor.apply_static(info);
        descriptor
    }

    /// Overwrite the displayed fields with fresh probe values.
    pub fn apply_probe(&mut self, result: &ProbeResult) {
        self.host_name = result.host_name.clone();
        self.world_name = result.world_name.clone();
        self.set_counts(result.players, result.max_players);
    }

    /// Reset the displayed fields to the configured values.
    pub fn apply_static(&mut self, info: &StaticSessionInfo) {
        self.host_name = info.host_name.clone();
        self.world_name = info.world_name.clone();
        self.set_counts(info.players, info.max_players);
    }

    /// Substitute `display_name` for an empty host name.
    pub fn fallback_host_name(&mut self, display_name: &str) {
        if self.host_name.is_empty() {
            self.host_name = display_name.to_string();
        }
    }

    fn set_counts(&mut self, players: u32, max_players: u32) {
        self.max_players = max_players;
        // A server briefly over capacity is shown as full.
        self.players = players.min(max_players);
    }
}
