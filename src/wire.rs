//! Session directory request documents.
//!
//! Every document is a fresh projection of a [`SessionDescriptor`] taken at
//! call time. Field names and nesting are fixed by the remote directory
//! service, so the serde renames below must not change.

use serde::{Deserialize, Serialize};

use crate::session::SessionDescriptor;

/// How the session is broadcast to other players (3 = friends of friends).
pub const BROADCAST_SETTING: u32 = 3;

/// Who may join the session.
pub const JOINABILITY: &str = "joinable_by_friends";

/// Title identifier reported to the directory.
pub const TITLE_ID: u32 = 0;

/// Transport layer used by joining clients (2 = NetherNet).
pub const TRANSPORT_LAYER: u32 = 2;

/// Connection type for the single advertised connection (3 = WebRTC relay).
pub const CONNECTION_TYPE: u32 = 3;

/// Level group identifier.
pub const LEVEL_ID: &str = "level";

/// Advertised game mode.
pub const WORLD_TYPE: &str = "Survival";

/// Join and read restriction enforced by the directory.
pub const JOIN_RESTRICTION: &str = "followed";

/// Subscription id the directory uses for change notifications.
pub const SUBSCRIPTION_ID: &str = "845CC784-7348-4A27-BCDE-C083579DD113";

/// Cross-play disabled flag.
pub const CROSS_PLAY_DISABLED: bool = false;

/// LAN game flag.
pub const LAN_GAME: bool = false;

/// Online cross-platform flag.
pub const ONLINE_CROSS_PLATFORM_GAME: bool = true;

/// Editor world broadcast flag.
pub const IS_EDITOR_WORLD: bool = false;

/// Hardcore broadcast flag.
pub const IS_HARDCORE: bool = false;

/// Document sent to create (and join) a new session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CreateSessionRequest {
    pub members: SessionMembers,
    pub properties: SessionProperties,
}

impl CreateSessionRequest {
    /// Build the creation document from the descriptor as it is right now.
    ///
    /// `member_connection` is this process's own connection id, used to
    /// register the owner as the first active member.
    pub fn new(info: &SessionDescriptor, member_connection: &str) -> Self {
        Self {
            members: SessionMembers::owner(&info.xuid, member_connection),
            properties: SessionProperties::from_descriptor(info),
        }
    }
}

/// Document sent on every heartbeat to refresh an existing session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UpdateSessionRequest {
    pub properties: SessionProperties,
}

impl UpdateSessionRequest {
    /// Build the update document from the descriptor as it is right now.
    pub fn new(info: &SessionDescriptor) -> Self {
        Self {
            properties: SessionProperties::from_descriptor(info),
        }
    }
}

/// Member block: the owner joins its own session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionMembers {
    pub me: SessionMember,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionMember {
    pub constants: MemberConstants,
    pub properties: MemberProperties,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemberConstants {
    pub system: MemberConstantsSystem,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemberConstantsSystem {
    pub xuid: String,
    pub initialize: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemberProperties {
    pub system: MemberPropertiesSystem,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemberPropertiesSystem {
    pub active: bool,
    pub connection: String,
    pub subscription: MemberSubscription,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemberSubscription {
    pub id: String,
    #[serde(rename = "changeTypes")]
    pub change_types: Vec<String>,
}

impl SessionMembers {
    fn owner(xuid: &str, connection: &str) -> Self {
        Self {
            me: SessionMember {
                constants: MemberConstants {
                    system: MemberConstantsSystem {
                        xuid: xuid.to_string(),
                        initialize: true,
                    },
                },
                properties: MemberProperties {
                    system: MemberPropertiesSystem {
                        active: true,
                        connection: connection.to_string(),
                        subscription: MemberSubscription {
                            id: SUBSCRIPTION_ID.to_string(),
                            change_types: vec!["everything".to_string()],
                        },
                    },
                },
            },
        }
    }
}

/// `properties` object shared by the create and update documents.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionProperties {
    pub system: SessionSystemProperties,
    pub custom: SessionCustomProperties,
}

impl SessionProperties {
    /// Project the descriptor into the directory's property shape.
    pub fn from_descriptor(info: &SessionDescriptor) -> Self {
        Self {
            system: SessionSystemProperties::default(),
            custom: SessionCustomProperties {
                broadcast_setting: BROADCAST_SETTING,
                cross_play_disabled: CROSS_PLAY_DISABLED,
                joinability: JOINABILITY.to_string(),
                lan_game: LAN_GAME,
                max_member_count: info.max_players,
                member_count: info.players,
                online_cross_platform_game: ONLINE_CROSS_PLATFORM_GAME,
                supported_connections: vec![Connection::new(&info.connection_id)],
                title_id: TITLE_ID,
                transport_layer: TRANSPORT_LAYER,
                level_id: LEVEL_ID.to_string(),
                host_name: info.host_name.clone(),
                owner_id: info.xuid.clone(),
                rak_net_guid: String::new(),
                world_name: info.world_name.clone(),
                world_type: WORLD_TYPE.to_string(),
                protocol: info.protocol,
                version: info.version.clone(),
                is_editor_world: IS_EDITOR_WORLD,
                is_hardcore: IS_HARDCORE,
            },
        }
    }
}

/// `properties.system`: access restrictions, fixed for every session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionSystemProperties {
    #[serde(rename = "joinRestriction")]
    pub join_restriction: String,
    #[serde(rename = "readRestriction")]
    pub read_restriction: String,
    pub closed: bool,
}

impl Default for SessionSystemProperties {
    fn default() -> Self {
        Self {
            join_restriction: JOIN_RESTRICTION.to_string(),
            read_restriction: JOIN_RESTRICTION.to_string(),
            closed: false,
        }
    }
}

/// `properties.custom`: the game-specific advertisement.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionCustomProperties {
    #[serde(rename = "BroadcastSetting")]
    pub broadcast_setting: u32,
    #[serde(rename = "CrossPlayDisabled")]
    pub cross_play_disabled: bool,
    #[serde(rename = "Joinability")]
    pub joinability: String,
    #[serde(rename = "LanGame")]
    pub lan_game: bool,
    #[serde(rename = "MaxMemberCount")]
    pub max_member_count: u32,
    #[serde(rename = "MemberCount")]
    pub member_count: u32,
    #[serde(rename = "OnlineCrossPlatformGame")]
    pub online_cross_platform_game: bool,
    #[serde(rename = "SupportedConnections")]
    pub supported_connections: Vec<Connection>,
    #[serde(rename = "TitleId")]
    pub title_id: u32,
    #[serde(rename = "TransportLayer")]
    pub transport_layer: u32,
    #[serde(rename = "levelId")]
    pub level_id: String,
    #[serde(rename = "hostName")]
    pub host_name: String,
    #[serde(rename = "ownerId")]
    pub owner_id: String,
    #[serde(rename = "rakNetGUID")]
    pub rak_net_guid: String,
    #[serde(rename = "worldName")]
    pub world_name: String,
    #[serde(rename = "worldType")]
    pub world_type: String,
    pub protocol: u32,
    pub version: String,
    #[serde(rename = "isEditorWorld")]
    pub is_editor_world: bool,
    #[serde(rename = "isHardcore")]
    pub is_hardcore: bool,
}

/// A connection descriptor telling joining clients how to reach the host.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Connection {
    #[serde(rename = "ConnectionType")]
    pub connection_type: u32,
    #[serde(rename = "HostIpAddress")]
    pub host_ip_address: String,
    #[serde(rename = "HostPort")]
    pub host_port: u16,
    #[serde(rename = "NetherNetId")]
    pub nether_net_id: String,
}

impl Connection {
    /// Relay connection carrying only the transport connection id.
    pub fn new(connection_id: &str) -> Self {
        Self {
            connection_type: CONNECTION_TYPE,
            host_ip_address: String::new(),
            host_port: 0,
            nether_net_id: connection_id.to_string(),
        }
    }
}
