//! Live status probe over the game server's native discovery protocol.
//!
//! The server answers a RakNet "unconnected ping" with an "unconnected pong"
//! whose payload is a `;`-separated advertisement string:
//!
//! ```text
//! MCPE;<motd>;<protocol>;<version>;<players>;<max>;<server id>;<sub motd>;<game mode>;...
//! ```
//!
//! One probe is exactly one datagram round trip bounded by a timeout. Retry
//! cadence belongs to the caller's schedule.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use tokio::net::UdpSocket;
use tracing::{debug, trace, warn};

use crate::error::BroadcastError;
use crate::Result;

/// Protocol version advertised in session documents.
pub const BEDROCK_PROTOCOL_VERSION: u32 = 800;

/// Game version advertised in session documents.
pub const BEDROCK_GAME_VERSION: &str = "1.21.80";

/// Default probe timeout.
pub const DEFAULT_PROBE_TIMEOUT: Duration = Duration::from_millis(1500);

/// Default public status API used by [`WebStatusProbe`].
pub const DEFAULT_WEB_QUERY_URL: &str = "https://api.mcsrvstat.us";

/// RakNet offline message magic.
pub const OFFLINE_MAGIC: [u8; 16] = [
    0x00, 0xff, 0xff, 0x00, 0xfe, 0xfe, 0xfe, 0xfe, 0xfd, 0xfd, 0xfd, 0xfd, 0x12, 0x34, 0x56, 0x78,
];

const UNCONNECTED_PING: u8 = 0x01;
const UNCONNECTED_PONG: u8 = 0x1c;

/// Fixed part of a pong: id, time, server guid, magic, string length.
const PONG_HEADER_LEN: usize = 1 + 8 + 8 + 16 + 2;

const MAX_DATAGRAM: usize = 1500;

/// Live server status captured at one point in time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProbeResult {
    /// Secondary message of the day; advertised as the host name.
    pub host_name: String,
    /// Primary message of the day; advertised as the world name.
    pub world_name: String,
    pub players: u32,
    pub max_players: u32,
}

/// Fully decoded unconnected pong.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BedrockPong {
    pub ping_time: i64,
    pub server_guid: i64,
    pub edition: String,
    pub motd: String,
    pub protocol_version: u32,
    pub version: String,
    pub player_count: u32,
    pub maximum_player_count: u32,
    pub sub_motd: String,
    pub game_type: String,
}

impl From<BedrockPong> for ProbeResult {
    fn from(pong: BedrockPong) -> Self {
        Self {
            host_name: pong.sub_motd,
            world_name: pong.motd,
            players: pong.player_count,
            max_players: pong.maximum_player_count,
        }
    }
}

/// Encode an unconnected ping datagram.
pub fn encode_ping(ping_time: i64, client_guid: i64) -> Vec<u8> {
    let mut buf = Vec::with_capacity(1 + 8 + 16 + 8);
    buf.push(UNCONNECTED_PING);
    buf.extend_from_slice(&ping_time.to_be_bytes());
    buf.extend_from_slice(&OFFLINE_MAGIC);
    buf.extend_from_slice(&client_guid.to_be_bytes());
    buf
}

/// Decode an unconnected pong datagram.
pub fn decode_pong(buf: &[u8]) -> Result<BedrockPong> {
    if buf.len() < PONG_HEADER_LEN {
        return Err(BroadcastError::Probe(format!(
            "pong too short: {} bytes",
            buf.len()
        )));
    }
    if buf[0] != UNCONNECTED_PONG {
        return Err(BroadcastError::Probe(format!(
            "unexpected packet id 0x{:02x}",
            buf[0]
        )));
    }

    let ping_time = read_i64(&buf[1..9]);
    let server_guid = read_i64(&buf[9..17]);
    if buf[17..33] != OFFLINE_MAGIC {
        return Err(BroadcastError::Probe("bad offline magic".into()));
    }

    let len = u16::from_be_bytes([buf[33], buf[34]]) as usize;
    let payload = buf
        .get(PONG_HEADER_LEN..PONG_HEADER_LEN + len)
        .ok_or_else(|| BroadcastError::Probe("truncated advertisement".into()))?;
    let advertisement = String::from_utf8_lossy(payload);

    parse_advertisement(&advertisement, ping_time, server_guid)
}

fn parse_advertisement(advertisement: &str, ping_time: i64, server_guid: i64) -> Result<BedrockPong> {
    let fields: Vec<&str> = advertisement.split(';').collect();
    if fields.len() < 6 {
        return Err(BroadcastError::Probe(format!(
            "advertisement has {} fields",
            fields.len()
        )));
    }

    let number = |idx: usize, name: &str| -> Result<u32> {
        fields[idx]
            .trim()
            .parse()
            .map_err(|_| BroadcastError::Probe(format!("invalid {}: '{}'", name, fields[idx])))
    };

    Ok(BedrockPong {
        ping_time,
        server_guid,
        edition: fields[0].to_string(),
        motd: fields[1].to_string(),
        protocol_version: number(2, "protocol")?,
        version: fields[3].to_string(),
        player_count: number(4, "player count")?,
        maximum_player_count: number(5, "max player count")?,
        sub_motd: fields.get(7).map(|s| s.to_string()).unwrap_or_default(),
        game_type: fields.get(8).map(|s| s.to_string()).unwrap_or_default(),
    })
}

fn read_i64(bytes: &[u8]) -> i64 {
    let mut raw = [0u8; 8];
    raw.copy_from_slice(bytes);
    i64::from_be_bytes(raw)
}

/// Capability to fetch live status from the advertised server.
#[async_trait]
pub trait StatusProbe: Send + Sync {
    /// Run exactly one status query, failing if no answer arrives within `timeout`.
    async fn probe(&self, host: &str, port: u16, timeout: Duration) -> Result<ProbeResult>;
}

/// UDP RakNet probe.
#[derive(Debug, Clone, Default)]
pub struct RakNetProbe;

impl RakNetProbe {
    /// Create a new probe.
    pub fn new() -> Self {
        Self
    }

    async fn round_trip(&self, host: &str, port: u16) -> Result<BedrockPong> {
        let target: SocketAddr = tokio::net::lookup_host((host, port))
            .await?
            .next()
            .ok_or_else(|| BroadcastError::Probe(format!("could not resolve {}", host)))?;

        let bind = if target.is_ipv4() {
            SocketAddr::from(([0, 0, 0, 0], 0))
        } else {
            SocketAddr::from(([0u16; 8], 0))
        };
        let socket = UdpSocket::bind(bind).await?;
        socket.connect(target).await?;

        let ping_time = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis() as i64)
            .unwrap_or_default();
        let client_guid: i64 = rand::random();
        socket.send(&encode_ping(ping_time, client_guid)).await?;
        trace!(%target, "sent unconnected ping");

        let mut buf = [0u8; MAX_DATAGRAM];
        loop {
            let n = socket.recv(&mut buf).await?;
            match decode_pong(&buf[..n]) {
                Ok(pong) => return Ok(pong),
                // Stray datagrams are skipped; the outer timeout bounds the wait.
                Err(e) => debug!(%target, "ignoring datagram: {}", e),
            }
        }
    }
}

#[async_trait]
impl StatusProbe for RakNetProbe {
    async fn probe(&self, host: &str, port: u16, timeout: Duration) -> Result<ProbeResult> {
        let pong = tokio::time::timeout(timeout, self.round_trip(host, port))
            .await
            .map_err(|_| BroadcastError::Timeout)??;
        debug!(
            host,
            port,
            motd = %pong.motd,
            players = pong.player_count,
            max = pong.maximum_player_count,
            "received pong"
        );
        Ok(pong.into())
    }
}

#[derive(Debug, Deserialize)]
struct WebStatus {
    #[serde(default)]
    online: bool,
    #[serde(default)]
    motd: Option<WebText>,
    #[serde(default)]
    map: Option<WebText>,
    #[serde(default)]
    players: Option<WebPlayers>,
}

#[derive(Debug, Default, Deserialize)]
struct WebText {
    #[serde(default)]
    clean: WebLines,
}

/// `clean` is a list of lines for the motd and a single string for the map.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum WebLines {
    Many(Vec<String>),
    One(String),
}

impl Default for WebLines {
    fn default() -> Self {
        Self::Many(Vec::new())
    }
}

impl WebLines {
    fn first(&self) -> &str {
        match self {
            Self::Many(lines) => lines.first().map(String::as_str).unwrap_or_default(),
            Self::One(line) => line,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
struct WebPlayers {
    #[serde(default)]
    online: u32,
    #[serde(default)]
    max: u32,
}

impl WebStatus {
    fn into_result(self) -> Result<ProbeResult> {
        if !self.online {
            return Err(BroadcastError::Probe("server reported offline".into()));
        }
        let players = self.players.unwrap_or_default();
        Ok(ProbeResult {
            host_name: self.map.map(|m| m.clean.first().trim().to_string()).unwrap_or_default(),
            world_name: self.motd.map(|m| m.clean.first().trim().to_string()).unwrap_or_default(),
            players: players.online,
            max_players: players.max,
        })
    }
}

/// Status lookup through a public HTTP status API.
///
/// Queries `GET {base}/bedrock/3/{host}:{port}`.
#[derive(Clone)]
pub struct WebStatusProbe {
    client: Client,
    base_url: String,
}

impl WebStatusProbe {
    /// Create a probe against `base_url`. `timeout` bounds the whole request
    /// on top of the per-probe timeout.
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| BroadcastError::Probe(format!("failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    /// URL queried for `host:port`.
    pub fn status_url(&self, host: &str, port: u16) -> String {
        format!("{}/bedrock/3/{}:{}", self.base_url, host, port)
    }

    async fn fetch(&self, host: &str, port: u16) -> Result<ProbeResult> {
        let response = self
            .client
            .get(self.status_url(host, port))
            .send()
            .await
            .map_err(|e| BroadcastError::Probe(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(BroadcastError::Probe(format!("status API returned {}", status)));
        }

        let body: WebStatus = response
            .json()
            .await
            .map_err(|e| BroadcastError::Probe(format!("bad status API response: {}", e)))?;
        body.into_result()
    }
}

#[async_trait]
impl StatusProbe for WebStatusProbe {
    async fn probe(&self, host: &str, port: u16, timeout: Duration) -> Result<ProbeResult> {
        let result = tokio::time::timeout(timeout, self.fetch(host, port))
            .await
            .map_err(|_| BroadcastError::Timeout)??;
        debug!(host, port, players = result.players, "status API answered");
        Ok(result)
    }
}

/// Tries `primary`, then `secondary` when the first one fails.
///
/// Each probe gets the full timeout.
pub struct FallbackProbe {
    primary: Arc<dyn StatusProbe>,
    secondary: Arc<dyn StatusProbe>,
}

impl FallbackProbe {
    pub fn new(primary: Arc<dyn StatusProbe>, secondary: Arc<dyn StatusProbe>) -> Self {
        Self { primary, secondary }
    }
}

#[async_trait]
impl StatusProbe for FallbackProbe {
    async fn probe(&self, host: &str, port: u16, timeout: Duration) -> Result<ProbeResult> {
        match self.primary.probe(host, port, timeout).await {
            Ok(result) => Ok(result),
            Err(e) => {
                warn!(host, port, "Direct status query failed ({}), trying status API", e);
                self.secondary.probe(host, port, timeout).await
            }
        }
    }
}
