//! Messages exchanged between the lobby coordinator and battle hosting proxies.
//!
//! These are plain values; when to send which message is decided by the
//! matchmaking side.

use std::{collections::HashSet, net::IpAddr};

use lobby_server_domain::{SessionId, UserId, user::User};
use serde::{Deserialize, Serialize, de::DeserializeOwned};
use thiserror::Error;

pub const PROTOCOL_VERSION: u32 = 1;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LobbyUser {
    pub user_id: UserId,
    pub name: String,
    pub team: String,
    /// Whether the user can be reached over UDP.
    pub udp: bool,
    pub udp_addrs: Vec<String>,
}

impl LobbyUser {
    pub fn from_user(user: &User, udp: bool, udp_addrs: Vec<String>) -> Self {
        Self {
            user_id: user.user_id.clone(),
            name: user.name.clone(),
            team: user.team.clone(),
            udp,
            udp_addrs,
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Battle {
    pub users: Vec<LobbyUser>,
    pub aeug_ids: Vec<UserId>,
    pub titans_ids: Vec<UserId>,
}

/// A hosting proxy announcing itself and its NAT traversal state.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegisterProxyRequest {
    pub current_version: u32,
    pub user_id: UserId,
    pub local_ip: IpAddr,
    pub port: u16,
    pub udp_addrs: Vec<String>,
    /// Users this proxy already has a direct peer link with.
    pub p2p_connected: HashSet<UserId>,
}

impl RegisterProxyRequest {
    pub fn is_current_version(&self) -> bool {
        self.current_version == PROTOCOL_VERSION
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegisterProxyResponse {
    pub result: bool,
    pub message: String,
    pub session_id: SessionId,
    pub user_id: UserId,
    pub lobby_users: Vec<LobbyUser>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BattleInfoRequest {
    pub session_id: SessionId,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BattleInfoResponse {
    pub result: bool,
    pub message: String,
    pub users: Vec<LobbyUser>,
    pub battle_ip: IpAddr,
    pub port: u16,
    pub is_test: bool,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusRequest {}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusResponse {
    pub lobby_users: Vec<LobbyUser>,
    pub battles: Vec<Battle>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum LobbyRequest {
    RegisterProxy(RegisterProxyRequest),
    BattleInfo(BattleInfoRequest),
    Status(StatusRequest),
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum LobbyResponse {
    RegisterProxy(RegisterProxyResponse),
    BattleInfo(BattleInfoResponse),
    Status(StatusResponse),
}

#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("failed to encode message: {0}")]
    Encode(serde_json::Error),

    #[error("failed to decode message: {0}")]
    Decode(serde_json::Error),
}

pub fn encode<T: Serialize>(msg: &T) -> Result<String, ProtocolError> {
    serde_json::to_string(msg).map_err(ProtocolError::Encode)
}

pub fn decode<T: DeserializeOwned>(msg: &str) -> Result<T, ProtocolError> {
    serde_json::from_str(msg).map_err(ProtocolError::Decode)
}
