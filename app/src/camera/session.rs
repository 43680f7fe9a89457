use std::collections::HashMap;
use std::net::IpAddr;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use derive_more::derive::Display;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Eq, Hash, Display, Serialize)]
#[serde(transparent)]
pub struct SessionId(String);

impl SessionId {
    //UUIDs are keyed by their lowercase hyphenated form, whatever the caller sent
    pub fn new(raw: &str) -> Self {
        let raw = raw.trim();
        match Uuid::parse_str(raw) {
            Ok(uuid) => Self(uuid.hyphenated().to_string()),
            Err(_) => Self(raw.to_lowercase()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Display, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConnectionId(pub String);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, Serialize)]
#[serde(transparent)]
pub struct Ssrc(i32);

impl Ssrc {
    pub fn generate() -> Self {
        Self::from_bytes(rand::random())
    }

    //First byte is cleared so the value is never negative as signed 32-bit
    pub fn from_bytes(mut bytes: [u8; 4]) -> Self {
        bytes[0] = 0;
        Self(i32::from_be_bytes(bytes))
    }

    #[cfg(test)]
    pub fn value(&self) -> i32 {
        self.0
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SrtpLeg {
    pub port: u16,
    #[serde(with = "base64_bytes")]
    pub srtp_key: Vec<u8>,
    #[serde(with = "base64_bytes")]
    pub srtp_salt: Vec<u8>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PrepareRequest {
    pub session_id: String,
    #[serde(default)]
    pub connection_id: Option<ConnectionId>,
    pub target_address: IpAddr,
    #[serde(default)]
    pub video: Option<SrtpLeg>,
    #[serde(default)]
    pub audio: Option<SrtpLeg>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LegResponse {
    #[serde(flatten)]
    pub leg: SrtpLeg,
    pub ssrc: Ssrc,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum AddressKind {
    V4,
    V6,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LocalAddress {
    pub address: IpAddr,
    #[serde(rename = "type")]
    pub kind: AddressKind,
}

impl From<IpAddr> for LocalAddress {
    fn from(address: IpAddr) -> Self {
        let kind = match address {
            IpAddr::V4(_) => AddressKind::V4,
            IpAddr::V6(_) => AddressKind::V6,
        };
        Self { address, kind }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PrepareResponse {
    pub session_id: SessionId,
    pub address: LocalAddress,
    pub video: Option<LegResponse>,
    pub audio: Option<LegResponse>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct StartRequest {
    #[serde(default)]
    pub video: Option<VideoParameters>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct VideoParameters {
    pub width: u32,
    pub height: u32,
    pub fps: u32,
    pub max_bit_rate: u32,
}

#[derive(Debug, Clone)]
pub(super) struct NegotiatedLeg {
    pub leg: SrtpLeg,
    pub ssrc: Ssrc,
}

impl NegotiatedLeg {
    pub(super) fn negotiate(leg: SrtpLeg) -> Self {
        Self {
            leg,
            ssrc: Ssrc::generate(),
        }
    }

    //Key and salt are concatenated before encoding
    pub(super) fn srtp_params(&self) -> String {
        let mut material = Vec::with_capacity(self.leg.srtp_key.len() + self.leg.srtp_salt.len());
        material.extend_from_slice(&self.leg.srtp_key);
        material.extend_from_slice(&self.leg.srtp_salt);
        STANDARD.encode(material)
    }

    pub(super) fn response(&self) -> LegResponse {
        LegResponse {
            leg: self.leg.clone(),
            ssrc: self.ssrc,
        }
    }
}

#[derive(Debug, Clone)]
pub(super) struct PreparedSession {
    pub target_address: IpAddr,
    pub video: Option<NegotiatedLeg>,
}

#[derive(Debug)]
pub(super) struct RunningSession {
    pub run_id: u64,
    pub cancel: CancellationToken,
}

#[derive(Debug, Default)]
pub(super) struct Sessions {
    pub pending: HashMap<SessionId, PreparedSession>,
    pub ongoing: HashMap<SessionId, RunningSession>,
}

impl Sessions {
    //Drops the session from both sets, cancelling the process if one is running
    pub(super) fn discard(&mut self, id: &SessionId) -> bool {
        let was_pending = self.pending.remove(id).is_some();
        let running = self.ongoing.remove(id);
        if let Some(running) = &running {
            running.cancel.cancel();
        }
        was_pending || running.is_some()
    }
}

#[derive(Debug, Clone, Default)]
pub(super) struct SharedSessions(Arc<Mutex<Sessions>>);

impl SharedSessions {
    pub(super) fn lock(&self) -> MutexGuard<'_, Sessions> {
        self.0.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

mod base64_bytes {
    use base64::Engine as _;
    use base64::engine::general_purpose::STANDARD;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&STANDARD.encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let encoded = String::deserialize(deserializer)?;
        STANDARD.decode(encoded).map_err(serde::de::Error::custom)
    }
}
