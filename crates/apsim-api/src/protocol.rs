//! Wire protocol spoken with the simulator backend.
//!
//! Every frame in both directions is a JSON object with a `type` field
//! and flat payload fields. There are no sequence numbers or correlation
//! ids: matching a reply to the request that caused it is left to the
//! caller.
//!
//! Outbound messages are strongly typed ([`Outbound`]). Inbound frames are
//! first decoded into an [`InboundFrame`] (type + raw JSON body) so that
//! unknown message types can be routed, or dropped, without a schema;
//! handlers then [`parse`](InboundFrame::parse) the payload they expect.

use std::fmt;
use std::str::FromStr;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::error::Error;

// ── Message type names ───────────────────────────────────────────────

/// Inbound `type` values the client knows how to route.
pub mod message_type {
    pub const AP_ADDED: &str = "ap_added";
    pub const CLIENT_ADDED: &str = "client_added";
    pub const AP_REMOVED: &str = "ap_removed";
    pub const CLIENT_REMOVED: &str = "client_removed";
    pub const RSSI_UPDATE: &str = "rssi_update";
    pub const POSITION_UPDATE: &str = "position_update";
}

// ── EntityKind ───────────────────────────────────────────────────────

/// Protocol namespace of an entity. APs and clients have independent
/// id spaces on the backend.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    strum::Display,
    strum::EnumString,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum EntityKind {
    Ap,
    Client,
}

impl EntityKind {
    pub const ALL: [Self; 2] = [Self::Ap, Self::Client];

    /// Inbound type carrying a creation ack or a full-state entry.
    pub fn added_type(self) -> &'static str {
        match self {
            Self::Ap => message_type::AP_ADDED,
            Self::Client => message_type::CLIENT_ADDED,
        }
    }

    /// Inbound type confirming a removal.
    pub fn removed_type(self) -> &'static str {
        match self {
            Self::Ap => message_type::AP_REMOVED,
            Self::Client => message_type::CLIENT_REMOVED,
        }
    }

    /// Prefix used for display labels (`AP_7`, `Client_3`).
    pub fn label_prefix(self) -> &'static str {
        match self {
            Self::Ap => "AP",
            Self::Client => "Client",
        }
    }
}

// ── ServerId ─────────────────────────────────────────────────────────

/// Backend-assigned entity identifier.
///
/// Opaque to the client and compared only for equality. The reference
/// backend hands out integer row ids; string ids are accepted as well.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ServerId {
    Numeric(i64),
    Text(String),
}

impl fmt::Display for ServerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Numeric(n) => write!(f, "{n}"),
            Self::Text(s) => write!(f, "{s}"),
        }
    }
}

impl From<i64> for ServerId {
    fn from(n: i64) -> Self {
        Self::Numeric(n)
    }
}

/// Kept verbatim, like a string id decoded from the wire: `"7"` and `7`
/// are different ids.
impl From<String> for ServerId {
    fn from(s: String) -> Self {
        Self::Text(s)
    }
}

impl From<&str> for ServerId {
    fn from(s: &str) -> Self {
        Self::from(s.to_owned())
    }
}

impl FromStr for ServerId {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self::from(s))
    }
}

// ── Position ─────────────────────────────────────────────────────────

/// A point on the floor plan. `y` is height; the plan itself is x/z.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Position {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl Position {
    pub const fn new(x: f64, y: f64, z: f64) -> Self {
        Self { x, y, z }
    }
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({:.2}, {:.2}, {:.2})", self.x, self.y, self.z)
    }
}

// ── Outbound ─────────────────────────────────────────────────────────

/// Every message the client sends to the backend.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Outbound {
    /// Ask the backend to stream its full state as `*_added` messages.
    GetState,
    AddAp {
        x: f64,
        y: f64,
        z: f64,
    },
    AddClient {
        x: f64,
        y: f64,
        z: f64,
    },
    RemoveAp {
        id: ServerId,
    },
    RemoveClient {
        id: ServerId,
    },
    UpdateApPosition {
        id: ServerId,
        x: f64,
        y: f64,
        z: f64,
    },
    UpdateClientPosition {
        id: ServerId,
        x: f64,
        y: f64,
        z: f64,
    },
    ClearAll,
    /// Telemetry period in milliseconds.
    SetInterval {
        interval: u32,
    },
}

impl Outbound {
    /// Creation request for a new entity of `kind`. Carries no identity.
    pub fn add(kind: EntityKind, at: Position) -> Self {
        let Position { x, y, z } = at;
        match kind {
            EntityKind::Ap => Self::AddAp { x, y, z },
            EntityKind::Client => Self::AddClient { x, y, z },
        }
    }

    pub fn remove(kind: EntityKind, id: ServerId) -> Self {
        match kind {
            EntityKind::Ap => Self::RemoveAp { id },
            EntityKind::Client => Self::RemoveClient { id },
        }
    }

    pub fn update_position(kind: EntityKind, id: ServerId, at: Position) -> Self {
        let Position { x, y, z } = at;
        match kind {
            EntityKind::Ap => Self::UpdateApPosition { id, x, y, z },
            EntityKind::Client => Self::UpdateClientPosition { id, x, y, z },
        }
    }

    /// The `type` tag this message serializes with.
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::GetState => "get_state",
            Self::AddAp { .. } => "add_ap",
            Self::AddClient { .. } => "add_client",
            Self::RemoveAp { .. } => "remove_ap",
            Self::RemoveClient { .. } => "remove_client",
            Self::UpdateApPosition { .. } => "update_ap_position",
            Self::UpdateClientPosition { .. } => "update_client_position",
            Self::ClearAll => "clear_all",
            Self::SetInterval { .. } => "set_interval",
        }
    }

    /// Serialize to a text frame.
    pub fn encode(&self) -> Result<String, Error> {
        serde_json::to_string(self).map_err(|e| Error::Encode(e.to_string()))
    }
}

// ── Inbound ──────────────────────────────────────────────────────────

/// A decoded inbound frame: its `type` tag plus the untouched JSON body
/// (which still contains the `type` field).
#[derive(Debug, Clone, PartialEq)]
pub struct InboundFrame {
    kind: String,
    body: serde_json::Value,
}

impl InboundFrame {
    /// Decode a text frame. Fails on malformed JSON or a missing/non-string
    /// `type` field; never fails on an unknown type.
    pub fn decode(text: &str) -> Result<Self, Error> {
        let body: serde_json::Value =
            serde_json::from_str(text).map_err(|e| Error::Decode {
                message: e.to_string(),
                body: text.to_owned(),
            })?;

        let Some(kind) = body.get("type").and_then(serde_json::Value::as_str) else {
            return Err(Error::Decode {
                message: "frame has no string `type` field".into(),
                body: text.to_owned(),
            });
        };
        let kind = kind.to_owned();

        Ok(Self { kind, body })
    }

    pub fn kind(&self) -> &str {
        &self.kind
    }

    pub fn body(&self) -> &serde_json::Value {
        &self.body
    }

    /// Deserialize the body into a typed payload.
    pub fn parse<T: DeserializeOwned>(&self) -> Result<T, Error> {
        T::deserialize(&self.body).map_err(|e| Error::Decode {
            message: e.to_string(),
            body: self.body.to_string(),
        })
    }
}

/// `ap_added` / `client_added`.
///
/// Without coordinates it acknowledges a creation request; with all three
/// coordinates it is a full-state entry.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct EntityAdded {
    pub id: ServerId,
    pub x: Option<f64>,
    pub y: Option<f64>,
    pub z: Option<f64>,
}

impl EntityAdded {
    /// The carried position, only when every coordinate is present.
    pub fn position(&self) -> Option<Position> {
        match (self.x, self.y, self.z) {
            (Some(x), Some(y), Some(z)) => Some(Position::new(x, y, z)),
            _ => None,
        }
    }
}

/// `ap_removed` / `client_removed`.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct EntityRemoved {
    pub id: ServerId,
}

/// `rssi_update`: signal strength of one client as seen by one AP.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct RssiUpdate {
    #[serde(alias = "client")]
    pub client_id: ServerId,
    #[serde(alias = "ap", alias = "access_point_id")]
    pub ap_id: ServerId,
    #[serde(alias = "signal_strength")]
    pub rssi: f64,
    #[serde(default)]
    pub client_position: Option<Position>,
}

/// `position_update`.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct PositionUpdate {
    pub client_id: ServerId,
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl PositionUpdate {
    pub fn position(&self) -> Position {
        Position::new(self.x, self.y, self.z)
    }
}

// ── Tests ────────────────────────────────────────────────────────────
