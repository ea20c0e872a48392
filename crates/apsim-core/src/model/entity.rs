// ── Entity ──
//
// One AP or client on the floor plan. Entities are stored behind `Arc`
// and replaced on mutation, so snapshots handed to consumers never change
// underneath them.

use std::fmt;

use serde::{Deserialize, Serialize};

use super::{EntityHandle, EntityKind, Identity, Position, ServerId};

/// Client flavor. Display only; the backend does not know about it.
#[derive(
    Debug,
    Clone,
    Copy,
    Default,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    strum::Display,
    strum::EnumString,
    strum::VariantNames,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum ClientSubtype {
    #[default]
    Mobile,
    Beacon,
    Tag,
}

/// What an entity is: an AP, or a client of some subtype.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "subtype", rename_all = "lowercase")]
pub enum EntityClass {
    Ap,
    Client(ClientSubtype),
}

impl EntityClass {
    pub fn kind(self) -> EntityKind {
        match self {
            Self::Ap => EntityKind::Ap,
            Self::Client(_) => EntityKind::Client,
        }
    }

    /// Class used when the backend reports an entity we never placed.
    pub fn default_for(kind: EntityKind) -> Self {
        match kind {
            EntityKind::Ap => Self::Ap,
            EntityKind::Client => Self::Client(ClientSubtype::default()),
        }
    }

    pub fn subtype(self) -> Option<ClientSubtype> {
        match self {
            Self::Client(subtype) => Some(subtype),
            Self::Ap => None,
        }
    }
}

impl fmt::Display for EntityClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Ap => f.write_str("ap"),
            Self::Client(subtype) => write!(f, "client ({subtype})"),
        }
    }
}

/// A placed entity.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Entity {
    handle: EntityHandle,
    class: EntityClass,
    identity: Identity,
    position: Position,
}

impl Entity {
    pub(crate) fn new(
        handle: EntityHandle,
        class: EntityClass,
        identity: Identity,
        position: Position,
    ) -> Self {
        Self {
            handle,
            class,
            identity,
            position,
        }
    }

    pub fn handle(&self) -> EntityHandle {
        self.handle
    }

    pub fn class(&self) -> EntityClass {
        self.class
    }

    pub fn kind(&self) -> EntityKind {
        self.class.kind()
    }

    pub fn identity(&self) -> &Identity {
        &self.identity
    }

    pub fn position(&self) -> Position {
        self.position
    }

    pub fn is_pending(&self) -> bool {
        self.identity.is_pending()
    }

    pub fn server_id(&self) -> Option<&ServerId> {
        self.identity.server_id()
    }

    pub(crate) fn set_identity(&mut self, identity: Identity) {
        self.identity = identity;
    }

    pub(crate) fn set_position(&mut self, position: Position) {
        self.position = position;
    }
}

/// Display label attached to a committed entity (`AP_7`, `Client_3`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct Label {
    text: String,
}

impl Label {
    pub fn for_committed(kind: EntityKind, id: &ServerId) -> Self {
        Self {
            text: format!("{}_{id}", kind.label_prefix()),
        }
    }

    pub fn text(&self) -> &str {
        &self.text
    }
}

impl fmt::Display for Label {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.text)
    }
}
