// ── Identity types ──
//
// An entity is addressed two ways: by its `EntityHandle`, which never
// changes, and by its `Identity`, which starts as a local placeholder and
// is replaced once by the backend-issued id.

use std::fmt;

use serde::{Deserialize, Serialize};

use super::ServerId;

// ── EntityHandle ────────────────────────────────────────────────────

/// Stable per-entity key, allocated by the store and never reused within
/// a session. Survives promotion, so labels and the render layer key on it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EntityHandle(u64);

impl EntityHandle {
    pub(crate) const fn new(raw: u64) -> Self {
        Self(raw)
    }

    pub const fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for EntityHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

impl std::str::FromStr for EntityHandle {
    type Err = std::num::ParseIntError;

    /// Accepts `7` and `#7`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.strip_prefix('#').unwrap_or(s).parse().map(Self)
    }
}

// ── LocalId ─────────────────────────────────────────────────────────

/// Placeholder id for an entity the backend has not acknowledged yet.
/// Monotonically increasing per kind, starting at 1.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LocalId(u64);

impl LocalId {
    pub(crate) const fn new(raw: u64) -> Self {
        Self(raw)
    }

    pub const fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for LocalId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "local-{}", self.0)
    }
}

// ── Identity ────────────────────────────────────────────────────────

/// Pending until the backend assigns an id; committed afterwards.
/// The only legal transition is `Pending -> Committed`, once.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "state", content = "id", rename_all = "snake_case")]
pub enum Identity {
    Pending(LocalId),
    Committed(ServerId),
}

impl Identity {
    pub fn is_pending(&self) -> bool {
        matches!(self, Self::Pending(_))
    }

    pub fn is_committed(&self) -> bool {
        matches!(self, Self::Committed(_))
    }

    pub fn server_id(&self) -> Option<&ServerId> {
        match self {
            Self::Committed(id) => Some(id),
            Self::Pending(_) => None,
        }
    }
}

impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pending(local) => write!(f, "{local}"),
            Self::Committed(id) => write!(f, "{id}"),
        }
    }
}
