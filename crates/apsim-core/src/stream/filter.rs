// ── Filter predicates for entity streams ──
//
// Used by consumers to narrow snapshots without touching the store.

use crate::model::{ClientSubtype, Entity};

/// Filter predicate for entity collections.
pub enum EntityFilter {
    All,
    Pending,
    Committed,
    Subtype(ClientSubtype),
    Custom(Box<dyn Fn(&Entity) -> bool + Send + Sync>),
}

impl EntityFilter {
    pub fn matches(&self, entity: &Entity) -> bool {
        match self {
            Self::All => true,
            Self::Pending => entity.is_pending(),
            Self::Committed => !entity.is_pending(),
            Self::Subtype(subtype) => entity.class().subtype() == Some(*subtype),
            Self::Custom(f) => f(entity),
        }
    }
}

impl std::fmt::Debug for EntityFilter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::All => f.write_str("All"),
            Self::Pending => f.write_str("Pending"),
            Self::Committed => f.write_str("Committed"),
            Self::Subtype(s) => f.debug_tuple("Subtype").field(s).finish(),
            Self::Custom(_) => f.write_str("Custom(..)"),
        }
    }
}
