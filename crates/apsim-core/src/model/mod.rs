// ── Domain model ──
//
// Wire-level primitives (kind, position, server id) come from apsim-api;
// everything that only exists client-side lives here.

mod entity;
mod identity;

pub use apsim_api::{EntityKind, Position, ServerId};
pub use entity::{ClientSubtype, Entity, EntityClass, Label};
pub use identity::{EntityHandle, Identity, LocalId};
