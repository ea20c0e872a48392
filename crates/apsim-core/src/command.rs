// ── Intent API ──
//
// Every operator action flows through a unified `Intent` enum. The event
// loop applies each one to the reconciler and answers on a oneshot.

use crate::error::CoreError;
use crate::model::{ClientSubtype, EntityHandle, Position};
use crate::reconcile::Removal;

/// An intent envelope sent through the intent channel.
/// Contains the intent and a oneshot response channel.
pub(crate) struct IntentEnvelope {
    pub intent: Intent,
    pub response_tx: tokio::sync::oneshot::Sender<Result<IntentResult, CoreError>>,
}

/// Everything the operator can ask for.
#[derive(Debug, Clone, PartialEq)]
pub enum Intent {
    PlaceAp {
        position: Position,
    },
    PlaceClient {
        subtype: ClientSubtype,
        position: Position,
    },
    /// Drag end: the entity's final position.
    Move {
        handle: EntityHandle,
        position: Position,
    },
    Remove {
        handle: EntityHandle,
    },
    ClearAll,
    /// Telemetry period in milliseconds.
    SetInterval {
        millis: u32,
    },
}

/// Result of applying an intent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IntentResult {
    Ok,
    Placed(EntityHandle),
    Removal(Removal),
}
