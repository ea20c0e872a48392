// apsim-core: Entity reconciliation between operator intents and the simulator backend.

pub mod channel;
pub mod command;
pub mod config;
pub mod controller;
pub mod error;
pub mod model;
pub mod reconcile;
pub mod store;
pub mod stream;
pub mod telemetry;

// ── Primary re-exports ──────────────────────────────────────────────
pub use channel::{Channel, ConnectionState, Flow, SubscriptionId};
pub use command::{Intent, IntentResult};
pub use config::SimulatorConfig;
pub use controller::Simulator;
pub use error::CoreError;
pub use reconcile::{EntityEvent, Reconciler, Removal};
pub use store::EntityStore;
pub use stream::{EntityFilter, EntityStream};
pub use telemetry::{BroadcastLog, LogSink, MemoryLog, TelemetryRecord};

pub use model::{
    ClientSubtype, Entity, EntityClass, EntityHandle, EntityKind, Identity, Label, LocalId,
    Position, ServerId,
};

// Telemetry payloads, for consumers decoding `TelemetryRecord`s.
pub use apsim_api::{PositionUpdate, RssiUpdate};
