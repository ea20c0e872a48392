// ── Telemetry router ──
//
// Every routed inbound message is forwarded to a log sink. `rssi_update`
// additionally moves the reported client; `position_update` does not.

use std::sync::{Arc, Mutex, PoisonError};

use apsim_api::{InboundFrame, RssiUpdate};
use chrono::{DateTime, Utc};
use serde::Serialize;
use serde::de::DeserializeOwned;
use tokio::sync::broadcast;

use crate::model::{Entity, EntityKind};
use crate::store::EntityStore;

// ── TelemetryRecord ──────────────────────────────────────────────

/// One inbound message as seen by the log panel.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TelemetryRecord {
    pub received_at: DateTime<Utc>,
    /// The frame's `type`.
    pub kind: String,
    /// The full frame body.
    pub payload: serde_json::Value,
}

impl TelemetryRecord {
    pub fn from_frame(frame: &InboundFrame) -> Self {
        Self {
            received_at: Utc::now(),
            kind: frame.kind().to_owned(),
            payload: frame.body().clone(),
        }
    }

    /// Deserialize the payload into a typed message.
    pub fn parse<T: DeserializeOwned>(&self) -> Option<T> {
        T::deserialize(&self.payload).ok()
    }
}

// ── LogSink ──────────────────────────────────────────────────────

/// Receives every inbound message the router forwards.
pub trait LogSink: Send {
    fn record(&mut self, record: TelemetryRecord);
}

/// Fans records out to any number of UI consumers.
///
/// Slow consumers lag rather than block the event loop.
#[derive(Debug, Clone)]
pub struct BroadcastLog {
    tx: broadcast::Sender<Arc<TelemetryRecord>>,
}

impl BroadcastLog {
    pub fn new(tx: broadcast::Sender<Arc<TelemetryRecord>>) -> Self {
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Arc<TelemetryRecord>> {
        self.tx.subscribe()
    }
}

impl LogSink for BroadcastLog {
    fn record(&mut self, record: TelemetryRecord) {
        // No subscribers is fine.
        let _ = self.tx.send(Arc::new(record));
    }
}

/// Keeps every record in memory. Clones share the same buffer.
#[derive(Debug, Clone, Default)]
pub struct MemoryLog {
    records: Arc<Mutex<Vec<TelemetryRecord>>>,
}

impl MemoryLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn records(&self) -> Vec<TelemetryRecord> {
        self.records
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// `type` of every record, in arrival order.
    pub fn kinds(&self) -> Vec<String> {
        self.records
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .map(|r| r.kind.clone())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.records
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl LogSink for MemoryLog {
    fn record(&mut self, record: TelemetryRecord) {
        self.records
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(record);
    }
}

// ── Routing ──────────────────────────────────────────────────────

/// Forward one frame to the sink.
pub(crate) fn forward(frame: &InboundFrame, sink: &mut dyn LogSink) {
    sink.record(TelemetryRecord::from_frame(frame));
}

/// Move the client named by an `rssi_update`, if it carries a position
/// and the client is committed. Returns the moved entity.
pub(crate) fn apply_rssi(update: &RssiUpdate, store: &mut EntityStore) -> Option<Arc<Entity>> {
    let position = update.client_position?;
    let Some(client) = store.find_committed(EntityKind::Client, &update.client_id) else {
        tracing::trace!(client = %update.client_id, "rssi for unknown client");
        return None;
    };
    store.set_position(client.handle(), position).ok()
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::model::{ClientSubtype, EntityClass, Position, ServerId};

    fn rssi(json: &str) -> RssiUpdate {
        InboundFrame::decode(json).unwrap().parse().unwrap()
    }

    #[test]
    fn rssi_moves_committed_client() {
        let mut store = EntityStore::new();
        let handle = store
            .insert_committed(
                EntityClass::Client(ClientSubtype::Mobile),
                ServerId::from(2),
                Position::default(),
            )
            .unwrap();

        let moved = apply_rssi(
            &rssi(r#"{"type":"rssi_update","client_id":2,"ap_id":1,"rssi":-40,
                     "client_position":{"x":3.0,"y":0.0,"z":4.0}}"#),
            &mut store,
        );

        assert_eq!(moved.unwrap().handle(), handle);
        assert_eq!(store.get(handle).unwrap().position(), Position::new(3.0, 0.0, 4.0));
    }

    #[test]
    fn rssi_without_position_changes_nothing() {
        let mut store = EntityStore::new();
        store
            .insert_committed(
                EntityClass::Client(ClientSubtype::Mobile),
                ServerId::from(2),
                Position::default(),
            )
            .unwrap();
        let version = store.version();

        let moved = apply_rssi(
            &rssi(r#"{"type":"rssi_update","client_id":2,"ap_id":1,"rssi":-40}"#),
            &mut store,
        );

        assert!(moved.is_none());
        assert_eq!(store.version(), version);
    }

    #[test]
    fn rssi_ignores_pending_clients() {
        let mut store = EntityStore::new();
        store.insert_pending(EntityClass::Client(ClientSubtype::Tag), Position::default());

        let moved = apply_rssi(
            &rssi(r#"{"type":"rssi_update","client_id":1,"ap_id":1,"rssi":-40,
                     "client_position":{"x":3.0,"y":0.0,"z":4.0}}"#),
            &mut store,
        );
        assert!(moved.is_none());
    }

    #[test]
    fn memory_log_clones_share_records() {
        let log = MemoryLog::new();
        let mut sink = log.clone();
        let frame = InboundFrame::decode(r#"{"type":"position_update","client_id":1}"#).unwrap();

        forward(&frame, &mut sink);

        assert_eq!(log.kinds(), vec!["position_update"]);
        assert_eq!(log.records()[0].payload["client_id"], 1);
    }

    #[tokio::test]
    async fn broadcast_log_fans_out() {
        let (tx, _) = broadcast::channel(8);
        let mut log = BroadcastLog::new(tx);
        let mut a = log.subscribe();
        let mut b = log.subscribe();

        let frame = InboundFrame::decode(r#"{"type":"ap_removed","id":4}"#).unwrap();
        forward(&frame, &mut log);

        assert_eq!(a.recv().await.unwrap().kind, "ap_removed");
        let record = b.recv().await.unwrap();
        assert_eq!(record.parse::<apsim_api::EntityRemoved>().unwrap().id, ServerId::from(4));
    }
}
