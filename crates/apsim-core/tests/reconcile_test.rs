#![allow(clippy::unwrap_used)]

// Reconciliation behavior driven through the channel exactly as the event
// loop would: on_open with an outbound queue, then text frames.

use apsim_core::{
    ClientSubtype, EntityClass, EntityEvent, EntityKind, Flow, Identity, LogSink, MemoryLog,
    Position, Reconciler, Removal, ServerId, SimulatorConfig, TelemetryRecord,
};
use pretty_assertions::assert_eq;
use serde_json::{Value, json};
use tokio::sync::mpsc;
use url::Url;

struct Harness {
    sim: Reconciler,
    log: MemoryLog,
    wire: mpsc::UnboundedReceiver<String>,
}

impl Harness {
    fn new() -> Self {
        Self::with_config(SimulatorConfig::new(
            Url::parse("ws://localhost:8000/ws").unwrap(),
        ))
    }

    fn with_config(config: SimulatorConfig) -> Self {
        let log = MemoryLog::new();
        let mut sim = Reconciler::new(&config, Box::new(log.clone()));
        let (tx, wire) = mpsc::unbounded_channel();
        sim.begin_connect();
        sim.on_open(tx);
        let mut harness = Self { sim, log, wire };
        assert_eq!(harness.sent(), vec![json!({"type": "get_state"})]);
        harness
    }

    /// Everything written to the socket since the last call.
    fn sent(&mut self) -> Vec<Value> {
        let mut out = Vec::new();
        while let Ok(text) = self.wire.try_recv() {
            out.push(serde_json::from_str(&text).unwrap());
        }
        out
    }

    fn recv(&mut self, frame: Value) -> usize {
        self.sim.on_frame(&frame.to_string())
    }

    fn identities(&self, kind: EntityKind) -> Vec<Identity> {
        self.sim
            .store()
            .iter(kind)
            .map(|e| e.identity().clone())
            .collect()
    }
}

fn committed(id: i64) -> Identity {
    Identity::Committed(ServerId::from(id))
}

const ORIGIN: Position = Position::new(0.0, 0.0, 0.0);

// ── Creation ─────────────────────────────────────────────────────

#[test]
fn placed_entity_is_pending_before_any_reply() {
    let mut h = Harness::new();
    let handle = h.sim.place_ap(Position::new(1.0, 0.0, 2.5));

    let entity = h.sim.store().get(handle).unwrap();
    assert!(entity.is_pending());
    assert_eq!(entity.position(), Position::new(1.0, 0.0, 2.5));
    assert_eq!(
        h.sent(),
        vec![json!({"type": "add_ap", "x": 1.0, "y": 0.0, "z": 2.5})]
    );
}

#[test]
fn ack_promotes_earliest_pending_ap_only() {
    let mut h = Harness::new();
    let first = h.sim.place_ap(ORIGIN);
    let second = h.sim.place_ap(Position::new(3.0, 0.0, 3.0));

    h.recv(json!({"type": "ap_added", "id": 7}));

    let store = h.sim.store();
    assert_eq!(store.get(first).unwrap().identity(), &committed(7));
    assert!(store.get(second).unwrap().is_pending());
    assert_eq!(store.label(first).unwrap().text(), "AP_7");
    assert!(store.label(second).is_none());
}

#[test]
fn full_state_add_never_consumes_placeholder() {
    let mut h = Harness::new();
    let pending = h.sim.place_ap(ORIGIN);

    h.recv(json!({"type": "ap_added", "id": 3, "x": 1, "y": 0, "z": 2}));

    let store = h.sim.store();
    assert_eq!(store.len(EntityKind::Ap), 2);
    assert!(store.get(pending).unwrap().is_pending());
    let synced = store.find_committed(EntityKind::Ap, &ServerId::from(3)).unwrap();
    assert_eq!(synced.position(), Position::new(1.0, 0.0, 2.0));
    assert_ne!(synced.handle(), pending);
}

#[test]
fn two_clients_promote_in_creation_order() {
    let mut h = Harness::new();
    let first = h.sim.place_client(ClientSubtype::Mobile, ORIGIN);
    let second = h.sim.place_client(ClientSubtype::Beacon, ORIGIN);
    assert_eq!(h.sim.store().len(EntityKind::Client), 2);

    h.recv(json!({"type": "client_added", "id": 50}));

    let store = h.sim.store();
    assert_eq!(store.get(first).unwrap().identity(), &committed(50));
    assert!(store.get(second).unwrap().is_pending());
}

#[test]
fn ack_without_pending_entity_is_dropped() {
    let mut h = Harness::new();
    h.recv(json!({"type": "client_added", "id": 9}));
    assert!(h.sim.store().is_empty());
}

#[test]
fn ack_for_already_committed_id_changes_nothing() {
    let mut h = Harness::new();
    h.recv(json!({"type": "ap_added", "id": 4, "x": 0, "y": 0, "z": 0}));
    let pending = h.sim.place_ap(ORIGIN);
    let version = h.sim.store().version();

    h.recv(json!({"type": "ap_added", "id": 4}));

    assert!(h.sim.store().get(pending).unwrap().is_pending());
    assert_eq!(h.sim.store().version(), version);
}

#[test]
fn resync_does_not_duplicate_committed_entities() {
    let mut h = Harness::new();
    let frame = json!({"type": "ap_added", "id": 3, "x": 1, "y": 0, "z": 2});
    h.recv(frame.clone());
    h.recv(frame);

    assert_eq!(h.identities(EntityKind::Ap), vec![committed(3)]);
}

#[test]
fn kinds_have_separate_namespaces() {
    let mut h = Harness::new();
    h.recv(json!({"type": "ap_added", "id": 1, "x": 0, "y": 0, "z": 0}));
    h.recv(json!({"type": "client_added", "id": 1, "x": 0, "y": 0, "z": 0}));

    assert_eq!(h.identities(EntityKind::Ap), vec![committed(1)]);
    assert_eq!(h.identities(EntityKind::Client), vec![committed(1)]);
}

// ── Removal ──────────────────────────────────────────────────────

#[test]
fn removing_pending_entity_sends_nothing() {
    let mut h = Harness::new();
    let handle = h.sim.place_client(ClientSubtype::Tag, ORIGIN);
    h.sent();

    assert_eq!(h.sim.remove(handle).unwrap(), Removal::Immediate);
    assert!(h.sim.store().get(handle).is_none());
    assert!(h.sent().is_empty());
}

#[test]
fn committed_removal_waits_for_confirmation() {
    let mut h = Harness::new();
    h.recv(json!({"type": "ap_added", "id": 5, "x": 0, "y": 0, "z": 0}));
    let handle = h
        .sim
        .store()
        .find_committed(EntityKind::Ap, &ServerId::from(5))
        .unwrap()
        .handle();

    assert_eq!(h.sim.remove(handle).unwrap(), Removal::Requested);
    assert_eq!(h.sent(), vec![json!({"type": "remove_ap", "id": 5})]);
    assert!(h.sim.store().get(handle).is_some());

    // Confirmation for some other id leaves it alone.
    h.recv(json!({"type": "ap_removed", "id": 6}));
    assert!(h.sim.store().get(handle).is_some());

    h.recv(json!({"type": "ap_removed", "id": 5}));
    assert!(h.sim.store().get(handle).is_none());
    assert!(h.sim.store().label(handle).is_none());
    assert_eq!(h.sim.pending_removals(), 0);
}

#[test]
fn concurrent_removals_of_one_kind_both_complete() {
    let mut h = Harness::new();
    h.recv(json!({"type": "client_added", "id": 1, "x": 0, "y": 0, "z": 0}));
    h.recv(json!({"type": "client_added", "id": 2, "x": 0, "y": 0, "z": 0}));
    let handles: Vec<_> = h
        .sim
        .store()
        .iter(EntityKind::Client)
        .map(|e| e.handle())
        .collect();

    for handle in &handles {
        h.sim.remove(*handle).unwrap();
    }
    assert_eq!(h.sim.pending_removals(), 2);

    h.recv(json!({"type": "client_removed", "id": 2}));
    assert_eq!(h.identities(EntityKind::Client), vec![committed(1)]);

    h.recv(json!({"type": "client_removed", "id": 1}));
    assert!(h.sim.store().is_empty());
    assert_eq!(h.sim.pending_removals(), 0);
}

#[test]
fn repeated_remove_resends_without_second_listener() {
    let mut h = Harness::new();
    h.recv(json!({"type": "ap_added", "id": 8, "x": 0, "y": 0, "z": 0}));
    let handle = h.sim.store().iter(EntityKind::Ap).next().unwrap().handle();
    let before = h.sim.channel().subscribers("ap_removed");

    assert_eq!(h.sim.remove(handle).unwrap(), Removal::Requested);
    assert_eq!(h.sim.remove(handle).unwrap(), Removal::AlreadyRequested);

    assert_eq!(h.sent().len(), 2);
    assert_eq!(h.sim.channel().subscribers("ap_removed"), before + 1);

    h.recv(json!({"type": "ap_removed", "id": 8}));
    assert_eq!(h.sim.channel().subscribers("ap_removed"), before);
}

#[test]
fn retried_remove_recovers_after_removal_route_was_replaced() {
    let mut h = Harness::new();
    h.recv(json!({"type": "client_added", "id": 5, "x": 1, "y": 1, "z": 1}));
    let handle = h.sim.store().iter(EntityKind::Client).next().unwrap().handle();

    assert_eq!(h.sim.remove(handle).unwrap(), Removal::Requested);
    h.sim
        .channel_mut()
        .on_message("client_removed", |_, _| Flow::Keep);
    h.recv(json!({"type": "client_removed", "id": 5}));
    assert!(h.sim.store().get(handle).is_some());

    // The old listener is gone, so the retry must register a new one.
    assert_eq!(h.sim.remove(handle).unwrap(), Removal::Requested);
    assert_eq!(h.sim.channel().subscribers("client_removed"), 2);

    h.recv(json!({"type": "client_removed", "id": 5}));
    assert!(h.sim.store().get(handle).is_none());
    assert_eq!(h.sim.pending_removals(), 0);
}

#[test]
fn removing_unknown_handle_fails() {
    let mut h = Harness::new();
    let handle = h.sim.place_ap(ORIGIN);
    h.sim.remove(handle).unwrap();
    assert!(h.sim.remove(handle).is_err());
}

// ── Drag end ─────────────────────────────────────────────────────

#[test]
fn moving_pending_entity_is_local_only() {
    let mut h = Harness::new();
    let handle = h.sim.place_ap(ORIGIN);
    h.sent();

    h.sim.moved(handle, Position::new(2.0, 0.0, 2.0)).unwrap();

    assert_eq!(
        h.sim.store().get(handle).unwrap().position(),
        Position::new(2.0, 0.0, 2.0)
    );
    assert!(h.sent().is_empty());
}

#[test]
fn moving_committed_entity_syncs_position() {
    let mut h = Harness::new();
    let handle = h.sim.place_client(ClientSubtype::Mobile, ORIGIN);
    h.recv(json!({"type": "client_added", "id": 12}));
    h.sent();

    h.sim.moved(handle, Position::new(-1.5, 0.0, 4.0)).unwrap();

    assert_eq!(
        h.sent(),
        vec![json!({"type": "update_client_position", "id": 12, "x": -1.5, "y": 0.0, "z": 4.0})]
    );
}

// ── clear_all and telemetry ──────────────────────────────────────

#[test]
fn clear_all_empties_store_and_sends_once() {
    let mut h = Harness::new();
    h.recv(json!({"type": "ap_added", "id": 1, "x": 0, "y": 0, "z": 0}));
    h.sim.place_client(ClientSubtype::Mobile, ORIGIN);
    h.sim.place_client(ClientSubtype::Beacon, ORIGIN);
    h.sent();

    h.sim.clear_all();

    assert_eq!(h.sim.store().len(EntityKind::Ap), 0);
    assert_eq!(h.sim.store().len(EntityKind::Client), 0);
    assert!(h.sim.store().labels_snapshot().is_empty());
    assert_eq!(h.sent(), vec![json!({"type": "clear_all"})]);
}

#[test]
fn clear_all_drops_pending_removal_listeners() {
    let mut h = Harness::new();
    h.recv(json!({"type": "ap_added", "id": 1, "x": 0, "y": 0, "z": 0}));
    let handle = h.sim.store().iter(EntityKind::Ap).next().unwrap().handle();
    let before = h.sim.channel().subscribers("ap_removed");
    h.sim.remove(handle).unwrap();

    h.sim.clear_all();

    assert_eq!(h.sim.pending_removals(), 0);
    assert_eq!(h.sim.channel().subscribers("ap_removed"), before);
}

#[test]
fn rssi_update_moves_committed_client_and_is_logged() {
    let mut h = Harness::new();
    h.recv(json!({"type": "client_added", "id": 2, "x": 0, "y": 0, "z": 0}));

    h.recv(json!({
        "type": "rssi_update", "client_id": 2, "ap_id": 1, "rssi": -55.0,
        "client_position": {"x": 4.0, "y": 0.0, "z": -2.0}
    }));

    let client = h
        .sim
        .store()
        .find_committed(EntityKind::Client, &ServerId::from(2))
        .unwrap();
    assert_eq!(client.position(), Position::new(4.0, 0.0, -2.0));
    assert_eq!(h.log.kinds(), vec!["client_added", "rssi_update"]);
}

#[test]
fn position_update_is_logged_but_not_applied() {
    let mut h = Harness::new();
    h.recv(json!({"type": "client_added", "id": 2, "x": 0, "y": 0, "z": 0}));

    h.recv(json!({"type": "position_update", "client_id": 2, "x": 9.0, "y": 0.0, "z": 9.0}));

    let client = h
        .sim
        .store()
        .find_committed(EntityKind::Client, &ServerId::from(2))
        .unwrap();
    assert_eq!(client.position(), ORIGIN);
    assert_eq!(h.log.kinds().last().unwrap(), "position_update");
}

#[test]
fn rssi_route_returns_after_clear_all_once_an_entity_exists() {
    let mut h = Harness::new();
    h.recv(json!({"type": "client_added", "id": 2, "x": 0, "y": 0, "z": 0}));
    h.sim.clear_all();
    assert!(!h.sim.has_telemetry_route());

    let rssi = json!({"type": "rssi_update", "client_id": 2, "ap_id": 1, "rssi": -60});
    assert_eq!(h.recv(rssi.clone()), 0);
    assert!(!h.log.kinds().contains(&"rssi_update".to_owned()));

    h.sim.place_ap(ORIGIN);
    assert!(h.sim.has_telemetry_route());
    assert_eq!(h.recv(rssi), 1);
    assert_eq!(h.log.kinds().last().unwrap(), "rssi_update");
}

#[test]
fn backend_sync_reinstalls_rssi_route() {
    let mut h = Harness::new();
    h.sim.clear_all();
    h.recv(json!({"type": "client_added", "id": 3, "x": 0, "y": 0, "z": 0}));
    assert!(h.sim.has_telemetry_route());
}

#[test]
fn unrouted_types_are_dropped_silently() {
    let mut h = Harness::new();
    assert_eq!(h.recv(json!({"type": "interval_updated", "interval": 2})), 0);
    assert_eq!(h.recv(json!({"type": "error", "message": "nope"})), 0);
    assert!(h.log.is_empty());
}

#[test]
fn malformed_frames_do_not_stop_dispatch() {
    let mut h = Harness::new();
    assert_eq!(h.sim.on_frame("{{{"), 0);
    assert_eq!(h.sim.on_frame(r#"{"no_type": true}"#), 0);
    h.recv(json!({"type": "ap_added", "id": "x"}));
    h.recv(json!({"type": "ap_added", "id": 3, "x": 1, "y": 0, "z": 2}));

    assert_eq!(h.identities(EntityKind::Ap), vec![committed(3)]);
}

// ── Connection ───────────────────────────────────────────────────

#[test]
fn send_while_disconnected_is_a_silent_noop() {
    let mut h = Harness::new();
    h.sim.on_close();

    let handle = h.sim.place_ap(ORIGIN);

    assert!(h.sim.store().get(handle).unwrap().is_pending());
    assert!(h.sent().is_empty());
    assert!(!h.sim.set_interval(1000));
}

#[test]
fn configured_interval_is_sent_on_every_open() {
    let config = SimulatorConfig::new(Url::parse("ws://localhost:8000/ws").unwrap())
        .with_update_interval(Some(2500));
    let log = MemoryLog::new();
    let mut sim = Reconciler::new(&config, Box::new(log));

    for _ in 0..2 {
        let (tx, mut rx) = mpsc::unbounded_channel();
        sim.begin_connect();
        sim.on_open(tx);
        assert_eq!(rx.try_recv().unwrap(), r#"{"type":"get_state"}"#);
        assert_eq!(rx.try_recv().unwrap(), r#"{"type":"set_interval","interval":2500}"#);
        sim.on_close();
    }
}

#[test]
fn second_on_message_for_client_removed_replaces_the_first() {
    let mut h = Harness::new();
    let first = MemoryLog::new();
    let second = MemoryLog::new();

    let mut sink = first.clone();
    h.sim.channel_mut().on_message("client_removed", move |frame, _| {
        sink.record(TelemetryRecord::from_frame(frame));
        Flow::Keep
    });
    let mut sink = second.clone();
    h.sim.channel_mut().on_message("client_removed", move |frame, _| {
        sink.record(TelemetryRecord::from_frame(frame));
        Flow::Keep
    });

    h.recv(json!({"type": "client_removed", "id": 1}));
    h.recv(json!({"type": "client_removed", "id": 2}));

    assert!(first.is_empty());
    assert_eq!(second.len(), 2);
}

// ── Events ───────────────────────────────────────────────────────

#[test]
fn lifecycle_events_are_broadcast() {
    let mut h = Harness::new();
    let mut events = h.sim.subscribe_events();

    let handle = h.sim.place_ap(ORIGIN);
    h.recv(json!({"type": "ap_added", "id": 7}));
    h.sim.clear_all();

    assert_eq!(
        events.try_recv().unwrap(),
        EntityEvent::Placed {
            handle,
            class: EntityClass::Ap,
            position: ORIGIN
        }
    );
    assert_eq!(
        events.try_recv().unwrap(),
        EntityEvent::Committed {
            handle,
            kind: EntityKind::Ap,
            id: ServerId::from(7)
        }
    );
    assert_eq!(events.try_recv().unwrap(), EntityEvent::Cleared { removed: 1 });
}
