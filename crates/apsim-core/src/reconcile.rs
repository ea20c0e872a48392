// ── Reconciliation engine ──
//
// Applies operator intents to the store immediately, then folds backend
// replies into that optimistic state:
//
// - create: insert `Pending`, send `add_*`; a positionless `*_added`
//   promotes the earliest pending entity of that kind (FIFO).
// - full state: a `*_added` with coordinates always creates a new
//   committed entity and never consumes a placeholder.
// - remove: pending entities go at once; committed ones stay until their
//   own `*_removed{id}` arrives.
//
// FIFO matching assumes the backend answers creates in order, or that at
// most one create per kind is outstanding. The protocol carries no
// correlation token to do better.

use std::collections::HashMap;
use std::time::Duration;

use apsim_api::protocol::message_type;
use apsim_api::{EntityAdded, EntityRemoved, InboundFrame, Outbound, RssiUpdate};
use tokio::sync::{broadcast, mpsc, watch};
use tracing::{debug, info, warn};

use crate::channel::{Channel, ConnectionState, Flow, SubscriptionId};
use crate::command::{Intent, IntentResult};
use crate::config::SimulatorConfig;
use crate::error::CoreError;
use crate::model::{ClientSubtype, EntityClass, EntityHandle, EntityKind, Position, ServerId};
use crate::store::EntityStore;
use crate::telemetry::{self, LogSink};

const EVENT_CHANNEL_SIZE: usize = 256;

// ── Events ───────────────────────────────────────────────────────

/// Entity lifecycle notifications for the render layer.
#[derive(Debug, Clone, PartialEq)]
pub enum EntityEvent {
    /// Created locally, still pending.
    Placed {
        handle: EntityHandle,
        class: EntityClass,
        position: Position,
    },
    /// Now carries a server id, by promotion or full-state sync.
    Committed {
        handle: EntityHandle,
        kind: EntityKind,
        id: ServerId,
    },
    Moved {
        handle: EntityHandle,
        position: Position,
    },
    Removed {
        handle: EntityHandle,
        kind: EntityKind,
    },
    Cleared {
        removed: usize,
    },
}

/// How a remove intent was handled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Removal {
    /// The entity was pending and is gone already. Nothing was sent.
    Immediate,
    /// `remove_*` was sent; the entity stays until confirmed.
    Requested,
    /// A confirmation was already awaited; the request was sent again.
    AlreadyRequested,
}

// ── FloorState ───────────────────────────────────────────────────

/// Everything inbound handlers may touch.
pub struct FloorState {
    store: EntityStore,
    log: Box<dyn LogSink>,
    events: broadcast::Sender<EntityEvent>,
    pending_removals: HashMap<(EntityKind, ServerId), SubscriptionId>,
}

impl FloorState {
    pub fn store(&self) -> &EntityStore {
        &self.store
    }

    fn emit(&self, event: EntityEvent) {
        // No subscribers is fine.
        let _ = self.events.send(event);
    }
}

// ── Reconciler ───────────────────────────────────────────────────

/// Owns the channel and the floor state. Single-threaded: one task
/// drives it.
pub struct Reconciler {
    channel: Channel<FloorState>,
    floor: FloorState,
    telemetry_route: Option<SubscriptionId>,
    update_interval: Option<u32>,
}

impl Reconciler {
    pub fn new(config: &SimulatorConfig, log: Box<dyn LogSink>) -> Self {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_SIZE);
        let mut reconciler = Self {
            channel: Channel::new(config.reconnect_delay),
            floor: FloorState {
                store: EntityStore::new(),
                log,
                events,
                pending_removals: HashMap::new(),
            },
            telemetry_route: None,
            update_interval: config.update_interval,
        };
        reconciler.install_routes();
        reconciler
    }

    // ── Accessors ────────────────────────────────────────────────

    pub fn store(&self) -> &EntityStore {
        &self.floor.store
    }

    pub fn channel(&self) -> &Channel<FloorState> {
        &self.channel
    }

    /// Direct access to the dispatch table, for extra receivers.
    pub fn channel_mut(&mut self) -> &mut Channel<FloorState> {
        &mut self.channel
    }

    pub fn connection_state(&self) -> watch::Receiver<ConnectionState> {
        self.channel.watch_state()
    }

    pub fn subscribe_events(&self) -> broadcast::Receiver<EntityEvent> {
        self.floor.events.subscribe()
    }

    pub(crate) fn event_sender(&self) -> broadcast::Sender<EntityEvent> {
        self.floor.events.clone()
    }

    /// Committed entities still waiting for their removal confirmation.
    pub fn pending_removals(&self) -> usize {
        self.floor.pending_removals.len()
    }

    pub fn has_telemetry_route(&self) -> bool {
        self.telemetry_route.is_some()
    }

    // ── Intents ──────────────────────────────────────────────────

    pub fn apply(&mut self, intent: Intent) -> Result<IntentResult, CoreError> {
        match intent {
            Intent::PlaceAp { position } => Ok(IntentResult::Placed(self.place_ap(position))),
            Intent::PlaceClient { subtype, position } => {
                Ok(IntentResult::Placed(self.place_client(subtype, position)))
            }
            Intent::Move { handle, position } => {
                self.moved(handle, position)?;
                Ok(IntentResult::Ok)
            }
            Intent::Remove { handle } => self.remove(handle).map(IntentResult::Removal),
            Intent::ClearAll => {
                self.clear_all();
                Ok(IntentResult::Ok)
            }
            Intent::SetInterval { millis } => {
                self.set_interval(millis);
                Ok(IntentResult::Ok)
            }
        }
    }

    pub fn place_ap(&mut self, position: Position) -> EntityHandle {
        self.place(EntityClass::Ap, position)
    }

    pub fn place_client(&mut self, subtype: ClientSubtype, position: Position) -> EntityHandle {
        self.place(EntityClass::Client(subtype), position)
    }

    /// Insert a pending entity now and ask the backend to create it.
    pub fn place(&mut self, class: EntityClass, position: Position) -> EntityHandle {
        let handle = self.floor.store.insert_pending(class, position);
        debug!(%handle, %class, %position, "placed pending entity");
        self.floor.emit(EntityEvent::Placed {
            handle,
            class,
            position,
        });
        self.channel.send(&Outbound::add(class.kind(), position));
        self.ensure_telemetry_route();
        handle
    }

    /// Drag end. Always moves locally; only committed entities are synced.
    pub fn moved(&mut self, handle: EntityHandle, position: Position) -> Result<(), CoreError> {
        let entity = self.floor.store.set_position(handle, position)?;
        self.floor.emit(EntityEvent::Moved { handle, position });
        if let Some(id) = entity.server_id() {
            self.channel
                .send(&Outbound::update_position(entity.kind(), id.clone(), position));
        }
        Ok(())
    }

    pub fn remove(&mut self, handle: EntityHandle) -> Result<Removal, CoreError> {
        let entity = self
            .floor
            .store
            .get(handle)
            .ok_or(CoreError::EntityNotFound { handle })?;
        let kind = entity.kind();

        let Some(id) = entity.server_id().cloned() else {
            self.floor.store.remove(handle);
            self.floor.emit(EntityEvent::Removed { handle, kind });
            debug!(%handle, "removed pending entity");
            return Ok(Removal::Immediate);
        };

        let key = (kind, id.clone());
        // A listener can vanish under us when its route is replaced.
        let live = self
            .floor
            .pending_removals
            .get(&key)
            .is_some_and(|listener| self.channel.is_subscribed(*listener));
        let outcome = if live {
            Removal::AlreadyRequested
        } else {
            let listener = self
                .channel
                .subscribe(kind.removed_type(), removal_listener(kind, id.clone()));
            self.floor.pending_removals.insert(key, listener);
            Removal::Requested
        };
        debug!(%kind, %id, ?outcome, "removal requested");
        self.channel.send(&Outbound::remove(kind, id));
        Ok(outcome)
    }

    /// Drop every entity and label, stop applying telemetry, and tell the
    /// backend to do the same.
    pub fn clear_all(&mut self) {
        let removed = self.floor.store.clear();
        for (_, listener) in self.floor.pending_removals.drain() {
            self.channel.unsubscribe(listener);
        }
        self.channel.clear_route(message_type::RSSI_UPDATE);
        self.telemetry_route = None;

        info!(removed = removed.len(), "cleared all entities");
        self.floor.emit(EntityEvent::Cleared {
            removed: removed.len(),
        });
        self.channel.send(&Outbound::ClearAll);
    }

    pub fn set_interval(&mut self, millis: u32) -> bool {
        self.channel.send(&Outbound::SetInterval { interval: millis })
    }

    // ── Channel events ───────────────────────────────────────────

    pub fn begin_connect(&self) {
        self.channel.begin_connect();
    }

    pub fn on_open(&mut self, link: mpsc::UnboundedSender<String>) {
        self.channel.on_open(link);
        if let Some(interval) = self.update_interval {
            self.channel.send(&Outbound::SetInterval { interval });
        }
    }

    pub fn on_close(&mut self) -> Duration {
        self.channel.on_close()
    }

    pub fn on_error(&mut self, error: &apsim_api::Error) {
        self.channel.on_error(error);
    }

    pub fn on_frame(&mut self, text: &str) -> usize {
        let ran = self.channel.dispatch(text, &mut self.floor);
        self.ensure_telemetry_route();
        ran
    }

    pub fn shutdown(&mut self) {
        self.channel.shutdown();
    }

    // ── Routes ───────────────────────────────────────────────────

    fn install_routes(&mut self) {
        for kind in EntityKind::ALL {
            self.channel.on_message(kind.added_type(), log_frame);
            self.channel
                .subscribe(kind.added_type(), move |frame, floor: &mut FloorState| {
                    apply_added(kind, frame, floor);
                    Flow::Keep
                });
            self.channel.on_message(kind.removed_type(), log_frame);
        }
        self.channel
            .on_message(message_type::POSITION_UPDATE, log_frame);
        self.install_telemetry_route();
    }

    fn install_telemetry_route(&mut self) {
        let id = self
            .channel
            .on_message(message_type::RSSI_UPDATE, |frame, floor: &mut FloorState| {
                telemetry::forward(frame, floor.log.as_mut());
                match frame.parse::<RssiUpdate>() {
                    Ok(update) => {
                        if let Some(moved) = telemetry::apply_rssi(&update, &mut floor.store) {
                            floor.emit(EntityEvent::Moved {
                                handle: moved.handle(),
                                position: moved.position(),
                            });
                        }
                    }
                    Err(e) => debug!(error = %e, "malformed rssi_update"),
                }
                Flow::Keep
            });
        self.telemetry_route = Some(id);
    }

    /// The rssi route is dropped by `clear_all` and comes back as soon as
    /// the store holds an entity again.
    fn ensure_telemetry_route(&mut self) {
        if self.telemetry_route.is_none() && !self.floor.store.is_empty() {
            debug!("reinstalling rssi_update route");
            self.install_telemetry_route();
        }
    }
}

// ── Handlers ─────────────────────────────────────────────────────

fn log_frame(frame: &InboundFrame, floor: &mut FloorState) -> Flow {
    telemetry::forward(frame, floor.log.as_mut());
    Flow::Keep
}

fn apply_added(kind: EntityKind, frame: &InboundFrame, floor: &mut FloorState) {
    let added: EntityAdded = match frame.parse() {
        Ok(added) => added,
        Err(e) => {
            warn!(error = %e, %kind, "malformed added message");
            return;
        }
    };

    if floor.store.find_committed(kind, &added.id).is_some() {
        debug!(%kind, id = %added.id, "already committed, ignoring");
        return;
    }

    if let Some(position) = added.position() {
        match floor
            .store
            .insert_committed(EntityClass::default_for(kind), added.id.clone(), position)
        {
            Ok(handle) => {
                debug!(%kind, id = %added.id, %handle, "synced entity from backend");
                floor.emit(EntityEvent::Committed {
                    handle,
                    kind,
                    id: added.id,
                });
            }
            Err(e) => warn!(error = %e, "failed to insert synced entity"),
        }
        return;
    }

    let Some(handle) = floor.store.first_pending(kind) else {
        warn!(%kind, id = %added.id, "acknowledgement with no pending entity, dropping");
        return;
    };
    match floor.store.promote(handle, added.id.clone()) {
        Ok(_) => {
            info!(%kind, id = %added.id, %handle, "entity committed");
            floor.emit(EntityEvent::Committed {
                handle,
                kind,
                id: added.id,
            });
        }
        Err(e) => warn!(error = %e, "promotion failed"),
    }
}

/// One-shot receiver for the confirmation of one committed entity's
/// removal. Ignores confirmations for other ids.
fn removal_listener(
    kind: EntityKind,
    id: ServerId,
) -> impl FnMut(&InboundFrame, &mut FloorState) -> Flow + Send + 'static {
    move |frame, floor| {
        match frame.parse::<EntityRemoved>() {
            Ok(removed) if removed.id == id => {}
            Ok(_) => return Flow::Keep,
            Err(e) => {
                debug!(error = %e, "malformed removal confirmation");
                return Flow::Keep;
            }
        }

        floor.pending_removals.remove(&(kind, id.clone()));
        if let Some(entity) = floor.store.find_committed(kind, &id) {
            let handle = entity.handle();
            floor.store.remove(handle);
            floor.emit(EntityEvent::Removed { handle, kind });
            info!(%kind, %id, "removal confirmed");
        }
        Flow::Unsubscribe
    }
}
