// ── Simulator runtime ──
//
// Owns the event loop that drives the reconciler: socket events, the
// reconnect timer, operator intents and cancellation, all on one task.
// Consumers talk to it through a cheap cloneable handle.

use std::sync::Arc;

use apsim_api::websocket::{Connection, Connector, SocketEvent, WebSocketConnector};
use tokio::sync::{broadcast, mpsc, watch, Mutex};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};
use url::Url;

use crate::channel::ConnectionState;
use crate::command::{Intent, IntentEnvelope, IntentResult};
use crate::config::SimulatorConfig;
use crate::error::CoreError;
use crate::model::{Entity, EntityHandle, EntityKind, Label};
use crate::reconcile::{EntityEvent, Reconciler};
use crate::store::{LabelMap, Snapshot};
use crate::stream::EntityStream;
use crate::telemetry::{BroadcastLog, TelemetryRecord};

const INTENT_CHANNEL_SIZE: usize = 64;
const TELEMETRY_CHANNEL_SIZE: usize = 1024;

// ── Simulator ────────────────────────────────────────────────────

/// The main entry point for consumers.
///
/// Cheaply cloneable via `Arc<SimulatorInner>`. [`connect`](Self::connect)
/// spawns the event loop, which keeps reconnecting until
/// [`disconnect`](Self::disconnect). Intents are accepted whether or not
/// the socket is up; messages sent while it is down are dropped.
#[derive(Clone)]
pub struct Simulator {
    inner: Arc<SimulatorInner>,
}

struct SimulatorInner {
    config: SimulatorConfig,
    connection_state: watch::Receiver<ConnectionState>,
    event_tx: broadcast::Sender<EntityEvent>,
    telemetry: BroadcastLog,
    aps: watch::Receiver<Snapshot>,
    clients: watch::Receiver<Snapshot>,
    labels: watch::Receiver<LabelMap>,
    intent_tx: mpsc::Sender<IntentEnvelope>,
    /// Taken by the event loop on connect.
    idle: Mutex<Option<(Reconciler, mpsc::Receiver<IntentEnvelope>)>>,
    cancel: CancellationToken,
    task_handles: Mutex<Vec<JoinHandle<()>>>,
}

impl Simulator {
    /// Create a simulator. Does NOT connect: call
    /// [`connect()`](Self::connect) to start the event loop.
    pub fn new(config: SimulatorConfig) -> Self {
        let (telemetry_tx, _) = broadcast::channel(TELEMETRY_CHANNEL_SIZE);
        let telemetry = BroadcastLog::new(telemetry_tx);
        let reconciler = Reconciler::new(&config, Box::new(telemetry.clone()));
        let (intent_tx, intent_rx) = mpsc::channel(INTENT_CHANNEL_SIZE);

        Self {
            inner: Arc::new(SimulatorInner {
                connection_state: reconciler.connection_state(),
                event_tx: reconciler.event_sender(),
                telemetry,
                aps: reconciler.store().watch(EntityKind::Ap),
                clients: reconciler.store().watch(EntityKind::Client),
                labels: reconciler.store().watch_labels(),
                intent_tx,
                idle: Mutex::new(Some((reconciler, intent_rx))),
                cancel: CancellationToken::new(),
                task_handles: Mutex::new(Vec::new()),
                config,
            }),
        }
    }

    pub fn config(&self) -> &SimulatorConfig {
        &self.inner.config
    }

    // ── Lifecycle ────────────────────────────────────────────────

    /// Start the event loop against the configured WebSocket endpoint.
    ///
    /// Returns once the loop is spawned; the first attempt happens in the
    /// background.
    pub async fn connect(&self) -> Result<(), CoreError> {
        self.connect_with(WebSocketConnector).await
    }

    /// Start the event loop with a custom connector.
    pub async fn connect_with<K: Connector>(&self, connector: K) -> Result<(), CoreError> {
        apsim_api::websocket::validate_endpoint(&self.inner.config.endpoint)?;

        let Some((reconciler, intents)) = self.inner.idle.lock().await.take() else {
            return Err(CoreError::Internal("simulator already started".into()));
        };

        let endpoint = self.inner.config.endpoint.clone();
        let cancel = self.inner.cancel.clone();
        let handle = tokio::spawn(event_loop(reconciler, connector, endpoint, intents, cancel));
        self.inner.task_handles.lock().await.push(handle);
        info!(endpoint = %self.inner.config.endpoint, "simulator started");
        Ok(())
    }

    /// Stop the event loop and wait for it. The socket is closed and the
    /// state ends at [`Disconnected`](ConnectionState::Disconnected).
    pub async fn disconnect(&self) {
        self.inner.cancel.cancel();

        let mut handles = self.inner.task_handles.lock().await;
        for handle in handles.drain(..) {
            let _ = handle.await;
        }
        debug!("simulator stopped");
    }

    // ── Intents ──────────────────────────────────────────────────

    /// Apply an intent on the event loop and wait for the outcome.
    pub async fn execute(&self, intent: Intent) -> Result<IntentResult, CoreError> {
        if self.inner.idle.lock().await.is_some() || self.inner.cancel.is_cancelled() {
            return Err(CoreError::Disconnected);
        }

        let (tx, rx) = tokio::sync::oneshot::channel();

        self.inner
            .intent_tx
            .send(IntentEnvelope {
                intent,
                response_tx: tx,
            })
            .await
            .map_err(|_| CoreError::Disconnected)?;

        rx.await.map_err(|_| CoreError::Disconnected)?
    }

    // ── State observation ────────────────────────────────────────

    /// Subscribe to connection state changes.
    pub fn connection_state(&self) -> watch::Receiver<ConnectionState> {
        self.inner.connection_state.clone()
    }

    /// Subscribe to entity lifecycle events.
    pub fn events(&self) -> broadcast::Receiver<EntityEvent> {
        self.inner.event_tx.subscribe()
    }

    /// Subscribe to every routed inbound message.
    pub fn telemetry(&self) -> broadcast::Receiver<Arc<TelemetryRecord>> {
        self.inner.telemetry.subscribe()
    }

    pub fn aps(&self) -> EntityStream<Entity> {
        EntityStream::new(self.inner.aps.clone())
    }

    pub fn clients(&self) -> EntityStream<Entity> {
        EntityStream::new(self.inner.clients.clone())
    }

    // ── Snapshot accessors ───────────────────────────────────────

    pub fn aps_snapshot(&self) -> Snapshot {
        self.inner.aps.borrow().clone()
    }

    pub fn clients_snapshot(&self) -> Snapshot {
        self.inner.clients.borrow().clone()
    }

    pub fn labels_snapshot(&self) -> LabelMap {
        self.inner.labels.borrow().clone()
    }

    pub fn label(&self, handle: EntityHandle) -> Option<Label> {
        self.inner.labels.borrow().get(&handle).cloned()
    }

    /// Look up any entity by handle in the latest snapshots.
    pub fn entity(&self, handle: EntityHandle) -> Option<Arc<Entity>> {
        self.aps_snapshot()
            .iter()
            .chain(self.clients_snapshot().iter())
            .find(|e| e.handle() == handle)
            .cloned()
    }
}

// ── Event loop ───────────────────────────────────────────────────

/// connect → pump until closed → wait the fixed delay → repeat, until
/// cancelled or the last [`Simulator`] handle is dropped. Intents are
/// applied in every phase.
async fn event_loop<K: Connector>(
    mut reconciler: Reconciler,
    mut connector: K,
    endpoint: Url,
    mut intents: mpsc::Receiver<IntentEnvelope>,
    cancel: CancellationToken,
) {
    'session: loop {
        reconciler.begin_connect();

        let attempt = {
            let connecting = connector.connect(&endpoint);
            tokio::pin!(connecting);
            loop {
                tokio::select! {
                    biased;
                    () = cancel.cancelled() => break 'session,
                    result = &mut connecting => break result,
                    envelope = intents.recv() => match envelope {
                        Some(envelope) => handle_intent(&mut reconciler, envelope),
                        // Every handle is gone.
                        None => break 'session,
                    },
                }
            }
        };

        match attempt {
            Ok(Connection {
                outgoing,
                mut incoming,
            }) => {
                reconciler.on_open(outgoing);
                loop {
                    tokio::select! {
                        biased;
                        () = cancel.cancelled() => break 'session,
                        event = incoming.recv() => match event {
                            Some(SocketEvent::Text(text)) => {
                                reconciler.on_frame(&text);
                            }
                            Some(SocketEvent::Error(e)) => reconciler.on_error(&e),
                            Some(SocketEvent::Closed) | None => break,
                        },
                        envelope = intents.recv() => match envelope {
                            Some(envelope) => handle_intent(&mut reconciler, envelope),
                            None => break 'session,
                        },
                    }
                }
            }
            // A failed attempt counts as error + close.
            Err(e) => reconciler.on_error(&e),
        }

        let delay = reconciler.on_close();
        let sleep = tokio::time::sleep(delay);
        tokio::pin!(sleep);
        loop {
            tokio::select! {
                biased;
                () = cancel.cancelled() => break 'session,
                () = &mut sleep => break,
                envelope = intents.recv() => match envelope {
                    Some(envelope) => handle_intent(&mut reconciler, envelope),
                    None => break 'session,
                },
            }
        }
    }

    reconciler.shutdown();
    debug!("event loop exiting");
}

fn handle_intent(reconciler: &mut Reconciler, envelope: IntentEnvelope) {
    let IntentEnvelope {
        intent,
        response_tx,
    } = envelope;
    debug!(?intent, "applying intent");
    // The caller may have given up waiting.
    let _ = response_tx.send(reconciler.apply(intent));
}
