// ── Channel ──
//
// The one persistent link to the backend as seen by the reconciler:
// connection state, the outbound queue of the current socket, and the
// inbound dispatch table. The socket itself is driven by the event loop
// in `controller`; the channel only reacts to open/close/error/frame.

mod dispatch;

use std::time::Duration;

use apsim_api::{InboundFrame, Outbound};
use tokio::sync::{mpsc, watch};
use tracing::{debug, info, warn};

pub use dispatch::{Flow, Handler, SubscriptionId};

use dispatch::Dispatcher;

// ── ConnectionState ──────────────────────────────────────────────

/// Connection state observable by consumers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display)]
#[strum(serialize_all = "lowercase")]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
}

// ── Channel ──────────────────────────────────────────────────────

/// Connection lifecycle plus a type-keyed dispatch table.
///
/// `C` is the state handed to every handler on dispatch. Keeping it
/// outside the channel lets handlers mutate it while the channel
/// mutates its own routes.
pub struct Channel<C> {
    state: watch::Sender<ConnectionState>,
    link: Option<mpsc::UnboundedSender<String>>,
    dispatcher: Dispatcher<C>,
    reconnect_delay: Duration,
}

impl<C> Channel<C> {
    pub fn new(reconnect_delay: Duration) -> Self {
        let (state, _) = watch::channel(ConnectionState::Disconnected);
        Self {
            state,
            link: None,
            dispatcher: Dispatcher::new(),
            reconnect_delay,
        }
    }

    pub fn state(&self) -> ConnectionState {
        *self.state.borrow()
    }

    /// Subscribe to connection state changes.
    pub fn watch_state(&self) -> watch::Receiver<ConnectionState> {
        self.state.subscribe()
    }

    pub fn reconnect_delay(&self) -> Duration {
        self.reconnect_delay
    }

    // ── Lifecycle ────────────────────────────────────────────────

    /// A connection attempt is starting.
    pub fn begin_connect(&self) {
        self.state.send_replace(ConnectionState::Connecting);
    }

    /// The socket is open: become `Connected` and ask for the full state.
    pub fn on_open(&mut self, link: mpsc::UnboundedSender<String>) {
        self.link = Some(link);
        self.state.send_replace(ConnectionState::Connected);
        info!("connected to simulator backend");
        self.send(&Outbound::GetState);
    }

    /// The socket is gone. Returns how long to wait before reconnecting.
    pub fn on_close(&mut self) -> Duration {
        self.shutdown();
        info!(
            delay_ms = u64::try_from(self.reconnect_delay.as_millis()).unwrap_or(u64::MAX),
            "connection closed, reconnecting after delay"
        );
        self.reconnect_delay
    }

    /// Transport fault. Stops writing to the dying socket; the reconnect
    /// is left to the close that always follows.
    pub fn on_error(&mut self, error: &apsim_api::Error) {
        warn!(error = %error, "connection error");
        self.shutdown();
    }

    /// Drop the outbound queue and report `Disconnected`.
    pub fn shutdown(&mut self) {
        self.link = None;
        self.state.send_replace(ConnectionState::Disconnected);
    }

    // ── Outbound ─────────────────────────────────────────────────

    /// Transmit `message` if connected. Otherwise it is dropped without
    /// error. Returns whether it was handed to the socket.
    pub fn send(&self, message: &Outbound) -> bool {
        let Some(link) = self.link.as_ref().filter(|_| self.state() == ConnectionState::Connected)
        else {
            debug!(kind = message.type_name(), "not connected, dropping message");
            return false;
        };

        let text = match message.encode() {
            Ok(text) => text,
            Err(e) => {
                warn!(error = %e, kind = message.type_name(), "failed to encode message");
                return false;
            }
        };

        if link.send(text).is_err() {
            debug!(kind = message.type_name(), "socket writer gone, dropping message");
            return false;
        }
        debug!(kind = message.type_name(), "sent");
        true
    }

    // ── Routing ──────────────────────────────────────────────────

    /// Make `handler` *the* receiver for `kind`, replacing every handler
    /// registered before it.
    pub fn on_message<F>(&mut self, kind: &str, handler: F) -> SubscriptionId
    where
        F: FnMut(&InboundFrame, &mut C) -> Flow + Send + 'static,
    {
        self.dispatcher.replace(kind, Box::new(handler))
    }

    /// Add `handler` after the existing receivers of `kind`.
    pub fn subscribe<F>(&mut self, kind: &str, handler: F) -> SubscriptionId
    where
        F: FnMut(&InboundFrame, &mut C) -> Flow + Send + 'static,
    {
        self.dispatcher.append(kind, Box::new(handler))
    }

    pub fn unsubscribe(&mut self, id: SubscriptionId) -> bool {
        self.dispatcher.remove(id)
    }

    /// Deregister every receiver of `kind`.
    pub fn clear_route(&mut self, kind: &str) -> usize {
        self.dispatcher.clear(kind)
    }

    /// Whether `id` has not been replaced, cleared or unsubscribed.
    pub fn is_subscribed(&self, id: SubscriptionId) -> bool {
        self.dispatcher.contains(id)
    }

    pub fn has_route(&self, kind: &str) -> bool {
        self.dispatcher.subscribers(kind) > 0
    }

    pub fn subscribers(&self, kind: &str) -> usize {
        self.dispatcher.subscribers(kind)
    }

    // ── Inbound ──────────────────────────────────────────────────

    /// Decode one text frame and run its receivers. A frame that fails to
    /// decode is logged and dropped. Returns how many receivers ran.
    pub fn dispatch(&mut self, text: &str, ctx: &mut C) -> usize {
        match InboundFrame::decode(text) {
            Ok(frame) => self.dispatcher.dispatch(&frame, ctx),
            Err(e) => {
                warn!(error = %e, "dropping undecodable frame");
                0
            }
        }
    }
}

// ── Tests ────────────────────────────────────────────────────────

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    fn connected() -> (Channel<Vec<String>>, mpsc::UnboundedReceiver<String>) {
        let mut channel = Channel::new(Duration::from_millis(5000));
        let (tx, rx) = mpsc::unbounded_channel();
        channel.begin_connect();
        channel.on_open(tx);
        (channel, rx)
    }

    #[test]
    fn open_sends_get_state_first() {
        let (channel, mut rx) = connected();
        assert_eq!(channel.state(), ConnectionState::Connected);
        assert_eq!(rx.try_recv().unwrap(), r#"{"type":"get_state"}"#);
    }

    #[test]
    fn send_while_disconnected_is_a_silent_noop() {
        let channel: Channel<()> = Channel::new(Duration::from_millis(5000));
        assert!(!channel.send(&Outbound::ClearAll));
    }

    #[test]
    fn send_while_connecting_is_dropped() {
        let (mut channel, mut rx) = connected();
        rx.try_recv().unwrap();
        channel.on_close();
        channel.begin_connect();

        assert!(!channel.send(&Outbound::ClearAll));
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn close_reports_disconnected_and_fixed_delay() {
        let (mut channel, _rx) = connected();
        let states = channel.watch_state();

        assert_eq!(channel.on_close(), Duration::from_millis(5000));
        assert_eq!(*states.borrow(), ConnectionState::Disconnected);
        assert!(!channel.send(&Outbound::GetState));
    }

    #[test]
    fn error_drops_the_link_without_scheduling_anything() {
        let (mut channel, mut rx) = connected();
        rx.try_recv().unwrap();

        channel.on_error(&apsim_api::Error::WebSocket("reset".into()));
        assert_eq!(channel.state(), ConnectionState::Disconnected);
        assert!(!channel.send(&Outbound::ClearAll));
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn on_message_replaces_previous_handler() {
        let (mut channel, _rx) = connected();
        channel.on_message("client_removed", |_, seen: &mut Vec<String>| {
            seen.push("first".into());
            Flow::Keep
        });
        channel.on_message("client_removed", |_, seen: &mut Vec<String>| {
            seen.push("second".into());
            Flow::Keep
        });

        let mut seen = Vec::new();
        channel.dispatch(r#"{"type":"client_removed","id":1}"#, &mut seen);
        channel.dispatch(r#"{"type":"client_removed","id":2}"#, &mut seen);
        assert_eq!(seen, vec!["second", "second"]);
    }

    #[test]
    fn malformed_frames_do_not_stop_dispatch() {
        let (mut channel, _rx) = connected();
        channel.subscribe("ap_added", |frame, seen: &mut Vec<String>| {
            seen.push(frame.body()["id"].to_string());
            Flow::Keep
        });

        let mut seen = Vec::new();
        assert_eq!(channel.dispatch("{not json", &mut seen), 0);
        assert_eq!(channel.dispatch(r#"{"id":3}"#, &mut seen), 0);
        assert_eq!(channel.dispatch(r#"{"type":"ap_added","id":4}"#, &mut seen), 1);
        assert_eq!(seen, vec!["4"]);
    }

    #[test]
    fn clear_route_silences_type() {
        let (mut channel, _rx) = connected();
        channel.subscribe("rssi_update", |_, seen: &mut Vec<String>| {
            seen.push("rssi".into());
            Flow::Keep
        });
        assert!(channel.has_route("rssi_update"));

        assert_eq!(channel.clear_route("rssi_update"), 1);
        let mut seen = Vec::new();
        channel.dispatch(
            r#"{"type":"rssi_update","client_id":1,"ap_id":1,"rssi":-50}"#,
            &mut seen,
        );
        assert!(seen.is_empty());
    }
}
