#![allow(clippy::unwrap_used)]

// The real event loop against in-memory connections, on a paused clock.

use std::future::Future;
use std::time::Duration;

use apsim_api::websocket::{Connection, Connector, Peer, SocketEvent};
use apsim_core::{
    ConnectionState, CoreError, Intent, IntentResult, Position, Simulator, SimulatorConfig,
};
use pretty_assertions::assert_eq;
use tokio::sync::mpsc;
use tokio::time::Instant;
use url::Url;

/// Hands every attempt to the test: when it happened, and the far side
/// of the connection (or nothing, when attempts are set to fail).
struct MockConnector {
    attempts: mpsc::UnboundedSender<(Instant, Option<Peer>)>,
    fail: bool,
}

impl Connector for MockConnector {
    fn connect(
        &mut self,
        _url: &Url,
    ) -> impl Future<Output = Result<Connection, apsim_api::Error>> + Send {
        let attempts = self.attempts.clone();
        let fail = self.fail;
        async move {
            if fail {
                let _ = attempts.send((Instant::now(), None));
                return Err(apsim_api::Error::WebSocketConnect("refused".into()));
            }
            let (conn, peer) = Connection::in_memory();
            let _ = attempts.send((Instant::now(), Some(peer)));
            Ok(conn)
        }
    }
}

fn config() -> SimulatorConfig {
    SimulatorConfig::new(Url::parse("ws://localhost:8000/ws").unwrap())
}

async fn start(
    fail: bool,
) -> (Simulator, mpsc::UnboundedReceiver<(Instant, Option<Peer>)>) {
    let (tx, rx) = mpsc::unbounded_channel();
    let sim = Simulator::new(config());
    sim.connect_with(MockConnector { attempts: tx, fail })
        .await
        .unwrap();
    (sim, rx)
}

#[tokio::test(start_paused = true)]
async fn reconnects_exactly_every_5000ms_after_each_close() {
    let (sim, mut attempts) = start(false).await;

    let (mut last, peer) = attempts.recv().await.unwrap();
    let mut peer = peer.unwrap();

    for _ in 0..4 {
        peer.events.send(SocketEvent::Closed).unwrap();
        let (at, next) = attempts.recv().await.unwrap();
        assert_eq!(at - last, Duration::from_millis(5000));
        last = at;
        peer = next.unwrap();
    }

    sim.disconnect().await;
}

#[tokio::test(start_paused = true)]
async fn failed_attempts_retry_forever() {
    let (sim, mut attempts) = start(true).await;

    let (mut last, _) = attempts.recv().await.unwrap();
    for _ in 0..5 {
        let (at, peer) = attempts.recv().await.unwrap();
        assert!(peer.is_none());
        assert_eq!(at - last, Duration::from_millis(5000));
        last = at;
    }

    sim.disconnect().await;
    assert_eq!(
        *sim.connection_state().borrow(),
        ConnectionState::Disconnected
    );
}

#[tokio::test(start_paused = true)]
async fn error_then_close_still_reconnects_once() {
    let (sim, mut attempts) = start(false).await;
    let (first, peer) = attempts.recv().await.unwrap();
    let peer = peer.unwrap();

    peer.events
        .send(SocketEvent::Error(apsim_api::Error::WebSocket("reset".into())))
        .unwrap();
    peer.events.send(SocketEvent::Closed).unwrap();

    let (second, _held) = attempts.recv().await.unwrap();
    assert_eq!(second - first, Duration::from_millis(5000));

    // Nothing else until the next close.
    tokio::time::sleep(Duration::from_secs(60)).await;
    assert!(attempts.try_recv().is_err());

    sim.disconnect().await;
}

#[tokio::test(start_paused = true)]
async fn event_loop_stops_when_every_handle_is_dropped() {
    let (sim, mut attempts) = start(true).await;
    let _ = attempts.recv().await.unwrap();

    drop(sim);

    // The loop owns the connector; once it exits the attempt feed closes
    // instead of yielding another retry 5000 ms later.
    let next = tokio::time::timeout(Duration::from_millis(3 * 5001), attempts.recv()).await;
    assert!(matches!(next, Ok(None)), "unexpected retry: {next:?}");
}

#[tokio::test(start_paused = true)]
async fn open_requests_full_state_and_applies_replies() {
    let (sim, mut attempts) = start(false).await;
    let (_, peer) = attempts.recv().await.unwrap();
    let mut peer = peer.unwrap();

    assert_eq!(peer.sent.recv().await.unwrap(), r#"{"type":"get_state"}"#);
    assert_eq!(*sim.connection_state().borrow(), ConnectionState::Connected);

    let mut aps = sim.aps();
    peer.events
        .send(SocketEvent::Text(
            r#"{"type":"ap_added","id":1,"x":2.0,"y":0.0,"z":3.0}"#.into(),
        ))
        .unwrap();

    let snap = aps.changed().await.unwrap();
    assert_eq!(snap.len(), 1);
    assert_eq!(snap[0].position(), Position::new(2.0, 0.0, 3.0));
    assert_eq!(sim.label(snap[0].handle()).unwrap().text(), "AP_1");

    sim.disconnect().await;
}

#[tokio::test(start_paused = true)]
async fn intents_are_applied_while_disconnected() {
    let (sim, mut attempts) = start(true).await;
    attempts.recv().await.unwrap();

    let result = sim
        .execute(Intent::PlaceAp {
            position: Position::new(1.0, 0.0, 1.0),
        })
        .await
        .unwrap();

    let IntentResult::Placed(handle) = result else {
        panic!("expected a placement, got {result:?}");
    };
    let entity = sim.entity(handle).unwrap();
    assert!(entity.is_pending());

    sim.disconnect().await;
}

#[tokio::test(start_paused = true)]
async fn intents_round_trip_through_the_socket() {
    let (sim, mut attempts) = start(false).await;
    let (_, peer) = attempts.recv().await.unwrap();
    let mut peer = peer.unwrap();
    peer.sent.recv().await.unwrap();

    let mut telemetry = sim.telemetry();
    let IntentResult::Placed(handle) = sim
        .execute(Intent::PlaceAp {
            position: Position::default(),
        })
        .await
        .unwrap()
    else {
        panic!("expected a placement");
    };
    assert_eq!(
        peer.sent.recv().await.unwrap(),
        r#"{"type":"add_ap","x":0.0,"y":0.0,"z":0.0}"#
    );

    peer.events
        .send(SocketEvent::Text(r#"{"type":"ap_added","id":9}"#.into()))
        .unwrap();
    assert_eq!(telemetry.recv().await.unwrap().kind, "ap_added");

    assert!(!sim.entity(handle).unwrap().is_pending());

    sim.disconnect().await;
}

#[tokio::test]
async fn execute_before_connect_is_rejected() {
    let sim = Simulator::new(config());
    let err = sim.execute(Intent::ClearAll).await.unwrap_err();
    assert!(matches!(err, CoreError::Disconnected));
}

#[tokio::test]
async fn non_websocket_endpoint_is_rejected() {
    let sim = Simulator::new(SimulatorConfig::new(
        Url::parse("http://localhost:8000/ws").unwrap(),
    ));
    let err = sim.connect().await.unwrap_err();
    assert!(matches!(err, CoreError::Config { .. }));
}

#[tokio::test(start_paused = true)]
async fn second_connect_is_rejected() {
    let (sim, _attempts) = start(true).await;
    let (tx, _rx) = mpsc::unbounded_channel();
    let err = sim
        .connect_with(MockConnector {
            attempts: tx,
            fail: true,
        })
        .await
        .unwrap_err();
    assert!(matches!(err, CoreError::Internal(_)));
    sim.disconnect().await;
}
