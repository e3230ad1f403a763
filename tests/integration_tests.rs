//! Integration tests for the position relay.
//!
//! These tests run the real HTTP/WebSocket stack on an ephemeral port and
//! talk to it with real clients, validating the full join/report/snapshot/
//! leave cycle across components.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use futures::{SinkExt, StreamExt};
use server::broadcast::BroadcastRouter;
use server::registry::SessionRegistry;
use server::relay::Relay;
use server::routes::{self, AppState};
use shared::{EntityReport, Envelope, Message, Rect, Session, SessionReply};
use tokio::net::TcpListener;
use tokio::sync::{mpsc, RwLock};
use tokio::time::timeout;
use tokio_tungstenite::tungstenite::Message as WsMessage;

/// BOOTSTRAP LIFECYCLE TESTS
mod bootstrap_tests {
    use super::*;

    /// Tests the full join/ping/leave lifecycle over real HTTP
    #[tokio::test]
    async fn session_lifecycle() {
        let base_url = spawn_relay().await;
        let http = reqwest::Client::new();

        let session = join(&http, &base_url, Some("alice")).await;
        assert_eq!(session.display_name, "alice");
        assert!(!session.id.is_empty());

        // Both refresh verbs answer with the session and bump its activity.
        let pinged = get_reply(&http, format!("{}/ping/{}", base_url, session.id)).await;
        let pinged = pinged.session.expect("ping should know the session");
        assert_eq!(pinged.id, session.id);
        assert!(pinged.last_activity >= session.last_activity);

        let updated = get_reply(&http, format!("{}/update/{}", base_url, session.id)).await;
        assert!(updated.session.is_some());

        // Leave retires the session; later refreshes come back empty.
        let left = get_reply(&http, format!("{}/leave/{}", base_url, session.id)).await;
        assert_eq!(left.session.expect("first leave returns the record").id, session.id);

        let gone = get_reply(&http, format!("{}/ping/{}", base_url, session.id)).await;
        assert!(gone.session.is_none());
    }

    /// Tests that unknown ids get an empty reply instead of an error
    #[tokio::test]
    async fn unknown_session_replies_empty() {
        let base_url = spawn_relay().await;
        let http = reqwest::Client::new();

        for verb in ["ping", "update", "leave"] {
            let reply = get_reply(&http, format!("{}/{}/no-such-id", base_url, verb)).await;
            assert!(reply.session.is_none(), "{} should reply empty", verb);
        }
    }

    /// Tests that join never hands out the same id twice
    #[tokio::test]
    async fn join_generates_distinct_ids() {
        let base_url = spawn_relay().await;
        let http = reqwest::Client::new();

        let a = join(&http, &base_url, None).await;
        let b = join(&http, &base_url, None).await;
        assert_ne!(a.id, b.id);
        // Without a requested name the id doubles as the display name.
        assert_eq!(a.display_name, a.id);
    }
}

/// SNAPSHOT RELAY TESTS
mod relay_tests {
    use super::*;

    /// Tests that one client's reports reach the other as snapshots
    #[tokio::test]
    async fn reports_fan_out_as_snapshots() {
        let base_url = spawn_relay().await;
        let http = reqwest::Client::new();

        let alice = join(&http, &base_url, Some("alice")).await;
        let bob = join(&http, &base_url, Some("bob")).await;

        let mut alice_ws = connect_ws(&base_url, &alice.id).await;
        let mut bob_ws = connect_ws(&base_url, &bob.id).await;

        let report = Envelope::new(
            alice.id.clone(),
            Message::PositionReport(vec![EntityReport::player(
                alice.id.clone(),
                Rect::new(10.0, 20.0, 5.0, 5.0),
            )]),
        );
        send_envelope(&mut alice_ws, &report).await;

        // Bob is silent, so the snapshot he receives holds only alice.
        let view = await_snapshot(&mut bob_ws, |view| view.contains_key(&alice.id)).await;
        let entities = &view[&alice.id];
        assert_eq!(entities.len(), 1);
        assert_eq!(entities[0].entity_id, alice.id);
        assert_eq!(entities[0].rect.x, 10.0);
        assert_eq!(entities[0].rect.y, 20.0);
        assert!(!view.contains_key(&bob.id));
    }

    /// Tests last-write-wins when a client reports repeatedly
    #[tokio::test]
    async fn latest_report_wins() {
        let base_url = spawn_relay().await;
        let http = reqwest::Client::new();

        let alice = join(&http, &base_url, Some("alice")).await;
        let bob = join(&http, &base_url, Some("bob")).await;

        let mut alice_ws = connect_ws(&base_url, &alice.id).await;
        let mut bob_ws = connect_ws(&base_url, &bob.id).await;

        for x in [1.0_f32, 2.0, 3.0] {
            let report = Envelope::new(
                alice.id.clone(),
                Message::PositionReport(vec![EntityReport::player(
                    alice.id.clone(),
                    Rect::new(x, 0.0, 5.0, 5.0),
                )]),
            );
            send_envelope(&mut alice_ws, &report).await;
        }

        let view = await_snapshot(&mut bob_ws, |view| {
            view.get(&alice.id)
                .map(|entities| entities[0].rect.x == 3.0)
                .unwrap_or(false)
        })
        .await;
        assert_eq!(view[&alice.id][0].rect.x, 3.0);
    }

    /// Tests that a dropped socket yields exactly one disconnect notice and
    /// removes the peer from later snapshots
    #[tokio::test]
    async fn transport_disconnect_notifies_peers() {
        let base_url = spawn_relay().await;
        let http = reqwest::Client::new();

        let alice = join(&http, &base_url, Some("alice")).await;
        let bob = join(&http, &base_url, Some("bob")).await;

        let mut alice_ws = connect_ws(&base_url, &alice.id).await;
        let mut bob_ws = connect_ws(&base_url, &bob.id).await;

        let report = Envelope::new(
            alice.id.clone(),
            Message::PositionReport(vec![EntityReport::player(
                alice.id.clone(),
                Rect::new(10.0, 20.0, 5.0, 5.0),
            )]),
        );
        send_envelope(&mut alice_ws, &report).await;
        await_snapshot(&mut bob_ws, |view| view.contains_key(&alice.id)).await;

        // Close the socket without calling /leave: the relay detects the
        // transport disconnect and retires the session itself.
        alice_ws.close(None).await.expect("close alice socket");

        let notice = await_envelope(&mut bob_ws, |envelope| {
            matches!(envelope.body, Message::DisconnectNotice) && envelope.session_id == alice.id
        })
        .await;
        assert_eq!(notice.session_id, alice.id);

        let view = await_snapshot(&mut bob_ws, |view| !view.contains_key(&alice.id)).await;
        assert!(!view.contains_key(&alice.id));

        // The session is already gone, so a late leave is a quiet no-op.
        let reply = get_reply(&http, format!("{}/leave/{}", base_url, alice.id)).await;
        assert!(reply.session.is_none());
    }

    /// Tests the headless client end to end against the real relay
    #[tokio::test]
    async fn sync_client_builds_replica_view() {
        let base_url = spawn_relay().await;
        let http = reqwest::Client::new();

        let bootstrap = client::bootstrap::BootstrapClient::new(&base_url);
        let session = bootstrap.join(Some("walker")).await.expect("join");
        let connection = client::network::Connection::open(&bootstrap.ws_url(&session.id))
            .await
            .expect("connect");
        let mover = client::mover::PatrolMover::new(0.0, 100.0, 200.0);
        let mut sync = client::network::SyncClient::new(session.clone(), connection, mover);

        // A hand-rolled observer peer watches the walker's reports arrive.
        let observer = join(&http, &base_url, Some("observer")).await;
        let mut observer_ws = connect_ws(&base_url, &observer.id).await;

        let run = tokio::spawn(async move {
            let _ = timeout(Duration::from_secs(2), sync.run()).await;
            sync
        });

        let view = await_snapshot(&mut observer_ws, |view| view.contains_key(&session.id)).await;
        assert_eq!(view[&session.id][0].entity_id, session.id);

        let sync = run.await.expect("sync task");
        bootstrap.leave(sync.session().id.as_str()).await.expect("leave");
        sync.shutdown().await;
    }
}

/// RESILIENCE TESTS
mod resilience_tests {
    use super::*;

    /// Tests that garbage frames never take the relay down
    #[tokio::test]
    async fn malformed_frames_are_ignored() {
        let base_url = spawn_relay().await;
        let http = reqwest::Client::new();

        let alice = join(&http, &base_url, Some("alice")).await;
        let bob = join(&http, &base_url, Some("bob")).await;

        let mut alice_ws = connect_ws(&base_url, &alice.id).await;
        let mut bob_ws = connect_ws(&base_url, &bob.id).await;

        alice_ws
            .send(WsMessage::Text("{not json at all".into()))
            .await
            .expect("send garbage");
        alice_ws
            .send(WsMessage::Text(
                r#"{"session_id":"a1","kind":"position-report","payload":{"bad":"shape"}}"#.into(),
            ))
            .await
            .expect("send mis-shaped payload");

        // A valid report after the garbage still flows through.
        let report = Envelope::new(
            alice.id.clone(),
            Message::PositionReport(vec![EntityReport::player(
                alice.id.clone(),
                Rect::new(1.0, 2.0, 5.0, 5.0),
            )]),
        );
        send_envelope(&mut alice_ws, &report).await;

        let view = await_snapshot(&mut bob_ws, |view| view.contains_key(&alice.id)).await;
        assert_eq!(view[&alice.id][0].rect.x, 1.0);
    }

    /// Tests that reports claiming a foreign or never-registered id never
    /// reach the shared view
    #[tokio::test]
    async fn spoofed_session_ids_never_enter_snapshots() {
        let base_url = spawn_relay().await;
        let http = reqwest::Client::new();

        let alice = join(&http, &base_url, Some("alice")).await;
        let bob = join(&http, &base_url, Some("bob")).await;

        let mut alice_ws = connect_ws(&base_url, &alice.id).await;
        let mut bob_ws = connect_ws(&base_url, &bob.id).await;

        // Alice's connection claims to speak for an id that never joined.
        let spoofed = Envelope::new(
            "ghost",
            Message::PositionReport(vec![EntityReport::player(
                "ghost",
                Rect::new(50.0, 50.0, 5.0, 5.0),
            )]),
        );
        send_envelope(&mut alice_ws, &spoofed).await;

        // An honest report afterwards lets us bound the wait: once alice
        // shows up in a snapshot, the spoofed report has been processed too.
        let report = Envelope::new(
            alice.id.clone(),
            Message::PositionReport(vec![EntityReport::player(
                alice.id.clone(),
                Rect::new(10.0, 20.0, 5.0, 5.0),
            )]),
        );
        send_envelope(&mut alice_ws, &report).await;

        let view = await_snapshot(&mut bob_ws, |view| view.contains_key(&alice.id)).await;
        assert!(!view.contains_key("ghost"));
    }

    /// Tests that a connected but silent client still receives the beat
    #[tokio::test]
    async fn silent_client_receives_snapshots() {
        let base_url = spawn_relay().await;
        let http = reqwest::Client::new();

        let bob = join(&http, &base_url, Some("bob")).await;
        let mut bob_ws = connect_ws(&base_url, &bob.id).await;

        // With one active session and no reports the snapshot is empty.
        let view = await_snapshot(&mut bob_ws, |_| true).await;
        assert!(view.is_empty());
    }
}

// HELPER FUNCTIONS

type WsStream =
    tokio_tungstenite::WebSocketStream<tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>>;

/// Boots the full relay (HTTP routes + reconciliation loop) on an ephemeral
/// port and returns its base URL.
async fn spawn_relay() -> String {
    let registry = Arc::new(RwLock::new(SessionRegistry::new(16)));
    let router = Arc::new(BroadcastRouter::new());
    let (inbound_tx, inbound_rx) = mpsc::unbounded_channel();

    let state = AppState::new(Arc::clone(&registry), Arc::clone(&router), inbound_tx);
    let app = routes::router(state);

    let listener = TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind ephemeral port");
    let addr = listener.local_addr().expect("local addr");

    let mut relay = Relay::new(registry, router, inbound_rx, Duration::from_millis(20));
    tokio::spawn(async move { relay.run().await });
    tokio::spawn(async move {
        axum::serve(listener, app).await.expect("serve");
    });

    format!("http://{}", addr)
}

async fn get_reply(http: &reqwest::Client, url: String) -> SessionReply {
    http.get(url)
        .send()
        .await
        .expect("request")
        .json()
        .await
        .expect("session reply body")
}

async fn join(http: &reqwest::Client, base_url: &str, name: Option<&str>) -> Session {
    let mut request = http.get(format!("{}/join", base_url));
    if let Some(name) = name {
        request = request.query(&[("requested_name", name)]);
    }
    let reply: SessionReply = request
        .send()
        .await
        .expect("join request")
        .json()
        .await
        .expect("join body");
    reply.session.expect("join returns a session")
}

async fn connect_ws(base_url: &str, session_id: &str) -> WsStream {
    let ws_url = format!(
        "{}/ws/{}",
        base_url.replacen("http://", "ws://", 1),
        session_id
    );
    let (socket, _) = tokio_tungstenite::connect_async(&ws_url)
        .await
        .expect("websocket connect");
    socket
}

async fn send_envelope(ws: &mut WsStream, envelope: &Envelope) {
    let text = shared::encode(envelope).expect("encode envelope");
    ws.send(WsMessage::Text(text.into()))
        .await
        .expect("send frame");
}

/// Reads frames until one decodes to an envelope matching `pred`, panicking
/// after two seconds without a match.
async fn await_envelope(ws: &mut WsStream, pred: impl Fn(&Envelope) -> bool) -> Envelope {
    let deadline = Duration::from_secs(2);
    timeout(deadline, async {
        loop {
            let frame = ws
                .next()
                .await
                .expect("socket closed while waiting")
                .expect("frame error");
            if let WsMessage::Text(raw) = frame {
                let envelope = shared::decode(raw.as_str());
                if pred(&envelope) {
                    return envelope;
                }
            }
        }
    })
    .await
    .expect("no matching envelope within deadline")
}

/// Waits for a snapshot whose view satisfies `pred` and returns that view.
async fn await_snapshot(
    ws: &mut WsStream,
    pred: impl Fn(&HashMap<String, Vec<EntityReport>>) -> bool,
) -> HashMap<String, Vec<EntityReport>> {
    let envelope = await_envelope(ws, |envelope| match &envelope.body {
        Message::AllPositionsSnapshot(view) => pred(view),
        _ => false,
    })
    .await;
    match envelope.body {
        Message::AllPositionsSnapshot(view) => view,
        _ => unreachable!(),
    }
}
