//! End-to-end tests: a real server on a loopback port, operators over
//! `tokio-tungstenite`, the in-process bus observed through a subscriber.

#![allow(clippy::panic)]

use std::collections::HashSet;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::broadcast;
use tokio_tungstenite::tungstenite::{self, Message};
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};
use tower::ServiceExt;

use teleop_gateway::app_state::AppState;
use teleop_gateway::bus::{BusMessage, LocalBus, MiddlewareBus};
use teleop_gateway::config::BridgeConfig;
use teleop_gateway::domain::{DrivePayload, RobotId};
use teleop_gateway::ws::messages::{Status, StatusFrame};
use teleop_gateway::{build_app, build_state};

type Operator = WebSocketStream<MaybeTlsStream<TcpStream>>;

const WATCHDOG: Duration = Duration::from_millis(300);
const PERIOD: Duration = Duration::from_millis(50);

struct Server {
    addr: SocketAddr,
    bus: LocalBus,
    state: AppState,
}

fn config() -> BridgeConfig {
    BridgeConfig {
        rate_limit_hz: 20.0,
        watchdog_timeout: WATCHDOG,
        handshake_timeout: Duration::from_secs(2),
        operator_tokens: HashSet::from(["secret".to_string()]),
        ..BridgeConfig::default()
    }
}

async fn spawn_server() -> Server {
    let bus = LocalBus::new(4096);
    let shared: Arc<dyn MiddlewareBus> = Arc::new(bus.clone());
    let state = build_state(&config(), shared);
    let app = build_app(state.clone());

    let Ok(listener) = tokio::net::TcpListener::bind("127.0.0.1:0").await else {
        panic!("bind loopback");
    };
    let Ok(addr) = listener.local_addr() else {
        panic!("local addr");
    };
    tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });
    Server { addr, bus, state }
}

impl Server {
    fn url(&self, robot_id: &str, token: &str) -> String {
        format!("ws://{}/ws?robot_id={robot_id}&token={token}", self.addr)
    }

    async fn connect(&self, robot_id: &str) -> Operator {
        match connect_async(self.url(robot_id, "secret")).await {
            Ok((ws, _)) => ws,
            Err(e) => panic!("operator connect failed: {e}"),
        }
    }
}

fn robot(raw: &str) -> RobotId {
    let Ok(id) = RobotId::parse(raw) else {
        panic!("valid id");
    };
    id
}

async fn send(ws: &mut Operator, fb: f64, lr: f64, seq: u64) {
    let frame = serde_json::json!({"forward_back": fb, "left_right": lr, "seq": seq});
    if ws.send(Message::text(frame.to_string())).await.is_err() {
        panic!("send failed");
    }
}

async fn next_status(ws: &mut Operator) -> StatusFrame {
    loop {
        let next = tokio::time::timeout(Duration::from_secs(2), ws.next()).await;
        match next {
            Ok(Some(Ok(Message::Text(text)))) => {
                let Ok(frame) = serde_json::from_str(text.as_str()) else {
                    panic!("not a status frame: {text}");
                };
                return frame;
            }
            Ok(Some(Ok(_))) => {}
            other => panic!("expected status frame, got {other:?}"),
        }
    }
}

async fn next_bus_message(rx: &mut broadcast::Receiver<BusMessage>) -> BusMessage {
    match tokio::time::timeout(Duration::from_secs(2), rx.recv()).await {
        Ok(Ok(msg)) => msg,
        other => panic!("expected bus message, got {other:?}"),
    }
}

async fn wait_until_free(state: &AppState, robot_id: &RobotId) {
    let freed = tokio::time::timeout(Duration::from_secs(2), async {
        while state.sessions.registry().state_of(robot_id).is_some() {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await;
    assert!(freed.is_ok(), "robot {robot_id} was never released");
}

#[tokio::test]
async fn command_reaches_bus_then_watchdog_stops_robot() {
    let server = spawn_server().await;
    let mut bus_rx = server.bus.subscribe();
    let mut op = server.connect("r1").await;

    send(&mut op, 0.5, -0.2, 1).await;
    assert_eq!(next_status(&mut op).await, StatusFrame::ok());

    let first = tokio::time::timeout(PERIOD * 3, bus_rx.recv()).await;
    let Ok(Ok(first)) = first else {
        panic!("no publish within the tick window");
    };
    assert_eq!(first.topic, "/robots/r1/cmd_vel");
    assert_eq!(
        first.payload,
        DrivePayload {
            forward_back: 0.5,
            left_right: -0.2
        }
    );

    // Go silent past the watchdog deadline.
    let stopped = next_status(&mut op).await;
    assert_eq!(stopped.status, Status::Stopped);

    let mut last = first;
    while !last.payload.is_stop() {
        last = next_bus_message(&mut bus_rx).await;
    }
    assert_eq!(last.topic, "/robots/r1/cmd_vel");

    let closed = tokio::time::timeout(Duration::from_secs(2), op.next()).await;
    assert!(matches!(
        closed,
        Ok(None | Some(Ok(Message::Close(_))) | Some(Err(_)))
    ));
    wait_until_free(&server.state, &robot("r1")).await;
}

#[tokio::test]
async fn second_operator_for_active_robot_is_busy() {
    let server = spawn_server().await;
    let mut op = server.connect("r1").await;
    send(&mut op, 0.1, 0.0, 1).await;
    let _ = next_status(&mut op).await;

    match connect_async(server.url("r1", "secret")).await {
        Err(tungstenite::Error::Http(response)) => {
            assert_eq!(response.status(), StatusCode::CONFLICT);
        }
        Err(e) => panic!("unexpected error {e}"),
        Ok(_) => panic!("second operator must be rejected"),
    }
    assert_eq!(server.state.sessions.registry().len(), 1);

    // A different robot is unaffected.
    let mut other = server.connect("r2").await;
    send(&mut other, 0.1, 0.0, 1).await;
    assert_eq!(next_status(&mut other).await.status, Status::Ok);
}

#[tokio::test]
async fn concurrent_admission_admits_one() {
    let server = spawn_server().await;
    let url = server.url("r1", "secret");
    let attempts: Vec<_> = (0..8)
        .map(|_| {
            let url = url.clone();
            tokio::spawn(async move { connect_async(url).await.map(|(ws, _)| ws) })
        })
        .collect();

    let mut admitted = Vec::new();
    let mut busy = 0;
    for attempt in attempts {
        match attempt.await {
            Ok(Ok(ws)) => admitted.push(ws),
            Ok(Err(tungstenite::Error::Http(response))) => {
                assert_eq!(response.status(), StatusCode::CONFLICT);
                busy += 1;
            }
            Ok(Err(e)) => panic!("unexpected handshake error {e}"),
            Err(e) => panic!("connect task failed: {e}"),
        }
    }
    assert_eq!(admitted.len(), 1);
    assert_eq!(busy, 7);
}

#[tokio::test]
async fn bad_handshakes_are_http_errors() {
    let server = spawn_server().await;
    let cases = [
        (server.url("r1", "wrong"), StatusCode::UNAUTHORIZED),
        (format!("ws://{}/ws?robot_id=r1", server.addr), StatusCode::UNAUTHORIZED),
        (format!("ws://{}/ws?token=secret", server.addr), StatusCode::BAD_REQUEST),
        (server.url("bad.id", "secret"), StatusCode::BAD_REQUEST),
    ];
    for (url, expected) in cases {
        match connect_async(url.as_str()).await {
            Err(tungstenite::Error::Http(response)) => assert_eq!(response.status(), expected, "{url}"),
            other => panic!("{url}: expected HTTP {expected}, got {:?}", other.map(|_| ())),
        }
    }
    assert!(server.state.sessions.registry().is_empty());
}

#[tokio::test]
async fn stale_frame_is_rejected_and_not_published() {
    let server = spawn_server().await;
    let mut bus_rx = server.bus.subscribe();
    let mut op = server.connect("r1").await;

    send(&mut op, 0.25, 0.0, 10).await;
    assert_eq!(next_status(&mut op).await.status, Status::Ok);
    send(&mut op, 0.75, 0.0, 9).await;
    let rejected = next_status(&mut op).await;
    assert_eq!(rejected.status, Status::Rejected);
    assert!(rejected.reason.is_some_and(|r| r.contains("stale")));

    tokio::time::sleep(PERIOD * 3).await;
    drop(op);
    wait_until_free(&server.state, &robot("r1")).await;

    let mut payloads = Vec::new();
    while let Ok(msg) = bus_rx.try_recv() {
        payloads.push(msg.payload);
    }
    assert!(payloads.iter().all(|p| p.forward_back != 0.75));
    assert_eq!(payloads.last(), Some(&DrivePayload::STOP));
}

#[tokio::test]
async fn rest_eviction_stops_live_session() {
    let server = spawn_server().await;
    let mut op = server.connect("r1").await;
    send(&mut op, 0.3, 0.3, 1).await;
    let _ = next_status(&mut op).await;

    let app = build_app(server.state.clone());
    let Ok(request) = Request::delete("/api/v1/robots/r1/session").body(Body::empty()) else {
        panic!("request");
    };
    let Ok(response) = app.oneshot(request).await else {
        panic!("router call");
    };
    assert_eq!(response.status(), StatusCode::ACCEPTED);

    // Keep feeding commands; eviction must still win.
    let frame = serde_json::json!({"forward_back": 0.3, "left_right": 0.3, "seq": 2});
    let _ = op.send(Message::text(frame.to_string())).await;
    let mut status = next_status(&mut op).await;
    while status.status == Status::Ok {
        status = next_status(&mut op).await;
    }
    assert_eq!(status.status, Status::Stopped);
    wait_until_free(&server.state, &robot("r1")).await;
}

#[tokio::test]
async fn rest_surface_lists_and_reports() {
    let server = spawn_server().await;
    let mut op = server.connect("r7").await;
    send(&mut op, 0.0, 0.5, 1).await;
    let _ = next_status(&mut op).await;

    let app = build_app(server.state.clone());

    let Ok(request) = Request::get("/api/v1/robots").body(Body::empty()) else {
        panic!("request");
    };
    let Ok(response) = app.clone().oneshot(request).await else {
        panic!("router call");
    };
    assert_eq!(response.status(), StatusCode::OK);
    let Ok(body) = axum::body::to_bytes(response.into_body(), usize::MAX).await else {
        panic!("body");
    };
    let Ok(list) = serde_json::from_slice::<serde_json::Value>(&body) else {
        panic!("json body");
    };
    assert_eq!(
        list.pointer("/0/robot_id").and_then(|v| v.as_str()),
        Some("r7")
    );
    assert_eq!(list.pointer("/0/state").and_then(|v| v.as_str()), Some("active"));

    let Ok(request) = Request::delete("/api/v1/robots/nobody/session").body(Body::empty()) else {
        panic!("request");
    };
    let Ok(response) = app.clone().oneshot(request).await else {
        panic!("router call");
    };
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    let Ok(request) = Request::get("/health").body(Body::empty()) else {
        panic!("request");
    };
    let Ok(response) = app.oneshot(request).await else {
        panic!("router call");
    };
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn handshake_after_shutdown_is_unavailable() {
    let server = spawn_server().await;
    let mut op = server.connect("r1").await;
    send(&mut op, 0.2, 0.0, 1).await;
    let _ = next_status(&mut op).await;

    assert!(server.state.sessions.shutdown(Duration::from_secs(2)).await);
    assert_eq!(next_status(&mut op).await.status, Status::Stopped);

    match connect_async(server.url("r2", "secret")).await {
        Err(tungstenite::Error::Http(response)) => {
            assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
        }
        Err(e) => panic!("unexpected error {e}"),
        Ok(_) => panic!("no session may start during shutdown"),
    }
    assert!(server.state.sessions.registry().is_empty());
}
