//! Integration tests for playcast
//!
//! These tests drive real connectors over in-memory transports and exercise
//! the HTTP gateway and the WebSocket broadcast end to end.

use std::time::Duration;

use axum::body::Body;
use axum::http::{Request, StatusCode, header};
use futures::StreamExt;
use http_body_util::BodyExt;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, DuplexStream};
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tower::ServiceExt;

use playcast_core::{
    Connector, ConnectorError, ConnectorHandle, Response, ServiceSnapshot, WaitGroup,
};

use crate::gateway::Gateway;
use crate::router::{GREETING, ResponseRouter};
use crate::server::build_app;

/// One connector attached to an in-memory service
struct TestService {
    handle: ConnectorHandle,
    service: DuplexStream,
    task: JoinHandle<Result<(), ConnectorError>>,
}

fn spawn_service(name: &str, observer: &broadcast::Sender<Response>) -> TestService {
    let completion = WaitGroup::new();
    let (mut connector, handle) = Connector::new(name, observer.clone(), &completion);
    let (client, service) = tokio::io::duplex(4096);
    connector.attach(client).unwrap();
    let task = tokio::spawn(async move { connector.run().await });
    TestService {
        handle,
        service,
        task,
    }
}

impl TestService {
    /// Write service lines and wait until the connector has applied them
    async fn say(&mut self, lines: &str, done: impl FnMut(&ServiceSnapshot) -> bool) {
        self.service.write_all(lines.as_bytes()).await.unwrap();
        let mut snapshots = self.handle.subscribe_snapshots();
        tokio::time::timeout(Duration::from_secs(5), snapshots.wait_for(done))
            .await
            .unwrap()
            .unwrap();
    }

    /// Shut the connector down and wait for its task to finish
    async fn close(self) -> ConnectorHandle {
        self.handle.shutdown();
        self.task.await.unwrap().unwrap();
        self.handle
    }
}

fn build_test_app(
    handles: Vec<ConnectorHandle>,
    observer: &broadcast::Sender<Response>,
) -> axum::Router {
    build_app(Gateway::new(handles), ResponseRouter::new(observer.clone()))
}

async fn get(app: axum::Router, uri: &str) -> (StatusCode, serde_json::Value) {
    let response = app
        .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
        .await
        .unwrap();
    let status = response.status();
    let body = response.into_body().collect().await.unwrap().to_bytes();
    (status, serde_json::from_slice(&body).unwrap())
}

async fn post(app: axum::Router, uri: &str, body: Option<serde_json::Value>) -> StatusCode {
    let request = match body {
        Some(body) => Request::builder()
            .method("POST")
            .uri(uri)
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => Request::builder()
            .method("POST")
            .uri(uri)
            .body(Body::empty())
            .unwrap(),
    };
    app.oneshot(request).await.unwrap().status()
}

#[tokio::test]
async fn test_list_connectors() {
    let (observer, _) = broadcast::channel(16);
    let channel0 = spawn_service("channel0", &observer);
    let channel1 = spawn_service("channel1", &observer);
    let closed = channel1.close().await;
    let app = build_test_app(vec![channel0.handle.clone(), closed], &observer);

    let (status, body) = get(app, "/connectors").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(
        body,
        serde_json::json!([
            { "name": "channel0", "running": true },
            { "name": "channel1", "running": false },
        ])
    );
}

#[tokio::test]
async fn test_get_snapshot() {
    let (observer, _) = broadcast::channel(16);
    let mut svc = spawn_service("channel0", &observer);
    svc.say(
        "OHAI 'test service'\nFEATURES TimeReport FileLoad\nTIME 61500000\nSTATE Playing\nFILE '/music/a b.mp3'\n",
        |s| s.file.as_deref() == Some("/music/a b.mp3"),
    )
    .await;
    let app = build_test_app(vec![svc.handle.clone()], &observer);

    let (status, body) = get(app.clone(), "/connectors/channel0").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(
        body,
        serde_json::json!({
            "features": ["FileLoad", "TimeReport"],
            "state": "Playing",
            "time_us": 61_500_000u64,
            "file": "/music/a b.mp3",
        })
    );

    let (_, body) = get(app.clone(), "/connectors/channel0/time").await;
    assert_eq!(body["time"], "1:01");
    assert_eq!(body["time_us"], 61_500_000u64);

    let (_, body) = get(app.clone(), "/connectors/channel0/file").await;
    assert_eq!(body["file"], "/music/a b.mp3");

    let (_, body) = get(app.clone(), "/connectors/channel0/state").await;
    assert_eq!(body["state"], "Playing");

    let (_, body) = get(app, "/connectors/channel0/features").await;
    assert_eq!(body["features"], serde_json::json!(["FileLoad", "TimeReport"]));
}

#[tokio::test]
async fn test_fields_hidden_without_features() {
    let (observer, _) = broadcast::channel(16);
    let mut svc = spawn_service("channel0", &observer);
    // TIME is still applied, but not exposed without TimeReport.
    svc.say("TIME 1000000\nFEATURES PlayStop\n", |s| !s.features.is_empty())
        .await;
    let app = build_test_app(vec![svc.handle.clone()], &observer);

    let (status, body) = get(app.clone(), "/connectors/channel0").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["state"], "");
    assert!(body.get("time_us").is_none());
    assert!(body.get("file").is_none());

    let (status, _) = get(app.clone(), "/connectors/channel0/time").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    let (status, _) = get(app, "/connectors/channel0/file").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_unknown_connector() {
    let (observer, _) = broadcast::channel(16);
    let app = build_test_app(vec![], &observer);

    let (status, body) = get(app.clone(), "/connectors/nope").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"], "unknown connector: nope");

    assert_eq!(
        post(app, "/connectors/nope/play", None).await,
        StatusCode::NOT_FOUND
    );
}

#[tokio::test]
async fn test_commands_forwarded_as_requests() {
    let (observer, _) = broadcast::channel(16);
    let mut svc = spawn_service("channel0", &observer);
    svc.say("FEATURES PlayStop FileLoad\n", |s| s.features.len() == 2)
        .await;
    let app = build_test_app(vec![svc.handle.clone()], &observer);

    assert_eq!(
        post(
            app.clone(),
            "/connectors/channel0/load",
            Some(serde_json::json!({ "file": "/music/it's here.mp3" })),
        )
        .await,
        StatusCode::ACCEPTED
    );
    assert_eq!(
        post(app.clone(), "/connectors/channel0/play", None).await,
        StatusCode::ACCEPTED
    );
    assert_eq!(
        post(app.clone(), "/connectors/channel0/stop", None).await,
        StatusCode::ACCEPTED
    );
    assert_eq!(
        post(app, "/connectors/channel0/eject", None).await,
        StatusCode::ACCEPTED
    );

    let mut reader = BufReader::new(&mut svc.service);
    let mut received = Vec::new();
    for _ in 0..4 {
        let mut line = String::new();
        reader.read_line(&mut line).await.unwrap();
        received.push(line);
    }
    assert_eq!(
        received,
        vec![
            "load '/music/it'\\''s here.mp3'\n",
            "play\n",
            "stop\n",
            "eject\n",
        ]
    );
}

#[tokio::test]
async fn test_command_requires_feature() {
    let (observer, _) = broadcast::channel(16);
    let mut svc = spawn_service("channel0", &observer);
    svc.say("FEATURES FileLoad\n", |s| !s.features.is_empty())
        .await;
    let app = build_test_app(vec![svc.handle.clone()], &observer);

    assert_eq!(
        post(app, "/connectors/channel0/play", None).await,
        StatusCode::CONFLICT
    );
}

#[tokio::test]
async fn test_command_on_closed_connector() {
    let (observer, _) = broadcast::channel(16);
    let mut svc = spawn_service("channel0", &observer);
    svc.say("FEATURES PlayStop\n", |s| !s.features.is_empty())
        .await;
    let handle = svc.close().await;
    let app = build_test_app(vec![handle], &observer);

    assert_eq!(
        post(app, "/connectors/channel0/play", None).await,
        StatusCode::SERVICE_UNAVAILABLE
    );
}

/// Next text frame from a WebSocket, skipping pings
async fn next_text<S>(ws: &mut S) -> String
where
    S: futures::Stream<
            Item = Result<
                tokio_tungstenite::tungstenite::Message,
                tokio_tungstenite::tungstenite::Error,
            >,
        > + Unpin,
{
    loop {
        let msg = tokio::time::timeout(Duration::from_secs(5), ws.next())
            .await
            .unwrap()
            .unwrap()
            .unwrap();
        if let tokio_tungstenite::tungstenite::Message::Text(text) = msg {
            return text.as_str().to_string();
        }
    }
}

#[tokio::test]
async fn test_ws_broadcasts_responses() {
    let (observer, _) = broadcast::channel(16);
    let mut svc = spawn_service("channel0", &observer);
    let app = build_test_app(vec![svc.handle.clone()], &observer);

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    let (mut ws, _) = tokio_tungstenite::connect_async(format!("ws://{}/ws", addr))
        .await
        .unwrap();

    assert_eq!(next_text(&mut ws).await, GREETING);

    svc.service
        .write_all(b"STATE Playing\nTIME 1337000000\n")
        .await
        .unwrap();

    let event: serde_json::Value = serde_json::from_str(&next_text(&mut ws).await).unwrap();
    assert_eq!(event["connector"], "channel0");
    assert_eq!(event["word"], "STATE");
    assert_eq!(event["args"], serde_json::json!(["Playing"]));
    assert_eq!(event["summary"], "channel0: Playing");

    let event: serde_json::Value = serde_json::from_str(&next_text(&mut ws).await).unwrap();
    assert_eq!(event["summary"], "channel0: 22:17");
}
