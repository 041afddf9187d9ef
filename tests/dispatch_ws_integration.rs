//! Integration tests for the dispatcher WebSocket + status endpoints.
//!
//! Each test spins up an Axum server on a random port, connects via
//! tokio-tungstenite (or a real `WorkerAgent`), and exercises the wire
//! contract end to end.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use serde_json::Value;
use tokio::net::TcpListener;
use tokio::time::timeout;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};

use batch_dispatch::config::WorkerConfig;
use batch_dispatch::dispatcher::{Dispatcher, dispatch_routes};
use batch_dispatch::error::ExecutionError;
use batch_dispatch::protocol::TaskBatch;
use batch_dispatch::worker::{PayloadExecutor, WorkerAgent, WsConnector};

/// Maximum time any test is allowed to run before we consider it hung.
const TEST_TIMEOUT: Duration = Duration::from_secs(5);

type Ws = WebSocketStream<MaybeTlsStream<tokio::net::TcpStream>>;

/// Start an Axum server on a random port, return (port, dispatcher).
async fn start_server() -> (u16, Arc<Dispatcher>) {
    let dispatcher = Dispatcher::new(Duration::from_secs(60));
    let app = dispatch_routes(Arc::clone(&dispatcher));

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();

    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    // Give the server a moment to start accepting connections.
    tokio::time::sleep(Duration::from_millis(50)).await;

    (port, dispatcher)
}

async fn connect(port: u16) -> Ws {
    let (ws, _resp) = connect_async(format!("ws://127.0.0.1:{port}/ws"))
        .await
        .expect("WS connect failed");
    ws
}

/// Send one request frame and return the reply text.
async fn send(ws: &mut Ws, request: &str) -> String {
    ws.send(Message::Text(request.to_string().into()))
        .await
        .unwrap();
    match ws.next().await.unwrap().unwrap() {
        Message::Text(txt) => txt.as_str().to_string(),
        other => panic!("expected Text frame, got {:?}", other),
    }
}

// ── WebSocket Protocol Tests ─────────────────────────────────────────

#[tokio::test]
async fn ws_gold_worker_takes_gold_batch() {
    timeout(TEST_TIMEOUT, async {
        let (port, dispatcher) = start_server().await;
        dispatcher
            .enqueue("gold", TaskBatch::new(["gold-1", "gold-2"]))
            .await;

        let mut ws = connect(port).await;
        assert_eq!(send(&mut ws, "REGISTER:w1:gold").await, "REGISTERED");

        let reply = send(&mut ws, "GET_TASK:w1").await;
        let payloads: Vec<String> = serde_json::from_str(&reply).unwrap();
        assert_eq!(payloads, vec!["gold-1", "gold-2"]);

        assert_eq!(send(&mut ws, "GET_TASK:w1").await, "BUSY");
        assert_eq!(send(&mut ws, "HEARTBEAT:w1").await, "HEARTBEAT_ACK");
        assert_eq!(send(&mut ws, "TASK_COMPLETE:w1").await, "ACK");
        assert_eq!(send(&mut ws, "GET_TASK:w1").await, "NO_TASKS");
    })
    .await
    .expect("test timed out");
}

#[tokio::test]
async fn ws_unknown_class_falls_back_to_default() {
    timeout(TEST_TIMEOUT, async {
        let (port, dispatcher) = start_server().await;
        dispatcher
            .enqueue("default", TaskBatch::new(["plain"]))
            .await;

        let mut ws = connect(port).await;
        assert_eq!(send(&mut ws, "REGISTER:w2:silver").await, "REGISTERED");
        assert_eq!(send(&mut ws, "GET_TASK:w2").await, r#"["plain"]"#);
    })
    .await
    .expect("test timed out");
}

#[tokio::test]
async fn ws_unregistered_and_unknown_requests() {
    timeout(TEST_TIMEOUT, async {
        let (port, _dispatcher) = start_server().await;
        let mut ws = connect(port).await;

        assert_eq!(send(&mut ws, "GET_TASK:ghost").await, "REGISTER_REQUIRED");
        assert_eq!(send(&mut ws, "HEARTBEAT:ghost").await, "REGISTER_REQUIRED");
        assert_eq!(send(&mut ws, "FROBNICATE:w1").await, "UNKNOWN_COMMAND");
        assert_eq!(send(&mut ws, "").await, "UNKNOWN_COMMAND");

        // The connection survives bad requests.
        assert_eq!(send(&mut ws, "REGISTER:w1").await, "REGISTERED");
    })
    .await
    .expect("test timed out");
}

#[tokio::test]
async fn ws_identity_survives_reconnect() {
    timeout(TEST_TIMEOUT, async {
        let (port, dispatcher) = start_server().await;
        dispatcher.enqueue("gold", TaskBatch::new(["one"])).await;

        let mut first = connect(port).await;
        assert_eq!(send(&mut first, "REGISTER:w1:gold").await, "REGISTERED");
        assert_eq!(send(&mut first, "GET_TASK:w1").await, r#"["one"]"#);
        first.close(None).await.unwrap();

        // Records are keyed by worker id, not by connection.
        let mut second = connect(port).await;
        assert_eq!(send(&mut second, "TASK_COMPLETE:w1").await, "ACK");
        let record = dispatcher.worker("w1").await.unwrap();
        assert!(record.available);
        assert_eq!(record.batches_completed, 1);
    })
    .await
    .expect("test timed out");
}

// ── REST Endpoint Tests ──────────────────────────────────────────────

#[tokio::test]
async fn rest_health_endpoint() {
    timeout(TEST_TIMEOUT, async {
        let (port, _dispatcher) = start_server().await;

        let resp = reqwest::get(format!("http://127.0.0.1:{port}/health"))
            .await
            .unwrap();
        assert_eq!(resp.status(), 200);

        let body: Value = resp.json().await.unwrap();
        assert_eq!(body["status"], "ok");
        assert_eq!(body["service"], "batch-dispatch");
    })
    .await
    .expect("test timed out");
}

#[tokio::test]
async fn rest_status_reflects_registry_and_queues() {
    timeout(TEST_TIMEOUT, async {
        let (port, dispatcher) = start_server().await;
        dispatcher.enqueue("gold", TaskBatch::new(["a"])).await;
        dispatcher.enqueue("gold", TaskBatch::new(["b"])).await;

        let mut ws = connect(port).await;
        send(&mut ws, "REGISTER:w1:gold").await;
        send(&mut ws, "GET_TASK:w1").await;

        let workers: Value = reqwest::get(format!("http://127.0.0.1:{port}/api/workers"))
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        let workers = workers.as_array().unwrap();
        assert_eq!(workers.len(), 1);
        assert_eq!(workers[0]["worker_id"], "w1");
        assert_eq!(workers[0]["assigned_class"], "gold");
        assert_eq!(workers[0]["available"], false);
        assert_eq!(workers[0]["in_flight_payloads"], 1);

        let queues: Value = reqwest::get(format!("http://127.0.0.1:{port}/api/queues"))
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(queues["gold"], 1);
        assert_eq!(queues["default"], 0);
    })
    .await
    .expect("test timed out");
}

// ── Worker Agent End-to-End ──────────────────────────────────────────

/// Records payloads in execution order.
#[derive(Default)]
struct RecordingExecutor {
    seen: Mutex<Vec<String>>,
}

#[async_trait]
impl PayloadExecutor for RecordingExecutor {
    async fn execute(&self, payload: &str) -> Result<(), ExecutionError> {
        self.seen.lock().unwrap().push(payload.to_string());
        Ok(())
    }
}

#[tokio::test]
async fn agent_drains_its_class_over_websocket() {
    timeout(TEST_TIMEOUT, async {
        let (port, dispatcher) = start_server().await;
        dispatcher.enqueue("gold", TaskBatch::new(["g1", "g2"])).await;
        dispatcher.enqueue("gold", TaskBatch::new(["g3"])).await;
        dispatcher.enqueue("default", TaskBatch::new(["d1"])).await;

        let config = WorkerConfig {
            server_url: format!("ws://127.0.0.1:{port}/ws"),
            worker_id: "agent-1".to_string(),
            class: "gold".to_string(),
            poll_interval: Duration::from_millis(10),
            reconnect_backoff: Duration::from_millis(10),
            request_timeout: Duration::from_secs(1),
            ..WorkerConfig::default()
        };
        let executor = Arc::new(RecordingExecutor::default());
        let agent = Arc::new(WorkerAgent::new(
            config.clone(),
            Arc::new(WsConnector::new(config.server_url.clone())),
            executor.clone(),
        ));
        let runner = Arc::clone(&agent);
        let handle = tokio::spawn(async move { runner.run().await });

        loop {
            let done = dispatcher
                .worker("agent-1")
                .await
                .is_some_and(|r| r.batches_completed == 3 && r.available);
            if done {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }

        agent
            .shutdown_flag()
            .store(true, std::sync::atomic::Ordering::Relaxed);
        handle.await.unwrap();

        // Own class first, FIFO, then the default fallback.
        assert_eq!(
            *executor.seen.lock().unwrap(),
            vec!["g1", "g2", "g3", "d1"]
        );
        assert_eq!(dispatcher.pending().await, 0);
    })
    .await
    .expect("test timed out");
}

#[tokio::test]
async fn agent_gives_up_on_silent_handshake_and_retries() {
    timeout(TEST_TIMEOUT, async {
        // Accepts TCP but never answers the WebSocket upgrade.
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let accepted = Arc::new(std::sync::atomic::AtomicUsize::new(0));
        let counter = Arc::clone(&accepted);
        tokio::spawn(async move {
            let mut held = Vec::new();
            while let Ok((socket, _)) = listener.accept().await {
                counter.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
                held.push(socket);
            }
        });

        let config = WorkerConfig {
            server_url: format!("ws://127.0.0.1:{port}/ws"),
            worker_id: "agent-1".to_string(),
            reconnect_backoff: Duration::from_millis(10),
            request_timeout: Duration::from_millis(100),
            ..WorkerConfig::default()
        };
        let agent = Arc::new(WorkerAgent::new(
            config.clone(),
            Arc::new(WsConnector::new(config.server_url.clone())),
            Arc::new(RecordingExecutor::default()),
        ));
        let runner = Arc::clone(&agent);
        let handle = tokio::spawn(async move { runner.run().await });

        while accepted.load(std::sync::atomic::Ordering::SeqCst) < 2 {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        handle.abort();
    })
    .await
    .expect("test timed out");
}
