//! Trino REST protocol behavior against a local HTTP coordinator.
//!
//! `FakeCoordinator` binds an ephemeral port and answers each `METHOD path` from a
//! per-route queue, logging every request it receives. This exercises the real
//! `TrinoConnector`: statement submission, `nextUri` paging, busy retries and the
//! cancel sent when a deadline abandons a running query.

use std::collections::{HashMap, VecDeque};
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use pretty_assertions::assert_eq;
use serde_json::{json, Value as Json};
use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};
use trino_gateway::{Configuration, GatewayError, PoolPolicy, QueryExecutor, TrinoConnector, Value};

/// Scripted coordinator response
#[derive(Clone)]
enum Answer {
    Page(u16, Json),
    Hang,
}

#[derive(Debug, Clone)]
struct Request {
    line: String,
    user: Option<String>,
    body: String,
}

type Script = Arc<Mutex<HashMap<String, VecDeque<Answer>>>>;

struct FakeCoordinator {
    addr: SocketAddr,
    script: Script,
    received: Arc<Mutex<Vec<Request>>>,
}

impl FakeCoordinator {
    async fn start() -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind coordinator");
        let addr = listener.local_addr().expect("local addr");
        let script = Script::default();
        let received = Arc::<Mutex<Vec<Request>>>::default();

        let (accept_script, accept_received) = (Arc::clone(&script), Arc::clone(&received));
        tokio::spawn(async move {
            while let Ok((stream, _)) = listener.accept().await {
                let (script, received) = (Arc::clone(&accept_script), Arc::clone(&accept_received));
                tokio::spawn(async move {
                    let _ = serve_connection(stream, script, received).await;
                });
            }
        });

        Self { addr, script, received }
    }

    fn url(&self, path: &str) -> String {
        format!("http://{}{path}", self.addr)
    }

    /// Queue an answer for `METHOD path`; answers are served in the order queued
    fn answer(&self, route: &str, answer: Answer) -> &Self {
        self.script.lock().unwrap().entry(route.to_string()).or_default().push_back(answer);
        self
    }

    fn received(&self) -> Vec<Request> {
        self.received.lock().unwrap().clone()
    }

    fn lines(&self) -> Vec<String> {
        self.received().into_iter().map(|r| r.line).collect()
    }

    fn executor(&self, timeout: Duration) -> QueryExecutor<TrinoConnector> {
        let config = Configuration {
            scheme: "http".to_string(),
            host: self.addr.ip().to_string(),
            port: self.addr.port(),
            user: "analyst".to_string(),
            tls_enabled: false,
            tls_insecure_skip_verify: false,
            query_timeout: timeout,
            ..Configuration::default()
        };
        let connector = TrinoConnector::from_config(&config, PoolPolicy::default()).expect("valid connector");
        QueryExecutor::from_config(connector, &config)
    }

    /// Wait until `count` requests have arrived or a second has passed
    async fn wait_for(&self, count: usize) {
        for _ in 0..100 {
            if self.received.lock().unwrap().len() >= count {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    }
}

async fn serve_connection(stream: TcpStream, script: Script, received: Arc<Mutex<Vec<Request>>>) -> std::io::Result<()> {
    let (read, mut write) = stream.into_split();
    let mut reader = BufReader::new(read);

    loop {
        let mut request_line = String::new();
        if reader.read_line(&mut request_line).await? == 0 {
            return Ok(());
        }
        let mut parts = request_line.split_whitespace();
        let (Some(method), Some(path)) = (parts.next(), parts.next()) else {
            return Ok(());
        };
        let line = format!("{method} {path}");

        let mut content_length = 0;
        let mut user = None;
        loop {
            let mut header = String::new();
            if reader.read_line(&mut header).await? == 0 {
                return Ok(());
            }
            let header = header.trim_end();
            if header.is_empty() {
                break;
            }
            if let Some((name, value)) = header.split_once(':') {
                match name.to_ascii_lowercase().as_str() {
                    "content-length" => content_length = value.trim().parse().unwrap_or(0),
                    "x-trino-user" => user = Some(value.trim().to_string()),
                    _ => {}
                }
            }
        }

        let mut body = vec![0; content_length];
        reader.read_exact(&mut body).await?;
        received.lock().unwrap().push(Request {
            line: line.clone(),
            user,
            body: String::from_utf8_lossy(&body).into_owned(),
        });

        let answer = if method == "DELETE" {
            Answer::Page(200, json!({}))
        } else {
            script
                .lock()
                .unwrap()
                .get_mut(&line)
                .and_then(VecDeque::pop_front)
                .unwrap_or_else(|| Answer::Page(404, json!({"message": format!("no route for {line}")})))
        };

        let (status, payload) = match answer {
            Answer::Hang => std::future::pending().await,
            Answer::Page(status, page) => (status, page.to_string()),
        };
        let response = format!(
            "HTTP/1.1 {status} Scripted\r\nContent-Type: application/json\r\nContent-Length: {}\r\n\r\n{payload}",
            payload.len()
        );
        write.write_all(response.as_bytes()).await?;
        write.flush().await?;
    }
}

fn users_columns() -> Json {
    json!([
        {"name": "id", "type": "bigint"},
        {"name": "name", "type": "varchar"}
    ])
}

#[tokio::test]
async fn test_follows_next_uri_and_retries_busy_coordinator() {
    let coordinator = FakeCoordinator::start().await;
    coordinator
        .answer(
            "POST /v1/statement",
            Answer::Page(200, json!({"id": "q", "nextUri": coordinator.url("/v1/statement/q/1")})),
        )
        .answer("GET /v1/statement/q/1", Answer::Page(503, json!({"message": "busy"})))
        .answer(
            "GET /v1/statement/q/1",
            Answer::Page(
                200,
                json!({
                    "id": "q",
                    "nextUri": coordinator.url("/v1/statement/q/2"),
                    "columns": users_columns(),
                    "data": [[1, "alice"], ["not a number", "mallory"]]
                }),
            ),
        )
        .answer("GET /v1/statement/q/2", Answer::Page(200, json!({"id": "q", "data": [[2, "bob"]]})));

    let executor = coordinator.executor(Duration::from_secs(5));
    let result = executor.execute("SELECT id, name FROM users").await.unwrap();

    assert_eq!(result.len(), 2);
    assert_eq!(result.skipped_rows, 1);
    assert_eq!(result.rows[1].get("name"), Some(&Value::from("bob")));
    assert_eq!(
        coordinator.lines(),
        vec![
            "POST /v1/statement",
            "GET /v1/statement/q/1",
            "GET /v1/statement/q/1",
            "GET /v1/statement/q/2",
        ]
    );

    let submitted = &coordinator.received()[0];
    assert_eq!(submitted.body, "SELECT id, name FROM users");
    assert_eq!(submitted.user.as_deref(), Some("analyst"));
}

#[tokio::test]
async fn test_deadline_cancels_running_query() {
    let coordinator = FakeCoordinator::start().await;
    coordinator
        .answer(
            "POST /v1/statement",
            Answer::Page(200, json!({"id": "q", "nextUri": coordinator.url("/v1/statement/q/1")})),
        )
        .answer("GET /v1/statement/q/1", Answer::Hang);

    let executor = coordinator.executor(Duration::from_millis(300));
    let err = executor.execute("SELECT * FROM big").await.unwrap_err();
    assert!(matches!(err, GatewayError::Timeout(_)));

    coordinator.wait_for(3).await;
    assert_eq!(
        coordinator.lines(),
        vec!["POST /v1/statement", "GET /v1/statement/q/1", "DELETE /v1/statement/q/1"]
    );
}

#[tokio::test]
async fn test_engine_error_page_fails_call() {
    let coordinator = FakeCoordinator::start().await;
    coordinator.answer(
        "POST /v1/statement",
        Answer::Page(
            200,
            json!({
                "id": "q",
                "error": {
                    "message": "line 1:15: Table 'memory.default.nope' does not exist",
                    "errorCode": 46,
                    "errorName": "TABLE_NOT_FOUND"
                }
            }),
        ),
    );

    let executor = coordinator.executor(Duration::from_secs(5));
    let err = executor.execute("SELECT * FROM nope").await.unwrap_err();

    assert_eq!(err.error_code(), "EXECUTION_FAILED");
    assert!(err.message().contains("TABLE_NOT_FOUND"));
    assert_eq!(coordinator.lines(), vec!["POST /v1/statement"]);
}

#[tokio::test]
async fn test_non_busy_status_is_not_retried() {
    let coordinator = FakeCoordinator::start().await;
    coordinator.answer("POST /v1/statement", Answer::Page(401, json!({"message": "Unauthorized"})));

    let executor = coordinator.executor(Duration::from_secs(5));
    let err = executor.execute("SELECT 1").await.unwrap_err();

    assert_eq!(err.error_code(), "EXECUTION_FAILED");
    assert!(err.message().contains("401"));
    assert_eq!(coordinator.lines(), vec!["POST /v1/statement"]);
}
