//! Tests that exercise the HTTP surface of the postings-report server.
//!
//! These tests launch the `postings-report` executable, point it at mock
//! login and Graph endpoints, and hit its endpoints with a real HTTP
//! client. The postings store is deliberately unreachable here; the tests
//! cover the HTTP surface and its error reporting, not the Postgres path.
//!
//! At the end of a test, call `ctx.events.assert_eq()` to validate which
//! HTTP actions the server actually performed against the mocks. If you
//! are uncertain about what to put in there, just start with an empty
//! list, and the error will tell you what to add.

use crate::common::{
    Captured, Events, HttpServer, HttpServerHandle, Method, RequestCallback, Response, capture,
    token_ok,
};
use std::collections::HashMap;
use std::io::Read;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::process::{Child, Command, Stdio};
use std::sync::atomic::AtomicU32;
use std::sync::{Arc, Mutex};
use std::thread;

static NEXT_TCP_PORT: AtomicU32 = AtomicU32::new(50000);
static TEST_COUNTER: AtomicU32 = AtomicU32::new(1);

/// A context used for running a test.
///
/// This is used for interacting with the postings-report process and the
/// mock endpoints it talks to.
struct ServerTestCtx {
    child: Child,
    stdout: Arc<Mutex<Vec<u8>>>,
    stderr: Arc<Mutex<Vec<u8>>>,
    server_addr: SocketAddr,
    #[allow(dead_code)] // held for drop
    graph_server: HttpServerHandle,
    events: Events,
}

#[derive(Default)]
struct TestBuilder {
    graph_handlers: HashMap<(Method, &'static str), RequestCallback>,
}

impl TestBuilder {
    fn new() -> TestBuilder {
        let mut tb = TestBuilder::default();
        // Record any stray traffic so the event assertions catch it.
        let token_req = Captured::default();
        let send_req = Captured::default();
        tb.graph_handlers.insert(
            (Method::POST, "tenant-1/oauth2/v2.0/token"),
            token_ok(&token_req),
        );
        tb.graph_handlers.insert(
            (Method::POST, "v1.0/users/{sender}/sendMail"),
            capture(&send_req, || Response::new().code(202)),
        );
        tb
    }

    fn build(self) -> ServerTestCtx {
        let test_dir = test_dir();
        let events = Events::new();
        let graph_server = HttpServer::new(self.graph_handlers, events.clone());

        // TODO: This is a poor way to choose a TCP port, as it could already
        // be in use by something else.
        let server_port = NEXT_TCP_PORT.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
        let addr_arg = format!("127.0.0.1:{server_port}");
        let mut child = Command::new(env!("CARGO_BIN_EXE_postings-report"))
            .args(["serve", "--addr", addr_arg.as_str()])
            .env_clear()
            .envs(report_env(&graph_server))
            // An empty cwd keeps a developer's `.env` out of the test.
            .current_dir(&test_dir)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .unwrap();
        // Spawn some threads to capture output which can be used for debugging.
        let stdout = Arc::new(Mutex::new(Vec::new()));
        let stderr = Arc::new(Mutex::new(Vec::new()));
        let consumer = |mut source: Box<dyn Read + Send>, dest: Arc<Mutex<Vec<u8>>>| {
            move || {
                let mut dest = dest.lock().unwrap();
                if let Err(e) = source.read_to_end(&mut dest) {
                    eprintln!("process reader failed: {e}");
                };
            }
        };
        thread::spawn(consumer(
            Box::new(child.stdout.take().unwrap()),
            stdout.clone(),
        ));
        thread::spawn(consumer(
            Box::new(child.stderr.take().unwrap()),
            stderr.clone(),
        ));
        let server_addr = format!("127.0.0.1:{server_port}").parse().unwrap();
        // Wait for the server process to start up.
        for _ in 0..30 {
            match std::net::TcpStream::connect(&server_addr) {
                Ok(_) => break,
                Err(e) => match e.kind() {
                    std::io::ErrorKind::ConnectionRefused => {
                        std::thread::sleep(std::time::Duration::new(1, 0))
                    }
                    _ => panic!("unexpected error testing server connection: {e:?}"),
                },
            }
        }

        ServerTestCtx {
            child,
            stdout,
            stderr,
            server_addr,
            graph_server,
            events,
        }
    }
}

impl ServerTestCtx {
    fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.server_addr, path)
    }
}

impl Drop for ServerTestCtx {
    fn drop(&mut self) {
        let _ = self.child.kill();
        // Display the server's output for debugging.
        if let Ok(stderr) = self.stderr.lock() {
            if let Ok(s) = std::str::from_utf8(&stderr) {
                eprintln!("{}", s);
            }
        }
        if let Ok(stdout) = self.stdout.lock() {
            if let Ok(s) = std::str::from_utf8(&stdout) {
                println!("{}", s);
            }
        }
    }
}

/// A fresh directory for one test to use as the child's working directory.
fn test_dir() -> PathBuf {
    let tmp_dir = PathBuf::from(env!("CARGO_TARGET_TMPDIR")).join("local");
    let test_num = TEST_COUNTER.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
    let test_dir = tmp_dir.join(format!("t{test_num}"));
    if test_dir.exists() {
        std::fs::remove_dir_all(&test_dir).unwrap();
    }
    std::fs::create_dir_all(&test_dir).unwrap();
    test_dir
}

/// The full environment a correctly deployed server would have. The store
/// URL points at a port nothing listens on.
fn report_env(graph_server: &HttpServerHandle) -> Vec<(&'static str, String)> {
    vec![
        ("AZURE_TENANT_ID", "tenant-1".to_string()),
        ("AZURE_CLIENT_ID", "client-1".to_string()),
        ("AZURE_CLIENT_SECRET", "hunter2".to_string()),
        ("SENDER_EMAIL", "reports@example.com".to_string()),
        ("RECIPIENT_EMAIL", "team@example.com".to_string()),
        (
            "DATABASE_URL",
            "postgres://postings:pw@127.0.0.1:1/postings".to_string(),
        ),
        ("LOGIN_BASE_URL", graph_server.base_url()),
        ("GRAPH_BASE_URL", graph_server.base_url()),
    ]
}

#[test]
fn health_endpoint_reports_ok() {
    let ctx = TestBuilder::new().build();
    let response = reqwest::blocking::get(ctx.url("/")).unwrap();
    assert_eq!(response.status().as_u16(), 200);
    let body: serde_json::Value = response.json().unwrap();
    assert_eq!(
        body,
        serde_json::json!({
            "status": "ok",
            "service": "postings-report",
        })
    );
    ctx.events.assert_eq(&[]);
}

#[test]
fn report_trigger_surfaces_store_failures() {
    let ctx = TestBuilder::new().build();
    let client = reqwest::blocking::Client::new();
    let response = client.post(ctx.url("/report")).send().unwrap();
    assert_eq!(response.status().as_u16(), 500);
    let body: serde_json::Value = response.json().unwrap();
    assert_eq!(body["success"], false);
    assert_eq!(body["count"], 0);
    assert_eq!(body["email_sent"], false);
    let error = body["error"].as_str().unwrap();
    assert!(
        error.contains("postings store unreachable"),
        "unexpected error: {error}"
    );
    // A failed run must not produce any token or mail traffic.
    ctx.events.assert_eq(&[]);
}

#[test]
fn missing_configuration_fails_fast() {
    let test_dir = test_dir();
    let events = Events::new();
    let graph_server = HttpServer::new(HashMap::new(), events.clone());
    let env: Vec<_> = report_env(&graph_server)
        .into_iter()
        .filter(|(name, _)| *name != "AZURE_CLIENT_SECRET")
        .collect();

    let output = Command::new(env!("CARGO_BIN_EXE_postings-report"))
        .arg("run")
        .env_clear()
        .envs(env)
        .current_dir(&test_dir)
        .output()
        .unwrap();

    assert_eq!(output.status.code(), Some(1));
    let logs = format!(
        "{}{}",
        String::from_utf8_lossy(&output.stdout),
        String::from_utf8_lossy(&output.stderr)
    );
    assert!(
        logs.contains("AZURE_CLIENT_SECRET"),
        "startup log should name the missing variable:\n{logs}"
    );
    // Nothing was queried and nothing was sent.
    events.assert_eq(&[]);
}
