//! Purpose: End-to-end tests for the dev server and the HTTP client.
//! Exports: None (integration test module).
//! Role: Validate fetch/upsert/delete, auth, access-method enforcement, and
//!       quota behavior across real TCP.
//! Invariants: Uses loopback-only servers with per-test seed files.
//! Invariants: Bounded waits avoid test flakiness.
//! Invariants: Server processes are cleaned up on drop.

use caravel::api::{
    Auth, Client, ClientConfig, Endpoint, ErrorKind, WriteOptions, WriteRequest,
};
use serde_json::json;
use std::net::{SocketAddr, TcpListener, TcpStream};
use std::path::Path;
use std::process::{Child, Command, Stdio};
use std::sync::{Mutex, MutexGuard};
use std::thread::sleep;
use std::time::{Duration, Instant};

type TestResult<T> = Result<T, Box<dyn std::error::Error>>;

static SERVER_LOCK: Mutex<()> = Mutex::new(());

struct TestServer {
    child: Child,
    base_url: String,
    token: Option<String>,
    _server_guard: MutexGuard<'static, ()>,
}

impl TestServer {
    fn start(extra_args: &[&str], seed: Option<&Path>, token: Option<&str>) -> TestResult<Self> {
        let guard = SERVER_LOCK
            .lock()
            .unwrap_or_else(|poison| poison.into_inner());
        let mut last_err: Option<Box<dyn std::error::Error>> = None;
        for _attempt in 0..3 {
            let port = pick_port()?;
            let bind = format!("127.0.0.1:{port}");
            let base_url = format!("http://{bind}");

            let mut command = Command::new(env!("CARGO_BIN_EXE_caravel"));
            command
                .arg("serve")
                .arg("--bind")
                .arg(&bind)
                .stdout(Stdio::null())
                .stderr(Stdio::piped());
            if let Some(seed) = seed {
                command.arg("--seed").arg(seed);
            }
            if let Some(token) = token {
                command.arg("--serve-token").arg(token);
            }
            for arg in extra_args {
                command.arg(arg);
            }
            let mut child = command.spawn()?;

            match wait_for_server(&mut child, bind.parse()?) {
                Ok(()) => {
                    return Ok(Self {
                        child,
                        base_url,
                        token: token.map(str::to_string),
                        _server_guard: guard,
                    });
                }
                Err(err) => {
                    let _ = child.kill();
                    let _ = child.wait();
                    last_err = Some(err);
                    sleep(Duration::from_millis(30));
                }
            }
        }

        Err(last_err.unwrap_or_else(|| "server failed to start".into()))
    }

    fn client(&self) -> TestResult<Client> {
        let endpoint = Endpoint::new(format!("{}/v0/exec", self.base_url))?;
        let auth = match &self.token {
            Some(token) => Auth::Token(token.clone()),
            None => Auth::Anonymous,
        };
        let config = ClientConfig::new().with_timeout(Duration::from_secs(10));
        Ok(Client::connect(endpoint, auth).with_config(config))
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        let _ = self.child.kill();
        let _ = self.child.wait();
    }
}

fn pick_port() -> TestResult<u16> {
    let listener = TcpListener::bind("127.0.0.1:0")?;
    Ok(listener.local_addr()?.port())
}

fn wait_for_server(child: &mut Child, addr: SocketAddr) -> TestResult<()> {
    let deadline = Instant::now() + Duration::from_secs(10);
    loop {
        if let Some(status) = child.try_wait()? {
            return Err(format!("server exited early with {status}").into());
        }
        if TcpStream::connect_timeout(&addr, Duration::from_millis(200)).is_ok() {
            return Ok(());
        }
        if Instant::now() > deadline {
            return Err("server did not become reachable".into());
        }
        sleep(Duration::from_millis(25));
    }
}

fn write_seed(dir: &Path, records: u64) -> TestResult<std::path::PathBuf> {
    let rows: Vec<serde_json::Value> = (1..=records)
        .map(|n| json!({ "name": format!("c{n}") }))
        .collect();
    let seed = json!({
        "records": { "customer": rows },
        "saved_searches": { "all": { "filters": [], "columns": [{ "field": "name" }] } },
    });
    let path = dir.join("seed.json");
    std::fs::write(&path, serde_json::to_vec_pretty(&seed)?)?;
    Ok(path)
}

#[test]
fn fetch_all_drains_a_seeded_saved_search_over_tcp() -> TestResult<()> {
    let dir = tempfile::tempdir()?;
    let seed = write_seed(dir.path(), 12)?;
    let server = TestServer::start(&["--page-cap", "5"], Some(&seed), None)?;
    let client = server.client()?;

    let rows = client.fetch_all("customer", "all")?;
    assert_eq!(rows.len(), 12);
    let ids: Vec<u64> = rows.iter().map(|r| r.id).collect();
    let expected: Vec<u64> = (1..=12).collect();
    assert_eq!(ids, expected);
    assert_eq!(rows[0].columns.get("name"), Some(&json!("c1")));
    Ok(())
}

#[test]
fn bearer_token_is_enforced() -> TestResult<()> {
    let dir = tempfile::tempdir()?;
    let seed = write_seed(dir.path(), 2)?;
    let server = TestServer::start(&[], Some(&seed), Some("sesame"))?;

    let ok = server.client()?;
    assert_eq!(ok.fetch_all("customer", "all")?.len(), 2);

    let endpoint = Endpoint::new(format!("{}/v0/exec", server.base_url))?;
    let wrong = Client::connect(endpoint, Auth::Token("wrong".to_string()));
    let err = wrong.fetch_all("customer", "all").unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Permission);
    Ok(())
}

#[test]
fn upsert_and_delete_round_trip_over_tcp() -> TestResult<()> {
    let server = TestServer::start(&[], None, None)?;
    let client = server.client()?;

    let batch = vec![
        WriteRequest::new().with_field("name", "A"),
        WriteRequest::new().with_field("name", "B"),
    ];
    let results = client.upsert("customer", batch, WriteOptions::default())?;
    assert_eq!(results.len(), 2);
    assert!(results.iter().all(|(outcome, _)| outcome.is_committed()));

    let loaded = client.load_record("customer", 1)?;
    assert_eq!(loaded.fields.get("name"), Some(&json!("A")));

    let outcomes = client.delete_records("customer", &[1, 77, 2])?;
    assert_eq!(outcomes.len(), 3);
    assert!(outcomes[0].error.is_none());
    let failure = outcomes[1].error.as_ref().expect("failure");
    assert_eq!(failure.error_kind(), ErrorKind::NotFound);
    assert!(outcomes[2].error.is_none());
    Ok(())
}

#[test]
fn update_only_enforcement_crosses_the_wire() -> TestResult<()> {
    let server = TestServer::start(&[], None, None)?;
    let client = server.client()?;

    client.upsert(
        "customer",
        vec![WriteRequest::new().with_field("name", "A")],
        WriteOptions::default(),
    )?;

    let options = WriteOptions {
        update_only: true,
        ..WriteOptions::default()
    };
    let batch = vec![
        WriteRequest::new().with_id(1).with_field("name", "A2"),
        WriteRequest::new().with_id(999_999).with_field("name", "B"),
        WriteRequest::new().with_field("name", "C"),
    ];
    let results = client.upsert("customer", batch, options)?;
    assert!(results[0].0.is_committed());
    assert_eq!(
        results[1].0.failure().expect("failure").error_kind(),
        ErrorKind::NotFound
    );
    assert_eq!(
        results[2].0.failure().expect("failure").error_kind(),
        ErrorKind::Validation
    );
    Ok(())
}

#[test]
fn access_method_mismatch_is_a_formatted_request_error() -> TestResult<()> {
    let server = TestServer::start(&[], None, None)?;

    // An upsert smuggled through GET must be refused at the boundary with
    // a structured envelope, not a transport failure.
    let url = format!(
        "{}/v0/exec?script=10&deploy=1&operation=upsert&record_type=customer",
        server.base_url
    );
    let response = ureq::get(&url).call();
    let Err(ureq::Error::Status(status, resp)) = response else {
        return Err("expected status error".into());
    };
    assert_eq!(status, 400);
    let body: serde_json::Value = serde_json::from_str(&resp.into_string()?)?;
    assert_eq!(body["error"]["kind"], json!("Usage"));
    let message = body["error"]["message"].as_str().unwrap_or_default();
    assert!(message.contains("[upsert]"));
    assert!(message.contains("[POST]"));
    Ok(())
}

#[test]
fn unknown_operation_fails_at_the_boundary() -> TestResult<()> {
    let server = TestServer::start(&[], None, None)?;
    let url = format!(
        "{}/v0/exec?script=10&deploy=1&operation=detonate",
        server.base_url
    );
    let Err(ureq::Error::Status(status, resp)) = ureq::get(&url).call() else {
        return Err("expected status error".into());
    };
    assert_eq!(status, 400);
    let body: serde_json::Value = serde_json::from_str(&resp.into_string()?)?;
    assert_eq!(body["error"]["kind"], json!("Usage"));
    Ok(())
}

#[test]
fn quota_limited_server_marks_exhaustion_and_resumes() -> TestResult<()> {
    let dir = tempfile::tempdir()?;
    let seed = write_seed(dir.path(), 12)?;
    let server = TestServer::start(
        &["--page-cap", "5", "--budget", "25"],
        Some(&seed),
        None,
    )?;
    let client = server.client()?;

    // 25 units cover two 10-unit pages; the guard halts the third.
    let page = client.fetch_page("customer", "all", 0)?;
    assert!(page.quota_exhausted);
    assert_eq!(page.rows.len(), 10);
    assert_eq!(page.cursor, 10);

    // Fresh invocation, fresh allowance: resume from the cursor.
    let rest = client.fetch_page("customer", "all", page.cursor)?;
    let ids: Vec<u64> = rest.rows.iter().map(|r| r.id).collect();
    assert_eq!(ids, vec![11, 12]);
    assert!(!rest.quota_exhausted);

    let err = client.fetch_all("customer", "all").unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Quota);
    Ok(())
}
