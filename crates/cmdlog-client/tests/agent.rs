//! Upload agent behavior against a scripted service and a live server

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use cmdlog_client::{
    AgentConfig, AgentError, ClientError, HistoryService, HttpHistoryService, LocalLogBuffer, UploadAgent,
    UploadOutcome,
};
use tempfile::TempDir;

#[derive(Debug, Default)]
struct Script {
    next_session: u64,
    refuse_sessions: bool,
    fail_on: Option<Vec<u8>>,
    session_calls: usize,
    appended: Vec<(u64, Vec<u8>)>,
}

/// In-memory server whose failures are set per test
#[derive(Debug, Clone, Default)]
struct ScriptedService {
    script: Arc<Mutex<Script>>,
}

impl ScriptedService {
    fn refusing_sessions() -> Self {
        let service = Self::default();
        service.script.lock().unwrap().refuse_sessions = true;
        service
    }

    fn set_refuse_sessions(&self, refuse: bool) {
        self.script.lock().unwrap().refuse_sessions = refuse;
    }

    fn fail_on(&self, command: Option<&str>) {
        self.script.lock().unwrap().fail_on = command.map(|c| c.as_bytes().to_vec());
    }

    fn session_calls(&self) -> usize {
        self.script.lock().unwrap().session_calls
    }

    fn appended(&self) -> Vec<(u64, Vec<u8>)> {
        self.script.lock().unwrap().appended.clone()
    }
}

#[async_trait]
impl HistoryService for ScriptedService {
    async fn create_session(&self) -> Result<u64, ClientError> {
        let mut script = self.script.lock().unwrap();
        script.session_calls += 1;
        if script.refuse_sessions {
            return Err(ClientError::Status(reqwest::StatusCode::SERVICE_UNAVAILABLE));
        }
        script.next_session += 1;
        Ok(script.next_session)
    }

    async fn append(&self, session: u64, command: &[u8]) -> Result<(), ClientError> {
        let mut script = self.script.lock().unwrap();
        if script.fail_on.as_deref() == Some(command) {
            return Err(ClientError::Status(reqwest::StatusCode::INTERNAL_SERVER_ERROR));
        }
        script.appended.push((session, command.to_vec()));
        Ok(())
    }

    async fn last(&self, _count: u64, _session: u64) -> Result<Bytes, ClientError> {
        Ok(Bytes::new())
    }
}

fn buffer_in(temp_dir: &TempDir) -> PathBuf {
    temp_dir.path().join("history-buffer")
}

fn agent_for(path: &Path, service: ScriptedService) -> UploadAgent<ScriptedService> {
    let config = AgentConfig::default()
        .with_buffer(path)
        .with_lock_timeout(Duration::from_millis(200));
    UploadAgent::new(service, config)
}

fn appended(pairs: &[(u64, &str)]) -> Vec<(u64, Vec<u8>)> {
    pairs.iter().map(|(s, c)| (*s, c.as_bytes().to_vec())).collect()
}

#[tokio::test]
async fn test_failed_append_keeps_unacknowledged_tail() {
    let temp_dir = TempDir::new().unwrap();
    let path = buffer_in(&temp_dir);
    std::fs::write(&path, b"7\0a\0b\0c").unwrap();

    let service = ScriptedService::default();
    service.fail_on(Some("b"));
    let agent = agent_for(&path, service.clone());

    let err = agent.record_command(b"d").await.unwrap_err();
    match err {
        AgentError::Flush {
            acknowledged,
            remaining,
            ..
        } => {
            assert_eq!(acknowledged, 1);
            assert_eq!(remaining, 3);
        }
        other => panic!("unexpected error: {:?}", other),
    }
    assert_eq!(std::fs::read(&path).unwrap(), b"7\0b\0c\0d");
    assert_eq!(service.appended(), appended(&[(7, "a")]));

    // Next invocation resumes at "b" and never re-sends "a"
    service.fail_on(None);
    let outcome = agent.flush().await.unwrap();
    assert_eq!(outcome, UploadOutcome::Flushed { session: 7, uploaded: 3 });
    assert_eq!(service.appended(), appended(&[(7, "a"), (7, "b"), (7, "c"), (7, "d")]));
    assert_eq!(std::fs::read(&path).unwrap(), b"7");
    assert_eq!(service.session_calls(), 0);
}

#[tokio::test]
async fn test_flush_failure_drops_only_acknowledged_entries() {
    let temp_dir = TempDir::new().unwrap();
    let path = buffer_in(&temp_dir);
    std::fs::write(&path, b"4\0a\0b\0c").unwrap();

    let service = ScriptedService::default();
    service.fail_on(Some("b"));
    let agent = agent_for(&path, service.clone());

    assert!(matches!(
        agent.flush().await,
        Err(AgentError::Flush {
            acknowledged: 1,
            remaining: 2,
            ..
        })
    ));
    assert_eq!(std::fs::read(&path).unwrap(), b"4\0b\0c");

    service.fail_on(None);
    assert_eq!(
        agent.flush().await.unwrap(),
        UploadOutcome::Flushed { session: 4, uploaded: 2 }
    );
    assert_eq!(service.appended(), appended(&[(4, "a"), (4, "b"), (4, "c")]));
}

#[tokio::test]
async fn test_bootstrap_failure_queues_without_appending() {
    let temp_dir = TempDir::new().unwrap();
    let path = buffer_in(&temp_dir);

    let service = ScriptedService::refusing_sessions();
    let agent = agent_for(&path, service.clone());

    let outcome = agent.record_command(b"x").await.unwrap();
    assert_eq!(outcome, UploadOutcome::Deferred { queued: 1 });
    assert_eq!(std::fs::read(&path).unwrap(), b"\0x");
    assert!(service.appended().is_empty());

    // Recovery bootstraps once and uploads the backlog in order
    service.set_refuse_sessions(false);
    let outcome = agent.record_command(b"y").await.unwrap();
    assert_eq!(outcome, UploadOutcome::Flushed { session: 1, uploaded: 2 });
    assert_eq!(service.appended(), appended(&[(1, "x"), (1, "y")]));
    assert_eq!(std::fs::read(&path).unwrap(), b"1");
}

#[tokio::test]
async fn test_success_caches_session() {
    let temp_dir = TempDir::new().unwrap();
    let path = buffer_in(&temp_dir);

    let service = ScriptedService::default();
    let agent = agent_for(&path, service.clone());

    assert_eq!(
        agent.record(b"  1  ls\n").await.unwrap(),
        UploadOutcome::Flushed { session: 1, uploaded: 1 }
    );
    assert_eq!(std::fs::read(&path).unwrap(), b"1");

    assert_eq!(
        agent.record(b"  2  pwd\n").await.unwrap(),
        UploadOutcome::Flushed { session: 1, uploaded: 1 }
    );
    assert_eq!(std::fs::read(&path).unwrap(), b"1");
    assert_eq!(service.session_calls(), 1);
    assert_eq!(service.appended(), appended(&[(1, "ls"), (1, "pwd")]));
}

#[tokio::test]
async fn test_without_buffer_is_noop() {
    let service = ScriptedService::default();
    let agent = UploadAgent::new(service.clone(), AgentConfig::default());

    assert_eq!(agent.record(b"5 make").await.unwrap(), UploadOutcome::Disabled);
    assert_eq!(agent.flush().await.unwrap(), UploadOutcome::Disabled);
    assert_eq!(service.session_calls(), 0);
    assert!(service.appended().is_empty());
}

#[tokio::test]
async fn test_nothing_to_upload_makes_no_calls() {
    let temp_dir = TempDir::new().unwrap();
    let path = buffer_in(&temp_dir);
    std::fs::write(&path, b"5").unwrap();

    let service = ScriptedService::default();
    let agent = agent_for(&path, service.clone());

    assert_eq!(agent.flush().await.unwrap(), UploadOutcome::Empty);
    assert_eq!(agent.record(b"  42  \n").await.unwrap(), UploadOutcome::Empty);
    assert_eq!(std::fs::read(&path).unwrap(), b"5");
    assert_eq!(service.session_calls(), 0);
    assert!(service.appended().is_empty());
}

#[tokio::test]
async fn test_held_lock_times_out_and_leaves_buffer() {
    let temp_dir = TempDir::new().unwrap();
    let path = buffer_in(&temp_dir);
    std::fs::write(&path, b"3\0queued").unwrap();

    let held = LocalLogBuffer::acquire(&path, Duration::from_secs(1)).await.unwrap();

    let service = ScriptedService::default();
    let agent = agent_for(&path, service.clone());
    let err = agent.record_command(b"dropped").await.unwrap_err();
    assert!(matches!(err, AgentError::LockTimeout { .. }));

    drop(held);
    assert_eq!(std::fs::read(&path).unwrap(), b"3\0queued");
    assert!(service.appended().is_empty());
}

#[tokio::test]
async fn test_nul_in_command_is_rejected() {
    let temp_dir = TempDir::new().unwrap();
    let path = buffer_in(&temp_dir);
    std::fs::write(&path, b"3\0a").unwrap();

    let service = ScriptedService::default();
    let agent = agent_for(&path, service.clone());

    let err = agent.record_command(b"echo a\0b").await.unwrap_err();
    assert!(matches!(err, AgentError::InvalidCommand));
    assert_eq!(std::fs::read(&path).unwrap(), b"3\0a");
    assert!(service.appended().is_empty());
}

#[tokio::test]
async fn test_end_to_end_against_server() {
    let server_dir = TempDir::new().unwrap();
    let store = cmdlog_store::OrderedStore::open(cmdlog_store::StoreConfig {
        db_path: server_dir.path().join("history.redb"),
    })
    .unwrap();
    let state = cmdlog_server::AppState::new(Arc::new(store));

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let (stop_tx, stop_rx) = tokio::sync::oneshot::channel::<()>();
    let server = tokio::spawn(cmdlog_server::serve(listener, state, async {
        let _ = stop_rx.await;
    }));

    let client_dir = TempDir::new().unwrap();
    let path = buffer_in(&client_dir);
    let config = AgentConfig {
        server_url: format!("http://{}", addr),
        ..AgentConfig::default()
    }
    .with_buffer(&path);
    let service = HttpHistoryService::new(&config.server_url, config.request_timeout).unwrap();
    let agent = UploadAgent::new(service.clone(), config);

    assert_eq!(
        agent.record(b"1 echo one").await.unwrap(),
        UploadOutcome::Flushed { session: 1, uploaded: 1 }
    );
    agent.record(b"2 echo two").await.unwrap();
    assert_eq!(std::fs::read(&path).unwrap(), b"1");

    let other = service.create_session().await.unwrap();
    assert_eq!(other, 2);
    service.append(other, b"elsewhere").await.unwrap();

    let all = service.last(10, 0).await.unwrap();
    assert_eq!(&all[..], b"elsewhere\0echo two\0echo one\0");

    let mine = service.last(10, 1).await.unwrap();
    assert_eq!(&mine[..], b"echo two\0echo one\0");

    let newest = service.last(1, 0).await.unwrap();
    assert_eq!(&newest[..], b"elsewhere\0");

    let _ = stop_tx.send(());
    drop(server);
}

async fn spawn_stub(router: axum::Router) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });
    format!("http://{}", addr)
}

fn http_agent(base_url: &str, path: &Path) -> UploadAgent<HttpHistoryService> {
    let config = AgentConfig {
        server_url: base_url.to_string(),
        ..AgentConfig::default()
    }
    .with_buffer(path);
    let service = HttpHistoryService::new(&config.server_url, config.request_timeout).unwrap();
    UploadAgent::new(service, config)
}

#[tokio::test]
async fn test_http_error_status_keeps_tail() {
    use axum::{Router, extract::State, http::StatusCode, routing::post};
    use std::sync::atomic::{AtomicUsize, Ordering};

    // First append is accepted, every later one fails like a broken store
    let hits = Arc::new(AtomicUsize::new(0));
    let router = Router::new()
        .route(
            "/log",
            post(|State(hits): State<Arc<AtomicUsize>>| async move {
                if hits.fetch_add(1, Ordering::SeqCst) == 0 {
                    (StatusCode::OK, "")
                } else {
                    (StatusCode::INTERNAL_SERVER_ERROR, "error")
                }
            }),
        )
        .with_state(hits.clone());
    let base_url = spawn_stub(router).await;

    let temp_dir = TempDir::new().unwrap();
    let path = buffer_in(&temp_dir);
    std::fs::write(&path, b"3\0a\0b").unwrap();

    let err = http_agent(&base_url, &path).record_command(b"c").await.unwrap_err();
    match err {
        AgentError::Flush {
            acknowledged,
            remaining,
            source: ClientError::Status(status),
        } => {
            assert_eq!(acknowledged, 1);
            assert_eq!(remaining, 2);
            assert_eq!(status, reqwest::StatusCode::INTERNAL_SERVER_ERROR);
        }
        other => panic!("unexpected error: {:?}", other),
    }
    assert_eq!(std::fs::read(&path).unwrap(), b"3\0b\0c");
    assert_eq!(hits.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn test_non_numeric_session_body_defers() {
    use axum::{Router, extract::State, routing::get, routing::post};
    use std::sync::atomic::{AtomicUsize, Ordering};

    let log_calls = Arc::new(AtomicUsize::new(0));
    let router = Router::new()
        .route("/session", get(|| async { "oops" }))
        .route(
            "/log",
            post(|State(calls): State<Arc<AtomicUsize>>| async move {
                calls.fetch_add(1, Ordering::SeqCst);
            }),
        )
        .with_state(log_calls.clone());
    let base_url = spawn_stub(router).await;

    let service = HttpHistoryService::new(&base_url, Duration::from_secs(5)).unwrap();
    assert!(matches!(
        service.create_session().await,
        Err(ClientError::InvalidSession(body)) if body == "oops"
    ));

    let temp_dir = TempDir::new().unwrap();
    let path = buffer_in(&temp_dir);
    let outcome = http_agent(&base_url, &path).record_command(b"x").await.unwrap();
    assert_eq!(outcome, UploadOutcome::Deferred { queued: 1 });
    assert_eq!(std::fs::read(&path).unwrap(), b"\0x");
    assert_eq!(log_calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_non_utf8_command_reaches_server_unchanged() {
    let server_dir = TempDir::new().unwrap();
    let store = cmdlog_store::OrderedStore::open(cmdlog_store::StoreConfig {
        db_path: server_dir.path().join("history.redb"),
    })
    .unwrap();
    let state = cmdlog_server::AppState::new(Arc::new(store));
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let base_url = format!("http://{}", listener.local_addr().unwrap());
    tokio::spawn(cmdlog_server::serve(listener, state, std::future::pending()));

    let client_dir = TempDir::new().unwrap();
    let path = buffer_in(&client_dir);
    let agent = http_agent(&base_url, &path);

    agent.record(b"12 cat caf\xe9 a+b&c=%41").await.unwrap();
    assert_eq!(std::fs::read(&path).unwrap(), b"1");

    let service = HttpHistoryService::new(&base_url, Duration::from_secs(5)).unwrap();
    let body = service.last(10, 1).await.unwrap();
    assert_eq!(&body[..], b"cat caf\xe9 a+b&c=%41\0");
}
