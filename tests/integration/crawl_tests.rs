//! Integration tests for the crawler
//!
//! These tests use wiremock to stand in for the repository API and run the full crawl
//! cycle end-to-end against a temporary result directory.

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use repo_sieve::config::{ApiConfig, Config, CrawlerConfig, OutputConfig, SearchConfig};
use repo_sieve::crawler::{Coordinator, Shutdown, ShutdownListener, StopReason};
use repo_sieve::state::CheckedSnapshot;
use repo_sieve::storage::{JsonStorage, RepoRecord, Storage};
use serde_json::{json, Value};
use std::time::Duration;
use tempfile::TempDir;
use wiremock::matchers::{method, path, path_regex};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// Creates a test configuration covering a single two-week window
fn create_test_config(server: &MockServer, dir: &TempDir) -> Config {
    Config {
        crawler: CrawlerConfig {
            batch_size: 10,
            politeness_delay_ms: 0,
            failure_backoff_secs: 1,
            deferred_retries: 1,
        },
        search: SearchConfig {
            start_date: "2020-01-01".to_string(),
            end_date: "2020-01-14".to_string(),
            ..SearchConfig::default()
        },
        api: ApiConfig {
            base_url: server.uri(),
            ..ApiConfig::default()
        },
        output: OutputConfig {
            result_dir: dir.path().display().to_string(),
            ..OutputConfig::default()
        },
        ..Config::default()
    }
}

fn coordinator(config: Config, fresh: bool, shutdown: ShutdownListener) -> Coordinator {
    let storage = JsonStorage::open(&config.output).expect("Failed to open storage");
    Coordinator::with_storage(
        config,
        Box::new(storage),
        vec!["token-one".to_string()],
        fresh,
        shutdown,
    )
    .expect("Failed to create coordinator")
}

fn search_item(owner: &str, name: &str) -> Value {
    json!({
        "name": name,
        "owner": {"login": owner},
        "html_url": format!("https://github.com/{}/{}", owner, name)
    })
}

fn encoded(text: &str) -> Value {
    json!({"content": STANDARD.encode(text), "encoding": "base64"})
}

async fn mount_search(server: &MockServer, items: Vec<Value>) {
    Mock::given(method("GET"))
        .and(path("/search/repositories"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "total_count": items.len(),
            "incomplete_results": false,
            "items": items
        })))
        .mount(server)
        .await;
}

/// Mounts a qualifying repository whose tree holds 60 test files and 5 source files
async fn mount_qualifying_repo(server: &MockServer, owner: &str, name: &str) {
    let base = format!("/repos/{}/{}", owner, name);

    Mock::given(method("GET"))
        .and(path(format!("{}/contents/requirements.txt", base)))
        .respond_with(ResponseTemplate::new(200).set_body_json(encoded(
            "PYTEST==7.0\nfastapi>=0.1\nuvicorn\n",
        )))
        .mount(server)
        .await;

    Mock::given(method("GET"))
        .and(path(base.clone()))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"default_branch": "main"})))
        .mount(server)
        .await;

    let mut tree: Vec<Value> = (0..60)
        .map(|i| json!({"path": format!("tests/test_{:02}.py", i), "type": "blob"}))
        .collect();
    tree.extend((0..5).map(|i| json!({"path": format!("app/module_{}.py", i), "type": "blob"})));
    tree.push(json!({"path": "app/test_helpers.py", "type": "blob"}));
    tree.push(json!({"path": "README.md", "type": "blob"}));
    tree.push(json!({"path": "app", "type": "tree"}));

    Mock::given(method("GET"))
        .and(path(format!("{}/git/trees/main", base)))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "tree": tree,
            "truncated": false
        })))
        .mount(server)
        .await;

    Mock::given(method("GET"))
        .and(path_regex(format!(r"^{}/contents/(tests|app)/.+\.py$", base)))
        .respond_with(ResponseTemplate::new(200).set_body_json(encoded("import fastapi\n")))
        .mount(server)
        .await;
}

fn read_records(dir: &TempDir) -> Vec<RepoRecord> {
    let content = std::fs::read_to_string(
        dir.path()
            .join(OutputConfig::default().results_file),
    )
    .expect("Failed to read result store");
    content
        .lines()
        .map(|line| serde_json::from_str(line).expect("Malformed record"))
        .collect()
}

#[tokio::test]
async fn test_full_crawl_single_window() {
    let server = MockServer::start().await;
    let dir = TempDir::new().unwrap();
    let config = create_test_config(&server, &dir);

    // carol/old was inspected by an earlier run
    let mut storage = JsonStorage::open(&config.output).unwrap();
    storage
        .save_checked(&CheckedSnapshot {
            checked: vec!["carol/old".to_string()],
            qualified: vec![],
        })
        .unwrap();

    mount_search(
        &server,
        vec![
            search_item("alice", "plain"),
            search_item("bob", "svc"),
            search_item("carol", "old"),
        ],
    )
    .await;
    // alice/plain has no manifest: every unmatched request is a 404
    mount_qualifying_repo(&server, "bob", "svc").await;

    let mut coordinator = coordinator(config.clone(), false, ShutdownListener::never());
    let summary = coordinator.run().await.expect("Crawl failed");

    assert_eq!(summary.stop, StopReason::Finished);
    assert_eq!(summary.pages, 1);
    assert_eq!(summary.inspected, 2);
    assert_eq!(summary.collected, 1);

    // Exactly one complete record, capped at 50 test files
    let records = read_records(&dir);
    assert_eq!(records.len(), 1);
    let record = &records[0];
    assert_eq!(record.owner, "bob");
    assert_eq!(record.name, "svc");
    assert_eq!(record.url, "https://github.com/bob/svc");
    assert_eq!(record.test_files.len(), 50);
    assert_eq!(record.test_files[0].path, "tests/test_00.py");
    assert_eq!(record.test_files[49].path, "tests/test_49.py");
    assert_eq!(record.source_files.len(), 5);
    assert!(record
        .source_files
        .iter()
        .all(|f| f.path.starts_with("app/module_") && f.content == "import fastapi\n"));

    // Standalone snapshot: info line plus one line per file
    let snapshot = std::fs::read_to_string(dir.path().join("bob_svc.jsonl")).unwrap();
    assert_eq!(snapshot.lines().count(), 56);

    // Checked set persisted with both new identities; only bob/svc qualified
    let storage = JsonStorage::open(&config.output).unwrap();
    let checked = storage.load_checked().unwrap().unwrap();
    for repo in ["alice/plain", "bob/svc", "carol/old"] {
        assert!(checked.checked.contains(&repo.to_string()), "{} not checked", repo);
    }
    assert_eq!(checked.qualified, vec!["bob/svc".to_string()]);

    // Cursor finished
    let window = storage.load_window().unwrap().unwrap();
    assert!(window.is_terminal());

    // No request ever touched the previously checked repository
    let requests = server.received_requests().await.unwrap();
    assert!(requests.iter().all(|r| !r.url.path().contains("/carol/")));
    assert!(requests
        .iter()
        .any(|r| r.url.path() == "/repos/alice/plain/contents/requirements.txt"));
}

#[tokio::test]
async fn test_rerun_does_not_reinspect_checked_repositories() {
    let server = MockServer::start().await;
    let dir = TempDir::new().unwrap();
    let config = create_test_config(&server, &dir);

    mount_search(
        &server,
        vec![search_item("alice", "plain"), search_item("bob", "svc")],
    )
    .await;
    mount_qualifying_repo(&server, "bob", "svc").await;

    let mut first = coordinator(config.clone(), false, ShutdownListener::never());
    first.run().await.unwrap();
    let after_first = server.received_requests().await.unwrap().len();

    // Start the window walk over; every candidate is already known
    let mut second = coordinator(config, true, ShutdownListener::never());
    let summary = second.run().await.unwrap();

    assert_eq!(summary.stop, StopReason::Finished);
    assert_eq!(summary.inspected, 0);
    let requests = server.received_requests().await.unwrap();
    assert_eq!(requests.len(), after_first + 1);
    assert_eq!(requests.last().unwrap().url.path(), "/search/repositories");
    assert_eq!(read_records(&dir).len(), 1);
}

#[tokio::test]
async fn test_finished_cursor_issues_no_requests() {
    let server = MockServer::start().await;
    let dir = TempDir::new().unwrap();
    let config = create_test_config(&server, &dir);
    mount_search(&server, vec![]).await;

    coordinator(config.clone(), false, ShutdownListener::never())
        .run()
        .await
        .unwrap();
    let after_first = server.received_requests().await.unwrap().len();
    assert_eq!(after_first, 1);

    let summary = coordinator(config, false, ShutdownListener::never())
        .run()
        .await
        .unwrap();
    assert_eq!(summary.pages, 0);
    assert_eq!(server.received_requests().await.unwrap().len(), after_first);
}

#[tokio::test]
async fn test_interrupt_during_rate_limit_wait() {
    let server = MockServer::start().await;
    let dir = TempDir::new().unwrap();
    let config = create_test_config(&server, &dir);

    mount_search(&server, vec![search_item("bob", "svc")]).await;

    // The only token is exhausted for an hour after the manifest request
    let reset = chrono::Utc::now().timestamp() + 3600;
    Mock::given(method("GET"))
        .and(path("/repos/bob/svc/contents/requirements.txt"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("x-ratelimit-remaining", "0")
                .insert_header("x-ratelimit-reset", reset.to_string().as_str())
                .set_body_json(encoded("pytest\nfastapi\n")),
        )
        .mount(&server)
        .await;

    let shutdown = Shutdown::new();
    let mut coordinator = coordinator(config.clone(), false, shutdown.listener());

    let trigger = tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(500)).await;
        shutdown.trigger();
    });

    let summary = tokio::time::timeout(Duration::from_secs(30), coordinator.run())
        .await
        .expect("Crawl did not stop after shutdown")
        .unwrap();
    trigger.await.unwrap();

    assert_eq!(summary.stop, StopReason::Interrupted);

    // Nothing half-collected, and the repository will be inspected again on resume
    assert!(read_records(&dir).is_empty());
    let storage = JsonStorage::open(&config.output).unwrap();
    let checked = storage.load_checked().unwrap().unwrap_or_default();
    assert!(!checked.checked.contains(&"bob/svc".to_string()));

    // Cursor still points at the window that was in progress
    let window = storage.load_window().unwrap().unwrap();
    assert_eq!(window.start_date.to_string(), "2020-01-01");
    assert_eq!(window.page, 1);
}

#[tokio::test]
async fn test_transient_manifest_failure_recovers_within_run() {
    let server = MockServer::start().await;
    let dir = TempDir::new().unwrap();
    let config = create_test_config(&server, &dir);

    mount_search(&server, vec![search_item("bob", "svc")]).await;
    Mock::given(method("GET"))
        .and(path("/repos/bob/svc/contents/requirements.txt"))
        .respond_with(ResponseTemplate::new(502).set_body_string("bad gateway"))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    mount_qualifying_repo(&server, "bob", "svc").await;

    let summary = coordinator(config, false, ShutdownListener::never())
        .run()
        .await
        .unwrap();

    assert_eq!(summary.collected, 1);
    assert_eq!(summary.deferred, 0);
    assert_eq!(read_records(&dir).len(), 1);
}

#[tokio::test]
async fn test_persistent_manifest_failure_is_checked_before_cursor_moves_on() {
    let server = MockServer::start().await;
    let dir = TempDir::new().unwrap();
    let config = create_test_config(&server, &dir);

    mount_search(&server, vec![search_item("dave", "flaky")]).await;
    Mock::given(method("GET"))
        .and(path("/repos/dave/flaky/contents/requirements.txt"))
        .respond_with(ResponseTemplate::new(502).set_body_string("bad gateway"))
        .mount(&server)
        .await;

    let first = coordinator(config.clone(), false, ShutdownListener::never())
        .run()
        .await
        .unwrap();
    assert_eq!(first.stop, StopReason::Finished);
    assert_eq!(first.deferred, 1);

    let manifest_requests = |requests: &[wiremock::Request]| {
        requests
            .iter()
            .filter(|r| r.url.path().ends_with("/requirements.txt"))
            .count()
    };
    let requests = server.received_requests().await.unwrap();
    // One initial attempt plus one retry round
    assert_eq!(manifest_requests(&requests), 2);

    let storage = JsonStorage::open(&config.output).unwrap();
    let checked = storage.load_checked().unwrap().unwrap();
    assert_eq!(checked.checked, vec!["dave/flaky".to_string()]);
    assert!(checked.qualified.is_empty());

    // A second run, even over the same window again, does not inspect it anew
    let second = coordinator(config, true, ShutdownListener::never())
        .run()
        .await
        .unwrap();
    assert_eq!(second.inspected, 0);
    let requests = server.received_requests().await.unwrap();
    assert_eq!(manifest_requests(&requests), 2);
}
