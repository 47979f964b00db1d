// tests/api_http.rs
//
// HTTP-level tests for the snapshot Router without opening sockets.
// We exercise the router directly via tower::ServiceExt::oneshot.

mod common;

use std::sync::Arc;
use std::time::Duration;

use axum::{
    body::{self, Body},
    http::{Request, StatusCode},
    Router,
};
use serde_json::Value as Json;
use tower::ServiceExt as _;

use common::{repo, wait_for, ScriptedClient, Step};
use portfolio_refresh::{
    create_router, AppState, Backoff, Scheduler, SnapshotStatus, SnapshotStore, SourceConfig,
    SourceKind,
};

const BODY_LIMIT: usize = 1024 * 1024;

fn test_app(client: Arc<ScriptedClient>) -> (Router, Arc<Scheduler>) {
    let store = Arc::new(SnapshotStore::new());
    let mut s = Scheduler::new(store, Backoff::none());
    s.register_source(
        SourceConfig::new(SourceKind::Repos, "someone"),
        Duration::from_secs(1800),
        client,
    )
    .unwrap();
    let s = Arc::new(s);
    (create_router(AppState::new(s.clone())), s)
}

async fn send(app: &Router, method: &str, uri: &str) -> (StatusCode, Vec<u8>) {
    let req = Request::builder()
        .method(method)
        .uri(uri)
        .body(Body::empty())
        .expect("build request");
    let resp = app.clone().oneshot(req).await.expect("oneshot");
    let status = resp.status();
    let bytes = body::to_bytes(resp.into_body(), BODY_LIMIT)
        .await
        .expect("read body")
        .to_vec();
    (status, bytes)
}

#[tokio::test]
async fn health_returns_ok() {
    let (app, _) = test_app(ScriptedClient::new(SourceKind::Repos, vec![]));
    let (status, body) = send(&app, "GET", "/health").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(String::from_utf8(body).unwrap(), "ok");
}

#[tokio::test]
async fn unfetched_source_returns_sentinel() {
    let (app, _) = test_app(ScriptedClient::new(SourceKind::Repos, vec![]));
    let (status, body) = send(&app, "GET", "/snapshots/repos").await;
    assert_eq!(status, StatusCode::OK);
    let v: Json = serde_json::from_slice(&body).unwrap();
    assert_eq!(v["source"], "repos");
    assert_eq!(v["status"], "never_fetched");
    assert!(v["fetched_at"].is_null());
    assert_eq!(v["items"].as_array().unwrap().len(), 0);
}

#[tokio::test]
async fn unknown_source_is_404() {
    let (app, _) = test_app(ScriptedClient::new(SourceKind::Repos, vec![]));
    let (status, _) = send(&app, "GET", "/snapshots/medium").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    let (status, _) = send(&app, "POST", "/admin/refresh/nope").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    // Known kind, but not scheduled.
    let (status, _) = send(&app, "POST", "/admin/refresh/drive").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn admin_refresh_updates_snapshot() {
    let client = ScriptedClient::new(SourceKind::Repos, vec![Step::Items(vec![repo("site")])]);
    let (app, s) = test_app(client);

    let (status, _) = send(&app, "POST", "/admin/refresh/repos").await;
    assert_eq!(status, StatusCode::ACCEPTED);
    let store = s.store().clone();
    wait_for(|| store.get(SourceKind::Repos).status == SnapshotStatus::Ok).await;

    let (_, body) = send(&app, "GET", "/snapshots/REPOS").await;
    let v: Json = serde_json::from_slice(&body).unwrap();
    assert_eq!(v["status"], "ok");
    assert_eq!(v["items"][0]["kind"], "repo");
    assert_eq!(v["items"][0]["name"], "site");

    let (_, body) = send(&app, "GET", "/snapshots").await;
    let all: Json = serde_json::from_slice(&body).unwrap();
    let sources: Vec<_> = all
        .as_array()
        .unwrap()
        .iter()
        .map(|s| s["source"].as_str().unwrap().to_string())
        .collect();
    assert_eq!(sources, vec!["blog", "repos", "drive"]);
}

#[tokio::test]
async fn admin_refresh_conflicts_while_in_flight() {
    let client = ScriptedClient::gated(SourceKind::Repos, vec![Step::Items(vec![])]);
    let (app, s) = test_app(client.clone());

    let (status, _) = send(&app, "POST", "/admin/refresh/repos").await;
    assert_eq!(status, StatusCode::ACCEPTED);
    client.started.notified().await;

    let (status, _) = send(&app, "POST", "/admin/refresh/repos").await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(s.skipped(SourceKind::Repos), 1);

    client.release(1);
    s.shutdown().await;
    let (status, _) = send(&app, "POST", "/admin/refresh/repos").await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
}

#[tokio::test]
async fn admin_refresh_with_panicking_client_marks_source() {
    let client = ScriptedClient::new(SourceKind::Repos, vec![Step::Panic]);
    let (app, s) = test_app(client);

    let (status, _) = send(&app, "POST", "/admin/refresh/repos").await;
    assert_eq!(status, StatusCode::ACCEPTED);
    let store = s.store().clone();
    wait_for(|| store.get(SourceKind::Repos).status == SnapshotStatus::Error).await;
    wait_for(|| !s.is_in_flight(SourceKind::Repos)).await;

    let (_, body) = send(&app, "GET", "/snapshots/repos").await;
    let v: Json = serde_json::from_slice(&body).unwrap();
    assert!(v["reason"].as_str().unwrap().contains("panicked"));
}
