//! `HttpPlatform` against a stub of the v3 API served on `127.0.0.1:0`.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::body::Bytes;
use axum::extract::{Query, State};
use axum::http::header::AUTHORIZATION;
use axum::http::{HeaderMap, Method, StatusCode, Uri};
use axum::response::{IntoResponse, Response};
use axum::{Json, Router};
use serde_json::{json, Value};
use stackshift_core::model::{AppState, PlatformVersion, RestartStrategy};
use stackshift_core::platform::http::{HttpPlatform, PlatformConfig};
use stackshift_core::prelude::*;

#[derive(Debug, Clone)]
struct Recorded {
    method: String,
    path: String,
    auth: Option<String>,
    body: Value,
}

#[derive(Debug)]
struct StubState {
    version: String,
    app_state: String,
    app_stack: String,
    stacks: Vec<String>,
    current_droplet: String,
    duplicate_apps: bool,
    fail_builds: bool,
    reject_stack: Option<String>,
    requests: Vec<Recorded>,
}

impl Default for StubState {
    fn default() -> Self {
        Self {
            version: "3.102.0".into(),
            app_state: "STARTED".into(),
            app_stack: "stackA".into(),
            stacks: vec!["stackA".into(), "stackB".into()],
            current_droplet: "droplet-old".into(),
            duplicate_apps: false,
            fail_builds: false,
            reject_stack: None,
            requests: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Default)]
struct Stub {
    state: Arc<Mutex<StubState>>,
}

impl Stub {
    fn requests(&self) -> Vec<Recorded> {
        self.state.lock().unwrap().requests.clone()
    }

    fn calls(&self) -> Vec<String> {
        self.requests()
            .into_iter()
            .map(|r| format!("{} {}", r.method, r.path))
            .collect()
    }

    async fn serve(&self) -> String {
        let app = Router::new().fallback(handle).with_state(self.clone());
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let _ = axum::serve(listener, app).await;
        });
        format!("http://{addr}")
    }
}

fn app_json(state: &StubState, guid: &str) -> Value {
    json!({
        "guid": guid,
        "name": "appA",
        "state": state.app_state,
        "lifecycle": {"type": "buildpack", "data": {"stack": state.app_stack, "buildpacks": []}},
        "relationships": {"space": {"data": {"guid": "space-1"}}}
    })
}

fn cf_error(status: StatusCode, title: &str, code: i64, detail: &str) -> Response {
    (
        status,
        Json(json!({"errors": [{"detail": detail, "title": title, "code": code}]})),
    )
        .into_response()
}

fn names(query: &HashMap<String, String>) -> impl Iterator<Item = &str> {
    query
        .get("names")
        .map(String::as_str)
        .unwrap_or_default()
        .split(',')
}

async fn handle(
    State(stub): State<Stub>,
    method: Method,
    uri: Uri,
    Query(query): Query<HashMap<String, String>>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let body: Value = serde_json::from_slice(&body).unwrap_or(Value::Null);
    let mut state = stub.state.lock().unwrap();
    state.requests.push(Recorded {
        method: method.to_string(),
        path: uri.path().to_string(),
        auth: headers
            .get(AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string),
        body: body.clone(),
    });

    let segments: Vec<&str> = uri.path().trim_matches('/').split('/').collect();
    match (method.as_str(), segments.as_slice()) {
        ("GET", [""]) => Json(json!({
            "links": {"cloud_controller_v3": {"href": "http://stub/v3", "meta": {"version": state.version}}}
        }))
        .into_response(),
        ("GET", ["v3", "apps"]) => {
            let mut resources = Vec::new();
            if names(&query).any(|n| n == "appA") {
                resources.push(app_json(&state, "app-1"));
                if state.duplicate_apps {
                    resources.push(app_json(&state, "app-2"));
                }
            }
            Json(json!({"resources": resources})).into_response()
        }
        ("GET", ["v3", "stacks"]) => {
            let wanted: Vec<&str> = names(&query).collect();
            let resources: Vec<Value> = state
                .stacks
                .iter()
                .filter(|s| wanted.contains(&s.as_str()))
                .map(|s| json!({"guid": format!("stack-{s}"), "name": s}))
                .collect();
            Json(json!({"resources": resources})).into_response()
        }
        ("PATCH", ["v3", "apps", guid]) => {
            let stack = body["lifecycle"]["data"]["stack"]
                .as_str()
                .unwrap_or_default()
                .to_string();
            if state.reject_stack.as_deref() == Some(stack.as_str()) {
                return cf_error(
                    StatusCode::UNPROCESSABLE_ENTITY,
                    "CF-UnprocessableEntity",
                    10008,
                    &format!("Stack '{stack}' is not available"),
                );
            }
            state.app_stack = stack;
            Json(app_json(&state, guid)).into_response()
        }
        ("GET", ["v3", "apps", _, "droplets", "current"]) => Json(json!({
            "guid": state.current_droplet,
            "state": "STAGED",
            "stack": "stackA",
            "links": {"package": {"href": "https://api.example.com/v3/packages/pkg-1"}}
        }))
        .into_response(),
        ("POST", ["v3", "builds"]) => (
            StatusCode::CREATED,
            Json(json!({"guid": "build-1", "state": "STAGING", "droplet": null, "error": null})),
        )
            .into_response(),
        ("GET", ["v3", "builds", guid]) => {
            if state.fail_builds {
                Json(json!({
                    "guid": guid, "state": "FAILED", "droplet": null,
                    "error": "BuildpackCompileFailed - App staging failed"
                }))
                .into_response()
            } else {
                Json(json!({
                    "guid": guid, "state": "STAGED", "droplet": {"guid": "droplet-new"}, "error": null
                }))
                .into_response()
            }
        }
        ("PATCH", ["v3", "apps", _, "relationships", "current_droplet"]) => {
            if let Some(guid) = body["data"]["guid"].as_str() {
                state.current_droplet = guid.to_string();
            }
            Json(body).into_response()
        }
        ("POST", ["v3", "apps", guid, "actions", action]) => {
            state.app_state = if *action == "stop" { "STOPPED" } else { "STARTED" }.into();
            Json(app_json(&state, guid)).into_response()
        }
        ("POST", ["v3", "deployments"]) => {
            (StatusCode::CREATED, Json(json!({"guid": "deployment-1"}))).into_response()
        }
        _ => cf_error(
            StatusCode::NOT_FOUND,
            "CF-ResourceNotFound",
            10010,
            "Resource not found",
        ),
    }
}

async fn platform(stub: &Stub) -> HttpPlatform {
    let url = stub.serve().await;
    HttpPlatform::new(&PlatformConfig::new(url).with_token("secret-token")).unwrap()
}

fn fast_config() -> MigrationConfig {
    MigrationConfig::default()
        .with_poll_interval(Duration::from_millis(5))
        .with_build_timeout(Some(Duration::from_secs(5)))
}

#[tokio::test]
async fn find_app_sends_name_and_token() {
    let stub = Stub::default();
    let platform = platform(&stub).await;

    let app = platform.find_app("appA").await.unwrap();

    assert_eq!(app.guid, "app-1");
    assert_eq!(app.stack, "stackA");
    assert_eq!(app.state, AppState::Started);
    let request = &stub.requests()[0];
    assert_eq!(request.auth.as_deref(), Some("Bearer secret-token"));
}

#[tokio::test]
async fn ambiguous_or_missing_apps_are_errors() {
    let stub = Stub::default();
    let platform = platform(&stub).await;

    let err = platform.find_app("nope").await.unwrap_err();
    assert!(matches!(err, Error::NotFound { .. }));

    stub.state.lock().unwrap().duplicate_apps = true;
    let err = platform.find_app("appA").await.unwrap_err();
    assert!(matches!(err, Error::InvalidInput(_)));
}

#[tokio::test]
async fn names_with_commas_match_exactly() {
    let stub = Stub::default();
    let platform = platform(&stub).await;

    let err = platform.find_app("appA,appB").await.unwrap_err();
    assert!(matches!(
        err,
        Error::NotFound {
            resource_type: "application",
            ..
        }
    ));

    let err = platform.find_stack("stackA,stackB").await.unwrap_err();
    assert!(matches!(
        err,
        Error::NotFound {
            resource_type: "stack",
            ..
        }
    ));
}

#[tokio::test]
async fn api_version_comes_from_root_document() {
    let stub = Stub::default();
    stub.state.lock().unwrap().version = "3.76.0".into();
    let platform = platform(&stub).await;

    assert_eq!(
        platform.api_version().await.unwrap(),
        PlatformVersion::new(3, 76, 0)
    );
}

#[tokio::test]
async fn zero_downtime_restart_creates_rolling_deployment() {
    let stub = Stub::default();
    let platform = platform(&stub).await;

    platform
        .restart_app("app-1", RestartStrategy::ZeroDowntime)
        .await
        .unwrap();

    let request = stub.requests().pop().unwrap();
    assert_eq!(request.path, "/v3/deployments");
    assert_eq!(request.body["strategy"], "rolling");
    assert_eq!(request.body["relationships"]["app"]["data"]["guid"], "app-1");
}

#[tokio::test]
async fn migration_issues_requests_in_order() {
    let stub = Stub::default();
    let platform = platform(&stub).await;
    let migrator = StackMigrator::new(Arc::new(platform), fast_config());

    let report = migrator
        .migrate(&MigrationRequest::new("appA", "stackB"), &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(report.droplet.as_deref(), Some("droplet-new"));
    assert_eq!(report.previous_droplet.as_deref(), Some("droplet-old"));
    assert_eq!(
        stub.calls(),
        vec![
            "GET /v3/apps",
            "GET /v3/stacks",
            "PATCH /v3/apps/app-1",
            "GET /v3/apps/app-1/droplets/current",
            "POST /v3/builds",
            "GET /v3/builds/build-1",
            "PATCH /v3/apps/app-1/relationships/current_droplet",
            "POST /v3/apps/app-1/actions/restart",
        ]
    );

    let requests = stub.requests();
    assert_eq!(requests[2].body["lifecycle"]["data"]["stack"], "stackB");
    assert_eq!(requests[4].body["package"]["guid"], "pkg-1");
    assert_eq!(requests[6].body["data"]["guid"], "droplet-new");
}

#[tokio::test]
async fn failed_build_over_http_reassigns_source_stack() {
    let stub = Stub::default();
    stub.state.lock().unwrap().fail_builds = true;
    let platform = platform(&stub).await;
    let migrator = StackMigrator::new(Arc::new(platform), fast_config());

    let err = migrator
        .migrate(&MigrationRequest::new("appA", "stackB"), &CancellationToken::new())
        .await
        .unwrap_err();

    assert!(matches!(err, Error::StagingFailed { .. }));
    assert!(err.to_string().contains("BuildpackCompileFailed"));
    let state = stub.state.lock().unwrap();
    assert_eq!(state.app_stack, "stackA");
    assert_eq!(state.current_droplet, "droplet-old");
}

#[tokio::test]
async fn error_bodies_are_decoded() {
    let stub = Stub::default();
    {
        let mut state = stub.state.lock().unwrap();
        state.stacks.push("stackC".into());
        state.reject_stack = Some("stackC".into());
    }
    let platform = platform(&stub).await;
    let migrator = StackMigrator::new(Arc::new(platform), fast_config());

    let err = migrator
        .migrate(&MigrationRequest::new("appA", "stackC"), &CancellationToken::new())
        .await
        .unwrap_err();

    match err {
        Error::StackAssignmentFailed { source, .. } => match *source {
            Error::Api { status, message } => {
                assert_eq!(status, 422);
                assert_eq!(
                    message,
                    "CF-UnprocessableEntity (10008): Stack 'stackC' is not available"
                );
            }
            other => panic!("expected Api error, got {other:?}"),
        },
        other => panic!("expected StackAssignmentFailed, got {other:?}"),
    }
}
