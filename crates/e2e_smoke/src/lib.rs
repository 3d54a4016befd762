//! In-process stand-in for the slice of the NiFi REST API the gateway uses.
//!
//! The mock enforces bearer tokens and optimistic-concurrency revisions the
//! way NiFi does, and counts every call so tests can assert which steps ran.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, StatusCode, header};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Form, Json, Router};
use serde_json::{Value, json};
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;

pub const MOCK_LOGIN: &str = "admin";
pub const MOCK_PASSWORD: &str = "NIFI_CANARY_PASSWORD_5c1e2d7a";
pub const MOCK_TOKEN: &str = "NIFI_CANARY_TOKEN_93b04f1e.payload.sig";

#[derive(Debug, Clone)]
pub struct MockProcessor {
    pub id: String,
    pub name: String,
    pub version: i64,
    pub state: String,
    pub config: Value,
}

impl MockProcessor {
    pub fn new(id: &str, name: &str, version: i64) -> Self {
        Self {
            id: id.to_string(),
            name: name.to_string(),
            version,
            state: "RUNNING".to_string(),
            config: json!({
                "schedulingPeriod": "0 sec",
                "schedulingStrategy": "TIMER_DRIVEN",
            }),
        }
    }

    fn entity(&self) -> Value {
        json!({
            "id": self.id,
            "revision": {"version": self.version},
            "component": {
                "id": self.id,
                "name": self.name,
                "state": self.state,
                "config": self.config,
            },
            "status": {"runStatus": self.state},
        })
    }
}

#[derive(Debug, Default)]
pub struct MockNifiState {
    pub processors: Vec<MockProcessor>,
    pub token_calls: usize,
    pub search_calls: usize,
    pub fetch_calls: usize,
    pub update_calls: usize,
    pub update_bodies: Vec<Value>,
    /// Bumps the revision right after each fetch, as a concurrent writer would.
    pub bump_revision_after_fetch: bool,
    /// Holds the token response back this long.
    pub token_delay: Option<Duration>,
    /// Closes the connection without a response when this step is reached.
    pub drop_connection_on: Option<MockStep>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MockStep {
    Search,
    Update,
}

/// Aborts the in-flight handler so the server tears the connection down and
/// the client sees a transport error rather than an HTTP status.
fn drop_connection(step: MockStep) -> ! {
    std::panic::resume_unwind(Box::new(format!("mock NiFi dropped connection on {:?}", step)))
}

#[derive(Clone, Default)]
pub struct MockNifi {
    inner: Arc<Mutex<MockNifiState>>,
}

impl MockNifi {
    pub fn new(processors: Vec<MockProcessor>) -> Self {
        Self {
            inner: Arc::new(Mutex::new(MockNifiState {
                processors,
                ..MockNifiState::default()
            })),
        }
    }

    pub fn state(&self) -> MutexGuard<'_, MockNifiState> {
        match self.inner.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    pub fn router(&self) -> Router {
        Router::new()
            .route("/nifi-api/access/token", post(issue_token))
            .route("/nifi-api/flow/search-results", get(search))
            .route(
                "/nifi-api/processors/{id}",
                get(fetch_processor).put(update_processor),
            )
            .with_state(self.clone())
    }
}

pub async fn spawn_server(app: Router) -> (SocketAddr, oneshot::Sender<()>, JoinHandle<()>) {
    let listener = TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind should succeed");
    let addr = listener.local_addr().expect("local addr should be available");

    let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();
    let handle = tokio::spawn(async move {
        let _ = axum::serve(listener, app)
            .with_graceful_shutdown(async {
                let _ = shutdown_rx.await;
            })
            .await;
    });

    (addr, shutdown_tx, handle)
}

fn authorized(headers: &HeaderMap) -> bool {
    headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v == format!("Bearer {}", MOCK_TOKEN))
}

fn unauthorized() -> Response {
    (
        StatusCode::UNAUTHORIZED,
        "Unable to validate the access token.",
    )
        .into_response()
}

async fn issue_token(
    State(nifi): State<MockNifi>,
    Form(form): Form<HashMap<String, String>>,
) -> Response {
    let delay = {
        let mut state = nifi.state();
        state.token_calls += 1;
        state.token_delay
    };
    if let Some(delay) = delay {
        tokio::time::sleep(delay).await;
    }

    let valid = form.get("username").map(String::as_str) == Some(MOCK_LOGIN)
        && form.get("password").map(String::as_str) == Some(MOCK_PASSWORD);
    if !valid {
        return (
            StatusCode::BAD_REQUEST,
            "The supplied username and password are not valid.",
        )
            .into_response();
    }

    (StatusCode::CREATED, format!("{}\n", MOCK_TOKEN)).into_response()
}

async fn search(
    State(nifi): State<MockNifi>,
    headers: HeaderMap,
    Query(params): Query<HashMap<String, String>>,
) -> Response {
    let mut state = nifi.state();
    state.search_calls += 1;
    if state.drop_connection_on == Some(MockStep::Search) {
        drop(state);
        drop_connection(MockStep::Search);
    }
    if !authorized(&headers) {
        return unauthorized();
    }

    let q = params.get("q").cloned().unwrap_or_default();
    let results = state
        .processors
        .iter()
        .filter(|p| !q.is_empty() && p.name.contains(q.as_str()))
        .map(|p| {
            json!({
                "id": p.id,
                "groupId": "root",
                "name": p.name,
                "matches": [format!("Name: {}", p.name)],
            })
        })
        .collect::<Vec<_>>();

    Json(json!({
        "searchResultsDTO": {
            "processorResults": results,
            "connectionResults": [],
            "processGroupResults": [],
        }
    }))
    .into_response()
}

async fn fetch_processor(
    State(nifi): State<MockNifi>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Response {
    let mut state = nifi.state();
    state.fetch_calls += 1;
    if !authorized(&headers) {
        return unauthorized();
    }

    let bump = state.bump_revision_after_fetch;
    let Some(processor) = state.processors.iter_mut().find(|p| p.id == id) else {
        return (
            StatusCode::NOT_FOUND,
            format!("Unable to find processor with id '{}'.", id),
        )
            .into_response();
    };

    let entity = processor.entity();
    if bump {
        processor.version += 1;
    }
    Json(entity).into_response()
}

async fn update_processor(
    State(nifi): State<MockNifi>,
    headers: HeaderMap,
    Path(id): Path<String>,
    Json(body): Json<Value>,
) -> Response {
    let mut state = nifi.state();
    state.update_calls += 1;
    state.update_bodies.push(body.clone());
    if state.drop_connection_on == Some(MockStep::Update) {
        drop(state);
        drop_connection(MockStep::Update);
    }
    if !authorized(&headers) {
        return unauthorized();
    }

    let Some(processor) = state.processors.iter_mut().find(|p| p.id == id) else {
        return (
            StatusCode::NOT_FOUND,
            format!("Unable to find processor with id '{}'.", id),
        )
            .into_response();
    };

    let claimed = match &body["revision"]["version"] {
        Value::String(s) => s.parse::<i64>().ok(),
        Value::Number(n) => n.as_i64(),
        _ => None,
    };
    let Some(claimed) = claimed else {
        return (StatusCode::BAD_REQUEST, "Revision must be specified.").into_response();
    };

    if claimed != processor.version {
        return (
            StatusCode::CONFLICT,
            format!(
                "[{}, null, {}] is not the most up-to-date revision. This component appears to have been modified",
                claimed, processor.id
            ),
        )
            .into_response();
    }

    if let Some(config) = body["component"]["config"].as_object() {
        for (key, value) in config {
            processor.config[key] = value.clone();
        }
    }
    if let Some(run_state) = body["component"]["state"].as_str() {
        processor.state = run_state.to_string();
    }
    processor.version += 1;

    Json(processor.entity()).into_response()
}
