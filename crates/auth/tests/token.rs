use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::post;
use axum::{Form, Router};
use nifi_auth::{Credentials, TokenClient};
use serde::Deserialize;
use tokio::net::TcpListener;
use tokio::sync::oneshot;

#[derive(Deserialize)]
struct TokenForm {
    username: String,
    password: String,
}

#[derive(Clone)]
struct MockState {
    calls: Arc<AtomicUsize>,
    token_body: &'static str,
}

async fn issue_token(
    State(state): State<MockState>,
    Form(form): Form<TokenForm>,
) -> (StatusCode, String) {
    state.calls.fetch_add(1, Ordering::Relaxed);
    if form.username == "admin" && form.password == "correct-horse" {
        (StatusCode::CREATED, state.token_body.to_string())
    } else {
        (
            StatusCode::BAD_REQUEST,
            "The supplied username and password are not valid.".to_string(),
        )
    }
}

async fn spawn_token_server(
    token_body: &'static str,
) -> (
    SocketAddr,
    Arc<AtomicUsize>,
    oneshot::Sender<()>,
    tokio::task::JoinHandle<()>,
) {
    let calls = Arc::new(AtomicUsize::new(0));
    let app = Router::new()
        .route("/nifi-api/access/token", post(issue_token))
        .with_state(MockState {
            calls: calls.clone(),
            token_body,
        });

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

    (addr, calls, shutdown_tx, handle)
}

fn client(addr: SocketAddr, password: &str) -> TokenClient {
    TokenClient::new(
        format!("http://{}/nifi-api", addr),
        Credentials::new("admin", password),
        reqwest::Client::new(),
    )
}

#[tokio::test]
async fn obtain_token_returns_trimmed_token_for_valid_credentials() {
    let (addr, calls, shutdown, task) = spawn_token_server("  eyJraWQiOi.abc.def\n").await;

    let token = client(addr, "correct-horse")
        .obtain_token()
        .await
        .expect("token request should succeed");

    shutdown.send(()).ok();
    let _ = task.await;

    assert_eq!(token.as_str(), "eyJraWQiOi.abc.def");
    assert_eq!(calls.load(Ordering::Relaxed), 1);
}

#[tokio::test]
async fn obtain_token_rejects_invalid_credentials_with_remote_status() {
    let (addr, calls, shutdown, task) = spawn_token_server("unused").await;

    let err = client(addr, "wrong")
        .obtain_token()
        .await
        .expect_err("token request should fail");

    shutdown.send(()).ok();
    let _ = task.await;

    assert_eq!(err.code, "ERR_AUTH_REJECTED");
    assert_eq!(err.status, Some(400));
    assert!(err.message.contains("not valid"));
    assert_eq!(calls.load(Ordering::Relaxed), 1);
}

#[tokio::test]
async fn obtain_token_rejects_blank_token_body() {
    let (addr, _calls, shutdown, task) = spawn_token_server("   \n").await;

    let err = client(addr, "correct-horse")
        .obtain_token()
        .await
        .expect_err("blank token should be rejected");

    shutdown.send(()).ok();
    let _ = task.await;

    assert_eq!(err.code, "ERR_AUTH_EMPTY_TOKEN");
}

#[tokio::test]
async fn obtain_token_reports_unreachable_server() {
    let listener = TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind should succeed");
    let addr = listener.local_addr().expect("local addr should be available");
    drop(listener);

    let err = client(addr, "correct-horse")
        .obtain_token()
        .await
        .expect_err("connection should fail");

    assert_eq!(err.code, "ERR_AUTH_UNAVAILABLE");
    assert_eq!(err.status, None);
}
