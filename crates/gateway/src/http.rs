use std::time::Duration;

use axum::http::{HeaderMap, HeaderValue, StatusCode, header};
use axum::response::IntoResponse;
use axum::routing::{get, put};
use axum::{Json, Router};
use nifi_auth::{AuthError, TokenClient};
use nifi_contracts::{ErrorResponse, Stage};
use ulid::Ulid;

use crate::config::{GatewayConfig, StartupError};
use crate::nifi::{NifiClient, NifiError, build_http_client};

mod processor;

pub(crate) const REQUEST_ID_HEADER: &str = "x-request-id";

#[derive(Clone)]
pub struct AppState {
    tokens: TokenClient,
    nifi: NifiClient,
}

type ApiError = (StatusCode, Json<ErrorResponse>);

pub fn router(config: GatewayConfig) -> Result<Router, StartupError> {
    let http = build_http_client(config.timeout_ms, &config.tls)?;

    let tokens = TokenClient::new(
        config.nifi_api_url.clone(),
        config.credentials.clone(),
        http.clone(),
    );
    let nifi = NifiClient::new(config.nifi_api_url.clone(), http);

    tracing::info!(
        nifi_api_url = %config.nifi_api_url,
        login = %tokens.login(),
        timeout = ?Duration::from_millis(config.timeout_ms),
        custom_ca = config.tls.ca_cert_path.is_some(),
        "nifi client initialized"
    );

    let state = AppState { tokens, nifi };

    Ok(Router::new()
        .route("/healthz", get(healthz))
        .route("/metrics", get(metrics))
        .route(
            "/update_processor/{processor_name}",
            put(processor::update_processor),
        )
        .route(
            "/state_processor/{processor_name}",
            put(processor::state_processor),
        )
        .with_state(state))
}

async fn healthz() -> &'static str {
    "ok"
}

async fn metrics() -> impl IntoResponse {
    match crate::metrics::render() {
        Ok((body, content_type)) => {
            let mut headers = HeaderMap::new();
            if let Ok(value) = HeaderValue::from_str(content_type.as_str()) {
                headers.insert(header::CONTENT_TYPE, value);
            }
            (headers, body).into_response()
        }
        Err(_) => StatusCode::INTERNAL_SERVER_ERROR.into_response(),
    }
}

fn extract_request_id(headers: &HeaderMap) -> String {
    headers
        .get(REQUEST_ID_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(|v| v.trim())
        .filter(|v| !v.is_empty())
        .and_then(sanitize_request_id)
        .unwrap_or_else(|| Ulid::new().to_string())
}

fn sanitize_request_id(raw: &str) -> Option<String> {
    const MAX_LEN: usize = 64;
    let mut out = String::with_capacity(raw.len().min(MAX_LEN));

    for ch in raw.chars() {
        if out.len() >= MAX_LEN {
            break;
        }
        if ch.is_ascii_alphanumeric() || matches!(ch, '-' | '_' | '.') {
            out.push(ch);
        }
    }

    (!out.is_empty()).then_some(out)
}

fn json_error(
    status: StatusCode,
    code: impl Into<String>,
    message: impl Into<String>,
    stage: Option<Stage>,
    remote_status: Option<u16>,
) -> ApiError {
    (
        status,
        Json(ErrorResponse {
            code: code.into(),
            message: message.into(),
            stage,
            remote_status,
        }),
    )
}

fn auth_error_response(err: &AuthError) -> ApiError {
    match (err.code, err.status) {
        ("ERR_AUTH_REJECTED", Some(remote)) => json_error(
            StatusCode::from_u16(remote).unwrap_or(StatusCode::BAD_GATEWAY),
            err.code,
            err.message.clone(),
            Some(Stage::Auth),
            Some(remote),
        ),
        _ => json_error(
            StatusCode::INTERNAL_SERVER_ERROR,
            err.code,
            err.message.clone(),
            Some(Stage::Auth),
            err.status,
        ),
    }
}

fn nifi_error_response(err: &NifiError) -> ApiError {
    let stage = Some(err.stage());
    match err {
        NifiError::NotFound { .. } => json_error(
            StatusCode::NOT_FOUND,
            "ERR_PROCESSOR_NOT_FOUND",
            err.to_string(),
            stage,
            None,
        ),
        NifiError::Ambiguous { .. } => json_error(
            StatusCode::CONFLICT,
            "ERR_PROCESSOR_AMBIGUOUS",
            err.to_string(),
            stage,
            None,
        ),
        NifiError::Status { status, body, .. } => {
            let message = if body.is_empty() {
                format!("NiFi returned status {}", status.as_u16())
            } else {
                body.clone()
            };
            json_error(
                StatusCode::from_u16(status.as_u16()).unwrap_or(StatusCode::BAD_GATEWAY),
                "ERR_REMOTE_STATUS",
                message,
                stage,
                Some(status.as_u16()),
            )
        }
        NifiError::Timeout { .. } => json_error(
            StatusCode::INTERNAL_SERVER_ERROR,
            "ERR_REMOTE_TIMEOUT",
            err.to_string(),
            stage,
            None,
        ),
        NifiError::Transport { .. } => json_error(
            StatusCode::INTERNAL_SERVER_ERROR,
            "ERR_REMOTE_UNAVAILABLE",
            err.to_string(),
            stage,
            None,
        ),
        NifiError::InvalidResponse { .. } => json_error(
            StatusCode::INTERNAL_SERVER_ERROR,
            "ERR_REMOTE_INVALID_RESPONSE",
            err.to_string(),
            stage,
            None,
        ),
    }
}
