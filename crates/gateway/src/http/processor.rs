use std::time::Instant;

use axum::Json;
use axum::extract::rejection::{PathRejection, QueryRejection};
use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, HeaderValue, StatusCode};
use nifi_contracts::UpdateResponse;
use nifi_contracts::nifi::MutationRequest;
use serde::Deserialize;
use tracing::Instrument;

use super::{
    ApiError, AppState, REQUEST_ID_HEADER, auth_error_response, extract_request_id, json_error,
    nifi_error_response,
};

#[derive(Debug, Deserialize)]
pub(super) struct UpdateProcessorParams {
    #[serde(default)]
    period: Option<String>,
    #[serde(default, rename = "type")]
    strategy: Option<String>,
}

#[derive(Debug, Deserialize)]
pub(super) struct StateProcessorParams {
    #[serde(default)]
    state: Option<String>,
}

type HandlerResponse = (HeaderMap, Result<Json<UpdateResponse>, ApiError>);

pub(super) async fn update_processor(
    State(state): State<AppState>,
    processor_name: Result<Path<String>, PathRejection>,
    headers: HeaderMap,
    params: Result<Query<UpdateProcessorParams>, QueryRejection>,
) -> HandlerResponse {
    let mutation = params.map_err(invalid_query).and_then(|Query(params)| {
        Ok(MutationRequest::SchedulingUpdate {
            period: require_param(params.period, "period")?,
            strategy: require_param(params.strategy, "type")?,
        })
    });

    run_mutation(
        state,
        "/update_processor",
        "gateway.update_processor",
        processor_name.map(|Path(name)| name).map_err(invalid_path),
        &headers,
        mutation,
    )
    .await
}

pub(super) async fn state_processor(
    State(state): State<AppState>,
    processor_name: Result<Path<String>, PathRejection>,
    headers: HeaderMap,
    params: Result<Query<StateProcessorParams>, QueryRejection>,
) -> HandlerResponse {
    let mutation = params.map_err(invalid_query).and_then(|Query(params)| {
        Ok(MutationRequest::StateUpdate {
            state: require_param(params.state, "state")?,
        })
    });

    run_mutation(
        state,
        "/state_processor",
        "gateway.state_processor",
        processor_name.map(|Path(name)| name).map_err(invalid_path),
        &headers,
        mutation,
    )
    .await
}

async fn run_mutation(
    state: AppState,
    route: &'static str,
    span_name: &'static str,
    processor_name: Result<String, ApiError>,
    headers: &HeaderMap,
    mutation: Result<MutationRequest, ApiError>,
) -> HandlerResponse {
    let started = Instant::now();
    let request_id = extract_request_id(headers);

    let span = tracing::info_span!(
        "gateway.request",
        operation = span_name,
        request_id = %request_id,
        processor_name = processor_name.as_deref().unwrap_or_default(),
        processor_id = tracing::field::Empty,
        revision_version = tracing::field::Empty,
        latency_ms = tracing::field::Empty,
        outcome = tracing::field::Empty,
    );

    let result = async {
        let (result, kind) = match processor_name.and_then(|name| Ok((name, mutation?))) {
            Ok((name, mutation)) => (
                apply_to_processor(&state, &name, &mutation).await,
                Some(mutation.kind()),
            ),
            Err(err) => (Err(err), None),
        };

        let latency_ms = started.elapsed().as_millis() as u64;
        tracing::Span::current().record("latency_ms", latency_ms);
        match &result {
            Ok(_) => {
                tracing::Span::current().record("outcome", "ok");
                tracing::info!(kind = kind.unwrap_or_default(), "processor updated");
            }
            Err((status, Json(err))) => {
                tracing::Span::current().record("outcome", err.code.as_str());
                tracing::warn!(
                    status = status.as_u16(),
                    stage = ?err.stage,
                    error = %err.message,
                    "processor update failed"
                );
            }
        }
        result
    }
    .instrument(span)
    .await;

    let status = match &result {
        Ok(_) => StatusCode::OK,
        Err((status, _)) => *status,
    };
    crate::metrics::observe_http_request(route, "PUT", status.as_u16(), started.elapsed());

    let mut resp_headers = HeaderMap::new();
    if let Ok(value) = HeaderValue::from_str(&request_id) {
        resp_headers.insert(REQUEST_ID_HEADER, value);
    }
    (resp_headers, result)
}

/// Token, resolve, mutate. Each step runs only if the previous one succeeded,
/// and the mutation always carries the revision this call just resolved.
async fn apply_to_processor(
    state: &AppState,
    processor_name: &str,
    mutation: &MutationRequest,
) -> Result<Json<UpdateResponse>, ApiError> {
    let token = state.tokens.obtain_token().await;
    crate::metrics::observe_remote_call("token", if token.is_ok() { "success" } else { "error" });
    let token = token.map_err(|err| auth_error_response(&err))?;

    let target = state
        .nifi
        .resolve(processor_name, &token)
        .await
        .map_err(|err| nifi_error_response(&err))?;

    let span = tracing::Span::current();
    span.record("processor_id", target.id.as_str());
    span.record("revision_version", target.revision_version);
    tracing::debug!(
        current_state = target.state.as_deref().unwrap_or("unknown"),
        "resolved processor"
    );

    state
        .nifi
        .apply_mutation(&target, mutation, &token)
        .await
        .map_err(|err| nifi_error_response(&err))?;

    Ok(Json(UpdateResponse::updated()))
}

fn require_param(value: Option<String>, name: &str) -> Result<String, ApiError> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
        .ok_or_else(|| {
            json_error(
                StatusCode::BAD_REQUEST,
                "ERR_INVALID_PARAMS",
                format!("missing query parameter {}", name),
                None,
                None,
            )
        })
}

fn invalid_query(rejection: QueryRejection) -> ApiError {
    json_error(
        StatusCode::BAD_REQUEST,
        "ERR_INVALID_PARAMS",
        format!("invalid query string: {}", rejection.body_text()),
        None,
        None,
    )
}

fn invalid_path(rejection: PathRejection) -> ApiError {
    json_error(
        StatusCode::BAD_REQUEST,
        "ERR_INVALID_PARAMS",
        format!("invalid processor name: {}", rejection.body_text()),
        None,
        None,
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn require_param_trims_and_rejects_blank_values() {
        assert_eq!(
            require_param(Some(" 10 sec ".to_string()), "period").expect("value should pass"),
            "10 sec"
        );

        let (status, Json(body)) = require_param(Some("  ".to_string()), "state").unwrap_err();
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body.code, "ERR_INVALID_PARAMS");
        assert_eq!(body.message, "missing query parameter state");
        assert_eq!(body.stage, None);

        assert!(require_param(None, "type").is_err());
    }
}
