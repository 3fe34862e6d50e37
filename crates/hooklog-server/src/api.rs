use std::net::SocketAddr;

use axum::body::Bytes;
use axum::extract::{ConnectInfo, DefaultBodyLimit, State};
use axum::http::{header, Extensions, HeaderMap, StatusCode, Uri};
use axum::routing::get;
use axum::{Json, Router};
use hooklog_config::{ServerConfig, HEALTH_PATH};
use hooklog_core::{encode_form, parse_pairs, NotificationEvent, Recorder};
use serde::Serialize;
use tracing::error;

const FORM_CONTENT_TYPE: &str = "application/x-www-form-urlencoded";

#[derive(Clone)]
pub struct AppState {
    pub recorder: Recorder,
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    status: &'static str,
    service: &'static str,
}

pub fn router(state: AppState, server: &ServerConfig) -> Router {
    Router::new()
        .route(HEALTH_PATH, get(health))
        .route(
            &server.callback_path,
            get(record_callback).post(record_callback),
        )
        .layer(DefaultBodyLimit::max(server.max_body_bytes))
        .with_state(state)
}

pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        service: "hooklog-server",
    })
}

/// Appends the inbound callback to the log and answers with an empty 200.
pub async fn record_callback(
    State(state): State<AppState>,
    uri: Uri,
    headers: HeaderMap,
    extensions: Extensions,
    body: Bytes,
) -> StatusCode {
    let origin = extensions
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.ip().to_string())
        .unwrap_or_default();
    let query = uri.query().map(parse_pairs).unwrap_or_default();
    // Re-encoded so a raw CR/LF in the body cannot start a new entry.
    let form = if is_form(&headers) {
        encode_form(&body)
    } else {
        Vec::new()
    };

    let event = NotificationEvent::now(origin)
        .with_query(query)
        .with_form(form);

    let recorder = state.recorder.clone();
    match tokio::task::spawn_blocking(move || recorder.record(event)).await {
        Ok(Ok(())) => StatusCode::OK,
        Ok(Err(err)) => {
            error!(error = %err, "failed to record notification");
            StatusCode::INTERNAL_SERVER_ERROR
        }
        Err(err) => {
            error!(error = %err, "record task did not complete");
            StatusCode::INTERNAL_SERVER_ERROR
        }
    }
}

fn is_form(headers: &HeaderMap) -> bool {
    headers
        .get(header::CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.split(';').next())
        .is_some_and(|mime| mime.trim().eq_ignore_ascii_case(FORM_CONTENT_TYPE))
}
