//! HTTP gateway.
//!
//! - `GET /` — upload form
//! - `GET /setup` — pairing + password setup page
//! - `GET /health` — liveness and readiness
//! - `GET /api/qr` — pairing QR while pairing, `ready: true` once linked
//! - `POST /api/setup` — set or change the manager password
//! - `POST /upload` — multipart status upload

pub mod form;
pub mod qr;

use anyhow::{Context, Result};
use axum::extract::rejection::JsonRejection;
use axum::extract::{DefaultBodyLimit, Multipart, State};
use axum::http::StatusCode;
use axum::response::{Html, IntoResponse, Json, Response};
use axum::routing::{get, post};
use axum::Router;
use serde_json::json;
use std::net::SocketAddr;
use std::sync::Arc;
use tracing::{error, info, warn};

use crate::auth::{AuthGate, SetupRequest};
use crate::error::GateError;
use crate::session::SessionState;
use crate::upload::UploadPipeline;

const INDEX_HTML: &str = include_str!("../../static/index.html");
const SETUP_HTML: &str = include_str!("../../static/setup.html");

/// Shared state for the gateway handlers.
#[derive(Clone)]
pub struct AppState {
    pub session: Arc<SessionState>,
    pub auth: Arc<AuthGate>,
    pub pipeline: Arc<UploadPipeline>,
}

pub fn router(state: AppState, body_limit: usize) -> Router {
    Router::new()
        .route("/", get(index_page))
        .route("/setup", get(setup_page))
        .route("/health", get(health))
        .route("/api/qr", get(api_qr))
        .route("/api/setup", post(api_setup))
        .route("/upload", post(upload))
        // Enforced while the body streams, so handlers decide 503/403 first.
        .layer(DefaultBodyLimit::max(body_limit))
        .with_state(state)
}

/// Bind and serve until Ctrl-C.
pub async fn serve(state: AppState, addr: SocketAddr, body_limit: usize) -> Result<()> {
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind to {addr}"))?;

    info!("Gateway listening on http://{addr}");

    axum::serve(listener, router(state, body_limit))
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Gateway server error")?;

    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "Failed to listen for Ctrl-C");
        std::future::pending::<()>().await;
    }
    info!("Shutting down gateway");
}

async fn index_page() -> Html<&'static str> {
    Html(INDEX_HTML)
}

async fn setup_page() -> Html<&'static str> {
    Html(SETUP_HTML)
}

async fn health(State(state): State<AppState>) -> Json<serde_json::Value> {
    Json(json!({
        "status": "ok",
        "ready": state.session.is_ready(),
        "passwordConfigured": state.auth.is_configured(),
    }))
}

/// GET /api/qr — current pairing QR as a PNG data URL
async fn api_qr(State(state): State<AppState>) -> Response {
    let status = state.session.status();
    let Some(code) = status.pending_code else {
        return Json(json!({ "ready": status.ready, "qrDataUrl": "" })).into_response();
    };

    match qr::data_url(&code) {
        Ok(url) => Json(json!({ "ready": false, "qrDataUrl": url })).into_response(),
        Err(e) => {
            error!(error = %e, "QR generation failed");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({ "ready": false, "error": "QR generation failed" })),
            )
                .into_response()
        }
    }
}

fn setup_error(status: StatusCode, message: String) -> Response {
    (status, Json(json!({ "ok": false, "message": message }))).into_response()
}

/// POST /api/setup — `{password, currentPassword?}`
async fn api_setup(
    State(state): State<AppState>,
    payload: Result<Json<SetupRequest>, JsonRejection>,
) -> Response {
    let Json(request) = match payload {
        Ok(payload) => payload,
        Err(e) => return setup_error(StatusCode::BAD_REQUEST, e.body_text()),
    };

    match state.auth.complete_setup(request).await {
        Ok(()) => Json(json!({ "ok": true })).into_response(),
        Err(err) => {
            let status = match err {
                GateError::NotReady => StatusCode::CONFLICT,
                ref other => other.status_code(),
            };
            if status.is_server_error() {
                error!(error = %err, "Setup failed");
            }
            setup_error(status, err.to_string())
        }
    }
}

fn escape_html(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}

fn upload_error(err: GateError) -> Response {
    let (title, link, label) = match err {
        GateError::NotReady => ("Messaging not connected", "/setup", "Go to Setup"),
        GateError::SetupRequired => ("Setup required", "/setup", "Go to Setup"),
        GateError::Unauthorized => ("Wrong Password", "/", "Try Again"),
        GateError::DeliveryFailed { .. } | GateError::Storage(_) => {
            ("Error Posting Status", "/", "Try Again")
        }
        _ => ("Upload rejected", "/", "Try Again"),
    };
    warn!(error = %err, "Upload rejected");

    let body = format!(
        "<h1>{title}</h1><p>{}</p><a href=\"{link}\">{label}</a>",
        escape_html(&err.to_string())
    );
    (err.status_code(), Html(body)).into_response()
}

/// POST /upload — multipart `mediaFile`, `captions`/`caption`, `textStatus`, `password`
async fn upload(
    State(state): State<AppState>,
    multipart: Result<Multipart, axum::extract::multipart::MultipartRejection>,
) -> Response {
    // Pairing and setup state are known before the body is read.
    if let Err(err) = state.auth.check_upload_ready() {
        return upload_error(err);
    }

    let multipart = match multipart {
        Ok(multipart) => multipart,
        Err(e) => return upload_error(GateError::InvalidInput(e.body_text())),
    };

    let form = match form::read_upload_form(multipart, state.pipeline.limits().max_file_bytes).await {
        Ok(form) => form,
        Err(err) => return upload_error(err),
    };

    if let Err(err) = state.auth.check_upload(&form.password) {
        return upload_error(err);
    }

    match state.pipeline.submit(form.request).await {
        Ok(receipt) => {
            info!(
                media = receipt.media_sent,
                text = receipt.text_sent,
                "Status posted"
            );
            Html("<h1>Status Posted Successfully!</h1><a href=\"/\">Post Another</a>").into_response()
        }
        Err(err) => upload_error(err),
    }
}
