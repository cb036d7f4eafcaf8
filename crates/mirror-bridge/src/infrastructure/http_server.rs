//! Viewer-facing HTTP server (axum).
//!
//! # Routes
//!
//! | Method | Path                        | Body / response                         |
//! |--------|-----------------------------|-----------------------------------------|
//! | GET    | `/health`                   | `{"status":"ok"}`                       |
//! | GET    | `/devices`                  | `[{"id":..,"platform":..}]`             |
//! | GET    | `/devices/:id/status`       | [`DeviceStatus`]                        |
//! | POST   | `/devices/:id/stream/start` | ack                                     |
//! | GET    | `/devices/:id/stream`       | endless multipart stream                |
//! | DELETE | `/devices/:id/stream`       | ack                                     |
//! | POST   | `/devices/:id/tap`          | `{"x":0.5,"y":0.5}` → ack               |
//! | POST   | `/devices/:id/key`          | `{"action":"home"}` → ack               |
//! | POST   | `/devices/:id/mode`         | `{"mode":"turbo"}` → ack (Android)      |
//! | POST   | `/devices/:id/install`      | raw package → `{success,message}` (Android) |
//! | POST   | `/devices/:id/connect`      | `{success,message}` (iOS)               |
//!
//! Tap and key requests are acknowledged before they reach the device; their
//! failures are only logged.
//!
//! # Shutdown
//!
//! [`run_server`] checks the shared `running` flag every 200 ms.  When it is
//! cleared the listener stops accepting, and open viewer streams end so that
//! graceful shutdown can complete.

use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use axum::body::{Body, Bytes};
use axum::extract::rejection::JsonRejection;
use axum::extract::{DefaultBodyLimit, Path, State};
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use futures_util::{Stream, StreamExt};
use mirror_core::STREAM_CONTENT_TYPE;
use serde_json::json;
use thiserror::Error;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn};

use crate::application::registry::{DeviceLinkHandle, DeviceRegistry, RegistryError};
use crate::application::stream_publisher::{android_stream, ios_stream};
use crate::domain::messages::{
    Ack, DeviceStatus, DeviceSummary, KeyRequest, ModeRequest, OperationResult, TapRequest,
};

/// Upper bound on an uploaded package.
pub const MAX_PACKAGE_BYTES: usize = 512 * 1024 * 1024;

/// How often the shutdown watcher checks the `running` flag.
const SHUTDOWN_POLL: Duration = Duration::from_millis(200);

/// Error returned by HTTP handlers, rendered as `{"error": "..."}`.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error(transparent)]
    Registry(#[from] RegistryError),

    #[error("bad request: {0}")]
    BadRequest(String),
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        ApiError::BadRequest(rejection.body_text())
    }
}

impl ApiError {
    fn status(&self) -> StatusCode {
        match self {
            ApiError::Registry(RegistryError::UnknownDevice(_)) => StatusCode::NOT_FOUND,
            ApiError::Registry(RegistryError::WrongPlatform { .. }) => StatusCode::BAD_REQUEST,
            ApiError::Registry(RegistryError::Bootstrap(_)) => StatusCode::BAD_GATEWAY,
            ApiError::Registry(RegistryError::DuplicateDevice(_)) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            error!("request failed: {self}");
        }
        (status, Json(json!({ "error": self.to_string() }))).into_response()
    }
}

/// Shared handler state.
#[derive(Clone)]
pub struct AppState {
    registry: Arc<DeviceRegistry>,
    shutdown: watch::Receiver<bool>,
}

/// Builds the router.  Viewer streams end once `shutdown` turns `true`.
pub fn router(registry: Arc<DeviceRegistry>, shutdown: watch::Receiver<bool>) -> Router {
    let state = AppState { registry, shutdown };
    Router::new()
        .route("/health", get(health))
        .route("/devices", get(list_devices))
        .route("/devices/:id/status", get(device_status))
        .route("/devices/:id/stream/start", post(start_stream))
        .route("/devices/:id/stream", get(view_stream).delete(stop_stream))
        .route("/devices/:id/tap", post(tap))
        .route("/devices/:id/key", post(key))
        .route("/devices/:id/mode", post(set_mode))
        .route(
            "/devices/:id/install",
            post(install).layer(DefaultBodyLimit::max(MAX_PACKAGE_BYTES)),
        )
        .route("/devices/:id/connect", post(connect))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Serves the API on `bind` until `running` is cleared.
///
/// # Errors
///
/// Returns an error if the listener cannot be bound or the server fails.
pub async fn run_server(
    bind: SocketAddr,
    registry: Arc<DeviceRegistry>,
    running: Arc<AtomicBool>,
) -> anyhow::Result<()> {
    let listener = TcpListener::bind(bind)
        .await
        .with_context(|| format!("failed to bind HTTP listener on {bind}"))?;
    info!("HTTP server listening on {bind}");

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let app = router(registry, shutdown_rx);

    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            while running.load(Ordering::Relaxed) {
                tokio::time::sleep(SHUTDOWN_POLL).await;
            }
            info!("shutdown flag set; closing viewer streams");
            let _ = shutdown_tx.send(true);
        })
        .await
        .context("HTTP server failed")?;
    Ok(())
}

// ── Handlers ──────────────────────────────────────────────────────────────────

async fn health() -> Json<Ack> {
    Json(Ack::ok())
}

async fn list_devices(State(state): State<AppState>) -> Json<Vec<DeviceSummary>> {
    Json(state.registry.summaries())
}

async fn device_status(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<DeviceStatus>, ApiError> {
    Ok(Json(state.registry.status(&id)?))
}

async fn start_stream(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Ack>, ApiError> {
    state.registry.start_stream(&id).await?;
    Ok(Json(Ack::ok()))
}

async fn stop_stream(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Ack>, ApiError> {
    state.registry.stop_stream(&id)?;
    Ok(Json(Ack::ok()))
}

async fn view_stream(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Response, ApiError> {
    let response = match state.registry.get(&id)? {
        DeviceLinkHandle::Android(c) => stream_response(
            STREAM_CONTENT_TYPE.to_string(),
            android_stream(c.pipeline.clone()),
            state.shutdown.clone(),
        ),
        DeviceLinkHandle::Ios(c) => stream_response(
            c.stream_content_type.clone(),
            ios_stream(&c.bridge),
            state.shutdown.clone(),
        ),
    };
    Ok(response)
}

fn stream_response<S>(content_type: String, parts: S, mut shutdown: watch::Receiver<bool>) -> Response
where
    S: Stream<Item = Bytes> + Send + 'static,
{
    let stopped = async move {
        let _ = shutdown.wait_for(|stop| *stop).await;
    };
    let body = Body::from_stream(parts.take_until(stopped).map(Ok::<_, Infallible>));
    (
        [
            (header::CONTENT_TYPE, content_type),
            (header::CACHE_CONTROL, "no-cache".to_string()),
        ],
        body,
    )
        .into_response()
}

async fn tap(
    State(state): State<AppState>,
    Path(id): Path<String>,
    payload: Result<Json<TapRequest>, JsonRejection>,
) -> Result<Json<Ack>, ApiError> {
    let Json(TapRequest { x, y }) = payload?;
    match state.registry.get(&id)?.clone() {
        DeviceLinkHandle::Android(c) => {
            tokio::spawn(async move {
                if let Err(e) = c.link.tap(x, y).await {
                    warn!("{id}: tap failed: {e}");
                }
            });
        }
        DeviceLinkHandle::Ios(c) => {
            tokio::spawn(async move {
                if let Err(e) = c.bridge.tap(x, y).await {
                    warn!("{id}: tap failed: {e}");
                }
            });
        }
    }
    Ok(Json(Ack::ok()))
}

async fn key(
    State(state): State<AppState>,
    Path(id): Path<String>,
    payload: Result<Json<KeyRequest>, JsonRejection>,
) -> Result<Json<Ack>, ApiError> {
    let Json(KeyRequest { action }) = payload?;
    match state.registry.get(&id)?.clone() {
        DeviceLinkHandle::Android(c) => {
            tokio::spawn(async move {
                if let Err(e) = c.link.key(&action).await {
                    warn!("{id}: key {action:?} failed: {e}");
                }
            });
        }
        DeviceLinkHandle::Ios(c) => {
            tokio::spawn(async move {
                if let Err(e) = c.bridge.key(&action).await {
                    warn!("{id}: button {action:?} failed: {e}");
                }
            });
        }
    }
    Ok(Json(Ack::ok()))
}

async fn set_mode(
    State(state): State<AppState>,
    Path(id): Path<String>,
    payload: Result<Json<ModeRequest>, JsonRejection>,
) -> Result<Json<Ack>, ApiError> {
    let Json(ModeRequest { mode }) = payload?;
    state.registry.android(&id)?.pipeline.request_mode(mode);
    Ok(Json(Ack::ok()))
}

async fn install(
    State(state): State<AppState>,
    Path(id): Path<String>,
    package: Bytes,
) -> Result<Json<OperationResult>, ApiError> {
    let controller = state.registry.android(&id)?;
    let result = match controller.link.install_package(package).await {
        Ok(message) => {
            info!("{id}: package installed");
            OperationResult::success(message)
        }
        Err(e) => {
            error!("{id}: install failed: {e}");
            OperationResult::failure(e.to_string())
        }
    };
    Ok(Json(result))
}

async fn connect(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<OperationResult>, ApiError> {
    let controller = state.registry.ios(&id)?;
    let result = match controller.bridge.connect().await {
        Ok(()) => OperationResult::success("bridge started"),
        Err(e) => {
            error!("{id}: bridge connect failed: {e}");
            OperationResult::failure(e.to_string())
        }
    };
    Ok(Json(result))
}

// ── Tests ─────────────────────────────────────────────────────────────────────
