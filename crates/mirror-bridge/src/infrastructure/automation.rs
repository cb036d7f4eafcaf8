//! AgentClient: HTTP client for the on-device automation agent.
//!
//! | Call          | Request                                                     |
//! |---------------|-------------------------------------------------------------|
//! | new session   | `POST {base}/session` `{"capabilities":{}}`                 |
//! | tap           | `POST {base}/session/{sid}/wda/tap/0` `{"x":..,"y":..}`     |
//! | press button  | `POST {base}/session/{sid}/wda/pressButton` `{"name":..}`   |
//! | live image    | `GET {mjpeg}` (multipart JPEG stream)                       |
//!
//! Every request carries its own timeout.  The live-image stream is endless,
//! so only its response headers are bounded here; `frame_proxy` bounds each
//! body chunk.

use std::time::Duration;

use async_trait::async_trait;
use futures_util::TryStreamExt;
use mirror_core::{DevicePoint, IosButton};
use reqwest::StatusCode;
use serde_json::{json, Value};
use tracing::debug;

use crate::application::device::{AutomationEndpoint, ChunkStream, SessionError};
use crate::domain::config::{IosDeviceConfig, SessionSettings};

const CONNECT_TIMEOUT: Duration = Duration::from_secs(2);

#[derive(Clone)]
pub struct AgentClient {
    base_url: String,
    mjpeg_url: String,
    client: reqwest::Client,
    init_timeout: Duration,
    gesture_timeout: Duration,
    stream_timeout: Duration,
}

fn transport(e: reqwest::Error) -> SessionError {
    if e.is_timeout() {
        SessionError::Transport(format!("timed out: {e}"))
    } else {
        SessionError::Transport(e.to_string())
    }
}

impl AgentClient {
    pub fn new(config: &IosDeviceConfig, settings: &SessionSettings) -> Result<Self, SessionError> {
        let client = reqwest::Client::builder()
            .use_rustls_tls()
            .connect_timeout(CONNECT_TIMEOUT)
            .build()
            .map_err(transport)?;
        Ok(Self {
            base_url: config.automation_url.trim_end_matches('/').to_string(),
            mjpeg_url: config.mjpeg_url.clone(),
            client,
            init_timeout: settings.init_timeout(),
            gesture_timeout: settings.gesture_timeout(),
            stream_timeout: settings.stream_read_timeout(),
        })
    }

    async fn post_gesture(&self, url: String, body: Value) -> Result<(), SessionError> {
        let resp = self
            .client
            .post(url)
            .timeout(self.gesture_timeout)
            .json(&body)
            .send()
            .await
            .map_err(transport)?;
        if resp.status() != StatusCode::OK {
            return Err(SessionError::Status(resp.status().as_u16()));
        }
        Ok(())
    }
}

/// Reads the session id from either the top level or the `value` object.
fn session_id_of(body: &Value) -> Option<String> {
    body.get("sessionId")
        .or_else(|| body.get("value").and_then(|v| v.get("sessionId")))
        .and_then(Value::as_str)
        .filter(|id| !id.is_empty())
        .map(str::to_string)
}

#[async_trait]
impl AutomationEndpoint for AgentClient {
    async fn create_session(&self) -> Result<String, SessionError> {
        let resp = self
            .client
            .post(format!("{}/session", self.base_url))
            .timeout(self.init_timeout)
            .json(&json!({ "capabilities": {} }))
            .send()
            .await
            .map_err(transport)?;
        if resp.status() != StatusCode::OK {
            return Err(SessionError::Status(resp.status().as_u16()));
        }
        let body: Value = resp.json().await.map_err(transport)?;
        session_id_of(&body).ok_or(SessionError::MissingSessionId)
    }

    async fn tap(&self, session_id: &str, point: DevicePoint) -> Result<(), SessionError> {
        let url = format!("{}/session/{session_id}/wda/tap/0", self.base_url);
        self.post_gesture(url, json!({ "x": point.x, "y": point.y })).await
    }

    async fn press_button(&self, session_id: &str, button: IosButton) -> Result<(), SessionError> {
        let url = format!("{}/session/{session_id}/wda/pressButton", self.base_url);
        self.post_gesture(url, json!({ "name": button.agent_name() })).await
    }

    async fn open_frame_stream(&self) -> Result<ChunkStream<SessionError>, SessionError> {
        let request = self.client.get(&self.mjpeg_url).send();
        let resp = tokio::time::timeout(self.stream_timeout, request)
            .await
            .map_err(|_| SessionError::Timeout(self.stream_timeout))?
            .map_err(transport)?;
        if resp.status() != StatusCode::OK {
            return Err(SessionError::Status(resp.status().as_u16()));
        }
        debug!("live-image stream connected to {}", self.mjpeg_url);
        Ok(Box::pin(resp.bytes_stream().map_err(transport)))
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
