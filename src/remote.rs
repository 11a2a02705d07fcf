//! HTTP adapters for the proctoring backend
//!
//! - POST /analyze_frame   - base64 JPEG data URL in, faces + head pose out
//! - POST /voice_event     - voice audit, fire and forget
//! - POST /api/session/start
//! - POST /api/session/end - bearer token, answers payload

use async_trait::async_trait;
use base64::Engine;
use serde::Serialize;
use serde_json::{json, Value};
use std::time::Duration;
use tracing::debug;

use crate::core::ports::{FrameAnalyzer, SessionService, VoiceTelemetry};
use crate::error::ServiceError;
use crate::types::{
    Answers, CloseSessionResponse, FrameAnalysis, SessionHandle, StartSessionResponse,
    VoiceEventKind,
};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Backend ids are integers; anything else is passed through as a string
fn session_id_value(session_id: &str) -> Value {
    match session_id.parse::<i64>() {
        Ok(n) => Value::from(n),
        Err(_) => Value::from(session_id),
    }
}

/// Shared reqwest client bound to one backend origin
#[derive(Debug, Clone)]
pub struct Backend {
    client: reqwest::Client,
    base_url: String,
}

impl Backend {
    pub fn new(base_url: impl Into<String>) -> Result<Self, ServiceError> {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()?;
        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn post_json<B: Serialize + ?Sized>(
        &self,
        path: &str,
        bearer: Option<&str>,
        body: &B,
    ) -> Result<reqwest::Response, ServiceError> {
        let mut request = self.client.post(self.url(path)).json(body);
        if let Some(token) = bearer {
            request = request.bearer_auth(token);
        }
        Ok(request.send().await?)
    }
}

#[derive(Debug, Clone)]
pub struct HttpFrameAnalyzer {
    backend: Backend,
}

impl HttpFrameAnalyzer {
    pub fn new(backend: Backend) -> Self {
        Self { backend }
    }
}

#[async_trait]
impl FrameAnalyzer for HttpFrameAnalyzer {
    async fn analyze_frame(
        &self,
        session_id: &str,
        image: &[u8],
    ) -> Result<FrameAnalysis, ServiceError> {
        let encoded = base64::engine::general_purpose::STANDARD.encode(image);
        let body = json!({
            "image": format!("data:image/jpeg;base64,{}", encoded),
            "session_id": session_id_value(session_id),
        });
        let resp = self.backend.post_json("/analyze_frame", None, &body).await?;
        if !resp.status().is_success() {
            let status = resp.status();
            let detail: Value = resp.json().await.unwrap_or(Value::Null);
            let message = detail
                .get("error")
                .and_then(Value::as_str)
                .unwrap_or("frame analysis failed")
                .to_string();
            return Err(ServiceError::Rejected(format!("{} ({})", message, status)));
        }
        Ok(resp.json::<FrameAnalysis>().await?)
    }
}

#[derive(Debug, Clone)]
pub struct HttpVoiceTelemetry {
    backend: Backend,
}

impl HttpVoiceTelemetry {
    pub fn new(backend: Backend) -> Self {
        Self { backend }
    }
}

#[async_trait]
impl VoiceTelemetry for HttpVoiceTelemetry {
    async fn report(
        &self,
        session_id: &str,
        rms: f64,
        kind: VoiceEventKind,
        duration: Option<f64>,
    ) -> Result<(), ServiceError> {
        let mut body = json!({
            "session_id": session_id_value(session_id),
            "rms": rms,
            "event": kind.as_str(),
        });
        if let Some(duration) = duration {
            body["duration"] = Value::from(duration);
        }
        let resp = self.backend.post_json("/voice_event", None, &body).await?;
        debug!(status = %resp.status(), event = kind.as_str(), "voice event posted");
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub struct HttpSessionService {
    backend: Backend,
}

impl HttpSessionService {
    pub fn new(backend: Backend) -> Self {
        Self { backend }
    }
}

#[async_trait]
impl SessionService for HttpSessionService {
    async fn start_session(
        &self,
        auth_token: &str,
        exam_id: &str,
    ) -> Result<StartSessionResponse, ServiceError> {
        let body = json!({ "exam_id": session_id_value(exam_id) });
        let resp = self
            .backend
            .post_json("/api/session/start", Some(auth_token), &body)
            .await?;
        // Error replies carry the same {success, message} shape
        Ok(resp.json::<StartSessionResponse>().await?)
    }

    async fn close_session(
        &self,
        handle: &SessionHandle,
        answers: &Answers,
    ) -> Result<CloseSessionResponse, ServiceError> {
        let body = json!({
            "session_id": session_id_value(&handle.session_id),
            "answers": answers,
        });
        let resp = self
            .backend
            .post_json("/api/session/end", Some(&handle.auth_token), &body)
            .await?;
        Ok(resp.json::<CloseSessionResponse>().await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_numeric_session_id_sent_as_int() {
        assert_eq!(session_id_value("42"), json!(42));
        assert_eq!(session_id_value("abc"), json!("abc"));
    }

    #[test]
    fn test_base_url_trailing_slash() {
        let backend = Backend::new("http://localhost:5000/").unwrap();
        assert_eq!(backend.url("/voice_event"), "http://localhost:5000/voice_event");
    }

    #[tokio::test]
    async fn test_unreachable_backend_is_transport_error() {
        let backend = Backend::new("http://127.0.0.1:9").unwrap();
        let service = HttpSessionService::new(backend);
        let err = service
            .close_session(&SessionHandle::new("1", "t"), &Answers::new())
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::Transport(_)));
    }
}
