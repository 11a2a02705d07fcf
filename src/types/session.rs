//! Session identity and submission payloads

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Credentials for the running session, fixed for the engine's lifetime
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionHandle {
    pub session_id: String,
    pub auth_token: String,
}

impl SessionHandle {
    pub fn new(session_id: impl Into<String>, auth_token: impl Into<String>) -> Self {
        Self {
            session_id: session_id.into(),
            auth_token: auth_token.into(),
        }
    }
}

/// question id → selected option index
pub type Answers = BTreeMap<String, i64>;

/// Reply of the session service's close call
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CloseSessionResponse {
    pub success: bool,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub report_id: Option<i64>,
}

/// Reply of the session service's start call
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StartSessionResponse {
    pub success: bool,
    #[serde(default)]
    pub session_id: Option<serde_json::Value>,
    #[serde(default)]
    pub message: Option<String>,
}

impl StartSessionResponse {
    /// Session ids come back as numbers or strings
    pub fn session_id_string(&self) -> Option<String> {
        match self.session_id.as_ref()? {
            serde_json::Value::String(s) => Some(s.clone()),
            serde_json::Value::Number(n) => Some(n.to_string()),
            _ => None,
        }
    }
}

/// Local record of an unconfirmed forced submission
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FallbackMarker {
    pub reason: String,
    /// Epoch milliseconds
    pub ts: i64,
}

impl FallbackMarker {
    pub fn now(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
            ts: chrono::Utc::now().timestamp_millis(),
        }
    }
}
