//! Capabilities the engine consumes
//!
//! The engine never talks to a camera, a microphone, or a backend directly;
//! it goes through these traits. HTTP implementations live in `remote`.

use async_trait::async_trait;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Mutex;

use crate::core::voice::rms_of;
use crate::error::ServiceError;
use crate::types::{
    Answers, CloseSessionResponse, FallbackMarker, FrameAnalysis, SessionHandle,
    StartSessionResponse, VoiceEventKind,
};

/// External face / head-pose analysis
#[async_trait]
pub trait FrameAnalyzer: Send + Sync {
    async fn analyze_frame(
        &self,
        session_id: &str,
        image: &[u8],
    ) -> Result<FrameAnalysis, ServiceError>;
}

/// Fire-and-forget voice audit sink
#[async_trait]
pub trait VoiceTelemetry: Send + Sync {
    async fn report(
        &self,
        session_id: &str,
        rms: f64,
        kind: VoiceEventKind,
        duration: Option<f64>,
    ) -> Result<(), ServiceError>;
}

/// Authoritative session lifecycle
#[async_trait]
pub trait SessionService: Send + Sync {
    async fn start_session(
        &self,
        auth_token: &str,
        exam_id: &str,
    ) -> Result<StartSessionResponse, ServiceError>;

    async fn close_session(
        &self,
        handle: &SessionHandle,
        answers: &Answers,
    ) -> Result<CloseSessionResponse, ServiceError>;
}

/// Camera frames, already encoded
#[async_trait]
pub trait FrameSource: Send {
    /// Whether the candidate granted camera access
    fn permission_granted(&self) -> bool {
        true
    }

    /// Next frame; `None` while the stream is not ready yet
    async fn capture(&mut self) -> Result<Option<Vec<u8>>, ServiceError>;

    /// Release the device; called once when the loop stops
    fn close(&mut self) {}
}

/// Microphone RMS readings
pub trait AmplitudeSource: Send {
    /// Whether the candidate granted microphone access
    fn permission_granted(&self) -> bool {
        true
    }

    fn sample(&mut self) -> Result<f64, ServiceError>;

    /// Release the device; called once when the loop stops
    fn close(&mut self) {}
}

/// Raw microphone PCM buffers
pub trait PcmSource: Send {
    fn permission_granted(&self) -> bool {
        true
    }

    /// Latest buffer of samples in `[-1.0, 1.0]`
    fn read(&mut self) -> Result<Vec<f32>, ServiceError>;

    fn close(&mut self) {}
}

/// Adapts a PCM source into RMS readings
pub struct PcmAmplitudeSource<S> {
    inner: S,
}

impl<S: PcmSource> PcmAmplitudeSource<S> {
    pub fn new(inner: S) -> Self {
        Self { inner }
    }
}

impl<S: PcmSource> AmplitudeSource for PcmAmplitudeSource<S> {
    fn permission_granted(&self) -> bool {
        self.inner.permission_granted()
    }

    fn sample(&mut self) -> Result<f64, ServiceError> {
        self.inner.read().map(|buffer| rms_of(&buffer))
    }

    fn close(&mut self) {
        self.inner.close();
    }
}

/// Local key/value slot for the fallback marker
pub trait MarkerStore: Send + Sync {
    fn persist(&self, key: &str, marker: &FallbackMarker) -> Result<(), ServiceError>;
    fn load(&self, key: &str) -> Result<Option<FallbackMarker>, ServiceError>;
}

/// One `<key>.json` file per marker
#[derive(Debug, Clone)]
pub struct FileMarkerStore {
    dir: PathBuf,
}

impl FileMarkerStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    fn path_for(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{}.json", key))
    }
}

impl MarkerStore for FileMarkerStore {
    fn persist(&self, key: &str, marker: &FallbackMarker) -> Result<(), ServiceError> {
        std::fs::create_dir_all(&self.dir)
            .map_err(|e| ServiceError::Unavailable(e.to_string()))?;
        let json = serde_json::to_string_pretty(marker)
            .map_err(|e| ServiceError::Decode(e.to_string()))?;
        std::fs::write(self.path_for(key), json)
            .map_err(|e| ServiceError::Unavailable(e.to_string()))
    }

    fn load(&self, key: &str) -> Result<Option<FallbackMarker>, ServiceError> {
        let path = self.path_for(key);
        if !path.exists() {
            return Ok(None);
        }
        let content =
            std::fs::read_to_string(path).map_err(|e| ServiceError::Unavailable(e.to_string()))?;
        serde_json::from_str(&content)
            .map(Some)
            .map_err(|e| ServiceError::Decode(e.to_string()))
    }
}

/// Process-local marker store
#[derive(Debug, Default)]
pub struct MemoryMarkerStore {
    markers: Mutex<HashMap<String, FallbackMarker>>,
}

impl MemoryMarkerStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl MarkerStore for MemoryMarkerStore {
    fn persist(&self, key: &str, marker: &FallbackMarker) -> Result<(), ServiceError> {
        let mut markers = self
            .markers
            .lock()
            .map_err(|_| ServiceError::Unavailable("marker store poisoned".to_string()))?;
        markers.insert(key.to_string(), marker.clone());
        Ok(())
    }

    fn load(&self, key: &str) -> Result<Option<FallbackMarker>, ServiceError> {
        let markers = self
            .markers
            .lock()
            .map_err(|_| ServiceError::Unavailable("marker store poisoned".to_string()))?;
        Ok(markers.get(key).cloned())
    }
}
