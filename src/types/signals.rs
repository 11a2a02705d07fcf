//! Signal samples arriving from external producers

use serde::{Deserialize, Serialize};

/// Milliseconds on the session's monotonic clock
pub type Timestamp = u64;

/// Head direction reported by the frame analyzer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum HeadDirection {
    #[default]
    Center,
    Left,
    Right,
}

impl HeadDirection {
    /// Left or right, the directions that can become a gaze violation
    pub fn is_off_center(&self) -> bool {
        matches!(self, HeadDirection::Left | HeadDirection::Right)
    }
}

impl std::fmt::Display for HeadDirection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            HeadDirection::Center => "Center",
            HeadDirection::Left => "Left",
            HeadDirection::Right => "Right",
        };
        write!(f, "{}", name)
    }
}

/// Face rectangle in frame pixels
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub x: i32,
    pub y: i32,
    pub w: i32,
    pub h: i32,
}

/// Head pose block of an analysis response
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct HeadPose {
    pub direction: HeadDirection,
}

/// Raw response of the frame-analysis capability
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FrameAnalysis {
    #[serde(default)]
    pub faces: Vec<BoundingBox>,
    #[serde(default)]
    pub head_pose: Option<HeadPose>,
}

impl FrameAnalysis {
    /// Stamp the analysis; a missing head pose reads as Center
    pub fn into_detection(self, t: Timestamp) -> FrameDetection {
        FrameDetection {
            faces: self.faces,
            head_direction: self.head_pose.map(|p| p.direction).unwrap_or_default(),
            t,
        }
    }
}

/// One analyzed frame
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FrameDetection {
    pub faces: Vec<BoundingBox>,
    #[serde(default)]
    pub head_direction: HeadDirection,
    pub t: Timestamp,
}

/// One microphone RMS reading
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AmplitudeSample {
    pub rms: f64,
    pub t: Timestamp,
}

/// Window/focus transitions that may count as a violation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum FocusEventKind {
    TabHidden,
    WindowBlur,
    Resize { width: u32, height: u32 },
    FullscreenExit,
}

impl FocusEventKind {
    /// Reason text shown to the candidate
    pub fn reason(&self) -> &'static str {
        match self {
            FocusEventKind::TabHidden => "Tab hidden / switched away",
            FocusEventKind::WindowBlur => "Window lost focus",
            FocusEventKind::Resize { .. } => "Window resized",
            FocusEventKind::FullscreenExit => "Exited full screen",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FocusEvent {
    pub kind: FocusEventKind,
    pub t: Timestamp,
}

/// Everything a producer can push into the engine
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "signal", rename_all = "snake_case")]
pub enum Signal {
    /// Ambient sample taken during the calibration window
    CalibrationSample(AmplitudeSample),
    /// Calibration window closed
    CalibrationComplete { t: Timestamp },
    Amplitude(AmplitudeSample),
    Frame(FrameDetection),
    Focus(FocusEvent),
}
