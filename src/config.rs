use std::{path::PathBuf, time::Duration};

/// Minimum classifier score for a gesture to be shown.
pub const MATCH_CONFIDENCE: f32 = 7.5;

/// Roughly one display refresh at 60 Hz.
const DEFAULT_REFRESH_INTERVAL: Duration = Duration::from_millis(16);

#[derive(Clone, Debug, Default)]
pub struct AppConfig {
    pub camera: CameraConfig,
    pub detector: DetectorConfig,
    pub detection_loop: LoopConfig,
    pub overlay: OverlayStyle,
}

#[derive(Clone, Debug)]
pub struct CameraConfig {
    /// Falls back to the first enumerated device when unset or out of range.
    pub preferred_index: Option<u32>,
    pub width: u32,
    pub height: u32,
    pub mirrored: bool,
}

impl Default for CameraConfig {
    fn default() -> Self {
        Self {
            preferred_index: None,
            width: 640,
            height: 480,
            mirrored: true,
        }
    }
}

#[derive(Clone, Debug)]
pub struct DetectorConfig {
    pub model_dir: PathBuf,
    pub score_threshold: f32,
    pub nms_threshold: f32,
    pub top_k: usize,
    pub max_hands: usize,
    pub min_hand_confidence: f32,
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            model_dir: PathBuf::from("models"),
            score_threshold: 0.5,
            nms_threshold: 0.3,
            top_k: 32,
            max_hands: 2,
            min_hand_confidence: 0.5,
        }
    }
}

/// What the session does when a tick returns an error.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum TickFailurePolicy {
    /// Log the failure and keep scheduling ticks.
    #[default]
    Continue,
    /// Stop the loop after the first failure.
    Halt,
}

#[derive(Clone, Debug)]
pub struct LoopConfig {
    pub refresh_interval: Duration,
    pub match_confidence: f32,
    pub failure_policy: TickFailurePolicy,
}

impl Default for LoopConfig {
    fn default() -> Self {
        Self {
            refresh_interval: DEFAULT_REFRESH_INTERVAL,
            match_confidence: MATCH_CONFIDENCE,
            failure_policy: TickFailurePolicy::default(),
        }
    }
}

#[derive(Clone, Debug)]
pub struct OverlayStyle {
    pub point_radius: i32,
    pub line_width: i32,
    pub color: [u8; 4],
}

impl Default for OverlayStyle {
    fn default() -> Self {
        Self {
            point_radius: 5,
            line_width: 2,
            color: [0, 255, 0, 255],
        }
    }
}
