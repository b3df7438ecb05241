use std::time::Instant;

#[derive(Clone, Debug)]
pub struct Frame {
    pub rgba: Vec<u8>,
    pub width: u32,
    pub height: u32,
    pub timestamp: Instant,
}

/// One landmark in frame pixel space; z is relative depth on the x/y scale.
pub type Landmark = [f32; 3];

pub const NUM_LANDMARKS: usize = 21;

/// Anatomical landmark indices of a hand landmark set.
pub mod landmark {
    pub const WRIST: usize = 0;
    pub const THUMB_CMC: usize = 1;
    pub const THUMB_MCP: usize = 2;
    pub const THUMB_IP: usize = 3;
    pub const THUMB_TIP: usize = 4;
    pub const INDEX_MCP: usize = 5;
    pub const INDEX_PIP: usize = 6;
    pub const INDEX_DIP: usize = 7;
    pub const INDEX_TIP: usize = 8;
    pub const MIDDLE_MCP: usize = 9;
    pub const MIDDLE_PIP: usize = 10;
    pub const MIDDLE_DIP: usize = 11;
    pub const MIDDLE_TIP: usize = 12;
    pub const RING_MCP: usize = 13;
    pub const RING_PIP: usize = 14;
    pub const RING_DIP: usize = 15;
    pub const RING_TIP: usize = 16;
    pub const PINKY_MCP: usize = 17;
    pub const PINKY_PIP: usize = 18;
    pub const PINKY_DIP: usize = 19;
    pub const PINKY_TIP: usize = 20;
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Handedness {
    Left,
    Right,
}

impl Handedness {
    pub fn from_score(score: f32) -> Self {
        if score >= 0.5 {
            Handedness::Right
        } else {
            Handedness::Left
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Handedness::Left => "left",
            Handedness::Right => "right",
        }
    }
}

#[derive(Clone, Debug)]
pub struct HandDetection {
    pub landmarks: Vec<Landmark>,
    pub handedness: Handedness,
    pub score: f32,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum GestureName {
    ThumbsUp,
    ThumbsDown,
    Victory,
    ThumbRight,
    ThumbLeft,
    OpenHand,
    ClosedFist,
}

impl GestureName {
    pub const ALL: [GestureName; 7] = [
        GestureName::ThumbsUp,
        GestureName::ThumbsDown,
        GestureName::Victory,
        GestureName::ThumbRight,
        GestureName::ThumbLeft,
        GestureName::OpenHand,
        GestureName::ClosedFist,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            GestureName::ThumbsUp => "thumbs_up",
            GestureName::ThumbsDown => "thumbs_down",
            GestureName::Victory => "victory",
            GestureName::ThumbRight => "thumb_right",
            GestureName::ThumbLeft => "thumb_left",
            GestureName::OpenHand => "open_hand",
            GestureName::ClosedFist => "closed_fist",
        }
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            GestureName::ThumbsUp => "Thumbs Up",
            GestureName::ThumbsDown => "Thumbs Down",
            GestureName::Victory => "Victory",
            GestureName::ThumbRight => "Thumb Right",
            GestureName::ThumbLeft => "Thumb Left",
            GestureName::OpenHand => "Open Hand",
            GestureName::ClosedFist => "Closed Fist",
        }
    }

    pub fn emoji(&self) -> &'static str {
        match self {
            GestureName::ThumbsUp => "👍",
            GestureName::ThumbsDown => "👎",
            GestureName::Victory => "✌️",
            GestureName::ThumbRight => "👉",
            GestureName::ThumbLeft => "👈",
            GestureName::OpenHand => "✋",
            GestureName::ClosedFist => "✊",
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct GestureCandidate {
    pub name: GestureName,
    pub confidence: f32,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DisplayedGesture {
    Gesture(GestureName),
    NoGestureDetected,
    NoHandDetected,
}

impl DisplayedGesture {
    pub fn as_str(&self) -> &'static str {
        match self {
            DisplayedGesture::Gesture(name) => name.as_str(),
            DisplayedGesture::NoGestureDetected => "no gesture detected",
            DisplayedGesture::NoHandDetected => "no hand detected",
        }
    }

    pub fn display_text(&self) -> String {
        match self {
            DisplayedGesture::Gesture(name) => format!("{} {}", name.emoji(), name.display_name()),
            DisplayedGesture::NoGestureDetected => "No gesture detected".to_string(),
            DisplayedGesture::NoHandDetected => "No hand detected".to_string(),
        }
    }
}

/// Snapshot of everything the UI shell renders from.
#[derive(Clone, Debug, PartialEq)]
pub struct AppState {
    pub model_loaded: bool,
    pub load_error: Option<String>,
    pub displayed_gesture: DisplayedGesture,
}

impl Default for AppState {
    fn default() -> Self {
        Self {
            model_loaded: false,
            load_error: None,
            displayed_gesture: DisplayedGesture::NoGestureDetected,
        }
    }
}

impl AppState {
    pub fn is_loading(&self) -> bool {
        !self.model_loaded && self.load_error.is_none()
    }

    pub fn with_model_loaded(&self) -> Self {
        Self {
            model_loaded: true,
            load_error: None,
            ..self.clone()
        }
    }

    pub fn with_load_error(&self, message: impl Into<String>) -> Self {
        Self {
            model_loaded: false,
            load_error: Some(message.into()),
            ..self.clone()
        }
    }

    pub fn with_displayed_gesture(&self, displayed_gesture: DisplayedGesture) -> Self {
        Self {
            displayed_gesture,
            ..self.clone()
        }
    }
}
