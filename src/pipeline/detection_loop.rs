use std::sync::Arc;

use anyhow::{Context, Result};

use super::{
    camera::FrameSource,
    detector::PoseDetector,
    overlay::{DrawSurface, Overlay, OverlayCanvas, render_overlay},
};
use crate::{
    config::OverlayStyle,
    gesture::GestureClassifier,
    types::{DisplayedGesture, GestureCandidate, HandDetection},
};

/// Everything one processed frame produces for the UI.
#[derive(Clone, Debug)]
pub struct TickOutput {
    pub displayed_gesture: DisplayedGesture,
    pub hands: Vec<HandDetection>,
    pub overlay: Arc<Overlay>,
}

/// Picks the label for one hand's candidates.
///
/// The highest confidence wins and the earliest candidate keeps ties. Its
/// name is only shown when the confidence is strictly above `threshold`.
pub fn select_displayed_gesture(
    candidates: &[GestureCandidate],
    threshold: f32,
) -> DisplayedGesture {
    let mut best: Option<&GestureCandidate> = None;
    for candidate in candidates {
        if best.is_none_or(|current| candidate.confidence > current.confidence) {
            best = Some(candidate);
        }
    }

    match best {
        Some(candidate) if candidate.confidence > threshold => {
            DisplayedGesture::Gesture(candidate.name)
        }
        _ => DisplayedGesture::NoGestureDetected,
    }
}

pub struct DetectionLoop<S, D, C> {
    source: S,
    detector: D,
    classifier: C,
    canvas: OverlayCanvas,
    style: OverlayStyle,
    match_confidence: f32,
}

impl<S, D, C> DetectionLoop<S, D, C>
where
    S: FrameSource,
    D: PoseDetector,
    C: GestureClassifier,
{
    pub fn new(
        source: S,
        detector: D,
        classifier: C,
        style: OverlayStyle,
        match_confidence: f32,
    ) -> Self {
        Self {
            source,
            detector,
            classifier,
            canvas: OverlayCanvas::default(),
            style,
            match_confidence,
        }
    }

    /// Capture failure reported by the frame source, if any.
    pub fn take_source_fault(&mut self) -> Option<String> {
        self.source.take_fault()
    }

    /// Runs one iteration. `Ok(None)` means no frame was available yet.
    pub fn tick(&mut self) -> Result<Option<TickOutput>> {
        if !self.source.ready() {
            return Ok(None);
        }
        let Some(frame) = self.source.current_frame() else {
            return Ok(None);
        };

        self.canvas.resize(frame.width, frame.height);

        let hands = self
            .detector
            .estimate_hands(frame)
            .with_context(|| format!("hand detection failed on {}x{} frame", frame.width, frame.height))?;

        log::trace!(
            "{} hands in frame captured {:?} ago",
            hands.len(),
            frame.timestamp.elapsed()
        );

        self.canvas.clear();
        render_overlay(&mut self.canvas, &hands, &self.style);

        let mut displayed = DisplayedGesture::NoHandDetected;
        for hand in &hands {
            let candidates = self
                .classifier
                .estimate(&hand.landmarks, self.match_confidence);
            displayed = select_displayed_gesture(&candidates, self.match_confidence);
            log::trace!(
                "{} hand ({:.2}): {} candidates -> {}",
                hand.handedness.label(),
                hand.score,
                candidates.len(),
                displayed.as_str()
            );
        }

        Ok(Some(TickOutput {
            displayed_gesture: displayed,
            hands,
            overlay: Arc::new(self.canvas.snapshot()),
        }))
    }
}
