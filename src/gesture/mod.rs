mod description;
mod finger_pose;

use crate::types::{GestureCandidate, Landmark};

pub use description::{GestureDescription, default_gestures};
use finger_pose::estimate_hand_pose;

/// Maps one hand's landmarks to scored gesture candidates.
pub trait GestureClassifier: Send + 'static {
    /// Returns every gesture scoring at least `min_confidence`, in the
    /// classifier's own ranking order.
    fn estimate(&self, landmarks: &[Landmark], min_confidence: f32) -> Vec<GestureCandidate>;
}

/// Scores finger curl and direction against a fixed set of gesture descriptions.
pub struct FingerPoseEstimator {
    descriptions: Vec<GestureDescription>,
}

impl FingerPoseEstimator {
    pub fn new(descriptions: Vec<GestureDescription>) -> Self {
        Self { descriptions }
    }
}

impl Default for FingerPoseEstimator {
    fn default() -> Self {
        Self::new(default_gestures())
    }
}

impl GestureClassifier for FingerPoseEstimator {
    fn estimate(&self, landmarks: &[Landmark], min_confidence: f32) -> Vec<GestureCandidate> {
        let Some(pose) = estimate_hand_pose(landmarks) else {
            log::debug!("skipping classification of {} landmarks", landmarks.len());
            return Vec::new();
        };

        self.descriptions
            .iter()
            .filter_map(|description| {
                let confidence = description.match_score(&pose);
                (confidence >= min_confidence).then_some(GestureCandidate {
                    name: description.name,
                    confidence,
                })
            })
            .collect()
    }
}
