use std::path::Path;

use anyhow::{Context, Result, ensure};
use ort::session::Session;
use ort::value::Tensor;

use super::{
    PoseDetector, build_session,
    palm::PalmDetector,
    preprocess::{LANDMARK_INPUT_SIZE, crop_rotated, decode_landmarks},
};
use crate::{
    config::DetectorConfig,
    types::{Frame, HandDetection, Handedness},
};

/// Two-stage MediaPipe hand tracker: palm detection, then 21-point
/// landmarks on a rotated crop around each palm.
pub struct OrtHandDetector {
    palm_detector: PalmDetector,
    landmarks: Session,
    max_hands: usize,
    min_hand_confidence: f32,
}

impl OrtHandDetector {
    pub fn new(palm_model: &Path, landmark_model: &Path, cfg: &DetectorConfig) -> Result<Self> {
        let palm_detector = PalmDetector::new(palm_model, cfg)?;
        let landmarks = build_session(landmark_model, "hand landmark model")?;
        log::info!(
            "hand detector ready using {} and {}",
            palm_model.display(),
            landmark_model.display()
        );

        Ok(Self {
            palm_detector,
            landmarks,
            max_hands: cfg.max_hands,
            min_hand_confidence: cfg.min_hand_confidence,
        })
    }
}

impl PoseDetector for OrtHandDetector {
    fn estimate_hands(&mut self, frame: &Frame) -> Result<Vec<HandDetection>> {
        let palms = self
            .palm_detector
            .detect(frame)
            .context("palm detection failed")?;

        let mut hands = Vec::with_capacity(palms.len().min(self.max_hands));
        for palm in palms.iter().take(self.max_hands) {
            let (input, transform) = crop_rotated(frame, palm.hand_crop(), LANDMARK_INPUT_SIZE)?;
            let tensor = Tensor::from_array(input)?;
            let outputs = self
                .landmarks
                .run(ort::inputs![tensor])
                .context("failed to run hand landmark session")?;
            ensure!(outputs.len() >= 1, "hand landmark model returned no outputs");

            let scalar = |idx: usize| -> f32 {
                if idx >= outputs.len() {
                    return 0.0;
                }
                outputs[idx]
                    .try_extract_array::<f32>()
                    .ok()
                    .and_then(|arr| arr.iter().next().copied())
                    .unwrap_or(0.0)
            };

            let score = (scalar(1) * palm.score).clamp(0.0, 1.0);
            if score < self.min_hand_confidence {
                log::trace!("dropping hand with score {score:.2}");
                continue;
            }

            let coords = outputs[0].try_extract_array::<f32>()?;
            let flat: Vec<f32> = coords.iter().copied().collect();
            let landmarks = decode_landmarks(&flat)?
                .into_iter()
                .map(|point| transform.project(point))
                .collect();

            hands.push(HandDetection {
                landmarks,
                handedness: Handedness::from_score(scalar(2)),
                score,
            });
        }

        Ok(hands)
    }
}
