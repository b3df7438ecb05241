mod anchors;

use std::{f32::consts::PI, path::Path};

use anchors::ANCHORS;
use anyhow::{Context, Result, anyhow, ensure};
use ort::session::Session;
use ort::value::Tensor;

use super::{
    build_session,
    preprocess::{HandCrop, Letterbox, PALM_INPUT_SIZE, letterbox_frame},
};
use crate::{config::DetectorConfig, types::Frame};

/// Keypoints per palm: wrist, index/middle/ring/pinky MCP, two thumb joints.
const PALM_KEYPOINTS: usize = 7;
const BOX_FEATURES: usize = 4 + PALM_KEYPOINTS * 2;
const WRIST: usize = 0;
const MIDDLE_MCP: usize = 2;

/// Crops smaller than this are grown so fingers survive the landmark stage.
const MIN_CROP_SIDE: f32 = 80.0;
const CROP_EXPANSION: f32 = 2.4;

/// One palm in frame pixel coordinates.
#[derive(Clone, Debug, PartialEq)]
pub struct PalmRegion {
    /// `[x1, y1, x2, y2]`
    pub bbox: [f32; 4],
    pub keypoints: Vec<(f32, f32)>,
    pub score: f32,
}

impl PalmRegion {
    /// Square, rotated region that should contain the whole hand.
    pub fn hand_crop(&self) -> HandCrop {
        let center = if self.keypoints.is_empty() {
            (
                (self.bbox[0] + self.bbox[2]) * 0.5,
                (self.bbox[1] + self.bbox[3]) * 0.5,
            )
        } else {
            let n = self.keypoints.len() as f32;
            let (sx, sy) = self
                .keypoints
                .iter()
                .fold((0.0, 0.0), |acc, p| (acc.0 + p.0, acc.1 + p.1));
            (sx / n, sy / n)
        };

        let box_side = (self.bbox[2] - self.bbox[0])
            .abs()
            .max((self.bbox[3] - self.bbox[1]).abs());
        let side = box_side.max(self.keypoint_span()).max(MIN_CROP_SIDE) * CROP_EXPANSION;

        HandCrop {
            center,
            side,
            angle: self.rotation(),
        }
    }

    fn keypoint_span(&self) -> f32 {
        if self.keypoints.is_empty() {
            return 0.0;
        }
        let (min_x, max_x, min_y, max_y) = self.keypoints.iter().fold(
            (f32::MAX, f32::MIN, f32::MAX, f32::MIN),
            |acc, &(x, y)| (acc.0.min(x), acc.1.max(x), acc.2.min(y), acc.3.max(y)),
        );
        (max_x - min_x).max(max_y - min_y)
    }

    /// Rotation that turns the wrist-to-middle-finger axis upright.
    pub fn rotation(&self) -> f32 {
        let (Some(wrist), Some(middle)) =
            (self.keypoints.get(WRIST), self.keypoints.get(MIDDLE_MCP))
        else {
            return 0.0;
        };
        let angle = PI * 0.5 - (-(middle.1 - wrist.1)).atan2(middle.0 - wrist.0);
        // Normalize into [-PI, PI).
        angle - 2.0 * PI * ((angle + PI) / (2.0 * PI)).floor()
    }
}

pub struct PalmDetector {
    session: Session,
    score_threshold: f32,
    nms_threshold: f32,
    top_k: usize,
}

impl PalmDetector {
    pub fn new(model_path: &Path, cfg: &DetectorConfig) -> Result<Self> {
        Ok(Self {
            session: build_session(model_path, "palm detector")?,
            score_threshold: cfg.score_threshold,
            nms_threshold: cfg.nms_threshold,
            top_k: cfg.top_k,
        })
    }

    /// Palms sorted by descending score.
    pub fn detect(&mut self, frame: &Frame) -> Result<Vec<PalmRegion>> {
        let (input, letterbox) = letterbox_frame(frame, PALM_INPUT_SIZE)?;
        let tensor = Tensor::from_array(input)?;

        let outputs = self
            .session
            .run(ort::inputs![tensor])
            .context("failed to run palm detector session")?;
        ensure!(
            outputs.len() >= 2,
            "palm detector returned {} outputs, expected 2",
            outputs.len()
        );

        let boxes = outputs[0].try_extract_array::<f32>()?;
        let scores = outputs[1].try_extract_array::<f32>()?;
        let layout = OutputLayout::new(boxes.shape(), scores.shape())?;

        let candidates = decode_palms(
            boxes
                .as_slice()
                .ok_or_else(|| anyhow!("palm boxes not contiguous"))?,
            scores
                .as_slice()
                .ok_or_else(|| anyhow!("palm scores not contiguous"))?,
            &layout,
            &letterbox,
            self.score_threshold,
        );

        Ok(nms(candidates, self.nms_threshold, self.top_k))
    }
}

/// Row sizes of the `[batch, anchors, features]` palm outputs.
#[derive(Debug)]
struct OutputLayout {
    anchors: usize,
    box_stride: usize,
    score_stride: usize,
}

impl OutputLayout {
    fn new(box_shape: &[usize], score_shape: &[usize]) -> Result<Self> {
        let split = |shape: &[usize], what: &str| -> Result<(usize, usize)> {
            match shape {
                [.., anchors, features] if shape.len() >= 3 => Ok((*anchors, *features)),
                _ => Err(anyhow!(
                    "unexpected palm {what} shape {shape:?}, need [batch, anchors, features]"
                )),
            }
        };
        let (anchors, box_stride) = split(box_shape, "box")?;
        let (score_anchors, score_stride) = split(score_shape, "score")?;

        ensure!(
            box_stride >= BOX_FEATURES,
            "palm box feature dimension too small: {box_stride}"
        );
        ensure!(
            anchors == score_anchors,
            "anchor count mismatch between boxes ({anchors}) and scores ({score_anchors})"
        );
        ensure!(score_stride > 0, "palm score feature dimension is empty");

        Ok(Self {
            anchors: anchors.min(ANCHORS.len()),
            box_stride,
            score_stride,
        })
    }
}

fn decode_palms(
    boxes: &[f32],
    scores: &[f32],
    layout: &OutputLayout,
    letterbox: &Letterbox,
    score_threshold: f32,
) -> Vec<PalmRegion> {
    let input = PALM_INPUT_SIZE as f32;
    let scale = letterbox.orig_w.max(letterbox.orig_h) as f32;
    let bias = (
        letterbox.pad_x / letterbox.scale,
        letterbox.pad_y / letterbox.scale,
    );
    // Anchor-relative model units to frame pixels.
    let to_frame = |anchor: [f32; 2], dx: f32, dy: f32| {
        (
            (anchor[0] + dx / input) * scale - bias.0,
            (anchor[1] + dy / input) * scale - bias.1,
        )
    };

    let mut palms = Vec::new();
    for (idx, anchor) in ANCHORS.iter().copied().enumerate().take(layout.anchors) {
        let Some(&raw_score) = scores.get(idx * layout.score_stride) else {
            break;
        };
        let score = sigmoid(raw_score);
        if score < score_threshold {
            continue;
        }
        let Some(row) = boxes.get(idx * layout.box_stride..idx * layout.box_stride + BOX_FEATURES)
        else {
            break;
        };

        let (cx, cy) = (row[0], row[1]);
        let (half_w, half_h) = (row[2] * 0.5, row[3] * 0.5);
        let (x1, y1) = to_frame(anchor, cx - half_w, cy - half_h);
        let (x2, y2) = to_frame(anchor, cx + half_w, cy + half_h);
        if x2 <= x1 || y2 <= y1 {
            continue;
        }

        let keypoints = row[4..]
            .chunks_exact(2)
            .map(|kp| to_frame(anchor, kp[0], kp[1]))
            .collect();

        palms.push(PalmRegion {
            bbox: clamp_box([x1, y1, x2, y2], letterbox.orig_w, letterbox.orig_h),
            keypoints,
            score,
        });
    }
    palms
}

/// Greedy non-maximum suppression. Returns at most `top_k` palms, best first.
fn nms(mut candidates: Vec<PalmRegion>, iou_threshold: f32, top_k: usize) -> Vec<PalmRegion> {
    candidates.sort_by(|a, b| b.score.total_cmp(&a.score));

    let mut kept: Vec<PalmRegion> = Vec::new();
    for candidate in candidates {
        if kept.len() >= top_k {
            break;
        }
        if kept
            .iter()
            .all(|k| iou(&k.bbox, &candidate.bbox) < iou_threshold)
        {
            kept.push(candidate);
        }
    }
    kept
}

fn iou(a: &[f32; 4], b: &[f32; 4]) -> f32 {
    let inter_w = (a[2].min(b[2]) - a[0].max(b[0])).max(0.0);
    let inter_h = (a[3].min(b[3]) - a[1].max(b[1])).max(0.0);
    let inter = inter_w * inter_h;
    if inter <= 0.0 {
        return 0.0;
    }

    let area = |r: &[f32; 4]| (r[2] - r[0]).max(0.0) * (r[3] - r[1]).max(0.0);
    let union = area(a) + area(b) - inter;
    if union <= 0.0 { 0.0 } else { inter / union }
}

fn sigmoid(x: f32) -> f32 {
    1.0 / (1.0 + (-x).exp())
}

fn clamp_box(bbox: [f32; 4], w: u32, h: u32) -> [f32; 4] {
    let max_x = w.saturating_sub(1) as f32;
    let max_y = h.saturating_sub(1) as f32;
    [
        bbox[0].clamp(0.0, max_x),
        bbox[1].clamp(0.0, max_y),
        bbox[2].clamp(0.0, max_x),
        bbox[3].clamp(0.0, max_y),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    fn palm(bbox: [f32; 4], score: f32) -> PalmRegion {
        PalmRegion {
            bbox,
            keypoints: Vec::new(),
            score,
        }
    }

    #[test]
    fn iou_of_identical_and_disjoint_boxes() {
        let a = [0.0, 0.0, 10.0, 10.0];
        assert!((iou(&a, &a) - 1.0).abs() < 1e-6);
        assert_eq!(iou(&a, &[20.0, 20.0, 30.0, 30.0]), 0.0);
        // Half overlap: 50 / 150.
        assert!((iou(&a, &[5.0, 0.0, 15.0, 10.0]) - 1.0 / 3.0).abs() < 1e-6);
    }

    #[test]
    fn nms_drops_overlapping_lower_scores() {
        let kept = nms(
            vec![
                palm([0.0, 0.0, 10.0, 10.0], 0.6),
                palm([1.0, 1.0, 11.0, 11.0], 0.9),
                palm([50.0, 50.0, 60.0, 60.0], 0.7),
            ],
            0.3,
            32,
        );
        let scores: Vec<f32> = kept.iter().map(|p| p.score).collect();
        assert_eq!(scores, vec![0.9, 0.7]);
    }

    #[test]
    fn nms_respects_top_k() {
        let kept = nms(
            vec![
                palm([0.0, 0.0, 10.0, 10.0], 0.6),
                palm([50.0, 50.0, 60.0, 60.0], 0.7),
            ],
            0.3,
            1,
        );
        assert_eq!(kept.len(), 1);
        assert_eq!(kept[0].score, 0.7);
    }

    #[test]
    fn decoding_keeps_confident_anchors_in_frame_space() {
        let layout = OutputLayout::new(&[1, 2016, 18], &[1, 2016, 1]).unwrap();
        let mut boxes = vec![0.0f32; 2016 * 18];
        let mut scores = vec![-10.0f32; 2016];
        // First anchor sits at (4, 4) in the 192 input: a 16x16 box around it.
        scores[0] = 10.0;
        boxes[2] = 16.0;
        boxes[3] = 16.0;

        let letterbox = Letterbox {
            scale: 1.0,
            pad_x: 0.0,
            pad_y: 0.0,
            orig_w: 192,
            orig_h: 192,
        };
        let palms = decode_palms(&boxes, &scores, &layout, &letterbox, 0.5);
        assert_eq!(palms.len(), 1);
        let bbox = palms[0].bbox;
        assert!(bbox[0].abs() < 1e-3 && bbox[1].abs() < 1e-3);
        assert!((bbox[2] - 12.0).abs() < 1e-3 && (bbox[3] - 12.0).abs() < 1e-3);
        assert_eq!(palms[0].keypoints.len(), PALM_KEYPOINTS);
        assert!((palms[0].keypoints[0].0 - 4.0).abs() < 1e-3);
    }

    #[test]
    fn mismatched_output_shapes_are_rejected() {
        assert!(OutputLayout::new(&[2016, 18], &[1, 2016, 1]).is_err());
        assert!(OutputLayout::new(&[1, 2016, 8], &[1, 2016, 1]).is_err());
        assert!(OutputLayout::new(&[1, 2016, 18], &[1, 896, 1]).is_err());
    }

    #[test]
    fn upright_palm_needs_no_rotation() {
        let mut region = palm([0.0, 0.0, 100.0, 100.0], 0.9);
        region.keypoints = vec![(50.0, 90.0), (40.0, 40.0), (50.0, 30.0)];
        assert!(region.rotation().abs() < 1e-5);

        // Fingers pointing to the right of the frame.
        region.keypoints = vec![(10.0, 50.0), (60.0, 40.0), (70.0, 50.0)];
        assert!((region.rotation() - PI * 0.5).abs() < 1e-5);

        let crop = region.hand_crop();
        assert!((crop.side - 100.0 * CROP_EXPANSION).abs() < 1e-3);
    }
}
