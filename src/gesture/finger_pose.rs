use crate::types::{Landmark, NUM_LANDMARKS, landmark};

const HALF_CURL_START_LIMIT: f32 = 60.0;
const NO_CURL_START_LIMIT: f32 = 130.0;

const DISTANCE_VOTE_POWER: f32 = 1.1;
const SINGLE_ANGLE_VOTE_POWER: f32 = 0.9;
const TOTAL_ANGLE_VOTE_POWER: f32 = 1.6;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Finger {
    Thumb,
    Index,
    Middle,
    Ring,
    Pinky,
}

impl Finger {
    pub const ALL: [Finger; 5] = [
        Finger::Thumb,
        Finger::Index,
        Finger::Middle,
        Finger::Ring,
        Finger::Pinky,
    ];

    pub fn index(self) -> usize {
        self as usize
    }

    fn bones(self) -> [(usize, usize); 4] {
        use landmark::*;
        match self {
            Finger::Thumb => [
                (WRIST, THUMB_CMC),
                (THUMB_CMC, THUMB_MCP),
                (THUMB_MCP, THUMB_IP),
                (THUMB_IP, THUMB_TIP),
            ],
            Finger::Index => [
                (WRIST, INDEX_MCP),
                (INDEX_MCP, INDEX_PIP),
                (INDEX_PIP, INDEX_DIP),
                (INDEX_DIP, INDEX_TIP),
            ],
            Finger::Middle => [
                (WRIST, MIDDLE_MCP),
                (MIDDLE_MCP, MIDDLE_PIP),
                (MIDDLE_PIP, MIDDLE_DIP),
                (MIDDLE_DIP, MIDDLE_TIP),
            ],
            Finger::Ring => [
                (WRIST, RING_MCP),
                (RING_MCP, RING_PIP),
                (RING_PIP, RING_DIP),
                (RING_DIP, RING_TIP),
            ],
            Finger::Pinky => [
                (WRIST, PINKY_MCP),
                (PINKY_MCP, PINKY_PIP),
                (PINKY_PIP, PINKY_DIP),
                (PINKY_DIP, PINKY_TIP),
            ],
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FingerCurl {
    NoCurl,
    HalfCurl,
    FullCurl,
}

/// Pointing direction in image coordinates (y grows downwards).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FingerDirection {
    VerticalUp,
    VerticalDown,
    HorizontalLeft,
    HorizontalRight,
    DiagonalUpRight,
    DiagonalUpLeft,
    DiagonalDownRight,
    DiagonalDownLeft,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FingerPose {
    pub curl: FingerCurl,
    pub direction: FingerDirection,
}

pub type HandPose = [FingerPose; 5];

pub fn estimate_hand_pose(landmarks: &[Landmark]) -> Option<HandPose> {
    if landmarks.len() < NUM_LANDMARKS {
        return None;
    }
    Some(Finger::ALL.map(|finger| estimate_finger_pose(landmarks, finger)))
}

fn estimate_finger_pose(landmarks: &[Landmark], finger: Finger) -> FingerPose {
    let bones = finger.bones();
    // The thumb is measured from its CMC joint, every other finger from the wrist.
    let first = if finger == Finger::Thumb { 1 } else { 0 };

    let start = landmarks[bones[first].0];
    let mid = landmarks[bones[first + 1].1];
    let end = landmarks[bones[3].1];

    let bone_slopes: Vec<f32> = bones[first..]
        .iter()
        .map(|&(a, b)| slope_degrees(landmarks[a], landmarks[b]))
        .collect();

    FingerPose {
        curl: estimate_curl(start, mid, end),
        direction: estimate_direction(start, mid, end, &bone_slopes),
    }
}

fn estimate_curl(start: Landmark, mid: Landmark, end: Landmark) -> FingerCurl {
    let start_mid = distance3(start, mid);
    let start_end = distance3(start, end);
    let mid_end = distance3(mid, end);

    let denom = 2.0 * mid_end * start_mid;
    if denom <= f32::EPSILON {
        return FingerCurl::FullCurl;
    }

    let cos_in = ((mid_end * mid_end + start_mid * start_mid - start_end * start_end) / denom)
        .clamp(-1.0, 1.0);
    let angle = cos_in.acos().to_degrees();

    if angle > NO_CURL_START_LIMIT {
        FingerCurl::NoCurl
    } else if angle > HALF_CURL_START_LIMIT {
        FingerCurl::HalfCurl
    } else {
        FingerCurl::FullCurl
    }
}

#[derive(Default)]
struct OrientationVotes {
    vertical: f32,
    diagonal: f32,
    horizontal: f32,
}

impl OrientationVotes {
    fn add_angle(&mut self, angle: f32, power: f32) {
        if (75.0..=105.0).contains(&angle) {
            self.vertical += power;
        } else if (25.0..=155.0).contains(&angle) {
            self.diagonal += power;
        } else {
            self.horizontal += power;
        }
    }
}

fn estimate_direction(
    start: Landmark,
    mid: Landmark,
    end: Landmark,
    bone_slopes: &[f32],
) -> FingerDirection {
    let start_mid_x = start[0] - mid[0];
    let start_end_x = start[0] - end[0];
    let mid_end_x = mid[0] - end[0];

    let start_mid_y = start[1] - mid[1];
    let start_end_y = start[1] - end[1];
    let mid_end_y = mid[1] - end[1];

    let max_x = start_mid_x.abs().max(start_end_x.abs()).max(mid_end_x.abs());
    let max_y = start_mid_y.abs().max(start_end_y.abs()).max(mid_end_y.abs());

    let mut votes = OrientationVotes::default();

    let ratio = max_y / (max_x + 0.00001);
    if ratio > 1.5 {
        votes.vertical += DISTANCE_VOTE_POWER;
    } else if ratio > 0.66 {
        votes.diagonal += DISTANCE_VOTE_POWER;
    } else {
        votes.horizontal += DISTANCE_VOTE_POWER;
    }

    let start_mid_len = start_mid_x.hypot(start_mid_y);
    let start_end_len = start_end_x.hypot(start_end_y);
    let mid_end_len = mid_end_x.hypot(mid_end_y);
    let longest = start_mid_len.max(start_end_len).max(mid_end_len);

    let (from, to) = if longest == start_mid_len {
        (start, mid)
    } else if longest == mid_end_len {
        (mid, end)
    } else {
        (start, end)
    };
    votes.add_angle(slope_degrees(from, to), TOTAL_ANGLE_VOTE_POWER);

    for &slope in bone_slopes {
        votes.add_angle(slope, SINGLE_ANGLE_VOTE_POWER);
    }

    let vertical = vertical_direction(start_end_y, start_mid_y, mid_end_y, max_y);
    let horizontal = horizontal_direction(start_end_x, start_mid_x, mid_end_x, max_x);

    let strongest = votes.vertical.max(votes.diagonal).max(votes.horizontal);
    if votes.vertical == strongest {
        vertical
    } else if votes.horizontal == strongest {
        horizontal
    } else {
        diagonal_direction(vertical, horizontal)
    }
}

/// Signed span with the largest magnitude, preferring the start-to-end span on ties.
fn dominant_span(start_end: f32, start_mid: f32, mid_end: f32, max: f32) -> f32 {
    if max == start_end.abs() {
        start_end
    } else if max == start_mid.abs() {
        start_mid
    } else {
        mid_end
    }
}

fn vertical_direction(start_end: f32, start_mid: f32, mid_end: f32, max: f32) -> FingerDirection {
    if dominant_span(start_end, start_mid, mid_end, max) < 0.0 {
        FingerDirection::VerticalDown
    } else {
        FingerDirection::VerticalUp
    }
}

fn horizontal_direction(
    start_end: f32,
    start_mid: f32,
    mid_end: f32,
    max: f32,
) -> FingerDirection {
    if dominant_span(start_end, start_mid, mid_end, max) > 0.0 {
        FingerDirection::HorizontalLeft
    } else {
        FingerDirection::HorizontalRight
    }
}

fn diagonal_direction(vertical: FingerDirection, horizontal: FingerDirection) -> FingerDirection {
    match (vertical, horizontal) {
        (FingerDirection::VerticalUp, FingerDirection::HorizontalLeft) => {
            FingerDirection::DiagonalUpLeft
        }
        (FingerDirection::VerticalUp, _) => FingerDirection::DiagonalUpRight,
        (_, FingerDirection::HorizontalLeft) => FingerDirection::DiagonalDownLeft,
        _ => FingerDirection::DiagonalDownRight,
    }
}

/// Unsigned slope of the segment in degrees, folded into [0, 180).
fn slope_degrees(a: Landmark, b: Landmark) -> f32 {
    let value = (a[1] - b[1]) / (a[0] - b[0]);
    let slope = value.atan().to_degrees();
    if slope <= 0.0 { -slope } else { 180.0 - slope }
}

fn distance3(a: Landmark, b: Landmark) -> f32 {
    ((a[0] - b[0]).powi(2) + (a[1] - b[1]).powi(2) + (a[2] - b[2]).powi(2)).sqrt()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn straight_chain_is_not_curled() {
        let curl = estimate_curl([0.0, 0.0, 0.0], [0.0, -50.0, 0.0], [0.0, -100.0, 0.0]);
        assert_eq!(curl, FingerCurl::NoCurl);
    }

    #[test]
    fn right_angle_is_half_curl() {
        let curl = estimate_curl([0.0, 0.0, 0.0], [0.0, -50.0, 0.0], [50.0, -50.0, 0.0]);
        assert_eq!(curl, FingerCurl::HalfCurl);
    }

    #[test]
    fn folded_back_chain_is_full_curl() {
        let curl = estimate_curl([0.0, 0.0, 0.0], [0.0, -50.0, 0.0], [10.0, -10.0, 0.0]);
        assert_eq!(curl, FingerCurl::FullCurl);
    }

    #[test]
    fn slopes_fold_into_half_turn() {
        assert!((slope_degrees([0.0, 0.0, 0.0], [10.0, 0.0, 0.0]) - 0.0).abs() < 1e-4);
        assert!((slope_degrees([0.0, 10.0, 0.0], [0.0, 0.0, 0.0]) - 90.0).abs() < 1e-4);
        assert!((slope_degrees([0.0, 10.0, 0.0], [10.0, 0.0, 0.0]) - 45.0).abs() < 1e-4);
        assert!((slope_degrees([10.0, 10.0, 0.0], [0.0, 0.0, 0.0]) - 135.0).abs() < 1e-4);
    }

    #[test]
    fn upward_finger_points_up() {
        let direction = estimate_direction(
            [0.0, 100.0, 0.0],
            [0.0, 50.0, 0.0],
            [0.0, 0.0, 0.0],
            &[90.0, 90.0, 90.0, 90.0],
        );
        assert_eq!(direction, FingerDirection::VerticalUp);
    }

    #[test]
    fn sideways_finger_points_left() {
        let direction = estimate_direction(
            [100.0, 0.0, 0.0],
            [50.0, 0.0, 0.0],
            [0.0, 0.0, 0.0],
            &[0.0, 0.0, 0.0, 0.0],
        );
        assert_eq!(direction, FingerDirection::HorizontalLeft);
    }

    #[test]
    fn short_landmark_sets_have_no_pose() {
        assert!(estimate_hand_pose(&[[0.0; 3]; 20]).is_none());
    }
}
