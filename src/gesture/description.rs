use crate::types::GestureName;

use super::finger_pose::{Finger, FingerCurl, FingerDirection, HandPose};

/// Template for one gesture: the accepted curls and directions per finger.
///
/// Each accepted value carries a contribution in `[0, 1]`; a finger's weight
/// scales both of its parameters. Fingers without any curl or direction
/// entry do not take part in the score.
#[derive(Clone, Debug)]
pub struct GestureDescription {
    pub name: GestureName,
    curls: [Vec<(FingerCurl, f32)>; 5],
    directions: [Vec<(FingerDirection, f32)>; 5],
    weights: [f32; 5],
}

impl GestureDescription {
    pub fn new(name: GestureName) -> Self {
        Self {
            name,
            curls: Default::default(),
            directions: Default::default(),
            weights: [1.0; 5],
        }
    }

    pub fn curl(mut self, finger: Finger, curl: FingerCurl, contribution: f32) -> Self {
        self.curls[finger.index()].push((curl, contribution));
        self
    }

    pub fn direction(
        mut self,
        finger: Finger,
        direction: FingerDirection,
        contribution: f32,
    ) -> Self {
        self.directions[finger.index()].push((direction, contribution));
        self
    }

    pub fn weight(mut self, finger: Finger, weight: f32) -> Self {
        self.weights[finger.index()] = weight;
        self
    }

    /// Score in `[0, 10]`.
    pub fn match_score(&self, pose: &HandPose) -> f32 {
        let mut score = 0.0;
        let mut total_weight = 0.0;

        for finger in Finger::ALL {
            let idx = finger.index();
            let weight = self.weights[idx];
            let detected = pose[idx];

            if !self.curls[idx].is_empty() {
                total_weight += weight;
                score += weight * contribution(&self.curls[idx], detected.curl);
            }
            if !self.directions[idx].is_empty() {
                total_weight += weight;
                score += weight * contribution(&self.directions[idx], detected.direction);
            }
        }

        if total_weight <= 0.0 {
            return 0.0;
        }
        score / total_weight * 10.0
    }
}

fn contribution<T: PartialEq + Copy>(expected: &[(T, f32)], detected: T) -> f32 {
    expected
        .iter()
        .find(|(value, _)| *value == detected)
        .map(|(_, contribution)| *contribution)
        .unwrap_or(0.0)
}

const FINGERS: [Finger; 4] = [Finger::Index, Finger::Middle, Finger::Ring, Finger::Pinky];

pub fn default_gestures() -> Vec<GestureDescription> {
    GestureName::ALL.iter().map(|&name| describe(name)).collect()
}

fn describe(name: GestureName) -> GestureDescription {
    use FingerCurl::*;
    use FingerDirection::*;

    match name {
        GestureName::ThumbsUp => thumb_pointing(name, &[
            (VerticalUp, 1.0),
            (DiagonalUpLeft, 0.9),
            (DiagonalUpRight, 0.9),
        ]),
        GestureName::ThumbsDown => thumb_pointing(name, &[
            (VerticalDown, 1.0),
            (DiagonalDownLeft, 0.9),
            (DiagonalDownRight, 0.9),
        ]),
        GestureName::ThumbRight => thumb_pointing(name, &[
            (HorizontalRight, 1.0),
            (DiagonalUpRight, 0.5),
            (DiagonalDownRight, 0.5),
        ]),
        GestureName::ThumbLeft => thumb_pointing(name, &[
            (HorizontalLeft, 1.0),
            (DiagonalUpLeft, 0.5),
            (DiagonalDownLeft, 0.5),
        ]),
        GestureName::Victory => GestureDescription::new(name)
            .curl(Finger::Thumb, HalfCurl, 1.0)
            .curl(Finger::Thumb, FullCurl, 0.9)
            .curl(Finger::Thumb, NoCurl, 0.5)
            .curl(Finger::Index, NoCurl, 1.0)
            .direction(Finger::Index, VerticalUp, 1.0)
            .direction(Finger::Index, DiagonalUpLeft, 1.0)
            .direction(Finger::Index, DiagonalUpRight, 1.0)
            .curl(Finger::Middle, NoCurl, 1.0)
            .direction(Finger::Middle, VerticalUp, 1.0)
            .direction(Finger::Middle, DiagonalUpLeft, 1.0)
            .direction(Finger::Middle, DiagonalUpRight, 1.0)
            .curl(Finger::Ring, FullCurl, 1.0)
            .curl(Finger::Ring, HalfCurl, 0.5)
            .curl(Finger::Pinky, FullCurl, 1.0)
            .curl(Finger::Pinky, HalfCurl, 0.5)
            .weight(Finger::Index, 2.0)
            .weight(Finger::Middle, 2.0)
            .weight(Finger::Ring, 2.0)
            .weight(Finger::Pinky, 2.0),
        GestureName::OpenHand => {
            let mut description = GestureDescription::new(name)
                .curl(Finger::Thumb, NoCurl, 1.0)
                .curl(Finger::Thumb, HalfCurl, 0.5)
                .direction(Finger::Thumb, DiagonalUpLeft, 1.0)
                .direction(Finger::Thumb, DiagonalUpRight, 1.0)
                .direction(Finger::Thumb, VerticalUp, 0.75)
                .direction(Finger::Thumb, HorizontalLeft, 0.5)
                .direction(Finger::Thumb, HorizontalRight, 0.5);
            for finger in FINGERS {
                description = description
                    .curl(finger, NoCurl, 1.0)
                    .direction(finger, VerticalUp, 1.0)
                    .direction(finger, DiagonalUpLeft, 0.75)
                    .direction(finger, DiagonalUpRight, 0.75);
            }
            description
        }
        GestureName::ClosedFist => {
            let mut description = GestureDescription::new(name)
                .curl(Finger::Thumb, HalfCurl, 1.0)
                .curl(Finger::Thumb, FullCurl, 1.0)
                .weight(Finger::Thumb, 2.0);
            for finger in FINGERS {
                description = description
                    .curl(finger, FullCurl, 1.0)
                    .curl(finger, HalfCurl, 0.25);
            }
            description
        }
    }
}

/// Straight thumb with the remaining fingers folded; only the thumb direction differs.
fn thumb_pointing(
    name: GestureName,
    thumb_directions: &[(FingerDirection, f32)],
) -> GestureDescription {
    let mut description = GestureDescription::new(name)
        .curl(Finger::Thumb, FingerCurl::NoCurl, 1.0)
        .weight(Finger::Thumb, 3.0);
    for &(direction, contribution) in thumb_directions {
        description = description.direction(Finger::Thumb, direction, contribution);
    }
    for finger in FINGERS {
        description = description.curl(finger, FingerCurl::FullCurl, 1.0);
    }
    description
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gesture::finger_pose::FingerPose;

    fn pose(curl: FingerCurl, direction: FingerDirection) -> HandPose {
        [FingerPose { curl, direction }; 5]
    }

    #[test]
    fn unconstrained_description_scores_zero() {
        let description = GestureDescription::new(GestureName::Victory);
        let hand = pose(FingerCurl::NoCurl, FingerDirection::VerticalUp);
        assert_eq!(description.match_score(&hand), 0.0);
    }

    #[test]
    fn weights_scale_parameters() {
        let description = GestureDescription::new(GestureName::OpenHand)
            .curl(Finger::Thumb, FingerCurl::NoCurl, 1.0)
            .curl(Finger::Index, FingerCurl::FullCurl, 1.0)
            .weight(Finger::Thumb, 3.0);
        let hand = pose(FingerCurl::NoCurl, FingerDirection::VerticalUp);
        // Thumb matches with weight 3, index misses with weight 1.
        assert!((description.match_score(&hand) - 7.5).abs() < 1e-4);
    }

    #[test]
    fn default_gestures_follow_name_order() {
        let names: Vec<GestureName> = default_gestures().iter().map(|d| d.name).collect();
        assert_eq!(names, GestureName::ALL.to_vec());
    }
}
