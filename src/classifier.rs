//! Per-frame behavior classification.
//!
//! Rules are evaluated in strict priority order and the first match wins:
//! no pose, low pose confidence, eyes closed, looking down, looking away, safe.

use serde::{Deserialize, Serialize};

use crate::pose::{Keypoint, KeypointName, Pose};
use crate::types::Direction;

/// Raw condition for a single frame, before any duration tracking.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Condition {
    NoDriver,
    LowConfidence,
    EyesClosed,
    LookingDown,
    LookingAway(Direction),
    Safe,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Observation {
    pub condition: Condition,
    pub confidence: f64,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct ClassifierThresholds {
    pub min_pose_score: f64,
    pub min_eye_score: f64,
    /// Pixels the nose must sit below the shoulder midline.
    pub looking_down_offset: f64,
    pub visible_ear_score: f64,
    pub hidden_ear_score: f64,
    /// Fraction of the inter-eye distance the ear must extend past the eye.
    pub ear_offset_ratio: f64,
}

impl Default for ClassifierThresholds {
    fn default() -> Self {
        Self {
            min_pose_score: 0.25,
            min_eye_score: 0.35,
            looking_down_offset: 50.0,
            visible_ear_score: 0.4,
            hidden_ear_score: 0.3,
            ear_offset_ratio: 0.3,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct BehaviorClassifier {
    thresholds: ClassifierThresholds,
}

impl BehaviorClassifier {
    pub fn new(thresholds: ClassifierThresholds) -> Self {
        Self { thresholds }
    }

    pub fn thresholds(&self) -> &ClassifierThresholds {
        &self.thresholds
    }

    /// Classifies the driver from the first detected pose of a frame.
    pub fn classify(&self, poses: &[Pose]) -> Observation {
        self.classify_pose(poses.first())
    }

    pub fn classify_pose(&self, pose: Option<&Pose>) -> Observation {
        let Some(pose) = pose else {
            return Observation {
                condition: Condition::NoDriver,
                confidence: 0.0,
            };
        };

        let condition = if pose.score < self.thresholds.min_pose_score {
            Condition::LowConfidence
        } else if self.eyes_closed(pose) {
            Condition::EyesClosed
        } else if self.looking_down(pose) {
            Condition::LookingDown
        } else if let Some(direction) = self.looking_away(pose) {
            Condition::LookingAway(direction)
        } else {
            Condition::Safe
        };

        Observation {
            condition,
            confidence: pose.score,
        }
    }

    /// A missing eye counts as closed.
    fn eyes_closed(&self, pose: &Pose) -> bool {
        let min = self.thresholds.min_eye_score;
        match (
            pose.keypoint(KeypointName::LeftEye),
            pose.keypoint(KeypointName::RightEye),
        ) {
            (Some(left), Some(right)) => left.score < min || right.score < min,
            _ => true,
        }
    }

    fn looking_down(&self, pose: &Pose) -> bool {
        let (Some(nose), Some(left), Some(right)) = (
            pose.keypoint(KeypointName::Nose),
            pose.keypoint(KeypointName::LeftShoulder),
            pose.keypoint(KeypointName::RightShoulder),
        ) else {
            return false;
        };

        let shoulder_y = (left.y + right.y) / 2.0;
        nose.y > shoulder_y + self.thresholds.looking_down_offset
    }

    fn looking_away(&self, pose: &Pose) -> Option<Direction> {
        let left_eye = pose.keypoint(KeypointName::LeftEye)?;
        let right_eye = pose.keypoint(KeypointName::RightEye)?;
        let left_ear = pose.keypoint(KeypointName::LeftEar)?;
        let right_ear = pose.keypoint(KeypointName::RightEar)?;

        let margin = (left_eye.x - right_eye.x).abs() * self.thresholds.ear_offset_ratio;

        if self.only_visible(left_ear, right_ear) && left_ear.x < left_eye.x - margin {
            return Some(Direction::Left);
        }
        if self.only_visible(right_ear, left_ear) && right_ear.x > right_eye.x + margin {
            return Some(Direction::Right);
        }
        None
    }

    fn only_visible(&self, shown: &Keypoint, hidden: &Keypoint) -> bool {
        shown.score > self.thresholds.visible_ear_score
            && hidden.score < self.thresholds.hidden_ear_score
    }
}
