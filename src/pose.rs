//! Keypoint data produced by the external pose detector.
//!
//! Coordinates are in the detector's image space, y growing downward.

use serde::{Deserialize, Serialize};

/// COCO-17 body landmarks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum KeypointName {
    Nose,
    LeftEye,
    RightEye,
    LeftEar,
    RightEar,
    LeftShoulder,
    RightShoulder,
    LeftElbow,
    RightElbow,
    LeftWrist,
    RightWrist,
    LeftHip,
    RightHip,
    LeftKnee,
    RightKnee,
    LeftAnkle,
    RightAnkle,
}

impl KeypointName {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Nose => "nose",
            Self::LeftEye => "left_eye",
            Self::RightEye => "right_eye",
            Self::LeftEar => "left_ear",
            Self::RightEar => "right_ear",
            Self::LeftShoulder => "left_shoulder",
            Self::RightShoulder => "right_shoulder",
            Self::LeftElbow => "left_elbow",
            Self::RightElbow => "right_elbow",
            Self::LeftWrist => "left_wrist",
            Self::RightWrist => "right_wrist",
            Self::LeftHip => "left_hip",
            Self::RightHip => "right_hip",
            Self::LeftKnee => "left_knee",
            Self::RightKnee => "right_knee",
            Self::LeftAnkle => "left_ankle",
            Self::RightAnkle => "right_ankle",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Keypoint {
    pub name: KeypointName,
    pub x: f64,
    pub y: f64,
    /// Detection confidence (0.0-1.0)
    pub score: f64,
}

impl Keypoint {
    pub fn new(name: KeypointName, x: f64, y: f64, score: f64) -> Self {
        Self { name, x, y, score }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Pose {
    pub keypoints: Vec<Keypoint>,
    /// Overall detection confidence (0.0-1.0)
    pub score: f64,
}

impl Pose {
    pub fn new(score: f64) -> Self {
        Self {
            keypoints: Vec::new(),
            score,
        }
    }

    /// Adds or replaces the keypoint with the same name, keeping names unique.
    pub fn with_keypoint(mut self, keypoint: Keypoint) -> Self {
        self.set_keypoint(keypoint);
        self
    }

    pub fn set_keypoint(&mut self, keypoint: Keypoint) {
        match self.keypoints.iter_mut().find(|kp| kp.name == keypoint.name) {
            Some(existing) => *existing = keypoint,
            None => self.keypoints.push(keypoint),
        }
    }

    pub fn keypoint(&self, name: KeypointName) -> Option<&Keypoint> {
        self.keypoints.iter().find(|kp| kp.name == name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keypoint_lookup_by_name() {
        let pose = Pose::new(0.9)
            .with_keypoint(Keypoint::new(KeypointName::Nose, 10.0, 20.0, 0.8))
            .with_keypoint(Keypoint::new(KeypointName::LeftEye, 5.0, 15.0, 0.7));

        assert_eq!(pose.keypoint(KeypointName::Nose).map(|kp| kp.y), Some(20.0));
        assert!(pose.keypoint(KeypointName::RightEye).is_none());
    }

    #[test]
    fn set_keypoint_replaces_duplicate_name() {
        let mut pose = Pose::new(0.9);
        pose.set_keypoint(Keypoint::new(KeypointName::Nose, 1.0, 1.0, 0.5));
        pose.set_keypoint(Keypoint::new(KeypointName::Nose, 2.0, 2.0, 0.6));

        assert_eq!(pose.keypoints.len(), 1);
        assert_eq!(pose.keypoint(KeypointName::Nose).map(|kp| kp.x), Some(2.0));
    }

    #[test]
    fn deserializes_detector_json() {
        let json = r#"{"score":0.8,"keypoints":[
            {"name":"left_shoulder","x":1.0,"y":2.0,"score":0.9}
        ]}"#;
        let pose: Pose = serde_json::from_str(json).expect("valid pose json");
        assert_eq!(
            pose.keypoint(KeypointName::LeftShoulder).map(|kp| kp.name.as_str()),
            Some("left_shoulder")
        );
    }
}
