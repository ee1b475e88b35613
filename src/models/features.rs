//! Features the external extractor derives from one frame.
//!
//! Every field defaults (`0` / `false`) so partially populated extractor output
//! deserializes instead of failing; scoring treats the defaults as "no evidence".

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Point2 {
    pub x: f64,
    pub y: f64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Landmarks {
    pub left_eye: Point2,
    pub right_eye: Point2,
    pub nose: Point2,
    pub left_mouth: Point2,
    pub right_mouth: Point2,
}

/// Head orientation in degrees.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HeadPose {
    pub roll: f64,
    pub pitch: f64,
    pub yaw: f64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GazeVector {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

/// Per-channel emotion confidences. Also used for per-bucket emotion sums.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EmotionDistribution {
    pub happy: f64,
    pub sad: f64,
    pub angry: f64,
    pub surprised: f64,
    pub neutral: f64,
}

impl EmotionDistribution {
    pub const CHANNELS: [&'static str; 5] = ["happy", "sad", "angry", "surprised", "neutral"];

    pub fn channels(&self) -> [(&'static str, f64); 5] {
        [
            ("happy", self.happy),
            ("sad", self.sad),
            ("angry", self.angry),
            ("surprised", self.surprised),
            ("neutral", self.neutral),
        ]
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct FeatureSet {
    pub landmarks: Landmarks,
    pub head_pose: HeadPose,
    pub eyes_open: bool,
    pub emotion_distribution: EmotionDistribution,
    pub emotion_confidence: f64,
    pub gaze_vector: GazeVector,
    pub is_looking_at_screen: bool,
    pub gaze_confidence: f64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_payload_defaults_missing_fields() {
        let features: FeatureSet = serde_json::from_str(
            r#"{"isLookingAtScreen": true, "gazeConfidence": 0.8, "headPose": {"yaw": 12.0}}"#,
        )
        .unwrap();

        assert!(features.is_looking_at_screen);
        assert_eq!(features.gaze_confidence, 0.8);
        assert_eq!(features.head_pose.yaw, 12.0);
        assert_eq!(features.head_pose.pitch, 0.0);
        assert!(!features.eyes_open);
        assert_eq!(features.emotion_distribution, EmotionDistribution::default());
    }

    #[test]
    fn test_channels_follow_declared_order() {
        let emotions = EmotionDistribution {
            happy: 0.1,
            sad: 0.2,
            angry: 0.3,
            surprised: 0.4,
            neutral: 0.5,
        };
        let names: Vec<_> = emotions.channels().iter().map(|(n, _)| *n).collect();
        assert_eq!(names, EmotionDistribution::CHANNELS.to_vec());
    }
}
