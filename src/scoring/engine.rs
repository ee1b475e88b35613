use crate::models::{EngagementScore, FeatureSet, ScoreFactors};
use crate::scoring::config::ScoringConfig;

/// Pure features -> score function. No I/O, no state beyond its configuration.
#[derive(Debug, Clone, Default)]
pub struct ScoringEngine {
    config: ScoringConfig,
}

impl ScoringEngine {
    pub fn new(config: ScoringConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &ScoringConfig {
        &self.config
    }

    /// Compute the three-factor weighted score.
    ///
    /// When `previous_score` is given the result is an EMA against it. Never
    /// fails: missing or non-finite inputs count as zero evidence.
    pub fn score(
        &self,
        features: &FeatureSet,
        timestamp_ms: i64,
        previous_score: Option<f64>,
    ) -> EngagementScore {
        let eye_contact = eye_contact_score(features);
        let emotion = self.emotion_score(features);
        let attention = self.attention_score(features);

        let raw = clamp01(
            self.config.weight_eye_contact * eye_contact
                + self.config.weight_emotion * emotion
                + self.config.weight_attention * attention,
        );

        let score = match previous_score {
            Some(previous) => self.smooth(raw, previous),
            None => raw,
        };

        EngagementScore {
            score,
            factors: ScoreFactors {
                eye_contact,
                emotion,
                attention,
            },
            timestamp_ms,
        }
    }

    /// `alpha * current + (1 - alpha) * previous`, clamped.
    pub fn smooth(&self, current: f64, previous: f64) -> f64 {
        let alpha = clamp01(self.config.smoothing_alpha);
        clamp01(alpha * clamp01(current) + (1.0 - alpha) * clamp01(previous))
    }

    fn emotion_score(&self, features: &FeatureSet) -> f64 {
        let weights = &self.config.emotion_weights;
        let emotions = &features.emotion_distribution;

        let weighted = weights.happy * finite(emotions.happy)
            + weights.surprised * finite(emotions.surprised)
            + weights.neutral * finite(emotions.neutral)
            + weights.sad * finite(emotions.sad)
            + weights.angry * finite(emotions.angry);

        clamp01(weighted) * clamp01(features.emotion_confidence)
    }

    fn attention_score(&self, features: &FeatureSet) -> f64 {
        let yaw = finite(features.head_pose.yaw).abs();
        let forward_facing = yaw < self.config.forward_yaw_threshold_deg;

        if forward_facing && features.is_looking_at_screen {
            clamp01(features.gaze_confidence)
        } else {
            clamp01(self.config.partial_attention)
        }
    }
}

/// Zero unless looking at the screen; otherwise how centred the gaze is,
/// scaled by gaze confidence.
fn eye_contact_score(features: &FeatureSet) -> f64 {
    if !features.is_looking_at_screen {
        return 0.0;
    }

    let x = finite(features.gaze_vector.x);
    let y = finite(features.gaze_vector.y);
    let deviation = (x * x + y * y).sqrt();

    clamp01(1.0 - deviation) * clamp01(features.gaze_confidence)
}

fn finite(value: f64) -> f64 {
    if value.is_finite() {
        value
    } else {
        0.0
    }
}

fn clamp01(value: f64) -> f64 {
    finite(value).clamp(0.0, 1.0)
}
