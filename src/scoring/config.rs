use serde::{Deserialize, Serialize};

/// Linear weights applied to each emotion channel before clamping.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EmotionWeights {
    pub happy: f64,
    pub surprised: f64,
    pub neutral: f64,
    pub sad: f64,
    pub angry: f64,
}

impl Default for EmotionWeights {
    fn default() -> Self {
        Self {
            happy: 1.0,
            surprised: 0.6,
            neutral: 0.0,
            sad: -0.3,
            angry: -0.5,
        }
    }
}

/// Configuration for the engagement score with tunable weights and thresholds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ScoringConfig {
    /// Factor weights; must sum to 1
    pub weight_eye_contact: f64,
    pub weight_emotion: f64,
    pub weight_attention: f64,

    pub emotion_weights: EmotionWeights,

    /// Head yaw (degrees) below which the participant counts as forward-facing
    pub forward_yaw_threshold_deg: f64,

    /// Attention reported when not forward-facing or not looking at the screen
    pub partial_attention: f64,

    /// EMA factor; higher follows the newest frame more closely
    pub smoothing_alpha: f64,
}

impl Default for ScoringConfig {
    fn default() -> Self {
        Self {
            weight_eye_contact: 0.35,
            weight_emotion: 0.30,
            weight_attention: 0.35,
            emotion_weights: EmotionWeights::default(),
            forward_yaw_threshold_deg: 30.0,
            partial_attention: 0.5,
            smoothing_alpha: 0.3,
        }
    }
}

impl ScoringConfig {
    pub fn validate(&self) -> Result<(), String> {
        let weights = [
            self.weight_eye_contact,
            self.weight_emotion,
            self.weight_attention,
        ];
        if weights.iter().any(|w| !w.is_finite() || *w < 0.0) {
            return Err("scoring weights must be finite and non-negative".into());
        }
        let sum: f64 = weights.iter().sum();
        if (sum - 1.0).abs() > 1e-6 {
            return Err(format!("scoring weights must sum to 1, got {sum}"));
        }
        if !(self.smoothing_alpha > 0.0 && self.smoothing_alpha <= 1.0) {
            return Err(format!(
                "smoothing alpha must be in (0, 1], got {}",
                self.smoothing_alpha
            ));
        }
        if !(0.0..=1.0).contains(&self.partial_attention) {
            return Err("partial attention must be in [0, 1]".into());
        }
        Ok(())
    }
}
