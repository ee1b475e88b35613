use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{FeatureSet, FrameKey};

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScoreFactors {
    pub eye_contact: f64,
    pub emotion: f64,
    pub attention: f64,
}

/// Bounded `[0, 1]` engagement measurement for one frame.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EngagementScore {
    pub score: f64,
    pub factors: ScoreFactors,
    pub timestamp_ms: i64,
}

/// Document persisted once per processed frame under `.../analyses/{timestamp}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisRecord {
    pub meeting_id: String,
    pub participant_id: String,
    pub timestamp_ms: i64,
    pub score: EngagementScore,
    pub features: FeatureSet,
    pub storage_path: String,
    pub processed_at: DateTime<Utc>,
}

impl AnalysisRecord {
    pub fn key(&self) -> FrameKey {
        FrameKey {
            meeting_id: self.meeting_id.clone(),
            participant_id: self.participant_id.clone(),
            timestamp_ms: self.timestamp_ms,
        }
    }
}

/// Optional mirrored result object written next to the frames.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResultObject {
    pub analysis: FeatureSet,
    pub score: EngagementScore,
    pub timestamp: i64,
    pub processed_at: DateTime<Utc>,
}
