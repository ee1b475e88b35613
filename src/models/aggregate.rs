//! Shared per-participant state. These are the only records mutated by more
//! than one analysis invocation, so every change goes through a transaction.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::EmotionDistribution;

/// Index of the fixed-width bucket containing `timestamp_ms`.
pub fn bucket_index(timestamp_ms: i64, bucket_width_ms: i64) -> i64 {
    timestamp_ms.div_euclid(bucket_width_ms)
}

pub fn bucket_start(timestamp_ms: i64, bucket_width_ms: i64) -> i64 {
    bucket_index(timestamp_ms, bucket_width_ms) * bucket_width_ms
}

/// Running lifetime statistics for one participant in one meeting.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ParticipantAggregate {
    pub meeting_id: String,
    pub participant_id: String,
    pub total_frames: u64,
    pub total_score: f64,
    pub average_score: f64,
    pub first_frame_ts: i64,
    pub last_frame_ts: i64,
    pub time_series_start: i64,
    pub time_series_end: i64,
    pub sampling_rate_ms: f64,
    pub last_update: DateTime<Utc>,
}

impl ParticipantAggregate {
    /// Zero-valued aggregate keyed by the first timestamp seen for the participant.
    pub fn empty(
        meeting_id: &str,
        participant_id: &str,
        first_seen_ts: i64,
        bucket_width_ms: i64,
        now: DateTime<Utc>,
    ) -> Self {
        let start = bucket_start(first_seen_ts, bucket_width_ms);
        Self {
            meeting_id: meeting_id.to_string(),
            participant_id: participant_id.to_string(),
            total_frames: 0,
            total_score: 0.0,
            average_score: 0.0,
            first_frame_ts: first_seen_ts,
            last_frame_ts: first_seen_ts,
            time_series_start: start,
            time_series_end: start + bucket_width_ms,
            sampling_rate_ms: 0.0,
            last_update: now,
        }
    }

    /// Fold one scored frame in. Counts, sums, min and max only, so the
    /// result does not depend on the order frames arrive in.
    pub fn record(&mut self, timestamp_ms: i64, score: f64, bucket_width_ms: i64, now: DateTime<Utc>) {
        if self.total_frames == 0 {
            self.first_frame_ts = timestamp_ms;
            self.last_frame_ts = timestamp_ms;
        } else {
            self.first_frame_ts = self.first_frame_ts.min(timestamp_ms);
            self.last_frame_ts = self.last_frame_ts.max(timestamp_ms);
        }

        self.total_frames += 1;
        self.total_score += score;
        self.average_score = self.total_score / self.total_frames as f64;

        self.time_series_start = bucket_start(self.first_frame_ts, bucket_width_ms);
        self.time_series_end = bucket_start(self.last_frame_ts, bucket_width_ms) + bucket_width_ms;
        self.sampling_rate_ms =
            (self.last_frame_ts - self.time_series_start) as f64 / self.total_frames as f64;
        self.last_update = now;
    }
}

/// Fixed-width rollup of scores and emotions for one participant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TimeBucketSummary {
    pub meeting_id: String,
    pub participant_id: String,
    pub bucket_index: i64,
    pub bucket_start: i64,
    pub bucket_end: i64,
    pub samples: u64,
    pub total_score: f64,
    /// May trail `total_score / samples` until the next recompute pass.
    pub average_score: f64,
    pub emotion_sums: EmotionDistribution,
}

impl TimeBucketSummary {
    pub fn empty(meeting_id: &str, participant_id: &str, index: i64, bucket_width_ms: i64) -> Self {
        Self {
            meeting_id: meeting_id.to_string(),
            participant_id: participant_id.to_string(),
            bucket_index: index,
            bucket_start: index * bucket_width_ms,
            bucket_end: (index + 1) * bucket_width_ms,
            samples: 0,
            total_score: 0.0,
            average_score: 0.0,
            emotion_sums: EmotionDistribution::default(),
        }
    }

    pub fn recompute_average(&mut self) {
        self.average_score = if self.samples == 0 {
            0.0
        } else {
            self.total_score / self.samples as f64
        };
    }
}

/// Durable record of which aggregate stages already absorbed a given frame.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ProcessedMarker {
    pub aggregate_applied: bool,
    pub bucket_applied: bool,
    pub first_seen_at: Option<DateTime<Utc>>,
}

impl ProcessedMarker {
    pub fn is_complete(&self) -> bool {
        self.aggregate_applied && self.bucket_applied
    }
}
