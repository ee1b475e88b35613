//! Transactional folding of per-frame scores into the two shared documents
//! kept per participant.
//!
//! Every stage checks and sets its flag on the frame's processed marker inside
//! the same transaction as its mutation, so a redelivered or retried frame is
//! counted at most once per stage.

use chrono::Utc;
use serde_json::Value;

use crate::db::{DocumentTxn, TransactionalStore};
use crate::error::PipelineError;
use crate::models::{
    bucket_index, EmotionDistribution, FrameKey, ParticipantAggregate, ProcessedMarker,
    TimeBucketSummary,
};
use crate::storage::paths::{participant_doc, processed_marker_doc, summary_doc};
use crate::storage::DocRef;
use crate::{log_debug, log_info};

const ENABLE_LOGS: bool = true;

/// Result of one aggregate stage for one frame.
#[derive(Debug, Clone, PartialEq)]
pub enum UpdateOutcome<T> {
    Applied(T),
    /// The frame was already folded into this document.
    AlreadyApplied,
}

impl<T> UpdateOutcome<T> {
    pub fn is_applied(&self) -> bool {
        matches!(self, UpdateOutcome::Applied(_))
    }
}

#[derive(Clone)]
pub struct AggregationStore<S: TransactionalStore> {
    store: S,
    bucket_width_ms: i64,
}

impl<S: TransactionalStore> AggregationStore<S> {
    pub fn new(store: S, bucket_width_ms: i64) -> Result<Self, PipelineError> {
        if bucket_width_ms <= 0 {
            return Err(PipelineError::Configuration(format!(
                "bucket width must be positive, got {bucket_width_ms}"
            )));
        }
        Ok(Self {
            store,
            bucket_width_ms,
        })
    }

    pub fn bucket_width_ms(&self) -> i64 {
        self.bucket_width_ms
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Fold one score into the participant's running totals.
    pub async fn update_participant_aggregate(
        &self,
        meeting_id: &str,
        participant_id: &str,
        timestamp_ms: i64,
        score: f64,
    ) -> Result<UpdateOutcome<ParticipantAggregate>, PipelineError> {
        ensure_finite(score)?;

        let aggregate_doc = participant_doc(meeting_id, participant_id);
        let marker_doc = processed_marker_doc(meeting_id, participant_id, timestamp_ms);
        let meeting = meeting_id.to_string();
        let participant = participant_id.to_string();
        let width = self.bucket_width_ms;
        let now = Utc::now();

        let outcome = self
            .store
            .transaction("participant_aggregate", move |txn| {
                let mut marker = read_marker(txn, &marker_doc)?;
                if marker.aggregate_applied {
                    return Ok(UpdateOutcome::AlreadyApplied);
                }

                let mut aggregate = txn
                    .read_as::<ParticipantAggregate>(&aggregate_doc)?
                    .unwrap_or_else(|| {
                        ParticipantAggregate::empty(&meeting, &participant, timestamp_ms, width, now)
                    });
                aggregate.record(timestamp_ms, score, width, now);
                txn.write_as(&aggregate_doc, &aggregate)?;

                marker.aggregate_applied = true;
                marker.first_seen_at.get_or_insert(now);
                txn.write_as(&marker_doc, &marker)?;

                Ok(UpdateOutcome::Applied(aggregate))
            })
            .await
            .map_err(|err| PipelineError::from_store("participant aggregate update", err))?;

        match &outcome {
            UpdateOutcome::Applied(aggregate) => log_debug!(
                "aggregate {meeting_id}/{participant_id}: {} frames, avg {:.3}",
                aggregate.total_frames,
                aggregate.average_score
            ),
            UpdateOutcome::AlreadyApplied => log_info!(
                "frame {meeting_id}/{participant_id}/{timestamp_ms} already in aggregate; skipping"
            ),
        }
        Ok(outcome)
    }

    /// Merge one score and its emotions into the frame's time bucket.
    ///
    /// Two passes: atomic increments of the counters, then a separate pass
    /// recomputing `averageScore` from whatever totals are current by then.
    pub async fn update_time_bucket_summary(
        &self,
        meeting_id: &str,
        participant_id: &str,
        timestamp_ms: i64,
        score: f64,
        emotions: &EmotionDistribution,
    ) -> Result<UpdateOutcome<TimeBucketSummary>, PipelineError> {
        ensure_finite(score)?;

        let index = bucket_index(timestamp_ms, self.bucket_width_ms);
        let bucket_doc = summary_doc(meeting_id, participant_id, index);
        let marker_doc = processed_marker_doc(meeting_id, participant_id, timestamp_ms);
        let seed = serde_json::to_value(TimeBucketSummary::empty(
            meeting_id,
            participant_id,
            index,
            self.bucket_width_ms,
        ))
        .map_err(|err| PipelineError::transient("bucket seed", err.into()))?;

        let mut deltas: Vec<(String, f64)> = vec![("samples".into(), 1.0), ("totalScore".into(), score)];
        for (channel, value) in emotions.channels() {
            let value = if value.is_finite() { value } else { 0.0 };
            deltas.push((format!("emotionSums.{channel}"), value));
        }
        let now = Utc::now();

        let increment_doc = bucket_doc.clone();
        let applied = self
            .store
            .transaction("bucket_increment", move |txn| {
                let mut marker = read_marker(txn, &marker_doc)?;
                if marker.bucket_applied {
                    return Ok(false);
                }

                let fields: Vec<(&str, f64)> =
                    deltas.iter().map(|(field, delta)| (field.as_str(), *delta)).collect();
                txn.atomic_increment(&increment_doc, &seed, &fields)?;

                marker.bucket_applied = true;
                marker.first_seen_at.get_or_insert(now);
                txn.write_as(&marker_doc, &marker)?;
                Ok(true)
            })
            .await
            .map_err(|err| PipelineError::from_store("time bucket increment", err))?;

        if !applied {
            log_info!(
                "frame {meeting_id}/{participant_id}/{timestamp_ms} already in bucket {index}; skipping"
            );
            return Ok(UpdateOutcome::AlreadyApplied);
        }

        let summary = self.recompute_bucket_average(bucket_doc).await?;
        log_debug!(
            "bucket {index} for {meeting_id}/{participant_id}: {} samples, avg {:.3}",
            summary.samples,
            summary.average_score
        );
        Ok(UpdateOutcome::Applied(summary))
    }

    async fn recompute_bucket_average(&self, bucket_doc: DocRef) -> Result<TimeBucketSummary, PipelineError> {
        self.store
            .transaction("bucket_average", move |txn| {
                let mut summary = txn
                    .read_as::<TimeBucketSummary>(&bucket_doc)?
                    .ok_or_else(|| anyhow::anyhow!("bucket {bucket_doc} vanished before recompute"))?;
                summary.recompute_average();
                txn.write_as(&bucket_doc, &summary)?;
                Ok(summary)
            })
            .await
            .map_err(|err| PipelineError::from_store("time bucket average", err))
    }

    /// Whether both aggregate stages already absorbed this frame.
    pub async fn is_processed(&self, key: &FrameKey) -> Result<bool, PipelineError> {
        let doc = processed_marker_doc(&key.meeting_id, &key.participant_id, key.timestamp_ms);
        let marker = self
            .store
            .get(&doc)
            .await
            .map_err(|err| PipelineError::from_store("processed marker lookup", err))?
            .map(serde_json::from_value::<ProcessedMarker>)
            .transpose()
            .map_err(|err| PipelineError::transient("processed marker decode", err.into()))?;
        Ok(marker.is_some_and(|marker| marker.is_complete()))
    }

    pub async fn participant_aggregate(
        &self,
        meeting_id: &str,
        participant_id: &str,
    ) -> Result<Option<ParticipantAggregate>, PipelineError> {
        self.get_typed(&participant_doc(meeting_id, participant_id)).await
    }

    pub async fn bucket_summary(
        &self,
        meeting_id: &str,
        participant_id: &str,
        index: i64,
    ) -> Result<Option<TimeBucketSummary>, PipelineError> {
        self.get_typed(&summary_doc(meeting_id, participant_id, index)).await
    }

    async fn get_typed<T: serde::de::DeserializeOwned>(&self, doc: &DocRef) -> Result<Option<T>, PipelineError> {
        let value: Option<Value> = self
            .store
            .get(doc)
            .await
            .map_err(|err| PipelineError::from_store(format!("read {doc}"), err))?;
        value
            .map(serde_json::from_value)
            .transpose()
            .map_err(|err| PipelineError::transient(format!("decode {doc}"), err.into()))
    }
}

fn read_marker(txn: &dyn DocumentTxn, doc: &DocRef) -> anyhow::Result<ProcessedMarker> {
    Ok(txn.read_as::<ProcessedMarker>(doc)?.unwrap_or_default())
}

fn ensure_finite(score: f64) -> Result<(), PipelineError> {
    if score.is_finite() {
        Ok(())
    } else {
        Err(PipelineError::Validation(format!("score {score} is not finite")))
    }
}
