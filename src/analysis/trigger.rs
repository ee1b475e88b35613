//! Event-driven analysis of one uploaded frame.
//!
//! Every step tolerates being repeated: the analysis record and mirrored
//! result are upserts, aggregate stages are guarded by the processed marker,
//! and a record left by an interrupted attempt is resumed instead of rescored.

use std::{path::Path, sync::Arc, time::Duration};

use chrono::Utc;
use tokio::time::Instant;

use crate::aggregation::AggregationStore;
use crate::db::TransactionalStore;
use crate::error::PipelineError;
use crate::models::{AnalysisRecord, EngagementScore, Frame, FrameKey, ResultObject, StorageEvent};
use crate::scoring::ScoringEngine;
use crate::settings::{AnalysisSettings, PipelineSettings};
use crate::storage::paths::{
    analyses_collection, analysis_doc, is_under_prefix, parse_frame_key, result_object_key,
};
use crate::storage::ObjectStore;
use crate::{log_debug, log_error, log_info, log_warn};

use super::deployment::validate_model_deployment;
use super::extractor::{Extraction, FeatureExtractor};

const ENABLE_LOGS: bool = true;

/// Terminal, non-error results of handling one event.
#[derive(Debug, Clone, PartialEq)]
pub enum AnalysisOutcome {
    /// Object outside the input prefix.
    Ignored,
    NoFace,
    /// Frame already folded into both aggregates.
    Duplicate,
    /// Object gone before it could be downloaded.
    MissingObject,
    Processed(EngagementScore),
}

pub struct AnalysisTrigger<S: TransactionalStore> {
    objects: Arc<dyn ObjectStore>,
    extractor: Arc<dyn FeatureExtractor>,
    scoring: ScoringEngine,
    aggregation: AggregationStore<S>,
    store: S,
    settings: AnalysisSettings,
}

impl<S: TransactionalStore> AnalysisTrigger<S> {
    /// Validate the model deployment, then build the trigger. Refuses to
    /// construct anything that would accept events without its models.
    pub fn bootstrap(
        objects: Arc<dyn ObjectStore>,
        extractor: Arc<dyn FeatureExtractor>,
        store: S,
        settings: &PipelineSettings,
    ) -> Result<Self, PipelineError> {
        validate_model_deployment(
            Path::new(&settings.analysis.models_dir),
            &settings.analysis.required_models,
        )?;
        Self::new(objects, extractor, store, settings)
    }

    pub fn new(
        objects: Arc<dyn ObjectStore>,
        extractor: Arc<dyn FeatureExtractor>,
        store: S,
        settings: &PipelineSettings,
    ) -> Result<Self, PipelineError> {
        settings.validate()?;
        Ok(Self {
            objects,
            extractor,
            scoring: ScoringEngine::new(settings.scoring.clone()),
            aggregation: AggregationStore::new(store.clone(), settings.aggregation.bucket_width_ms)?,
            store,
            settings: settings.analysis.clone(),
        })
    }

    pub fn aggregation(&self) -> &AggregationStore<S> {
        &self.aggregation
    }

    /// Handle one finalize event within the configured wall-clock budget.
    ///
    /// `Ok` means the event is done with. `Err` is redelivery-worthy exactly
    /// when `PipelineError::is_retryable` says so.
    pub async fn handle(&self, event: &StorageEvent) -> Result<AnalysisOutcome, PipelineError> {
        let budget_ms = self.settings.timeout_ms;
        match tokio::time::timeout(Duration::from_millis(budget_ms), self.process(event)).await {
            Ok(result) => result,
            Err(_) => {
                log_error!("analysis of {} timed out after {budget_ms}ms", event.object_key);
                Err(PipelineError::Timeout { budget_ms })
            }
        }
    }

    async fn process(&self, event: &StorageEvent) -> Result<AnalysisOutcome, PipelineError> {
        if !is_under_prefix(&self.settings.input_prefix, &event.object_key) {
            log_debug!("ignoring {} outside {}", event.object_key, self.settings.input_prefix);
            return Ok(AnalysisOutcome::Ignored);
        }

        let key = parse_frame_key(&self.settings.input_prefix, &event.object_key).map_err(|err| {
            log_warn!("rejecting {}: {err}", event.object_key);
            err
        })?;

        if self.aggregation.is_processed(&key).await? {
            log_info!("{} already processed; dropping duplicate event", event.object_key);
            self.delete_source(&event.object_key).await;
            return Ok(AnalysisOutcome::Duplicate);
        }

        if let Some(record) = self.existing_record(&key).await? {
            log_info!("resuming interrupted analysis of {}", event.object_key);
            return self.finish(&event.object_key, record).await;
        }

        let started = Instant::now();
        let Some(image_bytes) = self
            .objects
            .get(&event.object_key)
            .await
            .map_err(|err| PipelineError::transient(format!("download {}", event.object_key), err))?
        else {
            log_warn!("{} no longer exists; skipping", event.object_key);
            return Ok(AnalysisOutcome::MissingObject);
        };
        let frame = Frame { key, image_bytes };

        let extraction = self
            .extractor
            .extract(&frame.image_bytes)
            .await
            .map_err(|err| PipelineError::transient("feature extraction", err))?;
        let features = match extraction {
            Extraction::Face(features) => features,
            Extraction::NoFace => {
                log_info!("no face in {}; skipping", event.object_key);
                if self.settings.delete_on_no_face {
                    self.delete_source(&event.object_key).await;
                }
                return Ok(AnalysisOutcome::NoFace);
            }
        };
        log_debug!(
            "extracted features for {} in {}ms",
            event.object_key,
            started.elapsed().as_millis()
        );

        let previous = if self.settings.smoothing_enabled {
            self.previous_score(&frame.key).await?
        } else {
            None
        };
        let score = self.scoring.score(&features, frame.key.timestamp_ms, previous);

        let record = AnalysisRecord {
            meeting_id: frame.key.meeting_id.clone(),
            participant_id: frame.key.participant_id.clone(),
            timestamp_ms: frame.key.timestamp_ms,
            score,
            features,
            storage_path: event.object_key.clone(),
            processed_at: Utc::now(),
        };
        self.persist_record(&record).await?;

        self.finish(&event.object_key, record).await
    }

    /// Mirror, aggregate, then delete the source. Shared by fresh and resumed runs.
    async fn finish(&self, object_key: &str, record: AnalysisRecord) -> Result<AnalysisOutcome, PipelineError> {
        if self.settings.mirror_results {
            self.mirror_result(&record).await?;
        }

        self.aggregation
            .update_participant_aggregate(
                &record.meeting_id,
                &record.participant_id,
                record.timestamp_ms,
                record.score.score,
            )
            .await?;
        self.aggregation
            .update_time_bucket_summary(
                &record.meeting_id,
                &record.participant_id,
                record.timestamp_ms,
                record.score.score,
                &record.features.emotion_distribution,
            )
            .await?;

        self.delete_source(object_key).await;
        log_info!(
            "processed {object_key}: score {:.3} (eye {:.2}, emotion {:.2}, attention {:.2})",
            record.score.score,
            record.score.factors.eye_contact,
            record.score.factors.emotion,
            record.score.factors.attention
        );
        Ok(AnalysisOutcome::Processed(record.score))
    }

    async fn existing_record(&self, key: &FrameKey) -> Result<Option<AnalysisRecord>, PipelineError> {
        let doc = analysis_doc(key);
        let Some(value) = self
            .store
            .get(&doc)
            .await
            .map_err(|err| PipelineError::from_store("analysis record lookup", err))?
        else {
            return Ok(None);
        };
        match serde_json::from_value(value) {
            Ok(record) => Ok(Some(record)),
            Err(err) => {
                log_warn!("unreadable analysis record {doc}, rescoring: {err}");
                Ok(None)
            }
        }
    }

    async fn persist_record(&self, record: &AnalysisRecord) -> Result<(), PipelineError> {
        let doc = analysis_doc(&record.key());
        let body = serde_json::to_value(record)
            .map_err(|err| PipelineError::transient("encode analysis record", err.into()))?;
        self.store
            .transaction("analysis_record", move |txn| txn.write(&doc, &body))
            .await
            .map_err(|err| PipelineError::from_store("persist analysis record", err))
    }

    /// Most recently persisted score for the participant, if any.
    async fn previous_score(&self, key: &FrameKey) -> Result<Option<f64>, PipelineError> {
        let latest = self
            .store
            .latest(&analyses_collection(&key.meeting_id, &key.participant_id))
            .await
            .map_err(|err| PipelineError::from_store("previous score lookup", err))?;
        Ok(latest
            .and_then(|value| serde_json::from_value::<AnalysisRecord>(value).ok())
            .map(|record| record.score.score))
    }

    async fn mirror_result(&self, record: &AnalysisRecord) -> Result<(), PipelineError> {
        let object_key = result_object_key(&self.settings.results_prefix, &record.key());
        let result = ResultObject {
            analysis: record.features.clone(),
            score: record.score,
            timestamp: record.timestamp_ms,
            processed_at: record.processed_at,
        };
        let bytes = serde_json::to_vec_pretty(&result)
            .map_err(|err| PipelineError::transient("encode result object", err.into()))?;
        self.objects
            .put(&object_key, &bytes)
            .await
            .map_err(|err| PipelineError::transient(format!("mirror {object_key}"), err))
    }

    async fn delete_source(&self, object_key: &str) {
        if let Err(err) = self.objects.delete(object_key).await {
            log_warn!("failed to delete {object_key}: {err:#}");
        }
    }
}
