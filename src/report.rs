//! Read-side views over a meeting's persisted documents, for export and for
//! live dashboards polling a recent window.

use anyhow::{Context, Result};
use serde::{de::DeserializeOwned, Deserialize, Serialize};

use crate::db::TransactionalStore;
use crate::models::{AnalysisRecord, ParticipantAggregate, TimeBucketSummary};
use crate::storage::paths::{analyses_collection, participants_collection, summaries_collection};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ParticipantReport {
    pub aggregate: ParticipantAggregate,
    /// Ordered by timestamp.
    pub analyses: Vec<AnalysisRecord>,
    /// Ordered by bucket index.
    pub summaries: Vec<TimeBucketSummary>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MeetingReport {
    pub meeting_id: String,
    pub participants: Vec<ParticipantReport>,
}

async fn list_typed<S, T>(store: &S, collection: &str) -> Result<Vec<T>>
where
    S: TransactionalStore,
    T: DeserializeOwned,
{
    store
        .list(collection)
        .await?
        .into_iter()
        .map(|(id, body)| {
            serde_json::from_value(body).with_context(|| format!("malformed document {collection}/{id}"))
        })
        .collect()
}

/// Everything recorded for one meeting, participant by participant.
pub async fn export_meeting<S: TransactionalStore>(store: &S, meeting_id: &str) -> Result<MeetingReport> {
    let aggregates: Vec<ParticipantAggregate> =
        list_typed(store, &participants_collection(meeting_id)).await?;

    let mut participants = Vec::with_capacity(aggregates.len());
    for aggregate in aggregates {
        let mut analyses: Vec<AnalysisRecord> =
            list_typed(store, &analyses_collection(meeting_id, &aggregate.participant_id)).await?;
        analyses.sort_by_key(|record| record.timestamp_ms);

        let mut summaries: Vec<TimeBucketSummary> =
            list_typed(store, &summaries_collection(meeting_id, &aggregate.participant_id)).await?;
        summaries.sort_by_key(|summary| summary.bucket_index);

        participants.push(ParticipantReport {
            aggregate,
            analyses,
            summaries,
        });
    }

    Ok(MeetingReport {
        meeting_id: meeting_id.to_string(),
        participants,
    })
}

/// Analyses at or after `since_ms` across all participants, newest first.
pub async fn recent_analyses<S: TransactionalStore>(
    store: &S,
    meeting_id: &str,
    since_ms: i64,
) -> Result<Vec<AnalysisRecord>> {
    let aggregates: Vec<ParticipantAggregate> =
        list_typed(store, &participants_collection(meeting_id)).await?;

    let mut recent = Vec::new();
    for aggregate in &aggregates {
        let analyses: Vec<AnalysisRecord> =
            list_typed(store, &analyses_collection(meeting_id, &aggregate.participant_id)).await?;
        recent.extend(analyses.into_iter().filter(|record| record.timestamp_ms >= since_ms));
    }
    recent.sort_by(|a, b| b.timestamp_ms.cmp(&a.timestamp_ms));
    Ok(recent)
}
