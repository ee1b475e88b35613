//! Read-side exports over a populated document store.

use chrono::Utc;
use engagement_lib::models::{AnalysisRecord, EngagementScore, FeatureSet, ScoreFactors};
use engagement_lib::report::{export_meeting, recent_analyses};
use engagement_lib::storage::paths::analysis_doc;
use engagement_lib::{AggregationStore, Database, TransactionalStore};
use tempfile::TempDir;

async fn record(db: &Database, aggregation: &AggregationStore<Database>, participant: &str, ts: i64, score: f64) {
    let record = AnalysisRecord {
        meeting_id: "standup".into(),
        participant_id: participant.into(),
        timestamp_ms: ts,
        score: EngagementScore {
            score,
            factors: ScoreFactors::default(),
            timestamp_ms: ts,
        },
        features: FeatureSet::default(),
        storage_path: format!("frames/standup/{participant}/{ts}.jpg"),
        processed_at: Utc::now(),
    };
    let doc = analysis_doc(&record.key());
    let body = serde_json::to_value(&record).unwrap();
    db.transaction("seed", move |txn| txn.write(&doc, &body))
        .await
        .unwrap();
    aggregation
        .update_participant_aggregate("standup", participant, ts, score)
        .await
        .unwrap();
    aggregation
        .update_time_bucket_summary("standup", participant, ts, score, &Default::default())
        .await
        .unwrap();
}

#[tokio::test]
async fn test_export_orders_analyses_and_buckets_numerically() {
    let dir = TempDir::new().unwrap();
    let db = Database::new(dir.path().join("report.sqlite3")).unwrap();
    let aggregation = AggregationStore::new(db.clone(), 60_000).unwrap();

    // 9_000 sorts after 130_000 as a string; the export must not.
    for (ts, score) in [(130_000, 0.3), (9_000, 0.9), (65_000, 0.6)] {
        record(&db, &aggregation, "ana", ts, score).await;
    }
    record(&db, &aggregation, "bo", 1_000, 0.5).await;

    let report = export_meeting(&db, "standup").await.unwrap();
    assert_eq!(report.meeting_id, "standup");
    assert_eq!(report.participants.len(), 2);

    let ana = report
        .participants
        .iter()
        .find(|p| p.aggregate.participant_id == "ana")
        .unwrap();
    let timestamps: Vec<i64> = ana.analyses.iter().map(|a| a.timestamp_ms).collect();
    assert_eq!(timestamps, vec![9_000, 65_000, 130_000]);
    let buckets: Vec<i64> = ana.summaries.iter().map(|s| s.bucket_index).collect();
    assert_eq!(buckets, vec![0, 1, 2]);
    assert_eq!(ana.aggregate.total_frames, 3);

    assert!(export_meeting(&db, "other").await.unwrap().participants.is_empty());
}

#[tokio::test]
async fn test_recent_analyses_newest_first_within_window() {
    let dir = TempDir::new().unwrap();
    let db = Database::new(dir.path().join("recent.sqlite3")).unwrap();
    let aggregation = AggregationStore::new(db.clone(), 60_000).unwrap();

    record(&db, &aggregation, "ana", 1_000, 0.2).await;
    record(&db, &aggregation, "ana", 400_000, 0.4).await;
    record(&db, &aggregation, "bo", 350_000, 0.6).await;

    let recent = recent_analyses(&db, "standup", 300_000).await.unwrap();
    let seen: Vec<(String, i64)> = recent
        .iter()
        .map(|r| (r.participant_id.clone(), r.timestamp_ms))
        .collect();
    assert_eq!(
        seen,
        vec![("ana".to_string(), 400_000), ("bo".to_string(), 350_000)]
    );
}
