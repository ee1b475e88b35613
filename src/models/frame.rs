use serde::{Deserialize, Serialize};

/// Identifying keys of one captured still image.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FrameKey {
    pub meeting_id: String,
    pub participant_id: String,
    pub timestamp_ms: i64,
}

/// A captured still image plus its keys. Pipeline-local, never shared across invocations.
#[derive(Debug, Clone)]
pub struct Frame {
    pub key: FrameKey,
    pub image_bytes: Vec<u8>,
}

impl Frame {
    pub fn new(
        meeting_id: impl Into<String>,
        participant_id: impl Into<String>,
        timestamp_ms: i64,
        image_bytes: Vec<u8>,
    ) -> Self {
        Self {
            key: FrameKey {
                meeting_id: meeting_id.into(),
                participant_id: participant_id.into(),
                timestamp_ms,
            },
            image_bytes,
        }
    }
}

/// Object-finalize notification delivered by the storage event platform.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StorageEvent {
    pub bucket_name: String,
    pub object_key: String,
}

impl StorageEvent {
    pub fn new(bucket_name: impl Into<String>, object_key: impl Into<String>) -> Self {
        Self {
            bucket_name: bucket_name.into(),
            object_key: object_key.into(),
        }
    }
}
