//! Object-key and document-path layout.
//!
//! Objects:   `frames/{meetingId}/{encodedParticipantId}/{timestampMs}.{ext}`
//!            `results/{meetingId}/{encodedParticipantId}/{timestampMs}.json`
//! Documents: `meetings/{meetingId}/participants/{encodedParticipantId}`
//!            `.../analyses/{timestampMs}`, `.../summaries/{bucketIndex}`,
//!            `.../processed/{timestampMs}`

use crate::error::PipelineError;
use crate::models::FrameKey;

/// Percent-encode everything except ASCII alphanumerics, `-` and `_`.
pub fn encode_segment(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for byte in raw.bytes() {
        if byte.is_ascii_alphanumeric() || byte == b'-' || byte == b'_' {
            out.push(byte as char);
        } else {
            out.push_str(&format!("%{byte:02X}"));
        }
    }
    out
}

pub fn decode_segment(encoded: &str) -> Result<String, PipelineError> {
    let bytes = encoded.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'%' {
            let hex = encoded
                .get(i + 1..i + 3)
                .ok_or_else(|| invalid(encoded, "truncated percent escape"))?;
            if !hex.bytes().all(|b| b.is_ascii_hexdigit()) {
                return Err(invalid(encoded, "bad percent escape"));
            }
            let value = u8::from_str_radix(hex, 16)
                .map_err(|_| invalid(encoded, "bad percent escape"))?;
            out.push(value);
            i += 3;
        } else {
            out.push(bytes[i]);
            i += 1;
        }
    }
    String::from_utf8(out).map_err(|_| invalid(encoded, "not valid UTF-8"))
}

fn invalid(value: &str, reason: &str) -> PipelineError {
    PipelineError::Validation(format!("'{value}': {reason}"))
}

/// Meeting ids are used as raw path segments and must already be safe.
pub fn validate_meeting_id(meeting_id: &str) -> Result<(), PipelineError> {
    if meeting_id.is_empty()
        || meeting_id == "."
        || meeting_id == ".."
        || meeting_id.contains('/')
        || meeting_id.contains('\\')
    {
        return Err(invalid(meeting_id, "meeting id is not a single path segment"));
    }
    Ok(())
}

pub fn frame_object_key(prefix: &str, key: &FrameKey, extension: &str) -> String {
    format!(
        "{}{}/{}/{}.{}",
        normalized_prefix(prefix),
        key.meeting_id,
        encode_segment(&key.participant_id),
        key.timestamp_ms,
        extension
    )
}

pub fn result_object_key(prefix: &str, key: &FrameKey) -> String {
    frame_object_key(prefix, key, "json")
}

/// Parse `{prefix}{meetingId}/{encodedParticipantId}/{timestampMs}.{ext}`.
pub fn parse_frame_key(prefix: &str, object_key: &str) -> Result<FrameKey, PipelineError> {
    let prefix = normalized_prefix(prefix);
    let rest = object_key
        .strip_prefix(prefix.as_str())
        .ok_or_else(|| invalid(object_key, "outside the input prefix"))?;

    let parts: Vec<&str> = rest.split('/').collect();
    let [meeting_id, encoded_participant, file_name] = parts.as_slice() else {
        return Err(invalid(
            object_key,
            "expected {meetingId}/{participantId}/{timestamp}.{ext}",
        ));
    };

    validate_meeting_id(meeting_id)?;

    let participant_id = decode_segment(encoded_participant)?;
    if participant_id.is_empty() {
        return Err(invalid(object_key, "empty participant id"));
    }

    let (stem, extension) = file_name
        .rsplit_once('.')
        .ok_or_else(|| invalid(object_key, "file name has no extension"))?;
    if extension.is_empty() {
        return Err(invalid(object_key, "empty extension"));
    }
    let timestamp_ms: i64 = stem
        .parse()
        .map_err(|_| invalid(object_key, "timestamp is not an integer"))?;
    if timestamp_ms < 0 {
        return Err(invalid(object_key, "negative timestamp"));
    }

    Ok(FrameKey {
        meeting_id: meeting_id.to_string(),
        participant_id,
        timestamp_ms,
    })
}

/// Whether `object_key` sits under `prefix`, treated as a directory.
pub fn is_under_prefix(prefix: &str, object_key: &str) -> bool {
    object_key.starts_with(normalized_prefix(prefix).as_str())
}

fn normalized_prefix(prefix: &str) -> String {
    if prefix.is_empty() || prefix.ends_with('/') {
        prefix.to_string()
    } else {
        format!("{prefix}/")
    }
}

/// Address of one document: its parent collection plus its id.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DocRef {
    pub collection: String,
    pub id: String,
}

impl DocRef {
    pub fn new(collection: impl Into<String>, id: impl Into<String>) -> Self {
        Self {
            collection: collection.into(),
            id: id.into(),
        }
    }

    pub fn path(&self) -> String {
        format!("{}/{}", self.collection, self.id)
    }
}

impl std::fmt::Display for DocRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.collection, self.id)
    }
}

pub fn participants_collection(meeting_id: &str) -> String {
    format!("meetings/{meeting_id}/participants")
}

pub fn participant_doc(meeting_id: &str, participant_id: &str) -> DocRef {
    DocRef::new(
        participants_collection(meeting_id),
        encode_segment(participant_id),
    )
}

fn participant_subcollection(meeting_id: &str, participant_id: &str, name: &str) -> String {
    format!("{}/{name}", participant_doc(meeting_id, participant_id).path())
}

pub fn analyses_collection(meeting_id: &str, participant_id: &str) -> String {
    participant_subcollection(meeting_id, participant_id, "analyses")
}

pub fn summaries_collection(meeting_id: &str, participant_id: &str) -> String {
    participant_subcollection(meeting_id, participant_id, "summaries")
}

pub fn analysis_doc(key: &FrameKey) -> DocRef {
    DocRef::new(
        analyses_collection(&key.meeting_id, &key.participant_id),
        key.timestamp_ms.to_string(),
    )
}

pub fn summary_doc(meeting_id: &str, participant_id: &str, bucket_index: i64) -> DocRef {
    DocRef::new(
        summaries_collection(meeting_id, participant_id),
        bucket_index.to_string(),
    )
}

pub fn processed_marker_doc(meeting_id: &str, participant_id: &str, timestamp_ms: i64) -> DocRef {
    DocRef::new(
        participant_subcollection(meeting_id, participant_id, "processed"),
        timestamp_ms.to_string(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(participant: &str) -> FrameKey {
        FrameKey {
            meeting_id: "standup".into(),
            participant_id: participant.into(),
            timestamp_ms: 1_700_000_000_123,
        }
    }

    #[test]
    fn test_participant_id_is_percent_encoded() {
        let object_key = frame_object_key("frames/", &key("ana.lopez@example.com"), "jpg");
        assert_eq!(
            object_key,
            "frames/standup/ana%2Elopez%40example%2Ecom/1700000000123.jpg"
        );
    }

    #[test]
    fn test_parse_recovers_original_keys() {
        let original = key("Zoë / guest #2");
        let object_key = frame_object_key("frames", &original, "png");
        assert_eq!(parse_frame_key("frames/", &object_key).unwrap(), original);
    }

    #[test]
    fn test_prefix_match_respects_segment_boundary() {
        assert!(is_under_prefix("frames", "frames/standup/ana/1.jpg"));
        assert!(is_under_prefix("frames/", "frames/standup/ana/1.jpg"));
        assert!(!is_under_prefix("frames", "frames-archive/standup/ana/1.jpg"));
        assert!(!is_under_prefix("frames/", "results/standup/ana/1.json"));
    }

    #[test]
    fn test_malformed_keys_are_validation_errors() {
        for bad in [
            "frames/standup/ana/notanumber.jpg",
            "frames/standup/ana/1700.",
            "frames/standup/ana/1700",
            "frames/standup/1700.jpg",
            "frames/standup/ana/extra/1700.jpg",
            "frames//ana/1700.jpg",
            "frames/standup/ana%2/1700.jpg",
            "frames/standup/%FF/1700.jpg",
            "frames/standup//1700.jpg",
            "frames/standup/ana/-5.jpg",
            "other/standup/ana/1700.jpg",
        ] {
            assert!(
                matches!(parse_frame_key("frames/", bad), Err(PipelineError::Validation(_))),
                "{bad} should be rejected"
            );
        }
    }

    #[test]
    fn test_document_layout() {
        let k = key("ana@x");
        assert_eq!(
            participant_doc("standup", "ana@x").path(),
            "meetings/standup/participants/ana%40x"
        );
        assert_eq!(
            analysis_doc(&k).path(),
            "meetings/standup/participants/ana%40x/analyses/1700000000123"
        );
        assert_eq!(
            summary_doc("standup", "ana@x", 28_333_333).path(),
            "meetings/standup/participants/ana%40x/summaries/28333333"
        );
        assert_eq!(
            result_object_key("results/", &k),
            "results/standup/ana%40x/1700000000123.json"
        );
    }

    #[test]
    fn test_meeting_id_must_be_single_segment() {
        assert!(validate_meeting_id("standup").is_ok());
        assert!(validate_meeting_id("").is_err());
        assert!(validate_meeting_id("..").is_err());
        assert!(validate_meeting_id("a/b").is_err());
    }
}
