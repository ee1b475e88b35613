use std::{sync::Arc, time::Duration};

use rand::Rng;

use crate::error::PipelineError;
use crate::models::FrameKey;
use crate::settings::UploadSettings;
use crate::storage::{paths, ObjectStore};
use crate::{log_info, log_warn};

const ENABLE_LOGS: bool = true;

/// Writes captured frames to the object store under their derived key,
/// retrying transient failures a bounded number of times.
#[derive(Clone)]
pub struct Uploader {
    objects: Arc<dyn ObjectStore>,
    prefix: String,
    settings: UploadSettings,
}

impl Uploader {
    pub fn new(objects: Arc<dyn ObjectStore>, prefix: impl Into<String>, settings: UploadSettings) -> Self {
        Self {
            objects,
            prefix: prefix.into(),
            settings,
        }
    }

    /// Upload one frame and return the object key it was stored under.
    /// After the last failed attempt the error is returned, not swallowed.
    pub async fn upload(
        &self,
        meeting_id: &str,
        participant_id: &str,
        bytes: &[u8],
        timestamp_ms: i64,
    ) -> Result<String, PipelineError> {
        paths::validate_meeting_id(meeting_id)?;
        if participant_id.is_empty() {
            return Err(PipelineError::Validation("empty participant id".into()));
        }

        let key = FrameKey {
            meeting_id: meeting_id.to_string(),
            participant_id: participant_id.to_string(),
            timestamp_ms,
        };
        let object_key = paths::frame_object_key(&self.prefix, &key, &self.settings.image_extension);
        let max_attempts = self.settings.max_attempts.max(1);

        let mut attempt = 1;
        loop {
            match self.objects.put(&object_key, bytes).await {
                Ok(()) => {
                    log_info!("uploaded {object_key} ({} bytes, attempt {attempt})", bytes.len());
                    return Ok(object_key);
                }
                Err(err) if attempt < max_attempts => {
                    let delay = self.retry_delay(attempt);
                    log_warn!(
                        "upload of {object_key} failed (attempt {attempt}/{max_attempts}), retrying in {}ms: {err:#}",
                        delay.as_millis()
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(err) => {
                    return Err(PipelineError::transient(
                        format!("upload {object_key} after {max_attempts} attempts"),
                        err,
                    ));
                }
            }
        }
    }

    /// Delay before the attempt following `attempt` (1-based).
    fn retry_delay(&self, attempt: u32) -> Duration {
        let factor = self.settings.backoff_factor.max(1.0);
        let base = self.settings.retry_delay_ms as f64 * factor.powi(attempt as i32 - 1);
        let jitter = if self.settings.jitter_ms > 0 {
            rand::thread_rng().gen_range(0..=self.settings.jitter_ms)
        } else {
            0
        };
        Duration::from_millis(base.min(u64::MAX as f64) as u64 + jitter)
    }
}
