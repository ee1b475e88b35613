use std::{collections::HashMap, sync::Arc, time::Duration};

use chrono::Utc;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::error::PipelineError;
use crate::settings::CaptureSettings;
use crate::storage::paths;

use super::admission::UploadGate;
use super::loop_worker::capture_loop;
use super::source::{encode_jpeg, VideoSource};
use super::uploader::Uploader;
use crate::{log_error, log_info, log_warn};

const ENABLE_LOGS: bool = true;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaptureState {
    Idle,
    Capturing,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StartOutcome {
    Started { effective_interval_ms: u64 },
    /// A session for this participant is already running; nothing changed.
    AlreadyActive,
}

/// What a single tick did.
#[derive(Debug)]
pub enum TickOutcome {
    NoSession,
    /// Upload ceiling reached; the frame was not captured.
    Dropped,
    /// Upload running in the background; resolves to the stored object key.
    Dispatched(JoinHandle<Result<String, PipelineError>>),
    /// Grab or encode failed; the session was stopped.
    Failed,
}

struct CaptureSession {
    id: Uuid,
    meeting_id: String,
    source: Arc<dyn VideoSource>,
    interval: Duration,
    cancel: CancellationToken,
    /// Timestamp of the last frame taken; frame keys must not repeat.
    last_timestamp_ms: Option<i64>,
}

struct ControllerInner {
    sessions: Mutex<HashMap<String, CaptureSession>>,
    gate: UploadGate,
    uploader: Uploader,
    settings: CaptureSettings,
    timer_driven: bool,
}

/// Owns every capture session of one client process.
///
/// Sessions share one upload gate. In timer-driven mode each session gets a
/// ticker task; in manual mode nothing ticks unless `tick` is called.
#[derive(Clone)]
pub struct FrameCaptureController {
    inner: Arc<ControllerInner>,
}

impl FrameCaptureController {
    pub fn new(uploader: Uploader, settings: CaptureSettings) -> Self {
        Self::build(uploader, settings, true)
    }

    /// Controller whose sessions only advance through explicit `tick` calls.
    pub fn manual(uploader: Uploader, settings: CaptureSettings) -> Self {
        Self::build(uploader, settings, false)
    }

    fn build(uploader: Uploader, settings: CaptureSettings, timer_driven: bool) -> Self {
        Self {
            inner: Arc::new(ControllerInner {
                sessions: Mutex::new(HashMap::new()),
                gate: UploadGate::new(settings.max_concurrent_uploads),
                uploader,
                settings,
                timer_driven,
            }),
        }
    }

    pub fn effective_interval_ms(&self, requested_ms: u64) -> u64 {
        requested_ms.max(self.inner.settings.min_interval_ms).max(1)
    }

    /// Start sampling `participant_id`. `None` uses the configured default
    /// interval; any interval below the floor is raised to it.
    pub async fn start_capture(
        &self,
        source: Arc<dyn VideoSource>,
        participant_id: &str,
        meeting_id: &str,
        interval_ms: Option<u64>,
    ) -> Result<StartOutcome, PipelineError> {
        paths::validate_meeting_id(meeting_id)?;
        if participant_id.is_empty() {
            return Err(PipelineError::Validation("empty participant id".into()));
        }

        let mut sessions = self.inner.sessions.lock().await;
        if sessions.contains_key(participant_id) {
            log_info!("capture already active for {participant_id}; start ignored");
            return Ok(StartOutcome::AlreadyActive);
        }

        let interval_ms = interval_ms.unwrap_or(self.inner.settings.default_interval_ms);
        let effective_ms = self.effective_interval_ms(interval_ms);
        if effective_ms != interval_ms {
            log_warn!(
                "requested capture interval {interval_ms}ms for {participant_id} is below the floor; using {effective_ms}ms"
            );
        }

        let session = CaptureSession {
            id: Uuid::new_v4(),
            meeting_id: meeting_id.to_string(),
            source,
            interval: Duration::from_millis(effective_ms),
            cancel: CancellationToken::new(),
            last_timestamp_ms: None,
        };

        if self.inner.timer_driven {
            tokio::spawn(capture_loop(
                self.clone(),
                participant_id.to_string(),
                session.id,
                session.interval,
                session.cancel.clone(),
            ));
        }

        log_info!(
            "capture started for {participant_id} in {meeting_id} every {effective_ms}ms"
        );
        sessions.insert(participant_id.to_string(), session);
        Ok(StartOutcome::Started {
            effective_interval_ms: effective_ms,
        })
    }

    /// Cancel future ticks and forget the session. Uploads already dispatched
    /// finish on their own. Returns whether a session existed.
    pub async fn stop_capture(&self, participant_id: &str) -> bool {
        let removed = self.inner.sessions.lock().await.remove(participant_id);
        match removed {
            Some(session) => {
                session.cancel.cancel();
                log_info!("capture stopped for {participant_id}");
                true
            }
            None => false,
        }
    }

    /// Stop every session; returns how many were running.
    pub async fn stop_all(&self) -> usize {
        let drained: Vec<(String, CaptureSession)> =
            self.inner.sessions.lock().await.drain().collect();
        for (_, session) in &drained {
            session.cancel.cancel();
        }
        if !drained.is_empty() {
            log_info!("stopped {} capture sessions", drained.len());
        }
        drained.len()
    }

    pub async fn state(&self, participant_id: &str) -> CaptureState {
        if self.inner.sessions.lock().await.contains_key(participant_id) {
            CaptureState::Capturing
        } else {
            CaptureState::Idle
        }
    }

    pub async fn session_interval(&self, participant_id: &str) -> Option<Duration> {
        self.inner
            .sessions
            .lock()
            .await
            .get(participant_id)
            .map(|session| session.interval)
    }

    pub async fn active_participants(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.inner.sessions.lock().await.keys().cloned().collect();
        ids.sort();
        ids
    }

    pub fn in_flight_uploads(&self) -> usize {
        self.inner.gate.in_flight()
    }

    /// Run one capture step for the participant's current session.
    pub async fn tick(&self, participant_id: &str) -> TickOutcome {
        self.tick_session(participant_id, None).await
    }

    /// One capture step. `expected` pins the step to a specific session so a
    /// stale ticker can't drive a newer session for the same participant.
    pub(crate) async fn tick_session(&self, participant_id: &str, expected: Option<Uuid>) -> TickOutcome {
        let (session_id, meeting_id, source, permit, timestamp_ms) = {
            let mut sessions = self.inner.sessions.lock().await;
            let session = match sessions.get_mut(participant_id) {
                Some(session) if expected.map_or(true, |id| id == session.id) => session,
                _ => return TickOutcome::NoSession,
            };

            let Some(permit) = self.inner.gate.try_acquire() else {
                log_warn!(
                    "dropping capture tick for {participant_id}: {} uploads in flight (ceiling {})",
                    self.inner.gate.in_flight(),
                    self.inner.gate.ceiling()
                );
                return TickOutcome::Dropped;
            };

            let now = Utc::now().timestamp_millis();
            let timestamp_ms = match session.last_timestamp_ms {
                Some(last) => now.max(last + 1),
                None => now,
            };
            session.last_timestamp_ms = Some(timestamp_ms);

            (
                session.id,
                session.meeting_id.clone(),
                Arc::clone(&session.source),
                permit,
                timestamp_ms,
            )
        };

        let bytes = match self.grab_and_encode(source).await {
            Ok(bytes) => bytes,
            Err(err) => {
                log_error!("capture failed for {participant_id}: {err:#}; stopping its session");
                self.remove_session(participant_id, session_id).await;
                return TickOutcome::Failed;
            }
        };

        let uploader = self.inner.uploader.clone();
        let participant = participant_id.to_string();
        let handle = tokio::spawn(async move {
            let _permit = permit;
            let result = uploader
                .upload(&meeting_id, &participant, &bytes, timestamp_ms)
                .await;
            if let Err(err) = &result {
                log_error!("upload for {participant} at {timestamp_ms} failed: {err}");
            }
            result
        });
        TickOutcome::Dispatched(handle)
    }

    async fn grab_and_encode(&self, source: Arc<dyn VideoSource>) -> anyhow::Result<Vec<u8>> {
        let quality = self.inner.settings.jpeg_quality;
        let budget = Duration::from_millis(self.inner.settings.capture_timeout_ms);
        let work = tokio::task::spawn_blocking(move || -> anyhow::Result<Vec<u8>> {
            let frame = source.grab_frame()?;
            encode_jpeg(&frame, quality)
        });

        match tokio::time::timeout(budget, work).await {
            Ok(joined) => joined.map_err(|err| anyhow::anyhow!("capture worker panicked: {err}"))?,
            Err(_) => Err(anyhow::anyhow!(
                "capture exceeded {}ms",
                budget.as_millis()
            )),
        }
    }

    async fn remove_session(&self, participant_id: &str, session_id: Uuid) {
        let mut sessions = self.inner.sessions.lock().await;
        if sessions.get(participant_id).is_some_and(|s| s.id == session_id) {
            if let Some(session) = sessions.remove(participant_id) {
                session.cancel.cancel();
            }
        }
    }
}
