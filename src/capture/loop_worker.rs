use tokio::time::{Duration, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use super::controller::{FrameCaptureController, TickOutcome};
use crate::{log_debug, log_info};

const ENABLE_LOGS: bool = true;

/// Ticker for one capture session. The first tick fires immediately, then
/// every `interval`. Late ticks are delayed, not bunched.
pub(crate) async fn capture_loop(
    controller: FrameCaptureController,
    participant_id: String,
    session_id: Uuid,
    interval: Duration,
    cancel_token: CancellationToken,
) {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            biased;
            _ = cancel_token.cancelled() => {
                log_info!("capture loop for {participant_id} shutting down");
                break;
            }
            _ = ticker.tick() => {
                match controller.tick_session(&participant_id, Some(session_id)).await {
                    TickOutcome::Dispatched(_) => {}
                    TickOutcome::Dropped => log_debug!("tick dropped for {participant_id}"),
                    TickOutcome::NoSession | TickOutcome::Failed => break,
                }
            }
        }
    }
}
