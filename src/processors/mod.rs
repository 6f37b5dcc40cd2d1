//! Platform event processors and the single processing boundary.
//!
//! The boundary is the only place a processing failure is converted into
//! persistent state: raw event status, meeting status, and the retry
//! tracker. Processors return `Result<ProcessOutcome, ProcessingError>` and
//! never mutate failure bookkeeping themselves.

use async_trait::async_trait;
use thiserror::Error;
use tracing::{info, warn};
use uuid::Uuid;

use crate::clients::ClientError;
use crate::retry;
use crate::state::AppState;
use crate::types::{Meeting, Platform, RawEvent, Transcript};
use crate::{ingest, meetings};

pub mod meet;
pub mod teams;
pub mod vtt;
pub mod zoom;

pub use meet::MeetProcessor;
pub use teams::TeamsProcessor;
pub use zoom::ZoomProcessor;

/// Discriminated result of processing one notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessOutcome {
    Created,
    Updated,
    /// Idempotent no-op: event already handled or not relevant.
    Skipped,
}

#[derive(Debug, Error)]
pub enum ProcessingError {
    #[error("malformed payload: {0}")]
    MalformedPayload(String),
    #[error(transparent)]
    Client(#[from] ClientError),
    #[error("storage error: {0}")]
    Storage(String),
}

impl ProcessingError {
    /// Drives the scheduler's reschedule-vs-dead-letter branch.
    pub fn retryable(&self) -> bool {
        match self {
            ProcessingError::MalformedPayload(_) => false,
            ProcessingError::Client(err) => err.retryable(),
            // Temporary database unavailability.
            ProcessingError::Storage(_) => true,
        }
    }
}

impl From<meetings::StoreError> for ProcessingError {
    fn from(err: meetings::StoreError) -> Self {
        ProcessingError::Storage(format!("{err:?}"))
    }
}

impl From<ingest::StoreError> for ProcessingError {
    fn from(err: ingest::StoreError) -> Self {
        ProcessingError::Storage(format!("{err:?}"))
    }
}

#[async_trait]
pub trait EventProcessor: Send + Sync {
    fn platform(&self) -> Platform;

    /// Translates one raw notification into domain actions. Must be safe to
    /// invoke twice for the same event; `reprocess` forces a full redo.
    async fn process(
        &self,
        state: &AppState,
        raw: &RawEvent,
        reprocess: bool,
    ) -> Result<ProcessOutcome, ProcessingError>;
}

pub fn processor_for(platform: Platform) -> Box<dyn EventProcessor> {
    match platform {
        Platform::Zoom => Box::new(ZoomProcessor),
        Platform::MicrosoftTeams => Box::new(TeamsProcessor),
        Platform::GoogleMeet => Box::new(MeetProcessor),
    }
}

/// Stable retry key: platform + event type + a content-derived resource id.
/// Never derived from the raw event's primary key, so duplicate deliveries
/// of one logical event collapse onto a single retry record.
pub fn failure_key(platform: Platform, event_type: &str, payload: &str) -> String {
    let resource = serde_json::from_str::<serde_json::Value>(payload)
        .ok()
        .and_then(|value| match platform {
            Platform::Zoom => value
                .pointer("/payload/object/uuid")
                .or_else(|| value.pointer("/payload/object/id"))
                .map(json_id),
            Platform::MicrosoftTeams => value
                .pointer("/value/0/resource")
                .and_then(|v| v.as_str())
                .map(str::to_string),
            Platform::GoogleMeet => value
                .get("channel_id")
                .and_then(|v| v.as_str())
                .map(str::to_string),
        });

    match resource {
        Some(resource) => format!("{platform}:{event_type}:{resource}"),
        // Best-effort fingerprint when no resource id is recognizable.
        None => format!("{platform}:{event_type}:{payload}"),
    }
}

fn json_id(value: &serde_json::Value) -> String {
    match value {
        serde_json::Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// The outer raw-event boundary shared by the webhook endpoint's synchronous
/// first attempt, the retry scheduler, and manual reprocessing.
///
/// Claims the event with an atomic conditional status update before any side
/// effects; a lost claim means another invocation owns the event and the
/// result is `Skipped`.
pub async fn process_raw_event(
    state: &AppState,
    raw_event_id: Uuid,
    reprocess: bool,
) -> Result<ProcessOutcome, ProcessingError> {
    let Some(raw) = ingest::claim_for_processing(&state.pool, raw_event_id, reprocess).await?
    else {
        return Ok(ProcessOutcome::Skipped);
    };

    let processor = processor_for(raw.platform);
    let key = failure_key(raw.platform, &raw.event_type, &raw.payload);

    match processor.process(state, &raw, reprocess).await {
        Ok(outcome) => {
            ingest::mark_processed(&state.pool, raw.id).await?;
            if let Err(err) = retry::clear_failure(&state.pool, &key).await {
                warn!(failure_key = %key, "failed to clear retry record: {err:?}");
            }
            info!(
                platform = %raw.platform,
                event_type = %raw.event_type,
                raw_event_id = %raw.id,
                outcome = ?outcome,
                "raw event processed"
            );
            Ok(outcome)
        }
        Err(err) => {
            let message = err.to_string();
            warn!(
                platform = %raw.platform,
                event_type = %raw.event_type,
                raw_event_id = %raw.id,
                retryable = err.retryable(),
                "raw event processing failed: {message}"
            );

            if let Err(store_err) = ingest::mark_failed(&state.pool, raw.id, &message).await {
                warn!(raw_event_id = %raw.id, "failed to mark raw event failed: {store_err:?}");
            }

            // Surface the error on the meeting when one is identifiable; the
            // store guard keeps an already-ready meeting untouched.
            if let Some(external_id) = raw.external_meeting_id.as_deref() {
                if let Ok(Some(meeting)) =
                    meetings::find_by_external_id(&state.pool, raw.platform, external_id).await
                {
                    if let Err(store_err) =
                        meetings::mark_failed(&state.pool, meeting.id, &message).await
                    {
                        warn!(meeting_id = %meeting.id, "failed to mark meeting failed: {store_err:?}");
                    }
                }
            }

            if let Err(store_err) = retry::record_failure(
                &state.pool,
                &state.config.retry,
                raw.platform,
                &raw.event_type,
                &key,
                &raw.payload,
                Some(raw.id),
                &message,
                err.retryable(),
            )
            .await
            {
                warn!(failure_key = %key, "failed to record retry entry: {store_err:?}");
            }

            Err(err)
        }
    }
}

/// Draft generation shared by the processors and the reprocessing path.
/// Records the returned draft id on the meeting.
pub async fn generate_draft(
    state: &AppState,
    meeting: &Meeting,
    transcript: &Transcript,
) -> Result<String, ProcessingError> {
    let draft_id = state
        .clients
        .drafts
        .generate_draft(meeting, transcript)
        .await?;
    meetings::record_draft(&state.pool, meeting.id, &draft_id).await?;
    info!(meeting_id = %meeting.id, draft_id = %draft_id, "draft generated");
    Ok(draft_id)
}
