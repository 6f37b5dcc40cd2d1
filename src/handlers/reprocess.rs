//! Manual recovery for failed meetings.
//!
//! Zoom recording payloads are self-sufficient, so a full redo from the
//! stored raw event is possible. Teams and Meet cannot be redone without the
//! original notification; that limit is surfaced as a 422 rather than
//! fabricating a webhook.

use axum::{Json, extract::Path, extract::State};
use tracing::info;
use uuid::Uuid;

use crate::error::ApiError;
use crate::ingest;
use crate::meetings;
use crate::processors::{generate_draft, process_raw_event};
use crate::state::AppState;
use crate::types::{MeetingStatus, Platform, ReprocessAction, ReprocessResponse};

pub async fn reprocess_meeting(
    State(state): State<AppState>,
    Path(meeting_id): Path<String>,
) -> Result<Json<ReprocessResponse>, ApiError> {
    let meeting_id = Uuid::parse_str(&meeting_id)
        .map_err(|_| ApiError::BadRequest("meeting id must be a UUID".to_string()))?;

    let meeting = meetings::get_meeting(&state.pool, meeting_id)
        .await
        .map_err(map_meeting_error)?;
    if meeting.status != MeetingStatus::Failed {
        return Err(ApiError::Conflict(
            "only failed meetings can be reprocessed".to_string(),
        ));
    }

    let transcript = meetings::get_transcript(&state.pool, meeting_id)
        .await
        .map_err(map_meeting_error)?;

    // A stored transcript means the expensive fetch already succeeded; only
    // draft generation needs to run again.
    if let Some(transcript) = transcript {
        meetings::resume_failed(&state.pool, meeting_id)
            .await
            .map_err(map_meeting_error)?;

        match generate_draft(&state, &meeting, &transcript).await {
            Ok(draft_id) => {
                meetings::mark_ready(&state.pool, meeting_id)
                    .await
                    .map_err(map_meeting_error)?;
                info!(meeting_id = %meeting_id, "draft regenerated from stored transcript");
                return Ok(Json(ReprocessResponse {
                    action: ReprocessAction::DraftRegenerated,
                    meeting_id,
                    draft_id: Some(draft_id),
                }));
            }
            Err(err) => {
                let message = err.to_string();
                meetings::mark_failed(&state.pool, meeting_id, &message)
                    .await
                    .map_err(map_meeting_error)?;
                return Err(ApiError::Internal(message));
            }
        }
    }

    match meeting.platform {
        Platform::Zoom => {
            let raw = ingest::latest_for_meeting(
                &state.pool,
                meeting.platform,
                &meeting.external_meeting_id,
            )
            .await
            .map_err(map_ingest_error)?
            .ok_or_else(|| {
                ApiError::Unprocessable(
                    "no stored webhook delivery found for this meeting".to_string(),
                )
            })?;

            meetings::resume_failed(&state.pool, meeting_id)
                .await
                .map_err(map_meeting_error)?;

            match process_raw_event(&state, raw.id, true).await {
                Ok(_) => {
                    let meeting = meetings::get_meeting(&state.pool, meeting_id)
                        .await
                        .map_err(map_meeting_error)?;
                    Ok(Json(ReprocessResponse {
                        action: ReprocessAction::Reprocessing,
                        meeting_id,
                        draft_id: meeting.draft_id,
                    }))
                }
                Err(err) => Err(ApiError::Internal(err.to_string())),
            }
        }
        Platform::MicrosoftTeams | Platform::GoogleMeet => Err(ApiError::Unprocessable(format!(
            "reprocessing without a stored transcript is not yet supported for {}",
            meeting.platform
        ))),
    }
}

fn map_meeting_error(err: meetings::StoreError) -> ApiError {
    match err {
        meetings::StoreError::Db(db) => ApiError::Db(db),
        meetings::StoreError::NotFound(message) => ApiError::NotFound(message),
        meetings::StoreError::Conflict(message) => ApiError::Conflict(message),
        meetings::StoreError::Parse(message) => ApiError::Internal(message),
    }
}

fn map_ingest_error(err: ingest::StoreError) -> ApiError {
    match err {
        ingest::StoreError::Db(db) => ApiError::Db(db),
        ingest::StoreError::NotFound(message) => ApiError::NotFound(message),
        ingest::StoreError::Parse(message) => ApiError::Internal(message),
    }
}
