use async_trait::async_trait;
use serde_json::Value;

use crate::meetings::{self, MeetingUpsert};
use crate::state::AppState;
use crate::types::{MeetingStatus, Platform, RawEvent, TranscriptFormat};

use super::{EventProcessor, ProcessOutcome, ProcessingError, generate_draft, vtt};

/// Zoom sends a self-sufficient `recording.completed` payload: the meeting
/// metadata and a transcript file download URL travel in the notification
/// itself.
pub struct ZoomProcessor;

#[async_trait]
impl EventProcessor for ZoomProcessor {
    fn platform(&self) -> Platform {
        Platform::Zoom
    }

    async fn process(
        &self,
        state: &AppState,
        raw: &RawEvent,
        reprocess: bool,
    ) -> Result<ProcessOutcome, ProcessingError> {
        if raw.event_type != "recording.completed" {
            return Ok(ProcessOutcome::Skipped);
        }

        let payload: Value = serde_json::from_str(&raw.payload)
            .map_err(|err| ProcessingError::MalformedPayload(err.to_string()))?;
        let object = payload
            .pointer("/payload/object")
            .ok_or_else(|| ProcessingError::MalformedPayload("missing payload.object".into()))?;

        let external_id = object
            .get("id")
            .map(super::json_id)
            .filter(|id| !id.is_empty())
            .ok_or_else(|| ProcessingError::MalformedPayload("missing meeting id".into()))?;
        let host_id = object.get("host_id").and_then(Value::as_str);

        let fields = MeetingUpsert {
            topic: object
                .get("topic")
                .and_then(Value::as_str)
                .map(str::to_string),
            host_identifier: host_id.map(str::to_string),
            started_at: object
                .get("start_time")
                .and_then(Value::as_str)
                .map(str::to_string),
            duration_minutes: object.get("duration").and_then(Value::as_i64),
        };

        let (meeting, created) =
            meetings::upsert_meeting(&state.pool, Platform::Zoom, &external_id, &fields).await?;

        let transcript = meetings::get_transcript(&state.pool, meeting.id).await?;
        if !reprocess
            && meeting.status == MeetingStatus::Ready
            && transcript.is_some()
            && meeting.draft_id.is_some()
        {
            return Ok(ProcessOutcome::Skipped);
        }

        // A prior attempt may have stored the transcript and marked the
        // meeting ready before draft generation failed; finish that instead
        // of re-fetching.
        if let Some(transcript) = &transcript {
            if meeting.status == MeetingStatus::Ready && meeting.draft_id.is_none() {
                generate_draft(state, &meeting, transcript).await?;
                return Ok(ProcessOutcome::Updated);
            }
        }

        let download_url = transcript_download_url(object).ok_or_else(|| {
            ProcessingError::MalformedPayload("no transcript file in recording payload".into())
        })?;

        meetings::begin_processing(&state.pool, meeting.id, "fetching_transcript").await?;

        let token = state
            .clients
            .tokens
            .access_token(Platform::Zoom, host_id.unwrap_or("default"))
            .await?;
        let body = state
            .clients
            .transcripts
            .download_zoom_transcript(&download_url, &token)
            .await?;

        let parsed = vtt::parse(&body);
        let (format, full_text, segments, word_count) = if parsed.segments.is_empty() {
            // Plain-text transcript file without cue structure.
            let word_count = body.split_whitespace().count() as i64;
            (TranscriptFormat::PlainText, body, Vec::new(), word_count)
        } else {
            (
                TranscriptFormat::Vtt,
                parsed.full_text,
                parsed.segments,
                parsed.word_count,
            )
        };

        let stored = meetings::upsert_transcript(
            &state.pool,
            meeting.id,
            format,
            &full_text,
            &segments,
            word_count,
            Platform::Zoom,
        )
        .await?;

        meetings::set_processing_step(&state.pool, meeting.id, "generating_draft").await?;
        meetings::mark_ready(&state.pool, meeting.id).await?;

        let meeting = meetings::get_meeting(&state.pool, meeting.id).await?;
        generate_draft(state, &meeting, &stored).await?;

        Ok(if created {
            ProcessOutcome::Created
        } else {
            ProcessOutcome::Updated
        })
    }
}

fn transcript_download_url(object: &Value) -> Option<String> {
    let files = object.get("recording_files")?.as_array()?;
    files
        .iter()
        .find(|file| {
            matches!(
                file.get("file_type").and_then(Value::as_str),
                Some("TRANSCRIPT") | Some("CC")
            )
        })
        .and_then(|file| file.get("download_url"))
        .and_then(Value::as_str)
        .map(str::to_string)
}
