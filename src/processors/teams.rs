use async_trait::async_trait;
use serde_json::Value;

use crate::meetings::{self, MeetingUpsert};
use crate::state::AppState;
use crate::types::{MeetingStatus, Platform, RawEvent, TranscriptFormat};

use super::{EventProcessor, ProcessOutcome, ProcessingError, generate_draft, vtt};

/// Microsoft Teams delivers Graph change notifications whose `resource` path
/// names the user, online meeting, and transcript. The transcript body is
/// fetched separately as WebVTT.
pub struct TeamsProcessor;

/// Parsed pieces of a Graph transcript resource path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TranscriptResource {
    pub user_id: String,
    pub meeting_id: String,
    pub transcript_id: String,
}

#[async_trait]
impl EventProcessor for TeamsProcessor {
    fn platform(&self) -> Platform {
        Platform::MicrosoftTeams
    }

    async fn process(
        &self,
        state: &AppState,
        raw: &RawEvent,
        reprocess: bool,
    ) -> Result<ProcessOutcome, ProcessingError> {
        let payload: Value = serde_json::from_str(&raw.payload)
            .map_err(|err| ProcessingError::MalformedPayload(err.to_string()))?;
        let notification = payload
            .pointer("/value/0")
            .ok_or_else(|| ProcessingError::MalformedPayload("missing value[0]".into()))?;

        let change_type = notification
            .get("changeType")
            .and_then(Value::as_str)
            .unwrap_or_default();
        if change_type != "created" && change_type != "updated" {
            return Ok(ProcessOutcome::Skipped);
        }

        let resource_path = notification
            .get("resource")
            .and_then(Value::as_str)
            .ok_or_else(|| ProcessingError::MalformedPayload("missing resource path".into()))?;
        let resource = parse_resource(resource_path).ok_or_else(|| {
            ProcessingError::MalformedPayload(format!(
                "unrecognized transcript resource: {resource_path}"
            ))
        })?;

        let tenant_id = notification
            .get("tenantId")
            .or_else(|| payload.get("tenantId"))
            .and_then(Value::as_str)
            .unwrap_or("unknown");
        let external_id = format!("teams-{tenant_id}-{}", resource.meeting_id);

        let fields = MeetingUpsert {
            host_identifier: Some(resource.user_id.clone()),
            ..MeetingUpsert::default()
        };
        let (meeting, created) =
            meetings::upsert_meeting(&state.pool, Platform::MicrosoftTeams, &external_id, &fields)
                .await?;

        let transcript = meetings::get_transcript(&state.pool, meeting.id).await?;
        if !reprocess
            && meeting.status == MeetingStatus::Ready
            && transcript.is_some()
            && meeting.draft_id.is_some()
        {
            return Ok(ProcessOutcome::Skipped);
        }

        if let Some(transcript) = &transcript {
            if meeting.status == MeetingStatus::Ready && meeting.draft_id.is_none() {
                generate_draft(state, &meeting, transcript).await?;
                return Ok(ProcessOutcome::Updated);
            }
        }

        meetings::begin_processing(&state.pool, meeting.id, "fetching_transcript").await?;

        let token = state
            .clients
            .tokens
            .access_token(Platform::MicrosoftTeams, &resource.user_id)
            .await?;
        let body = state
            .clients
            .transcripts
            .fetch_teams_transcript(
                &resource.user_id,
                &resource.meeting_id,
                &resource.transcript_id,
                &token,
            )
            .await?;

        let parsed = vtt::parse(&body);
        if parsed.full_text.is_empty() {
            return Err(ProcessingError::MalformedPayload(
                "transcript content is empty".into(),
            ));
        }

        let stored = meetings::upsert_transcript(
            &state.pool,
            meeting.id,
            TranscriptFormat::Vtt,
            &parsed.full_text,
            &parsed.segments,
            parsed.word_count,
            Platform::MicrosoftTeams,
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

/// Graph notifications use both path styles:
/// `users('{u}')/onlineMeetings('{m}')/transcripts('{t}')` and
/// `users/{u}/onlineMeetings/{m}/transcripts/{t}`.
pub fn parse_resource(resource: &str) -> Option<TranscriptResource> {
    let user_id = extract_segment(resource, "users")?;
    let meeting_id = extract_segment(resource, "onlineMeetings")?;
    let transcript_id = extract_segment(resource, "transcripts")?;
    Some(TranscriptResource {
        user_id,
        meeting_id,
        transcript_id,
    })
}

fn extract_segment(resource: &str, name: &str) -> Option<String> {
    let start = resource.find(name)? + name.len();
    let rest = &resource[start..];

    if let Some(quoted) = rest.strip_prefix("('") {
        let end = quoted.find("')")?;
        return Some(quoted[..end].to_string());
    }
    if let Some(plain) = rest.strip_prefix('/') {
        let end = plain.find('/').unwrap_or(plain.len());
        let value = &plain[..end];
        if value.is_empty() {
            return None;
        }
        return Some(value.to_string());
    }
    None
}
