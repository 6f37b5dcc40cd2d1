use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use serde_json::Value;
use tracing::info;

use crate::ingest;
use crate::meetings::{self, MeetingUpsert};
use crate::state::AppState;
use crate::types::{Platform, RawEvent};

use super::{EventProcessor, ProcessOutcome, ProcessingError};

/// Google Meet has no transcript webhook; Calendar push notifications tell
/// us "something changed" and the processor runs an incremental events sync,
/// picking out conference events that just ended. Transcript acquisition is
/// deferred to a secondary mechanism, so meetings created here stay
/// `pending`.
pub struct MeetProcessor;

#[async_trait]
impl EventProcessor for MeetProcessor {
    fn platform(&self) -> Platform {
        Platform::GoogleMeet
    }

    async fn process(
        &self,
        state: &AppState,
        raw: &RawEvent,
        _reprocess: bool,
    ) -> Result<ProcessOutcome, ProcessingError> {
        let payload: Value = serde_json::from_str(&raw.payload)
            .map_err(|err| ProcessingError::MalformedPayload(err.to_string()))?;

        let channel_id = payload
            .get("channel_id")
            .and_then(Value::as_str)
            .ok_or_else(|| ProcessingError::MalformedPayload("missing channel_id".into()))?;

        // The initial handshake message for a new watch channel carries no
        // event data.
        if payload.get("resource_state").and_then(Value::as_str) == Some("sync") {
            return Ok(ProcessOutcome::Skipped);
        }

        let user_id = payload
            .get("channel_token")
            .and_then(Value::as_str)
            .unwrap_or("primary");
        let resource_id = payload.get("resource_id").and_then(Value::as_str);

        let sync_token = ingest::channel_sync_token(&state.pool, channel_id).await?;
        let token = state
            .clients
            .tokens
            .access_token(Platform::GoogleMeet, user_id)
            .await?;
        let sync = state
            .clients
            .transcripts
            .list_calendar_events(sync_token.as_deref(), &token)
            .await?;

        let now = Utc::now();
        let window = Duration::seconds(state.config.meet_window_secs);
        let mut created_any = false;
        let mut touched = 0u32;

        for event in &sync.events {
            if !event.has_conference {
                continue;
            }
            let Some(end) = event.end.as_deref().and_then(parse_instant) else {
                continue;
            };
            // Only conference events that ended within the trailing window.
            if end > now || now - end > window {
                continue;
            }

            let duration_minutes = event
                .start
                .as_deref()
                .and_then(parse_instant)
                .map(|start| ((end - start).num_seconds().max(0) + 59) / 60);

            let fields = MeetingUpsert {
                topic: event.summary.clone(),
                host_identifier: event.organizer_email.clone(),
                started_at: event.start.clone(),
                duration_minutes,
            };
            let (_, created) =
                meetings::upsert_meeting(&state.pool, Platform::GoogleMeet, &event.id, &fields)
                    .await?;
            created_any = created_any || created;
            touched += 1;
        }

        ingest::save_channel_sync_token(
            &state.pool,
            channel_id,
            resource_id,
            sync.next_sync_token.as_deref(),
        )
        .await?;

        info!(
            channel_id,
            touched, "calendar sync processed ({} events in feed)",
            sync.events.len()
        );

        Ok(if touched == 0 {
            ProcessOutcome::Skipped
        } else if created_any {
            ProcessOutcome::Created
        } else {
            ProcessOutcome::Updated
        })
    }
}

fn parse_instant(raw: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}
