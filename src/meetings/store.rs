//! Meeting and transcript persistence.
//!
//! Every status transition is a guarded single-row conditional update, so an
//! out-of-order writer changes nothing instead of corrupting the lifecycle:
//! pending → processing → {ready, failed}, with failed → processing for the
//! retry and reprocessing paths. `ready` is terminal for the pipeline.

use chrono::{SecondsFormat, Utc};
use sqlx::SqlitePool;
use uuid::Uuid;

use crate::types::{
    Meeting, MeetingStatus, Platform, Transcript, TranscriptFormat, TranscriptSegment,
    TranscriptStatus,
};

#[derive(Debug)]
pub enum StoreError {
    Db(sqlx::Error),
    NotFound(String),
    Conflict(String),
    Parse(String),
}

impl From<sqlx::Error> for StoreError {
    fn from(err: sqlx::Error) -> Self {
        Self::Db(err)
    }
}

/// Metadata carried by a transcript-bearing notification.
#[derive(Debug, Clone, Default)]
pub struct MeetingUpsert {
    pub topic: Option<String>,
    pub host_identifier: Option<String>,
    pub started_at: Option<String>,
    pub duration_minutes: Option<i64>,
}

/// Idempotently ensures a meeting row exists for (platform, external id).
/// Returns the meeting plus whether this call created it.
pub async fn upsert_meeting(
    pool: &SqlitePool,
    platform: Platform,
    external_meeting_id: &str,
    fields: &MeetingUpsert,
) -> Result<(Meeting, bool), StoreError> {
    let now = format_utc(Utc::now());

    let existing = find_by_external_id(pool, platform, external_meeting_id).await?;
    if let Some(meeting) = existing {
        sqlx::query(
            r#"
            UPDATE meetings
            SET topic = COALESCE(?, topic),
                host_identifier = COALESCE(?, host_identifier),
                started_at = COALESCE(?, started_at),
                duration_minutes = COALESCE(?, duration_minutes),
                updated_at = ?
            WHERE id = ?
            "#,
        )
        .bind(fields.topic.as_deref())
        .bind(fields.host_identifier.as_deref())
        .bind(fields.started_at.as_deref())
        .bind(fields.duration_minutes)
        .bind(&now)
        .bind(meeting.id.to_string())
        .execute(pool)
        .await?;

        let meeting = get_meeting(pool, meeting.id).await?;
        return Ok((meeting, false));
    }

    let id = Uuid::new_v4();
    sqlx::query(
        r#"
        INSERT INTO meetings (
            id, platform, external_meeting_id, topic, host_identifier,
            started_at, duration_minutes, status, processing_step,
            processing_error, draft_id, drafted_at, created_at, updated_at
        )
        VALUES (?, ?, ?, ?, ?, ?, ?, 'pending', NULL, NULL, NULL, NULL, ?, ?)
        ON CONFLICT(platform, external_meeting_id) DO UPDATE SET
            topic = COALESCE(excluded.topic, meetings.topic),
            updated_at = excluded.updated_at
        "#,
    )
    .bind(id.to_string())
    .bind(platform.as_str())
    .bind(external_meeting_id)
    .bind(fields.topic.as_deref())
    .bind(fields.host_identifier.as_deref())
    .bind(fields.started_at.as_deref())
    .bind(fields.duration_minutes)
    .bind(&now)
    .bind(&now)
    .execute(pool)
    .await?;

    // Re-read through the unique key: on a conflicting concurrent insert the
    // surviving row may not carry our generated id.
    let meeting = find_by_external_id(pool, platform, external_meeting_id)
        .await?
        .ok_or_else(|| StoreError::NotFound("meeting vanished after upsert".to_string()))?;
    let created = meeting.id == id;
    Ok((meeting, created))
}

/// Claims a meeting for processing from any non-terminal state, recording
/// the current pipeline step for progress display. `ready` meetings refuse
/// the claim so a completed pipeline is never restarted by accident.
pub async fn begin_processing(
    pool: &SqlitePool,
    meeting_id: Uuid,
    step: &str,
) -> Result<(), StoreError> {
    let now = format_utc(Utc::now());
    let result = sqlx::query(
        r#"
        UPDATE meetings
        SET status = 'processing',
            processing_step = ?,
            processing_error = NULL,
            updated_at = ?
        WHERE id = ?
          AND status IN ('pending', 'processing', 'failed')
        "#,
    )
    .bind(step)
    .bind(&now)
    .bind(meeting_id.to_string())
    .execute(pool)
    .await?;

    if result.rows_affected() == 0 {
        return Err(StoreError::Conflict(
            "meeting is not in a processable state".to_string(),
        ));
    }
    Ok(())
}

pub async fn set_processing_step(
    pool: &SqlitePool,
    meeting_id: Uuid,
    step: &str,
) -> Result<(), StoreError> {
    let now = format_utc(Utc::now());
    sqlx::query(
        r#"
        UPDATE meetings
        SET processing_step = ?,
            updated_at = ?
        WHERE id = ?
          AND status = 'processing'
        "#,
    )
    .bind(step)
    .bind(&now)
    .bind(meeting_id.to_string())
    .execute(pool)
    .await?;

    Ok(())
}

/// processing → ready. The guard makes the pending → ready shortcut
/// impossible.
pub async fn mark_ready(pool: &SqlitePool, meeting_id: Uuid) -> Result<(), StoreError> {
    let now = format_utc(Utc::now());
    let result = sqlx::query(
        r#"
        UPDATE meetings
        SET status = 'ready',
            processing_step = NULL,
            processing_error = NULL,
            updated_at = ?
        WHERE id = ?
          AND status = 'processing'
        "#,
    )
    .bind(&now)
    .bind(meeting_id.to_string())
    .execute(pool)
    .await?;

    if result.rows_affected() == 0 {
        return Err(StoreError::Conflict(
            "meeting not in processing state".to_string(),
        ));
    }
    Ok(())
}

/// pending/processing → failed with a human-readable error. A `ready`
/// meeting stays ready.
pub async fn mark_failed(
    pool: &SqlitePool,
    meeting_id: Uuid,
    error: &str,
) -> Result<(), StoreError> {
    let now = format_utc(Utc::now());
    sqlx::query(
        r#"
        UPDATE meetings
        SET status = 'failed',
            processing_step = NULL,
            processing_error = ?,
            updated_at = ?
        WHERE id = ?
          AND status IN ('pending', 'processing')
        "#,
    )
    .bind(error)
    .bind(&now)
    .bind(meeting_id.to_string())
    .execute(pool)
    .await?;

    Ok(())
}

/// failed → processing. Only the reprocessing operation calls this.
pub async fn resume_failed(pool: &SqlitePool, meeting_id: Uuid) -> Result<(), StoreError> {
    let now = format_utc(Utc::now());
    let result = sqlx::query(
        r#"
        UPDATE meetings
        SET status = 'processing',
            processing_step = 'reprocessing',
            processing_error = NULL,
            updated_at = ?
        WHERE id = ?
          AND status = 'failed'
        "#,
    )
    .bind(&now)
    .bind(meeting_id.to_string())
    .execute(pool)
    .await?;

    if result.rows_affected() == 0 {
        return Err(StoreError::Conflict(
            "meeting is not in failed state".to_string(),
        ));
    }
    Ok(())
}

pub async fn record_draft(
    pool: &SqlitePool,
    meeting_id: Uuid,
    draft_id: &str,
) -> Result<(), StoreError> {
    let now = format_utc(Utc::now());
    sqlx::query(
        r#"
        UPDATE meetings
        SET draft_id = ?,
            drafted_at = ?,
            updated_at = ?
        WHERE id = ?
        "#,
    )
    .bind(draft_id)
    .bind(&now)
    .bind(&now)
    .bind(meeting_id.to_string())
    .execute(pool)
    .await?;

    Ok(())
}

pub async fn get_meeting(pool: &SqlitePool, meeting_id: Uuid) -> Result<Meeting, StoreError> {
    let row = sqlx::query_as::<_, MeetingRow>(
        r#"
        SELECT id, platform, external_meeting_id, topic, host_identifier,
               started_at, duration_minutes, status, processing_step,
               processing_error, draft_id, drafted_at, created_at, updated_at
        FROM meetings
        WHERE id = ?
        "#,
    )
    .bind(meeting_id.to_string())
    .fetch_optional(pool)
    .await?
    .ok_or_else(|| StoreError::NotFound("meeting not found".to_string()))?;

    row.try_into()
}

pub async fn find_by_external_id(
    pool: &SqlitePool,
    platform: Platform,
    external_meeting_id: &str,
) -> Result<Option<Meeting>, StoreError> {
    let row = sqlx::query_as::<_, MeetingRow>(
        r#"
        SELECT id, platform, external_meeting_id, topic, host_identifier,
               started_at, duration_minutes, status, processing_step,
               processing_error, draft_id, drafted_at, created_at, updated_at
        FROM meetings
        WHERE platform = ?
          AND external_meeting_id = ?
        "#,
    )
    .bind(platform.as_str())
    .bind(external_meeting_id)
    .fetch_optional(pool)
    .await?;

    row.map(MeetingRow::try_into).transpose()
}

/// Stores the authoritative transcript for a meeting. A re-fetch overwrites
/// the previous row rather than duplicating it.
pub async fn upsert_transcript(
    pool: &SqlitePool,
    meeting_id: Uuid,
    source_format: TranscriptFormat,
    full_text: &str,
    segments: &[TranscriptSegment],
    word_count: i64,
    source_platform: Platform,
) -> Result<Transcript, StoreError> {
    let now = format_utc(Utc::now());
    let id = Uuid::new_v4();
    let segments_json = serde_json::to_string(segments)
        .map_err(|err| StoreError::Parse(format!("serialize segments: {err}")))?;

    sqlx::query(
        r#"
        INSERT INTO transcripts (
            id, meeting_id, source_format, full_text, segments,
            word_count, status, source_platform, created_at, updated_at
        )
        VALUES (?, ?, ?, ?, ?, ?, 'ready', ?, ?, ?)
        ON CONFLICT(meeting_id) DO UPDATE SET
            source_format = excluded.source_format,
            full_text = excluded.full_text,
            segments = excluded.segments,
            word_count = excluded.word_count,
            status = 'ready',
            source_platform = excluded.source_platform,
            updated_at = excluded.updated_at
        "#,
    )
    .bind(id.to_string())
    .bind(meeting_id.to_string())
    .bind(source_format.as_str())
    .bind(full_text)
    .bind(&segments_json)
    .bind(word_count)
    .bind(source_platform.as_str())
    .bind(&now)
    .bind(&now)
    .execute(pool)
    .await?;

    get_transcript(pool, meeting_id)
        .await?
        .ok_or_else(|| StoreError::NotFound("transcript vanished after upsert".to_string()))
}

pub async fn get_transcript(
    pool: &SqlitePool,
    meeting_id: Uuid,
) -> Result<Option<Transcript>, StoreError> {
    let row = sqlx::query_as::<_, TranscriptRow>(
        r#"
        SELECT id, meeting_id, source_format, full_text, segments,
               word_count, status, source_platform, created_at, updated_at
        FROM transcripts
        WHERE meeting_id = ?
        "#,
    )
    .bind(meeting_id.to_string())
    .fetch_optional(pool)
    .await?;

    row.map(TranscriptRow::try_into).transpose()
}

#[derive(sqlx::FromRow)]
struct MeetingRow {
    id: String,
    platform: String,
    external_meeting_id: String,
    topic: Option<String>,
    host_identifier: Option<String>,
    started_at: Option<String>,
    duration_minutes: Option<i64>,
    status: String,
    processing_step: Option<String>,
    processing_error: Option<String>,
    draft_id: Option<String>,
    drafted_at: Option<String>,
    created_at: String,
    updated_at: String,
}

impl TryFrom<MeetingRow> for Meeting {
    type Error = StoreError;

    fn try_from(row: MeetingRow) -> Result<Self, Self::Error> {
        let platform = Platform::parse(&row.platform)
            .ok_or_else(|| StoreError::Parse(format!("unknown platform: {}", row.platform)))?;
        let status = MeetingStatus::parse(&row.status)
            .ok_or_else(|| StoreError::Parse(format!("unknown status: {}", row.status)))?;

        Ok(Meeting {
            id: Uuid::parse_str(&row.id)
                .map_err(|err| StoreError::Parse(format!("invalid meeting id: {err}")))?,
            platform,
            external_meeting_id: row.external_meeting_id,
            topic: row.topic,
            host_identifier: row.host_identifier,
            started_at: row.started_at,
            duration_minutes: row.duration_minutes,
            status,
            processing_step: row.processing_step,
            processing_error: row.processing_error,
            draft_id: row.draft_id,
            drafted_at: row.drafted_at,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

#[derive(sqlx::FromRow)]
struct TranscriptRow {
    id: String,
    meeting_id: String,
    source_format: String,
    full_text: String,
    segments: String,
    word_count: i64,
    status: String,
    source_platform: String,
    created_at: String,
    updated_at: String,
}

impl TryFrom<TranscriptRow> for Transcript {
    type Error = StoreError;

    fn try_from(row: TranscriptRow) -> Result<Self, Self::Error> {
        let source_format = TranscriptFormat::parse(&row.source_format)
            .ok_or_else(|| StoreError::Parse(format!("unknown format: {}", row.source_format)))?;
        let status = TranscriptStatus::parse(&row.status)
            .ok_or_else(|| StoreError::Parse(format!("unknown status: {}", row.status)))?;
        let source_platform = Platform::parse(&row.source_platform).ok_or_else(|| {
            StoreError::Parse(format!("unknown platform: {}", row.source_platform))
        })?;
        let segments: Vec<TranscriptSegment> = serde_json::from_str(&row.segments)
            .map_err(|err| StoreError::Parse(format!("invalid segments JSON: {err}")))?;

        Ok(Transcript {
            id: Uuid::parse_str(&row.id)
                .map_err(|err| StoreError::Parse(format!("invalid transcript id: {err}")))?,
            meeting_id: Uuid::parse_str(&row.meeting_id)
                .map_err(|err| StoreError::Parse(format!("invalid meeting id: {err}")))?,
            source_format,
            full_text: row.full_text,
            segments,
            word_count: row.word_count,
            status,
            source_platform,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

fn format_utc(dt: chrono::DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Secs, true)
}
