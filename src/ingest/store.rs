use chrono::{Duration, SecondsFormat, Utc};
use sqlx::SqlitePool;
use uuid::Uuid;

use crate::types::{Platform, RawEvent, RawEventStatus};

#[derive(Debug)]
pub enum StoreError {
    Db(sqlx::Error),
    NotFound(String),
    Parse(String),
}

impl From<sqlx::Error> for StoreError {
    fn from(err: sqlx::Error) -> Self {
        Self::Db(err)
    }
}

/// Persists one inbound delivery. Called by the webhook endpoint before any
/// processing is attempted; a payload that failed to parse is stored
/// directly in `failed` status with the parse error.
pub async fn insert_raw_event(
    pool: &SqlitePool,
    platform: Platform,
    event_type: &str,
    payload: &str,
    external_meeting_id: Option<&str>,
    parse_error: Option<&str>,
) -> Result<RawEvent, StoreError> {
    let id = Uuid::new_v4();
    let received_at = format_utc(Utc::now());
    let status = if parse_error.is_some() {
        RawEventStatus::Failed
    } else {
        RawEventStatus::Received
    };

    sqlx::query(
        r#"
        INSERT INTO raw_events (
            id,
            platform,
            event_type,
            payload,
            external_meeting_id,
            status,
            received_at,
            processed_at,
            error_message
        )
        VALUES (?, ?, ?, ?, ?, ?, ?, NULL, ?)
        "#,
    )
    .bind(id.to_string())
    .bind(platform.as_str())
    .bind(event_type)
    .bind(payload)
    .bind(external_meeting_id)
    .bind(status.as_str())
    .bind(&received_at)
    .bind(parse_error)
    .execute(pool)
    .await?;

    Ok(RawEvent {
        id,
        platform,
        event_type: event_type.to_string(),
        payload: payload.to_string(),
        external_meeting_id: external_meeting_id.map(str::to_string),
        status,
        received_at,
        processed_at: None,
        error_message: parse_error.map(str::to_string),
    })
}

/// Atomically claims a raw event for processing.
///
/// The conditional update is the idempotency gate: zero rows affected means
/// another worker already owns the event (or it is already done) and the
/// caller must not begin side effects. With `reprocess` set, `failed` and
/// `processed` rows are claimable too; that is the explicit manual path.
pub async fn claim_for_processing(
    pool: &SqlitePool,
    id: Uuid,
    reprocess: bool,
) -> Result<Option<RawEvent>, StoreError> {
    let now = format_utc(Utc::now());
    let result = if reprocess {
        sqlx::query(
            r#"
            UPDATE raw_events
            SET status = 'processing',
                claimed_at = ?,
                error_message = NULL
            WHERE id = ?
              AND status IN ('received', 'failed', 'processed')
            "#,
        )
        .bind(&now)
        .bind(id.to_string())
        .execute(pool)
        .await?
    } else {
        sqlx::query(
            r#"
            UPDATE raw_events
            SET status = 'processing',
                claimed_at = ?
            WHERE id = ?
              AND status = 'received'
            "#,
        )
        .bind(&now)
        .bind(id.to_string())
        .execute(pool)
        .await?
    };

    if result.rows_affected() == 0 {
        return Ok(None);
    }

    let event = get_raw_event(pool, id).await?;
    Ok(Some(event))
}

/// Returns events held in `processing` past the claim timeout back to
/// `received`. A claim that old belongs to a worker that died mid-flight;
/// without the reset its event (and any retry record pointing at it) would
/// be stuck forever.
pub async fn requeue_stale(pool: &SqlitePool, older_than_secs: i64) -> Result<u64, StoreError> {
    let cutoff = format_utc(Utc::now() - Duration::seconds(older_than_secs.max(0)));
    let result = sqlx::query(
        r#"
        UPDATE raw_events
        SET status = 'received',
            claimed_at = NULL
        WHERE status = 'processing'
          AND (claimed_at IS NULL OR claimed_at <= ?)
        "#,
    )
    .bind(&cutoff)
    .execute(pool)
    .await?;

    Ok(result.rows_affected())
}

pub async fn mark_processed(pool: &SqlitePool, id: Uuid) -> Result<(), StoreError> {
    let now = format_utc(Utc::now());
    let result = sqlx::query(
        r#"
        UPDATE raw_events
        SET status = 'processed',
            processed_at = ?,
            error_message = NULL
        WHERE id = ?
          AND status = 'processing'
        "#,
    )
    .bind(&now)
    .bind(id.to_string())
    .execute(pool)
    .await?;

    if result.rows_affected() == 0 {
        return Err(StoreError::NotFound(
            "raw event not in processing state".to_string(),
        ));
    }
    Ok(())
}

pub async fn mark_failed(pool: &SqlitePool, id: Uuid, error: &str) -> Result<(), StoreError> {
    let now = format_utc(Utc::now());
    let result = sqlx::query(
        r#"
        UPDATE raw_events
        SET status = 'failed',
            processed_at = ?,
            error_message = ?
        WHERE id = ?
          AND status = 'processing'
        "#,
    )
    .bind(&now)
    .bind(error)
    .bind(id.to_string())
    .execute(pool)
    .await?;

    if result.rows_affected() == 0 {
        return Err(StoreError::NotFound(
            "raw event not in processing state".to_string(),
        ));
    }
    Ok(())
}

pub async fn get_raw_event(pool: &SqlitePool, id: Uuid) -> Result<RawEvent, StoreError> {
    let row = sqlx::query_as::<_, RawEventRow>(
        r#"
        SELECT id, platform, event_type, payload, external_meeting_id,
               status, received_at, processed_at, error_message
        FROM raw_events
        WHERE id = ?
        "#,
    )
    .bind(id.to_string())
    .fetch_optional(pool)
    .await?
    .ok_or_else(|| StoreError::NotFound("raw event not found".to_string()))?;

    row.try_into()
}

/// Most recent delivery associated with a meeting's external id; the
/// reprocessing path uses it to redo a meeting without the original
/// notification in hand.
pub async fn latest_for_meeting(
    pool: &SqlitePool,
    platform: Platform,
    external_meeting_id: &str,
) -> Result<Option<RawEvent>, StoreError> {
    let row = sqlx::query_as::<_, RawEventRow>(
        r#"
        SELECT id, platform, event_type, payload, external_meeting_id,
               status, received_at, processed_at, error_message
        FROM raw_events
        WHERE platform = ?
          AND external_meeting_id = ?
        ORDER BY received_at DESC, id DESC
        LIMIT 1
        "#,
    )
    .bind(platform.as_str())
    .bind(external_meeting_id)
    .fetch_optional(pool)
    .await?;

    row.map(RawEventRow::try_into).transpose()
}

/// Last incremental sync token seen for a Calendar push channel.
pub async fn channel_sync_token(
    pool: &SqlitePool,
    channel_id: &str,
) -> Result<Option<String>, StoreError> {
    let token: Option<Option<String>> = sqlx::query_scalar(
        r#"
        SELECT sync_token
        FROM calendar_channels
        WHERE channel_id = ?
        "#,
    )
    .bind(channel_id)
    .fetch_optional(pool)
    .await?;

    Ok(token.flatten())
}

pub async fn save_channel_sync_token(
    pool: &SqlitePool,
    channel_id: &str,
    resource_id: Option<&str>,
    sync_token: Option<&str>,
) -> Result<(), StoreError> {
    let now = format_utc(Utc::now());
    sqlx::query(
        r#"
        INSERT INTO calendar_channels (channel_id, resource_id, sync_token, updated_at)
        VALUES (?, ?, ?, ?)
        ON CONFLICT(channel_id) DO UPDATE SET
            resource_id = excluded.resource_id,
            sync_token = excluded.sync_token,
            updated_at = excluded.updated_at
        "#,
    )
    .bind(channel_id)
    .bind(resource_id)
    .bind(sync_token)
    .bind(&now)
    .execute(pool)
    .await?;

    Ok(())
}

#[derive(sqlx::FromRow)]
struct RawEventRow {
    id: String,
    platform: String,
    event_type: String,
    payload: String,
    external_meeting_id: Option<String>,
    status: String,
    received_at: String,
    processed_at: Option<String>,
    error_message: Option<String>,
}

impl TryFrom<RawEventRow> for RawEvent {
    type Error = StoreError;

    fn try_from(row: RawEventRow) -> Result<Self, Self::Error> {
        let platform = Platform::parse(&row.platform)
            .ok_or_else(|| StoreError::Parse(format!("unknown platform: {}", row.platform)))?;
        let status = RawEventStatus::parse(&row.status)
            .ok_or_else(|| StoreError::Parse(format!("unknown status: {}", row.status)))?;

        Ok(RawEvent {
            id: Uuid::parse_str(&row.id)
                .map_err(|err| StoreError::Parse(format!("invalid event id: {err}")))?,
            platform,
            event_type: row.event_type,
            payload: row.payload,
            external_meeting_id: row.external_meeting_id,
            status,
            received_at: row.received_at,
            processed_at: row.processed_at,
            error_message: row.error_message,
        })
    }
}

fn format_utc(dt: chrono::DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Secs, true)
}
