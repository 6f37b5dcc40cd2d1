//! Dead letter queue reads and operator resolution. Entries are created by
//! the retry store inside the exhaustion transaction; this module never
//! creates them.

use chrono::{SecondsFormat, Utc};
use sqlx::{QueryBuilder, SqlitePool};
use uuid::Uuid;

use crate::types::{DeadLetterEntry, FailureAttempt, Platform};

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

#[derive(Debug, Clone)]
pub struct DeadLetterCursor {
    pub created_at: String,
    pub id: Uuid,
}

#[derive(Debug, Clone)]
pub struct ListDeadLettersParams {
    pub limit: i64,
    pub before: Option<DeadLetterCursor>,
    pub unresolved_only: bool,
}

#[derive(Debug, Clone)]
pub struct ListDeadLettersResult {
    pub entries: Vec<DeadLetterEntry>,
    pub next_before: Option<DeadLetterCursor>,
}

pub async fn list_entries(
    pool: &SqlitePool,
    params: &ListDeadLettersParams,
) -> Result<ListDeadLettersResult, StoreError> {
    let mut query = QueryBuilder::new(
        "SELECT id, failure_id, platform, event_type, payload, last_error, \
            total_attempts, failure_history, alert_sent, resolved, \
            resolution_notes, created_at, resolved_at \
        FROM dead_letters \
        WHERE 1 = 1",
    );

    if params.unresolved_only {
        query.push(" AND resolved = 0");
    }

    if let Some(cursor) = &params.before {
        query.push(" AND (created_at < ");
        query.push_bind(&cursor.created_at);
        query.push(" OR (created_at = ");
        query.push_bind(&cursor.created_at);
        query.push(" AND id < ");
        query.push_bind(cursor.id.to_string());
        query.push("))");
    }

    query.push(" ORDER BY created_at DESC, id DESC LIMIT ");
    query.push_bind(params.limit + 1);

    let rows: Vec<DeadLetterRow> = query.build_query_as().fetch_all(pool).await?;

    let has_more = rows.len() > params.limit as usize;
    let take_count = if has_more {
        params.limit as usize
    } else {
        rows.len()
    };

    let mut entries = Vec::with_capacity(take_count);
    let mut last_cursor = None;

    for row in rows.into_iter().take(take_count) {
        let cursor_created_at = row.created_at.clone();
        let entry: DeadLetterEntry = row.try_into()?;
        last_cursor = Some(DeadLetterCursor {
            created_at: cursor_created_at,
            id: entry.id,
        });
        entries.push(entry);
    }

    let next_before = if has_more { last_cursor } else { None };

    Ok(ListDeadLettersResult {
        entries,
        next_before,
    })
}

pub async fn get_entry(pool: &SqlitePool, id: Uuid) -> Result<DeadLetterEntry, StoreError> {
    let row = sqlx::query_as::<_, DeadLetterRow>(
        r#"
        SELECT id, failure_id, platform, event_type, payload, last_error,
               total_attempts, failure_history, alert_sent, resolved,
               resolution_notes, created_at, resolved_at
        FROM dead_letters
        WHERE id = ?
        "#,
    )
    .bind(id.to_string())
    .fetch_optional(pool)
    .await?
    .ok_or_else(|| StoreError::NotFound("dead letter entry not found".to_string()))?;

    row.try_into()
}

/// Operator-driven resolution; the only mutation path besides creation.
pub async fn resolve_entry(
    pool: &SqlitePool,
    id: Uuid,
    notes: Option<&str>,
) -> Result<DeadLetterEntry, StoreError> {
    let now = format_utc(Utc::now());
    let result = sqlx::query(
        r#"
        UPDATE dead_letters
        SET resolved = 1,
            resolution_notes = ?,
            resolved_at = ?
        WHERE id = ?
          AND resolved = 0
        "#,
    )
    .bind(notes)
    .bind(&now)
    .bind(id.to_string())
    .execute(pool)
    .await?;

    if result.rows_affected() == 0 {
        // Distinguish missing from already-resolved for the caller.
        let entry = get_entry(pool, id).await?;
        if entry.resolved {
            return Err(StoreError::Conflict("entry already resolved".to_string()));
        }
        return Err(StoreError::NotFound("dead letter entry not found".to_string()));
    }

    get_entry(pool, id).await
}

pub async fn unresolved_count(pool: &SqlitePool) -> Result<i64, StoreError> {
    let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM dead_letters WHERE resolved = 0")
        .fetch_one(pool)
        .await?;
    Ok(count)
}

#[derive(sqlx::FromRow)]
struct DeadLetterRow {
    id: String,
    failure_id: String,
    platform: String,
    event_type: String,
    payload: String,
    last_error: String,
    total_attempts: i64,
    failure_history: String,
    alert_sent: i64,
    resolved: i64,
    resolution_notes: Option<String>,
    created_at: String,
    resolved_at: Option<String>,
}

impl TryFrom<DeadLetterRow> for DeadLetterEntry {
    type Error = StoreError;

    fn try_from(row: DeadLetterRow) -> Result<Self, Self::Error> {
        let platform = Platform::parse(&row.platform)
            .ok_or_else(|| StoreError::Parse(format!("unknown platform: {}", row.platform)))?;
        let failure_history: Vec<FailureAttempt> = serde_json::from_str(&row.failure_history)
            .map_err(|err| StoreError::Parse(format!("invalid failure history JSON: {err}")))?;

        Ok(DeadLetterEntry {
            id: Uuid::parse_str(&row.id)
                .map_err(|err| StoreError::Parse(format!("invalid entry id: {err}")))?,
            failure_id: Uuid::parse_str(&row.failure_id)
                .map_err(|err| StoreError::Parse(format!("invalid failure id: {err}")))?,
            platform,
            event_type: row.event_type,
            payload: row.payload,
            last_error: row.last_error,
            total_attempts: row.total_attempts,
            failure_history,
            alert_sent: row.alert_sent != 0,
            resolved: row.resolved != 0,
            resolution_notes: row.resolution_notes,
            created_at: row.created_at,
            resolved_at: row.resolved_at,
        })
    }
}

fn format_utc(dt: chrono::DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Secs, true)
}
