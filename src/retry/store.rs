//! Webhook failure tracking.
//!
//! One row per stable failure key. Record/increment happens at the
//! processing boundary; exhaustion pairs the status flip with the dead
//! letter insert in one transaction, so an exhausted failure without a dead
//! letter cannot exist.

use chrono::{Duration, SecondsFormat, Utc};
use sqlx::SqlitePool;
use uuid::Uuid;

use crate::config::RetryConfig;
use crate::types::{FailureAttempt, Platform, WebhookFailure, WebhookFailureStatus};

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

impl From<crate::ingest::StoreError> for StoreError {
    fn from(err: crate::ingest::StoreError) -> Self {
        match err {
            crate::ingest::StoreError::Db(err) => Self::Db(err),
            crate::ingest::StoreError::NotFound(msg) => Self::NotFound(msg),
            crate::ingest::StoreError::Parse(msg) => Self::Parse(msg),
        }
    }
}

/// base × 2^(attempts−1), capped. Non-decreasing in `attempts`.
pub fn compute_backoff_secs(retry: &RetryConfig, attempts: i64) -> i64 {
    let exponent = (attempts - 1).clamp(0, 31) as u32;
    retry
        .backoff_base_secs
        .saturating_mul(1_i64 << exponent)
        .min(retry.backoff_max_secs)
}

/// Creates or increments the failure record for one processing failure.
///
/// Non-retryable failures are fast-tracked: exhausted and dead-lettered
/// without burning the backoff schedule. Retryable failures reschedule until
/// `attempts` reaches `max_attempts`, at which point the row is exhausted in
/// the same transaction that creates its dead letter entry.
#[allow(clippy::too_many_arguments)]
pub async fn record_failure(
    pool: &SqlitePool,
    retry: &RetryConfig,
    platform: Platform,
    event_type: &str,
    failure_key: &str,
    payload: &str,
    raw_event_id: Option<Uuid>,
    error: &str,
    retryable: bool,
) -> Result<WebhookFailure, StoreError> {
    let now = Utc::now();
    let now_str = format_utc(now);

    let mut tx = pool.begin().await?;

    let existing = sqlx::query_as::<_, FailureRow>(
        r#"
        SELECT id, failure_key, raw_event_id, platform, event_type, payload,
               last_error, attempts, max_attempts, next_retry_at,
               last_attempt_at, status, history, created_at
        FROM webhook_failures
        WHERE failure_key = ?
        "#,
    )
    .bind(failure_key)
    .fetch_optional(&mut *tx)
    .await?;

    let failure_id = match existing {
        None => {
            let id = Uuid::new_v4();
            let history = vec![FailureAttempt {
                attempt: 1,
                timestamp: now_str.clone(),
                error: error.to_string(),
            }];
            let history_json = serialize_history(&history)?;
            let next_retry_at = format_utc(now + Duration::seconds(compute_backoff_secs(retry, 1)));

            sqlx::query(
                r#"
                INSERT INTO webhook_failures (
                    id, failure_key, raw_event_id, platform, event_type,
                    payload, last_error, attempts, max_attempts,
                    next_retry_at, last_attempt_at, status, history, created_at
                )
                VALUES (?, ?, ?, ?, ?, ?, ?, 1, ?, ?, ?, 'pending', ?, ?)
                "#,
            )
            .bind(id.to_string())
            .bind(failure_key)
            .bind(raw_event_id.map(|id| id.to_string()))
            .bind(platform.as_str())
            .bind(event_type)
            .bind(payload)
            .bind(error)
            .bind(retry.max_attempts)
            .bind(&next_retry_at)
            .bind(&now_str)
            .bind(&history_json)
            .bind(&now_str)
            .execute(&mut *tx)
            .await?;

            if !retryable || retry.max_attempts <= 1 {
                exhaust_in_tx(&mut tx, id, &now_str).await?;
            }
            id
        }
        Some(row) => {
            let id = Uuid::parse_str(&row.id)
                .map_err(|err| StoreError::Parse(format!("invalid failure id: {err}")))?;

            if row.status == "exhausted" {
                // Already dead-lettered; nothing further to track.
                tx.commit().await?;
                return find_by_key(pool, failure_key)
                    .await?
                    .ok_or_else(|| StoreError::NotFound("failure vanished".to_string()));
            }

            let attempts = row.attempts + 1;
            let mut history = parse_history(&row.history)?;
            history.push(FailureAttempt {
                attempt: attempts,
                timestamp: now_str.clone(),
                error: error.to_string(),
            });
            let history_json = serialize_history(&history)?;
            let exhausted = !retryable || attempts >= row.max_attempts;
            let next_retry_at = if exhausted {
                None
            } else {
                Some(format_utc(
                    now + Duration::seconds(compute_backoff_secs(retry, attempts)),
                ))
            };

            sqlx::query(
                r#"
                UPDATE webhook_failures
                SET attempts = ?,
                    last_error = ?,
                    next_retry_at = ?,
                    last_attempt_at = ?,
                    status = 'retrying',
                    history = ?,
                    raw_event_id = COALESCE(?, raw_event_id)
                WHERE id = ?
                "#,
            )
            .bind(attempts)
            .bind(error)
            .bind(next_retry_at.as_deref())
            .bind(&now_str)
            .bind(&history_json)
            .bind(raw_event_id.map(|id| id.to_string()))
            .bind(row.id.clone())
            .execute(&mut *tx)
            .await?;

            if exhausted {
                exhaust_in_tx(&mut tx, id, &now_str).await?;
            }
            id
        }
    };

    tx.commit().await?;

    get_failure(pool, failure_id).await
}

/// Removes the retry record once processing succeeds. Exhausted rows stay:
/// they are the foreign-key parents of their dead letter entries.
pub async fn clear_failure(pool: &SqlitePool, failure_key: &str) -> Result<(), StoreError> {
    sqlx::query(
        r#"
        DELETE FROM webhook_failures
        WHERE failure_key = ?
          AND status != 'exhausted'
        "#,
    )
    .bind(failure_key)
    .execute(pool)
    .await?;

    Ok(())
}

/// Due failures, oldest-due first, to bound worst-case staleness.
pub async fn due_failures(
    pool: &SqlitePool,
    limit: i64,
) -> Result<Vec<WebhookFailure>, StoreError> {
    let now = format_utc(Utc::now());
    let rows = sqlx::query_as::<_, FailureRow>(
        r#"
        SELECT id, failure_key, raw_event_id, platform, event_type, payload,
               last_error, attempts, max_attempts, next_retry_at,
               last_attempt_at, status, history, created_at
        FROM webhook_failures
        WHERE status IN ('pending', 'retrying')
          AND next_retry_at IS NOT NULL
          AND next_retry_at <= ?
        ORDER BY next_retry_at ASC
        LIMIT ?
        "#,
    )
    .bind(&now)
    .bind(limit)
    .fetch_all(pool)
    .await?;

    rows.into_iter().map(FailureRow::try_into).collect()
}

pub async fn find_by_key(
    pool: &SqlitePool,
    failure_key: &str,
) -> Result<Option<WebhookFailure>, StoreError> {
    let row = sqlx::query_as::<_, FailureRow>(
        r#"
        SELECT id, failure_key, raw_event_id, platform, event_type, payload,
               last_error, attempts, max_attempts, next_retry_at,
               last_attempt_at, status, history, created_at
        FROM webhook_failures
        WHERE failure_key = ?
        "#,
    )
    .bind(failure_key)
    .fetch_optional(pool)
    .await?;

    row.map(FailureRow::try_into).transpose()
}

async fn get_failure(pool: &SqlitePool, id: Uuid) -> Result<WebhookFailure, StoreError> {
    let row = sqlx::query_as::<_, FailureRow>(
        r#"
        SELECT id, failure_key, raw_event_id, platform, event_type, payload,
               last_error, attempts, max_attempts, next_retry_at,
               last_attempt_at, status, history, created_at
        FROM webhook_failures
        WHERE id = ?
        "#,
    )
    .bind(id.to_string())
    .fetch_optional(pool)
    .await?
    .ok_or_else(|| StoreError::NotFound("webhook failure not found".to_string()))?;

    row.try_into()
}

/// Flips the failure to exhausted and creates its dead letter entry. Caller
/// holds the transaction; both writes land together or not at all.
async fn exhaust_in_tx(
    tx: &mut sqlx::Transaction<'_, sqlx::Sqlite>,
    failure_id: Uuid,
    now_str: &str,
) -> Result<(), StoreError> {
    sqlx::query(
        r#"
        UPDATE webhook_failures
        SET status = 'exhausted',
            next_retry_at = NULL
        WHERE id = ?
        "#,
    )
    .bind(failure_id.to_string())
    .execute(&mut **tx)
    .await?;

    sqlx::query(
        r#"
        INSERT INTO dead_letters (
            id, failure_id, platform, event_type, payload, last_error,
            total_attempts, failure_history, alert_sent, resolved,
            resolution_notes, created_at, resolved_at
        )
        SELECT ?, id, platform, event_type, payload, last_error,
               attempts, history, 0, 0, NULL, ?, NULL
        FROM webhook_failures
        WHERE id = ?
        ON CONFLICT(failure_id) DO NOTHING
        "#,
    )
    .bind(Uuid::new_v4().to_string())
    .bind(now_str)
    .bind(failure_id.to_string())
    .execute(&mut **tx)
    .await?;

    Ok(())
}

#[derive(sqlx::FromRow)]
struct FailureRow {
    id: String,
    failure_key: String,
    raw_event_id: Option<String>,
    platform: String,
    event_type: String,
    payload: String,
    last_error: String,
    attempts: i64,
    max_attempts: i64,
    next_retry_at: Option<String>,
    last_attempt_at: String,
    status: String,
    history: String,
    created_at: String,
}

impl TryFrom<FailureRow> for WebhookFailure {
    type Error = StoreError;

    fn try_from(row: FailureRow) -> Result<Self, Self::Error> {
        let platform = Platform::parse(&row.platform)
            .ok_or_else(|| StoreError::Parse(format!("unknown platform: {}", row.platform)))?;
        let status = WebhookFailureStatus::parse(&row.status)
            .ok_or_else(|| StoreError::Parse(format!("unknown status: {}", row.status)))?;
        let raw_event_id = match row.raw_event_id {
            Some(value) => Some(
                Uuid::parse_str(&value)
                    .map_err(|err| StoreError::Parse(format!("invalid raw event id: {err}")))?,
            ),
            None => None,
        };

        Ok(WebhookFailure {
            id: Uuid::parse_str(&row.id)
                .map_err(|err| StoreError::Parse(format!("invalid failure id: {err}")))?,
            failure_key: row.failure_key,
            raw_event_id,
            platform,
            event_type: row.event_type,
            payload: row.payload,
            last_error: row.last_error,
            attempts: row.attempts,
            max_attempts: row.max_attempts,
            next_retry_at: row.next_retry_at,
            last_attempt_at: row.last_attempt_at,
            status,
            history: parse_history(&row.history)?,
            created_at: row.created_at,
        })
    }
}

fn parse_history(raw: &str) -> Result<Vec<FailureAttempt>, StoreError> {
    serde_json::from_str(raw)
        .map_err(|err| StoreError::Parse(format!("invalid failure history JSON: {err}")))
}

fn serialize_history(history: &[FailureAttempt]) -> Result<String, StoreError> {
    serde_json::to_string(history)
        .map_err(|err| StoreError::Parse(format!("serialize failure history: {err}")))
}

fn format_utc(dt: chrono::DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Secs, true)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn retry_config(base: i64, max: i64) -> RetryConfig {
        RetryConfig {
            max_attempts: 3,
            backoff_base_secs: base,
            backoff_max_secs: max,
            ..RetryConfig::default()
        }
    }

    #[test]
    fn backoff_doubles_per_attempt() {
        let retry = retry_config(60, 3600);
        assert_eq!(compute_backoff_secs(&retry, 1), 60);
        assert_eq!(compute_backoff_secs(&retry, 2), 120);
        assert_eq!(compute_backoff_secs(&retry, 3), 240);
    }

    #[test]
    fn backoff_is_capped_and_monotonic() {
        let retry = retry_config(60, 3600);
        let mut previous = 0;
        for attempts in 1..=40 {
            let delay = compute_backoff_secs(&retry, attempts);
            assert!(delay >= previous, "backoff must be non-decreasing");
            assert!(delay <= 3600);
            previous = delay;
        }
        assert_eq!(compute_backoff_secs(&retry, 40), 3600);
    }
}
