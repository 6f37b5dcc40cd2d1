//! Read-only aggregation for operational dashboards. No side effects.

use std::collections::BTreeMap;

use chrono::{Duration, SecondsFormat, Utc};
use sqlx::SqlitePool;

use crate::deadletter;
use crate::types::{HealthResponse, HealthStatus, MetricsResponse, Platform, PlatformFailureRate};

#[derive(Debug)]
pub enum StoreError {
    Db(sqlx::Error),
}

impl From<sqlx::Error> for StoreError {
    fn from(err: sqlx::Error) -> Self {
        Self::Db(err)
    }
}

impl From<deadletter::StoreError> for StoreError {
    fn from(err: deadletter::StoreError) -> Self {
        match err {
            deadletter::StoreError::Db(db) => Self::Db(db),
            // Count queries only hit the Db variant; anything else is a bug
            // surfaced as a query protocol error.
            _ => Self::Db(sqlx::Error::Protocol(format!("{err:?}"))),
        }
    }
}

pub async fn health(pool: &SqlitePool) -> Result<HealthResponse, StoreError> {
    let unresolved_dead_letters = deadletter::unresolved_count(pool).await?;
    let pending_retries = pending_retry_count(pool).await?;
    let platforms = platform_failure_rates(pool).await?;

    let status = classify(unresolved_dead_letters, pending_retries, &platforms);

    Ok(HealthResponse {
        status,
        unresolved_dead_letters,
        pending_retries,
        platforms,
    })
}

pub async fn metrics(pool: &SqlitePool) -> Result<MetricsResponse, StoreError> {
    let raw_events_by_status = count_by_status(pool, "raw_events").await?;
    let meetings_by_status = count_by_status(pool, "meetings").await?;
    let failures_by_status = count_by_status(pool, "webhook_failures").await?;
    let dead_letters_total: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM dead_letters")
        .fetch_one(pool)
        .await?;
    let dead_letters_unresolved = deadletter::unresolved_count(pool).await?;
    let platforms = platform_failure_rates(pool).await?;

    Ok(MetricsResponse {
        raw_events_by_status,
        meetings_by_status,
        failures_by_status,
        dead_letters_total,
        dead_letters_unresolved,
        platforms,
    })
}

/// Rolling 24h failure rate per platform:
/// failed / (processed + failed), 0.0 on an empty window.
pub async fn platform_failure_rates(
    pool: &SqlitePool,
) -> Result<Vec<PlatformFailureRate>, StoreError> {
    let since = format_utc(Utc::now() - Duration::hours(24));

    let rows: Vec<RateRow> = sqlx::query_as(
        r#"
        SELECT platform, status, COUNT(*) AS count
        FROM raw_events
        WHERE received_at >= ?
          AND status IN ('processed', 'failed')
        GROUP BY platform, status
        "#,
    )
    .bind(&since)
    .fetch_all(pool)
    .await?;

    let mut rates = Vec::with_capacity(3);
    for platform in Platform::all() {
        let processed = rows
            .iter()
            .find(|row| row.platform == platform.as_str() && row.status == "processed")
            .map_or(0, |row| row.count);
        let failed = rows
            .iter()
            .find(|row| row.platform == platform.as_str() && row.status == "failed")
            .map_or(0, |row| row.count);
        let total = processed + failed;
        let failure_rate = if total == 0 {
            0.0
        } else {
            failed as f64 / total as f64
        };

        rates.push(PlatformFailureRate {
            platform,
            processed_24h: processed,
            failed_24h: failed,
            failure_rate,
        });
    }

    Ok(rates)
}

async fn pending_retry_count(pool: &SqlitePool) -> Result<i64, StoreError> {
    let count: i64 = sqlx::query_scalar(
        "SELECT COUNT(*) FROM webhook_failures WHERE status IN ('pending', 'retrying')",
    )
    .fetch_one(pool)
    .await?;
    Ok(count)
}

async fn count_by_status(
    pool: &SqlitePool,
    table: &str,
) -> Result<BTreeMap<String, i64>, StoreError> {
    // Table name comes from a fixed call-site list, never user input.
    let rows: Vec<StatusCountRow> =
        sqlx::query_as(&format!("SELECT status, COUNT(*) AS count FROM {table} GROUP BY status"))
            .fetch_all(pool)
            .await?;

    Ok(rows
        .into_iter()
        .map(|row| (row.status, row.count))
        .collect())
}

/// Threshold classification:
/// critical: any unresolved dead letter, or failure rate > 25% anywhere;
/// degraded: failure rate > 10% anywhere, or pending retries;
/// healthy: otherwise.
pub fn classify(
    unresolved_dead_letters: i64,
    pending_retries: i64,
    platforms: &[PlatformFailureRate],
) -> HealthStatus {
    let worst_rate = platforms
        .iter()
        .map(|rate| rate.failure_rate)
        .fold(0.0_f64, f64::max);

    if unresolved_dead_letters > 0 || worst_rate > 0.25 {
        HealthStatus::Critical
    } else if worst_rate > 0.10 || pending_retries > 0 {
        HealthStatus::Degraded
    } else {
        HealthStatus::Healthy
    }
}

#[derive(sqlx::FromRow)]
struct RateRow {
    platform: String,
    status: String,
    count: i64,
}

#[derive(sqlx::FromRow)]
struct StatusCountRow {
    status: String,
    count: i64,
}

fn format_utc(dt: chrono::DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Secs, true)
}
