use axum::{
    Json,
    extract::{Path, Query, State},
};
use base64::{Engine as _, engine::general_purpose::URL_SAFE_NO_PAD};
use chrono::DateTime;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
    deadletter::{self, DeadLetterCursor, ListDeadLettersParams},
    error::ApiError,
    health,
    retry,
    state::AppState,
    types::{
        HealthResponse, ListDeadLettersResponse, MetricsResponse, ResolveDeadLetterRequest,
        ResolveDeadLetterResponse, SweepSummary,
    },
};

#[derive(Debug, Deserialize)]
pub struct ListDeadLettersQuery {
    limit: Option<i64>,
    before: Option<String>,
    unresolved: Option<bool>,
}

#[derive(Debug, Serialize, Deserialize)]
struct CursorPayload {
    created_at: String,
    id: String,
}

pub async fn health_handler(
    State(state): State<AppState>,
) -> Result<Json<HealthResponse>, ApiError> {
    let response = health::health(&state.pool)
        .await
        .map_err(map_health_error)?;
    Ok(Json(response))
}

pub async fn metrics_handler(
    State(state): State<AppState>,
) -> Result<Json<MetricsResponse>, ApiError> {
    let response = health::metrics(&state.pool)
        .await
        .map_err(map_health_error)?;
    Ok(Json(response))
}

pub async fn sweep_handler(
    State(state): State<AppState>,
) -> Result<Json<SweepSummary>, ApiError> {
    let summary = retry::sweep(&state).await.map_err(map_retry_error)?;
    Ok(Json(summary))
}

pub async fn list_dead_letters_handler(
    State(state): State<AppState>,
    Query(query): Query<ListDeadLettersQuery>,
) -> Result<Json<ListDeadLettersResponse>, ApiError> {
    let limit = parse_limit(query.limit)?;
    let before = match query.before {
        Some(raw) => Some(decode_cursor(&raw)?),
        None => None,
    };

    let params = ListDeadLettersParams {
        limit,
        before,
        unresolved_only: query.unresolved.unwrap_or(false),
    };

    let result = deadletter::list_entries(&state.pool, &params)
        .await
        .map_err(map_dead_letter_error)?;
    let next_before = match result.next_before {
        Some(cursor) => Some(encode_cursor(&cursor)?),
        None => None,
    };

    Ok(Json(ListDeadLettersResponse {
        entries: result.entries,
        next_before,
    }))
}

pub async fn resolve_dead_letter_handler(
    State(state): State<AppState>,
    Path(entry_id): Path<String>,
    Json(req): Json<ResolveDeadLetterRequest>,
) -> Result<Json<ResolveDeadLetterResponse>, ApiError> {
    let entry_id = parse_uuid("entry_id", &entry_id)?;
    let entry = deadletter::resolve_entry(&state.pool, entry_id, req.notes.as_deref())
        .await
        .map_err(map_dead_letter_error)?;
    Ok(Json(ResolveDeadLetterResponse { entry }))
}

fn parse_limit(limit: Option<i64>) -> Result<i64, ApiError> {
    let limit = limit.unwrap_or(50);
    if !(1..=200).contains(&limit) {
        return Err(ApiError::BadRequest(
            "limit must be between 1 and 200".to_string(),
        ));
    }
    Ok(limit)
}

fn parse_uuid(field: &str, value: &str) -> Result<Uuid, ApiError> {
    Uuid::parse_str(value).map_err(|_| ApiError::BadRequest(format!("{field} must be a UUID")))
}

fn decode_cursor(raw: &str) -> Result<DeadLetterCursor, ApiError> {
    let decoded = URL_SAFE_NO_PAD
        .decode(raw)
        .map_err(|_| ApiError::BadRequest("before must be a valid cursor".to_string()))?;
    let payload: CursorPayload = serde_json::from_slice(&decoded)
        .map_err(|_| ApiError::BadRequest("before must be a valid cursor".to_string()))?;
    DateTime::parse_from_rfc3339(&payload.created_at)
        .map_err(|_| ApiError::BadRequest("before must be a valid cursor".to_string()))?;
    let id = Uuid::parse_str(&payload.id)
        .map_err(|_| ApiError::BadRequest("before must be a valid cursor".to_string()))?;
    Ok(DeadLetterCursor {
        created_at: payload.created_at,
        id,
    })
}

fn encode_cursor(cursor: &DeadLetterCursor) -> Result<String, ApiError> {
    let payload = CursorPayload {
        created_at: cursor.created_at.clone(),
        id: cursor.id.to_string(),
    };
    let encoded = serde_json::to_vec(&payload)
        .map_err(|_| ApiError::Internal("failed to encode cursor".to_string()))?;
    Ok(URL_SAFE_NO_PAD.encode(encoded))
}

fn map_health_error(err: health::StoreError) -> ApiError {
    match err {
        health::StoreError::Db(db) => ApiError::Db(db),
    }
}

fn map_retry_error(err: retry::StoreError) -> ApiError {
    match err {
        retry::StoreError::Db(db) => ApiError::Db(db),
        retry::StoreError::NotFound(message) => ApiError::NotFound(message),
        retry::StoreError::Parse(message) => ApiError::Internal(message),
    }
}

fn map_dead_letter_error(err: deadletter::StoreError) -> ApiError {
    match err {
        deadletter::StoreError::Db(db) => ApiError::Db(db),
        deadletter::StoreError::NotFound(message) => ApiError::NotFound(message),
        deadletter::StoreError::Conflict(message) => ApiError::Conflict(message),
        deadletter::StoreError::Parse(message) => ApiError::Internal(message),
    }
}
