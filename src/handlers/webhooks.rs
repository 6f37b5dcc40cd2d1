//! Webhook ingestion endpoints.
//!
//! The external platform always gets a fast 2xx for application-level
//! failures: the raw event is persisted first, one best-effort synchronous
//! processing attempt runs, and anything that goes wrong after persistence
//! is the retry scheduler's problem, never the platform's. Non-2xx is
//! reserved for delivery-level defects where no raw event can be recorded
//! at all.

use axum::{
    Json,
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode, header},
    response::{IntoResponse, Response},
};
use serde::Deserialize;
use serde_json::{Value, json};
use tracing::{info, warn};

use crate::error::ApiError;
use crate::ingest;
use crate::processors::{process_raw_event, teams};
use crate::state::AppState;
use crate::types::{Platform, WebhookAck};

#[derive(Debug, Deserialize, Default)]
pub struct WebhookQuery {
    #[serde(rename = "validationToken")]
    validation_token: Option<String>,
}

pub async fn receive_webhook(
    State(state): State<AppState>,
    Path(platform): Path<String>,
    Query(query): Query<WebhookQuery>,
    headers: HeaderMap,
    body: String,
) -> Result<Response, ApiError> {
    let platform = parse_platform(&platform)?;

    // Subscription-validation handshake: echo the token verbatim as plain
    // text before any event processing.
    if let Some(token) = query.validation_token {
        return Ok(plain_text(token));
    }
    if let Ok(value) = serde_json::from_str::<Value>(&body) {
        if let Some(token) = value.get("validationToken").and_then(Value::as_str) {
            return Ok(plain_text(token.to_string()));
        }
    }

    let (event_type, payload, external_meeting_id, parse_error) = match platform {
        Platform::GoogleMeet => extract_calendar_delivery(&headers)?,
        _ => extract_json_delivery(platform, &body),
    };

    let raw_event = ingest::insert_raw_event(
        &state.pool,
        platform,
        &event_type,
        &payload,
        external_meeting_id.as_deref(),
        parse_error.as_deref(),
    )
    .await
    .map_err(map_ingest_error)?;

    info!(
        platform = %platform,
        event_type = %event_type,
        raw_event_id = %raw_event.id,
        "webhook delivery recorded"
    );

    // Best-effort first attempt; failures are already tracked for retry by
    // the processing boundary and must not reach the platform.
    if parse_error.is_none() {
        if let Err(err) = process_raw_event(&state, raw_event.id, false).await {
            warn!(raw_event_id = %raw_event.id, "synchronous attempt failed: {err}");
        }
    }

    Ok((
        StatusCode::ACCEPTED,
        Json(WebhookAck {
            status: "accepted".to_string(),
            raw_event_id: Some(raw_event.id),
        }),
    )
        .into_response())
}

/// Calendar-style platforms poll this for liveness; it also answers the
/// validation handshake when the token arrives on a GET.
pub async fn webhook_probe(
    Path(platform): Path<String>,
    Query(query): Query<WebhookQuery>,
) -> Result<Response, ApiError> {
    let platform = parse_platform(&platform)?;

    if let Some(token) = query.validation_token {
        return Ok(plain_text(token));
    }

    Ok(Json(json!({ "status": "ok", "platform": platform.as_str() })).into_response())
}

fn parse_platform(raw: &str) -> Result<Platform, ApiError> {
    Platform::parse(raw).ok_or_else(|| ApiError::NotFound(format!("unknown platform: {raw}")))
}

fn plain_text(token: String) -> Response {
    (
        StatusCode::OK,
        [(header::CONTENT_TYPE, "text/plain")],
        token,
    )
        .into_response()
}

/// Calendar push notifications carry everything in headers; the body is
/// empty. A delivery without its channel id is malformed transport and gets
/// a 400 with no raw event.
fn extract_calendar_delivery(
    headers: &HeaderMap,
) -> Result<(String, String, Option<String>, Option<String>), ApiError> {
    let channel_id = header_value(headers, "x-goog-channel-id").ok_or_else(|| {
        ApiError::BadRequest("missing X-Goog-Channel-ID header".to_string())
    })?;

    let resource_state =
        header_value(headers, "x-goog-resource-state").unwrap_or_else(|| "push".to_string());
    let payload = json!({
        "channel_id": channel_id,
        "resource_id": header_value(headers, "x-goog-resource-id"),
        "resource_state": resource_state,
        "channel_token": header_value(headers, "x-goog-channel-token"),
        "message_number": header_value(headers, "x-goog-message-number"),
    });

    Ok((
        format!("calendar.{resource_state}"),
        payload.to_string(),
        None,
        None,
    ))
}

fn extract_json_delivery(
    platform: Platform,
    body: &str,
) -> (String, String, Option<String>, Option<String>) {
    let value: Value = match serde_json::from_str(body) {
        Ok(value) => value,
        Err(err) => {
            // Acknowledge anyway; the raw event is stored failed with the
            // parse error so nothing is silently dropped.
            return (
                "unknown".to_string(),
                body.to_string(),
                None,
                Some(format!("unparseable payload: {err}")),
            );
        }
    };

    match platform {
        Platform::Zoom => {
            let event_type = value
                .get("event")
                .and_then(Value::as_str)
                .unwrap_or("unknown")
                .to_string();
            let external_id = value
                .pointer("/payload/object/id")
                .map(json_id)
                .filter(|id| !id.is_empty());
            (event_type, body.to_string(), external_id, None)
        }
        Platform::MicrosoftTeams => {
            let change_type = value
                .pointer("/value/0/changeType")
                .and_then(Value::as_str)
                .unwrap_or("notification");
            let event_type = format!("teams.transcript.{change_type}");

            let external_id = value
                .pointer("/value/0/resource")
                .and_then(Value::as_str)
                .and_then(teams::parse_resource)
                .map(|resource| {
                    let tenant = value
                        .pointer("/value/0/tenantId")
                        .and_then(Value::as_str)
                        .unwrap_or("unknown");
                    format!("teams-{tenant}-{}", resource.meeting_id)
                });
            (event_type, body.to_string(), external_id, None)
        }
        Platform::GoogleMeet => ("calendar.push".to_string(), body.to_string(), None, None),
    }
}

fn header_value(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get(name)
        .and_then(|value| value.to_str().ok())
        .map(str::to_string)
}

fn json_id(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn map_ingest_error(err: ingest::StoreError) -> ApiError {
    match err {
        ingest::StoreError::Db(db) => ApiError::Db(db),
        ingest::StoreError::NotFound(message) => ApiError::NotFound(message),
        ingest::StoreError::Parse(message) => ApiError::Internal(message),
    }
}
