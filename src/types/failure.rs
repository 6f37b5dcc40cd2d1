use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::Platform;

/// Retry-tracking record for a failed webhook processing attempt.
///
/// `failure_key` is derived from platform + event type + a content-derived
/// resource id, never from the raw event's own primary key, so duplicate
/// deliveries of the same logical event collapse onto one retry record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebhookFailure {
    pub id: Uuid,
    pub failure_key: String,
    /// Most recent raw event carrying this payload; the scheduler re-enters
    /// processing through it.
    pub raw_event_id: Option<Uuid>,
    pub platform: Platform,
    pub event_type: String,
    pub payload: String,
    pub last_error: String,

    pub attempts: i64,
    pub max_attempts: i64,
    /// None once the failure is exhausted.
    pub next_retry_at: Option<String>,
    pub last_attempt_at: String,
    pub status: WebhookFailureStatus,
    pub history: Vec<FailureAttempt>,

    pub created_at: String,
}

/// One entry of the ordered failure history.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FailureAttempt {
    pub attempt: i64,
    pub timestamp: String,
    pub error: String,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum WebhookFailureStatus {
    Pending,
    Retrying,
    Exhausted,
}

impl WebhookFailureStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            WebhookFailureStatus::Pending => "pending",
            WebhookFailureStatus::Retrying => "retrying",
            WebhookFailureStatus::Exhausted => "exhausted",
        }
    }

    pub fn parse(value: &str) -> Option<WebhookFailureStatus> {
        match value {
            "pending" => Some(WebhookFailureStatus::Pending),
            "retrying" => Some(WebhookFailureStatus::Retrying),
            "exhausted" => Some(WebhookFailureStatus::Exhausted),
            _ => None,
        }
    }
}
