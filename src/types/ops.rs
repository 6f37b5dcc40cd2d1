use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use uuid::Uuid;

use super::{DeadLetterEntry, Platform};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebhookAck {
    pub status: String,
    pub raw_event_id: Option<Uuid>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ReprocessAction {
    /// A stored transcript existed; only draft generation was re-run.
    DraftRegenerated,
    /// The original raw event was reset and the full processor re-ran.
    Reprocessing,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReprocessResponse {
    pub action: ReprocessAction,
    pub meeting_id: Uuid,
    pub draft_id: Option<String>,
}

/// Outcome of one retry scheduler sweep.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SweepSummary {
    pub examined: u64,
    pub succeeded: u64,
    pub rescheduled: u64,
    pub dead_lettered: u64,
    /// Abandoned `processing` claims returned to the queue this tick.
    pub requeued: u64,
    /// Due failures whose raw event is currently claimed elsewhere; they
    /// stay due for the next tick.
    pub stalled: u64,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum HealthStatus {
    Healthy,
    Degraded,
    Critical,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlatformFailureRate {
    pub platform: Platform,
    pub processed_24h: i64,
    pub failed_24h: i64,
    /// failed / (processed + failed) over a rolling 24h window; 0.0 when
    /// the window is empty.
    pub failure_rate: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: HealthStatus,
    pub unresolved_dead_letters: i64,
    pub pending_retries: i64,
    pub platforms: Vec<PlatformFailureRate>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsResponse {
    pub raw_events_by_status: BTreeMap<String, i64>,
    pub meetings_by_status: BTreeMap<String, i64>,
    pub failures_by_status: BTreeMap<String, i64>,
    pub dead_letters_total: i64,
    pub dead_letters_unresolved: i64,
    pub platforms: Vec<PlatformFailureRate>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ListDeadLettersResponse {
    pub entries: Vec<DeadLetterEntry>,
    pub next_before: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ResolveDeadLetterRequest {
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResolveDeadLetterResponse {
    pub entry: DeadLetterEntry,
}
