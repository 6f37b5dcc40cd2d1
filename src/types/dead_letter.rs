use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::{FailureAttempt, Platform};

/// Terminal record for a failure that exhausted its retries. Created exactly
/// once per webhook failure, in the same transaction that marks the failure
/// exhausted. `resolved` is only ever set by operator action.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeadLetterEntry {
    pub id: Uuid,
    pub failure_id: Uuid,
    pub platform: Platform,
    pub event_type: String,
    pub payload: String,
    pub last_error: String,
    pub total_attempts: i64,
    pub failure_history: Vec<FailureAttempt>,

    pub alert_sent: bool,
    pub resolved: bool,
    pub resolution_notes: Option<String>,

    pub created_at: String,
    pub resolved_at: Option<String>,
}
