use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::Platform;

/// One row per real-world meeting instance, unique per
/// (platform, external_meeting_id).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Meeting {
    pub id: Uuid,
    pub platform: Platform,
    pub external_meeting_id: String,
    pub topic: Option<String>,
    pub host_identifier: Option<String>,
    pub started_at: Option<String>,
    pub duration_minutes: Option<i64>,

    pub status: MeetingStatus,
    /// Sub-state for progress display while `status` is `processing`,
    /// e.g. "fetching_transcript" or "generating_draft".
    pub processing_step: Option<String>,
    pub processing_error: Option<String>,

    pub draft_id: Option<String>,
    pub drafted_at: Option<String>,

    pub created_at: String,
    pub updated_at: String,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum MeetingStatus {
    Pending,
    Processing,
    Ready,
    Failed,
}

impl MeetingStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            MeetingStatus::Pending => "pending",
            MeetingStatus::Processing => "processing",
            MeetingStatus::Ready => "ready",
            MeetingStatus::Failed => "failed",
        }
    }

    pub fn parse(value: &str) -> Option<MeetingStatus> {
        match value {
            "pending" => Some(MeetingStatus::Pending),
            "processing" => Some(MeetingStatus::Processing),
            "ready" => Some(MeetingStatus::Ready),
            "failed" => Some(MeetingStatus::Failed),
            _ => None,
        }
    }
}
