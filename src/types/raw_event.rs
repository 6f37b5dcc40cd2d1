use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::Platform;

/// Durable record of one inbound webhook delivery. Written before any
/// processing is attempted; mutated only by the processing boundary.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawEvent {
    pub id: Uuid,
    pub platform: Platform,
    pub event_type: String,
    pub payload: String,
    pub external_meeting_id: Option<String>,

    pub status: RawEventStatus,

    pub received_at: String,
    pub processed_at: Option<String>,
    pub error_message: Option<String>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum RawEventStatus {
    Received,
    Processing,
    Processed,
    Failed,
}

impl RawEventStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            RawEventStatus::Received => "received",
            RawEventStatus::Processing => "processing",
            RawEventStatus::Processed => "processed",
            RawEventStatus::Failed => "failed",
        }
    }

    pub fn parse(value: &str) -> Option<RawEventStatus> {
        match value {
            "received" => Some(RawEventStatus::Received),
            "processing" => Some(RawEventStatus::Processing),
            "processed" => Some(RawEventStatus::Processed),
            "failed" => Some(RawEventStatus::Failed),
            _ => None,
        }
    }
}
