use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::Platform;

/// Textual content for a meeting. At most one authoritative transcript per
/// meeting; a re-fetch overwrites the existing row.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Transcript {
    pub id: Uuid,
    pub meeting_id: Uuid,
    pub source_format: TranscriptFormat,
    pub full_text: String,
    pub segments: Vec<TranscriptSegment>,
    pub word_count: i64,
    pub status: TranscriptStatus,
    pub source_platform: Platform,
    pub created_at: String,
    pub updated_at: String,
}

/// One speaker turn, offsets in seconds from the start of the meeting.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TranscriptSegment {
    pub speaker: Option<String>,
    pub text: String,
    pub start_offset: f64,
    pub end_offset: f64,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum TranscriptFormat {
    PlainText,
    Vtt,
}

impl TranscriptFormat {
    pub fn as_str(self) -> &'static str {
        match self {
            TranscriptFormat::PlainText => "plain_text",
            TranscriptFormat::Vtt => "vtt",
        }
    }

    pub fn parse(value: &str) -> Option<TranscriptFormat> {
        match value {
            "plain_text" => Some(TranscriptFormat::PlainText),
            "vtt" => Some(TranscriptFormat::Vtt),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum TranscriptStatus {
    Ready,
    Stale,
}

impl TranscriptStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            TranscriptStatus::Ready => "ready",
            TranscriptStatus::Stale => "stale",
        }
    }

    pub fn parse(value: &str) -> Option<TranscriptStatus> {
        match value {
            "ready" => Some(TranscriptStatus::Ready),
            "stale" => Some(TranscriptStatus::Stale),
            _ => None,
        }
    }
}
