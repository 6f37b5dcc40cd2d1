//! Outbound collaborators: OAuth token acquisition, platform transcript
//! APIs, and the draft-generation service. All dependencies are injected as
//! trait objects so processors never hardcode a concrete client.

use async_trait::async_trait;
use thiserror::Error;

use crate::types::{Meeting, Platform, Transcript};

mod http;

pub use http::{HttpDraftGenerator, HttpTokenProvider, HttpTranscriptSource};

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("request timed out: {0}")]
    Timeout(String),
    #[error("network error: {0}")]
    Network(String),
    #[error("token unavailable: {0}")]
    Token(String),
    #[error("rate limited: {0}")]
    RateLimited(String),
    #[error("resource gone: {0}")]
    Gone(String),
    #[error("unexpected response: {0}")]
    UnexpectedResponse(String),
}

impl ClientError {
    /// Whether the scheduler should retry after this error. A platform
    /// signaling the resource no longer exists, or replying with a shape we
    /// cannot interpret, will not improve on retry.
    pub fn retryable(&self) -> bool {
        match self {
            ClientError::Timeout(_)
            | ClientError::Network(_)
            | ClientError::Token(_)
            | ClientError::RateLimited(_) => true,
            ClientError::Gone(_) | ClientError::UnexpectedResponse(_) => false,
        }
    }
}

/// Returns a currently-valid OAuth access token for a user's platform
/// connection. Failures are always retryable from the processor's
/// perspective.
#[async_trait]
pub trait TokenProvider: Send + Sync {
    async fn access_token(&self, platform: Platform, user_id: &str)
    -> Result<String, ClientError>;
}

/// Content-generation black box: takes a meeting plus its transcript and
/// returns an opaque draft identifier.
#[async_trait]
pub trait DraftGenerator: Send + Sync {
    async fn generate_draft(
        &self,
        meeting: &Meeting,
        transcript: &Transcript,
    ) -> Result<String, ClientError>;
}

#[derive(Debug, Clone)]
pub struct CalendarEvent {
    pub id: String,
    pub summary: Option<String>,
    pub organizer_email: Option<String>,
    pub start: Option<String>,
    pub end: Option<String>,
    pub has_conference: bool,
}

#[derive(Debug, Clone)]
pub struct CalendarSync {
    pub events: Vec<CalendarEvent>,
    pub next_sync_token: Option<String>,
}

/// Platform transcript/calendar APIs, one method per platform-specific
/// acquisition path.
#[async_trait]
pub trait TranscriptSource: Send + Sync {
    /// Zoom: the recording payload carries a direct download URL.
    async fn download_zoom_transcript(
        &self,
        download_url: &str,
        token: &str,
    ) -> Result<String, ClientError>;

    /// Teams: Graph transcript-content endpoint, WebVTT body.
    async fn fetch_teams_transcript(
        &self,
        user_id: &str,
        meeting_id: &str,
        transcript_id: &str,
        token: &str,
    ) -> Result<String, ClientError>;

    /// Meet: incremental Calendar events sync. There is no transcript push;
    /// the processor filters for just-ended conference events.
    async fn list_calendar_events(
        &self,
        sync_token: Option<&str>,
        token: &str,
    ) -> Result<CalendarSync, ClientError>;
}
