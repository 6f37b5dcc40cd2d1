use std::time::Duration;

use async_trait::async_trait;
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};

use crate::types::{Meeting, Platform, Transcript};

use super::{
    CalendarEvent, CalendarSync, ClientError, DraftGenerator, TokenProvider, TranscriptSource,
};

fn map_reqwest(err: reqwest::Error) -> ClientError {
    if err.is_timeout() {
        ClientError::Timeout(err.to_string())
    } else {
        ClientError::Network(err.to_string())
    }
}

fn map_status(status: StatusCode, context: &str) -> ClientError {
    if status == StatusCode::TOO_MANY_REQUESTS {
        ClientError::RateLimited(format!("{context}: {status}"))
    } else if status == StatusCode::NOT_FOUND || status == StatusCode::GONE {
        ClientError::Gone(format!("{context}: {status}"))
    } else if status.is_server_error() {
        ClientError::Network(format!("{context}: {status}"))
    } else {
        ClientError::UnexpectedResponse(format!("{context}: {status}"))
    }
}

/// Token service client. The credential/token provider is an external
/// collaborator; this implementation asks it over HTTP for a fresh access
/// token per platform connection.
pub struct HttpTokenProvider {
    http: reqwest::Client,
    base_url: String,
}

impl HttpTokenProvider {
    pub fn new(base_url: String, timeout_secs: u64) -> Result<Self, ClientError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()
            .map_err(map_reqwest)?;
        Ok(Self { http, base_url })
    }
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
}

#[async_trait]
impl TokenProvider for HttpTokenProvider {
    async fn access_token(
        &self,
        platform: Platform,
        user_id: &str,
    ) -> Result<String, ClientError> {
        let url = format!("{}/tokens/{}/{}", self.base_url, platform.as_str(), user_id);
        let response = self.http.get(&url).send().await.map_err(map_reqwest)?;
        if !response.status().is_success() {
            return Err(ClientError::Token(format!(
                "token service returned {} for {platform}/{user_id}",
                response.status()
            )));
        }
        let body: TokenResponse = response
            .json()
            .await
            .map_err(|err| ClientError::Token(format!("invalid token response: {err}")))?;
        Ok(body.access_token)
    }
}

/// Draft-generation service client. Posts meeting context plus transcript
/// text and gets back an opaque draft id.
pub struct HttpDraftGenerator {
    http: reqwest::Client,
    base_url: String,
}

impl HttpDraftGenerator {
    pub fn new(base_url: String, timeout_secs: u64) -> Result<Self, ClientError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()
            .map_err(map_reqwest)?;
        Ok(Self { http, base_url })
    }
}

#[derive(Serialize)]
struct DraftRequest<'a> {
    platform: Platform,
    external_meeting_id: &'a str,
    topic: Option<&'a str>,
    host_identifier: Option<&'a str>,
    transcript_text: &'a str,
}

#[derive(Deserialize)]
struct DraftResponse {
    draft_id: String,
}

#[async_trait]
impl DraftGenerator for HttpDraftGenerator {
    async fn generate_draft(
        &self,
        meeting: &Meeting,
        transcript: &Transcript,
    ) -> Result<String, ClientError> {
        let url = format!("{}/drafts", self.base_url);
        let request = DraftRequest {
            platform: meeting.platform,
            external_meeting_id: &meeting.external_meeting_id,
            topic: meeting.topic.as_deref(),
            host_identifier: meeting.host_identifier.as_deref(),
            transcript_text: &transcript.full_text,
        };

        let response = self
            .http
            .post(&url)
            .json(&request)
            .send()
            .await
            .map_err(map_reqwest)?;
        let status = response.status();
        if !status.is_success() {
            return Err(map_status(status, "draft generation"));
        }
        let body: DraftResponse = response
            .json()
            .await
            .map_err(|err| ClientError::UnexpectedResponse(format!("draft response: {err}")))?;
        Ok(body.draft_id)
    }
}

/// Platform transcript APIs over plain HTTP.
pub struct HttpTranscriptSource {
    http: reqwest::Client,
    graph_base_url: String,
    calendar_base_url: String,
}

impl HttpTranscriptSource {
    pub fn new(timeout_secs: u64) -> Result<Self, ClientError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()
            .map_err(map_reqwest)?;
        Ok(Self {
            http,
            graph_base_url: "https://graph.microsoft.com/v1.0".to_string(),
            calendar_base_url: "https://www.googleapis.com/calendar/v3".to_string(),
        })
    }

    pub fn with_base_urls(mut self, graph: String, calendar: String) -> Self {
        self.graph_base_url = graph;
        self.calendar_base_url = calendar;
        self
    }
}

#[derive(Deserialize)]
struct CalendarListResponse {
    #[serde(default)]
    items: Vec<CalendarItem>,
    #[serde(rename = "nextSyncToken")]
    next_sync_token: Option<String>,
}

#[derive(Deserialize)]
struct CalendarItem {
    id: String,
    summary: Option<String>,
    organizer: Option<CalendarOrganizer>,
    start: Option<CalendarTime>,
    end: Option<CalendarTime>,
    #[serde(rename = "conferenceData")]
    conference_data: Option<serde_json::Value>,
}

#[derive(Deserialize)]
struct CalendarOrganizer {
    email: Option<String>,
}

#[derive(Deserialize)]
struct CalendarTime {
    #[serde(rename = "dateTime")]
    date_time: Option<String>,
}

#[async_trait]
impl TranscriptSource for HttpTranscriptSource {
    async fn download_zoom_transcript(
        &self,
        download_url: &str,
        token: &str,
    ) -> Result<String, ClientError> {
        let response = self
            .http
            .get(download_url)
            .bearer_auth(token)
            .send()
            .await
            .map_err(map_reqwest)?;
        let status = response.status();
        if !status.is_success() {
            return Err(map_status(status, "zoom transcript download"));
        }
        response.text().await.map_err(map_reqwest)
    }

    async fn fetch_teams_transcript(
        &self,
        user_id: &str,
        meeting_id: &str,
        transcript_id: &str,
        token: &str,
    ) -> Result<String, ClientError> {
        let url = format!(
            "{}/users/{user_id}/onlineMeetings/{meeting_id}/transcripts/{transcript_id}/content?$format=text/vtt",
            self.graph_base_url
        );
        let response = self
            .http
            .get(&url)
            .bearer_auth(token)
            .send()
            .await
            .map_err(map_reqwest)?;
        let status = response.status();
        if !status.is_success() {
            return Err(map_status(status, "teams transcript content"));
        }
        response.text().await.map_err(map_reqwest)
    }

    async fn list_calendar_events(
        &self,
        sync_token: Option<&str>,
        token: &str,
    ) -> Result<CalendarSync, ClientError> {
        let mut request = self
            .http
            .get(format!(
                "{}/calendars/primary/events",
                self.calendar_base_url
            ))
            .bearer_auth(token);
        if let Some(sync_token) = sync_token {
            request = request.query(&[("syncToken", sync_token)]);
        }

        let response = request.send().await.map_err(map_reqwest)?;
        let status = response.status();
        if !status.is_success() {
            return Err(map_status(status, "calendar events sync"));
        }

        let body: CalendarListResponse = response
            .json()
            .await
            .map_err(|err| ClientError::UnexpectedResponse(format!("calendar response: {err}")))?;

        let events = body
            .items
            .into_iter()
            .map(|item| CalendarEvent {
                id: item.id,
                summary: item.summary,
                organizer_email: item.organizer.and_then(|o| o.email),
                start: item.start.and_then(|t| t.date_time),
                end: item.end.and_then(|t| t.date_time),
                has_conference: item.conference_data.is_some(),
            })
            .collect();

        Ok(CalendarSync {
            events,
            next_sync_token: body.next_sync_token,
        })
    }
}
