#![allow(clippy::expect_used, clippy::unwrap_used)]

use std::fs;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use recap::{
    clients::{
        CalendarSync, ClientError, DraftGenerator, TokenProvider, TranscriptSource,
    },
    config::AppConfig,
    ingest, meetings,
    processors::{ProcessOutcome, ProcessingError, process_raw_event},
    retry,
    state::{AppState, Clients},
    types::{
        Meeting, MeetingStatus, Platform, RawEventStatus, Transcript, TranscriptFormat,
        WebhookFailureStatus,
    },
};
use sqlx::{
    Connection, SqliteConnection, SqlitePool,
    sqlite::{SqliteConnectOptions, SqlitePoolOptions},
};
use tempfile::NamedTempFile;

struct TestDb {
    pool: SqlitePool,
    _db_file: NamedTempFile,
}

async fn setup_db() -> TestDb {
    let db_file = NamedTempFile::new().expect("create temp sqlite file");
    let options = SqliteConnectOptions::new()
        .filename(db_file.path())
        .create_if_missing(true)
        .busy_timeout(std::time::Duration::from_millis(500));

    let mut conn = SqliteConnection::connect_with(&options)
        .await
        .expect("connect sqlite for migrations");
    sqlx::query("PRAGMA foreign_keys = ON;")
        .execute(&mut conn)
        .await
        .expect("enable foreign keys");
    run_migrations(&mut conn).await.expect("run migrations");
    conn.close().await.expect("close migration conn");

    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .after_connect(|conn, _| {
            Box::pin(async move {
                sqlx::query("PRAGMA foreign_keys = ON;")
                    .execute(conn)
                    .await?;
                Ok(())
            })
        })
        .connect_with(options)
        .await
        .expect("connect sqlite");

    TestDb {
        pool,
        _db_file: db_file,
    }
}

async fn run_migrations(conn: &mut SqliteConnection) -> Result<(), sqlx::Error> {
    let mut entries: Vec<_> = fs::read_dir("migrations")
        .map_err(sqlx::Error::Io)?
        .filter_map(|e| e.ok())
        .filter(|e| e.path().extension().and_then(|ext| ext.to_str()) == Some("sql"))
        .collect();
    entries.sort_by_key(|e| e.file_name());

    for entry in entries {
        let contents = fs::read_to_string(entry.path()).map_err(sqlx::Error::Io)?;
        for stmt in contents.split(';') {
            let stmt = stmt.trim();
            if !stmt.is_empty() {
                sqlx::query(stmt).execute(&mut *conn).await?;
            }
        }
    }
    Ok(())
}

struct StaticTokens;

#[async_trait]
impl TokenProvider for StaticTokens {
    async fn access_token(
        &self,
        _platform: Platform,
        _user_id: &str,
    ) -> Result<String, ClientError> {
        Ok("test-token".to_string())
    }
}

struct CountingDrafts {
    calls: AtomicUsize,
    fail_first: usize,
}

impl CountingDrafts {
    fn new(fail_first: usize) -> Self {
        Self {
            calls: AtomicUsize::new(0),
            fail_first,
        }
    }
}

#[async_trait]
impl DraftGenerator for CountingDrafts {
    async fn generate_draft(
        &self,
        _meeting: &Meeting,
        _transcript: &Transcript,
    ) -> Result<String, ClientError> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        if call < self.fail_first {
            return Err(ClientError::Network("draft service unavailable".into()));
        }
        Ok(format!("draft-{}", call + 1))
    }
}

struct ScriptedTranscripts {
    body: String,
    calls: AtomicUsize,
    fail_first: usize,
}

impl ScriptedTranscripts {
    fn new(body: &str, fail_first: usize) -> Self {
        Self {
            body: body.to_string(),
            calls: AtomicUsize::new(0),
            fail_first,
        }
    }
}

#[async_trait]
impl TranscriptSource for ScriptedTranscripts {
    async fn download_zoom_transcript(
        &self,
        _download_url: &str,
        _token: &str,
    ) -> Result<String, ClientError> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        if call < self.fail_first {
            return Err(ClientError::Timeout("download timed out".into()));
        }
        Ok(self.body.clone())
    }

    async fn fetch_teams_transcript(
        &self,
        _user_id: &str,
        _meeting_id: &str,
        _transcript_id: &str,
        _token: &str,
    ) -> Result<String, ClientError> {
        Ok(self.body.clone())
    }

    async fn list_calendar_events(
        &self,
        _sync_token: Option<&str>,
        _token: &str,
    ) -> Result<CalendarSync, ClientError> {
        Ok(CalendarSync {
            events: Vec::new(),
            next_sync_token: None,
        })
    }
}

fn test_state(
    pool: SqlitePool,
    drafts: Arc<CountingDrafts>,
    transcripts: Arc<ScriptedTranscripts>,
) -> AppState {
    AppState {
        pool,
        config: AppConfig::default(),
        clients: Clients {
            tokens: Arc::new(StaticTokens),
            drafts,
            transcripts,
        },
    }
}

const SAMPLE_VTT: &str = "WEBVTT\n\n1\n00:00:00.000 --> 00:00:04.000\n<v Alice>Welcome everyone to the quarterly sync.\n\n2\n00:00:04.500 --> 00:00:09.000\n<v Bob>Thanks, let's get started.\n";

fn zoom_payload(meeting_id: &str) -> String {
    serde_json::json!({
        "event": "recording.completed",
        "payload": {
            "object": {
                "id": meeting_id,
                "uuid": format!("{meeting_id}-uuid=="),
                "topic": "Quarterly Sync",
                "host_id": "host-1",
                "start_time": "2026-08-29T10:00:00Z",
                "duration": 30,
                "recording_files": [
                    {"file_type": "MP4", "download_url": "https://zoom.example/video"},
                    {"file_type": "TRANSCRIPT", "download_url": "https://zoom.example/vtt"}
                ]
            }
        }
    })
    .to_string()
}

async fn insert_zoom_event(pool: &SqlitePool, meeting_id: &str) -> uuid::Uuid {
    let raw = ingest::insert_raw_event(
        pool,
        Platform::Zoom,
        "recording.completed",
        &zoom_payload(meeting_id),
        Some(meeting_id),
        None,
    )
    .await
    .expect("insert raw event");
    raw.id
}

#[tokio::test]
async fn full_pipeline_creates_meeting_transcript_and_draft() {
    let db = setup_db().await;
    let drafts = Arc::new(CountingDrafts::new(0));
    let transcripts = Arc::new(ScriptedTranscripts::new(SAMPLE_VTT, 0));
    let state = test_state(db.pool.clone(), drafts.clone(), transcripts.clone());

    let raw_id = insert_zoom_event(&db.pool, "zoom-77").await;
    let outcome = process_raw_event(&state, raw_id, false)
        .await
        .expect("process event");
    assert_eq!(outcome, ProcessOutcome::Created);

    let raw = ingest::get_raw_event(&db.pool, raw_id)
        .await
        .expect("reload raw event");
    assert_eq!(raw.status, RawEventStatus::Processed);
    assert!(raw.processed_at.is_some());

    let meeting = meetings::find_by_external_id(&db.pool, Platform::Zoom, "zoom-77")
        .await
        .expect("lookup meeting")
        .expect("meeting exists");
    assert_eq!(meeting.status, MeetingStatus::Ready);
    assert_eq!(meeting.topic.as_deref(), Some("Quarterly Sync"));
    assert_eq!(meeting.duration_minutes, Some(30));
    assert_eq!(meeting.draft_id.as_deref(), Some("draft-1"));
    assert!(meeting.drafted_at.is_some());

    let transcript = meetings::get_transcript(&db.pool, meeting.id)
        .await
        .expect("load transcript")
        .expect("transcript stored");
    assert_eq!(transcript.source_format, TranscriptFormat::Vtt);
    assert_eq!(transcript.segments.len(), 2);
    assert_eq!(transcript.segments[0].speaker.as_deref(), Some("Alice"));
    assert!(transcript.full_text.contains("quarterly sync"));
    assert!(transcript.word_count > 0);

    assert_eq!(drafts.calls.load(Ordering::SeqCst), 1);
    assert_eq!(transcripts.calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn redelivery_of_processed_event_is_idempotent() {
    let db = setup_db().await;
    let drafts = Arc::new(CountingDrafts::new(0));
    let transcripts = Arc::new(ScriptedTranscripts::new(SAMPLE_VTT, 0));
    let state = test_state(db.pool.clone(), drafts.clone(), transcripts.clone());

    let first = insert_zoom_event(&db.pool, "zoom-88").await;
    process_raw_event(&state, first, false)
        .await
        .expect("first delivery");

    // The platform redelivers the same logical event as a new raw event.
    let second = insert_zoom_event(&db.pool, "zoom-88").await;
    let outcome = process_raw_event(&state, second, false)
        .await
        .expect("second delivery");
    assert_eq!(outcome, ProcessOutcome::Skipped);

    let count: i64 = sqlx::query_scalar(
        "SELECT COUNT(*) FROM meetings WHERE platform = 'zoom' AND external_meeting_id = 'zoom-88'",
    )
    .fetch_one(&db.pool)
    .await
    .expect("count meetings");
    assert_eq!(count, 1);
    assert_eq!(drafts.calls.load(Ordering::SeqCst), 1);
    assert_eq!(transcripts.calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn replaying_the_same_raw_event_is_a_noop() {
    let db = setup_db().await;
    let drafts = Arc::new(CountingDrafts::new(0));
    let transcripts = Arc::new(ScriptedTranscripts::new(SAMPLE_VTT, 0));
    let state = test_state(db.pool.clone(), drafts.clone(), transcripts.clone());

    let raw_id = insert_zoom_event(&db.pool, "zoom-99").await;
    process_raw_event(&state, raw_id, false)
        .await
        .expect("first attempt");

    // Without the reprocess flag a processed event cannot be claimed again.
    let outcome = process_raw_event(&state, raw_id, false)
        .await
        .expect("replay");
    assert_eq!(outcome, ProcessOutcome::Skipped);
    assert_eq!(drafts.calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn transcript_without_cues_falls_back_to_plain_text() {
    let db = setup_db().await;
    let drafts = Arc::new(CountingDrafts::new(0));
    let transcripts = Arc::new(ScriptedTranscripts::new(
        "Just a plain text transcript with no cue structure at all.",
        0,
    ));
    let state = test_state(db.pool.clone(), drafts.clone(), transcripts.clone());

    let raw_id = insert_zoom_event(&db.pool, "zoom-plain").await;
    process_raw_event(&state, raw_id, false)
        .await
        .expect("process event");

    let meeting = meetings::find_by_external_id(&db.pool, Platform::Zoom, "zoom-plain")
        .await
        .expect("lookup meeting")
        .expect("meeting exists");
    let transcript = meetings::get_transcript(&db.pool, meeting.id)
        .await
        .expect("load transcript")
        .expect("transcript stored");
    assert_eq!(transcript.source_format, TranscriptFormat::PlainText);
    assert!(transcript.segments.is_empty());
    assert_eq!(transcript.word_count, 10);
}

#[tokio::test]
async fn irrelevant_event_type_is_skipped() {
    let db = setup_db().await;
    let drafts = Arc::new(CountingDrafts::new(0));
    let transcripts = Arc::new(ScriptedTranscripts::new(SAMPLE_VTT, 0));
    let state = test_state(db.pool.clone(), drafts.clone(), transcripts.clone());

    let raw = ingest::insert_raw_event(
        &db.pool,
        Platform::Zoom,
        "meeting.started",
        r#"{"event":"meeting.started","payload":{"object":{"id":"zoom-55"}}}"#,
        Some("zoom-55"),
        None,
    )
    .await
    .expect("insert raw event");

    let outcome = process_raw_event(&state, raw.id, false)
        .await
        .expect("process event");
    assert_eq!(outcome, ProcessOutcome::Skipped);

    let raw = ingest::get_raw_event(&db.pool, raw.id)
        .await
        .expect("reload raw event");
    assert_eq!(raw.status, RawEventStatus::Processed);
    assert!(
        meetings::find_by_external_id(&db.pool, Platform::Zoom, "zoom-55")
            .await
            .expect("lookup meeting")
            .is_none()
    );
}

#[tokio::test]
async fn transient_failure_marks_everything_and_records_retry() {
    let db = setup_db().await;
    let drafts = Arc::new(CountingDrafts::new(0));
    let transcripts = Arc::new(ScriptedTranscripts::new(SAMPLE_VTT, 10));
    let state = test_state(db.pool.clone(), drafts.clone(), transcripts.clone());

    let raw_id = insert_zoom_event(&db.pool, "zoom-down").await;
    let err = process_raw_event(&state, raw_id, false)
        .await
        .expect_err("download should fail");
    assert!(matches!(
        err,
        ProcessingError::Client(ClientError::Timeout(_))
    ));

    let raw = ingest::get_raw_event(&db.pool, raw_id)
        .await
        .expect("reload raw event");
    assert_eq!(raw.status, RawEventStatus::Failed);
    assert!(raw.error_message.is_some());

    let meeting = meetings::find_by_external_id(&db.pool, Platform::Zoom, "zoom-down")
        .await
        .expect("lookup meeting")
        .expect("meeting exists");
    assert_eq!(meeting.status, MeetingStatus::Failed);
    assert!(meeting.processing_error.is_some());

    let key = recap::processors::failure_key(
        Platform::Zoom,
        "recording.completed",
        &zoom_payload("zoom-down"),
    );
    let failure = retry::find_by_key(&db.pool, &key)
        .await
        .expect("load failure")
        .expect("failure recorded");
    assert_eq!(failure.attempts, 1);
    assert_eq!(failure.status, WebhookFailureStatus::Pending);
    assert_eq!(failure.raw_event_id, Some(raw_id));
    assert!(failure.next_retry_at.is_some());
    assert_eq!(failure.history.len(), 1);
}

#[tokio::test]
async fn draft_failure_after_ready_keeps_meeting_ready_and_retry_finishes_it() {
    let db = setup_db().await;
    let drafts = Arc::new(CountingDrafts::new(1));
    let transcripts = Arc::new(ScriptedTranscripts::new(SAMPLE_VTT, 0));
    let state = test_state(db.pool.clone(), drafts.clone(), transcripts.clone());

    let raw_id = insert_zoom_event(&db.pool, "zoom-draft").await;
    process_raw_event(&state, raw_id, false)
        .await
        .expect_err("draft generation should fail");

    // The transcript landed and the meeting was marked ready before the
    // draft call; the failure must not regress it.
    let meeting = meetings::find_by_external_id(&db.pool, Platform::Zoom, "zoom-draft")
        .await
        .expect("lookup meeting")
        .expect("meeting exists");
    assert_eq!(meeting.status, MeetingStatus::Ready);
    assert!(meeting.draft_id.is_none());

    // The retry attempt picks up at the draft step without re-downloading.
    let outcome = process_raw_event(&state, raw_id, true)
        .await
        .expect("retry attempt");
    assert_eq!(outcome, ProcessOutcome::Updated);

    let meeting = meetings::get_meeting(&db.pool, meeting.id)
        .await
        .expect("reload meeting");
    assert_eq!(meeting.status, MeetingStatus::Ready);
    assert!(meeting.draft_id.is_some());
    assert_eq!(transcripts.calls.load(Ordering::SeqCst), 1);
    assert_eq!(drafts.calls.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn pending_meeting_cannot_jump_straight_to_ready() {
    let db = setup_db().await;

    let (meeting, created) = meetings::upsert_meeting(
        &db.pool,
        Platform::Zoom,
        "zoom-shortcut",
        &meetings::MeetingUpsert::default(),
    )
    .await
    .expect("upsert meeting");
    assert!(created);
    assert_eq!(meeting.status, MeetingStatus::Pending);

    let err = meetings::mark_ready(&db.pool, meeting.id)
        .await
        .expect_err("ready requires a processing claim first");
    assert!(matches!(err, meetings::StoreError::Conflict(_)));

    let meeting = meetings::get_meeting(&db.pool, meeting.id)
        .await
        .expect("reload meeting");
    assert_eq!(meeting.status, MeetingStatus::Pending);
}
