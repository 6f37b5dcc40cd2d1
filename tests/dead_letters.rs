#![allow(clippy::expect_used, clippy::unwrap_used)]

use std::collections::HashSet;
use std::fs;

use axum::{
    Router,
    body::Body,
    http::{Request, StatusCode, header},
    routing::{get, post},
};
use http_body_util::BodyExt;
use recap::{
    config::RetryConfig,
    handlers::ops::{list_dead_letters_handler, resolve_dead_letter_handler},
    retry,
    state::{AppState, Clients},
    types::Platform,
};
use sqlx::{
    Connection, SqliteConnection, SqlitePool,
    sqlite::{SqliteConnectOptions, SqlitePoolOptions},
};
use tempfile::NamedTempFile;
use tower::ServiceExt;

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

mod mocks {
    use async_trait::async_trait;
    use recap::clients::{
        CalendarSync, ClientError, DraftGenerator, TokenProvider, TranscriptSource,
    };
    use recap::types::{Meeting, Platform, Transcript};

    pub struct Unused;

    #[async_trait]
    impl TokenProvider for Unused {
        async fn access_token(
            &self,
            _platform: Platform,
            _user_id: &str,
        ) -> Result<String, ClientError> {
            Ok(String::new())
        }
    }

    #[async_trait]
    impl DraftGenerator for Unused {
        async fn generate_draft(
            &self,
            _meeting: &Meeting,
            _transcript: &Transcript,
        ) -> Result<String, ClientError> {
            Ok(String::new())
        }
    }

    #[async_trait]
    impl TranscriptSource for Unused {
        async fn download_zoom_transcript(
            &self,
            _download_url: &str,
            _token: &str,
        ) -> Result<String, ClientError> {
            Ok(String::new())
        }

        async fn fetch_teams_transcript(
            &self,
            _user_id: &str,
            _meeting_id: &str,
            _transcript_id: &str,
            _token: &str,
        ) -> Result<String, ClientError> {
            Ok(String::new())
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
}

fn test_state(pool: SqlitePool) -> AppState {
    let unused = std::sync::Arc::new(mocks::Unused);
    AppState {
        pool,
        config: recap::config::AppConfig::default(),
        clients: Clients {
            tokens: unused.clone(),
            drafts: unused.clone(),
            transcripts: unused,
        },
    }
}

fn build_app(state: AppState) -> Router {
    Router::new()
        .route("/webhooks/dead-letters", get(list_dead_letters_handler))
        .route(
            "/webhooks/dead-letters/:id/resolve",
            post(resolve_dead_letter_handler),
        )
        .with_state(state)
}

async fn response_json(response: axum::response::Response) -> serde_json::Value {
    let bytes = response
        .into_body()
        .collect()
        .await
        .expect("collect body")
        .to_bytes();
    serde_json::from_slice(&bytes).expect("json body")
}

/// Dead letters are only created by the retry store's exhaustion
/// transaction; a non-retryable failure is the shortest path there.
async fn seed_dead_letter(pool: &SqlitePool, key: &str) {
    retry::record_failure(
        pool,
        &RetryConfig::default(),
        Platform::Zoom,
        "recording.completed",
        key,
        r#"{"payload":{"object":{"uuid":"seed"}}}"#,
        None,
        "recording deleted upstream",
        false,
    )
    .await
    .expect("seed exhausted failure");
}

#[tokio::test]
async fn list_paginates_with_cursor() {
    let db = setup_db().await;
    for n in 0..3 {
        seed_dead_letter(&db.pool, &format!("zoom:recording.completed:seed-{n}")).await;
    }
    let state = test_state(db.pool.clone());

    let response = build_app(state.clone())
        .oneshot(
            Request::builder()
                .method("GET")
                .uri("/webhooks/dead-letters?limit=2")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let page_one = response_json(response).await;
    assert_eq!(page_one["entries"].as_array().unwrap().len(), 2);
    let cursor = page_one["next_before"]
        .as_str()
        .expect("cursor on full page")
        .to_string();

    let response = build_app(state)
        .oneshot(
            Request::builder()
                .method("GET")
                .uri(format!("/webhooks/dead-letters?limit=2&before={cursor}"))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let page_two = response_json(response).await;
    assert_eq!(page_two["entries"].as_array().unwrap().len(), 1);
    assert!(page_two["next_before"].is_null());

    // No entry appears on both pages.
    let mut seen = HashSet::new();
    for entry in page_one["entries"]
        .as_array()
        .unwrap()
        .iter()
        .chain(page_two["entries"].as_array().unwrap())
    {
        assert!(seen.insert(entry["id"].as_str().unwrap().to_string()));
    }
    assert_eq!(seen.len(), 3);
}

#[tokio::test]
async fn invalid_cursor_and_limit_are_rejected() {
    let db = setup_db().await;
    let state = test_state(db.pool.clone());

    let response = build_app(state.clone())
        .oneshot(
            Request::builder()
                .method("GET")
                .uri("/webhooks/dead-letters?before=not-a-cursor")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let response = build_app(state)
        .oneshot(
            Request::builder()
                .method("GET")
                .uri("/webhooks/dead-letters?limit=500")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn unresolved_filter_hides_resolved_entries() {
    let db = setup_db().await;
    seed_dead_letter(&db.pool, "zoom:recording.completed:filter-1").await;
    seed_dead_letter(&db.pool, "zoom:recording.completed:filter-2").await;
    let state = test_state(db.pool.clone());

    let id: String = sqlx::query_scalar("SELECT id FROM dead_letters LIMIT 1")
        .fetch_one(&db.pool)
        .await
        .expect("pick entry");

    let response = build_app(state.clone())
        .oneshot(
            Request::builder()
                .method("POST")
                .uri(format!("/webhooks/dead-letters/{id}/resolve"))
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(r#"{"notes":"requeued by hand"}"#))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let resolved = response_json(response).await;
    assert_eq!(resolved["entry"]["resolved"], true);
    assert_eq!(resolved["entry"]["resolution_notes"], "requeued by hand");

    let response = build_app(state)
        .oneshot(
            Request::builder()
                .method("GET")
                .uri("/webhooks/dead-letters?unresolved=true")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    let body = response_json(response).await;
    let entries = body["entries"].as_array().unwrap();
    assert_eq!(entries.len(), 1);
    assert_ne!(entries[0]["id"].as_str().unwrap(), id);
}

#[tokio::test]
async fn resolving_twice_conflicts() {
    let db = setup_db().await;
    seed_dead_letter(&db.pool, "zoom:recording.completed:twice").await;
    let state = test_state(db.pool.clone());

    let id: String = sqlx::query_scalar("SELECT id FROM dead_letters")
        .fetch_one(&db.pool)
        .await
        .expect("entry id");

    for expected in [StatusCode::OK, StatusCode::CONFLICT] {
        let response = build_app(state.clone())
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri(format!("/webhooks/dead-letters/{id}/resolve"))
                    .header(header::CONTENT_TYPE, "application/json")
                    .body(Body::from("{}"))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), expected);
    }
}

#[tokio::test]
async fn resolving_unknown_entry_returns_404() {
    let db = setup_db().await;
    let state = test_state(db.pool.clone());

    let response = build_app(state)
        .oneshot(
            Request::builder()
                .method("POST")
                .uri(format!("/webhooks/dead-letters/{}/resolve", uuid::Uuid::new_v4()))
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from("{}"))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}
