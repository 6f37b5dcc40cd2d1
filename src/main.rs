use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    Router, middleware,
    routing::{get, post},
};
use recap::{
    auth::metrics_auth,
    clients::{ClientError, HttpDraftGenerator, HttpTokenProvider, HttpTranscriptSource},
    config::AppConfig,
    handlers::{
        ops::{
            health_handler, list_dead_letters_handler, metrics_handler,
            resolve_dead_letter_handler, sweep_handler,
        },
        reprocess::reprocess_meeting,
        webhooks::{receive_webhook, webhook_probe},
    },
    state::{AppState, Clients},
};
use sqlx::sqlite::SqlitePoolOptions;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let database_url =
        std::env::var("DATABASE_URL").unwrap_or_else(|_| "sqlite:recap.db".to_string());
    let bind_addr =
        std::env::var("RECAP_BIND_ADDR").unwrap_or_else(|_| "127.0.0.1:3002".to_string());

    let pool = SqlitePoolOptions::new()
        .max_connections(5)
        .connect(&database_url)
        .await?;

    sqlx::query("PRAGMA foreign_keys = ON;")
        .execute(&pool)
        .await?;

    sqlx::migrate!("./migrations").run(&pool).await?;

    let config = AppConfig::from_env();
    let clients = build_clients(&config)?;
    let state = AppState {
        pool,
        config,
        clients,
    };

    let protected = Router::new()
        .route("/webhooks/metrics", get(metrics_handler))
        .route("/webhooks/dead-letters", get(list_dead_letters_handler))
        .route(
            "/webhooks/dead-letters/:id/resolve",
            post(resolve_dead_letter_handler),
        )
        .layer(middleware::from_fn_with_state(state.clone(), metrics_auth));

    let app = Router::new()
        .route("/webhooks/health", get(health_handler))
        .route("/webhooks/:platform", post(receive_webhook).get(webhook_probe))
        .route("/meetings/:id/reprocess", post(reprocess_meeting))
        .route("/internal/retry/sweep", post(sweep_handler))
        .merge(protected)
        .with_state(state);

    let addr: SocketAddr = bind_addr.parse()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

fn build_clients(config: &AppConfig) -> Result<Clients, ClientError> {
    let token_base = std::env::var("RECAP_TOKEN_SERVICE_URL")
        .unwrap_or_else(|_| "http://127.0.0.1:3010".to_string());
    let draft_base = std::env::var("RECAP_DRAFT_SERVICE_URL")
        .unwrap_or_else(|_| "http://127.0.0.1:3011".to_string());

    let timeout = config.request_timeout_secs;
    let mut transcripts = HttpTranscriptSource::new(timeout)?;
    if let Ok(graph) = std::env::var("RECAP_GRAPH_BASE_URL")
        && let Ok(calendar) = std::env::var("RECAP_CALENDAR_BASE_URL")
    {
        transcripts = transcripts.with_base_urls(graph, calendar);
    }

    Ok(Clients {
        tokens: Arc::new(HttpTokenProvider::new(token_base, timeout)?),
        drafts: Arc::new(HttpDraftGenerator::new(draft_base, timeout)?),
        transcripts: Arc::new(transcripts),
    })
}
