use std::sync::Arc;

use sqlx::SqlitePool;

use crate::clients::{DraftGenerator, TokenProvider, TranscriptSource};
use crate::config::AppConfig;

#[derive(Clone)]
pub struct AppState {
    pub pool: SqlitePool,
    pub config: AppConfig,
    pub clients: Clients,
}

/// Outbound collaborator handles, injected once at startup.
#[derive(Clone)]
pub struct Clients {
    pub tokens: Arc<dyn TokenProvider>,
    pub drafts: Arc<dyn DraftGenerator>,
    pub transcripts: Arc<dyn TranscriptSource>,
}
