/// Process-wide read-only configuration, resolved once at startup and passed
/// into handlers and processors through `AppState`.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub retry: RetryConfig,
    /// Bearer token required by the metrics endpoint. None disables the
    /// check (development).
    pub metrics_token: Option<String>,
    /// Ceiling for any single outbound platform API call.
    pub request_timeout_secs: u64,
    /// Trailing window for picking up just-ended Meet conference events.
    pub meet_window_secs: i64,
}

#[derive(Debug, Clone)]
pub struct RetryConfig {
    pub max_attempts: i64,
    pub backoff_base_secs: i64,
    pub backoff_max_secs: i64,
    /// How long a raw event may sit in `processing` before the sweep treats
    /// the claim as abandoned and requeues it.
    pub stale_claim_secs: i64,
}

impl AppConfig {
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(value) = std::env::var("RECAP_MAX_ATTEMPTS")
            && let Ok(parsed) = value.parse::<i64>()
        {
            config.retry.max_attempts = parsed.max(1);
        }
        if let Ok(value) = std::env::var("RECAP_BACKOFF_BASE_SECS")
            && let Ok(parsed) = value.parse::<i64>()
        {
            config.retry.backoff_base_secs = parsed.max(1);
        }
        if let Ok(value) = std::env::var("RECAP_BACKOFF_MAX_SECS")
            && let Ok(parsed) = value.parse::<i64>()
        {
            config.retry.backoff_max_secs = parsed.max(1);
        }
        if let Ok(value) = std::env::var("RECAP_STALE_CLAIM_SECS")
            && let Ok(parsed) = value.parse::<i64>()
        {
            config.retry.stale_claim_secs = parsed.max(1);
        }
        if let Ok(value) = std::env::var("RECAP_METRICS_TOKEN")
            && !value.trim().is_empty()
        {
            config.metrics_token = Some(value);
        }
        if let Ok(value) = std::env::var("RECAP_REQUEST_TIMEOUT_SECS")
            && let Ok(parsed) = value.parse::<u64>()
        {
            config.request_timeout_secs = parsed.clamp(1, 60);
        }
        if let Ok(value) = std::env::var("RECAP_MEET_WINDOW_SECS")
            && let Ok(parsed) = value.parse::<i64>()
        {
            config.meet_window_secs = parsed.max(0);
        }

        config
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            retry: RetryConfig::default(),
            metrics_token: None,
            request_timeout_secs: 60,
            meet_window_secs: 300,
        }
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            backoff_base_secs: 60,
            backoff_max_secs: 3600,
            stale_claim_secs: 600,
        }
    }
}
