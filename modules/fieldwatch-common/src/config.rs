use std::env;

/// Application configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    // Postgres
    pub database_url: String,

    // AI provider
    pub gemini_api_key: String,
    pub gemini_model: String,

    // Email provider
    pub resend_api_key: String,
    pub alert_from: String,

    // Object storage (media cleanup)
    pub storage_url: String,
    pub storage_service_key: String,

    // Escalation policy
    pub corroboration_radius_km: f64,
    pub alert_radius_km: f64,
    pub outbreak_threshold: u64,
    pub fanout_concurrency: usize,
    pub claim_window_hours: u32,
    pub broadcast_alerts: bool,

    // Web server
    pub web_host: String,
    pub web_port: u16,
}

impl Config {
    /// Load configuration from environment variables.
    /// Panics with a clear message if required vars are missing.
    pub fn from_env() -> Self {
        Self {
            database_url: required_env("DATABASE_URL"),
            gemini_api_key: required_env("GEMINI_API_KEY"),
            gemini_model: env::var("GEMINI_MODEL")
                .unwrap_or_else(|_| "gemini-2.5-flash".to_string()),
            resend_api_key: required_env("RESEND_API_KEY"),
            alert_from: env::var("ALERT_FROM")
                .unwrap_or_else(|_| "onboarding@resend.dev".to_string()),
            storage_url: required_env("STORAGE_URL"),
            storage_service_key: required_env("STORAGE_SERVICE_KEY"),
            corroboration_radius_km: parsed_env("CORROBORATION_RADIUS_KM", 15.0),
            alert_radius_km: parsed_env("ALERT_RADIUS_KM", 10.0),
            outbreak_threshold: parsed_env("OUTBREAK_THRESHOLD", 3),
            fanout_concurrency: parsed_env("FANOUT_CONCURRENCY", 16),
            claim_window_hours: parsed_env("CLAIM_WINDOW_HOURS", 6),
            broadcast_alerts: env::var("BROADCAST_ALERTS")
                .map(|v| v == "1" || v.eq_ignore_ascii_case("true"))
                .unwrap_or(false),
            web_host: env::var("WEB_HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
            web_port: parsed_env("WEB_PORT", 8787),
        }
    }

    /// Log the escalation tunables once at startup. Secrets stay out.
    pub fn log_tunables(&self) {
        tracing::info!(
            corroboration_radius_km = self.corroboration_radius_km,
            alert_radius_km = self.alert_radius_km,
            outbreak_threshold = self.outbreak_threshold,
            fanout_concurrency = self.fanout_concurrency,
            claim_window_hours = self.claim_window_hours,
            broadcast_alerts = self.broadcast_alerts,
            model = %self.gemini_model,
            "Config loaded"
        );
    }
}

fn required_env(key: &str) -> String {
    env::var(key).unwrap_or_else(|_| panic!("{key} environment variable is required"))
}

fn parsed_env<T: std::str::FromStr>(key: &str, default: T) -> T {
    match env::var(key) {
        Ok(raw) => raw
            .parse()
            .unwrap_or_else(|_| panic!("{key} must be a valid number, got {raw:?}")),
        Err(_) => default,
    }
}
