use std::sync::Arc;

use anyhow::Result;
use axum::{
    routing::{get, post},
    Router,
};
use sqlx::PgPool;
use tracing::info;
use tracing_subscriber::EnvFilter;

use fieldwatch_common::config::Config;
use fieldwatch_engine::{
    EngineSettings, EscalationEngine, MediaCleaner, PestClassifier, ResendMailer,
};
use fieldwatch_store::ReportStore;
use gemini_client::GeminiClient;
use resend_client::ResendClient;
use storage_client::StorageClient;

mod hooks;

pub struct AppState {
    pub engine: EscalationEngine,
    pub cleaner: MediaCleaner,
    pub broadcast_alerts: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("fieldwatch=info".parse()?))
        .init();

    let config = Config::from_env();
    config.log_tunables();

    let pool = PgPool::connect(&config.database_url).await?;
    let store = ReportStore::new(pool);

    let classifier = PestClassifier::new(
        GeminiClient::new(&config.gemini_api_key).with_model(&config.gemini_model),
    );
    let mailer = ResendMailer::new(ResendClient::new(&config.resend_api_key), &config.alert_from);
    let settings = EngineSettings {
        corroboration_radius_km: config.corroboration_radius_km,
        alert_radius_km: config.alert_radius_km,
        outbreak_threshold: config.outbreak_threshold,
        fanout_concurrency: config.fanout_concurrency,
        claim_window_hours: config.claim_window_hours,
    };
    let engine = EscalationEngine::new(
        Arc::new(classifier),
        Arc::new(store),
        Arc::new(mailer),
        settings,
    );

    let remover = StorageClient::new(&config.storage_url, &config.storage_service_key);
    let cleaner = MediaCleaner::new(Arc::new(remover), config.fanout_concurrency);

    let state = Arc::new(AppState {
        engine,
        cleaner,
        broadcast_alerts: config.broadcast_alerts,
    });

    let app = Router::new()
        // Health check
        .route("/", get(|| async { "ok" }))
        // Database webhooks
        .route("/hooks/report-inserted", post(hooks::report_inserted))
        .route("/hooks/report-deleted", post(hooks::report_deleted))
        .with_state(state)
        // Logging layer: method + path + status + latency only
        .layer(
            tower_http::trace::TraceLayer::new_for_http().make_span_with(
                |request: &axum::http::Request<_>| {
                    tracing::info_span!(
                        "http_request",
                        method = %request.method(),
                        path = %request.uri().path(),
                    )
                },
            ),
        );

    let addr = format!("{}:{}", config.web_host, config.web_port);
    info!("Fieldwatch API starting on {addr}");

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
