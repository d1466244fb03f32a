//! Database webhook handlers.
//!
//! The reports table fires a webhook on INSERT (run the escalation
//! pipeline) and on DELETE (remove the row's media from object storage).
//! Every completed pipeline run is a 200: callers distinguish results by
//! the `outcome` field, not the status code.

use std::sync::Arc;

use axum::{extract::State, http::StatusCode, response::IntoResponse, Json};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use tracing::{info, warn};
use uuid::Uuid;

use fieldwatch_common::error::FieldwatchError;
use fieldwatch_common::types::{GeoPoint, Report, VerdictState};
use fieldwatch_engine::{media_urls, BroadcastOutcome, EscalationOutcome};

use crate::AppState;

// --- Wire types ---

/// Insert webhook envelope. Only `record` is read; the envelope's other
/// fields (`type`, `table`, `schema`) are ignored.
#[derive(Debug, Deserialize)]
pub struct InsertHookPayload {
    pub record: ReportRecord,
}

/// Raw reports row as delivered by the webhook. Coordinates are nullable
/// columns; a record missing either one is rejected before any AI call.
#[derive(Debug, Deserialize)]
pub struct ReportRecord {
    pub id: Uuid,
    pub title: String,
    #[serde(default)]
    pub content: String,
    #[serde(default)]
    pub tags: Vec<String>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
}

impl ReportRecord {
    /// Validate the row into a pipeline report. Zero is a valid
    /// coordinate; only a missing column rejects the record.
    fn into_report(self) -> Result<Report, FieldwatchError> {
        let location = match (self.latitude, self.longitude) {
            (Some(lat), Some(lng)) => GeoPoint::new(lat, lng),
            _ => {
                return Err(FieldwatchError::Validation(
                    "Missing location data in report".to_string(),
                ))
            }
        };
        Ok(Report {
            id: self.id,
            title: self.title,
            body: self.content,
            tags: self.tags,
            location,
            created_at: self.created_at.unwrap_or_else(Utc::now),
            status: VerdictState::Pending,
            pest_detected: None,
            ai_confidence: None,
            photo_url: None,
            image_urls: Vec::new(),
        })
    }
}

/// Delete webhook envelope. The deleted row arrives under `old_record`.
#[derive(Debug, Deserialize)]
pub struct DeleteHookPayload {
    pub old_record: DeletedRecord,
}

#[derive(Debug, Deserialize)]
pub struct DeletedRecord {
    #[serde(default)]
    pub photo_url: Option<String>,
    #[serde(default)]
    pub image_urls: Option<Vec<String>>,
}

// --- Handlers ---

/// POST /hooks/report-inserted
pub async fn report_inserted(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<InsertHookPayload>,
) -> impl IntoResponse {
    let report = match payload.record.into_report() {
        Ok(report) => report,
        Err(e) => {
            warn!(error = %e, "rejecting insert webhook payload");
            let (status, body) = error_response(&e);
            return (status, Json(body)).into_response();
        }
    };

    let outcome = match state.engine.process(&report).await {
        Ok(outcome) => outcome,
        Err(e) => {
            warn!(report_id = %report.id, error = %e, "escalation pipeline failed");
            let (status, body) = error_response(&e);
            return (status, Json(body)).into_response();
        }
    };

    // Legacy per-report broadcast, off by default. Its failures never
    // change the pipeline response.
    if state.broadcast_alerts {
        match state.engine.broadcast_alert(&report).await {
            Ok(BroadcastOutcome::Alerted { deliveries }) => {
                info!(report_id = %report.id, alerted = deliveries.len(), "broadcast alert sent");
            }
            Ok(BroadcastOutcome::Skipped) => {}
            Err(e) => warn!(report_id = %report.id, error = %e, "broadcast alert failed"),
        }
    }

    (StatusCode::OK, Json(escalation_response(&outcome))).into_response()
}

/// POST /hooks/report-deleted
pub async fn report_deleted(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<DeleteHookPayload>,
) -> impl IntoResponse {
    let images = payload.old_record.image_urls.unwrap_or_default();
    let urls = media_urls(payload.old_record.photo_url.as_deref(), &images);
    if urls.is_empty() {
        return (
            StatusCode::OK,
            Json(serde_json::json!({"message": "No files to delete"})),
        )
            .into_response();
    }

    let outcomes = state.cleaner.remove_all(&urls).await;
    (StatusCode::OK, Json(outcomes)).into_response()
}

// --- Response mapping ---

/// JSON body for a completed pipeline run.
fn escalation_response(outcome: &EscalationOutcome) -> serde_json::Value {
    match outcome {
        EscalationOutcome::Skipped => serde_json::json!({
            "success": true,
            "outcome": "skipped",
        }),
        EscalationOutcome::Rejected {
            pest_name,
            confidence,
        } => serde_json::json!({
            "success": true,
            "outcome": "rejected",
            "pest_name": pest_name,
            "confidence": confidence,
        }),
        EscalationOutcome::BelowThreshold {
            pest_name,
            corroborations,
        } => serde_json::json!({
            "success": true,
            "outcome": "below_threshold",
            "pest_name": pest_name,
            "count": corroborations,
        }),
        EscalationOutcome::AlreadyClaimed {
            pest_name,
            corroborations,
        } => serde_json::json!({
            "success": true,
            "outcome": "already_claimed",
            "pest_name": pest_name,
            "count": corroborations,
        }),
        EscalationOutcome::Escalated {
            pest_name,
            corroborations,
            delivered,
            failed,
        } => serde_json::json!({
            "success": true,
            "outcome": "escalated",
            "pest_name": pest_name,
            "count": corroborations,
            "delivered": delivered,
            "failed": failed,
        }),
    }
}

/// Map a pipeline error to its HTTP status and JSON body. Upstream AI
/// failures are the caller's 502; bad payloads are a 400; everything
/// else is a 500.
fn error_response(err: &FieldwatchError) -> (StatusCode, serde_json::Value) {
    match err {
        FieldwatchError::Classification { detail, .. } => (
            StatusCode::BAD_GATEWAY,
            serde_json::json!({"error": "AI analysis failed", "details": detail}),
        ),
        FieldwatchError::Validation(msg) => (
            StatusCode::BAD_REQUEST,
            serde_json::json!({"error": msg}),
        ),
        other => (
            StatusCode::INTERNAL_SERVER_ERROR,
            serde_json::json!({"error": other.to_string()}),
        ),
    }
}
