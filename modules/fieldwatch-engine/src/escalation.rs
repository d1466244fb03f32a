//! The escalation pipeline.
//!
//! One inserted report flows through classify, persist, corroborate, claim,
//! and fan-out. Every early exit is an [`EscalationOutcome`] value rather
//! than an error, so the caller can report what happened on the happy paths
//! and reserve `Err` for stage failures.
//!
//! The verdict is persisted before the corroboration count runs. The count
//! therefore sees the triggering report as verified, which is why the count
//! uses `CountScope::IncludeReport`.

use std::sync::Arc;

use serde::Serialize;
use tracing::{info, warn};

use fieldwatch_common::error::FieldwatchError;
use fieldwatch_common::types::{claim_cell, claim_window_start, EscalationAction, Report};

use crate::notifier::{AlertNotifier, DeliveryOutcome};
use crate::traits::{Classifier, CountScope, EscalationStore, Mailer};

/// Subject line for proximity alerts sent on every candidate insert.
const BROADCAST_SUBJECT: &str = "⚠️ Pest Alert in your Area!";

/// Tunable radii, threshold, and fan-out bounds. Defaults match the
/// production configuration.
#[derive(Debug, Clone)]
pub struct EngineSettings {
    /// Radius for counting corroborating verified reports, in km.
    pub corroboration_radius_km: f64,
    /// Radius for the legacy proximity broadcast, in km.
    pub alert_radius_km: f64,
    /// Corroborating report count at which an outbreak is confirmed.
    pub outbreak_threshold: u64,
    /// Maximum in-flight alert deliveries.
    pub fanout_concurrency: usize,
    /// Width of the escalation claim window, in hours.
    pub claim_window_hours: u32,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            corroboration_radius_km: 15.0,
            alert_radius_km: 10.0,
            outbreak_threshold: 3,
            fanout_concurrency: 16,
            claim_window_hours: 6,
        }
    }
}

/// Where a report's run through the pipeline ended.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum EscalationOutcome {
    /// Report does not carry the candidate tag; nothing ran.
    Skipped,
    /// Verdict persisted as rejected; aggregation never ran.
    Rejected { pest_name: String, confidence: f32 },
    /// Verified, but corroboration is still under the outbreak threshold.
    BelowThreshold { pest_name: String, corroborations: u64 },
    /// Threshold met, but another run holds the claim for this cell and
    /// window, so no second fan-out happens.
    AlreadyClaimed { pest_name: String, corroborations: u64 },
    /// Outbreak confirmed: actions assigned and alerts dispatched.
    Escalated {
        pest_name: String,
        corroborations: u64,
        delivered: usize,
        failed: usize,
    },
}

/// Where a proximity broadcast ended.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum BroadcastOutcome {
    /// Report does not carry the candidate tag; nothing was sent.
    Skipped,
    /// One delivery attempt per nearby recipient.
    Alerted { deliveries: Vec<DeliveryOutcome> },
}

pub struct EscalationEngine {
    classifier: Arc<dyn Classifier>,
    store: Arc<dyn EscalationStore>,
    notifier: AlertNotifier,
    settings: EngineSettings,
}

impl EscalationEngine {
    pub fn new(
        classifier: Arc<dyn Classifier>,
        store: Arc<dyn EscalationStore>,
        mailer: Arc<dyn Mailer>,
        settings: EngineSettings,
    ) -> Self {
        let notifier = AlertNotifier::new(mailer, settings.fanout_concurrency);
        Self {
            classifier,
            store,
            notifier,
            settings,
        }
    }

    /// Runs a freshly inserted report through the full pipeline.
    pub async fn process(&self, report: &Report) -> Result<EscalationOutcome, FieldwatchError> {
        if !report.is_candidate() {
            info!(report_id = %report.id, "Report is not tagged as a pest candidate, skipping");
            return Ok(EscalationOutcome::Skipped);
        }

        info!(report_id = %report.id, title = %report.title, "Analyzing report");
        let verdict = self.classifier.classify(&report.title, &report.body).await?;

        // Persist first so the corroboration count below sees this report.
        self.store
            .update_verdict(report.id, verdict.state(), &verdict)
            .await?;

        if !verdict.accepted() {
            info!(
                report_id = %report.id,
                pest = %verdict.pest_name,
                confidence = verdict.confidence,
                "Report rejected by analysis"
            );
            return Ok(EscalationOutcome::Rejected {
                pest_name: verdict.pest_name,
                confidence: verdict.confidence,
            });
        }

        let corroborations = self
            .store
            .count_corroborating(
                &verdict.pest_name,
                &report.location,
                self.settings.corroboration_radius_km,
                CountScope::IncludeReport(report.id),
            )
            .await?;
        info!(
            pest = %verdict.pest_name,
            corroborations,
            threshold = self.settings.outbreak_threshold,
            "Corroboration count for report area"
        );

        if corroborations < self.settings.outbreak_threshold {
            return Ok(EscalationOutcome::BelowThreshold {
                pest_name: verdict.pest_name,
                corroborations,
            });
        }

        // Exactly one run per pest, cell, and time window gets to fan out.
        let cell = claim_cell(&report.location)?;
        let window_start =
            claim_window_start(report.created_at, self.settings.claim_window_hours);
        if !self
            .store
            .claim(&verdict.pest_name, &cell, window_start)
            .await?
        {
            info!(
                pest = %verdict.pest_name,
                cell = %cell,
                "Escalation already claimed for this cell and window"
            );
            return Ok(EscalationOutcome::AlreadyClaimed {
                pest_name: verdict.pest_name,
                corroborations,
            });
        }

        warn!(
            pest = %verdict.pest_name,
            corroborations,
            "Outbreak confirmed, assigning actions and alerting nearby farms"
        );
        let action = EscalationAction::outbreak(
            &verdict.pest_name,
            report.location,
            self.settings.corroboration_radius_km,
        );
        let recipients = self
            .store
            .recipients_near(&report.location, self.settings.corroboration_radius_km)
            .await?;
        self.store.assign_actions(&action, &recipients).await?;

        let html = alert_html(&action.title, &action.description);
        let outcomes = self
            .notifier
            .notify_all(&recipients, &action.title, &html)
            .await;
        let delivered = outcomes.iter().filter(|o| o.is_delivered()).count();
        let failed = outcomes.len() - delivered;
        info!(pest = %verdict.pest_name, delivered, failed, "Outbreak fan-out finished");

        Ok(EscalationOutcome::Escalated {
            pest_name: verdict.pest_name,
            corroborations,
            delivered,
            failed,
        })
    }

    /// Legacy proximity broadcast: alert every recipient near a candidate
    /// report as soon as it is inserted, no verdict or threshold involved.
    pub async fn broadcast_alert(
        &self,
        report: &Report,
    ) -> Result<BroadcastOutcome, FieldwatchError> {
        if !report.is_candidate() {
            info!(report_id = %report.id, "Report is not tagged as a pest candidate, skipping");
            return Ok(BroadcastOutcome::Skipped);
        }

        let recipients = self
            .store
            .recipients_near(&report.location, self.settings.alert_radius_km)
            .await?;
        if recipients.is_empty() {
            info!(report_id = %report.id, "No recipients near report, nothing to alert");
            return Ok(BroadcastOutcome::Alerted { deliveries: vec![] });
        }

        info!(report_id = %report.id, recipients = recipients.len(), "Broadcasting pest alert");
        let html = format!(
            "<h1>Pest Outbreak Detected</h1><p>Post: {}</p>",
            report.title
        );
        let deliveries = self
            .notifier
            .notify_all(&recipients, BROADCAST_SUBJECT, &html)
            .await;
        Ok(BroadcastOutcome::Alerted { deliveries })
    }

    pub fn settings(&self) -> &EngineSettings {
        &self.settings
    }
}

fn alert_html(title: &str, description: &str) -> String {
    format!("<h1>{title}</h1><p>{description}</p>")
}
