//! Trait seams between the escalation pipeline and its backing services.
//!
//! - `Classifier` turns a report's text into a structured pest verdict.
//! - `VerdictStore` persists a verdict onto the triggering report row.
//! - `GeoAggregator` answers the radius queries: corroborating verified
//!   reports and alert recipients near a point.
//! - `EscalationClaims` owns the escalation claim table and action rows.
//! - `Mailer` delivers a single alert email.
//! - `ObjectRemover` deletes a single stored media object.
//!
//! `EscalationStore` bundles the three store-backed seams so the engine can
//! hold one trait object for persistence. Impls for the real backends sit at
//! the bottom of this file; in-memory mocks live in `crate::testing`.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use fieldwatch_common::error::FieldwatchError;
use fieldwatch_common::types::{EscalationAction, GeoPoint, PestVerdict, Recipient, VerdictState};
use fieldwatch_store::ReportStore;
use resend_client::{EmailRequest, ResendClient};
use storage_client::StorageClient;

/// Whether the report that triggered a corroboration count is itself counted.
///
/// The insert hook counts the triggering report, since its verdict is already
/// persisted by the time the count runs. Recounts around an existing report
/// exclude it to measure independent corroboration only.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CountScope {
    /// Count the subject report along with its neighbors.
    IncludeReport(Uuid),
    /// Count neighbors only, skipping the subject report's row.
    ExcludeReport(Uuid),
}

#[async_trait]
pub trait Classifier: Send + Sync {
    async fn classify(&self, title: &str, body: &str) -> Result<PestVerdict, FieldwatchError>;
}

#[async_trait]
pub trait VerdictStore: Send + Sync {
    async fn update_verdict(
        &self,
        report_id: Uuid,
        state: VerdictState,
        verdict: &PestVerdict,
    ) -> Result<(), FieldwatchError>;
}

#[async_trait]
pub trait GeoAggregator: Send + Sync {
    async fn count_corroborating(
        &self,
        pest_name: &str,
        center: &GeoPoint,
        radius_km: f64,
        scope: CountScope,
    ) -> Result<u64, FieldwatchError>;

    async fn recipients_near(
        &self,
        center: &GeoPoint,
        radius_km: f64,
    ) -> Result<Vec<Recipient>, FieldwatchError>;
}

#[async_trait]
pub trait EscalationClaims: Send + Sync {
    /// Returns true when this call won the claim for the cell/window pair.
    async fn claim(
        &self,
        pest_name: &str,
        cell: &str,
        window_start: DateTime<Utc>,
    ) -> Result<bool, FieldwatchError>;

    async fn assign_actions(
        &self,
        action: &EscalationAction,
        recipients: &[Recipient],
    ) -> Result<(), FieldwatchError>;
}

/// Everything the engine needs from persistence, as one bound.
pub trait EscalationStore: VerdictStore + GeoAggregator + EscalationClaims {}

impl<T: VerdictStore + GeoAggregator + EscalationClaims> EscalationStore for T {}

#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send(&self, to: &str, subject: &str, html: &str) -> anyhow::Result<()>;
}

#[async_trait]
pub trait ObjectRemover: Send + Sync {
    async fn remove(&self, bucket: &str, path: &str) -> anyhow::Result<()>;
}

// ---- impls for the real backends ----

#[async_trait]
impl VerdictStore for ReportStore {
    async fn update_verdict(
        &self,
        report_id: Uuid,
        state: VerdictState,
        verdict: &PestVerdict,
    ) -> Result<(), FieldwatchError> {
        self.update_verdict(report_id, state, &verdict.pest_name, verdict.confidence)
            .await
            .map_err(|e| FieldwatchError::Persistence(e.to_string()))
    }
}

#[async_trait]
impl GeoAggregator for ReportStore {
    async fn count_corroborating(
        &self,
        pest_name: &str,
        center: &GeoPoint,
        radius_km: f64,
        scope: CountScope,
    ) -> Result<u64, FieldwatchError> {
        let exclude = match scope {
            CountScope::IncludeReport(_) => None,
            CountScope::ExcludeReport(id) => Some(id),
        };
        self.count_verified_nearby(pest_name, center, radius_km, exclude)
            .await
            .map_err(|e| FieldwatchError::Aggregation(e.to_string()))
    }

    async fn recipients_near(
        &self,
        center: &GeoPoint,
        radius_km: f64,
    ) -> Result<Vec<Recipient>, FieldwatchError> {
        self.recipients_near(center, radius_km)
            .await
            .map_err(|e| FieldwatchError::Aggregation(e.to_string()))
    }
}

#[async_trait]
impl EscalationClaims for ReportStore {
    async fn claim(
        &self,
        pest_name: &str,
        cell: &str,
        window_start: DateTime<Utc>,
    ) -> Result<bool, FieldwatchError> {
        self.claim_escalation(pest_name, cell, window_start)
            .await
            .map_err(|e| FieldwatchError::Persistence(e.to_string()))
    }

    async fn assign_actions(
        &self,
        action: &EscalationAction,
        recipients: &[Recipient],
    ) -> Result<(), FieldwatchError> {
        self.assign_actions(action, recipients)
            .await
            .map_err(|e| FieldwatchError::Persistence(e.to_string()))
    }
}

/// `Mailer` backed by the Resend REST API, sending from a fixed address.
pub struct ResendMailer {
    client: ResendClient,
    from: String,
}

impl ResendMailer {
    pub fn new(client: ResendClient, from: &str) -> Self {
        Self {
            client,
            from: from.to_string(),
        }
    }
}

#[async_trait]
impl Mailer for ResendMailer {
    async fn send(&self, to: &str, subject: &str, html: &str) -> anyhow::Result<()> {
        self.client
            .send(&EmailRequest::new(&self.from, to, subject, html))
            .await?;
        Ok(())
    }
}

#[async_trait]
impl ObjectRemover for StorageClient {
    async fn remove(&self, bucket: &str, path: &str) -> anyhow::Result<()> {
        Ok(self.remove(bucket, path).await?)
    }
}
