//! ReportStore: Postgres persistence for reports, recipients, and
//! escalation claims.
//!
//! Radius queries run a bounding-box prefilter in SQL and the exact
//! great-circle check in Rust, so plain latitude/longitude columns are
//! enough. No PostGIS required.

use anyhow::Result;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use tracing::warn;
use uuid::Uuid;

use fieldwatch_common::{EscalationAction, GeoPoint, Recipient, VerdictState};

/// Degrees of latitude per kilometer, and the base for the longitude
/// scale factor. Good enough for a prefilter; haversine decides.
const KM_PER_DEGREE: f64 = 111.0;

#[derive(Clone)]
pub struct ReportStore {
    pool: PgPool,
}

impl ReportStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Write the classifier's findings onto the report row. Idempotent:
    /// re-running the same verdict is a no-op rewrite of the same values.
    pub async fn update_verdict(
        &self,
        report_id: Uuid,
        status: VerdictState,
        pest_name: &str,
        confidence: f32,
    ) -> Result<()> {
        let result = sqlx::query(
            r#"
            UPDATE reports
            SET status = $2, pest_detected = $3, ai_confidence = $4
            WHERE id = $1
            "#,
        )
        .bind(report_id)
        .bind(status.as_str())
        .bind(pest_name)
        .bind(confidence)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            warn!(report_id = %report_id, "Verdict update matched no report row");
        }

        Ok(())
    }

    /// Count verified reports of the same pest within `radius_km` of `center`.
    /// `exclude_id` drops one report (the subject) from the count when set.
    pub async fn count_verified_nearby(
        &self,
        pest_name: &str,
        center: &GeoPoint,
        radius_km: f64,
        exclude_id: Option<Uuid>,
    ) -> Result<u64> {
        let (min_lat, max_lat, min_lng, max_lng) = bounding_box(center, radius_km);

        let rows = sqlx::query_as::<_, (Uuid, f64, f64)>(
            r#"
            SELECT id, latitude, longitude
            FROM reports
            WHERE status = 'verified'
              AND pest_detected = $1
              AND latitude BETWEEN $2 AND $3
              AND longitude BETWEEN $4 AND $5
            "#,
        )
        .bind(pest_name)
        .bind(min_lat)
        .bind(max_lat)
        .bind(min_lng)
        .bind(max_lng)
        .fetch_all(&self.pool)
        .await?;

        let count = rows
            .iter()
            .filter(|(id, lat, lng)| {
                if exclude_id.is_some_and(|ex| *id == ex) {
                    return false;
                }
                center.distance_km(&GeoPoint::new(*lat, *lng)) <= radius_km
            })
            .count();

        Ok(count as u64)
    }

    /// All recipients within `radius_km` of `center`. A recipient exactly at
    /// the center is included.
    pub async fn recipients_near(
        &self,
        center: &GeoPoint,
        radius_km: f64,
    ) -> Result<Vec<Recipient>> {
        let (min_lat, max_lat, min_lng, max_lng) = bounding_box(center, radius_km);

        let rows = sqlx::query_as::<_, (Uuid, String, f64, f64)>(
            r#"
            SELECT id, email, latitude, longitude
            FROM recipients
            WHERE latitude BETWEEN $1 AND $2
              AND longitude BETWEEN $3 AND $4
            "#,
        )
        .bind(min_lat)
        .bind(max_lat)
        .bind(min_lng)
        .bind(max_lng)
        .fetch_all(&self.pool)
        .await?;

        let recipients = rows
            .into_iter()
            .filter_map(|(id, email, lat, lng)| {
                let location = GeoPoint::new(lat, lng);
                (center.distance_km(&location) <= radius_km).then_some(Recipient {
                    id,
                    email,
                    location,
                })
            })
            .collect();

        Ok(recipients)
    }

    /// Claim the right to escalate for a (pest, cell, window) key.
    /// Compare-and-set: exactly one caller per key observes `true`.
    pub async fn claim_escalation(
        &self,
        pest_name: &str,
        cell: &str,
        window_start: DateTime<Utc>,
    ) -> Result<bool> {
        let result = sqlx::query(
            r#"
            INSERT INTO escalation_claims (pest_name, cell, window_start, claimed_at)
            VALUES ($1, $2, $3, now())
            ON CONFLICT DO NOTHING
            "#,
        )
        .bind(pest_name)
        .bind(cell)
        .bind(window_start)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    /// Record one outbreak action per recipient. Inserts run in one
    /// transaction: a failed batch leaves no rows behind.
    pub async fn assign_actions(
        &self,
        action: &EscalationAction,
        recipients: &[Recipient],
    ) -> Result<()> {
        let mut tx = self.pool.begin().await?;

        for recipient in recipients {
            sqlx::query(
                r#"
                INSERT INTO outbreak_actions (id, recipient_id, pest_name, title, description)
                VALUES ($1, $2, $3, $4, $5)
                "#,
            )
            .bind(Uuid::new_v4())
            .bind(recipient.id)
            .bind(&action.pest_name)
            .bind(&action.title)
            .bind(&action.description)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(())
    }
}

/// Prefilter box around `center`. 1 degree of latitude is ~111km;
/// longitude shrinks by cos(lat).
fn bounding_box(center: &GeoPoint, radius_km: f64) -> (f64, f64, f64, f64) {
    let lat_delta = radius_km / KM_PER_DEGREE;
    let lng_delta = radius_km / (KM_PER_DEGREE * center.lat.to_radians().cos());
    (
        center.lat - lat_delta,
        center.lat + lat_delta,
        center.lng - lng_delta,
        center.lng + lng_delta,
    )
}
