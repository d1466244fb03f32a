use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::FieldwatchError;

// --- Domain constants ---

/// Tag that marks a report as a candidate for the outbreak pipeline.
/// Reports without it are skipped before any classifier call.
pub const CANDIDATE_TAG: &str = "pest";

/// Acceptance threshold for classifier confidence. A verdict is accepted
/// iff `is_legit && confidence > ACCEPT_CONFIDENCE` (strict greater-than).
pub const ACCEPT_CONFIDENCE: f32 = 0.7;

/// Geohash precision for escalation-claim cells. Precision 4 cells are
/// ~39km x 20km, wide enough to cover the 15km corroboration radius.
pub const CLAIM_CELL_PRECISION: usize = 4;

// --- Geo Types ---

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
    pub lat: f64,
    pub lng: f64,
}

/// Haversine great-circle distance between two lat/lng points in kilometers.
pub fn haversine_km(lat1: f64, lng1: f64, lat2: f64, lng2: f64) -> f64 {
    const EARTH_RADIUS_KM: f64 = 6371.0;
    let d_lat = (lat2 - lat1).to_radians();
    let d_lng = (lng2 - lng1).to_radians();
    let lat1_r = lat1.to_radians();
    let lat2_r = lat2.to_radians();

    let a = (d_lat / 2.0).sin().powi(2) + lat1_r.cos() * lat2_r.cos() * (d_lng / 2.0).sin().powi(2);
    let c = 2.0 * a.sqrt().asin();
    EARTH_RADIUS_KM * c
}

impl GeoPoint {
    pub fn new(lat: f64, lng: f64) -> Self {
        Self { lat, lng }
    }

    /// Great-circle distance to another point in kilometers.
    pub fn distance_km(&self, other: &GeoPoint) -> f64 {
        haversine_km(self.lat, self.lng, other.lat, other.lng)
    }
}

// --- Verdict ---

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VerdictState {
    Pending,
    Verified,
    Rejected,
}

impl VerdictState {
    /// Column value used in Postgres (`reports.status`).
    pub fn as_str(&self) -> &'static str {
        match self {
            VerdictState::Pending => "pending",
            VerdictState::Verified => "verified",
            VerdictState::Rejected => "rejected",
        }
    }

    pub fn from_str_loose(s: &str) -> Self {
        match s {
            "verified" => VerdictState::Verified,
            "rejected" => VerdictState::Rejected,
            _ => VerdictState::Pending,
        }
    }
}

impl std::fmt::Display for VerdictState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Classifier output after adapter validation. `pest_name` is an open
/// vocabulary string and is compared exactly, never normalized.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PestVerdict {
    pub is_legit: bool,
    pub pest_name: String,
    /// Clamped to [0.0, 1.0] by the adapter; the upstream model does not
    /// guarantee the range.
    pub confidence: f32,
}

impl PestVerdict {
    /// The acceptance policy: legitimacy AND strict `> ACCEPT_CONFIDENCE`.
    pub fn accepted(&self) -> bool {
        self.is_legit && self.confidence > ACCEPT_CONFIDENCE
    }

    pub fn state(&self) -> VerdictState {
        if self.accepted() {
            VerdictState::Verified
        } else {
            VerdictState::Rejected
        }
    }
}

// --- Report ---

/// A user-submitted report as delivered by the insert webhook. The pipeline
/// only ever mutates the verdict fields (`status`, `pest_detected`,
/// `ai_confidence`); everything else is owned by the reporting subsystem.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Report {
    pub id: Uuid,
    pub title: String,
    #[serde(default)]
    pub body: String,
    #[serde(default)]
    pub tags: Vec<String>,
    pub location: GeoPoint,
    pub created_at: DateTime<Utc>,
    #[serde(default = "default_status")]
    pub status: VerdictState,
    #[serde(default)]
    pub pest_detected: Option<String>,
    #[serde(default)]
    pub ai_confidence: Option<f32>,
    /// Media fields carried for deletion cleanup only.
    #[serde(default)]
    pub photo_url: Option<String>,
    #[serde(default)]
    pub image_urls: Vec<String>,
}

fn default_status() -> VerdictState {
    VerdictState::Pending
}

impl Report {
    /// Admission filter: does this report carry the candidate tag?
    pub fn is_candidate(&self) -> bool {
        self.tags.iter().any(|t| t == CANDIDATE_TAG)
    }
}

// --- Recipient ---

/// An addressable user near a point. Read-only from the pipeline's side.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Recipient {
    pub id: Uuid,
    pub email: String,
    pub location: GeoPoint,
}

// --- Escalation Action ---

/// Transient work item built when the corroboration threshold is met.
/// Persistence, if any, happens through the store's action assignment.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EscalationAction {
    pub pest_name: String,
    pub center: GeoPoint,
    pub radius_km: f64,
    pub title: String,
    pub description: String,
}

impl EscalationAction {
    /// Build the urgent outbreak action for a confirmed pest at a point.
    pub fn outbreak(pest_name: &str, center: GeoPoint, radius_km: f64) -> Self {
        Self {
            pest_name: pest_name.to_string(),
            center,
            radius_km,
            title: format!("URGENT: {pest_name} Outbreak"),
            description: format!(
                "A confirmed outbreak of {pest_name} has been detected within \
                 {radius_km:.0}km of your farm. Please take immediate protective measures."
            ),
        }
    }
}

// --- Escalation claim keys ---

/// Geohash cell used to key escalation claims for a point.
pub fn claim_cell(point: &GeoPoint) -> Result<String, FieldwatchError> {
    geohash::encode(
        geohash::Coord {
            x: point.lng,
            y: point.lat,
        },
        CLAIM_CELL_PRECISION,
    )
    .map_err(|e| FieldwatchError::Validation(format!("Invalid claim coordinates: {e}")))
}

/// Start of the claim window containing `ts`, bucketed to `window_hours`.
pub fn claim_window_start(ts: DateTime<Utc>, window_hours: u32) -> DateTime<Utc> {
    let window_secs = i64::from(window_hours.max(1)) * 3600;
    let bucket = ts.timestamp().div_euclid(window_secs) * window_secs;
    DateTime::<Utc>::from_timestamp(bucket, 0).unwrap_or(ts)
}
