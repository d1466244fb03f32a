//! Integration tests for ReportStore.
//! Requires a Postgres instance. Set DATABASE_TEST_URL or these tests are skipped.

use chrono::{TimeZone, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use fieldwatch_common::{EscalationAction, GeoPoint, Recipient, VerdictState};
use fieldwatch_store::ReportStore;

/// Get a test database pool, or skip if no test DB is available.
async fn test_pool() -> Option<PgPool> {
    let url = std::env::var("DATABASE_TEST_URL").ok()?;
    let pool = PgPool::connect(&url).await.ok()?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS reports (
            id            UUID             PRIMARY KEY,
            title         TEXT             NOT NULL,
            content       TEXT             NOT NULL DEFAULT '',
            tags          TEXT[]           NOT NULL DEFAULT '{}',
            latitude      DOUBLE PRECISION NOT NULL,
            longitude     DOUBLE PRECISION NOT NULL,
            status        TEXT             NOT NULL DEFAULT 'pending',
            pest_detected TEXT,
            ai_confidence REAL,
            photo_url     TEXT,
            image_urls    TEXT[],
            created_at    TIMESTAMPTZ      NOT NULL DEFAULT now()
        )
        "#,
    )
    .execute(&pool)
    .await
    .ok()?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS recipients (
            id        UUID             PRIMARY KEY,
            email     TEXT             NOT NULL,
            latitude  DOUBLE PRECISION NOT NULL,
            longitude DOUBLE PRECISION NOT NULL
        )
        "#,
    )
    .execute(&pool)
    .await
    .ok()?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS outbreak_actions (
            id           UUID        PRIMARY KEY,
            recipient_id UUID        NOT NULL REFERENCES recipients(id),
            pest_name    TEXT        NOT NULL,
            title        TEXT        NOT NULL,
            description  TEXT        NOT NULL,
            created_at   TIMESTAMPTZ NOT NULL DEFAULT now()
        )
        "#,
    )
    .execute(&pool)
    .await
    .ok()?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS escalation_claims (
            pest_name    TEXT        NOT NULL,
            cell         TEXT        NOT NULL,
            window_start TIMESTAMPTZ NOT NULL,
            claimed_at   TIMESTAMPTZ NOT NULL DEFAULT now(),
            PRIMARY KEY (pest_name, cell, window_start)
        )
        "#,
    )
    .execute(&pool)
    .await
    .ok()?;

    // Clean slate for each test
    sqlx::query("TRUNCATE reports, recipients, outbreak_actions, escalation_claims")
        .execute(&pool)
        .await
        .ok()?;

    Some(pool)
}

/// Insert a report row directly. Returns its id.
async fn seed_report(pool: &PgPool, pest: Option<&str>, status: &str, lat: f64, lng: f64) -> Uuid {
    let id = Uuid::new_v4();
    sqlx::query(
        r#"
        INSERT INTO reports (id, title, content, tags, latitude, longitude, status, pest_detected)
        VALUES ($1, 'Sighting', 'seed row', '{pest}', $2, $3, $4, $5)
        "#,
    )
    .bind(id)
    .bind(lat)
    .bind(lng)
    .bind(status)
    .bind(pest)
    .execute(pool)
    .await
    .unwrap();
    id
}

async fn seed_recipient(pool: &PgPool, email: &str, lat: f64, lng: f64) -> Uuid {
    let id = Uuid::new_v4();
    sqlx::query("INSERT INTO recipients (id, email, latitude, longitude) VALUES ($1, $2, $3, $4)")
        .bind(id)
        .bind(email)
        .bind(lat)
        .bind(lng)
        .execute(pool)
        .await
        .unwrap();
    id
}

// Nairobi-ish cluster used throughout. 0.01 degrees of latitude is ~1.1km.
const CENTER: GeoPoint = GeoPoint {
    lat: -1.2921,
    lng: 36.8219,
};

// =========================================================================
// Verdict writes
// =========================================================================

#[tokio::test]
async fn update_verdict_writes_status_and_findings() {
    let Some(pool) = test_pool().await else {
        return;
    };
    let store = ReportStore::new(pool.clone());

    let id = seed_report(&pool, None, "pending", CENTER.lat, CENTER.lng).await;
    store
        .update_verdict(id, VerdictState::Verified, "LOCUST", 0.92)
        .await
        .unwrap();

    let (status, pest, confidence) =
        sqlx::query_as::<_, (String, Option<String>, Option<f32>)>(
            "SELECT status, pest_detected, ai_confidence FROM reports WHERE id = $1",
        )
        .bind(id)
        .fetch_one(&pool)
        .await
        .unwrap();

    assert_eq!(status, "verified");
    assert_eq!(pest.as_deref(), Some("LOCUST"));
    assert!((confidence.unwrap() - 0.92).abs() < 1e-6);
}

#[tokio::test]
async fn update_verdict_is_idempotent() {
    let Some(pool) = test_pool().await else {
        return;
    };
    let store = ReportStore::new(pool.clone());

    let id = seed_report(&pool, None, "pending", CENTER.lat, CENTER.lng).await;
    store
        .update_verdict(id, VerdictState::Rejected, "APHIDS", 0.3)
        .await
        .unwrap();
    store
        .update_verdict(id, VerdictState::Rejected, "APHIDS", 0.3)
        .await
        .unwrap();

    let (status,) = sqlx::query_as::<_, (String,)>("SELECT status FROM reports WHERE id = $1")
        .bind(id)
        .fetch_one(&pool)
        .await
        .unwrap();
    assert_eq!(status, "rejected");
}

#[tokio::test]
async fn update_verdict_missing_report_is_noop() {
    let Some(pool) = test_pool().await else {
        return;
    };
    let store = ReportStore::new(pool);

    // Should not error even though no row matches.
    store
        .update_verdict(Uuid::new_v4(), VerdictState::Verified, "LOCUST", 0.9)
        .await
        .unwrap();
}

// =========================================================================
// Corroboration counting
// =========================================================================

#[tokio::test]
async fn count_includes_only_verified_same_pest_in_radius() {
    let Some(pool) = test_pool().await else {
        return;
    };
    let store = ReportStore::new(pool.clone());

    // Two verified LOCUST within ~5km, one 50km south, plus noise.
    seed_report(&pool, Some("LOCUST"), "verified", CENTER.lat, CENTER.lng).await;
    seed_report(&pool, Some("LOCUST"), "verified", CENTER.lat - 0.04, CENTER.lng).await;
    seed_report(&pool, Some("LOCUST"), "verified", CENTER.lat - 0.45, CENTER.lng).await;
    seed_report(&pool, Some("APHIDS"), "verified", CENTER.lat, CENTER.lng).await;
    seed_report(&pool, Some("LOCUST"), "pending", CENTER.lat, CENTER.lng).await;
    seed_report(&pool, Some("LOCUST"), "rejected", CENTER.lat, CENTER.lng).await;

    let count = store
        .count_verified_nearby("LOCUST", &CENTER, 15.0, None)
        .await
        .unwrap();
    assert_eq!(count, 2);
}

#[tokio::test]
async fn count_excludes_subject_when_asked() {
    let Some(pool) = test_pool().await else {
        return;
    };
    let store = ReportStore::new(pool.clone());

    let subject =
        seed_report(&pool, Some("FALL ARMYWORM"), "verified", CENTER.lat, CENTER.lng).await;
    seed_report(
        &pool,
        Some("FALL ARMYWORM"),
        "verified",
        CENTER.lat + 0.02,
        CENTER.lng,
    )
    .await;

    let including = store
        .count_verified_nearby("FALL ARMYWORM", &CENTER, 15.0, None)
        .await
        .unwrap();
    let excluding = store
        .count_verified_nearby("FALL ARMYWORM", &CENTER, 15.0, Some(subject))
        .await
        .unwrap();

    assert_eq!(including, 2);
    assert_eq!(excluding, 1);
}

#[tokio::test]
async fn count_zero_when_nothing_matches() {
    let Some(pool) = test_pool().await else {
        return;
    };
    let store = ReportStore::new(pool);

    let count = store
        .count_verified_nearby("NO SUCH PEST", &CENTER, 15.0, None)
        .await
        .unwrap();
    assert_eq!(count, 0);
}

#[tokio::test]
async fn count_respects_exact_distance_not_just_bounding_box() {
    let Some(pool) = test_pool().await else {
        return;
    };
    let store = ReportStore::new(pool.clone());

    // A box corner: ~10.6km east and ~10.6km north puts the point inside the
    // 15km bounding box but ~15.0+km away on the ground. Use a clearly-outside
    // corner: 13km east + 13km north is ~18.4km diagonal.
    let corner_lat = CENTER.lat + 13.0 / 111.0;
    let corner_lng = CENTER.lng + 13.0 / (111.0 * CENTER.lat.to_radians().cos());
    seed_report(&pool, Some("STEM BORER"), "verified", corner_lat, corner_lng).await;

    let count = store
        .count_verified_nearby("STEM BORER", &CENTER, 15.0, None)
        .await
        .unwrap();
    assert_eq!(count, 0);
}

// =========================================================================
// Recipient lookup
// =========================================================================

#[tokio::test]
async fn recipients_near_filters_by_radius() {
    let Some(pool) = test_pool().await else {
        return;
    };
    let store = ReportStore::new(pool.clone());

    seed_recipient(&pool, "at-center@example.com", CENTER.lat, CENTER.lng).await;
    seed_recipient(&pool, "close@example.com", CENTER.lat + 0.05, CENTER.lng).await;
    seed_recipient(&pool, "far@example.com", CENTER.lat - 0.45, CENTER.lng).await;

    let mut found = store
        .recipients_near(&CENTER, 10.0)
        .await
        .unwrap()
        .into_iter()
        .map(|r| r.email)
        .collect::<Vec<_>>();
    found.sort();

    assert_eq!(found, vec!["at-center@example.com", "close@example.com"]);
}

#[tokio::test]
async fn recipients_near_empty_when_no_rows() {
    let Some(pool) = test_pool().await else {
        return;
    };
    let store = ReportStore::new(pool);

    let found = store.recipients_near(&CENTER, 10.0).await.unwrap();
    assert!(found.is_empty());
}

// =========================================================================
// Escalation claims
// =========================================================================

#[tokio::test]
async fn first_claim_wins_second_loses() {
    let Some(pool) = test_pool().await else {
        return;
    };
    let store = ReportStore::new(pool);

    let window = Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap();
    let first = store
        .claim_escalation("LOCUST", "kzf0", window)
        .await
        .unwrap();
    let second = store
        .claim_escalation("LOCUST", "kzf0", window)
        .await
        .unwrap();

    assert!(first);
    assert!(!second);
}

#[tokio::test]
async fn claims_are_independent_across_windows_and_cells() {
    let Some(pool) = test_pool().await else {
        return;
    };
    let store = ReportStore::new(pool);

    let window_a = Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap();
    let window_b = Utc.with_ymd_and_hms(2026, 3, 1, 18, 0, 0).unwrap();

    assert!(store
        .claim_escalation("LOCUST", "kzf0", window_a)
        .await
        .unwrap());
    // Later window: fresh claim.
    assert!(store
        .claim_escalation("LOCUST", "kzf0", window_b)
        .await
        .unwrap());
    // Different cell, same window: fresh claim.
    assert!(store
        .claim_escalation("LOCUST", "kzf1", window_a)
        .await
        .unwrap());
    // Different pest entirely.
    assert!(store
        .claim_escalation("APHIDS", "kzf0", window_a)
        .await
        .unwrap());
}

// =========================================================================
// Action assignment
// =========================================================================

#[tokio::test]
async fn assign_actions_writes_one_row_per_recipient() {
    let Some(pool) = test_pool().await else {
        return;
    };
    let store = ReportStore::new(pool.clone());

    let mut recipients = Vec::new();
    for i in 0..3 {
        let email = format!("farmer{i}@example.com");
        let id = seed_recipient(&pool, &email, CENTER.lat, CENTER.lng).await;
        recipients.push(Recipient {
            id,
            email,
            location: CENTER,
        });
    }

    let action = EscalationAction::outbreak("LOCUST", CENTER, 15.0);
    store.assign_actions(&action, &recipients).await.unwrap();

    let (count,) = sqlx::query_as::<_, (i64,)>(
        "SELECT COUNT(*) FROM outbreak_actions WHERE pest_name = 'LOCUST'",
    )
    .fetch_one(&pool)
    .await
    .unwrap();
    assert_eq!(count, 3);

    let (title,) = sqlx::query_as::<_, (String,)>(
        "SELECT title FROM outbreak_actions WHERE recipient_id = $1",
    )
    .bind(recipients[0].id)
    .fetch_one(&pool)
    .await
    .unwrap();
    assert_eq!(title, "URGENT: LOCUST Outbreak");
}

#[tokio::test]
async fn assign_actions_with_no_recipients_is_noop() {
    let Some(pool) = test_pool().await else {
        return;
    };
    let store = ReportStore::new(pool);

    let action = EscalationAction::outbreak("APHIDS", CENTER, 15.0);
    store.assign_actions(&action, &[]).await.unwrap();
}

#[tokio::test]
async fn assign_actions_writes_nothing_when_one_insert_fails() {
    let Some(pool) = test_pool().await else {
        return;
    };
    let store = ReportStore::new(pool.clone());

    let known = Recipient {
        id: seed_recipient(&pool, "known@example.com", CENTER.lat, CENTER.lng).await,
        email: "known@example.com".to_string(),
        location: CENTER,
    };
    // No recipients row, so this insert breaks the foreign key.
    let unknown = Recipient {
        id: Uuid::new_v4(),
        email: "unknown@example.com".to_string(),
        location: CENTER,
    };

    let action = EscalationAction::outbreak("LOCUST", CENTER, 15.0);
    let result = store.assign_actions(&action, &[known, unknown]).await;
    assert!(result.is_err());

    // The batch rolls back as a whole, including the known recipient's row.
    let (count,) = sqlx::query_as::<_, (i64,)>("SELECT COUNT(*) FROM outbreak_actions")
        .fetch_one(&pool)
        .await
        .unwrap();
    assert_eq!(count, 0);
}
