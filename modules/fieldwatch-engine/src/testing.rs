// Test mocks for the escalation pipeline.
//
// Four mocks matching the four trait boundaries:
// - MockClassifier (Classifier): returns registered verdicts by title
// - MockStore (EscalationStore): stateful in-memory rows and claims
// - MockMailer (Mailer): records sends, optional per-address failure
// - MockRemover (ObjectRemover): records removals, optional per-path failure
//
// Plus helpers for constructing Report, Recipient, and PestVerdict values.

use std::collections::{HashMap, HashSet};
use std::sync::Mutex;

use anyhow::bail;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use fieldwatch_common::error::FieldwatchError;
use fieldwatch_common::types::{
    EscalationAction, GeoPoint, PestVerdict, Recipient, Report, VerdictState,
};

use crate::traits::{
    Classifier, CountScope, EscalationClaims, GeoAggregator, Mailer, ObjectRemover, VerdictStore,
};

// ---------------------------------------------------------------------------
// Test constants
// ---------------------------------------------------------------------------

/// Nairobi, Kenya coordinates.
pub const NAIROBI: (f64, f64) = (-1.2921, 36.8219);
/// Thika, Kenya coordinates (~40km from Nairobi).
pub const THIKA: (f64, f64) = (-1.0333, 37.0693);
/// Eldoret, Kenya coordinates (~265km from Nairobi).
pub const ELDORET: (f64, f64) = (0.5143, 35.2698);

// ---------------------------------------------------------------------------
// MockClassifier
// ---------------------------------------------------------------------------

/// HashMap-based classifier. Returns `Err` for unregistered titles unless a
/// default verdict is set. Builder pattern: `.on_title()`, `.with_default()`,
/// `.failing()`.
pub struct MockClassifier {
    verdicts: HashMap<String, PestVerdict>,
    default_verdict: Option<PestVerdict>,
    fail: bool,
    calls: Mutex<u32>,
}

impl MockClassifier {
    pub fn new() -> Self {
        Self {
            verdicts: HashMap::new(),
            default_verdict: None,
            fail: false,
            calls: Mutex::new(0),
        }
    }

    pub fn on_title(mut self, title: &str, verdict: PestVerdict) -> Self {
        self.verdicts.insert(title.to_string(), verdict);
        self
    }

    pub fn with_default(mut self, verdict: PestVerdict) -> Self {
        self.default_verdict = Some(verdict);
        self
    }

    /// Make `classify` return a classification error for every call.
    pub fn failing(mut self) -> Self {
        self.fail = true;
        self
    }

    pub fn calls(&self) -> u32 {
        *self.calls.lock().unwrap()
    }
}

impl Default for MockClassifier {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Classifier for MockClassifier {
    async fn classify(&self, title: &str, _body: &str) -> Result<PestVerdict, FieldwatchError> {
        *self.calls.lock().unwrap() += 1;
        if self.fail {
            return Err(FieldwatchError::classification(
                "MockClassifier: forced failure",
            ));
        }
        self.verdicts
            .get(title)
            .or(self.default_verdict.as_ref())
            .cloned()
            .ok_or_else(|| {
                FieldwatchError::classification(format!(
                    "MockClassifier: no verdict registered for {title}"
                ))
            })
    }
}

// ---------------------------------------------------------------------------
// MockStore
// ---------------------------------------------------------------------------

/// Inner mutable state for MockStore.
struct MockStoreInner {
    /// Journal of persisted verdicts, in call order.
    verdicts: Vec<(Uuid, VerdictState, PestVerdict)>,
    corroborations: u64,
    recipients: Vec<Recipient>,
    /// (pest, cell, window_start) claim rows, first insert wins.
    claims: HashSet<(String, String, DateTime<Utc>)>,
    actions: Vec<(EscalationAction, Vec<Recipient>)>,
    /// Operation names in call order, for sequencing assertions.
    call_log: Vec<String>,
    last_scope: Option<CountScope>,
    last_recipients_radius: Option<f64>,
    fail_update: bool,
    fail_count: bool,
    fail_recipients: bool,
    fail_claim: bool,
    fail_assign: bool,
}

/// Stateful in-memory store mock. Thread-safe via interior Mutex.
/// The claim set behaves like the real table: the first `claim` for a
/// (pest, cell, window) wins, every later one loses.
pub struct MockStore {
    inner: Mutex<MockStoreInner>,
}

impl MockStore {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(MockStoreInner {
                verdicts: Vec::new(),
                corroborations: 0,
                recipients: Vec::new(),
                claims: HashSet::new(),
                actions: Vec::new(),
                call_log: Vec::new(),
                last_scope: None,
                last_recipients_radius: None,
                fail_update: false,
                fail_count: false,
                fail_recipients: false,
                fail_claim: false,
                fail_assign: false,
            }),
        }
    }

    /// Fix the corroboration count returned for every query.
    pub fn with_corroborations(self, count: u64) -> Self {
        self.inner.lock().unwrap().corroborations = count;
        self
    }

    /// Pre-populate the recipients returned for every radius query.
    pub fn with_recipients(self, recipients: Vec<Recipient>) -> Self {
        self.inner.lock().unwrap().recipients = recipients;
        self
    }

    /// Pre-claim a (pest, cell, window) so a later claim loses the race.
    pub fn with_claimed(self, pest_name: &str, cell: &str, window_start: DateTime<Utc>) -> Self {
        self.inner.lock().unwrap().claims.insert((
            pest_name.to_string(),
            cell.to_string(),
            window_start,
        ));
        self
    }

    pub fn failing_update_verdict(self) -> Self {
        self.inner.lock().unwrap().fail_update = true;
        self
    }

    pub fn failing_count(self) -> Self {
        self.inner.lock().unwrap().fail_count = true;
        self
    }

    pub fn failing_recipients(self) -> Self {
        self.inner.lock().unwrap().fail_recipients = true;
        self
    }

    pub fn failing_claim(self) -> Self {
        self.inner.lock().unwrap().fail_claim = true;
        self
    }

    pub fn failing_assign(self) -> Self {
        self.inner.lock().unwrap().fail_assign = true;
        self
    }

    // --- Assertion helpers ---

    pub fn verdict_for(&self, report_id: Uuid) -> Option<(VerdictState, PestVerdict)> {
        let inner = self.inner.lock().unwrap();
        inner
            .verdicts
            .iter()
            .find(|(id, _, _)| *id == report_id)
            .map(|(_, state, verdict)| (*state, verdict.clone()))
    }

    pub fn verdicts_written(&self) -> usize {
        self.inner.lock().unwrap().verdicts.len()
    }

    pub fn claim_count(&self) -> usize {
        self.inner.lock().unwrap().claims.len()
    }

    pub fn actions_assigned(&self) -> usize {
        self.inner.lock().unwrap().actions.len()
    }

    pub fn assigned_recipients(&self) -> usize {
        let inner = self.inner.lock().unwrap();
        inner.actions.iter().map(|(_, r)| r.len()).sum()
    }

    pub fn has_action_titled(&self, title: &str) -> bool {
        let inner = self.inner.lock().unwrap();
        inner.actions.iter().any(|(a, _)| a.title == title)
    }

    /// Operation names in the order the engine invoked them.
    pub fn call_log(&self) -> Vec<String> {
        self.inner.lock().unwrap().call_log.clone()
    }

    /// Scope passed to the most recent corroboration count.
    pub fn last_count_scope(&self) -> Option<CountScope> {
        self.inner.lock().unwrap().last_scope
    }

    /// Radius passed to the most recent recipient lookup.
    pub fn last_recipients_radius(&self) -> Option<f64> {
        self.inner.lock().unwrap().last_recipients_radius
    }
}

impl Default for MockStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl VerdictStore for MockStore {
    async fn update_verdict(
        &self,
        report_id: Uuid,
        state: VerdictState,
        verdict: &PestVerdict,
    ) -> Result<(), FieldwatchError> {
        let mut inner = self.inner.lock().unwrap();
        inner.call_log.push("update_verdict".to_string());
        if inner.fail_update {
            return Err(FieldwatchError::Persistence(
                "MockStore: update_verdict forced failure".to_string(),
            ));
        }
        inner.verdicts.push((report_id, state, verdict.clone()));
        Ok(())
    }
}

#[async_trait]
impl GeoAggregator for MockStore {
    async fn count_corroborating(
        &self,
        _pest_name: &str,
        _center: &GeoPoint,
        _radius_km: f64,
        scope: CountScope,
    ) -> Result<u64, FieldwatchError> {
        let mut inner = self.inner.lock().unwrap();
        inner.call_log.push("count_corroborating".to_string());
        inner.last_scope = Some(scope);
        if inner.fail_count {
            return Err(FieldwatchError::Aggregation(
                "MockStore: count_corroborating forced failure".to_string(),
            ));
        }
        Ok(inner.corroborations)
    }

    async fn recipients_near(
        &self,
        _center: &GeoPoint,
        radius_km: f64,
    ) -> Result<Vec<Recipient>, FieldwatchError> {
        let mut inner = self.inner.lock().unwrap();
        inner.call_log.push("recipients_near".to_string());
        inner.last_recipients_radius = Some(radius_km);
        if inner.fail_recipients {
            return Err(FieldwatchError::Aggregation(
                "MockStore: recipients_near forced failure".to_string(),
            ));
        }
        Ok(inner.recipients.clone())
    }
}

#[async_trait]
impl EscalationClaims for MockStore {
    async fn claim(
        &self,
        pest_name: &str,
        cell: &str,
        window_start: DateTime<Utc>,
    ) -> Result<bool, FieldwatchError> {
        let mut inner = self.inner.lock().unwrap();
        inner.call_log.push("claim".to_string());
        if inner.fail_claim {
            return Err(FieldwatchError::Persistence(
                "MockStore: claim forced failure".to_string(),
            ));
        }
        Ok(inner
            .claims
            .insert((pest_name.to_string(), cell.to_string(), window_start)))
    }

    async fn assign_actions(
        &self,
        action: &EscalationAction,
        recipients: &[Recipient],
    ) -> Result<(), FieldwatchError> {
        let mut inner = self.inner.lock().unwrap();
        inner.call_log.push("assign_actions".to_string());
        if inner.fail_assign {
            return Err(FieldwatchError::Persistence(
                "MockStore: assign_actions forced failure".to_string(),
            ));
        }
        inner.actions.push((action.clone(), recipients.to_vec()));
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// MockMailer
// ---------------------------------------------------------------------------

/// A recorded delivery attempt.
#[derive(Debug, Clone)]
pub struct SentEmail {
    pub to: String,
    pub subject: String,
    pub html: String,
}

struct MockMailerInner {
    sent: Vec<SentEmail>,
    failing: HashSet<String>,
}

/// Records every send. Addresses registered via `.failing_for()` bounce.
pub struct MockMailer {
    inner: Mutex<MockMailerInner>,
}

impl MockMailer {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(MockMailerInner {
                sent: Vec::new(),
                failing: HashSet::new(),
            }),
        }
    }

    pub fn failing_for(self, address: &str) -> Self {
        self.inner
            .lock()
            .unwrap()
            .failing
            .insert(address.to_string());
        self
    }

    // --- Assertion helpers ---

    pub fn sent_count(&self) -> usize {
        self.inner.lock().unwrap().sent.len()
    }

    pub fn sent(&self) -> Vec<SentEmail> {
        self.inner.lock().unwrap().sent.clone()
    }

    pub fn sent_to(&self, address: &str) -> bool {
        self.inner.lock().unwrap().sent.iter().any(|s| s.to == address)
    }
}

impl Default for MockMailer {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Mailer for MockMailer {
    async fn send(&self, to: &str, subject: &str, html: &str) -> anyhow::Result<()> {
        let mut inner = self.inner.lock().unwrap();
        if inner.failing.contains(to) {
            bail!("MockMailer: delivery to {to} forced failure");
        }
        inner.sent.push(SentEmail {
            to: to.to_string(),
            subject: subject.to_string(),
            html: html.to_string(),
        });
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// MockRemover
// ---------------------------------------------------------------------------

struct MockRemoverInner {
    removed: Vec<(String, String)>,
    failing: HashSet<String>,
}

/// Records every removal as (bucket, path). Paths registered via
/// `.failing_for()` fail.
pub struct MockRemover {
    inner: Mutex<MockRemoverInner>,
}

impl MockRemover {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(MockRemoverInner {
                removed: Vec::new(),
                failing: HashSet::new(),
            }),
        }
    }

    pub fn failing_for(self, path: &str) -> Self {
        self.inner.lock().unwrap().failing.insert(path.to_string());
        self
    }

    // --- Assertion helpers ---

    pub fn removed_count(&self) -> usize {
        self.inner.lock().unwrap().removed.len()
    }

    pub fn removed(&self, bucket: &str, path: &str) -> bool {
        self.inner
            .lock()
            .unwrap()
            .removed
            .iter()
            .any(|(b, p)| b == bucket && p == path)
    }
}

impl Default for MockRemover {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ObjectRemover for MockRemover {
    async fn remove(&self, bucket: &str, path: &str) -> anyhow::Result<()> {
        let mut inner = self.inner.lock().unwrap();
        if inner.failing.contains(path) {
            bail!("MockRemover: removal of {path} forced failure");
        }
        inner.removed.push((bucket.to_string(), path.to_string()));
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Test helpers
// ---------------------------------------------------------------------------

/// Create an accepted verdict (`is_legit: true`).
pub fn verdict(pest_name: &str, confidence: f32) -> PestVerdict {
    PestVerdict {
        is_legit: true,
        pest_name: pest_name.to_string(),
        confidence,
    }
}

/// Create a report with arbitrary tags.
pub fn report(title: &str, tags: &[&str], lat: f64, lng: f64) -> Report {
    Report {
        id: Uuid::new_v4(),
        title: title.to_string(),
        body: "Seen across the northern field this morning.".to_string(),
        tags: tags.iter().map(|t| t.to_string()).collect(),
        location: GeoPoint { lat, lng },
        created_at: Utc::now(),
        status: VerdictState::Pending,
        pest_detected: None,
        ai_confidence: None,
        photo_url: None,
        image_urls: Vec::new(),
    }
}

/// Create a report already tagged as a pest candidate.
pub fn pest_report(title: &str, lat: f64, lng: f64) -> Report {
    report(title, &["pest"], lat, lng)
}

/// Create a recipient at the given coordinates.
pub fn recipient(email: &str, lat: f64, lng: f64) -> Recipient {
    Recipient {
        id: Uuid::new_v4(),
        email: email.to_string(),
        location: GeoPoint { lat, lng },
    }
}

// ---------------------------------------------------------------------------
// Mock self-tests
// ---------------------------------------------------------------------------
