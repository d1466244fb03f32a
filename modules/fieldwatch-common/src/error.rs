use thiserror::Error;

/// Run-level failure taxonomy for the escalation pipeline.
///
/// Per-recipient delivery failures and per-URL cleanup failures are values
/// collected by the fan-out stages, never raised through this enum.
#[derive(Error, Debug)]
pub enum FieldwatchError {
    /// Upstream AI call failed, timed out, or returned text with no
    /// parsable payload. Carries the raw response verbatim so a failed run
    /// can be triaged without replaying the event.
    #[error("AI analysis failed: {detail}")]
    Classification {
        detail: String,
        raw_response: Option<String>,
    },

    #[error("Verdict persistence failed: {0}")]
    Persistence(String),

    #[error("Aggregation query failed: {0}")]
    Aggregation(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error(transparent)]
    Anyhow(#[from] anyhow::Error),
}

impl FieldwatchError {
    pub fn classification(detail: impl Into<String>) -> Self {
        Self::Classification {
            detail: detail.into(),
            raw_response: None,
        }
    }

    pub fn classification_with_raw(detail: impl Into<String>, raw: impl Into<String>) -> Self {
        Self::Classification {
            detail: detail.into(),
            raw_response: Some(raw.into()),
        }
    }
}
