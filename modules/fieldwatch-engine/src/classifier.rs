//! Pest verdict classification via Gemini.
//!
//! Builds the analysis prompt from a report's title and body, calls the
//! model, and parses the reply into a [`PestVerdict`]. Replies are cleaned
//! before parsing: markdown fences are stripped and the JSON object is read
//! from the first `{` to the last `}`, so a chatty preamble around the
//! payload does not break the run.

use async_trait::async_trait;
use serde::Deserialize;
use tracing::debug;

use fieldwatch_common::error::FieldwatchError;
use fieldwatch_common::types::PestVerdict;
use gemini_client::GeminiClient;

use crate::traits::Classifier;

/// Cap on each report field interpolated into the prompt, in bytes.
const MAX_FIELD_BYTES: usize = 4_000;

/// Wire shape of the model's verdict JSON.
#[derive(Debug, Deserialize)]
struct PestAnalysis {
    is_legit: bool,
    pest_name: String,
    confidence: f32,
}

pub struct PestClassifier {
    client: GeminiClient,
}

impl PestClassifier {
    pub fn new(client: GeminiClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl Classifier for PestClassifier {
    async fn classify(&self, title: &str, body: &str) -> Result<PestVerdict, FieldwatchError> {
        let prompt = build_prompt(title, body);
        let raw = self
            .client
            .generate(&prompt)
            .await
            .map_err(|e| FieldwatchError::classification(e.to_string()))?;

        let verdict = parse_verdict(&raw)?;
        debug!(
            pest = %verdict.pest_name,
            confidence = verdict.confidence,
            is_legit = verdict.is_legit,
            "Parsed model analysis"
        );
        Ok(verdict)
    }
}

fn build_prompt(title: &str, body: &str) -> String {
    format!(
        "Analyze this agricultural post for potential pest outbreaks.\n\
         Post Title: \"{title}\"\n\
         Post Content: \"{body}\"\n\n\
         Return ONLY a JSON object (no markdown, no backticks) with:\n\
         \"is_legit\": boolean (true if it's a real report, false if spam/scam),\n\
         \"pest_name\": string (Use a standard name like \"LOCUST\", \"FALL ARMYWORM\", \"APHIDS\"),\n\
         \"confidence\": number (0.0 to 1.0)",
        title = truncated(title),
        body = truncated(body),
    )
}

fn truncated(text: &str) -> &str {
    if text.len() <= MAX_FIELD_BYTES {
        return text;
    }
    let mut end = MAX_FIELD_BYTES;
    while !text.is_char_boundary(end) {
        end -= 1;
    }
    &text[..end]
}

fn parse_verdict(raw: &str) -> Result<PestVerdict, FieldwatchError> {
    let cleaned = raw.replace("```json", "").replace("```", "");
    let cleaned = cleaned.trim();

    let (start, end) = match (cleaned.find('{'), cleaned.rfind('}')) {
        (Some(s), Some(e)) if s < e => (s, e),
        _ => {
            return Err(FieldwatchError::classification_with_raw(
                "no JSON object in model output",
                raw,
            ));
        }
    };

    let analysis: PestAnalysis = serde_json::from_str(&cleaned[start..=end]).map_err(|e| {
        FieldwatchError::classification_with_raw(format!("malformed analysis JSON: {e}"), raw)
    })?;

    Ok(PestVerdict {
        is_legit: analysis.is_legit,
        pest_name: analysis.pest_name,
        confidence: analysis.confidence.clamp(0.0, 1.0),
    })
}
