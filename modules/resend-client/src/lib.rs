pub mod error;

pub use error::{ResendError, Result};

use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::debug;

const BASE_URL: &str = "https://api.resend.com";

/// An outgoing email in the shape Resend's /emails endpoint expects.
#[derive(Debug, Clone, Serialize)]
pub struct EmailRequest {
    pub from: String,
    pub to: Vec<String>,
    pub subject: String,
    pub html: String,
}

impl EmailRequest {
    pub fn new(from: &str, to: &str, subject: &str, html: &str) -> Self {
        Self {
            from: from.to_string(),
            to: vec![to.to_string()],
            subject: subject.to_string(),
            html: html.to_string(),
        }
    }
}

/// Successful send acknowledgement. Resend returns the message id.
#[derive(Debug, Clone, Deserialize)]
pub struct SendResponse {
    pub id: String,
}

pub struct ResendClient {
    client: reqwest::Client,
    api_key: String,
    base_url: String,
}

impl ResendClient {
    pub fn new(api_key: &str) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .expect("Failed to build HTTP client");

        Self {
            client,
            api_key: api_key.to_string(),
            base_url: BASE_URL.to_string(),
        }
    }

    pub fn with_base_url(mut self, url: &str) -> Self {
        self.base_url = url.trim_end_matches('/').to_string();
        self
    }

    /// Send a single email. Returns the Resend message id on success.
    pub async fn send(&self, email: &EmailRequest) -> Result<SendResponse> {
        let url = format!("{}/emails", self.base_url);

        debug!(to = ?email.to, subject = %email.subject, "Sending email via Resend");

        let resp = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(email)
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            let message = resp.text().await.unwrap_or_default();
            return Err(ResendError::Api {
                status: status.as_u16(),
                message,
            });
        }

        let ack: SendResponse = resp
            .json()
            .await
            .map_err(|e| ResendError::Parse(format!("invalid send response: {e}")))?;
        Ok(ack)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn email_request_serializes_to_wire_shape() {
        let email = EmailRequest::new(
            "onboarding@resend.dev",
            "farmer@example.com",
            "Alert",
            "<p>hi</p>",
        );
        let json = serde_json::to_value(&email).unwrap();
        assert_eq!(json["from"], "onboarding@resend.dev");
        assert_eq!(json["to"][0], "farmer@example.com");
        assert_eq!(json["subject"], "Alert");
        assert_eq!(json["html"], "<p>hi</p>");
    }
}
