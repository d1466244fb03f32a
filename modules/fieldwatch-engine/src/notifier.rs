//! Bounded alert fan-out over a `Mailer`.
//!
//! Deliveries run with at most `concurrency` sends in flight. Each attempt
//! resolves to a [`DeliveryOutcome`] value, so one bounced address never
//! aborts the rest of the batch.

use std::sync::Arc;

use futures::{stream, StreamExt};
use serde::Serialize;
use tracing::{info, warn};

use fieldwatch_common::types::Recipient;

use crate::traits::Mailer;

/// Result of one delivery attempt, keyed by recipient email.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DeliveryOutcome {
    pub email: String,
    #[serde(flatten)]
    pub status: DeliveryStatus,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum DeliveryStatus {
    Delivered,
    Failed { reason: String },
}

impl DeliveryOutcome {
    pub fn is_delivered(&self) -> bool {
        matches!(self.status, DeliveryStatus::Delivered)
    }
}

pub struct AlertNotifier {
    mailer: Arc<dyn Mailer>,
    concurrency: usize,
}

impl AlertNotifier {
    pub fn new(mailer: Arc<dyn Mailer>, concurrency: usize) -> Self {
        Self {
            mailer,
            concurrency: concurrency.max(1),
        }
    }

    /// Sends one email per recipient and collects an outcome for each.
    pub async fn notify_all(
        &self,
        recipients: &[Recipient],
        subject: &str,
        html: &str,
    ) -> Vec<DeliveryOutcome> {
        // Each future owns its recipient so the batch stays Send.
        let sends = recipients.iter().cloned().map(|recipient| async move {
            match self.mailer.send(&recipient.email, subject, html).await {
                Ok(()) => {
                    info!(email = %recipient.email, "Alert delivered");
                    DeliveryOutcome {
                        email: recipient.email,
                        status: DeliveryStatus::Delivered,
                    }
                }
                Err(e) => {
                    warn!(email = %recipient.email, error = %e, "Alert delivery failed");
                    DeliveryOutcome {
                        email: recipient.email,
                        status: DeliveryStatus::Failed {
                            reason: e.to_string(),
                        },
                    }
                }
            }
        });

        stream::iter(sends)
            .buffer_unordered(self.concurrency)
            .collect()
            .await
    }
}
