pub mod classifier;
pub mod escalation;
pub mod media;
pub mod notifier;
#[cfg(any(test, feature = "test-support"))]
pub mod testing;
pub mod traits;

pub use classifier::PestClassifier;
pub use escalation::{BroadcastOutcome, EngineSettings, EscalationEngine, EscalationOutcome};
pub use media::{media_urls, CleanupOutcome, CleanupStatus, MediaCleaner};
pub use notifier::{AlertNotifier, DeliveryOutcome, DeliveryStatus};
pub use traits::{
    Classifier, CountScope, EscalationClaims, EscalationStore, GeoAggregator, Mailer,
    ObjectRemover, ResendMailer, VerdictStore,
};
