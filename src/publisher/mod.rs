// ============================================================================
// Event Publishing
// ============================================================================
//
// EventPublisher is an optional capability of the patient service: the
// broker-backed implementation when publishing is enabled, the no-op
// DisabledEventPublisher otherwise. Chosen once at startup.
//
// ============================================================================

pub mod audit;
pub mod dlq;
pub mod errors;
pub mod kafka;

use async_trait::async_trait;

use crate::events::PatientEvent;

pub use audit::AuditPublisher;
pub use dlq::{DeadLetterRouter, FAILURE_SOURCE_CONSUMER, FAILURE_SOURCE_PUBLISHER};
pub use errors::PublishError;
pub use kafka::KafkaEventPublisher;

/// Per-event outcome counts of a batch publish
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BatchReport {
    pub published: usize,
    pub failed: usize,
}

impl BatchReport {
    pub fn all_published(&self) -> bool {
        self.failed == 0
    }
}

#[async_trait]
pub trait EventPublisher: Send + Sync {
    /// Resolves after the broker acknowledged the event
    async fn publish(&self, event: &PatientEvent) -> Result<(), PublishError>;

    /// Retries transient failures up to `max_retries` times, then dead-letters
    async fn publish_with_retry(&self, event: &PatientEvent, max_retries: u32) -> Result<(), PublishError>;

    /// Fire-and-forget; failures are only logged
    fn publish_async(&self, event: PatientEvent);

    /// Publishes concurrently. One failure does not stop the others, and the
    /// batch as a whole always completes; see the returned counts.
    async fn publish_batch(&self, events: &[PatientEvent]) -> BatchReport;
}

/// Publisher used when event publishing is switched off
#[derive(Debug, Clone, Default)]
pub struct DisabledEventPublisher;

#[async_trait]
impl EventPublisher for DisabledEventPublisher {
    async fn publish(&self, event: &PatientEvent) -> Result<(), PublishError> {
        tracing::debug!(event_id = %event.event_id(), "Event publishing disabled, dropping event");
        Ok(())
    }

    async fn publish_with_retry(&self, event: &PatientEvent, _max_retries: u32) -> Result<(), PublishError> {
        self.publish(event).await
    }

    fn publish_async(&self, event: PatientEvent) {
        tracing::debug!(event_id = %event.event_id(), "Event publishing disabled, dropping event");
    }

    async fn publish_batch(&self, events: &[PatientEvent]) -> BatchReport {
        tracing::debug!(count = events.len(), "Event publishing disabled, dropping batch");
        BatchReport::default()
    }
}
