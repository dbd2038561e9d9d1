use std::sync::Arc;

use crate::events::{serialize_event, AuditEvent, PatientEvent};
use crate::messaging::{MessageBroker, OutboundMessage, HEADER_EVENT_ID, HEADER_EVENT_TYPE};
use crate::metrics::Metrics;

// ============================================================================
// Audit Sink
// ============================================================================
//
// Projects each published patient event to an AuditEvent on the audit topic,
// keyed by patient id. One-way and best-effort: failures are logged and
// counted, never surfaced to the publisher.
//
// ============================================================================

#[derive(Clone)]
pub struct AuditPublisher {
    broker: Arc<dyn MessageBroker>,
    topic: String,
    metrics: Option<Arc<Metrics>>,
}

impl AuditPublisher {
    pub fn new(broker: Arc<dyn MessageBroker>, topic: impl Into<String>) -> Self {
        Self {
            broker,
            topic: topic.into(),
            metrics: None,
        }
    }

    pub fn with_metrics(mut self, metrics: Arc<Metrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// Returns whether the audit record was acknowledged
    pub async fn publish_audit_event(&self, event: &PatientEvent) -> bool {
        let audit = AuditEvent::from_patient_event(event);
        let payload = match serialize_event(&audit) {
            Ok(payload) => payload,
            Err(e) => {
                tracing::error!(patient_id = %event.patient_id(), error = %e, "Failed to serialize audit event");
                self.record(false);
                return false;
            }
        };

        let message = OutboundMessage::new(&self.topic, &audit.resource_id, payload)
            .with_header(HEADER_EVENT_ID, &audit.event_id)
            .with_header(HEADER_EVENT_TYPE, &audit.action);

        match self.broker.send(message).await {
            Ok(_) => {
                tracing::debug!(patient_id = %audit.resource_id, action = %audit.action, "Audit event published");
                self.record(true);
                true
            }
            Err(e) => {
                tracing::error!(patient_id = %audit.resource_id, error = %e, "Failed to publish audit event");
                self.record(false);
                false
            }
        }
    }

    /// Detached audit write
    pub fn spawn_audit(&self, event: &PatientEvent) {
        let audit = self.clone();
        let event = event.clone();
        tokio::spawn(async move {
            audit.publish_audit_event(&event).await;
        });
    }

    fn record(&self, success: bool) {
        if let Some(metrics) = &self.metrics {
            metrics.record_audit(success);
        }
    }
}
