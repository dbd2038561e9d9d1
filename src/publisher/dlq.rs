use std::sync::Arc;

use crate::events::{serialize_event, wire_now, wire_time, Metadata, PatientEvent};
use crate::messaging::{
    InboundMessage, MessageBroker, OutboundMessage, HEADER_AGGREGATE_TYPE, HEADER_CORRELATION_ID, HEADER_EVENT_ID,
    HEADER_EVENT_TYPE,
};
use crate::metrics::Metrics;

// ============================================================================
// Dead Letter Router
// ============================================================================
//
// Final destination for events that could not be delivered or processed.
// A dead-letter record is the original event, identity and correlation intact,
// with the failure merged into its metadata:
//
//   originalError, errorTimestamp, retryCount, failureSource
//
// Payloads that never decoded into an event travel verbatim, the same facts
// carried as record headers.
//
// Routing is best-effort: a failed dead-letter send is logged and counted.
//
// ============================================================================

pub const FAILURE_SOURCE_PUBLISHER: &str = "publisher";
pub const FAILURE_SOURCE_CONSUMER: &str = "consumer";

const HEADER_ORIGINAL_ERROR: &str = "originalError";
const HEADER_ERROR_TIMESTAMP: &str = "errorTimestamp";
const HEADER_RETRY_COUNT: &str = "retryCount";
const HEADER_FAILURE_SOURCE: &str = "failureSource";

#[derive(Clone)]
pub struct DeadLetterRouter {
    broker: Arc<dyn MessageBroker>,
    topic: String,
    metrics: Option<Arc<Metrics>>,
}

impl DeadLetterRouter {
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

    /// The event as it will be stored on the dead-letter topic
    pub fn dead_letter_event(event: &PatientEvent, error: &str, retry_count: u32, source: &str) -> PatientEvent {
        let mut failure = Metadata::new();
        failure.insert("originalError".into(), error.into());
        failure.insert("errorTimestamp".into(), wire_time::format(&wire_now()).into());
        failure.insert("retryCount".into(), retry_count.into());
        failure.insert("failureSource".into(), source.into());
        event.with_additional_metadata(failure)
    }

    /// Returns whether the record reached the dead-letter topic
    pub async fn route_event(&self, event: &PatientEvent, error: &str, retry_count: u32, source: &str) -> bool {
        tracing::error!(
            event_id = %event.event_id(),
            event_type = %event.event_type(),
            patient_id = %event.patient_id(),
            error = %error,
            retry_count,
            source = %source,
            "Routing event to dead letter topic"
        );

        let dead_letter = Self::dead_letter_event(event, error, retry_count, source);
        let payload = match serialize_event(&dead_letter) {
            Ok(payload) => payload,
            Err(e) => {
                tracing::error!(event_id = %event.event_id(), error = %e, "Failed to serialize dead letter record");
                return false;
            }
        };

        let message = OutboundMessage::new(&self.topic, event.patient_id(), payload)
            .with_header(HEADER_EVENT_ID, event.event_id())
            .with_header(HEADER_EVENT_TYPE, event.event_type().as_str())
            .with_header(HEADER_CORRELATION_ID, event.correlation_id())
            .with_header(HEADER_AGGREGATE_TYPE, event.base_event().aggregate_type())
            .with_header(HEADER_FAILURE_SOURCE, source);

        self.send(message, event.event_type().as_str(), source).await
    }

    /// Dead-letter a consumed record whose payload is not a decodable event
    pub async fn route_raw(&self, message: &InboundMessage, error: &str, retry_count: u32) -> bool {
        tracing::error!(
            topic = %message.topic,
            partition = message.partition,
            offset = message.offset,
            error = %error,
            "Routing undecodable record to dead letter topic"
        );

        let payload = message
            .payload
            .as_deref()
            .map(|bytes| String::from_utf8_lossy(bytes).into_owned())
            .unwrap_or_default();
        let key = message.key.clone().unwrap_or_default();

        let mut outbound = OutboundMessage::new(&self.topic, key, payload);
        outbound.headers = message.headers.clone();
        let outbound = outbound
            .with_header(HEADER_ORIGINAL_ERROR, error)
            .with_header(HEADER_ERROR_TIMESTAMP, wire_time::format(&wire_now()))
            .with_header(HEADER_RETRY_COUNT, retry_count.to_string())
            .with_header(HEADER_FAILURE_SOURCE, FAILURE_SOURCE_CONSUMER);

        let event_type = message.header(HEADER_EVENT_TYPE).unwrap_or("UNKNOWN").to_string();
        self.send(outbound, &event_type, FAILURE_SOURCE_CONSUMER).await
    }

    async fn send(&self, message: OutboundMessage, event_type: &str, source: &str) -> bool {
        match self.broker.send(message).await {
            Ok(receipt) => {
                tracing::warn!(
                    topic = %receipt.topic,
                    partition = ?receipt.partition,
                    offset = ?receipt.offset,
                    "Dead letter record stored"
                );
                if let Some(metrics) = &self.metrics {
                    metrics.record_dlq_message(event_type, source);
                }
                true
            }
            Err(e) => {
                tracing::error!(topic = %self.topic, error = %e, "Failed to send record to dead letter topic");
                if let Some(metrics) = &self.metrics {
                    metrics.record_publish_failure(event_type, "dead_letter");
                }
                false
            }
        }
    }
}
