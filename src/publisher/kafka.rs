use async_trait::async_trait;
use futures_util::future::join_all;
use std::sync::Arc;
use std::time::Instant;

use super::audit::AuditPublisher;
use super::dlq::{DeadLetterRouter, FAILURE_SOURCE_PUBLISHER};
use super::errors::PublishError;
use super::{BatchReport, EventPublisher};
use crate::events::{serialize_event, PatientEvent};
use crate::messaging::{
    MessageBroker, OutboundMessage, HEADER_AGGREGATE_TYPE, HEADER_CORRELATION_ID, HEADER_EVENT_ID, HEADER_EVENT_TYPE,
};
use crate::metrics::Metrics;
use crate::utils::{retry_on_transient, RetryConfig, RetryResult};

const RETRY_OPERATION: &str = "publish_patient_event";

// ============================================================================
// Broker-backed Event Publisher
// ============================================================================
//
// publish            serialize -> send keyed by patient id -> audit
// publish_with_retry publish under exponential backoff; exhausted or
//                    permanently rejected deliveries go to the dead-letter
//                    topic. Serialization failures are returned as-is.
// publish_async      detached publish_with_retry on the configured budget,
//                    outcome logged
// publish_batch      concurrent publish of every event, joined
//
// ============================================================================

#[derive(Clone)]
pub struct KafkaEventPublisher {
    broker: Arc<dyn MessageBroker>,
    topic: String,
    retry: RetryConfig,
    dead_letters: DeadLetterRouter,
    audit: AuditPublisher,
    metrics: Option<Arc<Metrics>>,
}

impl KafkaEventPublisher {
    pub fn new(
        broker: Arc<dyn MessageBroker>,
        topic: impl Into<String>,
        retry: RetryConfig,
        dead_letters: DeadLetterRouter,
        audit: AuditPublisher,
    ) -> Self {
        Self {
            broker,
            topic: topic.into(),
            retry,
            dead_letters,
            audit,
            metrics: None,
        }
    }

    pub fn with_metrics(mut self, metrics: Arc<Metrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    fn outbound(&self, event: &PatientEvent, payload: String) -> OutboundMessage {
        OutboundMessage::new(&self.topic, event.patient_id(), payload)
            .with_header(HEADER_EVENT_ID, event.event_id())
            .with_header(HEADER_EVENT_TYPE, event.event_type().as_str())
            .with_header(HEADER_CORRELATION_ID, event.correlation_id())
            .with_header(HEADER_AGGREGATE_TYPE, event.base_event().aggregate_type())
    }

    /// Retry loop shared by `publish_with_retry` (caller-chosen budget) and
    /// `publish_async` (configured budget)
    async fn deliver_with_retry(&self, event: &PatientEvent, config: &RetryConfig) -> Result<(), PublishError> {
        let mut last_attempt = 0;
        let result = retry_on_transient(config, |attempt| {
            last_attempt = attempt;
            if attempt > 1 {
                tracing::info!(event_id = %event.event_id(), attempt, "Retrying patient event publish");
                if let Some(metrics) = &self.metrics {
                    metrics.record_retry_attempt(RETRY_OPERATION, attempt);
                }
            }
            self.publish(event)
        })
        .await;

        let (error, attempts) = match result {
            RetryResult::Success(()) => {
                if last_attempt > 1 {
                    if let Some(metrics) = &self.metrics {
                        metrics.record_retry_outcome(RETRY_OPERATION, true);
                    }
                }
                return Ok(());
            }
            // Re-encoding the same event cannot succeed on the dead-letter topic either
            RetryResult::PermanentFailure { error: error @ PublishError::Serialization { .. }, .. } => {
                return Err(error)
            }
            RetryResult::Exhausted { error, attempts } | RetryResult::PermanentFailure { error, attempts } => {
                (error, attempts)
            }
        };

        if let Some(metrics) = &self.metrics {
            metrics.record_retry_outcome(RETRY_OPERATION, false);
        }

        let last_error = error.to_string();
        self.dead_letters
            .route_event(event, &last_error, attempts.saturating_sub(1), FAILURE_SOURCE_PUBLISHER)
            .await;

        Err(PublishError::RetriesExhausted {
            event_id: event.event_id().to_string(),
            attempts,
            last_error,
        })
    }

    fn record_failure(&self, event: &PatientEvent, error: &PublishError) {
        if let Some(metrics) = &self.metrics {
            metrics.record_publish_failure(event.event_type().as_str(), error.reason());
        }
    }
}

#[async_trait]
impl EventPublisher for KafkaEventPublisher {
    async fn publish(&self, event: &PatientEvent) -> Result<(), PublishError> {
        let payload = serialize_event(event).map_err(|source| {
            tracing::error!(event_id = %event.event_id(), error = %source, "Failed to serialize patient event");
            PublishError::Serialization {
                event_id: event.event_id().to_string(),
                source,
            }
        });
        let payload = match payload {
            Ok(payload) => payload,
            Err(e) => {
                self.record_failure(event, &e);
                return Err(e);
            }
        };

        tracing::info!(
            event_id = %event.event_id(),
            event_type = %event.event_type(),
            patient_id = %event.patient_id(),
            "Publishing patient event"
        );
        tracing::debug!(payload = %payload, "Event payload");

        let started = Instant::now();
        match self.broker.send(self.outbound(event, payload)).await {
            Ok(receipt) => {
                tracing::info!(
                    event_id = %event.event_id(),
                    topic = %receipt.topic,
                    partition = ?receipt.partition,
                    offset = ?receipt.offset,
                    "Patient event published"
                );
                if let Some(metrics) = &self.metrics {
                    metrics.record_published(event.event_type().as_str(), started.elapsed().as_secs_f64());
                }
                self.audit.spawn_audit(event);
                Ok(())
            }
            Err(source) => {
                let error = PublishError::Delivery {
                    event_id: event.event_id().to_string(),
                    topic: self.topic.clone(),
                    source,
                };
                self.record_failure(event, &error);
                Err(error)
            }
        }
    }

    async fn publish_with_retry(&self, event: &PatientEvent, max_retries: u32) -> Result<(), PublishError> {
        self.deliver_with_retry(event, &self.retry.with_max_retries(max_retries))
            .await
    }

    fn publish_async(&self, event: PatientEvent) {
        let publisher = self.clone();
        tokio::spawn(async move {
            match publisher.deliver_with_retry(&event, &publisher.retry).await {
                Ok(()) => tracing::debug!(event_id = %event.event_id(), "Async event publishing completed"),
                Err(e) => tracing::error!(event_id = %event.event_id(), error = %e, "Async event publishing failed"),
            }
        });
    }

    async fn publish_batch(&self, events: &[PatientEvent]) -> BatchReport {
        tracing::info!(count = events.len(), "Publishing batch of patient events");

        let outcomes = join_all(events.iter().map(|event| self.publish(event))).await;

        let failed = outcomes.iter().filter(|outcome| outcome.is_err()).count();
        let report = BatchReport {
            published: outcomes.len() - failed,
            failed,
        };

        if report.all_published() {
            tracing::info!(count = report.published, "Batch of patient events published");
        } else {
            tracing::error!(
                published = report.published,
                failed = report.failed,
                "Batch of patient events partially failed"
            );
        }
        report
    }
}
