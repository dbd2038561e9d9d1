mod server;

use prometheus::{HistogramOpts, HistogramVec, IntCounter, IntCounterVec, IntGauge, Opts, Registry};

pub use server::start_metrics_server;

// ============================================================================
// Metrics - Prometheus instrumentation for the event pipeline
// ============================================================================
//
// - Publishing: throughput by event type, failures by reason, latency
// - Retries: attempts per publish, final outcomes
// - Dead letters: totals, by event type and failure source
// - Audit sink and consumer outcomes, consumer redeliveries
// - Broker circuit breaker state
//
// Scraped through /metrics (see server.rs).
// ============================================================================

pub struct Metrics {
    registry: Registry,

    // Publishing
    pub events_published: IntCounterVec,
    pub events_failed: IntCounterVec,
    pub publish_duration: HistogramVec,

    // Retry
    pub retry_attempts_total: IntCounterVec,
    pub retry_success: IntCounterVec,
    pub retry_failure: IntCounterVec,

    // Dead letters
    pub dlq_messages_total: IntCounter,
    pub dlq_messages_by_event_type: IntCounterVec,

    // Audit + consumer
    pub audit_events: IntCounterVec,
    pub consumer_messages: IntCounterVec,
    pub consumer_redeliveries: IntCounter,

    pub circuit_breaker_state: IntGauge,
}

impl Metrics {
    pub fn new() -> anyhow::Result<Self> {
        let registry = Registry::new();

        let events_published = IntCounterVec::new(
            Opts::new("patient_events_published_total", "Patient events acknowledged by the broker"),
            &["event_type"],
        )?;
        registry.register(Box::new(events_published.clone()))?;

        let events_failed = IntCounterVec::new(
            Opts::new("patient_events_failed_total", "Patient events that could not be published"),
            &["event_type", "reason"],
        )?;
        registry.register(Box::new(events_failed.clone()))?;

        let publish_duration = HistogramVec::new(
            HistogramOpts::new("patient_event_publish_duration_seconds", "Time from send to broker acknowledgment")
                .buckets(vec![0.001, 0.005, 0.01, 0.05, 0.1, 0.5, 1.0, 5.0]),
            &["event_type"],
        )?;
        registry.register(Box::new(publish_duration.clone()))?;

        let retry_attempts_total = IntCounterVec::new(
            Opts::new("retry_attempts_total", "Publish retry attempts"),
            &["operation", "attempt"],
        )?;
        registry.register(Box::new(retry_attempts_total.clone()))?;

        let retry_success = IntCounterVec::new(
            Opts::new("retry_success_total", "Publishes that succeeded after at least one retry"),
            &["operation"],
        )?;
        registry.register(Box::new(retry_success.clone()))?;

        let retry_failure = IntCounterVec::new(
            Opts::new("retry_failure_total", "Publishes that failed after all attempts"),
            &["operation"],
        )?;
        registry.register(Box::new(retry_failure.clone()))?;

        let dlq_messages_total = IntCounter::new("dlq_messages_total", "Records written to the dead-letter topic")?;
        registry.register(Box::new(dlq_messages_total.clone()))?;

        let dlq_messages_by_event_type = IntCounterVec::new(
            Opts::new("dlq_messages_by_event_type", "Dead-letter records by event type and failure source"),
            &["event_type", "source"],
        )?;
        registry.register(Box::new(dlq_messages_by_event_type.clone()))?;

        let audit_events = IntCounterVec::new(
            Opts::new("audit_events_total", "Audit records by outcome"),
            &["outcome"],
        )?;
        registry.register(Box::new(audit_events.clone()))?;

        let consumer_messages = IntCounterVec::new(
            Opts::new("consumer_messages_total", "Consumed patient events by type and outcome"),
            &["event_type", "outcome"],
        )?;
        registry.register(Box::new(consumer_messages.clone()))?;

        let consumer_redeliveries = IntCounter::new(
            "consumer_redeliveries_total",
            "Partition rewinds after a handler failure",
        )?;
        registry.register(Box::new(consumer_redeliveries.clone()))?;

        let circuit_breaker_state = IntGauge::new(
            "circuit_breaker_state",
            "Broker producer circuit breaker state (0=Closed, 1=HalfOpen, 2=Open)",
        )?;
        registry.register(Box::new(circuit_breaker_state.clone()))?;

        Ok(Self {
            registry,
            events_published,
            events_failed,
            publish_duration,
            retry_attempts_total,
            retry_success,
            retry_failure,
            dlq_messages_total,
            dlq_messages_by_event_type,
            audit_events,
            consumer_messages,
            consumer_redeliveries,
            circuit_breaker_state,
        })
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn record_published(&self, event_type: &str, duration_secs: f64) {
        self.events_published.with_label_values(&[event_type]).inc();
        self.publish_duration.with_label_values(&[event_type]).observe(duration_secs);
    }

    pub fn record_publish_failure(&self, event_type: &str, reason: &str) {
        self.events_failed.with_label_values(&[event_type, reason]).inc();
    }

    pub fn record_retry_attempt(&self, operation: &str, attempt: u32) {
        self.retry_attempts_total
            .with_label_values(&[operation, &attempt.to_string()])
            .inc();
    }

    pub fn record_retry_outcome(&self, operation: &str, success: bool) {
        if success {
            self.retry_success.with_label_values(&[operation]).inc();
        } else {
            self.retry_failure.with_label_values(&[operation]).inc();
        }
    }

    pub fn record_dlq_message(&self, event_type: &str, source: &str) {
        self.dlq_messages_total.inc();
        self.dlq_messages_by_event_type
            .with_label_values(&[event_type, source])
            .inc();
    }

    pub fn record_audit(&self, success: bool) {
        let outcome = if success { "published" } else { "failed" };
        self.audit_events.with_label_values(&[outcome]).inc();
    }

    pub fn record_consumed(&self, event_type: &str, outcome: &str) {
        self.consumer_messages.with_label_values(&[event_type, outcome]).inc();
    }

    pub fn record_redelivery(&self) {
        self.consumer_redeliveries.inc();
    }

    pub fn update_circuit_breaker_state(&self, state: i64) {
        self.circuit_breaker_state.set(state);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn counter_value(metrics: &Metrics, name: &str) -> Option<f64> {
        let gathered = metrics.registry.gather();
        let family = gathered.iter().find(|m| m.name() == name)?;
        family.metric[0].counter.value
    }

    #[test]
    fn test_metrics_creation() {
        let metrics = Metrics::new().unwrap();
        assert!(!metrics.registry.gather().is_empty());
    }

    #[test]
    fn test_record_published() {
        let metrics = Metrics::new().unwrap();
        metrics.record_published("PATIENT_REGISTERED", 0.02);

        assert_eq!(counter_value(&metrics, "patient_events_published_total"), Some(1.0));
    }

    #[test]
    fn test_record_retry() {
        let metrics = Metrics::new().unwrap();
        metrics.record_retry_attempt("publish_patient_event", 2);
        metrics.record_retry_attempt("publish_patient_event", 3);
        metrics.record_retry_outcome("publish_patient_event", false);

        let gathered = metrics.registry.gather();
        let attempts = gathered.iter().find(|m| m.name() == "retry_attempts_total").unwrap();
        assert_eq!(attempts.metric.len(), 2);
        assert_eq!(counter_value(&metrics, "retry_failure_total"), Some(1.0));
    }

    #[test]
    fn test_record_dlq_message() {
        let metrics = Metrics::new().unwrap();
        metrics.record_dlq_message("PATIENT_REGISTERED", "publisher");
        metrics.record_dlq_message("PATIENT_UPDATED", "consumer");

        assert_eq!(counter_value(&metrics, "dlq_messages_total"), Some(2.0));
    }

    #[test]
    fn test_circuit_breaker_gauge() {
        let metrics = Metrics::new().unwrap();
        metrics.update_circuit_breaker_state(2);

        let gathered = metrics.registry.gather();
        let state = gathered.iter().find(|m| m.name() == "circuit_breaker_state").unwrap();
        assert_eq!(state.metric[0].gauge.value, Some(2.0));
    }
}
