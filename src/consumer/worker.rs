use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;

use super::handler::{dispatch, Dispatch, PatientEventHandler};
use crate::events::{EventValidator, PatientEvent};
use crate::messaging::{InboundMessage, MessageSource};
use crate::metrics::Metrics;
use crate::publisher::{DeadLetterRouter, FAILURE_SOURCE_CONSUMER};

// ============================================================================
// Consumer Worker
// ============================================================================
//
// poll loop ──► per-partition channel (bounded) ──► partition task
//
// Partition tasks run concurrently with each other and strictly in order
// within their partition. A record is committed only after its handler
// returned Ok, or after it was stored on the dead-letter topic.
//
// Handler failure: the partition is rewound to the failed offset and every
// buffered record past it is dropped until the failed record comes back.
// After `max_redeliveries` failed deliveries of one offset the record is
// dead-lettered and committed. Records that do not decode into a patient
// event are dead-lettered on first sight.
//
// Failure counts are kept in memory; a restart starts them over.
//
// ============================================================================

#[derive(Debug, Clone)]
pub struct ConsumerConfig {
    pub max_redeliveries: u32,
    /// Records buffered per partition task before the poll loop waits
    pub max_in_flight: usize,
    /// Pause before a failed record is redelivered
    pub redelivery_delay: Duration,
    /// Pause after an empty poll
    pub idle_backoff: Duration,
}

impl Default for ConsumerConfig {
    fn default() -> Self {
        Self {
            max_redeliveries: 5,
            max_in_flight: 10,
            redelivery_delay: Duration::from_millis(500),
            idle_backoff: Duration::from_millis(50),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessOutcome {
    /// Committed after dispatch
    Committed(Dispatch),
    /// Stored on the dead-letter topic, then committed
    DeadLettered,
    /// Left uncommitted; the partition was rewound to this record
    Redeliver,
}

struct WorkerInner {
    source: Arc<dyn MessageSource>,
    handler: Arc<dyn PatientEventHandler>,
    dead_letters: DeadLetterRouter,
    validator: EventValidator,
    config: ConsumerConfig,
    failures: Mutex<HashMap<(String, i32, i64), u32>>,
}

#[derive(Clone)]
pub struct ConsumerWorker {
    inner: Arc<WorkerInner>,
    metrics: Option<Arc<Metrics>>,
}

impl ConsumerWorker {
    pub fn new(
        source: Arc<dyn MessageSource>,
        handler: Arc<dyn PatientEventHandler>,
        dead_letters: DeadLetterRouter,
        config: ConsumerConfig,
    ) -> Self {
        Self {
            inner: Arc::new(WorkerInner {
                source,
                handler,
                dead_letters,
                validator: EventValidator::new(),
                config,
                failures: Mutex::new(HashMap::new()),
            }),
            metrics: None,
        }
    }

    pub fn with_metrics(mut self, metrics: Arc<Metrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// Poll until `shutdown` flips to true (or its sender is dropped), then let
    /// every partition task drain its buffer and exit.
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) -> anyhow::Result<()> {
        let mut partitions: HashMap<i32, (mpsc::Sender<InboundMessage>, JoinHandle<()>)> = HashMap::new();
        tracing::info!(
            max_in_flight = self.inner.config.max_in_flight,
            max_redeliveries = self.inner.config.max_redeliveries,
            "Consumer worker started"
        );

        while !*shutdown.borrow() {
            let polled = tokio::select! {
                changed = shutdown.changed() => {
                    if changed.is_err() {
                        break;
                    }
                    continue;
                }
                polled = self.inner.source.poll() => polled,
            };

            match polled {
                Ok(Some(message)) => {
                    let partition = message.partition;
                    let (sender, _) = partitions
                        .entry(partition)
                        .or_insert_with(|| self.spawn_partition(partition));
                    if sender.send(message).await.is_err() {
                        tracing::error!(partition, "Partition task stopped unexpectedly");
                        partitions.remove(&partition);
                    }
                }
                Ok(None) => tokio::time::sleep(self.inner.config.idle_backoff).await,
                Err(e) => {
                    tracing::warn!(error = %e, "Failed to poll patient events");
                    tokio::time::sleep(self.inner.config.idle_backoff).await;
                }
            }
        }

        tracing::info!(partitions = partitions.len(), "Consumer worker shutting down");
        for (partition, (sender, handle)) in partitions {
            drop(sender);
            if let Err(e) = handle.await {
                tracing::error!(partition, error = %e, "Partition task panicked");
            }
        }
        Ok(())
    }

    fn spawn_partition(&self, partition: i32) -> (mpsc::Sender<InboundMessage>, JoinHandle<()>) {
        let (sender, mut receiver) = mpsc::channel::<InboundMessage>(self.inner.config.max_in_flight.max(1));
        let worker = self.clone();

        let handle = tokio::spawn(async move {
            tracing::debug!(partition, "Partition task started");
            let mut awaiting: Option<i64> = None;

            while let Some(message) = receiver.recv().await {
                if let Some(expected) = awaiting {
                    if message.offset != expected {
                        tracing::trace!(partition, offset = message.offset, expected, "Dropping record buffered before rewind");
                        continue;
                    }
                    awaiting = None;
                }

                if worker.process(&message).await == ProcessOutcome::Redeliver {
                    awaiting = Some(message.offset);
                }
            }
            tracing::debug!(partition, "Partition task stopped");
        });

        (sender, handle)
    }

    /// Handle one record end to end: decode, dispatch, then commit, dead-letter
    /// or rewind.
    pub async fn process(&self, message: &InboundMessage) -> ProcessOutcome {
        tracing::info!(
            topic = %message.topic,
            partition = message.partition,
            offset = message.offset,
            key = ?message.key,
            "Received patient event"
        );

        let event = match self.decode(message) {
            Ok(event) => event,
            Err(reason) => {
                tracing::error!(offset = message.offset, error = %reason, "Undecodable patient event");
                self.record("UNKNOWN", "undecodable");
                return if self.inner.dead_letters.route_raw(message, &reason, 0).await {
                    self.commit(message);
                    ProcessOutcome::DeadLettered
                } else {
                    self.redeliver(message).await
                };
            }
        };

        tracing::info!(
            event_id = %event.event_id(),
            event_type = %event.event_type(),
            patient_id = %event.patient_id(),
            user_id = %event.base_event().user_id(),
            "Processing patient event"
        );

        match dispatch(self.inner.handler.as_ref(), &event).await {
            Ok(dispatched) => {
                self.clear_failures(message);
                self.commit(message);
                let outcome = match dispatched {
                    Dispatch::Handled => "handled",
                    Dispatch::Ignored => "ignored",
                };
                self.record(event.event_type().as_str(), outcome);
                ProcessOutcome::Committed(dispatched)
            }
            Err(e) => {
                let failures = self.note_failure(message);
                tracing::error!(
                    event_id = %event.event_id(),
                    offset = message.offset,
                    failures,
                    error = %e,
                    "Patient event handler failed"
                );
                self.record(event.event_type().as_str(), "failed");

                if failures < self.inner.config.max_redeliveries {
                    return self.redeliver(message).await;
                }

                tracing::error!(event_id = %event.event_id(), failures, "Redelivery limit reached");
                let routed = self
                    .inner
                    .dead_letters
                    .route_event(&event, &e.to_string(), failures.saturating_sub(1), FAILURE_SOURCE_CONSUMER)
                    .await;
                if routed {
                    self.clear_failures(message);
                    self.commit(message);
                    ProcessOutcome::DeadLettered
                } else {
                    self.redeliver(message).await
                }
            }
        }
    }

    fn decode(&self, message: &InboundMessage) -> Result<PatientEvent, String> {
        let text = message
            .payload_str()
            .ok_or_else(|| "empty or non UTF-8 payload".to_string())?;
        let document: serde_json::Value = serde_json::from_str(text).map_err(|e| e.to_string())?;

        let inspection = self.inner.validator.inspect_document(&document);
        if !inspection.is_valid {
            return Err(inspection.validation_errors.join(", "));
        }
        serde_json::from_value(document).map_err(|e| e.to_string())
    }

    async fn redeliver(&self, message: &InboundMessage) -> ProcessOutcome {
        if let Some(metrics) = &self.metrics {
            metrics.record_redelivery();
        }
        tokio::time::sleep(self.inner.config.redelivery_delay).await;

        if let Err(e) = self
            .inner
            .source
            .rewind(&message.topic, message.partition, message.offset)
        {
            // The partition stays parked on this offset until the next rebalance
            tracing::error!(partition = message.partition, offset = message.offset, error = %e, "Failed to rewind partition");
        }
        ProcessOutcome::Redeliver
    }

    fn commit(&self, message: &InboundMessage) {
        if let Err(e) = self.inner.source.commit(message) {
            tracing::warn!(
                topic = %message.topic,
                partition = message.partition,
                offset = message.offset,
                error = %e,
                "Failed to commit offset (record may be redelivered)"
            );
        }
    }

    fn failure_key(message: &InboundMessage) -> (String, i32, i64) {
        (message.topic.clone(), message.partition, message.offset)
    }

    fn note_failure(&self, message: &InboundMessage) -> u32 {
        let mut failures = self.inner.failures.lock().unwrap_or_else(|p| p.into_inner());
        let count = failures.entry(Self::failure_key(message)).or_insert(0);
        *count += 1;
        *count
    }

    fn clear_failures(&self, message: &InboundMessage) {
        let mut failures = self.inner.failures.lock().unwrap_or_else(|p| p.into_inner());
        failures.remove(&Self::failure_key(message));
    }

    fn record(&self, event_type: &str, outcome: &str) {
        if let Some(metrics) = &self.metrics {
            metrics.record_consumed(event_type, outcome);
        }
    }
}
