use async_trait::async_trait;
use rdkafka::{
    admin::{AdminClient, AdminOptions, NewTopic, TopicReplication},
    client::DefaultClientContext,
    config::ClientConfig,
    consumer::{CommitMode, Consumer, StreamConsumer},
    error::{KafkaError, RDKafkaErrorCode},
    message::{BorrowedMessage, Header, Headers, Message, OwnedHeaders},
    producer::{FutureProducer, FutureRecord},
    topic_partition_list::{Offset, TopicPartitionList},
    util::Timeout,
};
use std::sync::Arc;
use std::time::Duration;

use super::broker::{BrokerError, DeliveryReceipt, InboundMessage, MessageBroker, MessageSource, OutboundMessage};
use super::settings::{ConsumerSettings, ProducerSettings};
use super::topics::TopicSpec;
use crate::utils::{CircuitBreaker, CircuitBreakerConfig, CircuitBreakerError, CircuitState};

// ============================================================================
// Redpanda Producer
// ============================================================================

pub struct RedpandaClient {
    producer: FutureProducer,
    circuit_breaker: CircuitBreaker,
    queue_timeout: Duration,
}

impl RedpandaClient {
    pub fn new(
        name: &str,
        bootstrap_servers: &str,
        settings: &ProducerSettings,
        breaker: CircuitBreakerConfig,
    ) -> Result<Self, BrokerError> {
        let producer: FutureProducer = settings
            .to_client_config(bootstrap_servers)
            .create()
            .map_err(|e| BrokerError::Configuration(e.to_string()))?;

        tracing::info!(
            producer = %name,
            brokers = %bootstrap_servers,
            acks = %settings.acks,
            idempotent = settings.enable_idempotence,
            "Redpanda producer created"
        );

        Ok(Self {
            producer,
            circuit_breaker: CircuitBreaker::new(name, breaker),
            queue_timeout: Duration::from_millis(u64::from(settings.request_timeout_ms)),
        })
    }

    pub async fn circuit_state(&self) -> CircuitState {
        self.circuit_breaker.state().await
    }

    async fn deliver(&self, message: &OutboundMessage) -> Result<DeliveryReceipt, BrokerError> {
        let headers = message.headers.iter().fold(OwnedHeaders::new(), |headers, (key, value)| {
            headers.insert(Header {
                key: key.as_str(),
                value: Some(value.as_str()),
            })
        });

        let record = FutureRecord::to(&message.topic)
            .key(&message.key)
            .payload(&message.payload)
            .headers(headers);

        match self.producer.send(record, Timeout::After(self.queue_timeout)).await {
            Ok(delivery) => {
                tracing::debug!(
                    topic = %message.topic,
                    key = %message.key,
                    partition = delivery.partition,
                    offset = delivery.offset,
                    "Record acknowledged by Redpanda"
                );
                Ok(DeliveryReceipt {
                    topic: message.topic.clone(),
                    partition: Some(delivery.partition),
                    offset: Some(delivery.offset),
                })
            }
            Err((error, _)) => Err(classify(error, self.queue_timeout)),
        }
    }
}

fn classify(error: KafkaError, timeout: Duration) -> BrokerError {
    match error.rdkafka_error_code() {
        Some(RDKafkaErrorCode::MessageTimedOut) => BrokerError::Timeout(timeout),
        Some(
            RDKafkaErrorCode::MessageSizeTooLarge
            | RDKafkaErrorCode::InvalidMessage
            | RDKafkaErrorCode::TopicAuthorizationFailed,
        ) => BrokerError::Rejected(error.to_string()),
        _ => BrokerError::Unavailable(error.to_string()),
    }
}

#[async_trait]
impl MessageBroker for RedpandaClient {
    async fn send(&self, message: OutboundMessage) -> Result<DeliveryReceipt, BrokerError> {
        match self.circuit_breaker.call(self.deliver(&message)).await {
            Ok(receipt) => Ok(receipt),
            Err(CircuitBreakerError::CircuitOpen(name)) => {
                tracing::error!(topic = %message.topic, breaker = %name, "Circuit breaker open - Redpanda unavailable");
                Err(BrokerError::CircuitOpen(name))
            }
            Err(CircuitBreakerError::OperationFailed(e)) => {
                tracing::error!(topic = %message.topic, key = %message.key, error = %e, "Failed to publish to Redpanda");
                Err(e)
            }
        }
    }
}

// ============================================================================
// Producer Set
// ============================================================================
//
// One client per stream. Each client owns its circuit breaker, so a failing
// audit or dead-letter stream can never open the breaker guarding the
// primary event stream.
//
// ============================================================================

pub struct RedpandaProducers {
    pub events: Arc<RedpandaClient>,
    pub dead_letter: Arc<RedpandaClient>,
    pub audit: Arc<RedpandaClient>,
}

impl RedpandaProducers {
    /// Primary stream on `primary`, dead-letter and audit streams on `side`
    pub fn connect(
        bootstrap_servers: &str,
        primary: &ProducerSettings,
        side: &ProducerSettings,
        breaker: CircuitBreakerConfig,
    ) -> Result<Self, BrokerError> {
        Ok(Self {
            events: Arc::new(RedpandaClient::new(
                "patient-events-producer",
                bootstrap_servers,
                primary,
                breaker.clone(),
            )?),
            dead_letter: Arc::new(RedpandaClient::new(
                "dead-letter-producer",
                bootstrap_servers,
                side,
                breaker.clone(),
            )?),
            audit: Arc::new(RedpandaClient::new("audit-producer", bootstrap_servers, side, breaker)?),
        })
    }
}

// ============================================================================
// Redpanda Consumer
// ============================================================================

/// Manual-commit consumer for one topic. Offsets are committed only through
/// `MessageSource::commit`.
pub struct RedpandaConsumer {
    consumer: StreamConsumer,
}

impl RedpandaConsumer {
    pub fn subscribe(
        bootstrap_servers: &str,
        settings: &ConsumerSettings,
        topic: &str,
    ) -> Result<Self, BrokerError> {
        let consumer: StreamConsumer = settings
            .to_client_config(bootstrap_servers)
            .create()
            .map_err(|e| BrokerError::Configuration(e.to_string()))?;

        consumer
            .subscribe(&[topic])
            .map_err(|e| BrokerError::Configuration(e.to_string()))?;

        tracing::info!(
            topic = %topic,
            group = %settings.group_id,
            manual_commit = true,
            "Redpanda consumer subscribed"
        );

        Ok(Self { consumer })
    }
}

fn to_inbound(message: &BorrowedMessage<'_>) -> InboundMessage {
    let headers = message
        .headers()
        .map(|headers| {
            headers
                .iter()
                .map(|header| {
                    let value = header
                        .value
                        .map(|bytes| String::from_utf8_lossy(bytes).into_owned())
                        .unwrap_or_default();
                    (header.key.to_string(), value)
                })
                .collect()
        })
        .unwrap_or_default();

    InboundMessage {
        topic: message.topic().to_string(),
        partition: message.partition(),
        offset: message.offset(),
        key: message.key().map(|key| String::from_utf8_lossy(key).into_owned()),
        payload: message.payload().map(<[u8]>::to_vec),
        headers,
    }
}

#[async_trait]
impl MessageSource for RedpandaConsumer {
    async fn poll(&self) -> Result<Option<InboundMessage>, BrokerError> {
        match self.consumer.recv().await {
            Ok(message) => Ok(Some(to_inbound(&message))),
            Err(e) => Err(BrokerError::Unavailable(e.to_string())),
        }
    }

    fn commit(&self, message: &InboundMessage) -> Result<(), BrokerError> {
        let mut offsets = TopicPartitionList::new();
        offsets
            .add_partition_offset(&message.topic, message.partition, Offset::Offset(message.offset + 1))
            .map_err(|e| BrokerError::Offset(e.to_string()))?;

        self.consumer
            .commit(&offsets, CommitMode::Async)
            .map_err(|e| BrokerError::Offset(e.to_string()))
    }

    fn rewind(&self, topic: &str, partition: i32, offset: i64) -> Result<(), BrokerError> {
        self.consumer
            .seek(topic, partition, Offset::Offset(offset), Duration::from_secs(5))
            .map_err(|e| BrokerError::Offset(e.to_string()))
    }
}

// ============================================================================
// Topic Provisioning
// ============================================================================

pub struct TopicProvisioner {
    admin: AdminClient<DefaultClientContext>,
}

impl TopicProvisioner {
    pub fn new(bootstrap_servers: &str) -> Result<Self, BrokerError> {
        let admin = ClientConfig::new()
            .set("bootstrap.servers", bootstrap_servers)
            .create()
            .map_err(|e| BrokerError::Configuration(e.to_string()))?;
        Ok(Self { admin })
    }

    /// Create every topic that does not exist yet; existing topics are left as-is
    pub async fn ensure_topics(&self, specs: &[TopicSpec]) -> Result<(), BrokerError> {
        let entries: Vec<Vec<(&str, String)>> = specs.iter().map(TopicSpec::config_entries).collect();

        let new_topics: Vec<NewTopic<'_>> = specs
            .iter()
            .zip(&entries)
            .map(|(spec, entries)| {
                entries.iter().fold(
                    NewTopic::new(&spec.name, spec.partitions, TopicReplication::Fixed(spec.replication)),
                    |topic, (key, value)| topic.set(key, value),
                )
            })
            .collect();

        let results = self
            .admin
            .create_topics(&new_topics, &AdminOptions::new())
            .await
            .map_err(|e| BrokerError::Unavailable(e.to_string()))?;

        for result in results {
            match result {
                Ok(topic) => tracing::info!(topic = %topic, "Topic created"),
                Err((topic, RDKafkaErrorCode::TopicAlreadyExists)) => {
                    tracing::debug!(topic = %topic, "Topic already exists")
                }
                Err((topic, code)) => {
                    return Err(BrokerError::Rejected(format!("failed to create topic {}: {}", topic, code)));
                }
            }
        }
        Ok(())
    }
}
