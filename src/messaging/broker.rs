use async_trait::async_trait;
use std::time::Duration;

use crate::utils::IsTransient;

// ============================================================================
// Broker Seams
// ============================================================================
//
// MessageBroker: keyed, acknowledged sends (publisher side)
// MessageSource: poll / commit / rewind for one consumer group (consumer side)
//
// Both are implemented by the rdkafka-backed Redpanda adapters and by the
// in-memory broker.
//
// ============================================================================

/// Header carrying the producer-side idempotency key
pub const HEADER_EVENT_ID: &str = "eventId";
pub const HEADER_EVENT_TYPE: &str = "eventType";
pub const HEADER_CORRELATION_ID: &str = "correlationId";
pub const HEADER_AGGREGATE_TYPE: &str = "aggregateType";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutboundMessage {
    pub topic: String,
    /// Partition key
    pub key: String,
    pub payload: String,
    pub headers: Vec<(String, String)>,
}

impl OutboundMessage {
    pub fn new(topic: impl Into<String>, key: impl Into<String>, payload: impl Into<String>) -> Self {
        Self {
            topic: topic.into(),
            key: key.into(),
            payload: payload.into(),
            headers: Vec::new(),
        }
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        find_header(&self.headers, name)
    }
}

/// Where the broker stored an acknowledged record, when it reports it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeliveryReceipt {
    pub topic: String,
    pub partition: Option<i32>,
    pub offset: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InboundMessage {
    pub topic: String,
    pub partition: i32,
    pub offset: i64,
    pub key: Option<String>,
    pub payload: Option<Vec<u8>>,
    pub headers: Vec<(String, String)>,
}

impl InboundMessage {
    /// Payload as UTF-8, if present and valid
    pub fn payload_str(&self) -> Option<&str> {
        self.payload
            .as_deref()
            .and_then(|bytes| std::str::from_utf8(bytes).ok())
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        find_header(&self.headers, name)
    }
}

fn find_header<'a>(headers: &'a [(String, String)], name: &str) -> Option<&'a str> {
    headers
        .iter()
        .find(|(key, _)| key == name)
        .map(|(_, value)| value.as_str())
}

#[derive(Debug, thiserror::Error)]
pub enum BrokerError {
    #[error("broker unavailable: {0}")]
    Unavailable(String),

    #[error("delivery not acknowledged within {0:?}")]
    Timeout(Duration),

    #[error("circuit breaker '{0}' is open")]
    CircuitOpen(String),

    #[error("record rejected by broker: {0}")]
    Rejected(String),

    #[error("broker client configuration error: {0}")]
    Configuration(String),

    #[error("offset operation failed: {0}")]
    Offset(String),
}

impl IsTransient for BrokerError {
    fn is_transient(&self) -> bool {
        matches!(
            self,
            BrokerError::Unavailable(_) | BrokerError::Timeout(_) | BrokerError::CircuitOpen(_)
        )
    }
}

#[async_trait]
pub trait MessageBroker: Send + Sync {
    /// Resolves once the broker acknowledged the record
    async fn send(&self, message: OutboundMessage) -> Result<DeliveryReceipt, BrokerError>;
}

#[async_trait]
pub trait MessageSource: Send + Sync {
    /// Next record for this group, or `None` when nothing is ready
    async fn poll(&self) -> Result<Option<InboundMessage>, BrokerError>;

    /// Mark `message` and everything before it on its partition as processed
    fn commit(&self, message: &InboundMessage) -> Result<(), BrokerError>;

    /// Move the read position of a partition back so `offset` is delivered again
    fn rewind(&self, topic: &str, partition: i32, offset: i64) -> Result<(), BrokerError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_outbound_headers() {
        let message = OutboundMessage::new("patient-events", "p-1", "{}")
            .with_header(HEADER_EVENT_ID, "e-1")
            .with_header(HEADER_EVENT_TYPE, "PATIENT_REGISTERED");

        assert_eq!(message.header(HEADER_EVENT_ID), Some("e-1"));
        assert_eq!(message.header(HEADER_CORRELATION_ID), None);
    }

    #[test]
    fn test_transient_classification() {
        assert!(BrokerError::Unavailable("down".into()).is_transient());
        assert!(BrokerError::Timeout(Duration::from_secs(5)).is_transient());
        assert!(BrokerError::CircuitOpen("redpanda".into()).is_transient());
        assert!(!BrokerError::Rejected("too large".into()).is_transient());
        assert!(!BrokerError::Configuration("bad acks".into()).is_transient());
    }

    #[test]
    fn test_inbound_payload_str() {
        let message = InboundMessage {
            topic: "patient-events".into(),
            partition: 0,
            offset: 7,
            key: Some("p-1".into()),
            payload: Some(vec![0xff, 0xfe]),
            headers: Vec::new(),
        };
        assert_eq!(message.payload_str(), None);
    }
}
