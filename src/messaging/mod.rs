pub mod broker;
pub mod memory;
pub mod redpanda;
pub mod settings;
pub mod topics;

pub use broker::{
    BrokerError, DeliveryReceipt, InboundMessage, MessageBroker, MessageSource, OutboundMessage,
    HEADER_AGGREGATE_TYPE, HEADER_CORRELATION_ID, HEADER_EVENT_ID, HEADER_EVENT_TYPE,
};
pub use memory::{InMemoryBroker, InMemorySource, StoredRecord};
pub use redpanda::{RedpandaClient, RedpandaConsumer, RedpandaProducers, TopicProvisioner};
pub use settings::{ConsumerSettings, ProducerSettings};
pub use topics::{TopicNames, TopicSpec};
