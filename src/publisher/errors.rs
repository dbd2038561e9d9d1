use crate::events::EventCodecError;
use crate::messaging::BrokerError;
use crate::utils::IsTransient;

#[derive(Debug, thiserror::Error)]
pub enum PublishError {
    #[error("failed to serialize event {event_id}: {source}")]
    Serialization {
        event_id: String,
        #[source]
        source: EventCodecError,
    },

    #[error("failed to deliver event {event_id} to {topic}: {source}")]
    Delivery {
        event_id: String,
        topic: String,
        #[source]
        source: BrokerError,
    },

    #[error("event {event_id} dead-lettered after {attempts} attempts: {last_error}")]
    RetriesExhausted {
        event_id: String,
        attempts: u32,
        last_error: String,
    },
}

impl PublishError {
    /// Metric label
    pub fn reason(&self) -> &'static str {
        match self {
            PublishError::Serialization { .. } => "serialization",
            PublishError::Delivery { .. } => "delivery",
            PublishError::RetriesExhausted { .. } => "retries_exhausted",
        }
    }
}

impl IsTransient for PublishError {
    fn is_transient(&self) -> bool {
        match self {
            PublishError::Delivery { source, .. } => source.is_transient(),
            PublishError::Serialization { .. } | PublishError::RetriesExhausted { .. } => false,
        }
    }
}
