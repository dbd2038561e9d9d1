use rdkafka::config::ClientConfig;

// ============================================================================
// Client Settings Profiles
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProducerSettings {
    pub acks: &'static str,
    pub enable_idempotence: bool,
    pub retries: u32,
    pub retry_backoff_ms: u32,
    pub request_timeout_ms: u32,
    pub message_timeout_ms: u32,
    pub max_in_flight: u32,
    pub compression: &'static str,
    pub linger_ms: u32,
    pub batch_size: u32,
}

impl ProducerSettings {
    /// Primary event stream: idempotent, fully replicated acks, ordered
    pub fn reliable() -> Self {
        Self {
            acks: "all",
            enable_idempotence: true,
            retries: 3,
            retry_backoff_ms: 500,
            request_timeout_ms: 20_000,
            message_timeout_ms: 30_000,
            max_in_flight: 1,
            compression: "snappy",
            linger_ms: 20,
            batch_size: 32_768,
        }
    }

    /// Dead-letter and audit streams: leader ack, one retry, short timeout
    pub fn dead_letter() -> Self {
        Self {
            acks: "1",
            enable_idempotence: false,
            retries: 1,
            retry_backoff_ms: 100,
            request_timeout_ms: 10_000,
            message_timeout_ms: 15_000,
            max_in_flight: 5,
            compression: "none",
            linger_ms: 5,
            batch_size: 16_384,
        }
    }

    pub fn to_client_config(&self, bootstrap_servers: &str) -> ClientConfig {
        let mut config = ClientConfig::new();
        config
            .set("bootstrap.servers", bootstrap_servers)
            .set("acks", self.acks)
            .set("enable.idempotence", self.enable_idempotence.to_string())
            .set("retries", self.retries.to_string())
            .set("retry.backoff.ms", self.retry_backoff_ms.to_string())
            .set("request.timeout.ms", self.request_timeout_ms.to_string())
            .set("message.timeout.ms", self.message_timeout_ms.to_string())
            .set("max.in.flight.requests.per.connection", self.max_in_flight.to_string())
            .set("compression.type", self.compression)
            .set("linger.ms", self.linger_ms.to_string())
            .set("batch.size", self.batch_size.to_string());
        config
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConsumerSettings {
    pub group_id: String,
    pub auto_offset_reset: &'static str,
    pub session_timeout_ms: u32,
    pub heartbeat_interval_ms: u32,
    pub max_poll_interval_ms: u32,
}

impl ConsumerSettings {
    /// Manual-commit listener group reading from the earliest uncommitted offset
    pub fn listener(group_id: impl Into<String>) -> Self {
        Self {
            group_id: group_id.into(),
            auto_offset_reset: "earliest",
            session_timeout_ms: 30_000,
            heartbeat_interval_ms: 10_000,
            max_poll_interval_ms: 300_000,
        }
    }

    pub fn to_client_config(&self, bootstrap_servers: &str) -> ClientConfig {
        let mut config = ClientConfig::new();
        config
            .set("bootstrap.servers", bootstrap_servers)
            .set("group.id", &self.group_id)
            .set("enable.auto.commit", "false")
            .set("enable.auto.offset.store", "false")
            .set("auto.offset.reset", self.auto_offset_reset)
            .set("session.timeout.ms", self.session_timeout_ms.to_string())
            .set("heartbeat.interval.ms", self.heartbeat_interval_ms.to_string())
            .set("max.poll.interval.ms", self.max_poll_interval_ms.to_string())
            .set("enable.partition.eof", "false");
        config
    }
}
