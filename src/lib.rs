// ============================================================================
// Patient Domain Events
// ============================================================================
//
// Event emission layer of the patients service:
//
// - domain     patient aggregate, repository seam, event-emitting service
// - events     event model, factory, validator, correlation helpers
// - publisher  broker-backed publisher with retry, dead-lettering and audit
// - consumer   manual-ack listener with per-partition ordering
// - messaging  broker seam, Redpanda (rdkafka) and in-memory brokers
// - metrics    Prometheus registry and HTTP endpoint
//
// ============================================================================

pub mod config;
pub mod consumer;
pub mod domain;
pub mod events;
pub mod messaging;
pub mod metrics;
pub mod publisher;
pub mod utils;
