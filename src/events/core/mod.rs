// ============================================================================
// Event Core - Envelope, Payload and Audit Projection
// ============================================================================
//
// Value types shared by the factory, validator, publisher and consumer.
//
// ============================================================================

pub mod audit;
pub mod event;

pub use audit::{AuditEvent, AUDIT_TYPE};
pub use event::{
    deserialize_event, serialize_event, wire_now, wire_time, BaseEvent, EventCodecError, EventType,
    Metadata, PatientEvent, PatientEventPayload, AGGREGATE_TYPE,
};
