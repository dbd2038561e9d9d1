// ============================================================================
// Patient Domain Events
// ============================================================================
//
// Envelope and payload types, the correlation algebra, the factory that turns
// aggregate state into events, and the validator that gates publishing.
//
// ============================================================================

pub mod core;
pub mod correlation;
pub mod factory;
pub mod validation;

pub use self::core::*;
pub use correlation::{are_correlated, causal_chain, correlate_event, generate_correlation_id};
pub use factory::{CausalLink, EventFactory, DEFAULT_DELETION_REASON, EVENT_SCHEMA_VERSION, EVENT_SOURCE};
pub use validation::{EventValidationError, EventValidator, ValidationResult};
