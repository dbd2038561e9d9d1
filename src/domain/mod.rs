// ============================================================================
// Domain Layer - Business Logic
// ============================================================================
//
// The patient aggregate and the actor identity threaded through every
// mutation. Event emission is layered on top by the service in
// `patient::service`; the event types themselves live in `crate::events`.
//
// ============================================================================

pub mod actor;
pub mod patient;

pub use actor::{Actor, SYSTEM_ACTOR};
