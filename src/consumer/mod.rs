// ============================================================================
// Patient Event Consumer
// ============================================================================
//
// Listener side of the patient event stream: decode, dispatch by event type,
// acknowledge only after the handler succeeded.
//
// ============================================================================

pub mod handler;
pub mod worker;

pub use handler::{dispatch, Dispatch, LoggingEventHandler, PatientEventHandler};
pub use worker::{ConsumerConfig, ConsumerWorker, ProcessOutcome};
