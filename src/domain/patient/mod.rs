// ============================================================================
// Patient Domain
// ============================================================================
//
// - Value objects (Demographics, ContactInfo, EmergencyContact, ...)
// - Aggregate (Patient) and change detection
// - Errors (PatientError)
// - Repository seam + in-memory store
// - Service orchestrating mutations and event emission
//
// ============================================================================

pub mod aggregate;
pub mod errors;
pub mod repository;
pub mod service;
pub mod value_objects;

pub use aggregate::*;
pub use errors::*;
pub use repository::*;
pub use service::*;
pub use value_objects::*;
