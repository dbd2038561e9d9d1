use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::event::{wire_now, wire_time, Metadata, PatientEvent};

pub const AUDIT_TYPE: &str = "PATIENT_EVENT";

/// One-way audit projection of a published patient event.
///
/// Audit records are written to their own stream and never consumed back
/// into the domain event flow.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditEvent {
    pub event_id: String,
    pub audit_type: String,
    pub action: String,
    pub resource_id: String,
    pub user_id: String,
    #[serde(with = "wire_time")]
    pub timestamp: DateTime<Utc>,
    pub metadata: Metadata,
}

impl AuditEvent {
    pub fn from_patient_event(event: &PatientEvent) -> Self {
        let base = event.base_event();

        let mut metadata = Metadata::new();
        metadata.insert("originalEventType".to_string(), base.event_type().as_str().into());
        metadata.insert("aggregateType".to_string(), base.aggregate_type().into());
        metadata.insert("version".to_string(), base.version().into());
        metadata.insert("correlationId".to_string(), base.correlation_id().into());

        Self {
            event_id: base.event_id().to_string(),
            audit_type: AUDIT_TYPE.to_string(),
            action: base.event_type().as_str().to_string(),
            resource_id: base.aggregate_id().to_string(),
            user_id: base.user_id().to_string(),
            timestamp: wire_now(),
            metadata,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::core::event::tests::jane_doe;
    use crate::events::core::{EventType, PatientEventPayload};

    #[test]
    fn test_audit_projection_copies_identity() {
        let patient = jane_doe();
        let event = PatientEvent::create(
            EventType::PatientDeleted,
            PatientEventPayload::from_patient(&patient, "admin", "Administrative deletion"),
            "admin",
            Metadata::new(),
        );

        let audit = AuditEvent::from_patient_event(&event);

        assert_eq!(audit.event_id, event.event_id());
        assert_eq!(audit.audit_type, "PATIENT_EVENT");
        assert_eq!(audit.action, "PATIENT_DELETED");
        assert_eq!(audit.resource_id, patient.id);
        assert_eq!(audit.user_id, "admin");
        assert_eq!(audit.metadata["correlationId"], event.correlation_id());
        assert_eq!(audit.metadata["aggregateType"], "Patient");
        assert_eq!(audit.metadata["version"], 0);
        assert_eq!(audit.metadata.len(), 4);
    }
}
