use serde_json::json;

use crate::domain::patient::{ChangedFields, Patient, PatientField, PatientStatus};
use crate::domain::Actor;

use super::core::{wire_now, wire_time, EventType, Metadata, PatientEvent, PatientEventPayload};

// ============================================================================
// Event Factory
// ============================================================================
//
// One constructor per business fact. Each builds a payload snapshot from the
// post-mutation aggregate, assembles fact-specific metadata, then creates a
// root event or, when a causal link is supplied, an event placed in an
// existing chain. Pure construction: no I/O.
//
// ============================================================================

pub const EVENT_SOURCE: &str = "patients-service";
pub const EVENT_SCHEMA_VERSION: &str = "1.0";
pub const DEFAULT_DELETION_REASON: &str = "Administrative deletion";

/// Explicit place of a new event in an existing causal chain
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CausalLink {
    pub correlation_id: String,
    pub causation_id: String,
}

impl CausalLink {
    pub fn new(correlation_id: impl Into<String>, causation_id: impl Into<String>) -> Self {
        Self {
            correlation_id: correlation_id.into(),
            causation_id: causation_id.into(),
        }
    }

    /// Link that makes the new event a child of `parent`
    pub fn caused_by(parent: &PatientEvent) -> Self {
        Self::new(parent.correlation_id(), parent.event_id())
    }
}

#[derive(Debug, Clone, Default)]
pub struct EventFactory;

impl EventFactory {
    pub fn new() -> Self {
        Self
    }

    pub fn patient_registered(
        &self,
        patient: &Patient,
        actor: &Actor,
        link: Option<&CausalLink>,
    ) -> PatientEvent {
        tracing::debug!(patient_id = %patient.id, "Creating PatientRegistered event");

        let mut metadata = base_metadata();
        metadata.insert("patientStatus".into(), patient.status.as_str().into());
        metadata.insert("hasEmergencyContact".into(), patient.emergency_contact.is_some().into());
        metadata.insert("registrationTimestamp".into(), now_text().into());
        metadata.insert(
            "demographics".into(),
            json!({
                "age": patient.demographics.age(),
                "gender": patient.demographics.gender.as_str(),
            }),
        );

        self.build(EventType::PatientRegistered, patient, actor, "Patient registration", metadata, link)
    }

    /// General update event; `changed` is recorded as a comma-joined list
    pub fn patient_updated(
        &self,
        patient: &Patient,
        actor: &Actor,
        changed: &ChangedFields,
        link: Option<&CausalLink>,
    ) -> PatientEvent {
        let changed_list = changed.to_string();
        tracing::debug!(patient_id = %patient.id, changes = %changed_list, "Creating PatientUpdated event");

        let previous_version = patient.version.map_or(0, |v| (v - 1).max(0));

        let mut metadata = base_metadata();
        metadata.insert("updatedField".into(), changed_list.clone().into());
        metadata.insert("patientStatus".into(), patient.status.as_str().into());
        metadata.insert("updateTimestamp".into(), now_text().into());
        metadata.insert("previousVersion".into(), previous_version.into());

        let reason = format!("Patient {} updated", changed_list);
        self.build(EventType::PatientUpdated, patient, actor, reason, metadata, link)
    }

    pub fn patient_deactivated(
        &self,
        patient: &Patient,
        actor: &Actor,
        previous_status: PatientStatus,
        link: Option<&CausalLink>,
    ) -> PatientEvent {
        tracing::debug!(patient_id = %patient.id, "Creating PatientDeactivated event");

        let mut metadata = status_change_metadata(previous_status, patient.status);
        metadata.insert("deactivationTimestamp".into(), now_text().into());
        metadata.insert("reason".into(), "Administrative deactivation".into());

        self.build(EventType::PatientDeactivated, patient, actor, "Patient deactivated", metadata, link)
    }

    pub fn patient_activated(
        &self,
        patient: &Patient,
        actor: &Actor,
        previous_status: PatientStatus,
        link: Option<&CausalLink>,
    ) -> PatientEvent {
        tracing::debug!(patient_id = %patient.id, "Creating PatientActivated event");

        let mut metadata = status_change_metadata(previous_status, patient.status);
        metadata.insert("activationTimestamp".into(), now_text().into());
        metadata.insert("reason".into(), "Administrative activation".into());

        self.build(EventType::PatientActivated, patient, actor, "Patient activated", metadata, link)
    }

    /// Built from the last snapshot before removal
    pub fn patient_deleted(
        &self,
        patient: &Patient,
        actor: &Actor,
        reason: &str,
        link: Option<&CausalLink>,
    ) -> PatientEvent {
        tracing::debug!(patient_id = %patient.id, "Creating PatientDeleted event");

        let mut metadata = base_metadata();
        metadata.insert("deletionReason".into(), reason.into());
        metadata.insert("deletionTimestamp".into(), now_text().into());
        metadata.insert("finalStatus".into(), patient.status.as_str().into());
        metadata.insert("irreversible".into(), true.into());

        self.build(EventType::PatientDeleted, patient, actor, reason, metadata, link)
    }

    pub fn patient_demographics_updated(
        &self,
        patient: &Patient,
        actor: &Actor,
        link: Option<&CausalLink>,
    ) -> PatientEvent {
        tracing::debug!(patient_id = %patient.id, "Creating PatientDemographicsUpdated event");

        let mut metadata = field_update_metadata(patient, PatientField::Demographics);
        metadata.insert(
            "demographicsSnapshot".into(),
            json!({
                "fullName": patient.demographics.full_name(),
                "age": patient.demographics.age(),
                "gender": patient.demographics.gender.as_str(),
            }),
        );

        self.build(
            EventType::PatientDemographicsUpdated,
            patient,
            actor,
            "Patient demographics updated",
            metadata,
            link,
        )
    }

    pub fn patient_contact_info_updated(
        &self,
        patient: &Patient,
        actor: &Actor,
        link: Option<&CausalLink>,
    ) -> PatientEvent {
        tracing::debug!(patient_id = %patient.id, "Creating PatientContactInfoUpdated event");

        let contact = patient.contact_info.as_ref();
        let mut metadata = field_update_metadata(patient, PatientField::ContactInfo);
        metadata.insert("hasEmail".into(), contact.is_some_and(|c| c.email.is_some()).into());
        metadata.insert("hasPhone".into(), contact.is_some_and(|c| c.phone_number.is_some()).into());

        self.build(
            EventType::PatientContactInfoUpdated,
            patient,
            actor,
            "Patient contact information updated",
            metadata,
            link,
        )
    }

    pub fn patient_emergency_contact_updated(
        &self,
        patient: &Patient,
        actor: &Actor,
        link: Option<&CausalLink>,
    ) -> PatientEvent {
        tracing::debug!(patient_id = %patient.id, "Creating PatientEmergencyContactUpdated event");

        let relationship = patient
            .emergency_contact
            .as_ref()
            .map(|c| c.relationship.as_str());
        let mut metadata = field_update_metadata(patient, PatientField::EmergencyContact);
        metadata.insert("emergencyContactRelationship".into(), relationship.into());

        self.build(
            EventType::PatientEmergencyContactUpdated,
            patient,
            actor,
            "Patient emergency contact updated",
            metadata,
            link,
        )
    }

    /// Full event set for one update: the general `PATIENT_UPDATED` event
    /// first, then one child per changed field, each caused by the general
    /// event and sharing its correlation id.
    pub fn patient_update_events(
        &self,
        patient: &Patient,
        actor: &Actor,
        changed: &ChangedFields,
    ) -> Vec<PatientEvent> {
        let general = self.patient_updated(patient, actor, changed, None);
        let link = CausalLink::caused_by(&general);

        let mut events = vec![general];
        for field in changed.iter() {
            let child = match field {
                PatientField::Demographics => self.patient_demographics_updated(patient, actor, Some(&link)),
                PatientField::ContactInfo => self.patient_contact_info_updated(patient, actor, Some(&link)),
                PatientField::EmergencyContact => {
                    self.patient_emergency_contact_updated(patient, actor, Some(&link))
                }
            };
            events.push(child);
        }
        events
    }

    fn build(
        &self,
        event_type: EventType,
        patient: &Patient,
        actor: &Actor,
        change_reason: impl Into<String>,
        metadata: Metadata,
        link: Option<&CausalLink>,
    ) -> PatientEvent {
        let payload = PatientEventPayload::from_patient(patient, actor.as_str(), change_reason);

        match link {
            Some(link) => PatientEvent::create_with_correlation(
                event_type,
                payload,
                actor.as_str(),
                metadata,
                link.correlation_id.clone(),
                Some(link.causation_id.clone()),
            ),
            None => PatientEvent::create(event_type, payload, actor.as_str(), metadata),
        }
    }
}

fn now_text() -> String {
    wire_time::format(&wire_now())
}

fn base_metadata() -> Metadata {
    let mut metadata = Metadata::new();
    metadata.insert("source".into(), EVENT_SOURCE.into());
    metadata.insert("version".into(), EVENT_SCHEMA_VERSION.into());
    metadata
}

fn status_change_metadata(previous: PatientStatus, new: PatientStatus) -> Metadata {
    let mut metadata = base_metadata();
    metadata.insert("previousStatus".into(), previous.as_str().into());
    metadata.insert("newStatus".into(), new.as_str().into());
    metadata
}

fn field_update_metadata(patient: &Patient, field: PatientField) -> Metadata {
    let mut metadata = base_metadata();
    metadata.insert("updatedField".into(), field.as_str().into());
    metadata.insert("patientStatus".into(), patient.status.as_str().into());
    metadata.insert("updateTimestamp".into(), now_text().into());
    metadata
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::patient::PatientField;
    use crate::events::core::event::tests::jane_doe;

    fn actor() -> Actor {
        Actor::new("dr.house")
    }

    #[test]
    fn test_registered_event_is_root() {
        let patient = jane_doe();
        let event = EventFactory::new().patient_registered(&patient, &actor(), None);

        assert_eq!(event.event_type(), EventType::PatientRegistered);
        assert_eq!(event.payload().patient_id, patient.id);
        assert_eq!(event.patient_id(), patient.id);
        assert!(event.causation_id().is_none());
        assert_eq!(event.payload().change_reason, "Patient registration");
        assert_eq!(event.payload().changed_by, "dr.house");

        let metadata = event.base_event().metadata();
        assert_eq!(metadata["source"], "patients-service");
        assert_eq!(metadata["patientStatus"], "ACTIVE");
        assert_eq!(metadata["hasEmergencyContact"], false);
        assert_eq!(metadata["demographics"]["gender"], "FEMALE");
    }

    #[test]
    fn test_registered_event_honors_causal_link() {
        let patient = jane_doe();
        let link = CausalLink::new("corr-1", "cause-1");
        let event = EventFactory::new().patient_registered(&patient, &actor(), Some(&link));

        assert_eq!(event.correlation_id(), "corr-1");
        assert_eq!(event.causation_id(), Some("cause-1"));
    }

    #[test]
    fn test_deleted_event_is_irreversible() {
        let patient = jane_doe();
        let event = EventFactory::new().patient_deleted(&patient, &actor(), "Duplicate record", None);

        let metadata = event.base_event().metadata();
        assert_eq!(metadata["irreversible"], true);
        assert_eq!(metadata["deletionReason"], "Duplicate record");
        assert_eq!(metadata["finalStatus"], "ACTIVE");
        assert_eq!(event.payload().change_reason, "Duplicate record");
    }

    #[test]
    fn test_status_toggle_records_transition() {
        let mut patient = jane_doe();
        patient.deactivate();
        let event = EventFactory::new().patient_deactivated(&patient, &actor(), PatientStatus::Active, None);

        let metadata = event.base_event().metadata();
        assert_eq!(metadata["previousStatus"], "ACTIVE");
        assert_eq!(metadata["newStatus"], "INACTIVE");
        assert_eq!(event.payload().status, PatientStatus::Inactive);
    }

    #[test]
    fn test_update_events_chain_children_to_general_event() {
        let mut patient = jane_doe();
        patient.version = Some(3);
        let changed = ChangedFields::new(vec![PatientField::Demographics, PatientField::ContactInfo]);

        let events = EventFactory::new().patient_update_events(&patient, &actor(), &changed);

        assert_eq!(events.len(), 3);
        let general = &events[0];
        assert_eq!(general.event_type(), EventType::PatientUpdated);
        assert!(general.causation_id().is_none());
        assert_eq!(general.base_event().metadata()["updatedField"], "demographics,contactInfo");
        assert_eq!(general.base_event().metadata()["previousVersion"], 2);
        assert_eq!(general.payload().change_reason, "Patient demographics,contactInfo updated");

        assert_eq!(events[1].event_type(), EventType::PatientDemographicsUpdated);
        assert_eq!(events[2].event_type(), EventType::PatientContactInfoUpdated);
        for child in &events[1..] {
            assert!(child.is_correlated_with(general));
            assert!(child.was_caused_by(general));
        }
    }

    #[test]
    fn test_emergency_contact_event_without_contact() {
        let patient = jane_doe();
        let event = EventFactory::new().patient_emergency_contact_updated(&patient, &actor(), None);

        assert!(event.base_event().metadata()["emergencyContactRelationship"].is_null());
        assert_eq!(event.base_event().metadata()["updatedField"], "emergencyContact");
    }
}
