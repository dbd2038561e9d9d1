use chrono::{DateTime, SubsecRound, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use uuid::Uuid;

use crate::domain::patient::{ContactInfo, Demographics, EmergencyContact, Patient, PatientStatus};

// ============================================================================
// Patient Event Envelope
// ============================================================================
//
// Wire layout (JSON, camelCase):
//
//   { "baseEvent": { eventId, eventType, aggregateId, aggregateType, version,
//                    timestamp, correlationId, causationId, userId, metadata },
//     "payload":   { patientId, demographics, contactInfo, emergencyContact,
//                    status, changedBy, timestamp, changeReason, patientVersion },
//     "occurredAt": "yyyy-MM-ddTHH:mm:ss" }
//
// Events are values: every derivation returns a new instance.
//
// ============================================================================

pub const AGGREGATE_TYPE: &str = "Patient";

/// Open, string-keyed event metadata. Ordered so the encoded form is stable.
pub type Metadata = BTreeMap<String, serde_json::Value>;

/// Closed set of patient facts
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EventType {
    PatientRegistered,
    PatientUpdated,
    PatientDeactivated,
    PatientActivated,
    PatientDeleted,
    PatientDemographicsUpdated,
    PatientContactInfoUpdated,
    PatientEmergencyContactUpdated,
}

impl EventType {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventType::PatientRegistered => "PATIENT_REGISTERED",
            EventType::PatientUpdated => "PATIENT_UPDATED",
            EventType::PatientDeactivated => "PATIENT_DEACTIVATED",
            EventType::PatientActivated => "PATIENT_ACTIVATED",
            EventType::PatientDeleted => "PATIENT_DELETED",
            EventType::PatientDemographicsUpdated => "PATIENT_DEMOGRAPHICS_UPDATED",
            EventType::PatientContactInfoUpdated => "PATIENT_CONTACT_INFO_UPDATED",
            EventType::PatientEmergencyContactUpdated => "PATIENT_EMERGENCY_CONTACT_UPDATED",
        }
    }
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// `yyyy-MM-dd'T'HH:mm:ss` timestamps, interpreted as UTC.
pub mod wire_time {
    use chrono::{DateTime, NaiveDateTime, Utc};
    use serde::{Deserialize, Deserializer, Serializer};

    pub const FORMAT: &str = "%Y-%m-%dT%H:%M:%S";

    pub fn format(ts: &DateTime<Utc>) -> String {
        ts.format(FORMAT).to_string()
    }

    pub fn serialize<S: Serializer>(ts: &DateTime<Utc>, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&format(ts))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<DateTime<Utc>, D::Error> {
        let raw = String::deserialize(deserializer)?;
        NaiveDateTime::parse_from_str(&raw, FORMAT)
            .map(|naive| naive.and_utc())
            .map_err(serde::de::Error::custom)
    }
}

/// Current instant at wire precision, so an encode/decode pass is lossless.
pub fn wire_now() -> DateTime<Utc> {
    Utc::now().trunc_subsecs(0)
}

// ============================================================================
// BaseEvent
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BaseEvent {
    event_id: String,
    event_type: EventType,
    aggregate_id: String,
    aggregate_type: String,
    version: Option<i64>,
    #[serde(with = "wire_time")]
    timestamp: DateTime<Utc>,
    correlation_id: String,
    causation_id: Option<String>,
    user_id: String,
    #[serde(default)]
    metadata: Metadata,
}

impl BaseEvent {
    /// Root envelope: fresh event id, fresh correlation id, no causation.
    pub fn create(
        event_type: EventType,
        aggregate_id: impl Into<String>,
        version: Option<i64>,
        user_id: impl Into<String>,
        metadata: Metadata,
    ) -> Self {
        Self {
            event_id: Uuid::new_v4().to_string(),
            event_type,
            aggregate_id: aggregate_id.into(),
            aggregate_type: AGGREGATE_TYPE.to_string(),
            version,
            timestamp: wire_now(),
            correlation_id: Uuid::new_v4().to_string(),
            causation_id: None,
            user_id: user_id.into(),
            metadata,
        }
    }

    pub fn with_causation_id(&self, causation_id: impl Into<String>) -> Self {
        Self {
            causation_id: Some(causation_id.into()),
            ..self.clone()
        }
    }

    pub fn with_correlation(&self, correlation_id: impl Into<String>, causation_id: Option<String>) -> Self {
        Self {
            correlation_id: correlation_id.into(),
            causation_id,
            ..self.clone()
        }
    }

    /// Copy with `additional` merged over the existing metadata.
    pub fn with_additional_metadata(&self, additional: Metadata) -> Self {
        let mut metadata = self.metadata.clone();
        metadata.extend(additional);
        Self {
            metadata,
            ..self.clone()
        }
    }

    pub fn event_id(&self) -> &str {
        &self.event_id
    }

    pub fn event_type(&self) -> EventType {
        self.event_type
    }

    pub fn aggregate_id(&self) -> &str {
        &self.aggregate_id
    }

    pub fn aggregate_type(&self) -> &str {
        &self.aggregate_type
    }

    pub fn version(&self) -> Option<i64> {
        self.version
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    pub fn correlation_id(&self) -> &str {
        &self.correlation_id
    }

    pub fn causation_id(&self) -> Option<&str> {
        self.causation_id.as_deref()
    }

    pub fn user_id(&self) -> &str {
        &self.user_id
    }

    pub fn metadata(&self) -> &Metadata {
        &self.metadata
    }
}

// ============================================================================
// PatientEventPayload
// ============================================================================

/// Point-in-time snapshot of the patient aggregate carried by every event
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PatientEventPayload {
    pub patient_id: String,
    pub demographics: Option<Demographics>,
    pub contact_info: Option<ContactInfo>,
    pub emergency_contact: Option<EmergencyContact>,
    pub status: PatientStatus,
    pub changed_by: String,
    #[serde(with = "wire_time")]
    pub timestamp: DateTime<Utc>,
    pub change_reason: String,
    pub patient_version: Option<i64>,
}

impl PatientEventPayload {
    pub fn from_patient(patient: &Patient, changed_by: &str, change_reason: impl Into<String>) -> Self {
        Self::from_patient_at(patient, changed_by, change_reason, wire_now())
    }

    pub fn from_patient_at(
        patient: &Patient,
        changed_by: &str,
        change_reason: impl Into<String>,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self {
            patient_id: patient.id.clone(),
            demographics: Some(patient.demographics.clone()),
            contact_info: patient.contact_info.clone(),
            emergency_contact: patient.emergency_contact.clone(),
            status: patient.status,
            changed_by: changed_by.to_string(),
            timestamp,
            change_reason: change_reason.into(),
            patient_version: patient.version,
        }
    }

    pub fn with_change_reason(&self, change_reason: impl Into<String>) -> Self {
        Self {
            change_reason: change_reason.into(),
            ..self.clone()
        }
    }

    pub fn has_emergency_contact(&self) -> bool {
        self.emergency_contact.is_some()
    }

    pub fn has_email(&self) -> bool {
        self.contact_info
            .as_ref()
            .and_then(|contact| contact.email.as_deref())
            .is_some_and(|email| !email.trim().is_empty())
    }

    pub fn patient_full_name(&self) -> String {
        self.demographics
            .as_ref()
            .map(Demographics::full_name)
            .unwrap_or_else(|| "Unknown".to_string())
    }
}

// ============================================================================
// PatientEvent
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PatientEvent {
    base_event: BaseEvent,
    payload: PatientEventPayload,
    #[serde(with = "wire_time")]
    occurred_at: DateTime<Utc>,
}

impl PatientEvent {
    /// Assemble an event from already-built parts. No invariants are checked here;
    /// see `EventValidator`.
    pub fn new(base_event: BaseEvent, payload: PatientEventPayload, occurred_at: DateTime<Utc>) -> Self {
        Self {
            base_event,
            payload,
            occurred_at,
        }
    }

    /// Root event of a new causal chain
    pub fn create(
        event_type: EventType,
        payload: PatientEventPayload,
        user_id: &str,
        metadata: Metadata,
    ) -> Self {
        let base_event = BaseEvent::create(
            event_type,
            payload.patient_id.clone(),
            payload.patient_version,
            user_id,
            metadata,
        );
        Self::new(base_event, payload, wire_now())
    }

    /// Event placed in an explicitly supplied chain
    pub fn create_with_correlation(
        event_type: EventType,
        payload: PatientEventPayload,
        user_id: &str,
        metadata: Metadata,
        correlation_id: impl Into<String>,
        causation_id: Option<String>,
    ) -> Self {
        let root = Self::create(event_type, payload, user_id, metadata);
        root.with_correlation(correlation_id, causation_id)
    }

    /// Child of `parent`: same correlation id, caused by the parent's event id.
    pub fn create_correlated_child(
        parent: &PatientEvent,
        event_type: EventType,
        payload: PatientEventPayload,
        user_id: &str,
        metadata: Metadata,
    ) -> Self {
        Self::create_with_correlation(
            event_type,
            payload,
            user_id,
            metadata,
            parent.correlation_id(),
            Some(parent.event_id().to_string()),
        )
    }

    pub fn with_additional_metadata(&self, additional: Metadata) -> Self {
        Self {
            base_event: self.base_event.with_additional_metadata(additional),
            ..self.clone()
        }
    }

    pub fn with_correlation(&self, correlation_id: impl Into<String>, causation_id: Option<String>) -> Self {
        Self {
            base_event: self.base_event.with_correlation(correlation_id, causation_id),
            ..self.clone()
        }
    }

    pub fn base_event(&self) -> &BaseEvent {
        &self.base_event
    }

    pub fn payload(&self) -> &PatientEventPayload {
        &self.payload
    }

    pub fn occurred_at(&self) -> DateTime<Utc> {
        self.occurred_at
    }

    pub fn event_id(&self) -> &str {
        self.base_event.event_id()
    }

    pub fn event_type(&self) -> EventType {
        self.base_event.event_type()
    }

    pub fn patient_id(&self) -> &str {
        self.base_event.aggregate_id()
    }

    pub fn correlation_id(&self) -> &str {
        self.base_event.correlation_id()
    }

    pub fn causation_id(&self) -> Option<&str> {
        self.base_event.causation_id()
    }

    pub fn is_correlated_with(&self, other: &PatientEvent) -> bool {
        !self.correlation_id().is_empty() && self.correlation_id() == other.correlation_id()
    }

    pub fn was_caused_by(&self, other: &PatientEvent) -> bool {
        self.causation_id() == Some(other.event_id())
    }

    pub fn is_of_type(&self, event_type: EventType) -> bool {
        self.event_type() == event_type
    }

    pub fn belongs_to_patient(&self, patient_id: &str) -> bool {
        self.patient_id() == patient_id
    }

    /// One-line description for logs
    pub fn summary(&self) -> String {
        format!(
            "PatientEvent[{}] - {} for patient {} by {}",
            self.event_type(),
            self.payload.change_reason,
            self.payload.patient_full_name(),
            self.base_event.user_id()
        )
    }
}

// ============================================================================
// Codec
// ============================================================================

#[derive(Debug, thiserror::Error)]
pub enum EventCodecError {
    #[error("failed to serialize event: {0}")]
    Serialize(#[source] serde_json::Error),

    #[error("failed to deserialize event: {0}")]
    Deserialize(#[source] serde_json::Error),
}

pub fn serialize_event<E: Serialize>(event: &E) -> Result<String, EventCodecError> {
    serde_json::to_string(event).map_err(EventCodecError::Serialize)
}

pub fn deserialize_event<E: for<'de> Deserialize<'de>>(json: &str) -> Result<E, EventCodecError> {
    serde_json::from_str(json).map_err(EventCodecError::Deserialize)
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::domain::patient::{Gender, PatientDetails};
    use chrono::NaiveDate;

    pub(crate) fn jane_doe() -> Patient {
        let mut patient = Patient::register(PatientDetails {
            demographics: Demographics {
                first_name: "Jane".to_string(),
                last_name: "Doe".to_string(),
                middle_name: None,
                date_of_birth: NaiveDate::from_ymd_opt(1985, 4, 12).unwrap(),
                gender: Gender::Female,
                social_security_number: Some("123-45-6789".to_string()),
                preferred_language: Some("en".to_string()),
                marital_status: None,
            },
            contact_info: Some(ContactInfo {
                email: Some("jane.doe@example.com".to_string()),
                phone_number: Some("+1-555-0100".to_string()),
                ..ContactInfo::default()
            }),
            emergency_contact: None,
        });
        patient.version = Some(0);
        patient
    }

    fn registered(patient: &Patient) -> PatientEvent {
        PatientEvent::create(
            EventType::PatientRegistered,
            PatientEventPayload::from_patient(patient, "dr.house", "Patient registration"),
            "dr.house",
            Metadata::new(),
        )
    }

    #[test]
    fn test_create_starts_new_chain() {
        let patient = jane_doe();
        let event = registered(&patient);

        assert!(!event.correlation_id().is_empty());
        assert!(event.causation_id().is_none());
        assert_eq!(event.patient_id(), patient.id);
        assert_eq!(event.base_event().aggregate_type(), AGGREGATE_TYPE);
        assert_eq!(event.base_event().version(), Some(0));
    }

    #[test]
    fn test_root_events_get_distinct_correlation_ids() {
        let patient = jane_doe();
        let first = registered(&patient);
        let second = registered(&patient);

        assert_ne!(first.event_id(), second.event_id());
        assert!(!first.is_correlated_with(&second));
    }

    #[test]
    fn test_correlated_child_points_at_parent() {
        let patient = jane_doe();
        let parent = registered(&patient);
        let child = PatientEvent::create_correlated_child(
            &parent,
            EventType::PatientDemographicsUpdated,
            PatientEventPayload::from_patient(&patient, "dr.house", "Patient demographics updated"),
            "dr.house",
            Metadata::new(),
        );

        assert!(child.is_correlated_with(&parent));
        assert!(child.was_caused_by(&parent));
        assert!(!parent.was_caused_by(&child));
        assert_ne!(child.event_id(), parent.event_id());
    }

    #[test]
    fn test_additional_metadata_copies() {
        let patient = jane_doe();
        let mut metadata = Metadata::new();
        metadata.insert("source".to_string(), "patients-service".into());
        let original = PatientEvent::create(
            EventType::PatientActivated,
            PatientEventPayload::from_patient(&patient, "system", "Patient activated"),
            "system",
            metadata,
        );

        let mut extra = Metadata::new();
        extra.insert("retryCount".to_string(), 3.into());
        let derived = original.with_additional_metadata(extra);

        assert_eq!(original.base_event().metadata().len(), 1);
        assert_eq!(derived.base_event().metadata().len(), 2);
        assert_eq!(derived.event_id(), original.event_id());
        assert_eq!(derived.correlation_id(), original.correlation_id());
    }

    #[test]
    fn test_wire_format_round_trip() {
        let patient = jane_doe();
        let event = registered(&patient);

        let json = serialize_event(&event).unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();

        assert_eq!(value["baseEvent"]["eventType"], "PATIENT_REGISTERED");
        assert_eq!(value["baseEvent"]["aggregateType"], "Patient");
        assert!(value["baseEvent"]["causationId"].is_null());
        assert_eq!(value["payload"]["status"], "ACTIVE");
        let timestamp = value["baseEvent"]["timestamp"].as_str().unwrap();
        assert_eq!(timestamp.len(), "2024-01-01T00:00:00".len());
        assert!(!timestamp.contains('Z'));

        let decoded: PatientEvent = deserialize_event(&json).unwrap();
        assert_eq!(decoded, event);
    }

    #[test]
    fn test_deserialize_rejects_unknown_event_type() {
        let patient = jane_doe();
        let json = serialize_event(&registered(&patient))
            .unwrap()
            .replace("PATIENT_REGISTERED", "PATIENT_TELEPORTED");

        let result: Result<PatientEvent, _> = deserialize_event(&json);
        assert!(matches!(result, Err(EventCodecError::Deserialize(_))));
    }

    #[test]
    fn test_summary_mentions_type_and_actor() {
        let patient = jane_doe();
        let summary = registered(&patient).summary();

        assert!(summary.contains("PATIENT_REGISTERED"));
        assert!(summary.contains("Jane Doe"));
        assert!(summary.contains("dr.house"));
    }

    #[test]
    fn test_payload_accessors() {
        let patient = jane_doe();
        let payload = PatientEventPayload::from_patient(&patient, "dr.house", "Patient registration");

        assert!(payload.has_email());
        assert!(!payload.has_emergency_contact());

        let renamed = payload.with_change_reason("Patient reviewed");
        assert_eq!(renamed.change_reason, "Patient reviewed");
        assert_eq!(payload.change_reason, "Patient registration");
        assert_eq!(renamed.patient_id, payload.patient_id);

        let mut blank_email = payload.clone();
        if let Some(contact) = blank_email.contact_info.as_mut() {
            contact.email = Some("  ".to_string());
        }
        assert!(!blank_email.has_email());
    }

    #[test]
    fn test_type_and_patient_predicates() {
        let patient = jane_doe();
        let event = registered(&patient);

        assert!(event.is_of_type(EventType::PatientRegistered));
        assert!(!event.is_of_type(EventType::PatientDeleted));
        assert!(event.belongs_to_patient(&patient.id));
        assert!(!event.belongs_to_patient("someone-else"));
    }
}
