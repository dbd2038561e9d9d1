use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use super::value_objects::{ContactInfo, Demographics, EmergencyContact, PatientStatus};

// ============================================================================
// Patient Aggregate
// ============================================================================

/// The patient record: unit of consistency and partitioning key of the
/// event stream.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Patient {
    pub id: String,
    pub demographics: Demographics,
    pub contact_info: Option<ContactInfo>,
    pub emergency_contact: Option<EmergencyContact>,
    pub status: PatientStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    /// `None` until first persisted, then 0, +1 per save
    pub version: Option<i64>,
}

/// Mutable portion of a patient record, as supplied by create/update callers
#[derive(Debug, Clone, PartialEq)]
pub struct PatientDetails {
    pub demographics: Demographics,
    pub contact_info: Option<ContactInfo>,
    pub emergency_contact: Option<EmergencyContact>,
}

impl Patient {
    pub fn register(details: PatientDetails) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::now_v7().to_string(),
            demographics: details.demographics,
            contact_info: details.contact_info,
            emergency_contact: details.emergency_contact,
            status: PatientStatus::Active,
            created_at: now,
            updated_at: now,
            version: None,
        }
    }

    pub fn is_active(&self) -> bool {
        self.status == PatientStatus::Active
    }

    pub fn activate(&mut self) {
        self.status = PatientStatus::Active;
    }

    pub fn deactivate(&mut self) {
        self.status = PatientStatus::Inactive;
    }

    pub fn email(&self) -> Option<&str> {
        self.contact_info.as_ref().and_then(|c| c.email.as_deref())
    }

    pub fn ssn(&self) -> Option<&str> {
        self.demographics.social_security_number.as_deref()
    }

    /// Fields of `updated` that differ structurally from this record
    pub fn changed_fields(&self, updated: &PatientDetails) -> ChangedFields {
        let mut fields = Vec::new();
        if self.demographics != updated.demographics {
            fields.push(PatientField::Demographics);
        }
        if self.contact_info != updated.contact_info {
            fields.push(PatientField::ContactInfo);
        }
        if self.emergency_contact != updated.emergency_contact {
            fields.push(PatientField::EmergencyContact);
        }
        ChangedFields(fields)
    }

    pub fn apply_details(&mut self, details: PatientDetails) {
        self.demographics = details.demographics;
        self.contact_info = details.contact_info;
        self.emergency_contact = details.emergency_contact;
        self.updated_at = Utc::now();
    }

    /// Advance the optimistic version for the next save
    pub fn bump_version(&mut self) {
        self.version = Some(self.version.map_or(0, |v| v + 1));
    }
}

// ============================================================================
// Change Detection
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PatientField {
    Demographics,
    ContactInfo,
    EmergencyContact,
}

impl PatientField {
    pub fn as_str(&self) -> &'static str {
        match self {
            PatientField::Demographics => "demographics",
            PatientField::ContactInfo => "contactInfo",
            PatientField::EmergencyContact => "emergencyContact",
        }
    }
}

/// Ordered set of changed fields; displays as a comma-joined list
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChangedFields(Vec<PatientField>);

impl ChangedFields {
    pub fn new(fields: Vec<PatientField>) -> Self {
        Self(fields)
    }

    pub fn contains(&self, field: PatientField) -> bool {
        self.0.contains(&field)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = PatientField> + '_ {
        self.0.iter().copied()
    }
}

impl fmt::Display for ChangedFields {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let joined: Vec<&str> = self.0.iter().map(PatientField::as_str).collect();
        f.write_str(&joined.join(","))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::patient::{Gender, Relationship};
    use chrono::NaiveDate;

    fn details() -> PatientDetails {
        PatientDetails {
            demographics: Demographics {
                first_name: "John".to_string(),
                last_name: "Smith".to_string(),
                middle_name: None,
                date_of_birth: NaiveDate::from_ymd_opt(1970, 1, 1).unwrap(),
                gender: Gender::Male,
                social_security_number: None,
                preferred_language: None,
                marital_status: None,
            },
            contact_info: Some(ContactInfo {
                email: Some("john@example.com".to_string()),
                ..ContactInfo::default()
            }),
            emergency_contact: Some(EmergencyContact {
                name: "Mary Smith".to_string(),
                phone_number: "+1-555-0101".to_string(),
                email: None,
                relationship: Relationship::Spouse,
            }),
        }
    }

    #[test]
    fn test_register_starts_active_and_unversioned() {
        let patient = Patient::register(details());
        assert!(patient.is_active());
        assert_eq!(patient.version, None);
        assert!(!patient.id.is_empty());
    }

    #[test]
    fn test_status_toggles() {
        let mut patient = Patient::register(details());
        patient.deactivate();
        assert_eq!(patient.status, PatientStatus::Inactive);
        patient.activate();
        assert!(patient.is_active());
    }

    #[test]
    fn test_changed_fields_detects_structural_changes() {
        let patient = Patient::register(details());

        let mut updated = details();
        assert!(patient.changed_fields(&updated).is_empty());

        updated.demographics.last_name = "Smyth".to_string();
        updated.emergency_contact = None;
        let changed = patient.changed_fields(&updated);

        assert!(changed.contains(PatientField::Demographics));
        assert!(!changed.contains(PatientField::ContactInfo));
        assert!(changed.contains(PatientField::EmergencyContact));
        assert_eq!(changed.to_string(), "demographics,emergencyContact");
    }

    #[test]
    fn test_bump_version() {
        let mut patient = Patient::register(details());
        patient.bump_version();
        assert_eq!(patient.version, Some(0));
        patient.bump_version();
        assert_eq!(patient.version, Some(1));
    }
}
