use std::sync::Arc;

use super::aggregate::{Patient, PatientDetails};
use super::errors::PatientError;
use super::repository::PatientRepository;
use super::value_objects::PatientStatus;
use crate::domain::Actor;
use crate::events::{EventFactory, EventValidator, PatientEvent, DEFAULT_DELETION_REASON};
use crate::publisher::EventPublisher;

// ============================================================================
// Patient Service
// ============================================================================
//
// Every mutation follows the same sequence:
//
//   load -> business rules -> mutate copy -> build events -> validate
//        -> save -> publish (fire-and-forget)
//
// Events are built from the post-mutation state and validated before anything
// is stored, so a rejected event leaves both the store and the broker
// untouched. Deletion builds its event from the last snapshot.
//
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PatientStatistics {
    pub total: u64,
    pub active: u64,
    pub inactive: u64,
    pub deceased: u64,
}

pub struct PatientService {
    repository: Arc<dyn PatientRepository>,
    publisher: Arc<dyn EventPublisher>,
    factory: EventFactory,
    validator: EventValidator,
    strict_validation: bool,
}

impl PatientService {
    pub fn new(
        repository: Arc<dyn PatientRepository>,
        publisher: Arc<dyn EventPublisher>,
        strict_validation: bool,
    ) -> Self {
        Self {
            repository,
            publisher,
            factory: EventFactory::new(),
            validator: EventValidator::new(),
            strict_validation,
        }
    }

    pub async fn create_patient(&self, details: PatientDetails, actor: &Actor) -> Result<Patient, PatientError> {
        tracing::info!(name = %details.demographics.full_name(), actor = %actor, "Creating patient");

        let mut patient = Patient::register(details);
        self.ensure_unique(&patient, None).await?;
        patient.bump_version();

        let event = self.factory.patient_registered(&patient, actor, None);
        self.check(&event)?;

        let saved = self.repository.save(patient).await?;
        self.publisher.publish_async(event);

        tracing::info!(patient_id = %saved.id, "Patient created");
        Ok(saved)
    }

    pub async fn update_patient(
        &self,
        id: &str,
        details: PatientDetails,
        actor: &Actor,
    ) -> Result<Patient, PatientError> {
        tracing::info!(patient_id = %id, actor = %actor, "Updating patient");

        let existing = self.load(id).await?;
        let changed = existing.changed_fields(&details);

        let mut patient = existing;
        patient.apply_details(details);
        self.ensure_unique(&patient, Some(id)).await?;
        patient.bump_version();

        let events = self.factory.patient_update_events(&patient, actor, &changed);
        for event in &events {
            self.check(event)?;
        }

        let saved = self.repository.save(patient).await?;
        for event in events {
            self.publisher.publish_async(event);
        }

        tracing::info!(patient_id = %saved.id, changes = %changed, "Patient updated");
        Ok(saved)
    }

    pub async fn activate_patient(&self, id: &str, actor: &Actor) -> Result<Patient, PatientError> {
        self.change_status(id, actor, PatientStatus::Active).await
    }

    pub async fn deactivate_patient(&self, id: &str, actor: &Actor) -> Result<Patient, PatientError> {
        self.change_status(id, actor, PatientStatus::Inactive).await
    }

    async fn change_status(&self, id: &str, actor: &Actor, target: PatientStatus) -> Result<Patient, PatientError> {
        tracing::info!(patient_id = %id, actor = %actor, status = %target, "Changing patient status");

        let mut patient = self.load(id).await?;
        let previous = patient.status;
        match target {
            PatientStatus::Active => patient.activate(),
            _ => patient.deactivate(),
        }
        patient.bump_version();

        let event = match target {
            PatientStatus::Active => self.factory.patient_activated(&patient, actor, previous, None),
            _ => self.factory.patient_deactivated(&patient, actor, previous, None),
        };
        self.check(&event)?;

        let saved = self.repository.save(patient).await?;
        self.publisher.publish_async(event);
        Ok(saved)
    }

    pub async fn delete_patient(&self, id: &str, actor: &Actor, reason: Option<&str>) -> Result<(), PatientError> {
        tracing::info!(patient_id = %id, actor = %actor, "Deleting patient");

        let patient = self.load(id).await?;
        let event = self
            .factory
            .patient_deleted(&patient, actor, reason.unwrap_or(DEFAULT_DELETION_REASON), None);
        self.check(&event)?;

        if !self.repository.delete_by_id(id).await? {
            return Err(PatientError::NotFound(id.to_string()));
        }
        self.publisher.publish_async(event);

        tracing::info!(patient_id = %id, "Patient deleted");
        Ok(())
    }

    pub async fn find_patient_by_id(&self, id: &str) -> Result<Option<Patient>, PatientError> {
        Ok(self.repository.find_by_id(id).await?)
    }

    pub async fn find_patient_by_email(&self, email: &str) -> Result<Option<Patient>, PatientError> {
        Ok(self.repository.find_by_email(email).await?)
    }

    pub async fn statistics(&self) -> Result<PatientStatistics, PatientError> {
        Ok(PatientStatistics {
            total: self.repository.count().await?,
            active: self.repository.count_by_status(PatientStatus::Active).await?,
            inactive: self.repository.count_by_status(PatientStatus::Inactive).await?,
            deceased: self.repository.count_by_status(PatientStatus::Deceased).await?,
        })
    }

    async fn load(&self, id: &str) -> Result<Patient, PatientError> {
        self.repository
            .find_by_id(id)
            .await?
            .ok_or_else(|| PatientError::NotFound(id.to_string()))
    }

    /// Email and SSN must not belong to any other patient
    async fn ensure_unique(&self, patient: &Patient, current_id: Option<&str>) -> Result<(), PatientError> {
        let is_other = |other: &Patient| Some(other.id.as_str()) != current_id;

        if let Some(email) = patient.email() {
            if let Some(owner) = self.repository.find_by_email(email).await? {
                if is_other(&owner) {
                    return Err(PatientError::EmailAlreadyExists);
                }
            }
        }

        if let Some(ssn) = patient.ssn() {
            let owners = self.repository.find_by_ssn(ssn).await?;
            if owners.iter().any(is_other) {
                return Err(PatientError::SsnAlreadyExists);
            }
        }
        Ok(())
    }

    fn check(&self, event: &PatientEvent) -> Result<(), PatientError> {
        if self.strict_validation {
            self.validator.validate_event(event)?;
        } else {
            let result = self.validator.is_valid_event(event);
            if !result.is_valid {
                tracing::warn!(
                    event_id = %event.event_id(),
                    errors = ?result.validation_errors,
                    "Publishing event that failed validation"
                );
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::patient::{ContactInfo, Demographics, Gender, InMemoryPatientRepository};
    use crate::events::{EventType, PatientEvent};
    use crate::publisher::{BatchReport, PublishError};
    use async_trait::async_trait;
    use chrono::NaiveDate;
    use std::sync::Mutex;

    #[derive(Default)]
    struct RecordingPublisher {
        events: Mutex<Vec<PatientEvent>>,
    }

    impl RecordingPublisher {
        fn events(&self) -> Vec<PatientEvent> {
            self.events.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl EventPublisher for RecordingPublisher {
        async fn publish(&self, event: &PatientEvent) -> Result<(), PublishError> {
            self.events.lock().unwrap().push(event.clone());
            Ok(())
        }

        async fn publish_with_retry(&self, event: &PatientEvent, _max_retries: u32) -> Result<(), PublishError> {
            self.publish(event).await
        }

        fn publish_async(&self, event: PatientEvent) {
            self.events.lock().unwrap().push(event);
        }

        async fn publish_batch(&self, events: &[PatientEvent]) -> BatchReport {
            self.events.lock().unwrap().extend_from_slice(events);
            BatchReport {
                published: events.len(),
                failed: 0,
            }
        }
    }

    fn jane(email: &str, ssn: &str) -> PatientDetails {
        PatientDetails {
            demographics: Demographics {
                first_name: "Jane".to_string(),
                last_name: "Doe".to_string(),
                middle_name: None,
                date_of_birth: NaiveDate::from_ymd_opt(1985, 4, 12).unwrap(),
                gender: Gender::Female,
                social_security_number: Some(ssn.to_string()),
                preferred_language: None,
                marital_status: None,
            },
            contact_info: Some(ContactInfo {
                email: Some(email.to_string()),
                ..ContactInfo::default()
            }),
            emergency_contact: None,
        }
    }

    fn service() -> (PatientService, Arc<RecordingPublisher>) {
        let publisher = Arc::new(RecordingPublisher::default());
        let service = PatientService::new(Arc::new(InMemoryPatientRepository::new()), publisher.clone(), true);
        (service, publisher)
    }

    #[tokio::test]
    async fn test_create_emits_registered_root_event() {
        let (service, publisher) = service();
        let actor = Actor::new("dr.house");

        let patient = service
            .create_patient(jane("jane.doe@example.com", "123-45-6789"), &actor)
            .await
            .unwrap();

        assert_eq!(patient.version, Some(0));
        let events = publisher.events();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].event_type(), EventType::PatientRegistered);
        assert_eq!(events[0].payload().patient_id, patient.id);
        assert!(events[0].causation_id().is_none());
        assert!(!events[0].correlation_id().is_empty());
        assert_eq!(events[0].base_event().user_id(), "dr.house");
    }

    #[tokio::test]
    async fn test_duplicate_email_and_ssn_are_rejected() {
        let (service, publisher) = service();
        let actor = Actor::system();
        service
            .create_patient(jane("jane.doe@example.com", "123-45-6789"), &actor)
            .await
            .unwrap();

        let email_clash = service
            .create_patient(jane("JANE.DOE@example.com", "999-99-9999"), &actor)
            .await;
        assert!(matches!(email_clash, Err(PatientError::EmailAlreadyExists)));

        let ssn_clash = service
            .create_patient(jane("other@example.com", "123-45-6789"), &actor)
            .await;
        assert!(matches!(ssn_clash, Err(PatientError::SsnAlreadyExists)));

        assert_eq!(publisher.events().len(), 1);
    }

    #[tokio::test]
    async fn test_update_emits_general_and_correlated_field_events() {
        let (service, publisher) = service();
        let actor = Actor::system();
        let patient = service
            .create_patient(jane("jane.doe@example.com", "123-45-6789"), &actor)
            .await
            .unwrap();

        let mut details = jane("jane.smith@example.com", "123-45-6789");
        details.demographics.last_name = "Smith".to_string();
        let updated = service.update_patient(&patient.id, details, &actor).await.unwrap();
        assert_eq!(updated.version, Some(1));

        let events = publisher.events();
        let update_events = &events[1..];
        let types: Vec<EventType> = update_events.iter().map(PatientEvent::event_type).collect();
        assert_eq!(
            types,
            vec![
                EventType::PatientUpdated,
                EventType::PatientDemographicsUpdated,
                EventType::PatientContactInfoUpdated,
            ]
        );
        let general = &update_events[0];
        assert!(update_events
            .iter()
            .all(|e| e.correlation_id() == general.correlation_id()));
        assert!(update_events[1..].iter().all(|e| e.was_caused_by(general)));
    }

    #[tokio::test]
    async fn test_update_may_keep_own_email() {
        let (service, _) = service();
        let actor = Actor::system();
        let patient = service
            .create_patient(jane("jane.doe@example.com", "123-45-6789"), &actor)
            .await
            .unwrap();

        let result = service
            .update_patient(&patient.id, jane("jane.doe@example.com", "123-45-6789"), &actor)
            .await;
        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn test_status_changes_and_statistics() {
        let (service, publisher) = service();
        let actor = Actor::system();
        let patient = service
            .create_patient(jane("jane.doe@example.com", "123-45-6789"), &actor)
            .await
            .unwrap();

        let deactivated = service.deactivate_patient(&patient.id, &actor).await.unwrap();
        assert_eq!(deactivated.status, PatientStatus::Inactive);

        let stats = service.statistics().await.unwrap();
        assert_eq!(stats, PatientStatistics { total: 1, active: 0, inactive: 1, deceased: 0 });

        service.activate_patient(&patient.id, &actor).await.unwrap();
        let events = publisher.events();
        assert_eq!(events[1].event_type(), EventType::PatientDeactivated);
        assert_eq!(events[1].base_event().metadata()["previousStatus"], "ACTIVE");
        assert_eq!(events[2].event_type(), EventType::PatientActivated);
        assert_eq!(events[2].base_event().metadata()["previousStatus"], "INACTIVE");
    }

    #[tokio::test]
    async fn test_delete_emits_from_last_snapshot() {
        let (service, publisher) = service();
        let actor = Actor::new("admin");
        let patient = service
            .create_patient(jane("jane.doe@example.com", "123-45-6789"), &actor)
            .await
            .unwrap();

        service.delete_patient(&patient.id, &actor, None).await.unwrap();

        assert!(service.find_patient_by_id(&patient.id).await.unwrap().is_none());
        let deleted = publisher.events().pop().unwrap();
        assert_eq!(deleted.event_type(), EventType::PatientDeleted);
        assert_eq!(deleted.payload().patient_full_name(), "Jane Doe");
        assert_eq!(deleted.payload().change_reason, DEFAULT_DELETION_REASON);
    }

    #[tokio::test]
    async fn test_missing_patient() {
        let (service, publisher) = service();
        let result = service.activate_patient("missing", &Actor::system()).await;

        assert!(matches!(result, Err(PatientError::NotFound(id)) if id == "missing"));
        assert!(publisher.events().is_empty());
    }

    #[tokio::test]
    async fn test_find_by_email() {
        let (service, _) = service();
        let patient = service
            .create_patient(jane("jane.doe@example.com", "123-45-6789"), &Actor::system())
            .await
            .unwrap();

        let found = service.find_patient_by_email("jane.doe@example.com").await.unwrap();
        assert_eq!(found.map(|p| p.id), Some(patient.id));
    }
}
