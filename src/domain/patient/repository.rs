use anyhow::Result;
use async_trait::async_trait;
use std::collections::HashMap;
use tokio::sync::RwLock;

use super::aggregate::Patient;
use super::value_objects::PatientStatus;

// ============================================================================
// Patient Repository
// ============================================================================
//
// Plain keyed store for the aggregate. Persistence proper lives outside this
// crate; the in-memory implementation backs tests and broker-less demos.
//
// ============================================================================

#[async_trait]
pub trait PatientRepository: Send + Sync {
    async fn find_by_id(&self, id: &str) -> Result<Option<Patient>>;

    async fn find_by_email(&self, email: &str) -> Result<Option<Patient>>;

    async fn find_by_ssn(&self, ssn: &str) -> Result<Vec<Patient>>;

    /// Insert or replace by id
    async fn save(&self, patient: Patient) -> Result<Patient>;

    /// Returns whether a record was removed
    async fn delete_by_id(&self, id: &str) -> Result<bool>;

    async fn count(&self) -> Result<u64>;

    async fn count_by_status(&self, status: PatientStatus) -> Result<u64>;
}

#[derive(Default)]
pub struct InMemoryPatientRepository {
    patients: RwLock<HashMap<String, Patient>>,
}

impl InMemoryPatientRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl PatientRepository for InMemoryPatientRepository {
    async fn find_by_id(&self, id: &str) -> Result<Option<Patient>> {
        Ok(self.patients.read().await.get(id).cloned())
    }

    async fn find_by_email(&self, email: &str) -> Result<Option<Patient>> {
        let patients = self.patients.read().await;
        Ok(patients
            .values()
            .find(|p| p.email().is_some_and(|e| e.eq_ignore_ascii_case(email)))
            .cloned())
    }

    async fn find_by_ssn(&self, ssn: &str) -> Result<Vec<Patient>> {
        let patients = self.patients.read().await;
        Ok(patients
            .values()
            .filter(|p| p.ssn() == Some(ssn))
            .cloned()
            .collect())
    }

    async fn save(&self, patient: Patient) -> Result<Patient> {
        self.patients
            .write()
            .await
            .insert(patient.id.clone(), patient.clone());
        Ok(patient)
    }

    async fn delete_by_id(&self, id: &str) -> Result<bool> {
        Ok(self.patients.write().await.remove(id).is_some())
    }

    async fn count(&self) -> Result<u64> {
        Ok(self.patients.read().await.len() as u64)
    }

    async fn count_by_status(&self, status: PatientStatus) -> Result<u64> {
        let patients = self.patients.read().await;
        Ok(patients.values().filter(|p| p.status == status).count() as u64)
    }
}
