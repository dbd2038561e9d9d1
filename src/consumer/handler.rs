use async_trait::async_trait;

use crate::events::{EventType, PatientEvent};

// ============================================================================
// Patient Event Handlers
// ============================================================================

/// One callback per consumed fact. An `Err` leaves the record unacknowledged
/// so it is delivered again; handlers must therefore be idempotent.
#[async_trait]
pub trait PatientEventHandler: Send + Sync {
    async fn on_registered(&self, event: &PatientEvent) -> anyhow::Result<()>;

    async fn on_updated(&self, event: &PatientEvent) -> anyhow::Result<()>;

    async fn on_deactivated(&self, event: &PatientEvent) -> anyhow::Result<()>;

    async fn on_activated(&self, event: &PatientEvent) -> anyhow::Result<()>;

    async fn on_deleted(&self, event: &PatientEvent) -> anyhow::Result<()>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dispatch {
    Handled,
    /// No handler for this type; the record is acknowledged as is
    Ignored,
}

pub async fn dispatch(handler: &dyn PatientEventHandler, event: &PatientEvent) -> anyhow::Result<Dispatch> {
    match event.event_type() {
        EventType::PatientRegistered => handler.on_registered(event).await?,
        EventType::PatientUpdated => handler.on_updated(event).await?,
        EventType::PatientDeactivated => handler.on_deactivated(event).await?,
        EventType::PatientActivated => handler.on_activated(event).await?,
        EventType::PatientDeleted => handler.on_deleted(event).await?,
        other => {
            tracing::warn!(event_id = %event.event_id(), event_type = %other, "No handler for event type");
            return Ok(Dispatch::Ignored);
        }
    }
    Ok(Dispatch::Handled)
}

/// Default listener: records each fact in the service log
#[derive(Debug, Clone, Default)]
pub struct LoggingEventHandler;

#[async_trait]
impl PatientEventHandler for LoggingEventHandler {
    async fn on_registered(&self, event: &PatientEvent) -> anyhow::Result<()> {
        let payload = event.payload();
        tracing::info!(patient_id = %payload.patient_id, name = %payload.patient_full_name(), "Patient registered");
        Ok(())
    }

    async fn on_updated(&self, event: &PatientEvent) -> anyhow::Result<()> {
        let payload = event.payload();
        tracing::info!(patient_id = %payload.patient_id, changes = %payload.change_reason, "Patient updated");
        Ok(())
    }

    async fn on_deactivated(&self, event: &PatientEvent) -> anyhow::Result<()> {
        tracing::info!(patient_id = %event.payload().patient_id, "Patient deactivated");
        Ok(())
    }

    async fn on_activated(&self, event: &PatientEvent) -> anyhow::Result<()> {
        tracing::info!(patient_id = %event.payload().patient_id, "Patient activated");
        Ok(())
    }

    async fn on_deleted(&self, event: &PatientEvent) -> anyhow::Result<()> {
        let payload = event.payload();
        tracing::warn!(patient_id = %payload.patient_id, reason = %payload.change_reason, "Patient deleted");
        Ok(())
    }
}
