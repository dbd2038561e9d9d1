use serde_json::Value;

use super::core::PatientEvent;

// ============================================================================
// Event Validation
// ============================================================================
//
// Additive checks: every rule that fails contributes one message, in a fixed
// order, so callers see the complete picture in one pass.
//
// Typed `PatientEvent`s cannot lack an envelope, payload, event type or
// timestamp; those presence rules apply to raw wire documents through
// `inspect_document`.
//
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Event validation failed: {}", .errors.join(", "))]
pub struct EventValidationError {
    pub errors: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationResult {
    pub is_valid: bool,
    pub error_message: Option<String>,
    pub validation_errors: Vec<String>,
}

impl ValidationResult {
    pub fn valid() -> Self {
        Self {
            is_valid: true,
            error_message: None,
            validation_errors: Vec::new(),
        }
    }

    pub fn invalid(error_message: impl Into<String>, errors: Vec<String>) -> Self {
        Self {
            is_valid: false,
            error_message: Some(error_message.into()),
            validation_errors: errors,
        }
    }

    fn from_errors(errors: Vec<String>) -> Self {
        if errors.is_empty() {
            Self::valid()
        } else {
            Self::invalid("Event validation failed", errors)
        }
    }

    pub fn into_result(self) -> Result<(), EventValidationError> {
        if self.is_valid {
            Ok(())
        } else {
            Err(EventValidationError {
                errors: self.validation_errors,
            })
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct EventValidator;

impl EventValidator {
    pub fn new() -> Self {
        Self
    }

    pub fn validate_event(&self, event: &PatientEvent) -> Result<(), EventValidationError> {
        let result = self.is_valid_event(event);
        if !result.is_valid {
            tracing::warn!(
                event_id = %event.event_id(),
                errors = ?result.validation_errors,
                "Event validation failed"
            );
        }
        result.into_result()
    }

    pub fn is_valid_event(&self, event: &PatientEvent) -> ValidationResult {
        let mut errors = Vec::new();
        let base = event.base_event();
        let payload = event.payload();

        if is_blank(base.event_id()) {
            errors.push("Event ID is required".to_string());
        }
        if is_blank(base.aggregate_id()) {
            errors.push("Aggregate ID is required".to_string());
        }
        if is_blank(&payload.patient_id) {
            errors.push("Payload patient ID is required".to_string());
        }
        if payload.demographics.is_none() {
            errors.push("Payload demographics are required".to_string());
        }
        if base.aggregate_id() != payload.patient_id {
            errors.push("Aggregate ID must match payload patient ID".to_string());
        }

        ValidationResult::from_errors(errors)
    }

    /// Presence checks on an encoded event, before it is decoded
    pub fn inspect_document(&self, document: &Value) -> ValidationResult {
        let mut errors = Vec::new();

        let base = document.get("baseEvent").filter(|v| v.is_object());
        let payload = document.get("payload").filter(|v| v.is_object());

        match base {
            None => errors.push("Base event is required".to_string()),
            Some(base) => {
                if blank_text(base, "eventId") {
                    errors.push("Event ID is required".to_string());
                }
                if missing(base, "eventType") {
                    errors.push("Event type is required".to_string());
                }
                if blank_text(base, "aggregateId") {
                    errors.push("Aggregate ID is required".to_string());
                }
                if missing(base, "timestamp") {
                    errors.push("Event timestamp is required".to_string());
                }
            }
        }

        match payload {
            None => errors.push("Event payload is required".to_string()),
            Some(payload) => {
                if blank_text(payload, "patientId") {
                    errors.push("Payload patient ID is required".to_string());
                }
                if missing(payload, "demographics") {
                    errors.push("Payload demographics are required".to_string());
                }
            }
        }

        if let (Some(base), Some(payload)) = (base, payload) {
            let aggregate_id = base.get("aggregateId").and_then(Value::as_str);
            let patient_id = payload.get("patientId").and_then(Value::as_str);
            if aggregate_id.is_some() && patient_id.is_some() && aggregate_id != patient_id {
                errors.push("Aggregate ID must match payload patient ID".to_string());
            }
        }

        ValidationResult::from_errors(errors)
    }
}

fn is_blank(value: &str) -> bool {
    value.trim().is_empty()
}

fn missing(object: &Value, field: &str) -> bool {
    object.get(field).map_or(true, Value::is_null)
}

fn blank_text(object: &Value, field: &str) -> bool {
    object
        .get(field)
        .and_then(Value::as_str)
        .map_or(true, is_blank)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::Actor;
    use crate::events::core::event::tests::jane_doe;
    use crate::events::core::{serialize_event, PatientEvent, PatientEventPayload};
    use crate::events::factory::EventFactory;

    fn registered() -> PatientEvent {
        EventFactory::new().patient_registered(&jane_doe(), &Actor::system(), None)
    }

    #[test]
    fn test_well_formed_event_is_valid() {
        let validator = EventValidator::new();
        let event = registered();

        let result = validator.is_valid_event(&event);
        assert!(result.is_valid);
        assert!(result.error_message.is_none());
        assert!(result.validation_errors.is_empty());
        assert!(validator.validate_event(&event).is_ok());
    }

    #[test]
    fn test_mismatched_patient_id_is_invalid() {
        let event = registered();
        let mut payload: PatientEventPayload = event.payload().clone();
        payload.patient_id = "someone-else".to_string();
        let tampered = PatientEvent::new(event.base_event().clone(), payload, event.occurred_at());

        let result = EventValidator::new().is_valid_event(&tampered);
        assert!(!result.is_valid);
        assert_eq!(
            result.validation_errors,
            vec!["Aggregate ID must match payload patient ID".to_string()]
        );
        assert!(result.error_message.is_some());
    }

    #[test]
    fn test_errors_accumulate() {
        let event = registered();
        let mut payload = event.payload().clone();
        payload.patient_id = "  ".to_string();
        payload.demographics = None;
        let tampered = PatientEvent::new(event.base_event().clone(), payload, event.occurred_at());

        let err = EventValidator::new().validate_event(&tampered).unwrap_err();
        assert_eq!(err.errors.len(), 3);
        assert!(err.to_string().starts_with("Event validation failed: "));
        assert!(err.to_string().contains("Payload demographics are required"));
    }

    #[test]
    fn test_inspect_document_accepts_encoded_event() {
        let json = serialize_event(&registered()).unwrap();
        let document: Value = serde_json::from_str(&json).unwrap();

        assert!(EventValidator::new().inspect_document(&document).is_valid);
    }

    #[test]
    fn test_inspect_document_reports_missing_parts() {
        let document = serde_json::json!({
            "baseEvent": { "eventId": "", "aggregateId": "p-1" },
            "occurredAt": "2024-01-01T00:00:00"
        });

        let result = EventValidator::new().inspect_document(&document);
        assert!(!result.is_valid);
        assert_eq!(
            result.validation_errors,
            vec![
                "Event ID is required".to_string(),
                "Event type is required".to_string(),
                "Event timestamp is required".to_string(),
                "Event payload is required".to_string(),
            ]
        );
    }
}
