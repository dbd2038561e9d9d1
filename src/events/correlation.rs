use std::collections::HashMap;
use uuid::Uuid;

use super::core::PatientEvent;

// ============================================================================
// Correlation Algebra
// ============================================================================
//
// correlation id: shared by every event of one business transaction
// causation id:   parent pointer to the event that directly caused this one
//
// Following causation ids from any event leads back to the transaction's
// root event, whose causation id is empty.
//
// ============================================================================

pub fn generate_correlation_id() -> String {
    Uuid::new_v4().to_string()
}

/// True iff both events carry the same non-empty correlation id
pub fn are_correlated(first: &PatientEvent, second: &PatientEvent) -> bool {
    first.is_correlated_with(second)
}

/// Re-parent `new_event` under `original`: the copy joins the original's chain
/// and records the original as its direct cause.
pub fn correlate_event(original: &PatientEvent, new_event: &PatientEvent) -> PatientEvent {
    new_event.with_correlation(original.correlation_id(), Some(original.event_id().to_string()))
}

/// Walk causation pointers from `leaf` back to the root.
///
/// Returns the chain ordered root first. The walk stops at the first event
/// whose cause is not in `events` or that leaves the leaf's correlation
/// group, so a partial history yields a partial chain instead of an error.
pub fn causal_chain<'a>(events: &'a [PatientEvent], leaf: &'a PatientEvent) -> Vec<&'a PatientEvent> {
    let by_id: HashMap<&str, &PatientEvent> = events
        .iter()
        .map(|event| (event.event_id(), event))
        .collect();

    let mut chain = vec![leaf];
    let mut current = leaf;

    while let Some(cause_id) = current.causation_id() {
        match by_id.get(cause_id).copied() {
            Some(parent) if parent.is_correlated_with(leaf) => {
                // causation ids form a tree; a repeated id means corrupted input
                if chain.iter().any(|seen| seen.event_id() == parent.event_id()) {
                    tracing::warn!(event_id = %parent.event_id(), "Causation cycle detected");
                    break;
                }
                chain.push(parent);
                current = parent;
            }
            _ => break,
        }
    }

    chain.reverse();
    chain
}
