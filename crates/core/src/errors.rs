use thiserror::Error;

use crate::domain::claim::{ClaimKind, ClaimStatus};
use crate::domain::itinerary::ItineraryKind;
use crate::domain::trip::TripStatus;

/// Caller-correctable failures: bad input or an illegal state transition.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum DomainError {
    #[error("missing required field `{field}`")]
    MissingField { field: &'static str },
    #[error("invalid value for `{field}`: {reason}")]
    InvalidField { field: &'static str, reason: String },
    #[error("{kind} legs do not carry a return date")]
    ReturnDateNotSupported { kind: ItineraryKind },
    #[error("invalid trip transition from {from} to {to}")]
    InvalidTripTransition { from: TripStatus, to: TripStatus },
    #[error("invalid {kind} transition from {from} to {to}")]
    InvalidClaimTransition { kind: ClaimKind, from: ClaimStatus, to: ClaimStatus },
    #[error("only approved trips can be finished (trip is {from})")]
    TripNotFinishable { from: TripStatus },
    #[error("cannot delete an approved trip")]
    ApprovedTripDeletion,
    #[error("{kind}s can only be added to approved trips (trip is {status})")]
    TripNotApproved { kind: ClaimKind, status: TripStatus },
    #[error("this trip is finished; no more {kind}s can be added")]
    TripFinished { kind: ClaimKind },
    #[error("rejection reason is required")]
    MissingRejectionReason,
    #[error("can only {action} pending {kind}s (status is {status})")]
    ClaimNotPending { kind: ClaimKind, status: ClaimStatus, action: &'static str },
    #[error("no fields to update")]
    EmptyPatch,
    #[error("{sent} fields cannot be applied to an {kind}")]
    PatchKindMismatch { kind: ClaimKind, sent: ClaimKind },
    #[error("category `{name}` is in use by {expense_count} expense(s)")]
    CategoryInUse { name: String, expense_count: i64 },
}

impl DomainError {
    pub fn invalid(field: &'static str, reason: impl Into<String>) -> Self {
        Self::InvalidField { field, reason: reason.into() }
    }
}

#[cfg(test)]
mod tests {
    use super::DomainError;
    use crate::domain::claim::{ClaimKind, ClaimStatus};
    use crate::domain::trip::TripStatus;

    #[test]
    fn state_mismatch_names_current_status() {
        let error =
            DomainError::TripNotApproved { kind: ClaimKind::Expense, status: TripStatus::Pending };
        assert_eq!(error.to_string(), "expenses can only be added to approved trips (trip is pending)");
    }

    #[test]
    fn finished_message_is_distinct_from_state_mismatch() {
        let finished = DomainError::TripFinished { kind: ClaimKind::Advance }.to_string();
        let mismatch = DomainError::TripNotApproved {
            kind: ClaimKind::Advance,
            status: TripStatus::Finished,
        }
        .to_string();

        assert!(finished.contains("finished"));
        assert_ne!(finished, mismatch);
    }

    #[test]
    fn pending_guard_names_the_refused_action() {
        let error = DomainError::ClaimNotPending {
            kind: ClaimKind::Expense,
            status: ClaimStatus::Approved,
            action: "edit",
        };
        assert_eq!(error.to_string(), "can only edit pending expenses (status is approved)");
    }

    #[test]
    fn finish_gate_carries_starting_status() {
        let error = DomainError::TripNotFinishable { from: TripStatus::Rejected };
        assert!(error.to_string().contains("rejected"));
    }
}
