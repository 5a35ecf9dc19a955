//! Status transition rules shared by the trip and claim repositories.
//!
//! Trips move `pending -> approved | rejected` and `approved -> finished`;
//! `rejected` and `finished` are terminal.
//!
//! Claims leave `pending` for `approved` or `rejected`, and an admin decision can
//! be revised afterwards: any claim may be approved or rejected again, which
//! re-stamps the approver and time. Approval clears the rejection reason and
//! rejection replaces it. No claim returns to `pending`, so bulk approval needs
//! no per-row check.
//!
//! The claim-creation gate looks at the trip status only at creation time. Claims
//! that already exist are never re-validated against their trip, so they can still
//! be approved or rejected after the trip is finished.

use crate::domain::claim::{ClaimKind, ClaimStatus};
use crate::domain::trip::TripStatus;
use crate::errors::DomainError;

#[derive(Clone, Copy, Debug, Default)]
pub struct ApprovalWorkflow;

impl ApprovalWorkflow {
    pub fn trip_transition_allowed(from: TripStatus, to: TripStatus) -> bool {
        matches!(
            (from, to),
            (TripStatus::Pending, TripStatus::Approved)
                | (TripStatus::Pending, TripStatus::Rejected)
                | (TripStatus::Approved, TripStatus::Finished)
        )
    }

    pub fn check_trip_transition(from: TripStatus, to: TripStatus) -> Result<(), DomainError> {
        if to == TripStatus::Finished {
            return Self::check_finish(from);
        }
        if Self::trip_transition_allowed(from, to) {
            return Ok(());
        }
        Err(DomainError::InvalidTripTransition { from, to })
    }

    /// Finishing is the terminal step of an approved trip.
    pub fn check_finish(from: TripStatus) -> Result<(), DomainError> {
        if from == TripStatus::Approved {
            return Ok(());
        }
        Err(DomainError::TripNotFinishable { from })
    }

    pub fn claim_transition_allowed(from: ClaimStatus, to: ClaimStatus) -> bool {
        matches!(
            (from, to),
            (
                ClaimStatus::Pending | ClaimStatus::Approved | ClaimStatus::Rejected,
                ClaimStatus::Approved | ClaimStatus::Rejected
            )
        )
    }

    pub fn check_claim_transition(
        kind: ClaimKind,
        from: ClaimStatus,
        to: ClaimStatus,
    ) -> Result<(), DomainError> {
        if Self::claim_transition_allowed(from, to) {
            return Ok(());
        }
        Err(DomainError::InvalidClaimTransition { kind, from, to })
    }

    /// Claims are accepted only while the trip is approved. A finished trip gets
    /// its own message even though the generic check would also reject it.
    pub fn check_claim_creation(kind: ClaimKind, trip_status: TripStatus) -> Result<(), DomainError> {
        let finished = trip_status == TripStatus::Finished;
        let approved = trip_status == TripStatus::Approved;

        match (finished, approved) {
            (true, _) => Err(DomainError::TripFinished { kind }),
            (false, false) => Err(DomainError::TripNotApproved { kind, status: trip_status }),
            (false, true) => Ok(()),
        }
    }

    /// Approved trips may already carry claims and cannot be deleted. Finished
    /// trips are not guarded.
    pub fn check_trip_deletion(status: TripStatus) -> Result<(), DomainError> {
        if status == TripStatus::Approved {
            return Err(DomainError::ApprovedTripDeletion);
        }
        Ok(())
    }

    pub fn check_claim_deletion(kind: ClaimKind, status: ClaimStatus) -> Result<(), DomainError> {
        Self::require_pending(kind, status, "delete")
    }

    /// Field edits and receipt changes are limited to claims nobody has decided on.
    pub fn check_claim_edit(kind: ClaimKind, status: ClaimStatus) -> Result<(), DomainError> {
        Self::require_pending(kind, status, "edit")
    }

    fn require_pending(
        kind: ClaimKind,
        status: ClaimStatus,
        action: &'static str,
    ) -> Result<(), DomainError> {
        if status == ClaimStatus::Pending {
            return Ok(());
        }
        Err(DomainError::ClaimNotPending { kind, status, action })
    }

    /// Blank reasons are refused before any storage is touched.
    pub fn rejection_reason(reason: Option<&str>) -> Result<String, DomainError> {
        reason
            .map(str::trim)
            .filter(|value| !value.is_empty())
            .map(str::to_string)
            .ok_or(DomainError::MissingRejectionReason)
    }
}

#[cfg(test)]
mod tests {
    use super::ApprovalWorkflow;
    use crate::domain::claim::{ClaimKind, ClaimStatus};
    use crate::domain::trip::TripStatus;
    use crate::errors::DomainError;

    #[test]
    fn trip_transition_table_is_closed() {
        let allowed: Vec<(TripStatus, TripStatus)> = TripStatus::ALL
            .iter()
            .flat_map(|from| TripStatus::ALL.iter().map(move |to| (*from, *to)))
            .filter(|(from, to)| ApprovalWorkflow::trip_transition_allowed(*from, *to))
            .collect();

        assert_eq!(
            allowed,
            vec![
                (TripStatus::Pending, TripStatus::Approved),
                (TripStatus::Pending, TripStatus::Rejected),
                (TripStatus::Approved, TripStatus::Finished),
            ]
        );
    }

    #[test]
    fn rejected_trips_cannot_be_finished() {
        let error = ApprovalWorkflow::check_trip_transition(TripStatus::Rejected, TripStatus::Finished)
            .expect_err("rejected is terminal");
        assert_eq!(error, DomainError::TripNotFinishable { from: TripStatus::Rejected });
    }

    #[test]
    fn finish_gate_only_accepts_approved() {
        assert!(ApprovalWorkflow::check_finish(TripStatus::Approved).is_ok());
        for from in [TripStatus::Pending, TripStatus::Rejected, TripStatus::Finished] {
            assert_eq!(
                ApprovalWorkflow::check_finish(from),
                Err(DomainError::TripNotFinishable { from })
            );
        }
    }

    #[test]
    fn every_claim_status_can_reach_approved() {
        for from in ClaimStatus::ALL {
            assert!(ApprovalWorkflow::claim_transition_allowed(from, ClaimStatus::Approved));
        }
    }

    #[test]
    fn decisions_can_be_revised_but_never_reopened() {
        for from in ClaimStatus::ALL {
            assert!(ApprovalWorkflow::claim_transition_allowed(from, ClaimStatus::Rejected));
        }

        for from in [ClaimStatus::Approved, ClaimStatus::Rejected] {
            let error =
                ApprovalWorkflow::check_claim_transition(ClaimKind::Advance, from, ClaimStatus::Pending)
                    .expect_err("decided claims stay decided");
            assert_eq!(
                error,
                DomainError::InvalidClaimTransition {
                    kind: ClaimKind::Advance,
                    from,
                    to: ClaimStatus::Pending
                }
            );
        }
    }

    #[test]
    fn claim_creation_gate_prefers_finished_message() {
        assert_eq!(
            ApprovalWorkflow::check_claim_creation(ClaimKind::Expense, TripStatus::Finished),
            Err(DomainError::TripFinished { kind: ClaimKind::Expense })
        );
        assert_eq!(
            ApprovalWorkflow::check_claim_creation(ClaimKind::Advance, TripStatus::Pending),
            Err(DomainError::TripNotApproved {
                kind: ClaimKind::Advance,
                status: TripStatus::Pending
            })
        );
        assert_eq!(
            ApprovalWorkflow::check_claim_creation(ClaimKind::Advance, TripStatus::Rejected),
            Err(DomainError::TripNotApproved {
                kind: ClaimKind::Advance,
                status: TripStatus::Rejected
            })
        );
        assert!(ApprovalWorkflow::check_claim_creation(ClaimKind::Expense, TripStatus::Approved)
            .is_ok());
    }

    #[test]
    fn deletion_guard_blocks_only_approved_trips() {
        assert_eq!(
            ApprovalWorkflow::check_trip_deletion(TripStatus::Approved),
            Err(DomainError::ApprovedTripDeletion)
        );
        for status in [TripStatus::Pending, TripStatus::Rejected, TripStatus::Finished] {
            assert!(ApprovalWorkflow::check_trip_deletion(status).is_ok());
        }
    }

    #[test]
    fn edits_and_deletes_share_the_pending_guard() {
        assert!(ApprovalWorkflow::check_claim_edit(ClaimKind::Expense, ClaimStatus::Pending).is_ok());
        assert_eq!(
            ApprovalWorkflow::check_claim_edit(ClaimKind::Expense, ClaimStatus::Rejected),
            Err(DomainError::ClaimNotPending {
                kind: ClaimKind::Expense,
                status: ClaimStatus::Rejected,
                action: "edit"
            })
        );
        assert_eq!(
            ApprovalWorkflow::check_claim_deletion(ClaimKind::Advance, ClaimStatus::Approved),
            Err(DomainError::ClaimNotPending {
                kind: ClaimKind::Advance,
                status: ClaimStatus::Approved,
                action: "delete"
            })
        );
    }

    #[test]
    fn blank_rejection_reasons_are_refused() {
        assert_eq!(ApprovalWorkflow::rejection_reason(None), Err(DomainError::MissingRejectionReason));
        assert_eq!(
            ApprovalWorkflow::rejection_reason(Some(" \t ")),
            Err(DomainError::MissingRejectionReason)
        );
        assert_eq!(
            ApprovalWorkflow::rejection_reason(Some("  duplicate receipt ")),
            Ok("duplicate receipt".to_string())
        );
    }
}
