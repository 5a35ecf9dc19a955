pub mod approvals;
pub mod config;
pub mod domain;
pub mod errors;

pub use approvals::ApprovalWorkflow;
pub use domain::category::{Category, CategoryId, CategoryPatch, NewCategory};
pub use domain::claim::{
    AdvanceDetail, AdvancePatch, Claim, ClaimDetail, ClaimDraft, ClaimFilter, ClaimId, ClaimKind,
    ClaimPatch, ClaimPatchDetail, ClaimStatus, ClaimTotals, Currency, DraftDetail, ExpenseDetail,
    ExpensePatch, NewClaim, NewClaimDetail, NewExpense, NewReceipt, Receipt, ReceiptId,
    ReceiptPayload, TripClaimStatistics, ValidatedClaimPatch,
};
pub use domain::itinerary::{Itinerary, ItineraryItemId, ItineraryKind, ItineraryLeg};
pub use domain::trip::{
    NewTrip, TravelCategory, Trip, TripFilter, TripId, TripPatch, TripStatus, ValidatedTrip,
};
pub use domain::user::{NewUser, User, UserId, UserRole};
pub use errors::DomainError;
