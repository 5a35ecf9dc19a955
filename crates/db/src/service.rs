//! Facade over the repositories used by the CLI and the integration tests.
//!
//! Every committed mutation emits one `info` event; rejected requests are
//! logged at `warn` with the error that stopped them.

use std::sync::Arc;

use tracing::{error, info, warn};

use tripwise_core::domain::category::{Category, CategoryId, CategoryPatch, NewCategory};
use tripwise_core::domain::claim::{
    Claim, ClaimFilter, ClaimId, ClaimKind, ClaimPatch, NewClaim, NewReceipt, Receipt, ReceiptId,
    ReceiptPayload, TripClaimStatistics,
};
use tripwise_core::domain::trip::{NewTrip, Trip, TripFilter, TripId, TripPatch, TripStatus};
use tripwise_core::domain::user::{NewUser, User, UserId};

use crate::repositories::{
    CategoryRepository, ClaimRepository, RepositoryError, SqlCategoryRepository,
    SqlClaimRepository, SqlTripRepository, SqlUserRepository, TripRepository, UserRepository,
};
use crate::DbPool;

#[derive(Clone)]
pub struct TravelService {
    trips: Arc<dyn TripRepository>,
    claims: Arc<dyn ClaimRepository>,
    categories: Arc<dyn CategoryRepository>,
    users: Arc<dyn UserRepository>,
}

impl TravelService {
    pub fn new(pool: DbPool) -> Self {
        Self {
            trips: Arc::new(SqlTripRepository::new(pool.clone())),
            claims: Arc::new(SqlClaimRepository::new(pool.clone())),
            categories: Arc::new(SqlCategoryRepository::new(pool.clone())),
            users: Arc::new(SqlUserRepository::new(pool)),
        }
    }

    pub fn with_repositories(
        trips: Arc<dyn TripRepository>,
        claims: Arc<dyn ClaimRepository>,
        categories: Arc<dyn CategoryRepository>,
        users: Arc<dyn UserRepository>,
    ) -> Self {
        Self { trips, claims, categories, users }
    }

    pub async fn create_trip(&self, trip: NewTrip) -> Result<Trip, RepositoryError> {
        let trip =
            self.trips.create(trip).await.map_err(|error| rejected("trip.create_rejected", error))?;
        info!(
            event_name = "trip.created",
            trip_id = trip.id.0,
            status = %trip.status,
            users = trip.user_ids.len(),
            itinerary_items = trip.itinerary.len(),
            "trip created"
        );
        Ok(trip)
    }

    pub async fn update_trip(&self, id: TripId, patch: TripPatch) -> Result<Trip, RepositoryError> {
        let trip = self
            .trips
            .update(id, patch)
            .await
            .map_err(|error| rejected("trip.update_rejected", error))?;
        info!(event_name = "trip.updated", trip_id = trip.id.0, "trip updated");
        Ok(trip)
    }

    pub async fn delete_trip(&self, id: TripId) -> Result<Trip, RepositoryError> {
        let trip =
            self.trips.delete(id).await.map_err(|error| rejected("trip.delete_rejected", error))?;
        info!(event_name = "trip.deleted", trip_id = trip.id.0, status = %trip.status, "trip deleted");
        Ok(trip)
    }

    pub async fn set_trip_status(
        &self,
        id: TripId,
        status: TripStatus,
    ) -> Result<Trip, RepositoryError> {
        let trip = self
            .trips
            .transition(id, status)
            .await
            .map_err(|error| rejected("trip.status_rejected", error))?;
        info!(event_name = "trip.status_changed", trip_id = trip.id.0, status = %trip.status, "trip status changed");
        Ok(trip)
    }

    pub async fn finish_trip(&self, id: TripId) -> Result<Trip, RepositoryError> {
        let trip = self
            .trips
            .transition(id, TripStatus::Finished)
            .await
            .map_err(|error| rejected("trip.finish_rejected", error))?;
        info!(event_name = "trip.finished", trip_id = trip.id.0, "trip finished");
        Ok(trip)
    }

    pub async fn trip(&self, id: TripId) -> Result<Option<Trip>, RepositoryError> {
        self.trips.find_by_id(id).await
    }

    pub async fn trips(&self, filter: &TripFilter) -> Result<Vec<Trip>, RepositoryError> {
        self.trips.find_all(filter).await
    }

    pub async fn trips_for_user(&self, user_id: UserId) -> Result<Vec<Trip>, RepositoryError> {
        self.trips.find_by_user(user_id).await
    }

    pub async fn trip_claim_statistics(
        &self,
        id: TripId,
    ) -> Result<TripClaimStatistics, RepositoryError> {
        self.trips.claim_statistics(id).await
    }

    pub async fn create_claim(&self, claim: NewClaim) -> Result<Claim, RepositoryError> {
        let kind = claim.kind();
        let claim = self
            .claims
            .create(claim)
            .await
            .map_err(|error| rejected("claim.create_rejected", error))?;
        info!(
            event_name = "claim.created",
            kind = %kind,
            claim_id = claim.id.0,
            trip_id = claim.trip_id.0,
            amount = %claim.amount,
            currency = %claim.currency,
            receipts = claim.receipts().len(),
            "claim created"
        );
        Ok(claim)
    }

    pub async fn approve_claim(
        &self,
        kind: ClaimKind,
        id: ClaimId,
        approved_by: UserId,
    ) -> Result<Claim, RepositoryError> {
        let claim = self
            .claims
            .approve(kind, id, approved_by)
            .await
            .map_err(|error| rejected("claim.approve_rejected", error))?;
        info!(
            event_name = "claim.approved",
            kind = %kind,
            claim_id = claim.id.0,
            approved_by = approved_by.0,
            "claim approved"
        );
        Ok(claim)
    }

    pub async fn approve_claims(
        &self,
        kind: ClaimKind,
        ids: &[ClaimId],
        approved_by: UserId,
    ) -> Result<Vec<Claim>, RepositoryError> {
        let claims = self
            .claims
            .approve_multiple(kind, ids, approved_by)
            .await
            .map_err(|error| rejected("claim.bulk_approve_rejected", error))?;
        if claims.len() < ids.len() {
            warn!(
                event_name = "claim.bulk_approve_skipped",
                kind = %kind,
                requested = ids.len(),
                approved = claims.len(),
                "unknown claim ids skipped during bulk approval"
            );
        }
        info!(
            event_name = "claim.bulk_approved",
            kind = %kind,
            approved = claims.len(),
            approved_by = approved_by.0,
            "claims approved in bulk"
        );
        Ok(claims)
    }

    pub async fn reject_claim(
        &self,
        kind: ClaimKind,
        id: ClaimId,
        approved_by: UserId,
        reason: &str,
    ) -> Result<Claim, RepositoryError> {
        let claim = self
            .claims
            .reject(kind, id, approved_by, reason)
            .await
            .map_err(|error| rejected("claim.reject_rejected", error))?;
        info!(
            event_name = "claim.rejected",
            kind = %kind,
            claim_id = claim.id.0,
            approved_by = approved_by.0,
            "claim rejected"
        );
        Ok(claim)
    }

    pub async fn update_claim(
        &self,
        kind: ClaimKind,
        id: ClaimId,
        patch: ClaimPatch,
    ) -> Result<Claim, RepositoryError> {
        let claim = self
            .claims
            .update(kind, id, patch)
            .await
            .map_err(|error| rejected("claim.update_rejected", error))?;
        info!(event_name = "claim.updated", kind = %kind, claim_id = claim.id.0, "claim updated");
        Ok(claim)
    }

    pub async fn delete_claim(&self, kind: ClaimKind, id: ClaimId) -> Result<Claim, RepositoryError> {
        let claim = self
            .claims
            .delete(kind, id)
            .await
            .map_err(|error| rejected("claim.delete_rejected", error))?;
        info!(event_name = "claim.deleted", kind = %kind, claim_id = claim.id.0, "claim deleted");
        Ok(claim)
    }

    pub async fn claim(
        &self,
        kind: ClaimKind,
        id: ClaimId,
    ) -> Result<Option<Claim>, RepositoryError> {
        self.claims.find_by_id(kind, id).await
    }

    pub async fn claims(
        &self,
        kind: ClaimKind,
        filter: &ClaimFilter,
    ) -> Result<Vec<Claim>, RepositoryError> {
        self.claims.find_all(kind, filter).await
    }

    pub async fn receipt(&self, id: ReceiptId) -> Result<Option<ReceiptPayload>, RepositoryError> {
        self.claims.receipt(id).await
    }

    pub async fn add_receipt(
        &self,
        expense_id: ClaimId,
        receipt: NewReceipt,
    ) -> Result<Receipt, RepositoryError> {
        let receipt = self
            .claims
            .add_receipt(expense_id, receipt)
            .await
            .map_err(|error| rejected("receipt.add_rejected", error))?;
        info!(
            event_name = "receipt.added",
            expense_id = expense_id.0,
            receipt_id = receipt.id.0,
            byte_size = receipt.byte_size,
            "receipt added"
        );
        Ok(receipt)
    }

    pub async fn delete_receipt(&self, id: ReceiptId) -> Result<Receipt, RepositoryError> {
        let receipt = self
            .claims
            .delete_receipt(id)
            .await
            .map_err(|error| rejected("receipt.delete_rejected", error))?;
        info!(
            event_name = "receipt.deleted",
            expense_id = receipt.expense_id.0,
            receipt_id = receipt.id.0,
            "receipt deleted"
        );
        Ok(receipt)
    }

    pub async fn create_category(&self, category: NewCategory) -> Result<Category, RepositoryError> {
        let category = self
            .categories
            .create(category)
            .await
            .map_err(|error| rejected("category.create_rejected", error))?;
        info!(event_name = "category.created", category_id = category.id.0, name = %category.name, "category created");
        Ok(category)
    }

    pub async fn update_category(
        &self,
        id: CategoryId,
        patch: CategoryPatch,
    ) -> Result<Category, RepositoryError> {
        let category = self
            .categories
            .update(id, patch)
            .await
            .map_err(|error| rejected("category.update_rejected", error))?;
        info!(event_name = "category.updated", category_id = category.id.0, name = %category.name, "category updated");
        Ok(category)
    }

    pub async fn delete_category(&self, id: CategoryId) -> Result<Category, RepositoryError> {
        let category = self
            .categories
            .delete(id)
            .await
            .map_err(|error| rejected("category.delete_rejected", error))?;
        info!(event_name = "category.deleted", category_id = category.id.0, "category deleted");
        Ok(category)
    }

    pub async fn category_by_name(&self, name: &str) -> Result<Option<Category>, RepositoryError> {
        self.categories.find_by_name(name).await
    }

    pub async fn categories(&self) -> Result<Vec<Category>, RepositoryError> {
        self.categories.find_all().await
    }

    pub async fn create_user(&self, user: NewUser) -> Result<User, RepositoryError> {
        let user =
            self.users.create(user).await.map_err(|error| rejected("user.create_rejected", error))?;
        info!(event_name = "user.created", user_id = user.id.0, role = %user.role, "user created");
        Ok(user)
    }

    pub async fn user_by_email(&self, email: &str) -> Result<Option<User>, RepositoryError> {
        self.users.find_by_email(email).await
    }

    pub async fn user_exists(&self, id: UserId) -> Result<bool, RepositoryError> {
        self.users.exists(id).await
    }
}

fn rejected(event_name: &'static str, failure: RepositoryError) -> RepositoryError {
    match &failure {
        RepositoryError::Validation(_)
        | RepositoryError::NotFound { .. }
        | RepositoryError::ConstraintViolation(_) => {
            warn!(event_name, error = %failure, "request rejected");
        }
        RepositoryError::Transaction(_)
        | RepositoryError::Database(_)
        | RepositoryError::Decode(_) => {
            error!(event_name, error = %failure, "storage failure");
        }
    }
    failure
}
