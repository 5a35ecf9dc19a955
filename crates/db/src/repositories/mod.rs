use std::str::FromStr;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, SecondsFormat, Utc};
use rust_decimal::Decimal;
use sqlx::error::ErrorKind;
use sqlx::{Sqlite, Transaction};
use thiserror::Error;

use tripwise_core::domain::category::{Category, CategoryId, CategoryPatch, NewCategory};
use tripwise_core::domain::claim::{
    Claim, ClaimFilter, ClaimId, ClaimKind, ClaimPatch, NewClaim, NewReceipt, Receipt, ReceiptId,
    ReceiptPayload, TripClaimStatistics,
};
use tripwise_core::domain::trip::{NewTrip, Trip, TripFilter, TripId, TripPatch, TripStatus};
use tripwise_core::domain::user::{NewUser, User, UserId};
use tripwise_core::errors::DomainError;

use crate::DbPool;

pub mod category;
pub mod claim;
pub mod trip;
pub mod user;

pub use category::SqlCategoryRepository;
pub use claim::SqlClaimRepository;
pub use trip::SqlTripRepository;
pub use user::SqlUserRepository;

#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error(transparent)]
    Validation(#[from] DomainError),
    #[error("{entity} {id} not found")]
    NotFound { entity: &'static str, id: i64 },
    #[error("constraint violation: {0}")]
    ConstraintViolation(String),
    #[error("transaction failed: {0}")]
    Transaction(String),
    #[error("database error: {0}")]
    Database(sqlx::Error),
    #[error("decode error: {0}")]
    Decode(String),
}

impl RepositoryError {
    pub fn not_found(entity: &'static str, id: i64) -> Self {
        Self::NotFound { entity, id }
    }

    pub fn is_validation(&self) -> bool {
        matches!(self, Self::Validation(_))
    }
}

impl From<sqlx::Error> for RepositoryError {
    fn from(error: sqlx::Error) -> Self {
        if let sqlx::Error::Database(database_error) = &error {
            match database_error.kind() {
                ErrorKind::UniqueViolation
                | ErrorKind::ForeignKeyViolation
                | ErrorKind::NotNullViolation
                | ErrorKind::CheckViolation => {
                    return Self::ConstraintViolation(database_error.message().to_string());
                }
                _ => {}
            }
        }

        match error {
            sqlx::Error::ColumnDecode { .. }
            | sqlx::Error::ColumnNotFound(_)
            | sqlx::Error::Decode(_) => Self::Decode(error.to_string()),
            other => Self::Database(other),
        }
    }
}

#[async_trait]
pub trait TripRepository: Send + Sync {
    async fn create(&self, trip: NewTrip) -> Result<Trip, RepositoryError>;
    async fn update(&self, id: TripId, patch: TripPatch) -> Result<Trip, RepositoryError>;
    async fn find_by_id(&self, id: TripId) -> Result<Option<Trip>, RepositoryError>;
    async fn find_all(&self, filter: &TripFilter) -> Result<Vec<Trip>, RepositoryError>;
    async fn find_by_user(&self, user_id: UserId) -> Result<Vec<Trip>, RepositoryError>;
    /// Returns the trip as it was before deletion.
    async fn delete(&self, id: TripId) -> Result<Trip, RepositoryError>;
    /// Raw status write with no transition check.
    async fn update_status(&self, id: TripId, status: TripStatus) -> Result<Trip, RepositoryError>;
    /// Status write checked against the trip transition table.
    async fn transition(&self, id: TripId, to: TripStatus) -> Result<Trip, RepositoryError>;
    async fn claim_statistics(&self, id: TripId) -> Result<TripClaimStatistics, RepositoryError>;
}

#[async_trait]
pub trait ClaimRepository: Send + Sync {
    async fn create(&self, claim: NewClaim) -> Result<Claim, RepositoryError>;
    async fn find_by_id(&self, kind: ClaimKind, id: ClaimId)
        -> Result<Option<Claim>, RepositoryError>;
    async fn find_all(
        &self,
        kind: ClaimKind,
        filter: &ClaimFilter,
    ) -> Result<Vec<Claim>, RepositoryError>;
    async fn approve(
        &self,
        kind: ClaimKind,
        id: ClaimId,
        approved_by: UserId,
    ) -> Result<Claim, RepositoryError>;
    async fn reject(
        &self,
        kind: ClaimKind,
        id: ClaimId,
        approved_by: UserId,
        reason: &str,
    ) -> Result<Claim, RepositoryError>;
    /// Unknown ids are skipped; the result holds only rows that existed, ordered by id.
    async fn approve_multiple(
        &self,
        kind: ClaimKind,
        ids: &[ClaimId],
        approved_by: UserId,
    ) -> Result<Vec<Claim>, RepositoryError>;
    /// Edits a pending claim in place.
    async fn update(
        &self,
        kind: ClaimKind,
        id: ClaimId,
        patch: ClaimPatch,
    ) -> Result<Claim, RepositoryError>;
    async fn delete(&self, kind: ClaimKind, id: ClaimId) -> Result<Claim, RepositoryError>;
    async fn receipt(&self, id: ReceiptId) -> Result<Option<ReceiptPayload>, RepositoryError>;
    /// Attaches a receipt to a pending expense.
    async fn add_receipt(
        &self,
        expense_id: ClaimId,
        receipt: NewReceipt,
    ) -> Result<Receipt, RepositoryError>;
    /// Removes a receipt from a pending expense, returning its metadata.
    async fn delete_receipt(&self, id: ReceiptId) -> Result<Receipt, RepositoryError>;
}

#[async_trait]
pub trait CategoryRepository: Send + Sync {
    async fn create(&self, category: NewCategory) -> Result<Category, RepositoryError>;
    async fn find_by_id(&self, id: CategoryId) -> Result<Option<Category>, RepositoryError>;
    async fn find_by_name(&self, name: &str) -> Result<Option<Category>, RepositoryError>;
    async fn find_all(&self) -> Result<Vec<Category>, RepositoryError>;
    async fn update(&self, id: CategoryId, patch: CategoryPatch)
        -> Result<Category, RepositoryError>;
    async fn delete(&self, id: CategoryId) -> Result<Category, RepositoryError>;
}

#[async_trait]
pub trait UserRepository: Send + Sync {
    async fn create(&self, user: NewUser) -> Result<User, RepositoryError>;
    async fn find_by_id(&self, id: UserId) -> Result<Option<User>, RepositoryError>;
    async fn find_by_email(&self, email: &str) -> Result<Option<User>, RepositoryError>;
    async fn exists(&self, id: UserId) -> Result<bool, RepositoryError>;
}

/// Repository transactions read before they write, so the write lock is taken
/// at `BEGIN` where `busy_timeout` can wait for it. A deferred upgrade fails
/// with `SQLITE_BUSY` immediately.
pub(crate) async fn begin(pool: &DbPool) -> Result<Transaction<'static, Sqlite>, RepositoryError> {
    pool.begin_with("BEGIN IMMEDIATE")
        .await
        .map_err(|error| RepositoryError::Transaction(error.to_string()))
}

pub(crate) async fn commit(tx: Transaction<'static, Sqlite>) -> Result<(), RepositoryError> {
    tx.commit().await.map_err(|error| RepositoryError::Transaction(error.to_string()))
}

/// Fixed-width UTC so that stored timestamps sort lexically.
pub(crate) fn timestamp(value: DateTime<Utc>) -> String {
    value.to_rfc3339_opts(SecondsFormat::Micros, true)
}

pub(crate) fn parse_timestamp(column: &str, value: String) -> Result<DateTime<Utc>, RepositoryError> {
    DateTime::parse_from_rfc3339(&value).map(|timestamp| timestamp.with_timezone(&Utc)).map_err(
        |error| {
            RepositoryError::Decode(format!("invalid timestamp in `{column}`: `{value}` ({error})"))
        },
    )
}

pub(crate) fn parse_optional_timestamp(
    column: &str,
    value: Option<String>,
) -> Result<Option<DateTime<Utc>>, RepositoryError> {
    value.map(|timestamp| parse_timestamp(column, timestamp)).transpose()
}

pub(crate) fn date(value: NaiveDate) -> String {
    value.format("%Y-%m-%d").to_string()
}

pub(crate) fn parse_date(column: &str, value: String) -> Result<NaiveDate, RepositoryError> {
    NaiveDate::parse_from_str(&value, "%Y-%m-%d").map_err(|error| {
        RepositoryError::Decode(format!("invalid date in `{column}`: `{value}` ({error})"))
    })
}

pub(crate) fn parse_optional_date(
    column: &str,
    value: Option<String>,
) -> Result<Option<NaiveDate>, RepositoryError> {
    value.map(|date| parse_date(column, date)).transpose()
}

pub(crate) fn parse_decimal(column: &str, value: String) -> Result<Decimal, RepositoryError> {
    Decimal::from_str(&value).map_err(|error| {
        RepositoryError::Decode(format!("invalid decimal in `{column}`: `{value}` ({error})"))
    })
}

#[cfg(test)]
pub(crate) mod test_support {
    use crate::{connect_with_settings, migrations, DbPool};

    pub(crate) async fn setup() -> DbPool {
        let pool = connect_with_settings("sqlite::memory:", 1, 30).await.expect("connect");
        migrations::run_pending(&pool).await.expect("migrations");
        pool
    }

    pub(crate) async fn insert_user(pool: &DbPool, name: &str) -> i64 {
        sqlx::query(
            "INSERT INTO users (name, email, role, created_at)
             VALUES (?, ?, 'employee', '2026-01-05T09:00:00.000000Z')",
        )
        .bind(name)
        .bind(format!("{}@example.com", name.to_ascii_lowercase().replace(' ', ".")))
        .execute(pool)
        .await
        .expect("insert user")
        .last_insert_rowid()
    }

    pub(crate) async fn insert_category(pool: &DbPool, name: &str) -> i64 {
        sqlx::query(
            "INSERT INTO categories (name, created_at) VALUES (?, '2026-01-05T09:00:00.000000Z')",
        )
        .bind(name)
        .execute(pool)
        .await
        .expect("insert category")
        .last_insert_rowid()
    }
}
