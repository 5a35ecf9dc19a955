use chrono::Utc;
use sqlx::{sqlite::SqliteRow, Row};

use tripwise_core::domain::user::{NewUser, User, UserId, UserRole};

use super::{parse_timestamp, timestamp, RepositoryError, UserRepository};
use crate::DbPool;

pub struct SqlUserRepository {
    pool: DbPool,
}

impl SqlUserRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait::async_trait]
impl UserRepository for SqlUserRepository {
    async fn create(&self, user: NewUser) -> Result<User, RepositoryError> {
        let user = user.validate()?;
        let row = sqlx::query(
            "INSERT INTO users (name, email, role, created_at)
             VALUES (?, ?, ?, ?)
             RETURNING id, name, email, role, created_at",
        )
        .bind(&user.name)
        .bind(&user.email)
        .bind(user.role.as_str())
        .bind(timestamp(Utc::now()))
        .fetch_one(&self.pool)
        .await?;

        user_from_row(&row)
    }

    async fn find_by_id(&self, id: UserId) -> Result<Option<User>, RepositoryError> {
        let row = sqlx::query("SELECT id, name, email, role, created_at FROM users WHERE id = ?")
            .bind(id.0)
            .fetch_optional(&self.pool)
            .await?;

        row.as_ref().map(user_from_row).transpose()
    }

    async fn find_by_email(&self, email: &str) -> Result<Option<User>, RepositoryError> {
        let row =
            sqlx::query("SELECT id, name, email, role, created_at FROM users WHERE email = ?")
                .bind(email.trim().to_ascii_lowercase())
                .fetch_optional(&self.pool)
                .await?;

        row.as_ref().map(user_from_row).transpose()
    }

    async fn exists(&self, id: UserId) -> Result<bool, RepositoryError> {
        let found: Option<i64> = sqlx::query_scalar("SELECT 1 FROM users WHERE id = ?")
            .bind(id.0)
            .fetch_optional(&self.pool)
            .await?;
        Ok(found.is_some())
    }
}

fn user_from_row(row: &SqliteRow) -> Result<User, RepositoryError> {
    let raw_role: String = row.try_get("role")?;
    let role = UserRole::parse(&raw_role)
        .ok_or_else(|| RepositoryError::Decode(format!("unknown user role `{raw_role}`")))?;

    Ok(User {
        id: UserId(row.try_get("id")?),
        name: row.try_get("name")?,
        email: row.try_get("email")?,
        role,
        created_at: parse_timestamp("created_at", row.try_get("created_at")?)?,
    })
}
