use chrono::Utc;
use sqlx::{sqlite::SqliteRow, Row};

use tripwise_core::domain::category::{Category, CategoryId, CategoryPatch, NewCategory};
use tripwise_core::errors::DomainError;

use super::{begin, commit, parse_timestamp, timestamp, CategoryRepository, RepositoryError};
use crate::DbPool;

pub struct SqlCategoryRepository {
    pool: DbPool,
}

impl SqlCategoryRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait::async_trait]
impl CategoryRepository for SqlCategoryRepository {
    async fn create(&self, category: NewCategory) -> Result<Category, RepositoryError> {
        let category = category.validate()?;
        let row = sqlx::query(
            "INSERT INTO categories (name, description, created_at)
             VALUES (?, ?, ?)
             RETURNING id, name, description, created_at",
        )
        .bind(&category.name)
        .bind(&category.description)
        .bind(timestamp(Utc::now()))
        .fetch_one(&self.pool)
        .await?;

        category_from_row(&row)
    }

    async fn find_by_id(&self, id: CategoryId) -> Result<Option<Category>, RepositoryError> {
        let row = sqlx::query(
            "SELECT id, name, description, created_at FROM categories WHERE id = ?",
        )
        .bind(id.0)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(category_from_row).transpose()
    }

    /// Names compare case-insensitively through the column collation.
    async fn find_by_name(&self, name: &str) -> Result<Option<Category>, RepositoryError> {
        let row = sqlx::query(
            "SELECT id, name, description, created_at FROM categories WHERE name = ?",
        )
        .bind(name.trim())
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(category_from_row).transpose()
    }

    async fn find_all(&self) -> Result<Vec<Category>, RepositoryError> {
        sqlx::query("SELECT id, name, description, created_at FROM categories ORDER BY name")
            .fetch_all(&self.pool)
            .await?
            .iter()
            .map(category_from_row)
            .collect()
    }

    async fn update(
        &self,
        id: CategoryId,
        patch: CategoryPatch,
    ) -> Result<Category, RepositoryError> {
        let patch = patch.validate()?;
        let description = patch.description.map(|text| if text.is_empty() { None } else { Some(text) });

        let row = sqlx::query(
            "UPDATE categories
             SET name = COALESCE(?, name),
                 description = CASE WHEN ? THEN ? ELSE description END
             WHERE id = ?
             RETURNING id, name, description, created_at",
        )
        .bind(patch.name)
        .bind(description.is_some())
        .bind(description.flatten())
        .bind(id.0)
        .fetch_optional(&self.pool)
        .await?
        .ok_or(RepositoryError::not_found("category", id.0))?;

        category_from_row(&row)
    }

    async fn delete(&self, id: CategoryId) -> Result<Category, RepositoryError> {
        let mut tx = begin(&self.pool).await?;
        let row = sqlx::query(
            "SELECT id, name, description, created_at FROM categories WHERE id = ?",
        )
        .bind(id.0)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or(RepositoryError::not_found("category", id.0))?;
        let category = category_from_row(&row)?;

        let expense_count: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM expenses WHERE category_id = ?")
                .bind(id.0)
                .fetch_one(&mut *tx)
                .await?;
        if expense_count > 0 {
            return Err(DomainError::CategoryInUse { name: category.name, expense_count }.into());
        }

        sqlx::query("DELETE FROM categories WHERE id = ?").bind(id.0).execute(&mut *tx).await?;
        commit(tx).await?;

        Ok(category)
    }
}

fn category_from_row(row: &SqliteRow) -> Result<Category, RepositoryError> {
    Ok(Category {
        id: CategoryId(row.try_get("id")?),
        name: row.try_get("name")?,
        description: row.try_get("description")?,
        created_at: parse_timestamp("created_at", row.try_get("created_at")?)?,
    })
}
