use chrono::Utc;
use sqlx::{sqlite::SqliteRow, QueryBuilder, Row, Sqlite, SqliteConnection};

use tripwise_core::approvals::ApprovalWorkflow;
use tripwise_core::domain::category::CategoryId;
use tripwise_core::domain::claim::{
    AdvanceDetail, Claim, ClaimDetail, ClaimDraft, ClaimFilter, ClaimId, ClaimKind,
    ClaimPatch, ClaimPatchDetail, ClaimStatus, Currency, DraftDetail, ExpenseDetail, NewClaim,
    NewReceipt, Receipt, ReceiptId, ReceiptPayload,
};
use tripwise_core::domain::trip::TripId;
use tripwise_core::domain::user::UserId;

use super::trip::current_status as trip_status;
use super::{
    begin, commit, date, parse_date, parse_decimal, parse_optional_timestamp, parse_timestamp,
    timestamp, ClaimRepository, RepositoryError,
};
use crate::DbPool;

const SHARED_COLUMNS: &str = "id, user_id, trip_id, amount, currency, status, rejection_reason, \
                              approved_by, approved_at, created_at, updated_at";

/// Ids per bulk-approval statement; keeps the bound parameters under SQLite's
/// historical limit of 999.
const APPROVE_CHUNK_SIZE: usize = 500;

const RECEIPT_COLUMNS: &str =
    "id, expense_id, filename, original_filename, content_type, file_size, created_at";

pub struct SqlClaimRepository {
    pool: DbPool,
}

impl SqlClaimRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

fn table(kind: ClaimKind) -> &'static str {
    match kind {
        ClaimKind::Expense => "expenses",
        ClaimKind::Advance => "advances",
    }
}

fn columns(kind: ClaimKind) -> String {
    match kind {
        ClaimKind::Expense => {
            format!("{SHARED_COLUMNS}, category_id, title, description, expense_date")
        }
        ClaimKind::Advance => format!("{SHARED_COLUMNS}, paid_through, reference_id, notes"),
    }
}

#[async_trait::async_trait]
impl ClaimRepository for SqlClaimRepository {
    async fn create(&self, claim: NewClaim) -> Result<Claim, RepositoryError> {
        let draft = claim.validate()?;
        let kind = draft.kind();

        let mut tx = begin(&self.pool).await?;
        let status = trip_status(&mut tx, draft.trip_id).await?;
        ApprovalWorkflow::check_claim_creation(kind, status)?;

        let id = insert_claim(&mut tx, &draft).await?;
        if let DraftDetail::Expense { receipts, .. } = &draft.detail {
            for receipt in receipts {
                insert_receipt(&mut tx, id, receipt).await?;
            }
        }

        let created =
            load_claim(&mut tx, kind, id).await?.ok_or(RepositoryError::not_found(kind.as_str(), id.0))?;
        commit(tx).await?;

        Ok(created)
    }

    async fn find_by_id(
        &self,
        kind: ClaimKind,
        id: ClaimId,
    ) -> Result<Option<Claim>, RepositoryError> {
        let mut conn = self.pool.acquire().await?;
        load_claim(&mut conn, kind, id).await
    }

    async fn find_all(
        &self,
        kind: ClaimKind,
        filter: &ClaimFilter,
    ) -> Result<Vec<Claim>, RepositoryError> {
        let mut query = QueryBuilder::<Sqlite>::new(format!(
            "SELECT {} FROM {} WHERE 1 = 1",
            columns(kind),
            table(kind)
        ));
        if let Some(user_id) = filter.user_id {
            query.push(" AND user_id = ").push_bind(user_id.0);
        }
        if let Some(trip_id) = filter.trip_id {
            query.push(" AND trip_id = ").push_bind(trip_id.0);
        }
        if let Some(status) = filter.status {
            query.push(" AND status = ").push_bind(status.as_str());
        }
        if let Some(currency) = filter.currency {
            query.push(" AND currency = ").push_bind(currency.as_str());
        }
        query.push(" ORDER BY created_at DESC, id DESC");

        let mut conn = self.pool.acquire().await?;
        let rows = query.build().fetch_all(&mut *conn).await?;
        hydrate(&mut conn, kind, &rows).await
    }

    async fn approve(
        &self,
        kind: ClaimKind,
        id: ClaimId,
        approved_by: UserId,
    ) -> Result<Claim, RepositoryError> {
        let mut tx = begin(&self.pool).await?;
        let from = current_status(&mut tx, kind, id).await?;
        ApprovalWorkflow::check_claim_transition(kind, from, ClaimStatus::Approved)?;

        let now = timestamp(Utc::now());
        sqlx::query(&format!(
            "UPDATE {}
             SET status = 'approved', approved_by = ?, approved_at = ?, rejection_reason = NULL,
                 updated_at = ?
             WHERE id = ?",
            table(kind)
        ))
        .bind(approved_by.0)
        .bind(&now)
        .bind(&now)
        .bind(id.0)
        .execute(&mut *tx)
        .await?;

        let approved =
            load_claim(&mut tx, kind, id).await?.ok_or(RepositoryError::not_found(kind.as_str(), id.0))?;
        commit(tx).await?;

        Ok(approved)
    }

    async fn reject(
        &self,
        kind: ClaimKind,
        id: ClaimId,
        approved_by: UserId,
        reason: &str,
    ) -> Result<Claim, RepositoryError> {
        let reason = ApprovalWorkflow::rejection_reason(Some(reason))?;

        let mut tx = begin(&self.pool).await?;
        let from = current_status(&mut tx, kind, id).await?;
        ApprovalWorkflow::check_claim_transition(kind, from, ClaimStatus::Rejected)?;

        let now = timestamp(Utc::now());
        sqlx::query(&format!(
            "UPDATE {}
             SET status = 'rejected', rejection_reason = ?, approved_by = ?, approved_at = ?,
                 updated_at = ?
             WHERE id = ?",
            table(kind)
        ))
        .bind(&reason)
        .bind(approved_by.0)
        .bind(&now)
        .bind(&now)
        .bind(id.0)
        .execute(&mut *tx)
        .await?;

        let rejected =
            load_claim(&mut tx, kind, id).await?.ok_or(RepositoryError::not_found(kind.as_str(), id.0))?;
        commit(tx).await?;

        Ok(rejected)
    }

    async fn approve_multiple(
        &self,
        kind: ClaimKind,
        ids: &[ClaimId],
        approved_by: UserId,
    ) -> Result<Vec<Claim>, RepositoryError> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }

        // Every claim status may move to approved, so each chunk is one statement.
        let now = timestamp(Utc::now());
        let mut tx = begin(&self.pool).await?;
        let mut rows = Vec::with_capacity(ids.len());
        for chunk in ids.chunks(APPROVE_CHUNK_SIZE) {
            let mut query = QueryBuilder::<Sqlite>::new(format!(
                "UPDATE {} SET status = 'approved', rejection_reason = NULL, approved_by = ",
                table(kind)
            ));
            query.push_bind(approved_by.0);
            query.push(", approved_at = ").push_bind(now.clone());
            query.push(", updated_at = ").push_bind(now.clone());
            query.push(" WHERE id IN (");
            let mut separated = query.separated(", ");
            for id in chunk {
                separated.push_bind(id.0);
            }
            separated.push_unseparated(")");
            query.push(format!(" RETURNING {}", columns(kind)));

            rows.extend(query.build().fetch_all(&mut *tx).await?);
        }
        let mut claims = hydrate(&mut tx, kind, &rows).await?;
        commit(tx).await?;

        // An id repeated across chunks comes back once per chunk.
        claims.sort_by_key(|claim| claim.id);
        claims.dedup_by_key(|claim| claim.id);
        Ok(claims)
    }

    async fn update(
        &self,
        kind: ClaimKind,
        id: ClaimId,
        patch: ClaimPatch,
    ) -> Result<Claim, RepositoryError> {
        let patch = patch.validate(kind)?;

        let mut tx = begin(&self.pool).await?;
        let status = current_status(&mut tx, kind, id).await?;
        ApprovalWorkflow::check_claim_edit(kind, status)?;

        let mut query = QueryBuilder::<Sqlite>::new(format!("UPDATE {} SET updated_at = ", table(kind)));
        query.push_bind(timestamp(Utc::now()));
        if let Some(amount) = patch.amount {
            query.push(", amount = ").push_bind(amount.to_string());
        }
        if let Some(currency) = patch.currency {
            query.push(", currency = ").push_bind(currency.as_str());
        }
        match patch.detail {
            Some(ClaimPatchDetail::Expense(expense)) => {
                if let Some(category_id) = expense.category_id {
                    query.push(", category_id = ").push_bind(category_id.0);
                }
                if let Some(expense_date) = expense.expense_date {
                    query.push(", expense_date = ").push_bind(date(expense_date));
                }
                push_text(&mut query, "title", expense.title);
                push_text(&mut query, "description", expense.description);
            }
            Some(ClaimPatchDetail::Advance(advance)) => {
                push_text(&mut query, "paid_through", advance.paid_through);
                push_text(&mut query, "reference_id", advance.reference_id);
                push_text(&mut query, "notes", advance.notes);
            }
            None => {}
        }
        query.push(" WHERE id = ").push_bind(id.0);
        query.build().execute(&mut *tx).await?;

        let updated =
            load_claim(&mut tx, kind, id).await?.ok_or(RepositoryError::not_found(kind.as_str(), id.0))?;
        commit(tx).await?;

        Ok(updated)
    }

    async fn delete(&self, kind: ClaimKind, id: ClaimId) -> Result<Claim, RepositoryError> {
        let mut tx = begin(&self.pool).await?;
        let claim =
            load_claim(&mut tx, kind, id).await?.ok_or(RepositoryError::not_found(kind.as_str(), id.0))?;
        ApprovalWorkflow::check_claim_deletion(kind, claim.status)?;

        sqlx::query(&format!("DELETE FROM {} WHERE id = ?", table(kind)))
            .bind(id.0)
            .execute(&mut *tx)
            .await?;
        commit(tx).await?;

        Ok(claim)
    }

    async fn receipt(&self, id: ReceiptId) -> Result<Option<ReceiptPayload>, RepositoryError> {
        let row = sqlx::query(&format!("SELECT {RECEIPT_COLUMNS}, file_data FROM receipts WHERE id = ?"))
            .bind(id.0)
            .fetch_optional(&self.pool)
            .await?;

        row.map(|row| {
            Ok(ReceiptPayload { receipt: receipt_from_row(&row)?, data: row.try_get("file_data")? })
        })
        .transpose()
    }

    async fn add_receipt(
        &self,
        expense_id: ClaimId,
        receipt: NewReceipt,
    ) -> Result<Receipt, RepositoryError> {
        receipt.validate()?;

        let mut tx = begin(&self.pool).await?;
        let status = current_status(&mut tx, ClaimKind::Expense, expense_id).await?;
        ApprovalWorkflow::check_claim_edit(ClaimKind::Expense, status)?;

        let id = insert_receipt(&mut tx, expense_id, &receipt).await?;
        touch_expense(&mut tx, expense_id).await?;
        let row = sqlx::query(&format!("SELECT {RECEIPT_COLUMNS} FROM receipts WHERE id = ?"))
            .bind(id.0)
            .fetch_one(&mut *tx)
            .await?;
        let added = receipt_from_row(&row)?;
        commit(tx).await?;

        Ok(added)
    }

    async fn delete_receipt(&self, id: ReceiptId) -> Result<Receipt, RepositoryError> {
        let mut tx = begin(&self.pool).await?;
        let row = sqlx::query(
            "SELECT r.id, r.expense_id, r.filename, r.original_filename, r.content_type,
                    r.file_size, r.created_at, e.status AS expense_status
             FROM receipts r
             JOIN expenses e ON e.id = r.expense_id
             WHERE r.id = ?",
        )
        .bind(id.0)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or(RepositoryError::not_found("receipt", id.0))?;
        let receipt = receipt_from_row(&row)?;
        let status = parse_status(row.try_get("expense_status")?)?;
        ApprovalWorkflow::check_claim_edit(ClaimKind::Expense, status)?;

        sqlx::query("DELETE FROM receipts WHERE id = ?").bind(id.0).execute(&mut *tx).await?;
        touch_expense(&mut tx, receipt.expense_id).await?;
        commit(tx).await?;

        Ok(receipt)
    }
}

/// Sets an optional text column; an empty string stores NULL.
fn push_text(query: &mut QueryBuilder<'_, Sqlite>, column: &str, value: Option<String>) {
    if let Some(text) = value {
        query.push(format!(", {column} = "));
        query.push_bind(if text.is_empty() { None } else { Some(text) });
    }
}

async fn touch_expense(conn: &mut SqliteConnection, id: ClaimId) -> Result<(), RepositoryError> {
    sqlx::query("UPDATE expenses SET updated_at = ? WHERE id = ?")
        .bind(timestamp(Utc::now()))
        .bind(id.0)
        .execute(&mut *conn)
        .await?;
    Ok(())
}

async fn current_status(
    conn: &mut SqliteConnection,
    kind: ClaimKind,
    id: ClaimId,
) -> Result<ClaimStatus, RepositoryError> {
    let row = sqlx::query(&format!("SELECT status FROM {} WHERE id = ?", table(kind)))
        .bind(id.0)
        .fetch_optional(&mut *conn)
        .await?
        .ok_or(RepositoryError::not_found(kind.as_str(), id.0))?;
    parse_status(row.try_get("status")?)
}

async fn insert_claim(
    conn: &mut SqliteConnection,
    draft: &ClaimDraft,
) -> Result<ClaimId, RepositoryError> {
    let now = timestamp(Utc::now());
    let result = match &draft.detail {
        DraftDetail::Expense { category_id, title, description, expense_date, .. } => {
            let expense_date = expense_date.unwrap_or_else(|| Utc::now().date_naive());
            sqlx::query(
                "INSERT INTO expenses
                    (user_id, trip_id, category_id, amount, currency, title, description,
                     expense_date, status, created_at, updated_at)
                 VALUES (?, ?, ?, ?, ?, ?, ?, ?, 'pending', ?, ?)",
            )
            .bind(draft.user_id.0)
            .bind(draft.trip_id.0)
            .bind(category_id.0)
            .bind(draft.amount.to_string())
            .bind(draft.currency.as_str())
            .bind(title)
            .bind(description)
            .bind(date(expense_date))
            .bind(&now)
            .bind(&now)
            .execute(&mut *conn)
            .await?
        }
        DraftDetail::Advance(advance) => {
            sqlx::query(
                "INSERT INTO advances
                    (user_id, trip_id, amount, currency, paid_through, reference_id, notes,
                     status, created_at, updated_at)
                 VALUES (?, ?, ?, ?, ?, ?, ?, 'pending', ?, ?)",
            )
            .bind(draft.user_id.0)
            .bind(draft.trip_id.0)
            .bind(draft.amount.to_string())
            .bind(draft.currency.as_str())
            .bind(&advance.paid_through)
            .bind(&advance.reference_id)
            .bind(&advance.notes)
            .bind(&now)
            .bind(&now)
            .execute(&mut *conn)
            .await?
        }
    };

    Ok(ClaimId(result.last_insert_rowid()))
}

async fn insert_receipt(
    conn: &mut SqliteConnection,
    expense_id: ClaimId,
    receipt: &NewReceipt,
) -> Result<ReceiptId, RepositoryError> {
    let result = sqlx::query(
        "INSERT INTO receipts
            (expense_id, filename, original_filename, content_type, file_size, file_data, created_at)
         VALUES (?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(expense_id.0)
    .bind(receipt.filename.trim())
    .bind(&receipt.original_filename)
    .bind(receipt.content_type.trim())
    .bind(receipt.byte_size())
    .bind(&receipt.data)
    .bind(timestamp(Utc::now()))
    .execute(&mut *conn)
    .await?;
    Ok(ReceiptId(result.last_insert_rowid()))
}

async fn load_claim(
    conn: &mut SqliteConnection,
    kind: ClaimKind,
    id: ClaimId,
) -> Result<Option<Claim>, RepositoryError> {
    let row = sqlx::query(&format!("SELECT {} FROM {} WHERE id = ?", columns(kind), table(kind)))
        .bind(id.0)
        .fetch_optional(&mut *conn)
        .await?;

    match row {
        Some(row) => Ok(hydrate(conn, kind, std::slice::from_ref(&row)).await?.pop()),
        None => Ok(None),
    }
}

/// Builds claims from rows selected with `columns(kind)`, attaching receipt
/// metadata to expenses.
async fn hydrate(
    conn: &mut SqliteConnection,
    kind: ClaimKind,
    rows: &[SqliteRow],
) -> Result<Vec<Claim>, RepositoryError> {
    let mut claims = Vec::with_capacity(rows.len());
    for row in rows {
        let id = ClaimId(row.try_get("id")?);
        let detail = match kind {
            ClaimKind::Expense => ClaimDetail::Expense(ExpenseDetail {
                category_id: CategoryId(row.try_get("category_id")?),
                title: row.try_get("title")?,
                description: row.try_get("description")?,
                expense_date: parse_date("expense_date", row.try_get("expense_date")?)?,
                receipts: load_receipts(conn, id).await?,
            }),
            ClaimKind::Advance => ClaimDetail::Advance(AdvanceDetail {
                paid_through: row.try_get("paid_through")?,
                reference_id: row.try_get("reference_id")?,
                notes: row.try_get("notes")?,
            }),
        };
        claims.push(claim_from_row(row, detail)?);
    }
    Ok(claims)
}

async fn load_receipts(
    conn: &mut SqliteConnection,
    expense_id: ClaimId,
) -> Result<Vec<Receipt>, RepositoryError> {
    sqlx::query(&format!(
        "SELECT {RECEIPT_COLUMNS} FROM receipts WHERE expense_id = ? ORDER BY id"
    ))
    .bind(expense_id.0)
    .fetch_all(&mut *conn)
    .await?
    .iter()
    .map(receipt_from_row)
    .collect()
}

fn claim_from_row(row: &SqliteRow, detail: ClaimDetail) -> Result<Claim, RepositoryError> {
    let raw_currency: String = row.try_get("currency")?;
    let currency = Currency::parse(&raw_currency)
        .ok_or_else(|| RepositoryError::Decode(format!("unknown currency `{raw_currency}`")))?;

    Ok(Claim {
        id: ClaimId(row.try_get("id")?),
        user_id: UserId(row.try_get("user_id")?),
        trip_id: TripId(row.try_get("trip_id")?),
        amount: parse_decimal("amount", row.try_get("amount")?)?,
        currency,
        status: parse_status(row.try_get("status")?)?,
        rejection_reason: row.try_get("rejection_reason")?,
        approved_by: row.try_get::<Option<i64>, _>("approved_by")?.map(UserId),
        approved_at: parse_optional_timestamp("approved_at", row.try_get("approved_at")?)?,
        created_at: parse_timestamp("created_at", row.try_get("created_at")?)?,
        updated_at: parse_timestamp("updated_at", row.try_get("updated_at")?)?,
        detail,
    })
}

fn receipt_from_row(row: &SqliteRow) -> Result<Receipt, RepositoryError> {
    Ok(Receipt {
        id: ReceiptId(row.try_get("id")?),
        expense_id: ClaimId(row.try_get("expense_id")?),
        filename: row.try_get("filename")?,
        original_filename: row.try_get("original_filename")?,
        content_type: row.try_get("content_type")?,
        byte_size: row.try_get("file_size")?,
        created_at: parse_timestamp("created_at", row.try_get("created_at")?)?,
    })
}

fn parse_status(raw: String) -> Result<ClaimStatus, RepositoryError> {
    ClaimStatus::parse(&raw)
        .ok_or_else(|| RepositoryError::Decode(format!("unknown claim status `{raw}`")))
}
