use std::fmt;

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::domain::category::CategoryId;
use crate::domain::trip::{normalize_text, TripId};
use crate::domain::user::UserId;
use crate::errors::DomainError;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ClaimId(pub i64);

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ReceiptId(pub i64);

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClaimKind {
    Expense,
    Advance,
}

impl ClaimKind {
    pub const ALL: [ClaimKind; 2] = [Self::Expense, Self::Advance];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Expense => "expense",
            Self::Advance => "advance",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "expense" | "expenses" => Some(Self::Expense),
            "advance" | "advances" => Some(Self::Advance),
            _ => None,
        }
    }
}

impl fmt::Display for ClaimKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClaimStatus {
    Pending,
    Approved,
    Rejected,
}

impl ClaimStatus {
    pub const ALL: [ClaimStatus; 3] = [Self::Pending, Self::Approved, Self::Rejected];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Approved => "approved",
            Self::Rejected => "rejected",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "pending" => Some(Self::Pending),
            "approved" => Some(Self::Approved),
            "rejected" => Some(Self::Rejected),
            _ => None,
        }
    }
}

impl fmt::Display for ClaimStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Currency {
    #[serde(rename = "INR")]
    Inr,
    #[serde(rename = "USD")]
    Usd,
}

impl Currency {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Inr => "INR",
            Self::Usd => "USD",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_uppercase().as_str() {
            "INR" => Some(Self::Inr),
            "USD" => Some(Self::Usd),
            _ => None,
        }
    }
}

impl fmt::Display for Currency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An expense or advance filed against a trip. Both kinds share the approval
/// columns; the kind-specific fields live in `detail`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claim {
    pub id: ClaimId,
    pub user_id: UserId,
    pub trip_id: TripId,
    pub amount: Decimal,
    pub currency: Currency,
    pub status: ClaimStatus,
    pub rejection_reason: Option<String>,
    pub approved_by: Option<UserId>,
    pub approved_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub detail: ClaimDetail,
}

impl Claim {
    pub fn kind(&self) -> ClaimKind {
        self.detail.kind()
    }

    pub fn receipts(&self) -> &[Receipt] {
        match &self.detail {
            ClaimDetail::Expense(expense) => &expense.receipts,
            ClaimDetail::Advance(_) => &[],
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ClaimDetail {
    Expense(ExpenseDetail),
    Advance(AdvanceDetail),
}

impl ClaimDetail {
    pub fn kind(&self) -> ClaimKind {
        match self {
            Self::Expense(_) => ClaimKind::Expense,
            Self::Advance(_) => ClaimKind::Advance,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExpenseDetail {
    pub category_id: CategoryId,
    pub title: Option<String>,
    pub description: Option<String>,
    pub expense_date: NaiveDate,
    /// Receipt metadata only; payloads are fetched one receipt at a time.
    pub receipts: Vec<Receipt>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdvanceDetail {
    pub paid_through: Option<String>,
    pub reference_id: Option<String>,
    pub notes: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Receipt {
    pub id: ReceiptId,
    pub expense_id: ClaimId,
    pub filename: String,
    pub original_filename: Option<String>,
    pub content_type: String,
    pub byte_size: i64,
    pub created_at: DateTime<Utc>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ReceiptPayload {
    pub receipt: Receipt,
    pub data: Vec<u8>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewReceipt {
    pub filename: String,
    pub original_filename: Option<String>,
    pub content_type: String,
    pub data: Vec<u8>,
}

impl NewReceipt {
    pub fn new(
        filename: impl Into<String>,
        content_type: impl Into<String>,
        data: impl Into<Vec<u8>>,
    ) -> Self {
        Self {
            filename: filename.into(),
            original_filename: None,
            content_type: content_type.into(),
            data: data.into(),
        }
    }

    pub fn byte_size(&self) -> i64 {
        i64::try_from(self.data.len()).unwrap_or(i64::MAX)
    }

    pub fn validate(&self) -> Result<(), DomainError> {
        if self.filename.trim().is_empty() {
            return Err(DomainError::MissingField { field: "receipt.filename" });
        }
        if self.content_type.trim().is_empty() {
            return Err(DomainError::MissingField { field: "receipt.content_type" });
        }
        Ok(())
    }
}

/// Claim submission as received from the request layer. Required fields are
/// optional here so that absence surfaces as a validation error.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewClaim {
    pub user_id: Option<UserId>,
    pub trip_id: Option<TripId>,
    pub amount: Option<Decimal>,
    pub currency: Option<String>,
    pub detail: NewClaimDetail,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum NewClaimDetail {
    Expense(NewExpense),
    Advance(AdvanceDetail),
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewExpense {
    pub category_id: Option<CategoryId>,
    pub title: Option<String>,
    pub description: Option<String>,
    /// Defaults to the filing date.
    pub expense_date: Option<NaiveDate>,
    #[serde(default)]
    pub receipts: Vec<NewReceipt>,
}

impl NewClaim {
    pub fn expense(
        user_id: UserId,
        trip_id: TripId,
        amount: Decimal,
        currency: Currency,
        category_id: CategoryId,
    ) -> Self {
        Self {
            user_id: Some(user_id),
            trip_id: Some(trip_id),
            amount: Some(amount),
            currency: Some(currency.as_str().to_string()),
            detail: NewClaimDetail::Expense(NewExpense {
                category_id: Some(category_id),
                ..NewExpense::default()
            }),
        }
    }

    pub fn advance(user_id: UserId, trip_id: TripId, amount: Decimal, currency: Currency) -> Self {
        Self {
            user_id: Some(user_id),
            trip_id: Some(trip_id),
            amount: Some(amount),
            currency: Some(currency.as_str().to_string()),
            detail: NewClaimDetail::Advance(AdvanceDetail::default()),
        }
    }

    pub fn with_receipt(mut self, receipt: NewReceipt) -> Self {
        if let NewClaimDetail::Expense(expense) = &mut self.detail {
            expense.receipts.push(receipt);
        }
        self
    }

    pub fn kind(&self) -> ClaimKind {
        match self.detail {
            NewClaimDetail::Expense(_) => ClaimKind::Expense,
            NewClaimDetail::Advance(_) => ClaimKind::Advance,
        }
    }

    pub fn validate(self) -> Result<ClaimDraft, DomainError> {
        let user_id = self.user_id.ok_or(DomainError::MissingField { field: "user_id" })?;
        let trip_id = self.trip_id.ok_or(DomainError::MissingField { field: "trip_id" })?;
        let amount = self.amount.ok_or(DomainError::MissingField { field: "amount" })?;
        if amount <= Decimal::ZERO {
            return Err(DomainError::invalid("amount", "must be greater than zero"));
        }

        let raw_currency = self
            .currency
            .as_deref()
            .map(str::trim)
            .filter(|value| !value.is_empty())
            .ok_or(DomainError::MissingField { field: "currency" })?;
        let currency = Currency::parse(raw_currency).ok_or_else(|| {
            DomainError::invalid("currency", format!("unsupported currency `{raw_currency}`"))
        })?;

        let detail = match self.detail {
            NewClaimDetail::Expense(expense) => {
                let category_id =
                    expense.category_id.ok_or(DomainError::MissingField { field: "category_id" })?;
                for receipt in &expense.receipts {
                    receipt.validate()?;
                }
                DraftDetail::Expense {
                    category_id,
                    title: normalize_text(expense.title),
                    description: normalize_text(expense.description),
                    expense_date: expense.expense_date,
                    receipts: expense.receipts,
                }
            }
            NewClaimDetail::Advance(advance) => DraftDetail::Advance(AdvanceDetail {
                paid_through: normalize_text(advance.paid_through),
                reference_id: normalize_text(advance.reference_id),
                notes: normalize_text(advance.notes),
            }),
        };

        Ok(ClaimDraft { user_id, trip_id, amount, currency, detail })
    }
}

/// A claim submission that passed field validation and is ready to be gated
/// against the trip state.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ClaimDraft {
    pub user_id: UserId,
    pub trip_id: TripId,
    pub amount: Decimal,
    pub currency: Currency,
    pub detail: DraftDetail,
}

impl ClaimDraft {
    pub fn kind(&self) -> ClaimKind {
        match self.detail {
            DraftDetail::Expense { .. } => ClaimKind::Expense,
            DraftDetail::Advance(_) => ClaimKind::Advance,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum DraftDetail {
    Expense {
        category_id: CategoryId,
        title: Option<String>,
        description: Option<String>,
        expense_date: Option<NaiveDate>,
        receipts: Vec<NewReceipt>,
    },
    Advance(AdvanceDetail),
}

/// Partial edit of a claim. `None` keeps the stored value; an empty string
/// clears an optional text field.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClaimPatch {
    pub amount: Option<Decimal>,
    pub currency: Option<String>,
    pub detail: Option<ClaimPatchDetail>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ClaimPatchDetail {
    Expense(ExpensePatch),
    Advance(AdvancePatch),
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExpensePatch {
    pub category_id: Option<CategoryId>,
    pub title: Option<String>,
    pub description: Option<String>,
    pub expense_date: Option<NaiveDate>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdvancePatch {
    pub paid_through: Option<String>,
    pub reference_id: Option<String>,
    pub notes: Option<String>,
}

impl ClaimPatch {
    pub fn is_empty(&self) -> bool {
        let detail_empty = match &self.detail {
            None => true,
            Some(ClaimPatchDetail::Expense(expense)) => {
                expense.category_id.is_none()
                    && expense.title.is_none()
                    && expense.description.is_none()
                    && expense.expense_date.is_none()
            }
            Some(ClaimPatchDetail::Advance(advance)) => {
                advance.paid_through.is_none()
                    && advance.reference_id.is_none()
                    && advance.notes.is_none()
            }
        };
        self.amount.is_none() && self.currency.is_none() && detail_empty
    }

    pub fn validate(self, kind: ClaimKind) -> Result<ValidatedClaimPatch, DomainError> {
        if self.is_empty() {
            return Err(DomainError::EmptyPatch);
        }
        if let Some(amount) = self.amount {
            if amount <= Decimal::ZERO {
                return Err(DomainError::invalid("amount", "must be greater than zero"));
            }
        }
        let currency = self
            .currency
            .as_deref()
            .map(|raw| {
                Currency::parse(raw).ok_or_else(|| {
                    DomainError::invalid("currency", format!("unsupported currency `{}`", raw.trim()))
                })
            })
            .transpose()?;

        let detail = match self.detail {
            None => None,
            Some(ClaimPatchDetail::Expense(expense)) if kind == ClaimKind::Expense => {
                Some(ClaimPatchDetail::Expense(ExpensePatch {
                    category_id: expense.category_id,
                    title: trim_text(expense.title),
                    description: trim_text(expense.description),
                    expense_date: expense.expense_date,
                }))
            }
            Some(ClaimPatchDetail::Advance(advance)) if kind == ClaimKind::Advance => {
                Some(ClaimPatchDetail::Advance(AdvancePatch {
                    paid_through: trim_text(advance.paid_through),
                    reference_id: trim_text(advance.reference_id),
                    notes: trim_text(advance.notes),
                }))
            }
            Some(ClaimPatchDetail::Expense(_)) => {
                return Err(DomainError::PatchKindMismatch { kind, sent: ClaimKind::Expense });
            }
            Some(ClaimPatchDetail::Advance(_)) => {
                return Err(DomainError::PatchKindMismatch { kind, sent: ClaimKind::Advance });
            }
        };

        Ok(ValidatedClaimPatch { amount: self.amount, currency, detail })
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ValidatedClaimPatch {
    pub amount: Option<Decimal>,
    pub currency: Option<Currency>,
    pub detail: Option<ClaimPatchDetail>,
}

fn trim_text(value: Option<String>) -> Option<String> {
    value.map(|text| text.trim().to_string())
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ClaimFilter {
    pub user_id: Option<UserId>,
    pub trip_id: Option<TripId>,
    pub status: Option<ClaimStatus>,
    pub currency: Option<Currency>,
}

/// Count and sum of one claim kind in one currency for a single trip.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClaimTotals {
    pub kind: ClaimKind,
    pub currency: Currency,
    pub count: i64,
    pub total: Decimal,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TripClaimStatistics {
    pub trip_id: TripId,
    pub totals: Vec<ClaimTotals>,
}

impl TripClaimStatistics {
    pub fn count(&self, kind: ClaimKind) -> i64 {
        self.totals.iter().filter(|totals| totals.kind == kind).map(|totals| totals.count).sum()
    }

    pub fn total(&self, kind: ClaimKind, currency: Currency) -> Decimal {
        self.totals
            .iter()
            .find(|totals| totals.kind == kind && totals.currency == currency)
            .map(|totals| totals.total)
            .unwrap_or(Decimal::ZERO)
    }
}

#[cfg(test)]
mod tests {
    use rust_decimal::Decimal;

    use super::{
        AdvancePatch, ClaimKind, ClaimPatch, ClaimPatchDetail, ClaimStatus, Currency, DraftDetail,
        ExpensePatch, NewClaim, NewReceipt,
    };
    use crate::domain::category::CategoryId;
    use crate::domain::trip::TripId;
    use crate::domain::user::UserId;
    use crate::errors::DomainError;

    fn expense() -> NewClaim {
        NewClaim::expense(UserId(7), TripId(1), Decimal::new(500, 0), Currency::Inr, CategoryId(1))
    }

    #[test]
    fn claim_status_round_trips_from_storage_encoding() {
        for status in ClaimStatus::ALL {
            assert_eq!(ClaimStatus::parse(status.as_str()), Some(status));
        }
    }

    #[test]
    fn currency_parsing_is_case_insensitive() {
        assert_eq!(Currency::parse("inr"), Some(Currency::Inr));
        assert_eq!(Currency::parse(" USD "), Some(Currency::Usd));
        assert_eq!(Currency::parse("EUR"), None);
    }

    #[test]
    fn missing_fields_are_reported_by_name() {
        let mut claim = expense();
        claim.amount = None;
        assert_eq!(claim.validate(), Err(DomainError::MissingField { field: "amount" }));

        let mut claim = expense();
        claim.currency = Some("  ".to_string());
        assert_eq!(claim.validate(), Err(DomainError::MissingField { field: "currency" }));

        let mut claim = NewClaim::advance(UserId(7), TripId(1), Decimal::ONE, Currency::Usd);
        claim.user_id = None;
        assert_eq!(claim.validate(), Err(DomainError::MissingField { field: "user_id" }));
    }

    #[test]
    fn expenses_require_a_category() {
        let mut claim = expense();
        if let super::NewClaimDetail::Expense(detail) = &mut claim.detail {
            detail.category_id = None;
        }
        assert_eq!(claim.validate(), Err(DomainError::MissingField { field: "category_id" }));
    }

    #[test]
    fn non_positive_amounts_and_unknown_currencies_are_invalid() {
        let mut claim = expense();
        claim.amount = Some(Decimal::ZERO);
        assert!(matches!(claim.validate(), Err(DomainError::InvalidField { field: "amount", .. })));

        let mut claim = expense();
        claim.currency = Some("GBP".to_string());
        assert!(matches!(
            claim.validate(),
            Err(DomainError::InvalidField { field: "currency", .. })
        ));
    }

    #[test]
    fn receipts_need_filename_and_content_type() {
        let claim = expense().with_receipt(NewReceipt::new("", "image/png", vec![1, 2, 3]));
        assert_eq!(claim.validate(), Err(DomainError::MissingField { field: "receipt.filename" }));
    }

    #[test]
    fn empty_patch_is_refused() {
        let patch = ClaimPatch {
            detail: Some(ClaimPatchDetail::Advance(AdvancePatch::default())),
            ..ClaimPatch::default()
        };
        assert_eq!(patch.validate(ClaimKind::Advance), Err(DomainError::EmptyPatch));
    }

    #[test]
    fn patch_detail_must_match_claim_kind() {
        let patch = ClaimPatch {
            detail: Some(ClaimPatchDetail::Expense(ExpensePatch {
                category_id: Some(CategoryId(2)),
                ..ExpensePatch::default()
            })),
            ..ClaimPatch::default()
        };
        assert_eq!(
            patch.validate(ClaimKind::Advance),
            Err(DomainError::PatchKindMismatch { kind: ClaimKind::Advance, sent: ClaimKind::Expense })
        );
    }

    #[test]
    fn patch_checks_amount_and_normalizes_currency() {
        let patch = ClaimPatch { amount: Some(Decimal::new(-5, 0)), ..ClaimPatch::default() };
        assert!(matches!(
            patch.validate(ClaimKind::Expense),
            Err(DomainError::InvalidField { field: "amount", .. })
        ));

        let validated = ClaimPatch {
            currency: Some(" usd ".to_string()),
            detail: Some(ClaimPatchDetail::Expense(ExpensePatch {
                title: Some("  Airport taxi ".to_string()),
                ..ExpensePatch::default()
            })),
            ..ClaimPatch::default()
        }
        .validate(ClaimKind::Expense)
        .expect("valid patch");
        assert_eq!(validated.currency, Some(Currency::Usd));
        assert_eq!(
            validated.detail,
            Some(ClaimPatchDetail::Expense(ExpensePatch {
                title: Some("Airport taxi".to_string()),
                ..ExpensePatch::default()
            }))
        );
    }

    #[test]
    fn valid_expense_produces_draft() {
        let draft = expense()
            .with_receipt(NewReceipt::new("taxi.pdf", "application/pdf", vec![0u8; 16]))
            .validate()
            .expect("valid expense");

        assert_eq!(draft.kind(), ClaimKind::Expense);
        assert_eq!(draft.currency, Currency::Inr);
        match draft.detail {
            DraftDetail::Expense { receipts, .. } => {
                assert_eq!(receipts.len(), 1);
                assert_eq!(receipts[0].byte_size(), 16);
            }
            DraftDetail::Advance(_) => panic!("expected expense draft"),
        }
    }
}
