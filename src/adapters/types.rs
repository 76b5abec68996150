//! Tenant-database entity types shared by every schema adapter.
//!
//! Monetary columns persisted as integer cents are surfaced as [`Decimal`]
//! (two decimal places); columns already stored as decimals pass through.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use rust_decimal::prelude::ToPrimitive;
use sea_orm::FromQueryResult;
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};

use crate::error::CoreError;

pub const DEFAULT_PAGE_SIZE: u64 = 50;
pub const MAX_PAGE_SIZE: u64 = 200;
pub const MAX_PAGE: u64 = 1_000_000;
pub const DEFAULT_COMMISSION_LIMIT: u64 = 100;

/// Integer cents to a two-place decimal amount.
pub fn cents_to_decimal(cents: i64) -> Decimal {
    Decimal::new(cents, 2)
}

/// Decimal amount to integer cents, rounding to the nearest cent.
pub fn decimal_to_cents(amount: Decimal) -> Result<i64, CoreError> {
    (amount.round_dp(2) * Decimal::ONE_HUNDRED)
        .to_i64()
        .ok_or_else(|| CoreError::malformed("amount out of range"))
}

/// 1-based page request.
#[derive(Debug, Clone, Copy, Deserialize, IntoParams, ToSchema)]
#[serde(rename_all = "camelCase")]
#[into_params(parameter_in = Query)]
pub struct PageRequest {
    #[serde(default = "default_page")]
    pub page: u64,
    #[serde(default = "default_page_size")]
    pub per_page: u64,
}

impl Default for PageRequest {
    fn default() -> Self {
        Self {
            page: default_page(),
            per_page: default_page_size(),
        }
    }
}

impl PageRequest {
    /// Clamp to sane bounds: page ≥ 1, 1 ≤ per_page ≤ [`MAX_PAGE_SIZE`].
    pub fn normalized(self) -> Self {
        Self {
            page: self.page.max(1),
            per_page: self.per_page.clamp(1, MAX_PAGE_SIZE),
        }
    }

    /// [`normalized`](Self::normalized), refusing pages past [`MAX_PAGE`].
    pub fn checked(self) -> Result<Self, CoreError> {
        if self.page > MAX_PAGE {
            return Err(CoreError::malformed(format!("page must be at most {MAX_PAGE}")));
        }
        Ok(self.normalized())
    }

    pub fn offset(&self) -> u64 {
        (self.page.max(1) - 1).saturating_mul(self.per_page)
    }
}

fn default_page() -> u64 {
    1
}

fn default_page_size() -> u64 {
    DEFAULT_PAGE_SIZE
}

#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct Paginated<T> {
    pub items: Vec<T>,
    pub page: u64,
    pub per_page: u64,
    pub total: u64,
}

/// Tax client. The government id column is never selected.
#[derive(Debug, Clone, PartialEq, Serialize, FromQueryResult, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct Client {
    pub id: String,
    pub first_name: String,
    pub last_name: String,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub address: Option<String>,
    pub affiliate_id: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, FromQueryResult, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct Dependent {
    pub id: String,
    pub client_id: String,
    pub first_name: String,
    pub last_name: String,
    pub relationship: Option<String>,
    pub date_of_birth: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, FromQueryResult, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct Filing {
    pub id: String,
    pub client_id: String,
    pub tax_year: i32,
    pub status: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, FromQueryResult, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct Document {
    pub id: String,
    pub filing_id: String,
    pub client_id: String,
    pub file_name: String,
    pub content_type: Option<String>,
    pub storage_path: String,
    pub size_bytes: i64,
    pub uploaded_by: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct NewDocument {
    pub filing_id: String,
    pub client_id: String,
    pub file_name: String,
    #[serde(default)]
    pub content_type: Option<String>,
    pub storage_path: String,
    #[serde(default)]
    pub size_bytes: i64,
    #[serde(default)]
    pub uploaded_by: Option<String>,
}

/// Client with everything hanging off it, for the detail view.
#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ClientComprehensive {
    pub client: Client,
    pub dependents: Vec<Dependent>,
    pub filings: Vec<Filing>,
    pub documents: Vec<Document>,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ClientWithFilings {
    pub client: Client,
    pub filings: Vec<Filing>,
}

#[derive(Debug, Clone, PartialEq, Serialize, FromQueryResult, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct Affiliate {
    pub id: String,
    pub name: String,
    pub email: String,
    pub phone: Option<String>,
    /// Fraction of the filing fee paid out, e.g. `0.10`
    #[schema(value_type = String)]
    pub commission_rate: Decimal,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct NewAffiliate {
    pub name: String,
    pub email: String,
    #[serde(default)]
    pub phone: Option<String>,
    #[schema(value_type = String)]
    pub commission_rate: Decimal,
}

#[derive(Debug, Clone, Default, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct AffiliateUpdate {
    pub name: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
    #[schema(value_type = Option<String>)]
    pub commission_rate: Option<Decimal>,
    pub is_active: Option<bool>,
}

/// Commission lifecycle.
///
/// pending → approved → paid, and pending/approved → cancelled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, ToSchema)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CommissionStatus {
    Pending,
    Approved,
    Paid,
    Cancelled,
}

impl CommissionStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            CommissionStatus::Pending => "PENDING",
            CommissionStatus::Approved => "APPROVED",
            CommissionStatus::Paid => "PAID",
            CommissionStatus::Cancelled => "CANCELLED",
        }
    }

    pub fn can_transition_to(self, next: CommissionStatus) -> bool {
        use CommissionStatus::*;
        matches!(
            (self, next),
            (Pending, Approved) | (Approved, Paid) | (Pending, Cancelled) | (Approved, Cancelled)
        )
    }

    /// States a commission may be in for `next` to be reachable
    pub fn sources_of(next: CommissionStatus) -> &'static [CommissionStatus] {
        match next {
            CommissionStatus::Approved => &[CommissionStatus::Pending],
            CommissionStatus::Paid => &[CommissionStatus::Approved],
            CommissionStatus::Cancelled => {
                &[CommissionStatus::Pending, CommissionStatus::Approved]
            }
            CommissionStatus::Pending => &[],
        }
    }
}

impl std::fmt::Display for CommissionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for CommissionStatus {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "PENDING" => Ok(CommissionStatus::Pending),
            "APPROVED" => Ok(CommissionStatus::Approved),
            "PAID" => Ok(CommissionStatus::Paid),
            "CANCELLED" | "CANCELED" => Ok(CommissionStatus::Cancelled),
            other => Err(CoreError::malformed(format!(
                "unknown commission status '{}'",
                other
            ))),
        }
    }
}

// Accepts any casing so `?status=pending` works.
impl<'de> Deserialize<'de> for CommissionStatus {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct Commission {
    pub id: String,
    pub affiliate_id: String,
    pub client_id: Option<String>,
    pub filing_id: Option<String>,
    #[schema(value_type = String)]
    pub amount: Decimal,
    pub status: CommissionStatus,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
    pub approved_at: Option<DateTime<Utc>>,
    pub paid_at: Option<DateTime<Utc>>,
    pub cancelled_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, FromQueryResult)]
pub(crate) struct CommissionRow {
    pub id: String,
    pub affiliate_id: String,
    pub client_id: Option<String>,
    pub filing_id: Option<String>,
    pub amount_cents: i64,
    pub status: String,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
    pub approved_at: Option<DateTime<Utc>>,
    pub paid_at: Option<DateTime<Utc>>,
    pub cancelled_at: Option<DateTime<Utc>>,
}

impl TryFrom<CommissionRow> for Commission {
    type Error = CoreError;

    fn try_from(row: CommissionRow) -> Result<Self, Self::Error> {
        Ok(Commission {
            status: row.status.parse()?,
            id: row.id,
            affiliate_id: row.affiliate_id,
            client_id: row.client_id,
            filing_id: row.filing_id,
            amount: cents_to_decimal(row.amount_cents),
            notes: row.notes,
            created_at: row.created_at,
            approved_at: row.approved_at,
            paid_at: row.paid_at,
            cancelled_at: row.cancelled_at,
        })
    }
}

#[derive(Debug, Clone, Default, Deserialize, IntoParams)]
#[serde(rename_all = "camelCase")]
#[into_params(parameter_in = Query)]
pub struct CommissionFilter {
    pub affiliate_id: Option<String>,
    pub status: Option<CommissionStatus>,
    pub limit: Option<u64>,
}

/// Per-affiliate roll-up.
#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct AffiliateStats {
    pub affiliate_id: String,
    pub referred_clients: u64,
    pub commission_count: u64,
    #[schema(value_type = String)]
    pub pending_amount: Decimal,
    #[schema(value_type = String)]
    pub approved_amount: Decimal,
    #[schema(value_type = String)]
    pub paid_amount: Decimal,
    #[schema(value_type = String)]
    pub cancelled_amount: Decimal,
}

#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct DiscountCode {
    pub id: String,
    pub affiliate_id: Option<String>,
    /// Always upper-case
    pub code: String,
    #[schema(value_type = Option<String>)]
    pub amount_off: Option<Decimal>,
    #[schema(value_type = Option<String>)]
    pub percent_off: Option<Decimal>,
    pub valid_from: Option<DateTime<Utc>>,
    pub valid_until: Option<DateTime<Utc>>,
    pub max_uses: Option<i32>,
    pub current_uses: i32,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl DiscountCode {
    /// active ∧ started ∧ not ended ∧ uses remaining
    pub fn is_valid(&self, now: DateTime<Utc>) -> bool {
        self.is_active
            && self.valid_from.is_none_or(|from| from <= now)
            && self.valid_until.is_none_or(|until| until > now)
            && self.max_uses.is_none_or(|max| self.current_uses < max)
    }
}

#[derive(Debug, Clone, FromQueryResult)]
pub(crate) struct DiscountCodeRow {
    pub id: String,
    pub affiliate_id: Option<String>,
    pub code: String,
    pub amount_off_cents: Option<i64>,
    pub percent_off: Option<Decimal>,
    pub valid_from: Option<DateTime<Utc>>,
    pub valid_until: Option<DateTime<Utc>>,
    pub max_uses: Option<i32>,
    pub current_uses: i32,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<DiscountCodeRow> for DiscountCode {
    fn from(row: DiscountCodeRow) -> Self {
        DiscountCode {
            id: row.id,
            affiliate_id: row.affiliate_id,
            code: row.code,
            amount_off: row.amount_off_cents.map(cents_to_decimal),
            percent_off: row.percent_off,
            valid_from: row.valid_from,
            valid_until: row.valid_until,
            max_uses: row.max_uses,
            current_uses: row.current_uses,
            is_active: row.is_active,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

#[derive(Debug, Clone, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct NewDiscountCode {
    pub code: String,
    #[serde(default)]
    pub affiliate_id: Option<String>,
    #[serde(default)]
    #[schema(value_type = Option<String>)]
    pub amount_off: Option<Decimal>,
    #[serde(default)]
    #[schema(value_type = Option<String>)]
    pub percent_off: Option<Decimal>,
    #[serde(default)]
    pub valid_from: Option<DateTime<Utc>>,
    #[serde(default)]
    pub valid_until: Option<DateTime<Utc>>,
    #[serde(default)]
    pub max_uses: Option<i32>,
}

#[derive(Debug, Clone, Default, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct DiscountCodeUpdate {
    pub code: Option<String>,
    #[schema(value_type = Option<String>)]
    pub amount_off: Option<Decimal>,
    #[schema(value_type = Option<String>)]
    pub percent_off: Option<Decimal>,
    pub valid_from: Option<DateTime<Utc>>,
    pub valid_until: Option<DateTime<Utc>>,
    pub max_uses: Option<i32>,
    pub is_active: Option<bool>,
}

#[derive(Debug, Clone, Default, Deserialize, IntoParams)]
#[serde(rename_all = "camelCase")]
#[into_params(parameter_in = Query)]
pub struct DiscountCodeFilter {
    pub affiliate_id: Option<String>,
    /// Only codes with the active flag set
    #[serde(default)]
    pub active_only: bool,
}
