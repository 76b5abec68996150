//! Schema adapters
//!
//! A schema adapter knows how one upstream tax platform lays out its tables
//! inside a tenant database. Every operation receives the open tenant handle
//! and the tenant's schema prefix; adapters hold no connection state.
//!
//! - [`SchemaAdapter`] is the entity-oriented capability set
//! - [`AdapterRegistry`] maps an [`AdapterKind`] to its implementation
//! - [`StandardAdapter`] is the default (and currently only) kind

pub mod registry;
pub mod standard;
pub mod types;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sea_orm::DatabaseConnection;

use crate::error::CoreError;

pub use registry::AdapterRegistry;
pub use standard::StandardAdapter;
pub use types::*;

/// Closed set of schema layouts this service understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum AdapterKind {
    #[default]
    Standard,
}

impl AdapterKind {
    pub const ALL: [AdapterKind; 1] = [AdapterKind::Standard];

    pub fn as_str(self) -> &'static str {
        match self {
            AdapterKind::Standard => "standard",
        }
    }
}

impl std::fmt::Display for AdapterKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for AdapterKind {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        AdapterKind::ALL
            .into_iter()
            .find(|kind| kind.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| CoreError::AdapterUnavailable(s.to_string()))
    }
}

/// Entity operations against one tenant schema layout.
///
/// `schema` is the tenant's validated schema prefix. Implementations must
/// qualify every table reference with it and must not hold on to `db`.
#[async_trait]
pub trait SchemaAdapter: Send + Sync {
    fn kind(&self) -> AdapterKind;

    // clients

    async fn list_clients(
        &self,
        db: &DatabaseConnection,
        schema: &str,
        page: PageRequest,
    ) -> Result<Paginated<Client>, CoreError>;

    async fn client_by_id(
        &self,
        db: &DatabaseConnection,
        schema: &str,
        client_id: &str,
    ) -> Result<Client, CoreError>;

    async fn client_comprehensive(
        &self,
        db: &DatabaseConnection,
        schema: &str,
        client_id: &str,
    ) -> Result<ClientComprehensive, CoreError>;

    async fn clients_with_filings(
        &self,
        db: &DatabaseConnection,
        schema: &str,
        page: PageRequest,
    ) -> Result<Paginated<ClientWithFilings>, CoreError>;

    // affiliates

    async fn list_affiliates(
        &self,
        db: &DatabaseConnection,
        schema: &str,
    ) -> Result<Vec<Affiliate>, CoreError>;

    async fn affiliate_by_id(
        &self,
        db: &DatabaseConnection,
        schema: &str,
        affiliate_id: &str,
    ) -> Result<Affiliate, CoreError>;

    async fn create_affiliate(
        &self,
        db: &DatabaseConnection,
        schema: &str,
        affiliate: NewAffiliate,
    ) -> Result<Affiliate, CoreError>;

    async fn update_affiliate(
        &self,
        db: &DatabaseConnection,
        schema: &str,
        affiliate_id: &str,
        update: AffiliateUpdate,
    ) -> Result<Affiliate, CoreError>;

    // commissions

    async fn list_commissions(
        &self,
        db: &DatabaseConnection,
        schema: &str,
        filter: CommissionFilter,
    ) -> Result<Vec<Commission>, CoreError>;

    /// pending → approved
    async fn approve_commission(
        &self,
        db: &DatabaseConnection,
        schema: &str,
        commission_id: &str,
        now: DateTime<Utc>,
    ) -> Result<Commission, CoreError>;

    /// approved → paid
    async fn mark_commission_paid(
        &self,
        db: &DatabaseConnection,
        schema: &str,
        commission_id: &str,
        now: DateTime<Utc>,
    ) -> Result<Commission, CoreError>;

    /// pending | approved → cancelled
    async fn cancel_commission(
        &self,
        db: &DatabaseConnection,
        schema: &str,
        commission_id: &str,
        now: DateTime<Utc>,
    ) -> Result<Commission, CoreError>;

    async fn affiliate_stats(
        &self,
        db: &DatabaseConnection,
        schema: &str,
        affiliate_id: &str,
    ) -> Result<AffiliateStats, CoreError>;

    // discount codes

    async fn list_discount_codes(
        &self,
        db: &DatabaseConnection,
        schema: &str,
        filter: DiscountCodeFilter,
    ) -> Result<Vec<DiscountCode>, CoreError>;

    async fn discount_code_by_id(
        &self,
        db: &DatabaseConnection,
        schema: &str,
        code_id: &str,
    ) -> Result<DiscountCode, CoreError>;

    /// Case-insensitive lookup
    async fn discount_code_by_code(
        &self,
        db: &DatabaseConnection,
        schema: &str,
        code: &str,
    ) -> Result<DiscountCode, CoreError>;

    async fn create_discount_code(
        &self,
        db: &DatabaseConnection,
        schema: &str,
        code: NewDiscountCode,
    ) -> Result<DiscountCode, CoreError>;

    async fn update_discount_code(
        &self,
        db: &DatabaseConnection,
        schema: &str,
        code_id: &str,
        update: DiscountCodeUpdate,
    ) -> Result<DiscountCode, CoreError>;

    async fn deactivate_discount_code(
        &self,
        db: &DatabaseConnection,
        schema: &str,
        code_id: &str,
    ) -> Result<(), CoreError>;

    // documents

    async fn create_document(
        &self,
        db: &DatabaseConnection,
        schema: &str,
        document: NewDocument,
    ) -> Result<Document, CoreError>;

    async fn document_by_id(
        &self,
        db: &DatabaseConnection,
        schema: &str,
        document_id: &str,
    ) -> Result<Document, CoreError>;

    async fn documents_by_filing(
        &self,
        db: &DatabaseConnection,
        schema: &str,
        filing_id: &str,
    ) -> Result<Vec<Document>, CoreError>;

    async fn delete_document(
        &self,
        db: &DatabaseConnection,
        schema: &str,
        document_id: &str,
    ) -> Result<(), CoreError>;
}
