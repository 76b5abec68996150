//! Standard schema adapter
//!
//! Table layout of the default upstream tax platform. Every statement is built
//! with sea-query so table references come out as `"<prefix>"."<table>"` and
//! placeholders follow the connected backend. Ids are generated here as UUID
//! strings and timestamps are bound from Rust, which keeps the SQL portable
//! between Postgres tenants and SQLite test databases.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sea_orm::sea_query::{
    Alias, Asterisk, Expr, Func, InsertStatement, Order, Query, SelectStatement, SimpleExpr,
    UpdateStatement,
};
use sea_orm::{ConnectionTrait, DatabaseConnection, DbErr, FromQueryResult};
use std::collections::HashMap;
use tracing::debug;
use uuid::Uuid;

use crate::adapters::types::{CommissionRow, DiscountCodeRow};
use crate::adapters::*;
use crate::error::CoreError;

const CLIENTS: &str = "clients";
const DEPENDENTS: &str = "dependents";
const FILINGS: &str = "filings";
const DOCUMENTS: &str = "documents";
const AFFILIATES: &str = "affiliates";
const COMMISSIONS: &str = "commissions";
const DISCOUNT_CODES: &str = "discount_codes";

const MAX_COMMISSION_LIMIT: u64 = 500;

// Government id columns are never selected.
const CLIENT_COLUMNS: &[&str] = &[
    "id",
    "first_name",
    "last_name",
    "email",
    "phone",
    "address",
    "affiliate_id",
    "created_at",
    "updated_at",
];
const DEPENDENT_COLUMNS: &[&str] = &[
    "id",
    "client_id",
    "first_name",
    "last_name",
    "relationship",
    "date_of_birth",
];
const FILING_COLUMNS: &[&str] = &[
    "id",
    "client_id",
    "tax_year",
    "status",
    "created_at",
    "updated_at",
    "completed_at",
];
const DOCUMENT_COLUMNS: &[&str] = &[
    "id",
    "filing_id",
    "client_id",
    "file_name",
    "content_type",
    "storage_path",
    "size_bytes",
    "uploaded_by",
    "created_at",
];
const AFFILIATE_COLUMNS: &[&str] = &[
    "id",
    "name",
    "email",
    "phone",
    "commission_rate",
    "is_active",
    "created_at",
    "updated_at",
];
const COMMISSION_COLUMNS: &[&str] = &[
    "id",
    "affiliate_id",
    "client_id",
    "filing_id",
    "amount_cents",
    "status",
    "notes",
    "created_at",
    "approved_at",
    "paid_at",
    "cancelled_at",
];
const DISCOUNT_CODE_COLUMNS: &[&str] = &[
    "id",
    "affiliate_id",
    "code",
    "amount_off_cents",
    "percent_off",
    "valid_from",
    "valid_until",
    "max_uses",
    "current_uses",
    "is_active",
    "created_at",
    "updated_at",
];

fn col(name: &str) -> Alias {
    Alias::new(name)
}

fn table_ref(schema: &str, table: &str) -> (Alias, Alias) {
    (Alias::new(schema), Alias::new(table))
}

fn select_from(schema: &str, table: &str, columns: &[&str]) -> SelectStatement {
    Query::select()
        .columns(columns.iter().copied().map(col))
        .from(table_ref(schema, table))
        .to_owned()
}

async fn fetch_all<T: FromQueryResult>(
    db: &DatabaseConnection,
    query: &SelectStatement,
) -> Result<Vec<T>, DbErr> {
    T::find_by_statement(db.get_database_backend().build(query))
        .all(db)
        .await
}

async fn fetch_optional<T: FromQueryResult>(
    db: &DatabaseConnection,
    query: &SelectStatement,
) -> Result<Option<T>, DbErr> {
    T::find_by_statement(db.get_database_backend().build(query))
        .one(db)
        .await
}

async fn count_rows(
    db: &DatabaseConnection,
    schema: &str,
    table: &str,
    filter: Option<SimpleExpr>,
) -> Result<u64, DbErr> {
    let mut query = Query::select()
        .expr_as(Expr::col(Asterisk).count(), col("total"))
        .from(table_ref(schema, table))
        .to_owned();
    if let Some(filter) = filter {
        query.and_where(filter);
    }

    let total = match db
        .query_one(db.get_database_backend().build(&query))
        .await?
    {
        Some(row) => row.try_get::<i64>("", "total")?,
        None => 0,
    };
    Ok(u64::try_from(total).unwrap_or_default())
}

async fn insert_row(
    db: &DatabaseConnection,
    schema: &str,
    table: &str,
    columns: &[&str],
    values: Vec<SimpleExpr>,
) -> Result<(), DbErr> {
    let mut insert: InsertStatement = Query::insert();
    insert
        .into_table(table_ref(schema, table))
        .columns(columns.iter().copied().map(col));
    insert
        .values(values)
        .map_err(|e| DbErr::Custom(format!("invalid insert into {table}: {e}")))?;

    db.execute(db.get_database_backend().build(&insert)).await?;
    Ok(())
}

async fn execute_update(db: &DatabaseConnection, update: &UpdateStatement) -> Result<u64, DbErr> {
    let result = db.execute(db.get_database_backend().build(update)).await?;
    Ok(result.rows_affected())
}

fn require_text(value: &str, field: &str) -> Result<String, CoreError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(CoreError::malformed(format!("{field} is required")));
    }
    Ok(trimmed.to_string())
}

fn validate_commission_rate(rate: Decimal) -> Result<(), CoreError> {
    if rate < Decimal::ZERO || rate > Decimal::ONE {
        return Err(CoreError::malformed(
            "commissionRate must be between 0 and 1",
        ));
    }
    Ok(())
}

fn normalize_code(code: &str) -> Result<String, CoreError> {
    let code = require_text(code, "code")?.to_uppercase();
    if !code
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
    {
        return Err(CoreError::malformed(
            "code may only contain letters, digits, '-' and '_'",
        ));
    }
    Ok(code)
}

fn validate_discount_terms(
    amount_off: Option<Decimal>,
    percent_off: Option<Decimal>,
    valid_from: Option<DateTime<Utc>>,
    valid_until: Option<DateTime<Utc>>,
    max_uses: Option<i32>,
) -> Result<(), CoreError> {
    if amount_off.is_some_and(|amount| amount <= Decimal::ZERO) {
        return Err(CoreError::malformed("amountOff must be positive"));
    }
    if percent_off.is_some_and(|pct| pct <= Decimal::ZERO || pct > Decimal::ONE_HUNDRED) {
        return Err(CoreError::malformed("percentOff must be in (0, 100]"));
    }
    if let (Some(from), Some(until)) = (valid_from, valid_until) {
        if from >= until {
            return Err(CoreError::malformed("validFrom must precede validUntil"));
        }
    }
    if max_uses.is_some_and(|max| max < 1) {
        return Err(CoreError::malformed("maxUses must be at least 1"));
    }
    Ok(())
}

#[derive(Debug, FromQueryResult)]
struct StatusAmount {
    status: String,
    amount_cents: i64,
}

/// Adapter for the default schema layout.
#[derive(Debug, Clone, Copy, Default)]
pub struct StandardAdapter;

impl StandardAdapter {
    async fn commission_by_id(
        &self,
        db: &DatabaseConnection,
        schema: &str,
        commission_id: &str,
    ) -> Result<Commission, CoreError> {
        let query = select_from(schema, COMMISSIONS, COMMISSION_COLUMNS)
            .and_where(Expr::col(col("id")).eq(commission_id))
            .to_owned();

        fetch_optional::<CommissionRow>(db, &query)
            .await?
            .ok_or_else(|| CoreError::not_found("commission", commission_id))?
            .try_into()
    }

    /// Guarded status update: the row only moves when its current status is a
    /// legal source for `next`. A zero-row update is then classified as
    /// missing or illegal by reading the row back.
    async fn transition_commission(
        &self,
        db: &DatabaseConnection,
        schema: &str,
        commission_id: &str,
        next: CommissionStatus,
        stamp_column: &str,
        now: DateTime<Utc>,
    ) -> Result<Commission, CoreError> {
        let sources = CommissionStatus::sources_of(next)
            .iter()
            .map(|status| status.as_str())
            .collect::<Vec<_>>();

        let update = Query::update()
            .table(table_ref(schema, COMMISSIONS))
            .value(col("status"), next.as_str())
            .value(col(stamp_column), now)
            .and_where(Expr::col(col("id")).eq(commission_id))
            .and_where(Expr::col(col("status")).is_in(sources))
            .to_owned();

        if execute_update(db, &update).await? == 0 {
            let current = self.commission_by_id(db, schema, commission_id).await?;
            debug!(
                commission_id,
                from = %current.status,
                to = %next,
                "commission transition refused"
            );
            return Err(CoreError::IllegalStateTransition {
                from: current.status.to_string(),
                to: next.to_string(),
            });
        }

        self.commission_by_id(db, schema, commission_id).await
    }

    async fn filing_by_id(
        &self,
        db: &DatabaseConnection,
        schema: &str,
        filing_id: &str,
    ) -> Result<Filing, CoreError> {
        let query = select_from(schema, FILINGS, FILING_COLUMNS)
            .and_where(Expr::col(col("id")).eq(filing_id))
            .to_owned();
        fetch_optional(db, &query)
            .await?
            .ok_or_else(|| CoreError::not_found("filing", filing_id))
    }

    async fn filings_for_clients(
        &self,
        db: &DatabaseConnection,
        schema: &str,
        client_ids: Vec<String>,
    ) -> Result<Vec<Filing>, CoreError> {
        if client_ids.is_empty() {
            return Ok(Vec::new());
        }
        let query = select_from(schema, FILINGS, FILING_COLUMNS)
            .and_where(Expr::col(col("client_id")).is_in(client_ids))
            .order_by(col("tax_year"), Order::Desc)
            .order_by(col("created_at"), Order::Desc)
            .to_owned();
        Ok(fetch_all(db, &query).await?)
    }
}

#[async_trait]
impl SchemaAdapter for StandardAdapter {
    fn kind(&self) -> AdapterKind {
        AdapterKind::Standard
    }

    async fn list_clients(
        &self,
        db: &DatabaseConnection,
        schema: &str,
        page: PageRequest,
    ) -> Result<Paginated<Client>, CoreError> {
        let page = page.checked()?;
        let total = count_rows(db, schema, CLIENTS, None).await?;

        let query = select_from(schema, CLIENTS, CLIENT_COLUMNS)
            .order_by(col("created_at"), Order::Desc)
            .order_by(col("id"), Order::Asc)
            .limit(page.per_page)
            .offset(page.offset())
            .to_owned();

        Ok(Paginated {
            items: fetch_all(db, &query).await?,
            page: page.page,
            per_page: page.per_page,
            total,
        })
    }

    async fn client_by_id(
        &self,
        db: &DatabaseConnection,
        schema: &str,
        client_id: &str,
    ) -> Result<Client, CoreError> {
        let query = select_from(schema, CLIENTS, CLIENT_COLUMNS)
            .and_where(Expr::col(col("id")).eq(client_id))
            .to_owned();
        fetch_optional(db, &query)
            .await?
            .ok_or_else(|| CoreError::not_found("client", client_id))
    }

    async fn client_comprehensive(
        &self,
        db: &DatabaseConnection,
        schema: &str,
        client_id: &str,
    ) -> Result<ClientComprehensive, CoreError> {
        let client = self.client_by_id(db, schema, client_id).await?;

        let dependents = select_from(schema, DEPENDENTS, DEPENDENT_COLUMNS)
            .and_where(Expr::col(col("client_id")).eq(client_id))
            .order_by(col("last_name"), Order::Asc)
            .order_by(col("first_name"), Order::Asc)
            .to_owned();
        let documents = select_from(schema, DOCUMENTS, DOCUMENT_COLUMNS)
            .and_where(Expr::col(col("client_id")).eq(client_id))
            .order_by(col("created_at"), Order::Desc)
            .to_owned();

        Ok(ClientComprehensive {
            dependents: fetch_all(db, &dependents).await?,
            filings: self
                .filings_for_clients(db, schema, vec![client.id.clone()])
                .await?,
            documents: fetch_all(db, &documents).await?,
            client,
        })
    }

    async fn clients_with_filings(
        &self,
        db: &DatabaseConnection,
        schema: &str,
        page: PageRequest,
    ) -> Result<Paginated<ClientWithFilings>, CoreError> {
        let page = page.checked()?;
        let has_filing = || {
            Expr::col(col("id")).in_subquery(
                Query::select()
                    .column(col("client_id"))
                    .from(table_ref(schema, FILINGS))
                    .to_owned(),
            )
        };

        let total = count_rows(db, schema, CLIENTS, Some(has_filing())).await?;
        let query = select_from(schema, CLIENTS, CLIENT_COLUMNS)
            .and_where(has_filing())
            .order_by(col("created_at"), Order::Desc)
            .order_by(col("id"), Order::Asc)
            .limit(page.per_page)
            .offset(page.offset())
            .to_owned();
        let clients: Vec<Client> = fetch_all(db, &query).await?;

        let ids = clients.iter().map(|c| c.id.clone()).collect();
        let mut by_client: HashMap<String, Vec<Filing>> = HashMap::new();
        for filing in self.filings_for_clients(db, schema, ids).await? {
            by_client
                .entry(filing.client_id.clone())
                .or_default()
                .push(filing);
        }

        let items = clients
            .into_iter()
            .map(|client| ClientWithFilings {
                filings: by_client.remove(&client.id).unwrap_or_default(),
                client,
            })
            .collect();

        Ok(Paginated {
            items,
            page: page.page,
            per_page: page.per_page,
            total,
        })
    }

    async fn list_affiliates(
        &self,
        db: &DatabaseConnection,
        schema: &str,
    ) -> Result<Vec<Affiliate>, CoreError> {
        let query = select_from(schema, AFFILIATES, AFFILIATE_COLUMNS)
            .order_by(col("created_at"), Order::Desc)
            .to_owned();
        Ok(fetch_all(db, &query).await?)
    }

    async fn affiliate_by_id(
        &self,
        db: &DatabaseConnection,
        schema: &str,
        affiliate_id: &str,
    ) -> Result<Affiliate, CoreError> {
        let query = select_from(schema, AFFILIATES, AFFILIATE_COLUMNS)
            .and_where(Expr::col(col("id")).eq(affiliate_id))
            .to_owned();
        fetch_optional(db, &query)
            .await?
            .ok_or_else(|| CoreError::not_found("affiliate", affiliate_id))
    }

    async fn create_affiliate(
        &self,
        db: &DatabaseConnection,
        schema: &str,
        affiliate: NewAffiliate,
    ) -> Result<Affiliate, CoreError> {
        let name = require_text(&affiliate.name, "name")?;
        let email = require_text(&affiliate.email, "email")?;
        validate_commission_rate(affiliate.commission_rate)?;

        let id = Uuid::new_v4().to_string();
        let now = Utc::now();
        insert_row(
            db,
            schema,
            AFFILIATES,
            AFFILIATE_COLUMNS,
            vec![
                id.clone().into(),
                name.into(),
                email.into(),
                affiliate.phone.into(),
                affiliate.commission_rate.into(),
                true.into(),
                now.into(),
                now.into(),
            ],
        )
        .await?;

        self.affiliate_by_id(db, schema, &id).await
    }

    async fn update_affiliate(
        &self,
        db: &DatabaseConnection,
        schema: &str,
        affiliate_id: &str,
        update: AffiliateUpdate,
    ) -> Result<Affiliate, CoreError> {
        let mut statement = Query::update();
        statement
            .table(table_ref(schema, AFFILIATES))
            .value(col("updated_at"), Utc::now())
            .and_where(Expr::col(col("id")).eq(affiliate_id));

        if let Some(name) = update.name {
            statement.value(col("name"), require_text(&name, "name")?);
        }
        if let Some(email) = update.email {
            statement.value(col("email"), require_text(&email, "email")?);
        }
        if let Some(phone) = update.phone {
            statement.value(col("phone"), phone);
        }
        if let Some(rate) = update.commission_rate {
            validate_commission_rate(rate)?;
            statement.value(col("commission_rate"), rate);
        }
        if let Some(is_active) = update.is_active {
            statement.value(col("is_active"), is_active);
        }

        if execute_update(db, &statement).await? == 0 {
            return Err(CoreError::not_found("affiliate", affiliate_id));
        }
        self.affiliate_by_id(db, schema, affiliate_id).await
    }

    async fn list_commissions(
        &self,
        db: &DatabaseConnection,
        schema: &str,
        filter: CommissionFilter,
    ) -> Result<Vec<Commission>, CoreError> {
        let mut query = select_from(schema, COMMISSIONS, COMMISSION_COLUMNS);
        if let Some(affiliate_id) = filter.affiliate_id {
            query.and_where(Expr::col(col("affiliate_id")).eq(affiliate_id));
        }
        if let Some(status) = filter.status {
            query.and_where(Expr::col(col("status")).eq(status.as_str()));
        }
        query
            .order_by(col("created_at"), Order::Desc)
            .limit(
                filter
                    .limit
                    .unwrap_or(DEFAULT_COMMISSION_LIMIT)
                    .clamp(1, MAX_COMMISSION_LIMIT),
            );

        fetch_all::<CommissionRow>(db, &query)
            .await?
            .into_iter()
            .map(Commission::try_from)
            .collect()
    }

    async fn approve_commission(
        &self,
        db: &DatabaseConnection,
        schema: &str,
        commission_id: &str,
        now: DateTime<Utc>,
    ) -> Result<Commission, CoreError> {
        self.transition_commission(
            db,
            schema,
            commission_id,
            CommissionStatus::Approved,
            "approved_at",
            now,
        )
        .await
    }

    async fn mark_commission_paid(
        &self,
        db: &DatabaseConnection,
        schema: &str,
        commission_id: &str,
        now: DateTime<Utc>,
    ) -> Result<Commission, CoreError> {
        self.transition_commission(
            db,
            schema,
            commission_id,
            CommissionStatus::Paid,
            "paid_at",
            now,
        )
        .await
    }

    async fn cancel_commission(
        &self,
        db: &DatabaseConnection,
        schema: &str,
        commission_id: &str,
        now: DateTime<Utc>,
    ) -> Result<Commission, CoreError> {
        self.transition_commission(
            db,
            schema,
            commission_id,
            CommissionStatus::Cancelled,
            "cancelled_at",
            now,
        )
        .await
    }

    async fn affiliate_stats(
        &self,
        db: &DatabaseConnection,
        schema: &str,
        affiliate_id: &str,
    ) -> Result<AffiliateStats, CoreError> {
        let affiliate = self.affiliate_by_id(db, schema, affiliate_id).await?;

        let referred_clients = count_rows(
            db,
            schema,
            CLIENTS,
            Some(Expr::col(col("affiliate_id")).eq(affiliate.id.as_str())),
        )
        .await?;

        let query = select_from(schema, COMMISSIONS, &["status", "amount_cents"])
            .and_where(Expr::col(col("affiliate_id")).eq(affiliate.id.as_str()))
            .to_owned();
        let rows: Vec<StatusAmount> = fetch_all(db, &query).await?;

        // Summed as decimals; cent totals can exceed i64.
        let mut totals: HashMap<CommissionStatus, Decimal> = HashMap::new();
        for row in &rows {
            let status: CommissionStatus = row.status.parse()?;
            *totals.entry(status).or_default() += cents_to_decimal(row.amount_cents);
        }
        let amount = |status: CommissionStatus| totals.get(&status).copied().unwrap_or(Decimal::ZERO);

        Ok(AffiliateStats {
            referred_clients,
            commission_count: rows.len() as u64,
            pending_amount: amount(CommissionStatus::Pending),
            approved_amount: amount(CommissionStatus::Approved),
            paid_amount: amount(CommissionStatus::Paid),
            cancelled_amount: amount(CommissionStatus::Cancelled),
            affiliate_id: affiliate.id,
        })
    }

    async fn list_discount_codes(
        &self,
        db: &DatabaseConnection,
        schema: &str,
        filter: DiscountCodeFilter,
    ) -> Result<Vec<DiscountCode>, CoreError> {
        let mut query = select_from(schema, DISCOUNT_CODES, DISCOUNT_CODE_COLUMNS);
        if let Some(affiliate_id) = filter.affiliate_id {
            query.and_where(Expr::col(col("affiliate_id")).eq(affiliate_id));
        }
        if filter.active_only {
            query.and_where(Expr::col(col("is_active")).eq(true));
        }
        query.order_by(col("created_at"), Order::Desc);

        Ok(fetch_all::<DiscountCodeRow>(db, &query)
            .await?
            .into_iter()
            .map(DiscountCode::from)
            .collect())
    }

    async fn discount_code_by_id(
        &self,
        db: &DatabaseConnection,
        schema: &str,
        code_id: &str,
    ) -> Result<DiscountCode, CoreError> {
        let query = select_from(schema, DISCOUNT_CODES, DISCOUNT_CODE_COLUMNS)
            .and_where(Expr::col(col("id")).eq(code_id))
            .to_owned();
        fetch_optional::<DiscountCodeRow>(db, &query)
            .await?
            .map(DiscountCode::from)
            .ok_or_else(|| CoreError::not_found("discount code", code_id))
    }

    async fn discount_code_by_code(
        &self,
        db: &DatabaseConnection,
        schema: &str,
        code: &str,
    ) -> Result<DiscountCode, CoreError> {
        let wanted = require_text(code, "code")?.to_uppercase();
        let query = select_from(schema, DISCOUNT_CODES, DISCOUNT_CODE_COLUMNS)
            .and_where(Expr::expr(Func::upper(Expr::col(col("code")))).eq(wanted.as_str()))
            .to_owned();
        fetch_optional::<DiscountCodeRow>(db, &query)
            .await?
            .map(DiscountCode::from)
            .ok_or_else(|| CoreError::not_found("discount code", wanted))
    }

    async fn create_discount_code(
        &self,
        db: &DatabaseConnection,
        schema: &str,
        code: NewDiscountCode,
    ) -> Result<DiscountCode, CoreError> {
        let normalized = normalize_code(&code.code)?;
        if code.amount_off.is_none() && code.percent_off.is_none() {
            return Err(CoreError::malformed(
                "one of amountOff or percentOff is required",
            ));
        }
        validate_discount_terms(
            code.amount_off,
            code.percent_off,
            code.valid_from,
            code.valid_until,
            code.max_uses,
        )?;
        let amount_off_cents = code.amount_off.map(decimal_to_cents).transpose()?;

        let id = Uuid::new_v4().to_string();
        let now = Utc::now();
        insert_row(
            db,
            schema,
            DISCOUNT_CODES,
            DISCOUNT_CODE_COLUMNS,
            vec![
                id.clone().into(),
                code.affiliate_id.into(),
                normalized.into(),
                amount_off_cents.into(),
                code.percent_off.into(),
                code.valid_from.into(),
                code.valid_until.into(),
                code.max_uses.into(),
                0i32.into(),
                true.into(),
                now.into(),
                now.into(),
            ],
        )
        .await?;

        self.discount_code_by_id(db, schema, &id).await
    }

    async fn update_discount_code(
        &self,
        db: &DatabaseConnection,
        schema: &str,
        code_id: &str,
        update: DiscountCodeUpdate,
    ) -> Result<DiscountCode, CoreError> {
        let current = self.discount_code_by_id(db, schema, code_id).await?;
        validate_discount_terms(
            update.amount_off,
            update.percent_off,
            update.valid_from.or(current.valid_from),
            update.valid_until.or(current.valid_until),
            update.max_uses,
        )?;

        let mut statement = Query::update();
        statement
            .table(table_ref(schema, DISCOUNT_CODES))
            .value(col("updated_at"), Utc::now())
            .and_where(Expr::col(col("id")).eq(code_id));

        if let Some(code) = update.code {
            statement.value(col("code"), normalize_code(&code)?);
        }
        if let Some(amount) = update.amount_off {
            statement.value(col("amount_off_cents"), decimal_to_cents(amount)?);
        }
        if let Some(percent) = update.percent_off {
            statement.value(col("percent_off"), percent);
        }
        if let Some(from) = update.valid_from {
            statement.value(col("valid_from"), from);
        }
        if let Some(until) = update.valid_until {
            statement.value(col("valid_until"), until);
        }
        if let Some(max_uses) = update.max_uses {
            statement.value(col("max_uses"), max_uses);
        }
        if let Some(is_active) = update.is_active {
            statement.value(col("is_active"), is_active);
        }

        if execute_update(db, &statement).await? == 0 {
            return Err(CoreError::not_found("discount code", code_id));
        }
        self.discount_code_by_id(db, schema, code_id).await
    }

    async fn deactivate_discount_code(
        &self,
        db: &DatabaseConnection,
        schema: &str,
        code_id: &str,
    ) -> Result<(), CoreError> {
        let statement = Query::update()
            .table(table_ref(schema, DISCOUNT_CODES))
            .value(col("is_active"), false)
            .value(col("updated_at"), Utc::now())
            .and_where(Expr::col(col("id")).eq(code_id))
            .to_owned();

        if execute_update(db, &statement).await? == 0 {
            return Err(CoreError::not_found("discount code", code_id));
        }
        Ok(())
    }

    async fn create_document(
        &self,
        db: &DatabaseConnection,
        schema: &str,
        document: NewDocument,
    ) -> Result<Document, CoreError> {
        let file_name = require_text(&document.file_name, "fileName")?;
        let storage_path = require_text(&document.storage_path, "storagePath")?;
        if document.size_bytes < 0 {
            return Err(CoreError::malformed("sizeBytes must not be negative"));
        }

        let filing = self.filing_by_id(db, schema, &document.filing_id).await?;
        if filing.client_id != document.client_id {
            return Err(CoreError::malformed(
                "filing does not belong to the given client",
            ));
        }

        let id = Uuid::new_v4().to_string();
        insert_row(
            db,
            schema,
            DOCUMENTS,
            DOCUMENT_COLUMNS,
            vec![
                id.clone().into(),
                filing.id.into(),
                filing.client_id.into(),
                file_name.into(),
                document.content_type.into(),
                storage_path.into(),
                document.size_bytes.into(),
                document.uploaded_by.into(),
                Utc::now().into(),
            ],
        )
        .await?;

        self.document_by_id(db, schema, &id).await
    }

    async fn document_by_id(
        &self,
        db: &DatabaseConnection,
        schema: &str,
        document_id: &str,
    ) -> Result<Document, CoreError> {
        let query = select_from(schema, DOCUMENTS, DOCUMENT_COLUMNS)
            .and_where(Expr::col(col("id")).eq(document_id))
            .to_owned();
        fetch_optional(db, &query)
            .await?
            .ok_or_else(|| CoreError::not_found("document", document_id))
    }

    async fn documents_by_filing(
        &self,
        db: &DatabaseConnection,
        schema: &str,
        filing_id: &str,
    ) -> Result<Vec<Document>, CoreError> {
        let query = select_from(schema, DOCUMENTS, DOCUMENT_COLUMNS)
            .and_where(Expr::col(col("filing_id")).eq(filing_id))
            .order_by(col("created_at"), Order::Asc)
            .to_owned();
        Ok(fetch_all(db, &query).await?)
    }

    async fn delete_document(
        &self,
        db: &DatabaseConnection,
        schema: &str,
        document_id: &str,
    ) -> Result<(), CoreError> {
        let statement = Query::delete()
            .from_table(table_ref(schema, DOCUMENTS))
            .and_where(Expr::col(col("id")).eq(document_id))
            .to_owned();
        let result = db
            .execute(db.get_database_backend().build(&statement))
            .await?;
        if result.rows_affected() == 0 {
            return Err(CoreError::not_found("document", document_id));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use sea_orm::DbBackend;

    #[test]
    fn test_table_references_are_schema_qualified() {
        let query = select_from("acme_tax", CLIENTS, CLIENT_COLUMNS)
            .and_where(Expr::col(col("id")).eq("c1"))
            .to_owned();

        let postgres = DbBackend::Postgres.build(&query);
        assert!(postgres.sql.contains(r#"FROM "acme_tax"."clients""#));
        assert!(postgres.sql.contains("$1"));
        assert!(!postgres.sql.contains("ssn"));

        let sqlite = DbBackend::Sqlite.build(&query);
        assert!(sqlite.sql.contains(r#"FROM "acme_tax"."clients""#));
        assert!(sqlite.sql.contains('?'));
    }

    #[test]
    fn test_hostile_prefix_stays_quoted() {
        let query = select_from(r#"x"; DROP TABLE y; --"#, CLIENTS, CLIENT_COLUMNS);
        let sql = DbBackend::Postgres.build(&query).sql;
        assert!(sql.contains(r#""x""; DROP TABLE y; --"."clients""#));
    }

    #[test]
    fn test_code_normalization() {
        assert_eq!(normalize_code(" spring-25 ").unwrap(), "SPRING-25");
        assert!(normalize_code("").is_err());
        assert!(normalize_code("bad code").is_err());
    }

    #[test]
    fn test_discount_term_validation() {
        let now = Utc::now();
        assert!(validate_discount_terms(Some(dec!(5)), None, None, None, None).is_ok());
        assert!(validate_discount_terms(Some(dec!(0)), None, None, None, None).is_err());
        assert!(validate_discount_terms(None, Some(dec!(101)), None, None, None).is_err());
        assert!(validate_discount_terms(None, None, Some(now), Some(now), None).is_err());
        assert!(validate_discount_terms(None, None, None, None, Some(0)).is_err());
    }

    #[test]
    fn test_commission_rate_bounds() {
        assert!(validate_commission_rate(dec!(0)).is_ok());
        assert!(validate_commission_rate(dec!(0.15)).is_ok());
        assert!(validate_commission_rate(dec!(1)).is_ok());
        assert!(validate_commission_rate(dec!(1.01)).is_err());
        assert!(validate_commission_rate(dec!(-0.01)).is_err());
    }
}
