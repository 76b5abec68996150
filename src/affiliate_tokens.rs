//! # Affiliate Portal Tokens
//!
//! Bearer tokens that let an affiliate read their own dashboard without an
//! account. Tokens live in the tenant's `affiliate_tokens` table and only the
//! SHA-256 digest of the plaintext is stored; the plaintext is returned once,
//! from [`AffiliateTokens::generate`].

use chrono::{DateTime, Utc};
use metrics::counter;
use rand::Rng;
use sea_orm::sea_query::{Alias, Condition, Expr, Order, Query};
use sea_orm::{ConnectionTrait, DatabaseConnection, FromQueryResult};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;
use tracing::{debug, info};
use utoipa::ToSchema;
use uuid::Uuid;
use zeroize::Zeroize;

use crate::error::CoreError;

const TABLE: &str = "affiliate_tokens";
const TOKEN_BYTES: usize = 32;

const TOKEN_COLUMNS: &[&str] = &[
    "id",
    "affiliate_id",
    "expires_at",
    "last_used_at",
    "is_active",
    "notes",
    "created_at",
];

/// Stored token metadata. Neither the plaintext nor the digest is exposed.
#[derive(Debug, Clone, PartialEq, Serialize, FromQueryResult, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct AffiliateToken {
    pub id: String,
    pub affiliate_id: String,
    pub expires_at: Option<DateTime<Utc>>,
    pub last_used_at: Option<DateTime<Utc>>,
    pub is_active: bool,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Admin request body for token generation.
#[derive(Debug, Clone, Default, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct GenerateTokenRequest {
    #[serde(default)]
    pub expires_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub notes: Option<String>,
}

/// Result of [`AffiliateTokens::generate`]; the only place the plaintext appears.
#[derive(Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct IssuedToken {
    pub token: String,
    pub record: AffiliateToken,
}

impl std::fmt::Debug for IssuedToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IssuedToken")
            .field("token", &"[REDACTED]")
            .field("record", &self.record)
            .finish()
    }
}

/// Hex SHA-256 digest of a plaintext token.
pub fn hash_token(plaintext: &str) -> String {
    hex::encode(Sha256::digest(plaintext.as_bytes()))
}

#[derive(Debug, FromQueryResult)]
struct TouchedToken {
    affiliate_id: String,
    token_hash: String,
}

/// Token operations against one tenant schema.
#[derive(Debug, Clone, Copy)]
pub struct AffiliateTokens<'a> {
    db: &'a DatabaseConnection,
    schema: &'a str,
}

impl<'a> AffiliateTokens<'a> {
    pub fn new(db: &'a DatabaseConnection, schema: &'a str) -> Self {
        Self { db, schema }
    }

    fn table(&self) -> (Alias, Alias) {
        (Alias::new(self.schema), Alias::new(TABLE))
    }

    /// Mint a token for `affiliate_id`.
    pub async fn generate(
        &self,
        affiliate_id: &str,
        expires_at: Option<DateTime<Utc>>,
        notes: Option<String>,
    ) -> Result<IssuedToken, CoreError> {
        if affiliate_id.trim().is_empty() {
            return Err(CoreError::malformed("affiliate id is required"));
        }

        let mut bytes = [0u8; TOKEN_BYTES];
        rand::thread_rng().fill(&mut bytes);
        let token = hex::encode(bytes);
        bytes.zeroize();

        let id = Uuid::new_v4().to_string();
        let now = Utc::now();
        let mut insert = Query::insert();
        insert
            .into_table(self.table())
            .columns(
                [
                    "id",
                    "affiliate_id",
                    "token_hash",
                    "expires_at",
                    "is_active",
                    "notes",
                    "created_at",
                ]
                .map(Alias::new),
            );
        insert
            .values([
                id.clone().into(),
                affiliate_id.into(),
                hash_token(&token).into(),
                expires_at.into(),
                true.into(),
                notes.into(),
                now.into(),
            ])
            .map_err(|e| sea_orm::DbErr::Custom(format!("invalid token insert: {e}")))?;
        self.db
            .execute(self.db.get_database_backend().build(&insert))
            .await?;

        info!(token_id = %id, affiliate_id, "affiliate token generated");
        let record = self.get(&id).await?;
        Ok(IssuedToken { token, record })
    }

    /// Affiliate id for a valid token, stamping `last_used_at` in the same
    /// statement that checks validity.
    pub async fn validate(&self, plaintext: &str) -> Result<String, CoreError> {
        let plaintext = plaintext.trim();
        if plaintext.is_empty() {
            counter!("affiliate_token_validations_total", "outcome" => "empty").increment(1);
            return Err(CoreError::InvalidOrExpiredToken);
        }

        let digest = hash_token(plaintext);
        let now = Utc::now();
        let update = Query::update()
            .table(self.table())
            .value(Alias::new("last_used_at"), now)
            .cond_where(
                Condition::all()
                    .add(Expr::col(Alias::new("token_hash")).eq(digest.as_str()))
                    .add(Expr::col(Alias::new("is_active")).eq(true))
                    .add(
                        Condition::any()
                            .add(Expr::col(Alias::new("expires_at")).is_null())
                            .add(Expr::col(Alias::new("expires_at")).gt(now)),
                    ),
            )
            .returning(
                Query::returning().columns([Alias::new("affiliate_id"), Alias::new("token_hash")]),
            )
            .to_owned();

        let rows = TouchedToken::find_by_statement(self.db.get_database_backend().build(&update))
            .all(self.db)
            .await?;

        let matched = rows
            .into_iter()
            .find(|row| bool::from(row.token_hash.as_bytes().ct_eq(digest.as_bytes())));

        match matched {
            Some(row) => {
                counter!("affiliate_token_validations_total", "outcome" => "accepted")
                    .increment(1);
                Ok(row.affiliate_id)
            }
            None => {
                counter!("affiliate_token_validations_total", "outcome" => "rejected")
                    .increment(1);
                debug!("affiliate token rejected");
                Err(CoreError::InvalidOrExpiredToken)
            }
        }
    }

    /// Deactivate a token. Revoking twice is not an error.
    pub async fn revoke(&self, token_id: &str) -> Result<(), CoreError> {
        let update = Query::update()
            .table(self.table())
            .value(Alias::new("is_active"), false)
            .and_where(Expr::col(Alias::new("id")).eq(token_id))
            .to_owned();

        let result = self
            .db
            .execute(self.db.get_database_backend().build(&update))
            .await?;
        if result.rows_affected() == 0 {
            return Err(CoreError::TokenNotFound(token_id.to_string()));
        }

        info!(token_id, "affiliate token revoked");
        Ok(())
    }

    /// Hard-delete tokens whose expiry is before `now`.
    pub async fn sweep_expired(&self, now: DateTime<Utc>) -> Result<u64, CoreError> {
        let delete = Query::delete()
            .from_table(self.table())
            .and_where(Expr::col(Alias::new("expires_at")).is_not_null())
            .and_where(Expr::col(Alias::new("expires_at")).lt(now))
            .to_owned();

        let removed = self
            .db
            .execute(self.db.get_database_backend().build(&delete))
            .await?
            .rows_affected();
        if removed > 0 {
            info!(removed, schema = self.schema, "expired affiliate tokens removed");
        }
        Ok(removed)
    }

    pub async fn get(&self, token_id: &str) -> Result<AffiliateToken, CoreError> {
        let query = Query::select()
            .columns(TOKEN_COLUMNS.iter().copied().map(Alias::new))
            .from(self.table())
            .and_where(Expr::col(Alias::new("id")).eq(token_id))
            .to_owned();

        AffiliateToken::find_by_statement(self.db.get_database_backend().build(&query))
            .one(self.db)
            .await?
            .ok_or_else(|| CoreError::TokenNotFound(token_id.to_string()))
    }

    /// Tokens issued to `affiliate_id`, newest first.
    pub async fn list_for_affiliate(
        &self,
        affiliate_id: &str,
    ) -> Result<Vec<AffiliateToken>, CoreError> {
        let query = Query::select()
            .columns(TOKEN_COLUMNS.iter().copied().map(Alias::new))
            .from(self.table())
            .and_where(Expr::col(Alias::new("affiliate_id")).eq(affiliate_id))
            .order_by(Alias::new("created_at"), Order::Desc)
            .to_owned();

        Ok(
            AffiliateToken::find_by_statement(self.db.get_database_backend().build(&query))
                .all(self.db)
                .await?,
        )
    }
}
