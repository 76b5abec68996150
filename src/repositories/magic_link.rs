//! Portal magic-link tokens in the control plane.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use rand::Rng;
use sea_orm::prelude::DateTimeWithTimeZone;
use sea_orm::sea_query::Expr;
use sea_orm::{ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, Set};
use tracing::info;

use crate::error::CoreError;
use crate::models::portal_magic_token::{self, Entity as PortalMagicToken};

const LINK_ID_BYTES: usize = 32;

/// Single-use sign-in links for the client portal.
#[derive(Debug, Clone)]
pub struct MagicLinkRepository {
    db: Arc<DatabaseConnection>,
}

impl MagicLinkRepository {
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }

    /// Create a link for `client_id` valid for `ttl`.
    pub async fn issue(
        &self,
        tenant_id: &str,
        client_id: &str,
        email: &str,
        ttl: Duration,
    ) -> Result<portal_magic_token::Model, CoreError> {
        if email.trim().is_empty() {
            return Err(CoreError::malformed("email is required"));
        }

        let mut bytes = [0u8; LINK_ID_BYTES];
        rand::thread_rng().fill(&mut bytes);
        let link_id = hex::encode(bytes);
        let now = Utc::now();

        let row = portal_magic_token::ActiveModel {
            id: Set(link_id.clone()),
            client_id: Set(client_id.to_string()),
            tenant_id: Set(tenant_id.to_string()),
            email: Set(email.trim().to_string()),
            expires_at: Set((now + ttl).into()),
            used: Set(false),
            used_at: Set(None),
            ip_address: Set(None),
            user_agent: Set(None),
            created_at: Set(now.into()),
        };

        PortalMagicToken::insert(row)
            .exec_without_returning(self.db.as_ref())
            .await?;
        info!(tenant_id, client_id, "portal magic link issued");

        self.find(&link_id)
            .await?
            .ok_or(CoreError::InvalidOrExpiredToken)
    }

    /// Mark a link used. Succeeds once, and only before expiry.
    pub async fn consume(
        &self,
        link_id: &str,
        ip_address: Option<String>,
        user_agent: Option<String>,
        now: DateTime<Utc>,
    ) -> Result<portal_magic_token::Model, CoreError> {
        let stamp = DateTimeWithTimeZone::from(now);
        let result = PortalMagicToken::update_many()
            .col_expr(portal_magic_token::Column::Used, Expr::value(true))
            .col_expr(portal_magic_token::Column::UsedAt, Expr::value(Some(stamp)))
            .col_expr(portal_magic_token::Column::IpAddress, Expr::value(ip_address))
            .col_expr(portal_magic_token::Column::UserAgent, Expr::value(user_agent))
            .filter(portal_magic_token::Column::Id.eq(link_id))
            .filter(portal_magic_token::Column::Used.eq(false))
            .filter(portal_magic_token::Column::ExpiresAt.gt(stamp))
            .exec(self.db.as_ref())
            .await?;

        if result.rows_affected == 0 {
            return Err(CoreError::InvalidOrExpiredToken);
        }

        self.find(link_id)
            .await?
            .ok_or(CoreError::InvalidOrExpiredToken)
    }

    pub async fn find(
        &self,
        link_id: &str,
    ) -> Result<Option<portal_magic_token::Model>, CoreError> {
        Ok(PortalMagicToken::find_by_id(link_id.to_string())
            .one(self.db.as_ref())
            .await?)
    }

    /// Delete links that expired before `now`.
    pub async fn purge_expired(&self, now: DateTime<Utc>) -> Result<u64, CoreError> {
        let result = PortalMagicToken::delete_many()
            .filter(portal_magic_token::Column::ExpiresAt.lt(DateTimeWithTimeZone::from(now)))
            .exec(self.db.as_ref())
            .await?;
        Ok(result.rows_affected)
    }
}
