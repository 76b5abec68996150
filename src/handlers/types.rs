//! # Common API Types
//!
//! Request extractors, response wrappers and query types shared across
//! handlers.

use axum::{
    Json,
    extract::{FromRequest, Request},
};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};

use crate::adapters::{Affiliate, AffiliateStats, Commission, DiscountCode};
use crate::error::ApiError;

/// JSON body extractor whose rejections render as problem+json 400s.
#[derive(Debug, Clone, Copy, Default)]
pub struct ApiJson<T>(pub T);

impl<S, T> FromRequest<S> for ApiJson<T>
where
    T: DeserializeOwned,
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let Json(value) = Json::<T>::from_request(req, state).await?;
        Ok(Self(value))
    }
}

/// Wrapper for unpaginated list endpoints
#[derive(Debug, Serialize, ToSchema)]
pub struct ListResponse<T> {
    /// Items in the list
    pub data: Vec<T>,
    /// Number of items returned
    pub count: usize,
}

impl<T> ListResponse<T> {
    pub fn new(data: Vec<T>) -> Self {
        Self {
            count: data.len(),
            data,
        }
    }
}

/// `?token=` credential of the public affiliate routes
#[derive(Debug, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct TokenQuery {
    /// Plaintext affiliate token
    pub token: String,
}

/// Everything an affiliate sees on their dashboard
#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct AffiliateDashboard {
    pub affiliate: Affiliate,
    pub stats: AffiliateStats,
    /// Most recent commissions, newest first
    pub recent_commissions: Vec<Commission>,
}

/// Discount code looked up by its code, with validity at request time
#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct DiscountCodeLookup {
    pub discount_code: DiscountCode,
    pub valid_now: bool,
}
