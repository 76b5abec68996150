//! # Taxdesk
//!
//! Tenant routing and connection core for a multi-tenant tax practice
//! service: the control-plane tenant registry, a per-tenant connection cache,
//! schema adapters over tenant databases, affiliate tokens, and the audit
//! trail, served through a thin axum API.

pub mod adapters;
pub mod affiliate_tokens;
pub mod audit;
pub mod auth;
pub mod config;
pub mod context;
pub mod db;
pub mod error;
pub mod handlers;
pub mod models;
pub mod portal;
pub mod repositories;
pub mod secret_box;
pub mod secrets;
pub mod server;
pub mod telemetry;
pub mod tenant_cache;
pub use migration;
