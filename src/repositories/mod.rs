//! # Repository Layer
//!
//! SeaORM access to the control-plane tables: tenant connection records, the
//! audit log and portal magic links.

pub mod audit_log;
pub mod magic_link;
pub mod tenant_connection;

pub use audit_log::DbAuditSink;
pub use magic_link::MagicLinkRepository;
pub use tenant_connection::{
    NewTenantConnection, SealReport, TenantConnectionRecord, TenantConnectionUpdate,
    TenantRegistry, TenantSource, TenantSummary,
};
