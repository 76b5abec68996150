//! # Audit Trail
//!
//! Access records for protected tenant data. Writes are best-effort: a failed
//! audit insert is logged and counted but never fails the operation it
//! describes.

use std::collections::BTreeMap;

use async_trait::async_trait;
use metrics::counter;
use serde::{Deserialize, Serialize};
use tracing::error;
use uuid::Uuid;

use crate::error::CoreError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AuditAction {
    View,
    Edit,
    Delete,
    Download,
    Upload,
    Create,
    Export,
}

impl AuditAction {
    pub fn as_str(self) -> &'static str {
        match self {
            AuditAction::View => "VIEW",
            AuditAction::Edit => "EDIT",
            AuditAction::Delete => "DELETE",
            AuditAction::Download => "DOWNLOAD",
            AuditAction::Upload => "UPLOAD",
            AuditAction::Create => "CREATE",
            AuditAction::Export => "EXPORT",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ResourceKind {
    Client,
    Filing,
    Document,
    Ssn,
    Spouse,
    Dependent,
}

impl ResourceKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ResourceKind::Client => "CLIENT",
            ResourceKind::Filing => "FILING",
            ResourceKind::Document => "DOCUMENT",
            ResourceKind::Ssn => "SSN",
            ResourceKind::Spouse => "SPOUSE",
            ResourceKind::Dependent => "DEPENDENT",
        }
    }
}

/// Request envelope plus free-form extras, stored as a JSON string.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AuditDetails {
    pub method: String,
    pub path: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub query: Option<String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub extra: BTreeMap<String, serde_json::Value>,
}

impl AuditDetails {
    pub fn new(method: impl Into<String>, path: impl Into<String>, query: Option<String>) -> Self {
        Self {
            method: method.into(),
            path: path.into(),
            query: query.filter(|q| !q.is_empty()),
            extra: BTreeMap::new(),
        }
    }

    pub fn with(mut self, key: impl Into<String>, value: impl Into<serde_json::Value>) -> Self {
        self.extra.insert(key.into(), value.into());
        self
    }

    /// Persisted form. Falls back to an empty object if serialization fails.
    pub fn to_json_string(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|_| "{}".to_string())
    }
}

/// One audit record before persistence.
#[derive(Debug, Clone, PartialEq)]
pub struct AuditEntry {
    pub actor_id: Uuid,
    pub tenant_id: String,
    pub client_id: Option<String>,
    pub action: AuditAction,
    pub resource_kind: ResourceKind,
    pub resource_id: Option<String>,
    pub details: AuditDetails,
    pub remote_addr: Option<String>,
    pub user_agent: Option<String>,
}

impl AuditEntry {
    pub fn new(
        actor_id: Uuid,
        tenant_id: impl Into<String>,
        action: AuditAction,
        resource_kind: ResourceKind,
    ) -> Self {
        Self {
            actor_id,
            tenant_id: tenant_id.into(),
            client_id: None,
            action,
            resource_kind,
            resource_id: None,
            details: AuditDetails::default(),
            remote_addr: None,
            user_agent: None,
        }
    }

    pub fn client(mut self, client_id: impl Into<String>) -> Self {
        self.client_id = Some(client_id.into());
        self
    }

    pub fn resource(mut self, resource_id: impl Into<String>) -> Self {
        self.resource_id = Some(resource_id.into());
        self
    }

    pub fn details(mut self, details: AuditDetails) -> Self {
        self.details = details;
        self
    }

    pub fn origin(mut self, remote_addr: Option<String>, user_agent: Option<String>) -> Self {
        self.remote_addr = remote_addr;
        self.user_agent = user_agent;
        self
    }
}

/// Append-only destination for audit records.
#[async_trait]
pub trait AuditSink: Send + Sync {
    async fn record(&self, entry: AuditEntry) -> Result<(), CoreError>;
}

/// Record `entry`, swallowing and counting any failure.
pub async fn record_best_effort(sink: &dyn AuditSink, entry: AuditEntry) {
    let tenant_id = entry.tenant_id.clone();
    let action = entry.action;
    let resource_kind = entry.resource_kind;

    if let Err(e) = sink.record(entry).await {
        counter!("audit_write_failures_total").increment(1);
        error!(
            tenant_id = %tenant_id,
            action = action.as_str(),
            resource_kind = resource_kind.as_str(),
            error = %e,
            "audit write failed"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct FailingSink(AtomicUsize);

    #[async_trait]
    impl AuditSink for FailingSink {
        async fn record(&self, _entry: AuditEntry) -> Result<(), CoreError> {
            self.0.fetch_add(1, Ordering::SeqCst);
            Err(CoreError::Database(sea_orm::DbErr::Custom(
                "audit_log unavailable".to_string(),
            )))
        }
    }

    #[derive(Default)]
    struct CapturingSink(Mutex<Vec<AuditEntry>>);

    #[async_trait]
    impl AuditSink for CapturingSink {
        async fn record(&self, entry: AuditEntry) -> Result<(), CoreError> {
            self.0.lock().unwrap().push(entry);
            Ok(())
        }
    }

    #[test]
    fn test_details_serialize_envelope_and_extras() {
        let details = AuditDetails::new("GET", "/api/v1/tenants/acme/clients/c1", None)
            .with("fields", serde_json::json!(["ssn"]));
        let json: serde_json::Value = serde_json::from_str(&details.to_json_string()).unwrap();
        assert_eq!(json["method"], "GET");
        assert_eq!(json["path"], "/api/v1/tenants/acme/clients/c1");
        assert!(json.get("query").is_none());
        assert_eq!(json["extra"]["fields"][0], "ssn");
    }

    #[test]
    fn test_empty_query_is_dropped() {
        let details = AuditDetails::new("GET", "/x", Some(String::new()));
        assert_eq!(details.query, None);
    }

    #[test]
    fn test_enum_spellings() {
        assert_eq!(AuditAction::Download.as_str(), "DOWNLOAD");
        assert_eq!(ResourceKind::Ssn.as_str(), "SSN");
        assert_eq!(
            serde_json::to_string(&ResourceKind::Dependent).unwrap(),
            "\"DEPENDENT\""
        );
    }

    #[tokio::test]
    async fn test_best_effort_swallows_failures() {
        let sink = FailingSink(AtomicUsize::new(0));
        let entry = AuditEntry::new(Uuid::new_v4(), "acme", AuditAction::View, ResourceKind::Client);
        record_best_effort(&sink, entry).await;
        assert_eq!(sink.0.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_best_effort_records_once() {
        let sink = CapturingSink::default();
        let actor = Uuid::new_v4();
        let entry = AuditEntry::new(actor, "acme", AuditAction::Delete, ResourceKind::Document)
            .client("c1")
            .resource("d1")
            .origin(Some("10.0.0.1".to_string()), Some("curl/8".to_string()));
        record_best_effort(&sink, entry).await;

        let recorded = sink.0.lock().unwrap();
        assert_eq!(recorded.len(), 1);
        assert_eq!(recorded[0].actor_id, actor);
        assert_eq!(recorded[0].resource_id.as_deref(), Some("d1"));
    }
}
