//! Adapter registry
//!
//! Explicitly constructed mapping from adapter kind to implementation. It
//! holds adapters only, never tenant handles.

use std::collections::HashMap;
use std::sync::Arc;

use tracing::warn;

use crate::adapters::{AdapterKind, SchemaAdapter, StandardAdapter};
use crate::error::CoreError;

#[derive(Clone)]
pub struct AdapterRegistry {
    adapters: HashMap<AdapterKind, Arc<dyn SchemaAdapter>>,
    default_kind: AdapterKind,
}

impl std::fmt::Debug for AdapterRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut kinds: Vec<_> = self.adapters.keys().map(|k| k.as_str()).collect();
        kinds.sort_unstable();
        f.debug_struct("AdapterRegistry")
            .field("kinds", &kinds)
            .field("default_kind", &self.default_kind)
            .finish()
    }
}

impl AdapterRegistry {
    /// Empty registry with `default_kind` as the fallback
    pub fn new(default_kind: AdapterKind) -> Self {
        Self {
            adapters: HashMap::new(),
            default_kind,
        }
    }

    /// Registry with every built-in adapter registered
    pub fn with_builtin() -> Self {
        let mut registry = Self::new(AdapterKind::Standard);
        registry.register(Arc::new(StandardAdapter));
        registry
    }

    pub fn register(&mut self, adapter: Arc<dyn SchemaAdapter>) {
        self.adapters.insert(adapter.kind(), adapter);
    }

    /// Adapter for a stored kind string.
    ///
    /// Unknown or empty kinds fall back to the default kind. Fails with
    /// [`CoreError::AdapterUnavailable`] only when the default itself is not
    /// registered.
    pub fn for_kind(&self, kind: &str) -> Result<Arc<dyn SchemaAdapter>, CoreError> {
        let resolved = match kind.parse::<AdapterKind>() {
            Ok(kind) if self.adapters.contains_key(&kind) => kind,
            _ => {
                if !kind.trim().is_empty() {
                    warn!(
                        adapter_kind = %kind,
                        default_kind = %self.default_kind,
                        "unknown adapter kind; using default"
                    );
                }
                self.default_kind
            }
        };

        self.get(resolved)
    }

    /// Strict lookup with no fallback
    pub fn get(&self, kind: AdapterKind) -> Result<Arc<dyn SchemaAdapter>, CoreError> {
        self.adapters
            .get(&kind)
            .cloned()
            .ok_or_else(|| CoreError::AdapterUnavailable(kind.as_str().to_string()))
    }

    pub fn default_kind(&self) -> AdapterKind {
        self.default_kind
    }
}

impl Default for AdapterRegistry {
    fn default() -> Self {
        Self::with_builtin()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_known_kind_resolves() {
        let registry = AdapterRegistry::with_builtin();
        let adapter = registry.for_kind("standard").unwrap();
        assert_eq!(adapter.kind(), AdapterKind::Standard);
        let adapter = registry.for_kind("STANDARD").unwrap();
        assert_eq!(adapter.kind(), AdapterKind::Standard);
    }

    #[test]
    fn test_unknown_kind_falls_back_to_default() {
        let registry = AdapterRegistry::with_builtin();
        assert_eq!(
            registry.for_kind("legacy-platform").unwrap().kind(),
            AdapterKind::Standard
        );
        assert_eq!(registry.for_kind("").unwrap().kind(), AdapterKind::Standard);
    }

    #[test]
    fn test_missing_default_is_unavailable() {
        let registry = AdapterRegistry::new(AdapterKind::Standard);
        assert!(matches!(
            registry.for_kind("standard"),
            Err(CoreError::AdapterUnavailable(_))
        ));
        assert!(matches!(
            registry.get(AdapterKind::Standard),
            Err(CoreError::AdapterUnavailable(_))
        ));
    }
}
