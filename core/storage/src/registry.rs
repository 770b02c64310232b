//! Remote backend registry for resolving remote replicas from settings.

use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;

use crate::provider::RemoteTree;
use vaultsync_common::{Error, Result};

/// Factory function type for creating remote backends.
pub type RemoteFactory = Box<dyn Fn(Value) -> Result<Arc<dyn RemoteTree>> + Send + Sync>;

/// Registry for remote backend factories.
///
/// Allows settings to name a backend and carry its configuration as an
/// opaque JSON value.
pub struct RemoteRegistry {
    factories: HashMap<String, RemoteFactory>,
}

impl RemoteRegistry {
    /// Create a new empty registry.
    pub fn new() -> Self {
        Self {
            factories: HashMap::new(),
        }
    }

    /// Register a backend factory.
    ///
    /// # Errors
    /// - Returns error if name is already registered
    pub fn register(&mut self, name: impl Into<String>, factory: RemoteFactory) -> Result<()> {
        let name = name.into();
        if self.factories.contains_key(&name) {
            return Err(Error::AlreadyExists(format!(
                "Remote backend '{}' is already registered",
                name
            )));
        }
        self.factories.insert(name, factory);
        Ok(())
    }

    /// Resolve a backend by name and configuration.
    ///
    /// # Errors
    /// - Backend not registered
    /// - Configuration invalid for the backend
    pub fn resolve(&self, name: &str, config: Value) -> Result<Arc<dyn RemoteTree>> {
        let factory = self.factories.get(name).ok_or_else(|| {
            Error::NotFound(format!("Remote backend '{}' is not registered", name))
        })?;
        factory(config)
    }

    /// Get list of registered backend names, sorted.
    pub fn backends(&self) -> Vec<String> {
        let mut names: Vec<String> = self.factories.keys().cloned().collect();
        names.sort();
        names
    }

    /// Check if a backend is registered.
    pub fn has_backend(&self, name: &str) -> bool {
        self.factories.contains_key(name)
    }
}

impl Default for RemoteRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Create a registry with the built-in backends.
pub fn create_default_registry() -> Result<RemoteRegistry> {
    let mut registry = RemoteRegistry::new();

    // Memory backend (for testing)
    registry.register(
        "memory",
        Box::new(|_config| Ok(Arc::new(crate::memory::MemoryRemoteTree::new()))),
    )?;

    // Directory-backed remote
    registry.register(
        "local",
        Box::new(|config| {
            let root = config
                .get("root")
                .and_then(|v| v.as_str())
                .ok_or_else(|| {
                    Error::Config("Remote backend 'local' requires a 'root' path".to_string())
                })?;
            Ok(Arc::new(crate::local::FsRemoteTree::new(root)?))
        }),
    )?;

    Ok(registry)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryRemoteTree;

    #[test]
    fn test_register_and_resolve() {
        let mut registry = RemoteRegistry::new();

        registry
            .register("test", Box::new(|_| Ok(Arc::new(MemoryRemoteTree::new()))))
            .unwrap();

        let remote = registry.resolve("test", Value::Null).unwrap();
        assert_eq!(remote.name(), "memory");
    }

    #[test]
    fn test_duplicate_registration_fails() {
        let mut registry = RemoteRegistry::new();

        registry
            .register("test", Box::new(|_| Ok(Arc::new(MemoryRemoteTree::new()))))
            .unwrap();

        let result = registry.register("test", Box::new(|_| Ok(Arc::new(MemoryRemoteTree::new()))));
        assert!(result.is_err());
    }

    #[test]
    fn test_resolve_unknown_fails() {
        let registry = RemoteRegistry::new();
        assert!(registry.resolve("unknown", Value::Null).is_err());
    }

    #[test]
    fn test_default_registry() {
        let registry = create_default_registry().unwrap();
        assert_eq!(registry.backends(), vec!["local", "memory"]);
        assert!(registry.has_backend("local"));

        let err = registry.resolve("local", Value::Null).err().unwrap();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn test_default_registry_local_backend() {
        let temp = tempfile::TempDir::new().unwrap();
        let registry = create_default_registry().unwrap();
        let config = serde_json::json!({ "root": temp.path().to_string_lossy() });

        let remote = registry.resolve("local", config).unwrap();
        assert_eq!(remote.name(), "local");
    }
}
