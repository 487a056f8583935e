// SPDX-FileCopyrightText: 2026 Vispipe Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Plugin registry for processing units and routers.
//!
//! The `PluginRegistry` stores plugin handles keyed by `(kind, name)`. A name is
//! unique per kind; registering the same name again replaces the previous entry.
//! Registration runs the plugin's `initialize` hook first and rejects the plugin
//! if it fails, so a registered plugin is always fully initialized.

use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};

use tokio::sync::Mutex;
use tracing::{debug, info, warn};
use vispipe_core::{PipelineError, PluginKind, ProcessingUnit, Router};

/// A registered plugin, tagged with its kind.
#[derive(Clone)]
pub enum PluginHandle {
    Unit(Arc<dyn ProcessingUnit>),
    Router(Arc<dyn Router>),
}

impl PluginHandle {
    pub fn kind(&self) -> PluginKind {
        match self {
            PluginHandle::Unit(_) => PluginKind::ProcessingUnit,
            PluginHandle::Router(_) => PluginKind::Router,
        }
    }

    pub fn name(&self) -> &str {
        match self {
            PluginHandle::Unit(unit) => unit.name(),
            PluginHandle::Router(router) => router.name(),
        }
    }

    async fn initialize(&self) -> Result<(), PipelineError> {
        match self {
            PluginHandle::Unit(unit) => unit.initialize().await,
            PluginHandle::Router(router) => router.initialize().await,
        }
    }

    fn same_plugin(&self, other: &PluginHandle) -> bool {
        match (self, other) {
            (PluginHandle::Unit(a), PluginHandle::Unit(b)) => Arc::ptr_eq(a, b),
            (PluginHandle::Router(a), PluginHandle::Router(b)) => Arc::ptr_eq(a, b),
            _ => false,
        }
    }
}

impl std::fmt::Debug for PluginHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PluginHandle")
            .field("kind", &self.kind())
            .field("name", &self.name())
            .finish()
    }
}

/// Catalogue of processing units and routers.
///
/// Lookups are synchronous and never wait on registration. Registrations are
/// serialized so that one plugin instance is never initialized twice.
pub struct PluginRegistry {
    entries: RwLock<HashMap<(PluginKind, String), PluginHandle>>,
    registration: Mutex<()>,
}

impl PluginRegistry {
    /// Create a new empty registry.
    pub fn new() -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            registration: Mutex::new(()),
        }
    }

    /// Register a plugin, initializing it first.
    ///
    /// Registering the exact same instance again is a no-op. A different
    /// instance under an existing `(kind, name)` replaces the old one.
    pub async fn register(&self, handle: PluginHandle) -> Result<(), PipelineError> {
        let kind = handle.kind();
        let name = handle.name().to_string();
        if name.trim().is_empty() {
            return Err(PipelineError::Validation(format!(
                "{kind} plugins must have a non-empty name"
            )));
        }

        let _guard = self.registration.lock().await;

        let already_registered = self
            .read()
            .get(&(kind, name.clone()))
            .is_some_and(|existing| existing.same_plugin(&handle));
        if already_registered {
            debug!(%kind, name = %name, "plugin already registered, skipping initialization");
            return Ok(());
        }

        handle
            .initialize()
            .await
            .map_err(|e| PipelineError::PluginInit {
                kind,
                name: name.clone(),
                source: Box::new(e),
            })?;

        let previous = self
            .entries
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert((kind, name.clone()), handle);

        if previous.is_some() {
            warn!(%kind, name = %name, "plugin replaced an existing registration");
        } else {
            info!(%kind, name = %name, "plugin registered");
        }
        Ok(())
    }

    /// Register a processing unit.
    pub async fn register_unit(&self, unit: Arc<dyn ProcessingUnit>) -> Result<(), PipelineError> {
        self.register(PluginHandle::Unit(unit)).await
    }

    /// Register a router.
    pub async fn register_router(&self, router: Arc<dyn Router>) -> Result<(), PipelineError> {
        self.register(PluginHandle::Router(router)).await
    }

    /// Look up a plugin by kind and name.
    pub fn lookup(&self, kind: PluginKind, name: &str) -> Result<PluginHandle, PipelineError> {
        self.read()
            .get(&(kind, name.to_string()))
            .cloned()
            .ok_or_else(|| PipelineError::PluginNotFound {
                kind,
                name: name.to_string(),
            })
    }

    /// Look up a processing unit by name.
    pub fn unit(&self, name: &str) -> Result<Arc<dyn ProcessingUnit>, PipelineError> {
        match self.lookup(PluginKind::ProcessingUnit, name)? {
            PluginHandle::Unit(unit) => Ok(unit),
            PluginHandle::Router(_) => Err(PipelineError::Internal(format!(
                "router stored under unit key `{name}`"
            ))),
        }
    }

    /// Look up a router by name.
    pub fn router(&self, name: &str) -> Result<Arc<dyn Router>, PipelineError> {
        match self.lookup(PluginKind::Router, name)? {
            PluginHandle::Router(router) => Ok(router),
            PluginHandle::Unit(_) => Err(PipelineError::Internal(format!(
                "unit stored under router key `{name}`"
            ))),
        }
    }

    pub fn contains(&self, kind: PluginKind, name: &str) -> bool {
        self.read().contains_key(&(kind, name.to_string()))
    }

    /// List all registered `(kind, name)` pairs, sorted by kind then name.
    pub fn list_all(&self) -> Vec<(PluginKind, String)> {
        let mut keys: Vec<(PluginKind, String)> = self.read().keys().cloned().collect();
        keys.sort_by(|a, b| {
            a.0.to_string()
                .cmp(&b.0.to_string())
                .then_with(|| a.1.cmp(&b.1))
        });
        keys
    }

    /// Returns the number of registered plugins.
    pub fn len(&self) -> usize {
        self.read().len()
    }

    /// Returns true if no plugins are registered.
    pub fn is_empty(&self) -> bool {
        self.read().is_empty()
    }

    fn read(
        &self,
    ) -> std::sync::RwLockReadGuard<'_, HashMap<(PluginKind, String), PluginHandle>> {
        self.entries.read().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Default for PluginRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;
    use vispipe_core::{ExecutionContext, NodeId, Params, Payload, PipelineHandle};

    use super::*;

    struct CountingUnit {
        name: &'static str,
        init_calls: AtomicUsize,
        fail_init: bool,
    }

    impl CountingUnit {
        fn new(name: &'static str) -> Self {
            Self {
                name,
                init_calls: AtomicUsize::new(0),
                fail_init: false,
            }
        }
    }

    #[async_trait]
    impl ProcessingUnit for CountingUnit {
        fn name(&self) -> &str {
            self.name
        }

        async fn initialize(&self) -> Result<(), PipelineError> {
            self.init_calls.fetch_add(1, Ordering::SeqCst);
            if self.fail_init {
                return Err(PipelineError::unit(self.name, "model file missing"));
            }
            Ok(())
        }

        async fn execute(
            &self,
            payload: Payload,
            _context: &mut ExecutionContext,
            _handle: Arc<dyn PipelineHandle>,
        ) -> Result<Payload, PipelineError> {
            Ok(payload)
        }
    }

    struct EndRouter;

    #[async_trait]
    impl Router for EndRouter {
        fn name(&self) -> &str {
            "End"
        }

        async fn next_node(
            &self,
            _output: &Payload,
            _context: &mut ExecutionContext,
            _handle: &dyn PipelineHandle,
            _params: &Params,
        ) -> Result<Option<NodeId>, PipelineError> {
            Ok(None)
        }
    }

    #[tokio::test]
    async fn register_and_lookup_roundtrip() {
        let registry = PluginRegistry::new();
        registry
            .register_unit(Arc::new(CountingUnit::new("Vectorize")))
            .await
            .unwrap();
        registry.register_router(Arc::new(EndRouter)).await.unwrap();

        assert_eq!(registry.unit("Vectorize").unwrap().name(), "Vectorize");
        assert_eq!(registry.router("End").unwrap().name(), "End");
        assert_eq!(registry.len(), 2);
    }

    #[tokio::test]
    async fn names_are_scoped_per_kind() {
        let registry = PluginRegistry::new();
        registry.register_router(Arc::new(EndRouter)).await.unwrap();

        let err = registry.unit("End").err().unwrap();
        assert!(matches!(
            err,
            PipelineError::PluginNotFound {
                kind: PluginKind::ProcessingUnit,
                ..
            }
        ));
        assert!(registry.contains(PluginKind::Router, "End"));
        assert!(!registry.contains(PluginKind::ProcessingUnit, "End"));
    }

    #[tokio::test]
    async fn initialize_runs_once_per_instance() {
        let registry = PluginRegistry::new();
        let unit = Arc::new(CountingUnit::new("Detect"));

        registry.register_unit(unit.clone()).await.unwrap();
        registry.register_unit(unit.clone()).await.unwrap();
        registry.unit("Detect").unwrap();
        registry.unit("Detect").unwrap();

        assert_eq!(unit.init_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn reregistration_is_last_wins() {
        let registry = PluginRegistry::new();
        let first = Arc::new(CountingUnit::new("Detect"));
        let second = Arc::new(CountingUnit::new("Detect"));

        registry.register_unit(first.clone()).await.unwrap();
        registry.register_unit(second.clone()).await.unwrap();

        let current = registry.unit("Detect").unwrap();
        let second_dyn: Arc<dyn ProcessingUnit> = second.clone();
        assert!(Arc::ptr_eq(&current, &second_dyn));
        assert_eq!(second.init_calls.load(Ordering::SeqCst), 1);
        assert_eq!(registry.len(), 1);
    }

    #[tokio::test]
    async fn failed_initialization_rejects_registration() {
        let registry = PluginRegistry::new();
        let unit = CountingUnit {
            fail_init: true,
            ..CountingUnit::new("Broken")
        };

        let err = registry.register_unit(Arc::new(unit)).await.unwrap_err();
        assert!(matches!(err, PipelineError::PluginInit { .. }));
        assert!(err.to_string().contains("model file missing"));
        assert!(registry.is_empty());
    }

    #[tokio::test]
    async fn failed_replacement_keeps_previous_entry() {
        let registry = PluginRegistry::new();
        registry
            .register_unit(Arc::new(CountingUnit::new("Detect")))
            .await
            .unwrap();
        let broken = CountingUnit {
            fail_init: true,
            ..CountingUnit::new("Detect")
        };

        assert!(registry.register_unit(Arc::new(broken)).await.is_err());
        assert!(registry.unit("Detect").is_ok());
    }

    #[tokio::test]
    async fn list_all_is_sorted() {
        let registry = PluginRegistry::new();
        registry
            .register_unit(Arc::new(CountingUnit::new("Zeta")))
            .await
            .unwrap();
        registry
            .register_unit(Arc::new(CountingUnit::new("Alpha")))
            .await
            .unwrap();
        registry.register_router(Arc::new(EndRouter)).await.unwrap();

        let all = registry.list_all();
        assert_eq!(
            all,
            vec![
                (PluginKind::Router, "End".to_string()),
                (PluginKind::ProcessingUnit, "Alpha".to_string()),
                (PluginKind::ProcessingUnit, "Zeta".to_string()),
            ]
        );
    }

    #[tokio::test]
    async fn empty_name_is_rejected() {
        let registry = PluginRegistry::new();
        let err = registry
            .register_unit(Arc::new(CountingUnit::new("  ")))
            .await
            .unwrap_err();
        assert!(matches!(err, PipelineError::Validation(_)));
    }

    #[test]
    fn lookup_missing_plugin_is_not_found() {
        let registry = PluginRegistry::new();
        let err = registry.lookup(PluginKind::Router, "GoToNode").unwrap_err();
        assert_eq!(err.to_string(), "plugin not found: router/GoToNode");
    }
}
