//! Capability registry: resolves module and action ids to handlers.
//!
//! Features register a [`ModuleDescriptor`] at mount time and unregister it
//! at unmount. An external controller discovers what is registered and
//! invokes actions and queries by string id. Every expected failure
//! (unknown module, unknown action, handler error or panic) comes back as
//! an [`InvocationResult::Failure`], never as a panic or `Err`.

use std::collections::HashSet;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures::FutureExt;
use indexmap::IndexMap;
use parking_lot::{Mutex, RwLock};
use serde_json::Value;

use super::capability::{CapabilityDiscovery, GuideAction, ModuleDescriptor, QueryFn};
use super::elements::{self, ElementSource, GuideElement};
use crate::error::{panic_message, GuideError};
use crate::types::{ActionResult, InvocationResult, QueryResult};

/// Reported when an action panics with a payload that is not a string.
pub const ACTION_FALLBACK_ERROR: &str = "Action execution failed";

/// Reported when a query panics with a payload that is not a string.
pub const QUERY_FALLBACK_ERROR: &str = "Query execution failed";

type InFlightSet = Mutex<HashSet<(String, String)>>;

/// Registry of feature modules and their capabilities.
///
/// Modules are kept in registration order. Lookups hand out `Arc` clones so
/// no lock is held while a handler runs.
pub struct CapabilityRegistry {
    /// Registered modules indexed by id.
    modules: RwLock<IndexMap<String, Arc<ModuleDescriptor>>>,

    /// When set, at most one call per (module, action) may be in flight.
    single_flight: bool,

    /// (module, action) pairs currently executing; only used in single-flight mode.
    in_flight: InFlightSet,

    /// Where `discover_elements` scans for tagged nodes.
    element_source: RwLock<Option<Arc<dyn ElementSource>>>,
}

impl Default for CapabilityRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for CapabilityRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CapabilityRegistry")
            .field("modules", &self.module_ids())
            .field("single_flight", &self.single_flight)
            .finish_non_exhaustive()
    }
}

impl CapabilityRegistry {
    /// Create an empty registry with unbounded action concurrency.
    pub fn new() -> Self {
        Self {
            modules: RwLock::new(IndexMap::new()),
            single_flight: false,
            in_flight: Mutex::new(HashSet::new()),
            element_source: RwLock::new(None),
        }
    }

    /// Reject overlapping calls of the same action instead of running them
    /// concurrently.
    pub fn with_single_flight(mut self, enabled: bool) -> Self {
        self.single_flight = enabled;
        self
    }

    /// Attach the document `discover_elements` scans.
    pub fn with_element_source(self, source: Arc<dyn ElementSource>) -> Self {
        self.set_element_source(source);
        self
    }

    /// Replace the document `discover_elements` scans.
    pub fn set_element_source(&self, source: Arc<dyn ElementSource>) {
        *self.element_source.write() = Some(source);
    }

    // -----------------------------------------------------------------------
    // Registration
    // -----------------------------------------------------------------------

    /// Register a module. A module already registered under the same id is
    /// replaced (last writer wins) and returned.
    pub fn register(&self, module: ModuleDescriptor) -> Option<Arc<ModuleDescriptor>> {
        let id = module.id.clone();
        let previous = self.modules.write().insert(id.clone(), Arc::new(module));
        if previous.is_some() {
            log::warn!(
                "[GuideRegistry] Module \"{}\" is already registered. Overwriting.",
                id
            );
        } else {
            log::debug!("[GuideRegistry] Registered module \"{}\"", id);
        }
        previous
    }

    /// Remove a module. Unknown ids are ignored.
    pub fn unregister(&self, module_id: &str) -> Option<Arc<ModuleDescriptor>> {
        let removed = self.modules.write().shift_remove(module_id);
        if removed.is_some() {
            log::debug!("[GuideRegistry] Unregistered module \"{}\"", module_id);
        }
        removed
    }

    // -----------------------------------------------------------------------
    // Accessors
    // -----------------------------------------------------------------------

    /// All registered modules, in registration order.
    pub fn get_modules(&self) -> Vec<Arc<ModuleDescriptor>> {
        self.modules.read().values().cloned().collect()
    }

    pub fn get_module(&self, module_id: &str) -> Option<Arc<ModuleDescriptor>> {
        self.modules.read().get(module_id).cloned()
    }

    pub fn module_ids(&self) -> Vec<String> {
        self.modules.read().keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.modules.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.modules.read().is_empty()
    }

    /// The full action/query catalogue of every registered module.
    pub fn discover_capabilities(&self) -> Vec<CapabilityDiscovery> {
        self.modules
            .read()
            .values()
            .map(|m| CapabilityDiscovery::from(m.as_ref()))
            .collect()
    }

    // -----------------------------------------------------------------------
    // Invocation
    // -----------------------------------------------------------------------

    /// Run an action and wait for it.
    ///
    /// The handler runs without any registry lock held, so it may call back
    /// into the registry.
    pub async fn execute_action(
        &self,
        module_id: &str,
        action_id: &str,
        input: Option<Value>,
    ) -> ActionResult {
        let handler = match self.lookup_action(module_id, action_id) {
            Ok(handler) => handler,
            Err(error) => return InvocationResult::Failure(error),
        };

        let _guard = if self.single_flight {
            match InFlightGuard::acquire(&self.in_flight, module_id, action_id) {
                Some(guard) => Some(guard),
                None => {
                    log::warn!(
                        "[GuideRegistry] Rejected overlapping call of \"{}\" in \"{}\"",
                        action_id,
                        module_id
                    );
                    return InvocationResult::Failure(format!(
                        "Action \"{}\" in module \"{}\" is already running",
                        action_id, module_id
                    ));
                }
            }
        } else {
            None
        };

        match AssertUnwindSafe(handler.execute(input)).catch_unwind().await {
            Ok(Ok(data)) => InvocationResult::Success(data),
            Ok(Err(err)) => {
                log::error!(
                    "[GuideRegistry] Action \"{}\" in \"{}\" failed: {}",
                    action_id,
                    module_id,
                    err
                );
                InvocationResult::Failure(err.to_string())
            }
            Err(payload) => {
                let message = panic_message(payload.as_ref())
                    .unwrap_or_else(|| ACTION_FALLBACK_ERROR.to_string());
                log::error!(
                    "[GuideRegistry] Action \"{}\" in \"{}\" panicked: {}",
                    action_id,
                    module_id,
                    message
                );
                InvocationResult::Failure(message)
            }
        }
    }

    /// Run a query synchronously.
    pub fn execute_query(&self, module_id: &str, query_id: &str) -> QueryResult {
        let handler = match self.lookup_query(module_id, query_id) {
            Ok(handler) => handler,
            Err(error) => return InvocationResult::Failure(error),
        };

        match std::panic::catch_unwind(AssertUnwindSafe(|| handler())) {
            Ok(Ok(data)) => InvocationResult::Success(data),
            Ok(Err(err)) => InvocationResult::Failure(err.to_string()),
            Err(payload) => {
                let message = panic_message(payload.as_ref())
                    .unwrap_or_else(|| QUERY_FALLBACK_ERROR.to_string());
                log::error!(
                    "[GuideRegistry] Query \"{}\" in \"{}\" panicked: {}",
                    query_id,
                    module_id,
                    message
                );
                InvocationResult::Failure(message)
            }
        }
    }

    // -----------------------------------------------------------------------
    // Element discovery
    // -----------------------------------------------------------------------

    /// Describe every test-id-tagged element, optionally only those whose
    /// test id starts with `"<module_id>-"`.
    ///
    /// Element source failures are passed through unchanged.
    pub fn discover_elements(
        &self,
        module_id: Option<&str>,
    ) -> Result<Vec<GuideElement>, GuideError> {
        let source = self
            .element_source
            .read()
            .clone()
            .ok_or(GuideError::NoElementSource)?;
        elements::discover(source.as_ref(), module_id)
    }

    // -----------------------------------------------------------------------
    // Lookup helpers
    // -----------------------------------------------------------------------

    fn lookup_action(&self, module_id: &str, action_id: &str) -> Result<Arc<dyn GuideAction>, String> {
        let module = self
            .get_module(module_id)
            .ok_or_else(|| format!("Module \"{}\" not found", module_id))?;
        module
            .capabilities
            .action(action_id)
            .map(|a| a.handler())
            .ok_or_else(|| {
                format!(
                    "Action \"{}\" not found in module \"{}\"",
                    action_id, module_id
                )
            })
    }

    fn lookup_query(&self, module_id: &str, query_id: &str) -> Result<QueryFn, String> {
        let module = self
            .get_module(module_id)
            .ok_or_else(|| format!("Module \"{}\" not found", module_id))?;
        module
            .capabilities
            .query(query_id)
            .map(|q| q.handler())
            .ok_or_else(|| {
                format!(
                    "Query \"{}\" not found in module \"{}\"",
                    query_id, module_id
                )
            })
    }
}

/// Marks a (module, action) pair busy until dropped.
struct InFlightGuard<'a> {
    set: &'a InFlightSet,
    key: (String, String),
}

impl<'a> InFlightGuard<'a> {
    fn acquire(set: &'a InFlightSet, module_id: &str, action_id: &str) -> Option<Self> {
        let key = (module_id.to_string(), action_id.to_string());
        if !set.lock().insert(key.clone()) {
            return None;
        }
        Some(Self { set, key })
    }
}

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        self.set.lock().remove(&self.key);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capabilities::elements::{DocumentSnapshot, DomNode};
    use crate::error::ActionError;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    fn init_logger() {
        let _ = env_logger::builder().is_test(true).try_init();
    }

    async fn explode(_: Option<Value>) -> Result<Value, ActionError> {
        panic!("kaboom")
    }

    async fn panic_with_number(_: Option<Value>) -> Result<Value, ActionError> {
        std::panic::panic_any(42_u8)
    }

    fn chart_module(label: &str) -> ModuleDescriptor {
        let label = label.to_string();
        ModuleDescriptor::new("birthChart", label.clone())
            .with_fn_action("echo", |input| async move { Ok(input.unwrap_or(Value::Null)) })
            .with_fn_action("fail", |_| async { Err(ActionError::failed("boom")) })
            .with_fn_action("explode", explode)
            .with_query("label", move || Ok(json!(label.clone())))
    }

    #[test]
    fn test_duplicate_registration_keeps_latest() {
        init_logger();
        let registry = CapabilityRegistry::new();
        assert!(registry.register(chart_module("first")).is_none());
        let replaced = registry.register(chart_module("second"));

        assert_eq!(replaced.unwrap().name, "first");
        let modules = registry.get_modules();
        assert_eq!(modules.len(), 1);
        assert_eq!(modules[0].name, "second");
    }

    #[test]
    fn test_unregister_unknown_is_noop() {
        let registry = CapabilityRegistry::new();
        assert!(registry.unregister("never-registered").is_none());
        registry.register(chart_module("x"));
        assert!(registry.unregister("birthChart").is_some());
        assert!(registry.is_empty());
    }

    #[test]
    fn test_discover_capabilities_in_registration_order() {
        let registry = CapabilityRegistry::new();
        registry.register(ModuleDescriptor::new("studio", "Studio"));
        registry.register(chart_module("Chart"));
        registry.register(ModuleDescriptor::new("journal", "Journal"));

        let ids: Vec<String> = registry
            .discover_capabilities()
            .into_iter()
            .map(|d| d.module_id)
            .collect();
        assert_eq!(ids, vec!["studio", "birthChart", "journal"]);
        assert_eq!(registry.discover_capabilities()[1].capabilities.actions.len(), 3);
    }

    #[tokio::test]
    async fn test_execute_action_missing_module() {
        let registry = CapabilityRegistry::new();
        let result = registry.execute_action("missing-module", "x", None).await;
        assert_eq!(
            result,
            InvocationResult::Failure("Module \"missing-module\" not found".to_string())
        );
    }

    #[tokio::test]
    async fn test_execute_action_missing_action_names_both() {
        let registry = CapabilityRegistry::new();
        registry.register(chart_module("c"));
        let result = registry.execute_action("birthChart", "missing-action", None).await;
        let error = result.error().unwrap();
        assert!(error.contains("missing-action"));
        assert!(error.contains("birthChart"));
    }

    #[tokio::test]
    async fn test_execute_action_success_and_errors() {
        init_logger();
        let registry = CapabilityRegistry::new();
        registry.register(chart_module("c"));

        let ok = registry
            .execute_action("birthChart", "echo", Some(json!({"id": 4})))
            .await;
        assert_eq!(ok, InvocationResult::Success(json!({"id": 4})));

        let failed = registry.execute_action("birthChart", "fail", None).await;
        assert_eq!(failed, InvocationResult::Failure("boom".to_string()));

        let panicked = registry.execute_action("birthChart", "explode", None).await;
        assert_eq!(panicked, InvocationResult::Failure("kaboom".to_string()));
    }

    #[tokio::test]
    async fn test_action_panic_without_message_uses_fallback() {
        let registry = CapabilityRegistry::new();
        registry.register(
            ModuleDescriptor::new("m", "M").with_fn_action("odd", panic_with_number),
        );
        let result = registry.execute_action("m", "odd", None).await;
        assert_eq!(result.error(), Some(ACTION_FALLBACK_ERROR));
    }

    #[test]
    fn test_execute_query_contract() {
        let registry = CapabilityRegistry::new();
        registry.register(
            chart_module("Chart")
                .with_query("broken", || Err(ActionError::failed("no chart loaded")))
                .with_query("panics", || panic!("bad query")),
        );

        assert_eq!(
            registry.execute_query("birthChart", "label"),
            InvocationResult::Success(json!("Chart"))
        );
        assert_eq!(
            registry.execute_query("birthChart", "broken").error(),
            Some("no chart loaded")
        );
        assert_eq!(registry.execute_query("birthChart", "panics").error(), Some("bad query"));
        assert_eq!(
            registry.execute_query("birthChart", "nope").error(),
            Some("Query \"nope\" not found in module \"birthChart\"")
        );
        assert_eq!(
            registry.execute_query("ghost", "label").error(),
            Some("Module \"ghost\" not found")
        );
    }

    #[tokio::test]
    async fn test_concurrent_calls_run_independently_by_default() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        let registry = CapabilityRegistry::new();
        registry.register(ModuleDescriptor::new("m", "M").with_fn_action("slow", move |_| {
            let counter = Arc::clone(&counter);
            async move {
                tokio::time::sleep(Duration::from_millis(20)).await;
                Ok(json!(counter.fetch_add(1, Ordering::SeqCst)))
            }
        }));

        let (a, b) = tokio::join!(
            registry.execute_action("m", "slow", None),
            registry.execute_action("m", "slow", None)
        );
        assert!(a.is_success());
        assert!(b.is_success());
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_single_flight_rejects_overlap() {
        let registry = CapabilityRegistry::new().with_single_flight(true);
        registry.register(ModuleDescriptor::new("m", "M").with_fn_action("slow", |_| async {
            tokio::time::sleep(Duration::from_millis(20)).await;
            Ok(json!("done"))
        }));

        let (a, b) = tokio::join!(
            registry.execute_action("m", "slow", None),
            registry.execute_action("m", "slow", None)
        );
        assert!(a.is_success());
        assert_eq!(
            b.error(),
            Some("Action \"slow\" in module \"m\" is already running")
        );

        let again = registry.execute_action("m", "slow", None).await;
        assert!(again.is_success());
    }

    #[tokio::test]
    async fn test_single_flight_released_after_panic() {
        let registry = CapabilityRegistry::new().with_single_flight(true);
        registry.register(ModuleDescriptor::new("m", "M").with_fn_action("explode", explode));
        assert!(!registry.execute_action("m", "explode", None).await.is_success());
        assert_eq!(
            registry.execute_action("m", "explode", None).await.error(),
            Some("kaboom")
        );
    }

    #[test]
    fn test_discover_elements_requires_source() {
        let registry = CapabilityRegistry::new();
        assert!(matches!(
            registry.discover_elements(None),
            Err(GuideError::NoElementSource)
        ));

        let doc = DocumentSnapshot::new(vec![
            DomNode::new("button").test_id("studio-save"),
            DomNode::new("select").test_id("birthChart-house"),
        ]);
        registry.set_element_source(Arc::new(doc));
        assert_eq!(registry.discover_elements(Some("studio")).unwrap().len(), 1);
        assert_eq!(registry.discover_elements(None).unwrap().len(), 2);
    }

    struct BrokenDocument;

    impl ElementSource for BrokenDocument {
        fn tagged_elements(&self) -> Result<Vec<DomNode>, GuideError> {
            Err(GuideError::ElementSource("document detached".into()))
        }
    }

    #[test]
    fn test_discover_elements_propagates_source_errors() {
        let registry = CapabilityRegistry::new().with_element_source(Arc::new(BrokenDocument));
        let err = registry.discover_elements(None).unwrap_err();
        assert_eq!(err.to_string(), "Element source error: document detached");
    }
}
