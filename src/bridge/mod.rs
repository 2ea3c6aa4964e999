//! # Guide Bridge
//!
//! The composition root's handle on the guide. The application builds one
//! bridge at startup and passes it to whatever drives automation (an
//! injected script host, a test harness, an assistant agent). The bridge
//! owns exactly one [`CapabilityRegistry`] and one [`GuideStateRegistry`];
//! the two registries never reference each other, the bridge wires them.
//!
//! Features go through [`GuideBridge::mount`] / [`GuideBridge::unmount`] so
//! the modal and loading flags they declare follow their lifetime.

pub mod command;

use std::sync::Arc;

use serde_json::Value;

pub use command::GuideCommand;

use crate::capabilities::{CapabilityRegistry, ElementSource, ModuleDescriptor};
use crate::config::GuideConfig;
use crate::state::{GuideStateRegistry, StateRule, StateRules};
use crate::types::InvocationResult;

/// Shared handle on both registries. Cloning is cheap.
#[derive(Debug, Clone)]
pub struct GuideBridge {
    capabilities: Arc<CapabilityRegistry>,
    state: Arc<GuideStateRegistry>,
}

impl Default for GuideBridge {
    fn default() -> Self {
        Self::new(&GuideConfig::default())
    }
}

impl GuideBridge {
    /// Build both registries from configuration.
    pub fn new(config: &GuideConfig) -> Self {
        let capabilities = CapabilityRegistry::new()
            .with_single_flight(config.capabilities.single_flight_actions);
        let state = GuideStateRegistry::with_rules(StateRules::from_config(&config.state))
            .with_initial_page(config.state.initial_page.clone());
        log::info!(
            "[GuideBridge] Initialized (single-flight: {}, modal rules: {})",
            config.capabilities.single_flight_actions,
            state.rules().modal_names().count()
        );
        Self::from_parts(Arc::new(capabilities), Arc::new(state))
    }

    /// Wrap registries built elsewhere.
    pub fn from_parts(capabilities: Arc<CapabilityRegistry>, state: Arc<GuideStateRegistry>) -> Self {
        Self {
            capabilities,
            state,
        }
    }

    /// Attach the document element discovery scans.
    pub fn with_element_source(self, source: Arc<dyn ElementSource>) -> Self {
        self.capabilities.set_element_source(source);
        self
    }

    pub fn capabilities(&self) -> &Arc<CapabilityRegistry> {
        &self.capabilities
    }

    pub fn state(&self) -> &Arc<GuideStateRegistry> {
        &self.state
    }

    // -----------------------------------------------------------------------
    // Feature lifecycle
    // -----------------------------------------------------------------------

    /// Register a feature and install the modal/loading flags it declares.
    ///
    /// If a module with the same id was registered before, it is replaced
    /// and returned, and its flags give way to the new descriptor's. Flags
    /// that configuration or other modules declare under the same names
    /// are left alone.
    pub fn mount(&self, module: ModuleDescriptor) -> Option<Arc<ModuleDescriptor>> {
        let modals = module
            .modal_flags
            .iter()
            .map(|(name, path)| (name.clone(), StateRule::from(path.clone())));
        let loading = module
            .loading_flags
            .iter()
            .map(|path| (path.to_string(), StateRule::from(path.clone())));
        self.state.set_owned_rules(&module.id, modals, loading);
        self.capabilities.register(module)
    }

    /// Unregister a feature, drop its flags and clear its state slice.
    /// Returns whether a module was registered under `module_id`.
    pub fn unmount(&self, module_id: &str) -> bool {
        let removed = self.capabilities.unregister(module_id).is_some();
        self.state.release_rules(module_id);
        self.state.clear_module_state(module_id);
        removed
    }

    // -----------------------------------------------------------------------
    // Controller entry points
    // -----------------------------------------------------------------------

    /// Run one controller command.
    pub async fn dispatch(&self, command: GuideCommand) -> InvocationResult<Value> {
        log::debug!("[GuideBridge] Dispatching {}", command.name());
        command.run(self).await
    }

    /// Decode and run a command given as JSON. Decode failures come back as
    /// a failure envelope.
    pub async fn dispatch_json(&self, raw: Value) -> Value {
        match GuideCommand::from_json(raw) {
            Ok(command) => self.dispatch(command).await.to_json(),
            Err(err) => {
                log::warn!("[GuideBridge] {}", err);
                InvocationResult::<Value>::failure(err.to_string()).to_json()
            }
        }
    }
}
