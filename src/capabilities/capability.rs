//! Module descriptors, the unit a feature registers with the guide.
//!
//! A descriptor declares:
//! - The actions it offers (async, may mutate state or do I/O)
//! - The queries it answers (sync, side-effect-free)
//! - Which of its state flags mean "a modal is open" or "loading"
//!
//! Descriptors are built once at feature mount and treated as immutable
//! after registration; the registry hands out `Arc` handles to them.

use std::fmt;
use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;

use crate::error::ActionError;
use crate::types::FlagPath;

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

/// An asynchronous guide action.
///
/// Implement this for actions that carry their own state; for one-off
/// closures use [`ModuleDescriptor::with_fn_action`].
#[async_trait]
pub trait GuideAction: Send + Sync + 'static {
    /// Run the action. `input` is whatever the controller passed, if anything.
    async fn execute(&self, input: Option<Value>) -> Result<Value, ActionError>;
}

/// Adapter turning an async closure into a [`GuideAction`].
pub struct FnAction<F> {
    func: F,
}

impl<F> FnAction<F> {
    pub fn new(func: F) -> Self {
        Self { func }
    }
}

#[async_trait]
impl<F, Fut> GuideAction for FnAction<F>
where
    F: Fn(Option<Value>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Value, ActionError>> + Send + 'static,
{
    async fn execute(&self, input: Option<Value>) -> Result<Value, ActionError> {
        (self.func)(input).await
    }
}

/// A synchronous, side-effect-free query handler.
pub type QueryFn = Arc<dyn Fn() -> Result<Value, ActionError> + Send + Sync>;

// ---------------------------------------------------------------------------
// Action / query entries
// ---------------------------------------------------------------------------

/// A named action inside a module.
#[derive(Clone, Serialize)]
pub struct ActionSpec {
    /// Identifier, unique within the module by convention (not enforced).
    pub id: String,

    /// Optional human-readable description for command palettes.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    #[serde(skip)]
    pub(crate) handler: Arc<dyn GuideAction>,
}

impl ActionSpec {
    pub fn new(id: impl Into<String>, handler: impl GuideAction) -> Self {
        Self {
            id: id.into(),
            description: None,
            handler: Arc::new(handler),
        }
    }

    /// Attach a description.
    pub fn describe(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Shared handle to the handler.
    pub fn handler(&self) -> Arc<dyn GuideAction> {
        Arc::clone(&self.handler)
    }
}

impl fmt::Debug for ActionSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ActionSpec")
            .field("id", &self.id)
            .field("description", &self.description)
            .finish_non_exhaustive()
    }
}

/// A named query inside a module.
#[derive(Clone, Serialize)]
pub struct QuerySpec {
    pub id: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    #[serde(skip)]
    pub(crate) handler: QueryFn,
}

impl QuerySpec {
    pub fn new<F>(id: impl Into<String>, handler: F) -> Self
    where
        F: Fn() -> Result<Value, ActionError> + Send + Sync + 'static,
    {
        Self {
            id: id.into(),
            description: None,
            handler: Arc::new(handler),
        }
    }

    pub fn describe(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Shared handle to the handler.
    pub fn handler(&self) -> QueryFn {
        Arc::clone(&self.handler)
    }
}

impl fmt::Debug for QuerySpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("QuerySpec")
            .field("id", &self.id)
            .field("description", &self.description)
            .finish_non_exhaustive()
    }
}

/// The ordered action and query catalogue of a module.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ModuleCapabilities {
    pub actions: Vec<ActionSpec>,
    pub queries: Vec<QuerySpec>,
}

impl ModuleCapabilities {
    /// First action with the given id.
    pub fn action(&self, id: &str) -> Option<&ActionSpec> {
        self.actions.iter().find(|a| a.id == id)
    }

    /// First query with the given id.
    pub fn query(&self, id: &str) -> Option<&QuerySpec> {
        self.queries.iter().find(|q| q.id == id)
    }
}

// ---------------------------------------------------------------------------
// ModuleDescriptor
// ---------------------------------------------------------------------------

/// A feature's registration with the guide.
///
/// ```ignore
/// let chart = ModuleDescriptor::new("birthChart", "Birth Chart")
///     .with_fn_action("openEditor", |_| async { Ok(json!({ "opened": true })) })
///     .with_query("selectedChart", || Ok(json!({ "id": 7 })))
///     .with_modal_flag("editor", "birthChart.isEditorOpen".parse()?);
/// ```
#[derive(Debug, Clone)]
pub struct ModuleDescriptor {
    pub id: String,
    pub name: String,
    pub capabilities: ModuleCapabilities,

    /// Modal name → flag that reports whether it is open.
    pub modal_flags: Vec<(String, FlagPath)>,

    /// Flags that report the module is busy.
    pub loading_flags: Vec<FlagPath>,
}

impl ModuleDescriptor {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            capabilities: ModuleCapabilities::default(),
            modal_flags: Vec::new(),
            loading_flags: Vec::new(),
        }
    }

    /// Add a prepared action entry.
    pub fn with_action(mut self, action: ActionSpec) -> Self {
        self.capabilities.actions.push(action);
        self
    }

    /// Add an action backed by an async closure.
    pub fn with_fn_action<F, Fut>(self, id: impl Into<String>, func: F) -> Self
    where
        F: Fn(Option<Value>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Value, ActionError>> + Send + 'static,
    {
        self.with_action(ActionSpec::new(id, FnAction::new(func)))
    }

    /// Add a query backed by a closure.
    pub fn with_query<F>(mut self, id: impl Into<String>, func: F) -> Self
    where
        F: Fn() -> Result<Value, ActionError> + Send + Sync + 'static,
    {
        self.capabilities.queries.push(QuerySpec::new(id, func));
        self
    }

    /// Add a prepared query entry.
    pub fn with_query_spec(mut self, query: QuerySpec) -> Self {
        self.capabilities.queries.push(query);
        self
    }

    /// Declare that `path` being `true` means modal `name` is open.
    pub fn with_modal_flag(mut self, name: impl Into<String>, path: FlagPath) -> Self {
        self.modal_flags.push((name.into(), path));
        self
    }

    /// Declare that `path` being `true` means the module is loading.
    pub fn with_loading_flag(mut self, path: FlagPath) -> Self {
        self.loading_flags.push(path);
        self
    }
}

/// One entry of [`CapabilityRegistry::discover_capabilities`](super::CapabilityRegistry::discover_capabilities).
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CapabilityDiscovery {
    pub module_id: String,
    pub module_name: String,
    pub capabilities: ModuleCapabilities,
}

impl From<&ModuleDescriptor> for CapabilityDiscovery {
    fn from(module: &ModuleDescriptor) -> Self {
        Self {
            module_id: module.id.clone(),
            module_name: module.name.clone(),
            capabilities: module.capabilities.clone(),
        }
    }
}
