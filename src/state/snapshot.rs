//! The guide state tree: one `global` slice plus one slice per module.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

use crate::types::FlagPath;

/// Key of the global slice in the serialized tree. No module may use it.
pub const GLOBAL_KEY: &str = "global";

/// A module's feature-defined state, e.g. `{ "isEditorOpen": true }`.
pub type ModuleSlice = Map<String, Value>;

/// App-wide state every controller can rely on being present.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GlobalState {
    pub current_page: String,
    pub active_birth_data_id: Option<String>,
    /// Derived from the modal rule table after every module mutation.
    pub has_open_modal: bool,
    pub is_loading: bool,
}

/// Partial update of [`GlobalState`]. `has_open_modal` is derived and
/// cannot be patched.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GlobalStatePatch {
    #[serde(default)]
    pub current_page: Option<String>,

    /// `Some(None)` clears the active id; `None` leaves it untouched.
    #[serde(default, deserialize_with = "double_option")]
    pub active_birth_data_id: Option<Option<String>>,

    #[serde(default)]
    pub is_loading: Option<bool>,
}

fn double_option<'de, D>(deserializer: D) -> Result<Option<Option<String>>, D::Error>
where
    D: Deserializer<'de>,
{
    Option::<String>::deserialize(deserializer).map(Some)
}

impl GlobalStatePatch {
    pub fn current_page(mut self, page: impl Into<String>) -> Self {
        self.current_page = Some(page.into());
        self
    }

    pub fn active_birth_data_id(mut self, id: Option<String>) -> Self {
        self.active_birth_data_id = Some(id);
        self
    }

    pub fn is_loading(mut self, loading: bool) -> Self {
        self.is_loading = Some(loading);
        self
    }

    pub(crate) fn apply(self, global: &mut GlobalState) {
        if let Some(page) = self.current_page {
            global.current_page = page;
        }
        if let Some(id) = self.active_birth_data_id {
            global.active_birth_data_id = id;
        }
        if let Some(loading) = self.is_loading {
            global.is_loading = loading;
        }
    }
}

/// A point-in-time copy of the state tree.
///
/// Cloning is shallow: module slices are shared behind `Arc` and are
/// copied on write by the registry, so a snapshot never changes after it
/// was taken.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct GuideStateSnapshot {
    /// Bumped once per mutating registry call.
    #[serde(skip)]
    pub revision: u64,

    pub global: GlobalState,

    #[serde(flatten)]
    pub modules: BTreeMap<String, Arc<ModuleSlice>>,
}

impl GuideStateSnapshot {
    pub(crate) fn with_global(global: GlobalState) -> Self {
        Self {
            revision: 0,
            global,
            modules: BTreeMap::new(),
        }
    }

    pub fn module(&self, key: &str) -> Option<&ModuleSlice> {
        self.modules.get(key).map(Arc::as_ref)
    }

    /// Read a boolean flag; absent modules and keys read as `false`.
    pub fn flag(&self, path: &FlagPath) -> bool {
        self.module(path.module())
            .map(|slice| path.read(slice))
            .unwrap_or(false)
    }

    pub fn to_json(&self) -> Value {
        serde_json::to_value(self).unwrap_or(Value::Null)
    }
}
