//! State registry: cross-feature UI state with change notification.
//!
//! Features push their local state in with `update_module_state` and clear
//! it on unmount. After every module mutation the registry re-evaluates
//! the whole modal table to derive `global.hasOpenModal`, then hands every
//! subscriber a fresh snapshot.
//!
//! Subscribers run after the internal locks are released, so they may read
//! or mutate the registry themselves. A panicking subscriber is logged and
//! skipped; the remaining subscribers are still notified.

use std::collections::BTreeMap;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::{Mutex, RwLock};
use serde::Serialize;
use serde_json::Value;

use super::rules::{StateRule, StateRules, ANY_MODAL};
use super::snapshot::{
    GlobalState, GlobalStatePatch, GuideStateSnapshot, ModuleSlice, GLOBAL_KEY,
};
use crate::error::{panic_message, GuideError, GuideResult};

/// Callback invoked with the post-mutation snapshot.
pub type Subscriber = Arc<dyn Fn(&GuideStateSnapshot) + Send + Sync>;

type SubscriberList = Mutex<BTreeMap<u64, Subscriber>>;

/// Handle returned by [`GuideStateRegistry::subscribe`].
///
/// Dropping the handle does not unsubscribe; call [`Subscription::unsubscribe`].
#[derive(Debug)]
pub struct Subscription {
    id: u64,
    subscribers: Weak<SubscriberList>,
}

impl Subscription {
    /// Stop receiving notifications. Returns `false` if the subscription
    /// was already gone (or the registry dropped).
    pub fn unsubscribe(self) -> bool {
        match self.subscribers.upgrade() {
            Some(list) => list.lock().remove(&self.id).is_some(),
            None => false,
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }
}

/// Owner of the guide state tree.
pub struct GuideStateRegistry {
    state: RwLock<GuideStateSnapshot>,
    rules: RwLock<StateRules>,
    subscribers: Arc<SubscriberList>,
    next_subscriber_id: AtomicU64,
}

impl Default for GuideStateRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for GuideStateRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GuideStateRegistry")
            .field("state", &*self.state.read())
            .field("rules", &*self.rules.read())
            .field("subscribers", &self.subscriber_count())
            .finish()
    }
}

impl GuideStateRegistry {
    /// Empty tree, empty rule tables, blank current page.
    pub fn new() -> Self {
        Self::with_rules(StateRules::new())
    }

    pub fn with_rules(rules: StateRules) -> Self {
        Self {
            state: RwLock::new(GuideStateSnapshot::with_global(GlobalState::default())),
            rules: RwLock::new(rules),
            subscribers: Arc::new(Mutex::new(BTreeMap::new())),
            next_subscriber_id: AtomicU64::new(1),
        }
    }

    /// Set the page reported before any feature updates it.
    pub fn with_initial_page(self, page: impl Into<String>) -> Self {
        self.state.write().global.current_page = page.into();
        self
    }

    // -----------------------------------------------------------------------
    // Reads
    // -----------------------------------------------------------------------

    /// Shallow copy of the whole tree.
    pub fn get_state(&self) -> GuideStateSnapshot {
        self.state.read().clone()
    }

    pub fn get_module_state(&self, module_key: &str) -> Option<Arc<ModuleSlice>> {
        self.state.read().modules.get(module_key).cloned()
    }

    pub fn get_current_page(&self) -> String {
        self.state.read().global.current_page.clone()
    }

    /// `"any"` reports the derived `hasOpenModal`; other names look up the
    /// modal table. Unknown names are closed.
    pub fn is_modal_open(&self, modal_name: &str) -> bool {
        let state = self.state.read();
        if modal_name == ANY_MODAL {
            return state.global.has_open_modal;
        }
        self.rules.read().is_modal_open(modal_name, &state)
    }

    /// `global.isLoading` or any registered loading rule.
    pub fn is_loading(&self) -> bool {
        let state = self.state.read();
        state.global.is_loading || self.rules.read().any_loading(&state)
    }

    // -----------------------------------------------------------------------
    // Mutations
    // -----------------------------------------------------------------------

    /// Shallow-merge `partial` into the module's slice, creating it if
    /// needed. `partial` must be a JSON object and `module_key` must not be
    /// the reserved `global` key.
    pub fn update_module_state(&self, module_key: &str, partial: Value) -> GuideResult<()> {
        if module_key == GLOBAL_KEY {
            return Err(GuideError::InvalidState {
                module: module_key.to_string(),
                reason: "reserved for global state, use update_global_state".to_string(),
            });
        }
        let patch = match partial {
            Value::Object(map) => map,
            other => {
                return Err(GuideError::InvalidState {
                    module: module_key.to_string(),
                    reason: format!("expected an object, got {}", json_kind(&other)),
                })
            }
        };

        let snapshot = {
            let mut state = self.state.write();
            let slice = state.modules.entry(module_key.to_string()).or_default();
            let slice = Arc::make_mut(slice);
            for (key, value) in patch {
                slice.insert(key, value);
            }
            self.recompute_modal(&mut state);
            state.revision += 1;
            state.clone()
        };
        log::debug!(
            "[GuideState] Updated \"{}\" (revision {})",
            module_key,
            snapshot.revision
        );
        self.notify(&snapshot);
        Ok(())
    }

    /// Serialize `partial` and merge it like [`update_module_state`](Self::update_module_state).
    pub fn update_module_state_with<T: Serialize>(
        &self,
        module_key: &str,
        partial: &T,
    ) -> GuideResult<()> {
        self.update_module_state(module_key, serde_json::to_value(partial)?)
    }

    /// Drop a module's slice entirely so its stale flags stop counting.
    pub fn clear_module_state(&self, module_key: &str) {
        let snapshot = {
            let mut state = self.state.write();
            state.modules.remove(module_key);
            self.recompute_modal(&mut state);
            state.revision += 1;
            state.clone()
        };
        log::debug!("[GuideState] Cleared \"{}\"", module_key);
        self.notify(&snapshot);
    }

    /// Shallow-merge into `global`. Does not re-derive `hasOpenModal`.
    pub fn update_global_state(&self, patch: GlobalStatePatch) {
        let snapshot = {
            let mut state = self.state.write();
            patch.apply(&mut state.global);
            state.revision += 1;
            state.clone()
        };
        self.notify(&snapshot);
    }

    // -----------------------------------------------------------------------
    // Rule tables
    // -----------------------------------------------------------------------

    /// Add or replace the rule for modal `name`.
    ///
    /// `hasOpenModal` is re-derived; subscribers hear about it only if the
    /// flag changed.
    pub fn register_modal(&self, name: impl Into<String>, rule: impl Into<StateRule>) {
        self.rules.write().insert_modal(name, rule);
        self.refresh_modal_flag();
    }

    pub fn unregister_modal(&self, name: &str) -> bool {
        let removed = self.rules.write().remove_modal(name).is_some();
        if removed {
            self.refresh_modal_flag();
        }
        removed
    }

    /// Replace every rule `owner` contributed with the given modal and
    /// loading rules. Rules from configuration and from other owners under
    /// the same names stay in place.
    pub fn set_owned_rules<M, L>(&self, owner: &str, modals: M, loading: L)
    where
        M: IntoIterator<Item = (String, StateRule)>,
        L: IntoIterator<Item = (String, StateRule)>,
    {
        {
            let mut rules = self.rules.write();
            rules.release(owner);
            for (name, rule) in modals {
                rules.insert_modal_for(owner, name, rule);
            }
            for (name, rule) in loading {
                rules.insert_loading_for(owner, name, rule);
            }
        }
        self.refresh_modal_flag();
    }

    /// Drop every rule `owner` contributed.
    pub fn release_rules(&self, owner: &str) -> bool {
        let released = self.rules.write().release(owner);
        if released {
            self.refresh_modal_flag();
        }
        released
    }

    pub fn register_loading(&self, name: impl Into<String>, rule: impl Into<StateRule>) {
        self.rules.write().insert_loading(name, rule);
    }

    pub fn unregister_loading(&self, name: &str) -> bool {
        self.rules.write().remove_loading(name).is_some()
    }

    /// Copy of the current rule tables.
    pub fn rules(&self) -> StateRules {
        self.rules.read().clone()
    }

    // -----------------------------------------------------------------------
    // Subscriptions
    // -----------------------------------------------------------------------

    /// Call `callback` with a snapshot after every mutating call.
    pub fn subscribe<F>(&self, callback: F) -> Subscription
    where
        F: Fn(&GuideStateSnapshot) + Send + Sync + 'static,
    {
        let id = self.next_subscriber_id.fetch_add(1, Ordering::Relaxed);
        self.subscribers.lock().insert(id, Arc::new(callback));
        Subscription {
            id,
            subscribers: Arc::downgrade(&self.subscribers),
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers.lock().len()
    }

    // -----------------------------------------------------------------------
    // Internals
    // -----------------------------------------------------------------------

    fn recompute_modal(&self, state: &mut GuideStateSnapshot) {
        state.global.has_open_modal = self.rules.read().any_modal_open(state);
    }

    fn refresh_modal_flag(&self) {
        let snapshot = {
            let mut state = self.state.write();
            let before = state.global.has_open_modal;
            self.recompute_modal(&mut state);
            if state.global.has_open_modal == before {
                return;
            }
            state.revision += 1;
            state.clone()
        };
        self.notify(&snapshot);
    }

    fn notify(&self, snapshot: &GuideStateSnapshot) {
        let subscribers: Vec<(u64, Subscriber)> = self
            .subscribers
            .lock()
            .iter()
            .map(|(id, s)| (*id, Arc::clone(s)))
            .collect();

        for (id, subscriber) in subscribers {
            let result = std::panic::catch_unwind(AssertUnwindSafe(|| subscriber(snapshot)));
            if let Err(payload) = result {
                log::error!(
                    "[GuideState] Subscriber {} panicked: {}",
                    id,
                    panic_message(payload.as_ref()).unwrap_or_else(|| "unknown panic".into())
                );
            }
        }
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}
