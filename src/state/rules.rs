//! Declarative modal and loading rules.
//!
//! Each rule answers one yes/no question about the state tree. Features
//! add rules when they mount (usually as flag paths declared on their
//! module descriptor); the registry evaluates the whole table after every
//! module mutation to derive `global.hasOpenModal`, and on demand for
//! `is_loading`.

use std::fmt;
use std::sync::Arc;

use indexmap::IndexMap;

use super::snapshot::GuideStateSnapshot;
use crate::config::StateConfig;
use crate::types::FlagPath;

/// Modal name that asks whether any modal is open.
pub const ANY_MODAL: &str = "any";

/// Predicate over a state snapshot. Must be pure and must not call back
/// into the state registry.
pub type RuleFn = Arc<dyn Fn(&GuideStateSnapshot) -> bool + Send + Sync>;

/// One rule: a boolean flag in a module slice, or an arbitrary predicate.
#[derive(Clone)]
pub enum StateRule {
    Flag(FlagPath),
    Custom(RuleFn),
}

impl StateRule {
    pub fn flag(path: FlagPath) -> Self {
        Self::Flag(path)
    }

    pub fn custom<F>(predicate: F) -> Self
    where
        F: Fn(&GuideStateSnapshot) -> bool + Send + Sync + 'static,
    {
        Self::Custom(Arc::new(predicate))
    }

    pub fn evaluate(&self, state: &GuideStateSnapshot) -> bool {
        match self {
            Self::Flag(path) => state.flag(path),
            Self::Custom(predicate) => predicate(state),
        }
    }
}

impl fmt::Debug for StateRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Flag(path) => write!(f, "Flag({})", path),
            Self::Custom(_) => f.write_str("Custom(..)"),
        }
    }
}

impl From<FlagPath> for StateRule {
    fn from(path: FlagPath) -> Self {
        Self::Flag(path)
    }
}

/// Every rule registered under one name.
///
/// The base rule comes from configuration (or a direct insert); each
/// mounted module that declares the same name adds a layer tagged with its
/// id. The name reads open when any of them does.
#[derive(Debug, Clone, Default)]
struct RuleStack {
    base: Option<StateRule>,
    layers: Vec<(String, StateRule)>,
}

impl RuleStack {
    fn top(&self) -> Option<&StateRule> {
        self.layers.last().map(|(_, rule)| rule).or(self.base.as_ref())
    }

    fn rules(&self) -> impl Iterator<Item = &StateRule> {
        self.base.iter().chain(self.layers.iter().map(|(_, rule)| rule))
    }

    fn evaluate(&self, state: &GuideStateSnapshot) -> bool {
        self.rules().any(|rule| rule.evaluate(state))
    }

    fn set_layer(&mut self, owner: &str, rule: StateRule) {
        self.layers.retain(|(o, _)| o != owner);
        self.layers.push((owner.to_string(), rule));
    }

    /// Drop `owner`'s layer. Returns whether one was present.
    fn release(&mut self, owner: &str) -> bool {
        let before = self.layers.len();
        self.layers.retain(|(o, _)| o != owner);
        self.layers.len() != before
    }

    fn is_empty(&self) -> bool {
        self.base.is_none() && self.layers.is_empty()
    }
}

/// One rule table keyed by name, in insertion order.
#[derive(Debug, Clone, Default)]
struct RuleTable {
    entries: IndexMap<String, RuleStack>,
}

impl RuleTable {
    fn insert(&mut self, name: String, rule: StateRule) -> Option<StateRule> {
        self.entries.entry(name).or_default().base.replace(rule)
    }

    fn insert_for(&mut self, owner: &str, name: String, rule: StateRule) {
        self.entries.entry(name).or_default().set_layer(owner, rule);
    }

    fn remove(&mut self, name: &str) -> Option<StateRule> {
        let stack = self.entries.shift_remove(name)?;
        stack.top().cloned()
    }

    fn release(&mut self, owner: &str) -> bool {
        let mut released = false;
        for stack in self.entries.values_mut() {
            released |= stack.release(owner);
        }
        self.entries.retain(|_, stack| !stack.is_empty());
        released
    }

    fn get(&self, name: &str) -> Option<&StateRule> {
        self.entries.get(name).and_then(RuleStack::top)
    }

    fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    fn is_set(&self, name: &str, state: &GuideStateSnapshot) -> bool {
        self.entries
            .get(name)
            .is_some_and(|stack| stack.evaluate(state))
    }

    fn any(&self, state: &GuideStateSnapshot) -> bool {
        self.entries.values().any(|stack| stack.evaluate(state))
    }
}

/// The modal and loading tables, in insertion order.
#[derive(Debug, Clone, Default)]
pub struct StateRules {
    modals: RuleTable,
    loading: RuleTable,
}

impl StateRules {
    pub fn new() -> Self {
        Self::default()
    }

    /// The modal and loading flags of the astrology app's built-in features.
    pub fn defaults() -> Self {
        let mut rules = Self::new();
        for (name, path) in [
            ("editor", "birthChart.isEditorOpen"),
            ("exportDialog", "birthChart.exportDialogOpen"),
            ("createDeck", "studio.tarot.isCreateModalOpen"),
            ("createSpread", "studio.tarot.isSpreadModalOpen"),
            ("journalEntry", "journal.isEntryModalOpen"),
        ] {
            if let Ok(path) = path.parse::<FlagPath>() {
                rules.insert_modal(name, path);
            }
        }
        for path in ["birthChart.isLoading", "studio.isLoading", "journal.isLoading"] {
            if let Ok(path) = path.parse::<FlagPath>() {
                rules.insert_loading_flag(path);
            }
        }
        rules
    }

    /// Build the tables a [`StateConfig`] describes: the defaults when
    /// enabled, then the configured flags on top.
    pub fn from_config(config: &StateConfig) -> Self {
        let mut rules = if config.use_default_rules {
            Self::defaults()
        } else {
            Self::new()
        };
        for (name, path) in &config.modal_flags {
            rules.insert_modal(name.clone(), path.clone());
        }
        for path in &config.loading_flags {
            rules.insert_loading_flag(path.clone());
        }
        rules
    }

    /// Drop every rule `owner` added through the `*_for` methods. Rules
    /// from configuration and other owners stay. Returns whether anything
    /// was removed.
    pub fn release(&mut self, owner: &str) -> bool {
        let modals = self.modals.release(owner);
        let loading = self.loading.release(owner);
        modals || loading
    }

    // -----------------------------------------------------------------------
    // Modal table
    // -----------------------------------------------------------------------

    /// Add or replace the base rule for modal `name`. Returns the replaced rule.
    pub fn insert_modal(
        &mut self,
        name: impl Into<String>,
        rule: impl Into<StateRule>,
    ) -> Option<StateRule> {
        self.modals.insert(name.into(), rule.into())
    }

    /// Add `owner`'s rule for modal `name`, replacing only `owner`'s
    /// previous rule under that name.
    pub fn insert_modal_for(
        &mut self,
        owner: &str,
        name: impl Into<String>,
        rule: impl Into<StateRule>,
    ) {
        self.modals.insert_for(owner, name.into(), rule.into());
    }

    /// Remove modal `name` and every rule under it.
    pub fn remove_modal(&mut self, name: &str) -> Option<StateRule> {
        self.modals.remove(name)
    }

    /// The most recently added rule for modal `name`.
    pub fn modal(&self, name: &str) -> Option<&StateRule> {
        self.modals.get(name)
    }

    pub fn modal_names(&self) -> impl Iterator<Item = &str> {
        self.modals.names()
    }

    /// Whether modal `name` is open. Unknown names are closed.
    pub fn is_modal_open(&self, name: &str, state: &GuideStateSnapshot) -> bool {
        self.modals.is_set(name, state)
    }

    pub fn any_modal_open(&self, state: &GuideStateSnapshot) -> bool {
        self.modals.any(state)
    }

    // -----------------------------------------------------------------------
    // Loading table
    // -----------------------------------------------------------------------

    /// Add or replace a named base loading rule.
    pub fn insert_loading(
        &mut self,
        name: impl Into<String>,
        rule: impl Into<StateRule>,
    ) -> Option<StateRule> {
        self.loading.insert(name.into(), rule.into())
    }

    /// Add a loading flag, keyed by its dotted path.
    pub fn insert_loading_flag(&mut self, path: FlagPath) -> Option<StateRule> {
        self.insert_loading(path.to_string(), path)
    }

    pub fn insert_loading_for(
        &mut self,
        owner: &str,
        name: impl Into<String>,
        rule: impl Into<StateRule>,
    ) {
        self.loading.insert_for(owner, name.into(), rule.into());
    }

    pub fn remove_loading(&mut self, name: &str) -> Option<StateRule> {
        self.loading.remove(name)
    }

    pub fn loading_names(&self) -> impl Iterator<Item = &str> {
        self.loading.names()
    }

    pub fn any_loading(&self, state: &GuideStateSnapshot) -> bool {
        self.loading.any(state)
    }
}
