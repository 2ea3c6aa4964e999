//! # State Registry
//!
//! Single source of truth for cross-feature UI state visible to the
//! external controller. The tree holds one `global` slice (current page,
//! active birth data, derived modal/loading flags) plus one free-form slice
//! per mounted feature.
//!
//! The only coupling between slices is the derived aggregation: modal and
//! loading rules are declared per feature in [`StateRules`] and evaluated in
//! full after every mutation.

pub mod registry;
pub mod rules;
pub mod snapshot;

pub use registry::{GuideStateRegistry, Subscriber, Subscription};
pub use rules::{RuleFn, StateRule, StateRules, ANY_MODAL};
pub use snapshot::{GlobalState, GlobalStatePatch, GuideStateSnapshot, ModuleSlice, GLOBAL_KEY};
