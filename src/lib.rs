//! # Guide Registry
//!
//! Runtime capability and state registry that lets an external controller
//! (an automation or assistant agent operating outside normal user input)
//! discover what a running application can do, invoke those capabilities,
//! observe cross-feature UI state, and locate interactive elements.
//!
//! Two independent registries, wired together by a [`GuideBridge`]:
//!
//! - [`CapabilityRegistry`]: module id → actions and queries, invoked by
//!   string id, every expected failure returned as data.
//! - [`GuideStateRegistry`]: per-module state slices plus a global slice,
//!   derived modal/loading flags, and subscribe/notify.

pub mod bridge;
pub mod capabilities;
pub mod config;
pub mod error;
pub mod state;
pub mod types;

pub use bridge::{GuideBridge, GuideCommand};
pub use capabilities::{
    ActionSpec, CapabilityDiscovery, CapabilityRegistry, DocumentSnapshot, DomNode,
    ElementSource, ElementType, GuideAction, GuideElement, ModuleDescriptor, QuerySpec,
};
pub use config::GuideConfig;
pub use error::{ActionError, GuideError, GuideResult};
pub use state::{
    GlobalState, GlobalStatePatch, GuideStateRegistry, GuideStateSnapshot, StateRule, StateRules,
    Subscription,
};
pub use types::{ActionResult, FlagPath, InvocationResult, QueryResult};

/// Library version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
