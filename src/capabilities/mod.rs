//! # Capability Registry
//!
//! The bridge between feature code and an external controller. Features
//! register named bundles of actions and queries; the controller discovers
//! them and invokes them by string id without compile-time knowledge of
//! any specific feature.
//!
//! ## Invocation Flow
//!
//! 1. A feature mounts and calls `CapabilityRegistry::register(descriptor)`
//! 2. The controller calls `discover_capabilities()` to build its palette
//! 3. `execute_action("studio", "createDeck", input)` resolves the module,
//!    then the action, awaits it, and returns `{ success, data | error }`
//! 4. `discover_elements(Some("studio"))` lists the feature's tagged
//!    elements so the controller can point at them
//! 5. On unmount the feature calls `unregister("studio")`

pub mod capability;
pub mod elements;
pub mod registry;

pub use capability::{
    ActionSpec, CapabilityDiscovery, FnAction, GuideAction, ModuleCapabilities, ModuleDescriptor,
    QueryFn, QuerySpec,
};
pub use elements::{DocumentSnapshot, DomNode, ElementSource, ElementType, GuideElement};
pub use registry::CapabilityRegistry;
