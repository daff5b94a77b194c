//! # strata-engine
//!
//! Layer composition and dispatch for context-oriented programming.
//!
//! An operation is registered once with a base implementation. Layers then
//! attach before, around and after specializations to it. At call time the
//! engine looks at which layers are active for the caller and builds a
//! proceed chain from their specializations, ending in the base.
//!
//! ## Modules
//!
//! - [`stack`]: explicit activation stacks and specificity resolution
//! - [`scope`]: implicit per-thread and per-task activation, scope guards
//! - [`global`]: process-wide layer activation
//! - [`registry`]: operations, specializations, typed handles
//! - [`dispatch`]: the proceed chain and the [`Proceed`] continuation
//!
//! ## Example
//!
//! ```ignore
//! let mut registry = Registry::new();
//! let value = registry.register_base("value", |_: &()| Ok(10))?;
//! let plus_one = Layer::new("plus_one");
//! registry.register_around(&value, &plus_one, |_, p| Ok(p.proceed()? + 1))?;
//!
//! assert_eq!(registry.call(&value, &())?, 10);
//! assert_eq!(with_layers([&plus_one], || registry.call(&value, &()))?, 11);
//! ```

#![deny(unsafe_code)]

pub mod dispatch;
pub mod global;
pub mod registry;
pub mod scope;
pub mod stack;

pub use dispatch::{DispatchState, Proceed};
pub use global::{activate_globally, deactivate_globally, global_layers};
pub use registry::{Operation, Registry, Specialization};
pub use scope::{
    ActivationGuard, activate, activation_scope, current_activation_order, current_stack,
    deactivate, is_active, with_layers, with_layers_async, without_layers,
};
pub use stack::{ActivationStack, FrameToken};
