//! # strata
//!
//! Context-oriented programming for Rust: operations whose behavior depends
//! on which layers are active in the calling context.
//!
//! This crate re-exports the public surface of the workspace:
//! - [`Layer`], [`DispatchError`] and friends from `strata-core`
//! - [`Registry`], scoped activation and the [`Proceed`] continuation from
//!   `strata-engine`
//! - [`settings`] for `~/.strata/settings.json` and `STRATA_*` overrides
//!
//! ```ignore
//! use strata::{Layer, Registry, with_layers};
//!
//! let mut registry = Registry::from_settings(strata::settings::get_settings().dispatch.clone());
//! let describe = registry.register_base("describe", |n: &u32| Ok(format!("{n}")))?;
//! let verbose = Layer::new("verbose");
//! registry.register_around(&describe, &verbose, |n, p| Ok(format!("value {}", p.proceed()?)))?;
//!
//! with_layers([&verbose], || registry.call(&describe, &7))?;
//! ```

#![deny(unsafe_code)]

pub use strata_core::{DispatchError, Layer, LayerId, Phase, Result, SpecializationKind};
pub use strata_engine::{
    ActivationGuard, ActivationStack, DispatchState, FrameToken, Operation, Proceed, Registry,
    Specialization, activate, activate_globally, activation_scope, current_activation_order,
    current_stack, deactivate, deactivate_globally, global_layers, is_active, with_layers,
    with_layers_async, without_layers,
};

/// Settings types and loaders.
pub mod settings {
    pub use strata_settings::*;
}

/// Install the stderr tracing subscriber at the configured log level.
///
/// `RUST_LOG` takes precedence over `logging.level`. Calling this more than
/// once is harmless.
pub fn init_logging() {
    strata_logging::init_subscriber(&strata_settings::get_settings().logging.level);
}

/// Create a registry using the loaded dispatch settings.
pub fn registry() -> Registry {
    Registry::from_settings(strata_settings::get_settings().dispatch.clone())
}
