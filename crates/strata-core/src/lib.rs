//! # strata-core
//!
//! Shared vocabulary for the strata context-oriented dispatch engine:
//!
//! - **Layers**: [`Layer`] identity tokens and their branded [`LayerId`]
//! - **Kinds**: [`SpecializationKind`] (before / around / after) and the
//!   [`Phase`] a dispatch was in when something failed
//! - **Errors**: the [`DispatchError`] taxonomy via `thiserror`

#![deny(unsafe_code)]

pub mod errors;
pub mod ids;
pub mod kind;
pub mod layer;

pub use errors::{DispatchError, Result};
pub use ids::LayerId;
pub use kind::{Phase, SpecializationKind};
pub use layer::Layer;
