//! Dispatch error taxonomy.
//!
//! - Registration misuse: [`DispatchError::DuplicateOperation`],
//!   [`DispatchError::UnknownOperation`], [`DispatchError::SignatureMismatch`]
//! - Activation misuse: [`DispatchError::UnbalancedActivation`],
//!   [`DispatchError::AlreadyActive`], [`DispatchError::NotActive`]
//! - Runtime failures: [`DispatchError::Chain`] wraps whatever a before,
//!   around, base or after function returned, annotated with where it
//!   happened; [`DispatchError::DepthExceeded`] guards runaway nesting.
//!
//! The engine never swallows errors. A `Chain` error keeps the original
//! error object, so callers can still [`downcast_ref`](DispatchError::downcast_ref)
//! to their own type.

use thiserror::Error;

use crate::kind::Phase;

/// Errors raised by registration, activation and dispatch.
#[derive(Debug, Error)]
pub enum DispatchError {
    /// A base operation with this name is already registered.
    #[error("operation '{operation}' is already registered")]
    DuplicateOperation {
        /// Operation name.
        operation: String,
    },

    /// The operation was never registered in this registry.
    #[error("operation '{operation}' is not registered")]
    UnknownOperation {
        /// Operation name.
        operation: String,
    },

    /// The operation exists but was registered with different argument or
    /// result types.
    #[error("operation '{operation}' was registered with a different signature")]
    SignatureMismatch {
        /// Operation name.
        operation: String,
    },

    /// An activation frame was released while a later frame was still active.
    #[error("activation frame {released} released out of order (top of stack: {top:?})")]
    UnbalancedActivation {
        /// Frame the caller tried to release.
        released: u64,
        /// Frame actually on top of the stack, if any.
        top: Option<u64>,
    },

    /// A specialization, the base implementation, or something they called failed.
    #[error("{phase} of '{operation}' failed in {}: {source}", .layer.as_deref().unwrap_or("base"))]
    Chain {
        /// Operation being dispatched.
        operation: String,
        /// Identifier of the layer whose specialization failed (`None` for the base).
        layer: Option<String>,
        /// Which part of the dispatch was running.
        phase: Phase,
        /// The original error.
        #[source]
        source: anyhow::Error,
    },

    /// Nested dispatch went deeper than the configured limit.
    #[error("dispatch of '{operation}' exceeded the maximum nesting depth of {limit}")]
    DepthExceeded {
        /// Operation whose call crossed the limit.
        operation: String,
        /// Configured limit.
        limit: usize,
    },

    /// The layer is already globally active.
    #[error("layer {layer} is already globally active")]
    AlreadyActive {
        /// Layer identifier.
        layer: String,
    },

    /// The layer is not globally active.
    #[error("layer {layer} is not globally active")]
    NotActive {
        /// Layer identifier.
        layer: String,
    },
}

/// Result alias for engine operations.
pub type Result<T> = std::result::Result<T, DispatchError>;

impl DispatchError {
    /// Annotate an error raised inside a chain link.
    ///
    /// Errors that already are a [`DispatchError`] (for example from a
    /// nested dispatch) pass through untouched, so the innermost failure
    /// keeps its annotation.
    pub fn chain(
        operation: &str,
        layer: Option<&str>,
        phase: Phase,
        error: anyhow::Error,
    ) -> Self {
        match error.downcast::<Self>() {
            Ok(inner) => inner,
            Err(source) => Self::Chain {
                operation: operation.to_owned(),
                layer: layer.map(str::to_owned),
                phase,
                source,
            },
        }
    }

    /// Downcast the wrapped user error of a [`DispatchError::Chain`].
    pub fn downcast_ref<E>(&self) -> Option<&E>
    where
        E: std::fmt::Display + std::fmt::Debug + Send + Sync + 'static,
    {
        match self {
            Self::Chain { source, .. } => source.downcast_ref::<E>(),
            _ => None,
        }
    }

    /// The operation this error relates to, if any.
    pub fn operation(&self) -> Option<&str> {
        match self {
            Self::DuplicateOperation { operation }
            | Self::UnknownOperation { operation }
            | Self::SignatureMismatch { operation }
            | Self::Chain { operation, .. }
            | Self::DepthExceeded { operation, .. } => Some(operation),
            _ => None,
        }
    }

    /// Short classification string for logging.
    pub fn error_kind(&self) -> &'static str {
        match self {
            Self::DuplicateOperation { .. } => "duplicate_operation",
            Self::UnknownOperation { .. } => "unknown_operation",
            Self::SignatureMismatch { .. } => "signature_mismatch",
            Self::UnbalancedActivation { .. } => "unbalanced_activation",
            Self::Chain { .. } => "chain_error",
            Self::DepthExceeded { .. } => "depth_exceeded",
            Self::AlreadyActive { .. } => "already_active",
            Self::NotActive { .. } => "not_active",
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
