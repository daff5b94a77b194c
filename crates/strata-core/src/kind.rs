//! Specialization kinds and dispatch phases.

use std::fmt;

use serde::{Deserialize, Serialize};

/// How a specialization composes with the proceed chain.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum SpecializationKind {
    /// Runs before the chain for side effects; result discarded.
    Before,
    /// Wraps the rest of the chain and decides whether to proceed.
    Around,
    /// Runs after the chain and may replace the result.
    After,
}

impl SpecializationKind {
    /// All kinds, in execution order.
    pub const ALL: [Self; 3] = [Self::Before, Self::Around, Self::After];

    /// Short name for logging.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Before => "before",
            Self::Around => "around",
            Self::After => "after",
        }
    }
}

impl fmt::Display for SpecializationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Which part of a dispatch was executing.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    /// A before specialization.
    Before,
    /// An around specialization.
    Around,
    /// The base implementation.
    Base,
    /// An after specialization.
    After,
}

impl From<SpecializationKind> for Phase {
    fn from(kind: SpecializationKind) -> Self {
        match kind {
            SpecializationKind::Before => Self::Before,
            SpecializationKind::Around => Self::Around,
            SpecializationKind::After => Self::After,
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Before => "before",
            Self::Around => "around",
            Self::Base => "base",
            Self::After => "after",
        })
    }
}
