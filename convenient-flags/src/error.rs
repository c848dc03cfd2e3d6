//! Error types shared by every stage of a build-out.

use crate::flags::FlagMask;
use std::fmt;

/// Boxed error returned by producers.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Where a dependency cycle was found.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleStage {
    /// Found while expanding the requested mask over dependency edges.
    Expansion,
    /// Found because a scheduling pass made no progress.
    Scheduling,
}

impl fmt::Display for CycleStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Expansion => write!(f, "dependency expansion"),
            Self::Scheduling => write!(f, "scheduling"),
        }
    }
}

/// Error types for flag allocation, registration and build-out.
#[derive(Debug, thiserror::Error)]
pub enum FlagError {
    /// Malformed flag set or registration
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Flag name not declared in the flag set
    #[error("Unknown flag: {0}")]
    UnknownFlag(String),

    /// Unsatisfiable cyclic dependency among producers
    #[error(
        "Circular dependency detected during {stage}: producers [{}] (flags {flags})",
        .producers.join(", ")
    )]
    CircularDependency {
        /// Stage that detected the cycle.
        stage: CycleStage,
        /// Producers implicated, in path or queue order.
        producers: Vec<String>,
        /// Flags the implicated producers are waiting on.
        flags: FlagMask,
    },

    /// A multi-output producer returned the wrong number of values
    #[error("Producer '{producer}' returned {found} value(s), expected {expected}")]
    ReturnArity {
        /// Producer name.
        producer: String,
        /// Number of declared entries.
        expected: usize,
        /// Number of values actually returned.
        found: usize,
    },

    /// A keyless entry produced something other than a mapping
    #[error("Producer '{producer}' returned a non-mapping value for keyless flag {flag}")]
    NotAMapping {
        /// Producer name.
        producer: String,
        /// Flag of the keyless entry.
        flag: FlagMask,
    },

    /// A producer failed; its error is kept as the source
    #[error("Producer '{producer}' failed: {source}")]
    Producer {
        /// Producer name.
        producer: String,
        /// The producer's own error.
        #[source]
        source: BoxError,
    },
}

impl FlagError {
    /// True for both the static and the scheduling flavour of cycle errors.
    #[must_use]
    pub fn is_circular(&self) -> bool {
        matches!(self, Self::CircularDependency { .. })
    }
}

/// Result type for flag operations.
pub type FlagResult<T> = Result<T, FlagError>;
