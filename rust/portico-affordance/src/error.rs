use std::fmt::{Display, Formatter};

use itertools::Itertools;

/// A set operation that would require enumerating a universal set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("operation `{operation}` is not supported on a universal set")]
pub struct UnsupportedUniversalSetOperation {
    /// The name of the rejected operation.
    pub operation: &'static str,
}

impl UnsupportedUniversalSetOperation {
    pub(crate) fn new(operation: &'static str) -> Self {
        Self { operation }
    }
}

/// Names one field of an affordance set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum AffordanceComponent {
    /// Authentication realms.
    Realms,
    /// Acceptable provision sets.
    Provisionsets,
    /// Authentication algorithm names.
    Algorithms,
    /// Acceptable input token sets.
    Inputs,
    /// Guaranteed output token sets.
    Outputs,
    /// Candidate scanners.
    Scanners,
    /// Candidate clerks.
    Clerks,
    /// Candidate supplicants.
    Supplicants,
}

impl Display for AffordanceComponent {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Realms => "realms",
            Self::Provisionsets => "provisionsets",
            Self::Algorithms => "algorithms",
            Self::Inputs => "inputs",
            Self::Outputs => "outputs",
            Self::Scanners => "scanners",
            Self::Clerks => "clerks",
            Self::Supplicants => "supplicants",
        };
        f.write_str(name)
    }
}

fn component_list(components: &[AffordanceComponent]) -> String {
    components.iter().join(", ")
}

/// One or more affordance components are empty, so no negotiation can
/// succeed.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unsatisfiable affordances: empty {}", component_list(.components))]
pub struct UnsatisfiableAffordances {
    /// The components that turned out empty.
    pub components: Vec<AffordanceComponent>,
}

/// One or more affordance components are still universal where a concrete
/// choice is required.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("infinite affordances: universal {}", component_list(.components))]
pub struct InfiniteAffordances {
    /// The components that are still universal.
    pub components: Vec<AffordanceComponent>,
}

/// Errors raised while building a flag registry.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FlagRegistryError {
    /// Two flags were registered under the same name.
    #[error("flag '{name}' is registered more than once")]
    DuplicateFlag {
        /// The repeated name.
        name: String,
    },

    /// A flag implies a name that was never registered.
    #[error("flag '{flag}' implies unknown flag '{implied}'")]
    UnknownImplication {
        /// The implying flag.
        flag: String,
        /// The missing implied flag.
        implied: String,
    },

    /// A flag implies itself, directly or transitively.
    #[error("flag '{flag}' implies itself")]
    CyclicImplication {
        /// A flag on the cycle.
        flag: String,
    },

    /// More flags were registered than fit in a flag word.
    #[error("{count} flags exceed the registry capacity of {capacity}")]
    TooManyFlags {
        /// How many flags were offered.
        count: usize,
        /// The maximum number of flags.
        capacity: usize,
    },

    /// A lookup named a flag that is not registered.
    #[error("unknown flag '{name}'")]
    UnknownFlag {
        /// The unknown name.
        name: String,
    },
}

/// Required tokens are absent from a token map.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("missing tokens: {}", .names.join(", "))]
pub struct MissingTokens {
    /// The absent token names.
    pub names: Vec<String>,
}
