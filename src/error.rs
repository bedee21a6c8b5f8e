//! Error types for building, combining, and exporting interchange objects.
//!
//! Structural validation (box shape, position/atom-count consistency) is
//! performed eagerly at assignment time, so an [`Interchange`](crate::Interchange)
//! can never hold a structurally invalid box or position array. Import-time
//! family-support validation runs before any handler is built, and export-time
//! validation runs before any output is written.

use thiserror::Error;

/// Errors that can occur while building, querying, combining, or exporting
/// an [`Interchange`](crate::Interchange).
#[derive(Debug, Error)]
pub enum Error {
    /// A topology argument could not be processed.
    #[error("could not process topology: {0}")]
    InvalidTopology(String),

    /// A box was supplied with a shape other than a 3-vector or 3x3 matrix.
    #[error("invalid box: expected a 3-vector or a 3x3 matrix, got {0}")]
    InvalidBox(String),

    /// A position array is inconsistent with the topology it accompanies.
    #[error("invalid positions: expected {expected} rows to match the topology atom count, got {found}")]
    InvalidPositions {
        /// Atom count of the associated topology.
        expected: usize,
        /// Number of position rows supplied.
        found: usize,
    },

    /// An export requiring particle positions was invoked without them set.
    #[error("positions are required to write a {0} file but none are set")]
    MissingPositions(&'static str),

    /// A handler family was looked up that is not present in the registry.
    #[error("no potential handler of name '{0}' is registered")]
    MissingParameterHandler(String),

    /// A typed interaction has no matching entry in the force field tables.
    #[error("missing force field parameters for {family} pattern '{pattern}'")]
    MissingParameters {
        /// Canonical family name.
        family: String,
        /// The atom-type pattern that failed to resolve.
        pattern: String,
    },

    /// An invariant expected to always hold was violated.
    #[error("internal inconsistency: {0}")]
    InternalInconsistency(String),

    /// One or more source interaction families are outside the supported set.
    ///
    /// All offending names are collected and reported together; construction
    /// never fails fast on the first unsupported name.
    #[error("source force field registers unsupported handler(s): {}", .0.join(", "))]
    UnsupportedHandlers(Vec<String>),

    /// The requested writer backend is not implemented for the target format.
    #[error("writer backend '{backend}' is not implemented for {format} export")]
    UnsupportedExport {
        /// Target file format or object kind.
        format: &'static str,
        /// The backend that was requested.
        backend: String,
    },

    /// A nonbonded method combination was rejected by an export backend.
    #[error("nonbonded method '{method}' for {family} is not supported by the {backend} backend")]
    UnsupportedMethod {
        /// Canonical family name (vdW or Electrostatics).
        family: String,
        /// The offending method.
        method: String,
        /// The backend that rejected it.
        backend: &'static str,
    },

    /// Two interchange objects could not be combined.
    #[error("cannot combine interchange objects: {0}")]
    Incompatible(String),

    /// A potential key collided during combination under a policy that
    /// forbids the collision.
    #[error("potential key conflict in handler '{family}' for id '{id}': {detail}")]
    PotentialKeyConflict {
        /// Canonical family name of the handler holding the collision.
        family: String,
        /// The colliding potential key id.
        id: String,
        /// Description of the conflict.
        detail: String,
    },

    /// Item-style lookup failed to resolve a key.
    #[error("could not find component '{key}'; registered handlers: [{}]", .registered.join(", "))]
    Lookup {
        /// The key that failed to resolve.
        key: String,
        /// Handler names currently registered on the aggregate.
        registered: Vec<String>,
    },

    /// Failed to parse a force field definition.
    #[error("failed to parse force field definition: {0}")]
    ForceFieldParse(#[from] toml::de::Error),

    /// An I/O operation failed during export.
    #[error("I/O operation failed: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Creates a [`MissingParameters`](Error::MissingParameters) error.
    pub fn missing_parameters(family: impl Into<String>, pattern: impl Into<String>) -> Self {
        Self::MissingParameters {
            family: family.into(),
            pattern: pattern.into(),
        }
    }

    /// Creates a [`PotentialKeyConflict`](Error::PotentialKeyConflict) error.
    pub fn potential_key_conflict(
        family: impl Into<String>,
        id: impl Into<String>,
        detail: impl Into<String>,
    ) -> Self {
        Self::PotentialKeyConflict {
            family: family.into(),
            id: id.into(),
            detail: detail.into(),
        }
    }

    /// Creates a [`Lookup`](Error::Lookup) error listing the registered handlers.
    pub fn lookup(key: impl Into<String>, registered: Vec<String>) -> Self {
        Self::Lookup {
            key: key.into(),
            registered,
        }
    }
}
