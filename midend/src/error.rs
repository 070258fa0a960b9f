// error.rs — Fatal error taxonomy
//
// Two levels: ConfigurationError aborts the single installation being
// attempted; GraphInternalError aborts the whole compilation. Registry
// lookup failures are wrapped into ConfigurationError with the cause
// preserved. No error here is retryable — every operation is a
// deterministic graph transformation, so a failure is a programming or
// configuration defect.

use thiserror::Error;

use crate::graph::NodeId;

/// A failed lookup in the method registry.
#[derive(Debug, Clone, Error)]
pub enum LookupError {
    #[error("no class named '{0}' in registry")]
    UnknownClass(String),
    #[error("no method '{class}.{name}' in registry")]
    UnknownMethod { class: String, name: String },
    #[error("no type named '{0}' in registry")]
    UnknownType(String),
}

/// A malformed snippet or substitution declaration. Fatal to the single
/// installation being attempted, surfaced to the caller, never skipped.
#[derive(Debug, Error)]
pub enum ConfigurationError {
    #[error("snippet must not be abstract or native: {method}")]
    AbstractOrNativeSnippet { method: String },

    #[error("substitution methods must be static: {method}")]
    NonStaticSubstitution { method: String },

    #[error("substitution method must not be abstract or native: {method}")]
    AbstractOrNativeSubstitution { method: String },

    #[error("class '{class}' carries no substitution target")]
    MissingSubstitutionTarget { class: String },

    #[error("could not resolve type '{name}'")]
    UnresolvedType {
        name: String,
        #[source]
        source: LookupError,
    },

    #[error("could not resolve original method '{class}.{name}'")]
    UnresolvedOriginalMethod {
        class: String,
        name: String,
        #[source]
        source: LookupError,
    },

    #[error("could not resolve callee '{class}.{name}'")]
    UnresolvedCallee {
        class: String,
        name: String,
        #[source]
        source: LookupError,
    },

    #[error("substitution installation must run on the installer's owner thread")]
    WrongInstallerThread,

    #[error("malformed registry description: {0}")]
    MalformedRegistry(String),
}

/// An invariant violation inside the graph machinery. Fatal to the whole
/// compilation; always propagated up.
#[derive(Debug, Error)]
pub enum GraphInternalError {
    #[error("should not reach here: {0}")]
    ShouldNotReachHere(String),

    #[error("a graph is already installed for method '{method}'")]
    DuplicateInstallation { method: String },

    #[error("canonicalizer exceeded {limit} steps without reaching a fixed point")]
    NonTerminatingCanonicalization { limit: usize },

    #[error("canonicalization widened the stamp of node {node}")]
    WidenedStamp { node: NodeId },

    #[error("node {node} is not a live node of this graph")]
    DeadNode { node: NodeId },

    #[error("input {input} of a node being added is not a live node of this graph")]
    InvalidInput { input: NodeId },

    #[error("cannot delete node {node}: it still has {uses} uses")]
    DeleteWithUses { node: NodeId, uses: usize },

    #[error("no inlining policy registered under '{0}'")]
    UnknownInliningPolicy(String),

    #[error("graph verification failed: {0}")]
    Malformed(String),

    #[error("inline splice could not order callee nodes (cyclic data inputs)")]
    UnorderableCallee,
}

/// Top-level error type of the crate.
#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Configuration(#[from] ConfigurationError),
    #[error(transparent)]
    Internal(#[from] GraphInternalError),
}
