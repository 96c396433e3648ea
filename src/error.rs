//! Error taxonomy for rooting operations.
//!
//! Three families, matching how callers are expected to react:
//! - malformed input: the tree itself is unusable (skip it in a batch);
//! - ill-posed request: the tree is fine but the request cannot be honored;
//! - internal consistency: a score left its mathematical range, which means a
//!   bug. The offending tree travels with the error.

use phylotree::tree::TreeError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum RootingError {
    /// I/O error while reading or writing tree files
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Newick text the collaborator could not parse
    #[error("Newick parse error: {0}")]
    Parse(String),

    /// Error raised by the phylotree collaborator on a parsed tree
    #[error("tree error: {0}")]
    Tree(String),

    /// Structurally unusable input (lengths, leaf names, too few leaves...)
    #[error("malformed tree: {0}")]
    Malformed(String),

    /// Request that cannot be satisfied on this tree
    #[error("ill-posed request: {0}")]
    IllPosed(String),

    /// A score escaped its valid range. Never clamp this.
    #[error("internal consistency failure: {message}\ninput tree: {tree}")]
    Consistency { message: String, tree: String },
}

impl From<TreeError> for RootingError {
    fn from(e: TreeError) -> Self {
        RootingError::Tree(e.to_string())
    }
}

impl RootingError {
    /// True for errors caused by the tree itself rather than the request.
    pub fn is_malformed_input(&self) -> bool {
        matches!(self, RootingError::Parse(_) | RootingError::Malformed(_))
    }
}

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, RootingError>;
