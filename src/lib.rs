//! Crate root: module orchestration and public re-exports.
//!
//! Modules:
//! - `tree`: arena tree with stable node ids, Newick parsing and writing.
//! - `bitset`: compact bitset representation for leaf sets.
//! - `snapshot`: clade bitsets of a tree, used to match outgroups and splits.
//! - `distances`: node-to-leaf distance engine, tip deduplication, validation.
//! - `surgery`: rerooting on an edge and root normalization.
//! - `mad`: minimal ancestor deviation rooting.
//! - `min_var`: minimum variance rooting.
//! - `midpoint`: midpoint rooting.
//! - `outgroup`: outgroup rooting and root transfer between trees.
//! - `root`: one entry point over all methods, single tree or batch.
//! - `io`: reading and writing Newick files, plain or gzip.
//! - `api`: Python bindings via `pyo3` (gated behind "python" feature).

pub mod bitset;
pub mod distances;
pub mod error;
pub mod io;
pub mod mad;
pub mod midpoint;
pub mod min_var;
pub mod outgroup;
pub mod root;
pub mod snapshot;
pub mod surgery;
pub mod tree;

#[cfg(feature = "python")]
pub mod api;

// Re-export frequently used types & functions
pub use bitset::Bitset;
pub use error::{Result, RootingError};
pub use io::{read_newick_trees, write_lines};
pub use root::{Diagnostics, RootMethod, Rooted, root_batch, root_tree};
pub use snapshot::TreeSnapshot;
pub use tree::{NodeId, Tree};
