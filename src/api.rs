//! Python binding layer for tree rooting.
//!
//! Trees go in and come out as Newick strings; every error surfaces as
//! `ValueError`.

use pyo3::exceptions::PyValueError;
use pyo3::prelude::*;

use crate::error::RootingError;
use crate::mad::{MadOptions, mad_root};
use crate::root::{RootMethod, root_tree};
use crate::tree::Tree;

fn to_py_err(e: RootingError) -> PyErr {
    PyValueError::new_err(e.to_string())
}

fn mad_options(retain_tiny: bool) -> MadOptions {
    if retain_tiny {
        MadOptions::retain_tiny()
    } else {
        MadOptions::default()
    }
}

/// Root a Newick tree.
///
/// Args:
///     newick: The tree to root
///     method: One of "midpoint", "outgroup", "transfer", "mad", "mv"
///     outgroup: Leaf labels of the outgroup (method "outgroup")
///     reference: Newick tree whose root split is copied (method "transfer")
///     retain_tiny: Keep branch lengths down to 1e-15 (method "mad")
///
/// Returns:
///     A list of rooted Newick strings. It holds one tree except for MAD
///     with tied roots.
///
/// Raises:
///     ValueError: For unparsable or malformed trees, unknown methods,
///     missing method arguments, or requests the tree cannot satisfy
#[pyfunction]
#[pyo3(signature = (newick, method, outgroup=None, reference=None, retain_tiny=false))]
fn root_newick(
    newick: &str,
    method: &str,
    outgroup: Option<Vec<String>>,
    reference: Option<String>,
    retain_tiny: bool,
) -> PyResult<Vec<String>> {
    let tree = Tree::from_newick(newick).map_err(to_py_err)?;
    let reference = reference
        .as_deref()
        .map(Tree::from_newick)
        .transpose()
        .map_err(to_py_err)?;

    let method = match method {
        "midpoint" => RootMethod::Midpoint,
        "outgroup" => RootMethod::Outgroup(outgroup.ok_or_else(|| {
            PyValueError::new_err("method 'outgroup' needs the outgroup argument")
        })?),
        "transfer" => RootMethod::Transfer(reference.as_ref().ok_or_else(|| {
            PyValueError::new_err("method 'transfer' needs the reference argument")
        })?),
        "mad" => RootMethod::Mad {
            options: mad_options(retain_tiny),
            single: false,
        },
        "mv" => RootMethod::MinVar,
        other => {
            return Err(PyValueError::new_err(format!(
                "unknown rooting method '{other}'"
            )));
        }
    };

    let rooted = root_tree(tree, &method).map_err(to_py_err)?;
    rooted
        .trees
        .iter()
        .map(|t| t.to_newick().map_err(to_py_err))
        .collect()
}

/// MAD statistics of a Newick tree.
///
/// Returns:
///     A tuple (mad, ambiguity_index, clock_cv) where clock_cv lists the
///     clock coefficient of variation of every tied root
#[pyfunction]
#[pyo3(signature = (newick, retain_tiny=false))]
fn mad_statistics(newick: &str, retain_tiny: bool) -> PyResult<(f64, f64, Vec<f64>)> {
    let tree = Tree::from_newick(newick).map_err(to_py_err)?;
    let outcome = mad_root(tree, &mad_options(retain_tiny)).map_err(to_py_err)?;
    let clock_cv = outcome.roots.iter().map(|r| r.clock_cv).collect();
    Ok((outcome.mad, outcome.ambiguity_index, clock_cv))
}

/// Python module definition
#[pymodule]
fn tree_rooting(m: &Bound<'_, PyModule>) -> PyResult<()> {
    m.add_function(wrap_pyfunction!(root_newick, m)?)?;
    m.add_function(wrap_pyfunction!(mad_statistics, m)?)?;
    Ok(())
}
