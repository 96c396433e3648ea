//! One entry point over every rooting method, for single trees and batches.
//!
//! A batch is processed strictly in order, one tree at a time. A tree that
//! fails yields its own `Err` and the batch moves on to the next tree.

use crate::error::Result;
use crate::mad::{MadOptions, mad_root};
use crate::midpoint::midpoint_root;
use crate::min_var::mv_root;
use crate::outgroup::{outgroup_root, transfer_root};
use crate::tree::Tree;
use log::{debug, error};

/// Rooting method and its parameters.
#[derive(Debug, Clone)]
pub enum RootMethod<'a> {
    Midpoint,
    Outgroup(Vec<String>),
    /// Copy the root split of a reference tree
    Transfer(&'a Tree),
    Mad {
        options: MadOptions,
        /// Keep only the tied root with the smallest clock CV
        single: bool,
    },
    MinVar,
}

impl RootMethod<'_> {
    pub fn name(&self) -> &'static str {
        match self {
            RootMethod::Midpoint => "midpoint",
            RootMethod::Outgroup(_) => "outgroup",
            RootMethod::Transfer(_) => "transfer",
            RootMethod::Mad { .. } => "mad",
            RootMethod::MinVar => "mv",
        }
    }
}

/// Method-specific statistics of one rooting.
#[derive(Debug, Clone, PartialEq)]
pub enum Diagnostics {
    Midpoint,
    Outgroup {
        clade: Vec<String>,
    },
    Transfer {
        outgroup: Vec<String>,
    },
    Mad {
        mad: f64,
        ambiguity_index: f64,
        /// Clock CV of each returned tree
        clock_cv: Vec<f64>,
        /// Statistics comment of each returned tree
        annotations: Vec<String>,
    },
    MinVar {
        variance: f64,
    },
}

/// Rooted tree(s) for one input tree. Only MAD can return more than one.
#[derive(Debug, Clone)]
pub struct Rooted {
    pub trees: Vec<Tree>,
    pub diagnostics: Diagnostics,
}

/// Root a single tree.
///
/// # Example
/// ```
/// # use tree_rooting::tree::Tree;
/// # use tree_rooting::root::{root_tree, RootMethod};
/// let tree = Tree::from_newick("(A:1,B:5,(C:2,D:4):2);").unwrap();
/// let rooted = root_tree(tree, &RootMethod::Midpoint).unwrap();
/// assert_eq!(rooted.trees.len(), 1);
/// ```
pub fn root_tree(tree: Tree, method: &RootMethod) -> Result<Rooted> {
    match method {
        RootMethod::Midpoint => Ok(Rooted {
            trees: vec![midpoint_root(tree)?],
            diagnostics: Diagnostics::Midpoint,
        }),
        RootMethod::Outgroup(labels) => {
            let rooted = outgroup_root(tree, labels.as_slice())?;
            Ok(Rooted {
                trees: vec![rooted.tree],
                diagnostics: Diagnostics::Outgroup {
                    clade: rooted.clade,
                },
            })
        }
        RootMethod::Transfer(source) => {
            let rooted = transfer_root(tree, source)?;
            Ok(Rooted {
                trees: vec![rooted.tree],
                diagnostics: Diagnostics::Transfer {
                    outgroup: rooted.outgroup,
                },
            })
        }
        RootMethod::Mad { options, single } => {
            let outcome = mad_root(tree, options)?;
            let picked: Vec<usize> = match (*single, outcome.best_by_clock_cv()) {
                (true, Some(best)) => vec![best],
                _ => (0..outcome.tie_count()).collect(),
            };
            let trees = picked
                .iter()
                .map(|&i| outcome.roots[i].result.apply(outcome.base_tree()))
                .collect::<Result<Vec<_>>>()?;
            Ok(Rooted {
                trees,
                diagnostics: Diagnostics::Mad {
                    mad: outcome.mad,
                    ambiguity_index: outcome.ambiguity_index,
                    clock_cv: picked.iter().map(|&i| outcome.roots[i].clock_cv).collect(),
                    annotations: picked.iter().map(|&i| outcome.annotation(i)).collect(),
                },
            })
        }
        RootMethod::MinVar => {
            let rooted = mv_root(tree)?;
            Ok(Rooted {
                trees: vec![rooted.tree],
                diagnostics: Diagnostics::MinVar {
                    variance: rooted.result.score,
                },
            })
        }
    }
}

/// Root every tree of a batch, in order.
///
/// Trees that could not even be read are passed in as `Err` and come out
/// unchanged; a failing tree never stops the batch.
pub fn root_batch<I>(trees: I, method: &RootMethod) -> Vec<Result<Rooted>>
where
    I: IntoIterator<Item = Result<Tree>>,
{
    trees
        .into_iter()
        .enumerate()
        .map(|(idx, tree)| {
            debug!("rooting tree {} with {}", idx + 1, method.name());
            let rooted = tree.and_then(|t| root_tree(t, method));
            if let Err(e) = &rooted {
                error!("tree {}: {e}", idx + 1);
            }
            rooted
        })
        .collect()
}
