//! Minimum-variance (MV) rooting.
//!
//! # Algorithm
//! For an edge `(child, L)` with the root placed `x` above `child`, the
//! root-to-tip distances are `a_k + x` for the leaves below `child` and
//! `b_k + (L - x)` for the others, where `a_k` is measured from `child` and
//! `b_k` from the parent end of the edge. Their variance is a quadratic in
//! `x`, minimized at
//!
//! ```text
//! x* = (L + mean(b) - mean(a)) / 2      clamped to [0, L]
//! ```
//!
//! Every edge of the normalized tree is tried in preorder and the lowest
//! variance wins; on equal variance the earlier edge is kept.

use crate::distances::{DistanceEngine, validate_for_rooting};
use crate::error::{Result, RootingError};
use crate::surgery::{RootingResult, normalize_root, reroot_at_edge};
use crate::tree::Tree;
use log::{debug, info};

#[derive(Debug, Clone)]
pub struct MinVarRooting {
    pub tree: Tree,
    /// Chosen edge (id in the rooted tree), split from its child and the
    /// population variance of root-to-tip distances
    pub result: RootingResult,
}

/// Root `tree` at the point minimizing the variance of root-to-tip distances.
///
/// # Errors
/// `Malformed` for trees failing [`validate_for_rooting`].
///
/// # Example
/// ```
/// # use tree_rooting::tree::Tree;
/// # use tree_rooting::min_var::mv_root;
/// let tree = Tree::from_newick("((A:1,B:1):1,(C:1.5,D:1.5):0.5);").unwrap();
/// let outcome = mv_root(tree).unwrap();
/// assert!(outcome.result.score < 1e-12);
/// ```
pub fn mv_root(tree: Tree) -> Result<MinVarRooting> {
    let mut tree = tree;
    validate_for_rooting(&tree)?;
    normalize_root(&mut tree);

    let engine = DistanceEngine::new(&tree);
    let best = tree
        .edges()
        .into_iter()
        .map(|edge| {
            let length = tree.branch_length(edge);
            let a: Vec<f64> = engine
                .below(edge)
                .map(|k| engine.distance_to_leaf(edge, k))
                .collect();
            let b: Vec<f64> = engine
                .outside(edge)
                .map(|k| engine.distance_to_leaf(edge, k) - length)
                .collect();
            let split = ((length + mean(&b) - mean(&a)) / 2.0).clamp(0.0, length);
            let depths: Vec<f64> = a
                .iter()
                .map(|d| d + split)
                .chain(b.iter().map(|d| d + length - split))
                .collect();
            RootingResult {
                edge,
                split,
                score: population_variance(&depths),
            }
        })
        .inspect(|c| debug!("edge above node {}: variance {:.6} at {:.6}", c.edge, c.score, c.split))
        .fold(None, |best: Option<RootingResult>, candidate| match best {
            Some(b) if b.score <= candidate.score => Some(b),
            _ => Some(candidate),
        });

    // validation guarantees at least three edges
    let Some(result) = best else {
        return Err(RootingError::Malformed("tree has no branches".to_string()));
    };
    info!("MV rooting variance: {:.6}", result.score);

    reroot_at_edge(&mut tree, result.edge, result.split)?;
    Ok(MinVarRooting { tree, result })
}

fn mean(values: &[f64]) -> f64 {
    values.iter().sum::<f64>() / values.len() as f64
}

fn population_variance(values: &[f64]) -> f64 {
    let m = mean(values);
    values.iter().map(|v| (v - m).powi(2)).sum::<f64>() / values.len() as f64
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::distances::{pairwise_leaf_distances, root_to_tip};
    use approx::assert_relative_eq;

    const TREE: &str = "((A:1,B:2):1,(C:3,(D:1,E:2):1):1);";

    #[test]
    fn test_reference_split() {
        let outcome = mv_root(Tree::from_newick(TREE).unwrap()).unwrap();
        let tree = &outcome.tree;

        // the edge to (C,(D,E)) has length 2 after the root is dissolved
        let cde = tree.parent(tree.find_leaf("C").unwrap()).unwrap();
        assert_eq!(outcome.result.edge, cde);
        assert_relative_eq!(outcome.result.split, 5.0 / 12.0, epsilon = 1e-9);
        assert_relative_eq!(tree.branch_length(cde), 5.0 / 12.0, epsilon = 1e-9);

        let depths = root_to_tip(tree);
        let expected = [
            ("A", 31.0 / 12.0),
            ("B", 43.0 / 12.0),
            ("C", 41.0 / 12.0),
            ("D", 29.0 / 12.0),
            ("E", 41.0 / 12.0),
        ];
        for (name, want) in expected {
            let got = depths.iter().find(|(n, _)| n == name).unwrap().1;
            assert!((got - want).abs() < 1e-4, "{name}: {got} vs {want}");
        }
    }

    #[test]
    fn test_distances_preserved() {
        let original = Tree::from_newick(TREE).unwrap();
        let outcome = mv_root(original.clone()).unwrap();
        for (x, y) in pairwise_leaf_distances(&original)
            .iter()
            .zip(&pairwise_leaf_distances(&outcome.tree))
        {
            assert_eq!((&x.0, &x.1), (&y.0, &y.1));
            assert!((x.2 - y.2).abs() < 1e-9);
        }
        let root = outcome.tree.root();
        let adjacent: f64 = outcome
            .tree
            .children(root)
            .iter()
            .map(|&c| outcome.tree.branch_length(c))
            .sum();
        assert_relative_eq!(adjacent, 2.0, epsilon = 1e-9);
    }

    #[test]
    fn test_clock_like_tree() {
        let tree = Tree::from_newick("(((A:1,B:1):2,C:3):1,(D:2.5,E:2.5):1.5);").unwrap();
        let outcome = mv_root(tree).unwrap();
        assert!(outcome.result.score < 1e-12);
        for (_, depth) in root_to_tip(&outcome.tree) {
            assert_relative_eq!(depth, 4.0, epsilon = 1e-9);
        }
    }

    #[test]
    fn test_rejects_all_zero_lengths() {
        let err = mv_root(Tree::from_newick("((A:0,B:0):0,(C:0,D:0):0);").unwrap()).unwrap_err();
        assert!(err.is_malformed_input());
        let err = mv_root(Tree::from_newick("(A:1,B:1);").unwrap()).unwrap_err();
        assert!(err.is_malformed_input());
    }
}
