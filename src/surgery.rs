//! Moving the root without changing any leaf-to-leaf distance.
//!
//! # Overview
//! [`reroot_at_edge`] installs a new bifurcating root on an edge. The edge is
//! named by its child node and the split `x` is measured from that child:
//!
//! ```text
//!   before                    after
//!
//!   parent                      R
//!     |  L                   x /  \ L - x
//!   child                 child    parent
//! ```
//!
//! The edges on the path from `parent` up to the old root are turned around;
//! each keeps its length and support. If the old root is left as a
//! pass-through node it is suppressed, and its two edges merge into one.
//!
//! [`normalize_root`] does the opposite preparation for the edge scans of MAD
//! and MV: it dissolves the root bifurcation so every edge of the unrooted
//! tree appears exactly once.

use crate::error::{Result, RootingError};
use crate::tree::{NodeId, Tree};
use log::debug;

/// A chosen root position: an edge (by its child node), a split measured
/// from the child, and the score that selected it.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RootingResult {
    pub edge: NodeId,
    pub split: f64,
    pub score: f64,
}

impl RootingResult {
    /// Rooted copy of `tree`; `tree` itself is left untouched.
    pub fn apply(&self, tree: &Tree) -> Result<Tree> {
        let mut rooted = tree.clone();
        reroot_at_edge(&mut rooted, self.edge, self.split)?;
        Ok(rooted)
    }
}

/// Install a new root on the edge above `child`, `split` away from `child`.
///
/// Returns the id of the new root.
///
/// # Errors
/// `IllPosed` if `child` is the root or the only child of a unary root, or
/// `split` is not finite or lies outside `[0, L]` by more than
/// `1e-9 * max(1, L)`. Values inside that slack are clamped.
///
/// # Example
/// ```
/// # use tree_rooting::tree::Tree;
/// # use tree_rooting::surgery::reroot_at_edge;
/// let mut tree = Tree::from_newick("((A:1,B:2):1,(C:3,D:4):1);").unwrap();
/// let c = tree.find_leaf("C").unwrap();
/// let root = reroot_at_edge(&mut tree, c, 1.0).unwrap();
/// assert_eq!(tree.root(), root);
/// assert_eq!(tree.branch_length(c), 1.0);
/// ```
pub fn reroot_at_edge(tree: &mut Tree, child: NodeId, split: f64) -> Result<NodeId> {
    let parent = tree.parent(child).ok_or_else(|| {
        RootingError::IllPosed(format!("node {child} is the root and has no edge to split"))
    })?;
    let length = tree.branch_length(child);
    let split = checked_split(split, length)?;
    let old_root = tree.root();
    if parent == old_root && tree.children(old_root).len() == 1 {
        return Err(RootingError::IllPosed(format!(
            "edge above node {child} hangs from a unary root and lies on no leaf path"
        )));
    }

    // Turn the path parent -> old root around
    let path = tree.path_to_root(parent);
    let carried: Vec<(f64, Option<f64>)> = path
        .iter()
        .map(|&v| (tree.branch_length(v), tree.node(v).support))
        .collect();
    for (i, pair) in path.windows(2).enumerate() {
        let (lower, upper) = (pair[0], pair[1]);
        let (len, support) = carried[i];
        tree.node_mut(upper).children.retain(|&c| c != lower);
        let up = tree.node_mut(upper);
        up.parent = Some(lower);
        up.branch_length = len;
        up.support = support;
        tree.node_mut(lower).children.push(upper);
    }

    tree.node_mut(parent).children.retain(|&c| c != child);
    let child_support = tree.node(child).support;
    let root_name = tree.node_mut(old_root).name.take();

    let new_root = tree.push_node(None, 0.0);
    tree.node_mut(new_root).name = root_name;
    tree.node_mut(new_root).children = vec![child, parent];
    {
        let c = tree.node_mut(child);
        c.parent = Some(new_root);
        c.branch_length = split;
    }
    {
        let p = tree.node_mut(parent);
        p.parent = Some(new_root);
        p.branch_length = length - split;
        p.support = child_support;
    }
    tree.set_root(new_root);

    match tree.children(old_root).len() {
        0 => {
            // A unary old root: drop the stub, then tidy its former parent
            let above = tree.parent(old_root);
            tree.detach(old_root);
            if let Some(above) = above {
                suppress_pass_through(tree, above);
            }
        }
        1 => {
            suppress_pass_through(tree, old_root);
        }
        _ => {}
    }

    debug!("rerooted on edge above node {child} at {split} of {length}");
    Ok(new_root)
}

/// Root at the midpoint of the edge above `node` (outgroup convention).
pub fn set_outgroup(tree: &mut Tree, node: NodeId) -> Result<NodeId> {
    let half = tree.branch_length(node) / 2.0;
    reroot_at_edge(tree, node, half)
}

fn checked_split(split: f64, length: f64) -> Result<f64> {
    let slack = 1e-9 * length.max(1.0);
    if !split.is_finite() || split < -slack || split > length + slack {
        return Err(RootingError::IllPosed(format!(
            "split {split} is outside the edge of length {length}"
        )));
    }
    Ok(split.clamp(0.0, length))
}

/// Remove a non-root node with exactly one child, joining its two edges.
///
/// Returns `true` if the node was removed.
fn suppress_pass_through(tree: &mut Tree, node: NodeId) -> bool {
    let Some(parent) = tree.parent(node) else {
        return false;
    };
    if tree.children(node).len() != 1 {
        return false;
    }
    let only = tree.children(node)[0];
    let merged = tree.branch_length(only) + tree.branch_length(node);
    let only_support = tree.node(only).support;
    let node_support = tree.node(node).support;
    {
        let c = tree.node_mut(only);
        c.parent = Some(parent);
        c.branch_length = merged;
        c.support = only_support.or(node_support);
    }
    if let Some(slot) = tree.node_mut(parent).children.iter_mut().find(|c| **c == node) {
        *slot = only;
    }
    let n = tree.node_mut(node);
    n.parent = None;
    n.children.clear();
    true
}

/// Remove every non-root node with a single child.
pub fn suppress_pass_through_nodes(tree: &mut Tree) -> usize {
    tree.preorder()
        .into_iter()
        .filter(|&id| suppress_pass_through(tree, id))
        .count()
}

/// Dissolve the root bifurcation so each unrooted edge is represented once.
///
/// A unary root absorbs its child (the stub length is on no leaf path and is
/// dropped). A bifurcating root absorbs its first internal child, whose
/// length is added to the sibling's. Pass-through nodes elsewhere are
/// suppressed as well. Returns `true` if the tree changed.
///
/// # Example
/// ```
/// # use tree_rooting::tree::Tree;
/// # use tree_rooting::surgery::normalize_root;
/// let mut tree = Tree::from_newick("((A:1,B:2):1,(C:3,D:4):1);").unwrap();
/// assert!(normalize_root(&mut tree));
/// assert_eq!(tree.children(tree.root()).len(), 3);
/// assert_eq!(tree.total_length(), 12.0);
/// ```
pub fn normalize_root(tree: &mut Tree) -> bool {
    let mut changed = suppress_pass_through_nodes(tree) > 0;
    loop {
        let root = tree.root();
        let children = tree.children(root).to_vec();
        let dissolve = match children.as_slice() {
            [only] if !tree.is_leaf(*only) => Some((*only, None)),
            [c0, c1] if !tree.is_leaf(*c0) => Some((*c0, Some(*c1))),
            [c0, c1] if !tree.is_leaf(*c1) => Some((*c1, Some(*c0))),
            _ => None,
        };
        let Some((gone, keep)) = dissolve else {
            return changed;
        };

        if let Some(keep) = keep {
            let gone_len = tree.branch_length(gone);
            let gone_support = tree.node(gone).support;
            let k = tree.node_mut(keep);
            k.branch_length += gone_len;
            k.support = k.support.or(gone_support);
        }

        let grandchildren = tree.children(gone).to_vec();
        for &g in &grandchildren {
            tree.node_mut(g).parent = Some(root);
        }
        let adopted: Vec<NodeId> = children
            .iter()
            .flat_map(|&c| if c == gone { grandchildren.clone() } else { vec![c] })
            .collect();
        tree.node_mut(root).children = adopted;
        let g = tree.node_mut(gone);
        g.parent = None;
        g.children.clear();
        changed = true;

        // A bifurcation only needs folding once
        if keep.is_some() {
            return changed;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::distances::pairwise_leaf_distances;
    use approx::assert_relative_eq;
    use proptest::prelude::*;

    const TREE: &str = "((A:1,B:2)0.8:1,(C:3,(D:1,E:2)0.7:1)0.6:1);";

    fn assert_same_distances(before: &Tree, after: &Tree) {
        let a = pairwise_leaf_distances(before);
        let b = pairwise_leaf_distances(after);
        assert_eq!(a.len(), b.len());
        for (x, y) in a.iter().zip(&b) {
            assert_eq!((&x.0, &x.1), (&y.0, &y.1));
            assert!((x.2 - y.2).abs() < 1e-9, "{x:?} vs {y:?}");
        }
    }

    #[test]
    fn test_reroot_on_leaf_edge() {
        let before = Tree::from_newick(TREE).unwrap();
        let mut tree = before.clone();
        let c = tree.find_leaf("C").unwrap();
        let root = reroot_at_edge(&mut tree, c, 1.0).unwrap();

        assert_eq!(tree.children(root).len(), 2);
        assert_eq!(tree.children(root)[0], c);
        assert_relative_eq!(tree.branch_length(c), 1.0);
        let other = tree.children(root)[1];
        assert_relative_eq!(tree.branch_length(other), 2.0);
        assert_same_distances(&before, &tree);
        assert_relative_eq!(tree.total_length(), before.total_length());
    }

    #[test]
    fn test_old_root_suppressed_and_support_moves() {
        let before = Tree::from_newick(TREE).unwrap();
        let mut tree = before.clone();
        let d = tree.find_leaf("D").unwrap();
        let de = tree.parent(d).unwrap();
        reroot_at_edge(&mut tree, d, 0.25).unwrap();

        // old root had two children; after reversal it keeps only AB and is suppressed
        let a = tree.find_leaf("A").unwrap();
        let ab = tree.parent(a).unwrap();
        assert_relative_eq!(tree.branch_length(ab), 2.0);
        assert_eq!(tree.node(ab).support, Some(0.8));

        // the reversed edge between DE and CDE keeps its support and length
        let cde = tree.parent(tree.find_leaf("C").unwrap()).unwrap();
        assert_eq!(tree.parent(cde), Some(de));
        assert_eq!(tree.node(cde).support, Some(0.7));
        assert_relative_eq!(tree.branch_length(cde), 1.0);

        assert_same_distances(&before, &tree);
        assert_eq!(tree.preorder().len(), before.preorder().len());
    }

    #[test]
    fn test_split_bounds() {
        let mut tree = Tree::from_newick(TREE).unwrap();
        let c = tree.find_leaf("C").unwrap();
        assert!(reroot_at_edge(&mut tree, c, 3.5).is_err());
        assert!(reroot_at_edge(&mut tree, c, -0.1).is_err());
        assert!(reroot_at_edge(&mut tree, c, f64::NAN).is_err());

        let root = tree.root();
        assert!(matches!(
            reroot_at_edge(&mut tree, root, 0.0),
            Err(RootingError::IllPosed(_))
        ));

        reroot_at_edge(&mut tree, c, 3.0 + 1e-12).unwrap();
        assert_eq!(tree.branch_length(c), 3.0);
    }

    #[test]
    fn test_unary_old_root_removed() {
        let before = Tree::from_newick("(((A:1,B:2):1,C:3):5);").unwrap();
        let mut tree = before.clone();
        let a = tree.find_leaf("A").unwrap();
        reroot_at_edge(&mut tree, a, 0.5).unwrap();
        assert_same_distances(&before, &tree);
        assert_eq!(tree.leaf_count(), 3);
        // the stub above the unary root does not survive
        assert_relative_eq!(tree.total_length(), 7.0);
        for id in tree.preorder() {
            assert_ne!(tree.children(id).len(), 1);
        }
    }

    #[test]
    fn test_stub_below_unary_root_rejected() {
        let mut tree = Tree::from_newick("((A:1,B:2,C:3):5);").unwrap();
        let before = tree.to_newick().unwrap();
        let only = tree.children(tree.root())[0];
        assert!(matches!(
            reroot_at_edge(&mut tree, only, 2.0),
            Err(RootingError::IllPosed(_))
        ));
        assert_eq!(tree.to_newick().unwrap(), before);

        // any edge below the stub still yields a bifurcating root
        let a = tree.find_leaf("A").unwrap();
        let root = reroot_at_edge(&mut tree, a, 0.5).unwrap();
        assert_eq!(tree.children(root).len(), 2);
        assert_relative_eq!(tree.total_length(), 6.0);
    }

    #[test]
    fn test_set_outgroup_midpoint() {
        let mut tree = Tree::from_newick(TREE).unwrap();
        let e = tree.find_leaf("E").unwrap();
        set_outgroup(&mut tree, e).unwrap();
        assert_relative_eq!(tree.branch_length(e), 1.0);
        assert_relative_eq!(tree.depth(tree.find_leaf("D").unwrap()), 2.0);
    }

    #[test]
    fn test_normalize_bifurcating_root() {
        let before = Tree::from_newick(TREE).unwrap();
        let mut tree = before.clone();
        assert!(normalize_root(&mut tree));
        let root = tree.root();
        let names: Vec<_> = tree
            .children(root)
            .iter()
            .map(|&c| tree.name(c).map(str::to_string))
            .collect();
        // AB was dissolved: A, B, then the CDE clade
        assert_eq!(names[0].as_deref(), Some("A"));
        assert_eq!(names[1].as_deref(), Some("B"));
        let cde = tree.children(root)[2];
        assert_relative_eq!(tree.branch_length(cde), 2.0);
        assert_same_distances(&before, &tree);
        assert!(!normalize_root(&mut tree));
    }

    #[test]
    fn test_normalize_second_child_when_first_is_leaf() {
        let mut tree = Tree::from_newick("(A:2,(B:1,C:1):3);").unwrap();
        assert!(normalize_root(&mut tree));
        let a = tree.find_leaf("A").unwrap();
        assert_relative_eq!(tree.branch_length(a), 5.0);
        assert_eq!(tree.children(tree.root()).len(), 3);
    }

    #[test]
    fn test_normalize_unary_root_and_cherry() {
        let mut unary = Tree::from_newick("((A:1,B:2,C:3):4);").unwrap();
        assert!(normalize_root(&mut unary));
        assert_eq!(unary.children(unary.root()).len(), 3);
        assert_relative_eq!(unary.total_length(), 6.0);

        let mut cherry = Tree::from_newick("(A:1,B:2);").unwrap();
        assert!(!normalize_root(&mut cherry));
    }

    /// Deterministic random tree: repeatedly join two subtrees under a new node.
    fn random_newick(leaves: usize, seed: u64) -> String {
        let mut state = seed.wrapping_mul(6364136223846793005).wrapping_add(1442695040888963407);
        let mut next = move || {
            state = state.wrapping_mul(6364136223846793005).wrapping_add(1442695040888963407);
            (state >> 33) as usize
        };
        let mut parts: Vec<String> = (0..leaves)
            .map(|i| format!("t{i}:{}", (next() % 1000) as f64 / 100.0))
            .collect();
        while parts.len() > 2 {
            let i = next() % parts.len();
            let a = parts.swap_remove(i);
            let j = next() % parts.len();
            let b = parts.swap_remove(j);
            parts.push(format!("({a},{b}):{}", (next() % 1000) as f64 / 100.0));
        }
        format!("({});", parts.join(","))
    }

    proptest! {
        #[test]
        fn reroot_preserves_leaf_distances(
            leaves in 3usize..14,
            seed in any::<u64>(),
            edge_pick in any::<usize>(),
            fraction in 0.0f64..=1.0,
        ) {
            let before = Tree::from_newick(&random_newick(leaves, seed)).unwrap();
            let mut tree = before.clone();
            let edges = tree.edges();
            let edge = edges[edge_pick % edges.len()];
            let length = tree.branch_length(edge);
            // An edge below the bifurcating root merges with its sibling edge
            let old_root = tree.root();
            let sibling: f64 = if tree.parent(edge) == Some(old_root) {
                tree.children(old_root)
                    .iter()
                    .filter(|&&c| c != edge)
                    .map(|&c| tree.branch_length(c))
                    .sum()
            } else {
                0.0
            };

            let root = reroot_at_edge(&mut tree, edge, fraction * length).unwrap();

            let kids = tree.children(root).to_vec();
            prop_assert_eq!(kids.len(), 2);
            let adjacent: f64 = kids.iter().map(|&k| tree.branch_length(k)).sum();
            prop_assert!((adjacent - length - sibling).abs() < 1e-9);

            let a = pairwise_leaf_distances(&before);
            let b = pairwise_leaf_distances(&tree);
            prop_assert_eq!(a.len(), b.len());
            for (x, y) in a.iter().zip(&b) {
                prop_assert_eq!(&x.0, &y.0);
                prop_assert_eq!(&x.1, &y.1);
                prop_assert!((x.2 - y.2).abs() < 1e-6);
            }
        }
    }
}
