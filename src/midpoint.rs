//! Midpoint rooting: the root goes halfway along the longest leaf-to-leaf path.

use crate::distances::diameter;
use crate::error::{Result, RootingError};
use crate::surgery::{normalize_root, reroot_at_edge};
use crate::tree::{NodeId, Tree};
use log::debug;

/// Relative tolerance for "the current root already is the midpoint".
const SAME_POINT: f64 = 1e-9;

/// Root `tree` at the midpoint of its diameter.
///
/// The diameter is the first leaf pair (in leaf order) at maximal distance.
/// A bifurcating root that already sits on that path at half its length is
/// kept as is.
///
/// # Errors
/// `Malformed` for trees with fewer than two leaves or a zero diameter.
///
/// # Example
/// ```
/// # use tree_rooting::tree::Tree;
/// # use tree_rooting::midpoint::midpoint_root;
/// let tree = Tree::from_newick("(A:1,B:5,(C:2,D:4):2);").unwrap();
/// let rooted = midpoint_root(tree).unwrap();
/// let b = rooted.find_leaf("B").unwrap();
/// assert!((rooted.depth(b) - 5.5).abs() < 1e-9);
/// ```
pub fn midpoint_root(tree: Tree) -> Result<Tree> {
    let mut tree = tree;
    let leaves = tree.leaf_count();
    if leaves < 2 {
        return Err(RootingError::Malformed(format!(
            "tree has {leaves} leaves; midpoint rooting needs at least 2"
        )));
    }
    let Some((u, v, length)) = diameter(&tree) else {
        return Err(RootingError::Malformed("tree has no leaf pair".to_string()));
    };
    if length <= 0.0 {
        return Err(RootingError::Malformed("tree diameter is zero".to_string()));
    }
    let half = length / 2.0;
    debug!(
        "diameter {length} between {} and {}",
        tree.name(u).unwrap_or("<unnamed>"),
        tree.name(v).unwrap_or("<unnamed>")
    );

    let root = tree.root();
    if tree.children(root).len() == 2
        && tree.mrca(&[u, v]) == Some(root)
        && (tree.depth(u) - half).abs() <= SAME_POINT * length.max(1.0)
    {
        debug!("root already at the midpoint");
        return Ok(tree);
    }

    normalize_root(&mut tree);
    let (edge, split) = locate(&tree, u, v, half)?;
    reroot_at_edge(&mut tree, edge, split)?;
    Ok(tree)
}

/// Edge on the `u`–`v` path holding the point `half` away from either end,
/// and the split measured from that edge's child.
fn locate(tree: &Tree, u: NodeId, v: NodeId, half: f64) -> Result<(NodeId, f64)> {
    let top = tree
        .mrca(&[u, v])
        .ok_or_else(|| RootingError::Malformed("diameter leaves are not connected".to_string()))?;

    // Walk up from each end; the side reaching `half` first holds the point
    for end in [u, v] {
        let mut walked = 0.0;
        let mut node = end;
        while node != top {
            let length = tree.branch_length(node);
            if walked + length >= half {
                return Ok((node, half - walked));
            }
            walked += length;
            match tree.parent(node) {
                Some(p) => node = p,
                None => break,
            }
        }
    }

    Err(RootingError::Malformed(
        "midpoint not found on the diameter path".to_string(),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::distances::{pairwise_leaf_distances, root_to_tip};
    use approx::assert_relative_eq;

    fn depth_of(tree: &Tree, name: &str) -> f64 {
        tree.depth(tree.find_leaf(name).unwrap())
    }

    #[test]
    fn test_midpoint_inside_internal_edge() {
        let original = Tree::from_newick("(A:1,B:5,(C:2,D:4):2);").unwrap();
        let rooted = midpoint_root(original.clone()).unwrap();

        assert_eq!(rooted.children(rooted.root()).len(), 2);
        assert_relative_eq!(depth_of(&rooted, "B"), 5.5, epsilon = 1e-9);
        assert_relative_eq!(depth_of(&rooted, "D"), 5.5, epsilon = 1e-9);
        assert_relative_eq!(depth_of(&rooted, "A"), 1.5, epsilon = 1e-9);
        assert_relative_eq!(depth_of(&rooted, "C"), 3.5, epsilon = 1e-9);

        for (x, y) in pairwise_leaf_distances(&original)
            .iter()
            .zip(&pairwise_leaf_distances(&rooted))
        {
            assert!((x.2 - y.2).abs() < 1e-9);
        }
    }

    #[test]
    fn test_midpoint_on_leaf_edge() {
        let rooted = midpoint_root(Tree::from_newick("((A:1,B:1):1,C:10);").unwrap()).unwrap();
        // diameter A-C = 12, midpoint 6 from C on C's own edge
        let c = rooted.find_leaf("C").unwrap();
        assert_eq!(rooted.parent(c), Some(rooted.root()));
        assert_relative_eq!(rooted.branch_length(c), 6.0, epsilon = 1e-9);
        assert_relative_eq!(depth_of(&rooted, "A"), 6.0, epsilon = 1e-9);
    }

    #[test]
    fn test_already_rooted_at_midpoint() {
        let original = Tree::from_newick("((A:1,B:1):1,(C:1,D:1):1);").unwrap();
        let before = original.to_newick().unwrap();
        let rooted = midpoint_root(original).unwrap();
        assert_eq!(rooted.to_newick().unwrap(), before);
        for (_, depth) in root_to_tip(&rooted) {
            assert_relative_eq!(depth, 2.0);
        }
    }

    #[test]
    fn test_rejections() {
        let zero = midpoint_root(Tree::from_newick("((A:0,B:0):0,C:0);").unwrap());
        assert!(zero.unwrap_err().is_malformed_input());
    }
}
