//! Patristic distances and the per-tree scratch state behind MAD and MV.
//!
//! # Overview
//! [`DistanceEngine`] holds, for one tree state, the distance from every node
//! to every leaf, laid out in one flat `Vec` indexed by `NodeId`:
//!
//! ```text
//! dist[node * n_leaves + leaf_position]
//! ```
//!
//! # Algorithm
//! 1. Leaves are numbered in preorder, so the leaves below any node occupy one
//!    contiguous range `lo..hi`; everything else is `0..lo` plus `hi..n`.
//! 2. A postorder pass fills the distances from each node to the leaves
//!    inside its subtree.
//! 3. A preorder pass fills the distances to the leaves outside the subtree,
//!    going through the parent.
//! 4. A union-find over zero-length edges groups nodes that sit at the same
//!    point of the tree. Tips in the same group are duplicates: the first in
//!    leaf order is kept as an "effective OTU" and the rest are redundant.
//!
//! Memory and time are O(nodes × leaves).
//!
//! The free functions below cover input checks shared by the rooting methods
//! (tiny-length contraction, validation) and a few whole-tree queries
//! (pairwise distances, diameter).

use crate::error::{Result, RootingError};
use crate::tree::{NodeId, Tree};
use itertools::Itertools;
use std::ops::Range;

/// Distance matrix and clustering of one tree state.
///
/// Built per rooting call and dropped afterwards. Any surgery on the tree
/// invalidates it.
#[derive(Debug, Clone)]
pub struct DistanceEngine {
    n: usize,
    /// Leaf node at each leaf position
    leaf_nodes: Vec<NodeId>,
    /// Leaf position of each node (None for internal or detached nodes)
    leaf_pos: Vec<Option<usize>>,
    lo: Vec<usize>,
    hi: Vec<usize>,
    /// Preorder entry index and subtree end, for ancestry tests
    tin: Vec<usize>,
    tout: Vec<usize>,
    dist: Vec<f64>,
    /// Zero-length cluster representative of each node
    cluster: Vec<usize>,
    /// Effective-OTU flag per leaf position
    effective: Vec<bool>,
    /// Leaf position of the effective OTU standing for each leaf position
    representative: Vec<usize>,
}

impl DistanceEngine {
    pub fn new(tree: &Tree) -> Self {
        let slots = tree.arena_len();
        let pre = tree.preorder();
        let post = tree.postorder();

        let mut leaf_nodes = Vec::new();
        let mut leaf_pos = vec![None; slots];
        let mut tin = vec![0; slots];
        for (i, &id) in pre.iter().enumerate() {
            tin[id] = i;
            if tree.is_leaf(id) {
                leaf_pos[id] = Some(leaf_nodes.len());
                leaf_nodes.push(id);
            }
        }
        let n = leaf_nodes.len();

        let mut lo = vec![0; slots];
        let mut hi = vec![0; slots];
        let mut size = vec![1usize; slots];
        for &id in &post {
            if let Some(p) = leaf_pos[id] {
                lo[id] = p;
                hi[id] = p + 1;
                continue;
            }
            let children = tree.children(id);
            lo[id] = children.first().map_or(0, |&c| lo[c]);
            hi[id] = children.last().map_or(0, |&c| hi[c]);
            size[id] = 1 + children.iter().map(|&c| size[c]).sum::<usize>();
        }
        let tout: Vec<usize> = (0..slots).map(|id| tin[id] + size[id]).collect();

        // Inside each subtree, bottom-up
        let mut dist = vec![0.0; slots * n];
        for &id in &post {
            for &child in tree.children(id) {
                let len = tree.branch_length(child);
                for k in lo[child]..hi[child] {
                    dist[id * n + k] = dist[child * n + k] + len;
                }
            }
        }
        // Outside each subtree, top-down through the parent
        for &id in &pre {
            let Some(parent) = tree.parent(id) else { continue };
            let len = tree.branch_length(id);
            for k in (0..lo[id]).chain(hi[id]..n) {
                dist[id * n + k] = dist[parent * n + k] + len;
            }
        }

        let mut uf: Vec<usize> = (0..slots).collect();
        for &id in &pre {
            if let Some(parent) = tree.parent(id) {
                if tree.branch_length(id) == 0.0 {
                    union(&mut uf, id, parent);
                }
            }
        }
        let cluster: Vec<usize> = (0..slots).map(|id| find(&mut uf, id)).collect();

        let mut effective = vec![false; n];
        let mut representative = vec![0; n];
        let mut first_in_cluster: Vec<Option<usize>> = vec![None; slots];
        for (pos, &leaf) in leaf_nodes.iter().enumerate() {
            let c = cluster[leaf];
            match first_in_cluster[c] {
                Some(rep) => representative[pos] = rep,
                None => {
                    first_in_cluster[c] = Some(pos);
                    effective[pos] = true;
                    representative[pos] = pos;
                }
            }
        }

        DistanceEngine {
            n,
            leaf_nodes,
            leaf_pos,
            lo,
            hi,
            tin,
            tout,
            dist,
            cluster,
            effective,
            representative,
        }
    }

    pub fn leaf_count(&self) -> usize {
        self.n
    }

    pub fn effective_otus(&self) -> usize {
        self.effective.iter().filter(|&&e| e).count()
    }

    pub fn redundant_tips(&self) -> usize {
        self.n - self.effective_otus()
    }

    pub fn leaf_node(&self, pos: usize) -> NodeId {
        self.leaf_nodes[pos]
    }

    pub fn leaf_position(&self, node: NodeId) -> Option<usize> {
        self.leaf_pos.get(node).copied().flatten()
    }

    pub fn is_effective(&self, pos: usize) -> bool {
        self.effective[pos]
    }

    /// Leaf position of the effective OTU that stands for `pos`.
    pub fn representative(&self, pos: usize) -> usize {
        self.representative[pos]
    }

    /// Zero-length cluster of a node.
    pub fn cluster_of(&self, node: NodeId) -> usize {
        self.cluster[node]
    }

    #[inline]
    pub fn distance_to_leaf(&self, node: NodeId, pos: usize) -> f64 {
        self.dist[node * self.n + pos]
    }

    pub fn leaf_distance(&self, a: usize, b: usize) -> f64 {
        self.distance_to_leaf(self.leaf_nodes[a], b)
    }

    /// True when `ancestor` is `node` or lies above it.
    pub fn is_ancestor(&self, ancestor: NodeId, node: NodeId) -> bool {
        self.tin[ancestor] <= self.tin[node] && self.tin[node] < self.tout[ancestor]
    }

    /// Leaf positions below `node`.
    pub fn below(&self, node: NodeId) -> Range<usize> {
        self.lo[node]..self.hi[node]
    }

    /// Leaf positions outside the subtree of `node`.
    pub fn outside(&self, node: NodeId) -> impl Iterator<Item = usize> + '_ {
        (0..self.lo[node]).chain(self.hi[node]..self.n)
    }

    /// Distances from `node` to the effective OTUs below it.
    pub fn effective_below(&self, node: NodeId) -> Vec<f64> {
        self.below(node)
            .filter(|&k| self.effective[k])
            .map(|k| self.distance_to_leaf(node, k))
            .collect()
    }

    /// Distances from `node` to the effective OTUs outside its subtree.
    pub fn effective_outside(&self, node: NodeId) -> Vec<f64> {
        self.outside(node)
            .filter(|&k| self.effective[k])
            .map(|k| self.distance_to_leaf(node, k))
            .collect()
    }

    /// Index of the branch-direction at `node` that leads towards `target`.
    ///
    /// Directions are the children in order, then the parent (index
    /// `children.len()`). `target` must differ from `node`.
    pub fn direction_toward(&self, tree: &Tree, node: NodeId, target: NodeId) -> usize {
        let children = tree.children(node);
        if self.is_ancestor(node, target) {
            if let Some(i) = children.iter().position(|&c| self.is_ancestor(c, target)) {
                return i;
            }
        }
        children.len()
    }

    /// Distances from `node` to the effective OTUs reached through each of
    /// its branch-directions (children in order, then the parent if any).
    pub fn direction_distances(&self, tree: &Tree, node: NodeId) -> Vec<Vec<f64>> {
        let mut dirs: Vec<Vec<f64>> = tree
            .children(node)
            .iter()
            .map(|&c| {
                self.below(c)
                    .filter(|&k| self.effective[k])
                    .map(|k| self.distance_to_leaf(node, k))
                    .collect()
            })
            .collect();
        if tree.parent(node).is_some() {
            dirs.push(self.effective_outside(node));
        }
        dirs
    }
}

fn find(uf: &mut [usize], mut x: usize) -> usize {
    while uf[x] != x {
        uf[x] = uf[uf[x]];
        x = uf[x];
    }
    x
}

fn union(uf: &mut [usize], a: usize, b: usize) {
    let ra = find(uf, a);
    let rb = find(uf, b);
    if ra != rb {
        uf[ra.max(rb)] = ra.min(rb);
    }
}

/// Set every branch length in `(0, tolerance)` to exactly 0.0.
///
/// Returns the number of lengths converted.
pub fn contract_tiny_branches(tree: &mut Tree, tolerance: f64) -> usize {
    let mut converted = 0;
    for id in tree.edges() {
        let len = tree.branch_length(id);
        if len > 0.0 && len < tolerance {
            tree.node_mut(id).branch_length = 0.0;
            converted += 1;
        }
    }
    converted
}

/// Structural checks shared by MAD and MV.
///
/// # Errors
/// `Malformed` when the tree has fewer than 3 leaves, unnamed or duplicate
/// leaves, fewer than 3 strictly positive branch lengths, or a zero total
/// length.
pub fn validate_for_rooting(tree: &Tree) -> Result<()> {
    let leaves = tree.leaf_count();
    if leaves < 3 {
        return Err(RootingError::Malformed(format!(
            "tree has {leaves} leaves; at least 3 are needed to root it"
        )));
    }
    tree.check_leaf_names()?;

    let lengths: Vec<f64> = tree.edges().iter().map(|&id| tree.branch_length(id)).collect();
    let positive = lengths.iter().filter(|&&l| l > 0.0).count();
    if positive < 3 {
        return Err(RootingError::Malformed(format!(
            "tree has {positive} positive branch lengths; at least 3 are needed"
        )));
    }
    let total: f64 = lengths.iter().sum();
    if total <= 0.0 {
        return Err(RootingError::Malformed("total branch length is zero".to_string()));
    }
    Ok(())
}

/// Number of equal neighbours among the sorted positive branch lengths.
pub fn repeated_length_count(tree: &Tree) -> usize {
    tree.edges()
        .iter()
        .map(|&id| tree.branch_length(id))
        .filter(|&l| l > 0.0)
        .sorted_by(f64::total_cmp)
        .tuple_windows()
        .filter(|(a, b)| a == b)
        .count()
}

/// All leaf pairs as `(name, name, distance)`, names ordered within each pair
/// and pairs sorted.
pub fn pairwise_leaf_distances(tree: &Tree) -> Vec<(String, String, f64)> {
    let engine = DistanceEngine::new(tree);
    let names: Vec<String> = tree.leaf_names();
    (0..engine.leaf_count())
        .tuple_combinations()
        .map(|(i, j)| {
            let d = engine.leaf_distance(i, j);
            let (a, b) = (names[i].clone(), names[j].clone());
            if a <= b { (a, b, d) } else { (b, a, d) }
        })
        .sorted_by(|x, y| (&x.0, &x.1).cmp(&(&y.0, &y.1)))
        .collect()
}

/// Two leaves realizing the largest pairwise distance.
///
/// Pairs are visited in leaf order and only a strictly larger distance
/// replaces the current best, so the first maximal pair wins.
pub fn diameter(tree: &Tree) -> Option<(NodeId, NodeId, f64)> {
    let engine = DistanceEngine::new(tree);
    let mut best: Option<(NodeId, NodeId, f64)> = None;
    for (i, j) in (0..engine.leaf_count()).tuple_combinations() {
        let d = engine.leaf_distance(i, j);
        if best.is_none_or(|(_, _, b)| d > b) {
            best = Some((engine.leaf_node(i), engine.leaf_node(j), d));
        }
    }
    best
}

/// Root-to-tip distance of every leaf, in leaf order.
pub fn root_to_tip(tree: &Tree) -> Vec<(String, f64)> {
    let engine = DistanceEngine::new(tree);
    let root = tree.root();
    tree.leaf_names()
        .into_iter()
        .enumerate()
        .map(|(k, name)| (name, engine.distance_to_leaf(root, k)))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    const TREE: &str = "((A:1,B:2):1,(C:3,(D:1,E:2):1):1);";

    fn pair(pairs: &[(String, String, f64)], a: &str, b: &str) -> f64 {
        pairs
            .iter()
            .find(|(x, y, _)| x == a && y == b)
            .map(|p| p.2)
            .unwrap()
    }

    #[test]
    fn test_pairwise_distances() {
        let tree = Tree::from_newick(TREE).unwrap();
        let pairs = pairwise_leaf_distances(&tree);
        assert_eq!(pairs.len(), 10);
        assert_relative_eq!(pair(&pairs, "A", "B"), 3.0);
        assert_relative_eq!(pair(&pairs, "A", "C"), 6.0);
        assert_relative_eq!(pair(&pairs, "B", "E"), 7.0);
        assert_relative_eq!(pair(&pairs, "C", "D"), 5.0);
        assert_relative_eq!(pair(&pairs, "D", "E"), 3.0);
    }

    #[test]
    fn test_node_to_leaf_both_directions() {
        let tree = Tree::from_newick(TREE).unwrap();
        let engine = DistanceEngine::new(&tree);
        let d = tree.find_leaf("D").unwrap();
        let de = tree.parent(d).unwrap();
        let a_pos = engine.leaf_position(tree.find_leaf("A").unwrap()).unwrap();
        let e_pos = engine.leaf_position(tree.find_leaf("E").unwrap()).unwrap();

        assert_relative_eq!(engine.distance_to_leaf(de, e_pos), 2.0);
        assert_relative_eq!(engine.distance_to_leaf(de, a_pos), 4.0);
        assert_eq!(engine.below(de), 3..5);
        assert_eq!(engine.outside(de).collect::<Vec<_>>(), vec![0, 1, 2]);
        assert_eq!(engine.effective_below(de).len(), 2);
        assert_eq!(engine.effective_outside(de).len(), 3);
    }

    #[test]
    fn test_directions() {
        let tree = Tree::from_newick(TREE).unwrap();
        let engine = DistanceEngine::new(&tree);
        let d = tree.find_leaf("D").unwrap();
        let a = tree.find_leaf("A").unwrap();
        let de = tree.parent(d).unwrap();
        let cde = tree.parent(de).unwrap();

        assert_eq!(engine.direction_toward(&tree, cde, d), 1);
        assert_eq!(engine.direction_toward(&tree, cde, a), 2);
        assert!(engine.is_ancestor(cde, d));
        assert!(!engine.is_ancestor(de, a));

        let dirs = engine.direction_distances(&tree, cde);
        assert_eq!(dirs.len(), 3);
        assert_eq!(dirs[0], vec![3.0]);
        assert_eq!(dirs[1], vec![2.0, 3.0]);
        assert_eq!(dirs[2], vec![3.0, 4.0]);
    }

    #[test]
    fn test_duplicate_tips_squeezed() {
        let tree = Tree::from_newick("((A:0,B:0):1,C:2,(D:3,E:1.5):0.5);").unwrap();
        let engine = DistanceEngine::new(&tree);
        assert_eq!(engine.leaf_count(), 5);
        assert_eq!(engine.effective_otus(), 4);
        assert_eq!(engine.redundant_tips(), 1);
        assert!(engine.is_effective(0));
        assert!(!engine.is_effective(1));
        assert_eq!(engine.representative(1), 0);

        let a = tree.find_leaf("A").unwrap();
        let b = tree.find_leaf("B").unwrap();
        assert_eq!(engine.cluster_of(a), engine.cluster_of(b));
        assert_eq!(engine.cluster_of(a), engine.cluster_of(tree.parent(a).unwrap()));
    }

    #[test]
    fn test_contract_tiny() {
        let mut tree = Tree::from_newick("((A:1e-9,B:2):1,(C:3,D:5e-7):1e-3);").unwrap();
        assert_eq!(contract_tiny_branches(&mut tree, 1e-6), 2);
        let a = tree.find_leaf("A").unwrap();
        assert_eq!(tree.branch_length(a), 0.0);

        let mut kept = Tree::from_newick("((A:1e-9,B:2):1,(C:3,D:5e-7):1e-3);").unwrap();
        assert_eq!(contract_tiny_branches(&mut kept, 1e-15), 0);
    }

    #[test]
    fn test_validation() {
        let ok = Tree::from_newick(TREE).unwrap();
        assert!(validate_for_rooting(&ok).is_ok());

        let two = Tree::from_newick("(A:1,B:2);").unwrap();
        assert!(validate_for_rooting(&two).unwrap_err().is_malformed_input());

        let zero = Tree::from_newick("((A:0,B:0):0,C:0);").unwrap();
        assert!(validate_for_rooting(&zero).is_err());

        let two_positive = Tree::from_newick("((A:1,B:0):0,C:2);").unwrap();
        assert!(validate_for_rooting(&two_positive).is_err());

        let dup = Tree::from_newick("((A:1,B:2):1,A:3);").unwrap();
        assert!(validate_for_rooting(&dup).is_err());
    }

    #[test]
    fn test_repeated_lengths() {
        let tree = Tree::from_newick(TREE).unwrap();
        // sorted: 1,1,1,1,1,2,2,3
        assert_eq!(repeated_length_count(&tree), 5);
    }

    #[test]
    fn test_diameter_first_pair_wins() {
        let tree = Tree::from_newick("(A:1,B:5,(C:2,D:4):2);").unwrap();
        let (u, v, d) = diameter(&tree).unwrap();
        assert_eq!(tree.name(u), Some("B"));
        assert_eq!(tree.name(v), Some("D"));
        assert_relative_eq!(d, 11.0);

        let tie = Tree::from_newick("((A:1,B:1):1,(C:1,D:1):1);").unwrap();
        let (u, v, _) = diameter(&tie).unwrap();
        assert_eq!((tree_name(&tie, u), tree_name(&tie, v)), ("A", "C"));
    }

    fn tree_name(tree: &Tree, id: NodeId) -> &str {
        tree.name(id).unwrap()
    }

    #[test]
    fn test_root_to_tip() {
        let tree = Tree::from_newick(TREE).unwrap();
        let depths = root_to_tip(&tree);
        assert_eq!(depths[0], ("A".to_string(), 2.0));
        assert_eq!(depths[4], ("E".to_string(), 4.0));
    }
}
