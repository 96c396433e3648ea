//! Clade snapshots: the leaf set below every node, as name-indexed bitsets.
//!
//! # Overview
//! A `TreeSnapshot` records, for each reachable node, which leaves sit below
//! it. Outgroup and transfer rooting use it to ask "which node spans exactly
//! these leaves?" and "is this clade the whole tree?".
//!
//! # Why names and not node ids
//! Node ids depend on parse order and on past surgery, so they differ between
//! a reference tree and a target tree. Leaf names do not. Leaves are sorted
//! alphabetically by name, and the position in that order is the bit index,
//! so the same clade gets the same bitset in both trees.
//!
//! A snapshot is taken of one tree state. Surgery creates new nodes and
//! detaches others; take a fresh snapshot afterwards.

use crate::bitset::Bitset;
use crate::error::{Result, RootingError};
use crate::tree::{NodeId, Tree};
use std::collections::HashMap;

/// Clades of one tree state.
///
/// # Fields
/// - `leaf_names`: leaf names sorted alphabetically; position = bit index
/// - `clades`: leaf set of every reachable node, indexed by `NodeId`
///   (`None` for detached arena slots)
/// - `root_children`: clades of the root's children, in child order
/// - `words`: number of u64 words per bitset
/// - `num_leaves`: total number of leaves
#[derive(Debug, Clone)]
pub struct TreeSnapshot {
    pub leaf_names: Vec<String>,
    clades: Vec<Option<Bitset>>,
    pub root_children: Vec<Bitset>,
    pub words: usize,
    pub num_leaves: usize,
    index: HashMap<String, usize>,
}

impl TreeSnapshot {
    /// Take a snapshot of `tree`.
    ///
    /// # Algorithm
    /// 1. Sort leaf names alphabetically and map each name to a bit index
    /// 2. Walk the tree in postorder: a leaf sets its own bit, an internal
    ///    node ORs its children's bitsets
    ///
    /// # Errors
    /// `Malformed` if a leaf has no name or two leaves share one.
    pub fn from_tree(tree: &Tree) -> Result<Self> {
        tree.check_leaf_names()?;

        let mut leaf_names = tree.leaf_names();
        leaf_names.sort();
        let num_leaves = leaf_names.len();
        let words = Bitset::words_for(num_leaves);
        let index: HashMap<String, usize> = leaf_names
            .iter()
            .enumerate()
            .map(|(i, name)| (name.clone(), i))
            .collect();

        let mut clades: Vec<Option<Bitset>> = vec![None; tree.arena_len()];
        for id in tree.postorder() {
            let mut bits = Bitset::zeros(words);
            if tree.is_leaf(id) {
                // check_leaf_names guarantees every leaf is named and indexed
                if let Some(&idx) = tree.name(id).and_then(|n| index.get(n)) {
                    bits.set(idx);
                }
            } else {
                for &child in tree.children(id) {
                    if let Some(child_bits) = &clades[child] {
                        bits.or_assign(child_bits);
                    }
                }
            }
            clades[id] = Some(bits);
        }

        let root_children = tree
            .children(tree.root())
            .iter()
            .filter_map(|&c| clades[c].clone())
            .collect();

        Ok(TreeSnapshot {
            leaf_names,
            clades,
            root_children,
            words,
            num_leaves,
            index,
        })
    }

    /// Leaf set below `node`, if the node was reachable when the snapshot was taken.
    pub fn clade(&self, node: NodeId) -> Option<&Bitset> {
        self.clades.get(node).and_then(Option::as_ref)
    }

    /// Bitset for a list of leaf names.
    ///
    /// # Errors
    /// `IllPosed` naming the first label that is not a leaf of the tree.
    pub fn bitset_of<S: AsRef<str>>(&self, names: &[S]) -> Result<Bitset> {
        let indices = names
            .iter()
            .map(|name| {
                let name = name.as_ref();
                self.index.get(name).copied().ok_or_else(|| {
                    RootingError::IllPosed(format!("label '{name}' is not a leaf of the tree"))
                })
            })
            .collect::<Result<Vec<usize>>>()?;
        Ok(Bitset::from_indices(self.words, indices))
    }

    /// Leaf names in a bitset, alphabetically.
    pub fn names_of(&self, bits: &Bitset) -> Vec<String> {
        bits.ones()
            .filter_map(|i| self.leaf_names.get(i).cloned())
            .collect()
    }

    /// True when `bits` covers every leaf.
    pub fn is_full(&self, bits: &Bitset) -> bool {
        bits.count_ones() == self.num_leaves
    }

    /// First node, in preorder of `tree`, whose clade equals `target`.
    pub fn find_clade(&self, tree: &Tree, target: &Bitset) -> Option<NodeId> {
        tree.preorder()
            .into_iter()
            .find(|&id| self.clade(id) == Some(target))
    }

    /// Same leaf names, ignoring order and tree shape.
    pub fn same_leaf_set(&self, other: &TreeSnapshot) -> bool {
        self.leaf_names == other.leaf_names
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    //          root
    //         /    \
    //       ab      cde
    //      /  \    /   \
    //     b    a  c     de
    //                  /  \
    //                 e    d
    const TREE: &str = "((b:1,a:1):1,(c:1,(e:1,d:1):1):1);";

    #[test]
    fn test_bits_follow_alphabetical_names() {
        let tree = Tree::from_newick(TREE).unwrap();
        let snap = TreeSnapshot::from_tree(&tree).unwrap();
        assert_eq!(snap.leaf_names, vec!["a", "b", "c", "d", "e"]);
        assert_eq!(snap.num_leaves, 5);
        assert_eq!(snap.words, 1);

        let b = tree.find_leaf("b").unwrap();
        assert_eq!(snap.clade(b).unwrap().0[0], 0b00010);

        let root = snap.clade(tree.root()).unwrap();
        assert!(snap.is_full(root));
        assert_eq!(snap.root_children.len(), 2);
        assert_eq!(snap.root_children[0].0[0], 0b00011);
        assert_eq!(snap.root_children[1].0[0], 0b11100);
    }

    #[test]
    fn test_find_clade_by_names() {
        let tree = Tree::from_newick(TREE).unwrap();
        let snap = TreeSnapshot::from_tree(&tree).unwrap();

        let de = snap.bitset_of(&["d", "e"]).unwrap();
        let node = snap.find_clade(&tree, &de).unwrap();
        assert_eq!(tree.leaves_under(node).len(), 2);
        assert_eq!(snap.names_of(&de), vec!["d", "e"]);

        let cd = snap.bitset_of(&["c", "d"]).unwrap();
        assert_eq!(snap.find_clade(&tree, &cd), None);

        let ab = &snap.root_children[0];
        assert_eq!(snap.names_of(ab), vec!["a", "b"]);
        assert!(!snap.is_full(ab));
    }

    #[test]
    fn test_unknown_label() {
        let tree = Tree::from_newick(TREE).unwrap();
        let snap = TreeSnapshot::from_tree(&tree).unwrap();
        let err = snap.bitset_of(&["a", "zz"]).unwrap_err();
        assert!(matches!(err, RootingError::IllPosed(_)));
    }

    #[test]
    fn test_same_clade_in_differently_shaped_trees() {
        let t1 = Tree::from_newick(TREE).unwrap();
        let t2 = Tree::from_newick("(((d:2,e:1):1,c:1):1,a:1,b:3);").unwrap();
        let s1 = TreeSnapshot::from_tree(&t1).unwrap();
        let s2 = TreeSnapshot::from_tree(&t2).unwrap();
        assert!(s1.same_leaf_set(&s2));

        let d1 = t1.find_leaf("d").unwrap();
        let d2 = t2.find_leaf("d").unwrap();
        let de1 = s1.clade(t1.parent(d1).unwrap()).unwrap();
        let de2 = s2.clade(t2.parent(d2).unwrap()).unwrap();
        assert_eq!(de1, de2);
    }

    #[test]
    fn test_duplicate_names_rejected() {
        let tree = Tree::from_newick("((a:1,b:1):1,a:1);").unwrap();
        assert!(TreeSnapshot::from_tree(&tree).is_err());
    }
}
