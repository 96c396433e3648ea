//! Arena tree shared by every rooting method.
//!
//! # Overview
//! Nodes live in a `Vec` and are addressed by a stable [`NodeId`]. An edge is
//! identified by its child node and carries that node's `branch_length` (and
//! `support`, when the Newick label was numeric).
//!
//! Surgery never removes slots from the arena: a node that is dissolved is
//! detached and simply becomes unreachable from the root. Every query below
//! walks from the root, so detached slots are invisible.
//!
//! # Conversion
//! Parsing and serialization are delegated to `phylotree`. [`Tree::from_phylo`]
//! copies a parsed tree into the arena, validating branch lengths on the way,
//! and [`Tree::to_phylo`] rebuilds a `phylotree` tree for output.

use crate::error::{Result, RootingError};
use phylotree::tree::{Node as PhyloNode, Tree as PhyloTree};
use std::collections::HashSet;

/// Index of a node in the tree arena.
pub type NodeId = usize;

#[derive(Debug, Clone, PartialEq)]
pub struct Node {
    pub id: NodeId,
    pub name: Option<String>,
    pub parent: Option<NodeId>,
    pub children: Vec<NodeId>,
    /// Length of the edge to the parent (0.0 on the root)
    pub branch_length: f64,
    /// Support of the edge to the parent
    pub support: Option<f64>,
}

impl Node {
    fn new(id: NodeId) -> Self {
        Node {
            id,
            name: None,
            parent: None,
            children: Vec::new(),
            branch_length: 0.0,
            support: None,
        }
    }

    pub fn is_leaf(&self) -> bool {
        self.children.is_empty()
    }
}

#[derive(Debug, Clone)]
pub struct Tree {
    nodes: Vec<Node>,
    root: NodeId,
}

impl Tree {
    /// Parse a single Newick string.
    ///
    /// # Example
    /// ```
    /// # use tree_rooting::tree::Tree;
    /// let tree = Tree::from_newick("((A:1,B:2):1,C:3);").unwrap();
    /// assert_eq!(tree.leaf_count(), 3);
    /// ```
    pub fn from_newick(newick: &str) -> Result<Self> {
        let phylo = PhyloTree::from_newick(newick.trim())
            .map_err(|e| RootingError::Parse(e.to_string()))?;
        Self::from_phylo(&phylo)
    }

    /// Copy a parsed `phylotree` tree into the arena.
    ///
    /// Missing branch lengths become `0.0`. Numeric labels on internal nodes
    /// are read as support values.
    ///
    /// # Errors
    /// `Malformed` for negative or non-finite branch lengths, `Tree` when the
    /// collaborator cannot resolve a node.
    pub fn from_phylo(phylo: &PhyloTree) -> Result<Self> {
        let phylo_root = phylo.get_root()?;
        let mut tree = Tree {
            nodes: Vec::new(),
            root: 0,
        };

        let mut stack: Vec<(usize, Option<NodeId>)> = vec![(phylo_root, None)];
        while let Some((phylo_id, parent)) = stack.pop() {
            let phylo_node = phylo.get(&phylo_id)?;
            let length = match parent {
                Some(_) => phylo_node.parent_edge.unwrap_or(0.0),
                None => 0.0,
            };
            if !length.is_finite() || length < 0.0 {
                return Err(RootingError::Malformed(format!(
                    "branch length {length} above node {:?} is not a finite non-negative number",
                    phylo_node.name.as_deref().unwrap_or("<unnamed>")
                )));
            }

            let id = tree.push_node(parent, length);
            let label = phylo_node
                .name
                .as_deref()
                .map(str::trim)
                .filter(|s| !s.is_empty());
            if let Some(label) = label {
                let support = label.parse::<f64>().ok().filter(|s| s.is_finite());
                match support {
                    Some(s) if !phylo_node.children.is_empty() => tree.nodes[id].support = Some(s),
                    _ => tree.nodes[id].name = Some(label.to_string()),
                }
            }

            // Reversed so children are popped, and appended, in their original order
            for &child in phylo_node.children.iter().rev() {
                stack.push((child, Some(id)));
            }
        }

        Ok(tree)
    }

    /// Rebuild a `phylotree` tree, preserving child order and node labels.
    pub fn to_phylo(&self) -> Result<PhyloTree> {
        let mut phylo = PhyloTree::new();
        let mut root_node = PhyloNode::new();
        root_node.name = self.label(self.root);
        let phylo_root = phylo.add(root_node);

        let mut stack: Vec<(NodeId, usize)> = self.nodes[self.root]
            .children
            .iter()
            .rev()
            .map(|&c| (c, phylo_root))
            .collect();
        while let Some((id, phylo_parent)) = stack.pop() {
            let mut node = PhyloNode::new();
            node.name = self.label(id);
            let phylo_id =
                phylo.add_child(node, phylo_parent, Some(self.nodes[id].branch_length))?;
            for &child in self.nodes[id].children.iter().rev() {
                stack.push((child, phylo_id));
            }
        }

        Ok(phylo)
    }

    /// Serialize through `phylotree`.
    pub fn to_newick(&self) -> Result<String> {
        Ok(self.to_phylo()?.to_newick()?)
    }

    /// Name for leaves and named internal nodes, support value otherwise.
    fn label(&self, id: NodeId) -> Option<String> {
        let node = &self.nodes[id];
        node.name
            .clone()
            .or_else(|| node.support.map(|s| format!("{s}")))
    }

    // ---- arena access ----

    pub fn root(&self) -> NodeId {
        self.root
    }

    pub fn node(&self, id: NodeId) -> &Node {
        &self.nodes[id]
    }

    pub(crate) fn node_mut(&mut self, id: NodeId) -> &mut Node {
        &mut self.nodes[id]
    }

    /// Number of arena slots, reachable or not. Scratch arrays are sized by it.
    pub fn arena_len(&self) -> usize {
        self.nodes.len()
    }

    pub fn parent(&self, id: NodeId) -> Option<NodeId> {
        self.nodes[id].parent
    }

    pub fn children(&self, id: NodeId) -> &[NodeId] {
        &self.nodes[id].children
    }

    pub fn branch_length(&self, id: NodeId) -> f64 {
        self.nodes[id].branch_length
    }

    pub fn is_leaf(&self, id: NodeId) -> bool {
        self.nodes[id].is_leaf()
    }

    pub fn name(&self, id: NodeId) -> Option<&str> {
        self.nodes[id].name.as_deref()
    }

    /// Append a fresh node, linked under `parent` when given.
    pub(crate) fn push_node(&mut self, parent: Option<NodeId>, branch_length: f64) -> NodeId {
        let id = self.nodes.len();
        let mut node = Node::new(id);
        node.parent = parent;
        node.branch_length = branch_length;
        self.nodes.push(node);
        if let Some(p) = parent {
            self.nodes[p].children.push(id);
        }
        id
    }

    pub(crate) fn set_root(&mut self, id: NodeId) {
        self.nodes[id].parent = None;
        self.nodes[id].branch_length = 0.0;
        self.nodes[id].support = None;
        self.root = id;
    }

    /// Unlink a node from the tree; the slot stays in the arena.
    pub(crate) fn detach(&mut self, id: NodeId) {
        if let Some(p) = self.nodes[id].parent.take() {
            self.nodes[p].children.retain(|&c| c != id);
        }
        self.nodes[id].children.clear();
    }

    // ---- traversals ----

    /// Reachable nodes, parents before children, children in order.
    pub fn preorder(&self) -> Vec<NodeId> {
        let mut order = Vec::with_capacity(self.nodes.len());
        let mut stack = vec![self.root];
        while let Some(id) = stack.pop() {
            order.push(id);
            stack.extend(self.nodes[id].children.iter().rev());
        }
        order
    }

    /// Reachable nodes, children (in order) before parents.
    pub fn postorder(&self) -> Vec<NodeId> {
        let mut order = Vec::with_capacity(self.nodes.len());
        let mut stack = vec![(self.root, false)];
        while let Some((id, expanded)) = stack.pop() {
            if expanded || self.nodes[id].is_leaf() {
                order.push(id);
            } else {
                stack.push((id, true));
                stack.extend(self.nodes[id].children.iter().rev().map(|&c| (c, false)));
            }
        }
        order
    }

    /// Leaves in preorder ("leaf order").
    pub fn leaves(&self) -> Vec<NodeId> {
        self.preorder()
            .into_iter()
            .filter(|&id| self.nodes[id].is_leaf())
            .collect()
    }

    pub fn leaf_count(&self) -> usize {
        self.leaves().len()
    }

    /// Leaf names in leaf order; unnamed leaves give an empty string.
    pub fn leaf_names(&self) -> Vec<String> {
        self.leaves()
            .into_iter()
            .map(|id| self.nodes[id].name.clone().unwrap_or_default())
            .collect()
    }

    /// Leaves of the subtree rooted at `id`, in leaf order.
    pub fn leaves_under(&self, id: NodeId) -> Vec<NodeId> {
        let mut leaves = Vec::new();
        let mut stack = vec![id];
        while let Some(v) = stack.pop() {
            if self.nodes[v].is_leaf() {
                leaves.push(v);
            } else {
                stack.extend(self.nodes[v].children.iter().rev());
            }
        }
        leaves
    }

    pub fn find_leaf(&self, name: &str) -> Option<NodeId> {
        self.leaves()
            .into_iter()
            .find(|&id| self.nodes[id].name.as_deref() == Some(name))
    }

    /// Every edge, identified by its child node, in preorder.
    pub fn edges(&self) -> Vec<NodeId> {
        self.preorder()
            .into_iter()
            .filter(|&id| id != self.root)
            .collect()
    }

    pub fn total_length(&self) -> f64 {
        self.edges().iter().map(|&id| self.nodes[id].branch_length).sum()
    }

    /// `id` followed by its ancestors up to and including the root.
    pub fn path_to_root(&self, id: NodeId) -> Vec<NodeId> {
        let mut path = vec![id];
        let mut current = id;
        while let Some(p) = self.nodes[current].parent {
            path.push(p);
            current = p;
        }
        path
    }

    /// Most recent common ancestor; a single node is its own ancestor.
    pub fn mrca(&self, ids: &[NodeId]) -> Option<NodeId> {
        let (first, rest) = ids.split_first()?;
        let mut candidates = self.path_to_root(*first);
        for &id in rest {
            let ancestors: HashSet<NodeId> = self.path_to_root(id).into_iter().collect();
            let keep = candidates.iter().position(|c| ancestors.contains(c))?;
            candidates.drain(..keep);
        }
        candidates.first().copied()
    }

    /// Patristic distance between two nodes.
    pub fn distance(&self, a: NodeId, b: NodeId) -> f64 {
        let Some(m) = self.mrca(&[a, b]) else {
            return f64::NAN;
        };
        self.depth_below(a, m) + self.depth_below(b, m)
    }

    /// Sum of branch lengths from `id` up to its ancestor `ancestor`.
    fn depth_below(&self, id: NodeId, ancestor: NodeId) -> f64 {
        let mut total = 0.0;
        let mut current = id;
        while current != ancestor {
            total += self.nodes[current].branch_length;
            match self.nodes[current].parent {
                Some(p) => current = p,
                None => break,
            }
        }
        total
    }

    /// Distance from the root to `id`.
    pub fn depth(&self, id: NodeId) -> f64 {
        self.depth_below(id, self.root)
    }

    /// Every leaf must carry a non-empty name, and names must be unique.
    pub fn check_leaf_names(&self) -> Result<()> {
        let mut seen = HashSet::new();
        for id in self.leaves() {
            match self.nodes[id].name.as_deref() {
                None | Some("") => {
                    return Err(RootingError::Malformed("unnamed leaf".to_string()));
                }
                Some(name) => {
                    if !seen.insert(name) {
                        return Err(RootingError::Malformed(format!(
                            "duplicate leaf name '{name}'"
                        )));
                    }
                }
            }
        }
        Ok(())
    }
}
