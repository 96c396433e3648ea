//! Rooting on a named clade, or on the root split of a reference tree.
//!
//! # Outgroup
//! The root goes on the midpoint of the edge above the most recent common
//! ancestor of the given leaves. When that ancestor is the current root (the
//! labels straddle it), the tree is first rooted on a leaf outside the set
//! and the ancestor is looked up again.
//!
//! # Transfer
//! A rooted reference tree splits the leaves into two clades at its root. The
//! larger clade is the ingroup and the other the outgroup. The target is
//! rooted on an ingroup leaf, so the outgroup hangs below a single node if
//! the trees agree there, and then rooted on that node. The two new
//! root-adjacent lengths take the reference's ratio.

use crate::error::{Result, RootingError};
use crate::snapshot::TreeSnapshot;
use crate::surgery::set_outgroup;
use crate::tree::{NodeId, Tree};
use log::{debug, info};

#[derive(Debug, Clone)]
pub struct OutgroupRooting {
    pub tree: Tree,
    /// Every leaf of the clade the root was placed above, in leaf order
    pub clade: Vec<String>,
}

/// Root `tree` on the clade spanned by the leaves named in `outgroup`.
///
/// # Errors
/// `IllPosed` when `outgroup` is empty, names something that is not a leaf,
/// or spans the whole tree however the tree is rooted.
///
/// # Example
/// ```
/// # use tree_rooting::tree::Tree;
/// # use tree_rooting::outgroup::outgroup_root;
/// let tree = Tree::from_newick("(((a:1,b:1):1,c:1):1,((d:1,e:1):1,f:1):1):0;").unwrap();
/// let rooted = outgroup_root(tree, &["a"]).unwrap();
/// assert_eq!(rooted.clade, vec!["a"]);
/// ```
pub fn outgroup_root<S: AsRef<str>>(tree: Tree, outgroup: &[S]) -> Result<OutgroupRooting> {
    let mut tree = tree;
    let labels: Vec<&str> = outgroup.iter().map(|s| s.as_ref()).collect();
    if labels.is_empty() {
        return Err(RootingError::IllPosed("no outgroup label given".to_string()));
    }
    info!("Specified outgroup labels: {}", labels.join(" "));

    let mut members = resolve_leaves(&tree, &labels)?;
    let mut clade = mrca_of(&tree, &members)?;
    if spans_tree(&tree, clade)? {
        let first_outside = tree
            .leaves()
            .into_iter()
            .find(|id| !members.contains(id))
            .ok_or_else(ill_posed_whole_tree)?;
        debug!(
            "outgroup straddles the root; rooting on {} first",
            tree.name(first_outside).unwrap_or("<unnamed>")
        );
        set_outgroup(&mut tree, first_outside)?;
        members = resolve_leaves(&tree, &labels)?;
        clade = mrca_of(&tree, &members)?;
        if spans_tree(&tree, clade)? {
            return Err(ill_posed_whole_tree());
        }
    }

    let names: Vec<String> = tree
        .leaves_under(clade)
        .into_iter()
        .filter_map(|id| tree.name(id).map(str::to_string))
        .collect();
    info!("All leaf labels in the outgroup clade: {}", names.join(" "));

    set_outgroup(&mut tree, clade)?;
    Ok(OutgroupRooting { tree, clade: names })
}

fn resolve_leaves(tree: &Tree, labels: &[&str]) -> Result<Vec<NodeId>> {
    labels
        .iter()
        .map(|&label| {
            tree.find_leaf(label).ok_or_else(|| {
                RootingError::IllPosed(format!("outgroup label '{label}' is not a leaf of the tree"))
            })
        })
        .collect()
}

fn mrca_of(tree: &Tree, members: &[NodeId]) -> Result<NodeId> {
    tree.mrca(members)
        .ok_or_else(|| RootingError::IllPosed("outgroup leaves share no ancestor".to_string()))
}

/// True when the clade below `node` holds every leaf, e.g. the only child
/// of a unary root.
fn spans_tree(tree: &Tree, node: NodeId) -> Result<bool> {
    if node == tree.root() {
        return Ok(true);
    }
    let snap = TreeSnapshot::from_tree(tree)?;
    Ok(snap.clade(node).is_some_and(|bits| snap.is_full(bits)))
}

fn ill_posed_whole_tree() -> RootingError {
    RootingError::IllPosed(
        "outgroup clade should not represent the whole tree; check the outgroup labels".to_string(),
    )
}

#[derive(Debug, Clone)]
pub struct TransferRooting {
    pub tree: Tree,
    /// Leaves of the transferred outgroup clade, alphabetically
    pub outgroup: Vec<String>,
}

/// Root `target` on the root split of `source`.
///
/// # Errors
/// `IllPosed` when the leaf sets differ, `source` is not rooted on a
/// bifurcation, or `target` has no clade matching the outgroup.
pub fn transfer_root(target: Tree, source: &Tree) -> Result<TransferRooting> {
    let mut target = target;
    let source_snap = TreeSnapshot::from_tree(source)?;
    let target_snap = TreeSnapshot::from_tree(&target)?;
    if !source_snap.same_leaf_set(&target_snap) {
        return Err(RootingError::IllPosed(
            "leaf labels in the two trees should be completely matched".to_string(),
        ));
    }

    let &[first, second] = source.children(source.root()) else {
        return Err(RootingError::IllPosed(
            "reference tree is not rooted on a bifurcation".to_string(),
        ));
    };
    let [first_clade, second_clade] = source_snap.root_children.as_slice() else {
        return Err(RootingError::IllPosed(
            "reference tree is not rooted on a bifurcation".to_string(),
        ));
    };
    // on equal sizes the second child is the ingroup
    let ((ingroup, _), (outgroup, outgroup_clade)) =
        if first_clade.count_ones() > second_clade.count_ones() {
            ((first, first_clade), (second, second_clade))
        } else {
            ((second, second_clade), (first, first_clade))
        };
    let source_in_len = source.branch_length(ingroup);
    let source_out_len = source.branch_length(outgroup);

    let outgroup_names = source_snap.names_of(outgroup_clade);
    info!("Outgroups: {}", outgroup_names.join(" "));

    let anchor_name = source
        .leaves_under(ingroup)
        .first()
        .and_then(|&id| source.name(id))
        .ok_or_else(|| RootingError::IllPosed("reference ingroup has no named leaf".to_string()))?;
    let anchor = target.find_leaf(anchor_name).ok_or_else(|| {
        RootingError::IllPosed(format!("leaf '{anchor_name}' is missing from the target tree"))
    })?;
    set_outgroup(&mut target, anchor)?;

    let snap = TreeSnapshot::from_tree(&target)?;
    let wanted = snap.bitset_of(&outgroup_names)?;
    let node = snap.find_clade(&target, &wanted).ok_or_else(|| {
        RootingError::IllPosed(
            "no root bipartition of the reference tree found in the target tree".to_string(),
        )
    })?;
    let root = set_outgroup(&mut target, node)?;

    // children of the new root are [outgroup clade, the rest]
    let other = target
        .children(root)
        .iter()
        .copied()
        .find(|&c| c != node)
        .ok_or_else(|| RootingError::IllPosed("rerooted target is not bifurcating".to_string()))?;
    let target_total = target.branch_length(node) + target.branch_length(other);
    let source_total = source_in_len + source_out_len;
    let (out_len, in_len) = if source_total > 0.0 {
        (
            target_total * source_out_len / source_total,
            target_total * source_in_len / source_total,
        )
    } else {
        (target_total / 2.0, target_total / 2.0)
    };
    target.node_mut(node).branch_length = out_len;
    target.node_mut(other).branch_length = in_len;
    debug!("root-adjacent lengths {out_len} (outgroup) and {in_len} (ingroup)");

    Ok(TransferRooting {
        tree: target,
        outgroup: outgroup_names,
    })
}
