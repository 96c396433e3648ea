//! Minimal Ancestor Deviation (MAD) rooting.
//!
//! # Overview
//! For a candidate root, every pair of leaves `(u, w)` has an ancestor on the
//! path between them: the point closest to the root. Under a molecular clock
//! that ancestor sits exactly halfway between `u` and `w`. The relative
//! deviation from the halfway point, `2·d(u,anc)/d(u,w) - 1`, is squared and
//! averaged over all leaf pairs; the root minimizing the root-mean-square
//! deviation is the MAD root.
//!
//! # Algorithm
//! 1. Contract tiny branches, validate, and dissolve the root bifurcation so
//!    every edge of the unrooted tree appears once.
//! 2. For each internal node `k`, sum the deviations of all leaf pairs whose
//!    path turns at `k`, split by branch-direction. The sum a root "sees" at
//!    `k` is the total minus the pairs involving the direction the root lies
//!    in.
//! 3. For each edge, place the root at the closed-form optimum
//!    `ρ = Σw(d2 - d1) / 2Σw`, `w = (d1 + d2)^-2`, clamped to the edge, and
//!    score it as the cross pairs at that point plus the pre-summed
//!    deviations of every internal node.
//! 4. MAD is the smallest score; edges within 0.01% of it are tied roots.
//!
//! Duplicate tips (leaves at distance zero from each other) are squeezed to
//! one effective OTU before any averaging.
//!
//! # Example
//! ```
//! # use tree_rooting::tree::Tree;
//! # use tree_rooting::mad::{mad_root, MadOptions};
//! let tree = Tree::from_newick("((A:1,B:2):1,(C:3,(D:1,E:2):1):1);").unwrap();
//! let outcome = mad_root(tree, &MadOptions::default()).unwrap();
//! assert_eq!(outcome.tie_count(), 1);
//! assert!((outcome.mad - 0.1846).abs() < 1e-3);
//! let rooted = outcome.rooted_trees().next().unwrap().unwrap();
//! assert_eq!(rooted.children(rooted.root()).len(), 2);
//! ```

use crate::distances::{
    DistanceEngine, contract_tiny_branches, repeated_length_count, validate_for_rooting,
};
use crate::error::{Result, RootingError};
use crate::surgery::{RootingResult, normalize_root};
use crate::tree::{NodeId, Tree};
use itertools::Itertools;
use log::{debug, info, warn};

/// Scores within this factor of the minimum are tied roots.
pub const TIE_FACTOR: f64 = 1.0001;

/// Below this, MAD is reported as suspiciously good.
const TOO_GOOD: f64 = 0.001;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MadOptions {
    /// Branch lengths shorter than this become 0.0. The same distance decides
    /// when a root snaps onto the node at the end of its edge.
    pub tiny_tolerance: f64,
}

impl Default for MadOptions {
    fn default() -> Self {
        MadOptions {
            tiny_tolerance: 1e-6,
        }
    }
}

impl MadOptions {
    /// Keep lengths down to 1e-15.
    pub fn retain_tiny() -> Self {
        MadOptions {
            tiny_tolerance: 1e-15,
        }
    }
}

/// One tied MAD root.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MadRoot {
    /// Edge in the normalized base tree, split from its child, ancestor deviation
    pub result: RootingResult,
    /// Coefficient of variation of root-to-tip distances (effective OTUs)
    pub clock_cv: f64,
}

/// Outcome of MAD rooting.
///
/// Keeps the normalized unrooted tree together with every tied root, so
/// rooted trees can be produced on demand, as often as needed.
#[derive(Debug, Clone)]
pub struct MadRooting {
    base: Tree,
    pub mad: f64,
    pub ambiguity_index: f64,
    pub roots: Vec<MadRoot>,
}

impl MadRooting {
    /// The normalized tree the edge ids in `roots` refer to.
    pub fn base_tree(&self) -> &Tree {
        &self.base
    }

    pub fn tie_count(&self) -> usize {
        self.roots.len()
    }

    /// One independent rooted tree per tied root, in scan order.
    pub fn rooted_trees(&self) -> impl Iterator<Item = Result<Tree>> + '_ {
        self.roots.iter().map(|root| root.result.apply(&self.base))
    }

    /// Index of the tied root with the smallest clock CV.
    pub fn best_by_clock_cv(&self) -> Option<usize> {
        self.roots
            .iter()
            .position_min_by(|a, b| a.clock_cv.total_cmp(&b.clock_cv))
    }

    /// Newick comment with the statistics of tied root `index`, e.g.
    /// `[MAD=0.185_AI=0.870_CCV=17.5%_N=1/1]`.
    pub fn annotation(&self, index: usize) -> String {
        let ccv = self.roots.get(index).map_or(f64::NAN, |r| r.clock_cv);
        format!(
            "[MAD={:.3}_AI={:.3}_CCV={}%_N={}/{}]",
            self.mad,
            self.ambiguity_index,
            three_significant(ccv * 100.0),
            index + 1,
            self.roots.len()
        )
    }
}

/// Root `tree` by minimal ancestor deviation.
///
/// # Errors
/// - `Malformed` for trees failing validation or with fewer than 3 effective OTUs
/// - `Consistency` if a deviation leaves `[0, 1]`; the tree travels with it
pub fn mad_root(tree: Tree, options: &MadOptions) -> Result<MadRooting> {
    let mut tree = tree;

    let tiny = contract_tiny_branches(&mut tree, options.tiny_tolerance);
    if tiny > 0 {
        warn!(
            "Tiny branch lengths (< {:e}) were converted to 0 ({tiny} branches).",
            options.tiny_tolerance
        );
    }
    validate_for_rooting(&tree)?;
    let repeated = repeated_length_count(&tree);
    if repeated > 0 {
        warn!("Trees with repeating branch lengths are suspicious ({repeated} repeating values).");
    }

    normalize_root(&mut tree);
    let engine = DistanceEngine::new(&tree);
    let otus = engine.effective_otus();
    if engine.redundant_tips() > 0 {
        warn!(
            "Squeezing tip polytomies ({} OTUs, {} redundant tips, {} effective OTUs).",
            engine.leaf_count(),
            engine.redundant_tips(),
            otus
        );
    }
    if otus < 3 {
        return Err(RootingError::Malformed(format!(
            "only {otus} effective OTUs after squeezing duplicate tips; at least 3 are needed"
        )));
    }
    let pairs = (otus * (otus - 1) / 2) as f64;

    let sums = DirectionSums::new(&tree, &engine);
    let node_ad = node_deviations(&tree, &engine, &sums, pairs)?;
    let scores = scan_branches(&tree, &engine, &sums, &node_ad, pairs, options.tiny_tolerance)?;

    let mad = scores
        .iter()
        .map(|s| s.ad)
        .min_by(f64::total_cmp)
        .ok_or_else(|| RootingError::Malformed("tree has no branches".to_string()))?;
    let roots: Vec<MadRoot> = scores
        .iter()
        .filter(|s| s.ad <= mad * TIE_FACTOR)
        .filter_map(|s| s.root)
        .collect();
    if roots.is_empty() {
        return Err(consistency(&tree, format!("no scored branch reaches MAD = {mad}")));
    }
    let ambiguity_index = if roots.len() == 1 {
        let second = scores
            .iter()
            .map(|s| s.ad)
            .sorted_by(f64::total_cmp)
            .nth(1)
            .unwrap_or(mad);
        mad / second
    } else {
        1.0
    };

    if mad < TOO_GOOD {
        warn!("MAD=={mad:.3e} is too good to be true.");
    }
    for root in &roots {
        let length = tree.branch_length(root.result.edge);
        if root.result.split == 0.0 || root.result.split == length {
            warn!("Root is polytomous.");
        }
    }
    info!("Minimal ancestor deviation, MAD = {mad:.3}");
    info!("Ambiguity index, AI = {ambiguity_index:.3}");
    for root in &roots {
        info!("Clock CV, CCV = {}%", three_significant(root.clock_cv * 100.0));
    }
    if roots.len() > 1 {
        info!("Tied root positions: {}", roots.len());
    }

    Ok(MadRooting {
        base: tree,
        mad,
        ambiguity_index,
        roots,
    })
}

/// Squared relative deviation of an ancestor `a` away from one leaf and `b`
/// away from the other.
#[inline]
fn pair_deviation(a: f64, b: f64) -> f64 {
    let d = a + b;
    if d > 0.0 {
        let r = 2.0 * a / d - 1.0;
        r * r
    } else {
        0.0
    }
}

/// Per internal node: deviation sums of the pairs turning at the node.
struct DirectionSums {
    internal: Vec<NodeId>,
    /// `total[k]`: all pairs across two different directions of `k`
    total: Vec<f64>,
    /// `seen[k][dir]`: `total[k]` minus the pairs involving direction `dir`
    seen: Vec<Vec<f64>>,
}

impl DirectionSums {
    fn new(tree: &Tree, engine: &DistanceEngine) -> Self {
        let internal: Vec<NodeId> = tree
            .preorder()
            .into_iter()
            .filter(|&id| !tree.is_leaf(id))
            .collect();
        let mut total = vec![0.0; tree.arena_len()];
        let mut seen = vec![Vec::new(); tree.arena_len()];

        for &k in &internal {
            let dirs = engine.direction_distances(tree, k);
            let mut involving = vec![0.0; dirs.len()];
            let mut all = 0.0;
            for (a, b) in (0..dirs.len()).tuple_combinations() {
                let s: f64 = dirs[a]
                    .iter()
                    .cartesian_product(&dirs[b])
                    .map(|(&u, &w)| pair_deviation(u, w))
                    .sum();
                involving[a] += s;
                involving[b] += s;
                all += s;
            }
            total[k] = all;
            seen[k] = involving.iter().map(|s| all - s).collect();
        }

        DirectionSums {
            internal,
            total,
            seen,
        }
    }

    /// Sum seen at `k` from a root in direction `dir`.
    fn toward(&self, k: NodeId, dir: usize) -> f64 {
        self.seen[k][dir]
    }

    /// Sum seen at `k` from a root above it.
    fn toward_parent(&self, tree: &Tree, k: NodeId) -> f64 {
        self.seen[k][tree.children(k).len()]
    }
}

/// Ancestor deviation of a root placed exactly on each node.
fn node_deviations(
    tree: &Tree,
    engine: &DistanceEngine,
    sums: &DirectionSums,
    pairs: f64,
) -> Result<Vec<f64>> {
    let otus = engine.effective_otus() as f64;
    let mut node_ad = vec![f64::NAN; tree.arena_len()];
    let mut redundant = Vec::new();

    for i in tree.preorder() {
        let own = match engine.leaf_position(i) {
            Some(pos) if !engine.is_effective(pos) => {
                redundant.push((i, pos));
                continue;
            }
            // a leaf is its own ancestor with every other OTU: deviation 1 each
            Some(_) => otus - 1.0,
            None => sums.total[i],
        };
        let others: f64 = sums
            .internal
            .iter()
            .filter(|&&k| k != i)
            .map(|&k| sums.toward(k, engine.direction_toward(tree, k, i)))
            .sum();
        node_ad[i] = guard(tree, "node ancestor deviation", ((own + others) / pairs).sqrt())?;
    }
    for (i, pos) in redundant {
        node_ad[i] = node_ad[engine.leaf_node(engine.representative(pos))];
    }

    Ok(node_ad)
}

struct BranchScore {
    ad: f64,
    /// None for branches excluded from the search
    root: Option<MadRoot>,
}

/// Score every branch in postorder.
fn scan_branches(
    tree: &Tree,
    engine: &DistanceEngine,
    sums: &DirectionSums,
    node_ad: &[f64],
    pairs: f64,
    tolerance: f64,
) -> Result<Vec<BranchScore>> {
    // zero-length clusters already holding a root
    let mut taken = vec![false; tree.arena_len()];
    let mut scores = Vec::new();

    for i in tree.postorder() {
        let Some(parent) = tree.parent(i) else { continue };
        let length = tree.branch_length(i);
        if length == 0.0 {
            scores.push(BranchScore {
                ad: node_ad[i] + 1.0,
                root: None,
            });
            continue;
        }

        let below = engine.effective_below(i);
        let above = engine.effective_outside(i);
        let (weight, pull) = below
            .iter()
            .cartesian_product(&above)
            .fold((0.0, 0.0), |(w_sum, p_sum), (&d1, &d2)| {
                let w = (d1 + d2).powi(-2);
                (w_sum + w, p_sum + w * (d2 - d1))
            });
        let rho = pull / (2.0 * weight);
        let mut split = rho.clamp(0.0, length);
        let rest = length - split;

        let mut snapped = None;
        if split < tolerance && split < rest {
            split = 0.0;
            snapped = Some(i);
        } else if rest < tolerance && rest < split {
            split = length;
            snapped = Some(parent);
        }
        if let Some(node) = snapped {
            if taken[engine.cluster_of(node)] {
                scores.push(BranchScore {
                    ad: node_ad[node] + 1.0,
                    root: None,
                });
                continue;
            }
        }

        let cross: f64 = below
            .iter()
            .cartesian_product(&above)
            .map(|(&d1, &d2)| {
                let r = 2.0 * (d1 + split) / (d1 + d2) - 1.0;
                r * r
            })
            .sum();
        let turning: f64 = sums
            .internal
            .iter()
            .map(|&k| {
                if engine.is_ancestor(i, k) {
                    sums.toward_parent(tree, k)
                } else {
                    sums.toward(k, engine.direction_toward(tree, k, i))
                }
            })
            .sum();
        let ad = guard(tree, "ancestor deviation", ((cross + turning) / pairs).sqrt())?;

        let depths: Vec<f64> = below
            .iter()
            .map(|d| d + split)
            .chain(above.iter().map(|d| d - split))
            .collect();
        let clock_cv = coefficient_of_variation(&depths);
        debug!("branch above node {i}: ad = {ad:.6}, split = {split:.6} of {length:.6}");

        if let Some(node) = snapped {
            taken[engine.cluster_of(node)] = true;
        }
        scores.push(BranchScore {
            ad,
            root: Some(MadRoot {
                result: RootingResult {
                    edge: i,
                    split,
                    score: ad,
                },
                clock_cv,
            }),
        });
    }

    Ok(scores)
}

/// Deviations are bounded by 1 by construction; anything else is a bug.
fn guard(tree: &Tree, what: &str, value: f64) -> Result<f64> {
    if value > 1.0 || value.is_nan() {
        return Err(consistency(tree, format!("{what} {value} is outside [0, 1]")));
    }
    Ok(value)
}

fn consistency(tree: &Tree, message: String) -> RootingError {
    let tree = tree
        .to_newick()
        .unwrap_or_else(|e| format!("<tree could not be serialized: {e}>"));
    RootingError::Consistency { message, tree }
}

/// Sample standard deviation over mean.
fn coefficient_of_variation(values: &[f64]) -> f64 {
    let n = values.len() as f64;
    let mean = values.iter().sum::<f64>() / n;
    let var = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / (n - 1.0);
    var.sqrt() / mean
}

/// Three significant digits in the alternate `%g` form: trailing zeros and
/// the decimal point are kept, and an exponent is used outside `1e-4..1e3`.
fn three_significant(x: f64) -> String {
    if x.is_nan() {
        return "nan".to_string();
    }
    if x.is_infinite() {
        return if x > 0.0 { "inf" } else { "-inf" }.to_string();
    }
    if x == 0.0 {
        return "0.00".to_string();
    }
    // The exponent after rounding: 99.96 becomes 1.00e2
    let scientific = format!("{x:.2e}");
    let (mantissa, exponent) = scientific.split_once('e').unwrap_or((scientific.as_str(), "0"));
    let exponent: i32 = exponent.parse().unwrap_or(0);
    if (-4..3).contains(&exponent) {
        let decimals = (2 - exponent) as usize;
        let fixed = format!("{x:.decimals$}");
        if decimals == 0 { format!("{fixed}.") } else { fixed }
    } else {
        let sign = if exponent < 0 { '-' } else { '+' };
        format!("{mantissa}e{sign}{:02}", exponent.abs())
    }
}
