//! Compact leaf-set bitsets used to compare clades between trees.
//!
//! # Overview
//! Bit `i` stands for the `i`-th leaf name in alphabetical order, so the
//! same clade has the same bitset in every tree over the same leaf set,
//! whatever node ids the trees were given.
//!
//! # Example
//! Leaves [a, b, c, d] map to bits [0, 1, 2, 3]:
//! - clade {a, c} → `0b0101`
//! - clade {b, d} → `0b1010`

/// Leaf set stored as 64-bit words.
#[derive(Clone, Debug, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct Bitset(pub Vec<u64>);

impl Bitset {
    /// Empty set able to hold `words * 64` leaves.
    ///
    /// # Example
    /// ```
    /// # use tree_rooting::bitset::Bitset;
    /// let bs = Bitset::zeros(Bitset::words_for(100));
    /// assert_eq!(bs.0.len(), 2);
    /// assert_eq!(bs.count_ones(), 0);
    /// ```
    pub fn zeros(words: usize) -> Self {
        Bitset(vec![0u64; words])
    }

    /// Words needed for `num_leaves` bits.
    pub fn words_for(num_leaves: usize) -> usize {
        num_leaves.div_ceil(64)
    }

    /// Set holding exactly the given leaf indices.
    ///
    /// # Example
    /// ```
    /// # use tree_rooting::bitset::Bitset;
    /// let clade = Bitset::from_indices(1, [4, 3]);
    /// assert_eq!(clade.ones().collect::<Vec<_>>(), vec![3, 4]);
    /// ```
    pub fn from_indices<I: IntoIterator<Item = usize>>(words: usize, indices: I) -> Self {
        let mut bits = Bitset::zeros(words);
        for idx in indices {
            bits.set(idx);
        }
        bits
    }

    /// Adds leaf `idx`; it must fit in the allocated words.
    #[inline]
    pub fn set(&mut self, idx: usize) {
        self.0[idx >> 6] |= 1u64 << (idx & 63);
    }

    /// Union in place, used to build a parent clade from its children.
    #[inline]
    pub fn or_assign(&mut self, other: &Bitset) {
        self.0
            .iter_mut()
            .zip(&other.0)
            .for_each(|(mine, theirs)| *mine |= theirs);
    }

    /// Number of leaves in the set.
    #[inline]
    pub fn count_ones(&self) -> usize {
        self.0.iter().map(|w| w.count_ones()).sum::<u32>() as usize
    }

    /// Indices of the leaves in the set, ascending.
    pub fn ones(&self) -> impl Iterator<Item = usize> + '_ {
        self.0.iter().enumerate().flat_map(|(word_idx, &word)| {
            (0..64)
                .filter(move |bit| word & (1u64 << bit) != 0)
                .map(move |bit| (word_idx << 6) | bit)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_leaf_membership() {
        let ac = Bitset::from_indices(1, [0, 2]);
        assert_eq!(ac.0[0], 0b0101);
        assert_eq!(ac.ones().collect::<Vec<_>>(), vec![0, 2]);
        assert_eq!(Bitset::zeros(3).count_ones(), 0);
    }

    #[test]
    fn test_children_union_into_parent() {
        let mut parent = Bitset::from_indices(1, [0, 1]);
        parent.or_assign(&Bitset::from_indices(1, [1, 4]));
        assert_eq!(parent.ones().collect::<Vec<_>>(), vec![0, 1, 4]);
        assert_eq!(parent.count_ones(), 3);
    }

    /// Clades below a root split
    ///
    /// ```text
    ///           root
    ///          /    \
    ///        ab      cde
    ///       /  \    /  \
    ///      a    b  c    de
    ///                  /  \
    ///                 d    e
    /// ```
    #[test]
    fn test_root_split_clades() {
        let de = Bitset::from_indices(1, [3, 4]);
        let mut cde = Bitset::from_indices(1, [2]);
        cde.or_assign(&de);
        assert_eq!(cde.0[0], 0b11100);

        let mut root = Bitset::from_indices(1, [0, 1]);
        root.or_assign(&cde);
        assert_eq!(root.count_ones(), 5);
    }

    #[test]
    fn test_multi_word() {
        let spread = Bitset::from_indices(Bitset::words_for(130), [0, 63, 64, 129]);
        assert_eq!(spread.0.len(), 3);
        assert_eq!(spread.count_ones(), 4);
        assert_eq!(spread.ones().collect::<Vec<_>>(), vec![0, 63, 64, 129]);
    }
}
