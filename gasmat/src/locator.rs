//! Re-ordering of vertex indices by structural role.
///
/// Copyright (c) 2020, Institute for Defense Analyses
/// 4850 Mark Center Drive, Alexandria, VA 22311-1882; 703-845-2500
///
/// All rights reserved.
///
/// This file is part of GasMat.  For license information see the
/// LICENSE file in the top level dirctory of the distribution.
use crate::structures::BitVector;

/// The four structural roles a vertex index can map to.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum VertexType {
    /// Globally non-empty row and column.
    Regular,
    /// Secondary bucket: sink rows (rowgroups) or source columns (colgroups).
    Secondary,
    /// Tertiary bucket: source columns of a dashboard locator.
    Tertiary,
    /// Neither row nor column is non-empty.
    Isolated,
}

/// A permutation of `[0, range)` that maps regular indices before secondary
/// ones, secondary before the rest.  Dashboard locators order all four
/// buckets: `[regular | sink | source | isolated]`.
#[derive(Clone, Debug)]
pub struct Locator {
    map: Vec<u32>,
    nregular: u32,
    nsecondary: u32,
    ntertiary: u32,
}

impl Locator {
    /// Build a dashboard locator: `[regular | sink | source | rest]`.
    /// Must be regular, then sink, then source, then the rest.
    pub fn for_dashboard(regular: &mut BitVector, sink: &mut BitVector, source: &mut BitVector) -> Self {
        let range = regular.size();
        assert_eq!(sink.size(), range);
        assert_eq!(source.size(), range);

        let mut rest = BitVector::new(range);
        rest.fill();
        rest.difference_with(regular);
        rest.difference_with(sink);
        rest.difference_with(source);

        let mut loc = Locator {
            map: vec![0; range as usize],
            nregular: regular.count(),
            nsecondary: sink.count(),
            ntertiary: source.count(),
        };

        let mut pos = 0;
        regular.rewind();
        sink.rewind();
        source.rewind();
        for bv in [regular, sink, source, &mut rest].iter_mut() {
            while let Some(idx) = bv.next() {
                loc.map[idx as usize] = pos;
                pos += 1;
            }
            bv.rewind();
        }
        assert_eq!(pos, range);
        loc
    }

    /// Build a group locator: `[regular | secondary | rest]`, where the rest
    /// is everything outside `local`.
    pub fn from_bitvectors(
        local: &mut BitVector,
        regular: &mut BitVector,
        secondary: &mut BitVector,
    ) -> Self {
        let range = local.size();
        assert_eq!(regular.size(), range);
        assert_eq!(secondary.size(), range);
        assert_eq!(local.count(), regular.count() + secondary.count());

        let mut loc = Locator {
            map: vec![0; range as usize],
            nregular: regular.count(),
            nsecondary: secondary.count(),
            ntertiary: 0,
        };

        let mut pos = 0;
        regular.rewind();
        secondary.rewind();
        for bv in [regular, secondary].iter_mut() {
            while let Some(idx) = bv.next() {
                loc.map[idx as usize] = pos;
                pos += 1;
            }
            bv.rewind();
        }

        let mut rest = BitVector::new(range);
        rest.fill();
        rest.difference_with(local);
        while let Some(idx) = rest.next() {
            loc.map[idx as usize] = pos;
            pos += 1;
        }
        assert_eq!(pos, range);
        loc
    }

    /// Size of the permuted index space.
    pub fn range(&self) -> u32 {
        self.map.len() as u32
    }

    /// Reordered position of raw index `idx`.
    pub fn at(&self, idx: u32) -> u32 {
        self.map[idx as usize]
    }

    /// Number of regular indices.
    pub fn nregular(&self) -> u32 {
        self.nregular
    }

    /// Number of secondary indices.
    pub fn nsecondary(&self) -> u32 {
        self.nsecondary
    }

    /// Number of sink indices (dashboard and rowgroup locators).
    pub fn nsink(&self) -> u32 {
        self.nsecondary
    }

    /// Number of source indices (dashboard locators).
    pub fn nsource(&self) -> u32 {
        self.ntertiary
    }

    /// Role and bucket-relative position of raw index `idx`.
    pub fn map(&self, idx: u32) -> (VertexType, u32) {
        let loc = self.map[idx as usize];
        let beyond_regular = loc >= self.nregular;
        let beyond_sink = loc >= self.nregular + self.nsecondary;
        let beyond_source = loc >= self.nregular + self.nsecondary + self.ntertiary;
        let ty = match (beyond_regular, beyond_sink, beyond_source) {
            (false, _, _) => VertexType::Regular,
            (true, false, _) => VertexType::Secondary,
            (true, true, false) => VertexType::Tertiary,
            (true, true, true) => VertexType::Isolated,
        };
        let rel = loc
            - if beyond_regular { self.nregular } else { 0 }
            - if beyond_sink { self.nsecondary } else { 0 }
            - if beyond_source { self.ntertiary } else { 0 };
        (ty, rel)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bv(n: u32, bits: &[u32]) -> BitVector {
        let mut v = BitVector::new(n);
        for b in bits {
            v.push(*b);
        }
        v
    }

    #[test]
    fn dashboard_order_and_counts() {
        let mut regular = bv(8, &[1, 4]);
        let mut sink = bv(8, &[0]);
        let mut source = bv(8, &[6]);
        let loc = Locator::for_dashboard(&mut regular, &mut sink, &mut source);

        assert_eq!(loc.nregular(), 2);
        assert_eq!(loc.nsink(), 1);
        assert_eq!(loc.nsource(), 1);
        // regular first, in index order
        assert_eq!(loc.at(1), 0);
        assert_eq!(loc.at(4), 1);
        assert_eq!(loc.at(0), 2);
        assert_eq!(loc.at(6), 3);
        // the permutation covers [0, 8)
        let mut seen: Vec<u32> = (0..8).map(|i| loc.at(i)).collect();
        seen.sort_unstable();
        assert_eq!(seen, (0..8).collect::<Vec<_>>());
        // bucket queries are stable
        for _ in 0..3 {
            assert_eq!(loc.map(4), (VertexType::Regular, 1));
            assert_eq!(loc.map(0), (VertexType::Secondary, 0));
            assert_eq!(loc.map(6), (VertexType::Tertiary, 0));
            assert_eq!(loc.map(7), (VertexType::Isolated, 3));
        }
        // the source bit vectors come back rewound and intact
        assert_eq!(regular.count(), 2);
        assert_eq!(regular.next(), Some(1));
    }

    #[test]
    fn group_locator_rest_is_non_local() {
        let mut local = bv(6, &[0, 2, 3]);
        let mut regular = bv(6, &[2]);
        let mut secondary = bv(6, &[0, 3]);
        let loc = Locator::from_bitvectors(&mut local, &mut regular, &mut secondary);
        assert_eq!(loc.nregular(), 1);
        assert_eq!(loc.nsecondary(), 2);
        assert_eq!(loc.at(2), 0);
        assert_eq!(loc.at(0), 1);
        assert_eq!(loc.at(3), 2);
        // non-local indices land beyond the secondary block, in index order
        assert_eq!(loc.at(1), 3);
        assert_eq!(loc.at(4), 4);
        assert_eq!(loc.at(5), 5);
    }
}
