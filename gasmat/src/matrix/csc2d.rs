//! Final matrix stage: per-tile CSC construction.
///
/// Copyright (c) 2020, Institute for Defense Analyses
/// 4850 Mark Center Drive, Alexandria, VA 22311-1882; 703-845-2500
///
/// All rights reserved.
///
/// This file is part of GasMat.  For license information see the
/// LICENSE file in the top level dirctory of the distribution.
use rayon::prelude::*;
use std::collections::HashMap;

use crate::matrix::annotated::CscMatrix2D;
use crate::matrix::tile::Csc;
use crate::value::Value;

impl<W: Value + Copy> CscMatrix2D<W> {
    /// Shuffle triples to their owners, preprocess, and compile every local
    /// tile into its regular and sink CSC sub-matrices.  Consumes the
    /// triple buffers.
    pub fn distribute(&mut self) {
        self.base.distribute();
        self.preprocess();
        self.build_cscs();
    }

    fn build_cscs(&mut self) {
        let rank = self.base.env.rank();
        let local_rowgrps = &self.local_rowgrps;
        let local_colgrps = &self.local_colgrps;

        // Grid rows are disjoint, so tiles compile in parallel per row.
        self.base.tiles.par_iter_mut().for_each(|row| {
            for tile in row.iter_mut() {
                if tile.rank != rank {
                    continue;
                }
                let rowgrp = &local_rowgrps[tile.ith as usize];
                let colgrp = &local_colgrps[tile.jth as usize];
                let locator = rowgrp.locator.as_ref().unwrap();
                let global_locator = rowgrp.global_locator.as_ref().unwrap();
                let colgrp_locator = colgrp.locator.as_ref().unwrap();

                let bound = locator.nregular();
                debug_assert_eq!(bound, rowgrp.regular.count());

                // Split by row class, eliminating duplicate edges.
                let mut regular: HashMap<(u32, u32), W> = HashMap::new();
                let mut sink: HashMap<(u32, u32), W> = HashMap::new();
                for t in std::mem::take(&mut tile.triples) {
                    let row_idx = t.row - rowgrp.offset; // rebase
                    if locator.at(row_idx) < bound {
                        regular.insert((row_idx, t.col), t.weight);
                    } else {
                        sink.insert((row_idx, t.col), t.weight);
                    }
                }

                let ncols = colgrp.local.count();
                tile.csc = Some(Csc::new(
                    ncols,
                    rowgrp.offset,
                    colgrp.offset,
                    &regular,
                    locator,
                    colgrp_locator,
                    global_locator,
                ));
                tile.sink_csc = Some(Csc::new(
                    ncols,
                    rowgrp.offset,
                    colgrp.offset,
                    &sink,
                    locator,
                    colgrp_locator,
                    global_locator,
                ));
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::matrix::matrix2d::Matrix2D;
    use crate::matrix::tile::Triple;
    use crate::matrix::Partitioning;
    use crate::value::Empty;
    use courier::Runtime;

    #[test]
    fn csc_splits_regular_and_sink_rows() {
        Runtime::launch(1, |env| {
            let mut m: Matrix2D<u32> =
                Matrix2D::new(3, 3, 1, Partitioning::TwoDim, env).unwrap();
            // 0 -> 1 (w2), 1 -> 2 (w3), 0 -> 2 (w10), stored transposed;
            // duplicate of the first edge must be dropped.
            for &(row, col, weight) in
                &[(1u32, 0u32, 2u32), (2, 1, 3), (2, 0, 10), (1, 0, 2)]
            {
                m.insert(Triple { row, col, weight });
            }
            let mut a = CscMatrix2D::annotate(m);
            a.distribute();

            let tile = a.local_tile(0, 0);
            let csc = tile.csc.as_ref().unwrap();
            let sink_csc = tile.sink_csc.as_ref().unwrap();
            // rows: {1, 2}; cols: {0, 1}; regular = {1}, sink = {2}, source = {0}.
            assert_eq!(csc.nentries(), 1); // 0 -> 1 only
            assert_eq!(sink_csc.nentries(), 2); // both edges into 2

            // Regular columns come before source columns: local cols are
            // {0: source, 1: regular} -> reordered [1, 0].
            assert_eq!(csc.ncols, 2);
            let colgrp_loc = a.local_colgrps[0].locator.as_ref().unwrap();
            assert_eq!(colgrp_loc.at(1), 0);
            assert_eq!(colgrp_loc.at(0), 1);

            // The regular CSC's single entry: edge 0 -> 1, weight 2, in the
            // source column.
            let e = &csc.entries[0];
            assert_eq!(e.idx, 1);
            assert_eq!(e.weight, 2);
            assert_eq!(csc.colptrs[1], 0); // regular column empty
            assert_eq!(csc.colptrs[2], 1);
            assert_eq!(csc.colidxs[1], 0);

            // Sink entries are rebased past nregular and keep original ids.
            for e in &sink_csc.entries {
                assert_eq!(e.idx, 2);
                assert_eq!(e.global_idx, 0); // first (only) sink row
            }
        });
    }

    #[test]
    fn empty_local_tiles_still_compile() {
        Runtime::launch(4, |env| {
            let mut m: Matrix2D<Empty> =
                Matrix2D::new(8, 8, 16, Partitioning::TwoDim, env).unwrap();
            if m.env.rank() == 0 {
                m.insert(Triple {
                    row: 1,
                    col: 0,
                    weight: Empty,
                });
            }
            let mut a = CscMatrix2D::annotate(m);
            a.distribute();
            let rank = a.base.env.rank();
            for row in &a.base.tiles {
                for tile in row {
                    if tile.rank == rank {
                        assert!(tile.csc.is_some());
                        assert!(tile.sink_csc.is_some());
                        assert!(tile.triples.is_empty());
                    }
                }
            }
        });
    }
}
