//! Edge triples, 2D tiles, and the per-tile CSC form.
///
/// Copyright (c) 2020, Institute for Defense Analyses
/// 4850 Mark Center Drive, Alexandria, VA 22311-1882; 703-845-2500
///
/// All rights reserved.
///
/// This file is part of GasMat.  For license information see the
/// LICENSE file in the top level dirctory of the distribution.
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::locator::Locator;
use crate::value::Value;

/// A directed edge.  `row` is the destination, `col` the source; duplicates
/// with identical `(row, col)` are the same edge during ingress.
#[derive(Copy, Clone, Debug, Serialize, Deserialize)]
pub struct Triple<W> {
    /// Destination (matrix row).
    pub row: u32,
    /// Source (matrix column).
    pub col: u32,
    /// Edge weight; `Empty` for unweighted graphs.
    pub weight: W,
}

impl<W> Triple<W> {
    /// Swap the endpoints.
    pub fn transpose(&mut self) {
        std::mem::swap(&mut self.row, &mut self.col);
    }
}

/// A cell of the rowgroup x colgroup grid.  Owns a mutable triple buffer
/// during ingress; becomes a pair of CSC sub-matrices after preprocessing.
#[derive(Debug)]
pub struct Tile<W: Value> {
    /// Buffered triples; drained when the CSC form is built.
    pub triples: Vec<Triple<W>>,
    /// Global rowgroup coordinate.
    pub rg: u32,
    /// Global colgroup coordinate.
    pub cg: u32,
    /// Index among the owner's local rowgroups.
    pub ith: u32,
    /// Index among the owner's local colgroups.
    pub jth: u32,
    /// Index among the owner's local tiles.
    pub nth: u32,
    /// Owning rank.
    pub rank: usize,
    /// CSC over the regular rows of this tile.
    pub csc: Option<Csc<W>>,
    /// CSC over the sink rows of this tile.
    pub sink_csc: Option<Csc<W>>,
}

impl<W: Value> Default for Tile<W> {
    fn default() -> Self {
        Tile {
            triples: Vec::new(),
            rg: 0,
            cg: 0,
            ith: 0,
            jth: 0,
            nth: 0,
            rank: 0,
            csc: None,
            sink_csc: None,
        }
    }
}

/// One CSC entry: the row in reordered (global-locator, bucket-rebased)
/// coordinates, the original row id for the application, and the weight.
#[derive(Copy, Clone, Debug)]
pub struct CscEntry<W> {
    /// Row position within the regular (or sink) enumeration.
    pub global_idx: u32,
    /// Original (hashed-space) row id.
    pub idx: u32,
    /// Edge weight.
    pub weight: W,
}

/// Compressed-sparse-column form of one tile's regular or sink sub-matrix.
///
/// Column pointers index by reordered column (through the colgroup locator);
/// regular columns come first, source columns after.
#[derive(Debug)]
pub struct Csc<W> {
    /// Number of (local) columns.
    pub ncols: u32,
    /// Column pointer array of length `ncols + 1`.
    pub colptrs: Vec<u32>,
    /// Original column id per reordered column.
    pub colidxs: Vec<u32>,
    /// Entries, sorted by `global_idx` within each column.
    pub entries: Vec<CscEntry<W>>,
}

impl<W: Value + Copy> Csc<W> {
    /// Build from a deduplicated `(row, col) -> weight` map whose rows are
    /// already rebased by the rowgroup offset.  Rows map through `locator`
    /// (local) and `global_locator` (rowgroup-global); sink rows are rebased
    /// past their respective `nregular()`.
    pub fn new(
        ncols: u32,
        rowgrp_offset: u32,
        colgrp_offset: u32,
        triples: &HashMap<(u32, u32), W>,
        locator: &Locator,
        colgrp_locator: &Locator,
        global_locator: &Locator,
    ) -> Self {
        let mut colptrs = vec![0u32; ncols as usize + 1];
        let mut colidxs = vec![0u32; ncols as usize + 1];

        for (&(_row, col), _) in triples {
            let c = colgrp_locator.at(col - colgrp_offset) as usize;
            colptrs[c] += 1;
            colidxs[c] = col;
        }

        for i in 1..colptrs.len() {
            colptrs[i] += colptrs[i - 1];
        }

        let mut entries = vec![
            CscEntry {
                global_idx: 0,
                idx: 0,
                weight: W::default(),
            };
            triples.len()
        ];

        for (&(row, col), &weight) in triples {
            // Subtract the regular count if the row is a sink.
            let offset = if locator.at(row) < locator.nregular() {
                0
            } else {
                locator.nregular()
            };
            let global_offset = if global_locator.at(row) < global_locator.nregular() {
                0
            } else {
                global_locator.nregular()
            };

            debug_assert!(global_locator.nregular() >= locator.nregular());
            debug_assert!(global_locator.at(row) >= locator.at(row));
            debug_assert_eq!(
                global_locator.at(row) >= global_locator.nregular(),
                locator.at(row) >= locator.nregular()
            );

            let c = colgrp_locator.at(col - colgrp_offset) as usize;
            colptrs[c] -= 1;
            entries[colptrs[c] as usize] = CscEntry {
                global_idx: global_locator.at(row) - global_offset,
                idx: row + rowgrp_offset,
                weight,
            };
        }

        // Sort each column by global row index for locality downstream.
        for i in 0..ncols as usize {
            let (a, b) = (colptrs[i] as usize, colptrs[i + 1] as usize);
            entries[a..b].sort_unstable_by_key(|e| e.global_idx);
        }

        assert_eq!(colptrs[0], 0);
        for i in 0..ncols as usize {
            assert!(colptrs[i] <= colptrs[i + 1]);
        }

        Csc {
            ncols,
            colptrs,
            colidxs,
            entries,
        }
    }

    /// Number of entries.
    pub fn nentries(&self) -> usize {
        self.entries.len()
    }
}
