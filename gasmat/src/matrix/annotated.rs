//! Per-rank annotated view of the distributed matrix: local tiles, local
//! rowgroups and colgroups, and the dashboards of led segments.
///
/// Copyright (c) 2020, Institute for Defense Analyses
/// 4850 Mark Center Drive, Alexandria, VA 22311-1882; 703-845-2500
///
/// All rights reserved.
///
/// This file is part of GasMat.  For license information see the
/// LICENSE file in the top level dirctory of the distribution.
use rand::seq::SliceRandom;
use std::collections::BTreeSet;

use crate::locator::Locator;
use crate::matrix::matrix2d::Matrix2D;
use crate::matrix::tile::Tile;
use crate::structures::BitVector;
use crate::value::Value;

/// A local rowgroup: a horizontal slab with at least one local tile.
#[derive(Debug)]
pub struct RowGrp {
    /// Index among all rowgroups.
    pub rg: u32,
    /// Index among this rank's rowgroups.
    pub ith: u32,
    /// First row covered.
    pub offset: u32,
    /// One past the last row covered.
    pub endpos: u32,
    /// Rank leading this segment.
    pub leader: usize,
    /// Colgroup coordinates of the local tiles in this slab, ascending.
    pub tile_cgs: Vec<u32>,
    /// Local reordering `[regular | sink | rest]`.
    pub locator: Option<Locator>,
    /// Global reordering `[globally_regular | globally_sink | rest]`.
    pub global_locator: Option<Locator>,
    /// Row indices touched by any local triple.
    pub local: BitVector,
    /// Locally present rows that are globally regular.
    pub regular: BitVector,
    /// Locally present rows that are globally sink.
    pub sink: BitVector,
    /// The leader's full regular set for this segment.
    pub globally_regular: BitVector,
    /// The leader's full sink set for this segment.
    pub globally_sink: BitVector,
}

impl RowGrp {
    /// Rows covered by this slab.
    pub fn range(&self) -> u32 {
        self.endpos - self.offset
    }
}

/// A local colgroup: a vertical slab with at least one local tile.
#[derive(Debug)]
pub struct ColGrp {
    /// Index among all colgroups.
    pub cg: u32,
    /// Index among this rank's colgroups.
    pub jth: u32,
    /// First column covered.
    pub offset: u32,
    /// One past the last column covered.
    pub endpos: u32,
    /// Rank leading this segment.
    pub leader: usize,
    /// Rowgroup coordinates of the local tiles in this slab, ascending.
    pub tile_rgs: Vec<u32>,
    /// Local reordering `[regular | source | rest]`.
    pub locator: Option<Locator>,
    /// Column indices touched by any local triple.
    pub local: BitVector,
    /// Locally present columns that are globally regular.
    pub regular: BitVector,
    /// Locally present columns that are globally source.
    pub source: BitVector,
}

impl ColGrp {
    /// Columns covered by this slab.
    pub fn range(&self) -> u32 {
        self.endpos - self.offset
    }
}

/// Per-follower metadata a dashboard keeps about one rank of its segment.
#[derive(Debug)]
pub struct RanksMeta {
    /// The follower's rank.
    pub rank: usize,
    /// The follower's regular sub-bit-vector (starts as its `local` set,
    /// intersected with the dashboard's regular set during preprocessing).
    pub regular: BitVector,
    /// Secondary set (source for colgroup metas; unused for rowgroups).
    pub other: BitVector,
    /// `regular` re-expressed over the dashboard's regular enumeration.
    pub sub_regular: BitVector,
    /// `other` re-expressed over the dashboard's secondary enumeration.
    pub sub_other: BitVector,
    generated_sub: bool,
}

impl RanksMeta {
    fn new(rank: usize, range: u32) -> Self {
        RanksMeta {
            rank,
            regular: BitVector::new(range),
            other: BitVector::new(range),
            sub_regular: BitVector::new(range),
            sub_other: BitVector::new(range),
            generated_sub: false,
        }
    }

    /// Project `regular`/`other` onto the enumeration spaces of the
    /// dashboard's own sets.  Idempotent.
    pub fn generate_sub_regular(&mut self, db_regular: &mut BitVector, db_other: &mut BitVector) {
        if self.generated_sub {
            return;
        }
        self.generated_sub = true;

        self.sub_regular.temporarily_resize(db_regular.count());
        self.sub_other.temporarily_resize(db_other.count());

        db_regular.rewind();
        self.regular.rewind();
        while let Some(idx) = self.regular.next() {
            debug_assert!(db_regular.check(idx));
        }
        self.regular.rewind();

        let mut pos = 0;
        while let Some(idx) = db_regular.next() {
            if self.regular.check(idx) {
                self.sub_regular.touch(pos);
            }
            pos += 1;
        }
        assert_eq!(pos, self.sub_regular.size());
        assert_eq!(self.sub_regular.count(), self.regular.count());

        db_other.rewind();
        let mut pos = 0;
        while let Some(idx) = db_other.next() {
            if self.other.check(idx) {
                self.sub_other.touch(pos);
            }
            pos += 1;
        }
        assert_eq!(pos, self.sub_other.size());
        assert_eq!(self.sub_other.count(), self.other.count());

        db_regular.rewind();
        db_other.rewind();
    }
}

/// The leadership record of segment `k`, held by the owner of `tile[k][k]`.
#[derive(Debug)]
pub struct Dashboard {
    /// Index among this rank's dashboards.
    pub kth: u32,
    /// Led rowgroup (equals the led colgroup).
    pub rg: u32,
    /// Led colgroup.
    pub cg: u32,
    /// Non-leader ranks holding tiles in the led rowgroup.
    pub rowgrp_followers: Vec<usize>,
    /// Non-leader ranks holding tiles in the led colgroup.
    pub colgrp_followers: Vec<usize>,
    /// Rowgroup members (followers then self), with their sub-bit-vectors.
    pub rowgrp_ranks_meta: Vec<RanksMeta>,
    /// Colgroup members (followers then self), with their sub-bit-vectors.
    pub colgrp_ranks_meta: Vec<RanksMeta>,
    /// Authoritative regular set of the segment.
    pub regular: BitVector,
    /// Authoritative sink set of the segment.
    pub sink: BitVector,
    /// Authoritative source set of the segment.
    pub source: BitVector,
    /// Reordering `[regular | sink | source | rest]`.
    pub locator: Option<Locator>,
}

/// The annotated, preprocessed, CSC-compiled matrix.  Built in stages:
/// `annotate` (this file), `preprocess` (role classification and locators),
/// and `build_cscs` (per-tile CSC construction).
#[derive(Debug)]
pub struct CscMatrix2D<W: Value> {
    /// Grid, dimensions and placement.
    pub base: Matrix2D<W>,
    /// This rank's rowgroups, ascending by `rg`.
    pub local_rowgrps: Vec<RowGrp>,
    /// This rank's colgroups, ascending by `cg`.
    pub local_colgrps: Vec<ColGrp>,
    /// Global rowgroup id to local index, if local.
    pub rowgrp_ith: Vec<Option<u32>>,
    /// Global colgroup id to local index, if local.
    pub colgrp_jth: Vec<Option<u32>>,
    /// Dashboards of the segments this rank leads, by `kth`.
    pub dashboards: Vec<Dashboard>,
}

impl<W: Value> CscMatrix2D<W> {
    /// Materialize the per-rank view of an already-placed matrix.
    pub fn annotate(mut base: Matrix2D<W>) -> Self {
        let rank = base.env.rank();
        let tile_width = base.tile_width;

        let mut rowgrp_indices = BTreeSet::new();
        let mut colgrp_indices = BTreeSet::new();
        for row in &base.tiles {
            for tile in row {
                if tile.rank == rank {
                    rowgrp_indices.insert(tile.rg);
                    colgrp_indices.insert(tile.cg);
                }
            }
        }

        let mut rowgrp_ith = vec![None; base.nrowgrps as usize];
        let mut local_rowgrps = Vec::with_capacity(rowgrp_indices.len());
        for (i, &rg) in rowgrp_indices.iter().enumerate() {
            rowgrp_ith[rg as usize] = Some(i as u32);
            let tile_cgs: Vec<u32> = (0..base.ncolgrps)
                .filter(|&cg| base.tiles[rg as usize][cg as usize].rank == rank)
                .collect();
            local_rowgrps.push(RowGrp {
                rg,
                ith: i as u32,
                offset: rg * base.tile_height,
                endpos: rg * base.tile_height + base.tile_height,
                leader: base.tiles[rg as usize][rg as usize].rank,
                tile_cgs,
                locator: None,
                global_locator: None,
                local: BitVector::new(tile_width),
                regular: BitVector::new(tile_width),
                sink: BitVector::new(tile_width),
                globally_regular: BitVector::new(tile_width),
                globally_sink: BitVector::new(tile_width),
            });
        }

        let mut colgrp_jth = vec![None; base.ncolgrps as usize];
        let mut local_colgrps = Vec::with_capacity(colgrp_indices.len());
        for (j, &cg) in colgrp_indices.iter().enumerate() {
            colgrp_jth[cg as usize] = Some(j as u32);
            let tile_rgs: Vec<u32> = (0..base.nrowgrps)
                .filter(|&rg| base.tiles[rg as usize][cg as usize].rank == rank)
                .collect();
            local_colgrps.push(ColGrp {
                cg,
                jth: j as u32,
                offset: cg * base.tile_width,
                endpos: cg * base.tile_width + base.tile_width,
                leader: base.tiles[cg as usize][cg as usize].rank,
                tile_rgs,
                locator: None,
                local: BitVector::new(tile_width),
                regular: BitVector::new(tile_width),
                source: BitVector::new(tile_width),
            });
        }

        // Stamp the authoritative local indices onto the tiles (placement
        // permutations make any indices assigned earlier stale).
        let rank_ncolgrps = base.rank_ncolgrps;
        for row in &mut base.tiles {
            for tile in row.iter_mut() {
                if tile.rank == rank {
                    let ith = rowgrp_ith[tile.rg as usize].unwrap();
                    let jth = colgrp_jth[tile.cg as usize].unwrap();
                    tile.ith = ith;
                    tile.jth = jth;
                    tile.nth = ith * rank_ncolgrps + jth;
                }
            }
        }

        // Dashboards for the led segments.
        let mut dashboards = Vec::new();
        let mut rng = rand::thread_rng();
        for rg in 0..base.nrowgrps {
            if base.tiles[rg as usize][rg as usize].rank != rank {
                continue;
            }
            let kth = dashboards.len() as u32;

            let mut rowgrp_followers: Vec<usize> = (0..base.ncolgrps)
                .map(|cg| base.tiles[rg as usize][cg as usize].rank)
                .filter(|&r| r != rank)
                .collect::<BTreeSet<_>>()
                .into_iter()
                .collect();
            rowgrp_followers.shuffle(&mut rng);

            let mut colgrp_followers: Vec<usize> = (0..base.nrowgrps)
                .map(|rg_| base.tiles[rg_ as usize][rg as usize].rank)
                .filter(|&r| r != rank)
                .collect::<BTreeSet<_>>()
                .into_iter()
                .collect();
            colgrp_followers.shuffle(&mut rng);

            // Members are followers first, self last: self-sends get the
            // most time to progress.
            let mut rowgrp_ranks_meta: Vec<RanksMeta> = rowgrp_followers
                .iter()
                .map(|&r| RanksMeta::new(r, tile_width))
                .collect();
            rowgrp_ranks_meta.push(RanksMeta::new(rank, tile_width));

            let mut colgrp_ranks_meta: Vec<RanksMeta> = colgrp_followers
                .iter()
                .map(|&r| RanksMeta::new(r, tile_width))
                .collect();
            colgrp_ranks_meta.push(RanksMeta::new(rank, tile_width));

            dashboards.push(Dashboard {
                kth,
                rg,
                cg: rg,
                rowgrp_followers,
                colgrp_followers,
                rowgrp_ranks_meta,
                colgrp_ranks_meta,
                regular: BitVector::new(tile_width),
                sink: BitVector::new(tile_width),
                source: BitVector::new(tile_width),
                locator: None,
            });
        }

        CscMatrix2D {
            base,
            local_rowgrps,
            local_colgrps,
            rowgrp_ith,
            colgrp_jth,
            dashboards,
        }
    }

    /// The local tile at `(ith, jth)`.
    pub fn local_tile(&self, ith: u32, jth: u32) -> &Tile<W> {
        let rg = self.local_rowgrps[ith as usize].rg as usize;
        let cg = self.local_colgrps[jth as usize].cg as usize;
        &self.base.tiles[rg][cg]
    }

    /// Leader rank of segment `id` (rowgroup or colgroup).
    pub fn owner_of_segment(&self, id: u32) -> usize {
        // 2D-staggered placement guarantees the leader holds a tile in both
        // the rowgroup and the colgroup of the segment.
        self.base.tiles[id as usize][id as usize].rank
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::matrix::tile::Triple;
    use crate::matrix::Partitioning;
    use crate::value::Empty;
    use courier::Runtime;

    #[test]
    fn local_groups_cover_local_tiles() {
        Runtime::launch(4, |env| {
            let rank = env.rank();
            let m: Matrix2D<Empty> =
                Matrix2D::new(64, 64, 16, Partitioning::TwoDim, env).unwrap();
            let a = CscMatrix2D::annotate(m);
            assert_eq!(
                a.local_rowgrps.len() * a.local_colgrps.len(),
                a.base.rank_ntiles as usize
            );
            for (ith, rowgrp) in a.local_rowgrps.iter().enumerate() {
                assert_eq!(rowgrp.ith, ith as u32);
                assert_eq!(rowgrp.leader, a.owner_of_segment(rowgrp.rg));
                for &cg in &rowgrp.tile_cgs {
                    assert_eq!(a.base.tiles[rowgrp.rg as usize][cg as usize].rank, rank);
                }
            }
            // Every rank leads at least one segment and the dashboard's
            // groups are local to it.
            assert!(!a.dashboards.is_empty());
            for db in &a.dashboards {
                assert!(a.rowgrp_ith[db.rg as usize].is_some());
                assert!(a.colgrp_jth[db.cg as usize].is_some());
                assert_eq!(db.rowgrp_ranks_meta.last().unwrap().rank, rank);
                assert_eq!(db.colgrp_ranks_meta.last().unwrap().rank, rank);
            }
        });
    }

    #[test]
    fn tiles_get_fresh_local_indices() {
        Runtime::launch(2, |env| {
            let rank = env.rank();
            let mut m: Matrix2D<Empty> =
                Matrix2D::new(16, 16, 4, Partitioning::TwoDim, env).unwrap();
            m.insert(Triple {
                row: 0,
                col: 0,
                weight: Empty,
            });
            let a = CscMatrix2D::annotate(m);
            for row in &a.base.tiles {
                for tile in row {
                    if tile.rank == rank {
                        assert_eq!(a.local_rowgrps[tile.ith as usize].rg, tile.rg);
                        assert_eq!(a.local_colgrps[tile.jth as usize].cg, tile.cg);
                    }
                }
            }
        });
    }
}
