//! The ingress-stage 2D matrix: tile grid, rank placement, triple shuffle.
///
/// Copyright (c) 2020, Institute for Defense Analyses
/// 4850 Mark Center Drive, Alexandria, VA 22311-1882; 703-845-2500
///
/// All rights reserved.
///
/// This file is part of GasMat.  For license information see the
/// LICENSE file in the top level dirctory of the distribution.
use courier::{Env, RecvReq};
use itertools::Itertools;
use log::{debug, info};

use crate::error::{Error, Result};
use crate::matrix::tags;
use crate::matrix::tile::{Tile, Triple};
use crate::matrix::Partitioning;
use crate::structures::BitVector;
use crate::value::Value;

/// A square grid of `nrowgrps x ncolgrps` tiles holding edge triples, with
/// every tile assigned to an owning rank.
///
/// Placement is staggered 2D: with `nranks = a * b` and `a ~ b ~ sqrt(nranks)`,
/// `tile[rg][cg].rank = (cg mod a) * b + (rg mod b)`, followed by a rowgroup
/// permutation that makes the diagonal owners pairwise distinct, so each
/// diagonal cell can host the leader of its segment.
#[derive(Debug)]
pub struct Matrix2D<W: Value> {
    /// Matrix dimensions in entries.
    pub nrows: u32,
    /// Matrix dimensions in entries.
    pub ncols: u32,
    /// Total number of tiles; must be square and a multiple of `nranks`.
    pub ntiles: u32,
    /// Tiles per dimension.
    pub nrowgrps: u32,
    /// Tiles per dimension.
    pub ncolgrps: u32,
    /// Entries per tile row.
    pub tile_height: u32,
    /// Entries per tile column.
    pub tile_width: u32,
    /// Placement strategy.
    pub partitioning: Partitioning,
    /// Tiles this rank holds locally.
    pub rank_ntiles: u32,
    /// Rowgroups with a local tile.
    pub rank_nrowgrps: u32,
    /// Colgroups with a local tile.
    pub rank_ncolgrps: u32,
    /// Ranks sharing each rowgroup.
    pub rowgrp_nranks: u32,
    /// Ranks sharing each colgroup.
    pub colgrp_nranks: u32,
    /// The grid, row-major: `tiles[rg][cg]`.
    pub tiles: Vec<Vec<Tile<W>>>,
    pub(crate) env: Env,
}

impl<W: Value> Matrix2D<W> {
    /// Build the grid and assign tiles to ranks.
    pub fn new(
        nrows: u32,
        ncols: u32,
        ntiles: u32,
        partitioning: Partitioning,
        env: Env,
    ) -> Result<Self> {
        if nrows == 0 || nrows != ncols {
            return Err(Error::BadPartitioning(format!(
                "matrix must be square and non-empty, got {} x {}",
                nrows, ncols
            )));
        }
        let nrowgrps = (ntiles as f64).sqrt() as u32;
        let ncolgrps = ntiles / nrowgrps;
        if nrowgrps * ncolgrps != ntiles || nrowgrps != ncolgrps {
            return Err(Error::BadPartitioning(format!(
                "ntiles = {} is not a square number",
                ntiles
            )));
        }
        let nranks = env.nranks() as u32;
        if (ntiles / nranks) * nranks != ntiles {
            return Err(Error::BadPartitioning(format!(
                "ntiles = {} is not a multiple of nranks = {}",
                ntiles, nranks
            )));
        }

        let tile_height = nrows / nrowgrps + 1;
        let tile_width = ncols / ncolgrps + 1;
        assert!((nrows - 1) / tile_height < nrowgrps);
        assert!((ncols - 1) / tile_width < ncolgrps);
        assert_eq!(tile_height, tile_width);

        let (rowgrp_nranks, colgrp_nranks) = match partitioning {
            Partitioning::TwoDim => integer_factorize(nranks),
            Partitioning::OneDimCol => (nranks, 1),
        };
        assert_eq!(rowgrp_nranks * colgrp_nranks, nranks);

        let rank_nrowgrps = nrowgrps / colgrp_nranks;
        let rank_ncolgrps = ncolgrps / rowgrp_nranks;
        let rank_ntiles = ntiles / nranks;
        if rank_nrowgrps * rank_ncolgrps != rank_ntiles {
            return Err(Error::BadPartitioning(format!(
                "cannot divide a {0} x {0} grid among {1} ranks",
                nrowgrps, nranks
            )));
        }

        let mut tiles: Vec<Vec<Tile<W>>> = (0..nrowgrps)
            .map(|_| (0..ncolgrps).map(|_| Tile::default()).collect())
            .collect();

        // Staggered placement.
        for (rg, row) in tiles.iter_mut().enumerate() {
            for (cg, tile) in row.iter_mut().enumerate() {
                tile.rank = match partitioning {
                    Partitioning::TwoDim => {
                        (cg % rowgrp_nranks as usize) * colgrp_nranks as usize
                            + (rg % colgrp_nranks as usize)
                    }
                    Partitioning::OneDimCol => cg % nranks as usize,
                };
            }
        }

        // Permute rowgroup rows so the diagonal owners are distinct across
        // each window of nranks segments; every diagonal cell then hosts a
        // leader.
        let mut bv = BitVector::new(nranks);
        for rg in 0..nrowgrps as usize {
            if bv.count() == bv.size() {
                bv.clear();
            }
            for rg_ in rg..nrowgrps as usize {
                if !bv.touch(tiles[rg_][rg].rank as u32) {
                    tiles.swap(rg_, rg);
                    break;
                }
            }
        }

        for (rg, row) in tiles.iter_mut().enumerate() {
            for (cg, tile) in row.iter_mut().enumerate() {
                tile.rg = rg as u32;
                tile.cg = cg as u32;
            }
        }

        let matrix = Matrix2D {
            nrows,
            ncols,
            ntiles,
            nrowgrps,
            ncolgrps,
            tile_height,
            tile_width,
            partitioning,
            rank_ntiles,
            rank_nrowgrps,
            rank_ncolgrps,
            rowgrp_nranks,
            colgrp_nranks,
            tiles,
            env,
        };
        matrix.print_info();
        Ok(matrix)
    }

    /// Insert a triple into the tile covering it.  Duplicate edges are not
    /// removed here.
    pub fn insert(&mut self, triple: Triple<W>) {
        let rg = (triple.row / self.tile_height) as usize;
        let cg = (triple.col / self.tile_width) as usize;
        self.tiles[rg][cg].triples.push(triple);
    }

    /// Segment (rowgroup/colgroup id) covering a vertex index.
    pub fn segment_of_idx(&self, idx: u32) -> u32 {
        idx / self.tile_height
    }

    /// All-to-all shuffle of buffered triples to their owner ranks.
    pub fn distribute(&mut self) {
        let env = self.env.clone();
        let rank = env.rank();
        let nranks = env.nranks();

        // Copy the triples of each non-self tile to its owner's outbox.
        let mut outboxes: Vec<Vec<Triple<W>>> = vec![Vec::new(); nranks];
        for row in &mut self.tiles {
            for tile in row {
                if tile.rank != rank {
                    outboxes[tile.rank].append(&mut tile.triples);
                }
            }
        }

        // Exchange counts in a ring.
        let mut inbox_sizes = vec![0u64; nranks];
        for r in 0..nranks {
            if r != rank {
                env.send(
                    (outboxes[r].len() as u64).to_le_bytes().to_vec(),
                    r,
                    tags::SHUFFLE_SIZE,
                );
            }
        }
        for r in 0..nranks {
            if r != rank {
                let bytes = env.recv(r, tags::SHUFFLE_SIZE);
                let mut b = [0u8; 8];
                b.copy_from_slice(&bytes);
                inbox_sizes[r] = u64::from_le_bytes(b);
            }
        }

        // One non-blocking receive and one send per peer, in ring order.
        // The substrate carries 64-bit byte counts, so no oversized
        // datatype is needed for buffers past the 32-bit limit.
        let mut reqs: Vec<Option<RecvReq>> = vec![None; nranks];
        for i in 1..nranks {
            let r = (rank + i) % nranks;
            reqs[r] = Some(env.irecv(r, tags::SHUFFLE_DATA));
        }
        for i in 1..nranks {
            let r = (rank + i) % nranks;
            let blob = bincode::serialize(&outboxes[r]).expect("unencodable triples");
            env.send(blob, r, tags::SHUFFLE_DATA);
            outboxes[r].clear();
        }

        while reqs.iter().any(Option::is_some) {
            for (r, blob) in env.wait_some(&mut reqs) {
                let triples: Vec<Triple<W>> =
                    bincode::deserialize(&blob).expect("undecodable triples");
                assert_eq!(triples.len() as u64, inbox_sizes[r]);
                for t in triples {
                    self.insert(t);
                }
            }
        }

        debug!("rank {}: triple shuffle complete", rank);
        env.barrier();
    }

    fn print_info(&self) {
        if !self.env.is_master() {
            return;
        }
        info!(
            "#> Created a square matrix with {} x {} entries and {} x {} tiles.",
            self.nrows, self.ncols, self.nrowgrps, self.ncolgrps
        );
        info!(
            "#> Each rank has {} local tiles across {} rowgroups and {} colgroups; \
             each rowgroup is divided among {} ranks, each colgroup among {}.",
            self.rank_ntiles,
            self.rank_nrowgrps,
            self.rank_ncolgrps,
            self.rowgrp_nranks,
            self.colgrp_nranks
        );
        for rg in 0..self.nrowgrps.min(10) as usize {
            let row = (0..self.ncolgrps.min(10) as usize)
                .map(|cg| format!("{:02}", self.tiles[rg][cg].rank))
                .join(" ");
            info!("{}{}", row, if self.ncolgrps > 10 { " ..." } else { "" });
        }
        if self.nrowgrps > 10 {
            info!(" ...");
        }
    }
}

/// Integer factorization into near-sqrt values, as in GraphPad.
fn integer_factorize(n: u32) -> (u32, u32) {
    let mut a = (n as f64).sqrt() as u32;
    let mut b = a;
    while a * b != n {
        b += 1;
        a = n / b;
    }
    assert_eq!(a * b, n);
    (a, b)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::Empty;
    use courier::Runtime;

    #[test]
    fn factorize_near_sqrt() {
        assert_eq!(integer_factorize(1), (1, 1));
        assert_eq!(integer_factorize(2), (1, 2));
        assert_eq!(integer_factorize(4), (2, 2));
        assert_eq!(integer_factorize(6), (2, 3));
        assert_eq!(integer_factorize(12), (3, 4));
    }

    #[test]
    fn triples_land_in_exactly_one_tile() {
        Runtime::launch(1, |env| {
            let mut m: Matrix2D<Empty> =
                Matrix2D::new(16, 16, 4, Partitioning::TwoDim, env).unwrap();
            for row in 0..16 {
                for col in 0..16 {
                    m.insert(Triple {
                        row,
                        col,
                        weight: Empty,
                    });
                }
            }
            let total: usize = m
                .tiles
                .iter()
                .flatten()
                .map(|t| t.triples.len())
                .sum();
            assert_eq!(total, 256);
            for row in &m.tiles {
                for tile in row {
                    for t in &tile.triples {
                        assert_eq!(t.row / m.tile_height, tile.rg);
                        assert_eq!(t.col / m.tile_width, tile.cg);
                    }
                }
            }
        });
    }

    #[test]
    fn diagonal_owners_distinct() {
        for nranks in &[1usize, 2, 3, 4] {
            let nranks = *nranks;
            Runtime::launch(nranks, move |env| {
                let ntiles = (nranks * nranks) as u32;
                let m: Matrix2D<Empty> =
                    Matrix2D::new(64, 64, ntiles, Partitioning::TwoDim, env).unwrap();
                let mut owners: Vec<usize> =
                    (0..m.nrowgrps as usize).map(|k| m.tiles[k][k].rank).collect();
                owners.sort_unstable();
                owners.dedup();
                assert_eq!(owners.len(), nranks);
            });
        }
    }

    #[test]
    fn distribute_moves_triples_to_owners() {
        Runtime::launch(4, |env| {
            let rank = env.rank();
            let mut m: Matrix2D<u32> =
                Matrix2D::new(32, 32, 16, Partitioning::TwoDim, env).unwrap();
            // Every rank inserts the same full edge set; after distribute,
            // each rank holds exactly nranks copies of its own tiles' edges.
            for i in 0..32u32 {
                m.insert(Triple {
                    row: i,
                    col: (i * 7) % 32,
                    weight: i,
                });
            }
            m.distribute();
            for row in &m.tiles {
                for tile in row {
                    if tile.rank != rank {
                        assert!(tile.triples.is_empty());
                    } else {
                        for t in &tile.triples {
                            assert_eq!(t.row / m.tile_height, tile.rg);
                        }
                    }
                }
            }
        });
    }

    #[test]
    fn one_dim_col_places_whole_columns() {
        Runtime::launch(2, |env| {
            let m: Matrix2D<Empty> =
                Matrix2D::new(16, 16, 4, Partitioning::OneDimCol, env).unwrap();
            for row in &m.tiles {
                for tile in row {
                    assert_eq!(tile.rank, tile.cg as usize % 2);
                }
            }
        });
    }
}
