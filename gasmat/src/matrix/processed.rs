//! Preprocessing: role classification, bit-vector exchange, locators.
///
/// Copyright (c) 2020, Institute for Defense Analyses
/// 4850 Mark Center Drive, Alexandria, VA 22311-1882; 703-845-2500
///
/// All rights reserved.
///
/// This file is part of GasMat.  For license information see the
/// LICENSE file in the top level dirctory of the distribution.
use courier::RecvReq;
use log::debug;

use crate::locator::Locator;
use crate::matrix::annotated::CscMatrix2D;
use crate::matrix::tags;
use crate::structures::BitVector;
use crate::value::Value;

impl<W: Value> CscMatrix2D<W> {
    /// Classify every vertex index of every local segment as regular, sink,
    /// source or isolated, and build the locators.  Runs exactly once,
    /// after the triple shuffle and before CSC construction.
    ///
    /// Leaders collect the follower `local` sets, union them into the
    /// authoritative per-segment sets (`regular = rows and cols`,
    /// `sink = rows \ cols`, `source = cols \ rows`), and push the results
    /// back; followers derive their local splits from them.
    pub(crate) fn preprocess(&mut self) {
        let env = self.base.env.clone();
        let nrowgrps = self.base.nrowgrps;

        // Leaders post receives for every member's local set, rowgroup
        // stream first, then the colgroup stream.  (Receives are posted
        // before any send so self-communication cannot deadlock.)
        let mut rowgrp_reqs: Vec<RecvReq> = Vec::new();
        let mut colgrp_reqs: Vec<RecvReq> = Vec::new();
        for db in &self.dashboards {
            for m in &db.rowgrp_ranks_meta {
                rowgrp_reqs.push(env.irecv(m.rank, tags::rowgrp(db.rg, false)));
            }
            for m in &db.colgrp_ranks_meta {
                colgrp_reqs.push(env.irecv(m.rank, tags::colgrp(db.cg, false)));
            }
        }

        // Every rank builds and ships its local sets.
        for rowgrp in &mut self.local_rowgrps {
            for &cg in &rowgrp.tile_cgs {
                for t in &self.base.tiles[rowgrp.rg as usize][cg as usize].triples {
                    rowgrp.local.touch(t.row - rowgrp.offset);
                }
            }
            let mut blob = Vec::new();
            rowgrp.local.serialize_into(&mut blob, false);
            env.send(blob, rowgrp.leader, tags::rowgrp(rowgrp.rg, false));
        }
        for colgrp in &mut self.local_colgrps {
            for &rg in &colgrp.tile_rgs {
                for t in &self.base.tiles[rg as usize][colgrp.cg as usize].triples {
                    colgrp.local.touch(t.col - colgrp.offset);
                }
            }
            let mut blob = Vec::new();
            colgrp.local.serialize_into(&mut blob, false);
            env.send(blob, colgrp.leader, tags::colgrp(colgrp.cg, false));
        }

        // Leaders drain the member sets and classify their segments.
        let mut it = rowgrp_reqs.into_iter();
        for db in &mut self.dashboards {
            for m in &mut db.rowgrp_ranks_meta {
                let blob = env.wait(it.next().unwrap());
                m.regular.deserialize_from(&blob);
            }
        }
        let mut it = colgrp_reqs.into_iter();
        for db in &mut self.dashboards {
            for m in &mut db.colgrp_ranks_meta {
                let blob = env.wait(it.next().unwrap());
                m.regular.deserialize_from(&blob);
            }
        }

        let tile_width = self.base.tile_width;
        for db in &mut self.dashboards {
            let mut rows = BitVector::new(tile_width);
            let mut cols = BitVector::new(tile_width);
            for m in &db.rowgrp_ranks_meta {
                rows.union_with(&m.regular);
            }
            for m in &db.colgrp_ranks_meta {
                cols.union_with(&m.regular);
            }

            db.regular.union_with(&rows);
            db.regular.intersect_with(&cols);

            db.sink.union_with(&rows);
            db.sink.difference_with(&cols);

            db.source.union_with(&cols);
            db.source.difference_with(&rows);

            debug!(
                "dashboard {}: regular {} sink {} source {} of {}",
                db.rg,
                db.regular.count(),
                db.sink.count(),
                db.source.count(),
                tile_width
            );
        }

        // Rowgroup members receive back the authoritative regular and sink
        // sets; colgroup members receive their own intersected regular set.
        let rowgrp_back: Vec<(RecvReq, RecvReq)> = self
            .local_rowgrps
            .iter()
            .map(|rowgrp| {
                (
                    env.irecv(rowgrp.leader, tags::rowgrp(rowgrp.rg, false)),
                    env.irecv(rowgrp.leader, tags::rowgrp_global_sink(nrowgrps, rowgrp.rg)),
                )
            })
            .collect();
        let colgrp_back: Vec<RecvReq> = self
            .local_colgrps
            .iter()
            .map(|colgrp| env.irecv(colgrp.leader, tags::colgrp(colgrp.cg, false)))
            .collect();

        for db in &mut self.dashboards {
            let regular = &mut db.regular;
            let sink = &mut db.sink;
            for m in &mut db.rowgrp_ranks_meta {
                m.regular.intersect_with(regular);

                let mut blob = Vec::new();
                regular.serialize_into(&mut blob, false);
                env.send(blob, m.rank, tags::rowgrp(db.rg, false));

                let mut blob = Vec::new();
                sink.serialize_into(&mut blob, false);
                env.send(blob, m.rank, tags::rowgrp_global_sink(nrowgrps, db.rg));
            }

            let regular = &db.regular;
            for m in &mut db.colgrp_ranks_meta {
                m.other.union_with(&m.regular); // other == source
                m.other.difference_with(regular);
                m.regular.intersect_with(regular);

                let mut blob = Vec::new();
                m.regular.serialize_into(&mut blob, false);
                env.send(blob, m.rank, tags::colgrp(db.cg, false));
            }
        }

        // Followers derive their local splits and build the locators.
        for (rowgrp, (req_reg, req_snk)) in self.local_rowgrps.iter_mut().zip(rowgrp_back) {
            rowgrp.globally_regular.deserialize_from(&env.wait(req_reg));
            rowgrp.globally_sink.deserialize_from(&env.wait(req_snk));

            rowgrp.regular.union_with(&rowgrp.local);
            rowgrp.regular.intersect_with(&rowgrp.globally_regular);

            rowgrp.sink.union_with(&rowgrp.local);
            rowgrp.sink.difference_with(&rowgrp.regular);

            let (local, regular, sink) = (
                &mut rowgrp.local,
                &mut rowgrp.regular,
                &mut rowgrp.sink,
            );
            rowgrp.locator = Some(Locator::from_bitvectors(local, regular, sink));

            let mut global = rowgrp.globally_regular.clone();
            global.union_with(&rowgrp.globally_sink);
            rowgrp.global_locator = Some(Locator::from_bitvectors(
                &mut global,
                &mut rowgrp.globally_regular,
                &mut rowgrp.globally_sink,
            ));
        }

        for (colgrp, req) in self.local_colgrps.iter_mut().zip(colgrp_back) {
            colgrp.regular.deserialize_from(&env.wait(req));

            colgrp.source.union_with(&colgrp.local);
            colgrp.source.difference_with(&colgrp.regular);

            let (local, regular, source) = (
                &mut colgrp.local,
                &mut colgrp.regular,
                &mut colgrp.source,
            );
            colgrp.locator = Some(Locator::from_bitvectors(local, regular, source));
        }

        for db in &mut self.dashboards {
            let (regular, sink, source) = (&mut db.regular, &mut db.sink, &mut db.source);
            db.locator = Some(Locator::for_dashboard(regular, sink, source));
        }

        // Project every member's sets onto the dashboard enumerations now,
        // so the vector layers can be built from a shared reference.
        for db in &mut self.dashboards {
            let regular = &mut db.regular;
            let sink = &mut db.sink;
            let source = &mut db.source;
            for m in &mut db.rowgrp_ranks_meta {
                m.generate_sub_regular(regular, sink);
            }
            for m in &mut db.colgrp_ranks_meta {
                m.generate_sub_regular(regular, source);
            }
        }

        env.barrier();
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

    /// Edges 0->1, 1->2 plus isolated vertex 3, stored transposed
    /// (row = dst): rows {1, 2}, cols {0, 1}.
    fn path_matrix(env: courier::Env, ntiles: u32) -> CscMatrix2D<Empty> {
        let mut m: Matrix2D<Empty> =
            Matrix2D::new(4, 4, ntiles, Partitioning::TwoDim, env).unwrap();
        if m.env.rank() == 0 {
            for &(row, col) in &[(1u32, 0u32), (2, 1)] {
                m.insert(Triple {
                    row,
                    col,
                    weight: Empty,
                });
            }
        }
        m.distribute();
        let mut a = CscMatrix2D::annotate(m);
        a.preprocess();
        a
    }

    fn collect(bv: &BitVector) -> Vec<u32> {
        let mut out = Vec::new();
        let mut c = bv.clone();
        c.rewind();
        while let Some(i) = c.next() {
            out.push(i);
        }
        out
    }

    #[test]
    fn roles_partition_the_segment() {
        Runtime::launch(1, |env| {
            let a = path_matrix(env, 1);
            let db = &a.dashboards[0];
            assert_eq!(collect(&db.regular), vec![1]);
            assert_eq!(collect(&db.sink), vec![2]);
            assert_eq!(collect(&db.source), vec![0]);
            let loc = db.locator.as_ref().unwrap();
            assert_eq!(loc.nregular(), 1);
            assert_eq!(loc.nsink(), 1);
            assert_eq!(loc.nsource(), 1);
            // regular | sink | source | isolated partitions the width
            assert_eq!(loc.at(1), 0);
            assert_eq!(loc.at(2), 1);
            assert_eq!(loc.at(0), 2);
            // disjointness
            let mut r = db.regular.clone();
            r.intersect_with(&db.sink);
            assert_eq!(r.count(), 0);
            let mut r = db.regular.clone();
            r.intersect_with(&db.source);
            assert_eq!(r.count(), 0);
        });
    }

    #[test]
    fn followers_agree_with_leaders() {
        for nranks in &[1usize, 4] {
            let nranks = *nranks;
            Runtime::launch(nranks, move |env| {
                let a = path_matrix(env, (nranks * nranks) as u32);
                for rowgrp in &a.local_rowgrps {
                    // db.regular restricted to the local set
                    let mut expect = rowgrp.globally_regular.clone();
                    expect.intersect_with(&rowgrp.local);
                    assert_eq!(collect(&rowgrp.regular), collect(&expect));
                    // local regular + local sink == local
                    assert_eq!(
                        rowgrp.regular.count() + rowgrp.sink.count(),
                        rowgrp.local.count()
                    );
                }
                for db in &a.dashboards {
                    // the leader's own rowgroup view matches the dashboard
                    let ith = a.rowgrp_ith[db.rg as usize].unwrap() as usize;
                    let rowgrp = &a.local_rowgrps[ith];
                    assert_eq!(collect(&rowgrp.globally_regular), collect(&db.regular));
                    assert_eq!(collect(&rowgrp.globally_sink), collect(&db.sink));
                }
            });
        }
    }
}
