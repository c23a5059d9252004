//! Accumulator vector: partial segments per local rowgroup, final segments
//! per owned dashboard.
///
/// Copyright (c) 2020, Institute for Defense Analyses
/// 4850 Mark Center Drive, Alexandria, VA 22311-1882; 703-845-2500
///
/// All rights reserved.
///
/// This file is part of GasMat.  For license information see the
/// LICENSE file in the top level dirctory of the distribution.
use courier::{Env, RecvReq};

use crate::matrix::annotated::CscMatrix2D;
use crate::matrix::graph::LoadWeight;
use crate::matrix::tags;
use crate::structures::RandomAccessArray;
use crate::value::Value;

/// Per-(rowgroup, iteration) partial accumulator, indexed over the
/// rowgroup's global regular (or sink) enumeration.  Sent to the rowgroup
/// leader once every local tile of the rowgroup has been combined in.
#[derive(Debug)]
pub struct AccumPartialSegment<A: Value> {
    /// The partial values.
    pub array: RandomAccessArray<A>,
    /// Global rowgroup id.
    pub rg: u32,
    /// Local rowgroup index.
    pub ith: u32,
    /// Tiles combined into this partial so far this iteration.
    pub ncombined: u32,
    ntiles: u32,
    owner: usize,
    tag: u32,
}

impl<A: Value> AccumPartialSegment<A> {
    /// All local tiles consumed; ready to ship.
    pub fn ready(&self) -> bool {
        self.ncombined == self.ntiles
    }

    /// Ship the partial to the rowgroup leader, draining it for the next
    /// iteration.
    pub fn send(&mut self, env: &Env) {
        self.ncombined = 0;
        let blob = self.array.serialize_into(true);
        env.send(blob, self.owner, self.tag);
    }
}

/// Per-dashboard final accumulator over the segment's regular (or sink)
/// enumeration.  Gathers one partial per rowgroup member each iteration.
#[derive(Debug)]
pub struct AccumFinalSegment<A: Value> {
    /// The combined values.
    pub array: RandomAccessArray<A>,
    /// Dashboard index.
    pub kth: u32,
    /// Global rowgroup id.
    pub rg: u32,
    /// Offset of the sink region in the master state segment.
    pub sink_offset: u32,
    /// Arrival buffers, one per rowgroup member.
    pub partials: Vec<RandomAccessArray<A>>,
    member_ranks: Vec<usize>,
    reqs: Vec<Option<RecvReq>>,
    num_outstanding: usize,
    tag: u32,
}

impl<A: Value> AccumFinalSegment<A> {
    /// Post one receive per rowgroup member for this iteration's partials.
    pub fn gather(&mut self, env: &Env) {
        assert_eq!(self.num_outstanding, 0, "previous gather not drained");
        self.reqs = self
            .member_ranks
            .iter()
            .map(|&r| Some(env.irecv(r, self.tag)))
            .collect();
        self.num_outstanding = self.member_ranks.len();
    }

    /// Block until at least one partial lands; deserialize the arrivals and
    /// return their member indices.
    pub fn wait_for_some(&mut self, env: &Env) -> Vec<usize> {
        assert!(self.num_outstanding > 0);
        let ready = env.wait_some(&mut self.reqs);
        self.num_outstanding -= ready.len();
        ready
            .into_iter()
            .map(|(i, bytes)| {
                self.partials[i].deserialize_from(&bytes);
                i
            })
            .collect()
    }

    /// All partials have landed this iteration.
    pub fn no_more_segs(&self) -> bool {
        self.num_outstanding == 0
    }
}

/// The accumulator vector: regular and sink flavors of both segment kinds.
#[derive(Debug)]
pub struct AccumVector<A: Value> {
    /// Regular partials, by local rowgroup.
    pub local_segs: Vec<AccumPartialSegment<A>>,
    /// Sink partials, by local rowgroup.
    pub local_segs_sink: Vec<AccumPartialSegment<A>>,
    /// Regular finals, by dashboard.
    pub own_segs: Vec<AccumFinalSegment<A>>,
    /// Sink finals, by dashboard.
    pub own_segs_sink: Vec<AccumFinalSegment<A>>,
}

impl<A: Value> AccumVector<A> {
    /// Allocate the segments for a processed matrix.
    pub fn new<W: LoadWeight>(matrix: &CscMatrix2D<W>) -> Self {
        let partial = |sink: bool| -> Vec<AccumPartialSegment<A>> {
            matrix
                .local_rowgrps
                .iter()
                .map(|rowgrp| {
                    let n = if sink {
                        rowgrp.globally_sink.count()
                    } else {
                        rowgrp.globally_regular.count()
                    };
                    AccumPartialSegment {
                        array: RandomAccessArray::new(n),
                        rg: rowgrp.rg,
                        ith: rowgrp.ith,
                        ncombined: 0,
                        ntiles: rowgrp.tile_cgs.len() as u32,
                        owner: rowgrp.leader,
                        tag: tags::rowgrp(rowgrp.rg, sink),
                    }
                })
                .collect()
        };
        let fin = |sink: bool| -> Vec<AccumFinalSegment<A>> {
            matrix
                .dashboards
                .iter()
                .map(|db| {
                    let n = if sink {
                        db.sink.count()
                    } else {
                        db.regular.count()
                    };
                    let member_ranks: Vec<usize> =
                        db.rowgrp_ranks_meta.iter().map(|m| m.rank).collect();
                    AccumFinalSegment {
                        array: RandomAccessArray::new(n),
                        kth: db.kth,
                        rg: db.rg,
                        sink_offset: db.regular.count(),
                        partials: member_ranks
                            .iter()
                            .map(|_| RandomAccessArray::new(n))
                            .collect(),
                        member_ranks,
                        reqs: Vec::new(),
                        num_outstanding: 0,
                        tag: tags::rowgrp(db.rg, sink),
                    }
                })
                .collect()
        };
        AccumVector {
            local_segs: partial(false),
            local_segs_sink: partial(true),
            own_segs: fin(false),
            own_segs_sink: fin(true),
        }
    }

    /// Drop all accumulated state (for engine reset).
    pub fn reset(&mut self) {
        for seg in self.local_segs.iter_mut().chain(self.local_segs_sink.iter_mut()) {
            seg.array.clear();
            seg.ncombined = 0;
        }
        for seg in self.own_segs.iter_mut().chain(self.own_segs_sink.iter_mut()) {
            seg.array.clear();
            for p in &mut seg.partials {
                p.clear();
            }
            seg.reqs.clear();
            seg.num_outstanding = 0;
        }
    }
}
