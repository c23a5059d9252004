//! Vertex vector: master segments per owned dashboard, mirror segments per
//! local rowgroup.
///
/// Copyright (c) 2020, Institute for Defense Analyses
/// 4850 Mark Center Drive, Alexandria, VA 22311-1882; 703-845-2500
///
/// All rights reserved.
///
/// This file is part of GasMat.  For license information see the
/// LICENSE file in the top level dirctory of the distribution.
use courier::{Env, RecvReq};

use crate::locator::Locator;
use crate::matrix::annotated::CscMatrix2D;
use crate::matrix::graph::LoadWeight;
use crate::matrix::tags;
use crate::structures::{BitVector, RandomAccessArray};
use crate::value::Value;

/// Master segment: every state of one led segment, ordered by the
/// dashboard locator (`[regular | sink | source | isolated]`).  Activity is
/// tracked for mirroring; every vertex has exactly one master segment.
#[derive(Debug)]
pub struct VertexMasterSegment<S: Value> {
    /// The states, indexed by dashboard enumeration position.
    pub array: RandomAccessArray<S>,
    /// Dashboard index.
    pub kth: u32,
    /// Global rowgroup id.
    pub rg: u32,
    /// First vertex index covered by the segment.
    pub offset: u32,
    /// The dashboard's reordering.
    pub locator: Locator,
    /// Inverse of the locator: raw index per enumeration position.
    pub original_from_internal: Vec<u32>,
    /// `(rank, regular filter, sink filter)` per rowgroup member.
    members: Vec<(usize, BitVector, BitVector)>,
    out: RandomAccessArray<S>,
}

impl<S: Value> VertexMasterSegment<S> {
    fn new<W: LoadWeight>(matrix: &CscMatrix2D<W>, kth: u32) -> Self {
        let db = &matrix.dashboards[kth as usize];
        let locator = db.locator.as_ref().unwrap().clone();
        let n = db.regular.size(); // every state, not just the active ones

        let ith = matrix.rowgrp_ith[db.rg as usize].expect("leader without local rowgroup");
        let rowgrp = &matrix.local_rowgrps[ith as usize];
        let global_locator = rowgrp.global_locator.as_ref().unwrap();

        // The dashboard and global-rowgroup orders agree on the regular and
        // sink buckets; sink states land right after the regular ones, which
        // the sink pass relies on.
        if cfg!(debug_assertions) {
            let c = locator.nregular() + locator.nsink();
            for i in 0..n {
                let a = global_locator.at(i);
                let b = locator.at(i);
                if a < c || b < c {
                    assert_eq!(a, b);
                }
            }
        }

        let mut original_from_internal = vec![0u32; n as usize];
        for i in 0..n {
            original_from_internal[locator.at(i) as usize] = i;
        }

        let members = db
            .rowgrp_ranks_meta
            .iter()
            .map(|m| (m.rank, m.sub_regular.clone(), m.sub_other.clone()))
            .collect::<Vec<_>>();
        assert!(!members.is_empty());
        assert_eq!(members.last().unwrap().0, matrix.base.env.rank());

        VertexMasterSegment {
            array: RandomAccessArray::new(n),
            kth,
            rg: db.rg,
            offset: rowgrp.offset,
            locator,
            original_from_internal,
            members,
            out: RandomAccessArray::new(n),
        }
    }

    /// States in the segment.
    pub fn size(&self) -> u32 {
        self.array.size()
    }

    /// Enumeration position of a raw (hashed, segment-relative) index.
    pub fn internal_from_original(&self, idx: u32) -> u32 {
        assert!(idx >= self.offset);
        assert!(idx - self.offset < self.size());
        self.locator.at(idx - self.offset)
    }

    /// Ship the active states to every rowgroup member's mirror segment,
    /// filtered per member.  Regular flavor filters by `sub_regular`, sink
    /// by `sub_other`.
    pub fn bcast(&mut self, sink: bool, env: &Env) {
        let tag = tags::mirror(self.rg, sink);
        for i in 0..self.members.len() {
            let (rank, sub_regular, sub_other) = &mut self.members[i];
            let filter = if sink { sub_other } else { sub_regular };

            filter.rewind();
            let mut act = self.array.activity().clone();
            act.rewind();

            // Merge the member filter against the activity stream; matches
            // keep their enumeration position.
            let mut local = filter.next();
            let mut nz = act.next();
            while let (Some(f), Some(vi)) = (local, nz) {
                if f == vi {
                    self.out.push(vi, self.array[vi].clone());
                }
                if f <= vi {
                    local = filter.next();
                }
                if f >= vi {
                    nz = act.next();
                }
            }
            filter.rewind();

            let blob = self.out.serialize_into(true);
            env.send(blob, *rank, tag);
        }
    }
}

/// Mirror segment: a read-only shadow of a master segment's active states,
/// held by the ranks with rowgroups in that segment during gather.
#[derive(Debug)]
pub struct VertexMirrorSegment<S: Value> {
    /// The mirrored states, indexed by the segment's global enumeration.
    pub array: RandomAccessArray<S>,
    /// Local rowgroup index.
    pub ith: u32,
    /// Global rowgroup id.
    pub rg: u32,
    owner: usize,
    tag: u32,
}

/// Mirror segments of one flavor (regular or sink), with their pending
/// receives.
#[derive(Debug)]
pub struct MirrorSegments<S: Value> {
    /// One mirror per local rowgroup.
    pub segs: Vec<VertexMirrorSegment<S>>,
    reqs: Vec<Option<RecvReq>>,
}

impl<S: Value> MirrorSegments<S> {
    fn new<W: LoadWeight>(matrix: &CscMatrix2D<W>, sink: bool) -> Self {
        let segs: Vec<VertexMirrorSegment<S>> = matrix
            .local_rowgrps
            .iter()
            .map(|rowgrp| VertexMirrorSegment {
                // Sized over the full width; states live at enumeration
                // positions below the global regular (or sink) count.
                array: RandomAccessArray::new(rowgrp.globally_regular.size()),
                ith: rowgrp.ith,
                rg: rowgrp.rg,
                owner: rowgrp.leader,
                tag: tags::mirror(rowgrp.rg, sink),
            })
            .collect();
        MirrorSegments {
            reqs: vec![None; segs.len()],
            segs,
        }
    }

    /// Post one receive per local rowgroup.
    pub fn recv_all(&mut self, env: &Env) {
        for (i, seg) in self.segs.iter().enumerate() {
            self.reqs[i] = Some(env.irecv(seg.owner, seg.tag));
        }
    }

    /// Block until rowgroup `ith`'s mirror has landed, if it is pending.
    pub fn wait_for_ith(&mut self, ith: u32, env: &Env) {
        if let Some(req) = self.reqs[ith as usize].take() {
            let blob = env.wait(req);
            let seg = &mut self.segs[ith as usize];
            seg.array.clear();
            seg.array.deserialize_from(&blob);
        }
    }
}

/// The vertex vector: master segments plus (when gather reads state) the
/// regular and sink mirrors.
#[derive(Debug)]
pub struct VertexVector<S: Value> {
    /// Master segments, by dashboard.
    pub own_segs: Vec<VertexMasterSegment<S>>,
    /// Regular mirrors, allocated on demand.
    pub mir_regular: Option<MirrorSegments<S>>,
    /// Sink mirrors, allocated on demand.
    pub mir_sink: Option<MirrorSegments<S>>,
}

impl<S: Value> VertexVector<S> {
    /// Allocate the master segments for a processed matrix.
    pub fn new<W: LoadWeight>(matrix: &CscMatrix2D<W>) -> Self {
        VertexVector {
            own_segs: (0..matrix.dashboards.len())
                .map(|k| VertexMasterSegment::new(matrix, k as u32))
                .collect(),
            mir_regular: None,
            mir_sink: None,
        }
    }

    /// Whether mirrors have been allocated.
    pub fn mirrors_allocated(&self) -> bool {
        self.mir_regular.is_some() || self.mir_sink.is_some()
    }

    /// Allocate one mirror flavor.
    pub fn allocate_mirrors<W: LoadWeight>(&mut self, matrix: &CscMatrix2D<W>, sink: bool) {
        let slot = if sink {
            &mut self.mir_sink
        } else {
            &mut self.mir_regular
        };
        assert!(slot.is_none());
        *slot = Some(MirrorSegments::new(matrix, sink));
    }

    /// Clear every master activity bit.
    pub fn reset_activity(&mut self) {
        for vseg in &mut self.own_segs {
            vseg.array.activity_mut().clear();
        }
    }

    /// Set every master activity bit.
    pub fn activate_all(&mut self) {
        for vseg in &mut self.own_segs {
            vseg.array.activity_mut().fill();
        }
    }
}
