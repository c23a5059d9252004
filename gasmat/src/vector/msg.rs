//! Message vector: incoming and outgoing segments of scatter output.
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
use crate::structures::{BitVector, StreamingArray};
use crate::value::Value;

/// Incoming messages along one local colgroup, keyed by reordered column
/// position (regular or source flavor).
#[derive(Debug)]
pub struct MsgIncomingSegment<M: Value> {
    /// The message payload.
    pub array: StreamingArray<M>,
    /// Local colgroup index.
    pub jth: u32,
    /// Global colgroup id.
    pub cg: u32,
    /// The colgroup leader this segment receives from.
    pub owner: usize,
    /// Source flavor?
    pub source: bool,
}

/// Outgoing messages of one led segment.  The leader holds exactly the
/// `db.regular` (or `db.source`) entries and broadcasts to every rank in
/// the led colgroup a slice filtered by that rank's sub-bit-vector.
#[derive(Debug)]
pub struct MsgOutgoingSegment<M: Value> {
    /// Messages pending broadcast, keyed by dashboard enumeration position.
    pub array: StreamingArray<M>,
    /// Dashboard index.
    pub kth: u32,
    /// Global colgroup id of the led segment.
    pub cg: u32,
    /// Source flavor?
    pub source: bool,
    out: StreamingArray<M>,
    /// `(rank, filter)` per colgroup member; self last so network sends get
    /// the most time to progress.
    members: Vec<(usize, BitVector)>,
}

impl<M: Value> MsgOutgoingSegment<M> {
    fn new<W: LoadWeight>(matrix: &CscMatrix2D<W>, kth: u32, source: bool) -> Self {
        let db = &matrix.dashboards[kth as usize];
        let n = if source {
            db.source.count()
        } else {
            db.regular.count()
        };
        let members = db
            .colgrp_ranks_meta
            .iter()
            .map(|m| {
                let filter = if source {
                    m.sub_other.clone()
                } else {
                    m.sub_regular.clone()
                };
                (m.rank, filter)
            })
            .collect::<Vec<_>>();
        assert!(!members.is_empty());
        assert_eq!(members.last().unwrap().0, matrix.base.env.rank());
        MsgOutgoingSegment {
            array: StreamingArray::new(n),
            kth,
            cg: db.cg,
            source,
            out: StreamingArray::new(n),
            members,
        }
    }

    /// Entries this segment can hold.
    pub fn size(&self) -> u32 {
        self.array.size()
    }

    /// Queue a message at dashboard enumeration position `idx`.
    pub fn push(&mut self, idx: u32, msg: M) {
        self.array.push(idx, msg);
    }

    /// Drop all queued messages.
    pub fn clear(&mut self) {
        self.array.clear();
    }

    /// Ship the queued messages: for each member, merge the activity stream
    /// against the member's filter, compact, and send.  Clears the segment.
    pub fn bcast(&mut self, env: &Env) {
        let full = self.array.size();
        let tag = tags::colgrp(self.cg, self.source);
        for i in 0..self.members.len() {
            let (rank, filter) = &mut self.members[i];
            self.out.temporarily_resize(filter.count());

            filter.rewind();
            self.array.rewind();

            let mut z = 0u32;
            let mut local = filter.next();
            let mut nonzero = self.array.next();
            while let (Some(f), Some((vi, val))) = (local, nonzero.clone()) {
                if f == vi {
                    self.out.push(z, val);
                }
                if f <= vi {
                    z += 1;
                    local = filter.next();
                }
                if f >= vi {
                    nonzero = self.array.next();
                }
            }
            filter.rewind();
            self.array.rewind();

            let blob = self.out.serialize_into(true);
            env.send(blob, *rank, tag);
            self.out.temporarily_resize(full);
        }
        self.array.clear();
    }
}

/// The message vector: incoming segments per local colgroup, outgoing
/// segments per owned dashboard, both in regular and source flavors.
#[derive(Debug)]
pub struct MsgVector<M: Value> {
    /// Incoming regular messages, by local colgroup.
    pub incoming_regular: Vec<MsgIncomingSegment<M>>,
    /// Incoming source messages, by local colgroup.
    pub incoming_source: Vec<MsgIncomingSegment<M>>,
    /// Outgoing regular messages, by dashboard.
    pub outgoing_regular: Vec<MsgOutgoingSegment<M>>,
    /// Outgoing source messages, by dashboard.
    pub outgoing_source: Vec<MsgOutgoingSegment<M>>,
    reqs: Vec<Option<RecvReq>>,
    blobs: Vec<Option<Vec<u8>>>,
    num_outstanding: usize,
    source_reqs: Vec<Option<RecvReq>>,
}

impl<M: Value> MsgVector<M> {
    /// Allocate the segments for a processed matrix.
    pub fn new<W: LoadWeight>(matrix: &CscMatrix2D<W>) -> Self {
        let incoming_regular = matrix
            .local_colgrps
            .iter()
            .map(|colgrp| MsgIncomingSegment {
                array: StreamingArray::new(colgrp.regular.count()),
                jth: colgrp.jth,
                cg: colgrp.cg,
                owner: colgrp.leader,
                source: false,
            })
            .collect();
        let incoming_source = matrix
            .local_colgrps
            .iter()
            .map(|colgrp| MsgIncomingSegment {
                array: StreamingArray::new(colgrp.source.count()),
                jth: colgrp.jth,
                cg: colgrp.cg,
                owner: colgrp.leader,
                source: true,
            })
            .collect();
        let outgoing_regular = (0..matrix.dashboards.len())
            .map(|k| MsgOutgoingSegment::new(matrix, k as u32, false))
            .collect();
        let outgoing_source = (0..matrix.dashboards.len())
            .map(|k| MsgOutgoingSegment::new(matrix, k as u32, true))
            .collect();
        MsgVector {
            incoming_regular,
            incoming_source,
            outgoing_regular,
            outgoing_source,
            reqs: Vec::new(),
            blobs: Vec::new(),
            num_outstanding: 0,
            source_reqs: Vec::new(),
        }
    }

    /// Post the receives for the next round of regular messages.
    pub fn recv_regular(&mut self, env: &Env) {
        assert!(self.reqs.is_empty(), "previous round not drained");
        self.reqs = self
            .incoming_regular
            .iter()
            .map(|seg| Some(env.irecv(seg.owner, tags::colgrp(seg.cg, false))))
            .collect();
        self.blobs = vec![None; self.incoming_regular.len()];
        self.num_outstanding = self.incoming_regular.len();
    }

    /// Post the receives for the one-time source messages.
    pub fn recv_source(&mut self, env: &Env) {
        assert!(self.source_reqs.is_empty());
        self.source_reqs = self
            .incoming_source
            .iter()
            .map(|seg| Some(env.irecv(seg.owner, tags::colgrp(seg.cg, true))))
            .collect();
    }

    /// Block until every source segment has landed and deserialize them.
    pub fn wait_for_sources(&mut self, env: &Env) {
        let reqs = std::mem::take(&mut self.source_reqs);
        for (seg, req) in self.incoming_source.iter_mut().zip(reqs) {
            if let Some(req) = req {
                let blob = env.wait(req);
                seg.array.clear();
                seg.array.deserialize_from(&blob);
            }
        }
    }

    /// Wait for at least one regular segment to become ready and return the
    /// ready local colgroup indices.  When no receives are pending (the
    /// segments already hold this round's messages), every index is ready.
    pub fn wait_for_some(&mut self, env: &Env) -> Vec<usize> {
        if self.reqs.is_empty() {
            self.num_outstanding = 0;
            return (0..self.incoming_regular.len()).collect();
        }
        let ready = env.wait_some(&mut self.reqs);
        self.num_outstanding -= ready.len();
        ready
            .into_iter()
            .map(|(jth, bytes)| {
                self.blobs[jth] = Some(bytes);
                jth
            })
            .collect()
    }

    /// Deserialize segment `jth` if a fresh blob is pending; otherwise the
    /// segment keeps its current contents (the reuse path for sink passes).
    pub fn take_jth(&mut self, jth: usize) {
        if let Some(blob) = self.blobs.get_mut(jth).and_then(Option::take) {
            let seg = &mut self.incoming_regular[jth];
            seg.array.clear();
            seg.array.deserialize_from(&blob);
        }
    }

    /// True when no regular receives are outstanding.
    pub fn no_more_segs(&self) -> bool {
        self.num_outstanding == 0
    }

    /// If no receives are outstanding, reset the round state.
    pub fn no_more_segs_then_clear(&mut self) -> bool {
        if self.num_outstanding == 0 {
            self.reqs.clear();
            self.blobs.clear();
            return true;
        }
        false
    }

    /// Drop every queued message and pending round (for engine reset).
    pub fn reset(&mut self) {
        for seg in self
            .incoming_regular
            .iter_mut()
            .chain(self.incoming_source.iter_mut())
        {
            seg.array.clear();
        }
        for seg in self
            .outgoing_regular
            .iter_mut()
            .chain(self.outgoing_source.iter_mut())
        {
            seg.clear();
        }
        self.reqs.clear();
        self.blobs.clear();
        self.source_reqs.clear();
        self.num_outstanding = 0;
    }
}
