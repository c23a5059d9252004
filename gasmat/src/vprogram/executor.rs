//! The asynchronous GAS execution engine.
///
/// Copyright (c) 2020, Institute for Defense Analyses
/// 4850 Mark Center Drive, Alexandria, VA 22311-1882; 703-845-2500
///
/// All rights reserved.
///
/// This file is part of GasMat.  For license information see the
/// LICENSE file in the top level dirctory of the distribution.
use courier::{AllreduceAnd, Env};
use log::{debug, info};
use rayon::prelude::*;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::cmp::Ordering;

use crate::matrix::graph::Graph;
use crate::matrix::tile::Csc;
use crate::structures::{RandomAccessArray, StreamReader};
use crate::vector::{AccumFinalSegment, AccumPartialSegment, AccumVector, MsgVector, VertexVector};
use crate::vprogram::{Edge, InitFrom, VertexProgram, UNTIL_CONVERGENCE};

/// Executes a vertex program over a loaded graph.
///
/// Per iteration (optimizable case): post receives for the next round of
/// messages and this round's partial accumulators, drain ready incoming
/// message segments into tile-local SpMVs, ship each rowgroup's partial
/// once all its tiles are consumed, combine partials into finals at
/// leaders, apply, scatter, and test global convergence with an
/// asynchronous all-reduce.  Sink vertices run in one terminal pass.
pub struct Executor<'g, P: VertexProgram> {
    graph: &'g Graph<P::W>,
    program: P,
    /// Vertex states (master and mirror segments).
    pub v: VertexVector<P::S>,
    x: MsgVector<P::M>,
    y: AccumVector<P::A>,
    initialized: bool,
    optimizable: bool,
    conv_req: Option<AllreduceAnd>,
}

impl<'g, P: VertexProgram> std::fmt::Debug for Executor<'g, P> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Executor")
            .field("initialized", &self.initialized)
            .field("optimizable", &self.optimizable)
            .finish()
    }
}

impl<'g, P: VertexProgram> Executor<'g, P> {
    /// Bind a program to a loaded graph and allocate the vectors.
    pub fn new(graph: &'g Graph<P::W>, program: P) -> Self {
        let matrix = graph.matrix();
        let optimizable = P::OPTIMIZABLE
            && graph.is_directed()
            && !P::GATHER_WITH_STATE
            && !P::APPLY_WITH_ITER;
        debug!(
            "optimizable {}, gather_with_state {}, apply_with_iter {}",
            optimizable,
            P::GATHER_WITH_STATE,
            P::APPLY_WITH_ITER
        );
        Executor {
            graph,
            program,
            v: VertexVector::new(matrix),
            x: MsgVector::new(matrix),
            y: AccumVector::new(matrix),
            initialized: false,
            optimizable,
            conv_req: None,
        }
    }

    /// The bound program.
    pub fn program(&self) -> &P {
        &self.program
    }

    /// The bound graph.
    pub fn graph(&self) -> &'g Graph<P::W> {
        self.graph
    }

    /// Initialize every owned vertex state and scatter the initial
    /// messages.  Called implicitly by the first `execute`.
    pub fn initialize(&mut self) {
        self.initialize_with(|program, _kth, _i, vid, state, _locator| program.init(vid, state));
    }

    /// Initialize states from another program's states on the reverse
    /// graph: regular and isolated regions align positionally, sink and
    /// source regions swap.
    pub fn initialize_from<P2>(&mut self, other: &Executor<'_, P2>)
    where
        P2: VertexProgram,
        P: InitFrom<P2::S>,
    {
        assert_eq!(self.v.own_segs.len(), other.v.own_segs.len());
        let others = &other.v.own_segs;
        self.initialize_with(move |program, kth, i, vid, state, locator| {
            let vseg2 = &others[kth as usize];
            let nregular = locator.nregular();
            let nsink = locator.nsink();
            let nsource = locator.nsource();
            // Map our position into the reversed program's layout.
            let j = if i < nregular {
                i
            } else if i < nregular + nsink {
                nregular + nsource + (i - nregular)
            } else if i < nregular + nsink + nsource {
                nregular + (i - nregular - nsink)
            } else {
                i
            };
            program.init_from(vid, &vseg2.array[j], state)
        });
    }

    fn initialize_with<F>(&mut self, init_fn: F)
    where
        F: Fn(&P, u32, u32, u32, &mut P::S, &crate::locator::Locator) -> bool,
    {
        assert!(!self.initialized, "already initialized; call reset() first");
        let env = self.graph.env().clone();
        let directed = self.graph.is_directed();
        let nvertices = self.graph.nvertices();

        self.x.recv_regular(&env);
        if directed {
            self.x.recv_source(&env);
        }

        let program = &self.program;
        let hasher = self.graph.hasher();
        for ((vseg, xseg), xseg_src) in self
            .v
            .own_segs
            .iter_mut()
            .zip(self.x.outgoing_regular.iter_mut())
            .zip(self.x.outgoing_source.iter_mut())
        {
            let kth = vseg.kth;
            let offset = vseg.offset;
            let size = vseg.size();
            let array = &mut vseg.array;
            let map = &vseg.original_from_internal;
            let locator = &vseg.locator;

            let nregular = locator.nregular();
            let nsink = locator.nsink();
            let nsource = locator.nsource();
            debug_assert_eq!(xseg.size(), nregular);

            let vid_of = |i: u32| -> Option<u32> {
                let hidx = offset + map[i as usize];
                let vid = hasher.unhash(hidx as i64) as u32;
                // Padding indices beyond the vertex universe are skipped.
                if vid < nvertices {
                    Some(vid)
                } else {
                    None
                }
            };

            // Regular vertices scatter into the outgoing regular segment.
            for i in 0..nregular {
                if let Some(vid) = vid_of(i) {
                    if init_fn(program, kth, i, vid, &mut array[i], locator) {
                        xseg.push(i, program.scatter(&array[i]));
                    }
                }
            }
            xseg.bcast(&env);

            if directed {
                // Sink vertices are initialized but never scatter.
                for i_ in 0..nsink {
                    let i = nregular + i_;
                    if let Some(vid) = vid_of(i) {
                        init_fn(program, kth, i, vid, &mut array[i], locator);
                    }
                }

                // Source vertices scatter into the outgoing source segment.
                debug_assert_eq!(xseg_src.size(), nsource);
                for i_ in 0..nsource {
                    let i = nregular + nsink + i_;
                    if let Some(vid) = vid_of(i) {
                        if init_fn(program, kth, i, vid, &mut array[i], locator) {
                            xseg_src.push(i_, program.scatter(&array[i]));
                        }
                    }
                }
                xseg_src.bcast(&env);
            }

            // Isolated vertices only get their states initialized.
            for i in nregular + nsink + nsource..size {
                if let Some(vid) = vid_of(i) {
                    init_fn(program, kth, i, vid, &mut array[i], locator);
                }
            }
        }

        if P::GATHER_WITH_STATE && !self.v.mirrors_allocated() {
            let matrix = self.graph.matrix();
            self.v.allocate_mirrors(matrix, false);
            if directed {
                self.v.allocate_mirrors(matrix, true);
            }
            if P::STATIONARY {
                self.v.activate_all();
            }
            self.bcast_mirrors(false, &env);
            if directed {
                self.bcast_mirrors(true, &env);
            }
            // Vertex activity need only be maintained for mirroring.
            self.v.reset_activity();
        }

        self.initialized = true;
    }

    fn bcast_mirrors(&mut self, sink: bool, env: &Env) {
        let v = &mut self.v;
        let mir = if sink {
            v.mir_sink.as_mut()
        } else {
            v.mir_regular.as_mut()
        }
        .expect("mirrors not allocated");
        mir.recv_all(env);
        for vseg in &mut v.own_segs {
            vseg.bcast(sink, env);
        }
    }

    /// Reset execution state so the program can run again from
    /// `initialize`.
    pub fn reset(&mut self) {
        self.initialized = false;
        self.x.reset();
        self.y.reset();
    }

    /// Run for `max_iters` iterations, or until global convergence when
    /// `max_iters` is `UNTIL_CONVERGENCE`.
    pub fn execute(&mut self, max_iters: u32) {
        if !self.initialized {
            self.initialize();
        }
        if max_iters == 1 {
            if self.graph.is_directed() {
                self.execute_single();
            } else {
                self.execute_single_undirected();
            }
        } else if self.optimizable {
            self.execute_opt(max_iters);
        } else {
            self.execute_non_opt(max_iters);
        }
    }

    fn execute_opt(&mut self, max_iters: u32) {
        let env = self.graph.env().clone();

        // Initial scatter: block until the source messages have landed.
        self.x.wait_for_sources(&env);

        let until_convergence = max_iters == UNTIL_CONVERGENCE;
        let mut has_converged = false;
        let mut iter = 0u32;

        while if until_convergence {
            !has_converged
        } else {
            iter < max_iters
        } {
            debug!("rank {}: executing iteration {}", env.rank(), iter + 1);

            // Request this iteration's partial accumulators.
            for yseg in &mut self.y.own_segs {
                yseg.gather(&env);
            }

            self.process_messages(false, iter, &env);

            // Request the next iteration's messages.
            self.x.recv_regular(&env);

            has_converged = !self.produce_messages(false, false, iter, &env);
            if until_convergence {
                has_converged = self.has_converged_globally(has_converged, &env);
            }
            iter += 1;
        }

        // Final wait: drain the receives posted for the never-run iteration.
        self.drain_incoming(&env);

        // Sink pass: scatter every regular state once and run the sink CSCs.
        debug!("rank {}: executing sink pass", env.rank());
        self.x.recv_regular(&env);
        let program = &self.program;
        for (vseg, xseg) in self
            .v
            .own_segs
            .iter_mut()
            .zip(self.x.outgoing_regular.iter_mut())
        {
            for idx in 0..xseg.size() {
                xseg.push(idx, program.scatter(&vseg.array[idx]));
            }
            xseg.bcast(&env);
        }
        for yseg in &mut self.y.own_segs_sink {
            yseg.gather(&env);
        }
        self.process_messages(true, iter, &env);
        self.produce_messages(true, false, iter, &env);
        self.drain_incoming(&env);
        self.finish_convergence(&env);
    }

    fn execute_non_opt(&mut self, max_iters: u32) {
        let env = self.graph.env().clone();
        let directed = self.graph.is_directed();

        if directed {
            self.x.wait_for_sources(&env);
        }

        let until_convergence = max_iters == UNTIL_CONVERGENCE;
        let mut has_converged = false;
        let mut iter = 0u32;

        while if until_convergence {
            !has_converged
        } else {
            iter < max_iters
        } {
            debug!("rank {}: executing iteration {}", env.rank(), iter + 1);

            for yseg in &mut self.y.own_segs {
                yseg.gather(&env);
            }
            if directed {
                for yseg in &mut self.y.own_segs_sink {
                    yseg.gather(&env);
                }
            }

            self.process_messages(false, iter, &env);
            if directed {
                // Sinks re-process the same message segments in-loop.
                self.process_messages(true, iter, &env);
            }

            self.x.recv_regular(&env);

            let mut converged = !self.produce_messages(false, false, iter, &env);
            if directed {
                converged &= !self.produce_messages(true, false, iter, &env);
            }
            has_converged = converged;
            if until_convergence {
                has_converged = self.has_converged_globally(has_converged, &env);
            }
            iter += 1;
        }

        self.drain_incoming(&env);
        self.finish_convergence(&env);
    }

    fn execute_single(&mut self) {
        let env = self.graph.env().clone();
        self.x.wait_for_sources(&env);

        for yseg in &mut self.y.own_segs {
            yseg.gather(&env);
        }
        for yseg in &mut self.y.own_segs_sink {
            yseg.gather(&env);
        }

        self.process_messages(false, 0, &env);
        self.process_messages(true, 0, &env);

        self.produce_messages(false, true, 0, &env);
        self.produce_messages(true, true, 0, &env);

        self.drain_incoming(&env);
    }

    fn execute_single_undirected(&mut self) {
        let env = self.graph.env().clone();

        for yseg in &mut self.y.own_segs {
            yseg.gather(&env);
        }
        self.process_messages(false, 0, &env);
        self.produce_messages(false, true, 0, &env);
        self.drain_incoming(&env);
    }

    /// Process incoming message segments as they become ready.  There is
    /// always at least one ready segment (the local one) at iteration
    /// start.
    fn process_messages(&mut self, sink: bool, iter: u32, env: &Env) {
        loop {
            let ready = self.x.wait_for_some(env);
            if self.process_ready(&ready, sink, iter, env) {
                break;
            }
        }
    }

    /// Returns true iff all messages of the current round are consumed.
    fn process_ready(&mut self, ready: &[usize], sink: bool, iter: u32, env: &Env) -> bool {
        // Mirrors block the first SpMV that needs them.
        if P::GATHER_WITH_STATE {
            let mir = if sink {
                self.v.mir_sink.as_mut()
            } else {
                self.v.mir_regular.as_mut()
            };
            if let Some(mir) = mir {
                for ith in 0..mir.segs.len() {
                    mir.wait_for_ith(ith as u32, env);
                }
            }
        }

        for &jth in ready {
            self.x.take_jth(jth);
        }

        let matrix = self.graph.matrix();
        let program = &self.program;
        let x = &self.x;
        let v = &self.v;
        let ysegs = if sink {
            &mut self.y.local_segs_sink
        } else {
            &mut self.y.local_segs
        };

        // For each ready jth segment, fan out across the local rowgroups;
        // tasks write disjoint partial segments and take private message
        // cursors.  The tile and mirror references are collected up front
        // so the parallel tasks only see Sync data.
        for &jth in ready {
            let xseg = &x.incoming_regular[jth];
            let xseg_src = &x.incoming_source[jth];

            let cscs: Vec<&Csc<P::W>> = ysegs
                .iter()
                .map(|yseg| {
                    let tile = matrix.local_tile(yseg.ith, jth as u32);
                    if sink {
                        tile.sink_csc.as_ref()
                    } else {
                        tile.csc.as_ref()
                    }
                    .expect("tile not compiled")
                })
                .collect();
            let mirrors: Vec<Option<&RandomAccessArray<P::S>>> = ysegs
                .iter()
                .map(|yseg| {
                    if P::GATHER_WITH_STATE {
                        let mir = if sink { &v.mir_sink } else { &v.mir_regular };
                        mir.as_ref().map(|m| &m.segs[yseg.ith as usize].array)
                    } else {
                        None
                    }
                })
                .collect();

            ysegs
                .par_iter_mut()
                .zip(cscs.into_par_iter())
                .zip(mirrors.into_par_iter())
                .for_each(|((yseg, csc), vseg_arr)| {
                    if sink {
                        // Source messages -> sink vertices.
                        spmv(program, csc, xseg_src.array.reader(), yseg, vseg_arr, xseg.array.size());
                        // Regular messages -> sink vertices.
                        spmv(program, csc, xseg.array.reader(), yseg, vseg_arr, 0);
                    } else {
                        // Source messages -> regular vertices: every iteration
                        // for stationary programs, only the first otherwise.
                        if P::STATIONARY || iter == 0 {
                            spmv(program, csc, xseg_src.array.reader(), yseg, vseg_arr, xseg.array.size());
                        }
                        // Regular messages -> regular vertices.
                        spmv(program, csc, xseg.array.reader(), yseg, vseg_arr, 0);
                    }
                    yseg.ncombined += 1;
                });

            if x.no_more_segs() {
                for yseg in ysegs.iter_mut() {
                    if yseg.ready() {
                        yseg.send(env);
                    }
                }
            }
        }

        self.x.no_more_segs_then_clear()
    }

    /// Combine arriving partials into the final accumulators, then apply
    /// and scatter.  Returns true iff any vertex got activated.
    fn produce_messages(&mut self, sink: bool, single_iter: bool, iter: u32, env: &Env) -> bool {
        let mut any_activated = false;
        let nsegs = if sink {
            self.y.own_segs_sink.len()
        } else {
            self.y.own_segs.len()
        };

        for k in 0..nsegs {
            loop {
                let program = &self.program;
                let yseg = if sink {
                    &mut self.y.own_segs_sink[k]
                } else {
                    &mut self.y.own_segs[k]
                };
                if yseg.no_more_segs() {
                    break;
                }
                let ready = yseg.wait_for_some(env);
                let AccumFinalSegment {
                    partials, array, ..
                } = yseg;
                for i in ready {
                    let partial = &mut partials[i];
                    partial.rewind();
                    while let Some((idx, yval)) = partial.pop() {
                        program.combine(yval, &mut array[idx]);
                        array.activity_mut().touch(idx);
                    }
                    partial.rewind();
                }
            }
            any_activated |= self.apply_and_scatter(k, sink, single_iter, iter, env);
        }

        any_activated
    }

    /// Apply the final accumulated values to the vertex states and scatter
    /// new messages from activated vertices.  Sink activations never count
    /// towards convergence.
    fn apply_and_scatter(
        &mut self,
        k: usize,
        sink: bool,
        single_iter: bool,
        iter: u32,
        env: &Env,
    ) -> bool {
        let program = &self.program;
        let final_yseg = if sink {
            &mut self.y.own_segs_sink[k]
        } else {
            &mut self.y.own_segs[k]
        };
        let vseg = &mut self.v.own_segs[final_yseg.kth as usize];
        let xseg = &mut self.x.outgoing_regular[final_yseg.kth as usize];

        xseg.clear();
        final_yseg.array.rewind();

        let mut any_activated = false;

        if sink {
            let sink_offset = final_yseg.sink_offset;
            while let Some((idx, yval)) = final_yseg.array.pop() {
                let got_activated = if P::APPLY_WITH_ITER {
                    program.apply_with_iter(&yval, &mut vseg.array[sink_offset + idx], iter)
                } else {
                    program.apply(&yval, &mut vseg.array[sink_offset + idx])
                };
                if got_activated {
                    vseg.array.activity_mut().push(sink_offset + idx);
                }
            }
        } else {
            while let Some((idx, yval)) = final_yseg.array.pop() {
                let got_activated = if P::APPLY_WITH_ITER {
                    program.apply_with_iter(&yval, &mut vseg.array[idx], iter)
                } else {
                    program.apply(&yval, &mut vseg.array[idx])
                };
                any_activated |= got_activated;

                if got_activated || P::STATIONARY {
                    vseg.array.activity_mut().push(idx);
                    if !single_iter {
                        xseg.push(idx, program.scatter(&vseg.array[idx]));
                    }
                }
            }
            if !single_iter {
                xseg.bcast(env);
            }
        }

        any_activated
    }

    /// Drain any outstanding incoming-message receives, discarding them.
    fn drain_incoming(&mut self, env: &Env) {
        loop {
            let _ = self.x.wait_for_some(env);
            if self.x.no_more_segs_then_clear() {
                break;
            }
        }
    }

    /// Global convergence test.  The all-reduce is asynchronous: a rank
    /// only blocks on it when it has converged locally (otherwise it knows
    /// more work is coming anyway).
    fn has_converged_globally(&mut self, has_converged_locally: bool, env: &Env) -> bool {
        if let Some(req) = self.conv_req.take() {
            env.wait_allreduce_and(req);
        }
        let req = env.iallreduce_and(has_converged_locally);
        if has_converged_locally {
            env.wait_allreduce_and(req)
        } else {
            self.conv_req = Some(req);
            false
        }
    }

    fn finish_convergence(&mut self, env: &Env) {
        if let Some(req) = self.conv_req.take() {
            env.wait_allreduce_and(req);
        }
    }

    /// Fold `map` over the vertex states (active set or all), combine the
    /// per-rank results at the master, and broadcast the final value.
    pub fn reduce<V, FM, FR>(&self, map: FM, fold: FR, active_only: bool) -> V
    where
        V: Clone + Default + Serialize + DeserializeOwned,
        FM: Fn(u32, &P::S) -> V,
        FR: Fn(&mut V, V),
    {
        let env = self.graph.env();
        let hasher = self.graph.hasher();
        let nvertices = self.graph.nvertices();

        let mut r = V::default();
        for vseg in &self.v.own_segs {
            let each = |i: u32, r: &mut V| {
                let hidx = vseg.offset + vseg.original_from_internal[i as usize];
                let vid = hasher.unhash(hidx as i64) as u32;
                if vid < nvertices {
                    fold(r, map(vid, &vseg.array[i]));
                }
            };
            if active_only {
                let mut act = vseg.array.activity().clone();
                act.rewind();
                while let Some(i) = act.next() {
                    each(i, &mut r);
                }
            } else {
                for i in 0..vseg.size() {
                    each(i, &mut r);
                }
            }
        }

        let blob = bincode::serialize(&r).expect("unencodable reduction value");
        let gathered = env.gather_bytes(blob, 0);
        let final_blob = gathered.map(|blobs| {
            let mut acc = V::default();
            for b in blobs {
                fold(&mut acc, bincode::deserialize(&b).expect("undecodable value"));
            }
            bincode::serialize(&acc).expect("unencodable reduction value")
        });
        bincode::deserialize(&env.bcast_bytes(final_blob, 0)).expect("undecodable value")
    }

    /// Top-k states under `cmp`: local partial sort, gather at master,
    /// final partial sort, broadcast.
    pub fn topk<V, FM, FC>(&self, k: usize, map: FM, cmp: FC, active_only: bool) -> Vec<(u32, V)>
    where
        V: Clone + Default + Serialize + DeserializeOwned,
        FM: Fn(u32, &P::S) -> V,
        FC: Fn(&(u32, V), &(u32, V)) -> Ordering,
    {
        let batches = self.btopk(k, 1, |vid, s| vec![map(vid, s)], cmp, active_only);
        batches.into_iter().next().unwrap()
    }

    /// Batched top-k: rank `batch` values per vertex at once.
    pub fn btopk<V, FM, FC>(
        &self,
        k: usize,
        batch: usize,
        map: FM,
        cmp: FC,
        active_only: bool,
    ) -> Vec<Vec<(u32, V)>>
    where
        V: Clone + Default + Serialize + DeserializeOwned,
        FM: Fn(u32, &P::S) -> Vec<V>,
        FC: Fn(&(u32, V), &(u32, V)) -> Ordering,
    {
        let env = self.graph.env();
        let hasher = self.graph.hasher();
        let nvertices = self.graph.nvertices();

        let mut ivs: Vec<Vec<(u32, V)>> = vec![Vec::new(); batch];
        for vseg in &self.v.own_segs {
            let each = |i: u32, ivs: &mut Vec<Vec<(u32, V)>>| {
                let hidx = vseg.offset + vseg.original_from_internal[i as usize];
                let vid = hasher.unhash(hidx as i64) as u32;
                if vid < nvertices {
                    let vals = map(vid, &vseg.array[i]);
                    assert_eq!(vals.len(), batch);
                    for (b, val) in vals.into_iter().enumerate() {
                        ivs[b].push((vid, val));
                    }
                }
            };
            if active_only {
                let mut act = vseg.array.activity().clone();
                act.rewind();
                while let Some(i) = act.next() {
                    each(i, &mut ivs);
                }
            } else {
                for i in 0..vseg.size() {
                    each(i, &mut ivs);
                }
            }
        }

        for b in ivs.iter_mut() {
            b.sort_unstable_by(|p, q| cmp(p, q));
            b.truncate(k);
        }

        let blob = bincode::serialize(&ivs).expect("unencodable top-k batch");
        let gathered = env.gather_bytes(blob, 0);
        let final_blob = gathered.map(|blobs| {
            let mut merged: Vec<Vec<(u32, V)>> = vec![Vec::new(); batch];
            for bts in blobs {
                let part: Vec<Vec<(u32, V)>> =
                    bincode::deserialize(&bts).expect("undecodable top-k batch");
                for (b, mut vals) in part.into_iter().enumerate() {
                    merged[b].append(&mut vals);
                }
            }
            for b in merged.iter_mut() {
                b.sort_unstable_by(|p, q| cmp(p, q));
                b.truncate(k);
            }
            bincode::serialize(&merged).expect("unencodable top-k batch")
        });
        bincode::deserialize(&env.bcast_bytes(final_blob, 0)).expect("undecodable top-k batch")
    }

    /// Log the states of the first `nvertices` vertices.
    pub fn display(&self, nvertices: u32) {
        let n = nvertices.min(self.graph.nvertices());
        let hasher = self.graph.hasher();
        for vseg in &self.v.own_segs {
            for i in 0..vseg.size() {
                let hidx = vseg.offset + vseg.original_from_internal[i as usize];
                let vid = hasher.unhash(hidx as i64) as u32;
                if vid < n {
                    info!("{}: {:?}", vid, vseg.array[i]);
                }
            }
        }
    }
}

/// Tile-local SpMV: for each active message, walk the CSC column at
/// `sink_offset + index` and combine the gathered edge contributions into
/// the partial accumulator.
fn spmv<P: VertexProgram>(
    program: &P,
    csc: &Csc<P::W>,
    mut reader: StreamReader<'_, P::M>,
    yseg: &mut AccumPartialSegment<P::A>,
    vseg: Option<&RandomAccessArray<P::S>>,
    sink_offset: u32,
) {
    while let Some((i, msg)) = reader.next() {
        let col = (sink_offset + i) as usize;
        let (a, b) = (csc.colptrs[col] as usize, csc.colptrs[col + 1] as usize);
        for entry in &csc.entries[a..b] {
            let edge = Edge {
                src: csc.colidxs[col],
                dst: entry.idx,
                weight: &entry.weight,
            };
            let gathered = match vseg {
                Some(states) => {
                    program.gather_with_state(edge, msg, &states[entry.global_idx])
                }
                None => program.gather(edge, msg),
            };
            program.combine(gathered, &mut yseg.array[entry.global_idx]);
            yseg.array.activity_mut().touch(entry.global_idx);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::matrix::graph::Partitioning;
    use crate::value::{Empty, Value};
    use crate::Hashing;
    use courier::Runtime;
    use serde::{Deserialize, Serialize};
    use std::io::Write;

    #[derive(Copy, Clone, Debug, Default, Serialize, Deserialize)]
    struct CountState {
        indegree: u32,
    }

    impl Value for CountState {}

    /// A one-shot in-degree count, used to drive the engine through both
    /// placement strategies.
    #[derive(Debug, Default)]
    struct CountProgram;

    impl VertexProgram for CountProgram {
        type W = Empty;
        type M = Empty;
        type A = u32;
        type S = CountState;

        const STATIONARY: bool = true;

        fn scatter(&self, _state: &CountState) -> Empty {
            Empty
        }

        fn gather(&self, _edge: Edge<'_, Empty>, _msg: &Empty) -> u32 {
            1
        }

        fn combine(&self, y1: u32, y2: &mut u32) {
            *y2 += y1;
        }

        fn apply(&self, y: &u32, state: &mut CountState) -> bool {
            state.indegree = *y;
            true
        }
    }

    fn write_unweighted(name: &str, edges: &[(u32, u32)]) -> std::path::PathBuf {
        let path = std::env::temp_dir().join(name);
        let mut f = std::fs::File::create(&path).unwrap();
        for &(r, c) in edges {
            f.write_all(&r.to_le_bytes()).unwrap();
            f.write_all(&c.to_le_bytes()).unwrap();
        }
        path
    }

    /// The 2D and 1D-column placements share one schedule and must agree.
    #[test]
    fn one_dim_col_matches_two_dim() {
        let edges: &[(u32, u32)] = &[(0, 1), (0, 2), (1, 2), (3, 0), (3, 2)];
        let path = write_unweighted("gasmat_exec_partitioning_fixture.bin", edges);
        let p = path.clone();
        Runtime::launch(2, move |env| {
            let mut sums = Vec::new();
            for partitioning in &[Partitioning::TwoDim, Partitioning::OneDimCol] {
                let mut graph: crate::Graph<Empty> = crate::Graph::new(env.clone());
                graph.set_partitioning(*partitioning);
                graph
                    .load_directed(true, p.to_str().unwrap(), 4, false, false, Hashing::None)
                    .unwrap();
                let mut vp = Executor::new(&graph, CountProgram);
                vp.execute(1);
                // in-degrees [1, 1, 3, 0]
                let sum: u64 =
                    vp.reduce(|_vid, s: &CountState| s.indegree as u64, |a, b| *a += b, false);
                let squares: u64 = vp.reduce(
                    |_vid, s: &CountState| (s.indegree * s.indegree) as u64,
                    |a, b| *a += b,
                    false,
                );
                assert_eq!(sum, 5);
                assert_eq!(squares, 11);
                sums.push(sum);
            }
            assert_eq!(sums[0], sums[1]);
        });
        std::fs::remove_file(&path).ok();
    }
}
