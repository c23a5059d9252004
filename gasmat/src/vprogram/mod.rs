//! The vertex-program interface and its executor.
///
/// Copyright (c) 2020, Institute for Defense Analyses
/// 4850 Mark Center Drive, Alexandria, VA 22311-1882; 703-845-2500
///
/// All rights reserved.
///
/// This file is part of GasMat.  For license information see the
/// LICENSE file in the top level dirctory of the distribution.
mod executor;

pub use executor::Executor;

use crate::matrix::graph::LoadWeight;
use crate::value::Value;

/// One in-edge as seen by `gather`: `src -> dst` with its weight.
#[derive(Debug)]
pub struct Edge<'a, W> {
    /// Source vertex id (hashed space).
    pub src: u32,
    /// Destination vertex id (hashed space).
    pub dst: u32,
    /// Edge weight.
    pub weight: &'a W,
}

/// A Gather-Apply-Scatter vertex program.
///
/// The capability constants select the execution strategy; they replace any
/// runtime probing.  `GATHER_WITH_STATE` enables state mirroring and routes
/// gather calls to `gather_with_state`; `APPLY_WITH_ITER` routes apply
/// calls to `apply_with_iter` and, like `GATHER_WITH_STATE`, disables the
/// sink-deferral optimization.  `combine` must be associative and
/// commutative: partials arrive in no particular order.
pub trait VertexProgram: Send + Sync + 'static {
    /// Edge weight type.
    type W: LoadWeight;
    /// Message type.
    type M: Value;
    /// Accumulator type.
    type A: Value;
    /// Vertex state type.
    type S: Value;

    /// All vertices stay active every iteration.
    const STATIONARY: bool = false;
    /// `gather` reads the destination vertex state.
    const GATHER_WITH_STATE: bool = false;
    /// `apply` reads the iteration counter.
    const APPLY_WITH_ITER: bool = false;
    /// Allow deferring sink vertices to the terminal pass.  Cleared
    /// automatically for undirected graphs and for programs that read
    /// state in gather or the iteration in apply.
    const OPTIMIZABLE: bool = true;

    /// Initialize a vertex state.  Return true to activate the vertex.
    /// Stationary programs activate everything by default.
    fn init(&self, _vid: u32, _state: &mut Self::S) -> bool {
        Self::STATIONARY
    }

    /// Produce the message an active vertex scatters along its out-edges.
    fn scatter(&self, state: &Self::S) -> Self::M;

    /// Gather one in-edge's contribution.
    fn gather(&self, _edge: Edge<'_, Self::W>, _msg: &Self::M) -> Self::A {
        Self::A::default()
    }

    /// Gather with read access to the destination's (mirrored) state.
    /// Only called when `GATHER_WITH_STATE` is set.
    fn gather_with_state(
        &self,
        edge: Edge<'_, Self::W>,
        msg: &Self::M,
        _state: &Self::S,
    ) -> Self::A {
        self.gather(edge, msg)
    }

    /// Fold a gathered value into an accumulator.  Must be associative and
    /// commutative.
    fn combine(&self, y1: Self::A, y2: &mut Self::A);

    /// Apply the final accumulator to a vertex state.  Return true to
    /// activate the vertex.
    fn apply(&self, _y: &Self::A, _state: &mut Self::S) -> bool {
        false
    }

    /// Apply with the iteration counter.  Only called when
    /// `APPLY_WITH_ITER` is set.
    fn apply_with_iter(&self, y: &Self::A, state: &mut Self::S, _iter: u32) -> bool {
        self.apply(y, state)
    }
}

/// Initialization of one program's states from another program's states on
/// the same graph reversed (positionally: regular regions align, sink and
/// source regions swap).
pub trait InitFrom<S2: Value>: VertexProgram {
    /// Initialize a state from the other program's state of the same
    /// vertex.  Return true to activate.
    fn init_from(&self, vid: u32, other: &S2, state: &mut Self::S) -> bool;
}

/// Execute until global convergence.
pub const UNTIL_CONVERGENCE: u32 = 0;
