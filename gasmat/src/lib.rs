#![warn(
    missing_docs,
    future_incompatible,
    missing_debug_implementations,
    rust_2018_idioms
)]

//! Distributed, iterative graph processing on a 2D-partitioned sparse matrix.
//!
//! The engine executes vertex programs in the Gather-Apply-Scatter model
//! across a fixed set of ranks provided by the `courier` substrate.  The
//! graph is ingested as edge triples into a grid of tiles, shuffled to owner
//! ranks, preprocessed to classify every vertex as regular, sink, source or
//! isolated, and finally compiled into per-tile CSC sub-matrices split
//! between regular and sink rows.  Iterations overlap tile-local SpMV with
//! message and accumulator traffic until the job converges globally.
///
/// Copyright (c) 2020, Institute for Defense Analyses
/// 4850 Mark Center Drive, Alexandria, VA 22311-1882; 703-845-2500
///
/// All rights reserved.
///
/// This file is part of GasMat.  For license information see the
/// LICENSE file in the top level dirctory of the distribution.
pub mod error;
pub mod locator;
pub mod matrix;
pub mod structures;
pub mod value;
pub mod vector;
pub mod vprogram;

pub use crate::error::Error;
pub use crate::matrix::graph::{Graph, Hashing, LoadWeight, Partitioning};
pub use crate::value::{Empty, IntWrapper, Value};
pub use crate::vprogram::{Edge, Executor, InitFrom, VertexProgram, UNTIL_CONVERGENCE};
