//! Per-rank shards of global state: message, accumulator and vertex
//! vectors.
///
/// Copyright (c) 2020, Institute for Defense Analyses
/// 4850 Mark Center Drive, Alexandria, VA 22311-1882; 703-845-2500
///
/// All rights reserved.
///
/// This file is part of GasMat.  For license information see the
/// LICENSE file in the top level dirctory of the distribution.
pub mod accum;
pub mod msg;
pub mod vertex;

pub use accum::{AccumFinalSegment, AccumPartialSegment, AccumVector};
pub use msg::{MsgIncomingSegment, MsgOutgoingSegment, MsgVector};
pub use vertex::{MirrorSegments, VertexMasterSegment, VertexMirrorSegment, VertexVector};
