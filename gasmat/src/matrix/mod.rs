//! The layered 2D matrix: ingress grid, rank annotation, preprocessing,
//! and the final CSC form consumed by the engine.
///
/// Copyright (c) 2020, Institute for Defense Analyses
/// 4850 Mark Center Drive, Alexandria, VA 22311-1882; 703-845-2500
///
/// All rights reserved.
///
/// This file is part of GasMat.  For license information see the
/// LICENSE file in the top level dirctory of the distribution.
pub mod annotated;
pub mod csc2d;
pub mod graph;
pub mod hashers;
pub mod matrix2d;
pub mod processed;
pub mod tile;

/// Which partitioning strategy to use for tile placement.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Partitioning {
    /// Column-wise 1D: one rank per tile-column.
    OneDimCol,
    /// Staggered 2D (default).
    TwoDim,
}

/// Deterministic per-segment tags (shared by preprocessing and execution).
pub mod tags {
    /// Rowgroup traffic for segment `uth`: regular (`+0`) or sink (`+1`).
    pub fn rowgrp(uth: u32, sink: bool) -> u32 {
        6 * uth + sink as u32
    }

    /// Colgroup traffic for segment `uth`: regular (`+4`) or source (`+5`).
    pub fn colgrp(uth: u32, source: bool) -> u32 {
        6 * uth + 4 + source as u32
    }

    /// Mirror traffic piggybacks on the rowgroup tags, offset by 2.
    pub fn mirror(uth: u32, sink: bool) -> u32 {
        rowgrp(uth, sink) + 2
    }

    /// Preprocessing's second rowgroup stream (globally-sink bit vectors)
    /// lives above every per-segment tag.
    pub fn rowgrp_global_sink(nrowgrps: u32, uth: u32) -> u32 {
        6 * nrowgrps + 6 * uth
    }

    /// All-to-all triple shuffle: size counts.
    pub const SHUFFLE_SIZE: u32 = 1 << 29;
    /// All-to-all triple shuffle: triple payloads.
    pub const SHUFFLE_DATA: u32 = (1 << 29) + 1;
}
