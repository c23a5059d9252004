//! Sparse supporting structures: bit vectors and activity-tagged arrays.
///
/// Copyright (c) 2020, Institute for Defense Analyses
/// 4850 Mark Center Drive, Alexandria, VA 22311-1882; 703-845-2500
///
/// All rights reserved.
///
/// This file is part of GasMat.  For license information see the
/// LICENSE file in the top level dirctory of the distribution.
pub mod bitvector;
pub mod random_access_array;
pub mod streaming_array;

pub use bitvector::BitVector;
pub use random_access_array::RandomAccessArray;
pub use streaming_array::{StreamReader, StreamingArray};

pub(crate) fn read_u32(blob: &[u8], off: usize) -> u32 {
    let mut b = [0u8; 4];
    b.copy_from_slice(&blob[off..off + 4]);
    u32::from_le_bytes(b)
}
