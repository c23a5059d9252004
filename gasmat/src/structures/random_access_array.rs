//! Activity-tagged sparse vector with values at their logical slots.
///
/// Copyright (c) 2020, Institute for Defense Analyses
/// 4850 Mark Center Drive, Alexandria, VA 22311-1882; 703-845-2500
///
/// All rights reserved.
///
/// This file is part of GasMat.  For license information see the
/// LICENSE file in the top level dirctory of the distribution.
use crate::structures::{read_u32, BitVector};
use crate::value::Value;

/// Sparse vector of size `n` with random access: `push` sets the activity
/// bit and the slot, `pop` drains in bit order and re-initializes slots as
/// it goes.  Used for accumulators and vertex states.
#[derive(Clone, Debug)]
pub struct RandomAccessArray<V: Value> {
    activity: BitVector,
    vals: Vec<V>,
}

impl<V: Value> RandomAccessArray<V> {
    /// A default-initialized array of size `n`.
    pub fn new(n: u32) -> Self {
        RandomAccessArray {
            activity: BitVector::new(n),
            vals: vec![V::default(); n as usize + 1],
        }
    }

    /// Key universe size.
    pub fn size(&self) -> u32 {
        self.activity.size()
    }

    /// Number of active entries.
    pub fn count(&self) -> u32 {
        self.activity.count()
    }

    /// The activity set.
    pub fn activity(&self) -> &BitVector {
        &self.activity
    }

    /// Mutable access to the activity set.
    pub fn activity_mut(&mut self) -> &mut BitVector {
        &mut self.activity
    }

    /// Shrink the logical size without reallocating.  Requires empty.
    pub fn temporarily_resize(&mut self, n: u32) {
        self.rewind();
        self.activity.temporarily_resize(n);
    }

    /// Overwrite every slot.  Does not touch the activity set.
    pub fn fill(&mut self, val: &V) {
        let n = self.size() as usize;
        for slot in &mut self.vals[..n] {
            *slot = val.clone();
        }
    }

    /// Drain all active entries, re-initializing their slots.
    pub fn clear(&mut self) {
        self.rewind();
        while self.pop().is_some() {}
        self.rewind();
    }

    /// Reset the streaming cursor.
    pub fn rewind(&mut self) {
        self.activity.rewind();
    }

    /// Activate `idx` and set its slot.
    pub fn push(&mut self, idx: u32, val: V) {
        self.activity.push(idx);
        self.vals[idx as usize] = val;
    }

    /// Destructive streaming read; zeroes the slot.
    pub fn pop(&mut self) -> Option<(u32, V)> {
        let idx = self.activity.pop()?;
        let val = std::mem::take(&mut self.vals[idx as usize]);
        Some((idx, val))
    }

    /// Non-destructive streaming read.
    pub fn next(&mut self) -> Option<(u32, &V)> {
        let idx = self.activity.next()?;
        Some((idx, &self.vals[idx as usize]))
    }

    /// Serialize: activity blob, then values of the active slots in bit
    /// order (packed for fixed-width values, size-prefixed for dynamic).
    pub fn serialize_into(&mut self, destructive: bool) -> Vec<u8> {
        let mut buf = Vec::new();
        self.activity.serialize_into(&mut buf, false);
        let count = self.count() as usize;
        let mut streams: Option<Vec<Vec<u8>>> = if V::DYNAMIC {
            Some(Vec::with_capacity(count))
        } else {
            None
        };
        self.rewind();
        for _ in 0..count {
            let enc = if destructive {
                let (_idx, val) = self.pop().expect("activity count mismatch");
                bincode::serialize(&val)
            } else {
                let idx = self.activity.next().expect("activity count mismatch");
                bincode::serialize(&self.vals[idx as usize])
            }
            .expect("unencodable value");
            match &mut streams {
                Some(s) => s.push(enc),
                None => buf.extend_from_slice(&enc),
            }
        }
        self.rewind();
        if let Some(streams) = streams {
            for s in &streams {
                buf.extend_from_slice(&(s.len() as u32).to_le_bytes());
            }
            for s in &streams {
                buf.extend_from_slice(s);
            }
        }
        buf
    }

    /// Deserialize either form produced by a same-size array.
    pub fn deserialize_from(&mut self, blob: &[u8]) {
        let mut off = self.activity.deserialize_from(blob);
        let count = self.count() as usize;
        self.rewind();
        if V::DYNAMIC {
            let sizes_off = off;
            off += 4 * count;
            for i in 0..count {
                let idx = self.activity.next().expect("activity count mismatch");
                let len = read_u32(blob, sizes_off + 4 * i) as usize;
                self.vals[idx as usize] =
                    bincode::deserialize(&blob[off..off + len]).expect("undecodable value");
                off += len;
            }
        } else {
            let w = V::encoded_width();
            for _ in 0..count {
                let idx = self.activity.next().expect("activity count mismatch");
                self.vals[idx as usize] =
                    bincode::deserialize(&blob[off..off + w]).expect("undecodable value");
                off += w;
            }
        }
        self.rewind();
    }
}

impl<V: Value> std::ops::Index<u32> for RandomAccessArray<V> {
    type Output = V;
    fn index(&self, idx: u32) -> &V {
        &self.vals[idx as usize]
    }
}

impl<V: Value> std::ops::IndexMut<u32> for RandomAccessArray<V> {
    fn index_mut(&mut self, idx: u32) -> &mut V {
        &mut self.vals[idx as usize]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn slots_and_draining() {
        let mut ra: RandomAccessArray<u32> = RandomAccessArray::new(40);
        ra.push(7, 70);
        ra.push(33, 330);
        assert_eq!(ra[7], 70);
        assert_eq!(ra[0], 0);
        assert_eq!(ra.pop(), Some((7, 70)));
        assert_eq!(ra[7], 0); // slot re-initialized
        assert_eq!(ra.pop(), Some((33, 330)));
        assert_eq!(ra.pop(), None);
    }

    #[test]
    fn roundtrip_fixed() {
        let mut ra: RandomAccessArray<f64> = RandomAccessArray::new(16);
        ra.push(1, 0.5);
        ra.push(15, -2.0);
        let blob = ra.serialize_into(false);
        assert_eq!(
            blob.len(),
            ra.activity().blob_nbytes(2) + 2 * f64::encoded_width()
        );
        let mut out: RandomAccessArray<f64> = RandomAccessArray::new(16);
        out.deserialize_from(&blob);
        assert_eq!(out[1], 0.5);
        assert_eq!(out[15], -2.0);
        assert_eq!(out.count(), 2);
    }

    #[test]
    fn roundtrip_dynamic_destructive() {
        let mut ra: RandomAccessArray<Vec<u8>> = RandomAccessArray::new(8);
        ra.push(2, vec![9, 9]);
        ra.push(5, vec![1]);
        let blob = ra.serialize_into(true);
        assert_eq!(ra.count(), 0);
        assert!(ra[2].is_empty()); // drained
        let mut out: RandomAccessArray<Vec<u8>> = RandomAccessArray::new(8);
        out.deserialize_from(&blob);
        assert_eq!(out[2], vec![9, 9]);
        assert_eq!(out[5], vec![1]);
    }
}
