//! Reversible vertex-ID hashers for 2D load balance.
///
/// Copyright (c) 2020, Institute for Defense Analyses
/// 4850 Mark Center Drive, Alexandria, VA 22311-1882; 703-845-2500
///
/// All rights reserved.
///
/// This file is part of GasMat.  For license information see the
/// LICENSE file in the top level dirctory of the distribution.
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// A bijection on vertex IDs: `unhash(hash(v)) == v`.
///
/// Hashing spreads ID locality across ranks for even load while remaining
/// invertible so the user sees original IDs in outputs.
pub trait ReversibleHasher: Send + Sync + std::fmt::Debug {
    /// Forward map.
    fn hash(&self, v: i64) -> i64;
    /// Inverse map.
    fn unhash(&self, v: i64) -> i64;
}

/// Identity map.
#[derive(Debug, Default)]
pub struct NullHasher;

impl ReversibleHasher for NullHasher {
    fn hash(&self, v: i64) -> i64 {
        v
    }
    fn unhash(&self, v: i64) -> i64 {
        v
    }
}

/// Bucketed striding, adapted from GraphPad's vertexToNative().
/// IDs at or beyond `max_range` pass through unchanged.
#[derive(Debug)]
pub struct SimpleBucketHasher {
    nparts: i64,
    height: i64,
    max_range: i64,
}

impl SimpleBucketHasher {
    const MULTIPLIER: i64 = 128; // for fine-granular load balance

    /// A hasher over `[0, max_domain)` spreading across `nbuckets` buckets.
    pub fn new(max_domain: i64, nbuckets: i64) -> Self {
        let nparts = nbuckets * Self::MULTIPLIER;
        let height = max_domain / nparts;
        SimpleBucketHasher {
            nparts,
            height,
            max_range: height * nparts,
        }
    }
}

impl ReversibleHasher for SimpleBucketHasher {
    fn hash(&self, v: i64) -> i64 {
        if v >= self.max_range {
            return v;
        }
        let col = v % self.nparts;
        let row = v / self.nparts;
        row + col * self.height
    }

    fn unhash(&self, v: i64) -> i64 {
        if v >= self.max_range {
            return v;
        }
        let col = v / self.height;
        let row = v % self.height;
        col + row * self.nparts
    }
}

/// Modular multiplication by an odd `h1` coprime with the domain, inverted
/// by its multiplicative inverse.  More random distribution; useful when
/// skew is extremely high.
#[derive(Debug)]
pub struct ModuloArithmeticHasher {
    max_range: i64,
    h1: i64,
    h2: i64, // h1^-1 (mod max_range)
}

impl ModuloArithmeticHasher {
    /// A hasher over `[0, max_domain)`.
    pub fn new(max_domain: i64) -> Self {
        let mut rng = StdRng::seed_from_u64(12345);
        let mut h1 = 0;
        let mut h2 = 0;
        let mut g = 0;
        while g != 1 {
            // Find an odd h1 s.t. gcd(max_domain, h1) == 1.
            h1 = 0;
            while h1 % 2 == 0 {
                h1 = rng.gen_range(0..max_domain);
            }
            g = Self::gcd(max_domain, h1, &mut h2);
        }
        ModuloArithmeticHasher {
            max_range: max_domain,
            h1,
            h2: h2.rem_euclid(max_domain),
        }
    }

    fn gcd(mut a: i64, mut b: i64, bi: &mut i64) -> i64 {
        if b > a {
            std::mem::swap(&mut a, &mut b);
        }
        let (mut x, mut y) = (0i64, 1i64);
        let (mut lastx, mut lasty) = (1i64, 0i64);
        while b != 0 {
            let q = a / b;
            let r = a % b;
            a = b;
            b = r;
            let tx = x;
            x = lastx - q * x;
            lastx = tx;
            let ty = y;
            y = lasty - q * y;
            lasty = ty;
        }
        *bi = lasty;
        a
    }
}

impl ReversibleHasher for ModuloArithmeticHasher {
    fn hash(&self, v: i64) -> i64 {
        v * self.h1 % self.max_range
    }

    fn unhash(&self, v: i64) -> i64 {
        (v as i128 * self.h2 as i128).rem_euclid(self.max_range as i128) as i64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn roundtrip(h: &dyn ReversibleHasher, n: i64) {
        let mut seen = vec![false; n as usize];
        for v in 0..n {
            let hv = h.hash(v);
            assert!(hv >= 0 && hv < n, "hash({}) = {} out of range", v, hv);
            assert_eq!(h.unhash(hv), v);
            assert!(!seen[hv as usize], "hash not injective at {}", v);
            seen[hv as usize] = true;
        }
    }

    #[test]
    fn null_roundtrip() {
        roundtrip(&NullHasher, 1000);
    }

    #[test]
    fn bucket_roundtrip() {
        for n in &[4i64, 100, 1000, 12345] {
            roundtrip(&SimpleBucketHasher::new(*n, 4), *n);
        }
    }

    #[test]
    fn bucket_small_domain_passthrough() {
        // Domain smaller than nparts: height is 0 and every ID passes through.
        let h = SimpleBucketHasher::new(5, 1);
        for v in 0..5 {
            assert_eq!(h.hash(v), v);
        }
    }

    #[test]
    fn modulo_roundtrip() {
        for n in &[7i64, 100, 1024, 99991] {
            roundtrip(&ModuloArithmeticHasher::new(*n), *n);
        }
    }
}
