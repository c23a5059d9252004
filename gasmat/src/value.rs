//! Value types carried by messages, accumulators and vertex states.
///
/// Copyright (c) 2020, Institute for Defense Analyses
/// 4850 Mark Center Drive, Alexandria, VA 22311-1882; 703-845-2500
///
/// All rights reserved.
///
/// This file is part of GasMat.  For license information see the
/// LICENSE file in the top level dirctory of the distribution.
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

/// A value that can live in an activity-tagged array and travel between
/// ranks.
///
/// Fixed-width values (the default) ship as a packed byte stream of
/// `encoded_width()` bytes each.  Dynamically-sized values (e.g. neighbor
/// lists) set `DYNAMIC` and ship with per-value size prefixes instead.
pub trait Value:
    Clone + Default + std::fmt::Debug + Serialize + DeserializeOwned + Send + Sync + 'static
{
    /// True for values whose encoding varies per instance.
    const DYNAMIC: bool = false;

    /// Encoded width in bytes of a fixed-width value.  Meaningless when
    /// `DYNAMIC` is set.
    fn encoded_width() -> usize {
        bincode::serialized_size(&Self::default()).expect("unencodable value type") as usize
    }
}

macro_rules! plain_value {
    ($($ty:ty),*) => {
        $(impl Value for $ty {})*
    };
}

plain_value!(u8, u16, u32, u64, usize, i8, i16, i32, i64, isize, f32, f64, bool);

impl Value for () {}

impl<T: Value> Value for Vec<T> {
    const DYNAMIC: bool = true;
}

/// The empty weight/message type.  Encodes to zero bytes.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Empty;

impl Value for Empty {}

/// An integer with a custom default, for states whose "unset" value is not
/// zero (e.g. an infinite distance).
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct IntWrapper<const DEFAULT: u32> {
    /// The wrapped value.
    pub value: u32,
}

impl<const DEFAULT: u32> Default for IntWrapper<DEFAULT> {
    fn default() -> Self {
        IntWrapper { value: DEFAULT }
    }
}

impl<const DEFAULT: u32> From<u32> for IntWrapper<DEFAULT> {
    fn from(value: u32) -> Self {
        IntWrapper { value }
    }
}

impl<const DEFAULT: u32> Value for IntWrapper<DEFAULT> {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn widths() {
        assert_eq!(Empty::encoded_width(), 0);
        assert_eq!(u32::encoded_width(), 4);
        assert_eq!(f64::encoded_width(), 8);
        assert_eq!(IntWrapper::<7>::encoded_width(), 4);
    }

    #[test]
    fn int_wrapper_default() {
        let d: IntWrapper<1000> = Default::default();
        assert_eq!(d.value, 1000);
        assert!(IntWrapper::<1000>::from(3) < d);
    }
}
