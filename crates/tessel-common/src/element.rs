use core::fmt::{Debug, Display};
use core::ops::{Add, AddAssign, Mul, Sub};

use half::{bf16, f16};
use num_traits::{Bounded, NumCast, One, ToPrimitive, Zero};

/// Element type that can be stored in a tensor buffer and take part in a contraction.
///
/// Every element fits in a 64-bit word so that global buffers can update it atomically.
pub trait Numeric:
    bytemuck::Pod
    + Default
    + Debug
    + Display
    + PartialEq
    + PartialOrd
    + Send
    + Sync
    + Zero
    + One
    + Bounded
    + NumCast
    + ToPrimitive
    + Add<Output = Self>
    + Sub<Output = Self>
    + Mul<Output = Self>
    + AddAssign
    + 'static
{
    /// Short name used when logging launches.
    const NAME: &'static str;
    /// Whether the type is a floating point type.
    const IS_FLOAT: bool;

    /// Converts any other element into this type.
    ///
    /// Floats are truncated toward zero when cast to integers. Values out of range saturate to
    /// the closest bound and `NaN` becomes zero.
    fn cast_from<N: Numeric>(value: N) -> Self {
        <Self as NumCast>::from(value).unwrap_or_else(|| {
            let value = value.to_f64_lossy();
            if value.is_nan() {
                Self::zero()
            } else if value > 0.0 {
                Self::max_value()
            } else {
                Self::min_value()
            }
        })
    }

    /// Converts the element into `f64`, used by element-wise epilogues and comparisons.
    fn to_f64_lossy(self) -> f64 {
        self.to_f64().unwrap_or(0.0)
    }

    /// Encodes the element bits into a little-endian 64-bit word.
    fn to_word(self) -> u64 {
        let mut bytes = [0u8; 8];
        bytes[..size_of::<Self>()].copy_from_slice(bytemuck::bytes_of(&self));
        u64::from_le_bytes(bytes)
    }

    /// Decodes an element previously encoded with [to_word](Numeric::to_word).
    fn from_word(word: u64) -> Self {
        let bytes = word.to_le_bytes();
        bytemuck::pod_read_unaligned(&bytes[..size_of::<Self>()])
    }
}

macro_rules! impl_numeric {
    ($ty:ty, $name:literal, $float:literal) => {
        impl Numeric for $ty {
            const NAME: &'static str = $name;
            const IS_FLOAT: bool = $float;
        }
    };
}

impl_numeric!(f16, "f16", true);
impl_numeric!(bf16, "bf16", true);
impl_numeric!(f32, "f32", true);
impl_numeric!(f64, "f64", true);
impl_numeric!(i8, "i8", false);
impl_numeric!(i32, "i32", false);
impl_numeric!(i64, "i64", false);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn word_encoding_preserves_bits() {
        assert_eq!(f32::from_word((-1.5f32).to_word()), -1.5);
        assert_eq!(f16::from_word(f16::from_f32(0.25).to_word()), f16::from_f32(0.25));
        assert_eq!(i8::from_word((-3i8).to_word()), -3);
        assert_eq!(f64::from_word(1e300f64.to_word()), 1e300);
    }

    #[test]
    fn cast_goes_through_num_traits() {
        assert_eq!(f32::cast_from(f16::from_f32(2.5)), 2.5);
        assert_eq!(i32::cast_from(7.9f32), 7);
    }

    #[test]
    fn out_of_range_casts_saturate() {
        assert_eq!(i8::cast_from(1000i32), i8::MAX);
        assert_eq!(i8::cast_from(-1000.5f32), i8::MIN);
        assert_eq!(i32::cast_from(1e12f64), i32::MAX);
        assert_eq!(i32::cast_from(f32::NAN), 0);
        assert_eq!(i8::cast_from(-7.9f64), -7);
    }
}
