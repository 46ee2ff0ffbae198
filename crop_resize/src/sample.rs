//! Numeric sample types accepted by the kernels.
//!
//! All interpolation arithmetic runs in `f32`; these traits describe how a source
//! sample is widened into that precision and how gradients are written back.

use half::{bf16, f16};
use num_traits::{AsPrimitive, Float};

/// A source sample readable as `f32`.
pub trait Sample: AsPrimitive<f32> + Send + Sync {
    /// Whether widening into `f32` is a real conversion. Feeds the cost model.
    const NEEDS_CAST: bool;

    #[inline]
    fn to_f32(self) -> f32 {
        self.as_()
    }
}

macro_rules! impl_sample {
    ($($t:ty => $cast:expr),* $(,)?) => {
        $(impl Sample for $t {
            const NEEDS_CAST: bool = $cast;
        })*
    };
}

impl_sample! {
    u8 => true,
    u16 => true,
    u32 => true,
    u64 => true,
    i8 => true,
    i16 => true,
    i32 => true,
    i64 => true,
    f16 => true,
    bf16 => true,
    f32 => false,
    f64 => true,
}

/// A floating-point sample that can accumulate image gradients.
pub trait GradSample: Sample + Float {
    fn from_f32(value: f32) -> Self;
}

impl GradSample for f16 {
    #[inline]
    fn from_f32(value: f32) -> Self {
        f16::from_f32(value)
    }
}

impl GradSample for f32 {
    #[inline]
    fn from_f32(value: f32) -> Self {
        value
    }
}

impl GradSample for f64 {
    #[inline]
    fn from_f32(value: f32) -> Self {
        value as f64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn integer_samples_widen_exactly() {
        assert_eq!(200u8.to_f32(), 200.0);
        assert_eq!((-7i16).to_f32(), -7.0);
        assert_eq!(65535u16.to_f32(), 65535.0);
    }

    #[test]
    fn half_samples_widen_exactly() {
        assert_eq!(Sample::to_f32(f16::from_f32(0.375)), 0.375);
        assert_eq!(Sample::to_f32(bf16::from_f32(-96.0)), -96.0);
        assert!(f16::NEEDS_CAST);
        assert!(bf16::NEEDS_CAST);
    }

    #[test]
    fn f16_gradients_round_to_nearest() {
        assert_eq!(<f16 as GradSample>::from_f32(0.25), f16::from_f32(0.25));
        // 1 + 2^-12 is below f16 resolution at 1.0
        assert_eq!(<f16 as GradSample>::from_f32(1.0 + 1.0 / 4096.0), f16::ONE);
    }

    #[test]
    fn only_f32_is_cast_free() {
        assert!(!f32::NEEDS_CAST);
        assert!(f64::NEEDS_CAST);
        assert!(u8::NEEDS_CAST);
    }

    #[test]
    fn grad_sample_accumulates_in_target_precision() {
        let mut acc = 0.0f64;
        acc = acc + f64::from_f32(0.25);
        acc = acc + f64::from_f32(0.5);
        assert_eq!(acc, 0.75);
        assert_eq!(f32::from_f32(1.5), 1.5);
    }
}
