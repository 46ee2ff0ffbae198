pub trait FloatExt: Copy {
    fn approximately_eq(self, other: Self) -> bool;

    /// Mixed absolute/relative comparison: `|a - b| <= tolerance * max(1, |a|, |b|)`.
    fn approximately_eq_rel(self, other: Self, tolerance: Self) -> bool;
}

impl FloatExt for f32 {
    fn approximately_eq(self, other: Self) -> bool {
        (self - other).abs() < crate::EPSILON as f32
    }

    fn approximately_eq_rel(self, other: Self, tolerance: Self) -> bool {
        let scale = 1.0_f32.max(self.abs()).max(other.abs());
        (self - other).abs() <= tolerance * scale
    }
}

impl FloatExt for f64 {
    fn approximately_eq(self, other: Self) -> bool {
        (self - other).abs() < crate::EPSILON
    }

    fn approximately_eq_rel(self, other: Self, tolerance: Self) -> bool {
        let scale = 1.0_f64.max(self.abs()).max(other.abs());
        (self - other).abs() <= tolerance * scale
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn f32_approximately_eq() {
        assert!(1.0_f32.approximately_eq(1.0));
        assert!((0.1_f32 + 0.2_f32).approximately_eq(0.3));
        assert!(!1.0_f32.approximately_eq(1.001));
    }

    #[test]
    fn f32_nan_is_never_equal() {
        assert!(!f32::NAN.approximately_eq(f32::NAN));
        assert!(!f32::NAN.approximately_eq_rel(0.0, 1.0));
    }

    #[test]
    fn relative_tolerance_scales_with_magnitude() {
        // 1000 vs 1000.5: abs diff 0.5, relative 5e-4
        assert!(1000.0_f32.approximately_eq_rel(1000.5, 1e-3));
        assert!(!1000.0_f32.approximately_eq_rel(1000.5, 1e-4));
        // Below 1.0 the tolerance is absolute.
        assert!(0.001_f64.approximately_eq_rel(0.0015, 1e-3));
        assert!(!0.001_f64.approximately_eq_rel(0.003, 1e-3));
    }

    #[test]
    fn relative_comparison_is_symmetric() {
        let a = 3.0_f32;
        let b = 3.002_f32;
        assert_eq!(
            a.approximately_eq_rel(b, 1e-3),
            b.approximately_eq_rel(a, 1e-3)
        );
    }
}
