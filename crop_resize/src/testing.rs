//! Shared helpers for unit tests.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::tensor::Volume;

/// Initialize tracing for tests. Safe to call multiple times.
pub fn init_tracing() {
    common::log_setup::init_test_logging();
}

/// Deterministic uniform values in `[lo, hi)`.
pub fn random_values(len: usize, lo: f32, hi: f32, seed: u64) -> Vec<f32> {
    let mut rng = StdRng::seed_from_u64(seed);
    (0..len).map(|_| rng.random_range(lo..hi)).collect()
}

/// Bilinear sample written as an explicit weighted sum of the four corners.
pub fn bilinear_reference(
    image: &[f32],
    layout: &Volume,
    b: usize,
    y: f32,
    x: f32,
    d: usize,
) -> f32 {
    let (y0, x0) = (y.floor(), x.floor());
    let (fy, fx) = (y - y0, x - x0);
    let (y0, x0) = (y0 as usize, x0 as usize);
    let (y1, x1) = (y.ceil() as usize, x.ceil() as usize);
    let at = |yy: usize, xx: usize| image[layout.offset(b, yy, xx, 0) + d];

    (1.0 - fy) * (1.0 - fx) * at(y0, x0)
        + (1.0 - fy) * fx * at(y0, x1)
        + fy * (1.0 - fx) * at(y1, x0)
        + fy * fx * at(y1, x1)
}

/// Trilinear sample written as an explicit weighted sum of the eight corners.
#[allow(clippy::too_many_arguments)]
pub fn trilinear_reference(
    volume: &[f32],
    layout: &Volume,
    b: usize,
    y: f32,
    x: f32,
    z: f32,
    d: usize,
) -> f32 {
    let corners = |c: f32| -> [(usize, f32); 2] {
        let lo = c.floor();
        let f = c - lo;
        [(lo as usize, 1.0 - f), (c.ceil() as usize, f)]
    };

    let mut sum = 0.0;
    for (yy, wy) in corners(y) {
        for (xx, wx) in corners(x) {
            for (zz, wz) in corners(z) {
                sum += wy * wx * wz * volume[layout.offset(b, yy, xx, zz) + d];
            }
        }
    }
    sum
}
