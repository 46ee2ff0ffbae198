//! Mapping from crop cells to fractional source coordinates.
//!
//! Along one axis, a box spans normalized bounds `(start, end)` of a source extent `S`
//! and is sampled on `C` crop cells:
//!
//! - `C > 1`: `sample(o) = start * (S - 1) + o * (end - start) * (S - 1) / (C - 1)`
//! - `C == 1`: `sample(0) = 0.5 * (start + end) * (S - 1)` (box midpoint)
//!
//! Forward and both backward passes build their [`AxisMap`]s from the box row, so the
//! sampling geometry and its derivatives come from one place.


/// Neighbouring source indices and the lerp fraction for one in-range sample.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AxisSample {
    /// `floor(sample)`
    pub lo: usize,
    /// `ceil(sample)`; equals `lo` for integral samples.
    pub hi: usize,
    /// `sample - lo`, in `[0, 1)`.
    pub lerp: f32,
}

/// Sampling geometry of one box along one axis.
#[derive(Debug, Clone, Copy)]
pub struct AxisMap {
    start: f32,
    end: f32,
    crop: usize,
    /// `S - 1` as float: the last valid source coordinate.
    max: f32,
    /// `(S - 1) / (C - 1)`, zero for single-cell crops.
    ratio: f32,
    /// `(end - start) * (S - 1) / (C - 1)`, zero for single-cell crops.
    scale: f32,
}

impl AxisMap {
    pub fn new(start: f32, end: f32, extent: usize, crop: usize) -> Self {
        debug_assert!(extent > 0, "source extent must be positive");
        debug_assert!(crop > 0, "crop extent must be positive");

        let max = (extent - 1) as f32;
        let (ratio, scale) = if crop > 1 {
            let steps = (crop - 1) as f32;
            (max / steps, (end - start) * max / steps)
        } else {
            (0.0, 0.0)
        };

        Self {
            start,
            end,
            crop,
            max,
            ratio,
            scale,
        }
    }

    #[inline]
    pub fn crop(&self) -> usize {
        self.crop
    }

    /// Fractional source coordinate of crop cell `o`.
    #[inline]
    pub fn sample(&self, o: usize) -> f32 {
        if self.crop > 1 {
            self.start * self.max + o as f32 * self.scale
        } else {
            0.5 * (self.start + self.end) * self.max
        }
    }

    /// Neighbours of crop cell `o`, or `None` when it falls outside `[0, S - 1]`.
    ///
    /// NaN coordinates count as out of range.
    #[inline]
    pub fn locate(&self, o: usize) -> Option<AxisSample> {
        let s = self.sample(o);
        if !(0.0..=self.max).contains(&s) {
            return None;
        }
        let lo = s.floor();
        Some(AxisSample {
            lo: lo as usize,
            hi: s.ceil() as usize,
            lerp: s - lo,
        })
    }

    /// [`locate`](Self::locate) for every crop cell.
    pub fn locate_all(&self) -> Vec<Option<AxisSample>> {
        (0..self.crop).map(|o| self.locate(o)).collect()
    }

    /// `d sample(o) / d start`
    #[inline]
    pub fn d_start(&self, o: usize) -> f32 {
        if self.crop > 1 {
            self.max - o as f32 * self.ratio
        } else {
            0.5 * self.max
        }
    }

    /// `d sample(o) / d end`
    #[inline]
    pub fn d_end(&self, o: usize) -> f32 {
        if self.crop > 1 {
            o as f32 * self.ratio
        } else {
            0.5 * self.max
        }
    }
}

/// Per-axis maps of one box. Axis order is `(y, x)` or `(y, x, z)`.
#[derive(Debug, Clone, Copy)]
pub struct BoxGeometry<const N: usize> {
    pub axes: [AxisMap; N],
}

impl<const N: usize> BoxGeometry<N> {
    /// Builds the maps from a box row laid out as `[starts..., ends...]`,
    /// i.e. `(y1, x1, y2, x2)` or `(y1, x1, z1, y2, x2, z2)`.
    pub fn from_row(row: &[f32], extents: [usize; N], crop: [usize; N]) -> Self {
        debug_assert_eq!(row.len(), 2 * N);
        let axes = std::array::from_fn(|i| AxisMap::new(row[i], row[N + i], extents[i], crop[i]));
        Self { axes }
    }

    /// Column in the box row holding the start bound of `axis`.
    #[inline]
    pub const fn start_column(axis: usize) -> usize {
        axis
    }

    /// Column in the box row holding the end bound of `axis`.
    #[inline]
    pub const fn end_column(axis: usize) -> usize {
        N + axis
    }
}
