//! Forward crop-and-resize: bilinear (2-D) and trilinear (3-D) sampling of boxes.
//!
//! Every crop cell whose sample coordinate leaves `[0, extent - 1]` on any axis is
//! filled with the extrapolation value on all channels. Boxes are independent, so
//! the scheduler shards them across the rayon pool.


use crate::geometry::BoxGeometry;
use crate::sample::Sample;
use crate::schedule::{OpCounts, WorkScheduler};
use crate::tensor::Volume;
use crate::validate::in_batch;

/// Per-cell operation counts of bilinear sampling.
pub const BILINEAR_OPS: OpCounts = OpCounts {
    adds: 6,
    muls: 3,
    casts: 4,
    cell_adds: 5,
};

/// Per-cell operation counts of trilinear sampling.
pub const TRILINEAR_OPS: OpCounts = OpCounts {
    adds: 14,
    muls: 7,
    casts: 8,
    cell_adds: 7,
};

/// Samples every box of `boxes` (rows of `(y1, x1, y2, x2)`) from `image` into `crops`.
///
/// `crop_layout.batch` is the number of boxes. Boxes with an index outside the batch
/// are skipped and leave their crop untouched.
#[allow(clippy::too_many_arguments)]
pub fn crop_and_resize_2d<T: Sample>(
    scheduler: &WorkScheduler,
    image: &[T],
    image_layout: &Volume,
    boxes: &[f32],
    box_index: &[i32],
    extrapolation_value: f32,
    crops: &mut [f32],
    crop_layout: &Volume,
) {
    debug_assert_eq!(image.len(), image_layout.len());
    debug_assert_eq!(crops.len(), crop_layout.len());
    debug_assert_eq!(boxes.len(), crop_layout.batch * 4);
    debug_assert_eq!(image_layout.channels, crop_layout.channels);

    let item_len = image_layout.item_len();
    let extents = [image_layout.height, image_layout.width];
    let crop_extents = [crop_layout.height, crop_layout.width];
    let cost = BILINEAR_OPS.box_cost(crop_layout.cells(), crop_layout.channels, T::NEEDS_CAST);

    scheduler.for_each_box_mut(crops, crop_layout.item_len(), cost, |b, crop| {
        let b_in = box_index[b];
        if !in_batch(b_in, image_layout.batch) {
            return;
        }
        let source = &image[b_in as usize * item_len..][..item_len];
        let geometry = BoxGeometry::from_row(&boxes[b * 4..b * 4 + 4], extents, crop_extents);
        crop_box_2d(
            source,
            image_layout,
            &geometry,
            extrapolation_value,
            crop,
            crop_layout,
        );
    });
}

fn crop_box_2d<T: Sample>(
    source: &[T],
    image: &Volume,
    geometry: &BoxGeometry<2>,
    extrapolation_value: f32,
    crop: &mut [f32],
    crop_layout: &Volume,
) {
    let channels = crop_layout.channels;
    let row_len = crop_layout.width * channels;
    let [y_map, x_map] = &geometry.axes;
    let x_samples = x_map.locate_all();

    for (y, row) in crop.chunks_exact_mut(row_len).enumerate() {
        let Some(ys) = y_map.locate(y) else {
            row.fill(extrapolation_value);
            continue;
        };

        for (cell, xs) in row.chunks_exact_mut(channels).zip(&x_samples) {
            let Some(xs) = xs else {
                cell.fill(extrapolation_value);
                continue;
            };

            let top_left = image.cell_offset(ys.lo, xs.lo, 0);
            let top_right = image.cell_offset(ys.lo, xs.hi, 0);
            let bottom_left = image.cell_offset(ys.hi, xs.lo, 0);
            let bottom_right = image.cell_offset(ys.hi, xs.hi, 0);

            for (d, out) in cell.iter_mut().enumerate() {
                let tl = source[top_left + d].to_f32();
                let tr = source[top_right + d].to_f32();
                let bl = source[bottom_left + d].to_f32();
                let br = source[bottom_right + d].to_f32();

                let top = tl + (tr - tl) * xs.lerp;
                let bottom = bl + (br - bl) * xs.lerp;
                *out = top + (bottom - top) * ys.lerp;
            }
        }
    }
}

/// Samples every box of `boxes` (rows of `(y1, x1, z1, y2, x2, z2)`) from `volume`
/// into `crops`.
#[allow(clippy::too_many_arguments)]
pub fn crop_and_resize_3d<T: Sample>(
    scheduler: &WorkScheduler,
    volume: &[T],
    volume_layout: &Volume,
    boxes: &[f32],
    box_index: &[i32],
    extrapolation_value: f32,
    crops: &mut [f32],
    crop_layout: &Volume,
) {
    debug_assert_eq!(volume.len(), volume_layout.len());
    debug_assert_eq!(crops.len(), crop_layout.len());
    debug_assert_eq!(boxes.len(), crop_layout.batch * 6);
    debug_assert_eq!(volume_layout.channels, crop_layout.channels);

    let item_len = volume_layout.item_len();
    let extents = [volume_layout.height, volume_layout.width, volume_layout.depth];
    let crop_extents = [crop_layout.height, crop_layout.width, crop_layout.depth];
    let cost = TRILINEAR_OPS.box_cost(crop_layout.cells(), crop_layout.channels, T::NEEDS_CAST);

    scheduler.for_each_box_mut(crops, crop_layout.item_len(), cost, |b, crop| {
        let b_in = box_index[b];
        if !in_batch(b_in, volume_layout.batch) {
            return;
        }
        let source = &volume[b_in as usize * item_len..][..item_len];
        let geometry = BoxGeometry::from_row(&boxes[b * 6..b * 6 + 6], extents, crop_extents);
        crop_box_3d(
            source,
            volume_layout,
            &geometry,
            extrapolation_value,
            crop,
            crop_layout,
        );
    });
}

fn crop_box_3d<T: Sample>(
    source: &[T],
    volume: &Volume,
    geometry: &BoxGeometry<3>,
    extrapolation_value: f32,
    crop: &mut [f32],
    crop_layout: &Volume,
) {
    let channels = crop_layout.channels;
    let [y_map, x_map, z_map] = &geometry.axes;
    let x_samples = x_map.locate_all();
    let z_samples = z_map.locate_all();
    let plane_len = crop_layout.width * crop_layout.depth * channels;
    let column_len = crop_layout.depth * channels;

    for (y, plane) in crop.chunks_exact_mut(plane_len).enumerate() {
        let Some(ys) = y_map.locate(y) else {
            plane.fill(extrapolation_value);
            continue;
        };

        for (column, xs) in plane.chunks_exact_mut(column_len).zip(&x_samples) {
            let Some(xs) = xs else {
                column.fill(extrapolation_value);
                continue;
            };

            for (cell, zs) in column.chunks_exact_mut(channels).zip(&z_samples) {
                let Some(zs) = zs else {
                    cell.fill(extrapolation_value);
                    continue;
                };

                let tlf = volume.cell_offset(ys.lo, xs.lo, zs.lo);
                let trf = volume.cell_offset(ys.lo, xs.hi, zs.lo);
                let blf = volume.cell_offset(ys.hi, xs.lo, zs.lo);
                let brf = volume.cell_offset(ys.hi, xs.hi, zs.lo);
                let tlb = volume.cell_offset(ys.lo, xs.lo, zs.hi);
                let trb = volume.cell_offset(ys.lo, xs.hi, zs.hi);
                let blb = volume.cell_offset(ys.hi, xs.lo, zs.hi);
                let brb = volume.cell_offset(ys.hi, xs.hi, zs.hi);

                for (d, out) in cell.iter_mut().enumerate() {
                    let top_front = lerp(
                        source[tlf + d].to_f32(),
                        source[trf + d].to_f32(),
                        xs.lerp,
                    );
                    let bottom_front = lerp(
                        source[blf + d].to_f32(),
                        source[brf + d].to_f32(),
                        xs.lerp,
                    );
                    let top_back = lerp(
                        source[tlb + d].to_f32(),
                        source[trb + d].to_f32(),
                        xs.lerp,
                    );
                    let bottom_back = lerp(
                        source[blb + d].to_f32(),
                        source[brb + d].to_f32(),
                        xs.lerp,
                    );

                    let front = lerp(top_front, bottom_front, ys.lerp);
                    let back = lerp(top_back, bottom_back, ys.lerp);
                    *out = lerp(front, back, zs.lerp);
                }
            }
        }
    }
}

#[inline]
fn lerp(a: f32, b: f32, t: f32) -> f32 {
    a + (b - a) * t
}
