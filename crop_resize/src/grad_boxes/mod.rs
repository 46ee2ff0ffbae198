//! Backward pass w.r.t. the box coordinates.
//!
//! For every in-range crop cell the image-space gradient along each axis (weighted
//! differences across opposite corners) is multiplied by the upstream gradient and
//! pushed through [`AxisMap::d_start`](crate::geometry::AxisMap::d_start) and
//! [`AxisMap::d_end`](crate::geometry::AxisMap::d_end) onto the box bounds. Each box
//! only writes its own row, so boxes are sharded like the forward pass.


use crate::geometry::{AxisMap, BoxGeometry};
use crate::sample::Sample;
use crate::schedule::{OpCounts, WorkScheduler};
use crate::tensor::Volume;
use crate::validate::in_batch;

const BOX_GRAD_2D_OPS: OpCounts = OpCounts {
    adds: 10,
    muls: 8,
    casts: 4,
    cell_adds: 9,
};

const BOX_GRAD_3D_OPS: OpCounts = OpCounts {
    adds: 28,
    muls: 24,
    casts: 8,
    cell_adds: 13,
};

/// Writes `d loss / d box` into `grads_boxes`, laid out like `boxes` (`num_boxes x 4`).
///
/// `grads_boxes` arrives zeroed. Boxes with an invalid index keep a zero row.
#[allow(clippy::too_many_arguments)]
pub fn crop_and_resize_grad_boxes_2d<T: Sample>(
    scheduler: &WorkScheduler,
    grads: &[f32],
    grads_layout: &Volume,
    image: &[T],
    image_layout: &Volume,
    boxes: &[f32],
    box_index: &[i32],
    grads_boxes: &mut [f32],
) {
    debug_assert_eq!(grads.len(), grads_layout.len());
    debug_assert_eq!(image.len(), image_layout.len());
    debug_assert_eq!(boxes.len(), grads_layout.batch * 4);
    debug_assert_eq!(grads_boxes.len(), boxes.len());

    let extents = [image_layout.height, image_layout.width];
    let crop_extents = [grads_layout.height, grads_layout.width];
    let cost = BOX_GRAD_2D_OPS.box_cost(grads_layout.cells(), grads_layout.channels, T::NEEDS_CAST);

    scheduler.for_each_box_mut(grads_boxes, 4, cost, |b, row| {
        let index = box_index[b];
        if !in_batch(index, image_layout.batch) {
            return;
        }
        let source = &image[index as usize * image_layout.item_len()..][..image_layout.item_len()];
        let upstream = &grads[b * grads_layout.item_len()..][..grads_layout.item_len()];
        let geometry = BoxGeometry::from_row(&boxes[b * 4..b * 4 + 4], extents, crop_extents);

        let axis_grads = box_axis_grads_2d(upstream, grads_layout, source, image_layout, &geometry);
        write_row(row, &geometry, &axis_grads);
    });
}

/// Per crop cell, `sum over channels of g * dv/d(sample)` along each axis, indexed by
/// crop coordinate; the chain rule is applied afterwards in [`write_row`].
fn box_axis_grads_2d<T: Sample>(
    upstream: &[f32],
    grads_layout: &Volume,
    source: &[T],
    image: &Volume,
    geometry: &BoxGeometry<2>,
) -> [Vec<f32>; 2] {
    let channels = grads_layout.channels;
    let [y_map, x_map] = &geometry.axes;
    let x_samples = x_map.locate_all();

    let mut by_y = vec![0.0f32; y_map.crop()];
    let mut by_x = vec![0.0f32; x_map.crop()];

    for y in 0..grads_layout.height {
        let Some(ys) = y_map.locate(y) else {
            continue;
        };

        for (x, xs) in x_samples.iter().enumerate() {
            let Some(xs) = xs else {
                continue;
            };

            let cell = &upstream[grads_layout.cell_offset(y, x, 0)..][..channels];
            let tl = &source[image.cell_offset(ys.lo, xs.lo, 0)..][..channels];
            let tr = &source[image.cell_offset(ys.lo, xs.hi, 0)..][..channels];
            let bl = &source[image.cell_offset(ys.hi, xs.lo, 0)..][..channels];
            let br = &source[image.cell_offset(ys.hi, xs.hi, 0)..][..channels];

            let (mut dy, mut dx) = (0.0f32, 0.0f32);
            for d in 0..channels {
                let g = cell[d];
                let (tl, tr) = (tl[d].to_f32(), tr[d].to_f32());
                let (bl, br) = (bl[d].to_f32(), br[d].to_f32());

                dy += g * ((1.0 - xs.lerp) * (bl - tl) + xs.lerp * (br - tr));
                dx += g * ((1.0 - ys.lerp) * (tr - tl) + ys.lerp * (br - bl));
            }
            by_y[y] += dy;
            by_x[x] += dx;
        }
    }

    [by_y, by_x]
}

/// Writes `d loss / d box` into the zeroed `grads_boxes`, laid out like `boxes`
/// (`num_boxes x 6`).
#[allow(clippy::too_many_arguments)]
pub fn crop_and_resize_grad_boxes_3d<T: Sample>(
    scheduler: &WorkScheduler,
    grads: &[f32],
    grads_layout: &Volume,
    volume: &[T],
    volume_layout: &Volume,
    boxes: &[f32],
    box_index: &[i32],
    grads_boxes: &mut [f32],
) {
    debug_assert_eq!(grads.len(), grads_layout.len());
    debug_assert_eq!(volume.len(), volume_layout.len());
    debug_assert_eq!(boxes.len(), grads_layout.batch * 6);
    debug_assert_eq!(grads_boxes.len(), boxes.len());

    let extents = [volume_layout.height, volume_layout.width, volume_layout.depth];
    let crop_extents = [grads_layout.height, grads_layout.width, grads_layout.depth];
    let cost = BOX_GRAD_3D_OPS.box_cost(grads_layout.cells(), grads_layout.channels, T::NEEDS_CAST);

    scheduler.for_each_box_mut(grads_boxes, 6, cost, |b, row| {
        let index = box_index[b];
        if !in_batch(index, volume_layout.batch) {
            return;
        }
        let source =
            &volume[index as usize * volume_layout.item_len()..][..volume_layout.item_len()];
        let upstream = &grads[b * grads_layout.item_len()..][..grads_layout.item_len()];
        let geometry = BoxGeometry::from_row(&boxes[b * 6..b * 6 + 6], extents, crop_extents);

        let axis_grads =
            box_axis_grads_3d(upstream, grads_layout, source, volume_layout, &geometry);
        write_row(row, &geometry, &axis_grads);
    });
}

fn box_axis_grads_3d<T: Sample>(
    upstream: &[f32],
    grads_layout: &Volume,
    source: &[T],
    volume: &Volume,
    geometry: &BoxGeometry<3>,
) -> [Vec<f32>; 3] {
    let channels = grads_layout.channels;
    let [y_map, x_map, z_map] = &geometry.axes;
    let x_samples = x_map.locate_all();
    let z_samples = z_map.locate_all();

    let mut by_y = vec![0.0f32; y_map.crop()];
    let mut by_x = vec![0.0f32; x_map.crop()];
    let mut by_z = vec![0.0f32; z_map.crop()];

    for y in 0..grads_layout.height {
        let Some(ys) = y_map.locate(y) else {
            continue;
        };

        for (x, xs) in x_samples.iter().enumerate() {
            let Some(xs) = xs else {
                continue;
            };

            for (z, zs) in z_samples.iter().enumerate() {
                let Some(zs) = zs else {
                    continue;
                };

                let cell = &upstream[grads_layout.cell_offset(y, x, z)..][..channels];
                let corner = |yy: usize, xx: usize, zz: usize| {
                    &source[volume.cell_offset(yy, xx, zz)..][..channels]
                };
                let tlf = corner(ys.lo, xs.lo, zs.lo);
                let trf = corner(ys.lo, xs.hi, zs.lo);
                let blf = corner(ys.hi, xs.lo, zs.lo);
                let brf = corner(ys.hi, xs.hi, zs.lo);
                let tlb = corner(ys.lo, xs.lo, zs.hi);
                let trb = corner(ys.lo, xs.hi, zs.hi);
                let blb = corner(ys.hi, xs.lo, zs.hi);
                let brb = corner(ys.hi, xs.hi, zs.hi);

                let (fy, fx, fz) = (ys.lerp, xs.lerp, zs.lerp);
                let (mut dy, mut dx, mut dz) = (0.0f32, 0.0f32, 0.0f32);
                for d in 0..channels {
                    let g = cell[d];
                    let (tlf, trf) = (tlf[d].to_f32(), trf[d].to_f32());
                    let (blf, brf) = (blf[d].to_f32(), brf[d].to_f32());
                    let (tlb, trb) = (tlb[d].to_f32(), trb[d].to_f32());
                    let (blb, brb) = (blb[d].to_f32(), brb[d].to_f32());

                    let along_y = (1.0 - fz)
                        * ((1.0 - fx) * (blf - tlf) + fx * (brf - trf))
                        + fz * ((1.0 - fx) * (blb - tlb) + fx * (brb - trb));
                    let along_x = (1.0 - fz)
                        * ((1.0 - fy) * (trf - tlf) + fy * (brf - blf))
                        + fz * ((1.0 - fy) * (trb - tlb) + fy * (brb - blb));
                    let along_z = (1.0 - fy)
                        * ((1.0 - fx) * (tlb - tlf) + fx * (trb - trf))
                        + fy * ((1.0 - fx) * (blb - blf) + fx * (brb - brf));

                    dy += g * along_y;
                    dx += g * along_x;
                    dz += g * along_z;
                }
                by_y[y] += dy;
                by_x[x] += dx;
                by_z[z] += dz;
            }
        }
    }

    [by_y, by_x, by_z]
}

/// Chain rule from per-cell sample gradients onto the box row `[starts..., ends...]`.
fn write_row<const N: usize>(
    row: &mut [f32],
    geometry: &BoxGeometry<N>,
    axis_grads: &[Vec<f32>; N],
) {
    for (axis, (map, grads)) in geometry.axes.iter().zip(axis_grads).enumerate() {
        let (d_start, d_end) = chain(map, grads);
        row[BoxGeometry::<N>::start_column(axis)] += d_start;
        row[BoxGeometry::<N>::end_column(axis)] += d_end;
    }
}

fn chain(map: &AxisMap, grads: &[f32]) -> (f32, f32) {
    grads
        .iter()
        .enumerate()
        .fold((0.0, 0.0), |(start, end), (o, &g)| {
            (start + g * map.d_start(o), end + g * map.d_end(o))
        })
}
