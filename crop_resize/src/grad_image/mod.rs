//! Backward pass w.r.t. the source: scatter-add of upstream gradients.
//!
//! Each in-range crop cell hands its upstream gradient to the 4 (2-D) or 8 (3-D)
//! source neighbours it was sampled from, weighted exactly like the forward lerps.
//! Cells that were extrapolated contribute nothing.
//!
//! Several boxes may scatter into the same source cell, so boxes are not sharded.
//! Instead boxes are grouped by the batch item they write to: items are disjoint
//! slices of the output and run in parallel, while boxes inside one item keep their
//! relative order.


use crate::geometry::BoxGeometry;
use crate::sample::GradSample;
use crate::schedule::{group_by_destination, OpCounts, WorkScheduler};
use crate::tensor::Volume;

const SCATTER_2D_OPS: OpCounts = OpCounts {
    adds: 6,
    muls: 6,
    casts: 4,
    cell_adds: 5,
};

const SCATTER_3D_OPS: OpCounts = OpCounts {
    adds: 12,
    muls: 14,
    casts: 8,
    cell_adds: 7,
};

/// Accumulates `grads` (shaped like the 2-D crops) into `grads_image`.
///
/// Gradients are added onto `grads_image`, which the caller zeroes.
/// `grads_layout.batch` is the number of boxes.
pub fn crop_and_resize_grad_image_2d<T: GradSample>(
    scheduler: &WorkScheduler,
    grads: &[f32],
    grads_layout: &Volume,
    boxes: &[f32],
    box_index: &[i32],
    grads_image: &mut [T],
    image_layout: &Volume,
) {
    debug_assert_eq!(grads.len(), grads_layout.len());
    debug_assert_eq!(grads_image.len(), image_layout.len());
    debug_assert_eq!(boxes.len(), grads_layout.batch * 4);

    let groups = group_by_destination(box_index, image_layout.batch);
    let extents = [image_layout.height, image_layout.width];
    let crop_extents = [grads_layout.height, grads_layout.width];
    let cost = SCATTER_2D_OPS.box_cost(grads_layout.cells(), grads_layout.channels, T::NEEDS_CAST);

    scheduler.for_each_destination_mut(
        grads_image,
        image_layout.item_len(),
        &groups,
        cost,
        |group, target| {
            for &b in group {
                let geometry =
                    BoxGeometry::from_row(&boxes[b * 4..b * 4 + 4], extents, crop_extents);
                let upstream = &grads[b * grads_layout.item_len()..][..grads_layout.item_len()];
                scatter_box_2d(upstream, grads_layout, &geometry, target, image_layout);
            }
        },
    );
}

fn scatter_box_2d<T: GradSample>(
    upstream: &[f32],
    grads_layout: &Volume,
    geometry: &BoxGeometry<2>,
    target: &mut [T],
    image: &Volume,
) {
    let channels = grads_layout.channels;
    let [y_map, x_map] = &geometry.axes;
    let x_samples = x_map.locate_all();

    for y in 0..grads_layout.height {
        let Some(ys) = y_map.locate(y) else {
            continue;
        };

        for (x, xs) in x_samples.iter().enumerate() {
            let Some(xs) = xs else {
                continue;
            };

            let cell = &upstream[grads_layout.cell_offset(y, x, 0)..][..channels];
            let top_left = image.cell_offset(ys.lo, xs.lo, 0);
            let top_right = image.cell_offset(ys.lo, xs.hi, 0);
            let bottom_left = image.cell_offset(ys.hi, xs.lo, 0);
            let bottom_right = image.cell_offset(ys.hi, xs.hi, 0);

            for (d, &g) in cell.iter().enumerate() {
                let d_top = (1.0 - ys.lerp) * g;
                let d_bottom = ys.lerp * g;
                add(target, top_left + d, (1.0 - xs.lerp) * d_top);
                add(target, top_right + d, xs.lerp * d_top);
                add(target, bottom_left + d, (1.0 - xs.lerp) * d_bottom);
                add(target, bottom_right + d, xs.lerp * d_bottom);
            }
        }
    }
}

/// Accumulates `grads` (shaped like the 3-D crops) into the zeroed `grads_volume`.
pub fn crop_and_resize_grad_image_3d<T: GradSample>(
    scheduler: &WorkScheduler,
    grads: &[f32],
    grads_layout: &Volume,
    boxes: &[f32],
    box_index: &[i32],
    grads_volume: &mut [T],
    volume_layout: &Volume,
) {
    debug_assert_eq!(grads.len(), grads_layout.len());
    debug_assert_eq!(grads_volume.len(), volume_layout.len());
    debug_assert_eq!(boxes.len(), grads_layout.batch * 6);

    let groups = group_by_destination(box_index, volume_layout.batch);
    let extents = [volume_layout.height, volume_layout.width, volume_layout.depth];
    let crop_extents = [grads_layout.height, grads_layout.width, grads_layout.depth];
    let cost = SCATTER_3D_OPS.box_cost(grads_layout.cells(), grads_layout.channels, T::NEEDS_CAST);

    scheduler.for_each_destination_mut(
        grads_volume,
        volume_layout.item_len(),
        &groups,
        cost,
        |group, target| {
            for &b in group {
                let geometry =
                    BoxGeometry::from_row(&boxes[b * 6..b * 6 + 6], extents, crop_extents);
                let upstream = &grads[b * grads_layout.item_len()..][..grads_layout.item_len()];
                scatter_box_3d(upstream, grads_layout, &geometry, target, volume_layout);
            }
        },
    );
}

fn scatter_box_3d<T: GradSample>(
    upstream: &[f32],
    grads_layout: &Volume,
    geometry: &BoxGeometry<3>,
    target: &mut [T],
    volume: &Volume,
) {
    let channels = grads_layout.channels;
    let [y_map, x_map, z_map] = &geometry.axes;
    let x_samples = x_map.locate_all();
    let z_samples = z_map.locate_all();

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
                let tlf = volume.cell_offset(ys.lo, xs.lo, zs.lo);
                let trf = volume.cell_offset(ys.lo, xs.hi, zs.lo);
                let blf = volume.cell_offset(ys.hi, xs.lo, zs.lo);
                let brf = volume.cell_offset(ys.hi, xs.hi, zs.lo);
                let tlb = volume.cell_offset(ys.lo, xs.lo, zs.hi);
                let trb = volume.cell_offset(ys.lo, xs.hi, zs.hi);
                let blb = volume.cell_offset(ys.hi, xs.lo, zs.hi);
                let brb = volume.cell_offset(ys.hi, xs.hi, zs.hi);

                for (d, &g) in cell.iter().enumerate() {
                    let d_front = (1.0 - zs.lerp) * g;
                    let d_back = zs.lerp * g;
                    let d_top_front = (1.0 - ys.lerp) * d_front;
                    let d_bottom_front = ys.lerp * d_front;
                    let d_top_back = (1.0 - ys.lerp) * d_back;
                    let d_bottom_back = ys.lerp * d_back;

                    add(target, tlf + d, (1.0 - xs.lerp) * d_top_front);
                    add(target, trf + d, xs.lerp * d_top_front);
                    add(target, blf + d, (1.0 - xs.lerp) * d_bottom_front);
                    add(target, brf + d, xs.lerp * d_bottom_front);
                    add(target, tlb + d, (1.0 - xs.lerp) * d_top_back);
                    add(target, trb + d, xs.lerp * d_top_back);
                    add(target, blb + d, (1.0 - xs.lerp) * d_bottom_back);
                    add(target, brb + d, xs.lerp * d_bottom_back);
                }
            }
        }
    }
}

#[inline]
fn add<T: GradSample>(target: &mut [T], index: usize, value: f32) {
    target[index] = target[index] + T::from_f32(value);
}
