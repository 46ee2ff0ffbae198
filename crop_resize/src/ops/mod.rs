//! Op-level entry points: shape checks, output allocation and validation-gated
//! compute over host tensors.
//!
//! Every op offers three ways to run:
//!
//! - `compute`: checks shapes and box indices and computes on the calling thread.
//! - `compute_async`: checks shapes on the calling thread, then hands compute to
//!   [`run_if_box_index_valid`](crate::pipeline::run_if_box_index_valid) and reports
//!   through a `done` callback that fires exactly once.
//! - `compute_deferred`: awaitable form of `compute_async` with deferred validation.

mod crop;
mod grad_boxes;
mod grad_image;


pub use crop::{CropAndResize, CropInputs};
pub use grad_boxes::{CropAndResizeGradBoxes, GradBoxesInputs};
pub use grad_image::{CropAndResizeGradImage, GradImageInputs};

use tokio::sync::oneshot;

use crate::config::Rank;
use crate::error::{Error, Result};
use crate::tensor::{Tensor, Volume};

/// Number of boxes after checking that `boxes` and `box_index` agree.
///
/// Both empty means no boxes, whatever their shapes.
fn parse_box_sizes(rank: Rank, boxes: &Tensor<f32>, box_index: &Tensor<i32>) -> Result<usize> {
    if boxes.num_elements() == 0 && box_index.num_elements() == 0 {
        return Ok(0);
    }
    if boxes.dims() != 2 {
        return Err(Error::invalid(format!(
            "boxes must be 2-D, got {}",
            boxes.shape_string()
        )));
    }
    let num_boxes = boxes.dim(0);
    if boxes.dim(1) != rank.box_columns() {
        return Err(Error::invalid(format!(
            "boxes must have {} columns",
            rank.box_columns()
        )));
    }
    if box_index.dims() != 1 {
        return Err(Error::invalid(format!(
            "box_index must be 1-D, got {}",
            box_index.shape_string()
        )));
    }
    if box_index.dim(0) != num_boxes {
        return Err(Error::invalid("box_index has incompatible shape"));
    }
    Ok(num_boxes)
}

fn layout_from_shape(rank: Rank, shape: &[usize]) -> Volume {
    match rank {
        Rank::Two => Volume::image(shape[0], shape[1], shape[2], shape[3]),
        Rank::Three => Volume::volume(shape[0], shape[1], shape[2], shape[3], shape[4]),
    }
}

fn spatial_dims_positive(rank: Rank, layout: &Volume) -> bool {
    let depth_ok = rank == Rank::Two || layout.depth > 0;
    layout.height > 0 && layout.width > 0 && depth_ok
}

/// Layout of the source image/volume tensor.
fn parse_source<T>(rank: Rank, image: &Tensor<T>) -> Result<Volume> {
    if image.dims() != rank.tensor_dims() {
        return Err(Error::invalid(format!(
            "input image must be {}-D, got {}",
            rank.tensor_dims(),
            image.shape_string()
        )));
    }
    let layout = layout_from_shape(rank, image.shape());
    if !spatial_dims_positive(rank, &layout) {
        return Err(Error::invalid("image dimensions must be positive"));
    }
    Ok(layout)
}

/// Layout of the upstream gradient tensor, shaped like the crops.
fn parse_grads(rank: Rank, grads: &Tensor<f32>) -> Result<Volume> {
    if grads.dims() != rank.tensor_dims() {
        return Err(Error::invalid(format!(
            "grads image must be {}-D, got {}",
            rank.tensor_dims(),
            grads.shape_string()
        )));
    }
    let layout = layout_from_shape(rank, grads.shape());
    if !spatial_dims_positive(rank, &layout) {
        return Err(Error::invalid("grads dimensions must be positive"));
    }
    Ok(layout)
}

/// Crop extents `(height, width)` or `(height, width, depth)`.
fn parse_crop_size(rank: Rank, crop_size: &Tensor<i32>) -> Result<Vec<usize>> {
    if crop_size.dims() != 1 {
        return Err(Error::invalid(format!(
            "crop_size must be 1-D, got {}",
            crop_size.shape_string()
        )));
    }
    if crop_size.dim(0) != rank.spatial_dims() {
        return Err(Error::invalid(format!(
            "crop_size must have {} elements, got {}",
            rank.count_word(),
            crop_size.shape_string()
        )));
    }
    if crop_size.data().iter().any(|&c| c <= 0) {
        return Err(Error::invalid("crop dimensions must be positive"));
    }
    Ok(crop_size.data().iter().map(|&c| c as usize).collect())
}

/// Layout of the source whose gradient is requested, from its shape vector.
fn parse_image_size(rank: Rank, image_size: &Tensor<i32>) -> Result<Volume> {
    if image_size.dims() != 1 {
        return Err(Error::invalid(format!(
            "image_size must be 1-D, got {}",
            image_size.shape_string()
        )));
    }
    if image_size.dim(0) != rank.tensor_dims() {
        return Err(Error::invalid(format!(
            "image_size must have {} elements, got {}",
            rank.tensor_dims(),
            image_size.shape_string()
        )));
    }
    if image_size.data().iter().any(|&d| d < 0) {
        return Err(Error::invalid("image_size must be non-negative"));
    }
    let shape: Vec<usize> = image_size.data().iter().map(|&d| d as usize).collect();
    let layout = layout_from_shape(rank, &shape);
    if !spatial_dims_positive(rank, &layout) {
        return Err(Error::invalid("image dimensions must be positive"));
    }
    Ok(layout)
}

/// Element count of an output tensor, or `InvalidArgument` when no buffer of `T` can
/// hold `shape`.
fn output_len<T>(what: &str, shape: &[usize]) -> Result<usize> {
    if shape.contains(&0) {
        return Ok(0);
    }
    let too_large = || {
        let dims: Vec<String> = shape.iter().map(|d| d.to_string()).collect();
        Error::invalid(format!("{what} of shape [{}] is too large", dims.join(",")))
    };
    let len = shape
        .iter()
        .try_fold(1usize, |acc, &d| acc.checked_mul(d))
        .ok_or_else(too_large)?;
    let bytes = len
        .checked_mul(std::mem::size_of::<T>())
        .ok_or_else(too_large)?;
    if bytes > isize::MAX as usize {
        return Err(too_large());
    }
    Ok(len)
}

/// A `done` callback that forwards the result to the returned receiver.
fn done_channel<R: Send + 'static>() -> (
    impl FnOnce(Result<R>) + Send + 'static,
    oneshot::Receiver<Result<R>>,
) {
    let (tx, rx) = oneshot::channel();
    let done = move |result: Result<R>| {
        // The awaiting future may have been dropped; the result has nowhere to go.
        let _ = tx.send(result);
    };
    (done, rx)
}

async fn receive<R>(rx: oneshot::Receiver<Result<R>>) -> Result<R> {
    rx.await
        .map_err(|_| Error::Internal("Op completion was lost".to_string()))?
}
