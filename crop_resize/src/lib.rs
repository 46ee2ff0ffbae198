//! Crop-and-resize - batched box crops with bilinear/trilinear sampling.
//!
//! Given a batch of images `(batch, height, width, channels)` or volumes
//! `(batch, height, width, depth, channels)` and a list of normalized boxes, each
//! referencing one batch item, this library:
//! - Extracts a fixed-size crop per box, extrapolating outside the source
//! - Scatters upstream gradients back onto the source
//! - Computes gradients w.r.t. the box coordinates
//!
//! Box indices are validated before any compute starts, either on the calling thread
//! or asynchronously through a tokio runtime.
//!
//! # Quick Start
//!
//! ```rust,ignore
//! use crop_resize::{CropAndResize, OpAttrs, Rank, Tensor};
//!
//! let op = CropAndResize::new(Rank::Two, &OpAttrs::default())?;
//! let image = Tensor::new(vec![1, 2, 2, 1], vec![1.0f32, 2.0, 3.0, 4.0]);
//! let boxes = Tensor::new(vec![1, 4], vec![0.0, 0.0, 1.0, 1.0]);
//! let crops = op.compute(&image, &boxes, &Tensor::vector(vec![0]), &Tensor::vector(vec![2, 2]))?;
//!
//! assert_eq!(crops.data(), image.data());
//! ```

mod config;
mod error;
pub mod forward;
pub mod geometry;
pub mod grad_boxes;
pub mod grad_image;
mod ops;
pub mod pipeline;
mod sample;
pub mod schedule;
mod tensor;
pub mod validate;

#[cfg(test)]
pub mod testing;

// ============================================================================
// Ops
// ============================================================================

pub use ops::{
    CropAndResize, CropAndResizeGradBoxes, CropAndResizeGradImage, CropInputs,
    GradBoxesInputs, GradImageInputs,
};
pub use pipeline::Execution;

// ============================================================================
// Data and configuration
// ============================================================================

pub use config::{Method, OpAttrs, Rank};
pub use error::{Error, Result};
pub use half::{bf16, f16};
pub use sample::{GradSample, Sample};
pub use schedule::WorkScheduler;
pub use tensor::{Tensor, Volume};
