//! Crops a grid of boxes out of a synthetic gradient image, then runs both backward
//! passes through the deferred pipeline.
//!
//! Usage: `cargo run --example crop_grid [attrs.yaml]`

use std::path::Path;

use common::log_setup::{setup_logging, LogConfig};
use crop_resize::{
    CropAndResize, CropAndResizeGradBoxes, CropAndResizeGradImage, CropInputs,
    GradBoxesInputs, GradImageInputs, OpAttrs, Rank, Tensor,
};

const SIZE: usize = 64;
const GRID: usize = 4;
const CROP: i32 = 8;

#[tokio::main]
async fn main() {
    let log_config = LogConfig::new("crop_grid").level("debug");
    if let Err(e) = setup_logging(&log_config) {
        eprintln!("Logging disabled: {}", e);
    }

    let attrs = match std::env::args().nth(1) {
        Some(path) => OpAttrs::load(Path::new(&path)).unwrap_or_else(|e| panic!("{}", e)),
        None => OpAttrs::default(),
    };
    tracing::info!(?attrs, "Op attributes");

    let image = Tensor::new(
        vec![1, SIZE, SIZE, 1],
        (0..SIZE * SIZE)
            .map(|i| ((i / SIZE) + (i % SIZE)) as u8)
            .collect(),
    );

    let step = 1.0 / GRID as f32;
    let mut rows = Vec::new();
    for gy in 0..GRID {
        for gx in 0..GRID {
            let (y, x) = (gy as f32 * step, gx as f32 * step);
            // the last column reaches past the image and picks up extrapolated cells
            rows.extend([y, x, y + step * 1.5, x + step * 1.5]);
        }
    }
    let num_boxes = GRID * GRID;
    let boxes = Tensor::new(vec![num_boxes, 4], rows);
    let box_index = Tensor::vector(vec![0; num_boxes]);

    let forward = CropAndResize::new(Rank::Two, &attrs).unwrap_or_else(|e| panic!("{}", e));
    let crops = forward
        .compute_deferred(
            tokio::runtime::Handle::current(),
            CropInputs::new(
                image.clone(),
                boxes.clone(),
                box_index.clone(),
                Tensor::vector(vec![CROP, CROP]),
            ),
        )
        .await
        .unwrap_or_else(|e| panic!("{}", e));

    for (b, crop) in crops.data().chunks((CROP * CROP) as usize).enumerate() {
        let mean = crop.iter().sum::<f32>() / crop.len() as f32;
        tracing::info!(b, mean, "Crop");
    }

    let grads = Tensor::filled(crops.shape().to_vec(), 1.0f32);

    let grad_image = CropAndResizeGradImage::<f32>::new(Rank::Two, &attrs)
        .unwrap_or_else(|e| panic!("{}", e));
    let image_grads = grad_image
        .compute_deferred(
            tokio::runtime::Handle::current(),
            GradImageInputs::new(
                grads.clone(),
                boxes.clone(),
                box_index.clone(),
                Tensor::vector(vec![1, SIZE as i32, SIZE as i32, 1]),
            ),
        )
        .await
        .unwrap_or_else(|e| panic!("{}", e));
    let total: f32 = image_grads.data().iter().sum();
    tracing::info!(total, "Image gradient mass");

    let grad_boxes =
        CropAndResizeGradBoxes::new(Rank::Two, &attrs).unwrap_or_else(|e| panic!("{}", e));
    let box_grads = grad_boxes
        .compute_deferred(
            tokio::runtime::Handle::current(),
            GradBoxesInputs::new(grads, image, boxes, box_index),
        )
        .await
        .unwrap_or_else(|e| panic!("{}", e));
    for (b, row) in box_grads.data().chunks(4).enumerate() {
        tracing::info!(b, ?row, "Box gradient");
    }
}
