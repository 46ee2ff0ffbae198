use std::sync::Arc;

use tokio::runtime::Handle;

use super::{
    done_channel, output_len, parse_box_sizes, parse_crop_size, parse_source, receive,
};
use crate::config::{OpAttrs, Rank};
use crate::error::Result;
use crate::forward::{crop_and_resize_2d, crop_and_resize_3d};
use crate::pipeline::{run_if_box_index_valid, Completion, Execution};
use crate::sample::Sample;
use crate::schedule::WorkScheduler;
use crate::tensor::{Tensor, Volume};
use crate::validate::check_box_index;

/// Owned inputs of [`CropAndResize`], shareable with a deferred compute stage.
#[derive(Debug, Clone)]
pub struct CropInputs<T> {
    /// `(batch, height, width, [depth,] channels)`
    pub image: Arc<Tensor<T>>,
    /// `(num_boxes, 4)` or `(num_boxes, 6)`
    pub boxes: Arc<Tensor<f32>>,
    /// `(num_boxes)`
    pub box_index: Arc<Tensor<i32>>,
    /// `(2)` or `(3)`
    pub crop_size: Arc<Tensor<i32>>,
}

impl<T> CropInputs<T> {
    pub fn new(
        image: Tensor<T>,
        boxes: Tensor<f32>,
        box_index: Tensor<i32>,
        crop_size: Tensor<i32>,
    ) -> Self {
        Self {
            image: Arc::new(image),
            boxes: Arc::new(boxes),
            box_index: Arc::new(box_index),
            crop_size: Arc::new(crop_size),
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct CropPlan {
    image: Volume,
    crops: Volume,
}

/// Extracts a fixed-size crop per box with bilinear (2-D) or trilinear (3-D) sampling.
///
/// Output: `(num_boxes, crop_height, crop_width, [crop_depth,] channels)` as `f32`.
#[derive(Debug, Clone)]
pub struct CropAndResize {
    rank: Rank,
    extrapolation_value: f32,
    scheduler: WorkScheduler,
}

impl CropAndResize {
    /// Fails with `InvalidArgument` if `attrs.method` does not match `rank`.
    pub fn new(rank: Rank, attrs: &OpAttrs) -> Result<Self> {
        attrs.validate(rank)?;
        Ok(Self {
            rank,
            extrapolation_value: attrs.extrapolation_value,
            scheduler: WorkScheduler::default(),
        })
    }

    pub fn with_scheduler(mut self, scheduler: WorkScheduler) -> Self {
        self.scheduler = scheduler;
        self
    }

    #[inline]
    pub fn rank(&self) -> Rank {
        self.rank
    }

    #[inline]
    pub fn extrapolation_value(&self) -> f32 {
        self.extrapolation_value
    }

    pub fn compute<T: Sample>(
        &self,
        image: &Tensor<T>,
        boxes: &Tensor<f32>,
        box_index: &Tensor<i32>,
        crop_size: &Tensor<i32>,
    ) -> Result<Tensor<f32>> {
        let plan = self.plan(image, boxes, box_index, crop_size)?;
        check_box_index(box_index.data(), plan.image.batch)?;
        Ok(self.run(&plan, image.data(), boxes.data(), box_index.data()))
    }

    /// Checks shapes now and runs compute according to `execution`; `done` receives
    /// the crops or the first failure.
    pub fn compute_async<T, F>(&self, execution: &Execution, inputs: CropInputs<T>, done: F)
    where
        T: Sample + 'static,
        F: FnOnce(Result<Tensor<f32>>) + Send + 'static,
    {
        let done = Completion::new(done);
        let plan = match self.plan(
            &inputs.image,
            &inputs.boxes,
            &inputs.box_index,
            &inputs.crop_size,
        ) {
            Ok(plan) => plan,
            Err(e) => return done.finish(Err(e)),
        };

        let op = self.clone();
        let box_index = Arc::clone(&inputs.box_index);
        run_if_box_index_valid(
            execution,
            box_index,
            plan.image.batch,
            move || {
                Ok(op.run(
                    &plan,
                    inputs.image.data(),
                    inputs.boxes.data(),
                    inputs.box_index.data(),
                ))
            },
            done,
        );
    }

    /// Validates box indices on the rayon pool and computes on `handle`'s runtime.
    pub async fn compute_deferred<T: Sample + 'static>(
        &self,
        handle: Handle,
        inputs: CropInputs<T>,
    ) -> Result<Tensor<f32>> {
        let (done, rx) = done_channel();
        self.compute_async(&Execution::Deferred(handle), inputs, done);
        receive(rx).await
    }

    fn plan<T>(
        &self,
        image: &Tensor<T>,
        boxes: &Tensor<f32>,
        box_index: &Tensor<i32>,
        crop_size: &Tensor<i32>,
    ) -> Result<CropPlan> {
        let rank = self.rank;
        let image_layout = parse_source(rank, image)?;
        let num_boxes = parse_box_sizes(rank, boxes, box_index)?;
        let crop = parse_crop_size(rank, crop_size)?;

        let crops = match rank {
            Rank::Two => Volume::image(num_boxes, crop[0], crop[1], image_layout.channels),
            Rank::Three => {
                Volume::volume(num_boxes, crop[0], crop[1], crop[2], image_layout.channels)
            }
        };
        output_len::<f32>("crops", &crops.shape(rank == Rank::Three))?;

        tracing::debug!(
            ?rank,
            image = %image.shape_string(),
            num_boxes,
            ?crop,
            "CropAndResize"
        );

        Ok(CropPlan {
            image: image_layout,
            crops,
        })
    }

    fn run<T: Sample>(
        &self,
        plan: &CropPlan,
        image: &[T],
        boxes: &[f32],
        box_index: &[i32],
    ) -> Tensor<f32> {
        let mut crops = Tensor::zeros(plan.crops.shape(self.rank == Rank::Three));
        let kernel = match self.rank {
            Rank::Two => crop_and_resize_2d::<T>,
            Rank::Three => crop_and_resize_3d::<T>,
        };
        kernel(
            &self.scheduler,
            image,
            &plan.image,
            boxes,
            box_index,
            self.extrapolation_value,
            crops.data_mut(),
            &plan.crops,
        );
        crops
    }
}
