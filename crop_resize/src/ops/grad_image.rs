use std::marker::PhantomData;
use std::sync::Arc;

use tokio::runtime::Handle;

use super::{
    done_channel, output_len, parse_box_sizes, parse_grads, parse_image_size, receive,
};
use crate::config::{OpAttrs, Rank};
use crate::error::{Error, Result};
use crate::grad_image::{crop_and_resize_grad_image_2d, crop_and_resize_grad_image_3d};
use crate::pipeline::{run_if_box_index_valid, Completion, Execution};
use crate::sample::GradSample;
use crate::schedule::WorkScheduler;
use crate::tensor::{Tensor, Volume};
use crate::validate::check_box_index;

/// Owned inputs of [`CropAndResizeGradImage`].
#[derive(Debug, Clone)]
pub struct GradImageInputs {
    /// Upstream gradient, shaped like the crops.
    pub grads: Arc<Tensor<f32>>,
    pub boxes: Arc<Tensor<f32>>,
    pub box_index: Arc<Tensor<i32>>,
    /// Shape of the source: 4 or 5 values.
    pub image_size: Arc<Tensor<i32>>,
}

impl GradImageInputs {
    pub fn new(
        grads: Tensor<f32>,
        boxes: Tensor<f32>,
        box_index: Tensor<i32>,
        image_size: Tensor<i32>,
    ) -> Self {
        Self {
            grads: Arc::new(grads),
            boxes: Arc::new(boxes),
            box_index: Arc::new(box_index),
            image_size: Arc::new(image_size),
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct GradImagePlan {
    grads: Volume,
    image: Volume,
}

/// Gradient of the crops w.r.t. the source, accumulated in `T` (`f32` or `f64`).
///
/// Output is shaped like the source described by `image_size`.
#[derive(Debug, Clone)]
pub struct CropAndResizeGradImage<T> {
    rank: Rank,
    scheduler: WorkScheduler,
    _output: PhantomData<fn() -> T>,
}

impl<T: GradSample + 'static> CropAndResizeGradImage<T> {
    pub fn new(rank: Rank, attrs: &OpAttrs) -> Result<Self> {
        attrs.validate(rank)?;
        Ok(Self {
            rank,
            scheduler: WorkScheduler::default(),
            _output: PhantomData,
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

    pub fn compute(
        &self,
        grads: &Tensor<f32>,
        boxes: &Tensor<f32>,
        box_index: &Tensor<i32>,
        image_size: &Tensor<i32>,
    ) -> Result<Tensor<T>> {
        let plan = self.plan(grads, boxes, box_index, image_size)?;
        check_box_index(box_index.data(), plan.image.batch)?;
        Ok(self.run(&plan, grads.data(), boxes.data(), box_index.data()))
    }

    pub fn compute_async<F>(&self, execution: &Execution, inputs: GradImageInputs, done: F)
    where
        F: FnOnce(Result<Tensor<T>>) + Send + 'static,
    {
        let done = Completion::new(done);
        let plan = match self.plan(
            &inputs.grads,
            &inputs.boxes,
            &inputs.box_index,
            &inputs.image_size,
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
                    inputs.grads.data(),
                    inputs.boxes.data(),
                    inputs.box_index.data(),
                ))
            },
            done,
        );
    }

    pub async fn compute_deferred(
        &self,
        handle: Handle,
        inputs: GradImageInputs,
    ) -> Result<Tensor<T>> {
        let (done, rx) = done_channel();
        self.compute_async(&Execution::Deferred(handle), inputs, done);
        receive(rx).await
    }

    fn plan(
        &self,
        grads: &Tensor<f32>,
        boxes: &Tensor<f32>,
        box_index: &Tensor<i32>,
        image_size: &Tensor<i32>,
    ) -> Result<GradImagePlan> {
        let rank = self.rank;
        let grads_layout = parse_grads(rank, grads)?;
        let num_boxes = parse_box_sizes(rank, boxes, box_index)?;
        if grads_layout.batch != num_boxes {
            return Err(Error::invalid("boxes and grads have incompatible shape"));
        }
        let image_layout = parse_image_size(rank, image_size)?;
        if grads_layout.channels != image_layout.channels {
            return Err(Error::invalid("image_size and grads are incompatible"));
        }
        output_len::<T>("image_size", &image_layout.shape(rank == Rank::Three))?;

        tracing::debug!(
            ?rank,
            grads = %grads.shape_string(),
            image_size = ?image_size.data(),
            "CropAndResizeGradImage"
        );

        Ok(GradImagePlan {
            grads: grads_layout,
            image: image_layout,
        })
    }

    fn run(
        &self,
        plan: &GradImagePlan,
        grads: &[f32],
        boxes: &[f32],
        box_index: &[i32],
    ) -> Tensor<T> {
        let mut output = Tensor::filled(plan.image.shape(self.rank == Rank::Three), T::zero());
        let kernel = match self.rank {
            Rank::Two => crop_and_resize_grad_image_2d::<T>,
            Rank::Three => crop_and_resize_grad_image_3d::<T>,
        };
        kernel(
            &self.scheduler,
            grads,
            &plan.grads,
            boxes,
            box_index,
            output.data_mut(),
            &plan.image,
        );
        output
    }
}
