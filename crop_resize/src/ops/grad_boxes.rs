use std::sync::Arc;

use tokio::runtime::Handle;

use super::{done_channel, parse_box_sizes, parse_grads, parse_source, receive};
use crate::config::{OpAttrs, Rank};
use crate::error::{Error, Result};
use crate::grad_boxes::{crop_and_resize_grad_boxes_2d, crop_and_resize_grad_boxes_3d};
use crate::pipeline::{run_if_box_index_valid, Completion, Execution};
use crate::sample::Sample;
use crate::schedule::WorkScheduler;
use crate::tensor::{Tensor, Volume};
use crate::validate::check_box_index;

/// Owned inputs of [`CropAndResizeGradBoxes`].
#[derive(Debug, Clone)]
pub struct GradBoxesInputs<T> {
    /// Upstream gradient, shaped like the crops.
    pub grads: Arc<Tensor<f32>>,
    pub image: Arc<Tensor<T>>,
    pub boxes: Arc<Tensor<f32>>,
    pub box_index: Arc<Tensor<i32>>,
}

impl<T> GradBoxesInputs<T> {
    pub fn new(
        grads: Tensor<f32>,
        image: Tensor<T>,
        boxes: Tensor<f32>,
        box_index: Tensor<i32>,
    ) -> Self {
        Self {
            grads: Arc::new(grads),
            image: Arc::new(image),
            boxes: Arc::new(boxes),
            box_index: Arc::new(box_index),
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct GradBoxesPlan {
    grads: Volume,
    image: Volume,
    num_boxes: usize,
}

/// Gradient of the crops w.r.t. the box coordinates.
///
/// Output: `(num_boxes, 4)` or `(num_boxes, 6)` as `f32`, columns matching the boxes.
#[derive(Debug, Clone)]
pub struct CropAndResizeGradBoxes {
    rank: Rank,
    scheduler: WorkScheduler,
}

impl CropAndResizeGradBoxes {
    pub fn new(rank: Rank, attrs: &OpAttrs) -> Result<Self> {
        attrs.validate(rank)?;
        Ok(Self {
            rank,
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

    pub fn compute<T: Sample>(
        &self,
        grads: &Tensor<f32>,
        image: &Tensor<T>,
        boxes: &Tensor<f32>,
        box_index: &Tensor<i32>,
    ) -> Result<Tensor<f32>> {
        let plan = self.plan(grads, image, boxes, box_index)?;
        check_box_index(box_index.data(), plan.image.batch)?;
        Ok(self.run(&plan, grads.data(), image.data(), boxes.data(), box_index.data()))
    }

    pub fn compute_async<T, F>(&self, execution: &Execution, inputs: GradBoxesInputs<T>, done: F)
    where
        T: Sample + 'static,
        F: FnOnce(Result<Tensor<f32>>) + Send + 'static,
    {
        let done = Completion::new(done);
        let plan = match self.plan(&inputs.grads, &inputs.image, &inputs.boxes, &inputs.box_index)
        {
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
                    inputs.image.data(),
                    inputs.boxes.data(),
                    inputs.box_index.data(),
                ))
            },
            done,
        );
    }

    pub async fn compute_deferred<T: Sample + 'static>(
        &self,
        handle: Handle,
        inputs: GradBoxesInputs<T>,
    ) -> Result<Tensor<f32>> {
        let (done, rx) = done_channel();
        self.compute_async(&Execution::Deferred(handle), inputs, done);
        receive(rx).await
    }

    fn plan<T>(
        &self,
        grads: &Tensor<f32>,
        image: &Tensor<T>,
        boxes: &Tensor<f32>,
        box_index: &Tensor<i32>,
    ) -> Result<GradBoxesPlan> {
        let rank = self.rank;
        let grads_layout = parse_grads(rank, grads)?;
        let image_layout = parse_source(rank, image)?;
        if image_layout.channels != grads_layout.channels {
            return Err(Error::invalid("image, grads depth differ"));
        }
        let num_boxes = parse_box_sizes(rank, boxes, box_index)?;
        if grads_layout.batch != num_boxes {
            return Err(Error::invalid("boxes and grads have incompatible shape"));
        }

        tracing::debug!(
            ?rank,
            grads = %grads.shape_string(),
            image = %image.shape_string(),
            "CropAndResizeGradBoxes"
        );

        Ok(GradBoxesPlan {
            grads: grads_layout,
            image: image_layout,
            num_boxes,
        })
    }

    fn run<T: Sample>(
        &self,
        plan: &GradBoxesPlan,
        grads: &[f32],
        image: &[T],
        boxes: &[f32],
        box_index: &[i32],
    ) -> Tensor<f32> {
        let mut output = Tensor::zeros(vec![plan.num_boxes, self.rank.box_columns()]);
        let kernel = match self.rank {
            Rank::Two => crop_and_resize_grad_boxes_2d::<T>,
            Rank::Three => crop_and_resize_grad_boxes_3d::<T>,
        };
        kernel(
            &self.scheduler,
            grads,
            &plan.grads,
            image,
            &plan.image,
            boxes,
            box_index,
            output.data_mut(),
        );
        output
    }
}
