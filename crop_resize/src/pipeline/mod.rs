//! Validation-gated execution of an op's compute stage.
//!
//! [`run_if_box_index_valid`] is the only way past box index validation: compute
//! starts after the check succeeds, and the [`Completion`] fires exactly once
//! afterwards with the compute result or the recorded failure.


use std::sync::Arc;

use tokio::runtime::Handle;

use crate::error::{Error, Result};
use crate::tensor::Tensor;
use crate::validate::{await_box_index_valid, check_box_index, launch_box_index_check};

/// How an op validates its box indices and where compute runs.
#[derive(Debug, Clone, Default)]
pub enum Execution {
    /// Scan indices, compute and complete on the calling thread.
    #[default]
    Immediate,
    /// Check indices on the rayon pool and continue on the given runtime once the
    /// validity flag arrives. The caller never blocks.
    Deferred(Handle),
}

type DoneFn<R> = Box<dyn FnOnce(Result<R>) + Send>;

/// One-shot completion callback.
///
/// Dropping an unfinished completion reports an `Internal` error, so the callback
/// runs exactly once even if the pipeline is torn down before it finishes.
pub struct Completion<R> {
    done: Option<DoneFn<R>>,
}

impl<R> Completion<R> {
    pub fn new(done: impl FnOnce(Result<R>) + Send + 'static) -> Self {
        Self {
            done: Some(Box::new(done)),
        }
    }

    pub fn finish(mut self, result: Result<R>) {
        if let Some(done) = self.done.take() {
            done(result);
        }
    }
}

impl<R> Drop for Completion<R> {
    fn drop(&mut self) {
        if let Some(done) = self.done.take() {
            done(Err(Error::Internal(
                "Op was dropped before completing".to_string(),
            )));
        }
    }
}

impl<R> std::fmt::Debug for Completion<R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Completion")
            .field("pending", &self.done.is_some())
            .finish()
    }
}

/// Runs `compute` only if every box index lies in `[0, batch_size)`, then finishes
/// `done`.
pub fn run_if_box_index_valid<R, C>(
    execution: &Execution,
    box_index: Arc<Tensor<i32>>,
    batch_size: usize,
    compute: C,
    done: Completion<R>,
) where
    R: Send + 'static,
    C: FnOnce() -> Result<R> + Send + 'static,
{
    match execution {
        Execution::Immediate => {
            let result = check_box_index(box_index.data(), batch_size).and_then(|()| compute());
            done.finish(result);
        }
        Execution::Deferred(handle) => {
            if box_index.num_elements() == 0 {
                done.finish(compute());
                return;
            }

            let flag = launch_box_index_check(box_index, batch_size);
            handle.spawn(async move {
                let result = match await_box_index_valid(flag).await {
                    Ok(()) => run_compute(compute).await,
                    Err(e) => Err(e),
                };
                done.finish(result);
            });
        }
    }
}

/// Runs compute on the blocking pool so runtime workers stay free while rayon fans out.
async fn run_compute<R, C>(compute: C) -> Result<R>
where
    R: Send + 'static,
    C: FnOnce() -> Result<R> + Send + 'static,
{
    match tokio::task::spawn_blocking(compute).await {
        Ok(result) => result,
        Err(e) => {
            tracing::error!("Compute task failed: {}", e);
            Err(Error::Internal(format!("Compute task failed: {}", e)))
        }
    }
}
