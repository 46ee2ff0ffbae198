//! Box index range checks.
//!
//! Two flavours with the same contract (success or one `OutOfRange` failure):
//!
//! - [`check_box_index`] scans on the calling thread and fails fast.
//! - [`launch_box_index_check`] runs a parallel reduction on the rayon pool and hands
//!   the resulting flag back through a one-shot channel; [`await_box_index_valid`]
//!   turns the received flag into the same `Result`.

#[cfg(test)]
mod tests;

use std::sync::Arc;

use rayon::prelude::*;
use tokio::sync::oneshot;

use crate::error::{Error, Result};
use crate::tensor::Tensor;

/// `0 <= index < batch_size`
#[inline]
pub fn in_batch(index: i32, batch_size: usize) -> bool {
    index >= 0 && (index as usize) < batch_size
}

/// Fails on the first index outside `[0, batch_size)`.
pub fn check_box_index(box_index: &[i32], batch_size: usize) -> Result<()> {
    match box_index.iter().position(|&b| !in_batch(b, batch_size)) {
        Some(position) => {
            tracing::warn!(
                position,
                value = box_index[position],
                batch_size,
                "Rejected box index"
            );
            Err(Error::box_index_out_of_range())
        }
        None => Ok(()),
    }
}

/// Parallel all-in-range reduction.
pub fn box_index_is_valid(box_index: &[i32], batch_size: usize) -> bool {
    box_index.par_iter().all(|&b| in_batch(b, batch_size))
}

/// Starts the range check on the rayon pool without blocking the caller.
///
/// The receiver yields the validity flag once the reduction has finished. If the
/// worker goes away without sending (e.g. it panicked), the receiver reports a
/// closed channel.
pub fn launch_box_index_check(
    box_index: Arc<Tensor<i32>>,
    batch_size: usize,
) -> oneshot::Receiver<bool> {
    let (tx, rx) = oneshot::channel();
    rayon::spawn(move || {
        let valid = box_index_is_valid(box_index.data(), batch_size);
        // The pipeline may have been torn down meanwhile; nothing to report to.
        let _ = tx.send(valid);
    });
    rx
}

/// Resolves a flag produced by [`launch_box_index_check`].
pub async fn await_box_index_valid(flag: oneshot::Receiver<bool>) -> Result<()> {
    match flag.await {
        Ok(true) => Ok(()),
        Ok(false) => {
            tracing::warn!("Deferred box index check failed");
            Err(Error::box_index_out_of_range())
        }
        Err(_) => Err(Error::Internal(
            "Failed to copy box_index validity flag back to host".to_string(),
        )),
    }
}
