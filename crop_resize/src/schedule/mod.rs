//! Cost-based partitioning of boxes across the rayon pool.
//!
//! Partitioning depends only on the per-box cost estimate, the box count and the
//! parallelism captured when the scheduler was built, never on the data itself.

#[cfg(test)]
mod tests;

use std::ops::Range;

use rayon::prelude::*;

use crate::validate::in_batch;

/// Multiplier for number of shards relative to CPU threads.
/// Using 2x threads provides good load balancing when some shards finish faster.
const CHUNKS_PER_THREAD: usize = 2;

/// Below this estimated cost a shard is not worth handing to another thread.
pub const DEFAULT_MIN_COST_PER_SHARD: f64 = 10_000.0;

const ADD_COST: f64 = 1.0;
const MUL_COST: f64 = 1.0;
const CAST_COST: f64 = 1.0;

/// Scalar operation counts of one crop cell, used to estimate per-box cost.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OpCounts {
    /// Additions per channel.
    pub adds: u32,
    /// Multiplications per channel.
    pub muls: u32,
    /// Source-to-f32 casts per channel.
    pub casts: u32,
    /// Additions per cell independent of channel count (index math).
    pub cell_adds: u32,
}

impl OpCounts {
    /// Estimated cost of one crop cell. Casts are free for `f32` sources.
    pub fn cell_cost(&self, channels: usize, needs_cast: bool) -> f64 {
        let cast = if needs_cast { CAST_COST } else { 0.0 };
        let per_channel =
            self.adds as f64 * ADD_COST + self.muls as f64 * MUL_COST + self.casts as f64 * cast;
        channels as f64 * per_channel + self.cell_adds as f64 * ADD_COST
    }

    /// Estimated cost of one box sampled on `cells` crop cells.
    pub fn box_cost(&self, cells: usize, channels: usize, needs_cast: bool) -> f64 {
        cells as f64 * self.cell_cost(channels, needs_cast)
    }
}

/// Splits box ranges into parallel shards of roughly equal estimated cost.
#[derive(Debug, Clone)]
pub struct WorkScheduler {
    max_parallelism: usize,
    min_cost_per_shard: f64,
}

impl Default for WorkScheduler {
    fn default() -> Self {
        Self::new(
            rayon::current_num_threads() * CHUNKS_PER_THREAD,
            DEFAULT_MIN_COST_PER_SHARD,
        )
    }
}

impl WorkScheduler {
    pub fn new(max_parallelism: usize, min_cost_per_shard: f64) -> Self {
        Self {
            max_parallelism: max_parallelism.max(1),
            min_cost_per_shard: min_cost_per_shard.max(f64::MIN_POSITIVE),
        }
    }

    /// Scheduler that always runs on the calling thread.
    pub fn serial() -> Self {
        Self::new(1, DEFAULT_MIN_COST_PER_SHARD)
    }

    #[inline]
    pub fn max_parallelism(&self) -> usize {
        self.max_parallelism
    }

    /// Number of consecutive items per shard.
    ///
    /// `num_shards = clamp(total_cost / min_cost_per_shard, 1, max_parallelism)`, and
    /// the block size is `ceil(num_items / num_shards)`.
    pub fn block_size(&self, num_items: usize, cost_per_item: f64) -> usize {
        if num_items == 0 || self.max_parallelism <= 1 {
            return num_items;
        }
        let total_cost = cost_per_item.max(0.0) * num_items as f64;
        let by_cost = (total_cost / self.min_cost_per_shard) as usize;
        let num_shards = by_cost.min(self.max_parallelism).min(num_items).max(1);
        num_items.div_ceil(num_shards)
    }

    /// Contiguous ranges covering `0..num_items`, one per shard.
    pub fn partition(&self, num_items: usize, cost_per_item: f64) -> Vec<Range<usize>> {
        if num_items == 0 {
            return Vec::new();
        }
        let block = self.block_size(num_items, cost_per_item);
        (0..num_items)
            .step_by(block)
            .map(|start| start..(start + block).min(num_items))
            .collect()
    }

    /// Calls `f(box, item)` for every `item_len`-sized item of `out`.
    ///
    /// Each box owns its item exclusively, so shards run in parallel without
    /// synchronization.
    pub fn for_each_box_mut<T, F>(&self, out: &mut [T], item_len: usize, cost_per_box: f64, f: F)
    where
        T: Send,
        F: Fn(usize, &mut [T]) + Sync + Send,
    {
        if item_len == 0 || out.is_empty() {
            return;
        }
        debug_assert_eq!(out.len() % item_len, 0);

        let num_boxes = out.len() / item_len;
        let block = self.block_size(num_boxes, cost_per_box);
        if block >= num_boxes {
            for (b, item) in out.chunks_mut(item_len).enumerate() {
                f(b, item);
            }
            return;
        }

        tracing::debug!(num_boxes, block, cost_per_box, "Sharding boxes");

        out.par_chunks_mut(block * item_len)
            .enumerate()
            .for_each(|(shard, chunk)| {
                let first = shard * block;
                for (i, item) in chunk.chunks_mut(item_len).enumerate() {
                    f(first + i, item);
                }
            });
    }

    /// Calls `f(boxes, item)` for every batch item of `out` that some box scatters into.
    ///
    /// `groups[i]` lists the boxes whose destination is batch item `i`, in box order.
    /// Items are disjoint, so groups run in parallel while boxes inside a group stay
    /// sequential; the result matches a plain loop over boxes bit for bit.
    pub fn for_each_destination_mut<T, F>(
        &self,
        out: &mut [T],
        item_len: usize,
        groups: &[Vec<usize>],
        cost_per_box: f64,
        f: F,
    ) where
        T: Send,
        F: Fn(&[usize], &mut [T]) + Sync + Send,
    {
        if item_len == 0 || out.is_empty() {
            return;
        }
        debug_assert_eq!(out.len(), groups.len() * item_len);

        let busy = groups.iter().filter(|g| !g.is_empty()).count();
        let num_boxes: usize = groups.iter().map(Vec::len).sum();
        let total_cost = cost_per_box.max(0.0) * num_boxes as f64;
        let parallel =
            self.max_parallelism > 1 && busy > 1 && total_cost > self.min_cost_per_shard;

        if !parallel {
            for (group, item) in groups.iter().zip(out.chunks_mut(item_len)) {
                if !group.is_empty() {
                    f(group, item);
                }
            }
            return;
        }

        tracing::debug!(num_boxes, destinations = busy, "Scattering per destination");

        out.par_chunks_mut(item_len)
            .zip(groups.par_iter())
            .for_each(|(item, group)| {
                if !group.is_empty() {
                    f(group, item);
                }
            });
    }
}

/// Groups box numbers by the batch item they reference, dropping invalid indices.
pub fn group_by_destination(box_index: &[i32], batch_size: usize) -> Vec<Vec<usize>> {
    let mut groups = vec![Vec::new(); batch_size];
    for (b, &index) in box_index.iter().enumerate() {
        if in_batch(index, batch_size) {
            groups[index as usize].push(b);
        }
    }
    groups
}
