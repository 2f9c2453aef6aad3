//! Tunables for the capture engine.

use crate::align_up;

/// Configuration for [`crate::PostVsCapture`].
///
/// The defaults match what desktop drivers handle comfortably. Tests typically shrink
/// `instance_flush_interval` to exercise the flush path with a handful of instances.
#[derive(Debug, Clone, PartialEq)]
pub struct PostVsConfig {
    /// Scratch capacity used the first time output has to be stored.
    pub initial_scratch_bytes: u64,
    /// Capacity doubles on growth until it reaches this size.
    pub exponential_growth_limit: u64,
    /// Past `exponential_growth_limit`, the required size is aligned up to this granularity
    /// instead of doubling.
    pub large_growth_alignment: u64,
    /// Scratch capacities at or above this size are refused without attempting the allocation.
    ///
    /// Allocations this close to 4 GiB fail on practically every driver, and some fail by
    /// removing the device instead of returning an error.
    pub max_scratch_bytes: u64,
    /// Bytes reserved at the start of the output buffer for the filled-size counter.
    pub counter_bytes: u64,
    /// Number of slots in the stream-out statistics query heap.
    pub query_slots: u32,
    /// Number of incremental instance draws recorded before the list is submitted and the GPU is
    /// drained.
    pub instance_flush_interval: u32,
    /// Upper bound on statistics query passes for a single-instance post-stage capture.
    pub statistics_query_attempts: u32,
    /// Minimum difference in `z` and `w` for two vertices to be used for near/far inference.
    pub projection_epsilon: f32,
}

impl Default for PostVsConfig {
    fn default() -> Self {
        Self {
            initial_scratch_bytes: 32 * 1024 * 1024,
            exponential_growth_limit: 256 * 1024 * 1024,
            large_growth_alignment: 16 * 1024 * 1024,
            max_scratch_bytes: 0xFFFF_0000,
            counter_bytes: 64,
            query_slots: 16,
            instance_flush_interval: 1000,
            statistics_query_attempts: 8,
            projection_epsilon: 0.01,
        }
    }
}

impl PostVsConfig {
    /// Returns the scratch capacity to allocate when `current` bytes are available but `required`
    /// are needed. Never returns less than `current`.
    pub fn growth_size(&self, current: u64, required: u64) -> u64 {
        let mut size = if current == 0 {
            self.initial_scratch_bytes.max(1)
        } else {
            current
        };

        while size < required && size < self.exponential_growth_limit {
            size = size.saturating_mul(2);
        }

        if size < required {
            size = align_up(required, self.large_growth_alignment.max(1));
        }

        size
    }

    pub(crate) fn flush_interval(&self) -> u32 {
        self.instance_flush_interval.max(1)
    }
}
