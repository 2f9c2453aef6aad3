//! The shared stream-out scratch buffers.
//!
//! One set of buffers is shared by every capture: the stream-out target (counters followed by
//! vertex data), a CPU-readable mirror of it, an upload buffer for compacted index lists and a
//! statistics query heap. All four are sized from a single high-water mark that only grows, and
//! are recreated together whenever a capture needs more room.

use crate::config::PostVsConfig;
use crate::device::{
    BufferDesc, BufferId, CaptureDevice, CommandList, GpuCmd, HeapKind, QueryHeapId, ResourceState,
    StreamOutTarget,
};
use crate::error::DeviceError;
use crate::stats::CaptureStats;

/// Bytes reserved per vertex in the index upload buffer: the worst case is one unique `float4`
/// vertex per index.
const INDEX_UPLOAD_DIVISOR: u64 = 16;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct ScratchBuffers {
    pub(crate) output: BufferId,
    pub(crate) staging: BufferId,
    pub(crate) index_upload: BufferId,
    pub(crate) query_heap: QueryHeapId,
}

/// Scratch (re)allocation failed; `bytes` is the capacity that was attempted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct ScratchExhausted {
    pub(crate) bytes: u64,
}

#[derive(Debug)]
pub(crate) struct ScratchBufferSet {
    capacity: u64,
    buffers: Option<ScratchBuffers>,
    /// State the output buffer is left in by the most recently recorded commands.
    output_state: ResourceState,
}

impl Default for ScratchBufferSet {
    fn default() -> Self {
        Self::new()
    }
}

impl ScratchBufferSet {
    pub(crate) fn new() -> Self {
        Self {
            capacity: 0,
            buffers: None,
            output_state: ResourceState::Common,
        }
    }

    pub(crate) fn capacity(&self) -> u64 {
        self.capacity
    }

    pub(crate) fn buffers(&self) -> Option<ScratchBuffers> {
        self.buffers
    }

    /// Makes sure the set can hold `required` bytes, recreating every buffer if it can't.
    ///
    /// The GPU is drained before the old buffers are released. On failure the capacity drops to
    /// 0 and the next call starts over from the initial size.
    pub(crate) fn ensure_capacity<D: CaptureDevice>(
        &mut self,
        device: &mut D,
        config: &PostVsConfig,
        stats: &CaptureStats,
        required: u64,
    ) -> Result<ScratchBuffers, ScratchExhausted> {
        if let Some(buffers) = self.buffers {
            if required <= self.capacity {
                return Ok(buffers);
            }
        }

        let old_size = self.capacity;
        let new_size = config.growth_size(old_size, required);
        tracing::warn!(old_size, new_size, "resizing stream-out buffers");

        device.sync();
        self.release(device);
        stats.inc_scratch_reallocations();

        if new_size >= config.max_scratch_bytes {
            tracing::error!(
                new_size,
                "stream-out buffer size is close to or over 4GB, out of memory very likely so skipping"
            );
            self.capacity = 0;
            stats.inc_allocation_failures();
            return Err(ScratchExhausted { bytes: new_size });
        }

        match Self::allocate(device, config, new_size) {
            Ok(buffers) => {
                self.capacity = new_size;
                self.buffers = Some(buffers);
                self.output_state = ResourceState::Common;
                Ok(buffers)
            }
            Err(err) => {
                tracing::error!(new_size, "failed to create stream-out buffers: {err}");
                self.capacity = 0;
                stats.inc_allocation_failures();
                Err(ScratchExhausted { bytes: new_size })
            }
        }
    }

    fn allocate<D: CaptureDevice>(
        device: &mut D,
        config: &PostVsConfig,
        capacity: u64,
    ) -> Result<ScratchBuffers, DeviceError> {
        let output_size = capacity + config.counter_bytes;

        let output = device.create_buffer(&BufferDesc {
            label: "postvs stream-out".into(),
            size: output_size,
            heap: HeapKind::DeviceLocal,
            allow_unordered_access: true,
        })?;

        let staging = match device.create_buffer(&BufferDesc {
            label: "postvs staging".into(),
            size: output_size,
            heap: HeapKind::Readback,
            allow_unordered_access: false,
        }) {
            Ok(buffer) => buffer,
            Err(err) => {
                device.release_buffer(output);
                return Err(err);
            }
        };

        let index_upload = match device.create_buffer(&BufferDesc {
            label: "postvs compact indices".into(),
            size: capacity / INDEX_UPLOAD_DIVISOR,
            heap: HeapKind::Upload,
            allow_unordered_access: false,
        }) {
            Ok(buffer) => buffer,
            Err(err) => {
                device.release_buffer(staging);
                device.release_buffer(output);
                return Err(err);
            }
        };

        let query_heap = match device.create_query_heap(config.query_slots) {
            Ok(heap) => heap,
            Err(err) => {
                device.release_buffer(index_upload);
                device.release_buffer(staging);
                device.release_buffer(output);
                return Err(err);
            }
        };

        Ok(ScratchBuffers {
            output,
            staging,
            index_upload,
            query_heap,
        })
    }

    /// Releases every buffer. The capacity is kept so a later allocation resumes at the same size.
    pub(crate) fn release<D: CaptureDevice>(&mut self, device: &mut D) {
        if let Some(buffers) = self.buffers.take() {
            device.release_buffer(buffers.output);
            device.release_buffer(buffers.staging);
            device.release_buffer(buffers.index_upload);
            device.release_query_heap(buffers.query_heap);
        }
        self.output_state = ResourceState::Common;
    }

    /// Records a transition of the output buffer into `after`, if it isn't there already.
    pub(crate) fn transition_output(&mut self, list: &mut CommandList, after: ResourceState) {
        let Some(buffers) = self.buffers else {
            return;
        };
        if self.output_state != after {
            list.push(GpuCmd::Barrier {
                buffer: buffers.output,
                before: self.output_state,
                after,
            });
            self.output_state = after;
        }
    }

    /// Stream-out target writing its counter at `filled_size_offset` and vertex data from
    /// `data_offset` to the end of the output buffer.
    pub(crate) fn stream_out_target(
        &self,
        config: &PostVsConfig,
        filled_size_offset: u64,
        data_offset: u64,
    ) -> Option<StreamOutTarget> {
        let buffers = self.buffers?;
        let size = (self.capacity + config.counter_bytes).saturating_sub(data_offset);
        Some(StreamOutTarget {
            buffer: buffers.output,
            filled_size_offset,
            data_offset,
            size,
        })
    }

    /// Records the copy into the staging buffer followed by the counter reset that leaves the
    /// output buffer ready for the next capture.
    pub(crate) fn record_readback_and_reset(&mut self, list: &mut CommandList) {
        let Some(buffers) = self.buffers else {
            return;
        };
        self.transition_output(list, ResourceState::CopySource);
        list.push(GpuCmd::CopyBuffer {
            dst: buffers.staging,
            src: buffers.output,
        });
        list.push(GpuCmd::Discard(buffers.output));
        self.transition_output(list, ResourceState::UnorderedAccess);
        list.push(GpuCmd::ClearUnorderedAccess(buffers.output));
    }

    /// Records a counter reset, from whichever state the output buffer was last left in.
    pub(crate) fn record_clear(&mut self, list: &mut CommandList) {
        let Some(buffers) = self.buffers else {
            return;
        };
        self.transition_output(list, ResourceState::UnorderedAccess);
        list.push(GpuCmd::ClearUnorderedAccess(buffers.output));
    }
}
