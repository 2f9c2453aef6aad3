//! State shared by the passes of a single capture.

use std::sync::Arc;

use crate::action::CapturedAction;
use crate::config::PostVsConfig;
use crate::device::{
    BufferDesc, BufferId, CaptureDevice, CommandList, GpuCmd, HeapKind, PipelineId, RenderState,
    ResourceState, RootSignatureId,
};
use crate::error::DeviceError;
use crate::scratch::{ScratchBufferSet, ScratchBuffers, ScratchExhausted};
use crate::stats::CaptureStats;

pub(crate) struct CaptureSession<'a, D: CaptureDevice> {
    pub(crate) device: &'a mut D,
    pub(crate) scratch: &'a mut ScratchBufferSet,
    pub(crate) config: &'a PostVsConfig,
    pub(crate) stats: &'a CaptureStats,
    pub(crate) event_id: u32,
    pub(crate) action: CapturedAction,
    pub(crate) state: Arc<RenderState>,
    /// Stream-out enabled copy of the bound root signature, when one had to be created.
    pub(crate) root_signature: Option<RootSignatureId>,
}

impl<D: CaptureDevice> CaptureSession<'_, D> {
    pub(crate) fn ensure_scratch(
        &mut self,
        required: u64,
    ) -> Result<ScratchBuffers, ScratchExhausted> {
        self.scratch
            .ensure_capacity(&mut *self.device, self.config, self.stats, required)
    }

    /// Re-applies the replay's state, then swaps in the patched pipeline and root signature.
    pub(crate) fn bind_patched(&self, list: &mut CommandList, pipeline: PipelineId) {
        list.push(GpuCmd::ApplyRenderState(self.state.clone()));
        list.push(GpuCmd::SetPipeline(pipeline));
        if let Some(sig) = self.root_signature {
            list.push(GpuCmd::SetGraphicsRootSignature(sig));
            list.push(GpuCmd::ApplyGraphicsRootParameters);
        }
    }

    /// Points stream output at the scratch buffer: counter at `counter_offset`, vertex data from
    /// `data_offset`.
    pub(crate) fn bind_stream_out(
        &mut self,
        list: &mut CommandList,
        counter_offset: u64,
        data_offset: u64,
    ) {
        self.scratch.transition_output(list, ResourceState::StreamOut);
        if let Some(target) = self
            .scratch
            .stream_out_target(self.config, counter_offset, data_offset)
        {
            list.push(GpuCmd::SetStreamOutTarget(target));
        }
    }

    /// Records the action's own draw call with `instance_count` instances.
    pub(crate) fn record_original_draw(&self, list: &mut CommandList, instance_count: u32) {
        let action = &self.action;
        if action.is_indexed() {
            list.push(GpuCmd::DrawIndexed {
                index_count: action.num_indices,
                instance_count,
                first_index: action.index_offset,
                base_vertex: action.base_vertex,
                first_instance: action.instance_offset,
            });
        } else {
            list.push(GpuCmd::Draw {
                vertex_count: action.num_indices,
                instance_count,
                first_vertex: action.vertex_offset,
                first_instance: action.instance_offset,
            });
        }
    }

    /// Submits `list` and blocks until the GPU has finished it.
    pub(crate) fn submit(&mut self, list: CommandList) -> Result<(), DeviceError> {
        self.stats.add_stream_out_draws(list.draw_count() as u64);
        self.device.execute(list)?;
        self.stats.inc_submissions();
        self.device.sync();
        Ok(())
    }

    /// Copies `data` into a new upload buffer owned by the caller.
    pub(crate) fn upload(&mut self, label: String, data: &[u8]) -> Result<BufferId, DeviceError> {
        let buffer = self.device.create_buffer(&BufferDesc {
            label,
            size: data.len() as u64,
            heap: HeapKind::Upload,
            allow_unordered_access: false,
        })?;
        if let Err(err) = self.device.write_buffer(buffer, 0, data) {
            self.device.release_buffer(buffer);
            return Err(err);
        }
        Ok(buffer)
    }

    /// Reads `count` little-endian `u64` counters from the start of the staging buffer.
    pub(crate) fn read_counters(&mut self, count: usize) -> Option<Vec<u64>> {
        let bytes = self.read_staging(0, (count * 8) as u64)?;
        Some(
            bytes
                .chunks_exact(8)
                .map(|c| u64::from_le_bytes([c[0], c[1], c[2], c[3], c[4], c[5], c[6], c[7]]))
                .collect(),
        )
    }

    /// Reads `len` bytes of captured vertex data starting at `offset` in the staging buffer.
    pub(crate) fn read_staging(&mut self, offset: u64, len: u64) -> Option<Vec<u8>> {
        let staging = self.scratch.buffers()?.staging;
        match self.device.read_buffer(staging, offset, len) {
            Ok(bytes) if bytes.len() as u64 == len => Some(bytes),
            Ok(bytes) => {
                tracing::error!(
                    event_id = self.event_id,
                    "staging read returned {} of {len} bytes",
                    bytes.len()
                );
                None
            }
            Err(err) => {
                tracing::error!(event_id = self.event_id, "failed to map staging buffer: {err}");
                None
            }
        }
    }

    /// Size of the data region when vertex data starts at `data_offset`.
    pub(crate) fn data_capacity(&self, data_offset: u64) -> u64 {
        (self.scratch.capacity() + self.config.counter_bytes).saturating_sub(data_offset)
    }
}
