//! Captures raw vertex-shader output for one action.

use crate::action::IndexWidth;
use crate::cache::StageOutputRecord;
use crate::device::{
    CaptureDevice, CommandList, GpuCmd, GraphicsPipelineDesc, IndexBufferView, PipelineId,
    ShaderStageDesc,
};
use crate::error::CaptureError;
use crate::index_remap::{decode_indices, IndexCompaction};
use crate::pipeline_patch::vertex_capture_pipeline;
use crate::projection::{estimate_planes, ProjectionPlanes};
use crate::session::CaptureSession;
use crate::so_decl::StreamOutLayout;
use crate::topology::PrimitiveTopology;

/// Bytes reserved per unique index when sizing an indexed capture: a `u32` index times a
/// `float4` vertex.
const BYTES_PER_UNIQUE_INDEX: u64 = 4 * 16;

/// Original index data rewritten to address the compacted vertices.
struct RewrittenIndices {
    bytes: Vec<u8>,
    width: IndexWidth,
}

pub(crate) fn capture_vertex_stage<D: CaptureDevice>(
    session: &mut CaptureSession<'_, D>,
    pipeline: &GraphicsPipelineDesc,
    vs: &ShaderStageDesc,
) -> Result<StageOutputRecord, CaptureError> {
    let layout = StreamOutLayout::build(&vs.reflection.output_signature, None);
    if layout.is_empty() {
        tracing::debug!(event_id = session.event_id, "vertex shader has no outputs");
        return Ok(StageOutputRecord {
            topology: session.state.topology,
            near_plane: 0.0,
            far_plane: 0.0,
            ..StageOutputRecord::default()
        });
    }

    let desc = vertex_capture_pipeline(pipeline, &layout, session.root_signature);
    let patched = session
        .device
        .create_pipeline(&desc)
        .map_err(CaptureError::PipelineCreation)?;

    let result = run(session, patched, pipeline, &layout);
    session.device.release_pipeline(patched);
    result
}

fn run<D: CaptureDevice>(
    session: &mut CaptureSession<'_, D>,
    patched: PipelineId,
    pipeline: &GraphicsPipelineDesc,
    layout: &StreamOutLayout,
) -> Result<StageOutputRecord, CaptureError> {
    let action = session.action;
    let config = session.config;
    let stride = layout.stride;

    // Saturates so an absurd draw is refused by the scratch clamp instead of wrapping.
    let mut required = u64::from(action.num_indices)
        .saturating_mul(u64::from(action.num_instances))
        .saturating_mul(u64::from(stride))
        .saturating_add(config.counter_bytes);

    let mut list = CommandList::new();
    let mut rewritten = None;

    if !action.is_indexed() {
        session
            .ensure_scratch(required)
            .map_err(|e| CaptureError::VertexOutOfMemory { bytes: e.bytes })?;

        session.bind_patched(&mut list, patched);
        session.bind_stream_out(&mut list, 0, config.counter_bytes);
        list.push(GpuCmd::SetPrimitiveTopology(PrimitiveTopology::PointList));
        list.push(GpuCmd::Draw {
            vertex_count: action.num_indices,
            instance_count: action.num_instances,
            first_vertex: action.vertex_offset,
            first_instance: action.instance_offset,
        });
    } else {
        let (mut raw, width) = read_original_indices(session);
        let indices = decode_indices(&raw, width, action.num_indices);
        let compaction = IndexCompaction::new(&indices, action.num_indices);
        tracing::debug!(
            event_id = session.event_id,
            read = compaction.read_count(),
            unique = compaction.unique_count(),
            "compacted index buffer"
        );

        required = required.max(u64::from(compaction.unique_count()) * BYTES_PER_UNIQUE_INDEX);
        let buffers = session
            .ensure_scratch(required)
            .map_err(|e| CaptureError::VertexOutOfMemory { bytes: e.bytes })?;

        let unique_bytes = compaction.unique_bytes();
        session
            .device
            .write_buffer(buffers.index_upload, 0, &unique_bytes)
            .map_err(CaptureError::Submit)?;

        session.bind_patched(&mut list, patched);
        list.push(GpuCmd::SetIndexBuffer(IndexBufferView {
            buffer: buffers.index_upload,
            offset: 0,
            size: unique_bytes.len() as u64,
            width: IndexWidth::U32,
        }));
        session.bind_stream_out(&mut list, 0, config.counter_bytes);
        list.push(GpuCmd::SetPrimitiveTopology(PrimitiveTopology::PointList));
        list.push(GpuCmd::DrawIndexed {
            index_count: compaction.unique_count(),
            instance_count: action.num_instances,
            first_index: 0,
            base_vertex: action.base_vertex,
            first_instance: action.instance_offset,
        });

        compaction.rewrite(&mut raw, width, pipeline.strip_cut.sentinel());
        if !raw.is_empty() {
            rewritten = Some(RewrittenIndices { bytes: raw, width });
        }
    }

    session.scratch.record_readback_and_reset(&mut list);
    session.submit(list).map_err(CaptureError::Submit)?;

    let bytes_written = session
        .read_counters(1)
        .and_then(|c| c.first().copied())
        .ok_or(CaptureError::VertexReadback)?;
    if bytes_written == 0 {
        return Err(CaptureError::NoVertexData);
    }
    let bytes_written = bytes_written.min(session.data_capacity(config.counter_bytes));

    let data = session
        .read_staging(config.counter_bytes, bytes_written)
        .ok_or(CaptureError::VertexReadback)?;
    let num_prims = bytes_written / u64::from(stride);

    let planes = if layout.has_position() {
        estimate_planes(&data, stride, num_prims, config.projection_epsilon)
    } else {
        ProjectionPlanes::default()
    };

    let vertex_buffer = session
        .upload(format!("postvs vertex output for {}", session.event_id), &data)
        .map_err(|err| {
            tracing::error!(event_id = session.event_id, "failed to store vertex output: {err}");
            CaptureError::VertexOutOfMemory {
                bytes: bytes_written,
            }
        })?;

    let mut record = StageOutputRecord {
        vertex_buffer: Some(vertex_buffer),
        vertex_stride: stride,
        near_plane: planes.near,
        far_plane: planes.far,
        topology: session.state.topology,
        num_verts: action.num_indices,
        has_position: layout.has_position(),
        uses_indices: action.is_indexed(),
        ..StageOutputRecord::default()
    };

    if action.is_instanced() {
        record.instance_stride = (bytes_written / u64::from(action.num_instances.max(1))) as u32;
    }

    if let Some(indices) = rewritten {
        let label = format!("postvs index buffer for {}", session.event_id);
        match session.upload(label, &indices.bytes) {
            Ok(buffer) => {
                record.index_buffer = Some(buffer);
                record.index_width = indices.width;
            }
            Err(err) => {
                tracing::error!(event_id = session.event_id, "failed to store index buffer: {err}");
                session.device.release_buffer(vertex_buffer);
                return Err(CaptureError::VertexOutOfMemory {
                    bytes: indices.bytes.len() as u64,
                });
            }
        }
    }

    Ok(record)
}

/// Reads the indices the action would fetch, clamped to the bound index buffer.
///
/// A short read is not an error; the caller accounts for the missing indices.
fn read_original_indices<D: CaptureDevice>(
    session: &mut CaptureSession<'_, D>,
) -> (Vec<u8>, IndexWidth) {
    let action = session.action;
    let Some(binding) = session.state.index_buffer.filter(|ib| ib.size > 0) else {
        return (Vec::new(), action.index_width);
    };

    let width = u64::from(binding.width.bytes());
    let skip = u64::from(action.index_offset) * width;
    let len = (u64::from(action.num_indices) * width).min(binding.size.saturating_sub(skip));

    match session
        .device
        .read_buffer(binding.buffer, binding.offset.saturating_add(skip), len)
    {
        Ok(bytes) => (bytes, binding.width),
        Err(err) => {
            tracing::warn!(event_id = session.event_id, "failed to read index buffer: {err}");
            (Vec::new(), binding.width)
        }
    }
}
