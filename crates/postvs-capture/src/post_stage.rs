//! Captures the output of the last geometry/tessellation stage for one action.
//!
//! Unlike vertex-shader output, the amount of data these stages produce can't be derived from the
//! draw parameters. A statistics query pass measures it first. For instanced draws the output of
//! each instance is found by replaying the draw with 1, 2, ... N instances, each writing its
//! filled-size counter into its own slot, and taking the differences.

use crate::align_up;
use crate::cache::{instance_outputs_from_counters, StageOutputRecord};
use crate::device::{
    CaptureDevice, CommandList, GpuCmd, GraphicsPipelineDesc, PipelineId, ShaderStageDesc,
    StreamOutStatistics,
};
use crate::error::{CaptureError, DeviceError, DeviceErrorCode};
use crate::pipeline_patch::post_stage_capture_pipeline;
use crate::projection::{estimate_planes, ProjectionPlanes};
use crate::session::CaptureSession;
use crate::so_decl::StreamOutLayout;

/// Worst-case vertices per primitive once strips are expanded.
const VERTICES_PER_PRIMITIVE: u64 = 3;

const COUNTER_BYTES: u64 = 8;

const STATISTICS_SLOT: u32 = 0;

pub(crate) fn capture_post_stage<D: CaptureDevice>(
    session: &mut CaptureSession<'_, D>,
    pipeline: &GraphicsPipelineDesc,
    last_stage: &ShaderStageDesc,
) -> Result<StageOutputRecord, CaptureError> {
    // Only stream 0 of a multi-stream geometry shader is captured.
    let layout = StreamOutLayout::build(&last_stage.reflection.output_signature, Some(0));
    if layout.is_empty() {
        return Err(CaptureError::NoPostStageOutput);
    }

    let desc = post_stage_capture_pipeline(pipeline, &layout, session.root_signature);
    let patched = session
        .device
        .create_pipeline(&desc)
        .map_err(CaptureError::PipelineCreation)?;

    let result = run(session, patched, last_stage, &layout);
    session.device.release_pipeline(patched);
    result
}

fn run<D: CaptureDevice>(
    session: &mut CaptureSession<'_, D>,
    patched: PipelineId,
    last_stage: &ShaderStageDesc,
    layout: &StreamOutLayout,
) -> Result<StageOutputRecord, CaptureError> {
    let action = session.action;
    let config = session.config;
    let stride = layout.stride;
    let instanced = action.num_instances > 1;

    // The vertex stage may not have needed the scratch buffers at all.
    session
        .ensure_scratch(config.counter_bytes)
        .map_err(|e| CaptureError::PostStageOutOfMemory { bytes: e.bytes })?;

    let data_offset = if instanced {
        capture_instances(session, patched, stride)?
    } else {
        capture_single(session, patched, stride)?
    };

    let mut list = CommandList::new();
    session.scratch.record_readback_and_reset(&mut list);
    session.submit(list).map_err(CaptureError::Submit)?;

    let counter_count = if instanced {
        action.num_instances as usize
    } else {
        1
    };
    let counters = session
        .read_counters(counter_count)
        .ok_or(CaptureError::PostStageReadback)?;

    let (instances, bytes_written) = if instanced {
        instance_outputs_from_counters(&counters, stride)
    } else {
        (Vec::new(), counters.first().copied().unwrap_or(0))
    };
    if bytes_written == 0 {
        return Err(CaptureError::NoPostStageOutput);
    }
    let bytes_written = bytes_written.min(session.data_capacity(data_offset));

    let data = session
        .read_staging(data_offset, bytes_written)
        .ok_or(CaptureError::PostStageReadback)?;
    let num_verts = bytes_written / u64::from(stride);

    let planes = if layout.has_position() {
        estimate_planes(&data, stride, num_verts, config.projection_epsilon)
    } else {
        ProjectionPlanes::default()
    };

    let vertex_buffer = session
        .upload(format!("postvs post-stage output for {}", session.event_id), &data)
        .map_err(|err| {
            tracing::error!(
                event_id = session.event_id,
                "failed to store geometry/tessellation output: {err}"
            );
            CaptureError::PostStageOutOfMemory {
                bytes: bytes_written,
            }
        })?;

    let mut record = StageOutputRecord {
        vertex_buffer: Some(vertex_buffer),
        vertex_stride: stride,
        near_plane: planes.near,
        far_plane: planes.far,
        // Stream-out always writes strips out as lists.
        topology: last_stage.reflection.output_topology.strip_to_list(),
        num_verts: num_verts as u32,
        instances,
        has_position: layout.has_position(),
        uses_indices: false,
        ..StageOutputRecord::default()
    };

    if action.is_instanced() {
        let divisor = action.num_instances.max(1);
        record.instance_stride = (bytes_written / u64::from(divisor)) as u32;
        record.num_verts /= divisor;
    }

    Ok(record)
}

/// Single-instance capture: query passes double as the capture draw. Whenever the query reports
/// more output than fits, the scratch buffers grow and the pass is repeated.
///
/// Returns the offset of the vertex data in the output buffer.
fn capture_single<D: CaptureDevice>(
    session: &mut CaptureSession<'_, D>,
    patched: PipelineId,
    stride: u32,
) -> Result<u64, CaptureError> {
    let config = session.config;
    let mut required = 0;

    for attempt in 0..config.statistics_query_attempts.max(1) {
        let stats = statistics_pass(session, patched)?;
        required = primitive_storage_bytes(stats.primitives_storage_needed, stride);

        if required <= session.scratch.capacity() {
            return Ok(config.counter_bytes);
        }

        tracing::debug!(
            event_id = session.event_id,
            attempt,
            required,
            "post-stage output doesn't fit, growing"
        );
        session
            .ensure_scratch(required)
            .map_err(|e| CaptureError::PostStageOutOfMemory { bytes: e.bytes })?;
    }

    tracing::warn!(
        event_id = session.event_id,
        required,
        "post-stage output size didn't settle"
    );
    Err(CaptureError::PostStageOutOfMemory { bytes: required })
}

/// Instanced capture: one draw per instance count, each with its own counter slot.
///
/// Returns the offset of the vertex data in the output buffer.
fn capture_instances<D: CaptureDevice>(
    session: &mut CaptureSession<'_, D>,
    patched: PipelineId,
    stride: u32,
) -> Result<u64, CaptureError> {
    let config = session.config;
    let num_instances = session.action.num_instances;

    let stats = statistics_pass(session, patched)?;

    let counter_region = align_up(
        u64::from(num_instances) * COUNTER_BYTES,
        config.counter_bytes.max(COUNTER_BYTES),
    );
    let output_bytes = primitive_storage_bytes(stats.primitives_storage_needed, stride);
    let required = counter_region.saturating_add(output_bytes);
    session
        .ensure_scratch(required)
        .map_err(|e| CaptureError::PostStageOutOfMemory { bytes: e.bytes })?;

    let flush_interval = config.flush_interval();

    // The statistics pass already wrote into the first counter.
    let mut list = CommandList::new();
    session.scratch.record_clear(&mut list);
    session.bind_patched(&mut list, patched);

    for inst in 1..=num_instances {
        let counter_offset = u64::from(inst - 1) * COUNTER_BYTES;
        session.bind_stream_out(&mut list, counter_offset, counter_region);
        session.record_original_draw(&mut list, inst);

        if inst % flush_interval == 0 && inst < num_instances {
            let full = std::mem::take(&mut list);
            session.submit(full).map_err(CaptureError::Submit)?;
            session.bind_patched(&mut list, patched);
        }
    }

    session.submit(list).map_err(CaptureError::Submit)?;
    Ok(counter_region)
}

/// Bytes needed for `primitives` full primitives of `stride`-byte vertices.
///
/// The count comes from the GPU, so the product saturates rather than wrapping; a saturated size
/// is then refused by the scratch clamp.
fn primitive_storage_bytes(primitives: u64, stride: u32) -> u64 {
    primitives
        .saturating_mul(VERTICES_PER_PRIMITIVE)
        .saturating_mul(u64::from(stride))
}

/// Runs the unmodified draw with stream-out statistics enabled and returns the result.
fn statistics_pass<D: CaptureDevice>(
    session: &mut CaptureSession<'_, D>,
    patched: PipelineId,
) -> Result<StreamOutStatistics, CaptureError> {
    let config = session.config;
    let Some(buffers) = session.scratch.buffers() else {
        return Err(CaptureError::PostStageOutOfMemory { bytes: 0 });
    };

    let mut list = CommandList::new();
    session.scratch.record_clear(&mut list);
    session.bind_patched(&mut list, patched);
    session.bind_stream_out(&mut list, 0, config.counter_bytes);
    list.push(GpuCmd::BeginQuery {
        heap: buffers.query_heap,
        slot: STATISTICS_SLOT,
    });
    session.record_original_draw(&mut list, session.action.num_instances);
    list.push(GpuCmd::EndQuery {
        heap: buffers.query_heap,
        slot: STATISTICS_SLOT,
    });
    list.push(GpuCmd::ResolveQuery {
        heap: buffers.query_heap,
        slot: STATISTICS_SLOT,
        dst: buffers.staging,
        dst_offset: 0,
    });
    session.submit(list).map_err(CaptureError::Submit)?;

    let bytes = session
        .device
        .read_buffer(buffers.staging, 0, StreamOutStatistics::SIZE as u64)
        .map_err(CaptureError::Statistics)?;
    StreamOutStatistics::from_bytes(&bytes).ok_or_else(|| {
        CaptureError::Statistics(DeviceError::new(
            DeviceErrorCode::InvalidArgument,
            "resolved query data is truncated",
        ))
    })
}
