//! Shared helpers for `postvs-capture` integration tests.
//!
//! [`SoftDevice`] is a CPU model of the resource layer: it keeps buffer contents in memory,
//! validates barrier states and emulates stream-out for the patched pipelines the engine builds.
//! [`ScriptedReplayer`] plays back a fixed list of draws.

#![allow(dead_code)]

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Once};

use postvs_capture::device::{
    BoundPipeline, BoundRootSignature, BufferDesc, BufferId, CaptureDevice, CommandList, GpuCmd,
    GraphicsPipelineDesc, HeapKind, IndexBufferBinding, PipelineDesc, PipelineId, QueryHeapId,
    RenderState, ResourceState, RootSignatureDesc, RootSignatureFlags, RootSignatureId,
    ShaderStageDesc, StreamOutStatistics, StreamOutTarget,
};
use postvs_capture::replay::{ActionCallback, DrawContext, ReplayMode, Replayer};
use postvs_capture::signature::{OutputElement, ShaderReflection};
use postvs_capture::{
    ActionFlags, CapturedAction, DeviceError, DeviceErrorCode, IndexWidth, PrimitiveTopology,
    PrimitiveTopologyType,
};

/// Installs a test-writer `tracing` subscriber once per test binary.
pub fn init_tracing() {
    static INIT: Once = Once::new();
    INIT.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_max_level(tracing::Level::DEBUG)
            .with_test_writer()
            .try_init();
    });
}

/// Id of the application pipeline in scripted render states. Never created on the device.
pub const APP_PIPELINE: PipelineId = PipelineId(0xA99);
pub const APP_ROOT_SIGNATURE: RootSignatureId = RootSignatureId(0xA98);

pub type PositionFn = fn(vertex: u32, instance: u32) -> [f32; 4];

/// Position written for vertex `vertex` of instance `instance` when nothing else is configured.
pub fn default_position(vertex: u32, instance: u32) -> [f32; 4] {
    [vertex as f32, instance as f32, 0.5, 1.0]
}

struct SoftBuffer {
    desc: BufferDesc,
    data: Vec<u8>,
    state: ResourceState,
}

#[derive(Default, Clone, Copy)]
struct ActiveQuery {
    heap: u64,
    slot: u32,
    stats: StreamOutStatistics,
}

/// Bindings of the command list being executed. Every submitted list starts from scratch.
#[derive(Default)]
struct Bindings {
    pipeline: Option<PipelineId>,
    index_buffer: Option<(BufferId, u64, IndexWidth)>,
    stream_out: Option<StreamOutTarget>,
    topology: PrimitiveTopology,
}

/// In-memory [`CaptureDevice`] with stream-out emulation.
pub struct SoftDevice {
    next_id: u64,
    buffers: HashMap<BufferId, SoftBuffer>,
    query_heaps: HashMap<u64, Vec<StreamOutStatistics>>,
    pipelines: HashMap<PipelineId, GraphicsPipelineDesc>,
    root_signatures: HashMap<RootSignatureId, RootSignatureDesc>,
    active_query: Option<ActiveQuery>,

    /// Clip-space position emitted for each vertex.
    pub position: PositionFn,
    /// Vertices a geometry shader emits for one instance.
    pub gs_vertices: fn(instance: u32) -> u32,
    /// Replaces the primitive storage the statistics query reports.
    pub reported_storage: Option<u64>,

    /// Buffer creation fails with `E_OUTOFMEMORY` for sizes at or above this.
    pub fail_buffers_from: Option<u64>,
    /// Buffer creation fails for labels starting with any of these.
    pub fail_labels: Vec<String>,
    pub fail_pipelines: bool,
    pub fail_root_signatures: bool,

    pub executes: usize,
    pub syncs: usize,
    pub draws: usize,
    /// Draw count of each executed list, in order.
    pub draws_per_execute: Vec<usize>,
    pub buffers_created: usize,
    pub pipelines_created: Vec<GraphicsPipelineDesc>,
    pub root_signatures_created: Vec<RootSignatureDesc>,
    pub barrier_mismatches: usize,
    pub oom_tolerant: bool,
    pub oom_history: Vec<bool>,
}

impl Default for SoftDevice {
    fn default() -> Self {
        Self {
            next_id: 1,
            buffers: HashMap::new(),
            query_heaps: HashMap::new(),
            pipelines: HashMap::new(),
            root_signatures: HashMap::new(),
            active_query: None,
            position: default_position,
            gs_vertices: |_| 3,
            reported_storage: None,
            fail_buffers_from: None,
            fail_labels: Vec::new(),
            fail_pipelines: false,
            fail_root_signatures: false,
            executes: 0,
            syncs: 0,
            draws: 0,
            draws_per_execute: Vec::new(),
            buffers_created: 0,
            pipelines_created: Vec::new(),
            root_signatures_created: Vec::new(),
            barrier_mismatches: 0,
            oom_tolerant: false,
            oom_history: Vec::new(),
        }
    }
}

impl SoftDevice {
    pub fn new() -> Self {
        Self::default()
    }

    fn alloc_id(&mut self) -> u64 {
        let id = self.next_id;
        self.next_id += 1;
        id
    }

    /// Creates a CPU-writable buffer holding `data`, as an application index buffer would be.
    pub fn create_index_buffer(&mut self, data: &[u8]) -> BufferId {
        let id = BufferId(self.alloc_id());
        self.buffers.insert(
            id,
            SoftBuffer {
                desc: BufferDesc {
                    label: "app index buffer".into(),
                    size: data.len() as u64,
                    heap: HeapKind::Upload,
                    allow_unordered_access: false,
                },
                data: data.to_vec(),
                state: ResourceState::GenericRead,
            },
        );
        id
    }

    pub fn buffer_contents(&self, buffer: BufferId) -> Option<&[u8]> {
        self.buffers.get(&buffer).map(|b| b.data.as_slice())
    }

    pub fn buffer_label(&self, buffer: BufferId) -> Option<&str> {
        self.buffers.get(&buffer).map(|b| b.desc.label.as_str())
    }

    pub fn live_buffers(&self) -> usize {
        self.buffers.len()
    }

    pub fn live_query_heaps(&self) -> usize {
        self.query_heaps.len()
    }

    pub fn live_pipelines(&self) -> usize {
        self.pipelines.len()
    }

    pub fn live_root_signatures(&self) -> usize {
        self.root_signatures.len()
    }

    fn transition(&mut self, buffer: BufferId, before: ResourceState, after: ResourceState) {
        match self.buffers.get_mut(&buffer) {
            Some(b) if b.state == before => b.state = after,
            Some(b) => {
                self.barrier_mismatches += 1;
                b.state = after;
            }
            None => self.barrier_mismatches += 1,
        }
    }

    fn expect_state(&mut self, buffer: BufferId, state: ResourceState) {
        if self.buffers.get(&buffer).map(|b| b.state) != Some(state) {
            self.barrier_mismatches += 1;
        }
    }

    fn run(&mut self, cmds: Vec<GpuCmd>) -> Result<usize, DeviceError> {
        let mut bind = Bindings::default();
        let mut draws = 0;

        for cmd in cmds {
            match cmd {
                GpuCmd::ApplyRenderState(state) => {
                    bind.pipeline = state.pipeline.as_ref().map(|p| p.id);
                    bind.index_buffer = state
                        .index_buffer
                        .map(|ib| (ib.buffer, ib.offset, ib.width));
                    bind.topology = state.topology;
                }
                GpuCmd::SetPipeline(id) => bind.pipeline = Some(id),
                GpuCmd::SetGraphicsRootSignature(sig) => {
                    if !self.root_signatures.contains_key(&sig) {
                        return Err(invalid("unknown root signature"));
                    }
                }
                GpuCmd::ApplyGraphicsRootParameters => {}
                GpuCmd::SetIndexBuffer(view) => {
                    bind.index_buffer = Some((view.buffer, view.offset, view.width));
                }
                GpuCmd::SetStreamOutTarget(target) => bind.stream_out = Some(target),
                GpuCmd::SetPrimitiveTopology(topology) => bind.topology = topology,
                GpuCmd::Draw {
                    vertex_count,
                    instance_count,
                    first_vertex,
                    first_instance,
                } => {
                    draws += 1;
                    let vertices: Vec<u32> =
                        (first_vertex..first_vertex + vertex_count).collect();
                    self.draw(&bind, &vertices, instance_count, first_instance);
                }
                GpuCmd::DrawIndexed {
                    index_count,
                    instance_count,
                    first_index,
                    base_vertex,
                    first_instance,
                } => {
                    draws += 1;
                    let vertices = self.fetch_indices(&bind, first_index, index_count, base_vertex);
                    self.draw(&bind, &vertices, instance_count, first_instance);
                }
                GpuCmd::BeginQuery { heap, slot } => {
                    self.active_query = Some(ActiveQuery {
                        heap: heap.0,
                        slot,
                        stats: StreamOutStatistics::default(),
                    });
                }
                GpuCmd::EndQuery { heap, slot } => {
                    let query = self
                        .active_query
                        .take()
                        .filter(|q| q.heap == heap.0 && q.slot == slot)
                        .ok_or_else(|| invalid("EndQuery without matching BeginQuery"))?;
                    let slots = self
                        .query_heaps
                        .get_mut(&heap.0)
                        .ok_or_else(|| invalid("unknown query heap"))?;
                    let entry = slots
                        .get_mut(slot as usize)
                        .ok_or_else(|| invalid("query slot out of range"))?;
                    *entry = query.stats;
                }
                GpuCmd::ResolveQuery {
                    heap,
                    slot,
                    dst,
                    dst_offset,
                } => {
                    let stats = self
                        .query_heaps
                        .get(&heap.0)
                        .and_then(|slots| slots.get(slot as usize))
                        .copied()
                        .ok_or_else(|| invalid("unknown query"))?;
                    let bytes = bytemuck::bytes_of(&stats).to_vec();
                    self.write_raw(dst, dst_offset, &bytes)?;
                }
                GpuCmd::Barrier {
                    buffer,
                    before,
                    after,
                } => self.transition(buffer, before, after),
                GpuCmd::CopyBuffer { dst, src } => {
                    self.expect_state(src, ResourceState::CopySource);
                    let data = self
                        .buffers
                        .get(&src)
                        .map(|b| b.data.clone())
                        .ok_or_else(|| invalid("unknown copy source"))?;
                    let dst = self
                        .buffers
                        .get_mut(&dst)
                        .ok_or_else(|| invalid("unknown copy destination"))?;
                    let len = dst.data.len().min(data.len());
                    dst.data[..len].copy_from_slice(&data[..len]);
                }
                GpuCmd::Discard(buffer) => {
                    if !self.buffers.contains_key(&buffer) {
                        return Err(invalid("discard of unknown buffer"));
                    }
                }
                GpuCmd::ClearUnorderedAccess(buffer) => {
                    self.expect_state(buffer, ResourceState::UnorderedAccess);
                    let b = self
                        .buffers
                        .get_mut(&buffer)
                        .ok_or_else(|| invalid("clear of unknown buffer"))?;
                    if !b.desc.allow_unordered_access {
                        return Err(invalid("buffer has no unordered-access view"));
                    }
                    b.data.fill(0);
                }
            }
        }

        Ok(draws)
    }

    fn fetch_indices(
        &self,
        bind: &Bindings,
        first_index: u32,
        count: u32,
        base_vertex: i32,
    ) -> Vec<u32> {
        let Some((buffer, offset, width)) = bind.index_buffer else {
            return vec![base_vertex as u32; count as usize];
        };
        let data = self.buffers.get(&buffer).map(|b| b.data.as_slice()).unwrap_or(&[]);
        let width_bytes = width.bytes() as usize;
        (0..count as usize)
            .map(|i| {
                let at = offset as usize + (first_index as usize + i) * width_bytes;
                // Out-of-bounds index fetches return 0.
                let idx = match (width, data.get(at..at + width_bytes)) {
                    (IndexWidth::U16, Some(b)) => u32::from(u16::from_le_bytes([b[0], b[1]])),
                    (IndexWidth::U32, Some(b)) => u32::from_le_bytes([b[0], b[1], b[2], b[3]]),
                    (_, None) => 0,
                };
                (idx as i64 + i64::from(base_vertex)) as u32
            })
            .collect()
    }

    fn draw(
        &mut self,
        bind: &Bindings,
        vertices: &[u32],
        instance_count: u32,
        first_instance: u32,
    ) {
        self.draws += 1;

        // Only pipelines created by the engine stream out; the application pipeline draws
        // nowhere we can see.
        let Some(desc) = bind.pipeline.and_then(|id| self.pipelines.get(&id)).cloned() else {
            return;
        };
        let last_stage = desc.gs.as_ref().or(desc.ds.as_ref());
        let output_topology = last_stage
            .map(|s| s.reflection.output_topology)
            .unwrap_or(PrimitiveTopology::PointList);

        let mut emitted: Vec<(u32, u32)> = Vec::new();
        for instance in first_instance..first_instance + instance_count {
            if desc.gs.is_some() {
                for v in 0..(self.gs_vertices)(instance) {
                    emitted.push((v, instance));
                }
            } else {
                emitted.extend(vertices.iter().map(|&v| (v, instance)));
            }
        }

        let mut written = 0u64;
        if let (Some(target), true) = (bind.stream_out, desc.stream_output.is_enabled()) {
            written = self.stream_out(&desc, target, &emitted);
        }

        if let Some(query) = self.active_query.as_mut() {
            let per_prim = match output_topology.strip_to_list().topology_type() {
                PrimitiveTopologyType::Line => 2,
                PrimitiveTopologyType::Triangle => 3,
                _ => 1,
            };
            query.stats.primitives_storage_needed = match self.reported_storage {
                Some(storage) => storage,
                None => {
                    query.stats.primitives_storage_needed
                        + (emitted.len() as u64).div_ceil(per_prim)
                }
            };
            query.stats.primitives_written += written / per_prim;
        }
    }

    /// Appends `emitted` vertices to `target` while they fit, updating its filled-size counter.
    /// Returns the number of vertices written.
    fn stream_out(
        &mut self,
        desc: &GraphicsPipelineDesc,
        target: StreamOutTarget,
        emitted: &[(u32, u32)],
    ) -> u64 {
        let stride = u64::from(desc.stream_output.buffer_strides.first().copied().unwrap_or(0));
        let position = self.position;
        let Some(buffer) = self.buffers.get_mut(&target.buffer) else {
            self.barrier_mismatches += 1;
            return 0;
        };
        if buffer.state != ResourceState::StreamOut {
            self.barrier_mismatches += 1;
        }
        if stride == 0 {
            return 0;
        }

        let counter_at = target.filled_size_offset as usize;
        let mut filled = buffer
            .data
            .get(counter_at..counter_at + 8)
            .map(|b| u64::from_le_bytes([b[0], b[1], b[2], b[3], b[4], b[5], b[6], b[7]]))
            .unwrap_or(0);

        let mut written = 0;
        for &(vertex, instance) in emitted {
            if filled + stride > target.size {
                break;
            }
            let mut out = Vec::with_capacity(stride as usize);
            for entry in &desc.stream_output.entries {
                if entry.semantic_name.eq_ignore_ascii_case("SV_Position") {
                    for c in position(vertex, instance) {
                        out.extend_from_slice(&c.to_le_bytes());
                    }
                } else {
                    for _ in 0..entry.component_count {
                        out.extend_from_slice(&(vertex as f32).to_le_bytes());
                    }
                }
            }
            out.resize(stride as usize, 0);

            let at = (target.data_offset + filled) as usize;
            buffer.data[at..at + out.len()].copy_from_slice(&out);
            filled += stride;
            written += 1;
        }

        buffer.data[counter_at..counter_at + 8].copy_from_slice(&filled.to_le_bytes());
        written
    }

    fn write_raw(&mut self, buffer: BufferId, offset: u64, data: &[u8]) -> Result<(), DeviceError> {
        let b = self
            .buffers
            .get_mut(&buffer)
            .ok_or_else(|| invalid("unknown buffer"))?;
        let start = offset as usize;
        let end = start + data.len();
        if end > b.data.len() {
            return Err(invalid("write past end of buffer"));
        }
        b.data[start..end].copy_from_slice(data);
        Ok(())
    }
}

fn invalid(message: &str) -> DeviceError {
    DeviceError::new(DeviceErrorCode::InvalidArgument, message)
}

impl CaptureDevice for SoftDevice {
    fn create_buffer(&mut self, desc: &BufferDesc) -> Result<BufferId, DeviceError> {
        if self.fail_buffers_from.is_some_and(|limit| desc.size >= limit)
            || self.fail_labels.iter().any(|l| desc.label.starts_with(l.as_str()))
        {
            return Err(DeviceError::out_of_memory(format!(
                "can't allocate {} bytes for {}",
                desc.size, desc.label
            )));
        }
        let id = BufferId(self.alloc_id());
        self.buffers.insert(
            id,
            SoftBuffer {
                desc: desc.clone(),
                data: vec![0; desc.size as usize],
                state: ResourceState::Common,
            },
        );
        self.buffers_created += 1;
        Ok(id)
    }

    fn release_buffer(&mut self, buffer: BufferId) {
        self.buffers.remove(&buffer);
    }

    fn create_query_heap(&mut self, slots: u32) -> Result<QueryHeapId, DeviceError> {
        let id = self.alloc_id();
        self.query_heaps
            .insert(id, vec![StreamOutStatistics::default(); slots as usize]);
        Ok(QueryHeapId(id))
    }

    fn release_query_heap(&mut self, heap: QueryHeapId) {
        self.query_heaps.remove(&heap.0);
    }

    fn create_root_signature(
        &mut self,
        desc: &RootSignatureDesc,
    ) -> Result<RootSignatureId, DeviceError> {
        if self.fail_root_signatures {
            return Err(invalid("root signature rejected"));
        }
        let id = RootSignatureId(self.alloc_id());
        self.root_signatures.insert(id, desc.clone());
        self.root_signatures_created.push(desc.clone());
        Ok(id)
    }

    fn release_root_signature(&mut self, sig: RootSignatureId) {
        self.root_signatures.remove(&sig);
    }

    fn create_pipeline(&mut self, desc: &GraphicsPipelineDesc) -> Result<PipelineId, DeviceError> {
        if self.fail_pipelines {
            return Err(invalid("bad shader combination"));
        }
        let id = PipelineId(self.alloc_id());
        self.pipelines.insert(id, desc.clone());
        self.pipelines_created.push(desc.clone());
        Ok(id)
    }

    fn release_pipeline(&mut self, pipeline: PipelineId) {
        self.pipelines.remove(&pipeline);
    }

    fn read_buffer(
        &mut self,
        buffer: BufferId,
        offset: u64,
        len: u64,
    ) -> Result<Vec<u8>, DeviceError> {
        let b = self
            .buffers
            .get(&buffer)
            .ok_or_else(|| invalid("unknown buffer"))?;
        if b.desc.heap == HeapKind::DeviceLocal {
            return Err(invalid("buffer isn't CPU visible"));
        }
        let start = (offset as usize).min(b.data.len());
        let end = (offset.saturating_add(len) as usize).min(b.data.len());
        Ok(b.data[start..end].to_vec())
    }

    fn write_buffer(
        &mut self,
        buffer: BufferId,
        offset: u64,
        data: &[u8],
    ) -> Result<(), DeviceError> {
        match self.buffers.get(&buffer).map(|b| b.desc.heap) {
            Some(HeapKind::Upload) => self.write_raw(buffer, offset, data),
            Some(_) => Err(invalid("buffer isn't CPU writable")),
            None => Err(invalid("unknown buffer")),
        }
    }

    fn execute(&mut self, list: CommandList) -> Result<(), DeviceError> {
        let draws = self.run(list.into_cmds())?;
        self.executes += 1;
        self.draws_per_execute.push(draws);
        Ok(())
    }

    fn sync(&mut self) {
        self.syncs += 1;
    }

    fn set_oom_tolerant(&mut self, tolerant: bool) {
        self.oom_tolerant = tolerant;
        self.oom_history.push(tolerant);
    }
}

/// Reads the clip-space position of vertex `index` from captured data.
pub fn position_of(data: &[u8], stride: u32, index: usize) -> [f32; 4] {
    let at = index * stride as usize;
    let mut out = [0f32; 4];
    for (i, c) in out.iter_mut().enumerate() {
        let b = &data[at + i * 4..at + i * 4 + 4];
        *c = f32::from_le_bytes([b[0], b[1], b[2], b[3]]);
    }
    out
}

pub fn stage(outputs: Vec<OutputElement>, output_topology: PrimitiveTopology) -> ShaderStageDesc {
    ShaderStageDesc {
        bytecode: Arc::from(&[0x44u8, 0x58, 0x42, 0x43][..]),
        reflection: Arc::new(ShaderReflection {
            output_signature: outputs,
            output_topology,
        }),
    }
}

/// A vertex shader writing a position and a 2-component texture coordinate (24-byte stride).
pub fn textured_vs() -> ShaderStageDesc {
    stage(
        vec![
            OutputElement::new("TEXCOORD", 0, 2),
            OutputElement::position("SV_Position", 4),
        ],
        PrimitiveTopology::Undefined,
    )
}

/// A vertex shader writing only a position (16-byte stride).
pub fn position_vs() -> ShaderStageDesc {
    stage(
        vec![OutputElement::position("SV_Position", 4)],
        PrimitiveTopology::Undefined,
    )
}

pub fn vs_pipeline(vs: ShaderStageDesc) -> GraphicsPipelineDesc {
    GraphicsPipelineDesc {
        root_signature: Some(APP_ROOT_SIGNATURE),
        vs: Some(vs),
        topology_type: PrimitiveTopologyType::Triangle,
        sample_count: 4,
        rtv_formats: vec![28],
        dsv_format: 45,
        ..GraphicsPipelineDesc::default()
    }
}

/// Vertex + geometry shader pipeline; the geometry shader emits a triangle strip.
pub fn gs_pipeline() -> GraphicsPipelineDesc {
    GraphicsPipelineDesc {
        gs: Some(stage(
            vec![
                OutputElement::position("SV_Position", 4),
                OutputElement::new("COLOR", 0, 4),
                OutputElement::new("CUT", 0, 1).with_stream(1),
            ],
            PrimitiveTopology::TriangleStrip,
        )),
        ..vs_pipeline(position_vs())
    }
}

pub fn render_state(pipeline: GraphicsPipelineDesc, topology: PrimitiveTopology) -> RenderState {
    RenderState {
        pipeline: Some(BoundPipeline {
            id: APP_PIPELINE,
            desc: Arc::new(PipelineDesc::Graphics(pipeline)),
        }),
        graphics_root_signature: Some(BoundRootSignature {
            id: APP_ROOT_SIGNATURE,
            desc: Arc::new(RootSignatureDesc {
                flags: RootSignatureFlags::ALLOW_INPUT_ASSEMBLER_INPUT_LAYOUT,
                parameters: Arc::from(&[1u8, 2, 3][..]),
            }),
        }),
        topology,
        index_buffer: None,
    }
}

pub fn with_index_buffer(
    mut state: RenderState,
    buffer: BufferId,
    size: u64,
    width: IndexWidth,
) -> RenderState {
    state.index_buffer = Some(IndexBufferBinding {
        buffer,
        offset: 0,
        size,
        width,
    });
    state
}

pub fn draw(num_vertices: u32, num_instances: u32) -> CapturedAction {
    let mut flags = ActionFlags::empty();
    if num_instances > 1 {
        flags |= ActionFlags::INSTANCED;
    }
    CapturedAction {
        num_indices: num_vertices,
        num_instances,
        flags,
        topology: PrimitiveTopology::TriangleList,
        ..CapturedAction::default()
    }
}

pub fn draw_indexed(num_indices: u32, num_instances: u32, width: IndexWidth) -> CapturedAction {
    CapturedAction {
        flags: draw(num_indices, num_instances).flags | ActionFlags::INDEXED,
        index_width: width,
        ..draw(num_indices, num_instances)
    }
}

pub fn u16_indices(indices: &[u16]) -> Vec<u8> {
    indices.iter().flat_map(|i| i.to_le_bytes()).collect()
}

pub fn u32_indices(indices: &[u32]) -> Vec<u8> {
    indices.iter().flat_map(|i| i.to_le_bytes()).collect()
}

struct ScriptedEvent {
    action: CapturedAction,
    state: RenderState,
}

/// Replays a fixed set of draws, invoking callbacks the way a command-stream replayer would.
#[derive(Default)]
pub struct ScriptedReplayer {
    events: BTreeMap<u32, ScriptedEvent>,
    aliases: Vec<(u32, u32)>,
    /// Every `replay_log` call, in order.
    pub replays: Vec<(u32, u32, ReplayMode)>,
    /// Makes every replay fail.
    pub fail: bool,
}

impl ScriptedReplayer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_draw(mut self, event_id: u32, action: CapturedAction, state: RenderState) -> Self {
        self.events.insert(event_id, ScriptedEvent { action, state });
        self
    }

    /// Reports `alias` as producing the same output as `primary` whenever `primary` replays.
    pub fn with_alias(mut self, primary: u32, alias: u32) -> Self {
        self.aliases.push((primary, alias));
        self
    }
}

impl Replayer for ScriptedReplayer {
    fn replay_log(
        &mut self,
        from: u32,
        to: u32,
        mode: ReplayMode,
        callback: &mut dyn ActionCallback,
    ) -> anyhow::Result<()> {
        self.replays.push((from, to, mode));
        if self.fail {
            anyhow::bail!("replay device lost");
        }

        for (&event_id, event) in self.events.range(from..=to) {
            if mode == ReplayMode::WithoutDraw && event_id == to {
                break;
            }
            let ctx = DrawContext {
                event_id,
                action: &event.action,
                state: &event.state,
            };
            callback.pre_draw(&ctx);
            for &(primary, alias) in &self.aliases {
                if primary == event_id {
                    callback.alias_event(primary, alias);
                }
            }
            callback.post_draw(&ctx);
        }
        Ok(())
    }

    fn action(&self, event_id: u32) -> Option<CapturedAction> {
        self.events.get(&event_id).map(|e| e.action)
    }
}
