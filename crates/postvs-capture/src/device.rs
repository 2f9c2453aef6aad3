//! Resource-layer abstraction used by the capture engine.
//!
//! The engine never talks to a graphics API directly. It creates resources through
//! [`CaptureDevice`], records work into a backend-agnostic [`CommandList`] and submits it with
//! [`CaptureDevice::execute`]. Backends translate [`GpuCmd`]s to native command-list calls; tests
//! use a deterministic software device.

use std::sync::Arc;

use bitflags::bitflags;

use crate::action::IndexWidth;
use crate::error::DeviceError;
use crate::signature::ShaderReflection;
use crate::topology::{PrimitiveTopology, PrimitiveTopologyType};

/// Handle to a buffer owned by the device.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BufferId(pub u64);

/// Handle to a query heap owned by the device.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct QueryHeapId(pub u64);

/// Handle to a compiled pipeline state object.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct PipelineId(pub u64);

/// Handle to a root signature.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct RootSignatureId(pub u64);

/// Memory pool a buffer is placed in.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum HeapKind {
    /// GPU-local, not CPU visible.
    DeviceLocal,
    /// CPU-readable copy destination.
    Readback,
    /// CPU-writable, GPU-readable.
    Upload,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BufferDesc {
    pub label: String,
    pub size: u64,
    pub heap: HeapKind,
    /// Allow unordered-access views, needed to clear the stream-out counter.
    pub allow_unordered_access: bool,
}

/// Resource state used for barriers.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ResourceState {
    Common,
    StreamOut,
    CopySource,
    CopyDest,
    UnorderedAccess,
    GenericRead,
}

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct RootSignatureFlags: u32 {
        const ALLOW_INPUT_ASSEMBLER_INPUT_LAYOUT = 1 << 0;
        const DENY_VERTEX_SHADER_ROOT_ACCESS = 1 << 1;
        const DENY_HULL_SHADER_ROOT_ACCESS = 1 << 2;
        const DENY_DOMAIN_SHADER_ROOT_ACCESS = 1 << 3;
        const DENY_GEOMETRY_SHADER_ROOT_ACCESS = 1 << 4;
        const DENY_PIXEL_SHADER_ROOT_ACCESS = 1 << 5;
        const ALLOW_STREAM_OUTPUT = 1 << 6;
    }
}

/// Root signature description, kept as the original serialized parameter blob plus flags.
///
/// The engine only ever toggles flags; parameters are carried through untouched.
#[derive(Clone, Debug, PartialEq, Eq, Default)]
pub struct RootSignatureDesc {
    pub flags: RootSignatureFlags,
    pub parameters: Arc<[u8]>,
}

/// A shader bound to one pipeline stage.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ShaderStageDesc {
    pub bytecode: Arc<[u8]>,
    pub reflection: Arc<ShaderReflection>,
}

/// One entry of a stream-out declaration.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StreamOutEntry {
    pub stream: u32,
    pub semantic_name: String,
    pub semantic_index: u32,
    pub start_component: u8,
    pub component_count: u8,
    pub output_slot: u8,
}

#[derive(Clone, Debug, PartialEq, Eq, Default)]
pub struct StreamOutputDesc {
    pub entries: Vec<StreamOutEntry>,
    pub buffer_strides: Vec<u32>,
    /// `None` disables rasterization of every stream.
    pub rasterized_stream: Option<u32>,
}

impl StreamOutputDesc {
    pub fn is_enabled(&self) -> bool {
        !self.entries.is_empty()
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub struct DepthStencilDesc {
    pub depth_enable: bool,
    pub depth_write: bool,
    pub stencil_enable: bool,
}

/// Strip-cut (primitive restart) value configured on a pipeline.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default)]
pub enum StripCutValue {
    #[default]
    Disabled,
    U16,
    U32,
}

impl StripCutValue {
    pub fn sentinel(self) -> Option<u32> {
        match self {
            Self::Disabled => None,
            Self::U16 => Some(IndexWidth::U16.restart_value()),
            Self::U32 => Some(IndexWidth::U32.restart_value()),
        }
    }
}

/// Raw DXGI-style format code. `0` is "unknown".
pub type FormatCode = u32;

/// Graphics pipeline description.
///
/// The capture engine never mutates a bound description in place; patched variants are built as
/// new values.
#[derive(Clone, Debug, PartialEq, Default)]
pub struct GraphicsPipelineDesc {
    pub root_signature: Option<RootSignatureId>,
    pub vs: Option<ShaderStageDesc>,
    pub hs: Option<ShaderStageDesc>,
    pub ds: Option<ShaderStageDesc>,
    pub gs: Option<ShaderStageDesc>,
    pub ps: Option<ShaderStageDesc>,
    pub stream_output: StreamOutputDesc,
    pub depth_stencil: DepthStencilDesc,
    pub topology_type: PrimitiveTopologyType,
    pub strip_cut: StripCutValue,
    pub sample_count: u32,
    pub sample_quality: u32,
    pub rtv_formats: Vec<FormatCode>,
    pub dsv_format: FormatCode,
    pub view_instance_count: u32,
}

impl GraphicsPipelineDesc {
    /// The last shader stage before rasterization when it isn't the vertex shader.
    ///
    /// A geometry shader always runs after tessellation, so it wins over the domain shader.
    pub fn last_pre_raster_stage(&self) -> Option<&ShaderStageDesc> {
        self.gs.as_ref().or(self.ds.as_ref())
    }
}

/// A pipeline state as bound during replay.
#[derive(Clone, Debug, PartialEq)]
pub enum PipelineDesc {
    Graphics(GraphicsPipelineDesc),
    Compute,
}

#[derive(Clone, Debug, PartialEq)]
pub struct BoundPipeline {
    pub id: PipelineId,
    pub desc: Arc<PipelineDesc>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct BoundRootSignature {
    pub id: RootSignatureId,
    pub desc: Arc<RootSignatureDesc>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct IndexBufferBinding {
    pub buffer: BufferId,
    pub offset: u64,
    /// Size of the bound view in bytes.
    pub size: u64,
    pub width: IndexWidth,
}

/// Pipeline state captured at the point of an action. Re-applied verbatim before each patched
/// draw; the engine then overrides only what it needs.
#[derive(Clone, Debug, PartialEq, Default)]
pub struct RenderState {
    pub pipeline: Option<BoundPipeline>,
    pub graphics_root_signature: Option<BoundRootSignature>,
    pub topology: PrimitiveTopology,
    pub index_buffer: Option<IndexBufferBinding>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct IndexBufferView {
    pub buffer: BufferId,
    pub offset: u64,
    pub size: u64,
    pub width: IndexWidth,
}

/// Stream-out target binding: the filled-size counter lives at `filled_size_offset`, vertex data
/// is appended from `data_offset` on.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct StreamOutTarget {
    pub buffer: BufferId,
    pub filled_size_offset: u64,
    pub data_offset: u64,
    pub size: u64,
}

/// Backend-agnostic command recorded by the capture engine.
#[derive(Clone, Debug, PartialEq)]
pub enum GpuCmd {
    /// Re-apply the replay's captured state (pipeline, root signature, root arguments, vertex
    /// and index buffers, viewports, ...).
    ApplyRenderState(Arc<RenderState>),
    SetPipeline(PipelineId),
    SetGraphicsRootSignature(RootSignatureId),
    /// Re-apply every captured graphics root argument to the current root signature.
    ApplyGraphicsRootParameters,
    SetIndexBuffer(IndexBufferView),
    SetStreamOutTarget(StreamOutTarget),
    SetPrimitiveTopology(PrimitiveTopology),

    Draw {
        vertex_count: u32,
        instance_count: u32,
        first_vertex: u32,
        first_instance: u32,
    },
    DrawIndexed {
        index_count: u32,
        instance_count: u32,
        first_index: u32,
        base_vertex: i32,
        first_instance: u32,
    },

    BeginQuery {
        heap: QueryHeapId,
        slot: u32,
    },
    EndQuery {
        heap: QueryHeapId,
        slot: u32,
    },
    /// Writes the slot's [`StreamOutStatistics`] to `dst` at `dst_offset`.
    ResolveQuery {
        heap: QueryHeapId,
        slot: u32,
        dst: BufferId,
        dst_offset: u64,
    },

    Barrier {
        buffer: BufferId,
        before: ResourceState,
        after: ResourceState,
    },
    /// Copies the whole of `src` into `dst`. Both buffers have the same size.
    CopyBuffer {
        dst: BufferId,
        src: BufferId,
    },
    Discard(BufferId),
    /// Zeroes the whole buffer through an unordered-access view.
    ClearUnorderedAccess(BufferId),
}

impl GpuCmd {
    pub fn is_draw(&self) -> bool {
        matches!(self, Self::Draw { .. } | Self::DrawIndexed { .. })
    }
}

/// A recorded list of commands, submitted as a unit.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct CommandList {
    cmds: Vec<GpuCmd>,
}

impl CommandList {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, cmd: GpuCmd) {
        self.cmds.push(cmd);
    }

    pub fn cmds(&self) -> &[GpuCmd] {
        &self.cmds
    }

    pub fn into_cmds(self) -> Vec<GpuCmd> {
        self.cmds
    }

    pub fn is_empty(&self) -> bool {
        self.cmds.is_empty()
    }

    pub fn draw_count(&self) -> usize {
        self.cmds.iter().filter(|c| c.is_draw()).count()
    }
}

/// Resolved stream-out statistics for stream 0.
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct StreamOutStatistics {
    pub primitives_written: u64,
    pub primitives_storage_needed: u64,
}

impl StreamOutStatistics {
    pub const SIZE: usize = core::mem::size_of::<Self>();

    /// Decodes a resolved query. Returns `None` if `bytes` is too short.
    pub fn from_bytes(bytes: &[u8]) -> Option<Self> {
        let bytes = bytes.get(..Self::SIZE)?;
        Some(bytemuck::pod_read_unaligned(bytes))
    }
}

// Compile-time layout validation.
const _: [(); 16] = [(); core::mem::size_of::<StreamOutStatistics>()];

/// The resource layer the capture engine runs on.
///
/// All calls are made from the replay thread. Implementations own every resource they hand out
/// until the matching `release_*` call.
pub trait CaptureDevice {
    fn create_buffer(&mut self, desc: &BufferDesc) -> Result<BufferId, DeviceError>;
    fn release_buffer(&mut self, buffer: BufferId);

    fn create_query_heap(&mut self, slots: u32) -> Result<QueryHeapId, DeviceError>;
    fn release_query_heap(&mut self, heap: QueryHeapId);

    fn create_root_signature(
        &mut self,
        desc: &RootSignatureDesc,
    ) -> Result<RootSignatureId, DeviceError>;
    fn release_root_signature(&mut self, sig: RootSignatureId);

    fn create_pipeline(&mut self, desc: &GraphicsPipelineDesc) -> Result<PipelineId, DeviceError>;
    fn release_pipeline(&mut self, pipeline: PipelineId);

    /// Maps `buffer` and copies out `len` bytes from `offset`.
    ///
    /// Returns fewer bytes than requested when the range runs past the end of the buffer.
    fn read_buffer(&mut self, buffer: BufferId, offset: u64, len: u64)
        -> Result<Vec<u8>, DeviceError>;
    /// Writes `data` into a CPU-visible buffer at `offset`.
    fn write_buffer(&mut self, buffer: BufferId, offset: u64, data: &[u8])
        -> Result<(), DeviceError>;

    /// Submits a recorded list to the queue. Does not wait for completion.
    fn execute(&mut self, list: CommandList) -> Result<(), DeviceError>;
    /// Blocks until all submitted work has completed.
    fn sync(&mut self);

    /// Enables or disables tolerance for out-of-memory failures. While enabled, allocation
    /// failures must be reported as errors instead of being treated as fatal device loss.
    fn set_oom_tolerant(&mut self, tolerant: bool);
}
