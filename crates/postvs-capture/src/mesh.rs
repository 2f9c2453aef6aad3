use crate::cache::{MeshDataStage, PostVsRecord};
use crate::device::BufferId;
use crate::error::CaptureError;
use crate::topology::PrimitiveTopology;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ComponentType {
    #[default]
    Float,
}

/// Format of the attribute a viewer reads from each captured vertex (the position, at offset 0).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VertexFormat {
    pub component_count: u8,
    pub component_byte_width: u8,
    pub component_type: ComponentType,
}

impl Default for VertexFormat {
    fn default() -> Self {
        Self {
            component_count: 4,
            component_byte_width: 4,
            component_type: ComponentType::Float,
        }
    }
}

/// Everything a mesh viewer needs to draw one instance of one captured stage.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct MeshDescriptor {
    pub vertex_buffer: Option<BufferId>,
    pub vertex_byte_offset: u64,
    pub vertex_byte_stride: u32,
    /// `u64::MAX` (the whole buffer) when there is a vertex buffer.
    pub vertex_byte_size: u64,
    pub index_buffer: Option<BufferId>,
    /// 2 or 4 when there is an index buffer, 0 otherwise.
    pub index_byte_stride: u32,
    pub index_byte_offset: u64,
    pub index_byte_size: u64,
    pub base_vertex: i32,
    pub format: VertexFormat,
    pub show_alpha: bool,
    pub topology: PrimitiveTopology,
    pub num_indices: u32,
    /// Whether the data is clip-space and can be unprojected with the planes below.
    pub unproject: bool,
    pub near_plane: f32,
    pub far_plane: f32,
    /// Empty on success.
    pub status: String,
}

impl MeshDescriptor {
    /// Builds the descriptor for `instance_id` of `stage`. A missing record yields an empty
    /// descriptor whose status says so.
    pub fn from_record(
        record: Option<&PostVsRecord>,
        instance_id: u32,
        stage: MeshDataStage,
    ) -> Self {
        let Some(record) = record else {
            return Self {
                status: CaptureError::NotCaptured.to_string(),
                ..Self::default()
            };
        };
        let s = record.stage(stage);

        let mut desc = Self {
            vertex_buffer: s.vertex_buffer,
            vertex_byte_offset: u64::from(s.instance_stride) * u64::from(instance_id),
            vertex_byte_stride: s.vertex_stride,
            vertex_byte_size: if s.vertex_buffer.is_some() { u64::MAX } else { 0 },
            base_vertex: 0,
            format: VertexFormat::default(),
            show_alpha: false,
            topology: s.topology,
            num_indices: s.num_verts,
            unproject: s.has_position,
            near_plane: s.near_plane,
            far_plane: s.far_plane,
            status: s.status.clone(),
            ..Self::default()
        };

        if s.uses_indices {
            if let Some(buffer) = s.index_buffer {
                desc.index_buffer = Some(buffer);
                desc.index_byte_stride = s.index_width.bytes();
                desc.index_byte_size = u64::MAX;
            }
        }

        if let Some(inst) = s.instances.get(instance_id as usize) {
            desc.vertex_byte_offset = inst.byte_offset;
            desc.num_indices = inst.vertex_count;
        }

        desc
    }
}
