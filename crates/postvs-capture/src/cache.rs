//! Per-event capture results and the alias table in front of them.

use std::collections::HashMap;

use crate::action::IndexWidth;
use crate::device::{BufferId, CaptureDevice};
use crate::error::CaptureError;
use crate::topology::PrimitiveTopology;

/// Which captured stage a viewer asks for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MeshDataStage {
    /// Raw vertex-shader output.
    VertexOut,
    /// Output of the last geometry/tessellation stage.
    PostStageOut,
}

/// Output of one instance of an instanced post-stage capture.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct InstanceOutput {
    pub vertex_count: u32,
    /// Offset of the instance's first vertex in the captured vertex buffer.
    pub byte_offset: u64,
}

/// Splits cumulative stream-out counters (bytes written after 1, 2, ... N instances) into
/// per-instance outputs. Returns the outputs and the total byte count.
pub fn instance_outputs_from_counters(counters: &[u64], stride: u32) -> (Vec<InstanceOutput>, u64) {
    let stride = u64::from(stride.max(1));
    let mut prev = 0u64;
    let outputs = counters
        .iter()
        .map(|&bytes| {
            let out = InstanceOutput {
                vertex_count: (bytes.saturating_sub(prev) / stride) as u32,
                byte_offset: prev,
            };
            prev = bytes;
            out
        })
        .collect();
    (outputs, prev)
}

/// Result of capturing one stage.
///
/// `status` is empty on success. When it isn't, the data fields are left at their defaults.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct StageOutputRecord {
    pub status: String,
    /// Captured vertices, owned by the record.
    pub vertex_buffer: Option<BufferId>,
    /// Rewritten index buffer, owned by the record.
    pub index_buffer: Option<BufferId>,
    pub index_width: IndexWidth,
    pub vertex_stride: u32,
    /// Bytes per instance, for instanced draws that split evenly.
    pub instance_stride: u32,
    pub near_plane: f32,
    pub far_plane: f32,
    pub topology: PrimitiveTopology,
    /// Vertex count (per instance, for instanced draws).
    pub num_verts: u32,
    /// Per-instance counts and offsets, when instances can produce different amounts of output.
    pub instances: Vec<InstanceOutput>,
    pub has_position: bool,
    pub uses_indices: bool,
}

impl StageOutputRecord {
    pub fn failed(err: &CaptureError) -> Self {
        Self {
            status: err.to_string(),
            ..Self::default()
        }
    }

    pub fn is_ok(&self) -> bool {
        self.status.is_empty()
    }

    fn release_buffers<D: CaptureDevice>(&mut self, device: &mut D) {
        if let Some(buffer) = self.vertex_buffer.take() {
            device.release_buffer(buffer);
        }
        if let Some(buffer) = self.index_buffer.take() {
            device.release_buffer(buffer);
        }
    }
}

/// Both captured stages of one event.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct PostVsRecord {
    /// Topology the draw was recorded with.
    pub vs_in_topology: PrimitiveTopology,
    pub vertex: StageOutputRecord,
    pub post: StageOutputRecord,
}

impl PostVsRecord {
    /// A record where both stages failed with `err`.
    pub fn failed(err: &CaptureError) -> Self {
        Self {
            vs_in_topology: PrimitiveTopology::Undefined,
            vertex: StageOutputRecord::failed(err),
            post: StageOutputRecord::failed(err),
        }
    }

    pub fn stage(&self, stage: MeshDataStage) -> &StageOutputRecord {
        match stage {
            MeshDataStage::VertexOut => &self.vertex,
            MeshDataStage::PostStageOut => &self.post,
        }
    }
}

/// Records keyed by canonical event id, plus the alias → canonical table consulted first.
#[derive(Debug, Default)]
pub(crate) struct PostVsCache {
    records: HashMap<u32, PostVsRecord>,
    aliases: HashMap<u32, u32>,
}

impl PostVsCache {
    pub(crate) fn resolve(&self, event_id: u32) -> u32 {
        self.aliases.get(&event_id).copied().unwrap_or(event_id)
    }

    pub(crate) fn get(&self, event_id: u32) -> Option<&PostVsRecord> {
        self.records.get(&self.resolve(event_id))
    }

    pub(crate) fn contains(&self, event_id: u32) -> bool {
        self.records.contains_key(&self.resolve(event_id))
    }

    /// Stores `record` under the canonical id of `event_id`. An existing record is kept.
    pub(crate) fn insert(&mut self, event_id: u32, record: PostVsRecord) -> &PostVsRecord {
        let key = self.resolve(event_id);
        self.records.entry(key).or_insert(record)
    }

    /// Redirects `alias` to whatever `primary` currently resolves to.
    pub(crate) fn register_alias(&mut self, primary: u32, alias: u32) {
        let canonical = self.resolve(primary);
        if canonical == alias {
            return;
        }
        self.aliases.insert(alias, canonical);
    }

    pub(crate) fn len(&self) -> usize {
        self.records.len()
    }

    /// Drops every record and alias, releasing the buffers the records own.
    pub(crate) fn clear<D: CaptureDevice>(&mut self, device: &mut D) {
        for record in self.records.values_mut() {
            record.vertex.release_buffers(device);
            record.post.release_buffers(device);
        }
        self.records.clear();
        self.aliases.clear();
    }
}
