//! Recorded draw parameters, as handed over by the replayer.

use bitflags::bitflags;

use crate::topology::PrimitiveTopology;

bitflags! {
    /// Properties of a recorded action that change how it is re-issued.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct ActionFlags: u32 {
        /// The draw reads vertices through the bound index buffer.
        const INDEXED = 1 << 0;
        /// The draw was issued through an instanced entry point.
        const INSTANCED = 1 << 1;
    }
}

/// Width of one element in an index buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum IndexWidth {
    U16,
    #[default]
    U32,
}

impl IndexWidth {
    pub const fn bytes(self) -> u32 {
        match self {
            Self::U16 => 2,
            Self::U32 => 4,
        }
    }

    /// The primitive-restart value for this width.
    pub const fn restart_value(self) -> u32 {
        match self {
            Self::U16 => 0xFFFF,
            Self::U32 => 0xFFFF_FFFF,
        }
    }
}

/// One recorded draw. Read-only for the capture engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CapturedAction {
    /// Vertex count for non-indexed draws, index count for indexed draws.
    pub num_indices: u32,
    pub num_instances: u32,
    pub flags: ActionFlags,
    /// First vertex for non-indexed draws.
    pub vertex_offset: u32,
    /// First index for indexed draws, in elements.
    pub index_offset: u32,
    pub instance_offset: u32,
    pub base_vertex: i32,
    pub topology: PrimitiveTopology,
    pub index_width: IndexWidth,
}

impl CapturedAction {
    pub fn is_indexed(&self) -> bool {
        self.flags.contains(ActionFlags::INDEXED)
    }

    pub fn is_instanced(&self) -> bool {
        self.flags.contains(ActionFlags::INSTANCED)
    }
}
