//! Primitive topologies, plus the strip → list folding stream-out applies to its output.
//!
//! Stream-out never writes strips: every emitted strip is expanded into independent primitives
//! before it reaches memory, so captured post-stage data must be described with the matching list
//! topology.

/// Input-assembler topology of a draw (or output topology of a geometry/domain shader).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum PrimitiveTopology {
    #[default]
    Undefined,
    PointList,
    LineList,
    LineStrip,
    TriangleList,
    TriangleStrip,
    LineListAdj,
    LineStripAdj,
    TriangleListAdj,
    TriangleStripAdj,
    /// Patch list with the given number of control points (1..=32).
    PatchList(u8),
}

/// Coarse topology class a pipeline is compiled for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum PrimitiveTopologyType {
    #[default]
    Undefined,
    Point,
    Line,
    Triangle,
    Patch,
}

impl PrimitiveTopology {
    /// Folds strip topologies into their list equivalents; other topologies are returned as-is.
    pub fn strip_to_list(self) -> Self {
        match self {
            Self::TriangleStrip => Self::TriangleList,
            Self::LineStrip => Self::LineList,
            Self::TriangleStripAdj => Self::TriangleListAdj,
            Self::LineStripAdj => Self::LineListAdj,
            other => other,
        }
    }

    pub fn topology_type(self) -> PrimitiveTopologyType {
        match self {
            Self::Undefined => PrimitiveTopologyType::Undefined,
            Self::PointList => PrimitiveTopologyType::Point,
            Self::LineList | Self::LineStrip | Self::LineListAdj | Self::LineStripAdj => {
                PrimitiveTopologyType::Line
            }
            Self::TriangleList
            | Self::TriangleStrip
            | Self::TriangleListAdj
            | Self::TriangleStripAdj => PrimitiveTopologyType::Triangle,
            Self::PatchList(_) => PrimitiveTopologyType::Patch,
        }
    }

    pub fn is_strip(self) -> bool {
        matches!(
            self,
            Self::LineStrip | Self::TriangleStrip | Self::LineStripAdj | Self::TriangleStripAdj
        )
    }
}
