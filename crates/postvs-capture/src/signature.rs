//! Shader output signatures, as provided by shader reflection.

use crate::topology::PrimitiveTopology;

/// System-value tag of a signature element.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum SystemValue {
    #[default]
    Undefined,
    /// Clip-space position (`SV_Position`).
    Position,
    ClipDistance,
    CullDistance,
    RenderTargetArrayIndex,
    ViewportArrayIndex,
    /// Any other tag, stored as the raw `D3D_NAME` value.
    Other(u32),
}

/// A single element of a shader output signature.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputElement {
    /// The semantic name (e.g. `"POSITION"` or `"TEXCOORD"`).
    pub semantic_name: String,
    /// The semantic index (e.g. `0` for `TEXCOORD0`).
    pub semantic_index: u32,
    /// Number of 32-bit components written (1..=4).
    pub component_count: u8,
    pub system_value: SystemValue,
    /// Geometry-shader output stream. Always 0 for other stages.
    pub stream: u32,
}

impl OutputElement {
    pub fn new(semantic_name: impl Into<String>, semantic_index: u32, component_count: u8) -> Self {
        Self {
            semantic_name: semantic_name.into(),
            semantic_index,
            component_count,
            system_value: SystemValue::Undefined,
            stream: 0,
        }
    }

    /// An `SV_Position` element.
    pub fn position(semantic_name: impl Into<String>, component_count: u8) -> Self {
        Self {
            system_value: SystemValue::Position,
            ..Self::new(semantic_name, 0, component_count)
        }
    }

    pub fn with_stream(mut self, stream: u32) -> Self {
        self.stream = stream;
        self
    }

    pub fn is_position(&self) -> bool {
        self.system_value == SystemValue::Position
    }
}

/// Reflection data the capture engine needs for one shader stage.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ShaderReflection {
    /// Output signature, in register order.
    pub output_signature: Vec<OutputElement>,
    /// Primitive topology emitted by a geometry or domain shader.
    pub output_topology: PrimitiveTopology,
}
