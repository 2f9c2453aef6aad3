use core::fmt;

/// Failure class reported by the resource layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceErrorCode {
    OutOfMemory,
    InvalidArgument,
    DeviceRemoved,
    Unsupported,
    Other(u32),
}

impl fmt::Display for DeviceErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::OutOfMemory => write!(f, "E_OUTOFMEMORY"),
            Self::InvalidArgument => write!(f, "E_INVALIDARG"),
            Self::DeviceRemoved => write!(f, "DEVICE_REMOVED"),
            Self::Unsupported => write!(f, "E_NOTIMPL"),
            Self::Other(code) => write!(f, "0x{code:08x}"),
        }
    }
}

/// Error returned by a [`crate::device::CaptureDevice`] call.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{message} ({code})")]
pub struct DeviceError {
    pub code: DeviceErrorCode,
    pub message: String,
}

impl DeviceError {
    pub fn new(code: DeviceErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    pub fn out_of_memory(message: impl Into<String>) -> Self {
        Self::new(DeviceErrorCode::OutOfMemory, message)
    }

    pub fn is_out_of_memory(&self) -> bool {
        self.code == DeviceErrorCode::OutOfMemory
    }
}

/// Coarse classification of [`CaptureError`]s.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// The action can't be captured as recorded (no pipeline, empty draw, ...).
    Precondition,
    /// An allocation failed or was refused by the size clamp.
    ResourceExhaustion,
    /// The patched root signature/pipeline was rejected, or submission failed.
    PipelineBuild,
    /// Results could not be read back, or the GPU produced nothing.
    Readback,
}

/// Terminal status of one capture stage.
///
/// The `Display` output of each variant is the status string surfaced to the mesh viewer.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CaptureError {
    #[error("No pipeline bound")]
    NoPipeline,
    #[error("No graphics pipeline bound")]
    NotGraphicsPipeline,
    #[error("No vertex shader in pipeline")]
    NoVertexShader,
    #[error("Empty drawcall (0 indices/vertices)")]
    EmptyDrawElements,
    #[error("Empty drawcall (0 instances)")]
    EmptyDrawInstances,
    #[error("No geometry and no tessellation shader bound.")]
    NoPostStage,
    #[error("No geometry/tessellation output fetched due to error processing vertex stage.")]
    VertexStageFailed,

    #[error("Vertex output generated {bytes} bytes of data which ran out of memory")]
    VertexOutOfMemory { bytes: u64 },
    #[error("Geometry/tessellation output generated {bytes} bytes of data which ran out of memory")]
    PostStageOutOfMemory { bytes: u64 },

    #[error("Couldn't enable stream-out in root signature: {0}")]
    RootSignature(DeviceError),
    #[error("Couldn't create patched graphics pipeline: {0}")]
    PipelineCreation(DeviceError),
    #[error("Couldn't submit capture commands: {0}")]
    Submit(DeviceError),

    #[error("Couldn't get stream-out statistics: {0}")]
    Statistics(DeviceError),
    #[error("Couldn't read back vertex output data from GPU")]
    VertexReadback,
    #[error("Couldn't read back geometry/tessellation output data from GPU")]
    PostStageReadback,
    #[error("Vertex output data from GPU contained no vertex data")]
    NoVertexData,
    #[error("No detectable output generated by geometry/tessellation shaders")]
    NoPostStageOutput,

    #[error("No post-transform data captured for this event")]
    NotCaptured,
}

impl CaptureError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::NoPipeline
            | Self::NotGraphicsPipeline
            | Self::NoVertexShader
            | Self::EmptyDrawElements
            | Self::EmptyDrawInstances
            | Self::NoPostStage
            | Self::VertexStageFailed
            | Self::NotCaptured => ErrorKind::Precondition,
            Self::VertexOutOfMemory { .. } | Self::PostStageOutOfMemory { .. } => {
                ErrorKind::ResourceExhaustion
            }
            Self::RootSignature(_) | Self::PipelineCreation(_) | Self::Submit(_) => {
                ErrorKind::PipelineBuild
            }
            Self::Statistics(_)
            | Self::VertexReadback
            | Self::PostStageReadback
            | Self::NoVertexData
            | Self::NoPostStageOutput => ErrorKind::Readback,
        }
    }

    /// Emits the error at the level its kind calls for.
    pub(crate) fn log(&self, event_id: u32) {
        match self.kind() {
            ErrorKind::Precondition => tracing::debug!(event_id, "{}", self),
            ErrorKind::Readback if matches!(self, Self::NoVertexData | Self::NoPostStageOutput) => {
                tracing::debug!(event_id, "{}", self)
            }
            ErrorKind::ResourceExhaustion => tracing::warn!(event_id, "{}", self),
            ErrorKind::PipelineBuild | ErrorKind::Readback => tracing::error!(event_id, "{}", self),
        }
    }
}
