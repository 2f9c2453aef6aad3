//! Builds the patched pipeline and root-signature descriptions used for capture.
//!
//! The bound descriptions are shared with the replayer and are never modified; every patch is a
//! fresh value derived from them.

use crate::device::{
    BoundRootSignature, CaptureDevice, DepthStencilDesc, GraphicsPipelineDesc, RootSignatureDesc,
    RootSignatureFlags, RootSignatureId,
};
use crate::error::DeviceError;
use crate::so_decl::StreamOutLayout;
use crate::topology::PrimitiveTopologyType;

/// Creates a copy of `bound` that allows stream output, if it doesn't already.
///
/// Returns `None` when the bound signature can be used as-is.
pub(crate) fn stream_out_root_signature<D: CaptureDevice>(
    device: &mut D,
    bound: Option<&BoundRootSignature>,
) -> Result<Option<RootSignatureId>, DeviceError> {
    let Some(bound) = bound else {
        return Ok(None);
    };
    if bound
        .desc
        .flags
        .contains(RootSignatureFlags::ALLOW_STREAM_OUTPUT)
    {
        return Ok(None);
    }

    let desc = RootSignatureDesc {
        flags: bound.desc.flags | RootSignatureFlags::ALLOW_STREAM_OUTPUT,
        parameters: bound.desc.parameters.clone(),
    };
    device.create_root_signature(&desc).map(Some)
}

/// Pipeline that streams out raw vertex-shader output and rasterizes nothing.
pub(crate) fn vertex_capture_pipeline(
    original: &GraphicsPipelineDesc,
    layout: &StreamOutLayout,
    root_signature: Option<RootSignatureId>,
) -> GraphicsPipelineDesc {
    GraphicsPipelineDesc {
        root_signature: root_signature.or(original.root_signature),
        vs: original.vs.clone(),
        hs: None,
        ds: None,
        gs: None,
        ps: None,
        stream_output: layout.to_stream_output_desc(),
        depth_stencil: DepthStencilDesc {
            depth_enable: false,
            depth_write: false,
            stencil_enable: false,
        },
        topology_type: PrimitiveTopologyType::Point,
        strip_cut: original.strip_cut,
        sample_count: 1,
        sample_quality: 0,
        rtv_formats: Vec::new(),
        dsv_format: 0,
        view_instance_count: 0,
    }
}

/// Pipeline that streams out the last geometry/tessellation stage's output.
///
/// Same as [`vertex_capture_pipeline`] but with hull/domain/geometry shaders and the original
/// topology type restored.
pub(crate) fn post_stage_capture_pipeline(
    original: &GraphicsPipelineDesc,
    layout: &StreamOutLayout,
    root_signature: Option<RootSignatureId>,
) -> GraphicsPipelineDesc {
    GraphicsPipelineDesc {
        hs: original.hs.clone(),
        ds: original.ds.clone(),
        gs: original.gs.clone(),
        topology_type: original.topology_type,
        ..vertex_capture_pipeline(original, layout, root_signature)
    }
}
