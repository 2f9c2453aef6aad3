//! `postvs-capture` replays a single recorded draw with a patched graphics pipeline so the
//! post-transform output can be read back and shown as mesh data.
//!
//! The crate is split into:
//! - Backend seams: [`device::CaptureDevice`] (resource creation, command submission, mapped
//!   reads) and [`replay::Replayer`] (command-stream replay with per-action callbacks).
//! - Pure helpers: stream-out declaration building ([`so_decl`]), index compaction
//!   ([`index_remap`]) and near/far inference ([`projection`]).
//! - The capture engine itself ([`PostVsCapture`]), which owns the shared scratch buffers and the
//!   per-event cache, and hands out [`MeshDescriptor`]s to viewers.
//!
//! Captures are strictly sequential: a single [`PostVsCapture`] drives one device queue and every
//! pass ends with a blocking GPU sync before results are read.

#![deny(unsafe_code)]

mod cache;
mod capture;
mod error;
mod mesh;
mod oom;
mod pipeline_patch;
mod post_stage;
mod scratch;
mod session;
mod vertex_stage;


pub mod action;
pub mod config;
pub mod device;
pub mod index_remap;
pub mod projection;
pub mod replay;
pub mod signature;
pub mod so_decl;
pub mod stats;
pub mod topology;

pub use action::{ActionFlags, CapturedAction, IndexWidth};
pub use cache::{InstanceOutput, MeshDataStage, PostVsRecord, StageOutputRecord};
pub use capture::PostVsCapture;
pub use config::PostVsConfig;
pub use error::{CaptureError, DeviceError, DeviceErrorCode, ErrorKind};
pub use mesh::{ComponentType, MeshDescriptor, VertexFormat};
pub use stats::{CaptureStats, CaptureStatsSnapshot};
pub use topology::{PrimitiveTopology, PrimitiveTopologyType};

/// Round `value` up to the nearest multiple of `alignment`.
///
/// `alignment` must be > 0.
pub(crate) fn align_up(value: u64, alignment: u64) -> u64 {
    debug_assert!(alignment > 0);

    let add = alignment - 1;
    match value.checked_add(add) {
        Some(v) => v / alignment * alignment,
        None => u64::MAX / alignment * alignment,
    }
}
