//! Near/far plane inference from captured clip-space positions.
//!
//! With a standard perspective matrix and `w_pre = 1`, post-projection depth is linear in view
//! depth: `z_post = z_pre * m + c` and `w_post = z_pre`, where
//!
//! ```text
//! m = F / (F - N)
//! c = -(F * N) / (F - N)
//! ```
//!
//! Solving for the planes gives `N = -c / m` and `F = c / (1 - m)`, so two vertices that differ
//! in both `z` and `w` are enough to recover them.

pub const DEFAULT_NEAR_PLANE: f32 = 0.1;
pub const DEFAULT_FAR_PLANE: f32 = 100.0;

/// Far plane reported for reversed-depth projections with no far plane.
pub const INFINITE_FAR_PLANE: f32 = f32::MAX;

/// Smallest near plane accepted from a solved pair.
const MIN_NEAR_PLANE: f32 = 0.000_001;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ProjectionPlanes {
    pub near: f32,
    pub far: f32,
}

impl Default for ProjectionPlanes {
    fn default() -> Self {
        Self {
            near: DEFAULT_NEAR_PLANE,
            far: DEFAULT_FAR_PLANE,
        }
    }
}

/// Reads the homogeneous position (`x, y, z, w` as `f32`s) at the start of vertex `index`.
pub fn position_at(data: &[u8], stride: u32, index: u64) -> Option<[f32; 4]> {
    let start = usize::try_from(index.checked_mul(u64::from(stride))?).ok()?;
    let bytes = data.get(start..start.checked_add(16)?)?;
    Some(bytemuck::pod_read_unaligned(bytes))
}

/// Estimates near/far planes from `vertex_count` vertices of `stride` bytes whose first 16 bytes
/// are the clip-space position.
///
/// Vertices whose `z` and `w` both differ from the first vertex's by more than `epsilon` are
/// candidates; the first candidate that yields a usable solution wins. Without one, a first vertex
/// with `0 < z < w` is taken as a reversed-depth projection with an infinite far plane, and
/// anything else gets the defaults.
pub fn estimate_planes(
    data: &[u8],
    stride: u32,
    vertex_count: u64,
    epsilon: f32,
) -> ProjectionPlanes {
    let Some(pos0) = position_at(data, stride, 0) else {
        return ProjectionPlanes::default();
    };
    let (z0, w0) = (pos0[2], pos0[3]);

    for i in 1..vertex_count {
        let Some(pos) = position_at(data, stride, i) else {
            break;
        };
        let (z, w) = (pos[2], pos[3]);

        if (w - w0).abs() <= epsilon || (z - z0).abs() <= epsilon {
            continue;
        }

        let m = (z - z0) / (w - w0);
        let c = z - w * m;

        if m == 1.0 || c == 0.0 {
            continue;
        }

        let near = -c / m;
        if near <= MIN_NEAR_PLANE {
            continue;
        }

        return ProjectionPlanes {
            near,
            far: c / (1.0 - m),
        };
    }

    if z0 > 0.0 && w0 > z0 {
        return ProjectionPlanes {
            near: z0,
            far: INFINITE_FAR_PLANE,
        };
    }

    ProjectionPlanes::default()
}
