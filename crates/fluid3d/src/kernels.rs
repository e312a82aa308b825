//! Interpolation kernels for particle transfers and surface reconstruction.

use glam::Vec3;

/// 1D tent (linear) weight for a distance in cell units.
/// Support: [-1, 1]
#[inline]
pub fn tent_1d(r: f32) -> f32 {
    (1.0 - r.abs()).max(0.0)
}

/// 3D tent kernel (tensor product of 1D) for a world-space offset.
#[inline]
pub fn tent_3d(delta: Vec3, cell_size: f32) -> f32 {
    let r = delta / cell_size;
    tent_1d(r.x) * tent_1d(r.y) * tent_1d(r.z)
}

/// Radial smoothing kernel `(1 - d^2/e^2)^3`, zero beyond `extent`.
#[inline]
pub fn smooth_radial(distance_sq: f32, extent: f32) -> f32 {
    let t = 1.0 - distance_sq / (extent * extent);
    if t > 0.0 {
        t * t * t
    } else {
        0.0
    }
}
