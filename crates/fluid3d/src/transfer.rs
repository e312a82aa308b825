//! Particle-Grid velocity transfers.
//!
//! P2G: every non-solid cell gathers tent-weighted particle velocities from
//! its 3x3x3 neighborhood at each of its positive faces.
//! G2P: particles sample the staggered grid trilinearly.
//!
//! The scheme is picked once per configuration through [`TransferMethod::scheme`].

use std::fmt::Debug;

use glam::{UVec3, Vec3};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::array3::unravel;
use crate::constants::MIN_KERNEL_WEIGHT;
use crate::error::ConfigError;
use crate::grid::{CellType, GridSlots};
use crate::kernels::tent_3d;
use crate::particle::Particles;
use crate::space_hash::SpaceHash;

/// Velocity transfer method, numbered as hosts encode it.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum TransferMethod {
    Pic = 0,
    #[default]
    FlipBlend = 1,
    Apic = 2,
}

impl TransferMethod {
    /// Build the transfer strategy for this method.
    pub fn scheme(self, flip_blend: f32) -> Box<dyn TransferScheme> {
        match self {
            TransferMethod::Pic => Box::new(Pic),
            TransferMethod::FlipBlend => Box::new(FlipBlend { blend: flip_blend }),
            TransferMethod::Apic => Box::new(Apic),
        }
    }
}

impl TryFrom<i32> for TransferMethod {
    type Error = ConfigError;

    fn try_from(value: i32) -> Result<Self, ConfigError> {
        match value {
            0 => Ok(TransferMethod::Pic),
            1 => Ok(TransferMethod::FlipBlend),
            2 => Ok(TransferMethod::Apic),
            other => Err(ConfigError::UnknownTransferMethod(other)),
        }
    }
}

/// A particle/grid transfer strategy.
pub trait TransferScheme: Send + Sync + Debug {
    fn method(&self) -> TransferMethod;

    /// Rebuild grid velocities and fluid/air classification from particles.
    /// `hash` must reflect the current particle positions.
    fn transfer_to_grid(&self, grids: &mut GridSlots, particles: &Particles, hash: &SpaceHash);

    /// Update particle velocities from the projected grid.
    fn transfer_from_grid(&self, grids: &GridSlots, particles: &mut Particles);
}

/// Full replacement of particle velocity by the grid velocity.
#[derive(Clone, Copy, Debug, Default)]
pub struct Pic;

/// PIC transfer plus a `blend` fraction of the particle's own velocity change.
#[derive(Clone, Copy, Debug)]
pub struct FlipBlend {
    pub blend: f32,
}

/// PIC with per-particle affine velocity.
#[derive(Clone, Copy, Debug, Default)]
pub struct Apic;

impl TransferScheme for Pic {
    fn method(&self) -> TransferMethod {
        TransferMethod::Pic
    }

    fn transfer_to_grid(&self, grids: &mut GridSlots, particles: &Particles, hash: &SpaceHash) {
        particles_to_grid(grids, particles, hash, false);
    }

    fn transfer_from_grid(&self, grids: &GridSlots, particles: &mut Particles) {
        let grid = &grids.current;
        particles.list.par_iter_mut().for_each(|p| {
            p.velocity = grid.interpolate_velocity(p.position);
        });
    }
}

impl TransferScheme for FlipBlend {
    fn method(&self) -> TransferMethod {
        TransferMethod::FlipBlend
    }

    fn transfer_to_grid(&self, grids: &mut GridSlots, particles: &Particles, hash: &SpaceHash) {
        particles_to_grid(grids, particles, hash, false);
        grids.snapshot();
    }

    fn transfer_from_grid(&self, grids: &GridSlots, particles: &mut Particles) {
        let blend = self.blend;
        let (new_grid, old_grid) = (&grids.current, &grids.previous);
        particles.list.par_iter_mut().for_each(|p| {
            let new_velocity = new_grid.interpolate_velocity(p.position);
            let old_velocity = old_grid.interpolate_velocity(p.position);
            p.velocity = new_velocity + blend * (p.velocity - old_velocity);
        });
    }
}

impl TransferScheme for Apic {
    fn method(&self) -> TransferMethod {
        TransferMethod::Apic
    }

    fn transfer_to_grid(&self, grids: &mut GridSlots, particles: &Particles, hash: &SpaceHash) {
        particles_to_grid(grids, particles, hash, true);
    }

    fn transfer_from_grid(&self, grids: &GridSlots, particles: &mut Particles) {
        let grid = &grids.current;
        particles.list.par_iter_mut().for_each(|p| {
            p.velocity = grid.interpolate_velocity(p.position);
            p.affine_velocity = grid.velocity_gradient(p.position);
        });
    }
}

/// Shared P2G pass. With `affine`, each particle contributes its affine
/// velocity evaluated at the face position.
fn particles_to_grid(grids: &mut GridSlots, particles: &Particles, hash: &SpaceHash, affine: bool) {
    let grid = &mut grids.current;
    let size = grid.size();
    let cell_size = grid.cell_size();
    let offset = grid.offset();
    let list = &particles.list;

    grid.cells_mut().as_mut_slice().par_iter_mut().enumerate().for_each(|(raw, cell)| {
        if cell.cell_type == CellType::Solid {
            return;
        }
        let index = unravel(size, raw);
        let center = offset + (index.as_vec3() + Vec3::splat(0.5)) * cell_size;
        let faces = [
            center + Vec3::new(0.5 * cell_size, 0.0, 0.0),
            center + Vec3::new(0.0, 0.5 * cell_size, 0.0),
            center + Vec3::new(0.0, 0.0, 0.5 * cell_size),
        ];

        let mut sum = Vec3::ZERO;
        let mut weight = Vec3::ZERO;
        hash.for_each_nearby(index, UVec3::ONE, UVec3::ONE, |i| {
            let p = &list[i];
            for (axis, &face) in faces.iter().enumerate() {
                let w = tent_3d(p.position - face, cell_size);
                if w <= 0.0 {
                    continue;
                }
                let mut v = p.velocity[axis];
                if affine {
                    v += p.affine_velocity.col(axis).dot(face - p.position);
                }
                sum[axis] += w * v;
                weight[axis] += w;
            }
        });

        cell.cell_type = if hash.count_at(index) > 0 { CellType::Fluid } else { CellType::Air };
        for axis in 0..3 {
            cell.velocities_posface[axis] = if weight[axis] > MIN_KERNEL_WEIGHT {
                sum[axis] / weight[axis]
            } else {
                0.0
            };
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::particle::Particle;
    use glam::Mat3;

    fn hashed(grids: &GridSlots, particles: &mut Particles) -> SpaceHash {
        let mut hash = SpaceHash::new(grids.current.size());
        for (i, p) in particles.list.iter_mut().enumerate() {
            p.grid_index = grids.current.clamped_cell(p.position);
            hash.insert(p.grid_index, i);
        }
        hash
    }

    #[test]
    fn test_transfer_method_from_int() {
        assert_eq!(TransferMethod::try_from(0).unwrap(), TransferMethod::Pic);
        assert_eq!(TransferMethod::try_from(1).unwrap(), TransferMethod::FlipBlend);
        assert_eq!(TransferMethod::try_from(2).unwrap(), TransferMethod::Apic);
        assert!(TransferMethod::try_from(3).is_err());
        assert_eq!(TransferMethod::Apic as i32, 2);
    }

    #[test]
    fn test_scheme_reports_method() {
        for method in [TransferMethod::Pic, TransferMethod::FlipBlend, TransferMethod::Apic] {
            assert_eq!(method.scheme(0.9).method(), method);
        }
    }

    #[test]
    fn test_single_particle_classification() {
        let mut grids = GridSlots::new(UVec3::splat(4), 1.0, Vec3::ZERO);
        let mut particles = Particles::new();
        particles.spawn(Vec3::new(1.5, 1.5, 1.5), Vec3::new(1.0, 0.0, 0.0));
        let hash = hashed(&grids, &mut particles);

        Pic.transfer_to_grid(&mut grids, &particles, &hash);

        assert_eq!(grids.current.cell(UVec3::ONE).cell_type, CellType::Fluid);
        assert_eq!(grids.current.cell(UVec3::new(3, 3, 3)).cell_type, CellType::Air);
        // The particle sits halfway between the x faces of cells 0 and 1.
        assert!((grids.current.cell(UVec3::ONE).velocities_posface.x - 1.0).abs() < 1e-6);
        assert!((grids.current.cell(UVec3::new(0, 1, 1)).velocities_posface.x - 1.0).abs() < 1e-6);
        // Out of kernel reach.
        assert_eq!(grids.current.cell(UVec3::new(3, 3, 3)).velocities_posface, Vec3::ZERO);
    }

    #[test]
    fn test_solid_cells_keep_type() {
        let mut grids = GridSlots::new(UVec3::splat(3), 1.0, Vec3::ZERO);
        grids.set_solid(UVec3::ONE);
        let mut particles = Particles::new();
        particles.spawn(Vec3::splat(1.5), Vec3::ONE);
        let hash = hashed(&grids, &mut particles);

        Apic.transfer_to_grid(&mut grids, &particles, &hash);

        assert_eq!(grids.current.cell(UVec3::ONE).cell_type, CellType::Solid);
        assert_eq!(grids.current.cell(UVec3::ONE).velocities_posface, Vec3::ZERO);
    }

    #[test]
    fn test_apic_affine_term_shifts_face_velocity() {
        let mut grids = GridSlots::new(UVec3::splat(4), 1.0, Vec3::ZERO);
        let mut particles = Particles::new();
        let mut p = Particle::new(Vec3::new(1.5, 1.5, 1.5), Vec3::ZERO);
        // du/dx = 2
        p.affine_velocity = Mat3::from_cols(Vec3::new(2.0, 0.0, 0.0), Vec3::ZERO, Vec3::ZERO);
        particles.list.push(p);
        let hash = hashed(&grids, &mut particles);

        Apic.transfer_to_grid(&mut grids, &particles, &hash);

        // +x face of cell 1 is 0.5 ahead of the particle, the one of cell 0 is 0.5 behind.
        assert!((grids.current.cell(UVec3::ONE).velocities_posface.x - 1.0).abs() < 1e-6);
        assert!((grids.current.cell(UVec3::new(0, 1, 1)).velocities_posface.x + 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_flip_preserves_particle_deviation() {
        let mut grids = GridSlots::new(UVec3::splat(4), 1.0, Vec3::ZERO);
        let mut particles = Particles::new();
        particles.spawn(Vec3::splat(1.5), Vec3::new(1.0, 0.0, 0.0));
        let hash = hashed(&grids, &mut particles);
        let flip = FlipBlend { blend: 1.0 };

        flip.transfer_to_grid(&mut grids, &particles, &hash);
        // Grid unchanged between transfers: pure FLIP keeps the velocity.
        flip.transfer_from_grid(&grids, &mut particles);
        assert!((particles.list[0].velocity - Vec3::new(1.0, 0.0, 0.0)).length() < 1e-5);

        // A uniform grid change is added on top.
        grids.current.add_velocity(Vec3::new(0.0, -0.5, 0.0));
        flip.transfer_from_grid(&grids, &mut particles);
        let v = particles.list[0].velocity;
        assert!((v - Vec3::new(1.0, -0.5, 0.0)).length() < 1e-5, "got {v}");
    }
}
