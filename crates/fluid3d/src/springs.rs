//! Particle separation pass.
//!
//! Each particle is pushed away from neighbors in its 3x3x3 cell
//! neighborhood with a smooth falloff kernel. Neighbors that nearly coincide
//! get a random push instead, since their direction is undefined.

use glam::{UVec3, Vec3};
use rand::Rng;

use crate::particle::Particles;
use crate::space_hash::SpaceHash;

/// Per-particle displacement rates (world units per second).
///
/// `hash` must hold particle indices keyed by each particle's `grid_index`.
pub fn spring_displacements(
    particles: &Particles,
    hash: &SpaceHash,
    cell_size: f32,
    rng: &mut impl Rng,
) -> Vec<Vec3> {
    let rest = cell_size / std::f32::consts::SQRT_2;
    let min_dist = 0.1 * rest;
    let h_sq = cell_size * cell_size;

    let mut displacements = vec![Vec3::ZERO; particles.len()];
    for (i, p) in particles.list.iter().enumerate() {
        let mut push = Vec3::ZERO;
        hash.for_each_nearby(p.grid_index, UVec3::ONE, UVec3::ONE, |j| {
            if j == i {
                return;
            }
            let offset = p.position - particles.list[j].position;
            let dist = offset.length();
            if dist < min_dist {
                push += rest
                    * Vec3::new(
                        rng.gen_range(-1.0..1.0),
                        rng.gen_range(-1.0..1.0),
                        rng.gen_range(-1.0..1.0),
                    );
            } else {
                let falloff = (1.0 - dist * dist / h_sq).max(0.0);
                push += falloff.powi(3) * rest / dist * offset;
            }
        });
        displacements[i] = push;
    }
    displacements
}
