//! Surface reconstruction tests.

use std::collections::HashMap;

use fluid3d::constants::DEFAULT_PARTICLE_EXTENT;
use fluid3d::{IVec3, Mesh, Mesher, Vec3};

const SPACING: f32 = 0.25;

/// Particles on a regular lattice filling a ball.
fn ball(center: Vec3, radius: f32) -> Vec<Vec3> {
    let n = (radius / SPACING) as i32 + 1;
    let mut positions = Vec::new();
    for i in -n..=n {
        for j in -n..=n {
            for k in -n..=n {
                let offset = Vec3::new(i as f32, j as f32, k as f32) * SPACING;
                if offset.length() <= radius {
                    positions.push(center + offset);
                }
            }
        }
    }
    positions
}

fn mesher(offset: Vec3) -> Mesher {
    let mut mesher = Mesher::new(0.25, offset);
    mesher.resize(IVec3::splat(16)).unwrap();
    mesher
}

fn edge_uses(mesh: &Mesh) -> HashMap<(u32, u32), usize> {
    let mut uses = HashMap::new();
    for [a, b, c] in mesh.triangles() {
        for (u, v) in [(a, b), (b, c), (c, a)] {
            *uses.entry((u.min(v), u.max(v))).or_insert(0) += 1;
        }
    }
    uses
}

#[test]
fn test_ball_mesh_is_closed() {
    let center = Vec3::splat(2.0);
    let mesh = mesher(Vec3::ZERO).generate_mesh(&ball(center, 1.5), 0.25).unwrap();

    assert!(mesh.triangle_count() > 100);
    let uses = edge_uses(&mesh);
    assert!(uses.values().all(|&n| n == 2), "mesh has open or non-manifold edges");
}

#[test]
fn test_ball_vertices_lie_near_cluster_radius() {
    let center = Vec3::splat(2.0);
    let radius = 1.5;
    let mesh = mesher(Vec3::ZERO).generate_mesh(&ball(center, radius), 0.25).unwrap();

    for p in &mesh.positions {
        let d = p.distance(center);
        assert!(
            d >= radius - DEFAULT_PARTICLE_EXTENT && d <= radius + DEFAULT_PARTICLE_EXTENT,
            "vertex {:?} at distance {}",
            p,
            d
        );
    }
}

#[test]
fn test_ball_faces_outward() {
    let center = Vec3::splat(2.0);
    let mesh = mesher(Vec3::ZERO).generate_mesh(&ball(center, 1.5), 0.25).unwrap();

    // Signed volume is positive for outward winding.
    let volume: f32 = mesh
        .triangles()
        .map(|[a, b, c]| {
            let (a, b, c) = (
                mesh.positions[a as usize] - center,
                mesh.positions[b as usize] - center,
                mesh.positions[c as usize] - center,
            );
            a.dot(b.cross(c)) / 6.0
        })
        .sum();
    assert!(volume > 0.0, "signed volume {volume}");

    assert_eq!(mesh.normals.len(), mesh.positions.len());
    for (p, n) in mesh.positions.iter().zip(&mesh.normals) {
        assert!(n.dot(*p - center) > 0.0, "inward normal at {:?}", p);
    }
}

#[test]
fn test_offset_translates_mesh() {
    let at_origin = mesher(Vec3::splat(-2.0)).generate_mesh(&ball(Vec3::ZERO, 1.5), 0.25).unwrap();
    let shifted = mesher(Vec3::ZERO).generate_mesh(&ball(Vec3::splat(2.0), 1.5), 0.25).unwrap();

    assert_eq!(at_origin.triangle_count(), shifted.triangle_count());
    for (a, b) in at_origin.positions.iter().zip(&shifted.positions) {
        assert!((*a + Vec3::splat(2.0) - *b).length() < 1e-4);
    }
}

#[test]
fn test_particles_outside_grid_reach_edge_vertices() {
    let mut mesher = mesher(Vec3::ZERO);
    // Just past the +x face of the sampling grid.
    let mesh = mesher.generate_mesh(&[Vec3::new(4.1, 2.0, 2.0)], 0.3).unwrap();
    assert!(!mesh.is_empty());
    assert!(mesh.positions.iter().all(|p| p.x <= 4.0 + 1e-5));
}
