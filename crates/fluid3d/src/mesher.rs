//! Particle surface reconstruction.
//!
//! Particles are splatted into a scalar field sampled at the vertices of a
//! regular grid, normalized so that one particle reaches the iso-value at
//! `particle_radius`. Marching cubes then extracts the iso-surface.

use glam::{IVec3, UVec3, Vec3};
use rayon::prelude::*;
use rustc_hash::FxHashMap;

use crate::array3::{unravel, Array3};
use crate::constants::{DEFAULT_CELL_RADIUS, DEFAULT_PARTICLE_EXTENT, SURFACE_ISO_VALUE};
use crate::error::{validate_cell_size, validate_dimensions, ConfigError, Result};
use crate::kernels::smooth_radial;
use crate::marching_cubes::{CORNER_OFFSETS, EDGE_CORNERS, EDGE_TABLE, TRI_TABLE};
use crate::mesh::Mesh;
use crate::space_hash::SpaceHash;

/// Marching-cubes mesher over a regular sampling grid.
#[derive(Clone, Debug)]
pub struct Mesher {
    /// World position of sampling vertex (0, 0, 0)
    pub grid_offset: Vec3,
    pub cell_size: f32,
    /// Support radius of the particle kernel (world units)
    pub particle_extent: f32,
    /// Cells searched around each sampling vertex
    pub cell_radius: u32,
    surface: Array3<f32>,
    hash: SpaceHash,
}

impl Mesher {
    /// Create a mesher with an empty sampling grid.
    pub fn new(cell_size: f32, grid_offset: Vec3) -> Self {
        Self {
            grid_offset,
            cell_size,
            particle_extent: DEFAULT_PARTICLE_EXTENT,
            cell_radius: DEFAULT_CELL_RADIUS,
            surface: Array3::new(UVec3::ZERO, 0.0),
            hash: SpaceHash::new(UVec3::ZERO),
        }
    }

    /// Set the sampling resolution to `dims` cells (`dims + 1` vertices per axis).
    pub fn resize(&mut self, dims: IVec3) -> Result<()> {
        let dims = validate_dimensions(dims)?;
        let vertices = if dims.cmpeq(UVec3::ZERO).any() { UVec3::ZERO } else { dims + UVec3::ONE };
        self.surface.resize(vertices, 0.0);
        self.hash.resize(dims);
        Ok(())
    }

    /// Sampling grid size in cells.
    pub fn dims(&self) -> UVec3 {
        self.hash.size()
    }

    /// Sampled field from the last [`Mesher::generate_mesh`] call.
    pub fn surface(&self) -> &Array3<f32> {
        &self.surface
    }

    /// Build the surface mesh of `positions`, each treated as a sphere of
    /// `particle_radius`.
    pub fn generate_mesh(&mut self, positions: &[Vec3], particle_radius: f32) -> Result<Mesh> {
        validate_cell_size(self.cell_size)?;
        if !(particle_radius > 0.0 && particle_radius < self.particle_extent) {
            return Err(ConfigError::InvalidParticleRadius {
                radius: particle_radius,
                extent: self.particle_extent,
            });
        }
        if self.surface.is_empty() {
            return Ok(Mesh::default());
        }

        self.hash_positions(positions);
        self.sample_field(positions, particle_radius);
        let mut mesh = self.polygonize();
        mesh.generate_normals();
        log::debug!(
            "meshed {} particles into {} triangles",
            positions.len(),
            mesh.triangle_count()
        );
        Ok(mesh)
    }

    fn hash_positions(&mut self, positions: &[Vec3]) {
        let max = self.dims() - UVec3::ONE;
        self.hash.clear();
        for (i, &p) in positions.iter().enumerate() {
            let cell = ((p - self.grid_offset) / self.cell_size).max(Vec3::ZERO).as_uvec3().min(max);
            self.hash.insert(cell, i);
        }
    }

    fn sample_field(&mut self, positions: &[Vec3], particle_radius: f32) {
        let extent = self.particle_extent;
        let norm = smooth_radial(particle_radius * particle_radius, extent);
        let reach = UVec3::splat(self.cell_radius);
        let (offset, h) = (self.grid_offset, self.cell_size);
        let vertices = self.surface.size();
        let max_cell = self.dims() - UVec3::ONE;
        let hash = &self.hash;

        self.surface.as_mut_slice().par_iter_mut().enumerate().for_each(|(raw, value)| {
            let vertex = unravel(vertices, raw);
            let world = offset + vertex.as_vec3() * h;
            let mut sum = 0.0;
            hash.for_each_nearby(vertex.min(max_cell), reach, reach, |i| {
                sum += smooth_radial(positions[i].distance_squared(world), extent);
            });
            *value = sum / norm;
        });
    }

    fn polygonize(&self) -> Mesh {
        let dims = self.dims();
        let mut mesh = Mesh::default();
        let mut welded: FxHashMap<(usize, usize), u32> = FxHashMap::default();

        for z in 0..dims.z {
            for y in 0..dims.y {
                for x in 0..dims.x {
                    let base = UVec3::new(x, y, z);
                    let corners = CORNER_OFFSETS.map(|o| base + o);
                    let values = corners.map(|c| self.surface[c]);

                    let mut case = 0usize;
                    for (bit, &v) in values.iter().enumerate() {
                        if v > SURFACE_ISO_VALUE {
                            case |= 1 << bit;
                        }
                    }
                    if EDGE_TABLE[case] == 0 {
                        continue;
                    }

                    for &edge in TRI_TABLE[case].iter().take_while(|&&e| e != 255) {
                        let (a, b) = EDGE_CORNERS[edge as usize];
                        let lower = corners[a].min(corners[b]);
                        let axis = (0..3).find(|&i| corners[a][i] != corners[b][i]).unwrap_or(0);
                        let key = (self.surface.index_to_raw(lower), axis);
                        let index = *welded.entry(key).or_insert_with(|| {
                            let t = (SURFACE_ISO_VALUE - values[a]) / (values[b] - values[a]);
                            let pa = self.vertex_position(corners[a]);
                            let pb = self.vertex_position(corners[b]);
                            mesh.positions.push(pa + (pb - pa) * t);
                            (mesh.positions.len() - 1) as u32
                        });
                        mesh.indices.push(index);
                    }
                }
            }
        }
        mesh
    }

    fn vertex_position(&self, vertex: UVec3) -> Vec3 {
        self.grid_offset + vertex.as_vec3() * self.cell_size
    }
}
