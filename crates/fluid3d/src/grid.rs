//! 3D MAC (Marker-and-Cell) staggered grid for incompressible fluid simulation.
//!
//! Each cell stores the velocity components on its three positive faces:
//! - x at the face between cell (i, j, k) and (i + 1, j, k)
//! - y at the face between cell (i, j, k) and (i, j + 1, k)
//! - z at the face between cell (i, j, k) and (i, j, k + 1)
//!
//! A cell's negative-face velocity is its neighbor's positive-face velocity.
//! Faces on the negative domain boundary have no storage and read as zero.

use glam::{IVec3, Mat3, UVec3, Vec3};
use serde::{Deserialize, Serialize};

use crate::array3::Array3;

/// Cell classification for pressure solve.
#[derive(Clone, Copy, PartialEq, Eq, Debug, Default, Serialize, Deserialize)]
pub enum CellType {
    /// Solid obstacle (no flow)
    Solid,
    /// Contains fluid particles
    Fluid,
    /// Empty air
    #[default]
    Air,
}

/// One grid cell.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Cell {
    /// Velocities on the +x, +y and +z faces
    pub velocities_posface: Vec3,
    pub cell_type: CellType,
}

/// Unit offsets along each axis.
pub const AXES: [IVec3; 3] = [IVec3::X, IVec3::Y, IVec3::Z];

/// Dense MAC grid with a world-space placement.
#[derive(Debug, PartialEq)]
pub struct FluidGrid {
    cells: Array3<Cell>,
    cell_size: f32,
    offset: Vec3,
}

impl FluidGrid {
    /// Create an all-air grid with zero velocity.
    pub fn new(size: UVec3, cell_size: f32, offset: Vec3) -> Self {
        Self {
            cells: Array3::new(size, Cell::default()),
            cell_size,
            offset,
        }
    }

    /// Reallocate to `size`, discarding all cell state.
    pub fn resize(&mut self, size: UVec3) {
        self.cells.resize(size, Cell::default());
    }

    #[inline]
    pub fn size(&self) -> UVec3 {
        self.cells.size()
    }

    #[inline]
    pub fn cell_size(&self) -> f32 {
        self.cell_size
    }

    #[inline]
    pub fn offset(&self) -> Vec3 {
        self.offset
    }

    pub fn set_cell_size(&mut self, cell_size: f32) {
        self.cell_size = cell_size;
    }

    pub fn set_offset(&mut self, offset: Vec3) {
        self.offset = offset;
    }

    #[inline]
    pub fn cells(&self) -> &Array3<Cell> {
        &self.cells
    }

    #[inline]
    pub fn cells_mut(&mut self) -> &mut Array3<Cell> {
        &mut self.cells
    }

    #[inline]
    pub fn cell(&self, index: UVec3) -> &Cell {
        &self.cells[index]
    }

    #[inline]
    pub fn cell_mut(&mut self, index: UVec3) -> &mut Cell {
        &mut self.cells[index]
    }

    /// Upper corner of the domain in world space.
    pub fn domain_max(&self) -> Vec3 {
        self.offset + self.size().as_vec3() * self.cell_size
    }

    /// Continuous grid coordinates of a world position.
    #[inline]
    pub fn grid_position(&self, position: Vec3) -> Vec3 {
        (position - self.offset) / self.cell_size
    }

    /// Containing cell of a world position, clamped into the grid.
    ///
    /// Only meaningful for a non-empty grid.
    pub fn clamped_cell(&self, position: Vec3) -> UVec3 {
        let max = self.size().saturating_sub(UVec3::ONE);
        self.grid_position(position).max(Vec3::ZERO).as_uvec3().min(max)
    }

    /// Cell index of a world position with negative coordinates floored at
    /// zero and no upper clamp.
    pub fn unclamped_cell(&self, position: Vec3) -> UVec3 {
        self.grid_position(position).max(Vec3::ZERO).as_uvec3()
    }

    /// World position of a cell center.
    pub fn cell_center(&self, index: UVec3) -> Vec3 {
        self.offset + (index.as_vec3() + Vec3::splat(0.5)) * self.cell_size
    }

    /// World position of the positive face of `index` along `axis`.
    pub fn face_position(&self, index: UVec3, axis: usize) -> Vec3 {
        let mut local = index.as_vec3() + Vec3::splat(0.5);
        local[axis] += 0.5;
        self.offset + local * self.cell_size
    }

    /// Type of the cell at `index + offset`; out-of-range cells are solid.
    #[inline]
    pub fn neighbor_type(&self, index: UVec3, offset: IVec3) -> CellType {
        self.cells.get_neighbor(index, offset).map_or(CellType::Solid, |c| c.cell_type)
    }

    /// Velocities on the negative faces of a cell, zero on the domain boundary.
    pub fn negative_face_velocities(&self, index: UVec3) -> Vec3 {
        let mut velocity = Vec3::ZERO;
        for (axis, &offset) in AXES.iter().enumerate() {
            if let Some(neighbor) = self.cells.get_neighbor(index, -offset) {
                velocity[axis] = neighbor.velocities_posface[axis];
            }
        }
        velocity
    }

    /// Mark a cell solid and stop any flow through its faces. Out-of-range
    /// indices are ignored.
    pub fn set_solid(&mut self, index: UVec3) {
        if let Some(cell) = self.cells.get_mut(index) {
            cell.cell_type = CellType::Solid;
            cell.velocities_posface = Vec3::ZERO;
        }
    }

    pub fn is_solid(&self, index: UVec3) -> bool {
        self.cells.get(index).is_some_and(|c| c.cell_type == CellType::Solid)
    }

    /// Zero the face velocities on the domain's maximum faces.
    ///
    /// Those faces are never read through the negative-face convention.
    pub fn zero_max_boundary_faces(&mut self) {
        let size = self.size();
        if size.cmpeq(UVec3::ZERO).any() {
            return;
        }
        for raw in 0..self.cells.len() {
            let index = self.cells.index_from_raw(raw);
            let cell = &mut self.cells.as_mut_slice()[raw];
            for axis in 0..3 {
                if index[axis] + 1 == size[axis] {
                    cell.velocities_posface[axis] = 0.0;
                }
            }
        }
    }

    /// Add a uniform velocity change to every non-solid cell.
    pub fn add_velocity(&mut self, delta: Vec3) {
        for cell in self.cells.as_mut_slice() {
            if cell.cell_type != CellType::Solid {
                cell.velocities_posface += delta;
            }
        }
    }

    /// Grid cells currently classified fluid, in storage order.
    pub fn fluid_cells(&self) -> Vec<UVec3> {
        self.cells
            .iter()
            .enumerate()
            .filter(|(_, c)| c.cell_type == CellType::Fluid)
            .map(|(raw, _)| self.cells.index_from_raw(raw))
            .collect()
    }

    pub fn fluid_cell_count(&self) -> usize {
        self.cells.iter().filter(|c| c.cell_type == CellType::Fluid).count()
    }

    /// Discrete velocity divergence of a cell.
    pub fn divergence(&self, index: UVec3) -> f32 {
        let pos = self.cells[index].velocities_posface;
        let neg = self.negative_face_velocities(index);
        (pos - neg).element_sum() / self.cell_size
    }

    /// Largest absolute divergence over fluid cells.
    pub fn max_fluid_divergence(&self) -> f32 {
        self.cells
            .indices()
            .filter(|&i| self.cells[i].cell_type == CellType::Fluid)
            .map(|i| self.divergence(i).abs())
            .fold(0.0, f32::max)
    }

    /// Face sample for interpolation of component `axis`.
    ///
    /// Index -1 along `axis` is the negative domain boundary face and reads as
    /// zero. Every other out-of-range index is clamped to the nearest cell.
    #[inline]
    fn face_sample(&self, axis: usize, index: IVec3) -> f32 {
        if index[axis] < 0 {
            return 0.0;
        }
        let max = self.size().as_ivec3() - IVec3::ONE;
        let clamped = index.clamp(IVec3::ZERO, max).as_uvec3();
        self.cells[clamped].velocities_posface[axis]
    }

    /// Lower stencil corner and fractional weights for component `axis`.
    #[inline]
    fn face_stencil(&self, position: Vec3, axis: usize) -> (IVec3, Vec3) {
        let mut local = self.grid_position(position) - Vec3::splat(0.5);
        local[axis] -= 0.5;
        let base = local.floor();
        (base.as_ivec3(), local - base)
    }

    /// Gather the 2x2x2 face samples around `position` for component `axis`.
    fn gather(&self, position: Vec3, axis: usize) -> ([[[f32; 2]; 2]; 2], Vec3) {
        let (base, frac) = self.face_stencil(position, axis);
        let mut samples = [[[0.0; 2]; 2]; 2];
        for (dz, plane) in samples.iter_mut().enumerate() {
            for (dy, row) in plane.iter_mut().enumerate() {
                for (dx, value) in row.iter_mut().enumerate() {
                    let index = base + IVec3::new(dx as i32, dy as i32, dz as i32);
                    *value = self.face_sample(axis, index);
                }
            }
        }
        (samples, frac)
    }

    /// Trilinearly interpolated velocity at a world position.
    pub fn interpolate_velocity(&self, position: Vec3) -> Vec3 {
        if self.cells.is_empty() {
            return Vec3::ZERO;
        }
        let mut velocity = Vec3::ZERO;
        for axis in 0..3 {
            let (s, t) = self.gather(position, axis);
            let x00 = lerp(s[0][0][0], s[0][0][1], t.x);
            let x10 = lerp(s[0][1][0], s[0][1][1], t.x);
            let x01 = lerp(s[1][0][0], s[1][0][1], t.x);
            let x11 = lerp(s[1][1][0], s[1][1][1], t.x);
            velocity[axis] = lerp(lerp(x00, x10, t.y), lerp(x01, x11, t.y), t.z);
        }
        velocity
    }

    /// World-space gradient of each interpolated velocity component.
    ///
    /// Column `a` of the result is the gradient of component `a`.
    pub fn velocity_gradient(&self, position: Vec3) -> Mat3 {
        if self.cells.is_empty() {
            return Mat3::ZERO;
        }
        let mut columns = [Vec3::ZERO; 3];
        for (axis, column) in columns.iter_mut().enumerate() {
            let (s, t) = self.gather(position, axis);
            let w = |i: usize, f: f32| if i == 0 { 1.0 - f } else { f };
            let mut gradient = Vec3::ZERO;
            for dz in 0..2 {
                for dy in 0..2 {
                    let dx_diff = s[dz][dy][1] - s[dz][dy][0];
                    gradient.x += dx_diff * w(dy, t.y) * w(dz, t.z);
                }
                for dx in 0..2 {
                    let dy_diff = s[dz][1][dx] - s[dz][0][dx];
                    gradient.y += dy_diff * w(dx, t.x) * w(dz, t.z);
                }
            }
            for dy in 0..2 {
                for dx in 0..2 {
                    let dz_diff = s[1][dy][dx] - s[0][dy][dx];
                    gradient.z += dz_diff * w(dx, t.x) * w(dy, t.y);
                }
            }
            *column = gradient / self.cell_size;
        }
        Mat3::from_cols(columns[0], columns[1], columns[2])
    }
}

impl Clone for FluidGrid {
    fn clone(&self) -> Self {
        Self {
            cells: self.cells.clone(),
            cell_size: self.cell_size,
            offset: self.offset,
        }
    }

    fn clone_from(&mut self, source: &Self) {
        self.cells.clone_from(&source.cells);
        self.cell_size = source.cell_size;
        self.offset = source.offset;
    }
}

#[inline]
fn lerp(a: f32, b: f32, t: f32) -> f32 {
    a + (b - a) * t
}

/// The live grid plus the post-transfer snapshot FLIP differences against.
#[derive(Clone, Debug)]
pub struct GridSlots {
    pub current: FluidGrid,
    pub previous: FluidGrid,
}

impl GridSlots {
    pub fn new(size: UVec3, cell_size: f32, offset: Vec3) -> Self {
        let current = FluidGrid::new(size, cell_size, offset);
        let previous = current.clone();
        Self { current, previous }
    }

    pub fn resize(&mut self, size: UVec3) {
        self.current.resize(size);
        self.previous.resize(size);
    }

    /// Copy the current grid into the previous slot, reusing its storage.
    pub fn snapshot(&mut self) {
        self.previous.clone_from(&self.current);
        self.previous.zero_max_boundary_faces();
    }

    pub fn set_solid(&mut self, index: UVec3) {
        self.current.set_solid(index);
        self.previous.set_solid(index);
    }
}
