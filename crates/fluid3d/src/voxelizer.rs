//! Mesh voxelization for obstacles and fluid sources.
//!
//! Every voxel starts out interior. Voxels overlapped by a triangle become
//! surface voxels, then a flood fill from the border of the voxel grid marks
//! everything reachable without crossing the surface as exterior. A closed
//! mesh leaves its enclosed voxels interior.

use glam::{IVec3, UVec3, Vec3};

use crate::array3::Array3;
use crate::error::{validate_cell_size, Result};
use crate::mesh::Mesh;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum VoxelType {
    /// Enclosed by the mesh
    Interior,
    /// Reachable from outside the mesh
    Exterior,
    /// Overlapped by at least one triangle
    Surface,
}

const FACE_NEIGHBORS: [IVec3; 6] = [
    IVec3::NEG_X,
    IVec3::X,
    IVec3::NEG_Y,
    IVec3::Y,
    IVec3::NEG_Z,
    IVec3::Z,
];

/// Separating-axis test between an axis-aligned box and a triangle.
///
/// Touching counts as overlapping.
pub fn box_triangle_overlap(center: Vec3, half_extent: Vec3, p1: Vec3, p2: Vec3, p3: Vec3) -> bool {
    let verts = [p1 - center, p2 - center, p3 - center];
    let lo = verts[0].min(verts[1]).min(verts[2]);
    let hi = verts[0].max(verts[1]).max(verts[2]);
    if lo.cmpgt(half_extent).any() || hi.cmplt(-half_extent).any() {
        return false;
    }

    let edges = [verts[1] - verts[0], verts[2] - verts[1], verts[0] - verts[2]];
    let normal = edges[0].cross(edges[1]);
    if verts[0].dot(normal).abs() > normal.abs().dot(half_extent) {
        return false;
    }

    for axis in [Vec3::X, Vec3::Y, Vec3::Z] {
        for (i, edge) in edges.iter().enumerate() {
            let dir = axis.cross(*edge);
            // Both ends of edge i project to the same value.
            let a = verts[i].dot(dir);
            let b = verts[(i + 2) % 3].dot(dir);
            let r = half_extent.dot(dir.abs());
            if a.min(b) > r || a.max(b) < -r {
                return false;
            }
        }
    }
    true
}

/// Voxel grid that classifies cells against a triangle mesh.
#[derive(Clone, Debug)]
pub struct Voxelizer {
    pub cell_size: f32,
    /// World position of the minimum corner of voxel (0, 0, 0)
    pub grid_offset: Vec3,
    voxels: Array3<VoxelType>,
}

impl Voxelizer {
    pub fn new(cell_size: f32) -> Self {
        Self {
            cell_size,
            grid_offset: Vec3::ZERO,
            voxels: Array3::new(UVec3::ZERO, VoxelType::Interior),
        }
    }

    pub fn voxels(&self) -> &Array3<VoxelType> {
        &self.voxels
    }

    /// Center a grid on the box `min..max` with one spare voxel on every
    /// side. All voxels are reset to interior.
    pub fn resize_reposition(&mut self, min: Vec3, max: Vec3) {
        let extent = max - min;
        let cells = (extent / self.cell_size).ceil();
        self.grid_offset = min - 0.5 * (cells * self.cell_size - extent) - Vec3::splat(self.cell_size);
        self.voxels.resize(cells.as_uvec3() + UVec3::splat(2), VoxelType::Interior);
    }

    /// Cover the box `min..max` with voxels aligned to a reference grid, with
    /// one spare voxel on every side. All voxels are reset to interior.
    ///
    /// Returns the reference-grid index of voxel (0, 0, 0).
    pub fn resize_reposition_aligned(
        &mut self,
        min: Vec3,
        max: Vec3,
        ref_cell_size: f32,
        ref_grid_offset: Vec3,
    ) -> IVec3 {
        self.cell_size = ref_cell_size;
        let grid_min = ((min - ref_grid_offset) / ref_cell_size).floor().as_ivec3() - IVec3::ONE;
        let grid_max = ((max - ref_grid_offset) / ref_cell_size).ceil().as_ivec3() + IVec3::ONE;
        self.grid_offset = ref_grid_offset + grid_min.as_vec3() * ref_cell_size;
        self.voxels.resize((grid_max - grid_min).as_uvec3(), VoxelType::Interior);
        grid_min
    }

    /// Mark every voxel overlapped by the triangle as surface. Parts of the
    /// triangle outside the voxel grid are ignored.
    pub fn voxelize_triangle(&mut self, p1: Vec3, p2: Vec3, p3: Vec3) {
        if self.voxels.is_empty() {
            return;
        }
        let last = self.voxels.size().as_ivec3() - IVec3::ONE;
        let to_voxel = |p: Vec3| {
            ((p - self.grid_offset) / self.cell_size)
                .floor()
                .as_ivec3()
                .clamp(IVec3::ZERO, last)
                .as_uvec3()
        };
        let start = to_voxel(p1.min(p2).min(p3));
        let end = to_voxel(p1.max(p2).max(p3));

        let half_extent = Vec3::splat(0.5 * self.cell_size);
        for z in start.z..=end.z {
            for y in start.y..=end.y {
                for x in start.x..=end.x {
                    let voxel = UVec3::new(x, y, z);
                    if self.voxels[voxel] == VoxelType::Surface {
                        continue;
                    }
                    let center = self.grid_offset + (voxel.as_vec3() + 0.5) * self.cell_size;
                    if box_triangle_overlap(center, half_extent, p1, p2, p3) {
                        self.voxels[voxel] = VoxelType::Surface;
                    }
                }
            }
        }
    }

    pub fn voxelize_mesh_surface(&mut self, mesh: &Mesh) {
        for [a, b, c] in mesh.triangles() {
            self.voxelize_triangle(
                mesh.positions[a as usize],
                mesh.positions[b as usize],
                mesh.positions[c as usize],
            );
        }
    }

    /// Flood-fill exterior voxels from every non-surface voxel on the border.
    pub fn mark_exterior(&mut self) {
        let last = self.voxels.size().saturating_sub(UVec3::ONE);
        let mut stack: Vec<UVec3> = self
            .voxels
            .indices()
            .filter(|v| v.cmpeq(UVec3::ZERO).any() || v.cmpeq(last).any())
            .collect();
        stack.retain(|&v| self.voxels[v] == VoxelType::Interior);
        for &v in &stack {
            self.voxels[v] = VoxelType::Exterior;
        }

        while let Some(voxel) = stack.pop() {
            for offset in FACE_NEIGHBORS {
                if let Some(next) = self.voxels.neighbor(voxel, offset) {
                    if self.voxels[next] == VoxelType::Interior {
                        self.voxels[next] = VoxelType::Exterior;
                        stack.push(next);
                    }
                }
            }
        }
    }

    /// Reference-grid cells of the selected voxel kinds, where voxel (0, 0, 0)
    /// sits at `offset` in a reference grid of `ref_size` cells. Cells outside
    /// the reference grid are dropped.
    pub fn cells_in_reference(
        &self,
        offset: IVec3,
        ref_size: UVec3,
        include_interior: bool,
        include_surface: bool,
    ) -> Vec<UVec3> {
        self.voxels
            .indices()
            .filter(|&v| match self.voxels[v] {
                VoxelType::Interior => include_interior,
                VoxelType::Surface => include_surface,
                VoxelType::Exterior => false,
            })
            .map(|v| v.as_ivec3() + offset)
            .filter(|c| c.cmpge(IVec3::ZERO).all() && c.as_uvec3().cmplt(ref_size).all())
            .map(|c| c.as_uvec3())
            .collect()
    }
}

/// Cells of a reference grid that lie entirely inside a closed mesh.
pub fn interior_cells(mesh: &Mesh, cell_size: f32, grid_offset: Vec3, grid_size: UVec3) -> Result<Vec<UVec3>> {
    validate_cell_size(cell_size)?;
    let Some((min, max)) = mesh.bounds() else {
        return Ok(Vec::new());
    };
    let mut voxelizer = Voxelizer::new(cell_size);
    let offset = voxelizer.resize_reposition_aligned(min, max, cell_size, grid_offset);
    voxelizer.voxelize_mesh_surface(mesh);
    voxelizer.mark_exterior();
    Ok(voxelizer.cells_in_reference(offset, grid_size, true, false))
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    /// Closed axis-aligned box with 12 triangles.
    pub(crate) fn box_mesh(min: Vec3, max: Vec3) -> Mesh {
        let positions = (0..8)
            .map(|i| {
                Vec3::new(
                    if i & 1 == 0 { min.x } else { max.x },
                    if i & 2 == 0 { min.y } else { max.y },
                    if i & 4 == 0 { min.z } else { max.z },
                )
            })
            .collect();
        #[rustfmt::skip]
        let indices = vec![
            0, 2, 1, 1, 2, 3, // -z
            4, 5, 6, 5, 7, 6, // +z
            0, 1, 4, 1, 5, 4, // -y
            2, 6, 3, 3, 6, 7, // +y
            0, 4, 2, 2, 4, 6, // -x
            1, 3, 5, 3, 7, 5, // +x
        ];
        Mesh { positions, normals: Vec::new(), indices }
    }

    #[test]
    fn test_box_triangle_overlap() {
        let half = Vec3::splat(0.5);
        let (a, b, c) = (Vec3::new(-2.0, 0.0, -2.0), Vec3::new(2.0, 0.0, -2.0), Vec3::new(0.0, 0.0, 2.0));
        assert!(box_triangle_overlap(Vec3::ZERO, half, a, b, c));
        assert!(box_triangle_overlap(Vec3::new(0.0, 0.5, 0.0), half, a, b, c));
        assert!(!box_triangle_overlap(Vec3::new(0.0, 0.6, 0.0), half, a, b, c));
        assert!(!box_triangle_overlap(Vec3::new(5.0, 0.0, 0.0), half, a, b, c));

        // Tilted triangle whose bounding box covers the box but whose plane
        // misses it.
        let (a, b, c) = (Vec3::new(1.6, 0.0, 0.0), Vec3::new(0.0, 1.6, 0.0), Vec3::new(0.0, 0.0, 1.6));
        assert!(!box_triangle_overlap(Vec3::ZERO, half, a, b, c));
    }

    #[test]
    fn test_resize_reposition_pads_and_centers() {
        let mut voxelizer = Voxelizer::new(0.5);
        voxelizer.resize_reposition(Vec3::ZERO, Vec3::new(1.0, 0.75, 0.0));
        assert_eq!(voxelizer.voxels().size(), UVec3::new(4, 4, 2));
        assert!((voxelizer.grid_offset - Vec3::new(-0.5, -0.625, -0.5)).length() < 1e-6);
    }

    #[test]
    fn test_aligned_grid_offset() {
        let mut voxelizer = Voxelizer::new(1.0);
        let offset = voxelizer.resize_reposition_aligned(
            Vec3::new(1.1, 1.1, 1.1),
            Vec3::new(1.9, 1.9, 1.9),
            0.25,
            Vec3::ZERO,
        );
        assert_eq!(offset, IVec3::splat(3));
        assert_eq!(voxelizer.voxels().size(), UVec3::splat(6));
        assert!((voxelizer.grid_offset - Vec3::splat(0.75)).length() < 1e-6);
    }

    #[test]
    fn test_closed_box_has_exact_interior() {
        let mesh = box_mesh(Vec3::splat(1.1), Vec3::splat(1.9));
        let mut voxelizer = Voxelizer::new(0.25);
        let offset = voxelizer.resize_reposition_aligned(Vec3::splat(1.1), Vec3::splat(1.9), 0.25, Vec3::ZERO);
        voxelizer.voxelize_mesh_surface(&mesh);
        voxelizer.mark_exterior();

        let count = |kind| voxelizer.voxels().iter().filter(|&&t| t == kind).count();
        assert_eq!(count(VoxelType::Surface), 56);
        assert_eq!(count(VoxelType::Interior), 8);
        assert_eq!(count(VoxelType::Exterior), 6 * 6 * 6 - 64);

        let mut cells = voxelizer.cells_in_reference(offset, UVec3::splat(8), true, false);
        cells.sort_by_key(|c| (c.z, c.y, c.x));
        let mut expected = Vec::new();
        for z in 5..=6 {
            for y in 5..=6 {
                for x in 5..=6 {
                    expected.push(UVec3::new(x, y, z));
                }
            }
        }
        assert_eq!(cells, expected);
    }

    #[test]
    fn test_open_mesh_has_no_interior() {
        let mut mesh = box_mesh(Vec3::splat(1.1), Vec3::splat(1.9));
        mesh.indices.truncate(30);
        let cells = interior_cells(&mesh, 0.25, Vec3::ZERO, UVec3::splat(8)).unwrap();
        assert!(cells.is_empty());
    }

    #[test]
    fn test_interior_cells_clip_to_reference_grid() {
        let mesh = box_mesh(Vec3::splat(1.1), Vec3::splat(1.9));
        let cells = interior_cells(&mesh, 0.25, Vec3::ZERO, UVec3::splat(6)).unwrap();
        assert_eq!(cells, vec![UVec3::splat(5)]);

        assert!(interior_cells(&Mesh::default(), 0.25, Vec3::ZERO, UVec3::splat(6)).unwrap().is_empty());
        assert!(interior_cells(&mesh, 0.0, Vec3::ZERO, UVec3::splat(6)).is_err());
    }
}
