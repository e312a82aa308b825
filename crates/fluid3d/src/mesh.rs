//! Indexed triangle mesh produced by the surface mesher.

use glam::Vec3;

#[derive(Clone, Debug, Default, PartialEq)]
pub struct Mesh {
    /// World-space vertex positions
    pub positions: Vec<Vec3>,
    /// Unit vertex normals, one per position once generated
    pub normals: Vec<Vec3>,
    /// Three indices per triangle, counter-clockwise seen from outside
    pub indices: Vec<u32>,
}

impl Mesh {
    pub fn triangle_count(&self) -> usize {
        self.indices.len() / 3
    }

    pub fn is_empty(&self) -> bool {
        self.indices.is_empty()
    }

    pub fn triangles(&self) -> impl Iterator<Item = [u32; 3]> + '_ {
        self.indices.chunks_exact(3).map(|t| [t[0], t[1], t[2]])
    }

    /// Area-weighted vertex normals. Vertices with no usable triangle get +X.
    pub fn generate_normals(&mut self) {
        let mut normals = vec![Vec3::ZERO; self.positions.len()];
        for [a, b, c] in self.triangles() {
            let (pa, pb, pc) = (
                self.positions[a as usize],
                self.positions[b as usize],
                self.positions[c as usize],
            );
            // Cross product length is twice the area.
            let n = (pb - pa).cross(pc - pa);
            normals[a as usize] += n;
            normals[b as usize] += n;
            normals[c as usize] += n;
        }
        for n in &mut normals {
            *n = n.try_normalize().unwrap_or(Vec3::X);
        }
        self.normals = normals;
    }

    /// Axis-aligned bounds as (min, max), `None` for a mesh with no vertices.
    pub fn bounds(&self) -> Option<(Vec3, Vec3)> {
        let first = *self.positions.first()?;
        Some(
            self.positions
                .iter()
                .fold((first, first), |(lo, hi), &p| (lo.min(p), hi.max(p))),
        )
    }
}
