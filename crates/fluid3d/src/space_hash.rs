//! Uniform-grid spatial hash mapping cells to the objects inside them.
//!
//! Each cell holds the head of a singly linked chain stored in one shared
//! vector, so a full rebuild is `clear()` followed by one `insert` per object
//! with no per-cell allocation. Cells are visited in index order when a
//! neighborhood is queried.

use glam::UVec3;

use crate::array3::Array3;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
struct Bucket {
    head: u32,
    count: u32,
}

#[derive(Clone, Copy, Debug)]
struct Link<T> {
    item: T,
    next: u32,
}

/// Spatial hash over a fixed-size grid of cells.
#[derive(Clone, Debug)]
pub struct SpaceHash<T = usize> {
    cell_head: Array3<Bucket>,
    chain: Vec<Link<T>>,
    occupied: Vec<usize>,
}

impl<T: Copy> SpaceHash<T> {
    pub fn new(size: UVec3) -> Self {
        Self {
            cell_head: Array3::new(size, Bucket::default()),
            chain: Vec::new(),
            occupied: Vec::new(),
        }
    }

    /// Resize the table, dropping every stored object.
    pub fn resize(&mut self, size: UVec3) {
        self.cell_head.resize(size, Bucket::default());
        self.chain.clear();
        self.occupied.clear();
    }

    pub fn size(&self) -> UVec3 {
        self.cell_head.size()
    }

    /// Remove all objects, keeping the table size.
    pub fn clear(&mut self) {
        for &raw in &self.occupied {
            self.cell_head.as_mut_slice()[raw] = Bucket::default();
        }
        self.chain.clear();
        self.occupied.clear();
    }

    /// Total number of stored objects.
    pub fn len(&self) -> usize {
        self.chain.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chain.is_empty()
    }

    /// Insert an object into `cell`. Returns `false` and stores nothing when
    /// the cell is outside the table.
    pub fn insert(&mut self, cell: UVec3, item: T) -> bool {
        if !self.cell_head.contains(cell) {
            return false;
        }
        let raw = self.cell_head.index_to_raw(cell);
        self.insert_raw(raw, item);
        true
    }

    /// Insert by linear cell offset. The offset must be in range.
    pub fn insert_raw(&mut self, raw: usize, item: T) {
        let next = self.chain.len() as u32;
        let bucket = &mut self.cell_head.as_mut_slice()[raw];
        if bucket.count == 0 {
            self.occupied.push(raw);
        }
        self.chain.push(Link { item, next: bucket.head });
        bucket.head = next;
        bucket.count += 1;
    }

    /// Number of objects in `cell`; zero when out of range.
    pub fn count_at(&self, cell: UVec3) -> usize {
        self.cell_head.get(cell).map_or(0, |b| b.count as usize)
    }

    /// Objects stored in `cell`, most recently inserted first.
    pub fn objects_at(&self, cell: UVec3) -> Chain<'_, T> {
        let bucket = self.cell_head.get(cell).copied().unwrap_or_default();
        Chain { chain: &self.chain, next: bucket.head, remaining: bucket.count }
    }

    /// Visit every object in the box of cells from `center - below` to
    /// `center + above` inclusive, clamped to the table.
    pub fn for_each_nearby(&self, center: UVec3, below: UVec3, above: UVec3, mut f: impl FnMut(T)) {
        let size = self.cell_head.size();
        if size.cmpeq(UVec3::ZERO).any() {
            return;
        }
        let min = center.saturating_sub(below);
        let max = center.saturating_add(above).min(size - UVec3::ONE);
        for z in min.z..=max.z {
            for y in min.y..=max.y {
                for x in min.x..=max.x {
                    for item in self.objects_at(UVec3::new(x, y, z)) {
                        f(item);
                    }
                }
            }
        }
    }

    /// Occupied cells in storage order, without duplicates.
    pub fn sorted_occupied_cells(&self) -> Vec<UVec3> {
        let mut raw = self.occupied.clone();
        raw.sort_unstable();
        raw.into_iter().map(|r| self.cell_head.index_from_raw(r)).collect()
    }
}

/// Iterator over one cell's chain.
pub struct Chain<'a, T> {
    chain: &'a [Link<T>],
    next: u32,
    remaining: u32,
}

impl<T: Copy> Iterator for Chain<'_, T> {
    type Item = T;

    fn next(&mut self) -> Option<T> {
        if self.remaining == 0 {
            return None;
        }
        let link = self.chain[self.next as usize];
        self.remaining -= 1;
        self.next = link.next;
        Some(link.item)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (self.remaining as usize, Some(self.remaining as usize))
    }
}
