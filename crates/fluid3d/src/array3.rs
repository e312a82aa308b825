//! Dense 3D array addressed by cell index.
//!
//! Storage is row-major with X varying fastest, then Y, then Z. All neighbor
//! lookups in the crate go through [`Array3::neighbor`], which is the single
//! bounds-checked place where signed offsets are applied to unsigned indices.

use std::ops::{Index, IndexMut};

use glam::{IVec3, UVec3};

/// 3D index of linear offset `raw` in an array of `size`.
///
/// Usable from parallel loops that hold the storage mutably.
#[inline]
pub fn unravel(size: UVec3, raw: usize) -> UVec3 {
    let sx = size.x as usize;
    let sy = size.y as usize;
    UVec3::new(
        (raw % sx) as u32,
        ((raw / sx) % sy) as u32,
        (raw / (sx * sy)) as u32,
    )
}

#[derive(Debug, Default, PartialEq)]
pub struct Array3<T> {
    size: UVec3,
    data: Vec<T>,
}

impl<T: Clone> Array3<T> {
    /// Create an array of the given size with every element set to `value`.
    pub fn new(size: UVec3, value: T) -> Self {
        let len = (size.x as usize) * (size.y as usize) * (size.z as usize);
        Self { size, data: vec![value; len] }
    }

    /// Reallocate to a new size, resetting every element to `value`.
    pub fn resize(&mut self, size: UVec3, value: T) {
        let len = (size.x as usize) * (size.y as usize) * (size.z as usize);
        self.size = size;
        self.data.clear();
        self.data.resize(len, value);
    }

    pub fn fill(&mut self, value: T) {
        self.data.fill(value);
    }
}

impl<T> Array3<T> {
    /// Build an array by evaluating `f` at every index.
    pub fn from_fn(size: UVec3, mut f: impl FnMut(UVec3) -> T) -> Self {
        let len = (size.x as usize) * (size.y as usize) * (size.z as usize);
        let mut data = Vec::with_capacity(len);
        for z in 0..size.z {
            for y in 0..size.y {
                for x in 0..size.x {
                    data.push(f(UVec3::new(x, y, z)));
                }
            }
        }
        Self { size, data }
    }

    #[inline]
    pub fn size(&self) -> UVec3 {
        self.size
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.data.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Linear offset of a 3D index.
    #[inline]
    pub fn index_to_raw(&self, index: UVec3) -> usize {
        let sx = self.size.x as usize;
        let sy = self.size.y as usize;
        index.x as usize + sx * (index.y as usize + sy * index.z as usize)
    }

    /// 3D index of a linear offset.
    #[inline]
    pub fn index_from_raw(&self, raw: usize) -> UVec3 {
        unravel(self.size, raw)
    }

    #[inline]
    pub fn contains(&self, index: UVec3) -> bool {
        index.cmplt(self.size).all()
    }

    /// Signed variant of [`Array3::contains`].
    #[inline]
    pub fn contains_signed(&self, index: IVec3) -> bool {
        index.cmpge(IVec3::ZERO).all() && index.as_uvec3().cmplt(self.size).all()
    }

    /// Index of `index + offset`, or `None` when it falls outside the array.
    #[inline]
    pub fn neighbor(&self, index: UVec3, offset: IVec3) -> Option<UVec3> {
        let target = index.as_ivec3() + offset;
        self.contains_signed(target).then(|| target.as_uvec3())
    }

    pub fn get(&self, index: UVec3) -> Option<&T> {
        if self.contains(index) {
            Some(&self.data[self.index_to_raw(index)])
        } else {
            None
        }
    }

    pub fn get_mut(&mut self, index: UVec3) -> Option<&mut T> {
        if self.contains(index) {
            let raw = self.index_to_raw(index);
            Some(&mut self.data[raw])
        } else {
            None
        }
    }

    /// Element at `index + offset`, if in bounds.
    #[inline]
    pub fn get_neighbor(&self, index: UVec3, offset: IVec3) -> Option<&T> {
        self.neighbor(index, offset).map(|n| &self[n])
    }

    #[inline]
    pub fn as_slice(&self) -> &[T] {
        &self.data
    }

    #[inline]
    pub fn as_mut_slice(&mut self) -> &mut [T] {
        &mut self.data
    }

    pub fn iter(&self) -> std::slice::Iter<'_, T> {
        self.data.iter()
    }

    /// All indices in storage order.
    pub fn indices(&self) -> impl Iterator<Item = UVec3> + '_ {
        (0..self.data.len()).map(move |raw| self.index_from_raw(raw))
    }
}

impl<T: Clone> Clone for Array3<T> {
    fn clone(&self) -> Self {
        Self { size: self.size, data: self.data.clone() }
    }

    fn clone_from(&mut self, source: &Self) {
        self.size = source.size;
        self.data.clone_from(&source.data);
    }
}

impl<T> Index<UVec3> for Array3<T> {
    type Output = T;

    #[inline]
    fn index(&self, index: UVec3) -> &T {
        debug_assert!(self.contains(index), "index {index} out of bounds for {}", self.size);
        &self.data[self.index_to_raw(index)]
    }
}

impl<T> IndexMut<UVec3> for Array3<T> {
    #[inline]
    fn index_mut(&mut self, index: UVec3) -> &mut T {
        debug_assert!(self.contains(index), "index {index} out of bounds for {}", self.size);
        let raw = self.index_to_raw(index);
        &mut self.data[raw]
    }
}
