//! Marker particles carrying fluid velocity.

use glam::{Mat3, UVec3, Vec3};

/// A single fluid marker particle.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Particle {
    /// World position
    pub position: Vec3,
    /// Current velocity
    pub velocity: Vec3,
    /// Cell that contained the particle at the last rehash
    pub grid_index: UVec3,
    /// APIC affine vectors, one column per velocity component.
    ///
    /// Column `a` is the spatial gradient of velocity component `a`, so the
    /// affine velocity of component `a` at offset `d` is `column(a).dot(d)`.
    pub affine_velocity: Mat3,
}

impl Particle {
    /// Create a new particle at the given position with initial velocity.
    pub fn new(position: Vec3, velocity: Vec3) -> Self {
        Self {
            position,
            velocity,
            grid_index: UVec3::ZERO,
            affine_velocity: Mat3::ZERO,
        }
    }

    /// Create a stationary particle at the given position.
    pub fn at(position: Vec3) -> Self {
        Self::new(position, Vec3::ZERO)
    }
}

impl Default for Particle {
    fn default() -> Self {
        Self::at(Vec3::ZERO)
    }
}

/// Collection of particles in stable order.
#[derive(Clone, Debug, Default)]
pub struct Particles {
    pub list: Vec<Particle>,
}

impl Particles {
    pub fn new() -> Self {
        Self { list: Vec::new() }
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self { list: Vec::with_capacity(capacity) }
    }

    /// Add a particle with the given position and velocity.
    pub fn spawn(&mut self, position: Vec3, velocity: Vec3) {
        self.list.push(Particle::new(position, velocity));
    }

    /// Add a stationary particle.
    pub fn spawn_at(&mut self, position: Vec3) {
        self.list.push(Particle::at(position));
    }

    pub fn len(&self) -> usize {
        self.list.len()
    }

    pub fn is_empty(&self) -> bool {
        self.list.is_empty()
    }

    pub fn clear(&mut self) {
        self.list.clear();
    }

    /// Positions in particle order.
    pub fn positions(&self) -> Vec<Vec3> {
        self.list.iter().map(|p| p.position).collect()
    }

    /// Largest particle speed, zero when empty.
    pub fn max_speed(&self) -> f32 {
        self.list.iter().map(|p| p.velocity.length()).fold(0.0, f32::max)
    }
}

impl From<Vec<Particle>> for Particles {
    fn from(list: Vec<Particle>) -> Self {
        Self { list }
    }
}
