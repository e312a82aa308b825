//! Frame cache for hosts that request particle positions by frame number.
//!
//! Frames are produced in order and kept until the configuration changes.
//! Requesting a frame past the end simulates forward from the last cached
//! state; earlier frames are returned from the cache.

use glam::{IVec3, Vec3};

use crate::config::{SeedRegion, SimulationConfig};
use crate::error::Result;
use crate::simulation::Simulation;

pub struct FrameCache {
    config: SimulationConfig,
    frames: Vec<Vec<Vec3>>,
    /// Simulation state after the last cached frame, random generator included
    simulation: Option<Simulation>,
}

impl FrameCache {
    pub fn new(config: SimulationConfig) -> Self {
        Self { config, frames: Vec::new(), simulation: None }
    }

    pub fn config(&self) -> &SimulationConfig {
        &self.config
    }

    /// Number of frames simulated so far.
    pub fn frame_count(&self) -> usize {
        self.frames.len()
    }

    /// Replace the configuration. Cached frames are kept if only the frame
    /// time changed.
    pub fn set_config(&mut self, config: SimulationConfig) {
        if self.config.requires_resimulation(&config) {
            self.invalidate();
        }
        self.config = config;
    }

    /// Drop every cached frame and the live simulation.
    pub fn invalidate(&mut self) {
        if !self.frames.is_empty() {
            log::info!("invalidating {} cached frames", self.frames.len());
        }
        self.frames.clear();
        self.simulation = None;
    }

    /// Particle positions at `frame`, simulating forward as needed.
    pub fn positions(&mut self, frame: usize) -> Result<&[Vec3]> {
        if frame >= self.frames.len() {
            let mut sim = match self.simulation.take() {
                Some(sim) => sim,
                None => build_simulation(&self.config)?,
            };
            while frame >= self.frames.len() {
                sim.update(self.config.frame_time);
                self.frames.push(sim.particles.positions());
            }
            log::debug!("simulated up to frame {} ({} particles)", frame, sim.particle_count());
            self.simulation = Some(sim);
        }
        Ok(&self.frames[frame])
    }
}

/// Fresh simulation for `config`: grid, solids, sources and seeded fluid.
fn build_simulation(config: &SimulationConfig) -> Result<Simulation> {
    let mut sim = Simulation::with_size(config.grid_size, config.params.clone())?;
    for solid in &config.solids {
        let min = solid.min.max(IVec3::ZERO).as_uvec3();
        let max = solid.max;
        if max.cmplt(IVec3::ZERO).any() {
            continue;
        }
        sim.fill_solid_box(min, max.as_uvec3());
    }
    sim.sources = config.sources.clone();

    for region in &config.seed_regions {
        match *region {
            SeedRegion::Sphere { center, radius, density } => {
                sim.seed_sphere(center, radius, density);
            }
            SeedRegion::Box { origin, size, density } => {
                sim.seed_box(origin, size, density);
            }
        }
    }
    Ok(sim)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn small_config() -> SimulationConfig {
        SimulationConfig {
            grid_size: IVec3::splat(6),
            seed_regions: vec![SeedRegion::Box {
                origin: Vec3::new(1.0, 2.0, 1.0),
                size: Vec3::splat(2.0),
                density: 2,
            }],
            ..SimulationConfig::default()
        }
    }

    #[test]
    fn test_frames_are_appended_in_order() {
        let mut cache = FrameCache::new(small_config());
        let count = cache.positions(2).unwrap().len();
        assert_eq!(cache.frame_count(), 3);
        assert_eq!(count, 64);

        let first = cache.positions(0).unwrap().to_vec();
        assert_eq!(cache.frame_count(), 3);
        assert_eq!(first.len(), 64);
    }

    #[test]
    fn test_frame_time_change_keeps_frames() {
        let mut cache = FrameCache::new(small_config());
        cache.positions(1).unwrap();

        let mut config = small_config();
        config.frame_time = 1.0 / 30.0;
        cache.set_config(config);
        assert_eq!(cache.frame_count(), 2);

        let mut config = small_config();
        config.params.gravity = Vec3::ZERO;
        cache.set_config(config);
        assert_eq!(cache.frame_count(), 0);
    }

    #[test]
    fn test_negative_grid_is_reported() {
        let mut config = small_config();
        config.grid_size = IVec3::new(6, -6, 6);
        let mut cache = FrameCache::new(config);
        assert!(cache.positions(0).is_err());
        assert_eq!(cache.frame_count(), 0);
    }
}
