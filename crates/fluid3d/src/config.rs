//! Simulation parameters and host-level configuration.
//!
//! Everything here round-trips through JSON. Missing fields take their
//! defaults, so a config file only needs the values it changes.

use std::path::Path;

use glam::{IVec3, UVec3, Vec3};
use serde::{Deserialize, Serialize};

use crate::constants::{
    DEFAULT_CFL_NUMBER, DEFAULT_FLIP_BLEND, DEFAULT_SEED_DENSITY, DEFAULT_SKIN_WIDTH, FLUID_DENSITY,
    GRAVITY,
};
use crate::error::Result;
use crate::pressure::SolverSettings;
use crate::serde_utils::{ivec3_serde, vec3_serde};
use crate::transfer::TransferMethod;

/// Engine parameters.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulationParams {
    /// Size of each cell in world units
    pub cell_size: f32,
    /// World position of the minimum corner of cell (0, 0, 0)
    #[serde(with = "vec3_serde")]
    pub grid_offset: Vec3,
    #[serde(with = "vec3_serde")]
    pub gravity: Vec3,
    pub transfer_method: TransferMethod,
    /// FLIP/PIC blend ratio (0.97 = 97% FLIP, 3% PIC)
    pub flip_blend: f32,
    /// Substep length as a multiple of the CFL limit
    pub cfl_number: f32,
    /// Distance particles are kept from the domain walls
    pub boundary_skin_width: f32,
    /// Fluid density for the pressure solve
    pub density: f32,
    /// Seed of the jitter random number generator
    pub seed: u64,
    /// Enable the particle separation pass
    pub spring_forces: bool,
    pub solver: SolverSettings,
}

impl Default for SimulationParams {
    fn default() -> Self {
        Self {
            cell_size: 1.0,
            grid_offset: Vec3::ZERO,
            gravity: Vec3::new(0.0, GRAVITY, 0.0),
            transfer_method: TransferMethod::default(),
            flip_blend: DEFAULT_FLIP_BLEND,
            cfl_number: DEFAULT_CFL_NUMBER,
            boundary_skin_width: DEFAULT_SKIN_WIDTH,
            density: FLUID_DENSITY,
            seed: 0,
            spring_forces: false,
            solver: SolverSettings::default(),
        }
    }
}

/// A region filled with particles when a simulation starts.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum SeedRegion {
    Sphere {
        #[serde(with = "vec3_serde")]
        center: Vec3,
        radius: f32,
        density: u32,
    },
    Box {
        #[serde(with = "vec3_serde")]
        origin: Vec3,
        #[serde(with = "vec3_serde")]
        size: Vec3,
        density: u32,
    },
}

/// Inclusive box of solid cells.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SolidBox {
    #[serde(with = "ivec3_serde")]
    pub min: IVec3,
    #[serde(with = "ivec3_serde")]
    pub max: IVec3,
}

/// Cells that are topped up with particles every substep.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FluidSource {
    pub cells: Vec<[u32; 3]>,
    #[serde(with = "vec3_serde")]
    pub velocity: Vec3,
    pub active: bool,
    /// Overwrite the velocity of every particle inside the source cells
    pub coerce_velocity: bool,
    /// Particles per cell along each axis
    pub density: u32,
}

impl FluidSource {
    pub fn cell_indices(&self) -> impl Iterator<Item = UVec3> + '_ {
        self.cells.iter().map(|&c| UVec3::from_array(c))
    }
}

impl Default for FluidSource {
    fn default() -> Self {
        Self {
            cells: Vec::new(),
            velocity: Vec3::ZERO,
            active: true,
            coerce_velocity: false,
            density: DEFAULT_SEED_DENSITY,
        }
    }
}

/// Everything a host needs to build and drive a simulation.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulationConfig {
    /// Cell counts per axis; negative values are rejected on use
    #[serde(with = "ivec3_serde")]
    pub grid_size: IVec3,
    pub params: SimulationParams,
    /// Seconds of simulated time per frame
    pub frame_time: f32,
    pub seed_regions: Vec<SeedRegion>,
    pub solids: Vec<SolidBox>,
    pub sources: Vec<FluidSource>,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            grid_size: IVec3::splat(50),
            params: SimulationParams::default(),
            frame_time: 1.0 / 24.0,
            seed_regions: vec![SeedRegion::Sphere {
                center: Vec3::splat(25.0),
                radius: 15.0,
                density: DEFAULT_SEED_DENSITY,
            }],
            solids: Vec::new(),
            sources: Vec::new(),
        }
    }
}

impl SimulationConfig {
    /// Whether `other` differs in anything other than the frame time.
    pub fn requires_resimulation(&self, other: &SimulationConfig) -> bool {
        let mut other = other.clone();
        other.frame_time = self.frame_time;
        *self != other
    }

    pub fn from_json_str(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Save configuration to JSON file
    pub fn save_json(&self, path: impl AsRef<Path>) -> Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)?;
        Ok(())
    }

    /// Load configuration from JSON file
    pub fn load_json(path: impl AsRef<Path>) -> Result<Self> {
        let json = std::fs::read_to_string(path)?;
        Self::from_json_str(&json)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let params = SimulationParams::default();
        assert_eq!(params.transfer_method, TransferMethod::FlipBlend);
        assert_eq!(params.gravity, Vec3::new(0.0, -9.81, 0.0));
        assert_eq!(params.cfl_number, 3.0);
        assert_eq!(params.solver.max_iterations, 100);
        assert!(!params.spring_forces);
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let json = r#"{
            "grid_size": { "x": 8, "y": 4, "z": 8 },
            "params": { "cell_size": 0.25, "transfer_method": "Apic" },
            "seed_regions": [
                { "Box": { "origin": { "x": 0.0, "y": 0.0, "z": 0.0 },
                           "size": { "x": 1.0, "y": 1.0, "z": 1.0 }, "density": 2 } }
            ]
        }"#;
        let config = SimulationConfig::from_json_str(json).unwrap();
        assert_eq!(config.grid_size, IVec3::new(8, 4, 8));
        assert_eq!(config.params.cell_size, 0.25);
        assert_eq!(config.params.transfer_method, TransferMethod::Apic);
        assert_eq!(config.params.flip_blend, DEFAULT_FLIP_BLEND);
        assert_eq!(config.frame_time, 1.0 / 24.0);
        assert!(matches!(config.seed_regions[0], SeedRegion::Box { density: 2, .. }));
    }

    #[test]
    fn test_json_file_round_trip() {
        let mut config = SimulationConfig::default();
        config.grid_size = IVec3::new(-1, 3, 3);
        config.solids.push(SolidBox { min: IVec3::ZERO, max: IVec3::new(2, 0, 2) });
        config.sources.push(FluidSource { cells: vec![[1, 2, 3]], ..Default::default() });

        let path = std::env::temp_dir().join(format!("fluid3d_config_{}.json", std::process::id()));
        config.save_json(&path).unwrap();
        let loaded = SimulationConfig::load_json(&path).unwrap();
        std::fs::remove_file(&path).ok();

        assert_eq!(loaded, config);
    }

    #[test]
    fn test_missing_file_is_io_error() {
        let err = SimulationConfig::load_json("/nonexistent/fluid3d.json").unwrap_err();
        assert!(matches!(err, crate::error::ConfigError::Io(_)));
    }

    #[test]
    fn test_frame_time_does_not_require_resimulation() {
        let base = SimulationConfig::default();
        let mut later = base.clone();
        later.frame_time = 1.0 / 30.0;
        assert!(!base.requires_resimulation(&later));

        later.params.gravity = Vec3::ZERO;
        assert!(base.requires_resimulation(&later));
    }
}
