//! 3D Grid-Based Fluid Simulation
//!
//! Particles carry the fluid; a MAC grid enforces incompressibility each
//! substep with a MIC(0)-preconditioned conjugate gradient solve. Velocities
//! move between the two with PIC, FLIP or APIC transfers. A marching-cubes
//! mesher turns particle positions into a surface mesh.
//!
//! # Example
//!
//! ```
//! use fluid3d::{IVec3, Simulation, SimulationParams, Vec3};
//!
//! let params = SimulationParams { cell_size: 0.1, ..Default::default() };
//! let mut sim = Simulation::with_size(IVec3::new(8, 8, 8), params).unwrap();
//!
//! // Fill a block of cells with 2x2x2 particles each
//! sim.seed_box(Vec3::new(0.2, 0.3, 0.2), Vec3::splat(0.4), 2);
//!
//! // Advance one frame
//! let report = sim.update(1.0 / 60.0);
//! assert!(!report.substeps.is_empty());
//! ```

pub mod array3;
pub mod cache;
pub mod config;
pub mod constants;
pub mod error;
pub mod grid;
pub mod kernels;
pub mod marching_cubes;
pub mod mesh;
pub mod mesher;
pub mod particle;
pub mod pressure;
pub mod serde_utils;
pub mod simulation;
pub mod space_hash;
pub mod springs;
pub mod transfer;
pub mod voxelizer;

pub use array3::Array3;
pub use cache::FrameCache;
pub use config::{FluidSource, SeedRegion, SimulationConfig, SimulationParams, SolidBox};
pub use error::{ConfigError, Result};
pub use glam::{IVec3, Mat3, UVec3, Vec3};
pub use grid::{Cell, CellType, FluidGrid, GridSlots};
pub use mesh::Mesh;
pub use mesher::Mesher;
pub use particle::{Particle, Particles};
pub use pressure::{PressureSolution, PressureSolver, SolverSettings};
pub use simulation::{Simulation, StepStats, UpdateReport};
pub use space_hash::SpaceHash;
pub use transfer::{Apic, FlipBlend, Pic, TransferMethod, TransferScheme};
pub use voxelizer::{interior_cells, VoxelType, Voxelizer};
