//! Physical and numerical constants for the simulation.

/// Gravity acceleration (m/s^2) - negative Y direction
pub const GRAVITY: f32 = -9.81;

/// Fluid density used by the pressure projection (water = 1.0)
pub const FLUID_DENSITY: f32 = 1.0;

/// Summed kernel weight below which a face receives zero velocity
pub const MIN_KERNEL_WEIGHT: f32 = 1e-6;

/// FLIP/PIC blend ratio (0.97 = 97% FLIP, 3% PIC)
pub const DEFAULT_FLIP_BLEND: f32 = 0.97;

/// Substep length as a multiple of the CFL limit
pub const DEFAULT_CFL_NUMBER: f32 = 3.0;

/// Distance particles are kept from the domain walls (world units)
pub const DEFAULT_SKIN_WIDTH: f32 = 1e-3;

/// Particles per cell along each axis when seeding
pub const DEFAULT_SEED_DENSITY: u32 = 2;

/// Largest per-axis seed density; larger requests are capped
pub const MAX_SEED_DENSITY: u32 = 32;

// =============================================================================
// PRESSURE SOLVER (MIC(0) preconditioned conjugate gradient)
// =============================================================================

/// Iteration cap for one pressure solve
pub const SOLVER_MAX_ITERATIONS: usize = 100;

/// Convergence threshold relative to the max-norm of the right-hand side
pub const SOLVER_TOLERANCE: f64 = 1e-6;

/// Modified incomplete Cholesky blend
pub const MIC_TAU: f64 = 0.97;

/// Safety factor below which the MIC diagonal falls back to plain IC
pub const MIC_SIGMA: f64 = 0.25;

// =============================================================================
// MESHER
// =============================================================================

/// Radial kernel support for surface reconstruction (world units)
pub const DEFAULT_PARTICLE_EXTENT: f32 = 0.5;

/// Neighborhood searched around each sample vertex (cells)
pub const DEFAULT_CELL_RADIUS: u32 = 2;

/// Iso-value of the normalized particle field
pub const SURFACE_ISO_VALUE: f32 = 1.0;
