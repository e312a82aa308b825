//! Configuration errors.
//!
//! Numerical edge cases (solver non-convergence, empty kernel support) are not
//! errors; they are reported through return values and the log.

use thiserror::Error;

/// Structural misconfiguration that the caller has to fix.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("grid dimension on axis {axis} is negative: {value}")]
    NegativeDimension { axis: usize, value: i32 },

    #[error("cell size must be positive and finite, got {0}")]
    NonPositiveCellSize(f32),

    #[error("particle radius {radius} must be positive and smaller than the kernel extent {extent}")]
    InvalidParticleRadius { radius: f32, extent: f32 },

    #[error("unknown transfer method {0}, expected 0 (PIC), 1 (FLIP) or 2 (APIC)")]
    UnknownTransferMethod(i32),

    #[error("failed to access config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse config: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, ConfigError>;

/// Validates a signed grid size, returning the unsigned dimensions.
pub fn validate_dimensions(dims: glam::IVec3) -> Result<glam::UVec3> {
    for (axis, value) in dims.to_array().into_iter().enumerate() {
        if value < 0 {
            return Err(ConfigError::NegativeDimension { axis, value });
        }
    }
    Ok(dims.as_uvec3())
}

/// Validates a world-space cell size.
pub fn validate_cell_size(cell_size: f32) -> Result<f32> {
    if cell_size.is_finite() && cell_size > 0.0 {
        Ok(cell_size)
    } else {
        Err(ConfigError::NonPositiveCellSize(cell_size))
    }
}
