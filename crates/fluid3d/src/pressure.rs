//! Pressure projection for the 3D MAC grid.
//!
//! Solves `A p = b` over the fluid cells only, with MIC(0) preconditioned
//! conjugate gradient (Bridson, "Fluid Simulation for Computer Graphics").
//!
//! - Air neighbors are Dirichlet boundaries with zero pressure.
//! - Solid neighbors and the domain walls are Neumann boundaries: their faces
//!   carry zero velocity and drop out of the matrix.
//!
//! The matrix is never stored. Each fluid cell keeps its count of non-solid
//! neighbors (the diagonal) and flags for fluid neighbors in +x, +y and +z.
//! Both are scaled by `dt / (density * h^2)`.

use glam::{IVec3, UVec3};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::array3::{unravel, Array3};
use crate::constants::{MIC_SIGMA, MIC_TAU, SOLVER_MAX_ITERATIONS, SOLVER_TOLERANCE};
use crate::grid::{CellType, FluidGrid, AXES};

/// Tuning of the iterative solve.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SolverSettings {
    /// Iteration cap; reaching it is reported but not fatal
    pub max_iterations: usize,
    /// Residual threshold relative to the max-norm of the right-hand side
    pub tolerance: f64,
    /// Modified incomplete Cholesky blend (0 = IC, 1 = full MIC)
    pub tau: f64,
    /// Fallback threshold for small preconditioner diagonals
    pub sigma: f64,
}

impl Default for SolverSettings {
    fn default() -> Self {
        Self {
            max_iterations: SOLVER_MAX_ITERATIONS,
            tolerance: SOLVER_TOLERANCE,
            tau: MIC_TAU,
            sigma: MIC_SIGMA,
        }
    }
}

/// Result of one pressure solve.
#[derive(Clone, Debug, Default)]
pub struct PressureSolution {
    /// One value per fluid cell, in the solver's fluid cell order
    pub pressure: Vec<f64>,
    /// Max-norm of the final residual
    pub residual: f64,
    pub iterations: usize,
    pub converged: bool,
}

impl PressureSolution {
    pub fn max_pressure(&self) -> f64 {
        self.pressure.iter().copied().fold(0.0, f64::max)
    }
}

#[derive(Clone, Copy, Debug, Default)]
struct CellCoefficients {
    /// Diagonal of A before scaling
    nonsolid_neighbors: u8,
    /// Whether the +x, +y, +z neighbors are fluid unknowns
    fluid_pos: [bool; 3],
}

/// Pressure system over a frozen fluid/air/solid classification.
pub struct PressureSolver {
    settings: SolverSettings,
    fluid_cells: Vec<UVec3>,
    fluid_index: Array3<Option<u32>>,
    solid: Array3<bool>,
    coefficients: Vec<CellCoefficients>,
}

impl PressureSolver {
    /// Build the system for `fluid_cells`.
    ///
    /// Cells that are out of range or not classified fluid are dropped, and
    /// the rest are put in storage order so the incomplete Cholesky sweeps
    /// see lower neighbors first.
    pub fn new(grid: &FluidGrid, mut fluid_cells: Vec<UVec3>, settings: SolverSettings) -> Self {
        let cells = grid.cells();
        fluid_cells.retain(|&c| cells.get(c).is_some_and(|cell| cell.cell_type == CellType::Fluid));
        fluid_cells.sort_unstable_by_key(|&c| cells.index_to_raw(c));
        fluid_cells.dedup();

        let mut fluid_index = Array3::new(grid.size(), None);
        for (i, &c) in fluid_cells.iter().enumerate() {
            fluid_index[c] = Some(i as u32);
        }
        let solid = Array3::from_fn(grid.size(), |c| cells[c].cell_type == CellType::Solid);

        let mut solver = Self {
            settings,
            fluid_cells,
            fluid_index,
            solid,
            coefficients: Vec::new(),
        };
        solver.coefficients = solver
            .fluid_cells
            .iter()
            .map(|&c| {
                let mut data = CellCoefficients::default();
                for offset in AXES.iter().flat_map(|&a| [a, -a]) {
                    if !solver.is_solid(c, offset) {
                        data.nonsolid_neighbors += 1;
                    }
                }
                for (axis, &offset) in AXES.iter().enumerate() {
                    data.fluid_pos[axis] = solver.fluid_neighbor(c, offset).is_some();
                }
                data
            })
            .collect();
        solver
    }

    pub fn settings(&self) -> &SolverSettings {
        &self.settings
    }

    /// Fluid cells in the order of the pressure vector.
    pub fn fluid_cells(&self) -> &[UVec3] {
        &self.fluid_cells
    }

    /// Solid test for `cell + offset`; outside the grid counts as solid.
    #[inline]
    fn is_solid(&self, cell: UVec3, offset: IVec3) -> bool {
        self.solid.get_neighbor(cell, offset).copied().unwrap_or(true)
    }

    /// Unknown index of the fluid cell at `cell + offset`, if any.
    #[inline]
    fn fluid_neighbor(&self, cell: UVec3, offset: IVec3) -> Option<usize> {
        self.fluid_index.get_neighbor(cell, offset).copied().flatten().map(|i| i as usize)
    }

    /// Solve for pressure given the current grid velocities.
    pub fn solve(&self, grid: &FluidGrid, dt: f32, density: f32) -> PressureSolution {
        let n = self.fluid_cells.len();
        let h = grid.cell_size() as f64;
        let scale = dt as f64 / (density as f64 * h * h);

        let b = self.compute_rhs(grid);
        let b_norm = max_abs(&b);
        let mut pressure = vec![0.0; n];
        if b_norm == 0.0 {
            return PressureSolution { pressure, residual: 0.0, iterations: 0, converged: true };
        }
        let threshold = self.settings.tolerance * b_norm;

        let precon = self.compute_preconditioner(scale);
        let mut r = b;
        let mut z = vec![0.0; n];
        let mut q = vec![0.0; n];
        self.apply_preconditioner(&mut z, &mut q, &precon, &r, scale);
        let mut s = z.clone();
        let mut sigma = dot(&z, &r);
        let mut residual = b_norm;

        for iteration in 1..=self.settings.max_iterations {
            self.apply_a(&mut z, &s, scale);
            let denom = dot(&z, &s);
            if sigma <= 0.0 || denom <= f64::MIN_POSITIVE {
                // Search direction vanished; nothing left to reduce.
                return PressureSolution {
                    pressure,
                    residual,
                    iterations: iteration - 1,
                    converged: residual <= threshold,
                };
            }
            let alpha = sigma / denom;
            muladd(&mut pressure, &s, alpha);
            muladd(&mut r, &z, -alpha);

            residual = max_abs(&r);
            if residual <= threshold {
                return PressureSolution { pressure, residual, iterations: iteration, converged: true };
            }

            self.apply_preconditioner(&mut z, &mut q, &precon, &r, scale);
            let sigma_new = dot(&z, &r);
            let beta = sigma_new / sigma;
            s.par_iter_mut().zip(z.par_iter()).for_each(|(s, &z)| *s = z + beta * *s);
            sigma = sigma_new;
        }

        PressureSolution {
            pressure,
            residual,
            iterations: self.settings.max_iterations,
            converged: false,
        }
    }

    /// Negative divergence of each fluid cell, with solid faces held at zero.
    fn compute_rhs(&self, grid: &FluidGrid) -> Vec<f64> {
        let inv_h = 1.0 / grid.cell_size() as f64;
        self.fluid_cells
            .par_iter()
            .map(|&c| {
                let positive = grid.cell(c).velocities_posface;
                let mut value = 0.0f64;
                for (axis, &offset) in AXES.iter().enumerate() {
                    if !self.is_solid(c, offset) {
                        value -= positive[axis] as f64;
                    }
                    if !self.is_solid(c, -offset) {
                        if let Some(neg) = grid.cells().get_neighbor(c, -offset) {
                            value += neg.velocities_posface[axis] as f64;
                        }
                    }
                }
                value * inv_h
            })
            .collect()
    }

    /// MIC(0) diagonal, computed in storage order.
    fn compute_preconditioner(&self, scale: f64) -> Vec<f64> {
        let SolverSettings { tau, sigma, .. } = self.settings;
        let mut precon = vec![0.0; self.fluid_cells.len()];
        for (i, &c) in self.fluid_cells.iter().enumerate() {
            let diag = self.coefficients[i].nonsolid_neighbors as f64;
            if diag == 0.0 {
                continue;
            }
            let mut squared = 0.0;
            let mut modified = 0.0;
            for (axis, &offset) in AXES.iter().enumerate() {
                if let Some(j) = self.fluid_neighbor(c, -offset) {
                    let neighbor = &self.coefficients[j];
                    let p = precon[j];
                    squared += p * p;
                    let others = (0..3)
                        .filter(|&other| other != axis && neighbor.fluid_pos[other])
                        .count() as f64;
                    modified += others * p * p;
                }
            }
            let mut e = diag - scale * (squared + tau * modified);
            if e < sigma * diag {
                e = diag;
            }
            precon[i] = 1.0 / (e * scale).sqrt();
        }
        precon
    }

    /// `z = M^-1 r` through the forward and backward triangular solves.
    fn apply_preconditioner(&self, z: &mut [f64], q: &mut [f64], precon: &[f64], r: &[f64], scale: f64) {
        for (i, &c) in self.fluid_cells.iter().enumerate() {
            let mut t = 0.0;
            for &offset in &AXES {
                if let Some(j) = self.fluid_neighbor(c, -offset) {
                    t += precon[j] * q[j];
                }
            }
            q[i] = (r[i] + scale * t) * precon[i];
        }
        for (i, &c) in self.fluid_cells.iter().enumerate().rev() {
            let mut t = 0.0;
            for &offset in &AXES {
                if let Some(j) = self.fluid_neighbor(c, offset) {
                    t += z[j];
                }
            }
            z[i] = (q[i] + scale * precon[i] * t) * precon[i];
        }
    }

    /// `out = A v`.
    fn apply_a(&self, out: &mut [f64], v: &[f64], scale: f64) {
        out.par_iter_mut().enumerate().for_each(|(i, out)| {
            let c = self.fluid_cells[i];
            let mut value = self.coefficients[i].nonsolid_neighbors as f64 * v[i];
            for offset in AXES.iter().flat_map(|&a| [a, -a]) {
                if let Some(j) = self.fluid_neighbor(c, offset) {
                    value -= v[j];
                }
            }
            *out = scale * value;
        });
    }

    /// Subtract the pressure gradient from every face next to fluid.
    ///
    /// Faces touching a solid cell or the domain wall are set to zero. Faces
    /// between two air cells are left unchanged.
    pub fn apply_pressure(&self, grid: &mut FluidGrid, dt: f32, density: f32, pressure: &[f64]) {
        let size = grid.size();
        let coefficient = dt as f64 / (density as f64 * grid.cell_size() as f64);
        let pressure_at = |c: UVec3| -> f64 { self.fluid_index[c].map_or(0.0, |i| pressure[i as usize]) };

        grid.cells_mut().as_mut_slice().par_iter_mut().enumerate().for_each(|(raw, cell)| {
            let c = unravel(size, raw);
            let here_solid = self.solid[c];
            let here_fluid = self.fluid_index[c].is_some();
            for (axis, &offset) in AXES.iter().enumerate() {
                let Some(n) = self.solid.neighbor(c, offset) else {
                    cell.velocities_posface[axis] = 0.0;
                    continue;
                };
                if here_solid || self.solid[n] {
                    cell.velocities_posface[axis] = 0.0;
                } else if here_fluid || self.fluid_index[n].is_some() {
                    let gradient = pressure_at(n) - pressure_at(c);
                    cell.velocities_posface[axis] -= (coefficient * gradient) as f32;
                }
            }
        });
    }
}

fn dot(a: &[f64], b: &[f64]) -> f64 {
    a.par_iter().zip(b.par_iter()).map(|(x, y)| x * y).sum()
}

fn max_abs(v: &[f64]) -> f64 {
    v.par_iter().map(|x| x.abs()).reduce(|| 0.0, f64::max)
}

/// `out += s * v`
fn muladd(out: &mut [f64], v: &[f64], s: f64) {
    out.par_iter_mut().zip(v.par_iter()).for_each(|(o, &v)| *o += s * v);
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::Vec3;

    fn fluid_block(size: u32, min: u32, max: u32) -> FluidGrid {
        let mut grid = FluidGrid::new(UVec3::splat(size), 1.0, Vec3::ZERO);
        for index in grid.cells().indices().collect::<Vec<_>>() {
            if index.cmpge(UVec3::splat(min)).all() && index.cmplt(UVec3::splat(max)).all() {
                grid.cell_mut(index).cell_type = CellType::Fluid;
            }
        }
        grid
    }

    #[test]
    fn test_empty_fluid_set_returns_immediately() {
        let grid = FluidGrid::new(UVec3::splat(4), 1.0, Vec3::ZERO);
        let solver = PressureSolver::new(&grid, Vec::new(), SolverSettings::default());
        let solution = solver.solve(&grid, 0.1, 1.0);
        assert_eq!(solution.iterations, 0);
        assert_eq!(solution.residual, 0.0);
        assert!(solution.pressure.is_empty());
    }

    #[test]
    fn test_non_fluid_cells_are_dropped() {
        let grid = fluid_block(4, 1, 2);
        let cells = vec![UVec3::ONE, UVec3::ZERO, UVec3::ONE, UVec3::splat(9)];
        let solver = PressureSolver::new(&grid, cells, SolverSettings::default());
        assert_eq!(solver.fluid_cells(), &[UVec3::ONE]);
    }

    #[test]
    fn test_coefficients_count_walls_as_solid() {
        let mut grid = fluid_block(3, 0, 3);
        grid.set_solid(UVec3::new(1, 0, 0));
        let solver = PressureSolver::new(&grid, grid.fluid_cells(), SolverSettings::default());
        let corner = &solver.coefficients[0];
        // Corner (0,0,0): three walls, one solid neighbor in +x.
        assert_eq!(corner.nonsolid_neighbors, 2);
        assert_eq!(corner.fluid_pos, [false, true, true]);
    }

    #[test]
    fn test_projection_removes_divergence() {
        let mut grid = fluid_block(8, 2, 6);
        // Outflow through one face of the block center.
        grid.cell_mut(UVec3::new(4, 4, 4)).velocities_posface = Vec3::new(1.0, -0.5, 0.25);
        let before = grid.max_fluid_divergence();
        assert!(before > 0.1);

        let solver = PressureSolver::new(&grid, grid.fluid_cells(), SolverSettings::default());
        let solution = solver.solve(&grid, 0.05, 1.0);
        assert!(solution.converged, "solver did not converge: {:?}", solution.residual);
        solver.apply_pressure(&mut grid, 0.05, 1.0, &solution.pressure);

        let after = grid.max_fluid_divergence();
        assert!(after < 1e-3 * before.max(1.0), "divergence {} -> {}", before, after);
    }

    #[test]
    fn test_air_pressure_is_zero_at_surface() {
        let mut grid = fluid_block(6, 1, 3);
        for c in grid.fluid_cells() {
            grid.cell_mut(c).velocities_posface.y = -1.0;
        }
        assert!(grid.max_fluid_divergence() > 0.5);
        let solver = PressureSolver::new(&grid, grid.fluid_cells(), SolverSettings::default());
        let solution = solver.solve(&grid, 0.1, 1.0);
        assert!(solution.converged);
        assert!(solution.pressure.iter().all(|p| p.is_finite()));
        solver.apply_pressure(&mut grid, 0.1, 1.0, &solution.pressure);
        assert!(grid.max_fluid_divergence() < 1e-3);
    }

    #[test]
    fn test_solid_faces_zeroed_after_apply() {
        let mut grid = fluid_block(4, 1, 3);
        grid.set_solid(UVec3::new(1, 0, 1));
        grid.add_velocity(Vec3::splat(0.3));
        let solver = PressureSolver::new(&grid, grid.fluid_cells(), SolverSettings::default());
        let solution = solver.solve(&grid, 0.1, 1.0);
        solver.apply_pressure(&mut grid, 0.1, 1.0, &solution.pressure);

        // +y face of the solid cell borders fluid cell (1,1,1).
        assert_eq!(grid.cell(UVec3::new(1, 0, 1)).velocities_posface, Vec3::ZERO);
        // Faces on the max domain walls.
        assert_eq!(grid.cell(UVec3::new(3, 2, 2)).velocities_posface.x, 0.0);
    }

    #[test]
    fn test_iteration_cap_is_reported() {
        let mut grid = fluid_block(10, 1, 9);
        grid.cell_mut(UVec3::splat(5)).velocities_posface = Vec3::new(3.0, -2.0, 1.0);
        let settings = SolverSettings { max_iterations: 1, ..SolverSettings::default() };
        let solver = PressureSolver::new(&grid, grid.fluid_cells(), settings);
        let solution = solver.solve(&grid, 0.1, 1.0);
        assert_eq!(solution.iterations, 1);
        assert!(!solution.converged);
    }
}
