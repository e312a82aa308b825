//! The simulation engine.
//!
//! One substep runs:
//! 1. optional particle separation (spring forces)
//! 2. advection with the position clamp that keeps particles in the domain
//! 3. rehash and fluid sources
//! 4. particle-to-grid transfer
//! 5. gravity
//! 6. pressure projection
//! 7. grid-to-particle transfer
//!
//! [`Simulation::update`] splits a frame into CFL-limited substeps.

use glam::{IVec3, UVec3, Vec3};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rayon::prelude::*;

use crate::config::{FluidSource, SimulationParams};
use crate::constants::MAX_SEED_DENSITY;
use crate::error::{validate_cell_size, validate_dimensions, Result};
use crate::grid::{CellType, FluidGrid, GridSlots};
use crate::mesh::Mesh;
use crate::particle::{Particle, Particles};
use crate::pressure::PressureSolver;
use crate::space_hash::SpaceHash;
use crate::springs::spring_displacements;
use crate::transfer::{TransferMethod, TransferScheme};
use crate::voxelizer::interior_cells;

/// Diagnostics of one substep.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct StepStats {
    /// Substep length in seconds
    pub dt: f32,
    pub fluid_cells: usize,
    pub iterations: usize,
    pub residual: f64,
    pub max_pressure: f64,
    pub converged: bool,
}

/// Diagnostics of one [`Simulation::update`] call.
#[derive(Clone, Debug, Default)]
pub struct UpdateReport {
    pub substeps: Vec<StepStats>,
}

impl UpdateReport {
    pub fn substep_lengths(&self) -> Vec<f32> {
        self.substeps.iter().map(|s| s.dt).collect()
    }

    pub fn total_time(&self) -> f32 {
        self.substeps.iter().map(|s| s.dt).sum()
    }
}

/// Grid-based fluid simulation with PIC, FLIP or APIC transfers.
pub struct Simulation {
    params: SimulationParams,
    grids: GridSlots,
    /// All particles in the simulation
    pub particles: Particles,
    space_hash: SpaceHash,
    scheme: Box<dyn TransferScheme>,
    rng: StdRng,
    /// Cells topped up with fluid every substep
    pub sources: Vec<FluidSource>,
}

impl Simulation {
    /// Create a simulation with an empty (zero-cell) grid.
    pub fn new(params: SimulationParams) -> Result<Self> {
        validate_cell_size(params.cell_size)?;
        Ok(Self {
            grids: GridSlots::new(UVec3::ZERO, params.cell_size, params.grid_offset),
            particles: Particles::new(),
            space_hash: SpaceHash::new(UVec3::ZERO),
            scheme: params.transfer_method.scheme(params.flip_blend),
            rng: StdRng::seed_from_u64(params.seed),
            sources: Vec::new(),
            params,
        })
    }

    /// Create a simulation and size its grid.
    pub fn with_size(size: IVec3, params: SimulationParams) -> Result<Self> {
        let mut sim = Self::new(params)?;
        sim.resize(size)?;
        Ok(sim)
    }

    pub fn params(&self) -> &SimulationParams {
        &self.params
    }

    /// Replace all parameters. The transfer scheme is rebuilt and particles
    /// are rehashed, since cell size and offset change the cell mapping.
    pub fn set_params(&mut self, params: SimulationParams) -> Result<()> {
        validate_cell_size(params.cell_size)?;
        for grid in [&mut self.grids.current, &mut self.grids.previous] {
            grid.set_cell_size(params.cell_size);
            grid.set_offset(params.grid_offset);
        }
        self.scheme = params.transfer_method.scheme(params.flip_blend);
        self.params = params;
        self.hash_particles();
        Ok(())
    }

    pub fn transfer_method(&self) -> TransferMethod {
        self.scheme.method()
    }

    pub fn set_transfer_method(&mut self, method: TransferMethod) {
        self.params.transfer_method = method;
        self.scheme = method.scheme(self.params.flip_blend);
    }

    /// The live grid.
    pub fn grid(&self) -> &FluidGrid {
        &self.grids.current
    }

    /// Grid snapshot taken right after the last FLIP particle-to-grid pass.
    pub fn previous_grid(&self) -> &FluidGrid {
        &self.grids.previous
    }

    pub fn space_hash(&self) -> &SpaceHash {
        &self.space_hash
    }

    pub fn particle_count(&self) -> usize {
        self.particles.len()
    }

    /// Reallocate the grid to `size` cells, dropping all grid state but
    /// keeping particles. A negative component is rejected and nothing changes.
    pub fn resize(&mut self, size: IVec3) -> Result<()> {
        let size = validate_dimensions(size)?;
        self.grids.resize(size);
        self.space_hash.resize(size);
        self.hash_particles();
        Ok(())
    }

    /// World-space bounds of the domain as (min, max).
    pub fn world_bounds(&self) -> (Vec3, Vec3) {
        (self.grids.current.offset(), self.grids.current.domain_max())
    }

    // ========== Solids ==========

    pub fn set_solid(&mut self, cell: UVec3) {
        self.grids.set_solid(cell);
    }

    pub fn add_solid_cells(&mut self, cells: impl IntoIterator<Item = UVec3>) {
        for cell in cells {
            self.grids.set_solid(cell);
        }
    }

    /// Mark the inclusive box of cells `min..=max` solid, clipped to the grid.
    pub fn fill_solid_box(&mut self, min: UVec3, max: UVec3) {
        let size = self.grids.current.size();
        if size.cmpeq(UVec3::ZERO).any() {
            return;
        }
        let max = max.min(size - UVec3::ONE);
        for z in min.z..=max.z {
            for y in min.y..=max.y {
                for x in min.x..=max.x {
                    self.grids.set_solid(UVec3::new(x, y, z));
                }
            }
        }
    }

    /// Mark every cell enclosed by a closed mesh solid. Returns the number of
    /// cells marked.
    pub fn add_obstacle_mesh(&mut self, mesh: &Mesh) -> Result<usize> {
        let grid = &self.grids.current;
        let cells = interior_cells(mesh, grid.cell_size(), grid.offset(), grid.size())?;
        let count = cells.len();
        self.add_solid_cells(cells);
        log::debug!("obstacle mesh voxelized into {} solid cells", count);
        Ok(count)
    }

    /// Add a fluid source covering every cell enclosed by a closed mesh.
    /// Returns the number of source cells.
    pub fn add_fluid_source_mesh(&mut self, mesh: &Mesh, velocity: Vec3, density: u32) -> Result<usize> {
        let grid = &self.grids.current;
        let cells = interior_cells(mesh, grid.cell_size(), grid.offset(), grid.size())?;
        let count = cells.len();
        self.sources.push(FluidSource {
            cells: cells.into_iter().map(|c| c.to_array()).collect(),
            velocity,
            density,
            ..FluidSource::default()
        });
        Ok(count)
    }

    // ========== Seeding ==========

    /// Fill `cell` with jittered particles until it holds `density^3`.
    /// Returns the number of particles added. `density` is capped at
    /// [`MAX_SEED_DENSITY`].
    pub fn seed_cell(&mut self, cell: UVec3, velocity: Vec3, density: u32) -> usize {
        if !self.grids.current.cells().contains(cell) {
            return 0;
        }
        if density > MAX_SEED_DENSITY {
            log::warn!("seed density {} capped at {}", density, MAX_SEED_DENSITY);
        }
        let target = (density.min(MAX_SEED_DENSITY) as usize).pow(3);
        let existing = self.space_hash.count_at(cell);
        if existing >= target {
            return 0;
        }
        let cell_size = self.grids.current.cell_size();
        let corner = self.grids.current.offset() + cell.as_vec3() * cell_size;
        for _ in existing..target {
            let jitter = Vec3::new(
                self.rng.gen_range(0.0..cell_size),
                self.rng.gen_range(0.0..cell_size),
                self.rng.gen_range(0.0..cell_size),
            );
            let mut particle = Particle::new(corner + jitter, velocity);
            particle.grid_index = cell;
            self.space_hash.insert(cell, self.particles.len());
            self.particles.list.push(particle);
        }
        target - existing
    }

    /// Seed every cell whose center is strictly inside the box.
    pub fn seed_box(&mut self, origin: Vec3, size: Vec3, density: u32) -> usize {
        let end = origin + size;
        self.seed_region(origin, end, density, |p| p.cmpgt(origin).all() && p.cmplt(end).all())
    }

    /// Seed every cell whose center is strictly inside the sphere.
    pub fn seed_sphere(&mut self, center: Vec3, radius: f32, density: u32) -> usize {
        let extent = Vec3::splat(radius);
        let radius_sq = radius * radius;
        self.seed_region(center - extent, center + extent, density, |p| {
            p.distance_squared(center) < radius_sq
        })
    }

    fn seed_region(&mut self, min: Vec3, max: Vec3, density: u32, inside: impl Fn(Vec3) -> bool) -> usize {
        let size = self.grids.current.size();
        if size.cmpeq(UVec3::ZERO).any() {
            log::warn!("seeding into an empty grid, nothing added");
            return 0;
        }
        let start = self.grids.current.unclamped_cell(min);
        let end = self.grids.current.unclamped_cell(max).min(size - UVec3::ONE);
        let mut added = 0;
        for z in start.z..=end.z {
            for y in start.y..=end.y {
                for x in start.x..=end.x {
                    let cell = UVec3::new(x, y, z);
                    if inside(self.grids.current.cell_center(cell)) {
                        added += self.seed_cell(cell, Vec3::ZERO, density);
                    }
                }
            }
        }
        added
    }

    // ========== Stepping ==========

    /// Recompute every particle's cell from its position and rebuild the
    /// space hash.
    pub fn hash_particles(&mut self) {
        self.space_hash.clear();
        let grid = &self.grids.current;
        if grid.cells().is_empty() {
            return;
        }
        for (i, p) in self.particles.list.iter_mut().enumerate() {
            p.grid_index = grid.clamped_cell(p.position);
            self.space_hash.insert(p.grid_index, i);
        }
    }

    pub fn max_speed(&self) -> f32 {
        self.particles.max_speed()
    }

    /// Longest step that moves no particle more than one cell; infinite when
    /// nothing moves.
    pub fn cfl_limit(&self) -> f32 {
        let max_speed = self.max_speed();
        if max_speed > 0.0 {
            self.grids.current.cell_size() / max_speed
        } else {
            f32::INFINITY
        }
    }

    /// Advance by exactly `dt`, split into CFL-limited substeps.
    ///
    /// The last substep is `dt` minus the time already taken, so the substep
    /// lengths summed in order give back `dt` up to one rounding.
    pub fn update(&mut self, dt: f32) -> UpdateReport {
        let mut report = UpdateReport::default();
        if !(dt > 0.0) {
            return report;
        }
        let mut elapsed = 0.0f32;
        loop {
            let step = self.params.cfl_number * self.cfl_limit();
            if !(step.is_finite() && step > 0.0) || elapsed + step >= dt {
                report.substeps.push(self.time_step(dt - elapsed));
                break;
            }
            report.substeps.push(self.time_step(step));
            elapsed += step;
        }
        log::debug!("update dt={} in {} substeps", dt, report.substeps.len());
        report
    }

    /// Run a single substep of length `dt` without CFL subdivision.
    pub fn time_step(&mut self, dt: f32) -> StepStats {
        let mut stats = StepStats { dt, ..StepStats::default() };
        if self.grids.current.cells().is_empty() {
            return stats;
        }

        if self.params.spring_forces {
            self.apply_spring_forces(dt);
        }
        self.advect_particles(dt);
        self.hash_particles();
        self.apply_sources();

        self.scheme.transfer_to_grid(&mut self.grids, &self.particles, &self.space_hash);
        self.grids.current.add_velocity(self.params.gravity * dt);

        let fluid_cells: Vec<UVec3> = self
            .space_hash
            .sorted_occupied_cells()
            .into_iter()
            .filter(|&c| self.grids.current.cell(c).cell_type == CellType::Fluid)
            .collect();
        let solver = PressureSolver::new(&self.grids.current, fluid_cells, self.params.solver);
        let solution = solver.solve(&self.grids.current, dt, self.params.density);
        if !solution.converged && solution.iterations >= self.params.solver.max_iterations {
            log::warn!(
                "pressure solve hit {} iterations, residual {:e}",
                solution.iterations,
                solution.residual
            );
        }
        solver.apply_pressure(&mut self.grids.current, dt, self.params.density, &solution.pressure);

        self.scheme.transfer_from_grid(&self.grids, &mut self.particles);

        stats.fluid_cells = solver.fluid_cells().len();
        stats.iterations = solution.iterations;
        stats.residual = solution.residual;
        stats.max_pressure = solution.max_pressure();
        stats.converged = solution.converged;
        log::debug!(
            "substep dt={:.5} fluid={} iterations={} residual={:e} max_pressure={:.4} max_speed={:.4}",
            dt,
            stats.fluid_cells,
            stats.iterations,
            stats.residual,
            stats.max_pressure,
            self.max_speed()
        );
        stats
    }

    fn advect_particles(&mut self, dt: f32) {
        let skin = Vec3::splat(self.params.boundary_skin_width);
        let min = self.grids.current.offset() + skin;
        let max = self.grids.current.domain_max() - skin;
        self.particles.list.par_iter_mut().for_each(|p| {
            p.position = (p.position + p.velocity * dt).max(min).min(max);
        });
    }

    fn apply_spring_forces(&mut self, dt: f32) {
        let displacements = spring_displacements(
            &self.particles,
            &self.space_hash,
            self.grids.current.cell_size(),
            &mut self.rng,
        );
        for (p, d) in self.particles.list.iter_mut().zip(displacements) {
            p.position += d * dt;
        }
    }

    fn apply_sources(&mut self) {
        let sources = std::mem::take(&mut self.sources);
        for source in sources.iter().filter(|s| s.active) {
            for cell in source.cell_indices() {
                self.seed_cell(cell, source.velocity, source.density);
                if source.coerce_velocity {
                    for i in self.space_hash.objects_at(cell) {
                        self.particles.list[i].velocity = source.velocity;
                    }
                }
            }
        }
        self.sources = sources;
    }
}
