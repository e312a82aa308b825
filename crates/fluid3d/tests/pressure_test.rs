//! Pressure projection tests
//!
//! Checks the MIC(0)-PCG solve on small tanks with walls, solids and a free
//! surface.

use fluid3d::{CellType, FluidGrid, PressureSolver, SolverSettings, UVec3, Vec3};

/// Fluid in `y < depth`, solid floor at y = 0, air above.
fn tank(size: u32, depth: u32) -> FluidGrid {
    let mut grid = FluidGrid::new(UVec3::splat(size), 0.5, Vec3::ZERO);
    for index in grid.cells().indices().collect::<Vec<_>>() {
        if index.y == 0 {
            grid.set_solid(index);
        } else if index.y < depth {
            grid.cell_mut(index).cell_type = CellType::Fluid;
        }
    }
    grid
}

#[test]
fn test_all_air_returns_immediately() {
    let grid = FluidGrid::new(UVec3::splat(6), 1.0, Vec3::ZERO);
    let solver = PressureSolver::new(&grid, grid.fluid_cells(), SolverSettings::default());
    let solution = solver.solve(&grid, 1.0 / 60.0, 1.0);
    assert_eq!(solution.iterations, 0);
    assert_eq!(solution.residual, 0.0);
    assert!(solution.converged);
}

#[test]
fn test_still_water_under_gravity_is_hydrostatic() {
    let mut grid = tank(8, 5);
    let dt = 1.0 / 60.0;
    grid.add_velocity(Vec3::new(0.0, -9.81 * dt, 0.0));

    let solver = PressureSolver::new(&grid, grid.fluid_cells(), SolverSettings::default());
    let solution = solver.solve(&grid, dt, 1.0);
    assert!(solution.converged, "residual {}", solution.residual);
    assert!(solution.iterations < 100);
    solver.apply_pressure(&mut grid, dt, 1.0, &solution.pressure);

    // Pressure grows with depth.
    let p = |c: UVec3| {
        let i = solver.fluid_cells().iter().position(|&f| f == c).unwrap();
        solution.pressure[i]
    };
    assert!(p(UVec3::new(4, 1, 4)) > p(UVec3::new(4, 2, 4)));
    assert!(p(UVec3::new(4, 3, 4)) > p(UVec3::new(4, 4, 4)));
    assert!(p(UVec3::new(4, 4, 4)) > 0.0);

    // Gravity is cancelled inside the water column.
    for y in 1..4 {
        let v = grid.cell(UVec3::new(4, y, 4)).velocities_posface.y;
        assert!(v.abs() < 1e-3, "v at y={y}: {v}");
    }
    assert!(grid.max_fluid_divergence() < 1e-3);
}

#[test]
fn test_projection_with_obstacle() {
    let mut grid = tank(10, 7);
    for y in 1..4 {
        grid.set_solid(UVec3::new(5, y, 5));
    }
    for index in grid.fluid_cells() {
        let swirl = Vec3::new(
            (index.y as f32 * 0.7).sin(),
            (index.z as f32 * 1.3).cos() - 0.5,
            (index.x as f32 * 0.4).sin(),
        );
        grid.cell_mut(index).velocities_posface = swirl;
    }
    let before = grid.max_fluid_divergence();

    let solver = PressureSolver::new(&grid, grid.fluid_cells(), SolverSettings::default());
    let solution = solver.solve(&grid, 0.02, 1.0);
    assert!(solution.converged, "residual {}", solution.residual);
    solver.apply_pressure(&mut grid, 0.02, 1.0, &solution.pressure);

    assert!(grid.max_fluid_divergence() < 1e-3 * before.max(1.0));
    assert_eq!(grid.cell(UVec3::new(5, 2, 5)).velocities_posface, Vec3::ZERO);
    // Face below the obstacle's bottom cell belongs to the floor.
    assert_eq!(grid.cell(UVec3::new(5, 0, 5)).velocities_posface, Vec3::ZERO);
}

#[test]
fn test_mic_beats_plain_ic() {
    let mut grid = tank(12, 9);
    for index in grid.fluid_cells() {
        grid.cell_mut(index).velocities_posface =
            Vec3::new((index.x * 7 % 5) as f32, -((index.z * 3 % 4) as f32), 0.3);
    }
    let run = |tau: f64| {
        let settings = SolverSettings { tau, ..SolverSettings::default() };
        let solver = PressureSolver::new(&grid, grid.fluid_cells(), settings);
        solver.solve(&grid, 0.02, 1.0)
    };

    let mic = run(0.97);
    let ic = run(0.0);
    assert!(mic.converged && ic.converged);
    assert!(mic.iterations <= ic.iterations, "MIC {} vs IC {}", mic.iterations, ic.iterations);
}
