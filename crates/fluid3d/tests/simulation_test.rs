//! Engine-level tests: hashing, seeding, substepping and boundaries.

use fluid3d::{
    CellType, IVec3, Particle, Simulation, SimulationParams, TransferMethod, UVec3, Vec3,
};

fn params(cell_size: f32) -> SimulationParams {
    SimulationParams { cell_size, ..SimulationParams::default() }
}

fn weightless(cell_size: f32) -> SimulationParams {
    SimulationParams { cell_size, gravity: Vec3::ZERO, ..SimulationParams::default() }
}

#[test]
fn test_hash_matches_clamped_positions() {
    let mut sim = Simulation::with_size(IVec3::new(6, 4, 5), params(0.5)).unwrap();
    let positions = [
        Vec3::new(0.1, 0.1, 0.1),
        Vec3::new(2.9, 1.9, 2.4),
        Vec3::new(-3.0, 0.7, 1.2),
        Vec3::new(10.0, 10.0, -1.0),
        Vec3::new(1.25, 1.0, 0.75),
    ];
    sim.particles = positions.iter().map(|&p| Particle::at(p)).collect::<Vec<_>>().into();
    sim.hash_particles();

    let size = sim.grid().size();
    for p in &sim.particles.list {
        let expected = ((p.position - sim.grid().offset()) / 0.5)
            .max(Vec3::ZERO)
            .as_uvec3()
            .min(size - UVec3::ONE);
        assert_eq!(p.grid_index, expected, "particle at {:?}", p.position);
    }

    // Every particle sits in exactly one bucket.
    let mut seen = vec![0usize; positions.len()];
    for cell in sim.grid().cells().indices() {
        for i in sim.space_hash().objects_at(cell) {
            assert_eq!(sim.particles.list[i].grid_index, cell);
            seen[i] += 1;
        }
    }
    assert!(seen.iter().all(|&n| n == 1), "bucket counts: {:?}", seen);
}

#[test]
fn test_seeding_is_idempotent() {
    let mut sim = Simulation::with_size(IVec3::splat(10), params(1.0)).unwrap();

    let added = sim.seed_box(Vec3::new(1.0, 1.0, 1.0), Vec3::new(3.0, 2.0, 2.0), 2);
    assert_eq!(added, 3 * 2 * 2 * 8);
    assert_eq!(sim.seed_box(Vec3::new(1.0, 1.0, 1.0), Vec3::new(3.0, 2.0, 2.0), 2), 0);

    let before = sim.particle_count();
    let added = sim.seed_sphere(Vec3::splat(6.0), 2.0, 3);
    assert!(added > 0);
    assert_eq!(sim.seed_sphere(Vec3::splat(6.0), 2.0, 3), 0);
    assert_eq!(sim.particle_count(), before + added);
}

#[test]
fn test_seeding_clips_to_grid() {
    let mut sim = Simulation::with_size(IVec3::splat(4), params(1.0)).unwrap();
    let added = sim.seed_box(Vec3::splat(-10.0), Vec3::splat(20.0), 1);
    assert_eq!(added, 64);
    let (min, max) = sim.world_bounds();
    for p in &sim.particles.list {
        assert!(p.position.cmpge(min).all() && p.position.cmple(max).all());
    }
}

#[test]
fn test_seeding_into_empty_grid_does_nothing() {
    let mut sim = Simulation::new(params(1.0)).unwrap();
    assert_eq!(sim.seed_sphere(Vec3::ZERO, 5.0, 2), 0);
    assert_eq!(sim.time_step(0.1).iterations, 0);
}

#[test]
fn test_particle_at_rest_stays_at_rest() {
    for method in [TransferMethod::Pic, TransferMethod::FlipBlend, TransferMethod::Apic] {
        let mut sim = Simulation::with_size(IVec3::splat(8), weightless(1.0)).unwrap();
        sim.set_transfer_method(method);
        sim.particles.spawn_at(Vec3::splat(4.3));
        sim.hash_particles();

        sim.time_step(0.05);

        let v = sim.particles.list[0].velocity;
        assert!(v.length() < 1e-5, "{:?}: velocity {:?}", method, v);
    }
}

#[test]
fn test_short_update_is_one_substep() {
    let mut sim = Simulation::with_size(IVec3::splat(8), weightless(1.0)).unwrap();
    sim.particles.spawn(Vec3::splat(4.0), Vec3::new(10.0, 0.0, 0.0));
    sim.hash_particles();
    // CFL limit is 0.1s, times the default CFL number of 3.
    let report = sim.update(0.01);
    assert_eq!(report.substep_lengths(), vec![0.01]);
}

#[test]
fn test_long_update_sums_to_dt() {
    let mut p = weightless(1.0);
    p.cfl_number = 1.0;
    let mut sim = Simulation::with_size(IVec3::splat(16), p).unwrap();
    sim.seed_box(Vec3::splat(6.0), Vec3::splat(4.0), 2);
    for particle in &mut sim.particles.list {
        particle.velocity = Vec3::new(20.0, 0.0, 0.0);
    }

    let report = sim.update(0.5);

    assert!(report.substeps.len() >= 2, "substeps: {:?}", report.substep_lengths());
    assert!((report.total_time() - 0.5).abs() <= 0.5 * f32::EPSILON);
    assert!(report.substeps.iter().all(|s| s.dt > 0.0 && s.dt <= 0.5));
}

#[test]
fn test_still_fluid_takes_whole_frame() {
    let mut sim = Simulation::with_size(IVec3::splat(6), weightless(1.0)).unwrap();
    sim.seed_box(Vec3::splat(1.0), Vec3::splat(2.0), 2);
    let report = sim.update(1.0 / 24.0);
    assert_eq!(report.substeps.len(), 1);
}

#[test]
fn test_particles_stay_inside_domain() {
    let mut sim = Simulation::with_size(IVec3::new(8, 8, 8), params(0.25)).unwrap();
    sim.seed_box(Vec3::new(0.25, 1.0, 0.25), Vec3::new(1.0, 0.75, 1.0), 2);
    for particle in &mut sim.particles.list {
        particle.velocity = Vec3::new(3.0, -4.0, 2.0);
    }

    for _ in 0..20 {
        sim.update(1.0 / 30.0);
    }

    let (min, max) = sim.world_bounds();
    let skin = sim.params().boundary_skin_width;
    for p in &sim.particles.list {
        assert!(p.position.is_finite());
        assert!(p.position.cmpge(min + Vec3::splat(skin * 0.5)).all(), "{:?}", p.position);
        assert!(p.position.cmple(max - Vec3::splat(skin * 0.5)).all(), "{:?}", p.position);
    }
}

#[test]
fn test_solid_cells_survive_simulation() {
    let mut sim = Simulation::with_size(IVec3::splat(8), params(1.0)).unwrap();
    sim.fill_solid_box(UVec3::ZERO, UVec3::new(7, 1, 7));
    // Fluid seeded straight into the floor as well as above it.
    sim.seed_box(Vec3::new(1.0, 0.0, 1.0), Vec3::new(4.0, 5.0, 4.0), 2);

    for _ in 0..5 {
        sim.update(1.0 / 24.0);
    }

    for z in 0..8 {
        for y in 0..2 {
            for x in 0..8 {
                let cell = sim.grid().cell(UVec3::new(x, y, z));
                assert_eq!(cell.cell_type, CellType::Solid);
            }
        }
    }
    assert!(sim.grid().fluid_cell_count() > 0);
}

#[test]
fn test_failed_resize_keeps_particles_hashed() {
    let mut sim = Simulation::with_size(IVec3::splat(4), params(1.0)).unwrap();
    sim.seed_box(Vec3::ZERO, Vec3::splat(2.0), 2);

    assert!(sim.resize(IVec3::new(-4, 4, 4)).is_err());
    assert_eq!(sim.grid().size(), UVec3::splat(4));
    assert_eq!(sim.space_hash().len(), sim.particle_count());

    sim.resize(IVec3::new(2, 2, 2)).unwrap();
    assert_eq!(sim.space_hash().len(), sim.particle_count());
    assert!(sim.particles.list.iter().all(|p| p.grid_index.cmplt(UVec3::splat(2)).all()));
}

#[test]
fn test_step_stats_report_solver() {
    let mut sim = Simulation::with_size(IVec3::splat(8), params(0.5)).unwrap();
    // Resting on the floor, so gravity compresses the bottom layer.
    sim.seed_box(Vec3::new(0.5, 0.0, 0.5), Vec3::new(2.0, 1.5, 2.0), 2);

    let stats = sim.time_step(0.02);

    assert!(stats.fluid_cells > 0);
    assert!(stats.converged, "residual {}", stats.residual);
    assert!(stats.iterations > 0);
    assert!(stats.max_pressure > 0.0);
}
