//! Pressure solver diagnostics
//!
//! Settles a pool of water and prints per-substep solver statistics for each
//! transfer method, plus the divergence left after projection.
//!
//! Run with: cargo run --example solver_debug --release

use fluid3d::{IVec3, Simulation, SimulationParams, TransferMethod, UVec3, Vec3};

const STEPS: usize = 30;
const DT: f32 = 1.0 / 60.0;

fn main() -> fluid3d::Result<()> {
    env_logger::init();

    for method in [TransferMethod::Pic, TransferMethod::FlipBlend, TransferMethod::Apic] {
        let params = SimulationParams { cell_size: 0.1, transfer_method: method, ..Default::default() };
        let mut sim = Simulation::with_size(IVec3::new(20, 20, 20), params)?;
        sim.fill_solid_box(UVec3::new(8, 0, 8), UVec3::new(11, 5, 11));
        sim.seed_box(Vec3::new(0.0, 0.0, 0.0), Vec3::new(2.0, 0.8, 2.0), 2);
        println!("=== {:?}: {} particles ===", method, sim.particle_count());

        let mut total_iterations = 0;
        let mut substeps = 0;
        for step in 0..STEPS {
            let report = sim.update(DT);
            for stats in &report.substeps {
                total_iterations += stats.iterations;
                substeps += 1;
                if !stats.converged {
                    println!("  step {step}: solver stopped at residual {:e}", stats.residual);
                }
            }
            if step % 10 == 0 {
                let last = report.substeps.last().copied().unwrap_or_default();
                println!(
                    "  step {:2}: {} substeps, {} fluid cells, {} iterations, max pressure {:.3}, max speed {:.3}",
                    step,
                    report.substeps.len(),
                    last.fluid_cells,
                    last.iterations,
                    last.max_pressure,
                    sim.max_speed()
                );
            }
        }
        println!(
            "  avg iterations {:.1}, final max divergence {:.2e}\n",
            total_iterations as f32 / substeps.max(1) as f32,
            sim.grid().max_fluid_divergence()
        );
    }
    Ok(())
}
