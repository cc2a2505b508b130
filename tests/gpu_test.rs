//! Automated tests for the wgpu backend

#![cfg(feature = "gpu")]

use riseflow::{FieldId, GpuDevice, GpuError, SimConfig, SmokeSolver};

fn small_config() -> SimConfig {
    SimConfig {
        sim_resolution: 32,
        dye_resolution: 64,
        bloom_resolution: 32,
        ..SimConfig::default()
    }
}

/// Machines without an adapter skip the GPU tests.
async fn gpu_solver(width: u32, height: u32) -> Option<SmokeSolver<GpuDevice>> {
    match GpuDevice::new(width, height).await {
        Ok(device) => Some(SmokeSolver::initialize(device, small_config()).unwrap()),
        Err(GpuError::NoAdapter) => {
            eprintln!("no GPU adapter, skipping");
            None
        }
        Err(err) => panic!("GPU device creation failed: {err}"),
    }
}

#[tokio::test]
async fn test_gpu_solver_creation() {
    let Some(solver) = gpu_solver(64, 64).await else {
        return;
    };
    assert_eq!(solver.field(FieldId::Velocity).size(), (32, 32));
    assert_eq!(solver.field(FieldId::Dye).size(), (64, 64));
}

#[tokio::test]
async fn test_gpu_emitter_adds_dye() {
    let Some(mut solver) = gpu_solver(64, 64).await else {
        return;
    };

    for _ in 0..3 {
        solver.step(1.0 / 60.0);
    }

    let dye: f32 = solver
        .read_field(FieldId::Dye)
        .iter()
        .map(|t| t.x + t.y + t.z)
        .sum();
    assert!(dye > 0.0, "emitter should inject smoke");
}

#[tokio::test]
async fn test_gpu_multiple_steps_stay_finite() {
    let Some(mut solver) = gpu_solver(64, 64).await else {
        return;
    };

    for _ in 0..20 {
        solver.step(1.0 / 60.0);
    }

    assert_eq!(solver.ticks(), 20);
    assert!(solver.read_field(FieldId::Velocity).iter().all(|t| t.is_finite()));
}

#[tokio::test]
async fn test_gpu_render_reads_back_surface() {
    let Some(mut solver) = gpu_solver(48, 32).await else {
        return;
    };

    solver.step(1.0 / 60.0);
    solver.render(None);

    let texels = solver.read_surface();
    assert_eq!(texels.len(), 48 * 32);
    // Background is opaque
    assert!(texels.iter().all(|t| (t.w - 1.0).abs() < 0.01));
}
