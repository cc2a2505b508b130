use glam::{Vec2, Vec3, Vec4};
use riseflow::analysis::FieldSnapshot;
use riseflow::device::Source;
use riseflow::{
    Capabilities, CpuDevice, Device, FieldId, SimConfig, SmokeSolver, SolverError, StageKind,
};

fn quiet_config() -> SimConfig {
    SimConfig {
        sim_resolution: 32,
        dye_resolution: 64,
        bloom: false,
        emit_smoke: false,
        ..SimConfig::default()
    }
}

fn solver_with(config: SimConfig) -> SmokeSolver<CpuDevice> {
    SmokeSolver::initialize(CpuDevice::new(64, 64), config).unwrap()
}

fn seed_velocity(solver: &mut SmokeSolver<CpuDevice>, f: impl Fn(Vec2) -> Vec2) {
    solver
        .buffers_mut()
        .velocity
        .read_mut()
        .texture_mut()
        .fill_with(|uv| f(uv).extend(0.0).extend(1.0));
}

fn seed_dye(solver: &mut SmokeSolver<CpuDevice>, f: impl Fn(Vec2) -> Vec4) {
    solver.buffers_mut().dye.read_mut().texture_mut().fill_with(f);
}

/// Outward flow concentrated around the center, zero near the walls.
fn radial_burst(uv: Vec2) -> Vec2 {
    let d = uv - Vec2::splat(0.5);
    d * 40.0 * (-d.length_squared() / 0.0225).exp()
}

fn divergence_norm(solver: &mut SmokeSolver<CpuDevice>) -> f32 {
    solver
        .read_field(FieldId::Divergence)
        .iter()
        .map(|t| t.x * t.x)
        .sum::<f32>()
        .sqrt()
}

fn projected_divergence(iterations: u32) -> f32 {
    let mut solver = solver_with(SimConfig {
        pressure_iterations: iterations,
        ..quiet_config()
    });
    seed_velocity(&mut solver, radial_burst);
    solver.compute_divergence();
    solver.solve_pressure();
    solver.subtract_gradient();
    solver.compute_divergence();
    divergence_norm(&mut solver)
}

#[test]
fn test_projection_reduces_divergence() {
    let mut solver = solver_with(quiet_config());
    seed_velocity(&mut solver, radial_burst);
    solver.compute_divergence();
    let initial = divergence_norm(&mut solver);
    assert!(initial > 1.0, "seeded flow should diverge, got {initial}");

    for iterations in [1, 2, 5, 10, 20] {
        let residual = projected_divergence(iterations);
        assert!(
            residual < initial,
            "{iterations} iterations: {residual} not below {initial}"
        );
    }

    assert!(projected_divergence(20) < projected_divergence(1));
}

#[test]
fn test_divergence_walls_and_open_top() {
    let mut solver = solver_with(quiet_config());
    let (w, h) = solver.field(FieldId::Velocity).size();
    let (w, h) = (w as usize, h as usize);

    seed_velocity(&mut solver, |_| Vec2::new(2.0, 0.0));
    solver.compute_divergence();
    let div = solver.read_field(FieldId::Divergence);
    let at = |x: usize, y: usize| div[y * w + x].x;
    assert!((at(0, h / 2) - 2.0).abs() < 1e-4);
    assert!((at(w - 1, h / 2) + 2.0).abs() < 1e-4);
    assert!(at(w / 2, h / 2).abs() < 1e-4);

    seed_velocity(&mut solver, |_| Vec2::new(0.0, 3.0));
    solver.compute_divergence();
    let div = solver.read_field(FieldId::Divergence);
    let at = |x: usize, y: usize| div[y * w + x].x;
    // closed floor pushes back, open top lets the flow leave
    assert!((at(w / 2, 0) - 3.0).abs() < 1e-4);
    assert!(at(w / 2, h - 1).abs() < 1e-4);
    assert!(at(w / 2, h / 2).abs() < 1e-4);
}

#[test]
fn test_dye_never_brightens_without_injection() {
    let mut solver = solver_with(quiet_config());
    seed_dye(&mut solver, |uv| {
        let d = (uv - Vec2::new(0.5, 0.3)).length();
        if d < 0.15 {
            Vec4::new(0.8, 0.6, 0.4, 1.0)
        } else {
            Vec4::ZERO
        }
    });

    let max_channel = |snapshot: &FieldSnapshot| {
        snapshot
            .dye
            .iter()
            .map(|t| t.x.max(t.y).max(t.z))
            .fold(0.0f32, f32::max)
    };

    let mut previous = max_channel(&FieldSnapshot::capture(&mut solver));
    for _ in 0..20 {
        solver.step(1.0 / 60.0);
        let current = max_channel(&FieldSnapshot::capture(&mut solver));
        assert!(current <= previous + 1e-6, "{current} > {previous}");
        previous = current;
    }
    assert!(previous < 0.8);
}

#[test]
fn test_dye_fades_pointwise_without_forces() {
    let mut solver = solver_with(SimConfig {
        smoke_buoyancy: 0.0,
        curl: 0.0,
        ..quiet_config()
    });
    seed_dye(&mut solver, |uv| {
        let d = (uv - Vec2::new(0.4, 0.6)).length();
        Vec4::new((1.0 - 3.0 * d).max(0.0), 0.5, uv.x, 1.0)
    });

    let dt = 1.0 / 60.0;
    let decay = 1.0 / (1.0 + solver.config().density_dissipation * dt);
    let mut previous = solver.read_field(FieldId::Dye);
    for _ in 0..10 {
        solver.step(dt);
        let current = solver.read_field(FieldId::Dye);
        for (now, before) in current.iter().zip(&previous) {
            for c in 0..3 {
                assert!(now[c] <= before[c] * decay + 1e-6, "{now} after {before}");
            }
        }
        previous = current;
    }
}

#[test]
fn test_dissipation_rate_at_rest() {
    let mut solver = solver_with(quiet_config());
    seed_dye(&mut solver, |_| Vec4::new(1.0, 1.0, 1.0, 1.0));

    let dt = 1.0 / 60.0;
    solver.advect_dye(dt);

    let expected = 1.0 / (1.0 + solver.config().density_dissipation * dt);
    for texel in solver.read_field(FieldId::Dye) {
        assert!((texel.x - expected).abs() < 1e-5);
    }
}

#[test]
fn test_splat_is_local() {
    let mut solver = solver_with(quiet_config());
    solver.splat(
        Vec2::new(0.25, 0.25),
        Vec2::new(100.0, 0.0),
        Vec3::new(1.0, 0.0, 0.0),
        None,
    );

    let snapshot = FieldSnapshot::capture(&mut solver);
    let near = snapshot.dye_at(16, 16);
    let far = snapshot.dye_at(58, 58);
    assert!(near.x > 0.9, "dye at splat center: {near}");
    assert!(far.x.abs() < 1e-6, "dye far from splat: {far}");
    assert_eq!(near.y, 0.0);

    let push = snapshot.velocity_at(8, 8);
    assert!(push.x > 90.0, "velocity at splat center: {push}");
    assert!(snapshot.velocity_at(30, 30).length() < 1e-3);
}

#[test]
fn test_pointer_motion_splats_once() {
    let mut solver = solver_with(quiet_config());
    let aspect = solver.aspect_ratio();

    let pointer = solver.pointer(7);
    pointer.texcoord = Vec2::new(0.5, 0.5);
    pointer.move_to(Vec2::new(0.52, 0.5), aspect);

    solver.apply_inputs();
    let first = FieldSnapshot::capture(&mut solver);
    assert!(first.velocity_at(16, 16).x > 0.0);

    // nothing moved since, so nothing more is injected
    solver.apply_inputs();
    let second = FieldSnapshot::capture(&mut solver);
    assert_eq!(first.dye, second.dye);
}

#[test]
fn test_pressure_retention_scales_previous_solution() {
    let mut solver = solver_with(SimConfig {
        pressure_iterations: 0,
        pressure: 0.3,
        ..quiet_config()
    });
    solver
        .buffers_mut()
        .pressure
        .read_mut()
        .texture_mut()
        .fill_with(|_| Vec4::new(2.0, 0.0, 0.0, 1.0));

    solver.solve_pressure();
    for texel in solver.read_field(FieldId::Pressure) {
        assert!((texel.x - 0.6).abs() < 1e-6);
    }
}

#[test]
fn test_gradient_subtracts_full_central_difference() {
    let mut solver = solver_with(quiet_config());
    let (w, h) = solver.field(FieldId::Velocity).size();
    let (w, h) = (w as usize, h as usize);
    solver
        .buffers_mut()
        .pressure
        .read_mut()
        .texture_mut()
        .fill_with(|uv| Vec4::new(uv.x + 2.0 * uv.y, 0.0, 0.0, 1.0));

    solver.subtract_gradient();

    // p(R) - p(L) across two texels, no half factor
    let expected = Vec2::new(-2.0 / w as f32, -4.0 / h as f32);
    let velocity = solver.read_field(FieldId::Velocity);
    let v = velocity[(h / 2) * w + w / 2];
    assert!(v.truncate().truncate().abs_diff_eq(expected, 1e-5), "{v}");
}

#[test]
fn test_resize_preserves_dye() {
    let mut solver = solver_with(quiet_config());
    seed_dye(&mut solver, |uv| {
        if uv.x < 0.5 {
            Vec4::new(1.0, 0.0, 0.0, 1.0)
        } else {
            Vec4::ZERO
        }
    });

    solver.resize(128, 64);
    assert_eq!(solver.field(FieldId::Dye).size(), (128, 64));
    assert_eq!(solver.field(FieldId::Velocity).size(), (64, 32));
    assert_eq!(solver.field(FieldId::Divergence).size(), (64, 32));

    let snapshot = FieldSnapshot::capture(&mut solver);
    assert!(snapshot.dye_at(10, 32).x > 0.99);
    assert!(snapshot.dye_at(120, 32).x < 1e-6);

    let buffers = solver.buffers();
    for field in [&buffers.dye, &buffers.velocity, &buffers.pressure] {
        assert!(field.write().texture().data().iter().all(|v| *v == 0.0));
    }
}

#[test]
fn test_same_size_resize_is_noop() {
    let mut solver = solver_with(quiet_config());
    seed_dye(&mut solver, |uv| Vec4::new(uv.x, uv.y, 0.0, 1.0));
    let before = solver.read_field(FieldId::Dye);
    solver.resize(64, 64);
    assert_eq!(solver.read_field(FieldId::Dye), before);
}

#[test]
fn test_smoke_rises() {
    let mut solver = solver_with(SimConfig {
        emit_smoke: true,
        ..quiet_config()
    });
    assert!(solver.read_field(FieldId::Dye).iter().all(|t| *t == Vec4::ZERO));

    solver.step(1.0 / 60.0);
    let first = FieldSnapshot::capture(&mut solver).dye_center_y();

    for _ in 1..120 {
        solver.step(1.0 / 60.0);
    }
    let snapshot = FieldSnapshot::capture(&mut solver);
    let last = snapshot.dye_center_y();
    assert!(last > first, "dye did not rise: {first} -> {last}");

    // the emitter sits below the floor, so anything in the upper half was carried there
    let (w, h) = snapshot.dye_size;
    let upper: f32 = (h / 2..h)
        .flat_map(|y| (0..w).map(move |x| (x, y)))
        .map(|(x, y)| snapshot.dye_at(x, y).z)
        .sum();
    assert!(upper > 0.0, "no dye above the emitter");
}

#[test]
fn test_non_finite_dt_leaves_fields_finite() {
    let mut solver = solver_with(SimConfig {
        emit_smoke: true,
        ..quiet_config()
    });
    seed_velocity(&mut solver, radial_burst);

    for dt in [f32::NAN, f32::INFINITY, f32::NEG_INFINITY] {
        solver.step(dt);
    }

    assert!(solver.read_field(FieldId::Velocity).iter().all(|t| t.is_finite()));
    assert!(solver.read_field(FieldId::Dye).iter().all(|t| t.is_finite()));
    assert!(solver.read_field(FieldId::Pressure).iter().all(|t| t.is_finite()));
}

#[test]
fn test_failed_stage_degrades_instead_of_failing() {
    let mut device = CpuDevice::new(64, 64);
    device.reject_stage(StageKind::Advection);

    let mut solver = SmokeSolver::initialize(
        device,
        SimConfig {
            emit_smoke: true,
            ..quiet_config()
        },
    )
    .unwrap();
    assert_eq!(
        solver.registry().unusable().collect::<Vec<_>>(),
        vec![StageKind::Advection]
    );

    solver.step(1.0 / 60.0);
    solver.render(None);
    assert!(solver.read_field(FieldId::Dye).iter().any(|t| t.z > 0.0));
}

#[test]
fn test_manual_filtering_matches_hardware_filtering() {
    let advect = |capabilities: Capabilities| {
        let device = CpuDevice::with_capabilities(64, 64, capabilities);
        let mut solver = SmokeSolver::initialize(device, quiet_config()).unwrap();
        seed_velocity(&mut solver, |_| Vec2::new(40.0, -25.0));
        seed_dye(&mut solver, |uv| {
            Vec4::new((uv.x * 9.0).sin().abs(), (uv.y * 7.0).cos().abs(), uv.x * uv.y, 1.0)
        });
        solver.advect_velocity(1.0 / 60.0);
        solver.advect_dye(1.0 / 60.0);
        (
            solver.read_field(FieldId::Velocity),
            solver.read_field(FieldId::Dye),
        )
    };

    let (hw_velocity, hw_dye) = advect(Capabilities::full());
    let (sw_velocity, sw_dye) = advect(Capabilities::minimal());

    assert_eq!(hw_dye.len(), sw_dye.len());
    for (a, b) in hw_dye.iter().zip(&sw_dye) {
        assert!(a.truncate().abs_diff_eq(b.truncate(), 1e-4), "{a} vs {b}");
    }
    for (a, b) in hw_velocity.iter().zip(&sw_velocity) {
        assert!((a.x - b.x).abs() < 1e-3 && (a.y - b.y).abs() < 1e-3, "{a} vs {b}");
    }
}

#[test]
fn test_missing_rgba_format_fails_initialization() {
    let capabilities = Capabilities {
        supports_float_filtering: true,
        supports_half_float: true,
        renderable: vec![riseflow::TextureFormat::R16Float],
    };
    let result = SmokeSolver::initialize(
        CpuDevice::with_capabilities(64, 64, capabilities),
        quiet_config(),
    );
    assert!(matches!(result, Err(SolverError::NoRenderableFormat)));
}

#[test]
fn test_empty_scene_renders_background() {
    let mut solver = solver_with(SimConfig {
        bloom: true,
        ..quiet_config()
    });
    solver.render(None);

    let back = solver.config().back_color.normalized();
    for texel in solver.read_surface() {
        assert!(texel.truncate().abs_diff_eq(back, 1e-6));
        assert!((texel.w - 1.0).abs() < 1e-6);
    }
}

#[test]
fn test_render_to_field_overwrites() {
    let mut solver = solver_with(quiet_config());
    seed_dye(&mut solver, |_| Vec4::new(1.0, 1.0, 1.0, 1.0));

    let field = solver.render_to_field(16, 16);
    let texels = solver.device_mut().read_texels(Source::Texture(field.texture()));
    for texel in texels {
        assert!(texel.abs_diff_eq(Vec4::ONE, 1e-4), "{texel}");
    }
}

#[test]
fn test_bloom_mip_chain_stops_at_two_texels() {
    let solver = solver_with(SimConfig {
        bloom: true,
        bloom_resolution: 256,
        bloom_iterations: 8,
        ..quiet_config()
    });
    let mips = &solver.buffers().bloom_mips;
    assert_eq!(mips.len(), 7);
    assert_eq!(mips[0].size(), (128, 128));
    assert_eq!(mips[6].size(), (2, 2));
}

#[test]
fn test_reduced_motion_round_trip() {
    let mut solver = solver_with(quiet_config());
    solver.set_reduced_motion(true);
    assert_eq!(solver.config().smoke_buoyancy, 0.25);
    assert_eq!(solver.config().curl, 2.8);

    solver.set_reduced_motion(false);
    assert_eq!(solver.config().smoke_buoyancy, 0.45);
    assert_eq!(solver.config().curl, 3.5);
}
