use std::path::Path;

use rand::Rng;
use riseflow::{AnalysisRecorder, CpuDevice, Device, ImageExporter, SimConfig, SmokeApp, SmokeSolver};

const HEADLESS_FRAMES: usize = 120;
const HEADLESS_DT: f32 = 1.0 / 60.0;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args: Vec<String> = std::env::args().collect();

    let config = match args.iter().position(|arg| arg == "--config") {
        Some(i) => {
            let path = args.get(i + 1).ok_or("--config needs a path")?;
            SimConfig::load(Path::new(path))?
        }
        None => SimConfig::default(),
    };
    let use_gpu = args.iter().any(|arg| arg == "--gpu");

    if args.len() > 1 && args[1] == "test" {
        // Run headless and export PNGs
        if use_gpu {
            run_headless_gpu(config)?;
        } else {
            let solver = SmokeSolver::initialize(CpuDevice::new(256, 256), config)?;
            run_headless_test(solver)?;
        }
    } else {
        run_gui_app(config)?;
    }

    Ok(())
}

#[cfg(feature = "gpu")]
fn run_headless_gpu(config: SimConfig) -> Result<(), Box<dyn std::error::Error>> {
    let rt = tokio::runtime::Runtime::new()?;
    let device = rt.block_on(riseflow::GpuDevice::new(512, 512))?;
    run_headless_test(SmokeSolver::initialize(device, config)?)
}

#[cfg(not(feature = "gpu"))]
fn run_headless_gpu(_config: SimConfig) -> Result<(), Box<dyn std::error::Error>> {
    Err("built without the `gpu` feature".into())
}

fn run_headless_test<D: Device>(mut solver: SmokeSolver<D>) -> Result<(), Box<dyn std::error::Error>> {
    println!("Running headless smoke simulation with quantitative analysis...");

    let exporter = ImageExporter::default();
    let mut recorder = AnalysisRecorder::new();
    let mut rng = rand::thread_rng();

    recorder.record_frame(&mut solver, 0).print_summary();
    exporter.export_frame_png(&mut solver, Path::new("smoke_frame_0000.png"))?;

    for frame in 1..=HEADLESS_FRAMES {
        // a short random stroke every half second
        if frame % 30 == 0 {
            let aspect = solver.aspect_ratio();
            let start = glam::Vec2::new(rng.gen_range(0.2..0.8), rng.gen_range(0.2..0.6));
            let end = start + glam::Vec2::new(rng.gen_range(-0.05..0.05), rng.gen_range(-0.05..0.05));
            let pointer = solver.pointer(0);
            pointer.move_to(start, aspect);
            pointer.take_motion();
            pointer.move_to(end, aspect);
        }

        solver.step(HEADLESS_DT);

        if frame % 10 == 0 {
            let metrics = recorder.record_frame(&mut solver, frame);
            if frame % 30 == 0 {
                metrics.print_summary();
            }
        }

        if frame % 30 == 0 {
            exporter.export_frame_png(&mut solver, Path::new(&format!("smoke_frame_{frame:04}.png")))?;
            exporter.export_velocity_png(&mut solver, Path::new(&format!("smoke_velocity_{frame:04}.png")))?;
        }
    }

    recorder.print_trends();

    println!("Test completed! Simulated {HEADLESS_FRAMES} frames.");
    Ok(())
}

fn run_gui_app(config: SimConfig) -> Result<(), Box<dyn std::error::Error>> {
    let solver = SmokeSolver::initialize(CpuDevice::new(400, 400), config)?;

    let options = eframe::NativeOptions {
        viewport: egui::ViewportBuilder::default()
            .with_inner_size([800.0, 800.0])
            .with_title("riseflow - Rising Smoke"),
        ..Default::default()
    };

    eframe::run_native(
        "riseflow",
        options,
        Box::new(|_cc| Box::new(SmokeApp::new(solver))),
    )?;
    Ok(())
}
