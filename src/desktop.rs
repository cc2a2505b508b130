use eframe::egui;
use glam::Vec2;

use crate::device::Device;
use crate::export::{texels_to_rgba, ImageExporter};
use crate::solver::SmokeSolver;

/// Pointer id used for the mouse; touches use their own ids.
const MOUSE_POINTER: i64 = -1;

pub struct SmokeApp<D: Device> {
    solver: SmokeSolver<D>,
    exporter: ImageExporter,
    texture: Option<egui::TextureHandle>,
    paused: bool,
    reduced_motion: bool,
    /// Surface pixels per canvas point.
    render_scale: f32,
    frame_count: usize,
    status: String,
}

impl<D: Device> SmokeApp<D> {
    pub fn new(solver: SmokeSolver<D>) -> Self {
        Self {
            solver,
            exporter: ImageExporter::default(),
            texture: None,
            paused: false,
            reduced_motion: false,
            render_scale: 0.5,
            frame_count: 0,
            status: String::new(),
        }
    }

    fn texcoord(rect: egui::Rect, pos: egui::Pos2) -> Vec2 {
        Vec2::new(
            (pos.x - rect.left()) / rect.width(),
            1.0 - (pos.y - rect.top()) / rect.height(),
        )
    }

    fn handle_pointers(&mut self, ctx: &egui::Context, rect: egui::Rect, response: &egui::Response) {
        let aspect = rect.width() / rect.height().max(1.0);

        if response.drag_started_by(egui::PointerButton::Primary) {
            if let Some(pos) = response.interact_pointer_pos() {
                let pointer = self.solver.pointer(MOUSE_POINTER);
                pointer.down = true;
                pointer.texcoord = Self::texcoord(rect, pos);
                pointer.prev_texcoord = pointer.texcoord;
            }
        } else if response.dragged_by(egui::PointerButton::Primary) {
            if let Some(pos) = response.interact_pointer_pos() {
                self.solver.pointer(MOUSE_POINTER).move_to(Self::texcoord(rect, pos), aspect);
            }
        } else if response.drag_stopped_by(egui::PointerButton::Primary) {
            self.solver.pointer(MOUSE_POINTER).down = false;
        }

        let events = ctx.input(|i| i.events.clone());
        for event in events {
            if let egui::Event::Touch { id, phase, pos, .. } = event {
                let id = id.0 as i64;
                match phase {
                    egui::TouchPhase::Start => {
                        let pointer = self.solver.pointer(id);
                        pointer.down = true;
                        pointer.texcoord = Self::texcoord(rect, pos);
                        pointer.prev_texcoord = pointer.texcoord;
                    }
                    egui::TouchPhase::Move => {
                        self.solver.pointer(id).move_to(Self::texcoord(rect, pos), aspect);
                    }
                    egui::TouchPhase::End | egui::TouchPhase::Cancel => {
                        self.solver.release_pointer(id);
                    }
                }
            }
        }
    }

    fn upload_frame(&mut self, ctx: &egui::Context) {
        self.solver.render(None);
        let (width, height) = self.solver.device().surface_size();
        let texels = self.solver.read_surface();

        let image = match texels_to_rgba(&texels, width, height) {
            Ok(image) => image,
            Err(err) => {
                log::warn!("skipping frame: {err}");
                return;
            }
        };
        let color_image = egui::ColorImage::from_rgba_unmultiplied(
            [width as usize, height as usize],
            image.as_raw(),
        );

        match &mut self.texture {
            Some(texture) => texture.set(color_image, egui::TextureOptions::LINEAR),
            None => {
                self.texture = Some(ctx.load_texture("smoke", color_image, egui::TextureOptions::LINEAR));
            }
        }
    }
}

impl<D: Device> eframe::App for SmokeApp<D> {
    fn update(&mut self, ctx: &egui::Context, _frame: &mut eframe::Frame) {
        egui::TopBottomPanel::top("controls").show(ctx, |ui| {
            ui.horizontal(|ui| {
                if ui.button("Pause/Resume").clicked() {
                    self.paused = !self.paused;
                }

                if ui.checkbox(&mut self.reduced_motion, "Reduced motion").changed() {
                    self.solver.set_reduced_motion(self.reduced_motion);
                }

                ui.add(egui::Slider::new(&mut self.render_scale, 0.25..=1.0).text("Render scale"));

                if ui.button("Export PNG").clicked() {
                    let path = std::path::Path::new("frame.png");
                    self.status = match self.exporter.export_frame_png(&mut self.solver, path) {
                        Ok(()) => format!("exported {}", path.display()),
                        Err(err) => format!("export failed: {err}"),
                    };
                }

                ui.label(format!("frame {}", self.frame_count));
                ui.label(&self.status);
            });
        });

        egui::CentralPanel::default()
            .frame(egui::Frame::none())
            .show(ctx, |ui| {
                let (rect, response) =
                    ui.allocate_exact_size(ui.available_size(), egui::Sense::click_and_drag());

                let width = (rect.width() * self.render_scale).max(1.0) as u32;
                let height = (rect.height() * self.render_scale).max(1.0) as u32;
                self.solver.resize(width, height);

                self.handle_pointers(ctx, rect, &response);

                if !self.paused {
                    let dt = ctx.input(|i| i.stable_dt);
                    self.solver.step(dt);
                    self.frame_count += 1;
                }

                self.upload_frame(ctx);

                if let Some(texture) = &self.texture {
                    ui.painter().image(
                        texture.id(),
                        rect,
                        egui::Rect::from_min_max(egui::pos2(0.0, 0.0), egui::pos2(1.0, 1.0)),
                        egui::Color32::WHITE,
                    );
                }
            });

        ctx.request_repaint();
    }
}
