//! Compositor: background tint, then dye (plus bloom) in gamma space.

use crate::bloom::apply_bloom;
use crate::capabilities::FilterMode;
use crate::device::{Blend, Device};
use crate::field::Field;
use crate::framebuffers::Framebuffers;
use crate::solver::SmokeSolver;
use crate::stage::{Output, Pass, StageKind};

fn output<'a, T>(target: &'a mut Option<&mut Field<T>>) -> Output<'a, T> {
    match target {
        Some(field) => Output::Field(&mut **field),
        None => Output::Surface,
    }
}

impl<D: Device> SmokeSolver<D> {
    /// Composites the current dye onto `target`, or onto the surface when
    /// `None`. The surface blends premultiplied-over; fields are overwritten.
    pub fn render(&mut self, mut target: Option<&mut Field<D::Texture>>) {
        if self.config.bloom {
            let Framebuffers {
                dye,
                bloom,
                bloom_mips,
                ..
            } = &mut self.buffers;
            apply_bloom(
                &mut self.device,
                &self.registry,
                &self.config,
                dye.read(),
                bloom,
                bloom_mips,
            );
        }

        let blend = if target.is_none() {
            Blend::PremultipliedOver
        } else {
            Blend::Replace
        };

        let background = Pass::new(StageKind::Color)
            .uniform("color", self.config.back_color.normalized().extend(1.0))
            .blend(blend);
        self.registry
            .run(&mut self.device, background, output(&mut target));

        let texel_size = match &target {
            Some(field) => field.texel_size(),
            None => self.surface_texel_size(),
        };

        let mut pass = Pass::new(StageKind::Display)
            .input("dye", self.buffers.dye.read())
            .uniform("texel_size", texel_size)
            .blend(blend);
        if self.config.bloom {
            pass = pass.input("bloom", &self.buffers.bloom);
        }
        self.registry.run(&mut self.device, pass, output(&mut target));
    }

    /// Renders into a fresh RGBA field of the given size, e.g. for export.
    pub fn render_to_field(&mut self, width: u32, height: u32) -> Field<D::Texture> {
        let format = self.resources.formats().rgba;
        let texture = self
            .device
            .create_texture(width, height, format, FilterMode::Nearest);
        let mut field = Field::new(texture, width, height, format, FilterMode::Nearest);
        self.render(Some(&mut field));
        field
    }
}
