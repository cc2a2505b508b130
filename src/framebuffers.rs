//! Texture/framebuffer resource manager.
//!
//! Owns every field the solver touches. Other components borrow fields for
//! the length of one call; a resize reallocates storage and copies the
//! committed contents forward through the copy stage.

use crate::capabilities::{FilterMode, FormatSet, TextureFormat};
use crate::config::SimConfig;
use crate::device::Device;
use crate::field::{DoubleField, Field};
use crate::stage::{Output, Pass, StageKind, StageRegistry};

/// Grid size for a base resolution on a surface of the given size: the
/// shorter axis gets `round(base)` texels, the longer `round(base * aspect)`.
pub fn resolution(base: u32, surface_width: u32, surface_height: u32) -> (u32, u32) {
    let width = surface_width.max(1) as f32;
    let height = surface_height.max(1) as f32;

    let mut aspect = width / height;
    if aspect < 1.0 {
        aspect = 1.0 / aspect;
    }

    let min = (base as f32).round().max(1.0) as u32;
    let max = (base as f32 * aspect).round().max(1.0) as u32;

    if surface_width > surface_height {
        (max, min)
    } else {
        (min, max)
    }
}

/// Every field the solver and its post-process use.
pub struct Framebuffers<T> {
    pub dye: DoubleField<T>,
    pub velocity: DoubleField<T>,
    pub divergence: Field<T>,
    pub curl: Field<T>,
    pub pressure: DoubleField<T>,
    pub bloom: Field<T>,
    pub bloom_mips: Vec<Field<T>>,
}

pub struct ResourceManager {
    formats: FormatSet,
    filter: FilterMode,
}

impl ResourceManager {
    pub fn new(formats: FormatSet, filter: FilterMode) -> Self {
        Self { formats, filter }
    }

    pub fn formats(&self) -> FormatSet {
        self.formats
    }

    pub fn filter(&self) -> FilterMode {
        self.filter
    }

    pub fn create<D: Device>(
        &self,
        device: &mut D,
        width: u32,
        height: u32,
        format: TextureFormat,
        filter: FilterMode,
    ) -> Field<D::Texture> {
        let texture = device.create_texture(width, height, format, filter);
        Field::new(texture, width, height, format, filter)
    }

    pub fn create_double<D: Device>(
        &self,
        device: &mut D,
        width: u32,
        height: u32,
        format: TextureFormat,
        filter: FilterMode,
    ) -> DoubleField<D::Texture> {
        let first = self.create(device, width, height, format, filter);
        let second = self.create(device, width, height, format, filter);
        DoubleField::new(first, second)
    }

    /// Reallocates `field` at the new size with its content rendered in.
    pub fn resize<D: Device>(
        &self,
        device: &mut D,
        registry: &StageRegistry<D::Kernel>,
        field: Field<D::Texture>,
        width: u32,
        height: u32,
    ) -> Field<D::Texture> {
        self.copy_resized(device, registry, &field, width, height)
    }

    /// Resizes the read side with its content and reallocates the write
    /// side empty. Same-size requests leave the pair untouched.
    pub fn resize_double<D: Device>(
        &self,
        device: &mut D,
        registry: &StageRegistry<D::Kernel>,
        target: &mut DoubleField<D::Texture>,
        width: u32,
        height: u32,
    ) {
        if target.size() == (width, height) {
            return;
        }
        let (format, filter) = (target.read().format(), target.read().filter());
        let read = self.copy_resized(device, registry, target.read(), width, height);
        let write = self.create(device, width, height, format, filter);
        target.replace(read, write);
    }

    fn copy_resized<D: Device>(
        &self,
        device: &mut D,
        registry: &StageRegistry<D::Kernel>,
        source: &Field<D::Texture>,
        width: u32,
        height: u32,
    ) -> Field<D::Texture> {
        let mut resized = self.create(device, width, height, source.format(), source.filter());
        let copied = registry.run(
            device,
            Pass::new(StageKind::Copy).input("source", source),
            Output::Field(&mut resized),
        );
        if !copied {
            log::warn!("copy stage unavailable, resized field starts empty");
        }
        resized
    }

    /// First allocation for a surface of the current size.
    pub fn allocate<D: Device>(&self, device: &mut D, config: &SimConfig) -> Framebuffers<D::Texture> {
        let (surface_width, surface_height) = device.surface_size();
        let (sim_w, sim_h) = resolution(config.sim_resolution, surface_width, surface_height);
        let (dye_w, dye_h) = resolution(config.dye_resolution, surface_width, surface_height);

        log::info!("allocating fields: sim {sim_w}x{sim_h}, dye {dye_w}x{dye_h}");

        let dye = self.create_double(device, dye_w, dye_h, self.formats.rgba, self.filter);
        let velocity = self.create_double(device, sim_w, sim_h, self.formats.rg, self.filter);
        let divergence = self.create(device, sim_w, sim_h, self.formats.r, FilterMode::Nearest);
        let curl = self.create(device, sim_w, sim_h, self.formats.r, FilterMode::Nearest);
        let pressure = self.create_double(device, sim_w, sim_h, self.formats.r, FilterMode::Nearest);
        let (bloom, bloom_mips) = self.allocate_bloom(device, config);

        Framebuffers {
            dye,
            velocity,
            divergence,
            curl,
            pressure,
            bloom,
            bloom_mips,
        }
    }

    /// Follows a surface resize: dye and velocity keep their content,
    /// everything derived each tick is recreated.
    pub fn reallocate<D: Device>(
        &self,
        device: &mut D,
        registry: &StageRegistry<D::Kernel>,
        config: &SimConfig,
        buffers: &mut Framebuffers<D::Texture>,
    ) {
        let (surface_width, surface_height) = device.surface_size();
        let (sim_w, sim_h) = resolution(config.sim_resolution, surface_width, surface_height);
        let (dye_w, dye_h) = resolution(config.dye_resolution, surface_width, surface_height);

        log::debug!("reallocating fields: sim {sim_w}x{sim_h}, dye {dye_w}x{dye_h}");

        self.resize_double(device, registry, &mut buffers.dye, dye_w, dye_h);
        self.resize_double(device, registry, &mut buffers.velocity, sim_w, sim_h);

        buffers.divergence = self.create(device, sim_w, sim_h, self.formats.r, FilterMode::Nearest);
        buffers.curl = self.create(device, sim_w, sim_h, self.formats.r, FilterMode::Nearest);
        buffers.pressure = self.create_double(device, sim_w, sim_h, self.formats.r, FilterMode::Nearest);

        let (bloom, bloom_mips) = self.allocate_bloom(device, config);
        buffers.bloom = bloom;
        buffers.bloom_mips = bloom_mips;
    }

    fn allocate_bloom<D: Device>(
        &self,
        device: &mut D,
        config: &SimConfig,
    ) -> (Field<D::Texture>, Vec<Field<D::Texture>>) {
        let (surface_width, surface_height) = device.surface_size();
        let (width, height) = resolution(config.bloom_resolution, surface_width, surface_height);

        let bloom = self.create(device, width, height, self.formats.rgba, self.filter);

        let mut mips = Vec::new();
        for i in 0..config.bloom_iterations {
            let mip_w = width >> (i + 1);
            let mip_h = height >> (i + 1);
            if mip_w < 2 || mip_h < 2 {
                break;
            }
            mips.push(self.create(device, mip_w, mip_h, self.formats.rgba, self.filter));
        }

        (bloom, mips)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_landscape_resolution() {
        assert_eq!(resolution(128, 1920, 1080), (228, 128));
    }

    #[test]
    fn test_portrait_resolution() {
        assert_eq!(resolution(128, 1080, 1920), (128, 228));
    }

    #[test]
    fn test_square_resolution() {
        assert_eq!(resolution(64, 500, 500), (64, 64));
    }

    #[test]
    fn test_degenerate_surface() {
        let (w, h) = resolution(32, 0, 0);
        assert!(w >= 1 && h >= 1);
    }
}
