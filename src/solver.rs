//! Simulation orchestrator: owns the device, the compiled stages and every
//! field, and advances the smoke one tick at a time.

use glam::{Vec2, Vec4};
use thiserror::Error;

use crate::capabilities::{Capabilities, FormatSet};
use crate::config::{ConfigError, SimConfig};
use crate::device::{Device, Source};
use crate::field::Field;
use crate::framebuffers::{Framebuffers, ResourceManager};
use crate::pointer::{PointerSample, Pointers};
use crate::stage::{Output, Pass, StageFeatures, StageKind, StageRegistry};

#[derive(Debug, Error)]
pub enum SolverError {
    #[error("device offers no renderable float format")]
    NoRenderableFormat,
    #[error(transparent)]
    Config(#[from] ConfigError),
}

/// Fields that can be read back for inspection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldId {
    Dye,
    Velocity,
    Pressure,
    Divergence,
    Curl,
    Bloom,
}

pub struct SmokeSolver<D: Device> {
    pub(crate) device: D,
    pub(crate) config: SimConfig,
    base_config: SimConfig,
    pub(crate) registry: StageRegistry<D::Kernel>,
    pub(crate) resources: ResourceManager,
    pub(crate) buffers: Framebuffers<D::Texture>,
    pub(crate) pointers: Pointers,
    capabilities: Capabilities,
    reduced_motion: bool,
    ticks: u64,
}

impl<D: Device> SmokeSolver<D> {
    /// Compiles every stage and allocates fields for the device's surface.
    pub fn initialize(mut device: D, config: SimConfig) -> Result<Self, SolverError> {
        config.validate()?;

        let capabilities = device.capabilities();
        let formats = FormatSet::resolve(&capabilities).ok_or(SolverError::NoRenderableFormat)?;

        let mut config = config;
        config.degrade_for(&capabilities);

        let features = StageFeatures {
            manual_filtering: !capabilities.supports_float_filtering,
            bloom: config.bloom,
            shading: config.shading,
        };
        let registry = StageRegistry::compile(&mut device, &features);
        for stage in registry.unusable() {
            log::warn!("stage {} unusable, its passes will be skipped", stage.name());
        }

        let resources = ResourceManager::new(formats, capabilities.filter_mode());
        let buffers = resources.allocate(&mut device, &config);

        log::info!(
            "smoke solver ready: surface {:?}, formats {:?}, filtering {}",
            device.surface_size(),
            formats,
            capabilities.supports_float_filtering
        );

        Ok(Self {
            device,
            base_config: config.clone(),
            config,
            registry,
            resources,
            buffers,
            pointers: Pointers::default(),
            capabilities,
            reduced_motion: false,
            ticks: 0,
        })
    }

    pub fn config(&self) -> &SimConfig {
        &self.config
    }

    pub fn capabilities(&self) -> &Capabilities {
        &self.capabilities
    }

    pub fn device(&self) -> &D {
        &self.device
    }

    pub fn device_mut(&mut self) -> &mut D {
        &mut self.device
    }

    pub fn registry(&self) -> &StageRegistry<D::Kernel> {
        &self.registry
    }

    pub fn buffers(&self) -> &Framebuffers<D::Texture> {
        &self.buffers
    }

    /// Direct field access for seeding state between ticks.
    pub fn buffers_mut(&mut self) -> &mut Framebuffers<D::Texture> {
        &mut self.buffers
    }

    pub fn ticks(&self) -> u64 {
        self.ticks
    }

    pub fn reduced_motion(&self) -> bool {
        self.reduced_motion
    }

    /// Surface width over height.
    pub fn aspect_ratio(&self) -> f32 {
        let (width, height) = self.device.surface_size();
        width.max(1) as f32 / height.max(1) as f32
    }

    pub fn pointer(&mut self, id: i64) -> &mut PointerSample {
        let color = self.config.pointer_color.to_vec3();
        self.pointers.get_or_insert(id, color)
    }

    pub fn release_pointer(&mut self, id: i64) {
        self.pointers.remove(id);
    }

    /// Lowers buoyancy and curl while enabled; restores them when disabled.
    pub fn set_reduced_motion(&mut self, enabled: bool) {
        self.reduced_motion = enabled;
        let mut config = self.base_config.clone();
        if enabled {
            config.apply_reduced_motion();
        }
        self.config = config;
    }

    /// Follows a surface resize. Dye and velocity survive; derived fields
    /// are reallocated.
    pub fn resize(&mut self, width: u32, height: u32) {
        if self.device.surface_size() == (width, height) {
            return;
        }
        self.device.resize_surface(width, height);
        self.resources
            .reallocate(&mut self.device, &self.registry, &self.config, &mut self.buffers);
    }

    /// One tick: pending pointer splats, the emitter, then the physics.
    pub fn step(&mut self, dt: f32) {
        self.apply_inputs();
        if self.config.emit_smoke {
            self.emit();
        }
        self.advance(dt);
        self.ticks += 1;
    }

    /// The physics pipeline alone, in its fixed order. A non-finite `dt`
    /// advances by zero.
    pub fn advance(&mut self, dt: f32) {
        let dt = if dt.is_finite() { dt } else { 0.0 };
        let dt = dt.clamp(0.0, self.config.max_dt);

        self.apply_buoyancy(dt);
        self.compute_curl();
        self.confine_vorticity(dt);
        self.compute_divergence();
        self.solve_pressure();
        self.subtract_gradient();
        self.advect_velocity(dt);
        self.advect_dye(dt);
    }

    pub fn apply_buoyancy(&mut self, dt: f32) {
        let Framebuffers { velocity, dye, .. } = &mut self.buffers;
        let (read, write) = velocity.split();
        let pass = Pass::new(StageKind::Buoyancy)
            .input("velocity", read)
            .input("density", dye.read())
            .uniform("buoyancy", self.config.smoke_buoyancy)
            .uniform("dt", dt);
        if self.registry.run(&mut self.device, pass, Output::Field(write)) {
            velocity.swap();
        }
    }

    pub fn compute_curl(&mut self) {
        let Framebuffers { velocity, curl, .. } = &mut self.buffers;
        let pass = Pass::new(StageKind::Curl)
            .uniform("texel_size", velocity.texel_size())
            .input("velocity", velocity.read());
        self.registry.run(&mut self.device, pass, Output::Field(curl));
    }

    pub fn confine_vorticity(&mut self, dt: f32) {
        let Framebuffers { velocity, curl, .. } = &mut self.buffers;
        let texel_size = velocity.texel_size();
        let (read, write) = velocity.split();
        let pass = Pass::new(StageKind::Vorticity)
            .uniform("texel_size", texel_size)
            .input("velocity", read)
            .input("curl", &*curl)
            .uniform("curl", self.config.curl)
            .uniform("dt", dt);
        if self.registry.run(&mut self.device, pass, Output::Field(write)) {
            velocity.swap();
        }
    }

    pub fn compute_divergence(&mut self) {
        let Framebuffers {
            velocity,
            divergence,
            ..
        } = &mut self.buffers;
        let pass = Pass::new(StageKind::Divergence)
            .uniform("texel_size", velocity.texel_size())
            .input("velocity", velocity.read());
        self.registry.run(&mut self.device, pass, Output::Field(divergence));
    }

    /// Scales last tick's pressure by the retention factor, then relaxes
    /// with a fixed number of Jacobi iterations.
    pub fn solve_pressure(&mut self) {
        let Framebuffers {
            velocity,
            pressure,
            divergence,
            ..
        } = &mut self.buffers;

        let (read, write) = pressure.split();
        let pass = Pass::new(StageKind::Clear)
            .input("source", read)
            .uniform("value", self.config.pressure);
        if self.registry.run(&mut self.device, pass, Output::Field(write)) {
            pressure.swap();
        }

        let texel_size = velocity.texel_size();
        for _ in 0..self.config.pressure_iterations {
            let (read, write) = pressure.split();
            let pass = Pass::new(StageKind::Pressure)
                .uniform("texel_size", texel_size)
                .input("divergence", &*divergence)
                .input("pressure", read);
            if !self.registry.run(&mut self.device, pass, Output::Field(write)) {
                break;
            }
            pressure.swap();
        }
    }

    pub fn subtract_gradient(&mut self) {
        let Framebuffers {
            velocity, pressure, ..
        } = &mut self.buffers;
        let texel_size = velocity.texel_size();
        let (read, write) = velocity.split();
        let pass = Pass::new(StageKind::GradientSubtract)
            .uniform("texel_size", texel_size)
            .input("pressure", pressure.read())
            .input("velocity", read);
        if self.registry.run(&mut self.device, pass, Output::Field(write)) {
            velocity.swap();
        }
    }

    pub fn advect_velocity(&mut self, dt: f32) {
        let velocity = &mut self.buffers.velocity;
        let texel_size = velocity.texel_size();
        let (read, write) = velocity.split();
        let pass = Pass::new(StageKind::Advection)
            .uniform("texel_size", texel_size)
            .uniform("dye_texel_size", texel_size)
            .input("velocity", read)
            .input("source", read)
            .uniform("dt", dt)
            .uniform("dissipation", self.config.velocity_dissipation);
        if self.registry.run(&mut self.device, pass, Output::Field(write)) {
            velocity.swap();
        }
    }

    pub fn advect_dye(&mut self, dt: f32) {
        let Framebuffers { velocity, dye, .. } = &mut self.buffers;
        let dye_texel_size = dye.texel_size();
        let (read, write) = dye.split();
        let pass = Pass::new(StageKind::Advection)
            .uniform("texel_size", velocity.texel_size())
            .uniform("dye_texel_size", dye_texel_size)
            .input("velocity", velocity.read())
            .input("source", read)
            .uniform("dt", dt)
            .uniform("dissipation", self.config.density_dissipation);
        if self.registry.run(&mut self.device, pass, Output::Field(write)) {
            dye.swap();
        }
    }

    pub fn field(&self, id: FieldId) -> &Field<D::Texture> {
        match id {
            FieldId::Dye => self.buffers.dye.read(),
            FieldId::Velocity => self.buffers.velocity.read(),
            FieldId::Pressure => self.buffers.pressure.read(),
            FieldId::Divergence => &self.buffers.divergence,
            FieldId::Curl => &self.buffers.curl,
            FieldId::Bloom => &self.buffers.bloom,
        }
    }

    /// Committed texels of a field, bottom row first.
    pub fn read_field(&mut self, id: FieldId) -> Vec<Vec4> {
        let texture = match id {
            FieldId::Dye => self.buffers.dye.read().texture(),
            FieldId::Velocity => self.buffers.velocity.read().texture(),
            FieldId::Pressure => self.buffers.pressure.read().texture(),
            FieldId::Divergence => self.buffers.divergence.texture(),
            FieldId::Curl => self.buffers.curl.texture(),
            FieldId::Bloom => self.buffers.bloom.texture(),
        };
        self.device.read_texels(Source::Texture(texture))
    }

    pub fn read_surface(&mut self) -> Vec<Vec4> {
        self.device.read_texels(Source::Surface)
    }

    pub(crate) fn surface_texel_size(&self) -> Vec2 {
        let (width, height) = self.device.surface_size();
        Vec2::new(1.0 / width.max(1) as f32, 1.0 / height.max(1) as f32)
    }
}
