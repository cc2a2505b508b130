//! Shader-stage registry: every physics and post-process operator as a named
//! stage, its declared parameters and inputs, and the invocation façade the
//! solver drives.

use bytemuck::{Pod, Zeroable};
use glam::{Vec2, Vec3, Vec4};
use thiserror::Error;

use crate::device::{Blend, Device, Draw, MAX_INPUTS, Target};
use crate::field::Field;

#[derive(Debug, Error)]
pub enum StageError {
    #[error("unknown stage `{0}`")]
    UnknownStage(String),
    #[error("stage `{stage}` failed to compile: {message}")]
    Compile { stage: &'static str, message: String },
    #[error("parameter `{name}` expects {expected}")]
    ParameterType { name: String, expected: &'static str },
    #[error("unknown parameter `{0}`")]
    UnknownParameter(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StageKind {
    Copy,
    Clear,
    Color,
    Splat,
    Advection,
    Divergence,
    Curl,
    Vorticity,
    Pressure,
    GradientSubtract,
    Buoyancy,
    BloomPrefilter,
    BloomBlur,
    BloomFinal,
    Display,
}

impl StageKind {
    pub const ALL: [StageKind; 15] = [
        StageKind::Copy,
        StageKind::Clear,
        StageKind::Color,
        StageKind::Splat,
        StageKind::Advection,
        StageKind::Divergence,
        StageKind::Curl,
        StageKind::Vorticity,
        StageKind::Pressure,
        StageKind::GradientSubtract,
        StageKind::Buoyancy,
        StageKind::BloomPrefilter,
        StageKind::BloomBlur,
        StageKind::BloomFinal,
        StageKind::Display,
    ];

    pub fn index(self) -> usize {
        self as usize
    }

    pub fn name(self) -> &'static str {
        match self {
            StageKind::Copy => "copy",
            StageKind::Clear => "clear",
            StageKind::Color => "color",
            StageKind::Splat => "splat",
            StageKind::Advection => "advection",
            StageKind::Divergence => "divergence",
            StageKind::Curl => "curl",
            StageKind::Vorticity => "vorticity",
            StageKind::Pressure => "pressure",
            StageKind::GradientSubtract => "gradient_subtract",
            StageKind::Buoyancy => "buoyancy",
            StageKind::BloomPrefilter => "bloom_prefilter",
            StageKind::BloomBlur => "bloom_blur",
            StageKind::BloomFinal => "bloom_final",
            StageKind::Display => "display",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|kind| kind.name() == name)
    }

    /// Sampled inputs, in binding-slot order.
    pub fn inputs(self) -> &'static [&'static str] {
        match self {
            StageKind::Copy
            | StageKind::Clear
            | StageKind::BloomPrefilter
            | StageKind::BloomBlur
            | StageKind::BloomFinal => &["source"],
            StageKind::Color => &[],
            StageKind::Splat => &["target"],
            StageKind::Advection => &["velocity", "source"],
            StageKind::Divergence | StageKind::Curl => &["velocity"],
            StageKind::Vorticity => &["velocity", "curl"],
            StageKind::Pressure => &["pressure", "divergence"],
            StageKind::GradientSubtract => &["pressure", "velocity"],
            StageKind::Buoyancy => &["velocity", "density"],
            StageKind::Display => &["dye", "bloom"],
        }
    }

    /// Parameters the stage reads.
    pub fn uniforms(self) -> &'static [&'static str] {
        match self {
            StageKind::Copy => &[],
            StageKind::Clear => &["value"],
            StageKind::Color => &["color"],
            StageKind::Splat => &["aspect_ratio", "color", "point", "radius"],
            StageKind::Advection => &["texel_size", "dye_texel_size", "dt", "dissipation"],
            StageKind::Divergence
            | StageKind::Curl
            | StageKind::Pressure
            | StageKind::GradientSubtract
            | StageKind::BloomBlur
            | StageKind::Display => &["texel_size"],
            StageKind::Vorticity => &["texel_size", "curl", "dt"],
            StageKind::Buoyancy => &["buoyancy", "dt"],
            StageKind::BloomPrefilter => &["curve", "threshold"],
            StageKind::BloomFinal => &["texel_size", "intensity"],
        }
    }

    pub fn slot(self, input: &str) -> Option<usize> {
        self.inputs().iter().position(|name| *name == input)
    }
}

/// Compile-time switches a stage variant is built with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Define {
    ManualFiltering,
    Bloom,
    Shading,
}

impl Define {
    pub const ALL: [Define; 3] = [Define::ManualFiltering, Define::Bloom, Define::Shading];

    pub fn keyword(self) -> &'static str {
        match self {
            Define::ManualFiltering => "MANUAL_FILTERING",
            Define::Bloom => "BLOOM",
            Define::Shading => "SHADING",
        }
    }
}

/// Which defines the solver wants for this run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StageFeatures {
    pub manual_filtering: bool,
    pub bloom: bool,
    pub shading: bool,
}

impl StageFeatures {
    pub fn defines_for(&self, stage: StageKind) -> Vec<Define> {
        let mut defines = Vec::new();
        match stage {
            StageKind::Advection if self.manual_filtering => defines.push(Define::ManualFiltering),
            StageKind::Display => {
                if self.bloom {
                    defines.push(Define::Bloom);
                }
                if self.shading {
                    defines.push(Define::Shading);
                }
            }
            _ => {}
        }
        defines
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Uniform {
    Float(f32),
    Vec2(Vec2),
    Vec3(Vec3),
    Vec4(Vec4),
}

impl From<f32> for Uniform {
    fn from(value: f32) -> Self {
        Uniform::Float(value)
    }
}

impl From<Vec2> for Uniform {
    fn from(value: Vec2) -> Self {
        Uniform::Vec2(value)
    }
}

impl From<Vec3> for Uniform {
    fn from(value: Vec3) -> Self {
        Uniform::Vec3(value)
    }
}

impl From<Vec4> for Uniform {
    fn from(value: Vec4) -> Self {
        Uniform::Vec4(value)
    }
}

/// Parameter block shared by every stage (must match the WGSL `Params`).
#[repr(C)]
#[derive(Copy, Clone, Debug, Default, PartialEq, Pod, Zeroable)]
pub struct StageParams {
    pub texel_size: [f32; 2],
    pub dye_texel_size: [f32; 2],
    pub color: [f32; 4],
    pub curve: [f32; 4],
    pub point: [f32; 2],
    pub dt: f32,
    pub dissipation: f32,
    pub value: f32,
    pub aspect_ratio: f32,
    pub radius: f32,
    pub curl: f32,
    pub buoyancy: f32,
    pub threshold: f32,
    pub intensity: f32,
    pub _padding: f32,
}

impl StageParams {
    pub fn set(&mut self, name: &str, value: Uniform) -> Result<(), StageError> {
        let mismatch = |expected| StageError::ParameterType {
            name: name.to_string(),
            expected,
        };

        match (name, value) {
            ("texel_size", Uniform::Vec2(v)) => self.texel_size = v.to_array(),
            ("dye_texel_size", Uniform::Vec2(v)) => self.dye_texel_size = v.to_array(),
            ("point", Uniform::Vec2(v)) => self.point = v.to_array(),
            ("color", Uniform::Vec3(v)) => self.color = v.extend(1.0).to_array(),
            ("color", Uniform::Vec4(v)) => self.color = v.to_array(),
            ("curve", Uniform::Vec3(v)) => self.curve = v.extend(0.0).to_array(),
            ("dt", Uniform::Float(v)) => self.dt = v,
            ("dissipation", Uniform::Float(v)) => self.dissipation = v,
            ("value", Uniform::Float(v)) => self.value = v,
            ("aspect_ratio", Uniform::Float(v)) => self.aspect_ratio = v,
            ("radius", Uniform::Float(v)) => self.radius = v,
            ("curl", Uniform::Float(v)) => self.curl = v,
            ("buoyancy", Uniform::Float(v)) => self.buoyancy = v,
            ("threshold", Uniform::Float(v)) => self.threshold = v,
            ("intensity", Uniform::Float(v)) => self.intensity = v,
            ("texel_size" | "dye_texel_size" | "point", _) => return Err(mismatch("vec2")),
            ("color", _) => return Err(mismatch("vec3 or vec4")),
            ("curve", _) => return Err(mismatch("vec3")),
            (
                "dt" | "dissipation" | "value" | "aspect_ratio" | "radius" | "curl" | "buoyancy"
                | "threshold" | "intensity",
                _,
            ) => return Err(mismatch("float")),
            _ => return Err(StageError::UnknownParameter(name.to_string())),
        }
        Ok(())
    }

    pub fn texel_size(&self) -> Vec2 {
        Vec2::from_array(self.texel_size)
    }

    pub fn dye_texel_size(&self) -> Vec2 {
        Vec2::from_array(self.dye_texel_size)
    }

    pub fn point(&self) -> Vec2 {
        Vec2::from_array(self.point)
    }

    pub fn color(&self) -> Vec4 {
        Vec4::from_array(self.color)
    }

    pub fn curve(&self) -> Vec3 {
        Vec4::from_array(self.curve).truncate()
    }
}

/// A compiled stage. The kernel is `None` when compilation failed; draws
/// through such a handle are skipped.
pub struct StageHandle<K> {
    kind: StageKind,
    defines: Vec<Define>,
    kernel: Option<K>,
}

impl<K> StageHandle<K> {
    pub fn kind(&self) -> StageKind {
        self.kind
    }

    pub fn defines(&self) -> &[Define] {
        &self.defines
    }

    pub fn kernel(&self) -> Option<&K> {
        self.kernel.as_ref()
    }

    pub fn is_usable(&self) -> bool {
        self.kernel.is_some()
    }

    pub fn slot(&self, input: &str) -> Option<usize> {
        self.kind.slot(input)
    }
}

/// Parameters and inputs of one invocation, built up before the draw.
pub struct Pass<'a, T> {
    stage: StageKind,
    params: StageParams,
    inputs: [Option<&'a T>; MAX_INPUTS],
    blend: Blend,
}

impl<'a, T> Pass<'a, T> {
    pub fn new(stage: StageKind) -> Self {
        Self {
            stage,
            params: StageParams::default(),
            inputs: [None; MAX_INPUTS],
            blend: Blend::Replace,
        }
    }

    pub fn uniform(mut self, name: &str, value: impl Into<Uniform>) -> Self {
        if !self.stage.uniforms().contains(&name) {
            log::warn!("stage {} has no parameter `{name}`", self.stage.name());
            return self;
        }
        if let Err(err) = self.params.set(name, value.into()) {
            log::warn!("stage {}: {err}", self.stage.name());
        }
        self
    }

    pub fn input(mut self, name: &str, field: &'a Field<T>) -> Self {
        match self.stage.slot(name) {
            Some(slot) => self.inputs[slot] = Some(field.texture()),
            None => log::warn!("stage {} has no input `{name}`", self.stage.name()),
        }
        self
    }

    pub fn blend(mut self, blend: Blend) -> Self {
        self.blend = blend;
        self
    }

    pub fn params(&self) -> &StageParams {
        &self.params
    }
}

/// Where an invocation renders.
pub enum Output<'a, T> {
    Surface,
    Field(&'a mut Field<T>),
}

pub struct StageRegistry<K> {
    handles: Vec<StageHandle<K>>,
}

impl<K> StageRegistry<K> {
    /// Compiles every stage. Failures are logged and leave the handle unusable.
    pub fn compile<D>(device: &mut D, features: &StageFeatures) -> Self
    where
        D: Device<Kernel = K>,
    {
        let handles = StageKind::ALL
            .into_iter()
            .map(|kind| {
                let defines = features.defines_for(kind);
                let kernel = match device.compile_stage(kind, &defines) {
                    Ok(kernel) => Some(kernel),
                    Err(err) => {
                        log::error!("{err}");
                        None
                    }
                };
                StageHandle {
                    kind,
                    defines,
                    kernel,
                }
            })
            .collect();

        Self { handles }
    }

    pub fn get(&self, kind: StageKind) -> &StageHandle<K> {
        &self.handles[kind.index()]
    }

    pub fn lookup(&self, name: &str) -> Result<&StageHandle<K>, StageError> {
        StageKind::from_name(name)
            .map(|kind| self.get(kind))
            .ok_or_else(|| StageError::UnknownStage(name.to_string()))
    }

    pub fn unusable(&self) -> impl Iterator<Item = StageKind> + '_ {
        self.handles
            .iter()
            .filter(|handle| !handle.is_usable())
            .map(|handle| handle.kind)
    }

    /// Binds the pass inputs, renders into `output`, and returns whether the
    /// draw was issued.
    pub fn run<D>(&self, device: &mut D, pass: Pass<'_, D::Texture>, output: Output<'_, D::Texture>) -> bool
    where
        D: Device<Kernel = K>,
    {
        let Some(kernel) = self.get(pass.stage).kernel() else {
            return false;
        };

        let target = match output {
            Output::Surface => Target::Surface,
            Output::Field(field) => Target::Texture(field.texture_mut()),
        };

        device.draw(Draw {
            stage: pass.stage,
            kernel,
            params: &pass.params,
            inputs: pass.inputs,
            target,
            blend: pass.blend,
        });
        true
    }
}
