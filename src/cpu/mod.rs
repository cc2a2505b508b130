//! Software device: runs every stage per texel on the CPU with rayon.
//!
//! Sampling follows float-texture rules: clamp-to-edge addressing, nearest or
//! bilinear filtering per texture, missing channels read as `(0, 0, 1)`.
//! Row 0 is the bottom of the field.

mod kernels;

use glam::{Vec2, Vec4};
use rayon::prelude::*;

use crate::capabilities::{Capabilities, FilterMode, TextureFormat};
use crate::device::{Blend, Device, Draw, Source, Target};
use crate::stage::{Define, StageError, StageKind};

pub use kernels::{Fragment, FragmentFn, KernelFlags};

#[derive(Debug, Clone, PartialEq)]
pub struct CpuTexture {
    width: usize,
    height: usize,
    channels: usize,
    filter: FilterMode,
    data: Vec<f32>,
}

impl CpuTexture {
    pub fn new(width: usize, height: usize, channels: usize, filter: FilterMode) -> Self {
        Self {
            width,
            height,
            channels,
            filter,
            data: vec![0.0; width * height * channels],
        }
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn height(&self) -> usize {
        self.height
    }

    pub fn channels(&self) -> usize {
        self.channels
    }

    pub fn data(&self) -> &[f32] {
        &self.data
    }

    pub fn texel(&self, x: usize, y: usize) -> Vec4 {
        let idx = (y * self.width + x) * self.channels;
        unpack(&self.data[idx..idx + self.channels])
    }

    pub fn set_texel(&mut self, x: usize, y: usize, value: Vec4) {
        let idx = (y * self.width + x) * self.channels;
        pack(value, &mut self.data[idx..idx + self.channels]);
    }

    /// Fills every texel, e.g. to seed a field in tests and tools.
    pub fn fill_with(&mut self, f: impl Fn(Vec2) -> Vec4) {
        for y in 0..self.height {
            for x in 0..self.width {
                let uv = Vec2::new(
                    (x as f32 + 0.5) / self.width as f32,
                    (y as f32 + 0.5) / self.height as f32,
                );
                self.set_texel(x, y, f(uv));
            }
        }
    }

    fn fetch(&self, x: i64, y: i64) -> Vec4 {
        let x = x.clamp(0, self.width as i64 - 1) as usize;
        let y = y.clamp(0, self.height as i64 - 1) as usize;
        self.texel(x, y)
    }

    /// Samples at a normalized coordinate using the texture's own filter.
    pub fn sample(&self, uv: Vec2) -> Vec4 {
        match self.filter {
            FilterMode::Nearest => self.sample_nearest(uv),
            FilterMode::Linear => self.sample_linear(uv),
        }
    }

    pub fn sample_nearest(&self, uv: Vec2) -> Vec4 {
        let x = (uv.x * self.width as f32).floor() as i64;
        let y = (uv.y * self.height as f32).floor() as i64;
        self.fetch(x, y)
    }

    pub fn sample_linear(&self, uv: Vec2) -> Vec4 {
        let st = Vec2::new(
            uv.x * self.width as f32 - 0.5,
            uv.y * self.height as f32 - 0.5,
        );
        let base = st.floor();
        let frac = st - base;
        let (x0, y0) = (base.x as i64, base.y as i64);

        let a = self.fetch(x0, y0);
        let b = self.fetch(x0 + 1, y0);
        let c = self.fetch(x0, y0 + 1);
        let d = self.fetch(x0 + 1, y0 + 1);

        a.lerp(b, frac.x).lerp(c.lerp(d, frac.x), frac.y)
    }
}

fn unpack(texel: &[f32]) -> Vec4 {
    match texel.len() {
        1 => Vec4::new(texel[0], 0.0, 0.0, 1.0),
        2 => Vec4::new(texel[0], texel[1], 0.0, 1.0),
        3 => Vec4::new(texel[0], texel[1], texel[2], 1.0),
        _ => Vec4::new(texel[0], texel[1], texel[2], texel[3]),
    }
}

fn pack(value: Vec4, texel: &mut [f32]) {
    let value = value.to_array();
    let n = texel.len();
    texel.copy_from_slice(&value[..n]);
}

fn blend(mode: Blend, src: Vec4, dst: Vec4) -> Vec4 {
    match mode {
        Blend::Replace => src,
        Blend::Additive => src + dst,
        Blend::PremultipliedOver => src + dst * (1.0 - src.w),
    }
}

pub struct CpuKernel {
    stage: StageKind,
    fragment: FragmentFn,
    flags: KernelFlags,
}

impl CpuKernel {
    pub fn stage(&self) -> StageKind {
        self.stage
    }

    pub fn flags(&self) -> KernelFlags {
        self.flags
    }
}

pub struct CpuDevice {
    capabilities: Capabilities,
    surface: CpuTexture,
    rejected: Vec<StageKind>,
}

impl CpuDevice {
    pub fn new(width: u32, height: u32) -> Self {
        Self::with_capabilities(width, height, Capabilities::full())
    }

    pub fn with_capabilities(width: u32, height: u32, capabilities: Capabilities) -> Self {
        Self {
            capabilities,
            surface: CpuTexture::new(width as usize, height as usize, 4, FilterMode::Linear),
            rejected: Vec::new(),
        }
    }

    /// Makes later compilation of `stage` fail, as a broken driver would.
    pub fn reject_stage(&mut self, stage: StageKind) {
        self.rejected.push(stage);
    }

    pub fn surface(&self) -> &CpuTexture {
        &self.surface
    }
}

impl Device for CpuDevice {
    type Texture = CpuTexture;
    type Kernel = CpuKernel;

    fn capabilities(&self) -> Capabilities {
        self.capabilities.clone()
    }

    fn create_texture(
        &mut self,
        width: u32,
        height: u32,
        format: TextureFormat,
        filter: FilterMode,
    ) -> CpuTexture {
        CpuTexture::new(width as usize, height as usize, format.channels(), filter)
    }

    fn compile_stage(&mut self, stage: StageKind, defines: &[Define]) -> Result<CpuKernel, StageError> {
        if self.rejected.contains(&stage) {
            return Err(StageError::Compile {
                stage: stage.name(),
                message: "rejected by device".to_string(),
            });
        }
        Ok(CpuKernel {
            stage,
            fragment: kernels::fragment_for(stage),
            flags: KernelFlags::from_defines(defines),
        })
    }

    fn surface_size(&self) -> (u32, u32) {
        (self.surface.width as u32, self.surface.height as u32)
    }

    fn resize_surface(&mut self, width: u32, height: u32) {
        if self.surface_size() != (width, height) {
            self.surface = CpuTexture::new(width as usize, height as usize, 4, FilterMode::Linear);
        }
    }

    fn draw(&mut self, draw: Draw<'_, Self>) {
        let Draw {
            kernel,
            params,
            inputs,
            target,
            blend: mode,
            ..
        } = draw;

        let target = match target {
            Target::Surface => &mut self.surface,
            Target::Texture(texture) => texture,
        };

        let (width, height, channels) = (target.width, target.height, target.channels);
        if width == 0 || height == 0 {
            return;
        }

        target
            .data
            .par_chunks_mut(width * channels)
            .enumerate()
            .for_each(|(y, row)| {
                let v = (y as f32 + 0.5) / height as f32;
                for (x, texel) in row.chunks_mut(channels).enumerate() {
                    let fragment = Fragment {
                        uv: Vec2::new((x as f32 + 0.5) / width as f32, v),
                        params,
                        inputs,
                        flags: kernel.flags,
                    };
                    let src = (kernel.fragment)(&fragment);
                    let out = blend(mode, src, unpack(texel));
                    pack(out, texel);
                }
            });
    }

    fn read_texels(&mut self, source: Source<'_, CpuTexture>) -> Vec<Vec4> {
        let texture = match source {
            Source::Surface => &self.surface,
            Source::Texture(texture) => texture,
        };
        texture.data.chunks(texture.channels).map(unpack).collect()
    }
}
