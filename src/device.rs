//! The seam between the solver and whatever executes its stages.
//!
//! A device allocates float render targets, compiles named stages and runs
//! full-viewport draws. The solver never touches texel memory directly; it
//! only issues draws in dependency order.

use glam::Vec4;

use crate::capabilities::{Capabilities, FilterMode, TextureFormat};
use crate::stage::{Define, StageError, StageKind, StageParams};

/// Maximum number of sampled inputs any stage binds.
pub const MAX_INPUTS: usize = 2;

/// How a draw's output combines with what the target already holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Blend {
    /// `dst = src`
    Replace,
    /// `dst = src + dst`
    Additive,
    /// `dst = src + dst * (1 - src.a)`
    PremultipliedOver,
}

/// Where a draw writes: the visible surface or an owned texture.
pub enum Target<'a, T> {
    Surface,
    Texture(&'a mut T),
}

/// What a readback reads from.
pub enum Source<'a, T> {
    Surface,
    Texture(&'a T),
}

/// One full-viewport draw.
pub struct Draw<'a, D: Device + ?Sized> {
    pub stage: StageKind,
    pub kernel: &'a D::Kernel,
    pub params: &'a StageParams,
    pub inputs: [Option<&'a D::Texture>; MAX_INPUTS],
    pub target: Target<'a, D::Texture>,
    pub blend: Blend,
}

pub trait Device {
    type Texture;
    type Kernel;

    fn capabilities(&self) -> Capabilities;

    /// Allocates a zero-filled render target.
    fn create_texture(
        &mut self,
        width: u32,
        height: u32,
        format: TextureFormat,
        filter: FilterMode,
    ) -> Self::Texture;

    fn compile_stage(
        &mut self,
        stage: StageKind,
        defines: &[Define],
    ) -> Result<Self::Kernel, StageError>;

    /// Size of the visible surface in pixels.
    fn surface_size(&self) -> (u32, u32);

    fn resize_surface(&mut self, width: u32, height: u32);

    fn draw(&mut self, draw: Draw<'_, Self>);

    /// Texels bottom row first, padded to four channels.
    fn read_texels(&mut self, source: Source<'_, Self::Texture>) -> Vec<Vec4>;
}
