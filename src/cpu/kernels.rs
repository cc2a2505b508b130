//! Per-texel programs for every stage.

use glam::{Vec2, Vec3, Vec4, Vec4Swizzles};

use super::CpuTexture;
use crate::device::MAX_INPUTS;
use crate::stage::{Define, StageKind, StageParams};

pub type FragmentFn = fn(&Fragment<'_>) -> Vec4;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct KernelFlags {
    pub manual_filtering: bool,
    pub bloom: bool,
    pub shading: bool,
}

impl KernelFlags {
    pub fn from_defines(defines: &[Define]) -> Self {
        Self {
            manual_filtering: defines.contains(&Define::ManualFiltering),
            bloom: defines.contains(&Define::Bloom),
            shading: defines.contains(&Define::Shading),
        }
    }
}

/// Everything a stage sees for one output texel.
pub struct Fragment<'a> {
    pub uv: Vec2,
    pub params: &'a StageParams,
    pub inputs: [Option<&'a CpuTexture>; MAX_INPUTS],
    pub flags: KernelFlags,
}

impl Fragment<'_> {
    fn sample(&self, slot: usize, uv: Vec2) -> Vec4 {
        self.inputs[slot].map_or(Vec4::ZERO, |tex| tex.sample(uv))
    }

    fn texel(&self) -> Vec2 {
        self.params.texel_size()
    }

    fn left(&self) -> Vec2 {
        self.uv - Vec2::new(self.texel().x, 0.0)
    }

    fn right(&self) -> Vec2 {
        self.uv + Vec2::new(self.texel().x, 0.0)
    }

    fn top(&self) -> Vec2 {
        self.uv + Vec2::new(0.0, self.texel().y)
    }

    fn bottom(&self) -> Vec2 {
        self.uv - Vec2::new(0.0, self.texel().y)
    }

    /// Bilinear reconstruction from four nearest-neighbour taps.
    fn bilerp(&self, slot: usize, uv: Vec2, texel: Vec2) -> Vec4 {
        let st = uv / texel - 0.5;
        let iuv = st.floor();
        let fuv = st - iuv;

        let a = self.sample(slot, (iuv + Vec2::new(0.5, 0.5)) * texel);
        let b = self.sample(slot, (iuv + Vec2::new(1.5, 0.5)) * texel);
        let c = self.sample(slot, (iuv + Vec2::new(0.5, 1.5)) * texel);
        let d = self.sample(slot, (iuv + Vec2::new(1.5, 1.5)) * texel);

        a.lerp(b, fuv.x).lerp(c.lerp(d, fuv.x), fuv.y)
    }
}

pub fn fragment_for(stage: StageKind) -> FragmentFn {
    match stage {
        StageKind::Copy => copy,
        StageKind::Clear => clear,
        StageKind::Color => color,
        StageKind::Splat => splat,
        StageKind::Advection => advection,
        StageKind::Divergence => divergence,
        StageKind::Curl => curl,
        StageKind::Vorticity => vorticity,
        StageKind::Pressure => pressure,
        StageKind::GradientSubtract => gradient_subtract,
        StageKind::Buoyancy => buoyancy,
        StageKind::BloomPrefilter => bloom_prefilter,
        StageKind::BloomBlur => bloom_blur,
        StageKind::BloomFinal => bloom_final,
        StageKind::Display => display,
    }
}

fn copy(f: &Fragment<'_>) -> Vec4 {
    f.sample(0, f.uv)
}

fn clear(f: &Fragment<'_>) -> Vec4 {
    f.params.value * f.sample(0, f.uv)
}

fn color(f: &Fragment<'_>) -> Vec4 {
    f.params.color()
}

fn splat(f: &Fragment<'_>) -> Vec4 {
    let mut p = f.uv - f.params.point();
    p.x *= f.params.aspect_ratio;

    let falloff = (-p.dot(p) / (f.params.radius * 0.6)).exp();
    let splat = falloff * f.params.color().xyz();
    let base = f.sample(0, f.uv).xyz();

    (base + splat).extend(1.0)
}

fn advection(f: &Fragment<'_>) -> Vec4 {
    let dt = f.params.dt;
    let texel = f.texel();

    let result = if f.flags.manual_filtering {
        let coord = f.uv - dt * f.bilerp(0, f.uv, texel).xy() * texel;
        f.bilerp(1, coord, f.params.dye_texel_size())
    } else {
        let coord = f.uv - dt * f.sample(0, f.uv).xy() * texel;
        f.sample(1, coord)
    };

    result / (1.0 + f.params.dissipation * dt)
}

fn divergence(f: &Fragment<'_>) -> Vec4 {
    let (l, r, t, b) = (f.left(), f.right(), f.top(), f.bottom());
    let mut left = f.sample(0, l).x;
    let mut right = f.sample(0, r).x;
    let mut top = f.sample(0, t).y;
    let mut bottom = f.sample(0, b).y;

    let c = f.sample(0, f.uv).xy();
    if l.x < 0.0 {
        left = -c.x;
    }
    if r.x > 1.0 {
        right = -c.x;
    }
    // open top: smoke leaves through it
    if t.y > 1.0 {
        top = c.y;
    }
    if b.y < 0.0 {
        bottom = -c.y;
    }

    let div = 0.5 * (right - left + top - bottom);
    Vec4::new(div, 0.0, 0.0, 1.0)
}

fn curl(f: &Fragment<'_>) -> Vec4 {
    let left = f.sample(0, f.left()).y;
    let right = f.sample(0, f.right()).y;
    let top = f.sample(0, f.top()).x;
    let bottom = f.sample(0, f.bottom()).x;

    let vorticity = right - left - top + bottom;
    Vec4::new(0.5 * vorticity, 0.0, 0.0, 1.0)
}

fn vorticity(f: &Fragment<'_>) -> Vec4 {
    let left = f.sample(1, f.left()).x;
    let right = f.sample(1, f.right()).x;
    let top = f.sample(1, f.top()).x;
    let bottom = f.sample(1, f.bottom()).x;
    let center = f.sample(1, f.uv).x;

    let mut force = 0.5 * Vec2::new(top.abs() - bottom.abs(), right.abs() - left.abs());
    force /= force.length() + 0.0001;
    force *= f.params.curl * center;
    force.y = -force.y;

    let velocity = f.sample(0, f.uv).xy() + force * f.params.dt;
    Vec4::new(velocity.x, velocity.y, 0.0, 1.0)
}

fn pressure(f: &Fragment<'_>) -> Vec4 {
    let left = f.sample(0, f.left()).x;
    let right = f.sample(0, f.right()).x;
    let top = f.sample(0, f.top()).x;
    let bottom = f.sample(0, f.bottom()).x;
    let divergence = f.sample(1, f.uv).x;

    let pressure = (left + right + bottom + top - divergence) * 0.25;
    Vec4::new(pressure, 0.0, 0.0, 1.0)
}

fn gradient_subtract(f: &Fragment<'_>) -> Vec4 {
    let left = f.sample(0, f.left()).x;
    let right = f.sample(0, f.right()).x;
    let top = f.sample(0, f.top()).x;
    let bottom = f.sample(0, f.bottom()).x;

    let velocity = f.sample(1, f.uv).xy() - Vec2::new(right - left, top - bottom);
    Vec4::new(velocity.x, velocity.y, 0.0, 1.0)
}

fn buoyancy(f: &Fragment<'_>) -> Vec4 {
    let mut velocity = f.sample(0, f.uv).xy();
    let density = f.sample(1, f.uv).xyz().length();

    velocity.y += density * f.params.buoyancy * f.params.dt;
    Vec4::new(velocity.x, velocity.y, 0.0, 1.0)
}

fn bloom_prefilter(f: &Fragment<'_>) -> Vec4 {
    let curve = f.params.curve();
    let mut c = f.sample(0, f.uv).xyz();
    let brightness = c.max_element();

    let mut rq = (brightness - curve.x).clamp(0.0, curve.y);
    rq = curve.z * rq * rq;
    c *= rq.max(brightness - f.params.threshold) / brightness.max(0.0001);

    c.extend(0.0)
}

fn cross_blur(f: &Fragment<'_>) -> Vec4 {
    let sum = f.sample(0, f.left())
        + f.sample(0, f.right())
        + f.sample(0, f.top())
        + f.sample(0, f.bottom());
    sum * 0.25
}

fn bloom_blur(f: &Fragment<'_>) -> Vec4 {
    cross_blur(f)
}

fn bloom_final(f: &Fragment<'_>) -> Vec4 {
    cross_blur(f) * f.params.intensity
}

pub(crate) fn linear_to_gamma(color: Vec3) -> Vec3 {
    let color = color.max(Vec3::ZERO);
    (1.055 * color.powf(1.0 / 2.4) - 0.055).max(Vec3::ZERO)
}

fn display(f: &Fragment<'_>) -> Vec4 {
    let mut c = f.sample(0, f.uv).xyz();

    if f.flags.bloom {
        c += f.sample(1, f.uv).xyz();
    }

    if f.flags.shading {
        let lc = f.sample(0, f.left()).xyz();
        let rc = f.sample(0, f.right()).xyz();
        let tc = f.sample(0, f.top()).xyz();
        let bc = f.sample(0, f.bottom()).xyz();

        let dx = rc.length() - lc.length();
        let dy = tc.length() - bc.length();

        let n = Vec3::new(dx, dy, f.texel().length()).normalize_or_zero();
        let l = Vec3::Z;

        let diffuse = (n.dot(l) + 0.7).clamp(0.7, 1.0);
        c *= diffuse;
    }

    let alpha = c.max_element();
    linear_to_gamma(c).extend(alpha)
}
