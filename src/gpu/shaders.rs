//! WGSL sources for every stage.
//!
//! Each stage is a fragment shader over a fullscreen triangle. All stages
//! share one uniform block (`Params`, laid out like `StageParams`) and two
//! texture/sampler slots. `uv` runs bottom-up: row 0 of a texture is `uv.y`
//! near zero.

use crate::stage::{Define, StageKind};

const PRELUDE: &str = r"
struct Params {
    texel_size: vec2<f32>,
    dye_texel_size: vec2<f32>,
    color: vec4<f32>,
    curve: vec4<f32>,
    point: vec2<f32>,
    dt: f32,
    dissipation: f32,
    value: f32,
    aspect_ratio: f32,
    radius: f32,
    curl: f32,
    buoyancy: f32,
    threshold: f32,
    intensity: f32,
    _padding: f32,
};

@group(0) @binding(0) var<uniform> params: Params;
@group(0) @binding(1) var input0: texture_2d<f32>;
@group(0) @binding(2) var sampler0: sampler;
@group(0) @binding(3) var input1: texture_2d<f32>;
@group(0) @binding(4) var sampler1: sampler;

struct VertexOutput {
    @builtin(position) position: vec4<f32>,
    @location(0) uv: vec2<f32>,
};

@vertex
fn vs_main(@builtin(vertex_index) index: u32) -> VertexOutput {
    let x = f32((index << 1u) & 2u);
    let y = f32(index & 2u);
    var out: VertexOutput;
    out.position = vec4<f32>(x * 2.0 - 1.0, 1.0 - y * 2.0, 0.0, 1.0);
    out.uv = vec2<f32>(x, y);
    return out;
}

fn tex0(uv: vec2<f32>) -> vec4<f32> {
    return textureSampleLevel(input0, sampler0, uv, 0.0);
}

fn tex1(uv: vec2<f32>) -> vec4<f32> {
    return textureSampleLevel(input1, sampler1, uv, 0.0);
}

fn left(uv: vec2<f32>) -> vec2<f32> {
    return uv - vec2<f32>(params.texel_size.x, 0.0);
}

fn right(uv: vec2<f32>) -> vec2<f32> {
    return uv + vec2<f32>(params.texel_size.x, 0.0);
}

fn top(uv: vec2<f32>) -> vec2<f32> {
    return uv + vec2<f32>(0.0, params.texel_size.y);
}

fn bottom(uv: vec2<f32>) -> vec2<f32> {
    return uv - vec2<f32>(0.0, params.texel_size.y);
}
";

const COPY: &str = r"
@fragment
fn fs_main(in: VertexOutput) -> @location(0) vec4<f32> {
    return tex0(in.uv);
}
";

const CLEAR: &str = r"
@fragment
fn fs_main(in: VertexOutput) -> @location(0) vec4<f32> {
    return params.value * tex0(in.uv);
}
";

const COLOR: &str = r"
@fragment
fn fs_main(in: VertexOutput) -> @location(0) vec4<f32> {
    return params.color;
}
";

const SPLAT: &str = r"
@fragment
fn fs_main(in: VertexOutput) -> @location(0) vec4<f32> {
    var p = in.uv - params.point;
    p.x = p.x * params.aspect_ratio;
    let splat = exp(-dot(p, p) / (params.radius * 0.6)) * params.color.xyz;
    let base = tex0(in.uv).xyz;
    return vec4<f32>(base + splat, 1.0);
}
";

const ADVECTION: &str = r"
fn bilerp(tex: texture_2d<f32>, samp: sampler, uv: vec2<f32>, tsize: vec2<f32>) -> vec4<f32> {
    let st = uv / tsize - 0.5;
    let iuv = floor(st);
    let fuv = fract(st);

    let a = textureSampleLevel(tex, samp, (iuv + vec2<f32>(0.5, 0.5)) * tsize, 0.0);
    let b = textureSampleLevel(tex, samp, (iuv + vec2<f32>(1.5, 0.5)) * tsize, 0.0);
    let c = textureSampleLevel(tex, samp, (iuv + vec2<f32>(0.5, 1.5)) * tsize, 0.0);
    let d = textureSampleLevel(tex, samp, (iuv + vec2<f32>(1.5, 1.5)) * tsize, 0.0);

    return mix(mix(a, b, fuv.x), mix(c, d, fuv.x), fuv.y);
}

@fragment
fn fs_main(in: VertexOutput) -> @location(0) vec4<f32> {
    var result: vec4<f32>;
    if (MANUAL_FILTERING) {
        let velocity = bilerp(input0, sampler0, in.uv, params.texel_size).xy;
        let coord = in.uv - params.dt * velocity * params.texel_size;
        result = bilerp(input1, sampler1, coord, params.dye_texel_size);
    } else {
        let coord = in.uv - params.dt * tex0(in.uv).xy * params.texel_size;
        result = tex1(coord);
    }
    return result / (1.0 + params.dissipation * params.dt);
}
";

const DIVERGENCE: &str = r"
@fragment
fn fs_main(in: VertexOutput) -> @location(0) vec4<f32> {
    let l = left(in.uv);
    let r = right(in.uv);
    let t = top(in.uv);
    let b = bottom(in.uv);

    var vl = tex0(l).x;
    var vr = tex0(r).x;
    var vt = tex0(t).y;
    var vb = tex0(b).y;

    let c = tex0(in.uv).xy;
    if (l.x < 0.0) { vl = -c.x; }
    if (r.x > 1.0) { vr = -c.x; }
    // open top: smoke leaves through it
    if (t.y > 1.0) { vt = c.y; }
    if (b.y < 0.0) { vb = -c.y; }

    let div = 0.5 * (vr - vl + vt - vb);
    return vec4<f32>(div, 0.0, 0.0, 1.0);
}
";

const CURL: &str = r"
@fragment
fn fs_main(in: VertexOutput) -> @location(0) vec4<f32> {
    let l = tex0(left(in.uv)).y;
    let r = tex0(right(in.uv)).y;
    let t = tex0(top(in.uv)).x;
    let b = tex0(bottom(in.uv)).x;
    let vorticity = r - l - t + b;
    return vec4<f32>(0.5 * vorticity, 0.0, 0.0, 1.0);
}
";

const VORTICITY: &str = r"
@fragment
fn fs_main(in: VertexOutput) -> @location(0) vec4<f32> {
    let l = tex1(left(in.uv)).x;
    let r = tex1(right(in.uv)).x;
    let t = tex1(top(in.uv)).x;
    let b = tex1(bottom(in.uv)).x;
    let c = tex1(in.uv).x;

    var force = 0.5 * vec2<f32>(abs(t) - abs(b), abs(r) - abs(l));
    force = force / (length(force) + 0.0001);
    force = force * params.curl * c;
    force.y = -force.y;

    let velocity = tex0(in.uv).xy + force * params.dt;
    return vec4<f32>(velocity, 0.0, 1.0);
}
";

const PRESSURE: &str = r"
@fragment
fn fs_main(in: VertexOutput) -> @location(0) vec4<f32> {
    let l = tex0(left(in.uv)).x;
    let r = tex0(right(in.uv)).x;
    let t = tex0(top(in.uv)).x;
    let b = tex0(bottom(in.uv)).x;
    let divergence = tex1(in.uv).x;
    let pressure = (l + r + b + t - divergence) * 0.25;
    return vec4<f32>(pressure, 0.0, 0.0, 1.0);
}
";

const GRADIENT_SUBTRACT: &str = r"
@fragment
fn fs_main(in: VertexOutput) -> @location(0) vec4<f32> {
    let l = tex0(left(in.uv)).x;
    let r = tex0(right(in.uv)).x;
    let t = tex0(top(in.uv)).x;
    let b = tex0(bottom(in.uv)).x;
    let velocity = tex1(in.uv).xy - vec2<f32>(r - l, t - b);
    return vec4<f32>(velocity, 0.0, 1.0);
}
";

const BUOYANCY: &str = r"
@fragment
fn fs_main(in: VertexOutput) -> @location(0) vec4<f32> {
    var velocity = tex0(in.uv).xy;
    let density = length(tex1(in.uv).xyz);
    velocity.y = velocity.y + density * params.buoyancy * params.dt;
    return vec4<f32>(velocity, 0.0, 1.0);
}
";

const BLOOM_PREFILTER: &str = r"
@fragment
fn fs_main(in: VertexOutput) -> @location(0) vec4<f32> {
    var c = tex0(in.uv).rgb;
    let brightness = max(c.r, max(c.g, c.b));
    var rq = clamp(brightness - params.curve.x, 0.0, params.curve.y);
    rq = params.curve.z * rq * rq;
    c = c * max(rq, brightness - params.threshold) / max(brightness, 0.0001);
    return vec4<f32>(c, 0.0);
}
";

const BLOOM_BLUR: &str = r"
@fragment
fn fs_main(in: VertexOutput) -> @location(0) vec4<f32> {
    let sum = tex0(left(in.uv)) + tex0(right(in.uv)) + tex0(top(in.uv)) + tex0(bottom(in.uv));
    return sum * 0.25;
}
";

const BLOOM_FINAL: &str = r"
@fragment
fn fs_main(in: VertexOutput) -> @location(0) vec4<f32> {
    let sum = tex0(left(in.uv)) + tex0(right(in.uv)) + tex0(top(in.uv)) + tex0(bottom(in.uv));
    return sum * 0.25 * params.intensity;
}
";

const DISPLAY: &str = r"
fn linear_to_gamma(color: vec3<f32>) -> vec3<f32> {
    let c = max(color, vec3<f32>(0.0));
    return max(1.055 * pow(c, vec3<f32>(0.416666667)) - 0.055, vec3<f32>(0.0));
}

@fragment
fn fs_main(in: VertexOutput) -> @location(0) vec4<f32> {
    var c = tex0(in.uv).rgb;

    if (BLOOM) {
        c = c + tex1(in.uv).rgb;
    }

    if (SHADING) {
        let lc = tex0(left(in.uv)).rgb;
        let rc = tex0(right(in.uv)).rgb;
        let tc = tex0(top(in.uv)).rgb;
        let bc = tex0(bottom(in.uv)).rgb;

        let dx = length(rc) - length(lc);
        let dy = length(tc) - length(bc);

        let n = normalize(vec3<f32>(dx, dy, length(params.texel_size)));
        let l = vec3<f32>(0.0, 0.0, 1.0);
        let diffuse = clamp(dot(n, l) + 0.7, 0.7, 1.0);
        c = c * diffuse;
    }

    let a = max(c.r, max(c.g, c.b));
    return vec4<f32>(linear_to_gamma(c), a);
}
";

fn body(stage: StageKind) -> &'static str {
    match stage {
        StageKind::Copy => COPY,
        StageKind::Clear => CLEAR,
        StageKind::Color => COLOR,
        StageKind::Splat => SPLAT,
        StageKind::Advection => ADVECTION,
        StageKind::Divergence => DIVERGENCE,
        StageKind::Curl => CURL,
        StageKind::Vorticity => VORTICITY,
        StageKind::Pressure => PRESSURE,
        StageKind::GradientSubtract => GRADIENT_SUBTRACT,
        StageKind::Buoyancy => BUOYANCY,
        StageKind::BloomPrefilter => BLOOM_PREFILTER,
        StageKind::BloomBlur => BLOOM_BLUR,
        StageKind::BloomFinal => BLOOM_FINAL,
        StageKind::Display => DISPLAY,
    }
}

/// Full WGSL for one stage variant. Every define is emitted as a boolean
/// constant, true when present in `defines`.
pub fn source(stage: StageKind, defines: &[Define]) -> String {
    let mut out = String::new();
    for define in Define::ALL {
        out.push_str(&format!(
            "const {}: bool = {};\n",
            define.keyword(),
            defines.contains(&define)
        ));
    }
    out.push_str(PRELUDE);
    out.push_str(body(stage));
    out
}
