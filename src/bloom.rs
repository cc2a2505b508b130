//! Bloom post-process: threshold with a soft knee, blur down a mip chain,
//! add back up, and scale into the bloom field.

use glam::Vec3;

use crate::config::SimConfig;
use crate::device::{Blend, Device};
use crate::field::Field;
use crate::stage::{Output, Pass, StageKind, StageRegistry};

/// `(threshold - knee, 2 * knee, 0.25 / knee)` for the prefilter's quadratic
/// soft-knee curve.
pub fn knee_curve(threshold: f32, soft_knee: f32) -> Vec3 {
    let knee = threshold * soft_knee + 0.0001;
    Vec3::new(threshold - knee, knee * 2.0, 0.25 / knee)
}

/// Renders the bloom of `source` into `destination`. Does nothing with fewer
/// than two mip levels.
pub fn apply_bloom<D: Device>(
    device: &mut D,
    registry: &StageRegistry<D::Kernel>,
    config: &SimConfig,
    source: &Field<D::Texture>,
    destination: &mut Field<D::Texture>,
    mips: &mut [Field<D::Texture>],
) {
    if mips.len() < 2 {
        return;
    }

    let prefilter = Pass::new(StageKind::BloomPrefilter)
        .input("source", source)
        .uniform("curve", knee_curve(config.bloom_threshold, config.bloom_soft_knee))
        .uniform("threshold", config.bloom_threshold);
    registry.run(device, prefilter, Output::Field(&mut *destination));

    let down = Pass::new(StageKind::BloomBlur)
        .input("source", &*destination)
        .uniform("texel_size", destination.texel_size());
    registry.run(device, down, Output::Field(&mut mips[0]));

    for i in 1..mips.len() {
        let (done, rest) = mips.split_at_mut(i);
        let last = &done[i - 1];
        let down = Pass::new(StageKind::BloomBlur)
            .input("source", last)
            .uniform("texel_size", last.texel_size());
        registry.run(device, down, Output::Field(&mut rest[0]));
    }

    for i in (0..mips.len() - 1).rev() {
        let (lower, upper) = mips.split_at_mut(i + 1);
        let last = &upper[0];
        let up = Pass::new(StageKind::BloomBlur)
            .input("source", last)
            .uniform("texel_size", last.texel_size())
            .blend(Blend::Additive);
        registry.run(device, up, Output::Field(&mut lower[i]));
    }

    let last = &mips[0];
    let finish = Pass::new(StageKind::BloomFinal)
        .input("source", last)
        .uniform("texel_size", last.texel_size())
        .uniform("intensity", config.bloom_intensity);
    registry.run(device, finish, Output::Field(destination));
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_knee_curve() {
        let curve = knee_curve(0.08, 0.8);
        let knee = 0.08 * 0.8 + 0.0001;
        assert!((curve.x - (0.08 - knee)).abs() < 1e-7);
        assert!((curve.y - 2.0 * knee).abs() < 1e-7);
        assert!((curve.z - 0.25 / knee).abs() < 1e-4);
    }

    #[test]
    fn test_zero_knee_stays_finite() {
        assert!(knee_curve(0.0, 0.0).is_finite());
    }
}
