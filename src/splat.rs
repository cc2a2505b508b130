//! Injection: Gaussian splats of force and dye from pointers and the emitter.

use glam::{Vec2, Vec3};

use crate::device::Device;
use crate::framebuffers::Framebuffers;
use crate::solver::SmokeSolver;
use crate::stage::{Output, Pass, StageKind};

/// Where the emitter sits: centered, just below the bottom edge.
pub const EMITTER_POSITION: Vec2 = Vec2::new(0.5, -0.02);

/// Widens a radius on landscape surfaces so splats stay round on screen.
pub fn correct_radius(radius: f32, aspect_ratio: f32) -> f32 {
    if aspect_ratio > 1.0 {
        radius * aspect_ratio
    } else {
        radius
    }
}

impl<D: Device> SmokeSolver<D> {
    /// Adds a Gaussian impulse `force` to velocity and `color` to dye around
    /// `point`. `radius` is in hundredths of the field; `None` uses the
    /// configured pointer radius.
    pub fn splat(&mut self, point: Vec2, force: Vec2, color: Vec3, radius: Option<f32>) {
        let aspect_ratio = self.aspect_ratio();
        let radius = radius.unwrap_or(self.config.splat_radius) / 100.0;
        let radius = correct_radius(radius, aspect_ratio);

        let Framebuffers { velocity, dye, .. } = &mut self.buffers;

        let (read, write) = velocity.split();
        let pass = Pass::new(StageKind::Splat)
            .input("target", read)
            .uniform("aspect_ratio", aspect_ratio)
            .uniform("point", point)
            .uniform("color", force.extend(0.0))
            .uniform("radius", radius);
        if self.registry.run(&mut self.device, pass, Output::Field(write)) {
            velocity.swap();
        }

        let (read, write) = dye.split();
        let pass = Pass::new(StageKind::Splat)
            .input("target", read)
            .uniform("aspect_ratio", aspect_ratio)
            .uniform("point", point)
            .uniform("color", color)
            .uniform("radius", radius);
        if self.registry.run(&mut self.device, pass, Output::Field(write)) {
            dye.swap();
        }
    }

    /// One splat per pointer that moved since the last call.
    pub fn apply_inputs(&mut self) {
        let motions: Vec<(Vec2, Vec2, Vec3)> = self
            .pointers
            .iter_mut()
            .filter_map(|p| p.take_motion().map(|(pos, delta)| (pos, delta, p.color)))
            .collect();

        let force = self.config.splat_force;
        for (pos, delta, color) in motions {
            self.splat(pos, delta * force, color, None);
        }
    }

    /// The steady upward plume from below the bottom edge.
    pub fn emit(&mut self) {
        let force = Vec2::new(0.0, self.config.smoke_force);
        let color = self.config.smoke_color.to_vec3();
        let radius = self.config.smoke_radius;
        self.splat(EMITTER_POSITION, force, color, Some(radius));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_radius_widened_only_in_landscape() {
        assert_eq!(correct_radius(0.02, 2.0), 0.04);
        assert_eq!(correct_radius(0.02, 0.5), 0.02);
        assert_eq!(correct_radius(0.02, 1.0), 0.02);
    }
}
