use glam::{Vec2, Vec4, Vec4Swizzles};

use crate::device::Device;
use crate::solver::{FieldId, SmokeSolver};

/// Host-side copy of the dye and velocity fields, bottom row first.
#[derive(Debug, Clone)]
pub struct FieldSnapshot {
    pub dye_size: (usize, usize),
    pub dye: Vec<Vec4>,
    pub velocity_size: (usize, usize),
    pub velocity: Vec<Vec2>,
}

impl FieldSnapshot {
    pub fn capture<D: Device>(solver: &mut SmokeSolver<D>) -> Self {
        let (dye_w, dye_h) = solver.field(FieldId::Dye).size();
        let (vel_w, vel_h) = solver.field(FieldId::Velocity).size();
        let dye = solver.read_field(FieldId::Dye);
        let velocity = solver
            .read_field(FieldId::Velocity)
            .into_iter()
            .map(|v| v.xy())
            .collect();

        Self {
            dye_size: (dye_w as usize, dye_h as usize),
            dye,
            velocity_size: (vel_w as usize, vel_h as usize),
            velocity,
        }
    }

    pub fn dye_at(&self, x: usize, y: usize) -> Vec4 {
        self.dye[y * self.dye_size.0 + x]
    }

    pub fn velocity_at(&self, x: usize, y: usize) -> Vec2 {
        self.velocity[y * self.velocity_size.0 + x]
    }

    /// Dye-weighted mean height in `[0, 1]`, 0 at the bottom edge.
    pub fn dye_center_y(&self) -> f32 {
        let (width, height) = self.dye_size;
        let mut weight = 0.0;
        let mut moment = 0.0;
        for y in 0..height {
            let v = (y as f32 + 0.5) / height as f32;
            for x in 0..width {
                let density = self.dye_at(x, y).xyz().length();
                weight += density;
                moment += density * v;
            }
        }
        if weight > 0.0 { moment / weight } else { 0.0 }
    }
}

#[derive(Debug, Clone)]
pub struct SmokeMetrics {
    pub dye_mass: f32,
    pub max_dye: f32,
    pub kinetic_energy: f32,
    pub max_speed: f32,
    /// Root mean square of the interior velocity divergence.
    pub divergence_rms: f32,
    pub mean_abs_curl: f32,
    pub dye_center_y: f32,
    pub frame: usize,
}

impl SmokeMetrics {
    pub fn analyze(snapshot: &FieldSnapshot, frame: usize) -> Self {
        let mut dye_mass = 0.0f32;
        let mut max_dye = 0.0f32;
        for texel in &snapshot.dye {
            let density = texel.xyz().length();
            dye_mass += density;
            max_dye = max_dye.max(density);
        }

        let (width, height) = snapshot.velocity_size;
        let mut kinetic_energy = 0.0f32;
        let mut max_speed = 0.0f32;
        for v in &snapshot.velocity {
            kinetic_energy += 0.5 * v.length_squared();
            max_speed = max_speed.max(v.length());
        }

        let mut divergence_sq = 0.0f32;
        let mut curl_sum = 0.0f32;
        let mut interior = 0usize;
        for y in 1..height.saturating_sub(1) {
            for x in 1..width.saturating_sub(1) {
                let l = snapshot.velocity_at(x - 1, y);
                let r = snapshot.velocity_at(x + 1, y);
                let b = snapshot.velocity_at(x, y - 1);
                let t = snapshot.velocity_at(x, y + 1);

                let divergence = 0.5 * (r.x - l.x + t.y - b.y);
                let curl = 0.5 * (r.y - l.y - t.x + b.x);

                divergence_sq += divergence * divergence;
                curl_sum += curl.abs();
                interior += 1;
            }
        }
        let interior = interior.max(1) as f32;

        Self {
            dye_mass,
            max_dye,
            kinetic_energy,
            max_speed,
            divergence_rms: (divergence_sq / interior).sqrt(),
            mean_abs_curl: curl_sum / interior,
            dye_center_y: snapshot.dye_center_y(),
            frame,
        }
    }

    pub fn print_summary(&self) {
        println!("Frame {} Metrics:", self.frame);
        println!("  Dye Mass: {:.6}", self.dye_mass);
        println!("  Max Dye: {:.6}", self.max_dye);
        println!("  Kinetic Energy: {:.6}", self.kinetic_energy);
        println!("  Max Speed: {:.6}", self.max_speed);
        println!("  Divergence RMS: {:.6}", self.divergence_rms);
        println!("  Mean |Curl|: {:.6}", self.mean_abs_curl);
        println!("  Dye Height: {:.4}", self.dye_center_y);
        println!();
    }
}

#[derive(Debug, Default)]
pub struct AnalysisRecorder {
    pub metrics_history: Vec<SmokeMetrics>,
}

impl AnalysisRecorder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_frame<D: Device>(&mut self, solver: &mut SmokeSolver<D>, frame: usize) -> &SmokeMetrics {
        let snapshot = FieldSnapshot::capture(solver);
        self.metrics_history.push(SmokeMetrics::analyze(&snapshot, frame));
        &self.metrics_history[self.metrics_history.len() - 1]
    }

    pub fn print_trends(&self) {
        let (Some(first), Some(last)) = (self.metrics_history.first(), self.metrics_history.last()) else {
            return;
        };
        if self.metrics_history.len() < 2 {
            return;
        }

        println!("=== TREND ANALYSIS ===");
        println!(
            "Dye mass change: {:.6} -> {:.6} ({:+.3}%)",
            first.dye_mass,
            last.dye_mass,
            (last.dye_mass - first.dye_mass) / first.dye_mass.max(0.001) * 100.0
        );
        println!(
            "Kinetic Energy change: {:.6} -> {:.6} ({:+.3}%)",
            first.kinetic_energy,
            last.kinetic_energy,
            (last.kinetic_energy - first.kinetic_energy) / first.kinetic_energy.max(0.001) * 100.0
        );
        println!(
            "Dye height: {:.4} -> {:.4}",
            first.dye_center_y, last.dye_center_y
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn snapshot(width: usize, height: usize, velocity: impl Fn(usize, usize) -> Vec2) -> FieldSnapshot {
        let mut field = Vec::new();
        for y in 0..height {
            for x in 0..width {
                field.push(velocity(x, y));
            }
        }
        FieldSnapshot {
            dye_size: (width, height),
            dye: vec![Vec4::ZERO; width * height],
            velocity_size: (width, height),
            velocity: field,
        }
    }

    #[test]
    fn test_uniform_flow_has_no_divergence_or_curl() {
        let snap = snapshot(8, 8, |_, _| Vec2::new(1.0, 0.5));
        let metrics = SmokeMetrics::analyze(&snap, 0);
        assert!(metrics.divergence_rms < 1e-6);
        assert!(metrics.mean_abs_curl < 1e-6);
        assert!((metrics.kinetic_energy - 64.0 * 0.5 * 1.25).abs() < 1e-3);
    }

    #[test]
    fn test_expanding_flow_diverges() {
        let snap = snapshot(8, 8, |x, _| Vec2::new(x as f32, 0.0));
        let metrics = SmokeMetrics::analyze(&snap, 0);
        assert!((metrics.divergence_rms - 1.0).abs() < 1e-5);
    }

    #[test]
    fn test_dye_center_tracks_height() {
        let mut snap = snapshot(4, 4, |_, _| Vec2::ZERO);
        snap.dye[3 * 4 + 1] = Vec4::new(1.0, 0.0, 0.0, 1.0);
        assert!((snap.dye_center_y() - 3.5 / 4.0).abs() < 1e-6);
    }
}
