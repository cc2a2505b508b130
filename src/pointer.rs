//! Normalized pointer state consumed by the injection pass.

use glam::{Vec2, Vec3};

#[derive(Debug, Clone, PartialEq)]
pub struct PointerSample {
    pub id: i64,
    /// Position in texture space, y up.
    pub texcoord: Vec2,
    pub prev_texcoord: Vec2,
    /// Aspect-corrected motion since the previous sample.
    pub delta: Vec2,
    pub down: bool,
    pub moved: bool,
    pub color: Vec3,
}

impl PointerSample {
    pub fn new(id: i64, color: Vec3) -> Self {
        Self {
            id,
            texcoord: Vec2::ZERO,
            prev_texcoord: Vec2::ZERO,
            delta: Vec2::ZERO,
            down: false,
            moved: false,
            color,
        }
    }

    /// Records a new position. `aspect` is surface width over height; the
    /// delta is scaled so equal screen distances give equal deltas on both axes.
    pub fn move_to(&mut self, texcoord: Vec2, aspect: f32) {
        self.prev_texcoord = self.texcoord;
        self.texcoord = texcoord;

        let mut delta = self.texcoord - self.prev_texcoord;
        if aspect < 1.0 {
            delta.x *= aspect;
        }
        if aspect > 1.0 {
            delta.y /= aspect;
        }
        self.delta = delta;
        self.moved = delta.x.abs() > 0.0 || delta.y.abs() > 0.0;
    }

    /// Returns the sample's motion once and clears the flag.
    pub fn take_motion(&mut self) -> Option<(Vec2, Vec2)> {
        if !self.moved {
            return None;
        }
        self.moved = false;
        Some((self.texcoord, self.delta))
    }
}

/// Pointers by id, created on first contact.
#[derive(Debug, Clone, Default)]
pub struct Pointers {
    samples: Vec<PointerSample>,
}

impl Pointers {
    pub fn get_or_insert(&mut self, id: i64, color: Vec3) -> &mut PointerSample {
        match self.samples.iter().position(|p| p.id == id) {
            Some(idx) => &mut self.samples[idx],
            None => {
                self.samples.push(PointerSample::new(id, color));
                let last = self.samples.len() - 1;
                &mut self.samples[last]
            }
        }
    }

    pub fn get(&self, id: i64) -> Option<&PointerSample> {
        self.samples.iter().find(|p| p.id == id)
    }

    pub fn remove(&mut self, id: i64) {
        self.samples.retain(|p| p.id != id);
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut PointerSample> {
        self.samples.iter_mut()
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_move_sets_flag_and_delta() {
        let mut p = PointerSample::new(0, Vec3::ONE);
        p.move_to(Vec2::new(0.5, 0.5), 1.0);
        p.take_motion();
        p.move_to(Vec2::new(0.6, 0.5), 1.0);
        assert!(p.moved);
        assert!((p.delta.x - 0.1).abs() < 1e-6);
        assert_eq!(p.delta.y, 0.0);
    }

    #[test]
    fn test_landscape_scales_vertical_delta() {
        let mut p = PointerSample::new(0, Vec3::ONE);
        p.move_to(Vec2::new(0.0, 0.2), 2.0);
        assert!((p.delta.y - 0.1).abs() < 1e-6);
    }

    #[test]
    fn test_portrait_scales_horizontal_delta() {
        let mut p = PointerSample::new(0, Vec3::ONE);
        p.move_to(Vec2::new(0.2, 0.0), 0.5);
        assert!((p.delta.x - 0.1).abs() < 1e-6);
    }

    #[test]
    fn test_motion_consumed_once() {
        let mut p = PointerSample::new(0, Vec3::ONE);
        p.move_to(Vec2::new(0.3, 0.3), 1.0);
        assert!(p.take_motion().is_some());
        assert!(p.take_motion().is_none());
    }

    #[test]
    fn test_no_motion_without_delta() {
        let mut p = PointerSample::new(0, Vec3::ONE);
        p.move_to(Vec2::ZERO, 1.0);
        assert!(!p.moved);
    }

    #[test]
    fn test_pointers_created_on_first_contact() {
        let mut pointers = Pointers::default();
        pointers.get_or_insert(3, Vec3::X).move_to(Vec2::splat(0.5), 1.0);
        pointers.get_or_insert(3, Vec3::X);
        pointers.get_or_insert(4, Vec3::Y);
        assert_eq!(pointers.len(), 2);
        assert!(pointers.get(3).unwrap().moved);
        pointers.remove(3);
        assert!(pointers.get(3).is_none());
    }
}
