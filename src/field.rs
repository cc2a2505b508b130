//! Grid fields: device textures with their shape, and read/write pairs.

use glam::Vec2;

use crate::capabilities::{FilterMode, TextureFormat};

/// A render target and the texture backing it.
#[derive(Debug)]
pub struct Field<T> {
    texture: T,
    width: u32,
    height: u32,
    format: TextureFormat,
    filter: FilterMode,
}

impl<T> Field<T> {
    pub fn new(texture: T, width: u32, height: u32, format: TextureFormat, filter: FilterMode) -> Self {
        Self {
            texture,
            width,
            height,
            format,
            filter,
        }
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn size(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    pub fn texel_size(&self) -> Vec2 {
        Vec2::new(1.0 / self.width as f32, 1.0 / self.height as f32)
    }

    pub fn format(&self) -> TextureFormat {
        self.format
    }

    pub fn filter(&self) -> FilterMode {
        self.filter
    }

    pub fn texture(&self) -> &T {
        &self.texture
    }

    pub fn texture_mut(&mut self) -> &mut T {
        &mut self.texture
    }
}

/// Two identically shaped fields; one is read, the other written.
///
/// Which slot is "read" is a plain index, so `swap` never moves textures.
#[derive(Debug)]
pub struct DoubleField<T> {
    slots: [Field<T>; 2],
    read: usize,
}

impl<T> DoubleField<T> {
    pub fn new(first: Field<T>, second: Field<T>) -> Self {
        debug_assert_eq!(first.size(), second.size());
        Self {
            slots: [first, second],
            read: 0,
        }
    }

    pub fn read(&self) -> &Field<T> {
        &self.slots[self.read]
    }

    /// Mutable read side, for seeding content between passes.
    pub fn read_mut(&mut self) -> &mut Field<T> {
        &mut self.slots[self.read]
    }

    pub fn write(&self) -> &Field<T> {
        &self.slots[1 - self.read]
    }

    pub fn write_mut(&mut self) -> &mut Field<T> {
        &mut self.slots[1 - self.read]
    }

    /// Borrows the read side immutably and the write side mutably at once,
    /// the only way a stage can sample a field while rendering into its pair.
    pub fn split(&mut self) -> (&Field<T>, &mut Field<T>) {
        let (first, second) = self.slots.split_at_mut(1);
        if self.read == 0 {
            (&first[0], &mut second[0])
        } else {
            (&second[0], &mut first[0])
        }
    }

    pub fn swap(&mut self) {
        self.read = 1 - self.read;
    }

    /// Replaces both sides; the new read side is `read`.
    pub fn replace(&mut self, read: Field<T>, write: Field<T>) {
        debug_assert_eq!(read.size(), write.size());
        self.slots = [read, write];
        self.read = 0;
    }

    pub fn width(&self) -> u32 {
        self.read().width()
    }

    pub fn height(&self) -> u32 {
        self.read().height()
    }

    pub fn size(&self) -> (u32, u32) {
        self.read().size()
    }

    pub fn texel_size(&self) -> Vec2 {
        self.read().texel_size()
    }

    pub fn into_parts(self) -> (Field<T>, Field<T>) {
        let read = self.read;
        let [first, second] = self.slots;
        if read == 0 {
            (first, second)
        } else {
            (second, first)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tagged(tag: u32) -> Field<u32> {
        Field::new(tag, 4, 4, TextureFormat::Rgba16Float, FilterMode::Linear)
    }

    #[test]
    fn test_swap_exchanges_roles() {
        let mut double = DoubleField::new(tagged(1), tagged(2));
        assert_eq!(*double.read().texture(), 1);
        assert_eq!(*double.write().texture(), 2);

        double.swap();
        assert_eq!(*double.read().texture(), 2);
        assert_eq!(*double.write().texture(), 1);

        double.swap();
        assert_eq!(*double.read().texture(), 1);
    }

    #[test]
    fn test_split_follows_read_index() {
        let mut double = DoubleField::new(tagged(1), tagged(2));
        double.swap();
        let (read, write) = double.split();
        assert_eq!(*read.texture(), 2);
        *write.texture_mut() = 7;
        assert_eq!(*double.write().texture(), 7);
    }

    #[test]
    fn test_into_parts_read_first() {
        let mut double = DoubleField::new(tagged(1), tagged(2));
        double.swap();
        let (read, write) = double.into_parts();
        assert_eq!(*read.texture(), 2);
        assert_eq!(*write.texture(), 1);
    }

    #[test]
    fn test_texel_size() {
        let field = Field::new((), 128, 64, TextureFormat::R16Float, FilterMode::Nearest);
        assert_eq!(field.texel_size(), Vec2::new(1.0 / 128.0, 1.0 / 64.0));
    }
}
