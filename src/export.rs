use std::path::Path;

use glam::{Vec4, Vec4Swizzles};
use image::{ImageBuffer, Rgb, RgbImage, Rgba, RgbaImage};
use thiserror::Error;

use crate::device::Device;
use crate::solver::{FieldId, SmokeSolver};

#[derive(Debug, Error)]
pub enum ExportError {
    #[error("failed to write image: {0}")]
    Image(#[from] image::ImageError),
    #[error("field of {len} texels does not fill {width}x{height}")]
    Shape { len: usize, width: u32, height: u32 },
}

fn to_byte(value: f32) -> u8 {
    (value.clamp(0.0, 1.0) * 255.0).round() as u8
}

/// Converts bottom-row-first texels to an image with row 0 at the top.
pub fn texels_to_rgba(texels: &[Vec4], width: u32, height: u32) -> Result<RgbaImage, ExportError> {
    if texels.len() != (width * height) as usize {
        return Err(ExportError::Shape {
            len: texels.len(),
            width,
            height,
        });
    }
    Ok(ImageBuffer::from_fn(width, height, |x, y| {
        let texel = texels[((height - 1 - y) * width + x) as usize];
        Rgba([to_byte(texel.x), to_byte(texel.y), to_byte(texel.z), to_byte(texel.w)])
    }))
}

/// Red for horizontal speed, green for vertical, scaled by `scale`.
pub fn velocity_to_rgb(texels: &[Vec4], width: u32, height: u32, scale: f32) -> Result<RgbImage, ExportError> {
    if texels.len() != (width * height) as usize {
        return Err(ExportError::Shape {
            len: texels.len(),
            width,
            height,
        });
    }
    Ok(ImageBuffer::from_fn(width, height, |x, y| {
        let v = texels[((height - 1 - y) * width + x) as usize].xy() * scale;
        Rgb([to_byte(v.x.abs()), to_byte(v.y.abs()), 128])
    }))
}

pub struct ImageExporter {
    velocity_scale: f32,
}

impl Default for ImageExporter {
    fn default() -> Self {
        Self::new(0.05)
    }
}

impl ImageExporter {
    pub fn new(velocity_scale: f32) -> Self {
        Self { velocity_scale }
    }

    /// Composites the current frame and reads the surface back.
    pub fn frame_image<D: Device>(&self, solver: &mut SmokeSolver<D>) -> Result<RgbaImage, ExportError> {
        solver.render(None);
        let (width, height) = solver.device().surface_size();
        let texels = solver.read_surface();
        texels_to_rgba(&texels, width, height)
    }

    pub fn export_frame_png<D: Device>(&self, solver: &mut SmokeSolver<D>, path: &Path) -> Result<(), ExportError> {
        self.frame_image(solver)?.save(path)?;
        Ok(())
    }

    pub fn export_velocity_png<D: Device>(&self, solver: &mut SmokeSolver<D>, path: &Path) -> Result<(), ExportError> {
        let (width, height) = solver.field(FieldId::Velocity).size();
        let texels = solver.read_field(FieldId::Velocity);
        velocity_to_rgb(&texels, width, height, self.velocity_scale)?.save(path)?;
        Ok(())
    }

    pub fn export_frame_sequence<D: Device>(
        &self,
        solver: &mut SmokeSolver<D>,
        steps: usize,
        dt: f32,
        output_dir: &Path,
        prefix: &str,
    ) -> Result<(), ExportError> {
        for i in 0..steps {
            solver.step(dt);
            let path = output_dir.join(format!("{prefix}_frame_{i:04}.png"));
            self.export_frame_png(solver, &path)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rows_flipped_to_top_down() {
        let texels = vec![
            Vec4::new(1.0, 0.0, 0.0, 1.0),
            Vec4::new(1.0, 0.0, 0.0, 1.0),
            Vec4::new(0.0, 0.0, 1.0, 1.0),
            Vec4::new(0.0, 0.0, 1.0, 1.0),
        ];
        let img = texels_to_rgba(&texels, 2, 2).unwrap();
        assert_eq!(img.get_pixel(0, 0), &Rgba([0, 0, 255, 255]));
        assert_eq!(img.get_pixel(1, 1), &Rgba([255, 0, 0, 255]));
    }

    #[test]
    fn test_shape_mismatch_rejected() {
        assert!(matches!(
            texels_to_rgba(&[Vec4::ZERO], 2, 2),
            Err(ExportError::Shape { .. })
        ));
    }

    #[test]
    fn test_velocity_colors_clamp() {
        let img = velocity_to_rgb(&[Vec4::new(-100.0, 0.5, 0.0, 1.0)], 1, 1, 1.0).unwrap();
        assert_eq!(img.get_pixel(0, 0), &Rgb([255, 128, 128]));
    }
}
