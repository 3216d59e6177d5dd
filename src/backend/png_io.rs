use image::{ImageBuffer, ImageFormat, Luma};
use nalgebra::{Matrix3, Vector3};
use ndarray::Array3;
use std::path::Path;

use crate::common::{Slice, Volume};
use crate::error::BackendError;

/// Offset between signed samples and 16-bit grayscale.
const SAMPLE_OFFSET: i32 = 32768;

fn to_gray(v: i16) -> u16 {
    (i32::from(v) + SAMPLE_OFFSET) as u16
}

fn from_gray(v: u16) -> i16 {
    (i32::from(v) - SAMPLE_OFFSET) as i16
}

/// Loads a grayscale image as a single-slice volume with unit geometry.
pub fn read_volume(path: &Path) -> Result<Volume, BackendError> {
    let img = image::open(path)?.into_luma16();
    let (width, height) = img.dimensions();
    let data = Array3::from_shape_fn((width as usize, height as usize, 1), |(x, y, _)| {
        from_gray(img.get_pixel(x as u32, y as u32)[0])
    });
    Ok(Volume::new(
        data,
        Vector3::zeros(),
        Vector3::repeat(1.0),
        Matrix3::identity(),
    ))
}

/// Saves a slice as a 16-bit grayscale PNG.
pub fn write_slice(slice: &Slice, path: &Path) -> Result<(), BackendError> {
    let (width, height) = (slice.columns() as u32, slice.rows() as u32);
    let buffer: ImageBuffer<Luma<u16>, Vec<u16>> =
        ImageBuffer::from_raw(width, height, slice.samples().map(to_gray).collect())
            .ok_or_else(|| BackendError::Shape(vec![slice.columns(), slice.rows()]))?;
    buffer.save_with_format(path, ImageFormat::Png)?;
    Ok(())
}
