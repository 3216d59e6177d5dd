//! NIfTI volumes in, single-slice NIfTI files out.
//!
//! NIfTI affines map voxels to RAS space while [`Volume`] geometry lives in
//! LPS, so the x and y components flip sign in both directions.

use nalgebra::{Matrix3, Matrix4, RowVector3, Vector3};
use ndarray::{Array3, ArrayD, Axis, Ix3};
use nifti::writer::WriterOptions;
use nifti::{IntoNdArray, NiftiHeader, NiftiObject, ReaderOptions};
use std::path::Path;
use tracing::debug;

use crate::common::{Slice, Volume};
use crate::convert::{SeriesGeometry, SeriesMetadata};
use crate::error::BackendError;

/// NIFTI_XFORM_SCANNER_ANAT
const XFORM_SCANNER_ANAT: i16 = 1;

pub fn read_volume(path: &Path) -> Result<Volume, BackendError> {
    let obj = ReaderOptions::new().read_file(path)?;
    // gather header information
    let header = obj.header().clone();
    let img = obj.into_volume().into_ndarray::<f64>()?;
    let img = into_3d(img)?;

    let (origin, spacing, direction) = lps_geometry(&header);
    debug!(
        "Read {:?} NIfTI volume from {}",
        img.shape(),
        path.display()
    );

    let data = img.mapv(|v| v.round().clamp(i16::MIN as f64, i16::MAX as f64) as i16);
    Ok(Volume::new(data, origin, spacing, direction))
}

/// Pads 1D/2D images with singleton axes and drops trailing singleton
/// dimensions past the third.
fn into_3d(mut img: ArrayD<f64>) -> Result<Array3<f64>, BackendError> {
    while img.ndim() > 3 && img.shape()[img.ndim() - 1] == 1 {
        let last = img.ndim() - 1;
        img = img.index_axis_move(Axis(last), 0);
    }
    while img.ndim() < 3 {
        let next = img.ndim();
        img = img.insert_axis(Axis(next));
    }
    let shape = img.shape().to_vec();
    img.into_dimensionality::<Ix3>()
        .map_err(|_| BackendError::Shape(shape))
}

fn lps_geometry(header: &NiftiHeader) -> (Vector3<f64>, Vector3<f64>, Matrix3<f64>) {
    let affine = header.affine::<f64>();
    let mut direction = Matrix3::identity();
    let mut spacing = Vector3::repeat(1.0);
    for j in 0..3 {
        let column = Vector3::new(affine[(0, j)], affine[(1, j)], affine[(2, j)]);
        let norm = column.norm();
        if norm > 0.0 {
            spacing[j] = norm;
            let unit = column / norm;
            direction.set_row(j, &RowVector3::new(-unit[0], -unit[1], unit[2]));
        } else if header.pixdim[j + 1] > 0.0 {
            spacing[j] = header.pixdim[j + 1] as f64;
        }
    }
    let origin = Vector3::new(-affine[(0, 3)], -affine[(1, 3)], affine[(2, 3)]);
    (origin, spacing, direction)
}

/// Voxel to RAS affine of a series, translated to `position` (LPS).
fn ras_affine(geometry: &SeriesGeometry, position: &Vector3<f64>) -> Matrix4<f64> {
    let mut affine = Matrix4::identity();
    for j in 0..3 {
        let axis = geometry.direction.row(j) * geometry.spacing[j];
        affine[(0, j)] = -axis[0];
        affine[(1, j)] = -axis[1];
        affine[(2, j)] = axis[2];
    }
    affine[(0, 3)] = -position[0];
    affine[(1, 3)] = -position[1];
    affine[(2, 3)] = position[2];
    affine
}

/// Saves one slice as a `(columns, rows, 1)` NIfTI volume placed at its
/// position in the series.
pub fn write_slice(
    slice: &Slice,
    metadata: &SeriesMetadata,
    path: &Path,
) -> Result<(), BackendError> {
    let geometry = &metadata.geometry;
    let position = geometry.slice_position(slice.index);

    let mut slice_header = NiftiHeader {
        scl_slope: 1.0,
        scl_inter: 0.0,
        ..NiftiHeader::default()
    };
    slice_header.set_affine(&ras_affine(geometry, &position));
    slice_header.sform_code = XFORM_SCANNER_ANAT;
    slice_header.qform_code = XFORM_SCANNER_ANAT;
    for j in 0..3 {
        slice_header.pixdim[j + 1] = geometry.spacing[j] as f32;
    }

    // add back the slicing axis
    let data = Array3::from_shape_fn((slice.columns(), slice.rows(), 1), |(x, y, _)| {
        slice.plane[[y, x]]
    });

    WriterOptions::new(path)
        .reference_header(&slice_header)
        .write_nifti(&data)?;
    Ok(())
}
