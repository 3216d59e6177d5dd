use nalgebra::{Matrix3, Vector3};
use ndarray::{Array2, Array3, Axis};
use std::fmt;
use std::str::FromStr;

// set up enums and structs
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Format {
    Dicom,
    Nifti,
    Png,
    #[default]
    Unknown,
}

impl Format {
    pub fn as_str(&self) -> &'static str {
        match self {
            Format::Dicom => "DICOM",
            Format::Nifti => "NIFTI",
            Format::Png => "PNG",
            Format::Unknown => "UNKNOWN",
        }
    }

    /// File extension used for one slice of a series in this format.
    pub fn slice_extension(&self) -> Option<&'static str> {
        match self {
            Format::Dicom => Some("dcm"),
            Format::Nifti => Some("nii"),
            Format::Png => Some("png"),
            Format::Unknown => None,
        }
    }
}

impl fmt::Display for Format {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Format {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(parse_format(s))
    }
}

/// Case-insensitive format name lookup. Anything unrecognized is `Unknown`.
pub fn parse_format(value: &str) -> Format {
    match value.trim().to_ascii_uppercase().as_str() {
        "DICOM" => Format::Dicom,
        "NIFTI" => Format::Nifti,
        "PNG" => Format::Png,
        _ => Format::Unknown,
    }
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Modality {
    #[default]
    Ct,
    Mr,
    Cxr,
}

impl Modality {
    pub fn as_str(&self) -> &'static str {
        match self {
            Modality::Ct => "CT",
            Modality::Mr => "MR",
            Modality::Cxr => "CXR",
        }
    }

    /// Defined term for the DICOM Modality (0008,0060) attribute.
    pub fn dicom_code(&self) -> &'static str {
        match self {
            Modality::Ct => "CT",
            Modality::Mr => "MR",
            Modality::Cxr => "DX",
        }
    }

    /// Storage SOP class written for slices of this modality.
    pub fn sop_class_uid(&self) -> &'static str {
        use dicom_dictionary_std::uids;
        match self {
            Modality::Ct => uids::CT_IMAGE_STORAGE,
            Modality::Mr => uids::MR_IMAGE_STORAGE,
            Modality::Cxr => uids::DIGITAL_X_RAY_IMAGE_STORAGE_FOR_PRESENTATION,
        }
    }
}

impl fmt::Display for Modality {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Modality {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(parse_modality(s))
    }
}

/// Case-insensitive modality lookup, falling back to CT.
pub fn parse_modality(value: &str) -> Modality {
    match value.trim().to_ascii_uppercase().as_str() {
        "MR" => Modality::Mr,
        "CXR" => Modality::Cxr,
        _ => Modality::Ct,
    }
}

/// A 3D image with its spatial placement in patient (LPS) space.
///
/// Voxels are indexed `[x, y, z]`; slices are taken along `z`.
/// Each row of `direction` is the world-space unit vector of one volume axis.
#[derive(Debug, Clone)]
pub struct Volume {
    pub origin: Vector3<f64>,
    pub spacing: Vector3<f64>,
    pub direction: Matrix3<f64>,
    data: Array3<i16>,
}

impl Volume {
    pub fn new(
        data: Array3<i16>,
        origin: Vector3<f64>,
        spacing: Vector3<f64>,
        direction: Matrix3<f64>,
    ) -> Self {
        Self {
            origin,
            spacing,
            direction,
            data,
        }
    }

    /// Voxel counts per axis.
    pub fn size(&self) -> [usize; 3] {
        let (x, y, z) = self.data.dim();
        [x, y, z]
    }

    pub fn data(&self) -> &Array3<i16> {
        &self.data
    }

    /// World position of the first voxel of slice `index`.
    pub fn slice_position(&self, index: usize) -> Vector3<f64> {
        slice_position(&self.origin, &self.spacing, &self.direction, index)
    }

    /// Extracts plane `index` along the third axis as `(rows, columns)`.
    pub fn slice(&self, index: usize) -> Slice {
        let plane = self.data.index_axis(Axis(2), index);
        Slice::new(plane.t().to_owned(), index)
    }
}

pub(crate) fn slice_position(
    origin: &Vector3<f64>,
    spacing: &Vector3<f64>,
    direction: &Matrix3<f64>,
    index: usize,
) -> Vector3<f64> {
    let normal = direction.row(2).transpose();
    origin + normal * (index as f64 * spacing[2])
}

#[derive(Debug, Clone)]
pub struct Slice {
    /// Samples laid out as `(rows, columns)`, i.e. `(size.y, size.x)`.
    pub plane: Array2<i16>,
    pub index: usize,
}

impl Slice {
    pub fn new(plane: Array2<i16>, index: usize) -> Self {
        Self { plane, index }
    }

    pub fn rows(&self) -> usize {
        self.plane.nrows()
    }

    pub fn columns(&self) -> usize {
        self.plane.ncols()
    }

    /// Samples in row-major order.
    pub fn samples(&self) -> impl Iterator<Item = i16> + '_ {
        self.plane.iter().copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::Array3;

    #[test]
    fn format_names_are_case_insensitive() {
        assert_eq!(parse_format("dicom"), Format::Dicom);
        assert_eq!(parse_format("NIfTI"), Format::Nifti);
        assert_eq!(parse_format("png"), Format::Png);
        assert_eq!(parse_format("jpeg"), Format::Unknown);
        assert_eq!(parse_format(""), Format::Unknown);
        assert_eq!(Format::default(), Format::Unknown);
        assert_eq!(Format::Nifti.to_string(), "NIFTI");
    }

    #[test]
    fn unknown_modality_falls_back_to_ct() {
        assert_eq!(parse_modality("mr"), Modality::Mr);
        assert_eq!(parse_modality("Cxr"), Modality::Cxr);
        assert_eq!(parse_modality("PET"), Modality::Ct);
        assert_eq!("".parse::<Modality>(), Ok(Modality::Ct));
        assert_eq!(Modality::Cxr.dicom_code(), "DX");
    }

    #[test]
    fn slices_are_transposed_to_rows_and_columns() {
        let data = Array3::from_shape_fn((3, 2, 4), |(x, y, z)| (x + 10 * y + 100 * z) as i16);
        let vol = Volume::new(data, Vector3::zeros(), Vector3::repeat(1.0), Matrix3::identity());
        assert_eq!(vol.size(), [3, 2, 4]);

        let slice = vol.slice(2);
        assert_eq!(slice.index, 2);
        assert_eq!((slice.rows(), slice.columns()), (2, 3));
        let samples: Vec<i16> = slice.samples().collect();
        assert_eq!(samples, vec![200, 201, 202, 210, 211, 212]);
    }

    #[test]
    fn slice_position_follows_the_normal() {
        let direction = Matrix3::new(1.0, 0.0, 0.0, 0.0, 0.0, 1.0, 0.0, -1.0, 0.0);
        let vol = Volume::new(
            Array3::zeros((1, 1, 5)),
            Vector3::new(1.0, 2.0, 3.0),
            Vector3::new(0.5, 0.5, 2.5),
            direction,
        );
        assert_eq!(vol.slice_position(0), Vector3::new(1.0, 2.0, 3.0));
        assert_eq!(vol.slice_position(2), Vector3::new(1.0, -3.0, 3.0));
    }
}
