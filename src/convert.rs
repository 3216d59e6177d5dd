//! Volume to slice-series conversion.
//!
//! The converter only orchestrates: decoding, slice extraction and encoding
//! are delegated to an [`ImagingBackend`].

use nalgebra::{Matrix3, Vector3};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::{debug, info};

use crate::common::{Format, Modality, Slice, Volume};
use crate::error::{BackendError, ConvertError};
use crate::orientation;

/// Placeholder written to Patient's Name.
pub const PLACEHOLDER_PATIENT_NAME: &str = "PatientName";
/// Placeholder written to Patient ID.
pub const PLACEHOLDER_PATIENT_ID: &str = "PatientID";

/// The operations the converter needs from an imaging toolkit.
pub trait ImagingBackend {
    fn decode_volume(&self, path: &Path) -> Result<Volume, BackendError>;

    fn extract_slice(&self, volume: &Volume, index: usize) -> Slice {
        volume.slice(index)
    }

    fn encode_slice(
        &self,
        slice: &Slice,
        metadata: &SeriesMetadata,
        path: &Path,
    ) -> Result<(), BackendError>;
}

impl<B: ImagingBackend + ?Sized> ImagingBackend for &B {
    fn decode_volume(&self, path: &Path) -> Result<Volume, BackendError> {
        (**self).decode_volume(path)
    }

    fn extract_slice(&self, volume: &Volume, index: usize) -> Slice {
        (**self).extract_slice(volume, index)
    }

    fn encode_slice(
        &self,
        slice: &Slice,
        metadata: &SeriesMetadata,
        path: &Path,
    ) -> Result<(), BackendError> {
        (**self).encode_slice(slice, metadata, path)
    }
}

/// Spatial placement shared by every slice of a series.
#[derive(Debug, Clone, PartialEq)]
pub struct SeriesGeometry {
    pub origin: Vector3<f64>,
    pub spacing: Vector3<f64>,
    pub direction: Matrix3<f64>,
}

impl SeriesGeometry {
    /// World position of the first voxel of slice `index`.
    pub fn slice_position(&self, index: usize) -> Vector3<f64> {
        crate::common::slice_position(&self.origin, &self.spacing, &self.direction, index)
    }
}

/// Metadata attached to every slice written in one conversion.
#[derive(Debug, Clone, PartialEq)]
pub struct SeriesMetadata {
    pub format: Format,
    pub modality: String,
    pub sop_class_uid: String,
    pub orientation: String,
    pub patient_name: String,
    pub patient_id: String,
    pub study_instance_uid: String,
    pub series_instance_uid: String,
    pub frame_of_reference_uid: String,
    pub geometry: SeriesGeometry,
}

impl SeriesMetadata {
    pub fn new(format: Format, modality: Modality, volume: &Volume) -> Self {
        let root = uid_root();
        SeriesMetadata {
            format,
            modality: modality.dicom_code().to_string(),
            sop_class_uid: modality.sop_class_uid().to_string(),
            orientation: orientation::encode(&volume.direction),
            patient_name: PLACEHOLDER_PATIENT_NAME.to_string(),
            patient_id: PLACEHOLDER_PATIENT_ID.to_string(),
            study_instance_uid: format!("{root}.1"),
            series_instance_uid: format!("{root}.2"),
            frame_of_reference_uid: format!("{root}.3"),
            geometry: SeriesGeometry {
                origin: volume.origin,
                spacing: volume.spacing,
                direction: volume.direction,
            },
        }
    }

    /// SOP Instance UID of slice `index`, unique within the series.
    pub fn sop_instance_uid(&self, index: usize) -> String {
        format!("{}.{}", self.series_instance_uid, index + 1)
    }
}

/// A `2.25` UID root derived from the clock and the process id.
fn uid_root() -> String {
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos())
        .unwrap_or_default();
    let value = (nanos << 24) ^ u128::from(std::process::id());
    format!("2.25.{value}")
}

/// File names `slice%04d.<ext>` for every index in `start..=end`.
pub fn slice_file_names(
    output_dir: &Path,
    extension: &str,
    start: usize,
    end: usize,
) -> Vec<PathBuf> {
    (start..=end)
        .map(|i| output_dir.join(format!("slice{i:04}.{extension}")))
        .collect()
}

/// Creates `path` unless it already exists as a directory.
pub fn prepare_output_dir(path: &Path) -> Result<(), ConvertError> {
    match fs::metadata(path) {
        Ok(meta) if meta.is_dir() => return Ok(()),
        Ok(_) => {
            return Err(ConvertError::NotADirectory {
                path: path.to_path_buf(),
            })
        }
        Err(_) => {}
    }
    match fs::create_dir_all(path) {
        Ok(()) => Ok(()),
        // lost a race with another process
        Err(_) if path.is_dir() => Ok(()),
        Err(_) if path.exists() => Err(ConvertError::NotADirectory {
            path: path.to_path_buf(),
        }),
        Err(source) => Err(ConvertError::CreateDir {
            path: path.to_path_buf(),
            source,
        }),
    }
}

/// Splits volumes into one file per slice along the third axis.
#[derive(Debug)]
pub struct VolumeToSeriesConverter<B> {
    backend: B,
    target: Format,
}

impl<B: ImagingBackend> VolumeToSeriesConverter<B> {
    pub fn new(backend: B, target: Format) -> Result<Self, ConvertError> {
        if target.slice_extension().is_none() {
            return Err(ConvertError::UnsupportedTarget(target));
        }
        Ok(Self { backend, target })
    }

    /// Decodes `input` and writes it as a slice series into `output_dir`.
    ///
    /// Returns the number of slice files written.
    pub fn convert(
        &self,
        input: &Path,
        output_dir: &Path,
        modality: Modality,
    ) -> Result<usize, ConvertError> {
        let volume = self
            .backend
            .decode_volume(input)
            .map_err(|source| ConvertError::Decode {
                path: input.to_path_buf(),
                source,
            })?;
        self.write_series(volume, output_dir, modality)
    }

    /// Writes an already decoded volume as a slice series.
    ///
    /// Slices written before a failure are left on disk.
    pub fn write_series(
        &self,
        volume: Volume,
        output_dir: &Path,
        modality: Modality,
    ) -> Result<usize, ConvertError> {
        let [size_x, size_y, depth] = volume.size();
        debug!("Image size: {size_x} x {size_y} x {depth}");
        debug!("Image origin: {:?}", volume.origin.as_slice());
        debug!("Image spacing: {:?}", volume.spacing.as_slice());
        debug!(
            "Image direction: {}",
            orientation::encode_rows(&volume.direction, 3)
        );

        let start_index = 0;
        let end_index = depth.checked_sub(1).ok_or(ConvertError::EmptyVolume)?;

        let extension = self
            .target
            .slice_extension()
            .ok_or(ConvertError::UnsupportedTarget(self.target))?;
        let file_names = slice_file_names(output_dir, extension, start_index, end_index);
        if file_names.len() != depth {
            return Err(ConvertError::SliceCount {
                expected: depth,
                actual: file_names.len(),
            });
        }

        let metadata = SeriesMetadata::new(self.target, modality, &volume);
        debug!("Modality: {}", metadata.modality);
        debug!("Orientation: {}", metadata.orientation);

        prepare_output_dir(output_dir)?;

        info!(
            "Writing {} {} slices to {}",
            depth,
            self.target,
            output_dir.display()
        );
        for (index, path) in (start_index..=end_index).zip(&file_names) {
            let slice = self.backend.extract_slice(&volume, index);
            self.backend
                .encode_slice(&slice, &metadata, path)
                .map_err(|source| ConvertError::Encode {
                    index,
                    path: path.clone(),
                    source,
                })?;
            debug!("Wrote {}", path.display());
        }
        Ok(file_names.len())
    }
}
