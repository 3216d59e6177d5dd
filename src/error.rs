use std::path::PathBuf;

use thiserror::Error;

use crate::common::Format;

/// Failure reported by an imaging backend while reading a volume or writing a slice.
#[derive(Debug, Error)]
pub enum BackendError {
    #[error("NIfTI error: {0}")]
    Nifti(#[from] nifti::error::NiftiError),

    #[error("DICOM error: {0}")]
    Dicom(#[source] Box<dyn std::error::Error + Send + Sync>),

    #[error("Image error: {0}")]
    Image(#[from] image::ImageError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Unsupported volume shape {0:?}")]
    Shape(Vec<usize>),

    #[error("Multi-sample images are not supported ({0} samples per pixel)")]
    SamplesPerPixel(u16),

    #[error("Cannot handle {0} data")]
    UnsupportedFormat(Format),
}

impl BackendError {
    pub(crate) fn dicom<E>(err: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        BackendError::Dicom(Box::new(err))
    }
}

#[derive(Debug, Error)]
pub enum ConvertError {
    #[error("Could not decode volume from {}", path.display())]
    Decode {
        path: PathBuf,
        #[source]
        source: BackendError,
    },

    #[error("Could not write slice {index} to {}", path.display())]
    Encode {
        index: usize,
        path: PathBuf,
        #[source]
        source: BackendError,
    },

    #[error("Output path {} exists and is not a directory", path.display())]
    NotADirectory { path: PathBuf },

    #[error("Could not create output directory {}", path.display())]
    CreateDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Generated {actual} slice names for a volume of depth {expected}")]
    SliceCount { expected: usize, actual: usize },

    #[error("Volume has no slices")]
    EmptyVolume,

    #[error("Cannot write a slice series in {0} format")]
    UnsupportedTarget(Format),
}
