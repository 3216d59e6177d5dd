//! Imaging backend built on the `nifti`, `dicom` and `image` crates.

mod dicom_io;
mod nifti_io;
mod png_io;

use std::path::Path;
use tracing::debug;

use crate::common::{Format, Slice, Volume};
use crate::convert::{ImagingBackend, SeriesMetadata};
use crate::error::BackendError;
use crate::sniff;

/// Reads volumes and writes slices with the ecosystem codecs.
///
/// Unless an input format is given, inputs are sniffed before decoding.
#[derive(Debug, Default, Clone, Copy)]
pub struct ToolkitBackend {
    input_format: Option<Format>,
}

impl ToolkitBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Skips sniffing and decodes inputs as `format`.
    pub fn for_input(format: Format) -> Self {
        Self {
            input_format: Some(format),
        }
    }
}

impl ImagingBackend for ToolkitBackend {
    fn decode_volume(&self, path: &Path) -> Result<Volume, BackendError> {
        let format = self.input_format.unwrap_or_else(|| sniff::detect(path));
        debug!("Decoding {} as {}", path.display(), format);
        match format {
            Format::Nifti => nifti_io::read_volume(path),
            Format::Dicom => dicom_io::read_volume(path),
            Format::Png => png_io::read_volume(path),
            Format::Unknown => Err(BackendError::UnsupportedFormat(format)),
        }
    }

    fn encode_slice(
        &self,
        slice: &Slice,
        metadata: &SeriesMetadata,
        path: &Path,
    ) -> Result<(), BackendError> {
        match metadata.format {
            Format::Dicom => dicom_io::write_slice(slice, metadata, path),
            Format::Nifti => nifti_io::write_slice(slice, metadata, path),
            Format::Png => png_io::write_slice(slice, path),
            Format::Unknown => Err(BackendError::UnsupportedFormat(metadata.format)),
        }
    }
}
