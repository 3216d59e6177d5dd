//! # medformat
//!
//! Tools for working out what a medical image file really is and for
//! splitting volumes into a series of 2D slice files.
//!
//! - [`sniff`] identifies DICOM, NIfTI (plain or gzip-compressed) and PNG
//!   files. A format is only reported when the file extension and the magic
//!   bytes agree, so misnamed files come back as [`Format::Unknown`].
//! - [`convert`] decodes a volume, cuts it along its third axis and writes one
//!   file per slice (`slice0000.dcm`, `slice0001.dcm`, ...), carrying the
//!   modality, orientation and series identifiers into every file.
//! - [`orientation`] turns direction cosines into the DICOM Image Orientation
//!   (Patient) string and back.
//!
//! # Example
//!
//! ```no_run
//! # use medformat::{ToolkitBackend, VolumeToSeriesConverter, Format, Modality};
//! # use std::path::Path;
//! let converter = VolumeToSeriesConverter::new(ToolkitBackend::new(), Format::Dicom)
//!     .expect("DICOM is a valid series format");
//! let written = converter
//!     .convert(Path::new("scan.nii.gz"), Path::new("scan_dicom"), Modality::Ct)
//!     .expect("should have written the series");
//! println!("{written} slices written");
//! ```

pub mod backend;
pub mod common;
pub mod convert;
pub mod error;
pub mod gzip;
pub mod orientation;
pub mod sniff;

pub use backend::ToolkitBackend;
pub use common::{parse_format, parse_modality, Format, Modality, Slice, Volume};
pub use convert::{ImagingBackend, SeriesMetadata, VolumeToSeriesConverter};
pub use error::{BackendError, ConvertError};
pub use sniff::{detect, DetectionResult};
