//! Content-based detection of the format of an input file.
//!
//! A format is only reported when the file extension *and* the magic bytes
//! at the expected offset agree. Anything less conclusive yields
//! [`Format::Unknown`].

use nifti::header::{MAGIC_CODE_NI1, MAGIC_CODE_NIP1};
use std::fs::File;
use std::io::{self, Read};
use std::path::Path;
use tracing::{debug, warn};

use crate::common::Format;
use crate::gzip;

const PNG_MAGIC: &[u8; 8] = b"\x89PNG\r\n\x1a\n";
const DICOM_MAGIC: &[u8; 4] = b"DICM";

/// Offset of the magic code in a NIfTI-1 header.
pub const NIFTI_MAGIC_OFFSET: usize = 344;

const COMPRESSED_NIFTI_SUFFIX: &str = ".nii.gz";

/// A fixed-offset byte signature.
#[derive(Debug, Clone, Copy)]
struct Probe {
    offset: usize,
    signature: &'static [u8],
    /// Shortest prefix of `signature` accepted when the file ends early.
    min_match: usize,
}

impl Probe {
    const fn exact(offset: usize, signature: &'static [u8]) -> Self {
        Probe {
            offset,
            signature,
            min_match: signature.len(),
        }
    }

    /// Bytes needed from the start of the file to evaluate this probe.
    fn end(&self) -> usize {
        self.offset + self.signature.len()
    }

    /// Out-of-range reads count as no match.
    fn matches(&self, bytes: &[u8]) -> bool {
        let Some(available) = bytes.get(self.offset..) else {
            return false;
        };
        let n = available.len().min(self.signature.len());
        n >= self.min_match && available[..n] == self.signature[..n]
    }
}

struct Candidate {
    format: Format,
    extension: &'static str,
    probe: Probe,
}

const CANDIDATES: [Candidate; 3] = [
    Candidate {
        format: Format::Png,
        extension: "png",
        probe: Probe {
            offset: 0,
            signature: PNG_MAGIC,
            min_match: 4,
        },
    },
    Candidate {
        format: Format::Dicom,
        extension: "dcm",
        probe: Probe::exact(128, DICOM_MAGIC),
    },
    Candidate {
        format: Format::Nifti,
        extension: "nii",
        probe: Probe::exact(NIFTI_MAGIC_OFFSET, MAGIC_CODE_NIP1),
    },
];

/// Magic codes accepted inside a decompressed `.nii.gz` payload.
const COMPRESSED_NIFTI_PROBES: [Probe; 2] = [
    Probe::exact(NIFTI_MAGIC_OFFSET, MAGIC_CODE_NIP1),
    Probe::exact(NIFTI_MAGIC_OFFSET, MAGIC_CODE_NI1),
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DetectionResult {
    pub format: Format,
    /// Whether the verdict was reached on a gzip-decompressed payload.
    pub consumed_gzip: bool,
}

impl DetectionResult {
    fn unknown(consumed_gzip: bool) -> Self {
        DetectionResult {
            format: Format::Unknown,
            consumed_gzip,
        }
    }
}

/// Best-guess format of the file at `path`, or `Format::Unknown`.
pub fn detect<P: AsRef<Path>>(path: P) -> Format {
    detect_with_details(path).format
}

/// Like [`detect`], also reporting whether gzip decompression was involved.
pub fn detect_with_details<P: AsRef<Path>>(path: P) -> DetectionResult {
    let path = path.as_ref();
    let extension = path
        .extension()
        .and_then(|ext| ext.to_str())
        .map(str::to_ascii_lowercase);

    if let Some(extension) = extension.as_deref() {
        if let Some(candidate) = CANDIDATES.iter().find(|c| c.extension == extension) {
            match read_prefix(path, candidate.probe.end()) {
                Ok(bytes) if candidate.probe.matches(&bytes) => {
                    debug!("{} confirmed as {}", path.display(), candidate.format);
                    return DetectionResult {
                        format: candidate.format,
                        consumed_gzip: false,
                    };
                }
                Ok(_) => {
                    debug!(
                        "{} has a .{} extension but no {} signature",
                        path.display(),
                        extension,
                        candidate.format
                    );
                }
                Err(e) => {
                    warn!("Could not read {}: {}", path.display(), e);
                    return DetectionResult::unknown(false);
                }
            }
        }
    }

    if is_compressed_nifti(path) {
        return detect_compressed_nifti(path);
    }

    DetectionResult::unknown(false)
}

fn is_compressed_nifti(path: &Path) -> bool {
    path.file_name()
        .and_then(|name| name.to_str())
        .is_some_and(|name| name.to_ascii_lowercase().ends_with(COMPRESSED_NIFTI_SUFFIX))
}

fn detect_compressed_nifti(path: &Path) -> DetectionResult {
    let payload = match gzip::read_gzip_file(path) {
        Ok(payload) => payload,
        Err(e) => {
            warn!("{}: {}", path.display(), e);
            return DetectionResult::unknown(true);
        }
    };
    if COMPRESSED_NIFTI_PROBES.iter().any(|p| p.matches(&payload)) {
        debug!("{} confirmed as gzip-compressed NIFTI", path.display());
        DetectionResult {
            format: Format::Nifti,
            consumed_gzip: true,
        }
    } else {
        debug!("{} decompressed without a NIfTI magic code", path.display());
        DetectionResult::unknown(true)
    }
}

/// Reads at most `len` bytes from the start of the file.
fn read_prefix(path: &Path, len: usize) -> io::Result<Vec<u8>> {
    let mut bytes = Vec::with_capacity(len);
    File::open(path)?
        .take(len as u64)
        .read_to_end(&mut bytes)?;
    Ok(bytes)
}
