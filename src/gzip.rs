//! Whole-buffer gzip decompression.
//!
//! Payloads are inflated fully into memory, so the usable input size is
//! bounded by available memory.

use flate2::read::MultiGzDecoder;
use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum GzipError {
    #[error("Could not open {path}: {source}")]
    Open {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Corrupt gzip stream: {0}")]
    Corrupt(#[source] std::io::Error),
}

/// Decompresses the gzip file at `path` into memory.
///
/// Concatenated gzip members are decoded as one stream.
pub fn read_gzip_file<P: AsRef<Path>>(path: P) -> Result<Vec<u8>, GzipError> {
    let path = path.as_ref();
    let file = File::open(path).map_err(|source| GzipError::Open {
        path: path.display().to_string(),
        source,
    })?;
    decompress(BufReader::new(file))
}

/// Decompresses an entire gzip stream from `reader`.
pub fn decompress<R: Read>(reader: R) -> Result<Vec<u8>, GzipError> {
    let mut out = Vec::new();
    MultiGzDecoder::new(reader)
        .read_to_end(&mut out)
        .map_err(GzipError::Corrupt)?;
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use flate2::write::GzEncoder;
    use flate2::Compression;
    use std::io::Write;

    fn gz(bytes: &[u8]) -> Vec<u8> {
        let mut enc = GzEncoder::new(Vec::new(), Compression::default());
        enc.write_all(bytes).unwrap();
        enc.finish().unwrap()
    }

    #[test]
    fn inflates_whole_stream() {
        let payload: Vec<u8> = (0..4096u32).map(|i| (i % 251) as u8).collect();
        assert_eq!(decompress(&gz(&payload)[..]).unwrap(), payload);
    }

    #[test]
    fn concatenated_members() {
        let mut data = gz(b"hello ");
        data.extend(gz(b"world"));
        assert_eq!(decompress(&data[..]).unwrap(), b"hello world");
    }

    #[test]
    fn garbage_is_corrupt() {
        let err = decompress(&b"definitely not gzip"[..]).unwrap_err();
        assert!(matches!(err, GzipError::Corrupt(_)));
    }

    #[test]
    fn truncated_stream_is_corrupt() {
        let data = gz(&[7u8; 1000]);
        let err = decompress(&data[..data.len() / 2]).unwrap_err();
        assert!(matches!(err, GzipError::Corrupt(_)));
    }
}
