use nalgebra::{Matrix3, Vector3};
use ndarray::Array3;
use pretty_assertions::assert_eq;
use std::cell::RefCell;
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::tempdir;

use medformat::{
    BackendError, ConvertError, Format, ImagingBackend, Modality, SeriesMetadata, Slice, Volume,
    VolumeToSeriesConverter,
};

/// In-memory backend that records every slice it is asked to encode.
struct RecordingBackend {
    volume: Option<Volume>,
    fail_at: Option<usize>,
    written: RefCell<Vec<(usize, PathBuf, SeriesMetadata)>>,
}

impl RecordingBackend {
    fn new(volume: Volume) -> Self {
        RecordingBackend {
            volume: Some(volume),
            fail_at: None,
            written: RefCell::new(Vec::new()),
        }
    }

    fn broken() -> Self {
        RecordingBackend {
            volume: None,
            fail_at: None,
            written: RefCell::new(Vec::new()),
        }
    }
}

impl ImagingBackend for RecordingBackend {
    fn decode_volume(&self, _path: &Path) -> Result<Volume, BackendError> {
        self.volume
            .clone()
            .ok_or_else(|| BackendError::Shape(vec![0, 0, 0, 0]))
    }

    fn encode_slice(
        &self,
        slice: &Slice,
        metadata: &SeriesMetadata,
        path: &Path,
    ) -> Result<(), BackendError> {
        if self.fail_at == Some(slice.index) {
            return Err(BackendError::Io(std::io::Error::new(
                std::io::ErrorKind::Other,
                "disk full",
            )));
        }
        fs::write(path, slice.index.to_le_bytes())?;
        self.written
            .borrow_mut()
            .push((slice.index, path.to_path_buf(), metadata.clone()));
        Ok(())
    }
}

fn oblique_direction() -> Matrix3<f64> {
    let c = std::f64::consts::FRAC_1_SQRT_2;
    Matrix3::new(c, c, 0.0, -c, c, 0.0, 0.0, 0.0, 1.0)
}

fn volume(size: (usize, usize, usize)) -> Volume {
    Volume::new(
        Array3::zeros(size),
        Vector3::new(-100.0, -120.0, 40.0),
        Vector3::new(0.7, 0.7, 2.5),
        oblique_direction(),
    )
}

fn dir_entries(path: &Path) -> Vec<String> {
    let mut names: Vec<String> = fs::read_dir(path)
        .unwrap()
        .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
        .collect();
    names.sort();
    names
}

#[test]
fn forty_slice_volume_becomes_forty_dicom_files() {
    let out = tempdir().unwrap();
    let output_dir = out.path().join("series");
    let backend = RecordingBackend::new(volume((512, 512, 40)));
    let converter = VolumeToSeriesConverter::new(&backend, Format::Dicom).unwrap();

    let written = converter
        .convert(Path::new("scan.nii.gz"), &output_dir, Modality::Ct)
        .unwrap();
    assert_eq!(written, 40);

    let expected: Vec<String> = (0..40).map(|i| format!("slice{i:04}.dcm")).collect();
    assert_eq!(dir_entries(&output_dir), expected);
    assert_eq!(expected[39], "slice0039.dcm");

    let records = backend.written.borrow();
    let indices: Vec<usize> = records.iter().map(|(i, _, _)| *i).collect();
    assert_eq!(indices, (0..40).collect::<Vec<_>>());
    for (index, path, _) in records.iter() {
        assert_eq!(path, &output_dir.join(format!("slice{index:04}.dcm")));
    }

    let first = &records[0].2;
    assert_eq!(first.modality, "CT");
    assert_eq!(first.format, Format::Dicom);
    assert_eq!(first.patient_name, "PatientName");
    assert_eq!(first.patient_id, "PatientID");
    assert_eq!(first.orientation.split('\\').count(), 6);
    assert_eq!(
        medformat::orientation::parse(&first.orientation).unwrap(),
        medformat::orientation::from_values(&[
            std::f64::consts::FRAC_1_SQRT_2,
            std::f64::consts::FRAC_1_SQRT_2,
            0.0,
            -std::f64::consts::FRAC_1_SQRT_2,
            std::f64::consts::FRAC_1_SQRT_2,
            0.0
        ])
        .unwrap()
    );
    assert!(records.iter().all(|(_, _, meta)| meta == first));
}

#[test]
fn extension_follows_target_format() {
    for (format, extension) in [(Format::Nifti, "nii"), (Format::Png, "png")] {
        let out = tempdir().unwrap();
        let backend = RecordingBackend::new(volume((4, 4, 3)));
        let converter = VolumeToSeriesConverter::new(&backend, format).unwrap();
        converter
            .convert(Path::new("in"), out.path(), Modality::Mr)
            .unwrap();
        assert_eq!(
            dir_entries(out.path()),
            vec![
                format!("slice0000.{extension}"),
                format!("slice0001.{extension}"),
                format!("slice0002.{extension}"),
            ]
        );
        assert_eq!(backend.written.borrow()[0].2.modality, "MR");
    }
}

#[test]
fn decode_fault_writes_nothing() {
    let out = tempdir().unwrap();
    let output_dir = out.path().join("never");
    let backend = RecordingBackend::broken();
    let converter = VolumeToSeriesConverter::new(&backend, Format::Dicom).unwrap();

    let err = converter
        .convert(Path::new("malformed.nii"), &output_dir, Modality::Ct)
        .unwrap_err();
    match err {
        ConvertError::Decode { path, .. } => assert_eq!(path, Path::new("malformed.nii")),
        other => panic!("unexpected error: {other}"),
    }
    assert!(!output_dir.exists());
    assert!(backend.written.borrow().is_empty());
}

#[test]
fn encode_fault_keeps_earlier_slices() {
    let out = tempdir().unwrap();
    let mut backend = RecordingBackend::new(volume((8, 8, 10)));
    backend.fail_at = Some(4);
    let converter = VolumeToSeriesConverter::new(&backend, Format::Dicom).unwrap();

    let err = converter
        .convert(Path::new("in.nii"), out.path(), Modality::Ct)
        .unwrap_err();
    match &err {
        ConvertError::Encode { index, path, .. } => {
            assert_eq!(*index, 4);
            assert_eq!(path, &out.path().join("slice0004.dcm"));
        }
        other => panic!("unexpected error: {other}"),
    }
    assert_eq!(
        dir_entries(out.path()),
        vec![
            "slice0000.dcm",
            "slice0001.dcm",
            "slice0002.dcm",
            "slice0003.dcm"
        ]
    );
}

#[test]
fn existing_directory_is_reused() {
    let out = tempdir().unwrap();
    fs::write(out.path().join("keep.txt"), b"x").unwrap();
    let backend = RecordingBackend::new(volume((2, 2, 2)));
    let converter = VolumeToSeriesConverter::new(&backend, Format::Png).unwrap();
    assert_eq!(
        converter
            .write_series(volume((2, 2, 2)), out.path(), Modality::Cxr)
            .unwrap(),
        2
    );
    assert_eq!(
        dir_entries(out.path()),
        vec!["keep.txt", "slice0000.png", "slice0001.png"]
    );
    assert_eq!(backend.written.borrow()[1].2.modality, "DX");
}

#[test]
fn output_path_that_is_a_file_is_fatal() {
    let out = tempdir().unwrap();
    let file = out.path().join("taken");
    fs::write(&file, b"not a directory").unwrap();
    let backend = RecordingBackend::new(volume((2, 2, 2)));
    let converter = VolumeToSeriesConverter::new(&backend, Format::Dicom).unwrap();

    let err = converter
        .convert(Path::new("in.nii"), &file, Modality::Ct)
        .unwrap_err();
    assert!(matches!(err, ConvertError::NotADirectory { .. }), "{err}");
    assert!(backend.written.borrow().is_empty());
}

#[test]
fn empty_volume_is_rejected() {
    let out = tempdir().unwrap();
    let backend = RecordingBackend::new(volume((2, 2, 0)));
    let converter = VolumeToSeriesConverter::new(&backend, Format::Dicom).unwrap();
    let err = converter
        .convert(Path::new("in.nii"), &out.path().join("s"), Modality::Ct)
        .unwrap_err();
    assert!(matches!(err, ConvertError::EmptyVolume));
    assert!(!out.path().join("s").exists());
}

#[test]
fn decode_error_keeps_its_cause() {
    let backend = RecordingBackend::broken();
    let converter = VolumeToSeriesConverter::new(&backend, Format::Nifti).unwrap();
    let err = converter
        .convert(Path::new("x.nii"), Path::new("unused"), Modality::Ct)
        .unwrap_err();
    let source = std::error::Error::source(&err).map(|s| s.to_string());
    assert_eq!(source.as_deref(), Some("Unsupported volume shape [0, 0, 0, 0]"));
}
