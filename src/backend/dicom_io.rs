use dicom::core::{DataElement, PrimitiveValue, Tag, VR};
use dicom::object::{open_file, FileMetaTableBuilder, InMemDicomObject, IMPLEMENTATION_CLASS_UID};
use dicom::pixeldata::PixelDecoder;
use dicom_dictionary_std::{tags, uids};
use nalgebra::{Matrix3, Vector3};
use ndarray::Array3;
use std::path::Path;
use tracing::debug;

use crate::common::{Slice, Volume};
use crate::convert::SeriesMetadata;
use crate::error::BackendError;
use crate::orientation;

/// Reads a (possibly multi-frame) DICOM file, one slice per frame.
pub fn read_volume(path: &Path) -> Result<Volume, BackendError> {
    let obj = open_file(path).map_err(BackendError::dicom)?;
    let pixel = obj.decode_pixel_data().map_err(BackendError::dicom)?;

    let samples_per_pixel = pixel.samples_per_pixel();
    if samples_per_pixel != 1 {
        return Err(BackendError::SamplesPerPixel(samples_per_pixel));
    }
    let rows = pixel.rows() as usize;
    let columns = pixel.columns() as usize;
    let frames = pixel.number_of_frames() as usize;
    let samples: Vec<i16> = pixel.to_vec().map_err(BackendError::dicom)?;
    if samples.len() != rows * columns * frames {
        return Err(BackendError::Shape(vec![columns, rows, frames]));
    }
    debug!(
        "Read {} frame(s) of {}x{} from {}",
        frames,
        columns,
        rows,
        path.display()
    );

    let data = Array3::from_shape_fn((columns, rows, frames), |(x, y, z)| {
        samples[(z * rows + y) * columns + x]
    });

    let direction = multi_float(&obj, tags::IMAGE_ORIENTATION_PATIENT)
        .and_then(|values| orientation::from_values(&values))
        .unwrap_or_else(Matrix3::identity);
    let origin = multi_float(&obj, tags::IMAGE_POSITION_PATIENT)
        .filter(|values| values.len() == 3)
        .map(|values| Vector3::from_row_slice(&values))
        .unwrap_or_else(Vector3::zeros);
    // Pixel Spacing is (between rows, between columns)
    let (spacing_y, spacing_x) = match multi_float(&obj, tags::PIXEL_SPACING).as_deref() {
        Some([row, col]) => (*row, *col),
        _ => (1.0, 1.0),
    };
    let spacing_z = single_float(&obj, tags::SPACING_BETWEEN_SLICES)
        .or_else(|| single_float(&obj, tags::SLICE_THICKNESS))
        .unwrap_or(1.0);

    Ok(Volume::new(
        data,
        origin,
        Vector3::new(spacing_x, spacing_y, spacing_z),
        direction,
    ))
}

fn multi_float(obj: &InMemDicomObject, tag: Tag) -> Option<Vec<f64>> {
    obj.element(tag).ok()?.to_multi_float64().ok()
}

fn single_float(obj: &InMemDicomObject, tag: Tag) -> Option<f64> {
    obj.element(tag)
        .ok()?
        .to_float64()
        .ok()
        .filter(|v| *v > 0.0)
}

/// Longest value a DS attribute may hold.
const DS_MAX_LEN: usize = 16;

/// Formats one DS value, dropping precision until it fits in 16 characters.
fn ds_value(value: f64) -> String {
    let value = value + 0.0;
    let shortest = value.to_string();
    if shortest.len() <= DS_MAX_LEN {
        return shortest;
    }
    for precision in (0..DS_MAX_LEN).rev() {
        let fixed = format!("{:.*}", precision, value);
        let trimmed = if fixed.contains('.') {
            fixed.trim_end_matches('0').trim_end_matches('.')
        } else {
            fixed.as_str()
        };
        if trimmed.len() <= DS_MAX_LEN {
            return match trimmed {
                "-0" => "0".to_string(),
                other => other.to_string(),
            };
        }
    }
    // too large for fixed notation
    format!("{:.8e}", value)
}

/// Backslash-joined decimal string for DS attributes.
fn decimal_string(values: &[f64]) -> String {
    values
        .iter()
        .map(|v| ds_value(*v))
        .collect::<Vec<_>>()
        .join("\\")
}

fn put_str(obj: &mut InMemDicomObject, tag: Tag, vr: VR, value: &str) {
    obj.put(DataElement::new(tag, vr, PrimitiveValue::from(value)));
}

fn put_u16(obj: &mut InMemDicomObject, tag: Tag, value: u16) {
    obj.put(DataElement::new(tag, VR::US, PrimitiveValue::from(value)));
}

/// Writes one slice as an Explicit VR Little Endian file carrying the
/// shared series attributes.
pub fn write_slice(
    slice: &Slice,
    metadata: &SeriesMetadata,
    path: &Path,
) -> Result<(), BackendError> {
    let (rows, columns) = match (u16::try_from(slice.rows()), u16::try_from(slice.columns())) {
        (Ok(rows), Ok(columns)) => (rows, columns),
        _ => return Err(BackendError::Shape(vec![slice.columns(), slice.rows()])),
    };
    let geometry = &metadata.geometry;
    let position = geometry.slice_position(slice.index);
    let sop_instance_uid = metadata.sop_instance_uid(slice.index);

    let mut obj = InMemDicomObject::new_empty();

    // SOP common, patient, study and series
    put_str(&mut obj, tags::SOP_CLASS_UID, VR::UI, &metadata.sop_class_uid);
    put_str(&mut obj, tags::SOP_INSTANCE_UID, VR::UI, &sop_instance_uid);
    put_str(&mut obj, tags::IMAGE_TYPE, VR::CS, "DERIVED\\SECONDARY");
    put_str(&mut obj, tags::MODALITY, VR::CS, &metadata.modality);
    put_str(&mut obj, tags::PATIENT_NAME, VR::PN, &metadata.patient_name);
    put_str(&mut obj, tags::PATIENT_ID, VR::LO, &metadata.patient_id);
    put_str(
        &mut obj,
        tags::STUDY_INSTANCE_UID,
        VR::UI,
        &metadata.study_instance_uid,
    );
    put_str(
        &mut obj,
        tags::SERIES_INSTANCE_UID,
        VR::UI,
        &metadata.series_instance_uid,
    );
    put_str(&mut obj, tags::SERIES_NUMBER, VR::IS, "1");
    put_str(
        &mut obj,
        tags::INSTANCE_NUMBER,
        VR::IS,
        &(slice.index + 1).to_string(),
    );

    // frame of reference and image plane
    put_str(
        &mut obj,
        tags::FRAME_OF_REFERENCE_UID,
        VR::UI,
        &metadata.frame_of_reference_uid,
    );
    put_str(
        &mut obj,
        tags::IMAGE_POSITION_PATIENT,
        VR::DS,
        &decimal_string(position.as_slice()),
    );
    put_str(
        &mut obj,
        tags::IMAGE_ORIENTATION_PATIENT,
        VR::DS,
        &metadata.orientation,
    );
    put_str(
        &mut obj,
        tags::PIXEL_SPACING,
        VR::DS,
        &decimal_string(&[geometry.spacing[1], geometry.spacing[0]]),
    );
    put_str(
        &mut obj,
        tags::SLICE_THICKNESS,
        VR::DS,
        &decimal_string(&[geometry.spacing[2]]),
    );
    if metadata.modality == "CT" {
        put_str(&mut obj, tags::RESCALE_INTERCEPT, VR::DS, "0");
        put_str(&mut obj, tags::RESCALE_SLOPE, VR::DS, "1");
    }

    // image pixel
    put_u16(&mut obj, tags::SAMPLES_PER_PIXEL, 1);
    put_str(&mut obj, tags::PHOTOMETRIC_INTERPRETATION, VR::CS, "MONOCHROME2");
    put_u16(&mut obj, tags::ROWS, rows);
    put_u16(&mut obj, tags::COLUMNS, columns);
    put_u16(&mut obj, tags::BITS_ALLOCATED, 16);
    put_u16(&mut obj, tags::BITS_STORED, 16);
    put_u16(&mut obj, tags::HIGH_BIT, 15);
    put_u16(&mut obj, tags::PIXEL_REPRESENTATION, 1);
    let pixel_data: Vec<u8> = slice.samples().flat_map(i16::to_le_bytes).collect();
    obj.put(DataElement::new(
        tags::PIXEL_DATA,
        VR::OW,
        PrimitiveValue::from(pixel_data),
    ));

    let file_obj = obj
        .with_meta(
            FileMetaTableBuilder::new()
                .transfer_syntax(uids::EXPLICIT_VR_LITTLE_ENDIAN)
                .media_storage_sop_class_uid(metadata.sop_class_uid.as_str())
                .media_storage_sop_instance_uid(sop_instance_uid.as_str())
                .implementation_class_uid(IMPLEMENTATION_CLASS_UID),
        )
        .map_err(BackendError::dicom)?;
    file_obj.write_to_file(path).map_err(BackendError::dicom)?;
    Ok(())
}
