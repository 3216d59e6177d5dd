//! Conversion between direction-cosine matrices and the backslash-delimited
//! orientation string used by DICOM's Image Orientation (Patient).
//!
//! Rows of the matrix are the world-space directions of the volume axes.
//! Image Orientation (Patient) holds only the first two rows (row and column
//! direction cosines); the slice normal is their cross product.

use nalgebra::{Matrix3, RowVector3};

const DELIMITER: char = '\\';

/// Number of rows written by [`encode`], as required by Image Orientation (Patient).
pub const ORIENTATION_ROWS: usize = 2;

/// Encodes the row and column direction cosines of `direction`.
pub fn encode(direction: &Matrix3<f64>) -> String {
    encode_rows(direction, ORIENTATION_ROWS)
}

/// Encodes the first `rows` rows of `direction` (clamped to `1..=3`),
/// row-major, with each value in shortest round-trip form.
pub fn encode_rows(direction: &Matrix3<f64>, rows: usize) -> String {
    let rows = rows.clamp(1, 3);
    let mut out = String::new();
    for i in 0..rows {
        for j in 0..3 {
            if i > 0 || j > 0 {
                out.push(DELIMITER);
            }
            // adding 0.0 turns -0.0 into 0.0
            out.push_str(&(direction[(i, j)] + 0.0).to_string());
        }
    }
    out
}

/// Parses a 6- or 9-value orientation string.
pub fn parse(value: &str) -> Option<Matrix3<f64>> {
    let values: Result<Vec<f64>, _> = value
        .trim_end_matches('\0')
        .split(DELIMITER)
        .map(|v| v.trim().parse::<f64>())
        .collect();
    from_values(&values.ok()?)
}

/// Builds a direction matrix from 6 or 9 row-major values.
///
/// With 6 values the third row is the cross product of the first two.
pub fn from_values(values: &[f64]) -> Option<Matrix3<f64>> {
    if values.iter().any(|v| !v.is_finite()) {
        return None;
    }
    match values.len() {
        6 => {
            let row = RowVector3::new(values[0], values[1], values[2]);
            let col = RowVector3::new(values[3], values[4], values[5]);
            Some(Matrix3::from_rows(&[row, col, row.cross(&col)]))
        }
        9 => Some(Matrix3::from_row_slice(values)),
        _ => None,
    }
}
