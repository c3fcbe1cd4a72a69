//! Filter operations
//!
//! Box and gaussian smoothing for single channel float images.

use depthmatch_image::{Image, ImageError};

use crate::parallel;

/// Compute the summed area table of a single channel image.
///
/// The returned table has `(rows + 1) x (cols + 1)` entries with a zero first row
/// and column, accumulated in `f64`.
pub fn integral_image(src: &Image<f32, 1>) -> Vec<f64> {
    let cols = src.width();
    let stride = cols + 1;
    let mut table = vec![0.0f64; (src.height() + 1) * stride];

    for (r, row) in src.rows_iter().enumerate() {
        let mut row_sum = 0.0f64;
        for c in 0..cols {
            row_sum += row[c] as f64;
            table[(r + 1) * stride + c + 1] = table[r * stride + c + 1] + row_sum;
        }
    }

    table
}

/// Sum of the summed area table over rows `[r0, r1)` and cols `[c0, c1)`.
#[inline]
pub fn integral_sum(table: &[f64], stride: usize, r0: usize, c0: usize, r1: usize, c1: usize) -> f64 {
    table[r1 * stride + c1] - table[r0 * stride + c1] - table[r1 * stride + c0]
        + table[r0 * stride + c0]
}

/// Blur an image with a `(2 * radius + 1)` square box filter.
///
/// The window is clipped at the image borders and the sum is divided by the number
/// of pixels actually covered, so an all-zero image stays exactly zero.
pub fn box_blur(
    src: &Image<f32, 1>,
    dst: &mut Image<f32, 1>,
    radius: usize,
) -> Result<(), ImageError> {
    if src.size() != dst.size() {
        return Err(ImageError::InvalidImageSize(
            src.width(),
            src.height(),
            dst.width(),
            dst.height(),
        ));
    }

    let table = integral_image(src);
    let rows = src.height();
    let cols = src.width();
    let stride = cols + 1;

    parallel::par_iter_rows_mut(dst, |r, row| {
        let r0 = r.saturating_sub(radius);
        let r1 = (r + radius + 1).min(rows);
        for (c, out) in row.iter_mut().enumerate() {
            let c0 = c.saturating_sub(radius);
            let c1 = (c + radius + 1).min(cols);
            let count = ((r1 - r0) * (c1 - c0)) as f64;
            *out = (integral_sum(&table, stride, r0, c0, r1, c1) / count) as f32;
        }
    });

    Ok(())
}

/// Blur an image with the separable 3x3 binomial kernel `[1, 2, 1] / 4`.
///
/// Borders are replicated.
pub fn gaussian_blur3(src: &Image<f32, 1>, dst: &mut Image<f32, 1>) -> Result<(), ImageError> {
    if src.size() != dst.size() {
        return Err(ImageError::InvalidImageSize(
            src.width(),
            src.height(),
            dst.width(),
            dst.height(),
        ));
    }

    let rows = src.height();
    let cols = src.width();
    let data = src.as_slice();

    // horizontal pass
    let mut tmp = vec![0.0f32; data.len()];
    for r in 0..rows {
        let line = &data[r * cols..(r + 1) * cols];
        for c in 0..cols {
            let left = line[c.saturating_sub(1)];
            let right = line[(c + 1).min(cols - 1)];
            tmp[r * cols + c] = 0.25 * left + 0.5 * line[c] + 0.25 * right;
        }
    }

    // vertical pass
    parallel::par_iter_rows_mut(dst, |r, row| {
        let up = r.saturating_sub(1) * cols;
        let mid = r * cols;
        let down = (r + 1).min(rows - 1) * cols;
        for (c, out) in row.iter_mut().enumerate() {
            *out = 0.25 * tmp[up + c] + 0.5 * tmp[mid + c] + 0.25 * tmp[down + c];
        }
    });

    Ok(())
}
