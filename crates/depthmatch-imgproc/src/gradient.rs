use depthmatch_image::{Image, ImageError};

use crate::parallel;

/// Compute the gradient magnitude of a single channel image.
///
/// Uses central differences with replicated borders:
/// `gx = (I(x + 1) - I(x - 1)) / 2`, `gy = (I(y + 1) - I(y - 1)) / 2`,
/// `dst = sqrt(gx^2 + gy^2)`. Constant regions produce exactly zero.
///
/// # Example
///
/// ```
/// use depthmatch_image::{Image, ImageSize};
/// use depthmatch_imgproc::gradient::gradient_magnitude;
///
/// let image = Image::<f32, 1>::from_size_val(ImageSize { width: 3, height: 3 }, 0.5).unwrap();
/// let mut magnitude = Image::<f32, 1>::from_size_val(image.size(), 1.0).unwrap();
///
/// gradient_magnitude(&image, &mut magnitude).unwrap();
/// assert!(magnitude.as_slice().iter().all(|&m| m == 0.0));
/// ```
pub fn gradient_magnitude(src: &Image<f32, 1>, dst: &mut Image<f32, 1>) -> Result<(), ImageError> {
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

    parallel::par_iter_rows_mut(dst, |r, row| {
        let up = r.saturating_sub(1) * cols;
        let down = (r + 1).min(rows - 1) * cols;
        let mid = r * cols;
        for (c, out) in row.iter_mut().enumerate() {
            let left = data[mid + c.saturating_sub(1)];
            let right = data[mid + (c + 1).min(cols - 1)];
            let gx = (right - left) * 0.5;
            let gy = (data[down + c] - data[up + c]) * 0.5;
            *out = (gx * gx + gy * gy).sqrt();
        }
    });

    Ok(())
}
