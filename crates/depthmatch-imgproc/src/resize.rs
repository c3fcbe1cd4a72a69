use depthmatch_image::{Image, ImageError};

use crate::parallel;

/// Resize an image to the size of `dst` using bilinear interpolation.
///
/// Pixel centers are aligned (`align_corners = false`), samples outside the
/// source are clamped to the border. Resizing to the same size is an exact copy.
///
/// # Arguments
///
/// * `src` - The input image.
/// * `dst` - The output image, already allocated with the target size.
///
/// # Example
///
/// ```
/// use depthmatch_image::{Image, ImageSize};
/// use depthmatch_imgproc::resize::resize_bilinear;
///
/// let image = Image::<f32, 1>::from_size_val(ImageSize { width: 4, height: 4 }, 1.0).unwrap();
/// let mut resized = Image::<f32, 1>::from_size_val(ImageSize { width: 2, height: 3 }, 0.0).unwrap();
///
/// resize_bilinear(&image, &mut resized).unwrap();
/// assert_eq!(resized.size().height, 3);
/// ```
pub fn resize_bilinear<const C: usize>(
    src: &Image<f32, C>,
    dst: &mut Image<f32, C>,
) -> Result<(), ImageError> {
    if src.is_empty() || dst.is_empty() {
        return Err(ImageError::EmptyImage(src.width(), src.height()));
    }

    if src.size() == dst.size() {
        dst.as_slice_mut().copy_from_slice(src.as_slice());
        return Ok(());
    }

    let scale_x = src.width() as f32 / dst.width() as f32;
    let scale_y = src.height() as f32 / dst.height() as f32;
    let max_x = (src.width() - 1) as f32;
    let max_y = (src.height() - 1) as f32;
    let src_cols = src.width();
    let src_data = src.as_slice();
    let dst_cols = dst.width();

    parallel::par_iter_rows_mut(dst, |r, row| {
        let sy = ((r as f32 + 0.5) * scale_y - 0.5).clamp(0.0, max_y);
        let y0 = sy.floor() as usize;
        let y1 = (y0 + 1).min(max_y as usize);
        let wy = sy - y0 as f32;

        for c in 0..dst_cols {
            let sx = ((c as f32 + 0.5) * scale_x - 0.5).clamp(0.0, max_x);
            let x0 = sx.floor() as usize;
            let x1 = (x0 + 1).min(max_x as usize);
            let wx = sx - x0 as f32;

            for ch in 0..C {
                let p00 = src_data[(y0 * src_cols + x0) * C + ch];
                let p01 = src_data[(y0 * src_cols + x1) * C + ch];
                let p10 = src_data[(y1 * src_cols + x0) * C + ch];
                let p11 = src_data[(y1 * src_cols + x1) * C + ch];

                let top = p00 + (p01 - p00) * wx;
                let bottom = p10 + (p11 - p10) * wx;
                row[c * C + ch] = top + (bottom - top) * wy;
            }
        }
    });

    Ok(())
}
