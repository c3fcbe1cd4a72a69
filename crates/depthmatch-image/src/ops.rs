use crate::{Image, ImageError};

/// Cast the pixel data of an image to a different type and scale it into `dst`.
///
/// # Arguments
///
/// * `src` - The source image.
/// * `dst` - The destination image.
/// * `scale` - The scale to multiply the pixel data with.
///
/// Example:
///
/// ```
/// use depthmatch_image::{Image, ImageSize};
/// use depthmatch_image::ops::cast_and_scale;
///
/// let image = Image::<u8, 1>::new(ImageSize { width: 2, height: 1 }, vec![0u8, 255]).unwrap();
/// let mut image_f32 = Image::from_size_val(image.size(), 0.0f32).unwrap();
///
/// cast_and_scale(&image, &mut image_f32, 1. / 255.0).unwrap();
///
/// assert_eq!(image_f32.as_slice(), &[0.0, 1.0]);
/// ```
pub fn cast_and_scale<T, U, const C: usize>(
    src: &Image<T, C>,
    dst: &mut Image<U, C>,
    scale: U,
) -> Result<(), ImageError>
where
    T: Copy + num_traits::NumCast,
    U: Copy + num_traits::NumCast + std::ops::Mul<U, Output = U>,
{
    check_same_size(src, dst)?;

    dst.as_slice_mut()
        .iter_mut()
        .zip(src.as_slice().iter())
        .try_for_each(|(out, &inp)| {
            let x = U::from(inp).ok_or(ImageError::CastError(
                std::any::type_name::<U>().to_string(),
            ))?;
            *out = x * scale;
            Ok::<(), ImageError>(())
        })?;

    Ok(())
}

/// Normalize an image using per-channel mean and standard deviation.
///
/// Applies `(pixel - mean) / std` independently to each channel.
pub fn normalize_mean_std<const C: usize>(
    src: &Image<f32, C>,
    dst: &mut Image<f32, C>,
    mean: &[f32; C],
    std: &[f32; C],
) -> Result<(), ImageError> {
    check_same_size(src, dst)?;

    dst.as_slice_mut()
        .chunks_exact_mut(C)
        .zip(src.as_slice().chunks_exact(C))
        .for_each(|(dst_pixel, src_pixel)| {
            for ch in 0..C {
                dst_pixel[ch] = (src_pixel[ch] - mean[ch]) / std[ch];
            }
        });

    Ok(())
}

/// Project a three channel image onto a single channel with the given weights.
///
/// With the default luma weights `[0.299, 0.587, 0.114]` this is the usual RGB to
/// grayscale conversion. Identical input pixels always map to identical outputs.
pub fn weighted_gray(
    src: &Image<f32, 3>,
    dst: &mut Image<f32, 1>,
    weights: &[f32; 3],
) -> Result<(), ImageError> {
    check_same_size(src, dst)?;

    dst.as_slice_mut()
        .iter_mut()
        .zip(src.as_slice().chunks_exact(3))
        .for_each(|(out, px)| {
            *out = weights[0] * px[0] + weights[1] * px[1] + weights[2] * px[2];
        });

    Ok(())
}

/// Convert an RGB image in the range [0, 1] to grayscale.
pub fn gray_from_rgb(src: &Image<f32, 3>, dst: &mut Image<f32, 1>) -> Result<(), ImageError> {
    weighted_gray(src, dst, &[0.299, 0.587, 0.114])
}

fn check_same_size<T, U, const C1: usize, const C2: usize>(
    src: &Image<T, C1>,
    dst: &Image<U, C2>,
) -> Result<(), ImageError> {
    if src.size() != dst.size() {
        return Err(ImageError::InvalidImageSize(
            src.width(),
            src.height(),
            dst.width(),
            dst.height(),
        ));
    }
    Ok(())
}
