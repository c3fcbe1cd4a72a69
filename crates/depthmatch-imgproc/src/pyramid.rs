use depthmatch_image::{Image, ImageError, ImageSize};

/// Size of the image produced by [`pyrdown_avg`] for a given source size.
pub fn pyrdown_size(size: ImageSize) -> ImageSize {
    ImageSize {
        width: size.width / 2,
        height: size.height / 2,
    }
}

/// Downsample an image by a factor of two averaging each 2x2 block.
///
/// Odd trailing rows and columns are dropped. The block sum is evaluated as
/// `(p00 + p01) + (p10 + p11)` so that a constant image stays exactly constant.
///
/// # Arguments
///
/// * `src` - The source image, at least 2x2 pixels.
/// * `dst` - The destination image of size [`pyrdown_size`] of the source.
pub fn pyrdown_avg<const C: usize>(
    src: &Image<f32, C>,
    dst: &mut Image<f32, C>,
) -> Result<(), ImageError> {
    let expected = pyrdown_size(src.size());
    if expected.area() == 0 {
        return Err(ImageError::EmptyImage(expected.width, expected.height));
    }

    if dst.size() != expected {
        return Err(ImageError::InvalidImageSize(
            expected.width,
            expected.height,
            dst.width(),
            dst.height(),
        ));
    }

    let src_cols = src.width();
    let src_data = src.as_slice();
    let dst_cols = dst.width();

    crate::parallel::par_iter_rows_mut(dst, |r, row| {
        let top = 2 * r * src_cols;
        let bottom = (2 * r + 1) * src_cols;
        for c in 0..dst_cols {
            for ch in 0..C {
                let p00 = src_data[(top + 2 * c) * C + ch];
                let p01 = src_data[(top + 2 * c + 1) * C + ch];
                let p10 = src_data[(bottom + 2 * c) * C + ch];
                let p11 = src_data[(bottom + 2 * c + 1) * C + ch];
                row[c * C + ch] = ((p00 + p01) + (p10 + p11)) * 0.25;
            }
        }
    });

    Ok(())
}

/// Build an averaging pyramid with `levels` images, the first one being a copy of `src`.
///
/// Construction stops early when the next level would be empty.
pub fn build_pyramid<const C: usize>(
    src: &Image<f32, C>,
    levels: usize,
) -> Result<Vec<Image<f32, C>>, ImageError> {
    let mut pyramid = Vec::with_capacity(levels);
    if levels == 0 {
        return Ok(pyramid);
    }
    pyramid.push(src.clone());

    while pyramid.len() < levels {
        let Some(last) = pyramid.last() else {
            break;
        };
        let next_size = pyrdown_size(last.size());
        if next_size.area() == 0 {
            break;
        }
        let mut next = Image::from_size_val(next_size, 0.0)?;
        pyrdown_avg(last, &mut next)?;
        pyramid.push(next);
    }

    Ok(pyramid)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pyrdown_averages_blocks() -> Result<(), ImageError> {
        let image = Image::<f32, 1>::new(
            [4, 2].into(),
            vec![0.0, 1.0, 2.0, 3.0, 4.0, 5.0, 6.0, 7.0],
        )?;
        let mut dst = Image::<f32, 1>::from_size_val([2, 1].into(), 0.0)?;
        pyrdown_avg(&image, &mut dst)?;
        assert_eq!(dst.as_slice(), &[2.5, 4.5]);
        Ok(())
    }

    #[test]
    fn pyrdown_constant_is_exact() -> Result<(), ImageError> {
        let value = 0.1f32 / 3.0;
        let image = Image::<f32, 3>::from_size_val([9, 7].into(), value)?;
        let pyramid = build_pyramid(&image, 3)?;
        assert_eq!(pyramid.len(), 3);
        assert_eq!(pyramid[1].size(), ImageSize { width: 4, height: 3 });
        assert_eq!(pyramid[2].size(), ImageSize { width: 2, height: 1 });
        for level in &pyramid {
            assert!(level.as_slice().iter().all(|&v| v == value));
        }
        Ok(())
    }

    #[test]
    fn pyramid_stops_when_empty() -> Result<(), ImageError> {
        let image = Image::<f32, 1>::from_size_val([2, 2].into(), 1.0)?;
        let pyramid = build_pyramid(&image, 5)?;
        assert_eq!(pyramid.len(), 2);
        Ok(())
    }

    #[test]
    fn pyrdown_wrong_size() -> Result<(), ImageError> {
        let image = Image::<f32, 1>::from_size_val([4, 4].into(), 1.0)?;
        let mut dst = Image::<f32, 1>::from_size_val([3, 3].into(), 0.0)?;
        assert!(pyrdown_avg(&image, &mut dst).is_err());
        Ok(())
    }
}
