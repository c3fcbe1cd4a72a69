use std::io::Cursor;

use depthmatch_image::{Image, ImageError, ImageSize};

use crate::error::IoError;

/// Decodes an in-memory image payload into an RGB8 image.
///
/// The format is guessed from the payload itself, so any format supported by the
/// image crate build is accepted. Grayscale and alpha images are converted to RGB.
///
/// # Arguments
///
/// * `bytes` - The encoded image payload.
///
/// # Returns
///
/// An RGB image with the decoded pixels.
///
/// # Errors
///
/// Fails if the payload cannot be decoded or decodes to an empty image.
pub fn decode_image_rgb8(bytes: &[u8]) -> Result<Image<u8, 3>, IoError> {
    // decode the data directly from memory
    let img = image::ImageReader::new(Cursor::new(bytes))
        .with_guessed_format()?
        .decode()?;

    let size = ImageSize {
        width: img.width() as usize,
        height: img.height() as usize,
    };

    if size.area() == 0 {
        return Err(IoError::EmptyImage);
    }

    Ok(Image::new(size, img.into_rgb8().into_raw())?)
}

/// Encodes an RGB8 image as a PNG payload.
pub fn encode_image_png(image: &Image<u8, 3>) -> Result<Vec<u8>, IoError> {
    let buffer = image::RgbImage::from_raw(
        image.width() as u32,
        image.height() as u32,
        image.as_slice().to_vec(),
    )
    .ok_or(ImageError::InvalidChannelShape(
        image.as_slice().len(),
        image.size().area() * 3,
    ))?;

    let mut encoded = Cursor::new(Vec::new());
    buffer.write_to(&mut encoded, image::ImageFormat::Png)?;

    Ok(encoded.into_inner())
}
