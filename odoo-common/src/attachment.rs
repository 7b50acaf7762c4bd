//! # Attachment Encoding
//!
//! Binary fields (images, documents) travel as base64 text inside create and
//! write payloads. Images are decoded and re-encoded as JPEG first, so the
//! server always receives a compressed picture whatever the source format.

use std::io::{self, Cursor};
use std::path::Path;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use image::{DynamicImage, ImageFormat, ImageReader, ImageResult};

/// Base64 text for an arbitrary byte payload.
pub fn encode_bytes(data: &[u8]) -> String {
    BASE64.encode(data)
}

/// Re-encodes `image` as baseline JPEG at the encoder's default quality.
pub fn encode_jpeg(image: &DynamicImage) -> ImageResult<Vec<u8>> {
    // JPEG has no alpha channel.
    let rgb = DynamicImage::ImageRgb8(image.to_rgb8());
    let mut out = Cursor::new(Vec::new());
    rgb.write_to(&mut out, ImageFormat::Jpeg)?;
    Ok(out.into_inner())
}

/// Reads a JPEG, PNG, GIF or WebP file and returns its JPEG re-encoding as
/// base64 text.
///
/// # Errors
/// IO errors from opening the file pass through; an unknown format or a
/// corrupt or truncated image yields `InvalidData`.
pub fn encode_image_file(path: impl AsRef<Path>) -> io::Result<String> {
    let path = path.as_ref();
    let invalid = |err: image::ImageError| {
        io::Error::new(
            io::ErrorKind::InvalidData,
            format!("{} is not a readable image: {}", path.display(), err),
        )
    };

    let image = ImageReader::open(path)?
        .with_guessed_format()?
        .decode()
        .map_err(invalid)?;
    let jpeg = encode_jpeg(&image).map_err(invalid)?;
    Ok(encode_bytes(&jpeg))
}
