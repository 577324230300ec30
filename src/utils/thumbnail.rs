use image::codecs::jpeg::JpegEncoder;

use crate::errors::{BotError, BotResult};

pub const THUMBNAIL_MAX_SIDE: u32 = 320;
pub const THUMBNAIL_MAX_BYTES: usize = 200 * 1024;
const JPEG_QUALITIES: [u8; 4] = [90, 80, 65, 50];

/// Re-encodes an image as a JPEG that fits the Bot API thumbnail limits.
pub fn prepare_thumbnail(bytes: &[u8]) -> BotResult<Vec<u8>> {
    let decoded = image::load_from_memory(bytes)
        .map_err(|err| BotError::InvalidInput(format!("cover is not a readable image: {err}")))?;
    let scaled = if decoded.width() > THUMBNAIL_MAX_SIDE || decoded.height() > THUMBNAIL_MAX_SIDE {
        decoded.thumbnail(THUMBNAIL_MAX_SIDE, THUMBNAIL_MAX_SIDE)
    } else {
        decoded
    };
    let rgb = scaled.to_rgb8();

    let mut encoded = Vec::new();
    for quality in JPEG_QUALITIES {
        encoded.clear();
        JpegEncoder::new_with_quality(&mut encoded, quality)
            .encode_image(&rgb)
            .map_err(|err| {
                BotError::InvalidInput(format!("cover could not be re-encoded: {err}"))
            })?;
        if encoded.len() <= THUMBNAIL_MAX_BYTES {
            break;
        }
    }
    Ok(encoded)
}
