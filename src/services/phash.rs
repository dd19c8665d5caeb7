use image::imageops::FilterType;

/// Hamming distance at or below which two hashes are considered the same
/// screenshot (recompressed, resized, or lightly edited).
pub const NEAR_DUPLICATE_MAX_DISTANCE: u32 = 10;

#[derive(Debug, thiserror::Error)]
pub enum PhashError {
    #[error("unsupported or corrupt image: {0}")]
    Decode(#[from] image::ImageError),
}

/// Compute a 64-bit perceptual difference hash of an image.
///
/// The image is reduced to 9x8 grayscale and each bit records whether a pixel
/// is brighter than its right neighbor. The gradient structure survives
/// recompression and resizing, so near-duplicates land within a few bits of
/// each other.
pub fn difference_hash(bytes: &[u8]) -> Result<u64, PhashError> {
    let gray = image::load_from_memory(bytes)?
        .resize_exact(9, 8, FilterType::Triangle)
        .into_luma8();

    let mut hash = 0u64;
    for y in 0..8 {
        for x in 0..8 {
            let left = gray.get_pixel(x, y)[0];
            let right = gray.get_pixel(x + 1, y)[0];
            hash = (hash << 1) | u64::from(left > right);
        }
    }
    Ok(hash)
}

pub fn hamming_distance(a: u64, b: u64) -> u32 {
    (a ^ b).count_ones()
}

pub fn is_near_duplicate(a: u64, b: u64) -> bool {
    hamming_distance(a, b) <= NEAR_DUPLICATE_MAX_DISTANCE
}

/// Hashes are stored in a signed BIGINT column; the bit pattern is preserved.
pub fn to_stored(hash: u64) -> i64 {
    hash as i64
}

pub fn from_stored(stored: i64) -> u64 {
    stored as u64
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{DynamicImage, ImageFormat, Rgb, RgbImage};
    use std::io::Cursor;

    fn encode_png(img: RgbImage) -> Vec<u8> {
        let mut out = Vec::new();
        DynamicImage::ImageRgb8(img)
            .write_to(&mut Cursor::new(&mut out), ImageFormat::Png)
            .unwrap();
        out
    }

    fn horizontal_gradient(width: u32, height: u32) -> RgbImage {
        RgbImage::from_fn(width, height, |x, _| {
            let v = (x * 255 / width.max(1)) as u8;
            Rgb([v, v, v])
        })
    }

    fn inverse_gradient(width: u32, height: u32) -> RgbImage {
        RgbImage::from_fn(width, height, |x, _| {
            let v = 255 - (x * 255 / width.max(1)) as u8;
            Rgb([v, v, v])
        })
    }

    #[test]
    fn identical_images_hash_identically() {
        let a = difference_hash(&encode_png(horizontal_gradient(200, 100))).unwrap();
        let b = difference_hash(&encode_png(horizontal_gradient(200, 100))).unwrap();
        assert_eq!(hamming_distance(a, b), 0);
        assert!(is_near_duplicate(a, b));
    }

    #[test]
    fn resized_image_stays_within_threshold() {
        // Same picture at a different resolution, as after client-side scaling.
        let a = difference_hash(&encode_png(horizontal_gradient(200, 100))).unwrap();
        let b = difference_hash(&encode_png(horizontal_gradient(97, 53))).unwrap();
        assert!(hamming_distance(a, b) <= NEAR_DUPLICATE_MAX_DISTANCE);
    }

    #[test]
    fn recompressed_image_stays_within_threshold() {
        let img = horizontal_gradient(160, 90);
        let png = encode_png(img.clone());
        let mut jpeg = Vec::new();
        DynamicImage::ImageRgb8(img)
            .write_to(&mut Cursor::new(&mut jpeg), ImageFormat::Jpeg)
            .unwrap();
        let a = difference_hash(&png).unwrap();
        let b = difference_hash(&jpeg).unwrap();
        assert!(hamming_distance(a, b) <= NEAR_DUPLICATE_MAX_DISTANCE);
    }

    #[test]
    fn opposite_images_are_not_near_duplicates() {
        let a = difference_hash(&encode_png(horizontal_gradient(200, 100))).unwrap();
        let b = difference_hash(&encode_png(inverse_gradient(200, 100))).unwrap();
        // Every gradient bit flips.
        assert_eq!(hamming_distance(a, b), 64);
        assert!(!is_near_duplicate(a, b));
    }

    #[test]
    fn garbage_bytes_are_rejected() {
        assert!(difference_hash(b"definitely not an image").is_err());
    }

    #[test]
    fn stored_roundtrip_preserves_bits() {
        let hash = 0xDEAD_BEEF_CAFE_F00Du64;
        assert_eq!(from_stored(to_stored(hash)), hash);
    }
}
