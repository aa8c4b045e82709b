/* This Source Code Form is released under the New BSD License. If a
 * copy of the BSD-3-Clause license was not distributed with this
 * file, see https://opensource.org/licenses/BSD-3-Clause. */

use icet_image::{DenseImage, PackedBackground, SparseImage};

use crate::pixelio::background_record;
use crate::{IcetCodecError, IcetCodecResult};

/// Expands `sparse` back into a dense image, writing `background` for
/// every inactive pixel. spec.md §4.3 "Decompression": corruption is
/// detected by the cumulative pixel count exceeding the image's pixel
/// count, reported as `INVALID_VALUE`.
pub fn decompress(sparse: &SparseImage, background: &PackedBackground) -> IcetCodecResult<DenseImage> {
    let format = sparse.format();
    let mut dense = DenseImage::new(format, sparse.width(), sparse.height());
    let total = dense.num_pixels();
    let bg_record = background_record(format, background);
    let color_size = format.color.pixel_size();
    let depth_size = format.depth.pixel_size();

    let mut written = 0usize;
    for run in sparse.runs() {
        let inactive = run.inactive as usize;
        let active = run.active as usize;
        if written + inactive + active > total {
            return Err(IcetCodecError::InvalidValue);
        }
        for _ in 0..inactive {
            write_pixel(&mut dense, written, &bg_record, color_size, depth_size);
            written += 1;
        }
        let record_size = color_size + depth_size;
        for chunk in run.pixels.chunks(record_size) {
            write_pixel(&mut dense, written, chunk, color_size, depth_size);
            written += 1;
        }
    }
    if written != total {
        return Err(IcetCodecError::InvalidValue);
    }
    Ok(dense)
}

fn write_pixel(dense: &mut DenseImage, index: usize, record: &[u8], color_size: usize, depth_size: usize) {
    if color_size > 0 {
        let start = index * color_size;
        dense.color_plane_mut()[start..start + color_size].copy_from_slice(&record[..color_size]);
    }
    if depth_size > 0 {
        let start = index * depth_size;
        dense.depth_plane_mut()[start..start + depth_size]
            .copy_from_slice(&record[color_size..color_size + depth_size]);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compress;
    use icet_image::{ColorFormat, CompositeMode, DepthFormat, ImageFormat};

    #[test]
    fn roundtrip_matches_original_pixels() {
        let format = ImageFormat::new(ColorFormat::RgbaUByte, DepthFormat::None);
        let background = PackedBackground::new([0.0, 0.0, 0.0, 0.0]);
        let mut image = DenseImage::new(format, 4, 1);
        image.clear(&background);
        image.color_plane_mut()[4..8].copy_from_slice(&[9, 8, 7, 255]);
        let sparse = compress::compress(&image, CompositeMode::Blend, 1.0).unwrap();
        let back = decompress(&sparse, &background).unwrap();
        assert_eq!(back, image);
    }

    #[test]
    fn depth_only_roundtrip() {
        let format = ImageFormat::new(ColorFormat::None, DepthFormat::Float);
        let background = PackedBackground::new([0.0, 0.0, 0.0, 0.0]);
        let mut image = DenseImage::new(format, 3, 1);
        image.clear(&background);
        image.depth_plane_mut()[4..8].copy_from_slice(&0.25f32.to_ne_bytes());
        let sparse = compress::compress(&image, CompositeMode::ZBuffer, 1.0).unwrap();
        let back = decompress(&sparse, &background).unwrap();
        assert_eq!(back, image);
    }
}
