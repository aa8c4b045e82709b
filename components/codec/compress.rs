/* This Source Code Form is released under the New BSD License. If a
 * copy of the BSD-3-Clause license was not distributed with this
 * file, see https://opensource.org/licenses/BSD-3-Clause. */

use icet_image::{CompositeMode, DenseImage, ImageFormat, SparseBuilder, SparseImage};

use crate::pixelio::{DensePixelCursor, PaddedPixelCursor, PaddingSpec, PixelIo};
use crate::{IcetCodecError, IcetCodecResult};

/// Run-length compresses `cursor`'s `total` pixels into a sparse image
/// of the given logical dimensions. Shared by the plain, padded, and
/// offset-range entry points; spec.md §4.3 steps 1-6.
fn compress_cursor<P: PixelIo>(
    mut cursor: P,
    total: usize,
    format: ImageFormat,
    width: i32,
    height: i32,
) -> SparseImage {
    let mut builder = SparseBuilder::new(format, width, height);
    let record_size = format.pixel_record_size();
    let mut i = 0usize;
    while i < total {
        let mut inactive = 0u32;
        while i < total && !cursor.is_active() {
            inactive += 1;
            i += 1;
            cursor.advance();
        }
        builder.begin_run(inactive);
        while i < total && cursor.is_active() {
            let mut record = vec![0u8; record_size];
            cursor.write(&mut record);
            builder.push_active_pixel(&record);
            i += 1;
            cursor.advance();
        }
    }
    builder.finish()
}

/// Compresses an entire dense image. `far_depth` is the value that
/// marks a Z-buffer pixel as background (usually 1.0).
pub fn compress(
    image: &DenseImage,
    mode: CompositeMode,
    far_depth: f32,
) -> IcetCodecResult<SparseImage> {
    if !image.format().active_channel_ok(mode) {
        return Err(IcetCodecError::InvalidOperation);
    }
    let cursor = DensePixelCursor::new(image, mode, far_depth);
    Ok(compress_cursor(
        cursor,
        image.num_pixels(),
        image.format(),
        image.width(),
        image.height(),
    ))
}

/// Compresses `image` as if it were embedded inside a larger tile
/// described by `padding`, treating the surrounding border as inactive
/// pixels without reading any dense memory for them.
pub fn compress_padded(
    image: &DenseImage,
    mode: CompositeMode,
    far_depth: f32,
    padding: PaddingSpec,
) -> IcetCodecResult<SparseImage> {
    if !image.format().active_channel_ok(mode) {
        return Err(IcetCodecError::InvalidOperation);
    }
    if padding.space_left + image.width() + padding.space_right != padding.full_width
        || padding.space_top + image.height() + padding.space_bottom != padding.full_height
    {
        return Err(IcetCodecError::InvalidValue);
    }
    let inner = DensePixelCursor::new(image, mode, far_depth);
    let cursor = PaddedPixelCursor::new(inner, padding, image.width(), image.height());
    let total = cursor.total_pixels();
    Ok(compress_cursor(
        cursor,
        total,
        image.format(),
        padding.full_width,
        padding.full_height,
    ))
}

/// Compresses a contiguous sub-range `[offset, offset + count)` of a
/// dense image's linear pixel order. Used internally by strategies that
/// resend a partial fragment rather than a whole tile. The resulting
/// sparse image reports `count` pixels in a single logical row; callers
/// reassemble it against the matching dense range themselves.
pub fn compress_range(
    image: &DenseImage,
    mode: CompositeMode,
    far_depth: f32,
    offset: usize,
    count: usize,
) -> IcetCodecResult<SparseImage> {
    if !image.format().active_channel_ok(mode) {
        return Err(IcetCodecError::InvalidOperation);
    }
    if offset + count > image.num_pixels() {
        return Err(IcetCodecError::InvalidValue);
    }
    let mut cursor = DensePixelCursor::new(image, mode, far_depth);
    for _ in 0..offset {
        cursor.advance();
    }
    Ok(compress_cursor(
        cursor,
        count,
        image.format(),
        count as i32,
        1,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use icet_image::{ColorFormat, DepthFormat, PackedBackground};

    #[test]
    fn all_background_compresses_to_a_single_inactive_run() {
        let format = ImageFormat::new(ColorFormat::RgbaUByte, DepthFormat::Float);
        let mut image = DenseImage::new(format, 8, 8);
        image.clear(&PackedBackground::new([0.0, 0.0, 0.0, 0.0]));
        let sparse = compress(&image, CompositeMode::ZBuffer, 1.0).unwrap();
        let runs: Vec<_> = sparse.runs().collect();
        assert_eq!(runs.len(), 1);
        assert_eq!(runs[0].inactive, 64);
        assert_eq!(runs[0].active, 0);
    }

    #[test]
    fn padding_never_touches_real_pixels() {
        let format = ImageFormat::new(ColorFormat::RgbaUByte, DepthFormat::None);
        let mut image = DenseImage::new(format, 2, 1);
        image.color_plane_mut().copy_from_slice(&[1, 2, 3, 255, 4, 5, 6, 255]);
        let padding = PaddingSpec {
            space_bottom: 1,
            space_top: 1,
            space_left: 1,
            space_right: 1,
            full_width: 4,
            full_height: 3,
        };
        let sparse = compress_padded(&image, CompositeMode::Blend, 1.0, padding).unwrap();
        sparse.validate_run_accounting().unwrap();
        let active: usize = sparse.runs().map(|r| r.active as usize).sum();
        assert_eq!(active, 2);
    }
}
