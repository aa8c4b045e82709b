/* This Source Code Form is released under the New BSD License. If a
 * copy of the BSD-3-Clause license was not distributed with this
 * file, see https://opensource.org/licenses/BSD-3-Clause. */

use icet_image::{ColorFormat, CompositeMode, DenseImage, ImageFormat, SparseBuilder, SparseImage};

use crate::{IcetCodecError, IcetCodecResult};

/// Reads a pixel-at-a-time view over a sparse image's run stream,
/// transparently coalescing adjacent runs so callers never see a run
/// boundary that isn't also a pixel boundary.
struct SparseCursor<'a> {
    runs: icet_image::RunIter<'a>,
    remaining_inactive: u32,
    remaining_active: &'a [u8],
    record_size: usize,
    exhausted: bool,
}

impl<'a> SparseCursor<'a> {
    fn new(image: &'a SparseImage) -> Self {
        let mut cursor = SparseCursor {
            runs: image.runs(),
            remaining_inactive: 0,
            remaining_active: &[],
            record_size: image.format().pixel_record_size(),
            exhausted: false,
        };
        cursor.pull();
        cursor
    }

    fn pull(&mut self) {
        while self.remaining_inactive == 0 && self.remaining_active.is_empty() {
            match self.runs.next() {
                Some(run) => {
                    self.remaining_inactive = run.inactive as u32;
                    self.remaining_active = run.pixels;
                }
                None => {
                    self.exhausted = true;
                    return;
                }
            }
        }
    }

    fn is_active(&self) -> bool {
        !self.exhausted && self.remaining_inactive == 0
    }

    fn record(&self) -> &'a [u8] {
        &self.remaining_active[..self.record_size]
    }

    fn advance(&mut self) {
        if self.remaining_inactive > 0 {
            self.remaining_inactive -= 1;
        } else if !self.remaining_active.is_empty() {
            self.remaining_active = &self.remaining_active[self.record_size..];
        }
        self.pull();
    }
}

fn read_f32(bytes: &[u8]) -> f32 {
    f32::from_ne_bytes(bytes.try_into().unwrap())
}

/// Composites one pixel record for `top`-over-`bottom`, writing the
/// result's color/depth bytes into `out`. spec.md §4.3 "Numerical
/// semantics".
fn composite_pixel(format: ImageFormat, mode: CompositeMode, top: &[u8], bottom: &[u8], out: &mut [u8]) {
    let color_size = format.color.pixel_size();
    let depth_size = format.depth.pixel_size();
    match mode {
        CompositeMode::ZBuffer => {
            let top_depth = read_f32(&top[color_size..color_size + depth_size]);
            let bottom_depth = read_f32(&bottom[color_size..color_size + depth_size]);
            let winner = if top_depth < bottom_depth { top } else { bottom };
            out.copy_from_slice(winner);
        }
        CompositeMode::Blend => {
            if color_size > 0 {
                match format.color {
                    ColorFormat::RgbaUByte => {
                        out[..4].copy_from_slice(&over_ubyte(
                            &top[..4].try_into().unwrap(),
                            &bottom[..4].try_into().unwrap(),
                        ));
                    }
                    ColorFormat::RgbaFloat => {
                        out[..16].copy_from_slice(&over_float(&top[..16], &bottom[..16]));
                    }
                    ColorFormat::None => {}
                }
            }
            if depth_size > 0 {
                out[color_size..color_size + depth_size].copy_from_slice(&top[color_size..color_size + depth_size]);
            }
        }
    }
}

/// RGBA-ubyte `over(src, dst)`: `dst.c·(255 − s.a)/255 + s.c`, truncated
/// toward zero by integer division.
fn over_ubyte(src: &[u8; 4], dst: &[u8; 4]) -> [u8; 4] {
    let sa = src[3] as u32;
    let mut out = [0u8; 4];
    for c in 0..4 {
        out[c] = ((dst[c] as u32 * (255 - sa)) / 255 + src[c] as u32) as u8;
    }
    out
}

fn over_float(src: &[u8], dst: &[u8]) -> [u8; 16] {
    let sa = read_f32(&src[12..16]);
    let mut out = [0u8; 16];
    for c in 0..4 {
        let s = read_f32(&src[c * 4..c * 4 + 4]);
        let d = read_f32(&dst[c * 4..c * 4 + 4]);
        let value = d * (1.0 - sa) + s;
        out[c * 4..c * 4 + 4].copy_from_slice(&value.to_ne_bytes());
    }
    out
}

/// Composites two sparse images of identical dimensions, `front` on top
/// of `back`, producing a sparse image whose active set is the union of
/// the inputs'. spec.md §4.3 "Compressed-to-compressed composite".
pub fn composite_compressed(
    front: &SparseImage,
    back: &SparseImage,
    mode: CompositeMode,
) -> IcetCodecResult<SparseImage> {
    if front.format() != back.format() {
        return Err(IcetCodecError::FormatMismatch);
    }
    if front.num_pixels() != back.num_pixels() {
        return Err(IcetCodecError::SanityCheckFail);
    }
    let format = front.format();
    let total = front.num_pixels();
    let record_size = format.pixel_record_size();
    let mut builder = SparseBuilder::new(format, front.width(), front.height());
    let mut f = SparseCursor::new(front);
    let mut b = SparseCursor::new(back);

    let mut i = 0usize;
    while i < total {
        let mut inactive = 0u32;
        while i < total && !f.is_active() && !b.is_active() {
            inactive += 1;
            i += 1;
            f.advance();
            b.advance();
        }
        builder.begin_run(inactive);
        while i < total && (f.is_active() || b.is_active()) {
            let mut record = vec![0u8; record_size];
            match (f.is_active(), b.is_active()) {
                (true, true) => composite_pixel(format, mode, f.record(), b.record(), &mut record),
                (true, false) => record.copy_from_slice(f.record()),
                (false, true) => record.copy_from_slice(b.record()),
                (false, false) => unreachable!(),
            }
            builder.push_active_pixel(&record);
            i += 1;
            f.advance();
            b.advance();
        }
    }
    Ok(builder.finish())
}

/// Combines a sparse fragment into a rectangular region of a dense
/// image under the same composite policy (`compressed_subcomposite`).
/// `src_on_top` selects over vs. under when both the fragment and the
/// existing dense pixel are active.
pub fn composite_into_dense(
    sparse: &SparseImage,
    dense: &mut DenseImage,
    dst_x: i32,
    dst_y: i32,
    mode: CompositeMode,
    src_on_top: bool,
) -> IcetCodecResult<()> {
    if sparse.format() != dense.format() {
        return Err(IcetCodecError::FormatMismatch);
    }
    let format = sparse.format();
    let color_size = format.color.pixel_size();
    let depth_size = format.depth.pixel_size();
    let record_size = format.pixel_record_size();
    let width = sparse.width();

    let mut cursor = SparseCursor::new(sparse);
    for i in 0..sparse.num_pixels() {
        let row = i as i32 / width;
        let col = i as i32 % width;
        let x = dst_x + col;
        let y = dst_y + row;
        if cursor.is_active() {
            if x >= 0 && x < dense.width() && y >= 0 && y < dense.height() {
                let dense_idx = y as usize * dense.width() as usize + x as usize;
                let mut existing = vec![0u8; record_size];
                if color_size > 0 {
                    let start = dense_idx * color_size;
                    existing[..color_size]
                        .copy_from_slice(&dense.color_plane()[start..start + color_size]);
                }
                if depth_size > 0 {
                    let start = dense_idx * depth_size;
                    existing[color_size..color_size + depth_size]
                        .copy_from_slice(&dense.depth_plane()[start..start + depth_size]);
                }
                let mut combined = vec![0u8; record_size];
                if src_on_top {
                    composite_pixel(format, mode, cursor.record(), &existing, &mut combined);
                } else {
                    composite_pixel(format, mode, &existing, cursor.record(), &mut combined);
                }
                if color_size > 0 {
                    let start = dense_idx * color_size;
                    dense.color_plane_mut()[start..start + color_size]
                        .copy_from_slice(&combined[..color_size]);
                }
                if depth_size > 0 {
                    let start = dense_idx * depth_size;
                    dense.depth_plane_mut()[start..start + depth_size]
                        .copy_from_slice(&combined[color_size..color_size + depth_size]);
                }
            }
        }
        cursor.advance();
    }
    Ok(())
}

/// Combines a sparse fragment into a contiguous linear pixel range
/// `[offset, offset + sparse.num_pixels())` of a dense image's row-major
/// storage, ignoring row/column structure entirely. Used by single-image
/// strategies that split an image into linear pixel ranges rather than
/// sub-rectangles (binary-swap, radix-k).
pub fn composite_into_dense_range(
    sparse: &SparseImage,
    dense: &mut DenseImage,
    offset: usize,
    mode: CompositeMode,
    src_on_top: bool,
) -> IcetCodecResult<()> {
    if sparse.format() != dense.format() {
        return Err(IcetCodecError::FormatMismatch);
    }
    let format = sparse.format();
    let color_size = format.color.pixel_size();
    let depth_size = format.depth.pixel_size();
    let record_size = format.pixel_record_size();
    if offset + sparse.num_pixels() > dense.num_pixels() {
        return Err(IcetCodecError::SanityCheckFail);
    }

    let mut cursor = SparseCursor::new(sparse);
    for i in 0..sparse.num_pixels() {
        if cursor.is_active() {
            let dense_idx = offset + i;
            let mut existing = vec![0u8; record_size];
            if color_size > 0 {
                let start = dense_idx * color_size;
                existing[..color_size].copy_from_slice(&dense.color_plane()[start..start + color_size]);
            }
            if depth_size > 0 {
                let start = dense_idx * depth_size;
                existing[color_size..color_size + depth_size]
                    .copy_from_slice(&dense.depth_plane()[start..start + depth_size]);
            }
            let mut combined = vec![0u8; record_size];
            if src_on_top {
                composite_pixel(format, mode, cursor.record(), &existing, &mut combined);
            } else {
                composite_pixel(format, mode, &existing, cursor.record(), &mut combined);
            }
            if color_size > 0 {
                let start = dense_idx * color_size;
                dense.color_plane_mut()[start..start + color_size].copy_from_slice(&combined[..color_size]);
            }
            if depth_size > 0 {
                let start = dense_idx * depth_size;
                dense.depth_plane_mut()[start..start + depth_size]
                    .copy_from_slice(&combined[color_size..color_size + depth_size]);
            }
        }
        cursor.advance();
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compress;
    use icet_image::{ColorFormat, DepthFormat, PackedBackground};

    fn empty_sparse(format: ImageFormat, width: i32, height: i32) -> SparseImage {
        let mut image = DenseImage::new(format, width, height);
        image.clear(&PackedBackground::new([0.0, 0.0, 0.0, 0.0]));
        compress::compress(&image, CompositeMode::Blend, 1.0).unwrap()
    }

    #[test]
    fn compositing_with_an_empty_image_is_an_identity() {
        let format = ImageFormat::new(ColorFormat::RgbaUByte, DepthFormat::None);
        let mut image = DenseImage::new(format, 2, 2);
        image.clear(&PackedBackground::new([0.0, 0.0, 0.0, 0.0]));
        image.color_plane_mut()[0..4].copy_from_slice(&[10, 20, 30, 255]);
        let sparse = compress::compress(&image, CompositeMode::Blend, 1.0).unwrap();
        let empty = empty_sparse(format, 2, 2);

        let front = composite_compressed(&sparse, &empty, CompositeMode::Blend).unwrap();
        let back = composite_compressed(&empty, &sparse, CompositeMode::Blend).unwrap();
        let background = PackedBackground::new([0.0, 0.0, 0.0, 0.0]);
        let decoded_front = crate::decompress::decompress(&front, &background).unwrap();
        let decoded_back = crate::decompress::decompress(&back, &background).unwrap();
        assert_eq!(decoded_front, image);
        assert_eq!(decoded_back, image);
    }

    #[test]
    fn zbuffer_keeps_nearer_pixel() {
        let format = ImageFormat::new(ColorFormat::RgbaUByte, DepthFormat::Float);
        let mut near = DenseImage::new(format, 1, 1);
        near.color_plane_mut().copy_from_slice(&[255, 0, 0, 255]);
        near.depth_plane_mut().copy_from_slice(&0.1f32.to_ne_bytes());
        let mut far = DenseImage::new(format, 1, 1);
        far.color_plane_mut().copy_from_slice(&[0, 255, 0, 255]);
        far.depth_plane_mut().copy_from_slice(&0.9f32.to_ne_bytes());

        let near_sparse = compress::compress(&near, CompositeMode::ZBuffer, 1.0).unwrap();
        let far_sparse = compress::compress(&far, CompositeMode::ZBuffer, 1.0).unwrap();
        let composited = composite_compressed(&near_sparse, &far_sparse, CompositeMode::ZBuffer).unwrap();
        let background = PackedBackground::new([0.0, 0.0, 0.0, 0.0]);
        let decoded = crate::decompress::decompress(&composited, &background).unwrap();
        assert_eq!(decoded.color_plane(), &[255, 0, 0, 255]);
    }

    #[test]
    fn mismatched_pixel_counts_fail_sanity_check() {
        let format = ImageFormat::new(ColorFormat::RgbaUByte, DepthFormat::None);
        let a = empty_sparse(format, 2, 2);
        let b = empty_sparse(format, 3, 3);
        assert_eq!(
            composite_compressed(&a, &b, CompositeMode::Blend).unwrap_err(),
            IcetCodecError::SanityCheckFail
        );
    }
}
