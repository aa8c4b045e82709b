/* This Source Code Form is released under the New BSD License. If a
 * copy of the BSD-3-Clause license was not distributed with this
 * file, see https://opensource.org/licenses/BSD-3-Clause. */

use euclid::default::Rect;

use crate::format::ImageFormat;
use crate::{IcetImageError, IcetImageResult};

/// Offsets of the six `u32` header fields common to dense and sparse
/// images (spec.md §6): magic, color_format, depth_format, width, height,
/// actual_size.
pub const HEADER_LEN: usize = 24;

fn write_u32(buf: &mut [u8], offset: usize, value: u32) {
    buf[offset..offset + 4].copy_from_slice(&value.to_ne_bytes());
}

fn read_u32(buf: &[u8], offset: usize) -> u32 {
    u32::from_ne_bytes(buf[offset..offset + 4].try_into().unwrap())
}

/// Bytes needed for a dense image buffer of the given format and
/// dimensions. Pure and deterministic, as spec.md §4.2 requires.
pub fn dense_image_buffer_size(format: ImageFormat, width: i32, height: i32) -> usize {
    HEADER_LEN + (width as usize) * (height as usize) * format.pixel_record_size()
}

/// A fixed-dimension image with an optional color channel and an optional
/// depth channel (spec.md §3 "Dense image"). The physical buffer is the
/// wire format itself: header, then color plane, then depth plane;
/// `package`/`unpackage` are therefore just a borrow and a copy.
///
/// Grounded on `original_source/src/ice-t/image.c`'s `icetImageAssignBuffer`
/// / `icetImageAdjustForOutput`, which stamp a header into a caller-owned
/// arena slot rather than allocate; `DenseImage::new` allocates here since
/// the arena (`icet-core`'s buffer pool) owns allocation in this port.
#[derive(Debug, Clone, PartialEq)]
pub struct DenseImage {
    format: ImageFormat,
    width: i32,
    height: i32,
    buf: Vec<u8>,
}

impl DenseImage {
    pub fn new(format: ImageFormat, width: i32, height: i32) -> Self {
        let size = dense_image_buffer_size(format, width, height);
        let mut buf = vec![0u8; size];
        write_u32(&mut buf, 0, format.dense_magic());
        let (color_tag, depth_tag) = format.pack_tags();
        write_u32(&mut buf, 4, color_tag);
        write_u32(&mut buf, 8, depth_tag);
        write_u32(&mut buf, 12, width as u32);
        write_u32(&mut buf, 16, height as u32);
        write_u32(&mut buf, 20, size as u32);
        DenseImage {
            format,
            width,
            height,
            buf,
        }
    }

    pub fn format(&self) -> ImageFormat {
        self.format
    }

    pub fn width(&self) -> i32 {
        self.width
    }

    pub fn height(&self) -> i32 {
        self.height
    }

    pub fn num_pixels(&self) -> usize {
        self.width as usize * self.height as usize
    }

    fn color_plane_offset(&self) -> usize {
        HEADER_LEN
    }

    fn depth_plane_offset(&self) -> usize {
        HEADER_LEN + self.num_pixels() * self.format.color.pixel_size()
    }

    pub fn color_plane(&self) -> &[u8] {
        let start = self.color_plane_offset();
        let len = self.num_pixels() * self.format.color.pixel_size();
        &self.buf[start..start + len]
    }

    pub fn color_plane_mut(&mut self) -> &mut [u8] {
        let start = self.color_plane_offset();
        let len = self.num_pixels() * self.format.color.pixel_size();
        &mut self.buf[start..start + len]
    }

    pub fn depth_plane(&self) -> &[u8] {
        let start = self.depth_plane_offset();
        let len = self.num_pixels() * self.format.depth.pixel_size();
        &self.buf[start..start + len]
    }

    pub fn depth_plane_mut(&mut self) -> &mut [u8] {
        let start = self.depth_plane_offset();
        let len = self.num_pixels() * self.format.depth.pixel_size();
        &mut self.buf[start..start + len]
    }

    /// Fills every pixel with the background color / far depth, matching
    /// `icetClearImage`.
    pub fn clear(&mut self, background: &PackedBackground) {
        let color_size = self.format.color.pixel_size();
        if color_size > 0 {
            let pixel = background.color_bytes(self.format);
            for chunk in self.color_plane_mut().chunks_mut(color_size) {
                chunk.copy_from_slice(pixel);
            }
        }
        if self.format.depth.pixel_size() > 0 {
            let far = background.far_depth.to_ne_bytes();
            for chunk in self.depth_plane_mut().chunks_mut(4) {
                chunk.copy_from_slice(&far);
            }
        }
    }

    /// Byte-wise copy of both channels between two images of the same
    /// format. spec.md §4.2 `image_copy_pixels`.
    pub fn copy_pixels(
        src: &DenseImage,
        src_offset: usize,
        dst: &mut DenseImage,
        dst_offset: usize,
        count: usize,
    ) -> IcetImageResult<()> {
        if src.format != dst.format {
            return Err(IcetImageError::FormatMismatch);
        }
        let color_px = src.format.color.pixel_size();
        if color_px > 0 {
            let (s, d) = (src_offset * color_px, dst_offset * color_px);
            let src_slice = src.color_plane()[s..s + count * color_px].to_vec();
            dst.color_plane_mut()[d..d + count * color_px].copy_from_slice(&src_slice);
        }
        let depth_px = src.format.depth.pixel_size();
        if depth_px > 0 {
            let (s, d) = (src_offset * depth_px, dst_offset * depth_px);
            let src_slice = src.depth_plane()[s..s + count * depth_px].to_vec();
            dst.depth_plane_mut()[d..d + count * depth_px].copy_from_slice(&src_slice);
        }
        Ok(())
    }

    /// Places `src` at `dst_rect` inside `dst`; everything in `dst`
    /// outside `dst_rect` is cleared to `background`. spec.md §4.2
    /// `image_copy_region`: "must never leave uninitialized bytes in the
    /// destination".
    pub fn copy_region(
        src: &DenseImage,
        src_rect: Rect<i32>,
        dst: &mut DenseImage,
        dst_rect: Rect<i32>,
        background: &PackedBackground,
    ) -> IcetImageResult<()> {
        if src.format != dst.format {
            return Err(IcetImageError::FormatMismatch);
        }
        if src_rect.size != dst_rect.size {
            return Err(IcetImageError::SizeMismatch);
        }
        dst.clear(background);
        let color_px = dst.format.color.pixel_size();
        let depth_px = dst.format.depth.pixel_size();
        for row in 0..src_rect.size.height {
            let src_y = src_rect.origin.y + row;
            let dst_y = dst_rect.origin.y + row;
            if src_y < 0 || src_y >= src.height || dst_y < 0 || dst_y >= dst.height {
                continue;
            }
            let src_row_start = (src_y as usize * src.width as usize + src_rect.origin.x as usize)
                .max(0);
            let dst_row_start =
                dst_y as usize * dst.width as usize + dst_rect.origin.x as usize;
            let width = src_rect.size.width as usize;
            if color_px > 0 {
                let s = src_row_start * color_px;
                let d = dst_row_start * color_px;
                let row_bytes = src.color_plane()[s..s + width * color_px].to_vec();
                dst.color_plane_mut()[d..d + width * color_px].copy_from_slice(&row_bytes);
            }
            if depth_px > 0 {
                let s = src_row_start * depth_px;
                let d = dst_row_start * depth_px;
                let row_bytes = src.depth_plane()[s..s + width * depth_px].to_vec();
                dst.depth_plane_mut()[d..d + width * depth_px].copy_from_slice(&row_bytes);
            }
        }
        Ok(())
    }

    /// Endian-neutral flat layout for wire transfer: the in-memory buffer
    /// truncated to the self-reported actual size. For a dense image the
    /// actual size always equals the full buffer.
    pub fn package(&self) -> &[u8] {
        &self.buf
    }

    pub fn unpackage(bytes: &[u8]) -> IcetImageResult<DenseImage> {
        if bytes.len() < HEADER_LEN {
            return Err(IcetImageError::Truncated);
        }
        let magic = read_u32(bytes, 0);
        let color_tag = read_u32(bytes, 4);
        let depth_tag = read_u32(bytes, 8);
        let width = read_u32(bytes, 12) as i32;
        let height = read_u32(bytes, 16) as i32;
        let format =
            ImageFormat::from_tags(color_tag, depth_tag).ok_or(IcetImageError::InvalidEnum)?;
        if magic != format.dense_magic() {
            return Err(IcetImageError::InvalidValue);
        }
        let expected = dense_image_buffer_size(format, width, height);
        if bytes.len() != expected {
            return Err(IcetImageError::Truncated);
        }
        Ok(DenseImage {
            format,
            width,
            height,
            buf: bytes.to_vec(),
        })
    }
}

/// The background color, cached in both its float and packed-ubyte forms
/// so compositing code never re-packs it per pixel. spec.md §9 "Supplemented
/// features" #1.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PackedBackground {
    pub rgba_float: [f32; 4],
    pub rgba_ubyte: [u8; 4],
    pub far_depth: f32,
}

impl PackedBackground {
    pub fn new(rgba_float: [f32; 4]) -> Self {
        let pack = |c: f32| (c.clamp(0.0, 1.0) * 255.0).round() as u8;
        PackedBackground {
            rgba_float,
            rgba_ubyte: [
                pack(rgba_float[0]),
                pack(rgba_float[1]),
                pack(rgba_float[2]),
                pack(rgba_float[3]),
            ],
            far_depth: 1.0,
        }
    }

    pub fn color_bytes(&self, format: ImageFormat) -> &[u8] {
        match format.color {
            crate::ColorFormat::RgbaUByte => &self.rgba_ubyte,
            crate::ColorFormat::RgbaFloat => bytemuck_f32(&self.rgba_float),
            crate::ColorFormat::None => &[],
        }
    }

    /// A transparent-black variant, used while ordered-blend background
    /// correction defers the real background to the end of the frame
    /// (spec.md §4.6 step 2).
    pub fn transparent_black() -> Self {
        PackedBackground::new([0.0, 0.0, 0.0, 0.0])
    }
}

fn bytemuck_f32(values: &[f32; 4]) -> &[u8] {
    // SAFETY: `[f32; 4]` and `[u8; 16]` have the same size and alignment
    // requirements are satisfied because `values` is referenced, not owned,
    // and `u8` has no alignment requirement.
    unsafe { std::slice::from_raw_parts(values.as_ptr() as *const u8, 16) }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{ColorFormat, DepthFormat};

    #[test]
    fn roundtrip_package_unpackage() {
        let format = ImageFormat::new(ColorFormat::RgbaUByte, DepthFormat::Float);
        let mut image = DenseImage::new(format, 4, 3);
        image.clear(&PackedBackground::new([1.0, 0.0, 0.0, 1.0]));
        let bytes = image.package().to_vec();
        let back = DenseImage::unpackage(&bytes).unwrap();
        assert_eq!(back, image);
    }

    #[test]
    fn copy_region_clears_outside_area() {
        let format = ImageFormat::new(ColorFormat::RgbaUByte, DepthFormat::None);
        let background = PackedBackground::new([0.0, 0.0, 0.0, 0.0]);
        let mut src = DenseImage::new(format, 2, 2);
        src.clear(&PackedBackground::new([1.0, 1.0, 1.0, 1.0]));
        let mut dst = DenseImage::new(format, 4, 4);
        DenseImage::copy_region(
            &src,
            Rect::new((0, 0).into(), (2, 2).into()),
            &mut dst,
            Rect::new((1, 1).into(), (2, 2).into()),
            &background,
        )
        .unwrap();
        // Inside the region: white.
        assert_eq!(&dst.color_plane()[(1 * 4 + 1) * 4..(1 * 4 + 1) * 4 + 4], &[255, 255, 255, 255]);
        // Outside the region: cleared to background (transparent black).
        assert_eq!(&dst.color_plane()[0..4], &[0, 0, 0, 0]);
    }
}
