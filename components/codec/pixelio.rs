/* This Source Code Form is released under the New BSD License. If a
 * copy of the BSD-3-Clause license was not distributed with this
 * file, see https://opensource.org/licenses/BSD-3-Clause. */

use icet_image::{ColorFormat, CompositeMode, DenseImage, ImageFormat};

/// Cursor over a sequence of pixel cells, generalizing the original's
/// preprocessor-templated codec (one body per {color/depth presence ×
/// composite mode × padding × offset} combination) into one generic
/// loop body with a handful of concrete cursors. spec.md §9 design note
/// "Templated sparse codec".
pub trait PixelIo {
    /// Whether the pixel under the cursor counts as foreground.
    fn is_active(&self) -> bool;
    /// Writes the current pixel's packed `color ‖ depth` record into
    /// `dst`, which is exactly `format.pixel_record_size()` bytes. Only
    /// called while `is_active()` holds.
    fn write(&self, dst: &mut [u8]);
    /// Moves the cursor to the next pixel.
    fn advance(&mut self);
}

/// Walks a [`DenseImage`]'s planar storage in row-major order, deciding
/// activity from the channel the composite mode reads.
pub struct DensePixelCursor<'a> {
    image: &'a DenseImage,
    mode: CompositeMode,
    far_depth: f32,
    idx: usize,
}

impl<'a> DensePixelCursor<'a> {
    pub fn new(image: &'a DenseImage, mode: CompositeMode, far_depth: f32) -> Self {
        DensePixelCursor {
            image,
            mode,
            far_depth,
            idx: 0,
        }
    }
}

impl<'a> PixelIo for DensePixelCursor<'a> {
    fn is_active(&self) -> bool {
        match self.mode {
            CompositeMode::ZBuffer => {
                let start = self.idx * 4;
                let depth =
                    f32::from_ne_bytes(self.image.depth_plane()[start..start + 4].try_into().unwrap());
                depth < self.far_depth
            }
            CompositeMode::Blend => match self.image.format().color {
                ColorFormat::RgbaUByte => self.image.color_plane()[self.idx * 4 + 3] != 0,
                ColorFormat::RgbaFloat => {
                    let start = self.idx * 16 + 12;
                    let alpha = f32::from_ne_bytes(
                        self.image.color_plane()[start..start + 4].try_into().unwrap(),
                    );
                    alpha != 0.0
                }
                ColorFormat::None => false,
            },
        }
    }

    fn write(&self, dst: &mut [u8]) {
        let format = self.image.format();
        let color_size = format.color.pixel_size();
        if color_size > 0 {
            let start = self.idx * color_size;
            dst[..color_size].copy_from_slice(&self.image.color_plane()[start..start + color_size]);
        }
        let depth_size = format.depth.pixel_size();
        if depth_size > 0 {
            let start = self.idx * depth_size;
            dst[color_size..color_size + depth_size]
                .copy_from_slice(&self.image.depth_plane()[start..start + depth_size]);
        }
    }

    fn advance(&mut self) {
        self.idx += 1;
    }
}

/// Describes how a dense image sits inside a logically larger tile: the
/// padding is encoded as a stream of inactive pixels without the
/// compressor ever touching dense memory for those cells. spec.md §4.3
/// "Supports an optional padding mode".
#[derive(Debug, Clone, Copy)]
pub struct PaddingSpec {
    pub space_bottom: i32,
    pub space_top: i32,
    pub space_left: i32,
    pub space_right: i32,
    pub full_width: i32,
    pub full_height: i32,
}

impl PaddingSpec {
    pub fn none(width: i32, height: i32) -> Self {
        PaddingSpec {
            space_bottom: 0,
            space_top: 0,
            space_left: 0,
            space_right: 0,
            full_width: width,
            full_height: height,
        }
    }
}

/// Wraps an inner cursor with synthetic padding cells on all four sides,
/// so the compress loop never special-cases rows: every cell outside
/// the inner rectangle simply reports inactive.
pub struct PaddedPixelCursor<'a> {
    inner: DensePixelCursor<'a>,
    padding: PaddingSpec,
    width: i32,
    height: i32,
    idx: i64,
}

impl<'a> PaddedPixelCursor<'a> {
    pub fn new(inner: DensePixelCursor<'a>, padding: PaddingSpec, width: i32, height: i32) -> Self {
        PaddedPixelCursor {
            inner,
            padding,
            width,
            height,
            idx: 0,
        }
    }

    pub fn total_pixels(&self) -> usize {
        self.padding.full_width as usize * self.padding.full_height as usize
    }

    fn in_real_region(&self) -> bool {
        let row = self.idx / self.padding.full_width as i64;
        let col = self.idx % self.padding.full_width as i64;
        row >= self.padding.space_top as i64
            && row < (self.padding.space_top + self.height) as i64
            && col >= self.padding.space_left as i64
            && col < (self.padding.space_left + self.width) as i64
    }
}

impl<'a> PixelIo for PaddedPixelCursor<'a> {
    fn is_active(&self) -> bool {
        self.in_real_region() && self.inner.is_active()
    }

    fn write(&self, dst: &mut [u8]) {
        self.inner.write(dst)
    }

    fn advance(&mut self) {
        if self.in_real_region() {
            self.inner.advance();
        }
        self.idx += 1;
    }
}

pub(crate) fn background_record(format: ImageFormat, background: &icet_image::PackedBackground) -> Vec<u8> {
    let mut out = Vec::with_capacity(format.pixel_record_size());
    out.extend_from_slice(background.color_bytes(format));
    if format.depth.pixel_size() > 0 {
        out.extend_from_slice(&background.far_depth.to_ne_bytes());
    }
    out
}
