/* This Source Code Form is released under the New BSD License. If a
 * copy of the BSD-3-Clause license was not distributed with this
 * file, see https://opensource.org/licenses/BSD-3-Clause. */

use crate::dense::HEADER_LEN;
use crate::format::ImageFormat;
use crate::{IcetImageError, IcetImageResult};

fn write_u32(buf: &mut [u8], offset: usize, value: u32) {
    buf[offset..offset + 4].copy_from_slice(&value.to_ne_bytes());
}

fn read_u32(buf: &[u8], offset: usize) -> u32 {
    u32::from_ne_bytes(buf[offset..offset + 4].try_into().unwrap())
}

/// Worst-case buffer size for a sparse image of the given format and
/// dimensions: one run per pixel. spec.md §3.
pub fn sparse_image_max_buffer_size(format: ImageFormat, width: i32, height: i32) -> usize {
    let pixels = width as usize * height as usize;
    let p = format.pixel_record_size() * pixels + 4 * pixels;
    let extra = p.div_ceil(65535) * 4;
    HEADER_LEN + p + extra
}

/// A run-length encoded image: a stream of `(inactive_count, active_count)`
/// pairs, each followed by `active_count` packed pixel records. spec.md §3
/// "Sparse image", §6 wire format.
#[derive(Debug, Clone, PartialEq)]
pub struct SparseImage {
    format: ImageFormat,
    width: i32,
    height: i32,
    buf: Vec<u8>,
}

impl SparseImage {
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

    /// Bytes actually used, including the header; always `<=` the worst
    /// case bound from [`sparse_image_max_buffer_size`].
    pub fn actual_size(&self) -> usize {
        self.buf.len()
    }

    pub fn runs(&self) -> RunIter<'_> {
        RunIter {
            data: &self.buf[HEADER_LEN..],
            record_size: self.format.pixel_record_size(),
        }
    }

    /// spec.md §8 Testable Property 2: run accounting.
    pub fn validate_run_accounting(&self) -> IcetImageResult<()> {
        let mut total = 0usize;
        for run in self.runs() {
            total += run.inactive as usize + run.active as usize;
        }
        if total != self.num_pixels() {
            Err(IcetImageError::SanityCheckFail)
        } else {
            Ok(())
        }
    }

    pub fn package(&self) -> &[u8] {
        &self.buf
    }

    pub fn unpackage(bytes: &[u8]) -> IcetImageResult<SparseImage> {
        if bytes.len() < HEADER_LEN {
            return Err(IcetImageError::Truncated);
        }
        let magic = read_u32(bytes, 0);
        let color_tag = read_u32(bytes, 4);
        let depth_tag = read_u32(bytes, 8);
        let width = read_u32(bytes, 12) as i32;
        let height = read_u32(bytes, 16) as i32;
        let actual_size = read_u32(bytes, 20) as usize;
        let format =
            ImageFormat::from_tags(color_tag, depth_tag).ok_or(IcetImageError::InvalidEnum)?;
        if magic != format.sparse_magic() {
            return Err(IcetImageError::InvalidValue);
        }
        if actual_size != bytes.len() {
            return Err(IcetImageError::Truncated);
        }
        let image = SparseImage {
            format,
            width,
            height,
            buf: bytes.to_vec(),
        };
        image.validate_run_accounting()?;
        Ok(image)
    }
}

/// One run: a span of `inactive` background pixels followed by `active`
/// foreground pixels whose packed records are `pixels`.
#[derive(Debug, Clone, Copy)]
pub struct Run<'a> {
    pub inactive: u16,
    pub active: u16,
    pub pixels: &'a [u8],
}

pub struct RunIter<'a> {
    data: &'a [u8],
    record_size: usize,
}

impl<'a> Iterator for RunIter<'a> {
    type Item = Run<'a>;

    fn next(&mut self) -> Option<Run<'a>> {
        if self.data.len() < 4 {
            return None;
        }
        let inactive = u16::from_ne_bytes(self.data[0..2].try_into().unwrap());
        let active = u16::from_ne_bytes(self.data[2..4].try_into().unwrap());
        let payload_len = active as usize * self.record_size;
        let pixels = &self.data[4..4 + payload_len];
        self.data = &self.data[4 + payload_len..];
        Some(Run {
            inactive,
            active,
            pixels,
        })
    }
}

/// Incremental writer for a [`SparseImage`]'s run stream. Owns the
/// 65535-pixel-per-field splitting described in spec.md §4.3 steps 3-5 so
/// codec algorithms (`icet-codec`) only decide *when* a run boundary
/// occurs, not how it's encoded.
pub struct SparseBuilder {
    format: ImageFormat,
    width: i32,
    height: i32,
    buf: Vec<u8>,
    /// Byte offset of the run header currently being filled in, if any.
    current_run: Option<usize>,
    current_active: u32,
}

impl SparseBuilder {
    pub fn new(format: ImageFormat, width: i32, height: i32) -> Self {
        let cap = sparse_image_max_buffer_size(format, width, height);
        let mut buf = Vec::with_capacity(cap);
        buf.extend_from_slice(&[0u8; HEADER_LEN]);
        write_u32(&mut buf, 0, format.sparse_magic());
        let (color_tag, depth_tag) = format.pack_tags();
        write_u32(&mut buf, 4, color_tag);
        write_u32(&mut buf, 8, depth_tag);
        write_u32(&mut buf, 12, width as u32);
        write_u32(&mut buf, 16, height as u32);
        SparseBuilder {
            format,
            width,
            height,
            buf,
            current_run: None,
            current_active: 0,
        }
    }

    fn open_run(&mut self, inactive: u16) {
        let pos = self.buf.len();
        self.buf.extend_from_slice(&inactive.to_ne_bytes());
        self.buf.extend_from_slice(&0u16.to_ne_bytes()); // active, patched later
        self.current_run = Some(pos);
        self.current_active = 0;
    }

    fn patch_active(&mut self, active: u16) {
        let pos = self.current_run.expect("run must be open");
        self.buf[pos + 2..pos + 4].copy_from_slice(&active.to_ne_bytes());
    }

    /// Starts a new run whose inactive span is `inactive` pixels, splitting
    /// into `(0xFFFF, 0)` filler runs first if it exceeds 65535.
    pub fn begin_run(&mut self, mut inactive: u32) {
        if let Some(_) = self.current_run {
            self.patch_active(self.current_active as u16);
        }
        while inactive > 0xFFFF {
            self.open_run(0xFFFF);
            self.patch_active(0);
            inactive -= 0xFFFF;
        }
        self.open_run(inactive as u16);
    }

    /// Appends one active pixel's packed record. Automatically closes the
    /// run and opens a fresh `(0, 0)` one when the active count saturates
    /// at 65535 (spec.md §4.3 step 4).
    pub fn push_active_pixel(&mut self, record: &[u8]) {
        debug_assert_eq!(record.len(), self.format.pixel_record_size());
        if self.current_run.is_none() {
            self.open_run(0);
        }
        if self.current_active == 0xFFFF {
            self.patch_active(0xFFFF);
            self.open_run(0);
        }
        self.buf.extend_from_slice(record);
        self.current_active += 1;
    }

    /// Finalizes the sparse image: closes the last run and stamps the
    /// actual-size header field.
    pub fn finish(mut self) -> SparseImage {
        if let Some(_) = self.current_run {
            self.patch_active(self.current_active as u16);
        }
        let size = self.buf.len() as u32;
        write_u32(&mut self.buf, 20, size);
        SparseImage {
            format: self.format,
            width: self.width,
            height: self.height,
            buf: self.buf,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{ColorFormat, DepthFormat};

    #[test]
    fn builder_roundtrips_runs() {
        let format = ImageFormat::new(ColorFormat::RgbaUByte, DepthFormat::None);
        let mut builder = SparseBuilder::new(format, 4, 1);
        builder.begin_run(2);
        builder.push_active_pixel(&[1, 2, 3, 4]);
        builder.push_active_pixel(&[5, 6, 7, 8]);
        let image = builder.finish();
        image.validate_run_accounting().unwrap();
        let runs: Vec<_> = image.runs().collect();
        assert_eq!(runs.len(), 1);
        assert_eq!(runs[0].inactive, 2);
        assert_eq!(runs[0].active, 2);
        assert_eq!(runs[0].pixels, &[1, 2, 3, 4, 5, 6, 7, 8]);
    }

    #[test]
    fn builder_splits_long_inactive_runs() {
        let format = ImageFormat::new(ColorFormat::None, DepthFormat::Float);
        let width = 70000;
        let mut builder = SparseBuilder::new(format, width, 1);
        builder.begin_run(70000);
        let image = builder.finish();
        image.validate_run_accounting().unwrap();
        let runs: Vec<_> = image.runs().collect();
        assert_eq!(runs.len(), 2);
        assert_eq!(runs[0].inactive, 0xFFFF);
        assert_eq!(runs[1].inactive, 70000 - 0xFFFF);
    }

    #[test]
    fn builder_splits_on_active_saturation() {
        let format = ImageFormat::new(ColorFormat::RgbaUByte, DepthFormat::None);
        let width = 70000;
        let mut builder = SparseBuilder::new(format, width, 1);
        builder.begin_run(0);
        for _ in 0..70000u32 {
            builder.push_active_pixel(&[1, 1, 1, 1]);
        }
        let image = builder.finish();
        image.validate_run_accounting().unwrap();
        let runs: Vec<_> = image.runs().collect();
        assert_eq!(runs.len(), 2);
        assert_eq!(runs[0].active, 0xFFFF);
        assert_eq!(runs[1].active, 70000 - 0xFFFF);
    }
}
